use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph, Wrap};

use crate::api::ApiError;
use crate::cache::QueryEntry;
use crate::screen::{is_refreshing, refresh_error, ScreenState};
use crate::ui::theme::Palette;

/// Draw the loading, empty or error placeholder inside `block`.
/// Returns the data untouched when there is content for the caller to draw.
pub fn draw_placeholder<'a, T>(
  frame: &mut Frame,
  area: Rect,
  block: Block,
  state: ScreenState<'a, T, ApiError>,
  palette: &Palette,
  what: &str,
  empty_hint: &str,
) -> Option<&'a T> {
  let (text, color) = match state {
    ScreenState::Content(data) => return Some(data),
    ScreenState::Loading => (format!("Loading {}...", what), palette.muted),
    ScreenState::Empty => (empty_hint.to_string(), palette.muted),
    ScreenState::Error(error) => (error_text(error), palette.danger),
  };

  let paragraph = Paragraph::new(text)
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
  None
}

fn error_text(error: &ApiError) -> String {
  let mut text = format!("{}\n\nPress 'r' to retry.", error);
  if error.is_unauthorized() {
    text.push_str("\nSign in with: libterm --token <TOKEN>");
  }
  text
}

/// Title suffix describing a background refresh of already shown data
pub fn refresh_suffix<T>(entry: &QueryEntry<T, ApiError>) -> String {
  if is_refreshing(entry) {
    " (refreshing...)".to_string()
  } else if let Some(error) = refresh_error(entry) {
    format!(" (refresh failed: {})", error.message)
  } else {
    String::new()
  }
}
