pub mod components;
pub mod renderfns;
pub mod theme;
pub mod view;
pub mod views;

use chrono::Local;
use ratatui::prelude::*;
use ratatui::widgets::ListState;

use crate::app::App;
use crate::derived::greeting_at;
use renderfns::{draw_footer, draw_header, host_of};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let base_url = app.library().api().client().base_url().to_string();
  let greeting = greeting_at(&Local::now());
  draw_header(
    frame,
    chunks[0],
    app.palette(),
    host_of(&base_url),
    greeting.text(),
    &app.shortcuts(),
  );

  app.render_view(frame, chunks[1]);

  draw_footer(
    frame,
    chunks[2],
    app.palette(),
    &app.breadcrumb(),
    app.status().as_deref(),
  );

  app.command_input().render_overlay(frame, chunks[1], app.palette());
}

/// Keep a list selection inside `0..len`, selecting the first row when
/// nothing is selected yet.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    None => state.select(Some(0)),
    Some(idx) if idx >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_selection_cleared_for_empty_list() {
    let mut state = ListState::default().with_selected(Some(3));
    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }

  #[test]
  fn test_first_row_selected_by_default() {
    let mut state = ListState::default();
    ensure_valid_selection(&mut state, 5);
    assert_eq!(state.selected(), Some(0));
  }

  #[test]
  fn test_selection_clamped_after_list_shrinks() {
    let mut state = ListState::default().with_selected(Some(9));
    ensure_valid_selection(&mut state, 4);
    assert_eq!(state.selected(), Some(3));

    state.select(Some(2));
    ensure_valid_selection(&mut state, 4);
    assert_eq!(state.selected(), Some(2));
  }
}
