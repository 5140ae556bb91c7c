use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::ui::theme::Palette;
use crate::ui::view::ShortcutInfo;

/// Header bar: app name, API host, greeting, then the current view's
/// shortcuts in priority order.
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  palette: &Palette,
  host: &str,
  greeting: &str,
  shortcuts: &[ShortcutInfo],
) {
  let separator = Span::styled("│", Style::default().fg(palette.muted));
  let mut spans = vec![
    Span::styled(" libterm ", Style::default().fg(palette.accent).bold()),
    separator.clone(),
    Span::styled(format!(" {} ", host), Style::default().fg(palette.text)),
    separator,
    Span::styled(format!(" {} ", greeting), Style::default().fg(palette.prompt).bold()),
    Span::raw(" "),
  ];

  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    spans.push(Span::styled(
      format!(" <{}>", shortcut.key),
      Style::default().fg(palette.accent),
    ));
    spans.push(Span::styled(
      format!(" {} ", shortcut.label),
      Style::default().fg(palette.muted),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.bar_bg));
  frame.render_widget(paragraph, area);
}
