use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::ui::theme::Palette;

/// Footer bar: view breadcrumb on the left, optional status on the right
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  palette: &Palette,
  breadcrumb: &[String],
  status: Option<&str>,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(palette.muted)));
    }

    let style = if i + 1 == breadcrumb.len() {
      Style::default().fg(palette.accent).bold()
    } else {
      Style::default().fg(palette.text)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  if let Some(status) = status {
    spans.push(Span::styled("  │ ", Style::default().fg(palette.muted)));
    spans.push(Span::styled(status.to_string(), Style::default().fg(palette.prompt)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.bar_bg));
  frame.render_widget(paragraph, area);
}
