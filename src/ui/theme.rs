use ratatui::prelude::*;

use crate::derived::{Availability, DueStatus, DUE_SOON_DAYS};
use crate::session::Theme;

/// Colors for one theme. Views never hardcode colors; they ask the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
  pub text: Color,
  pub muted: Color,
  pub accent: Color,
  pub border: Color,
  pub bar_bg: Color,
  pub highlight_bg: Color,
  pub prompt: Color,
  pub success: Color,
  pub warning: Color,
  pub danger: Color,
}

impl Palette {
  pub fn for_theme(theme: Theme) -> Self {
    match theme {
      Theme::Dark => Self {
        text: Color::White,
        muted: Color::DarkGray,
        accent: Color::Cyan,
        border: Color::Blue,
        bar_bg: Color::Black,
        highlight_bg: Color::DarkGray,
        prompt: Color::Yellow,
        success: Color::Green,
        warning: Color::Yellow,
        danger: Color::Red,
      },
      Theme::Light => Self {
        text: Color::Black,
        muted: Color::Gray,
        accent: Color::Blue,
        border: Color::DarkGray,
        bar_bg: Color::White,
        highlight_bg: Color::LightBlue,
        prompt: Color::Magenta,
        success: Color::Green,
        warning: Color::Rgb(180, 110, 0),
        danger: Color::Red,
      },
    }
  }

  pub fn availability(&self, kind: Availability) -> Color {
    match kind {
      Availability::Available => self.success,
      Availability::CheckedOut => self.danger,
      Availability::OnHold => self.warning,
    }
  }

  pub fn due(&self, status: DueStatus) -> Color {
    match status {
      DueStatus::Overdue(_) => self.danger,
      DueStatus::DueToday => self.warning,
      DueStatus::DueIn(days) if i64::from(days) <= DUE_SOON_DAYS => self.warning,
      DueStatus::DueIn(_) => self.text,
    }
  }

  pub fn block(&self) -> Style {
    Style::default().fg(self.border)
  }

  pub fn highlight(&self) -> Style {
    Style::default()
      .bg(self.highlight_bg)
      .add_modifier(Modifier::BOLD)
  }
}

impl Default for Palette {
  fn default() -> Self {
    Self::for_theme(Theme::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_themes_differ() {
    assert_ne!(
      Palette::for_theme(Theme::Dark),
      Palette::for_theme(Theme::Light)
    );
  }

  #[test]
  fn test_due_colors() {
    let palette = Palette::default();
    assert_eq!(palette.due(DueStatus::Overdue(2)), palette.danger);
    assert_eq!(palette.due(DueStatus::DueToday), palette.warning);
    assert_eq!(palette.due(DueStatus::DueIn(2)), palette.warning);
    assert_eq!(palette.due(DueStatus::DueIn(10)), palette.text);
  }

  #[test]
  fn test_availability_colors() {
    let palette = Palette::default();
    assert_eq!(palette.availability(Availability::Available), palette.success);
    assert_eq!(palette.availability(Availability::CheckedOut), palette.danger);
    assert_eq!(palette.availability(Availability::OnHold), palette.warning);
  }
}
