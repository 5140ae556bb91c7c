use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by a prompt that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
  /// Enter pressed; the trimmed text (may be empty)
  Submitted(String),
  /// Escape pressed
  Cancelled,
}

/// One-line prompt opened by a trigger key, e.g. `/` for search.
#[derive(Debug, Clone)]
pub struct PromptInput {
  input: TextInput,
  active: bool,
  trigger: char,
  title: &'static str,
}

impl PromptInput {
  pub fn new(trigger: char, title: &'static str) -> Self {
    Self {
      input: TextInput::new(),
      active: false,
      trigger,
      title,
    }
  }

  pub fn search() -> Self {
    Self::new('/', " Search ")
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn value(&self) -> &str {
    self.input.value()
  }

  /// Open the prompt, prefilled with `value`
  pub fn activate(&mut self, value: &str) {
    self.active = true;
    self.input = TextInput::with_value(value);
  }

  /// Call this regardless of active state; it handles activation too.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PromptEvent> {
    if !self.active {
      if key.code == KeyCode::Char(self.trigger) {
        self.activate("");
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(value) => {
        self.active = false;
        KeyResult::Event(PromptEvent::Submitted(value.trim().to_string()))
      }
      InputResult::Cancelled => {
        self.active = false;
        self.input.clear();
        KeyResult::Event(PromptEvent::Cancelled)
      }
      // Swallow everything else while open
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    if !self.active {
      return;
    }

    let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width, 3.min(area.height));

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.prompt))
      .title(self.title);

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let line = Line::from(vec![
      Span::styled(self.trigger.to_string(), Style::default().fg(palette.prompt)),
      Span::raw(self.input.value()),
      Span::styled("_", Style::default().fg(palette.prompt)),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
  }
}
