use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event in an input component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
  /// Key was handled, continue input mode
  Consumed,
  /// Enter pressed, here's the submitted value
  Submitted(String),
  /// Escape pressed, input cancelled
  Cancelled,
  /// Key not handled, pass to next handler
  NotHandled,
}

/// Single-line text input. The cursor is a byte offset that always sits on
/// a char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  buffer: String,
  cursor: usize,
}

impl TextInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_value(value: impl Into<String>) -> Self {
    let buffer = value.into();
    let cursor = buffer.len();
    Self { buffer, cursor }
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
    self.cursor = 0;
  }

  /// Text as it should be drawn; masked inputs show one `*` per char.
  pub fn display(&self, masked: bool) -> String {
    if masked {
      "*".repeat(self.buffer.chars().count())
    } else {
      self.buffer.clone()
    }
  }

  fn prev_boundary(&self) -> usize {
    self.buffer[..self.cursor]
      .char_indices()
      .next_back()
      .map(|(i, _)| i)
      .unwrap_or(0)
  }

  fn next_boundary(&self) -> usize {
    self.buffer[self.cursor..]
      .chars()
      .next()
      .map(|c| self.cursor + c.len_utf8())
      .unwrap_or(self.cursor)
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
      KeyCode::Esc => InputResult::Cancelled,
      KeyCode::Enter => InputResult::Submitted(self.buffer.clone()),
      KeyCode::Backspace => {
        if self.cursor > 0 {
          let start = self.prev_boundary();
          self.buffer.replace_range(start..self.cursor, "");
          self.cursor = start;
        }
        InputResult::Consumed
      }
      KeyCode::Delete => {
        if self.cursor < self.buffer.len() {
          let end = self.next_boundary();
          self.buffer.replace_range(self.cursor..end, "");
        }
        InputResult::Consumed
      }
      KeyCode::Left => {
        self.cursor = self.prev_boundary();
        InputResult::Consumed
      }
      KeyCode::Right => {
        self.cursor = self.next_boundary();
        InputResult::Consumed
      }
      KeyCode::Home => {
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::End => {
        self.cursor = self.buffer.len();
        InputResult::Consumed
      }
      KeyCode::Char('a') if ctrl => {
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::Char('e') if ctrl => {
        self.cursor = self.buffer.len();
        InputResult::Consumed
      }
      KeyCode::Char('u') if ctrl => {
        // Clear line before cursor
        self.buffer.replace_range(..self.cursor, "");
        self.cursor = 0;
        InputResult::Consumed
      }
      KeyCode::Char('w') if ctrl => {
        // Delete word before cursor
        let before = &self.buffer[..self.cursor];
        let start = before.trim_end().rfind(' ').map(|i| i + 1).unwrap_or(0);
        self.buffer.replace_range(start..self.cursor, "");
        self.cursor = start;
        InputResult::Consumed
      }
      KeyCode::Char(_) if ctrl => InputResult::NotHandled,
      KeyCode::Char(c) => {
        self.buffer.insert(self.cursor, c);
        self.cursor += c.len_utf8();
        InputResult::Consumed
      }
      _ => InputResult::NotHandled,
    }
  }

  /// Cursor position in chars, for rendering
  pub fn cursor_position(&self) -> usize {
    self.buffer[..self.cursor].chars().count()
  }
}
