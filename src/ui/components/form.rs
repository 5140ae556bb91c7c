use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::api::FormError;
use crate::ui::renderfns::centered_rect;
use crate::ui::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submitted,
  Cancelled,
}

#[derive(Debug, Clone)]
struct Field {
  /// Name used by the server in field errors, e.g. "fullName"
  name: &'static str,
  label: &'static str,
  input: TextInput,
  masked: bool,
  error: Option<String>,
}

/// Modal form: Tab/arrows move between fields, Enter on the last field
/// submits, Esc cancels.
#[derive(Debug, Clone)]
pub struct Form {
  title: &'static str,
  fields: Vec<Field>,
  focus: usize,
  message: Option<String>,
  pending: bool,
}

impl Form {
  pub fn new(title: &'static str) -> Self {
    Self {
      title,
      fields: Vec::new(),
      focus: 0,
      message: None,
      pending: false,
    }
  }

  pub fn field(mut self, name: &'static str, label: &'static str, value: &str) -> Self {
    self.fields.push(Field {
      name,
      label,
      input: TextInput::with_value(value),
      masked: false,
      error: None,
    });
    self
  }

  pub fn secret(mut self, name: &'static str, label: &'static str) -> Self {
    self.fields.push(Field {
      name,
      label,
      input: TextInput::new(),
      masked: true,
      error: None,
    });
    self
  }

  pub fn value(&self, name: &str) -> &str {
    self
      .fields
      .iter()
      .find(|f| f.name == name)
      .map(|f| f.input.value())
      .unwrap_or_default()
  }

  pub fn focused(&self) -> usize {
    self.focus
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  pub fn set_pending(&mut self, pending: bool) {
    self.pending = pending;
    if pending {
      self.message = None;
    }
  }

  /// Attach an error to the fields it names; anything else goes to the
  /// form-level message.
  pub fn show_error(&mut self, error: &FormError) {
    self.pending = false;
    let mut placed = false;
    for field in &mut self.fields {
      field.error = error.field_error(field.name).map(str::to_string);
      placed |= field.error.is_some();
    }
    self.message = if placed && matches!(error, FormError::Invalid(_)) {
      None
    } else {
      Some(error.to_string())
    };
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if self.pending {
      return KeyResult::Handled;
    }
    let last = self.fields.len().saturating_sub(1);
    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Tab | KeyCode::Down => {
        self.focus = if self.focus >= last { 0 } else { self.focus + 1 };
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = if self.focus == 0 { last } else { self.focus - 1 };
        return KeyResult::Handled;
      }
      KeyCode::Enter if self.focus < last => {
        self.focus += 1;
        return KeyResult::Handled;
      }
      KeyCode::Enter => {
        for field in &mut self.fields {
          field.error = None;
        }
        self.message = None;
        return KeyResult::Event(FormEvent::Submitted);
      }
      _ => {}
    }

    match self.fields.get_mut(self.focus) {
      Some(field) => match field.input.handle_key(key) {
        InputResult::Consumed => {
          field.error = None;
          KeyResult::Handled
        }
        _ => KeyResult::NotHandled,
      },
      None => KeyResult::NotHandled,
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let height = (self.fields.len() as u16) * 3 + 4;
    let popup = centered_rect(area, 60, height);
    frame.render_widget(Clear, popup);

    let block = Block::default()
      .title(self.title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.prompt));

    let mut lines = Vec::new();
    for (i, field) in self.fields.iter().enumerate() {
      let focused = i == self.focus;
      let label_style = if focused {
        Style::default().fg(palette.accent).bold()
      } else {
        Style::default().fg(palette.muted)
      };
      lines.push(Line::from(Span::styled(field.label, label_style)));

      let mut value = vec![Span::raw(format!(" {}", field.input.display(field.masked)))];
      if focused {
        value.push(Span::styled("_", Style::default().fg(palette.prompt)));
      }
      lines.push(Line::from(value));

      lines.push(match &field.error {
        Some(error) => Line::from(Span::styled(
          format!(" {}", error),
          Style::default().fg(palette.danger),
        )),
        None => Line::default(),
      });
    }

    lines.push(match (&self.message, self.pending) {
      (_, true) => Line::from(Span::styled("Saving...", Style::default().fg(palette.muted))),
      (Some(message), false) => {
        Line::from(Span::styled(message.clone(), Style::default().fg(palette.danger)))
      }
      (None, false) => Line::from(Span::styled(
        "Enter: next/submit  Tab: move  Esc: cancel",
        Style::default().fg(palette.muted),
      )),
    });

    frame.render_widget(Paragraph::new(lines).block(block), popup);
  }
}
