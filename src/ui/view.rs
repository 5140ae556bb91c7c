use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use super::theme::Palette;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
  /// Run an app command, same as typing it after `:`
  Command(&'static str),
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, forms, etc.) and return
/// actions for the App to execute: App → View → Components.
///
/// Views load data through query handles and poll them in `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// True while the view is capturing text, so global keys pass through
  fn is_editing(&self) -> bool {
    false
  }

  /// Called on each tick to allow views to poll async queries
  fn tick(&mut self) {}

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
