mod command_input;
mod form;
mod input;
mod prompt_input;

pub use command_input::{CommandEvent, CommandInput};
pub use form::{Form, FormEvent};
pub use input::{InputResult, TextInput};
pub use prompt_input::{PromptEvent, PromptInput};

/// How a component handled a key, shared by every component so views can
/// chain them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, no event for parent to handle
  Handled,
  /// Key was consumed, here's an event for parent to process
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}
