use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized; the next draw picks up the new size
  Resize,
  /// No input for one tick; views poll their queries
  Tick,
}

/// Reads terminal input on a blocking thread and emits a tick whenever
/// `tick_rate` passes without input.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || loop {
      let event = match event::poll(tick_rate) {
        Ok(true) => match event::read() {
          Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Event::Key(key),
          Ok(CrosstermEvent::Resize(_, _)) => Event::Resize,
          Ok(_) => continue,
          Err(e) => {
            warn!(error = %e, "failed to read terminal event");
            continue;
          }
        },
        Ok(false) => Event::Tick,
        Err(e) => {
          warn!(error = %e, "terminal event poll failed");
          std::thread::sleep(tick_rate);
          Event::Tick
        }
      };
      // Receiver gone means the app loop ended
      if tx.send(event).is_err() {
        break;
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
