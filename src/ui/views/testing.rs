//! Helpers shared by the view tests.

use ratatui::backend::TestBackend;
use ratatui::Terminal;
use std::net::TcpListener;
use std::time::Duration;

use crate::api::types::Book;
use crate::api::HttpClient;
use crate::config::Config;
use crate::library::Library;
use crate::session::{Session, Theme};
use crate::ui::theme::Palette;
use crate::ui::view::View;

/// A library pointed at a port nothing listens on. Fetches are not retried,
/// so the first failure is final.
pub fn offline_library(session: Session) -> Library {
  let port = TcpListener::bind("127.0.0.1:0")
    .unwrap()
    .local_addr()
    .unwrap()
    .port();
  let client = HttpClient::new(&format!("http://127.0.0.1:{}/api", port), session, None).unwrap();
  let mut config = Config::default();
  config.cache.retry = 0;
  Library::with_client(client, config)
}

pub fn book(barcode: &str, title: &str) -> Book {
  Book {
    id: barcode.trim_start_matches("LIB-").to_string(),
    barcode: barcode.to_string(),
    title: title.to_string(),
    author: "Frank Herbert".to_string(),
    category: None,
    isbn: None,
    publisher: None,
    year: None,
    location: None,
    description: None,
    availability: "Available".to_string(),
  }
}

/// Draw the view once and return the screen as text, one line per row
pub fn render(view: &mut dyn View) -> String {
  let backend = TestBackend::new(120, 30);
  let mut terminal = Terminal::new(backend).unwrap();
  let palette = Palette::for_theme(Theme::Dark);
  terminal
    .draw(|frame| {
      let area = frame.area();
      view.render(frame, area, &palette);
    })
    .unwrap();

  let buffer = terminal.backend().buffer();
  buffer
    .content()
    .chunks(buffer.area.width as usize)
    .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Tick and redraw until `text` shows up or two seconds pass
pub async fn render_until(view: &mut dyn View, text: &str) -> String {
  for _ in 0..100 {
    view.tick();
    let screen = render(view);
    if screen.contains(text) {
      return screen;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  render(view)
}
