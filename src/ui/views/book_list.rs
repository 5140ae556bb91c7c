use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::types::{Book, BookPage};
use crate::cache::Pages;
use crate::derived::classify_availability;
use crate::library::{BookListQuery, Library};
use crate::screen::{ScreenSeed, ScreenState};
use crate::ui::components::{KeyResult, PromptEvent, PromptInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{draw_placeholder, refresh_suffix, truncate};
use crate::ui::theme::Palette;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::BookDetailView;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Listing {
  Available { category: Option<String> },
  Search { query: String },
}

fn books(pages: &Pages<BookPage, u32>) -> impl Iterator<Item = &Book> {
  pages.pages().iter().flat_map(|page| page.books.iter())
}

/// Paginated book browser: available books (optionally by category) or
/// search results. Pages load on demand as the selection reaches the end.
pub struct BookListView {
  library: Library,
  listing: Listing,
  query: BookListQuery,
  /// Shown until the first listing's own pages arrive
  seed: ScreenSeed<Pages<BookPage, u32>>,
  list_state: ListState,
  search: PromptInput,
  category: PromptInput,
}

impl BookListView {
  pub fn new(library: Library) -> Self {
    Self::seeded(library, ScreenSeed::default())
  }

  pub fn seeded(library: Library, seed: ScreenSeed<Pages<BookPage, u32>>) -> Self {
    let listing = Listing::Available { category: None };
    let query = Self::open(&library, &listing);
    Self {
      library,
      listing,
      query,
      seed,
      list_state: ListState::default(),
      search: PromptInput::search(),
      category: PromptInput::new('c', " Category (empty for all) "),
    }
  }

  fn open(library: &Library, listing: &Listing) -> BookListQuery {
    let mut query = match listing {
      Listing::Available { category } => library.available_books(category.as_deref()),
      Listing::Search { query } => library.search_books(query),
    };
    query.fetch();
    query
  }

  fn show(&mut self, listing: Listing) {
    if listing == self.listing {
      return;
    }
    self.query = Self::open(&self.library, &listing);
    self.listing = listing;
    self.seed = ScreenSeed::default();
    self.list_state = ListState::default();
  }

  fn pages(&self) -> Option<&Pages<BookPage, u32>> {
    self.query.pages().or(self.seed.initial_data())
  }

  fn len(&self) -> usize {
    self.pages().map_or(0, |pages| books(pages).count())
  }

  fn selected_book(&self) -> Option<&Book> {
    let idx = self.list_state.selected()?;
    books(self.pages()?).nth(idx)
  }

  /// Request the next page once the selection sits on the last row
  fn load_more_at_end(&mut self) {
    let len = self.len();
    if len > 0 && self.list_state.selected() == Some(len - 1) {
      self.query.fetch_next_page();
    }
  }

  fn title(&self) -> String {
    let count = self.len();
    let suffix = refresh_suffix(self.query.entry());
    match &self.listing {
      Listing::Available { category: None } => format!(" Available books ({}){} ", count, suffix),
      Listing::Available {
        category: Some(category),
      } => format!(" Available books: {} ({}){} ", category, count, suffix),
      Listing::Search { query } => format!(" Search \"{}\" ({}){} ", query, count, suffix),
    }
  }

  fn status_line(&self, palette: &Palette) -> Line<'static> {
    let (text, color) = if self.query.is_fetching_next_page() {
      ("Loading more...".to_string(), palette.muted)
    } else if let Some(error) = self.query.next_page_error() {
      (
        format!("Couldn't load more: {}. Press 'n' to retry.", error),
        palette.danger,
      )
    } else if self.query.has_next_page() {
      ("More books available, press 'n'".to_string(), palette.muted)
    } else {
      ("End of list".to_string(), palette.muted)
    };
    Line::from(Span::styled(format!(" {}", text), Style::default().fg(color)))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(3), Constraint::Length(1)])
      .split(area);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(palette.block());

    let empty_hint = match &self.listing {
      Listing::Search { .. } => "No books match your search.",
      Listing::Available { category: Some(_) } => "No available books in this category.",
      Listing::Available { category: None } => "No books are available right now.",
    };
    let state = ScreenState::resolve(
      self.query.entry(),
      |pages: &Pages<BookPage, u32>| books(pages).next().is_none(),
      &self.seed.options(),
    );
    let Some(pages) = draw_placeholder(
      frame,
      chunks[0],
      block.clone(),
      state,
      palette,
      "books",
      empty_hint,
    ) else {
      return;
    };

    let items: Vec<ListItem> = books(pages)
      .map(|book| {
        let badge = classify_availability(&book.availability);
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<12}", truncate(&book.barcode, 12)),
            Style::default().fg(palette.accent),
          ),
          Span::styled(
            format!("{:<14}", truncate(&badge.label, 13)),
            Style::default().fg(palette.availability(badge.kind)),
          ),
          Span::raw(format!("{:<40}", truncate(&book.title, 40))),
          Span::styled(truncate(&book.author, 24), Style::default().fg(palette.muted)),
        ]))
      })
      .collect();

    let status = self.status_line(palette);
    ensure_valid_selection(&mut self.list_state, items.len());
    let list = List::new(items)
      .block(block)
      .highlight_style(palette.highlight())
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, chunks[0], &mut self.list_state);
    frame.render_widget(Paragraph::new(status), chunks[1]);
  }
}

impl View for BookListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(text)) => {
        let listing = if text.is_empty() {
          Listing::Available { category: None }
        } else {
          Listing::Search { query: text }
        };
        self.show(listing);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.category.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(text)) => {
        let category = (!text.is_empty()).then_some(text);
        self.show(Listing::Available { category });
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        let len = self.len();
        self.list_state.select_next();
        ensure_valid_selection(&mut self.list_state, len);
        self.load_more_at_end();
      }
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('n') => self.query.fetch_next_page(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter => {
        if let Some(book) = self.selected_book() {
          let seed = ScreenSeed::with_initial_data(book.clone());
          let detail = BookDetailView::seeded(self.library.clone(), book.barcode.clone(), seed);
          return ViewAction::Push(Box::new(detail));
        }
      }
      KeyCode::Esc if matches!(self.listing, Listing::Search { .. }) => {
        self.show(Listing::Available { category: None });
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    self.render_list(frame, area, palette);
    self.search.render_overlay(frame, area, palette);
    self.category.render_overlay(frame, area, palette);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.listing {
      Listing::Available { category: None } => "Books".to_string(),
      Listing::Available {
        category: Some(category),
      } => format!("Books [{}]", category),
      Listing::Search { query } => format!("Search [{}]", query),
    }
  }

  fn is_editing(&self) -> bool {
    self.search.is_active() || self.category.is_active()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("c", "category").with_priority(21),
      ShortcutInfo::new("n", "more").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;
  use crate::ui::views::testing::{book, offline_library, render, render_until};

  fn one_page(books: Vec<Book>) -> Pages<BookPage, u32> {
    let page = BookPage {
      books,
      page: 1,
      total_pages: Some(1),
      has_more: false,
    };
    Pages::first(page, 1, None)
  }

  #[tokio::test]
  async fn test_renders_loading() {
    let mut view = BookListView::seeded(offline_library(Session::in_memory()), ScreenSeed::loading());
    assert!(render(&mut view).contains("Loading books..."));
  }

  #[tokio::test]
  async fn test_renders_seeded_books() {
    let seed = ScreenSeed::with_initial_data(one_page(vec![
      book("LIB-00124", "Dune"),
      book("LIB-00125", "Children of Dune"),
    ]));
    let mut view = BookListView::seeded(offline_library(Session::in_memory()), seed);

    let screen = render(&mut view);
    assert!(screen.contains("Available books (2)"));
    assert!(screen.contains("LIB-00124"));
    assert!(screen.contains("Children of Dune"));
    assert!(screen.contains("End of list"));
  }

  #[tokio::test]
  async fn test_renders_empty_hint() {
    let seed = ScreenSeed::with_initial_data(one_page(Vec::new()));
    let mut view = BookListView::seeded(offline_library(Session::in_memory()), seed);
    assert!(render(&mut view).contains("No books are available right now."));
  }

  #[tokio::test]
  async fn test_renders_error_with_retry_hint() {
    let mut view = BookListView::new(offline_library(Session::in_memory()));

    let screen = render_until(&mut view, "Press 'r' to retry.").await;
    assert!(screen.contains("Press 'r' to retry."));
    assert!(!screen.contains("Loading books..."));
  }

  #[tokio::test]
  async fn test_new_search_drops_the_seed() {
    let seed = ScreenSeed::with_initial_data(one_page(vec![book("LIB-00124", "Dune")]));
    let mut view = BookListView::seeded(offline_library(Session::in_memory()), seed);
    assert_eq!(view.len(), 1);

    view.show(Listing::Search {
      query: "tolkien".to_string(),
    });
    assert_eq!(view.len(), 0);
    assert!(render(&mut view).contains("Search \"tolkien\""));
  }

  #[tokio::test]
  async fn test_opened_book_shows_without_waiting() {
    let seed = ScreenSeed::with_initial_data(one_page(vec![book("LIB-00124", "Dune")]));
    let mut view = BookListView::seeded(offline_library(Session::in_memory()), seed);
    render(&mut view);

    let ViewAction::Push(mut detail) = view.handle_key(KeyEvent::from(KeyCode::Enter)) else {
      panic!("expected the book detail to open");
    };
    let screen = render(detail.as_mut());
    assert!(screen.contains("Dune"));
    assert!(screen.contains("Frank Herbert"));
    assert!(!screen.contains("Loading book..."));
  }
}
