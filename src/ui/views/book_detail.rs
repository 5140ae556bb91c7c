use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::api::types::{Book, BorrowReceipt, BorrowRecord};
use crate::api::ApiError;
use crate::derived::{classify_availability, Availability};
use crate::library::{Library, LibraryQuery};
use crate::query::{Mutation, MutationState};
use crate::screen::{ScreenOptions, ScreenSeed, ScreenState};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{draw_placeholder, refresh_suffix, truncate};
use crate::ui::theme::Palette;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Detail of one book with its borrow history and related titles.
///
/// History and related books depend on fields of the book itself, so their
/// queries are created once the detail has loaded.
pub struct BookDetailView {
  library: Library,
  barcode: String,
  book: LibraryQuery<Book>,
  /// Usually the listing row the detail was opened from
  seed: ScreenSeed<Book>,
  history: Option<LibraryQuery<Vec<BorrowRecord>>>,
  related: Option<LibraryQuery<Vec<Book>>>,
  related_list: ListState,
  borrow: Mutation<BorrowReceipt, ApiError>,
  notice: Option<String>,
}

impl BookDetailView {
  pub fn new(library: Library, barcode: String) -> Self {
    Self::seeded(library, barcode, ScreenSeed::default())
  }

  pub fn seeded(library: Library, barcode: String, seed: ScreenSeed<Book>) -> Self {
    let mut book = library.book_detail(&barcode);
    book.fetch();

    let mut view = Self {
      library,
      barcode,
      book,
      seed,
      history: None,
      related: None,
      related_list: ListState::default(),
      borrow: Mutation::new(),
      notice: None,
    };
    view.start_dependents();
    view
  }

  fn book(&self) -> Option<&Book> {
    self.book.data().or(self.seed.initial_data())
  }

  fn start_dependents(&mut self) {
    let Some(book) = self.book.data().or(self.seed.initial_data()) else {
      return;
    };
    if self.history.is_none() && !book.id.is_empty() {
      let mut history = self.library.borrow_history(&book.id);
      history.fetch();
      self.history = Some(history);
    }
    if self.related.is_none() {
      if let Some(category) = book.category.as_deref().filter(|c| !c.trim().is_empty()) {
        let mut related = self.library.related_books(category);
        related.fetch();
        self.related = Some(related);
      }
    }
  }

  /// Related books minus the one on screen
  fn related_books(&self) -> Vec<&Book> {
    self
      .related
      .as_ref()
      .and_then(|q| q.data())
      .map(|books| books.iter().filter(|b| b.barcode != self.barcode).collect())
      .unwrap_or_default()
  }

  fn borrow_book(&mut self) {
    let Some(book) = self.book() else {
      return;
    };
    let badge = classify_availability(&book.availability);
    if badge.kind != Availability::Available {
      self.notice = Some(format!("Not available to borrow ({})", badge.label));
      return;
    }
    let future = self.library.borrow_book(&self.barcode, None);
    if self.borrow.start(future) {
      self.notice = Some("Borrowing...".to_string());
    }
  }

  fn refresh(&mut self) {
    self.book.refetch();
    if let Some(history) = &mut self.history {
      history.refetch();
    }
    if let Some(related) = &mut self.related {
      related.refetch();
    }
  }

  fn render_book(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let entry = self.book.entry();
    let block = Block::default()
      .title(format!(" {}{} ", self.barcode, refresh_suffix(entry)))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(palette.block());
    let state = ScreenState::resolve(entry, |_| false, &self.seed.options());
    let Some(book) = draw_placeholder(frame, area, block.clone(), state, palette, "book", "") else {
      return;
    };

    let badge = classify_availability(&book.availability);
    let label = |text: &'static str| Span::styled(text, Style::default().fg(palette.muted));
    let optional = |value: Option<&str>| value.unwrap_or("-").to_string();

    let mut lines = vec![
      Line::from(Span::styled(
        book.title.clone(),
        Style::default().fg(palette.accent).bold(),
      )),
      Line::from(vec![label("by "), Span::raw(book.author.clone())]),
      Line::default(),
      Line::from(vec![
        label("Status:    "),
        Span::styled(
          badge.label.clone(),
          Style::default().fg(palette.availability(badge.kind)).bold(),
        ),
      ]),
      Line::from(vec![label("Category:  "), Span::raw(optional(book.category.as_deref()))]),
      Line::from(vec![label("Location:  "), Span::raw(optional(book.location.as_deref()))]),
      Line::from(vec![label("ISBN:      "), Span::raw(optional(book.isbn.as_deref()))]),
      Line::from(vec![
        label("Publisher: "),
        Span::raw(optional(book.publisher.as_deref())),
        Span::raw(book.year.map(|y| format!(" ({})", y)).unwrap_or_default()),
      ]),
    ];
    if let Some(description) = &book.description {
      lines.push(Line::default());
      lines.push(Line::from(description.clone()));
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
  }

  fn render_history(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let block = Block::default()
      .title(" Borrow history ")
      .borders(Borders::ALL)
      .border_style(palette.block());
    let Some(history) = &self.history else {
      frame.render_widget(block, area);
      return;
    };
    let state = ScreenState::resolve(history.entry(), Vec::is_empty, &ScreenOptions::default());
    let Some(records) = draw_placeholder(
      frame,
      area,
      block.clone(),
      state,
      palette,
      "history",
      "Never borrowed.",
    ) else {
      return;
    };

    let items: Vec<ListItem> = records
      .iter()
      .map(|record| {
        let returned = record
          .returned_at
          .as_deref()
          .map(|d| format!("returned {}", truncate(d, 10)))
          .unwrap_or_else(|| "on loan".to_string());
        ListItem::new(Line::from(vec![
          Span::raw(format!(
            "{:<12}",
            truncate(record.borrowed_at.as_deref().unwrap_or("-"), 10)
          )),
          Span::styled(returned, Style::default().fg(palette.muted)),
          Span::raw(
            record
              .borrower
              .as_deref()
              .map(|b| format!("  {}", b))
              .unwrap_or_default(),
          ),
        ]))
      })
      .collect();
    frame.render_widget(List::new(items).block(block), area);
  }

  fn render_related(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let block = Block::default()
      .title(" Related books ")
      .borders(Borders::ALL)
      .border_style(palette.block());
    let Some(related) = &self.related else {
      frame.render_widget(block, area);
      return;
    };

    let state = ScreenState::resolve(
      related.entry(),
      |books: &Vec<Book>| books.iter().all(|b| b.barcode == self.barcode),
      &ScreenOptions::default(),
    );
    if draw_placeholder(
      frame,
      area,
      block.clone(),
      state,
      palette,
      "related books",
      "No related books.",
    )
    .is_none()
    {
      return;
    }

    let items: Vec<ListItem> = self
      .related_books()
      .into_iter()
      .map(|book| {
        let badge = classify_availability(&book.availability);
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<32}", truncate(&book.title, 32))),
          Span::styled(badge.label, Style::default().fg(palette.availability(badge.kind))),
        ]))
      })
      .collect();

    ensure_valid_selection(&mut self.related_list, items.len());
    let list = List::new(items)
      .block(block)
      .highlight_style(palette.highlight())
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.related_list);
  }
}

impl View for BookDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.related_list.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.related_list.select_previous(),
      KeyCode::Char('b') => self.borrow_book(),
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Enter => {
        let book = self
          .related_list
          .selected()
          .and_then(|idx| self.related_books().get(idx).map(|b| (*b).clone()));
        if let Some(book) = book {
          let barcode = book.barcode.clone();
          let seed = ScreenSeed::with_initial_data(book);
          return ViewAction::Push(Box::new(BookDetailView::seeded(
            self.library.clone(),
            barcode,
            seed,
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(3), Constraint::Length(1)])
      .split(area);
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
      .split(rows[0]);
    let side = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(columns[1]);

    self.render_book(frame, columns[0], palette);
    self.render_history(frame, side[0], palette);
    self.render_related(frame, side[1], palette);

    if let Some(notice) = &self.notice {
      let color = match self.borrow.state() {
        MutationState::Error(_) => palette.danger,
        MutationState::Success(_) => palette.success,
        _ => palette.prompt,
      };
      frame.render_widget(
        Paragraph::new(format!(" {}", notice)).style(Style::default().fg(color)),
        rows[1],
      );
    }
  }

  fn breadcrumb_label(&self) -> String {
    self.barcode.clone()
  }

  fn tick(&mut self) {
    if self.book.poll() {
      self.start_dependents();
    }
    if let Some(history) = &mut self.history {
      history.poll();
    }
    if let Some(related) = &mut self.related {
      related.poll();
    }

    if self.borrow.poll() {
      self.notice = match self.borrow.state() {
        MutationState::Success(receipt) => Some(match &receipt.due_date {
          Some(due) => format!("Borrowed. Due {}", due),
          None => receipt
            .message
            .clone()
            .unwrap_or_else(|| "Borrowed".to_string()),
        }),
        MutationState::Error(error) => Some(error.to_string()),
        _ => None,
      };
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("b", "borrow").with_priority(20),
      ShortcutInfo::new("enter", "open related").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
