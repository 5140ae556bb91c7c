use chrono::{Local, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::types::{ActionResponse, Borrow, OverdueStatus, Profile};
use crate::api::ApiError;
use crate::derived::{due_status, greeting_at, summarize, ArcKey, DashboardSummary, Memo};
use crate::library::{Library, LibraryQuery};
use crate::query::{Mutation, MutationState};
use crate::screen::{ScreenSeed, ScreenState};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{draw_placeholder, money, refresh_suffix, truncate};
use crate::ui::theme::Palette;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::BookDetailView;

type SummaryInput = (
  Option<ArcKey<Vec<Borrow>>>,
  Option<ArcKey<OverdueStatus>>,
  NaiveDate,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
  Borrows,
  Overdue,
}

/// Home screen: greeting, loan summary, current borrows and overdue fines
pub struct DashboardView {
  library: Library,
  profile: LibraryQuery<Profile>,
  borrows: LibraryQuery<Vec<Borrow>>,
  overdue: LibraryQuery<OverdueStatus>,
  borrows_seed: ScreenSeed<Vec<Borrow>>,
  overdue_seed: ScreenSeed<OverdueStatus>,
  summary: Memo<SummaryInput, DashboardSummary>,
  focus: Pane,
  borrow_list: ListState,
  overdue_list: ListState,
  action: Mutation<ActionResponse, ApiError>,
  notice: Option<String>,
}

impl DashboardView {
  pub fn new(library: Library) -> Self {
    Self::seeded(library, ScreenSeed::default(), ScreenSeed::default())
  }

  /// Dashboard whose panes show `borrows` and `overdue` until their own
  /// queries have data.
  pub fn seeded(
    library: Library,
    borrows_seed: ScreenSeed<Vec<Borrow>>,
    overdue_seed: ScreenSeed<OverdueStatus>,
  ) -> Self {
    let mut profile = library.profile();
    let mut borrows = library.current_borrows();
    let mut overdue = library.overdue();
    profile.fetch();
    borrows.fetch();
    overdue.fetch();

    Self {
      library,
      profile,
      borrows,
      overdue,
      borrows_seed,
      overdue_seed,
      summary: Memo::new(),
      focus: Pane::Borrows,
      borrow_list: ListState::default(),
      overdue_list: ListState::default(),
      action: Mutation::new(),
      notice: None,
    }
  }

  fn borrows(&self) -> Option<&Vec<Borrow>> {
    self.borrows.data().or(self.borrows_seed.initial_data())
  }

  fn overdue_status(&self) -> Option<&OverdueStatus> {
    self.overdue.data().or(self.overdue_seed.initial_data())
  }

  fn selected_borrow(&self) -> Option<&Borrow> {
    let idx = self.borrow_list.selected()?;
    self.borrows()?.get(idx)
  }

  fn request_return(&mut self) {
    let Some(borrow) = self.selected_borrow() else {
      return;
    };
    if borrow.return_requested {
      self.notice = Some(format!("Return already requested for \"{}\"", borrow.title));
      return;
    }
    let future = self.library.request_return(&borrow.id);
    if self.action.start(future) {
      self.notice = Some("Requesting return...".to_string());
    }
  }

  fn pay_fine(&mut self) {
    let item = self
      .overdue_list
      .selected()
      .and_then(|idx| self.overdue_status()?.items.get(idx));
    let Some(item) = item else {
      return;
    };
    let amount = item
      .fine_amount
      .filter(|amount| amount.is_finite() && *amount > 0.0);
    let (Some(fine_id), Some(amount)) = (item.fine_id.as_deref(), amount) else {
      self.notice = Some("Nothing to pay for this item".to_string());
      return;
    };
    let future = self.library.pay_fine(fine_id, amount);
    if self.action.start(future) {
      self.notice = Some(format!("Paying {}...", money(amount)));
    }
  }

  fn refresh(&mut self) {
    self.profile.refetch();
    self.borrows.refetch();
    self.overdue.refetch();
  }

  fn summary(&mut self) -> DashboardSummary {
    let borrows = self.borrows.entry().data.clone();
    let borrows = borrows.or_else(|| self.borrows_seed.shared_initial_data());
    let overdue = self.overdue.entry().data.clone();
    let overdue = overdue.or_else(|| self.overdue_seed.shared_initial_data());
    let now = Local::now();
    let input = (
      borrows.clone().map(ArcKey),
      overdue.clone().map(ArcKey),
      now.date_naive(),
    );
    self
      .summary
      .get(input, |_| {
        summarize(
          borrows.as_deref().map(Vec::as_slice).unwrap_or_default(),
          overdue.as_deref(),
          &now,
        )
      })
      .clone()
  }

  fn render_summary(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let summary = self.summary();
    let greeting = greeting_at(&Local::now()).text();
    let name = self
      .profile
      .data()
      .map(|p| p.full_name.split_whitespace().next().unwrap_or(&p.full_name).to_string());
    let hello = match name {
      Some(name) if !name.is_empty() => format!("{}, {}", greeting, name),
      _ => greeting.to_string(),
    };

    let stat = |label: &'static str, value: String, color: Color| {
      vec![
        Span::styled(label, Style::default().fg(palette.muted)),
        Span::styled(value, Style::default().fg(color).bold()),
        Span::raw("   "),
      ]
    };
    let overdue_color = if summary.overdue > 0 { palette.danger } else { palette.text };
    let fines_color = if summary.total_fines > 0.0 { palette.danger } else { palette.success };
    let stats: Vec<Span> = [
      stat("Borrowed ", summary.borrowed.to_string(), palette.text),
      stat("Due soon ", summary.due_soon.to_string(), palette.warning),
      stat("Overdue ", summary.overdue.to_string(), overdue_color),
      stat("Fines ", money(summary.total_fines), fines_color),
    ]
    .concat();

    let lines = vec![
      Line::from(Span::styled(hello, Style::default().fg(palette.accent).bold())),
      Line::from(stats),
    ];
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(palette.block())
      .title(" Dashboard ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn pane_block(&self, pane: Pane, title: String, palette: &Palette) -> Block<'static> {
    let border = if self.focus == pane { palette.accent } else { palette.border };
    Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border))
  }

  fn render_borrows(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let entry = self.borrows.entry();
    let title = format!(
      " Current borrows ({}){} ",
      self.borrows().map_or(0, Vec::len),
      refresh_suffix(entry)
    );
    let block = self.pane_block(Pane::Borrows, title, palette);
    let state = ScreenState::resolve(entry, Vec::is_empty, &self.borrows_seed.options());
    let Some(borrows) = draw_placeholder(
      frame,
      area,
      block.clone(),
      state,
      palette,
      "your loans",
      "No books borrowed. Press ':' and pick 'books' to browse.",
    ) else {
      return;
    };

    let now = Local::now();
    let items: Vec<ListItem> = borrows
      .iter()
      .map(|borrow| {
        let status = due_status(&borrow.due_date, &now);
        let (due_text, due_color) = match status {
          Some(status) => (status.to_string(), palette.due(status)),
          None => ("No due date".to_string(), palette.muted),
        };
        let mut spans = vec![
          Span::raw(format!("{:<36}", truncate(&borrow.title, 36))),
          Span::styled(format!("{:<16}", due_text), Style::default().fg(due_color)),
        ];
        if borrow.return_requested {
          spans.push(Span::styled("return requested", Style::default().fg(palette.muted)));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    let len = items.len();
    ensure_valid_selection(&mut self.borrow_list, len);
    let list = List::new(items)
      .block(block)
      .highlight_style(palette.highlight())
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.borrow_list);
  }

  fn render_overdue(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let entry = self.overdue.entry();
    let title = format!(" Overdue{} ", refresh_suffix(entry));
    let block = self.pane_block(Pane::Overdue, title, palette);
    let state = ScreenState::resolve(
      entry,
      |status: &OverdueStatus| status.items.is_empty(),
      &self.overdue_seed.options(),
    );
    let Some(status) = draw_placeholder(
      frame,
      area,
      block.clone(),
      state,
      palette,
      "overdue items",
      "Nothing overdue. No fines to pay.",
    ) else {
      return;
    };

    let items: Vec<ListItem> = status
      .items
      .iter()
      .map(|item| {
        let fine = item
          .fine_amount
          .filter(|amount| amount.is_finite() && *amount > 0.0)
          .map(money)
          .unwrap_or_else(|| "-".to_string());
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<30}", truncate(&item.title, 30))),
          Span::styled(
            format!("{:<12}", truncate(&item.due_date, 10)),
            Style::default().fg(palette.muted),
          ),
          Span::styled(fine, Style::default().fg(palette.danger)),
        ]))
      })
      .collect();

    let len = items.len();
    ensure_valid_selection(&mut self.overdue_list, len);
    let list = List::new(items)
      .block(block)
      .highlight_style(palette.highlight())
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.overdue_list);
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let list = match self.focus {
      Pane::Borrows => &mut self.borrow_list,
      Pane::Overdue => &mut self.overdue_list,
    };
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => list.select_next(),
      KeyCode::Char('k') | KeyCode::Up => list.select_previous(),
      KeyCode::Tab | KeyCode::BackTab => {
        self.focus = match self.focus {
          Pane::Borrows => Pane::Overdue,
          Pane::Overdue => Pane::Borrows,
        };
      }
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('R') if self.focus == Pane::Borrows => self.request_return(),
      KeyCode::Char('p') if self.focus == Pane::Overdue => self.pay_fine(),
      KeyCode::Enter if self.focus == Pane::Borrows => {
        let barcode = self.selected_borrow().and_then(|b| b.barcode.clone());
        if let Some(barcode) = barcode {
          return ViewAction::Push(Box::new(BookDetailView::new(self.library.clone(), barcode)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(4), // Greeting and totals
        Constraint::Min(3),    // Loans
        Constraint::Length(1), // Notice
      ])
      .split(area);
    let panes = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
      .split(chunks[1]);

    self.render_summary(frame, chunks[0], palette);
    self.render_borrows(frame, panes[0], palette);
    self.render_overdue(frame, panes[1], palette);

    if let Some(notice) = &self.notice {
      let color = match self.action.state() {
        MutationState::Error(_) => palette.danger,
        _ => palette.prompt,
      };
      frame.render_widget(
        Paragraph::new(format!(" {}", notice)).style(Style::default().fg(color)),
        chunks[2],
      );
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) {
    self.profile.poll();
    self.borrows.poll();
    self.overdue.poll();

    if self.action.poll() {
      self.notice = match self.action.state() {
        MutationState::Success(response) => Some(
          response
            .message
            .clone()
            .unwrap_or_else(|| "Done".to_string()),
        ),
        MutationState::Error(error) => Some(error.to_string()),
        _ => None,
      };
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("tab", "switch").with_priority(20),
      ShortcutInfo::new("R", "return").with_priority(30),
      ShortcutInfo::new("p", "pay fine").with_priority(31),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::OverdueItem;
  use crate::session::Session;
  use crate::ui::views::testing::{offline_library, render, render_until};

  fn borrow(title: &str) -> Borrow {
    Borrow {
      id: "br-1".to_string(),
      book_id: "7".to_string(),
      barcode: Some("LIB-00124".to_string()),
      title: title.to_string(),
      author: None,
      borrowed_at: None,
      due_date: "2099-01-01".to_string(),
      return_requested: false,
    }
  }

  fn overdue_item(title: &str, fine: f64) -> OverdueItem {
    OverdueItem {
      borrow_id: "br-2".to_string(),
      fine_id: Some("fine-1".to_string()),
      title: title.to_string(),
      due_date: "2020-01-01".to_string(),
      fine_amount: Some(fine),
    }
  }

  #[tokio::test]
  async fn test_renders_loading() {
    let library = offline_library(Session::in_memory());
    let mut view = DashboardView::seeded(library, ScreenSeed::loading(), ScreenSeed::loading());

    let screen = render(&mut view);
    assert!(screen.contains("Loading your loans..."));
    assert!(screen.contains("Loading overdue items..."));
  }

  #[tokio::test]
  async fn test_renders_seeded_content() {
    let library = offline_library(Session::in_memory());
    let overdue = OverdueStatus {
      items: vec![overdue_item("Neuromancer", 2.5)],
      total_fine: Some(2.5),
    };
    let mut view = DashboardView::seeded(
      library,
      ScreenSeed::with_initial_data(vec![borrow("Dune")]),
      ScreenSeed::with_initial_data(overdue),
    );

    let screen = render(&mut view);
    assert!(screen.contains("Current borrows (1)"));
    assert!(screen.contains("Dune"));
    assert!(screen.contains("Neuromancer"));
    assert!(screen.contains("Borrowed 1"));
    assert!(!screen.contains("Loading"));
  }

  #[tokio::test]
  async fn test_renders_empty_hints() {
    let library = offline_library(Session::in_memory());
    let mut view = DashboardView::seeded(
      library,
      ScreenSeed::with_initial_data(Vec::new()),
      ScreenSeed::with_initial_data(OverdueStatus::default()),
    );

    let screen = render(&mut view);
    assert!(screen.contains("No books borrowed."));
    assert!(screen.contains("Nothing overdue. No fines to pay."));
  }

  #[tokio::test]
  async fn test_renders_error_with_retry_hint() {
    let mut view = DashboardView::new(offline_library(Session::in_memory()));

    let screen = render_until(&mut view, "Press 'r' to retry.").await;
    assert!(screen.contains("Press 'r' to retry."));
    assert!(!screen.contains("--token"));
  }

  #[tokio::test]
  async fn test_seeded_borrow_opens_detail() {
    let library = offline_library(Session::in_memory());
    let mut view = DashboardView::seeded(
      library,
      ScreenSeed::with_initial_data(vec![borrow("Dune")]),
      ScreenSeed::default(),
    );
    render(&mut view);

    let action = view.handle_key(KeyEvent::from(KeyCode::Enter));
    let ViewAction::Push(detail) = action else {
      panic!("expected the book detail to open");
    };
    assert_eq!(detail.breadcrumb_label(), "LIB-00124");
  }
}
