use crate::event::{Event, EventHandler};
use crate::library::Library;
use crate::query::{Mutation, MutationState};
use crate::session::Theme;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::theme::Palette;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{BookListView, DashboardView, ProfileView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);
const GC_INTERVAL: Duration = Duration::from_secs(30);

/// Main application state
pub struct App {
  library: Library,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command palette, drawn over the current view
  command_input: CommandInput,

  theme: Theme,
  palette: Palette,

  logout: Mutation<(), String>,

  /// One-line message for the footer, cleared on the next key
  status: Option<String>,

  /// Printed after the terminal is restored
  exit_message: Option<String>,

  should_quit: bool,
  last_gc: Instant,
}

impl App {
  pub fn new(library: Library) -> Self {
    let theme = library.session().theme();
    let root: Box<dyn View> = Box::new(DashboardView::new(library.clone()));
    Self {
      library,
      view_stack: vec![root],
      command_input: CommandInput::new(),
      theme,
      palette: Palette::for_theme(theme),
      logout: Mutation::new(),
      status: None,
      exit_message: None,
      should_quit: false,
      last_gc: Instant::now(),
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let result = match Terminal::new(CrosstermBackend::new(stdout())) {
      Ok(mut terminal) => self.event_loop(&mut terminal).await,
      Err(e) => Err(e.into()),
    };

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
  ) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);

    while !self.should_quit() {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }

    Ok(())
  }

  pub fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }

    if self.logout.poll() {
      match self.logout.state() {
        MutationState::Success(()) => {
          self.exit_message = Some("Signed out. The saved session token was removed.".to_string());
          self.should_quit = true;
        }
        MutationState::Error(e) => {
          self.status = Some(format!("Sign out failed: {}", e));
        }
        _ => {}
      }
    }

    if self.last_gc.elapsed() >= GC_INTERVAL {
      let removed = self.library.cache().collect_garbage();
      if removed > 0 {
        debug!(removed, "collected unused cache entries");
      }
      self.last_gc = Instant::now();
    }
  }

  pub fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }
    // Nothing else to do while the session is being torn down
    if self.logout.is_pending() {
      return;
    }
    self.status = None;

    // A view capturing text gets ':' as a character, not the palette
    let editing = self.view_stack.last().is_some_and(|view| view.is_editing());
    if self.command_input.is_active() || !editing {
      let was_active = self.command_input.is_active();
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(name)) => {
          self.execute_command(&name);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled if was_active => return,
        KeyResult::NotHandled => {}
      }
    }

    let Some(view) = self.view_stack.last_mut() else {
      return;
    };
    let action = view.handle_key(key);
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Command(name) => self.execute_command(name),
    }
  }

  fn execute_command(&mut self, name: &str) {
    match name {
      "dashboard" => self.set_root(Box::new(DashboardView::new(self.library.clone()))),
      "books" => self.set_root(Box::new(BookListView::new(self.library.clone()))),
      "profile" => self.set_root(Box::new(ProfileView::new(self.library.clone()))),
      "theme" => self.toggle_theme(),
      "logout" => self.start_logout(),
      "quit" => self.should_quit = true,
      "" => {}
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
  }

  /// Replace the whole stack with a new root view
  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn toggle_theme(&mut self) {
    self.theme = self.theme.toggled();
    self.palette = Palette::for_theme(self.theme);
    if let Err(e) = self.library.session().set_theme(self.theme) {
      warn!(error = %e, "failed to save theme");
    }
    self.status = Some(format!("Theme: {}", self.theme));
  }

  fn start_logout(&mut self) {
    let logout = self.library.logout();
    if self.logout.start(async move { logout.await.map_err(|e| e.to_string()) }) {
      info!("signing out");
    }
  }

  pub fn render_view(&mut self, frame: &mut Frame, area: Rect) {
    let palette = &self.palette;
    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, area, palette);
    }
  }

  pub fn library(&self) -> &Library {
    &self.library
  }

  pub fn palette(&self) -> &Palette {
    &self.palette
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command_input
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|view| view.breadcrumb_label()).collect()
  }

  pub fn status(&self) -> Option<String> {
    if self.logout.is_pending() {
      return Some("Signing out...".to_string());
    }
    self.status.clone()
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  pub fn exit_message(&self) -> Option<&str> {
    self.exit_message.as_deref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;
  use crate::ui::views::testing::offline_library;

  fn press(app: &mut App, code: KeyCode) {
    app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn run_command(app: &mut App, name: &str) {
    press(app, KeyCode::Char(':'));
    for c in name.chars() {
      press(app, KeyCode::Char(c));
    }
    press(app, KeyCode::Enter);
  }

  #[tokio::test]
  async fn test_starts_on_dashboard() {
    let app = App::new(offline_library(Session::in_memory()));
    assert_eq!(app.breadcrumb(), vec!["Dashboard".to_string()]);
    assert!(!app.should_quit());
  }

  #[tokio::test]
  async fn test_command_replaces_root_view() {
    let mut app = App::new(offline_library(Session::in_memory()));

    run_command(&mut app, "books");
    assert_eq!(app.breadcrumb(), vec!["Books".to_string()]);

    run_command(&mut app, "me");
    assert_eq!(app.breadcrumb(), vec!["Profile".to_string()]);
  }

  #[tokio::test]
  async fn test_back_on_root_quits() {
    let mut app = App::new(offline_library(Session::in_memory()));
    press(&mut app, KeyCode::Char('q'));
    assert!(app.should_quit());
  }

  #[tokio::test]
  async fn test_ctrl_c_quits() {
    let mut app = App::new(offline_library(Session::in_memory()));
    app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit());
  }

  #[tokio::test]
  async fn test_theme_command_persists_choice() {
    let session = Session::in_memory();
    let mut app = App::new(offline_library(session.clone()));
    assert_eq!(session.theme(), Theme::Dark);

    run_command(&mut app, "theme");

    assert_eq!(session.theme(), Theme::Light);
    assert_eq!(app.status().as_deref(), Some("Theme: light"));
  }

  #[tokio::test]
  async fn test_unknown_command_reports_status() {
    let mut app = App::new(offline_library(Session::in_memory()));
    run_command(&mut app, "zzz");
    assert_eq!(app.status().as_deref(), Some("Unknown command: zzz"));

    // Cleared by the next key
    press(&mut app, KeyCode::Char('j'));
    assert_eq!(app.status(), None);
  }

  #[tokio::test]
  async fn test_colon_is_text_while_view_is_editing() {
    let mut app = App::new(offline_library(Session::in_memory()));
    run_command(&mut app, "books");

    press(&mut app, KeyCode::Char('/'));
    press(&mut app, KeyCode::Char(':'));
    assert!(!app.command_input().is_active());

    press(&mut app, KeyCode::Esc);
    press(&mut app, KeyCode::Char(':'));
    assert!(app.command_input().is_active());
  }

  #[tokio::test]
  async fn test_logout_clears_token_and_exits() {
    let session = Session::in_memory();
    session.set_token("secret").unwrap();
    let mut app = App::new(offline_library(session.clone()));

    run_command(&mut app, "logout");
    assert_eq!(app.status().as_deref(), Some("Signing out..."));

    for _ in 0..100 {
      app.tick();
      if app.should_quit() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(app.should_quit());
    assert!(app.exit_message().is_some());
    assert_eq!(session.token(), None);
  }
}
