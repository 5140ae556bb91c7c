use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::api::types::{ActionResponse, PasswordChange, Profile, ProfileUpdate};
use crate::api::FormError;
use crate::library::{Library, LibraryQuery};
use crate::query::{Mutation, MutationState};
use crate::screen::{ScreenSeed, ScreenState};
use crate::ui::components::{Form, FormEvent, KeyResult};
use crate::ui::renderfns::{draw_placeholder, refresh_suffix};
use crate::ui::theme::Palette;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

enum Editor {
  Profile(Form),
  Password(Form),
}

impl Editor {
  fn form_mut(&mut self) -> &mut Form {
    match self {
      Self::Profile(form) | Self::Password(form) => form,
    }
  }
}

pub struct ProfileView {
  library: Library,
  profile: LibraryQuery<Profile>,
  seed: ScreenSeed<Profile>,
  editor: Option<Editor>,
  save: Mutation<Profile, FormError>,
  password: Mutation<ActionResponse, FormError>,
  notice: Option<String>,
}

impl ProfileView {
  pub fn new(library: Library) -> Self {
    Self::seeded(library, ScreenSeed::default())
  }

  pub fn seeded(library: Library, seed: ScreenSeed<Profile>) -> Self {
    let mut profile = library.profile();
    profile.fetch();
    Self {
      library,
      profile,
      seed,
      editor: None,
      save: Mutation::new(),
      password: Mutation::new(),
      notice: None,
    }
  }

  fn edit_profile(&mut self) {
    let Some(profile) = self.profile.data().or(self.seed.initial_data()) else {
      return;
    };
    let form = Form::new(" Edit profile ")
      .field("fullName", "Full name", &profile.full_name)
      .field("phone", "Phone", profile.phone.as_deref().unwrap_or_default());
    self.editor = Some(Editor::Profile(form));
  }

  fn change_password(&mut self) {
    let form = Form::new(" Change password ")
      .secret("currentPassword", "Current password")
      .secret("newPassword", "New password")
      .secret("confirmPassword", "Confirm new password");
    self.editor = Some(Editor::Password(form));
  }

  fn submit(&mut self) {
    match &mut self.editor {
      Some(Editor::Profile(form)) => {
        let phone = form.value("phone").trim();
        let update = ProfileUpdate {
          full_name: form.value("fullName").trim().to_string(),
          phone: (!phone.is_empty()).then(|| phone.to_string()),
        };
        if self.save.start(self.library.update_profile(update)) {
          form.set_pending(true);
        }
      }
      Some(Editor::Password(form)) => {
        let change = PasswordChange {
          current_password: form.value("currentPassword").to_string(),
          new_password: form.value("newPassword").to_string(),
          confirm_password: form.value("confirmPassword").to_string(),
        };
        if self.password.start(self.library.change_password(change)) {
          form.set_pending(true);
        }
      }
      None => {}
    }
  }

  fn render_profile(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let entry = self.profile.entry();
    let block = Block::default()
      .title(format!(" Profile{} ", refresh_suffix(entry)))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(palette.block());
    let state = ScreenState::resolve(entry, |_| false, &self.seed.options());
    let Some(profile) = draw_placeholder(frame, area, block.clone(), state, palette, "profile", "")
    else {
      return;
    };

    let row = |label: &'static str, value: Option<&str>| {
      Line::from(vec![
        Span::styled(format!("{:<16}", label), Style::default().fg(palette.muted)),
        Span::raw(value.unwrap_or("-").to_string()),
      ])
    };
    let lines = vec![
      Line::from(Span::styled(
        profile.full_name.clone(),
        Style::default().fg(palette.accent).bold(),
      )),
      Line::default(),
      row("Email", Some(&profile.email)),
      row("Phone", profile.phone.as_deref()),
      row("Student ID", profile.student_id.as_deref()),
      row("Department", profile.department.as_deref()),
      row("Member since", profile.member_since.as_deref()),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }
}

impl View for ProfileView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(editor) = &mut self.editor {
      match editor.form_mut().handle_key(key) {
        KeyResult::Event(FormEvent::Submitted) => self.submit(),
        KeyResult::Event(FormEvent::Cancelled) => self.editor = None,
        KeyResult::Handled | KeyResult::NotHandled => {}
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('e') => self.edit_profile(),
      KeyCode::Char('c') => self.change_password(),
      KeyCode::Char('r') => self.profile.refetch(),
      KeyCode::Char('L') => return ViewAction::Command("logout"),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(3), Constraint::Length(1)])
      .split(area);

    self.render_profile(frame, chunks[0], palette);

    if let Some(notice) = &self.notice {
      frame.render_widget(
        Paragraph::new(format!(" {}", notice)).style(Style::default().fg(palette.success)),
        chunks[1],
      );
    }

    match &self.editor {
      Some(Editor::Profile(form)) | Some(Editor::Password(form)) => {
        form.render(frame, area, palette)
      }
      None => {}
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Profile".to_string()
  }

  fn is_editing(&self) -> bool {
    self.editor.is_some()
  }

  fn tick(&mut self) {
    self.profile.poll();

    if self.save.poll() {
      match self.save.state() {
        MutationState::Success(_) => {
          self.editor = None;
          self.notice = Some("Profile updated".to_string());
        }
        MutationState::Error(error) => {
          if let Some(Editor::Profile(form)) = &mut self.editor {
            form.show_error(error);
          }
        }
        _ => {}
      }
    }

    if self.password.poll() {
      match self.password.state() {
        MutationState::Success(response) => {
          self.editor = None;
          self.notice = Some(
            response
              .message
              .clone()
              .unwrap_or_else(|| "Password changed".to_string()),
          );
        }
        MutationState::Error(error) => {
          if let Some(Editor::Password(form)) = &mut self.editor {
            form.show_error(error);
          }
        }
        _ => {}
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.editor.is_some() {
      return vec![
        ShortcutInfo::new("tab", "next field").with_priority(10),
        ShortcutInfo::new("enter", "submit").with_priority(20),
        ShortcutInfo::new("esc", "cancel").with_priority(30),
      ];
    }
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("e", "edit").with_priority(20),
      ShortcutInfo::new("c", "password").with_priority(21),
      ShortcutInfo::new("L", "logout").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;
  use crate::ui::views::testing::{offline_library, render};

  fn profile() -> Profile {
    Profile {
      id: "u-1".to_string(),
      full_name: "Ada Lovelace".to_string(),
      email: "ada@example.edu".to_string(),
      phone: None,
      student_id: Some("S-1815".to_string()),
      department: None,
      member_since: None,
    }
  }

  #[tokio::test]
  async fn test_renders_seeded_profile() {
    let library = offline_library(Session::in_memory());
    let mut view = ProfileView::seeded(library, ScreenSeed::with_initial_data(profile()));

    let screen = render(&mut view);
    assert!(screen.contains("Ada Lovelace"));
    assert!(screen.contains("S-1815"));
  }

  #[tokio::test]
  async fn test_seeded_profile_is_editable() {
    let library = offline_library(Session::in_memory());
    let mut view = ProfileView::seeded(library, ScreenSeed::with_initial_data(profile()));

    view.handle_key(KeyEvent::from(KeyCode::Char('e')));
    assert!(view.is_editing());
  }
}
