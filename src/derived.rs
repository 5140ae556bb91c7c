//! View-ready aggregates computed from cached resources.
//!
//! Everything here is a pure function of its inputs. "Now" is always a
//! parameter so the results are reproducible in tests.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::sync::Arc;

use crate::api::types::{Borrow, OverdueItem, OverdueStatus};

/// A parsed due date. Plain dates carry no zone; instants are moved into
/// the caller's zone before comparing calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDate {
  Date(NaiveDate),
  Instant(DateTime<Utc>),
}

impl DueDate {
  pub fn local_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
    match self {
      Self::Date(date) => *date,
      Self::Instant(ts) => ts.with_timezone(tz).date_naive(),
    }
  }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_due_date(raw: &str) -> Option<DueDate> {
  let raw = raw.trim();
  if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return Some(DueDate::Date(date));
  }
  DateTime::parse_from_rfc3339(raw)
    .ok()
    .map(|ts| DueDate::Instant(ts.with_timezone(&Utc)))
}

/// Whole days from `today` until `due`; negative when overdue.
///
/// Both sides are calendar dates (midnight), so there is no partial-day
/// drift.
pub fn days_left(due: NaiveDate, today: NaiveDate) -> i64 {
  (due - today).num_days()
}

/// `days_left` for a raw due date string, using `now`'s zone for "today".
/// Returns `None` when the date does not parse.
pub fn days_left_from<Tz: TimeZone>(due: &str, now: &DateTime<Tz>) -> Option<i64> {
  let tz = now.timezone();
  let due = parse_due_date(due)?.local_date(&tz);
  Some(days_left(due, now.date_naive()))
}

/// Due state of a loan, for labels and colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
  Overdue(u32),
  DueToday,
  DueIn(u32),
}

impl DueStatus {
  pub fn from_days_left(days: i64) -> Self {
    let clamp = |d: i64| u32::try_from(d).unwrap_or(u32::MAX);
    match days {
      d if d < 0 => Self::Overdue(clamp(-d)),
      0 => Self::DueToday,
      d => Self::DueIn(clamp(d)),
    }
  }

  pub fn is_overdue(&self) -> bool {
    matches!(self, Self::Overdue(_))
  }
}

impl fmt::Display for DueStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Overdue(1) => f.write_str("1 day overdue"),
      Self::Overdue(n) => write!(f, "{} days overdue", n),
      Self::DueToday => f.write_str("Due today"),
      Self::DueIn(1) => f.write_str("1 day left"),
      Self::DueIn(n) => write!(f, "{} days left", n),
    }
  }
}

pub fn due_status<Tz: TimeZone>(due: &str, now: &DateTime<Tz>) -> Option<DueStatus> {
  days_left_from(due, now).map(DueStatus::from_days_left)
}

/// Sum of fine amounts. Missing, non-finite and negative amounts count as
/// zero.
pub fn total_fines(items: &[OverdueItem]) -> f64 {
  items
    .iter()
    .filter_map(|item| item.fine_amount)
    .filter(|amount| amount.is_finite() && *amount > 0.0)
    .sum()
}

/// Display bucket for a raw availability label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
  Available,
  CheckedOut,
  OnHold,
}

/// Classified availability that keeps the server's label for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityBadge {
  pub kind: Availability,
  pub label: String,
}

/// Case-insensitive substring classification; unmatched labels are shown
/// as on hold.
pub fn classify_availability(status: &str) -> AvailabilityBadge {
  let lower = status.to_lowercase();
  let kind = if lower.contains("checked") {
    Availability::CheckedOut
  } else if lower.contains("available") && !lower.contains("unavailable") {
    Availability::Available
  } else {
    Availability::OnHold
  };
  AvailabilityBadge {
    kind,
    label: status.trim().to_string(),
  }
}

/// Time-of-day greeting band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
  Morning,
  Afternoon,
  Evening,
}

impl Greeting {
  pub fn text(&self) -> &'static str {
    match self {
      Self::Morning => "Good morning",
      Self::Afternoon => "Good afternoon",
      Self::Evening => "Good evening",
    }
  }
}

pub fn greeting(hour: u32) -> Greeting {
  match hour {
    h if h < 12 => Greeting::Morning,
    12..=16 => Greeting::Afternoon,
    _ => Greeting::Evening,
  }
}

pub fn greeting_at<Tz: TimeZone>(now: &DateTime<Tz>) -> Greeting {
  greeting(now.hour())
}

/// Dashboard aggregates over current and overdue loans
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
  pub borrowed: usize,
  pub due_soon: usize,
  pub overdue: usize,
  pub total_fines: f64,
}

/// Loans due within this many days count as "due soon"
pub const DUE_SOON_DAYS: i64 = 3;

pub fn summarize<Tz: TimeZone>(
  borrows: &[Borrow],
  overdue: Option<&OverdueStatus>,
  now: &DateTime<Tz>,
) -> DashboardSummary {
  let days: Vec<i64> = borrows
    .iter()
    .filter_map(|b| days_left_from(&b.due_date, now))
    .collect();
  let overdue_items = overdue.map(|o| o.items.as_slice()).unwrap_or_default();

  DashboardSummary {
    borrowed: borrows.len(),
    due_soon: days
      .iter()
      .filter(|d| (0..=DUE_SOON_DAYS).contains(*d))
      .count(),
    overdue: overdue_items
      .len()
      .max(days.iter().filter(|d| **d < 0).count()),
    total_fines: total_fines(overdue_items),
  }
}

/// Pointer-identity key for `Arc` inputs: two keys are equal only when
/// they point at the same allocation.
#[derive(Debug)]
pub struct ArcKey<T>(pub Arc<T>);

impl<T> Clone for ArcKey<T> {
  fn clone(&self) -> Self {
    Self(Arc::clone(&self.0))
  }
}

impl<T> PartialEq for ArcKey<T> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

/// Single-slot memo: recomputes only when the input key changes.
#[derive(Debug)]
pub struct Memo<I, O> {
  last: Option<(I, O)>,
}

impl<I: PartialEq, O> Memo<I, O> {
  pub fn new() -> Self {
    Self { last: None }
  }

  pub fn get(&mut self, input: I, compute: impl FnOnce(&I) -> O) -> &O {
    if matches!(&self.last, Some((last, _)) if *last != input) {
      self.last = None;
    }
    let (_, output) = self.last.get_or_insert_with(|| {
      let output = compute(&input);
      (input, output)
    });
    output
  }

  pub fn clear(&mut self) {
    self.last = None;
  }
}

impl<I: PartialEq, O> Default for Memo<I, O> {
  fn default() -> Self {
    Self::new()
  }
}
