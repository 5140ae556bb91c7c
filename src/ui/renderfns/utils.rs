use ratatui::prelude::*;

/// Truncate to at most `max_len` chars, ending with "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format a fine amount
pub fn money(amount: f64) -> String {
  format!("${:.2}", amount)
}

/// A `width` percent wide, `height` rows tall rect centered in `area`
pub fn centered_rect(area: Rect, width_percent: u16, height: u16) -> Rect {
  let width = (area.width * width_percent / 100).max(20).min(area.width);
  let height = height.min(area.height);
  Rect::new(
    area.x + (area.width - width) / 2,
    area.y + (area.height - height) / 2,
    width,
    height,
  )
}

/// Scheme and path stripped from a URL, for display
pub fn host_of(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}
