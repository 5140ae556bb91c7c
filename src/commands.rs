/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Loans, due dates and fines",
  },
  Command {
    name: "books",
    aliases: &["b", "browse", "catalog"],
    description: "Browse available books",
  },
  Command {
    name: "profile",
    aliases: &["p", "me", "account"],
    description: "Your profile and password",
  },
  Command {
    name: "theme",
    aliases: &["t"],
    description: "Toggle dark/light theme",
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Sign out and exit",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit libterm",
  },
];

/// Get autocomplete suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();

  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_priority(cmd, &input).map(|p| (cmd, p)))
    .collect();

  // Stable, so equal priorities keep declaration order
  matches.sort_by_key(|(_, priority)| *priority);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

fn match_priority(cmd: &Command, input: &str) -> Option<u8> {
  let aliases = cmd.aliases.iter();
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if aliases.clone().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if aliases.clone().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    assert_eq!(get_suggestions("books")[0].name, "books");
  }

  #[test]
  fn test_alias_beats_prefix() {
    assert_eq!(get_suggestions("p")[0].name, "profile");
    assert_eq!(get_suggestions("me")[0].name, "profile");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("dash")[0].name, "dashboard");
    assert_eq!(get_suggestions("LOG")[0].name, "logout");
  }

  #[test]
  fn test_fuzzy_match() {
    assert_eq!(get_suggestions("board")[0].name, "dashboard");
    assert_eq!(get_suggestions("alog")[0].name, "books");
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }
}
