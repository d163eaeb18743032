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
    name: "tree",
    aliases: &["t", "groups"],
    description: "Browse the entity tree",
  },
  Command {
    name: "datasets",
    aliases: &["d", "ds", "data"],
    description: "Page through datasets",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Refetch the tree or the current page",
  },
  Command {
    name: "sort",
    aliases: &["sortby"],
    description: "Sort datasets by <field>",
  },
  Command {
    name: "order",
    aliases: &["o", "direction"],
    description: "Dataset order: asc or desc",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit aurora-cache",
  },
];

/// Split command input into the command word and its argument, if any.
pub fn split(input: &str) -> (&str, Option<&str>) {
  let input = input.trim();
  match input.split_once(char::is_whitespace) {
    Some((word, arg)) => {
      let arg = arg.trim();
      (word, (!arg.is_empty()).then_some(arg))
    }
    None => (input, None),
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let (word, _) = split(input);
  let input_lower = word.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
