use ratatui::prelude::Color;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for an entity type
pub fn kind_color(kind: &str) -> Color {
  match kind.to_ascii_uppercase().as_str() {
    "GROUP" => Color::Cyan,
    "DATASET" => Color::Green,
    "USER" => Color::Yellow,
    "COMPUTER" | "STORE" => Color::Magenta,
    _ => Color::White,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Grüße aus Bergen", 8), "Grüße...");
  }

  #[test]
  fn test_kind_color() {
    assert_eq!(kind_color("GROUP"), Color::Cyan);
    assert_eq!(kind_color("dataset"), Color::Green);
    assert_eq!(kind_color("USER"), Color::Yellow);
    assert_eq!(kind_color("TASK"), Color::White);
  }
}
