use crate::ui::renderfns::truncate;
use aurora_cache::cache::Page;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use serde_json::Value;

#[allow(clippy::too_many_arguments)]
pub fn draw_datasets(
  frame: &mut Frame,
  area: Rect,
  page: &Page,
  offset: u64,
  selected: usize,
  sortby: &str,
  order: &str,
  loading: bool,
) {
  let range = if page.returned == 0 {
    "empty".to_string()
  } else {
    format!("{}-{} of {}", offset, offset + page.returned - 1, page.total)
  };
  let title = if loading {
    format!(" Datasets [{}] by {} {} (loading...) ", range, sortby, order)
  } else {
    format!(" Datasets [{}] by {} {} ", range, sortby, order)
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if page.records.is_empty() {
    let content = if loading {
      "Fetching datasets..."
    } else if !page.status.is_ok() {
      "Could not load datasets."
    } else {
      "No datasets found."
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = page
    .records
    .iter()
    .enumerate()
    .map(|(i, record)| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:>6}", offset + i as u64),
          Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
          format!("{:<10}", record_id(record)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(truncate(&summary(record), 80)),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}

fn record_id(record: &Value) -> String {
  match record.get("id").or_else(|| record.get("system.dataset.id")) {
    Some(Value::String(id)) => id.clone(),
    Some(id) => id.to_string(),
    None => "-".to_string(),
  }
}

/// Remaining fields as `key=value` pairs
fn summary(record: &Value) -> String {
  match record {
    Value::Object(fields) => fields
      .iter()
      .filter(|(key, _)| key.as_str() != "id")
      .map(|(key, value)| match value {
        Value::String(s) => format!("{}={}", key, s),
        other => format!("{}={}", key, other),
      })
      .collect::<Vec<_>>()
      .join("  "),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_record_id() {
    assert_eq!(record_id(&json!({ "id": 42 })), "42");
    assert_eq!(record_id(&json!({ "system.dataset.id": "7" })), "7");
    assert_eq!(record_id(&json!({ "name": "x" })), "-");
  }

  #[test]
  fn test_summary_skips_id() {
    let record = json!({ "id": 1, "creator": "someone", "size": 10 });
    assert_eq!(summary(&record), "creator=someone  size=10");
  }
}
