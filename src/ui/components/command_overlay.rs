use crate::commands::Command;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

/// Commands listed below the input line at most
const MAX_SUGGESTIONS: usize = 6;

/// Draw the command prompt with autocomplete suggestions
pub fn draw_command_overlay(
  frame: &mut Frame,
  area: Rect,
  prefix: &str,
  input: &str,
  suggestions: &[&Command],
  selected_suggestion: usize,
) {
  let shown = suggestions.len().min(MAX_SUGGESTIONS);
  let width = (area.width * 60 / 100).clamp(30, 64).min(area.width);
  let height = (3 + shown as u16).min(area.height);

  // Anchored to the top-left corner of the content area
  let overlay_area = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);
  frame.render_widget(Clear, overlay_area);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow))
    .title(" Command ");
  let inner = block.inner(overlay_area);
  frame.render_widget(block, overlay_area);

  if inner.height == 0 {
    return;
  }

  let [input_area, list_area] = Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

  let input_line = Line::from(vec![
    Span::styled(prefix, Style::default().fg(Color::Yellow)),
    Span::raw(input),
    Span::styled("_", Style::default().fg(Color::Yellow)),
  ]);
  frame.render_widget(Paragraph::new(input_line), input_area);

  if shown == 0 || list_area.height == 0 {
    return;
  }

  let items: Vec<ListItem> = suggestions
    .iter()
    .take(shown)
    .map(|cmd| {
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<10}", cmd.name), Style::default().fg(Color::Cyan)),
        Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
      ]))
    })
    .collect();

  let list = List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

  let mut state = ListState::default();
  state.select(Some(selected_suggestion.min(shown - 1)));

  frame.render_stateful_widget(list, list_area, &mut state);
}
