use crate::ui::renderfns::{kind_color, truncate};
use aurora_cache::cache::Snapshot;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_tree(frame: &mut Frame, area: Rect, snapshot: &Snapshot, selected: usize, loading: bool) {
  let title = if loading {
    format!(" Tree ({} nodes, loading...) ", snapshot.len())
  } else {
    format!(" Tree ({} nodes) ", snapshot.len())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let rows = snapshot.visible_rows();
  if rows.is_empty() {
    let content = if loading {
      "Fetching tree..."
    } else {
      "Nothing to show. The server returned no root node."
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = rows
    .iter()
    .filter_map(|row| snapshot.get(row.id).map(|node| (row, node)))
    .map(|(row, node)| {
      let marker = match (row.has_children, row.expanded) {
        (false, _) => "  ",
        (true, true) => "▾ ",
        (true, false) => "▸ ",
      };

      let name_style = if node.is_group() {
        Style::default().add_modifier(Modifier::BOLD)
      } else {
        Style::default()
      };

      let line = Line::from(vec![
        Span::raw("  ".repeat(row.depth)),
        Span::styled(marker, Style::default().fg(Color::DarkGray)),
        Span::styled(truncate(&node.name(), 48), name_style),
        Span::raw(" "),
        Span::styled(
          node.kind.to_lowercase(),
          Style::default().fg(kind_color(&node.kind)),
        ),
        Span::styled(format!(" #{}", node.id), Style::default().fg(Color::DarkGray)),
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
