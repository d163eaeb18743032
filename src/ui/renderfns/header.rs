use chrono::{DateTime, Local, Utc};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, server, current view and refresh time
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  server_url: &str,
  title: Option<&str>,
  view: &str,
  last_refresh: Option<DateTime<Utc>>,
) {
  // Configured title wins over the server host
  let context = title.unwrap_or_else(|| extract_domain(server_url));

  let refreshed = match last_refresh {
    Some(at) => format!(
      "refreshed {}",
      at.with_timezone(&Local).format("%H:%M:%S")
    ),
    None => "not refreshed yet".to_string(),
  };

  let header = Line::from(vec![
    Span::styled(" aurora ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", context), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", view),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {}", refreshed), Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Extract host from the server URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
