mod components;
mod renderfns;
mod views;

use crate::app::{App, Mode, ViewState};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let view = app.current_view();
  renderfns::draw_header(
    frame,
    chunks[0],
    app.server_url(),
    app.title(),
    view.label(),
    app.last_refresh(),
  );

  // Draw current view
  match view {
    ViewState::Tree {
      snapshot,
      selected,
      loading,
    } => {
      views::tree::draw_tree(frame, chunks[1], snapshot, *selected, *loading);
    }
    ViewState::Datasets {
      page,
      offset,
      selected,
      loading,
    } => {
      let (sortby, order) = app.dataset_sort();
      views::datasets::draw_datasets(
        frame,
        chunks[1],
        page,
        *offset,
        *selected,
        &sortby,
        &order,
        *loading,
      );
    }
  }

  // Draw status bar
  draw_status_bar(frame, chunks[2], app);

  if *app.mode() == Mode::Command {
    components::draw_command_overlay(
      frame,
      chunks[1],
      ":",
      app.command_input(),
      &app.autocomplete_suggestions(),
      app.selected_suggestion(),
    );
  }
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match (app.mode(), app.status()) {
    (Mode::Command, _) => {
      let cmd = format!(":{}", app.command_input());
      (cmd, Style::default().fg(Color::Yellow))
    }
    (Mode::Normal, Some(status)) => (format!(" {}", status), Style::default().fg(Color::Red)),
    (Mode::Normal, None) => {
      let hint = match app.current_view() {
        ViewState::Tree { .. } => {
          " :command  j/k:nav  l/Enter:expand  h:collapse  r/R:refresh  u:update  q:quit"
        }
        ViewState::Datasets { .. } => " :command  j/k:nav  n/b:page  r:reload  q:quit",
      };
      (hint.to_string(), Style::default().fg(Color::DarkGray))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
