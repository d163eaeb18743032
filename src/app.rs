use crate::commands::{self, Command};
use crate::event::{Event, EventHandler};
use crate::ui;
use aurora_cache::cache::{Page, RecordPageCache, Row, Snapshot, TreeCache};
use aurora_cache::config::Config;
use aurora_cache::remote::{HttpSource, RemoteSource, Status};
use chrono::{DateTime, Utc};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
}

/// View state - each variant owns its data
#[derive(Debug)]
pub enum ViewState {
  Tree {
    snapshot: Arc<Snapshot>,
    selected: usize,
    loading: bool,
  },
  Datasets {
    page: Page,
    offset: u64,
    selected: usize,
    loading: bool,
  },
}

impl ViewState {
  fn tree() -> Self {
    ViewState::Tree {
      snapshot: Arc::new(Snapshot::default()),
      selected: 0,
      loading: true,
    }
  }

  fn datasets() -> Self {
    ViewState::Datasets {
      page: Page::default(),
      offset: 1,
      selected: 0,
      loading: true,
    }
  }

  /// Label shown in the header for this view
  pub fn label(&self) -> &'static str {
    match self {
      ViewState::Tree { .. } => "Tree",
      ViewState::Datasets { .. } => "Datasets",
    }
  }
}

/// Main application state
pub struct App {
  view: ViewState,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  /// Last error reported by the server or a background task
  status: Option<String>,

  /// Application configuration
  config: Config,

  tree: Arc<TreeCache<HttpSource>>,
  pages: Arc<RecordPageCache<HttpSource>>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let source = Arc::new(HttpSource::new(&config.server)?);

    let tree = TreeCache::new(source.clone())
      .with_capacity(config.tree.capacity)
      .with_ttl(Duration::from_secs(config.tree.ttl_secs))
      .with_exclude(config.tree.exclude.clone())
      .with_params(config.tree.params.clone());

    let pages = RecordPageCache::new(source)
      .with_capacity(config.datasets.capacity)
      .with_order(config.datasets.order)
      .with_sort_by(config.datasets.sortby.clone())
      .with_sort_type(config.datasets.sorttype);

    let (tx, _rx) = mpsc::unbounded_channel();

    Ok(Self {
      view: ViewState::tree(),
      mode: Mode::Normal,
      command_input: String::new(),
      selected_suggestion: 0,
      status: None,
      config,
      tree: Arc::new(tree),
      pages: Arc::new(pages),
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    // Initial data load
    self.load_tree();

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.poll_timeout(),
      Event::Tree(snapshot) => self.show_tree(snapshot),
      Event::Page(page) => self.show_page(page),
      Event::Error(msg) => {
        warn!(error = %msg, "Background task failed");
        self.status = Some(msg);
      }
    }
  }

  /// Refresh the tree in the background once its data has outlived the TTL.
  fn poll_timeout(&mut self) {
    if let ViewState::Tree { loading, .. } = &mut self.view {
      if !*loading && self.tree.is_timeout() {
        debug!("Tree cache timed out, refreshing");
        *loading = true;
        self.spawn_tree(|tree| async move { tree.get().await });
      }
    }
  }

  fn show_tree(&mut self, new: Arc<Snapshot>) {
    if let ViewState::Tree {
      snapshot,
      selected,
      loading,
    } = &mut self.view
    {
      *snapshot = new;
      *loading = false;
      let rows = snapshot.visible_rows().len();
      *selected = (*selected).min(rows.saturating_sub(1));
    }
  }

  fn show_page(&mut self, new: Page) {
    self.status = failure_message("Dataset listing", &new.status);

    if let ViewState::Datasets {
      page,
      selected,
      loading,
      ..
    } = &mut self.view
    {
      *selected = (*selected).min(new.records.len().saturating_sub(1));
      *page = new;
      *loading = false;
    }
  }

  /// Run a tree operation in the background and report the snapshot it yields.
  fn spawn_tree<F, Fut>(&self, op: F)
  where
    F: FnOnce(Arc<TreeCache<HttpSource>>) -> Fut,
    Fut: std::future::Future<Output = Arc<Snapshot>> + Send + 'static,
  {
    let tx = self.event_tx.clone();
    let tree = self.tree.clone();
    let fut = op(tree.clone());
    tokio::spawn(async move {
      let snapshot = fut.await;
      report_tree_failure(&tree, &tx);
      let _ = tx.send(Event::Tree(snapshot));
    });
  }

  fn load_tree(&self) {
    self.spawn_tree(|tree| async move { tree.get().await });
  }

  fn load_page(&mut self) {
    if let ViewState::Datasets {
      offset, loading, ..
    } = &mut self.view
    {
      *loading = true;
      let offset = *offset;
      let count = self.config.datasets.page_size;
      let pages = self.pages.clone();
      let tx = self.event_tx.clone();

      tokio::spawn(async move {
        let page = pages.page(offset, count).await;
        let _ = tx.send(Event::Page(page));
      });
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }

      KeyCode::Esc => self.status = None,

      _ => match self.view {
        ViewState::Tree { .. } => self.handle_tree_key(key),
        ViewState::Datasets { .. } => self.handle_datasets_key(key),
      },
    }
  }

  fn handle_tree_key(&mut self, key: KeyEvent) {
    let Some(row) = self.selected_row() else {
      return;
    };

    match key.code {
      KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
        self.set_tree_loading();
        self.spawn_tree(move |tree| async move { tree.expand(row.id).await });
      }
      KeyCode::Left | KeyCode::Char('h') => {
        let snapshot = self.tree.collapse(row.id);
        self.show_tree(snapshot);
      }
      // Refresh the branches holding the selected node
      KeyCode::Char('r') => {
        self.set_tree_loading();
        self.spawn_tree(move |tree| async move { tree.refresh(Some(&[row.id])).await });
      }
      KeyCode::Char('R') => {
        self.set_tree_loading();
        self.spawn_tree(|tree| async move { tree.refresh(None).await });
      }
      KeyCode::Char('u') => {
        self.set_tree_loading();
        let tree = self.tree.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
          if tree.update(row.id).await {
            report_tree_failure(&tree, &tx);
          } else {
            debug!(id = row.id, "Not a tracked branch, nothing to update");
            let _ = tx.send(Event::Error(format!(
              "Node {} is not a tracked branch",
              row.id
            )));
          }
          let _ = tx.send(Event::Tree(tree.tree()));
        });
      }
      _ => {}
    }
  }

  fn handle_datasets_key(&mut self, key: KeyEvent) {
    let page_size = self.config.datasets.page_size.max(1);

    let ViewState::Datasets {
      page,
      offset,
      selected,
      ..
    } = &mut self.view
    else {
      return;
    };

    match key.code {
      KeyCode::Char('n') | KeyCode::PageDown | KeyCode::Right => {
        if page.total == 0 || *offset + page_size <= page.total {
          *offset += page_size;
          *selected = 0;
          self.load_page();
        }
      }
      KeyCode::Char('b') | KeyCode::PageUp | KeyCode::Left => {
        if *offset > 1 {
          *offset = offset.saturating_sub(page_size).max(1);
          *selected = 0;
          self.load_page();
        }
      }
      KeyCode::Char('r') => self.load_page(),
      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        // Navigate autocomplete suggestions
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = (self.selected_suggestion + 1) % suggestions.len();
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        // Navigate autocomplete suggestions backwards
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = if self.selected_suggestion == 0 {
            suggestions.len() - 1
          } else {
            self.selected_suggestion - 1
          };
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0; // Reset selection on input change
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0; // Reset selection on input change
      }
      _ => {}
    }
  }

  fn execute_command(&mut self) {
    let input = std::mem::take(&mut self.command_input);
    let (word, arg) = commands::split(&input);

    // Resolve the command word through the selected suggestion
    let suggestions = commands::get_suggestions(word);
    let cmd = match suggestions.get(self.selected_suggestion) {
      Some(cmd) => cmd.name.to_string(),
      None => word.to_lowercase(),
    };

    match (cmd.as_str(), arg) {
      ("tree", _) => {
        self.view = ViewState::tree();
        self.spawn_tree(|tree| async move { tree.get().await });
      }
      ("datasets", _) => {
        self.view = ViewState::datasets();
        self.load_page();
      }
      ("refresh", _) => match self.view {
        ViewState::Tree { .. } => {
          self.set_tree_loading();
          self.spawn_tree(|tree| async move { tree.refresh(None).await });
        }
        ViewState::Datasets { .. } => {
          // Any setter drops the window, so the page is fetched again
          self.pages.set_sort_type(self.pages.sort_type());
          self.load_page();
        }
      },
      ("sort", Some(field)) => {
        self.pages.set_sort_by(field);
        self.reload_datasets();
      }
      ("order", Some(direction)) => {
        self.pages.set_order(direction);
        self.reload_datasets();
      }
      ("sort", None) | ("order", None) => {
        self.status = Some(format!("Usage: {} <value>", cmd));
      }
      ("quit", _) => {
        self.should_quit = true;
      }
      _ => {
        self.status = Some(format!("Unknown command: {}", word));
      }
    }
  }

  /// Back to the first page of datasets after a sort change.
  fn reload_datasets(&mut self) {
    if let ViewState::Datasets { .. } = self.view {
      self.view = ViewState::datasets();
      self.load_page();
    }
  }

  fn set_tree_loading(&mut self) {
    if let ViewState::Tree { loading, .. } = &mut self.view {
      *loading = true;
    }
  }

  fn selected_row(&self) -> Option<Row> {
    match &self.view {
      ViewState::Tree {
        snapshot, selected, ..
      } => snapshot.visible_rows().into_iter().nth(*selected),
      ViewState::Datasets { .. } => None,
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let (len, selected) = match &mut self.view {
      ViewState::Tree {
        snapshot, selected, ..
      } => (snapshot.visible_rows().len(), selected),
      ViewState::Datasets { page, selected, .. } => (page.records.len(), selected),
    };
    if len > 0 {
      *selected = (*selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> &ViewState {
    &self.view
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn server_url(&self) -> &str {
    &self.config.server.url
  }

  pub fn title(&self) -> Option<&str> {
    self.config.title.as_deref()
  }

  pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
    self.tree.last_refresh()
  }

  /// Sort field and direction of the dataset listing
  pub fn dataset_sort(&self) -> (String, String) {
    (self.pages.sort_by(), self.pages.order().to_string())
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.command_input)
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}

/// Status bar text for a failed remote call, `None` when it succeeded.
fn failure_message(what: &str, status: &Status) -> Option<String> {
  (!status.is_ok()).then(|| format!("{} failed ({}): {}", what, status.err, status.errstr))
}

fn report_tree_failure<S: RemoteSource>(
  tree: &TreeCache<S>,
  tx: &mpsc::UnboundedSender<Event>,
) {
  if let Some(msg) = tree
    .last_status()
    .and_then(|status| failure_message("Tree refresh", &status))
  {
    let _ = tx.send(Event::Error(msg));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use aurora_cache::remote::Params;
  use color_eyre::eyre::eyre;
  use serde_json::Value;

  struct Unreachable;

  #[async_trait]
  impl RemoteSource for Unreachable {
    async fn call(&self, _method: &str, _params: &Params) -> Result<Value> {
      Err(eyre!("connection refused"))
    }
  }

  #[test]
  fn test_failure_message_only_for_errors() {
    assert_eq!(failure_message("Tree refresh", &Status::ok()), None);

    let status = Status {
      err: 500,
      errstr: "server unavailable".to_string(),
    };
    assert_eq!(
      failure_message("Dataset listing", &status).as_deref(),
      Some("Dataset listing failed (500): server unavailable")
    );
  }

  #[tokio::test]
  async fn test_tree_failure_is_reported_as_error_event() {
    let tree = TreeCache::new(Arc::new(Unreachable));
    let (tx, mut rx) = mpsc::unbounded_channel();

    report_tree_failure(&tree, &tx);
    assert!(rx.try_recv().is_err());

    tree.get().await;
    report_tree_failure(&tree, &tx);

    match rx.try_recv() {
      Ok(Event::Error(msg)) => assert!(msg.starts_with("Tree refresh failed (1)")),
      Ok(_) => panic!("expected an error event"),
      Err(e) => panic!("no event sent: {:?}", e),
    }
  }
}
