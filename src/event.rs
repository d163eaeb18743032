use aurora_cache::cache::{Page, Snapshot};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and TTL polling
  Tick,
  /// A tree operation finished
  Tree(Arc<Snapshot>),
  /// A dataset page arrived
  Page(Page),
  /// A background task failed
  Error(String),
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn terminal event reader
    let input_tx = tx.clone();
    tokio::spawn(async move {
      loop {
        if event::poll(tick_rate).unwrap_or(false) {
          if let Ok(CrosstermEvent::Key(key)) = event::read() {
            if input_tx.send(Event::Key(key)).is_err() {
              break;
            }
          }
        } else if input_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks reporting back to the app
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
