//! Deduplication of concurrent fetches for the same key.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use tracing::debug;

use super::lock;

/// Runs at most one fetch per key at a time.
///
/// A caller asking for a key that is already being fetched awaits the
/// running fetch and receives a clone of its output instead of starting a
/// second request.
pub struct SingleFlight<K, V> {
  inflight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
  fn default() -> Self {
    Self {
      inflight: Mutex::new(HashMap::new()),
    }
  }
}

impl<K, V> SingleFlight<K, V>
where
  K: Eq + Hash + Clone + Debug + Send,
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Await the fetch for `key`, starting it with `fetch` if none is running.
  pub async fn run<F, Fut>(&self, key: K, fetch: F) -> V
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = V> + Send + 'static,
  {
    let shared = {
      let mut inflight = lock(&self.inflight);
      match inflight.get(&key) {
        Some(running) => {
          debug!(?key, "Joining in-flight fetch");
          running.clone()
        }
        None => {
          let started = fetch().boxed().shared();
          inflight.insert(key.clone(), started.clone());
          started
        }
      }
    };

    let value = shared.clone().await;

    // Whoever finishes first clears the entry; a newer fetch under the same
    // key is left alone.
    let mut inflight = lock(&self.inflight);
    if inflight
      .get(&key)
      .is_some_and(|running| running.ptr_eq(&shared))
    {
      inflight.remove(&key);
    }

    value
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn counted(counter: &Arc<AtomicU32>, value: u32) -> impl Future<Output = u32> + Send + 'static {
    let counter = counter.clone();
    async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      counter.fetch_add(1, Ordering::SeqCst);
      value
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_callers_share_one_fetch() {
    let flight = SingleFlight::<&str, u32>::new();
    let counter = Arc::new(AtomicU32::new(0));

    let (a, b) = tokio::join!(
      flight.run("k", || counted(&counter, 1)),
      flight.run("k", || counted(&counter, 2)),
    );

    assert_eq!((a, b), (1, 1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(lock(&flight.inflight).is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_different_keys_fetch_independently() {
    let flight = SingleFlight::<&str, u32>::new();
    let counter = Arc::new(AtomicU32::new(0));

    let (a, b) = tokio::join!(
      flight.run("a", || counted(&counter, 1)),
      flight.run("b", || counted(&counter, 2)),
    );

    assert_eq!((a, b), (1, 2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sequential_calls_fetch_again() {
    let flight = SingleFlight::<&str, u32>::new();
    let counter = Arc::new(AtomicU32::new(0));

    assert_eq!(flight.run("k", || counted(&counter, 1)).await, 1);
    assert_eq!(flight.run("k", || counted(&counter, 2)).await, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }
}
