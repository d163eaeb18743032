//! Windowed cache over the paginated dataset listing.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::flight::SingleFlight;
use super::lock;
use crate::remote::{
  Loader, PageReply, Params, RemoteSource, Reply, SortDirection, Status, GET_DATASETS,
};

/// Records held in the window by default.
pub const DEFAULT_WINDOW: u64 = 11000;

/// Field datasets are sorted by unless configured otherwise.
pub const DEFAULT_SORT_BY: &str = "system.dataset.time.expire";

/// Page size used when a caller asks for less than one record.
const DEFAULT_COUNT: u64 = 10;

/// One page of records as handed to callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
  pub status: Status,
  pub records: Vec<Value>,
  /// Number of records in this page.
  pub returned: u64,
  /// Size of the whole filtered collection.
  pub total: u64,
  pub received: Option<Value>,
  pub delivered: Option<Value>,
}

impl Page {
  /// Page carrying only the status of a failed or missing load.
  pub fn failed(status: Status) -> Self {
    Self {
      status,
      ..Default::default()
    }
  }
}

/// Contiguous run of records starting at 1-based position `start`.
#[derive(Debug, Clone, Default)]
struct Window {
  start: u64,
  total: u64,
  records: Vec<Value>,
  received: Option<Value>,
  delivered: Option<Value>,
}

impl Window {
  /// One past the last position held.
  fn end(&self) -> u64 {
    self.start.saturating_add(self.records.len() as u64)
  }

  fn covers(&self, offset: u64, count: u64) -> bool {
    let end = self.end();
    let more_beyond = end <= self.total;
    !(offset < self.start || (offset.saturating_add(count) > end && more_beyond))
  }

  fn slice(&self, offset: u64, count: u64) -> &[Value] {
    if offset < self.start {
      return &[];
    }
    let from = offset.saturating_sub(self.start) as usize;
    let to = offset
      .saturating_add(count)
      .min(self.end())
      .saturating_sub(self.start) as usize;
    self.records.get(from..to).unwrap_or(&[])
  }
}

/// Identity of a window fetch, for the single-flight guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
  start: u64,
  count: u64,
  order: SortDirection,
  sortby: String,
  sorttype: i64,
  filter: String,
}

struct PageState {
  window: Arc<Window>,
  loaded: bool,
  status: Status,
  capacity: u64,
  order: SortDirection,
  sortby: String,
  sorttype: i64,
  filter: Map<String, Value>,
  generation: u64,
}

impl PageState {
  fn invalidate(&mut self) {
    self.loaded = false;
    self.generation += 1;
  }

  /// Window start placing the requested range in the middle of a
  /// capacity-sized window, kept inside the collection when its size is known.
  fn window_start(&self, offset: u64, count: u64) -> u64 {
    let mut start = offset.saturating_sub((self.capacity - count) / 2);
    if self.window.total > 0 {
      start = start.min(self.window.total.saturating_sub(self.capacity) + 1);
    }
    start.max(1)
  }

  fn params(&self, start: u64) -> Params {
    Params {
      offset: Some(start),
      count: Some(self.capacity),
      sort: Some(self.order),
      sortby: Some(self.sortby.clone()),
      sorttype: Some(self.sorttype),
      metadata: Some(self.filter.clone()),
      ..Default::default()
    }
  }

  fn key(&self, start: u64) -> WindowKey {
    WindowKey {
      start,
      count: self.capacity,
      order: self.order,
      sortby: self.sortby.clone(),
      sorttype: self.sorttype,
      filter: Value::Object(self.filter.clone()).to_string(),
    }
  }

  /// Replace the window with a fetched one starting at `start`.
  fn store(&mut self, start: u64, reply: PageReply) {
    let status = reply.status();
    if !status.is_ok() {
      self.loaded = false;
      self.status = status;
      return;
    }

    self.window = Arc::new(Window {
      start,
      total: reply.total,
      records: reply.datasets.into_values().collect(),
      received: reply.received,
      delivered: reply.delivered,
    });
    self.loaded = true;
    self.status = status;
  }

  fn serve(&self, offset: u64, count: u64) -> Page {
    if !self.loaded {
      return Page::failed(self.status.clone());
    }
    let records = self.window.slice(offset, count).to_vec();
    Page {
      status: self.status.clone(),
      returned: records.len() as u64,
      records,
      total: self.window.total,
      received: self.window.received.clone(),
      delivered: self.window.delivered.clone(),
    }
  }
}

/// Cache of one window of the sorted and filtered dataset listing.
///
/// Pages inside the window are served locally. A page reaching outside it
/// (while the collection continues past the window) reloads a whole window of
/// `capacity` records around the requested offset.
pub struct RecordPageCache<S> {
  loader: Loader<S, PageReply>,
  state: Mutex<PageState>,
  flight: SingleFlight<WindowKey, PageReply>,
}

impl<S: RemoteSource> RecordPageCache<S> {
  pub fn new(source: Arc<S>) -> Self {
    Self {
      loader: Loader::new(GET_DATASETS, source),
      state: Mutex::new(PageState {
        window: Arc::new(Window::default()),
        loaded: false,
        status: Status::ok(),
        capacity: DEFAULT_WINDOW,
        order: SortDirection::Desc,
        sortby: DEFAULT_SORT_BY.to_string(),
        sorttype: 0,
        filter: Map::new(),
        generation: 0,
      }),
      flight: SingleFlight::new(),
    }
  }

  pub fn with_capacity(self, capacity: u64) -> Self {
    self.set_capacity(capacity);
    self
  }

  pub fn with_order(self, order: impl Into<SortDirection>) -> Self {
    self.set_order(order);
    self
  }

  pub fn with_sort_by(self, field: impl Into<String>) -> Self {
    self.set_sort_by(field);
    self
  }

  pub fn with_sort_type(self, kind: i64) -> Self {
    self.set_sort_type(kind);
    self
  }

  fn state(&self) -> MutexGuard<'_, PageState> {
    lock(&self.state)
  }

  /// Return `count` records starting at 1-based `offset`, reloading the
  /// window first if it does not cover them.
  ///
  /// `offset` below 1 is treated as 1; `count` below 1 as 10, and it never
  /// exceeds the capacity. If the cache holds no window the page carries only
  /// the status of the last load.
  pub async fn page(&self, offset: u64, count: u64) -> Page {
    let reload = {
      let mut state = self.state();
      let offset = offset.max(1);
      let count = if count < 1 { DEFAULT_COUNT } else { count };
      let count = count.min(state.capacity);

      if state.loaded && state.window.covers(offset, count) {
        debug!(offset, count, "Serving page from window");
        return state.serve(offset, count);
      }

      let start = state.window_start(offset, count);
      info!(offset, count, start, capacity = state.capacity, "Reloading dataset window");
      state.loaded = false;
      (
        offset,
        count,
        start,
        state.generation,
        state.key(start),
        state.params(start),
      )
    };
    let (offset, count, start, generation, key, params) = reload;

    let loader = self.loader.clone();
    let reply = self
      .flight
      .run(key, move || async move { loader.load(params).await })
      .await;

    let mut state = self.state();
    if state.generation == generation {
      state.store(start, reply);
    } else {
      debug!("Dataset settings changed during reload, discarding window");
    }
    state.serve(offset, count)
  }

  /// True once a window has been loaded and not invalidated since.
  pub fn is_loaded(&self) -> bool {
    self.state().loaded
  }

  /// Positions `[start, end)` held by the loaded window.
  pub fn window_range(&self) -> Option<(u64, u64)> {
    let state = self.state();
    state
      .loaded
      .then(|| (state.window.start, state.window.end()))
  }

  /// Status of the last load.
  pub fn status(&self) -> Status {
    self.state().status.clone()
  }

  pub fn order(&self) -> SortDirection {
    self.state().order
  }

  pub fn set_order(&self, order: impl Into<SortDirection>) {
    let mut state = self.state();
    state.order = order.into();
    state.invalidate();
  }

  pub fn sort_by(&self) -> String {
    self.state().sortby.clone()
  }

  pub fn set_sort_by(&self, field: impl Into<String>) {
    let mut state = self.state();
    state.sortby = field.into();
    state.invalidate();
  }

  pub fn sort_type(&self) -> i64 {
    self.state().sorttype
  }

  pub fn set_sort_type(&self, kind: i64) {
    let mut state = self.state();
    state.sorttype = kind;
    state.invalidate();
  }

  /// Metadata filter sent with every window fetch.
  pub fn search(&self) -> Map<String, Value> {
    self.state().filter.clone()
  }

  pub fn set_search(&self, filter: Map<String, Value>) {
    let mut state = self.state();
    state.filter = filter;
    state.window = Arc::new(Window::default());
    state.invalidate();
  }

  pub fn capacity(&self) -> u64 {
    self.state().capacity
  }

  /// A capacity of 0 falls back to the default.
  pub fn set_capacity(&self, capacity: u64) {
    let mut state = self.state();
    state.capacity = if capacity == 0 { DEFAULT_WINDOW } else { capacity };
    state.invalidate();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::mock::MockSource;
  use serde_json::json;
  use std::time::Duration;

  fn cache(total: u64, capacity: u64) -> (Arc<MockSource>, RecordPageCache<MockSource>) {
    let source = Arc::new(MockSource::with_datasets(total));
    let cache = RecordPageCache::new(source.clone()).with_capacity(capacity);
    (source, cache)
  }

  fn ids(page: &Page) -> Vec<u64> {
    page
      .records
      .iter()
      .filter_map(|r| r["id"].as_u64())
      .collect()
  }

  #[tokio::test]
  async fn test_window_scenario() {
    let (source, cache) = cache(25, 10);

    let first = cache.page(1, 10).await;
    assert_eq!(ids(&first), (1..=10).collect::<Vec<_>>());
    assert_eq!(first.total, 25);
    assert_eq!(cache.window_range(), Some((1, 11)));

    // [5, 15) runs past the window and the collection continues
    let second = cache.page(5, 10).await;
    assert_eq!(ids(&second), (5..=14).collect::<Vec<_>>());
    assert_eq!(source.calls(GET_DATASETS), 2);
    let (start, end) = cache.window_range().unwrap();
    assert!(start <= 5 && end >= 15);

    // near the end the window is pulled back inside the collection
    let last = cache.page(20, 10).await;
    assert_eq!(ids(&last), (20..=25).collect::<Vec<_>>());
    assert_eq!(last.returned, 6);
    assert_eq!(cache.window_range(), Some((16, 26)));
  }

  #[tokio::test]
  async fn test_pages_inside_window_do_not_fetch() {
    let (source, cache) = cache(100, 30);

    cache.page(1, 10).await;
    cache.page(11, 10).await;
    let page = cache.page(21, 10).await;

    assert_eq!(ids(&page), (21..=30).collect::<Vec<_>>());
    assert_eq!(source.calls(GET_DATASETS), 1);
  }

  #[tokio::test]
  async fn test_page_length_matches_remaining_records() {
    let (_source, cache) = cache(25, 10);

    for offset in [1, 3, 9, 16, 20, 24, 25, 7, 1] {
      for count in [1, 4, 10] {
        let page = cache.page(offset, count).await;
        let expected = count.min(25 - offset + 1);
        assert_eq!(
          page.returned, expected,
          "page({}, {}) returned {:?}",
          offset, count, ids(&page)
        );
        assert_eq!(ids(&page).first(), Some(&offset));
      }
    }
  }

  #[tokio::test]
  async fn test_short_collection_is_served_without_refetch() {
    let (source, cache) = cache(4, 10);

    let page = cache.page(1, 10).await;
    assert_eq!(page.returned, 4);

    let page = cache.page(3, 10).await;
    assert_eq!(ids(&page), vec![3, 4]);
    assert_eq!(source.calls(GET_DATASETS), 1);
  }

  #[tokio::test]
  async fn test_offset_past_any_collection_returns_empty_page() {
    let (_source, cache) = cache(25, 10);
    cache.page(1, 10).await;

    let page = cache.page(u64::MAX, 10).await;
    assert!(page.status.is_ok());
    assert_eq!(page.returned, 0);
    assert!(page.records.is_empty());
    assert_eq!(page.total, 25);

    let page = cache.page(u64::MAX, u64::MAX).await;
    assert!(page.status.is_ok());
    assert_eq!(page.returned, 0);
  }

  #[tokio::test]
  async fn test_shrunk_collection_is_seen_after_invalidation() {
    let (source, cache) = cache(25, 10);
    assert_eq!(cache.page(1, 10).await.total, 25);

    source.set_datasets(12);
    cache.set_order("asc");
    let page = cache.page(5, 10).await;

    assert_eq!(page.total, 12);
    assert_eq!(ids(&page), (5..=12).collect::<Vec<_>>());
    assert_eq!(page.returned, 8);
  }

  #[tokio::test]
  async fn test_offset_and_count_are_clamped() {
    let (source, cache) = cache(50, 20);

    let page = cache.page(0, 0).await;
    assert_eq!(ids(&page), (1..=10).collect::<Vec<_>>());

    let page = cache.page(1, 500).await;
    assert_eq!(page.returned, 20);
    assert_eq!(source.last_params(GET_DATASETS).unwrap().count, Some(20));
  }

  #[tokio::test]
  async fn test_sort_by_invalidates_and_is_sent() {
    let (source, cache) = cache(25, 10);
    cache.page(1, 10).await;

    cache.set_sort_by("system.dataset.time.created");
    assert!(!cache.is_loaded());
    assert_eq!(cache.sort_by(), "system.dataset.time.created");

    let page = cache.page(1, 10).await;

    assert_eq!(source.calls(GET_DATASETS), 2);
    let params = source.last_params(GET_DATASETS).unwrap();
    assert_eq!(params.sortby.as_deref(), Some("system.dataset.time.created"));
    assert_eq!(page.records[0]["sortby"], json!("system.dataset.time.created"));
  }

  #[tokio::test]
  async fn test_every_setter_invalidates() {
    let (source, cache) = cache(25, 10);
    cache.page(1, 5).await;

    cache.set_order("asc");
    assert_eq!(cache.order(), SortDirection::Asc);
    cache.page(1, 5).await;

    cache.set_sort_type(2);
    cache.page(1, 5).await;

    let mut filter = Map::new();
    filter.insert(".Creator".into(), json!({ "=": "someone" }));
    cache.set_search(filter.clone());
    cache.page(1, 5).await;

    cache.set_capacity(12);
    assert!(!cache.is_loaded());
    cache.page(1, 5).await;

    assert_eq!(source.calls(GET_DATASETS), 5);
    let params = source.last_params(GET_DATASETS).unwrap();
    assert_eq!(params.sort, Some(SortDirection::Asc));
    assert_eq!(params.sorttype, Some(2));
    assert_eq!(params.metadata, Some(filter));
    assert_eq!(params.count, Some(12));
  }

  #[tokio::test]
  async fn test_defaults() {
    let source = Arc::new(MockSource::with_datasets(1));
    let cache = RecordPageCache::new(source);

    assert_eq!(cache.capacity(), DEFAULT_WINDOW);
    assert_eq!(cache.order(), SortDirection::Desc);
    assert_eq!(cache.sort_by(), DEFAULT_SORT_BY);
    assert_eq!(cache.sort_type(), 0);
    assert!(cache.search().is_empty());

    cache.set_capacity(0);
    assert_eq!(cache.capacity(), DEFAULT_WINDOW);
    cache.set_order("sideways");
    assert_eq!(cache.order(), SortDirection::Desc);
  }

  #[tokio::test]
  async fn test_failed_load_leaves_cache_unloaded() {
    let (source, cache) = cache(25, 10);
    source.fail_with(7, "no permission");

    let page = cache.page(1, 10).await;
    assert_eq!(page.status.err, 7);
    assert_eq!(page.status.errstr, "no permission");
    assert!(page.records.is_empty());
    assert!(!cache.is_loaded());

    source.clear_failure();
    let page = cache.page(1, 10).await;
    assert!(page.status.is_ok());
    assert_eq!(page.returned, 10);
    assert_eq!(source.calls(GET_DATASETS), 2);
  }

  #[tokio::test]
  async fn test_failed_reload_drops_previous_window() {
    let (source, cache) = cache(25, 10);
    cache.page(1, 10).await;

    source.set_offline(true);
    let page = cache.page(20, 5).await;

    assert_eq!(page.status.err, 1);
    assert!(page.records.is_empty());
    assert!(cache.window_range().is_none());
  }

  #[tokio::test]
  async fn test_status_fields_pass_through() {
    let (_source, cache) = cache(25, 10);

    let page = cache.page(1, 3).await;

    assert!(page.status.is_ok());
    assert_eq!(page.received, Some(json!(1)));
    assert_eq!(page.delivered, Some(json!(11)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_pages_share_one_fetch() {
    let (source, cache) = cache(25, 10);
    source.set_delay(Duration::from_millis(100));

    let (a, b) = tokio::join!(cache.page(1, 5), cache.page(1, 5));

    assert_eq!(source.calls(GET_DATASETS), 1);
    assert_eq!(a, b);
    assert_eq!(a.returned, 5);
  }
}
