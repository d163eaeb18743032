//! Entity tree cache with a bounded set of actively refreshed branches.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::flight::SingleFlight;
use super::lock;
use super::merge::reconcile;
use super::snapshot::Snapshot;
use crate::remote::{
  Loader, Node, NodeId, ParamValue, Params, RemoteSource, Reply, Status, TreeReply, GET_TREE, GROUP,
  ROOT,
};

/// Branches kept fresh at once by default, root included.
pub const DEFAULT_TREE_CAPACITY: usize = 4;

/// Root plus one top-level branch.
pub const MIN_TREE_CAPACITY: usize = 2;

/// How long fetched tree data stays fresh by default.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Locally cached subtree rooted at a node.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
  pub root: NodeId,
  pub depth: Option<u32>,
  /// Overrides the cache-wide exclude list when set.
  pub exclude: Option<Vec<String>>,
  /// Last successful fetch, `None` until the first one.
  pub fetched_at: Option<Instant>,
  /// Forced due regardless of `fetched_at`.
  pub stale: bool,
  /// Retained but no longer refreshed.
  pub pinned: bool,
  pub subtree: BTreeMap<NodeId, Node>,
}

impl Branch {
  /// The global root: one level deep, nothing excluded.
  fn root() -> Self {
    Self {
      root: ROOT,
      depth: Some(1),
      exclude: Some(Vec::new()),
      fetched_at: None,
      stale: true,
      pinned: false,
      subtree: BTreeMap::new(),
    }
  }

  pub(crate) fn top_level(root: NodeId) -> Self {
    Self {
      root,
      depth: None,
      exclude: None,
      fetched_at: None,
      stale: true,
      pinned: false,
      subtree: BTreeMap::new(),
    }
  }

  fn is_due(&self, now: Instant, ttl: Duration) -> bool {
    !self.pinned && (self.stale || is_expired(self.fetched_at, now, ttl))
  }
}

fn is_expired(fetched_at: Option<Instant>, now: Instant, ttl: Duration) -> bool {
  match fetched_at {
    Some(at) => now.saturating_duration_since(at) > ttl,
    None => true,
  }
}

#[derive(Debug, Default)]
struct GroupIndex {
  nodes: BTreeMap<NodeId, Node>,
  fetched_at: Option<Instant>,
}

/// Fetch keys for the single-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TreeKey {
  Groups,
  Branch(NodeId),
}

struct TreeState {
  capacity: usize,
  ttl: Duration,
  exclude: Vec<String>,
  params: BTreeMap<String, ParamValue>,
  groups: GroupIndex,
  branches: BTreeMap<NodeId, Branch>,
  snapshot: Arc<Snapshot>,
  /// Bumped by configuration changes; fetches started under an older
  /// generation are not written back.
  generation: u64,
  refreshed_at: Option<DateTime<Utc>>,
}

impl TreeState {
  fn new() -> Self {
    Self {
      capacity: DEFAULT_TREE_CAPACITY,
      ttl: DEFAULT_TTL,
      exclude: vec!["USER".to_string(), "DATASET".to_string()],
      params: BTreeMap::new(),
      groups: GroupIndex::default(),
      branches: BTreeMap::from([(ROOT, Branch::root())]),
      snapshot: Arc::new(Snapshot::default()),
      generation: 0,
      refreshed_at: None,
    }
  }

  fn active_count(&self) -> usize {
    self.branches.values().filter(|b| !b.pinned).count()
  }

  fn is_timeout(&self, now: Instant) -> bool {
    is_expired(self.groups.fetched_at, now, self.ttl)
      || self.branches.values().any(|b| b.is_due(now, self.ttl))
  }

  /// Pin the active branch whose last successful fetch is oldest, never the
  /// root or `keep`. Branches never fetched count as oldest.
  fn evict_oldest(&mut self, keep: NodeId) -> Option<NodeId> {
    let victim = self
      .branches
      .values()
      .filter(|b| !b.pinned && b.root != ROOT && b.root != keep)
      .min_by_key(|b| b.fetched_at)
      .map(|b| b.root)?;

    if let Some(branch) = self.branches.get_mut(&victim) {
      branch.pinned = true;
    }
    debug!(branch = victim, "Pinned branch to stay within capacity");
    Some(victim)
  }

  /// Make `id` an active branch that is due for a fetch, pinning the oldest
  /// one first if the active set is full.
  fn activate(&mut self, id: NodeId) {
    let already_active = self.branches.get(&id).is_some_and(|b| !b.pinned);
    if !already_active && self.active_count() >= self.capacity {
      self.evict_oldest(id);
    }

    let branch = self
      .branches
      .entry(id)
      .or_insert_with(|| Branch::top_level(id));
    branch.pinned = false;
    branch.stale = true;
  }

  fn mark_active_stale(&mut self) {
    for branch in self.branches.values_mut().filter(|b| !b.pinned) {
      branch.stale = true;
    }
  }

  fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
    if !self.snapshot.contains(id) {
      return false;
    }
    Arc::make_mut(&mut self.snapshot).set_expanded(id, expanded)
  }

  fn group_params(&self) -> Params {
    Params {
      id: Some(ROOT),
      include: Some(vec![GROUP.to_string()]),
      extra: self.params.clone(),
      ..Default::default()
    }
  }

  fn branch_params(&self, root: NodeId) -> Params {
    let branch = self.branches.get(&root);
    let exclude = branch
      .and_then(|b| b.exclude.clone())
      .unwrap_or_else(|| self.exclude.clone());
    Params {
      id: Some(root),
      exclude: Some(exclude),
      depth: branch.and_then(|b| b.depth),
      extra: self.params.clone(),
      ..Default::default()
    }
  }
}

/// Strip the group type (in any case) from an exclude list.
fn without_group(types: Vec<String>) -> Vec<String> {
  types
    .into_iter()
    .filter(|t| !t.eq_ignore_ascii_case(GROUP))
    .collect()
}

/// Cache of the entity tree.
///
/// The tree is assembled from two sources: the group index (every group
/// reachable from the root, fetched as one unit) and a set of branches, each
/// the full subtree of the root or of one top-level node. At most `capacity`
/// branches are actively refreshed; older ones are pinned and keep serving
/// their last data.
///
/// All operations take `&self`. State is only locked between awaits, and
/// concurrent fetches of the group index or of the same branch are shared.
pub struct TreeCache<S> {
  loader: Loader<S, TreeReply>,
  state: Mutex<TreeState>,
  flight: SingleFlight<TreeKey, TreeReply>,
}

enum Next {
  Resync,
  Done,
}

impl<S: RemoteSource> TreeCache<S> {
  pub fn new(source: Arc<S>) -> Self {
    Self {
      loader: Loader::new(GET_TREE, source),
      state: Mutex::new(TreeState::new()),
      flight: SingleFlight::new(),
    }
  }

  /// Set how many branches are kept fresh at once, root included.
  pub fn with_capacity(self, capacity: usize) -> Self {
    self.set_capacity(capacity);
    self
  }

  pub fn with_ttl(self, ttl: Duration) -> Self {
    self.set_ttl(ttl);
    self
  }

  pub fn with_exclude(self, types: Vec<String>) -> Self {
    self.set_exclude(types);
    self
  }

  pub fn with_params(self, params: BTreeMap<String, ParamValue>) -> Self {
    self.set_params(params);
    self
  }

  fn state(&self) -> MutexGuard<'_, TreeState> {
    lock(&self.state)
  }

  /// Fetch the root restricted to group nodes.
  pub async fn get_groups(&self) -> TreeReply {
    let params = self.state().group_params();
    self.fetch(TreeKey::Groups, params).await
  }

  /// Fetch the subtree rooted at `root`, honouring the branch's own exclude
  /// list and depth when it has them.
  pub async fn get_branch(&self, root: NodeId) -> TreeReply {
    let params = self.state().branch_params(root);
    self.fetch(TreeKey::Branch(root), params).await
  }

  async fn fetch(&self, key: TreeKey, params: Params) -> TreeReply {
    let loader = self.loader.clone();
    self
      .flight
      .run(key, move || async move { loader.load(params).await })
      .await
  }

  /// Refresh whatever has gone stale and rebuild the snapshot.
  ///
  /// A failed fetch leaves the corresponding data as it was; the rest of the
  /// reconciliation still happens.
  pub async fn get(&self) -> Arc<Snapshot> {
    let (generation, groups_due, due) = {
      let state = self.state();
      let now = Instant::now();
      let groups_due =
        state.groups.nodes.is_empty() || is_expired(state.groups.fetched_at, now, state.ttl);
      let due: Vec<NodeId> = state
        .branches
        .values()
        .filter(|b| b.is_due(now, state.ttl))
        .map(|b| b.root)
        .collect();
      (state.generation, groups_due, due)
    };

    if groups_due || !due.is_empty() {
      info!(groups = groups_due, branches = ?due, "Refreshing tree cache");
    }

    let groups = async {
      if groups_due {
        Some(self.get_groups().await)
      } else {
        None
      }
    };
    let branches = join_all(
      due
        .iter()
        .map(|root| async move { (*root, self.get_branch(*root).await) }),
    );
    let (groups, branches) = futures::join!(groups, branches);

    let mut state = self.state();
    if state.generation != generation {
      debug!("Tree configuration changed during refresh, discarding fetched data");
    } else {
      let now = Instant::now();
      if let Some(reply) = groups.filter(|r| r.status().is_ok()) {
        state.groups.nodes = reply.into_nodes();
        state.groups.fetched_at = Some(now);
        state.refreshed_at = Some(Utc::now());
      }
      for (root, reply) in branches {
        if !reply.status().is_ok() {
          continue;
        }
        if let Some(branch) = state.branches.get_mut(&root) {
          branch.subtree = reply.into_nodes();
          branch.fetched_at = Some(now);
          branch.stale = false;
        }
      }
    }

    let snapshot = reconcile(&state.groups.nodes, &state.branches, &state.snapshot);
    state.snapshot = Arc::new(snapshot);
    Arc::clone(&state.snapshot)
  }

  /// Expand a node.
  ///
  /// Expanding a top-level node starts tracking it as a branch, pinning the
  /// oldest active branch if the active set is full. Nested nodes are already
  /// held by their branch and only change their flag.
  pub async fn expand(&self, id: NodeId) -> Arc<Snapshot> {
    let next = {
      let mut state = self.state();
      match state.branches.get(&id).map(|b| b.pinned) {
        Some(false) => {
          state.set_expanded(id, true);
          if state.is_timeout(Instant::now()) {
            Next::Resync
          } else {
            Next::Done
          }
        }
        Some(true) => {
          debug!(branch = id, "Re-activating pinned branch");
          state.activate(id);
          state.set_expanded(id, true);
          Next::Resync
        }
        None => match state.snapshot.get(id).map(|n| n.parent) {
          Some(parent) if parent == ROOT && id != ROOT => {
            debug!(branch = id, "Tracking new top-level branch");
            state.activate(id);
            state.set_expanded(id, true);
            Next::Resync
          }
          Some(_) => {
            state.set_expanded(id, true);
            Next::Done
          }
          None => {
            debug!(id, "Ignoring expand of unknown node");
            Next::Done
          }
        },
      }
    };

    match next {
      Next::Resync => self.get().await,
      Next::Done => self.tree(),
    }
  }

  /// Collapse a node. Never fetches.
  pub fn collapse(&self, id: NodeId) -> Arc<Snapshot> {
    let mut state = self.state();
    state.set_expanded(id, false);
    Arc::clone(&state.snapshot)
  }

  /// Force an immediate refresh of the branch rooted at `id`, re-activating
  /// it if it was pinned. Returns false if `id` is not a branch.
  pub async fn update(&self, id: NodeId) -> bool {
    {
      let mut state = self.state();
      if !state.branches.contains_key(&id) {
        return false;
      }
      state.activate(id);
    }
    self.get().await;
    true
  }

  /// Invalidate and refetch.
  ///
  /// With `ids`, only the branches holding one of them are refreshed, as
  /// long as every id is found somewhere. Otherwise every active branch is.
  /// The group index is always refreshed.
  pub async fn refresh(&self, ids: Option<&[NodeId]>) -> Arc<Snapshot> {
    {
      let mut state = self.state();
      state.groups.fetched_at = None;

      let all_located = match ids {
        Some(ids) => {
          let mut located = 0;
          for id in ids {
            let mut found = false;
            for branch in state.branches.values_mut() {
              if branch.subtree.contains_key(id) {
                branch.stale = true;
                found = true;
              }
            }
            if found {
              located += 1;
            }
          }
          located == ids.len()
        }
        None => false,
      };

      if !all_located {
        state.mark_active_stale();
      }
    }
    self.get().await
  }

  /// True if the group index or any active branch has outlived the TTL.
  pub fn is_timeout(&self) -> bool {
    self.state().is_timeout(Instant::now())
  }

  /// The current snapshot, without fetching.
  pub fn tree(&self) -> Arc<Snapshot> {
    Arc::clone(&self.state().snapshot)
  }

  /// Status of the most recent tree call, `None` before the first one.
  pub fn last_status(&self) -> Option<Status> {
    self.loader.last().map(|reply| reply.status())
  }

  /// Wall-clock time of the last successful group index fetch.
  pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
    self.state().refreshed_at
  }

  pub fn capacity(&self) -> usize {
    self.state().capacity
  }

  /// Lowering the capacity pins the oldest active branches until the active
  /// set fits.
  pub fn set_capacity(&self, capacity: usize) {
    let mut state = self.state();
    state.capacity = capacity.max(MIN_TREE_CAPACITY);
    while state.active_count() > state.capacity {
      if state.evict_oldest(ROOT).is_none() {
        break;
      }
    }
  }

  pub fn ttl(&self) -> Duration {
    self.state().ttl
  }

  pub fn set_ttl(&self, ttl: Duration) {
    self.state().ttl = ttl;
  }

  pub fn exclude(&self) -> Vec<String> {
    self.state().exclude.clone()
  }

  /// Replace the types left out of branch fetches. The group type is never
  /// excluded. Active branches are refetched on the next `get`.
  pub fn set_exclude(&self, types: Vec<String>) {
    let mut state = self.state();
    state.exclude = without_group(types);
    state.generation += 1;
    state.mark_active_stale();
  }

  pub fn params(&self) -> BTreeMap<String, ParamValue> {
    self.state().params.clone()
  }

  /// Replace the extra parameters sent with every tree call. An empty map
  /// is ignored. Everything active is refetched on the next `get`.
  pub fn set_params(&self, params: BTreeMap<String, ParamValue>) {
    if params.is_empty() {
      return;
    }
    let mut state = self.state();
    state.params = params;
    state.generation += 1;
    state.groups.fetched_at = None;
    state.mark_active_stale();
  }

  /// Roots of the branches currently refreshed.
  pub fn active_branches(&self) -> Vec<NodeId> {
    self
      .state()
      .branches
      .values()
      .filter(|b| !b.pinned)
      .map(|b| b.root)
      .collect()
  }

  /// Roots of the branches retained but no longer refreshed.
  pub fn pinned_branches(&self) -> Vec<NodeId> {
    self
      .state()
      .branches
      .values()
      .filter(|b| b.pinned)
      .map(|b| b.root)
      .collect()
  }
}
