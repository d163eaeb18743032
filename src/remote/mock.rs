//! Scripted in-memory REST server for tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{NodeId, Params, ROOT};
use super::{RemoteSource, GET_DATASETS, GET_TREE};

#[derive(Default)]
struct Backend {
  /// id -> (parent, type)
  nodes: BTreeMap<NodeId, (NodeId, String)>,
  datasets: u64,
  offline: bool,
  failure: Option<(i64, String)>,
}

impl Backend {
  fn children_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    self
      .nodes
      .iter()
      .filter(move |(child, (parent, _))| *parent == id && **child != id)
      .map(|(child, _)| *child)
  }

  fn accepts(&self, id: NodeId, params: &Params) -> bool {
    let kind = &self.nodes[&id].1;
    if let Some(include) = &params.include {
      if !include.iter().any(|t| t.eq_ignore_ascii_case(kind)) {
        return false;
      }
    }
    if let Some(exclude) = &params.exclude {
      if exclude.iter().any(|t| t.eq_ignore_ascii_case(kind)) {
        return false;
      }
    }
    true
  }

  fn get_tree(&self, params: &Params) -> Value {
    let start = params.id.unwrap_or(ROOT);
    if !self.nodes.contains_key(&start) {
      return json!({ "err": 2, "errstr": format!("entity {} does not exist", start) });
    }

    let mut found = BTreeSet::new();
    let mut queue = VecDeque::from([(start, 0u32)]);
    while let Some((id, depth)) = queue.pop_front() {
      if !found.insert(id) {
        continue;
      }
      if params.depth.is_some_and(|limit| depth >= limit) {
        continue;
      }
      for child in self.children_of(id) {
        if self.accepts(child, params) {
          queue.push_back((child, depth + 1));
        }
      }
    }

    let mut tree = Map::new();
    for id in &found {
      let (parent, kind) = &self.nodes[id];
      let children: Vec<NodeId> = self.children_of(*id).filter(|c| found.contains(c)).collect();
      tree.insert(
        id.to_string(),
        json!({
          "parent": parent,
          "children": children,
          "type": kind,
          "name": format!("node-{}", id),
        }),
      );
    }

    json!({ "err": 0, "errstr": "", "tree": tree })
  }

  fn get_datasets(&self, params: &Params) -> Value {
    let offset = params.offset.unwrap_or(1).max(1);
    let count = params.count.unwrap_or(10);
    let end = offset.saturating_add(count).min(self.datasets + 1);

    let mut datasets = Map::new();
    for position in offset..end {
      datasets.insert(
        (position - offset + 1).to_string(),
        json!({ "id": position, "sortby": params.sortby }),
      );
    }

    json!({
      "err": 0,
      "errstr": "",
      "datasets": datasets,
      "returned": end.saturating_sub(offset),
      "total": self.datasets,
      "received": offset,
      "delivered": end,
    })
  }
}

/// Fake REST server answering `getTree` and `getDatasets`.
#[derive(Default)]
pub struct MockSource {
  backend: Mutex<Backend>,
  calls: Mutex<Vec<(String, Params)>>,
  delay: Mutex<Option<Duration>>,
}

impl MockSource {
  /// Server holding the given `(id, parent, type)` nodes.
  pub fn with_tree(nodes: &[(NodeId, NodeId, &str)]) -> Self {
    let source = Self::default();
    for (id, parent, kind) in nodes {
      source.add_node(*id, *parent, kind);
    }
    source
  }

  /// Server holding `total` datasets.
  pub fn with_datasets(total: u64) -> Self {
    let source = Self::default();
    source.backend.lock().unwrap().datasets = total;
    source
  }

  pub fn add_node(&self, id: NodeId, parent: NodeId, kind: &str) {
    self
      .backend
      .lock()
      .unwrap()
      .nodes
      .insert(id, (parent, kind.to_string()));
  }

  pub fn remove_node(&self, id: NodeId) {
    self.backend.lock().unwrap().nodes.remove(&id);
  }

  pub fn set_datasets(&self, total: u64) {
    self.backend.lock().unwrap().datasets = total;
  }

  /// Make every call fail at the transport level.
  pub fn set_offline(&self, offline: bool) {
    self.backend.lock().unwrap().offline = offline;
  }

  /// Make every call answer with an application error until cleared.
  pub fn fail_with(&self, err: i64, errstr: &str) {
    self.backend.lock().unwrap().failure = Some((err, errstr.to_string()));
  }

  pub fn clear_failure(&self) {
    self.backend.lock().unwrap().failure = None;
  }

  /// Delay every answer, so concurrent callers overlap.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  /// Number of calls made to `method`.
  pub fn calls(&self, method: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(m, _)| m == method)
      .count()
  }

  /// Number of `getTree` calls for the subtree rooted at `id`
  /// (group index fetches not included).
  pub fn branch_calls(&self, id: NodeId) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(m, p)| m == GET_TREE && p.id == Some(id) && p.include.is_none())
      .count()
  }

  /// Number of group index fetches.
  pub fn group_calls(&self) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(m, p)| m == GET_TREE && p.include.is_some())
      .count()
  }

  pub fn last_params(&self, method: &str) -> Option<Params> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|(m, _)| m == method)
      .map(|(_, p)| p.clone())
  }

  pub fn reset_calls(&self) {
    self.calls.lock().unwrap().clear();
  }
}

#[async_trait]
impl RemoteSource for MockSource {
  async fn call(&self, method: &str, params: &Params) -> Result<Value> {
    self
      .calls
      .lock()
      .unwrap()
      .push((method.to_string(), params.clone()));

    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let backend = self.backend.lock().unwrap();
    if backend.offline {
      return Err(eyre!("connection refused"));
    }
    if let Some((err, errstr)) = &backend.failure {
      return Ok(json!({ "err": err, "errstr": errstr }));
    }

    match method {
      GET_TREE => Ok(backend.get_tree(params)),
      GET_DATASETS => Ok(backend.get_datasets(params)),
      other => Err(eyre!("unknown method {}", other)),
    }
  }
}
