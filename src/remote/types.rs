//! Request parameters and reply shapes of the AURORA REST methods.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Entity identifier as used by the REST server.
pub type NodeId = u64;

/// The global root of the entity tree.
pub const ROOT: NodeId = 1;

/// Node type forming the backbone of the tree.
pub const GROUP: &str = "GROUP";

/// Application-level outcome carried by every reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
  pub err: i64,
  pub errstr: String,
}

impl Status {
  pub fn ok() -> Self {
    Self::default()
  }

  /// Status used when the transport or decoding failed before the server
  /// could answer.
  pub fn failed(errstr: impl Into<String>) -> Self {
    Self {
      err: 1,
      errstr: errstr.into(),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.err == 0
  }
}

/// Sort direction for dataset listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

impl From<&str> for SortDirection {
  /// `ASC` in any case is ascending, everything else descending.
  fn from(s: &str) -> Self {
    if s.trim().eq_ignore_ascii_case("asc") {
      SortDirection::Asc
    } else {
      SortDirection::Desc
    }
  }
}

impl From<String> for SortDirection {
  fn from(s: String) -> Self {
    SortDirection::from(s.as_str())
  }
}

impl std::fmt::Display for SortDirection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SortDirection::Asc => write!(f, "ASC"),
      SortDirection::Desc => write!(f, "DESC"),
    }
  }
}

/// Scalar passthrough parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

/// Parameters of a remote call.
///
/// Every field the caches know about is explicit; anything else configured by
/// the caller travels in `extra` and is flattened into the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<NodeId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub include: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exclude: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub depth: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub offset: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort: Option<SortDirection>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sortby: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sorttype: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Map<String, Value>>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, ParamValue>,
}

/// A tree node as cached and exposed in snapshots.
///
/// On the wire the id is the key of the `tree` mapping and `kind` is called
/// `type`. Fields the cache does not interpret are kept in `attributes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Node {
  #[serde(skip)]
  pub id: NodeId,
  #[serde(default)]
  pub parent: NodeId,
  #[serde(default)]
  pub children: Vec<NodeId>,
  #[serde(rename = "type", default)]
  pub kind: String,
  #[serde(skip)]
  pub expanded: bool,
  #[serde(flatten)]
  pub attributes: Map<String, Value>,
}

impl Node {
  pub fn new(id: NodeId, parent: NodeId, kind: impl Into<String>) -> Self {
    Self {
      id,
      parent,
      children: Vec::new(),
      kind: kind.into(),
      expanded: false,
      attributes: Map::new(),
    }
  }

  /// Display name, falling back to the id.
  pub fn name(&self) -> String {
    match self.attributes.get("name") {
      Some(Value::String(name)) if !name.is_empty() => name.clone(),
      _ => self.id.to_string(),
    }
  }

  pub fn is_group(&self) -> bool {
    self.kind.eq_ignore_ascii_case(GROUP)
  }

  /// Append the children not yet present, keeping existing order.
  pub fn adopt(&mut self, children: &[NodeId]) {
    for child in children {
      if !self.children.contains(child) {
        self.children.push(*child);
      }
    }
  }

  fn dedup_children(&mut self) {
    let children = std::mem::take(&mut self.children);
    self.adopt(&children);
  }
}

/// Reply of the `getTree` method.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TreeReply {
  #[serde(default)]
  pub err: i64,
  #[serde(default)]
  pub errstr: String,
  #[serde(default)]
  pub tree: BTreeMap<NodeId, Node>,
}

impl TreeReply {
  /// Nodes keyed by id, with ids filled in and children deduplicated.
  pub fn into_nodes(self) -> BTreeMap<NodeId, Node> {
    self
      .tree
      .into_iter()
      .map(|(id, mut node)| {
        node.id = id;
        node.dedup_children();
        (id, node)
      })
      .collect()
  }
}

/// Reply of the `getDatasets` method. `datasets` is keyed by 1-based position
/// relative to the requested offset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageReply {
  #[serde(default)]
  pub err: i64,
  #[serde(default)]
  pub errstr: String,
  #[serde(default)]
  pub datasets: BTreeMap<u64, Value>,
  #[serde(default)]
  pub returned: u64,
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub received: Option<Value>,
  #[serde(default)]
  pub delivered: Option<Value>,
}

/// Common surface of decoded replies.
pub trait Reply: serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
  fn status(&self) -> Status;

  /// Reply standing in for a call that never produced one.
  fn failed(status: Status) -> Self;
}

impl Reply for TreeReply {
  fn status(&self) -> Status {
    Status {
      err: self.err,
      errstr: self.errstr.clone(),
    }
  }

  fn failed(status: Status) -> Self {
    Self {
      err: status.err,
      errstr: status.errstr,
      ..Default::default()
    }
  }
}

impl Reply for PageReply {
  fn status(&self) -> Status {
    Status {
      err: self.err,
      errstr: self.errstr.clone(),
    }
  }

  fn failed(status: Status) -> Self {
    Self {
      err: status.err,
      errstr: status.errstr,
      ..Default::default()
    }
  }
}
