//! Caller-visible view of the entity tree.

use std::collections::{BTreeMap, HashSet};

use crate::remote::{Node, NodeId, ROOT};

/// The reconciled tree, built anew on every reconciliation.
///
/// Snapshots are handed out as `Arc<Snapshot>`; toggling a node's expanded
/// flag copies the snapshot if a caller still holds the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
  nodes: BTreeMap<NodeId, Node>,
}

/// One line of the depth-first rendering of the expanded tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
  pub id: NodeId,
  pub depth: usize,
  pub expanded: bool,
  pub has_children: bool,
}

impl Snapshot {
  pub(crate) fn from_nodes(nodes: BTreeMap<NodeId, Node>) -> Self {
    Self { nodes }
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(&id)
  }

  pub fn contains(&self, id: NodeId) -> bool {
    self.nodes.contains_key(&id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Node> {
    self.nodes.values()
  }

  pub fn is_expanded(&self, id: NodeId) -> bool {
    self.nodes.get(&id).is_some_and(|n| n.expanded)
  }

  /// Children of `id` that are present in the snapshot, in source order.
  pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> {
    self
      .nodes
      .get(&id)
      .into_iter()
      .flat_map(|node| node.children.iter())
      .filter_map(|child| self.nodes.get(child))
  }

  /// Returns false if `id` is not in the snapshot.
  pub(crate) fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
    match self.nodes.get_mut(&id) {
      Some(node) => {
        node.expanded = expanded;
        true
      }
      None => false,
    }
  }

  /// Rows visible when only expanded nodes show their children, starting at
  /// the root.
  pub fn visible_rows(&self) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    if self.contains(ROOT) {
      self.push_rows(ROOT, 0, &mut rows, &mut seen);
    }
    rows
  }

  fn push_rows(&self, id: NodeId, depth: usize, rows: &mut Vec<Row>, seen: &mut HashSet<NodeId>) {
    let Some(node) = self.nodes.get(&id) else {
      return;
    };
    if !seen.insert(id) {
      return;
    }

    let has_children = self.children(id).next().is_some();
    rows.push(Row {
      id,
      depth,
      expanded: node.expanded,
      has_children,
    });

    if node.expanded {
      for child in &node.children {
        self.push_rows(*child, depth + 1, rows, seen);
      }
    }
  }
}
