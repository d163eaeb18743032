//! Reconciliation of the group index and the cached branches into one tree.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::snapshot::Snapshot;
use super::tree::Branch;
use crate::remote::{Node, NodeId};

/// Build a new snapshot from the group index and the branches.
///
/// Group ids are visited in ascending order. A group id with a fetched branch
/// contributes the whole branch subtree, otherwise the group node itself. A
/// node contributed more than once keeps its first version and gains the
/// children of every later one. Children listed in `previous` are kept as
/// well, together with their nodes when no source returned them this time, so
/// a node never loses a known child implicitly. Expanded flags are taken from
/// `previous`; nodes it does not know start collapsed.
pub(crate) fn reconcile(
  groups: &BTreeMap<NodeId, Node>,
  branches: &BTreeMap<NodeId, Branch>,
  previous: &Snapshot,
) -> Snapshot {
  let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();

  for (id, group) in groups {
    match branches.get(id).filter(|b| !b.subtree.is_empty()) {
      Some(branch) => {
        for (branch_id, branch_node) in &branch.subtree {
          match nodes.entry(*branch_id) {
            Entry::Vacant(slot) => {
              slot.insert(branch_node.clone());
            }
            Entry::Occupied(mut slot) => {
              let node = slot.get_mut();
              node.adopt(&branch_node.children);
              if let Some(group_node) = groups.get(branch_id) {
                node.adopt(&group_node.children);
              }
            }
          }
        }
      }
      None => match nodes.entry(*id) {
        Entry::Vacant(slot) => {
          slot.insert(group.clone());
        }
        Entry::Occupied(mut slot) => slot.get_mut().adopt(&group.children),
      },
    }
  }

  for node in nodes.values_mut() {
    if let Some(known) = previous.get(node.id) {
      node.adopt(&known.children);
    }
    node.expanded = previous.is_expanded(node.id);
  }

  let mut missing: Vec<NodeId> = nodes
    .values()
    .flat_map(|node| node.children.iter().copied())
    .filter(|child| !nodes.contains_key(child))
    .collect();
  while let Some(id) = missing.pop() {
    if nodes.contains_key(&id) {
      continue;
    }
    if let Some(known) = previous.get(id) {
      missing.extend(
        known
          .children
          .iter()
          .copied()
          .filter(|child| !nodes.contains_key(child)),
      );
      nodes.insert(id, known.clone());
    }
  }

  Snapshot::from_nodes(nodes)
}
