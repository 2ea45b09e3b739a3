//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
//! Arena of nodes keyed by identity.
//!
//! Every structural change goes through [`NodeSet::insert`] or
//! [`NodeSet::graft`], both of which reject an identity already present and
//! update the parent and child sides of a link together.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::errors::{NodeError, Result};
use crate::ids::NodeId;
use crate::node::Node;
use crate::value::Variant;

#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: IndexMap<NodeId, Node>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add a detached node, linking it under `parent` when given.
    pub fn insert(&mut self, mut node: Node, parent: Option<&NodeId>) -> Result<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(NodeError::DuplicateIdentity(node.id));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(NodeError::UnknownParent(parent.clone()));
            }
        }
        node.parent = parent.cloned();
        node.children.clear();
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.push(id.clone());
        }
        Ok(id)
    }

    pub fn children_of<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |child| self.nodes.get(child))
    }

    pub fn find_child(&self, parent: &NodeId, browse_name: &str) -> Option<&Node> {
        self.children_of(parent)
            .find(|child| child.browse_name.name == browse_name)
    }

    /// Resolve a `/`-separated browse path relative to `root`.
    pub fn resolve_path(&self, root: &NodeId, path: &str) -> Result<NodeId> {
        if !self.contains(root) {
            return Err(NodeError::UnknownNode(root.clone()));
        }
        let mut current = root.clone();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = self
                .find_child(&current, segment)
                .map(|child| child.id.clone())
                .ok_or_else(|| NodeError::UnknownChild(current.clone(), segment.to_owned()))?;
        }
        Ok(current)
    }

    /// Pre-order traversal of the subtree under `root`, using an explicit stack.
    pub fn depth_first(&self, root: &NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            stack.extend(node.children.iter().rev().cloned());
            order.push(id);
        }
        order
    }

    /// Replace the value of a variable after checking it against the declared
    /// data type and rank.
    pub fn set_value(&mut self, id: &NodeId, value: Variant, timestamp: DateTime<Utc>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| NodeError::UnknownNode(id.clone()))?;
        let variable = node
            .variable_mut()
            .ok_or_else(|| NodeError::NotAVariable(id.clone()))?;
        if !value.conforms_to(variable.data_type, variable.value_rank) {
            return Err(NodeError::TypeMismatch {
                node: id.clone(),
                data_type: variable.data_type,
                value_rank: variable.value_rank,
            });
        }
        variable.value = value;
        variable.status = crate::value::StatusCode::Good;
        variable.timestamp = timestamp;
        Ok(())
    }

    /// Rebuild the set under new identities.
    ///
    /// Every node must appear in `mapping` and the mapping must be injective.
    /// Links to nodes outside the set are kept as they are.
    pub fn rekey(self, mapping: &HashMap<NodeId, NodeId>) -> Result<NodeSet> {
        let translate = |id: &NodeId| mapping.get(id).cloned().unwrap_or_else(|| id.clone());
        let mut rekeyed = IndexMap::with_capacity(self.nodes.len());
        for (old_id, mut node) in self.nodes {
            let new_id = mapping
                .get(&old_id)
                .cloned()
                .ok_or_else(|| NodeError::UnmappedNode(old_id.clone()))?;
            node.browse_name.namespace = new_id.namespace;
            node.id = new_id.clone();
            node.parent = node.parent.as_ref().map(translate);
            node.children = node.children.iter().map(translate).collect();
            if rekeyed.insert(new_id.clone(), node).is_some() {
                return Err(NodeError::DuplicateIdentity(new_id));
            }
        }
        Ok(NodeSet { nodes: rekeyed })
    }

    /// Move a detached subtree into this set and link its root under `parent`.
    ///
    /// Either every node is moved or none is: identity collisions are checked
    /// before anything is inserted.
    pub fn graft(&mut self, subtree: NodeSet, root: &NodeId, parent: Option<&NodeId>) -> Result<()> {
        let subtree_root = subtree
            .get(root)
            .ok_or_else(|| NodeError::UnknownNode(root.clone()))?;
        if subtree_root.parent.is_some() {
            return Err(NodeError::AttachedSubtreeRoot(root.clone()));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(NodeError::UnknownParent(parent.clone()));
            }
        }
        if let Some(collision) = subtree.nodes.keys().find(|id| self.nodes.contains_key(*id)) {
            return Err(NodeError::DuplicateIdentity(collision.clone()));
        }

        for (id, mut node) in subtree.nodes {
            if &id == root {
                node.parent = parent.cloned();
            }
            self.nodes.insert(id, node);
        }
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.push(root.clone());
        }
        Ok(())
    }

    /// True when every parent link is mirrored by the parent's child list and
    /// every child entry points back at its parent.
    pub fn links_consistent(&self) -> bool {
        let mut seen_children = HashSet::new();
        for node in self.nodes.values() {
            for child in &node.children {
                let back_link = self
                    .nodes
                    .get(child)
                    .and_then(|child| child.parent.as_ref());
                if back_link != Some(&node.id) || !seen_children.insert(child) {
                    return false;
                }
            }
            if let Some(parent) = &node.parent {
                match self.nodes.get(parent) {
                    Some(parent) if parent.children.contains(&node.id) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

impl Serialize for NodeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.nodes.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeBody, ReferenceType, TypeDefinition};
    use crate::value::WriteMask;

    fn object(id: u32, name: &str) -> Node {
        Node::new(
            NodeId::numeric(2, id),
            name,
            ReferenceType::Organizes,
            Some(TypeDefinition::BaseObjectType),
            WriteMask::NONE,
            NodeBody::Object,
        )
    }

    fn chain() -> NodeSet {
        let mut set = NodeSet::new();
        set.insert(object(0, "Root"), None).unwrap();
        set.insert(object(1, "A"), Some(&NodeId::numeric(2, 0))).unwrap();
        set.insert(object(2, "B"), Some(&NodeId::numeric(2, 1))).unwrap();
        set.insert(object(3, "C"), Some(&NodeId::numeric(2, 0))).unwrap();
        set
    }

    #[test]
    fn insert_links_both_directions() {
        let set = chain();
        let root = set.get(&NodeId::numeric(2, 0)).unwrap();
        assert_eq!(root.children(), &[NodeId::numeric(2, 1), NodeId::numeric(2, 3)]);
        assert_eq!(
            set.get(&NodeId::numeric(2, 2)).unwrap().parent(),
            Some(&NodeId::numeric(2, 1))
        );
        assert!(set.links_consistent());
    }

    #[test]
    fn insert_rejects_duplicates_and_unknown_parents() {
        let mut set = chain();
        assert!(matches!(
            set.insert(object(1, "Again"), None),
            Err(NodeError::DuplicateIdentity(_))
        ));
        assert!(matches!(
            set.insert(object(9, "Orphan"), Some(&NodeId::numeric(2, 42))),
            Err(NodeError::UnknownParent(_))
        ));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn resolves_paths_and_walks_preorder() {
        let set = chain();
        let root = NodeId::numeric(2, 0);
        assert_eq!(set.resolve_path(&root, "A/B").unwrap(), NodeId::numeric(2, 2));
        assert!(matches!(
            set.resolve_path(&root, "A/Z"),
            Err(NodeError::UnknownChild(_, _))
        ));
        let order: Vec<_> = set
            .depth_first(&root)
            .into_iter()
            .filter_map(|id| id.as_numeric())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn graft_is_all_or_nothing() {
        let mut target = NodeSet::new();
        target.insert(object(100, "Folder"), None).unwrap();
        target.insert(object(2, "Squatter"), None).unwrap();

        let err = target
            .graft(chain(), &NodeId::numeric(2, 0), Some(&NodeId::numeric(2, 100)))
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicateIdentity(id) if id == NodeId::numeric(2, 2)));
        assert_eq!(target.len(), 2);
        assert!(target.get(&NodeId::numeric(2, 100)).unwrap().children().is_empty());
    }

    #[test]
    fn rekey_then_graft_links_subtree() {
        let subtree = chain();
        let mapping: HashMap<_, _> = (0..4)
            .map(|id| (NodeId::numeric(2, id), NodeId::numeric(2, id + 500)))
            .collect();
        let subtree = subtree.rekey(&mapping).unwrap();

        let mut target = NodeSet::new();
        target.insert(object(100, "Folder"), None).unwrap();
        target
            .graft(subtree, &NodeId::numeric(2, 500), Some(&NodeId::numeric(2, 100)))
            .unwrap();
        assert_eq!(target.len(), 5);
        assert_eq!(
            target.resolve_path(&NodeId::numeric(2, 100), "Root/A/B").unwrap(),
            NodeId::numeric(2, 502)
        );
        assert!(target.links_consistent());
    }

    #[test]
    fn rekey_requires_complete_mapping() {
        let mapping: HashMap<_, _> = [(NodeId::numeric(2, 0), NodeId::numeric(2, 10))]
            .into_iter()
            .collect();
        assert!(matches!(
            chain().rekey(&mapping),
            Err(NodeError::UnmappedNode(_))
        ));
    }
}
