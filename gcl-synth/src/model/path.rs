/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Route of a (possibly multicast) flow as an index-addressed tree.
//!
//! The root is the source device; leaves are destination devices; inner
//! nodes are switches.  Parent and child links are arena indices, so upward
//! traversal needs no back-references.

use tracing::warn;

use super::{FragmentId, NodeRef, PathNodeId};

#[derive(Debug, Clone)]
pub struct PathNode {
    pub node: NodeRef,
    pub parent: Option<PathNodeId>,
    pub children: Vec<PathNodeId>,
    /// Priority requested for the hop leaving this node.
    pub priority: Option<u8>,
    /// Fragments created for the hops leaving this node (one per child).
    pub fragments: Vec<FragmentId>,
}

#[derive(Debug, Clone)]
pub struct PathTree {
    nodes: Vec<PathNode>,
}

impl PathTree {
    pub fn new(root: NodeRef) -> Self {
        Self {
            nodes: vec![PathNode {
                node: root,
                parent: None,
                children: Vec::new(),
                priority: None,
                fragments: Vec::new(),
            }],
        }
    }

    /// Build a tree from root-exclusive hop lists, merging common prefixes.
    pub fn from_paths(root: NodeRef, paths: &[Vec<(NodeRef, Option<u8>)>]) -> Self {
        let mut tree = Self::new(root);
        for path in paths {
            let mut at = tree.root();
            for &(node, priority) in path {
                at = tree.add_child(at, node, priority);
            }
        }
        tree
    }

    pub fn root(&self) -> PathNodeId {
        PathNodeId(0)
    }

    pub fn node(&self, id: PathNodeId) -> &PathNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Child of `parent` for `node`, created if absent.
    ///
    /// A priority given for an existing child fills an unset one; a
    /// conflicting priority is ignored with a warning.
    pub fn add_child(&mut self, parent: PathNodeId, node: NodeRef, priority: Option<u8>) -> PathNodeId {
        let existing = self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].node == node);
        if let Some(id) = existing {
            let slot = &mut self.nodes[id.0].priority;
            match (*slot, priority) {
                (None, p) => *slot = p,
                (Some(a), Some(b)) if a != b => {
                    warn!(kept = a, ignored = b, "conflicting hop priorities on merged path");
                }
                _ => {}
            }
            return id;
        }
        let id = PathNodeId(self.nodes.len());
        self.nodes.push(PathNode {
            node,
            parent: Some(parent),
            children: Vec::new(),
            priority,
            fragments: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: PathNodeId) -> &[PathNodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: PathNodeId) -> Option<PathNodeId> {
        self.nodes[id.0].parent
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: PathNodeId) -> impl Iterator<Item = PathNodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    pub fn leaves(&self) -> Vec<PathNodeId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.nodes[id.0].children.is_empty() && *id != self.root())
            .collect()
    }

    /// All node ids, parents before children.
    pub fn preorder(&self) -> Vec<PathNodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// `true` if no node branches.
    pub fn is_unicast(&self) -> bool {
        self.nodes.iter().all(|n| n.children.len() <= 1)
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn route_to(&self, id: PathNodeId) -> Vec<NodeRef> {
        let mut route: Vec<NodeRef> = self.ancestors(id).map(|a| self.nodes[a.0].node).collect();
        route.reverse();
        route.push(self.nodes[id.0].node);
        route
    }

    /// First node that repeats one of its ancestors, if any.
    pub fn find_loop(&self) -> Option<PathNodeId> {
        self.preorder().into_iter().find(|&id| {
            let node = self.nodes[id.0].node;
            self.ancestors(id).any(|a| self.nodes[a.0].node == node)
        })
    }

    pub(crate) fn attach_fragment(&mut self, id: PathNodeId, fragment: FragmentId) {
        self.nodes[id.0].fragments.push(fragment);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceId, SwitchId};

    fn d(i: usize) -> NodeRef {
        NodeRef::Device(DeviceId(i))
    }
    fn s(i: usize) -> NodeRef {
        NodeRef::Switch(SwitchId(i))
    }

    #[test]
    fn common_prefixes_are_merged() {
        let tree = PathTree::from_paths(
            d(0),
            &[
                vec![(s(0), None), (s(1), None), (d(1), None)],
                vec![(s(0), None), (s(2), None), (d(2), None)],
            ],
        );
        // root, s0, s1, d1, s2, d2
        assert_eq!(tree.len(), 6);
        assert!(!tree.is_unicast());
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(tree.route_to(leaves[0]), vec![d(0), s(0), s(1), d(1)]);
        assert_eq!(tree.route_to(leaves[1]), vec![d(0), s(0), s(2), d(2)]);
    }

    #[test]
    fn ancestors_walk_upwards() {
        let tree = PathTree::from_paths(d(0), &[vec![(s(0), None), (s(1), None), (d(1), None)]]);
        let leaf = tree.leaves()[0];
        let up: Vec<NodeRef> = tree.ancestors(leaf).map(|a| tree.node(a).node).collect();
        assert_eq!(up, vec![s(1), s(0), d(0)]);
        assert!(tree.is_unicast());
    }

    #[test]
    fn merged_priority_fills_unset_and_keeps_first() {
        let tree = PathTree::from_paths(
            d(0),
            &[
                vec![(s(0), None), (d(1), None)],
                vec![(s(0), Some(3)), (d(2), None)],
                vec![(s(0), Some(5)), (d(3), None)],
            ],
        );
        let s0 = tree.children(tree.root())[0];
        assert_eq!(tree.node(s0).priority, Some(3));
        assert_eq!(tree.children(s0).len(), 3);
    }

    #[test]
    fn loops_are_found() {
        let tree = PathTree::from_paths(d(0), &[vec![(s(0), None), (s(1), None), (s(0), None), (d(1), None)]]);
        assert!(tree.find_loop().is_some());
        let ok = PathTree::from_paths(d(0), &[vec![(s(0), None), (d(1), None)]]);
        assert!(ok.find_loop().is_none());
    }
}
