// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-capacity node arena and the tree links threaded through it.
//!
//! Nodes refer to each other by pool index only. Free slots form a singly
//! linked chain through the same array, so allocation and release are O(1).
//! Structural misuse (releasing a free slot, linking an attached node) is a
//! broken invariant and panics.

use std::collections::HashSet;
use std::sync::Arc;

use crate::content::{ContentCache, ContentProvider};
use crate::types::{NodeRef, NodeType, Pid};

pub type NodeIndex = usize;

/// What a node is; dispatch on reads matches on this
#[derive(Clone)]
pub enum NodeKind {
    Directory,
    Info(Arc<dyn ContentProvider>),
    Service { owner: Pid },
    ServiceQueue { client: Pid },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Directory => NodeType::Directory,
            NodeKind::Info(_) => NodeType::Info,
            NodeKind::Service { .. } => NodeType::Service,
            NodeKind::ServiceQueue { .. } => NodeType::ServiceQueue,
        }
    }
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Directory => f.write_str("Directory"),
            NodeKind::Info(_) => f.write_str("Info(..)"),
            NodeKind::Service { owner } => f.debug_struct("Service").field("owner", owner).finish(),
            NodeKind::ServiceQueue { client } => {
                f.debug_struct("ServiceQueue").field("client", client).finish()
            }
        }
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub content: ContentCache,
    parent: Option<NodeIndex>,
    first_child: Option<NodeIndex>,
    last_child: Option<NodeIndex>,
    prev: Option<NodeIndex>,
    next: Option<NodeIndex>,
}

impl Node {
    pub fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            content: ContentCache::default(),
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
        }
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeIndex> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeIndex> {
        self.last_child
    }

    pub fn next_sibling(&self) -> Option<NodeIndex> {
        self.next
    }

    fn is_detached(&self) -> bool {
        self.parent.is_none() && self.prev.is_none() && self.next.is_none()
    }
}

#[derive(Debug)]
enum Slot {
    Free { next: Option<NodeIndex> },
    Used(Node),
}

#[derive(Debug)]
pub struct NodePool {
    slots: Vec<Slot>,
    free_head: Option<NodeIndex>,
    used: usize,
}

impl NodePool {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| Slot::Free {
                next: (i + 1 < capacity).then_some(i + 1),
            })
            .collect();
        Self {
            slots,
            free_head: (capacity > 0).then_some(0),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Take the free-list head for `node`; on exhaustion the node is handed back
    pub fn allocate(&mut self, node: Node) -> Result<NodeIndex, Node> {
        let Some(index) = self.free_head else {
            return Err(node);
        };
        let next = match &self.slots[index] {
            Slot::Free { next } => *next,
            Slot::Used(_) => panic!("free list head {index} is in use"),
        };
        self.slots[index] = Slot::Used(node);
        self.free_head = next;
        self.used += 1;
        Ok(index)
    }

    /// Return a detached, childless node to the free list
    pub fn release(&mut self, index: NodeIndex) -> Node {
        let node = std::mem::replace(
            &mut self.slots[index],
            Slot::Free {
                next: self.free_head,
            },
        );
        match node {
            Slot::Used(node) => {
                assert!(node.is_detached(), "released node {index} is still linked");
                assert!(node.first_child.is_none(), "released node {index} still has children");
                self.free_head = Some(index);
                self.used -= 1;
                node
            }
            Slot::Free { .. } => panic!("double release of node {index}"),
        }
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        match self.slots.get(index)? {
            Slot::Used(node) => Some(node),
            Slot::Free { .. } => None,
        }
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        match self.slots.get_mut(index)? {
            Slot::Used(node) => Some(node),
            Slot::Free { .. } => None,
        }
    }

    /// Live node by index; callers hold indices obtained from the tree itself
    pub fn node(&self, index: NodeIndex) -> &Node {
        self.get(index).unwrap_or_else(|| panic!("node {index} is not live"))
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        self.get_mut(index).unwrap_or_else(|| panic!("node {index} is not live"))
    }

    /// Append `child` at the tail of `parent`'s children
    pub fn append_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        let last = self.node(parent).last_child;
        {
            let node = self.node_mut(child);
            assert!(node.is_detached(), "node {child} is already linked");
            node.parent = Some(parent);
            node.prev = last;
            node.next = None;
        }
        match last {
            Some(last) => self.node_mut(last).next = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        let parent_node = self.node_mut(parent);
        parent_node.last_child = Some(child);
        parent_node.content.invalidate();
    }

    /// Splice `child` out of `parent`'s children, wherever it sits
    pub fn remove_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        let (prev, next) = {
            let node = self.node_mut(child);
            assert_eq!(node.parent, Some(parent), "node {child} is not a child of {parent}");
            node.parent = None;
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        self.node_mut(parent).content.invalidate();
    }

    pub fn children(&self, parent: NodeIndex) -> Children<'_> {
        Children {
            pool: self,
            cursor: self.node(parent).first_child,
        }
    }

    pub fn child_count(&self, parent: NodeIndex) -> usize {
        self.children(parent).count()
    }

    /// Linear scan of the sibling list for an exact name match
    pub fn find_child(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.children(parent).find(|(_, node)| node.name == name).map(|(index, _)| index)
    }

    /// Check the structural invariants: every live node hangs off `root`
    /// exactly once, sibling names are unique, links agree in both
    /// directions, and the free list covers exactly the free slots.
    pub fn verify(&self, root: NodeIndex) -> Result<(), String> {
        let root_node = self.get(root).ok_or_else(|| format!("root {root} is not live"))?;
        if root_node.parent.is_some() {
            return Err("root has a parent".to_string());
        }

        let mut reachable = 0usize;
        let mut seen = vec![false; self.slots.len()];
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut seen[index], true) {
                return Err(format!("node {index} is reachable twice"));
            }
            reachable += 1;
            let node = self.node(index);
            let mut names = HashSet::new();
            let mut prev = None;
            let mut cursor = node.first_child;
            while let Some(child) = cursor {
                let child_node =
                    self.get(child).ok_or_else(|| format!("child {child} of {index} is free"))?;
                if child_node.parent != Some(index) {
                    return Err(format!("child {child} does not point back to {index}"));
                }
                if child_node.prev != prev {
                    return Err(format!("broken prev link at {child}"));
                }
                if !names.insert(child_node.name.as_str()) {
                    return Err(format!("duplicate name {:?} under {index}", child_node.name));
                }
                stack.push(child);
                prev = Some(child);
                cursor = child_node.next;
            }
            if node.last_child != prev {
                return Err(format!("last child of {index} is stale"));
            }
        }
        if reachable != self.used {
            return Err(format!("{} live nodes but {reachable} reachable", self.used));
        }

        let mut free = 0usize;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            match self.slots.get(index) {
                Some(Slot::Free { next }) => {
                    free += 1;
                    if free > self.slots.len() {
                        return Err("free list has a cycle".to_string());
                    }
                    cursor = *next;
                }
                _ => return Err(format!("free list reaches live slot {index}")),
            }
        }
        if free + self.used != self.slots.len() {
            return Err(format!(
                "free list holds {free} slots, expected {}",
                self.slots.len() - self.used
            ));
        }
        Ok(())
    }
}

/// Iterator over `(index, node)` of one node's children in sibling order
pub struct Children<'a> {
    pool: &'a NodePool,
    cursor: Option<NodeIndex>,
}

impl<'a> Iterator for Children<'a> {
    type Item = (NodeIndex, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.pool.node(index);
        self.cursor = node.next;
        Some((index, node))
    }
}

/// Virtual reference of a pool index
pub fn node_ref(index: NodeIndex) -> NodeRef {
    NodeRef::virtual_node(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str) -> Node {
        Node::new(name.to_string(), NodeKind::Directory)
    }

    fn names(pool: &NodePool, parent: NodeIndex) -> Vec<String> {
        pool.children(parent).map(|(_, n)| n.name.clone()).collect()
    }

    #[test]
    fn allocate_until_exhausted() {
        let mut pool = NodePool::with_capacity(2);
        let a = pool.allocate(dir("a")).expect("a");
        let b = pool.allocate(dir("b")).expect("b");
        assert_ne!(a, b);
        assert_eq!(pool.used(), 2);

        let rejected = pool.allocate(dir("c")).expect_err("pool is full");
        assert_eq!(rejected.name, "c");
    }

    #[test]
    fn released_slot_is_reused_first() {
        let mut pool = NodePool::with_capacity(3);
        let _a = pool.allocate(dir("a")).expect("a");
        let b = pool.allocate(dir("b")).expect("b");
        let released = pool.release(b);
        assert_eq!(released.name, "b");
        assert!(pool.get(b).is_none());
        assert_eq!(pool.allocate(dir("c")).expect("c"), b);
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut pool = NodePool::with_capacity(8);
        let root = pool.allocate(dir("")).expect("root");
        for name in ["a", "b", "c"] {
            let child = pool.allocate(dir(name)).expect("child");
            pool.append_child(root, child);
        }
        assert_eq!(names(&pool, root), ["a", "b", "c"]);
        assert!(pool.verify(root).is_ok());
    }

    #[test]
    fn remove_from_any_position() {
        let mut pool = NodePool::with_capacity(8);
        let root = pool.allocate(dir("")).expect("root");
        let mut kids = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let child = pool.allocate(dir(name)).expect("child");
            pool.append_child(root, child);
            kids.push(child);
        }

        pool.remove_child(root, kids[1]);
        assert_eq!(names(&pool, root), ["a", "c", "d"]);
        pool.remove_child(root, kids[0]);
        assert_eq!(names(&pool, root), ["c", "d"]);
        pool.remove_child(root, kids[3]);
        assert_eq!(names(&pool, root), ["c"]);
        assert_eq!(pool.node(root).first_child(), pool.node(root).last_child());

        pool.release(kids[0]);
        pool.release(kids[1]);
        pool.release(kids[3]);
        assert!(pool.verify(root).is_ok());

        let e = pool.allocate(dir("e")).expect("e");
        pool.append_child(root, e);
        assert_eq!(names(&pool, root), ["c", "e"]);
    }

    #[test]
    fn mutation_invalidates_parent_content() {
        let mut pool = NodePool::with_capacity(4);
        let root = pool.allocate(dir("")).expect("root");
        pool.node_mut(root).content.store(vec![1, 2, 3]);

        let child = pool.allocate(dir("x")).expect("x");
        pool.append_child(root, child);
        assert!(!pool.node(root).content.is_built());

        pool.node_mut(root).content.store(vec![1]);
        pool.remove_child(root, child);
        assert!(!pool.node(root).content.is_built());
    }

    #[test]
    fn find_child_matches_exact_name() {
        let mut pool = NodePool::with_capacity(4);
        let root = pool.allocate(dir("")).expect("root");
        let sys = pool.allocate(dir("system")).expect("system");
        pool.append_child(root, sys);
        assert_eq!(pool.find_child(root, "system"), Some(sys));
        assert_eq!(pool.find_child(root, "sys"), None);
        assert_eq!(pool.find_child(root, "systems"), None);
    }

    #[test]
    fn verify_catches_unreachable_node() {
        let mut pool = NodePool::with_capacity(4);
        let root = pool.allocate(dir("")).expect("root");
        let _orphan = pool.allocate(dir("orphan")).expect("orphan");
        assert!(pool.verify(root).is_err());
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_panics() {
        let mut pool = NodePool::with_capacity(2);
        let a = pool.allocate(dir("a")).expect("a");
        pool.release(a);
        pool.release(a);
    }

    #[test]
    #[should_panic(expected = "still linked")]
    fn releasing_attached_node_panics() {
        let mut pool = NodePool::with_capacity(2);
        let root = pool.allocate(dir("")).expect("root");
        let a = pool.allocate(dir("a")).expect("a");
        pool.append_child(root, a);
        pool.release(a);
    }
}
