// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Diagnostic dumps and invariant checks

use std::collections::HashSet;
use std::fmt::Write;

use serde::Serialize;

use crate::error::FsResult;
use crate::pool::{node_ref, NodeIndex, NodeKind, NodePool};
use crate::types::{NodeRef, NodeType, Pid, VfsStats};
use crate::vfs::{live, Namespace, PROCESSES, ROOT, SERVICES};

/// Snapshot of one node for display
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeInfo {
    pub node: NodeRef,
    pub name: String,
    pub kind: NodeType,
    pub parent: Option<NodeRef>,
    pub children: usize,
    pub owner: Option<Pid>,
    pub content_len: Option<usize>,
}

impl Namespace {
    /// Indented listing of the whole tree
    pub fn dump_tree(&self) -> String {
        let tree = self.tree();
        let mut out = String::from("/\n");
        print_level(&tree, ROOT, 0, &mut out);
        out
    }

    /// One block per active entry of the global file table
    pub fn dump_file_table(&self) -> String {
        let files = self.files();
        let mut out = String::from("Global File Table:\n");
        for (index, entry) in files.iter() {
            let _ = writeln!(out, "\tfile @ index {index}");
            let _ = writeln!(out, "\t\tread: {}", entry.mode.read);
            let _ = writeln!(out, "\t\twrite: {}", entry.mode.write);
            let env = if entry.node.is_virtual() { "virtual" } else { "real" };
            let _ = writeln!(out, "\t\tenv: {env}");
            let _ = writeln!(out, "\t\tnode: {}", entry.node.index());
            let _ = writeln!(out, "\t\tpos: {}", entry.position);
            let _ = writeln!(out, "\t\trefCount: {}", entry.ref_count);
            if entry.detached {
                let _ = writeln!(out, "\t\tdetached");
            }
        }
        out
    }

    pub fn describe_node(&self, node: NodeRef) -> FsResult<NodeInfo> {
        let tree = self.tree();
        let entry = live(&tree, node)?;
        let owner = match entry.kind {
            NodeKind::Service { owner } => Some(owner),
            NodeKind::ServiceQueue { client } => Some(client),
            NodeKind::Directory | NodeKind::Info(_) => None,
        };
        Ok(NodeInfo {
            node,
            name: entry.name.clone(),
            kind: entry.kind.node_type(),
            parent: entry.parent().map(node_ref),
            children: tree.child_count(node.index()),
            owner,
            content_len: entry.content.len(),
        })
    }

    pub fn open_file_count(&self) -> usize {
        self.files().used()
    }

    pub fn stats(&self) -> VfsStats {
        let files = self.files();
        let tree = self.tree();
        VfsStats {
            nodes_used: tree.used(),
            node_capacity: tree.capacity(),
            files_used: files.used(),
            file_capacity: files.capacity(),
            services: tree.child_count(SERVICES),
            processes: tree.child_count(PROCESSES),
        }
    }

    /// Check the tree, the free list and the file table. Any error here
    /// means the namespace is corrupt.
    pub fn verify_invariants(&self) -> Result<(), String> {
        let files = self.files();
        let tree = self.tree();
        tree.verify(ROOT)?;

        let mut writers = HashSet::new();
        let mut active = 0usize;
        for (index, entry) in files.iter() {
            active += 1;
            if entry.ref_count == 0 {
                return Err(format!("file {index} is active with no references"));
            }
            if entry.mode.write && !entry.detached && !writers.insert(entry.node) {
                return Err(format!("second writer on {} at file {index}", entry.node));
            }
        }
        if active != files.used() {
            return Err(format!("{active} active files, {} counted", files.used()));
        }
        Ok(())
    }
}

fn print_level(tree: &NodePool, parent: NodeIndex, level: usize, out: &mut String) {
    for (index, node) in tree.children(parent) {
        out.push_str(&" |".repeat(level));
        let _ = match node.kind {
            NodeKind::Service { owner } => writeln!(out, "- {} (service, owner {owner})", node.name),
            NodeKind::ServiceQueue { client } => writeln!(out, "- {} (queued {client})", node.name),
            NodeKind::Directory | NodeKind::Info(_) => writeln!(out, "- {}", node.name),
        };
        print_level(tree, index, level + 1, out);
    }
}
