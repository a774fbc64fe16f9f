// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path normalization and tree resolution

use crate::error::{FsError, FsResult, Unsupported};
use crate::pool::{node_ref, NodeIndex, NodeKind, NodePool};
use crate::types::{NodeRef, Pid};

/// Canonicalize `path` without consulting the tree.
///
/// Repeated slashes collapse, `.` is dropped and `..` removes the preceding
/// component. At the root of an absolute path `..` has no effect; in a
/// relative path an unmatched `..` is kept. An absolute path that collapses
/// entirely becomes `/`, a relative one becomes the empty string.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut out = String::with_capacity(path.len().max(1));
    if absolute {
        out.push('/');
    }
    let base = out.len();
    // components in `out` that a later `..` may remove
    let mut depth = 0usize;

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." if depth > 0 => {
                let cut = out[base..].rfind('/').map_or(base, |i| base + i);
                out.truncate(cut);
                depth -= 1;
            }
            ".." if absolute => {}
            _ => {
                if out.len() > base {
                    out.push('/');
                }
                out.push_str(component);
                if component != ".." {
                    depth += 1;
                }
            }
        }
    }
    out
}

/// Outcome of walking a path through the tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The path names a node of the tree
    Node(NodeRef),
    /// The walk reached a service with components left; the remainder
    /// (without a leading slash) belongs to the service's owner
    Service {
        service: NodeRef,
        owner: Pid,
        remainder: String,
    },
}

/// Walk an absolute path from `root`, one component at a time
pub fn walk(pool: &NodePool, root: NodeIndex, path: &str) -> FsResult<Resolution> {
    let mut rest = path
        .strip_prefix('/')
        .ok_or(FsError::UnsupportedOperation(Unsupported::RelativePath))?;
    let mut current = root;

    loop {
        let rest_trimmed = rest.trim_start_matches('/');
        if rest_trimmed.is_empty() {
            return Ok(Resolution::Node(node_ref(current)));
        }
        if let NodeKind::Service { owner } = pool.node(current).kind {
            return Ok(Resolution::Service {
                service: node_ref(current),
                owner,
                remainder: rest_trimmed.to_string(),
            });
        }
        let (component, remainder) = rest_trimmed.split_once('/').unwrap_or((rest_trimmed, ""));
        current = pool.find_child(current, component).ok_or(FsError::NodeNotFound)?;
        rest = remainder;
    }
}
