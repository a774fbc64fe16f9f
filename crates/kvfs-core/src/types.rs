// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the namespace

use serde::Serialize;

/// Longest node name, leaving room for the terminating NUL in a directory record
pub const MAX_NAME_LEN: usize = 59;

/// Size of one directory listing record: node reference plus NUL-padded name
pub const DIR_RECORD_SIZE: usize = 64;

const NAME_FIELD: usize = DIR_RECORD_SIZE - 4;
const VIRTUAL_TAG: u32 = 1 << 31;

/// Externally visible node reference.
///
/// The high bit tags nodes living in the in-kernel pool; references without
/// it name nodes of the external filesystem server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeRef(u32);

impl NodeRef {
    /// Largest pool index that can still be tagged
    pub const MAX_INDEX: usize = (VIRTUAL_TAG - 1) as usize;

    pub fn virtual_node(index: usize) -> Self {
        assert!(index <= Self::MAX_INDEX, "pool index {index} collides with the virtual tag");
        NodeRef(index as u32 | VIRTUAL_TAG)
    }

    pub fn real(node: u32) -> Self {
        NodeRef(node & !VIRTUAL_TAG)
    }

    pub fn from_raw(raw: u32) -> Self {
        NodeRef(raw)
    }

    pub fn is_virtual(self) -> bool {
        self.0 & VIRTUAL_TAG != 0
    }

    /// Pool index for virtual nodes, server node number for real ones
    pub fn index(self) -> usize {
        (self.0 & !VIRTUAL_TAG) as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_virtual() {
            write!(f, "v{}", self.index())
        } else {
            write!(f, "r{}", self.index())
        }
    }
}

/// Process identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pid(pub u32);

impl Pid {
    /// Owner of services set up by the kernel itself (`/fs`)
    pub const KERNEL: Pid = Pid(0);
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access requested by an open
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
}

impl AccessMode {
    pub const READ: AccessMode = AccessMode { read: true, write: false };
    pub const WRITE: AccessMode = AccessMode { read: false, write: true };
    pub const READ_WRITE: AccessMode = AccessMode { read: true, write: true };

    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    /// Wire flags: bit 0 read, bit 1 write
    pub fn flags(self) -> u32 {
        (self.read as u32) | ((self.write as u32) << 1)
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.read { "r" } else { "-" })?;
        f.write_str(if self.write { "w" } else { "-" })
    }
}

/// Index into the global file table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileIndex(pub usize);

impl std::fmt::Display for FileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process descriptor handed back to the caller of `open`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocalFd(pub i32);

/// Node kind as reported by diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Directory,
    Info,
    Service,
    ServiceQueue,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NodeType::Directory => "directory",
            NodeType::Info => "info",
            NodeType::Service => "service",
            NodeType::ServiceQueue => "service-queue",
        })
    }
}

/// Occupancy counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VfsStats {
    pub nodes_used: usize,
    pub node_capacity: usize,
    pub files_used: usize,
    pub file_capacity: usize,
    pub services: usize,
    pub processes: usize,
}

/// One entry of a directory listing as produced by the content cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirRecord {
    pub node: NodeRef,
    pub name: String,
}

impl DirRecord {
    /// Append the fixed-size encoding of this record to `out`
    pub fn encode_into(node: NodeRef, name: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(&node.raw().to_le_bytes());
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_NAME_LEN);
        out.extend_from_slice(&bytes[..len]);
        out.resize(out.len() + NAME_FIELD - len, 0);
    }

    pub fn decode(record: &[u8]) -> Option<DirRecord> {
        if record.len() < DIR_RECORD_SIZE {
            return None;
        }
        let raw = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let field = &record[4..DIR_RECORD_SIZE];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name = std::str::from_utf8(&field[..end]).ok()?.to_string();
        Some(DirRecord {
            node: NodeRef::from_raw(raw),
            name,
        })
    }

    /// Decode every complete record of a listing; a trailing partial record is ignored
    pub fn decode_all(listing: &[u8]) -> Vec<DirRecord> {
        listing.chunks_exact(DIR_RECORD_SIZE).filter_map(DirRecord::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_tag_is_separate_from_index() {
        let v = NodeRef::virtual_node(3);
        assert!(v.is_virtual());
        assert_eq!(v.index(), 3);
        assert_eq!(v.to_string(), "v3");

        let r = NodeRef::real(3);
        assert!(!r.is_virtual());
        assert_eq!(r.index(), 3);
        assert_ne!(v, r);
    }

    #[test]
    fn access_mode_flags() {
        assert_eq!(AccessMode::READ.flags(), 1);
        assert_eq!(AccessMode::WRITE.flags(), 2);
        assert_eq!(AccessMode::READ_WRITE.flags(), 3);
        assert!(AccessMode::default().is_empty());
        assert_eq!(AccessMode::READ_WRITE.to_string(), "rw");
    }

    #[test]
    fn dir_record_layout() {
        let mut out = Vec::new();
        DirRecord::encode_into(NodeRef::virtual_node(1), "fs", &mut out);
        assert_eq!(out.len(), DIR_RECORD_SIZE);
        assert_eq!(&out[4..6], b"fs");
        assert!(out[6..].iter().all(|&b| b == 0));

        let decoded = DirRecord::decode(&out).expect("record");
        assert_eq!(decoded.node, NodeRef::virtual_node(1));
        assert_eq!(decoded.name, "fs");
    }

    #[test]
    fn dir_record_name_keeps_terminator() {
        let long = "x".repeat(80);
        let mut out = Vec::new();
        DirRecord::encode_into(NodeRef::virtual_node(9), &long, &mut out);
        assert_eq!(out.len(), DIR_RECORD_SIZE);
        assert_eq!(out[DIR_RECORD_SIZE - 1], 0);
        assert_eq!(DirRecord::decode(&out).expect("record").name.len(), MAX_NAME_LEN);
    }
}
