// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lazily built content of directory and info nodes

use crate::error::{FsError, FsResult};
use crate::types::{DirRecord, NodeRef, DIR_RECORD_SIZE};

/// Produces the bytes behind an info node (process stats, service stats, ...).
///
/// Unlike a `(node, buffer, offset, count)` callback, a provider returns the
/// whole content at once and the namespace serves offsets out of it. The
/// output is cached on the node while a handle on it is open, so a reader
/// sees one consistent snapshot for the lifetime of its handle.
pub trait ContentProvider: Send + Sync {
    fn generate(&self, node: NodeRef) -> FsResult<Vec<u8>>;
}

impl<F> ContentProvider for F
where
    F: Fn(NodeRef) -> FsResult<Vec<u8>> + Send + Sync,
{
    fn generate(&self, node: NodeRef) -> FsResult<Vec<u8>> {
        self(node)
    }
}

/// Memoized content buffer; `None` means not yet built
#[derive(Debug, Default)]
pub struct ContentCache {
    data: Option<Vec<u8>>,
}

impl ContentCache {
    pub fn is_built(&self) -> bool {
        self.data.is_some()
    }

    pub fn len(&self) -> Option<usize> {
        self.data.as_ref().map(Vec::len)
    }

    pub fn get(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Keep `data` unless another builder got there first
    pub fn store(&mut self, data: Vec<u8>) -> &[u8] {
        self.data.get_or_insert(data)
    }

    pub fn invalidate(&mut self) {
        self.data = None;
    }
}

/// Copy `[offset, offset + buf.len())` of `data` into `buf`, clamped to the data
pub fn copy_window(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

/// Encode a directory listing: one fixed-size record per child, in sibling order
pub fn build_listing<'a, I>(children: I, count: usize) -> FsResult<Vec<u8>>
where
    I: IntoIterator<Item = (NodeRef, &'a str)>,
{
    let size = count.checked_mul(DIR_RECORD_SIZE).ok_or(FsError::OutOfMemory)?;
    let mut listing = Vec::new();
    listing.try_reserve_exact(size).map_err(|_| FsError::OutOfMemory)?;
    for (node, name) in children {
        DirRecord::encode_into(node, name, &mut listing);
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_clamped() {
        let data = b"0123456789";
        let mut buf = [0u8; 4];
        assert_eq!(copy_window(data, 0, &mut buf), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(copy_window(data, 8, &mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(copy_window(data, 10, &mut buf), 0);
        assert_eq!(copy_window(data, u64::MAX, &mut buf), 0);
    }

    #[test]
    fn cache_store_keeps_first_value() {
        let mut cache = ContentCache::default();
        assert!(!cache.is_built());
        assert_eq!(cache.store(b"first".to_vec()), b"first");
        assert_eq!(cache.store(b"second".to_vec()), b"first");
        assert_eq!(cache.len(), Some(5));
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn listing_has_one_record_per_child() {
        let children = [(NodeRef::virtual_node(1), "fs"), (NodeRef::virtual_node(2), "system")];
        let listing = build_listing(children, 2).expect("listing");
        assert_eq!(listing.len(), 2 * DIR_RECORD_SIZE);
        let records = DirRecord::decode_all(&listing);
        assert_eq!(records[0].name, "fs");
        assert_eq!(records[1].node, NodeRef::virtual_node(2));
    }

    #[test]
    fn closures_are_providers() {
        let provider = |node: NodeRef| -> FsResult<Vec<u8>> { Ok(format!("node {node}").into_bytes()) };
        assert_eq!(provider.generate(NodeRef::virtual_node(7)).expect("content"), b"node v7");
    }
}
