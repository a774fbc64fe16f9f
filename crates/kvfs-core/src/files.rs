// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Global file table: active (node, mode) pairs shared by every process

use crate::error::{FsError, FsResult};
use crate::types::{AccessMode, FileIndex, NodeRef};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub mode: AccessMode,
    pub ref_count: usize,
    pub position: u64,
    pub node: NodeRef,
    /// The node was destroyed while this entry was open. The entry only
    /// waits for its handles to close and never matches a new open.
    pub detached: bool,
}

/// Where an open lands in the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    /// An entry with the same node and mode already exists
    Shared(FileIndex),
    /// First free slot seen during the scan
    Fresh(FileIndex),
}

#[derive(Debug)]
pub struct FileTable {
    slots: Vec<Option<FileEntry>>,
    used: usize,
}

impl FileTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Scan for a reusable entry, remembering the first free slot.
    ///
    /// A second writer on a node is refused. Callers must hold the table
    /// exclusively from this scan until `commit`.
    pub fn find_slot(&self, mode: AccessMode, node: NodeRef) -> FsResult<Claim> {
        let mut free = None;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                None => {
                    if free.is_none() {
                        free = Some(index);
                    }
                }
                Some(entry) if entry.node == node && !entry.detached => {
                    if mode.write && entry.mode.write {
                        return Err(FsError::FileInUse);
                    }
                    if entry.mode == mode {
                        return Ok(Claim::Shared(FileIndex(index)));
                    }
                }
                Some(_) => {}
            }
        }
        free.map(|index| Claim::Fresh(FileIndex(index))).ok_or(FsError::NoFreeFileSlot)
    }

    pub fn commit(&mut self, claim: Claim, mode: AccessMode, node: NodeRef) -> FileIndex {
        match claim {
            Claim::Shared(index) => {
                let entry = self.slots[index.0]
                    .as_mut()
                    .unwrap_or_else(|| panic!("shared file {index} is not in use"));
                entry.ref_count += 1;
                index
            }
            Claim::Fresh(index) => {
                let slot = &mut self.slots[index.0];
                assert!(slot.is_none(), "fresh file {index} is already in use");
                *slot = Some(FileEntry {
                    mode,
                    ref_count: 1,
                    position: 0,
                    node,
                    detached: false,
                });
                self.used += 1;
                index
            }
        }
    }

    pub fn get(&self, index: FileIndex) -> FsResult<&FileEntry> {
        self.slots.get(index.0).and_then(Option::as_ref).ok_or(FsError::InvalidFile)
    }

    pub fn get_mut(&mut self, index: FileIndex) -> FsResult<&mut FileEntry> {
        self.slots.get_mut(index.0).and_then(Option::as_mut).ok_or(FsError::InvalidFile)
    }

    /// Drop one reference; the entry is returned once its last reference is gone
    pub fn release(&mut self, index: FileIndex) -> FsResult<Option<FileEntry>> {
        let slot = self.slots.get_mut(index.0).ok_or(FsError::InvalidFile)?;
        let entry = slot.as_mut().ok_or(FsError::InvalidFile)?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(None);
        }
        self.used -= 1;
        Ok(slot.take())
    }

    /// Whether any live entry targets `node`
    pub fn references(&self, node: NodeRef) -> bool {
        self.iter().any(|(_, entry)| entry.node == node && !entry.detached)
    }

    /// Cut every entry on `node` loose from it. Returns how many were open.
    pub fn detach(&mut self, node: NodeRef) -> usize {
        let mut count = 0;
        for entry in self.slots.iter_mut().flatten() {
            if entry.node == node && !entry.detached {
                entry.detached = true;
                count += 1;
            }
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileIndex, &FileEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (FileIndex(index), entry)))
    }
}
