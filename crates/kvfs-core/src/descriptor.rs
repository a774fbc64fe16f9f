// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-process descriptor mapping (local handle <-> global file index)

use crate::error::{FsError, FsResult};
use crate::types::{FileIndex, LocalFd};

/// Owned by each process; the namespace only ever sees global indices
#[cfg_attr(test, mockall::automock)]
pub trait DescriptorTable {
    fn allocate(&mut self, file: FileIndex) -> FsResult<LocalFd>;
    fn resolve(&self, fd: LocalFd) -> FsResult<FileIndex>;
    fn release(&mut self, fd: LocalFd) -> FsResult<FileIndex>;
}

/// Fixed-size table handing out the lowest free descriptor
#[derive(Debug, Clone)]
pub struct FixedDescriptorTable {
    slots: Vec<Option<FileIndex>>,
}

impl FixedDescriptorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn slot(&self, fd: LocalFd) -> Option<usize> {
        usize::try_from(fd.0).ok().filter(|&i| i < self.slots.len())
    }
}

impl DescriptorTable for FixedDescriptorTable {
    fn allocate(&mut self, file: FileIndex) -> FsResult<LocalFd> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::NoFreeDescriptor)?;
        let fd = i32::try_from(index).map_err(|_| FsError::NoFreeDescriptor)?;
        self.slots[index] = Some(file);
        Ok(LocalFd(fd))
    }

    fn resolve(&self, fd: LocalFd) -> FsResult<FileIndex> {
        self.slot(fd).and_then(|i| self.slots[i]).ok_or(FsError::InvalidDescriptor)
    }

    fn release(&mut self, fd: LocalFd) -> FsResult<FileIndex> {
        let index = self.slot(fd).ok_or(FsError::InvalidDescriptor)?;
        self.slots[index].take().ok_or(FsError::InvalidDescriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_descriptor_first() {
        let mut fds = FixedDescriptorTable::new(2);
        assert_eq!(fds.allocate(FileIndex(7)), Ok(LocalFd(0)));
        assert_eq!(fds.allocate(FileIndex(7)), Ok(LocalFd(1)));
        assert_eq!(fds.allocate(FileIndex(3)), Err(FsError::NoFreeDescriptor));

        assert_eq!(fds.release(LocalFd(0)), Ok(FileIndex(7)));
        assert_eq!(fds.allocate(FileIndex(3)), Ok(LocalFd(0)));
        assert_eq!(fds.resolve(LocalFd(0)), Ok(FileIndex(3)));
        assert_eq!(fds.open_count(), 2);
    }

    #[test]
    fn bad_descriptors() {
        let mut fds = FixedDescriptorTable::new(2);
        assert_eq!(fds.resolve(LocalFd(-1)), Err(FsError::InvalidDescriptor));
        assert_eq!(fds.resolve(LocalFd(1)), Err(FsError::InvalidDescriptor));
        assert_eq!(fds.release(LocalFd(9)), Err(FsError::InvalidDescriptor));
    }
}
