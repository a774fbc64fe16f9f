// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The namespace: node tree, global file table and the operations over them.
//!
//! Two locks guard the shared state. When both are needed the file table is
//! taken before the tree. Neither is held while a device channel call or an
//! info provider is running, since either may re-enter the namespace.

use std::sync::{Arc, Mutex, MutexGuard};

use kvfs_proto::{DeviceRequest, MAX_TRANSFER};
use tracing::{debug, info, warn};

use crate::config::VfsConfig;
use crate::content::{build_listing, copy_window};
use crate::descriptor::DescriptorTable;
use crate::error::{FsError, FsResult, Unsupported};
use crate::fault::{FaultInjector, FaultOp};
use crate::files::{Claim, FileTable};
use crate::forward::{expect_opened, expect_transferred, DeviceChannel};
use crate::path::{normalize, walk, Resolution};
use crate::pool::{node_ref, Node, NodeIndex, NodeKind, NodePool};
use crate::types::{AccessMode, DirRecord, FileIndex, LocalFd, NodeRef, Pid};

pub(crate) const ROOT: NodeIndex = 0;
pub(crate) const FS: NodeIndex = 1;
pub(crate) const SYSTEM: NodeIndex = 2;
pub(crate) const PROCESSES: NodeIndex = 3;
pub(crate) const SERVICES: NodeIndex = 4;

pub struct Namespace {
    pub(crate) config: VfsConfig,
    pub(crate) tree: Mutex<NodePool>,
    pub(crate) files: Mutex<FileTable>,
    pub(crate) fs_channel: Mutex<Option<Arc<dyn DeviceChannel>>>,
    pub(crate) faults: FaultInjector,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::build(VfsConfig::default())
    }
}

impl Namespace {
    pub fn new(config: VfsConfig) -> FsResult<Self> {
        if let Err(err) = config.validate() {
            warn!(%err, "rejecting namespace config");
            return Err(FsError::InvalidArgument);
        }
        Ok(Self::build(config))
    }

    fn build(config: VfsConfig) -> Self {
        let mut tree = NodePool::with_capacity(config.limits.node_capacity);
        bootstrap(&mut tree);
        info!(
            nodes = config.limits.node_capacity,
            files = config.limits.file_capacity,
            "namespace initialized"
        );
        Self {
            tree: Mutex::new(tree),
            files: Mutex::new(FileTable::with_capacity(config.limits.file_capacity)),
            fs_channel: Mutex::new(None),
            faults: FaultInjector::new(),
            config,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn root(&self) -> NodeRef {
        node_ref(ROOT)
    }

    pub fn fs(&self) -> NodeRef {
        node_ref(FS)
    }

    pub fn system(&self) -> NodeRef {
        node_ref(SYSTEM)
    }

    pub fn processes(&self) -> NodeRef {
        node_ref(PROCESSES)
    }

    pub fn services(&self) -> NodeRef {
        node_ref(SERVICES)
    }

    pub fn fault_injector(&self) -> &FaultInjector {
        &self.faults
    }

    /// Connect the server that owns real nodes (the one behind `/fs`)
    pub fn attach_fs_channel(&self, channel: Arc<dyn DeviceChannel>) {
        *self.fs_channel.lock().unwrap() = Some(channel);
        info!("filesystem server attached");
    }

    pub fn detach_fs_channel(&self) {
        *self.fs_channel.lock().unwrap() = None;
    }

    pub(crate) fn tree(&self) -> MutexGuard<'_, NodePool> {
        self.tree.lock().unwrap()
    }

    pub(crate) fn files(&self) -> MutexGuard<'_, FileTable> {
        self.files.lock().unwrap()
    }

    fn fs_channel(&self) -> FsResult<Arc<dyn DeviceChannel>> {
        self.fs_channel
            .lock()
            .unwrap()
            .clone()
            .ok_or(FsError::UnsupportedOperation(Unsupported::NoDeviceChannel))
    }

    // Path resolution

    /// Resolve `path`, reporting a service that owns the rest of it
    pub fn lookup(&self, path: &str) -> FsResult<Resolution> {
        let canonical = normalize(path);
        let tree = self.tree();
        walk(&tree, ROOT, &canonical).inspect_err(|err| debug!(path, %err, "lookup failed"))
    }

    /// Resolve `path` to a node of the tree
    pub fn resolve(&self, path: &str) -> FsResult<NodeRef> {
        match self.lookup(path)? {
            Resolution::Node(node) => Ok(node),
            Resolution::Service { service, remainder, .. } => {
                debug!(path, %service, %remainder, "path continues into a service");
                Err(FsError::UnsupportedOperation(Unsupported::ServiceIndirection))
            }
        }
    }

    pub fn node_name(&self, node: NodeRef) -> FsResult<String> {
        let tree = self.tree();
        Ok(live(&tree, node)?.name.clone())
    }

    pub fn children(&self, node: NodeRef) -> FsResult<Vec<DirRecord>> {
        let tree = self.tree();
        live(&tree, node)?;
        Ok(tree
            .children(node.index())
            .map(|(index, child)| DirRecord {
                node: node_ref(index),
                name: child.name.clone(),
            })
            .collect())
    }

    // Content

    /// Copy `buf.len()` bytes of a directory or info node's content starting at `offset`.
    ///
    /// Directory listings are built on first use and kept until the node's
    /// children change or its last handle is closed. Info content is kept
    /// only while a handle is open on the node.
    pub fn provide(&self, node: NodeRef, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let provider = {
            let mut tree = self.tree();
            let entry = live(&tree, node)?;
            if let Some(data) = entry.content.get() {
                return Ok(copy_window(data, offset, buf));
            }
            match &entry.kind {
                NodeKind::Directory => {
                    self.faults.check(FaultOp::BuildContent)?;
                    let index = node.index();
                    let listing = build_listing(
                        tree.children(index).map(|(i, child)| (node_ref(i), child.name.as_str())),
                        tree.child_count(index),
                    )?;
                    debug!(%node, bytes = listing.len(), "directory listing built");
                    let data = tree.node_mut(index).content.store(listing);
                    return Ok(copy_window(data, offset, buf));
                }
                NodeKind::Info(provider) => Arc::clone(provider),
                NodeKind::Service { .. } | NodeKind::ServiceQueue { .. } => {
                    return Err(FsError::UnsupportedOperation(Unsupported::ServiceIo));
                }
            }
        };

        self.faults.check(FaultOp::BuildContent)?;
        let content = provider.generate(node)?;

        // only a handle's close frees the content, so without one it is not kept
        let files = self.files();
        let keep = files.references(node);
        let mut tree = self.tree();
        let entry = tree.get_mut(node.index()).ok_or(FsError::NodeNotFound)?;
        match &entry.kind {
            NodeKind::Info(current) if same_provider(current, &provider) => {
                if !keep {
                    return Ok(copy_window(&content, offset, buf));
                }
                let data = entry.content.store(content);
                Ok(copy_window(data, offset, buf))
            }
            // removed and the slot reused while the provider ran
            _ => Err(FsError::NodeNotFound),
        }
    }

    // Files

    /// Open `node` and hand back a descriptor from the caller's table
    pub fn open(
        &self,
        fds: &mut dyn DescriptorTable,
        mode: AccessMode,
        node: NodeRef,
    ) -> FsResult<LocalFd> {
        self.check_mode(mode)?;
        if !node.is_virtual() {
            // The device protocol has no close, so an open the server accepts
            // cannot be taken back. Refuse what the table would refuse before
            // sending it. A slot taken in between still leaves the server
            // with an open the table never records.
            self.files()
                .find_slot(mode, node)
                .inspect_err(|err| debug!(%node, %mode, %err, "open refused"))?;
            self.forward_open(node, mode)?;
        }

        let index = {
            let mut files = self.files();
            if node.is_virtual() {
                let tree = self.tree();
                live(&tree, node)?;
            }
            let claim = files
                .find_slot(mode, node)
                .inspect_err(|err| debug!(%node, %mode, %err, "open refused"))?;
            if let Claim::Fresh(_) = claim {
                self.faults.check(FaultOp::ClaimFile)?;
            }
            files.commit(claim, mode, node)
        };

        match fds.allocate(index) {
            Ok(fd) => {
                debug!(%node, %mode, file = %index, fd = fd.0, "opened");
                Ok(fd)
            }
            Err(err) => {
                debug!(%node, file = %index, %err, "no descriptor for opened file");
                self.release_file(index)?;
                Err(err)
            }
        }
    }

    /// Resolve `path` and open the node it names
    pub fn open_path(
        &self,
        fds: &mut dyn DescriptorTable,
        mode: AccessMode,
        path: &str,
    ) -> FsResult<LocalFd> {
        let node = self.resolve(path)?;
        self.open(fds, mode, node)
    }

    pub fn read(&self, fds: &dyn DescriptorTable, fd: LocalFd, buf: &mut [u8]) -> FsResult<usize> {
        let index = fds.resolve(fd)?;
        let (node, position) = {
            let files = self.files();
            let entry = files.get(index)?;
            if entry.detached {
                return Err(FsError::NodeNotFound);
            }
            if !entry.mode.read {
                return Err(FsError::NoReadPermission);
            }
            (entry.node, entry.position)
        };

        let n = if node.is_virtual() {
            self.provide(node, position, buf)?
        } else {
            self.forward_read(node, position, buf)?
        };
        self.advance(index, node, n)?;
        Ok(n)
    }

    pub fn write(&self, fds: &dyn DescriptorTable, fd: LocalFd, data: &[u8]) -> FsResult<usize> {
        let index = fds.resolve(fd)?;
        let (node, position) = {
            let files = self.files();
            let entry = files.get(index)?;
            if entry.detached {
                return Err(FsError::NodeNotFound);
            }
            if !entry.mode.write {
                return Err(FsError::NoWritePermission);
            }
            (entry.node, entry.position)
        };

        if node.is_virtual() {
            return Err(FsError::UnsupportedOperation(Unsupported::VirtualWrite));
        }
        let n = self.forward_write(node, position, data)?;
        self.advance(index, node, n)?;
        Ok(n)
    }

    pub fn close(&self, fds: &mut dyn DescriptorTable, fd: LocalFd) -> FsResult<()> {
        let index = fds.release(fd)?;
        self.release_file(index)?;
        debug!(fd = fd.0, file = %index, "closed");
        Ok(())
    }

    /// Drop one reference to a file entry. When the last handle on a virtual
    /// node goes away its content cache is freed.
    fn release_file(&self, index: FileIndex) -> FsResult<()> {
        let mut files = self.files();
        let Some(entry) = files.release(index)? else {
            return Ok(());
        };
        if entry.node.is_virtual() && !entry.detached && !files.references(entry.node) {
            let mut tree = self.tree();
            if let Some(node) = tree.get_mut(entry.node.index()) {
                node.content.invalidate();
            }
        }
        Ok(())
    }

    /// Move the cursor past a finished transfer. If the node was removed
    /// meanwhile, the bytes may belong to whatever took its slot and the
    /// transfer is reported as failed.
    fn advance(&self, index: FileIndex, node: NodeRef, n: usize) -> FsResult<()> {
        let mut files = self.files();
        match files.get_mut(index) {
            Ok(entry) if entry.node == node && entry.detached => {
                debug!(file = %index, %node, "node removed during transfer");
                Err(FsError::NodeNotFound)
            }
            Ok(entry) if entry.node == node => {
                entry.position += n as u64;
                Ok(())
            }
            _ => {
                warn!(file = %index, %node, "file changed during transfer, cursor not advanced");
                Ok(())
            }
        }
    }

    fn check_mode(&self, mode: AccessMode) -> FsResult<()> {
        if mode.is_empty() || (mode.read && mode.write && !self.config.files.allow_read_write) {
            debug!(%mode, "access mode refused");
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }

    // Forwarding

    fn forward_open(&self, node: NodeRef, mode: AccessMode) -> FsResult<()> {
        let channel = self.fs_channel()?;
        let request = DeviceRequest::open(node.raw(), mode.flags());
        let response = channel.open(&request)?;
        expect_opened(&request, response)
    }

    fn forward_read(&self, node: NodeRef, position: u64, buf: &mut [u8]) -> FsResult<usize> {
        let channel = self.fs_channel()?;
        let len = buf.len().min(MAX_TRANSFER as usize);
        let buf = &mut buf[..len];
        let request = DeviceRequest::read(node.raw(), position, len as u64);
        debug!(%node, position, len, "forwarding read");
        let response = channel.read(&request, buf)?;
        expect_transferred(&request, response, len)
    }

    fn forward_write(&self, node: NodeRef, position: u64, data: &[u8]) -> FsResult<usize> {
        let channel = self.fs_channel()?;
        let data = &data[..data.len().min(MAX_TRANSFER as usize)];
        let request = DeviceRequest::write(node.raw(), position, data.len() as u64);
        debug!(%node, position, len = data.len(), "forwarding write");
        let response = channel.write(&request, data)?;
        expect_transferred(&request, response, data.len())
    }
}

/// Build the static tree. The pool is fresh, so slots come off the free
/// list in order and land on the well-known indices.
fn bootstrap(tree: &mut NodePool) {
    let layout = [
        (ROOT, None, "", NodeKind::Directory),
        (FS, Some(ROOT), "fs", NodeKind::Service { owner: Pid::KERNEL }),
        (SYSTEM, Some(ROOT), "system", NodeKind::Directory),
        (PROCESSES, Some(SYSTEM), "processes", NodeKind::Directory),
        (SERVICES, Some(SYSTEM), "services", NodeKind::Directory),
    ];
    for (expected, parent, name, kind) in layout {
        let index = tree
            .allocate(Node::new(name.to_string(), kind))
            .unwrap_or_else(|_| panic!("node pool cannot hold the static namespace"));
        assert_eq!(index, expected, "static node {name:?} landed in slot {index}");
        if let Some(parent) = parent {
            tree.append_child(parent, index);
        }
    }
}

/// Live pool node behind a virtual reference
pub(crate) fn live(tree: &NodePool, node: NodeRef) -> FsResult<&Node> {
    if !node.is_virtual() {
        return Err(FsError::NodeNotFound);
    }
    tree.get(node.index()).ok_or(FsError::NodeNotFound)
}

fn same_provider<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
