// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! KVFS Core — the kernel's virtual namespace
//!
//! A bounded tree of directories, info endpoints, services and service queue
//! entries, the path normalizer and resolver over it, and the global file
//! table through which every open handle reaches a node. Nodes that live on
//! an external server are reached through a `DeviceChannel`.

pub mod config;
pub mod content;
pub mod descriptor;
pub mod diag;
pub mod error;
pub mod fault;
pub mod files;
pub mod forward;
pub mod path;
pub mod pool;
mod registry;
pub mod types;
pub mod vfs;

pub use config::{ConfigError, FilePolicy, VfsConfig, VfsLimits};
pub use content::ContentProvider;
pub use descriptor::{DescriptorTable, FixedDescriptorTable};
pub use diag::NodeInfo;
pub use error::{FsError, FsResult, Unsupported};
pub use fault::{FaultErrno, FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use forward::DeviceChannel;
pub use path::{normalize, Resolution};
pub use types::{
    AccessMode, DirRecord, FileIndex, LocalFd, NodeRef, NodeType, Pid, VfsStats, DIR_RECORD_SIZE,
    MAX_NAME_LEN,
};
pub use vfs::Namespace;
