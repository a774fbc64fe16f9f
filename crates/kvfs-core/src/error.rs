// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the namespace core

/// Why an operation is refused as unsupported
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unsupported {
    /// Path without a leading `/`; there is no current directory to resolve against
    RelativePath,
    /// Resolution reached a service node with path components left over
    ServiceIndirection,
    /// Read or write on a service or service-queue node
    ServiceIo,
    /// Write to a node produced in-kernel
    VirtualWrite,
    /// Real node requested but no filesystem server is attached
    NoDeviceChannel,
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Unsupported::RelativePath => "relative path",
            Unsupported::ServiceIndirection => "path continues into a service",
            Unsupported::ServiceIo => "i/o on a service node",
            Unsupported::VirtualWrite => "write to a virtual node",
            Unsupported::NoDeviceChannel => "no device channel attached",
        })
    }
}

/// Core namespace error type
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("node not found")]
    NodeNotFound,
    #[error("invalid service name")]
    InvalidServiceName,
    #[error("service name already registered")]
    ServiceNameExists,
    #[error("process already owns a service")]
    ProcessAlreadyHasService,
    #[error("process already published")]
    ProcessAlreadyPublished,
    #[error("file in use")]
    FileInUse,
    #[error("no free file slot")]
    NoFreeFileSlot,
    #[error("node pool exhausted")]
    ResourceExhausted,
    #[error("out of memory")]
    OutOfMemory,
    #[error("no read permission")]
    NoReadPermission,
    #[error("no write permission")]
    NoWritePermission,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid file")]
    InvalidFile,
    #[error("no free descriptor")]
    NoFreeDescriptor,
    #[error("invalid descriptor")]
    InvalidDescriptor,
    #[error("interrupted")]
    Interrupted,
    #[error("device error: errno {0}")]
    Device(i32),
    #[error("unsupported: {0}")]
    UnsupportedOperation(Unsupported),
}

impl FsError {
    /// POSIX errno reported to the caller of a failed request
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NodeNotFound => libc::ENOENT,
            FsError::InvalidServiceName => libc::EINVAL,
            FsError::ServiceNameExists => libc::EEXIST,
            FsError::ProcessAlreadyHasService => libc::EBUSY,
            FsError::ProcessAlreadyPublished => libc::EEXIST,
            FsError::FileInUse => libc::ETXTBSY,
            FsError::NoFreeFileSlot => libc::ENFILE,
            FsError::ResourceExhausted => libc::ENOSPC,
            FsError::OutOfMemory => libc::ENOMEM,
            FsError::NoReadPermission | FsError::NoWritePermission => libc::EACCES,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::InvalidFile | FsError::InvalidDescriptor => libc::EBADF,
            FsError::NoFreeDescriptor => libc::EMFILE,
            FsError::Interrupted => libc::EINTR,
            FsError::Device(errno) => *errno,
            FsError::UnsupportedOperation(_) => libc::ENOTSUP,
        }
    }

    /// Map an errno returned by an external server back into an error
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EINTR => FsError::Interrupted,
            libc::ENOENT => FsError::NodeNotFound,
            libc::ENOMEM => FsError::OutOfMemory,
            other => FsError::Device(other),
        }
    }

    /// Whether the caller should simply retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, FsError::Interrupted)
    }
}

pub type FsResult<T> = Result<T, FsError>;
