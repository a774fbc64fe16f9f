// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Device protocol message types

use ssz_derive::{Decode, Encode};

/// Version tag carried by every request
pub const PROTOCOL_VERSION: &[u8] = b"1";

/// Largest transfer a single read or write request may ask for
pub const MAX_TRANSFER: u64 = 1 << 20;

/// Node numbers forwarded to a server never carry the virtual tag bit
pub const REAL_NODE_MASK: u32 = !(1 << 31);

/// Request union - each variant carries the protocol version and its payload
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
#[ssz(enum_behaviour = "union")]
pub enum DeviceRequest {
    Open((Vec<u8>, DevOpenRequest)),   // (version, request)
    Read((Vec<u8>, DevReadRequest)),   // (version, request)
    Write((Vec<u8>, DevWriteRequest)), // (version, request)
}

/// Response union - operation-specific success payloads or an errno
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
#[ssz(enum_behaviour = "union")]
pub enum DeviceResponse {
    Open(DevOpenResponse),
    Read(DevReadResponse),
    Write(DevWriteResponse),
    Error(DeviceError),
}

/// Open a node of the server for the given access flags
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevOpenRequest {
    /// bit 0 = read, bit 1 = write
    pub flags: u32,
    pub node: u32,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevOpenResponse {
    pub node: u32,
}

/// Read `count` bytes at `offset`.
///
/// `shmem_off` names the position inside a shared memory region the server
/// writes into; `None` means the data travels back with the response.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevReadRequest {
    pub node: u32,
    pub offset: u64,
    pub count: u64,
    pub shmem_off: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevReadResponse {
    pub transferred: u64,
}

/// Write `count` bytes at `offset`
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevWriteRequest {
    pub node: u32,
    pub offset: u64,
    pub count: u64,
    pub shmem_off: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DevWriteResponse {
    pub transferred: u64,
}

/// Failure reported by the server as a positive errno value
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DeviceError {
    pub errno: u32,
}

impl DeviceRequest {
    pub fn open(node: u32, flags: u32) -> Self {
        Self::Open((PROTOCOL_VERSION.to_vec(), DevOpenRequest { flags, node }))
    }

    pub fn read(node: u32, offset: u64, count: u64) -> Self {
        Self::Read((
            PROTOCOL_VERSION.to_vec(),
            DevReadRequest {
                node,
                offset,
                count,
                shmem_off: None,
            },
        ))
    }

    pub fn write(node: u32, offset: u64, count: u64) -> Self {
        Self::Write((
            PROTOCOL_VERSION.to_vec(),
            DevWriteRequest {
                node,
                offset,
                count,
                shmem_off: None,
            },
        ))
    }

    /// Operation name, used in logs
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
        }
    }
}

impl DeviceResponse {
    pub fn open(node: u32) -> Self {
        Self::Open(DevOpenResponse { node })
    }

    pub fn read(transferred: u64) -> Self {
        Self::Read(DevReadResponse { transferred })
    }

    pub fn write(transferred: u64) -> Self {
        Self::Write(DevWriteResponse { transferred })
    }

    pub fn error(errno: u32) -> Self {
        Self::Error(DeviceError { errno })
    }
}
