// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! KVFS Protocol — device forwarding messages and validation
//!
//! This crate defines the SSZ schemas for the requests the namespace sends to
//! an external server (the filesystem behind `/fs`, or a driver) when a node is
//! not produced in-kernel, and the responses it expects back.

pub mod messages;
pub mod validation;

// Re-export key types
pub use messages::{
    DevOpenRequest, DevOpenResponse, DevReadRequest, DevReadResponse, DevWriteRequest,
    DevWriteResponse, DeviceError, DeviceRequest, DeviceResponse, MAX_TRANSFER, PROTOCOL_VERSION,
    REAL_NODE_MASK,
};
pub use validation::*;
