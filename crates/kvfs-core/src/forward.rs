// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Boundary to the external server behind real (non-virtual) nodes

use kvfs_proto::{validate_response, DeviceRequest, DeviceResponse};

use crate::error::{FsError, FsResult};

/// Blocking request/response channel to a filesystem or driver server.
///
/// Reads deliver data into `buf`, writes take it from `data`. A channel
/// reports an interrupted wait as `FsError::Interrupted`.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceChannel: Send + Sync {
    fn open(&self, request: &DeviceRequest) -> FsResult<DeviceResponse>;
    fn read(&self, request: &DeviceRequest, buf: &mut [u8]) -> FsResult<DeviceResponse>;
    fn write(&self, request: &DeviceRequest, data: &[u8]) -> FsResult<DeviceResponse>;
}

fn protocol_error(request: &DeviceRequest, response: &DeviceResponse) -> FsError {
    tracing::warn!(op = request.op_name(), ?response, "unexpected device response");
    FsError::Device(libc::EPROTO)
}

/// Check an open reply
pub fn expect_opened(request: &DeviceRequest, response: DeviceResponse) -> FsResult<()> {
    if validate_response(&response).is_err() {
        return Err(protocol_error(request, &response));
    }
    match response {
        DeviceResponse::Open(_) => Ok(()),
        DeviceResponse::Error(err) => Err(FsError::from_errno(err.errno as i32)),
        other => Err(protocol_error(request, &other)),
    }
}

/// Byte count of a read or write reply, never more than was asked for
pub fn expect_transferred(
    request: &DeviceRequest,
    response: DeviceResponse,
    requested: usize,
) -> FsResult<usize> {
    if validate_response(&response).is_err() {
        return Err(protocol_error(request, &response));
    }
    let transferred = match (request, &response) {
        (DeviceRequest::Read(_), DeviceResponse::Read(reply)) => reply.transferred,
        (DeviceRequest::Write(_), DeviceResponse::Write(reply)) => reply.transferred,
        (_, DeviceResponse::Error(err)) => return Err(FsError::from_errno(err.errno as i32)),
        _ => return Err(protocol_error(request, &response)),
    };
    match usize::try_from(transferred) {
        Ok(n) if n <= requested => Ok(n),
        _ => Err(protocol_error(request, &response)),
    }
}
