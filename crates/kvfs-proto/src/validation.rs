// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Schema validation for device protocol messages

use crate::messages::*;
use thiserror::Error;

/// Validation error
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("SSZ decoding failed: {0}")]
    SszDecode(String),
}

fn check_version(version: &[u8]) -> Result<(), ValidationError> {
    if version != PROTOCOL_VERSION {
        return Err(ValidationError::Schema("version must be '1'".to_string()));
    }
    Ok(())
}

fn check_node(node: u32) -> Result<(), ValidationError> {
    if node & !REAL_NODE_MASK != 0 {
        return Err(ValidationError::Schema(format!(
            "node {node:#x} carries the virtual tag"
        )));
    }
    Ok(())
}

fn check_transfer(count: u64) -> Result<(), ValidationError> {
    if count > MAX_TRANSFER {
        return Err(ValidationError::Schema(format!(
            "transfer of {count} bytes exceeds {MAX_TRANSFER}"
        )));
    }
    Ok(())
}

/// Validate a decoded request against its logical schema
pub fn validate_request(request: &DeviceRequest) -> Result<(), ValidationError> {
    match request {
        DeviceRequest::Open((version, open)) => {
            check_version(version)?;
            check_node(open.node)?;
            if open.flags == 0 || open.flags & !0b11 != 0 {
                return Err(ValidationError::Schema(format!(
                    "invalid open flags {:#x}",
                    open.flags
                )));
            }
            Ok(())
        }
        DeviceRequest::Read((version, read)) => {
            check_version(version)?;
            check_node(read.node)?;
            check_transfer(read.count)
        }
        DeviceRequest::Write((version, write)) => {
            check_version(version)?;
            check_node(write.node)?;
            check_transfer(write.count)
        }
    }
}

/// Validate a decoded response against its logical schema
pub fn validate_response(response: &DeviceResponse) -> Result<(), ValidationError> {
    match response {
        DeviceResponse::Open(_) => Ok(()),
        DeviceResponse::Read(DevReadResponse { transferred })
        | DeviceResponse::Write(DevWriteResponse { transferred }) => check_transfer(*transferred),
        DeviceResponse::Error(DeviceError { errno }) => {
            if *errno == 0 {
                return Err(ValidationError::Schema("errno must be non-zero".to_string()));
            }
            Ok(())
        }
    }
}

/// Decode and validate a request received from the wire
pub fn decode_request(bytes: &[u8]) -> Result<DeviceRequest, ValidationError> {
    use ssz::Decode;
    let request = DeviceRequest::from_ssz_bytes(bytes)
        .map_err(|e| ValidationError::SszDecode(format!("{e:?}")))?;
    validate_request(&request)?;
    Ok(request)
}

/// Decode and validate a response received from the wire
pub fn decode_response(bytes: &[u8]) -> Result<DeviceResponse, ValidationError> {
    use ssz::Decode;
    let response = DeviceResponse::from_ssz_bytes(bytes)
        .map_err(|e| ValidationError::SszDecode(format!("{e:?}")))?;
    validate_response(&response)?;
    Ok(response)
}
