// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Namespace configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::NodeRef;

/// Nodes created by the static bootstrap: root, fs, system, processes, services
pub const STATIC_NODES: usize = 5;

const NODES_PER_PROCESS: usize = 8;
const FILES_PER_PROCESS: usize = 16;
const STATIC_DIRECTORIES: usize = 4;
const SPARE_NODES: usize = 64;
const DEFAULT_PROCESSES: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Capacities of the node pool and the global file table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VfsLimits {
    pub node_capacity: usize,
    pub file_capacity: usize,
}

impl VfsLimits {
    /// Capacities sized for a system running `processes` processes
    pub fn for_processes(processes: usize) -> Self {
        Self {
            node_capacity: processes * NODES_PER_PROCESS + STATIC_DIRECTORIES + SPARE_NODES,
            file_capacity: processes * FILES_PER_PROCESS,
        }
    }
}

impl Default for VfsLimits {
    fn default() -> Self {
        Self::for_processes(DEFAULT_PROCESSES)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilePolicy {
    /// Whether one handle may hold read and write access together
    pub allow_read_write: bool,
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self {
            allow_read_write: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VfsConfig {
    pub limits: VfsLimits,
    pub files: FilePolicy,
}

impl VfsConfig {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: VfsConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Self::from_json_bytes(&bytes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nodes = self.limits.node_capacity;
        if nodes < STATIC_NODES {
            return Err(ConfigError::Invalid(format!(
                "node-capacity {nodes} cannot hold the {STATIC_NODES} static nodes"
            )));
        }
        if nodes > NodeRef::MAX_INDEX {
            return Err(ConfigError::Invalid(format!(
                "node-capacity {nodes} overlaps the virtual tag bit"
            )));
        }
        if self.limits.file_capacity == 0 {
            return Err(ConfigError::Invalid("file-capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
