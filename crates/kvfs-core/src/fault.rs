// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault injection policy + runtime controller for the namespace

use crate::FsError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Internal allocation points that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    /// Taking a slot from the node pool
    AllocateNode,
    /// Copying a node name into node-owned storage
    AllocateName,
    /// Materializing a directory or info content buffer
    BuildContent,
    /// Claiming a slot in the global file table
    ClaimFile,
}

/// Supported errno values for synthetic failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultErrno {
    Enomem,
    Enospc,
    Enfile,
}

impl FaultErrno {
    fn to_error(self) -> FsError {
        match self {
            FaultErrno::Enomem => FsError::OutOfMemory,
            FaultErrno::Enospc => FsError::ResourceExhausted,
            FaultErrno::Enfile => FsError::NoFreeFileSlot,
        }
    }
}

/// Individual rule describing which op should fail and how often.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    pub errno: FaultErrno,
    /// Optional number of leading invocations to skip before injecting faults.
    #[serde(default)]
    pub start_after: u64,
    /// Optional maximum number of injected failures for this rule.
    #[serde(default)]
    pub max_faults: Option<u64>,
}

impl FaultRule {
    /// Fail the next invocation of `op` once
    pub fn once(op: FaultOp, errno: FaultErrno) -> Self {
        Self {
            op,
            errno,
            start_after: 0,
            max_faults: Some(1),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn with_rule(rule: FaultRule) -> Self {
        Self {
            enabled: true,
            rules: vec![rule],
        }
    }
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Clone, Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

/// Runtime controller that tracks policy + hit counts.
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FaultState::default()),
        }
    }

    pub fn snapshot(&self) -> FaultPolicy {
        self.state.lock().unwrap().policy.clone()
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state.lock().unwrap();
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    pub fn clear(&self) {
        self.set_policy(FaultPolicy::default());
    }

    /// Count an invocation of `op` and return the injected error, if any
    pub fn check(&self, op: FaultOp) -> Result<(), FsError> {
        match self.should_fault(op) {
            Some(err) => {
                tracing::debug!(?op, %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    pub fn should_fault(&self, op: FaultOp) -> Option<FsError> {
        let mut guard = self.state.lock().unwrap();
        if !guard.policy.enabled {
            return None;
        }
        let state = &mut *guard;
        state.counters.resize(state.policy.rules.len(), RuleCounters::default());
        for (rule, counters) in state.policy.rules.iter().zip(state.counters.iter_mut()) {
            if rule.op != op {
                continue;
            }
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            return Some(rule.errno.to_error());
        }
        None
    }
}
