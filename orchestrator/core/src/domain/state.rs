// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Container State Tracker
//!
//! Current lifecycle state and health string of every registered container,
//! as last reported by an external collaborator. The tracker does not infer
//! state from operations; it only records what it is told.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Health string assigned to a container before any report arrives.
pub const UNKNOWN_HEALTH: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    #[default]
    Unknown,
    Starting,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Unknown => "unknown",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub state: ContainerState,
    pub health: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for ContainerStatus {
    fn default() -> Self {
        Self {
            state: ContainerState::Unknown,
            health: UNKNOWN_HEALTH.to_string(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateTrackerError {
    #[error("Container '{0}' is not tracked")]
    UnknownContainer(String),
}

#[derive(Debug, Default)]
pub struct StateTracker {
    statuses: HashMap<String, ContainerStatus>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a container with `Unknown` state. No-op if already tracked.
    pub fn track(&mut self, name: &str) {
        self.statuses.entry(name.to_string()).or_default();
    }

    /// Overwrite the state and health of a tracked container.
    pub fn update(
        &mut self,
        name: &str,
        state: ContainerState,
        health: impl Into<String>,
    ) -> Result<&ContainerStatus, StateTrackerError> {
        let status = self
            .statuses
            .get_mut(name)
            .ok_or_else(|| StateTrackerError::UnknownContainer(name.to_string()))?;

        status.state = state;
        status.health = health.into();
        status.updated_at = Utc::now();
        Ok(status)
    }

    pub fn get(&self, name: &str) -> Option<&ContainerStatus> {
        self.statuses.get(name)
    }

    /// Point-in-time copy of every tracked container's state.
    pub fn all_states(&self) -> BTreeMap<String, ContainerState> {
        self.statuses
            .iter()
            .map(|(name, status)| (name.clone(), status.state))
            .collect()
    }
}
