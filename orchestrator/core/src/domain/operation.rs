// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Operation Aggregate
//!
//! A lifecycle operation requested by an agent against one container.
//!
//! ## Status Transitions
//! | From | To | Trigger |
//! |------|----|---------|
//! | `Pending` | `Active` / `Queued` / `Rejected` | admission decision |
//! | `Active` | `Completed` / `Failed` | completion report |
//! | `Queued` | `Active` / `Cancelled` | promotion or cancellation |
//!
//! `Rejected`, `Completed`, `Failed` and `Cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Priority used when the caller does not supply one.
pub const DEFAULT_PRIORITY: i32 = 1;

/// Advisory duration used when the caller does not supply one.
pub const DEFAULT_ESTIMATED_DURATION: Duration = Duration::from_secs(30);

/// Identifier of an operation, `"{agent}-{container}-{type}-{suffix}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Build a fresh id. The random suffix keeps ids unique across a run even
    /// when the same agent repeats the same request.
    pub fn generate(agent_id: &str, container_name: &str, operation_type: OperationType) -> Self {
        Self(format!(
            "{}-{}-{}-{}",
            agent_id,
            container_name,
            operation_type,
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Read,
    HealthCheck,
    Logs,
    Restart,
    Stop,
    Start,
    ConfigUpdate,
    Deploy,
}

/// Coarse grouping of operation types used by the conflict matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Observes the container without changing it.
    ReadOnly,
    /// Interrupts the container (restart, stop, start, deploy).
    Destructive,
    /// Changes configuration without interrupting the container.
    Reconfiguring,
}

impl OperationType {
    pub const ALL: [OperationType; 8] = [
        OperationType::Read,
        OperationType::HealthCheck,
        OperationType::Logs,
        OperationType::Restart,
        OperationType::Stop,
        OperationType::Start,
        OperationType::ConfigUpdate,
        OperationType::Deploy,
    ];

    pub fn class(self) -> OperationClass {
        match self {
            OperationType::Read | OperationType::HealthCheck | OperationType::Logs => {
                OperationClass::ReadOnly
            }
            OperationType::Restart
            | OperationType::Stop
            | OperationType::Start
            | OperationType::Deploy => OperationClass::Destructive,
            OperationType::ConfigUpdate => OperationClass::Reconfiguring,
        }
    }

    /// Whether an active operation of this type holds the container exclusively.
    pub fn is_exclusive(self) -> bool {
        self.class() == OperationClass::Destructive
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::HealthCheck => "health_check",
            OperationType::Logs => "logs",
            OperationType::Restart => "restart",
            OperationType::Stop => "stop",
            OperationType::Start => "start",
            OperationType::ConfigUpdate => "config_update",
            OperationType::Deploy => "deploy",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown operation type: '{0}'")]
pub struct OperationTypeParseError(pub String);

impl FromStr for OperationType {
    type Err = OperationTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| OperationTypeParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Active,
    Queued,
    Rejected,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Rejected
                | OperationStatus::Completed
                | OperationStatus::Failed
                | OperationStatus::Cancelled
        )
    }
}

/// Optional parameters accepted by [`Operation::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOptions {
    pub priority: i32,
    pub estimated_duration: Duration,
    pub description: String,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            estimated_duration: DEFAULT_ESTIMATED_DURATION,
            description: String::new(),
        }
    }
}

impl OperationOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = duration;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: OperationId,
    pub container_name: String,
    pub operation_type: OperationType,
    pub agent_id: String,
    pub priority: i32,
    /// Advisory only; never used to expire an operation.
    #[serde(with = "humantime_serde")]
    pub estimated_duration: Duration,
    pub description: String,
    pub requested_at: DateTime<Utc>,
    pub status: OperationStatus,
    pub blocking_operation_id: Option<OperationId>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Operation {
    /// Build a `Pending` operation. Has no side effects on any coordinator.
    pub fn new(
        container_name: impl Into<String>,
        operation_type: OperationType,
        agent_id: impl Into<String>,
        options: OperationOptions,
    ) -> Self {
        let container_name = container_name.into();
        let agent_id = agent_id.into();
        Self {
            operation_id: OperationId::generate(&agent_id, &container_name, operation_type),
            container_name,
            operation_type,
            agent_id,
            priority: options.priority,
            estimated_duration: options.estimated_duration,
            description: options.description,
            requested_at: Utc::now(),
            status: OperationStatus::Pending,
            blocking_operation_id: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn activate(&mut self) {
        self.status = OperationStatus::Active;
        self.blocking_operation_id = None;
        self.started_at = Some(Utc::now());
    }

    pub fn queue_behind(&mut self, blocking: OperationId) {
        self.status = OperationStatus::Queued;
        self.blocking_operation_id = Some(blocking);
    }

    pub fn reject(&mut self) {
        self.status = OperationStatus::Rejected;
        self.ended_at = Some(Utc::now());
    }

    pub fn finish(&mut self, success: bool) {
        self.status = if success {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        self.ended_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = OperationStatus::Cancelled;
        self.blocking_operation_id = None;
        self.ended_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot::from(self)
    }
}

/// Read-only view of an operation handed out by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub operation_id: OperationId,
    pub container_name: String,
    pub operation_type: OperationType,
    pub agent_id: String,
    pub priority: i32,
    #[serde(with = "humantime_serde")]
    pub estimated_duration: Duration,
    pub description: String,
    pub status: OperationStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub blocking_operation_id: Option<OperationId>,
}

impl From<&Operation> for OperationSnapshot {
    fn from(op: &Operation) -> Self {
        Self {
            operation_id: op.operation_id.clone(),
            container_name: op.container_name.clone(),
            operation_type: op.operation_type,
            agent_id: op.agent_id.clone(),
            priority: op.priority,
            estimated_duration: op.estimated_duration,
            description: op.description.clone(),
            status: op.status,
            requested_at: op.requested_at,
            started_at: op.started_at,
            ended_at: op.ended_at,
            blocking_operation_id: op.blocking_operation_id.clone(),
        }
    }
}
