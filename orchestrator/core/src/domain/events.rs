// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::conflict::ConflictSeverity;
use crate::domain::operation::{OperationId, OperationType};
use crate::domain::state::ContainerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContainerEvent {
    ContainerRegistered {
        container_name: String,
        ports: Vec<u16>,
        dependencies: Vec<String>,
        registered_at: DateTime<Utc>,
    },
    ContainerStateChanged {
        container_name: String,
        state: ContainerState,
        health: String,
        changed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationEvent {
    OperationAdmitted {
        operation_id: OperationId,
        container_name: String,
        operation_type: OperationType,
        agent_id: String,
        admitted_at: DateTime<Utc>,
    },
    OperationQueued {
        operation_id: OperationId,
        container_name: String,
        blocking_operation_id: OperationId,
        severity: ConflictSeverity,
        position: usize,
        queued_at: DateTime<Utc>,
    },
    OperationRejected {
        operation_id: OperationId,
        container_name: String,
        reason: String,
        blocking_operation_id: Option<OperationId>,
        rejected_at: DateTime<Utc>,
    },
    OperationPromoted {
        operation_id: OperationId,
        container_name: String,
        promoted_at: DateTime<Utc>,
    },
    OperationCompleted {
        operation_id: OperationId,
        container_name: String,
        completed_at: DateTime<Utc>,
    },
    OperationFailed {
        operation_id: OperationId,
        container_name: String,
        failed_at: DateTime<Utc>,
    },
    OperationCancelled {
        operation_id: OperationId,
        container_name: String,
        cancelled_at: DateTime<Utc>,
    },
    /// An admitted operation may affect containers that depend on its target.
    DependencyWarning {
        operation_id: OperationId,
        container_name: String,
        affected_operations: Vec<OperationId>,
        warned_at: DateTime<Utc>,
    },
}

impl OperationEvent {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            OperationEvent::OperationAdmitted { operation_id, .. }
            | OperationEvent::OperationQueued { operation_id, .. }
            | OperationEvent::OperationRejected { operation_id, .. }
            | OperationEvent::OperationPromoted { operation_id, .. }
            | OperationEvent::OperationCompleted { operation_id, .. }
            | OperationEvent::OperationFailed { operation_id, .. }
            | OperationEvent::OperationCancelled { operation_id, .. }
            | OperationEvent::DependencyWarning { operation_id, .. } => operation_id,
        }
    }

    pub fn container_name(&self) -> &str {
        match self {
            OperationEvent::OperationAdmitted { container_name, .. }
            | OperationEvent::OperationQueued { container_name, .. }
            | OperationEvent::OperationRejected { container_name, .. }
            | OperationEvent::OperationPromoted { container_name, .. }
            | OperationEvent::OperationCompleted { container_name, .. }
            | OperationEvent::OperationFailed { container_name, .. }
            | OperationEvent::OperationCancelled { container_name, .. }
            | OperationEvent::DependencyWarning { container_name, .. } => container_name,
        }
    }
}
