// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Service
//!
//! The only surface agents use to act on the container fleet. Every call
//! returns immediately: an operation that cannot run yet is reported as
//! [`AdmissionDecision::Queued`] rather than blocking the caller.
//!
//! Implementations must be shareable across threads (`Arc<dyn CoordinationService>`).

use crate::domain::operation::{
    Operation, OperationId, OperationOptions, OperationSnapshot, OperationType,
};
use crate::domain::registry::ContainerSpec;
use crate::domain::state::ContainerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of submitting an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// The operation is ACTIVE. `warnings` lists operations on dependent
    /// containers it may affect.
    Admitted {
        operation_id: OperationId,
        warnings: Vec<OperationId>,
    },
    /// The operation is QUEUED behind `blocking_operation_id`; `position` is
    /// its zero-based place in the container's queue at submission time.
    Queued {
        operation_id: OperationId,
        blocking_operation_id: OperationId,
        position: usize,
    },
    /// The operation is REJECTED (or was never accepted for evaluation).
    Rejected {
        operation_id: OperationId,
        reason: String,
        blocking_operation_id: Option<OperationId>,
    },
}

impl AdmissionDecision {
    /// True for admitted and queued operations.
    pub fn accepted(&self) -> bool {
        !matches!(self, AdmissionDecision::Rejected { .. })
    }

    pub fn operation_id(&self) -> &OperationId {
        match self {
            AdmissionDecision::Admitted { operation_id, .. }
            | AdmissionDecision::Queued { operation_id, .. }
            | AdmissionDecision::Rejected { operation_id, .. } => operation_id,
        }
    }

    pub fn blocking_operation_id(&self) -> Option<&OperationId> {
        match self {
            AdmissionDecision::Admitted { .. } => None,
            AdmissionDecision::Queued {
                blocking_operation_id,
                ..
            } => Some(blocking_operation_id),
            AdmissionDecision::Rejected {
                blocking_operation_id,
                ..
            } => blocking_operation_id.as_ref(),
        }
    }

    /// Human-readable summary of the decision.
    pub fn message(&self) -> String {
        match self {
            AdmissionDecision::Admitted { .. } => "admitted".to_string(),
            AdmissionDecision::Queued {
                blocking_operation_id,
                ..
            } => format!("queued behind {}", blocking_operation_id),
            AdmissionDecision::Rejected { reason, .. } => reason.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdmissionDecision::Admitted { .. } => "admitted",
            AdmissionDecision::Queued { .. } => "queued",
            AdmissionDecision::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for AdmissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Point-in-time view of one registered container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatusView {
    pub state: ContainerState,
    pub health: String,
    /// True while an ACTIVE exclusive operation holds the container.
    pub locked: bool,
    pub active_operations: Vec<OperationId>,
    pub queued_operations: usize,
    pub ports: Vec<u16>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

/// Point-in-time view of the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub containers: BTreeMap<String, ContainerStatusView>,
    pub active_operations: usize,
    pub queued_operations: usize,
    /// Submissions (admitted, queued or rejected) during the current UTC day.
    pub total_operations_today: usize,
    pub generated_at: DateTime<Utc>,
}

pub trait CoordinationService: Send + Sync {
    /// Register a container. `true` on first registration or identical repeat.
    fn register_container(&self, spec: ContainerSpec) -> bool;

    /// Record the state and health last observed for a container.
    /// `false` if the container is not registered.
    fn update_container_state(&self, name: &str, state: ContainerState, health: &str) -> bool;

    /// Build a PENDING operation. Nothing is recorded until it is submitted.
    /// `None` uses the service's default options.
    fn create_operation(
        &self,
        container_name: &str,
        operation_type: OperationType,
        agent_id: &str,
        options: Option<OperationOptions>,
    ) -> Operation;

    fn request_operation(&self, operation: Operation) -> AdmissionDecision;

    /// Finish an ACTIVE operation. `false` if the id is unknown, queued or
    /// already terminal.
    fn complete_operation(&self, operation_id: &OperationId, success: bool) -> bool;

    /// Withdraw a QUEUED operation. `false` in every other state.
    fn cancel_operation(&self, operation_id: &OperationId) -> bool;

    fn get_active_operations(&self) -> Vec<OperationSnapshot>;

    fn get_queued_operations(&self) -> Vec<OperationSnapshot>;

    fn get_system_status(&self) -> SystemStatus;

    fn get_all_container_states(&self) -> BTreeMap<String, ContainerState>;

    /// Look up a live operation or one still held in history.
    fn get_operation(&self, operation_id: &OperationId) -> Option<OperationSnapshot>;

    /// Most recently finished operations, newest first.
    fn get_recent_operations(&self, limit: usize) -> Vec<OperationSnapshot>;

    /// Containers that declared a dependency on `name`, sorted.
    fn get_dependents(&self, name: &str) -> Vec<String>;

    /// Re-run queue promotion for every container. Returns the number of
    /// operations activated.
    fn promote_all(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_messages() {
        let admitted = AdmissionDecision::Admitted {
            operation_id: OperationId::from("a"),
            warnings: vec![],
        };
        assert!(admitted.accepted());
        assert_eq!(admitted.message(), "admitted");
        assert!(admitted.blocking_operation_id().is_none());

        let queued = AdmissionDecision::Queued {
            operation_id: OperationId::from("b"),
            blocking_operation_id: OperationId::from("a"),
            position: 0,
        };
        assert!(queued.accepted());
        assert_eq!(queued.message(), "queued behind a");
        assert_eq!(queued.to_string(), "queued behind a");

        let rejected = AdmissionDecision::Rejected {
            operation_id: OperationId::from("c"),
            reason: "a holds CRITICAL lock".to_string(),
            blocking_operation_id: Some(OperationId::from("a")),
        };
        assert!(!rejected.accepted());
        assert_eq!(rejected.message(), "a holds CRITICAL lock");
        assert_eq!(rejected.label(), "rejected");
        assert_eq!(rejected.operation_id(), &OperationId::from("c"));
    }

    #[test]
    fn test_decision_serializes_with_tag() {
        let queued = AdmissionDecision::Queued {
            operation_id: OperationId::from("b"),
            blocking_operation_id: OperationId::from("a"),
            position: 2,
        };
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["decision"], "queued");
        assert_eq!(json["blocking_operation_id"], "a");
        assert_eq!(json["position"], 2);
    }
}
