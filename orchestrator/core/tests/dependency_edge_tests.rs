// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cross-container behaviour for declared dependencies.
//!
//! Fleet used throughout: `webui` depends on `api`, `api` depends on `db`.
//! A request on a depended-upon container is weighed against work on its
//! dependents; a request on a dependent is never weighed against its
//! dependencies.

use convoy_core::application::{AdmissionDecision, CoordinationService, Coordinator};
use convoy_core::domain::operation::{OperationStatus, OperationType};
use convoy_core::domain::registry::ContainerSpec;

fn fleet() -> Coordinator {
    let coordinator = Coordinator::default();
    assert!(coordinator.register_container(ContainerSpec::new("db", [5432], Vec::<String>::new())));
    assert!(coordinator.register_container(ContainerSpec::new("api", [8000], ["db"])));
    assert!(coordinator.register_container(ContainerSpec::new("webui", [3000], ["api"])));
    coordinator
}

fn request(
    coordinator: &Coordinator,
    container: &str,
    op_type: OperationType,
) -> AdmissionDecision {
    let op = coordinator.create_operation(container, op_type, "agent", None);
    coordinator.request_operation(op)
}

#[test]
fn test_active_destructive_dependent_queues_request() {
    let coordinator = fleet();
    let webui_restart = request(&coordinator, "webui", OperationType::Restart);
    assert!(matches!(webui_restart, AdmissionDecision::Admitted { .. }));

    let api_restart = request(&coordinator, "api", OperationType::Restart);
    match &api_restart {
        AdmissionDecision::Queued {
            blocking_operation_id,
            ..
        } => assert_eq!(blocking_operation_id, webui_restart.operation_id()),
        other => panic!("expected queued, got {:?}", other),
    }
}

#[test]
fn test_completing_dependent_promotes_dependency_queue() {
    let coordinator = fleet();
    let webui_restart = request(&coordinator, "webui", OperationType::Restart);
    let api_restart = request(&coordinator, "api", OperationType::Restart);
    assert_eq!(coordinator.get_queued_operations().len(), 1);

    assert!(coordinator.complete_operation(webui_restart.operation_id(), true));

    assert!(coordinator.get_queued_operations().is_empty());
    let active = coordinator.get_active_operations();
    assert_eq!(active.len(), 1);
    assert_eq!(&active[0].operation_id, api_restart.operation_id());
}

#[test]
fn test_dependent_is_never_blocked_by_dependency() {
    let coordinator = fleet();
    assert!(request(&coordinator, "api", OperationType::Restart).accepted());

    let webui_restart = request(&coordinator, "webui", OperationType::Restart);
    match webui_restart {
        AdmissionDecision::Admitted { warnings, .. } => assert!(warnings.is_empty()),
        other => panic!("expected admitted, got {:?}", other),
    }
}

#[test]
fn test_non_critical_edge_conflict_admits_with_warning() {
    let coordinator = fleet();
    let webui_config = request(&coordinator, "webui", OperationType::ConfigUpdate);

    let api_restart = request(&coordinator, "api", OperationType::Restart);
    match &api_restart {
        AdmissionDecision::Admitted { warnings, .. } => {
            assert_eq!(warnings, &vec![webui_config.operation_id().clone()]);
        }
        other => panic!("expected admitted, got {:?}", other),
    }
    assert_eq!(api_restart.message(), "admitted");
}

#[test]
fn test_queued_dependent_work_only_warns() {
    let coordinator = fleet();
    let webui_config = request(&coordinator, "webui", OperationType::ConfigUpdate);
    let webui_restart = request(&coordinator, "webui", OperationType::Restart);
    assert!(matches!(webui_restart, AdmissionDecision::Queued { .. }));

    let api_restart = request(&coordinator, "api", OperationType::Restart);
    match api_restart {
        AdmissionDecision::Admitted { warnings, .. } => {
            assert_eq!(warnings.len(), 2);
            assert!(warnings.contains(webui_config.operation_id()));
            assert!(warnings.contains(webui_restart.operation_id()));
        }
        other => panic!("expected admitted, got {:?}", other),
    }
}

#[test]
fn test_reads_on_dependents_never_conflict() {
    let coordinator = fleet();
    request(&coordinator, "webui", OperationType::Logs);
    request(&coordinator, "webui", OperationType::HealthCheck);

    match request(&coordinator, "api", OperationType::Stop) {
        AdmissionDecision::Admitted { warnings, .. } => assert!(warnings.is_empty()),
        other => panic!("expected admitted, got {:?}", other),
    }
}

#[test]
fn test_edges_are_not_transitive() {
    let coordinator = fleet();
    // webui depends on api, which depends on db; webui does not depend on db.
    request(&coordinator, "webui", OperationType::Restart);

    match request(&coordinator, "db", OperationType::Restart) {
        AdmissionDecision::Admitted { warnings, .. } => assert!(warnings.is_empty()),
        other => panic!("expected admitted, got {:?}", other),
    }
}

#[test]
fn test_dependents_lookup() {
    let coordinator = fleet();
    assert_eq!(coordinator.get_dependents("db"), vec!["api".to_string()]);
    assert_eq!(coordinator.get_dependents("api"), vec!["webui".to_string()]);
    assert!(coordinator.get_dependents("webui").is_empty());

    let status = coordinator.get_system_status();
    assert_eq!(status.containers["api"].dependencies, vec!["db".to_string()]);
    assert_eq!(status.containers["api"].dependents, vec!["webui".to_string()]);
}

#[test]
fn test_cancel_points_next_in_line_at_remaining_blocker() {
    let coordinator = fleet();
    let config = request(&coordinator, "api", OperationType::ConfigUpdate);
    let restart = request(&coordinator, "api", OperationType::Restart);
    let second_config = request(&coordinator, "api", OperationType::ConfigUpdate);
    assert_eq!(second_config.blocking_operation_id(), Some(restart.operation_id()));

    assert!(coordinator.cancel_operation(restart.operation_id()));

    // Still waits, now on the active config update rather than the cancelled restart.
    let queued = coordinator.get_queued_operations();
    assert_eq!(queued.len(), 1);
    assert_eq!(&queued[0].operation_id, second_config.operation_id());
    assert_eq!(queued[0].blocking_operation_id.as_ref(), Some(config.operation_id()));
    assert_eq!(coordinator.get_active_operations().len(), 1);

    assert!(coordinator.complete_operation(config.operation_id(), true));
    assert_eq!(
        &coordinator.get_active_operations()[0].operation_id,
        second_config.operation_id()
    );
}

#[test]
fn test_cancel_activates_work_it_was_holding_back() {
    let coordinator = fleet();
    let webui_restart = request(&coordinator, "webui", OperationType::Restart);
    let api_restart = request(&coordinator, "api", OperationType::Restart);
    assert_eq!(api_restart.blocking_operation_id(), Some(webui_restart.operation_id()));

    // Only the queued restart stands in its way.
    let api_config = request(&coordinator, "api", OperationType::ConfigUpdate);
    assert_eq!(api_config.blocking_operation_id(), Some(api_restart.operation_id()));

    assert!(coordinator.cancel_operation(api_restart.operation_id()));

    assert!(coordinator.get_queued_operations().is_empty());
    let snapshot = coordinator.get_operation(api_config.operation_id()).unwrap();
    assert_eq!(snapshot.status, OperationStatus::Active);
    assert!(snapshot.blocking_operation_id.is_none());
    assert_eq!(coordinator.get_active_operations().len(), 2);
    assert_eq!(coordinator.promote_all(), 0);
}
