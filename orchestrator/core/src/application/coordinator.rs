// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordinator
//!
//! Standard [`CoordinationService`]. Registry, state tracker, lock manager,
//! operation queue and operation records sit behind one
//! `parking_lot::Mutex`, so each admission, completion or cancellation reads
//! and mutates them as a single atomic step.
//!
//! Events are published on the bus before the lock is released, so
//! subscribers see them in the order the state changed. Metrics are recorded
//! after it is released.
//!
//! ## Usage
//!
//! ```no_run
//! use convoy_core::application::{CoordinationService, Coordinator};
//! use convoy_core::domain::operation::OperationType;
//! use convoy_core::domain::registry::ContainerSpec;
//!
//! let coordinator = Coordinator::default();
//! coordinator.register_container(ContainerSpec::new("api", [8000], Vec::<String>::new()));
//!
//! let restart = coordinator.create_operation("api", OperationType::Restart, "agent-1", None);
//! let decision = coordinator.request_operation(restart);
//! if decision.accepted() {
//!     coordinator.complete_operation(decision.operation_id(), true);
//! }
//! ```

use crate::application::coordination::{
    AdmissionDecision, ContainerStatusView, CoordinationService, SystemStatus,
};
use crate::domain::conflict::{AdmissionAction, ConflictPolicy};
use crate::domain::coordinator_config::{CoordinatorConfigManifest, CoordinatorSettings};
use crate::domain::events::{ContainerEvent, OperationEvent};
use crate::domain::lock::LockManager;
use crate::domain::operation::{
    Operation, OperationId, OperationOptions, OperationSnapshot, OperationStatus, OperationType,
};
use crate::domain::queue::OperationQueue;
use crate::domain::registry::{
    ContainerRegistry, ContainerSpec, RegistrationOutcome, RegistryError,
};
use crate::domain::state::{ContainerState, StateTracker};
use crate::domain::usage::DailyOperationCounter;
use crate::infrastructure::event_bus::{CoordinationEvent, EventBus};
use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

#[derive(Default)]
struct CoordinatorState {
    registry: ContainerRegistry,
    states: StateTracker,
    locks: LockManager,
    queue: OperationQueue,
    /// ACTIVE and QUEUED operations.
    operations: HashMap<OperationId, Operation>,
    /// Terminal operations, oldest first.
    history: VecDeque<Operation>,
    /// Every id ever submitted. Outlives `history`.
    submitted: HashSet<OperationId>,
    daily: DailyOperationCounter,
}

impl CoordinatorState {
    fn archive(&mut self, operation: Operation, history_limit: usize) {
        self.history.push_back(operation);
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }

    /// Re-evaluate one container's queue and activate whatever is now clear.
    fn promote(&mut self, container_name: &str, outbox: &mut Outbox) {
        let dependents = self.registry.dependents_of(container_name);
        let promotion = self.queue.promote(container_name, &dependents, &mut self.locks);

        for entry in promotion.promoted {
            if let Some(operation) = self.operations.get_mut(&entry.operation_id) {
                operation.activate();
            }
            info!(
                operation_id = %entry.operation_id,
                container = %entry.container_name,
                operation_type = %entry.operation_type,
                "Promoted queued operation"
            );
            outbox.promoted += 1;
            outbox.events.push(
                OperationEvent::OperationPromoted {
                    operation_id: entry.operation_id,
                    container_name: entry.container_name,
                    promoted_at: Utc::now(),
                }
                .into(),
            );
        }

        if let Some((head, blocker)) = promotion.still_blocked {
            if let Some(operation) = self.operations.get_mut(&head) {
                operation.blocking_operation_id = Some(blocker);
            }
        }
    }

    fn snapshot_counts(&self) -> (usize, usize) {
        (self.locks.active_count(), self.queue.total_len())
    }
}

/// Side effects gathered under the lock.
#[derive(Default)]
struct Outbox {
    events: Vec<CoordinationEvent>,
    promoted: u64,
    gauges: Option<(usize, usize)>,
}

pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    settings: CoordinatorSettings,
    event_bus: Option<EventBus>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorSettings::default())
    }
}

impl Coordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            settings,
            event_bus: None,
        }
    }

    /// Publish coordination events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Build a coordinator from a validated manifest, with an event bus sized
    /// from `spec.coordinator.event_bus_capacity` and every declared container
    /// registered.
    pub fn from_config(manifest: &CoordinatorConfigManifest) -> anyhow::Result<Self> {
        manifest.validate().context("Invalid coordinator configuration")?;

        let settings = manifest.spec.coordinator.clone();
        let event_bus = EventBus::new(settings.event_bus_capacity);
        let coordinator = Self::new(settings).with_event_bus(event_bus);

        for spec in &manifest.spec.containers {
            let name = spec.name.clone();
            coordinator
                .try_register(spec.clone())
                .with_context(|| format!("Failed to register container '{}'", name))?;
        }

        info!(
            fleet = %manifest.metadata.name,
            containers = manifest.spec.containers.len(),
            "Coordinator built from configuration"
        );
        Ok(coordinator)
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    /// Options used when `create_operation` is called without any.
    pub fn default_options(&self) -> OperationOptions {
        OperationOptions::default().with_priority(self.settings.default_priority)
    }

    fn try_register(&self, spec: ContainerSpec) -> Result<RegistrationOutcome, RegistryError> {
        let mut outbox = Outbox::default();
        let result = {
            let mut state = self.state.lock();
            let name = spec.name.clone();
            let ports: Vec<u16> = spec.ports.iter().copied().collect();
            let dependencies: Vec<String> = spec.dependencies.iter().cloned().collect();

            let result = state.registry.register(spec);
            if let Ok(RegistrationOutcome::Created) = result {
                state.states.track(&name);
                info!(container = %name, ?ports, ?dependencies, "Registered container");
                outbox.events.push(
                    ContainerEvent::ContainerRegistered {
                        container_name: name,
                        ports,
                        dependencies,
                        registered_at: Utc::now(),
                    }
                    .into(),
                );
            }
            self.publish(&mut outbox);
            result
        };
        self.record_metrics(outbox);
        result
    }

    /// Publish the events gathered so far. Callers hold the state lock.
    fn publish(&self, outbox: &mut Outbox) {
        let events = std::mem::take(&mut outbox.events);
        if let Some(event_bus) = &self.event_bus {
            for event in events {
                event_bus.publish(event);
            }
        }
    }

    fn record_metrics(&self, outbox: Outbox) {
        if outbox.promoted > 0 {
            metrics::counter!("convoy_operations_promoted_total").increment(outbox.promoted);
        }
        if let Some((active, queued)) = outbox.gauges {
            metrics::gauge!("convoy_operations_active").set(active as f64);
            metrics::gauge!("convoy_operations_queued").set(queued as f64);
        }
    }

    fn reject(
        &self,
        state: &mut CoordinatorState,
        mut operation: Operation,
        reason: String,
        blocking_operation_id: Option<OperationId>,
        outbox: &mut Outbox,
    ) -> AdmissionDecision {
        warn!(
            operation_id = %operation.operation_id,
            container = %operation.container_name,
            operation_type = %operation.operation_type,
            reason = %reason,
            "Rejected operation"
        );
        operation.blocking_operation_id = blocking_operation_id.clone();
        operation.reject();
        let operation_id = operation.operation_id.clone();
        outbox.events.push(
            OperationEvent::OperationRejected {
                operation_id: operation_id.clone(),
                container_name: operation.container_name.clone(),
                reason: reason.clone(),
                blocking_operation_id: blocking_operation_id.clone(),
                rejected_at: Utc::now(),
            }
            .into(),
        );
        state.archive(operation, self.settings.history_limit);

        AdmissionDecision::Rejected {
            operation_id,
            reason,
            blocking_operation_id,
        }
    }

    fn admit(
        &self,
        state: &mut CoordinatorState,
        operation: Operation,
        outbox: &mut Outbox,
    ) -> AdmissionDecision {
        let container_name = operation.container_name.clone();
        let dependents = state.registry.dependents_of(&container_name);

        let assessment = {
            let active = state.locks.candidates_for(&container_name, &dependents);
            let queued = state.queue.candidates_for(&container_name, &dependents);
            ConflictPolicy::assess(operation.operation_type, active.chain(queued))
        };

        match (assessment.severity.action(), assessment.blocking_operation_id) {
            (AdmissionAction::Reject, Some(blocker)) => {
                let reason = format!("{} holds {} lock", blocker, assessment.severity);
                self.reject(state, operation, reason, Some(blocker), outbox)
            }
            (AdmissionAction::Enqueue, Some(blocker)) => {
                if state.queue.len(&container_name) >= self.settings.max_queue_depth {
                    let reason = format!("queue for '{}' is full", container_name);
                    return self.reject(state, operation, reason, Some(blocker), outbox);
                }

                let mut operation = operation;
                operation.queue_behind(blocker.clone());
                let position = state.queue.enqueue(&operation, blocker.clone());
                let operation_id = operation.operation_id.clone();

                info!(
                    operation_id = %operation_id,
                    container = %container_name,
                    blocking_operation_id = %blocker,
                    severity = %assessment.severity,
                    position,
                    "Queued operation"
                );
                outbox.events.push(
                    OperationEvent::OperationQueued {
                        operation_id: operation_id.clone(),
                        container_name,
                        blocking_operation_id: blocker.clone(),
                        severity: assessment.severity,
                        position,
                        queued_at: Utc::now(),
                    }
                    .into(),
                );
                state.operations.insert(operation_id.clone(), operation);

                AdmissionDecision::Queued {
                    operation_id,
                    blocking_operation_id: blocker,
                    position,
                }
            }
            _ => {
                let mut operation = operation;
                state.locks.acquire(
                    &container_name,
                    operation.operation_id.clone(),
                    operation.operation_type,
                    operation.requested_at,
                );
                operation.activate();
                let operation_id = operation.operation_id.clone();

                if !assessment.warnings.is_empty() {
                    warn!(
                        operation_id = %operation_id,
                        container = %container_name,
                        affected = ?assessment.warnings,
                        "Admitted operation may affect dependent containers"
                    );
                    outbox.events.push(
                        OperationEvent::DependencyWarning {
                            operation_id: operation_id.clone(),
                            container_name: container_name.clone(),
                            affected_operations: assessment.warnings.clone(),
                            warned_at: Utc::now(),
                        }
                        .into(),
                    );
                }

                info!(
                    operation_id = %operation_id,
                    container = %container_name,
                    operation_type = %operation.operation_type,
                    agent_id = %operation.agent_id,
                    "Admitted operation"
                );
                outbox.events.push(
                    OperationEvent::OperationAdmitted {
                        operation_id: operation_id.clone(),
                        container_name,
                        operation_type: operation.operation_type,
                        agent_id: operation.agent_id.clone(),
                        admitted_at: Utc::now(),
                    }
                    .into(),
                );
                state.operations.insert(operation_id.clone(), operation);

                AdmissionDecision::Admitted {
                    operation_id,
                    warnings: assessment.warnings,
                }
            }
        }
    }
}

impl CoordinationService for Coordinator {
    fn register_container(&self, spec: ContainerSpec) -> bool {
        let name = spec.name.clone();
        match self.try_register(spec) {
            Ok(_) => true,
            Err(e) => {
                warn!(container = %name, error = %e, "Container registration refused");
                false
            }
        }
    }

    fn update_container_state(&self, name: &str, state: ContainerState, health: &str) -> bool {
        let mut outbox = Outbox::default();
        let updated = {
            let mut guard = self.state.lock();
            let updated = match guard.states.update(name, state, health) {
                Ok(status) => {
                    debug!(
                        container = %name,
                        state = %state,
                        health = %health,
                        "Container state updated"
                    );
                    outbox.events.push(
                        ContainerEvent::ContainerStateChanged {
                            container_name: name.to_string(),
                            state,
                            health: health.to_string(),
                            changed_at: status.updated_at,
                        }
                        .into(),
                    );
                    true
                }
                Err(e) => {
                    debug!(error = %e, "Ignoring state update");
                    false
                }
            };
            self.publish(&mut outbox);
            updated
        };
        self.record_metrics(outbox);
        updated
    }

    fn create_operation(
        &self,
        container_name: &str,
        operation_type: OperationType,
        agent_id: &str,
        options: Option<OperationOptions>,
    ) -> Operation {
        let options = options.unwrap_or_else(|| self.default_options());
        Operation::new(container_name, operation_type, agent_id, options)
    }

    fn request_operation(&self, operation: Operation) -> AdmissionDecision {
        let mut outbox = Outbox::default();
        let decision = {
            let mut state = self.state.lock();
            state.daily.record(Utc::now());

            let resubmitted = operation.status != OperationStatus::Pending
                || !state.submitted.insert(operation.operation_id.clone());
            let decision = if resubmitted {
                let reason = format!(
                    "operation '{}' was already submitted",
                    operation.operation_id
                );
                warn!(
                    operation_id = %operation.operation_id,
                    status = ?operation.status,
                    "Rejected resubmitted operation"
                );
                AdmissionDecision::Rejected {
                    operation_id: operation.operation_id,
                    reason,
                    blocking_operation_id: None,
                }
            } else if !state.registry.contains(&operation.container_name) {
                let reason = format!(
                    "container '{}' is not registered",
                    operation.container_name
                );
                self.reject(&mut state, operation, reason, None, &mut outbox)
            } else {
                self.admit(&mut state, operation, &mut outbox)
            };
            outbox.gauges = Some(state.snapshot_counts());
            self.publish(&mut outbox);
            decision
        };

        metrics::counter!("convoy_operations_requested_total", "decision" => decision.label())
            .increment(1);
        self.record_metrics(outbox);
        decision
    }

    fn complete_operation(&self, operation_id: &OperationId, success: bool) -> bool {
        let mut outbox = Outbox::default();
        let completed = {
            let mut state = self.state.lock();

            let is_active = state
                .operations
                .get(operation_id)
                .is_some_and(|op| op.status == OperationStatus::Active);
            if !is_active {
                debug!(
                    operation_id = %operation_id,
                    "Ignoring completion of operation that is not active"
                );
                return false;
            }
            let Some(mut operation) = state.operations.remove(operation_id) else {
                return false;
            };

            operation.finish(success);
            let container_name = operation.container_name.clone();
            state.locks.release(operation_id);

            info!(
                operation_id = %operation_id,
                container = %container_name,
                success,
                "Operation finished"
            );
            let finished_at = Utc::now();
            let event = if success {
                OperationEvent::OperationCompleted {
                    operation_id: operation_id.clone(),
                    container_name: container_name.clone(),
                    completed_at: finished_at,
                }
            } else {
                OperationEvent::OperationFailed {
                    operation_id: operation_id.clone(),
                    container_name: container_name.clone(),
                    failed_at: finished_at,
                }
            };
            outbox.events.push(event.into());

            // Work on this container may also have been holding back work on
            // the containers it depends on.
            let dependencies = state.registry.dependencies_of(&container_name);
            state.archive(operation, self.settings.history_limit);
            state.promote(&container_name, &mut outbox);
            for dependency in &dependencies {
                state.promote(dependency, &mut outbox);
            }

            outbox.gauges = Some(state.snapshot_counts());
            self.publish(&mut outbox);
            true
        };

        let outcome = if success { "completed" } else { "failed" };
        metrics::counter!("convoy_operations_completed_total", "outcome" => outcome).increment(1);
        self.record_metrics(outbox);
        completed
    }

    fn cancel_operation(&self, operation_id: &OperationId) -> bool {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();

            let is_queued = state
                .operations
                .get(operation_id)
                .is_some_and(|op| op.status == OperationStatus::Queued);
            if !is_queued {
                debug!(
                    operation_id = %operation_id,
                    "Ignoring cancellation of operation that is not queued"
                );
                return false;
            }

            state.queue.cancel(operation_id);
            let Some(mut operation) = state.operations.remove(operation_id) else {
                return false;
            };
            operation.cancel();
            let container_name = operation.container_name.clone();

            info!(
                operation_id = %operation_id,
                container = %container_name,
                "Cancelled queued operation"
            );
            outbox.events.push(
                OperationEvent::OperationCancelled {
                    operation_id: operation_id.clone(),
                    container_name: container_name.clone(),
                    cancelled_at: Utc::now(),
                }
                .into(),
            );
            state.archive(operation, self.settings.history_limit);

            // Entries behind the cancelled one may name it as their blocker.
            state.promote(&container_name, &mut outbox);

            outbox.gauges = Some(state.snapshot_counts());
            self.publish(&mut outbox);
        }

        metrics::counter!("convoy_operations_cancelled_total").increment(1);
        self.record_metrics(outbox);
        true
    }

    fn get_active_operations(&self) -> Vec<OperationSnapshot> {
        let state = self.state.lock();
        let mut active: Vec<OperationSnapshot> = state
            .operations
            .values()
            .filter(|op| op.status == OperationStatus::Active)
            .map(Operation::snapshot)
            .collect();
        active.sort_by(|a, b| {
            (&a.container_name, a.started_at, &a.operation_id)
                .cmp(&(&b.container_name, b.started_at, &b.operation_id))
        });
        active
    }

    fn get_queued_operations(&self) -> Vec<OperationSnapshot> {
        let state = self.state.lock();
        state
            .queue
            .iter_ordered()
            .filter_map(|entry| state.operations.get(&entry.operation_id))
            .map(Operation::snapshot)
            .collect()
    }

    fn get_system_status(&self) -> SystemStatus {
        let state = self.state.lock();
        let now = Utc::now();

        let containers = state
            .registry
            .names()
            .into_iter()
            .map(|name| {
                let status = state.states.get(&name).cloned().unwrap_or_default();
                let spec = state.registry.get(&name);
                let view = ContainerStatusView {
                    state: status.state,
                    health: status.health,
                    locked: state.locks.is_locked(&name),
                    active_operations: state.locks.active_ids(&name),
                    queued_operations: state.queue.len(&name),
                    ports: spec.map(|s| s.ports.iter().copied().collect()).unwrap_or_default(),
                    dependencies: spec
                        .map(|s| s.dependencies.iter().cloned().collect())
                        .unwrap_or_default(),
                    dependents: state.registry.dependents_of(&name).into_iter().collect(),
                };
                (name, view)
            })
            .collect::<BTreeMap<_, _>>();

        SystemStatus {
            containers,
            active_operations: state.locks.active_count(),
            queued_operations: state.queue.total_len(),
            total_operations_today: state.daily.count_on(now),
            generated_at: now,
        }
    }

    fn get_all_container_states(&self) -> BTreeMap<String, ContainerState> {
        self.state.lock().states.all_states()
    }

    fn get_operation(&self, operation_id: &OperationId) -> Option<OperationSnapshot> {
        let state = self.state.lock();
        state
            .operations
            .get(operation_id)
            .or_else(|| {
                state
                    .history
                    .iter()
                    .rev()
                    .find(|op| &op.operation_id == operation_id)
            })
            .map(Operation::snapshot)
    }

    fn get_recent_operations(&self, limit: usize) -> Vec<OperationSnapshot> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .rev()
            .take(limit)
            .map(Operation::snapshot)
            .collect()
    }

    fn get_dependents(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .registry
            .dependents_of(name)
            .into_iter()
            .collect()
    }

    fn promote_all(&self) -> usize {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            for container_name in state.queue.containers() {
                state.promote(&container_name, &mut outbox);
            }
            if outbox.promoted > 0 {
                outbox.gauges = Some(state.snapshot_counts());
            }
            self.publish(&mut outbox);
        }
        let promoted = outbox.promoted as usize;
        self.record_metrics(outbox);
        promoted
    }
}
