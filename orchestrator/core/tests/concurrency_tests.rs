// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Many agents hammering one coordinator from plain OS threads.
//!
//! After every call each thread checks, from a single status snapshot, that no
//! container has more than one exclusive operation active. Event subscribers
//! must see each operation's lifecycle in the order it happened.

use convoy_core::application::{CoordinationService, Coordinator};
use convoy_core::domain::events::OperationEvent;
use convoy_core::domain::operation::{OperationId, OperationSnapshot, OperationType};
use convoy_core::domain::registry::ContainerSpec;
use convoy_core::infrastructure::event_bus::{CoordinationEvent, EventBus, EventBusError};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

const CONTAINERS: [&str; 3] = ["db", "api", "webui"];
const THREADS: usize = 8;
const ROUNDS: usize = 250;

/// Small deterministic generator so each thread follows a reproducible path.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as usize
    }
}

fn assert_single_exclusive(active: &[OperationSnapshot]) {
    let mut exclusive: HashMap<&str, usize> = HashMap::new();
    for op in active.iter().filter(|op| op.operation_type.is_exclusive()) {
        *exclusive.entry(op.container_name.as_str()).or_default() += 1;
    }
    for (container, count) in exclusive {
        assert!(count <= 1, "{} exclusive operations active on '{}'", count, container);
    }
}

fn fleet() -> Arc<Coordinator> {
    let coordinator = Arc::new(Coordinator::default());
    coordinator.register_container(ContainerSpec::new("db", [5432], Vec::<String>::new()));
    coordinator.register_container(ContainerSpec::new("api", [8000], ["db"]));
    coordinator.register_container(ContainerSpec::new("webui", [3000], ["api"]));
    coordinator
}

#[test]
fn test_concurrent_agents_never_share_exclusive_lock() {
    let coordinator = fleet();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let mut rng = Lcg(t as u64 + 1);
                let agent = format!("agent-{}", t);
                let mut mine = Vec::new();

                for _ in 0..ROUNDS {
                    let container = CONTAINERS[rng.next() % CONTAINERS.len()];
                    let op_type = OperationType::ALL[rng.next() % OperationType::ALL.len()];
                    let op = coordinator.create_operation(container, op_type, &agent, None);
                    let decision = coordinator.request_operation(op);
                    if decision.accepted() {
                        mine.push(decision.operation_id().clone());
                    }

                    // Finish roughly half of what this agent owns that is running
                    if rng.next() % 2 == 0 && !mine.is_empty() {
                        let index = rng.next() % mine.len();
                        let id = mine.swap_remove(index);
                        if !coordinator.complete_operation(&id, rng.next() % 4 != 0) {
                            // Still queued; may be promoted later
                            mine.push(id);
                        }
                    }

                    assert_single_exclusive(&coordinator.get_active_operations());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("agent thread panicked");
    }

    // Drain: completing every active operation eventually promotes everything queued.
    for _ in 0..10_000 {
        coordinator.promote_all();
        let active = coordinator.get_active_operations();
        if active.is_empty() {
            break;
        }
        assert_single_exclusive(&active);
        for op in active {
            coordinator.complete_operation(&op.operation_id, true);
        }
    }

    assert!(coordinator.get_active_operations().is_empty());
    assert!(coordinator.get_queued_operations().is_empty());

    let status = coordinator.get_system_status();
    assert_eq!(status.total_operations_today, THREADS * ROUNDS);
    assert!(status.containers.values().all(|view| !view.locked));
}

#[test]
fn test_concurrent_restarts_admit_exactly_one() {
    let coordinator = fleet();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let agent = format!("agent-{}", t);
                let op = coordinator.create_operation("db", OperationType::Restart, &agent, None);
                coordinator.request_operation(op).accepted()
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().expect("agent thread panicked"))
        .filter(|accepted| *accepted)
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(coordinator.get_active_operations().len(), 1);
}

fn lifecycle_step(event: &OperationEvent) -> &'static str {
    match event {
        OperationEvent::OperationAdmitted { .. } => "admitted",
        OperationEvent::OperationQueued { .. } => "queued",
        OperationEvent::OperationRejected { .. } => "rejected",
        OperationEvent::OperationPromoted { .. } => "promoted",
        OperationEvent::OperationCompleted { .. } => "completed",
        OperationEvent::OperationFailed { .. } => "failed",
        OperationEvent::OperationCancelled { .. } => "cancelled",
        OperationEvent::DependencyWarning { .. } => "warning",
    }
}

#[test]
fn test_concurrent_events_arrive_in_lifecycle_order() {
    let event_bus = EventBus::new(THREADS * ROUNDS * 4);
    let coordinator = Arc::new(Coordinator::default().with_event_bus(event_bus.clone()));
    coordinator.register_container(ContainerSpec::new("api", [8000], Vec::<String>::new()));
    let mut events = event_bus.subscribe();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let mut rng = Lcg(t as u64 + 101);
                let agent = format!("agent-{}", t);
                let mut mine: Vec<OperationId> = Vec::new();

                for _ in 0..ROUNDS {
                    let op_type = if rng.next() % 2 == 0 {
                        OperationType::Restart
                    } else {
                        OperationType::ConfigUpdate
                    };
                    let op = coordinator.create_operation("api", op_type, &agent, None);
                    let decision = coordinator.request_operation(op);
                    if decision.accepted() {
                        mine.push(decision.operation_id().clone());
                    }
                    // Complete straight away whatever is running; queued work stays.
                    mine.retain(|id| !coordinator.complete_operation(id, true));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("agent thread panicked");
    }

    for _ in 0..10_000 {
        coordinator.promote_all();
        let active = coordinator.get_active_operations();
        if active.is_empty() {
            break;
        }
        for op in active {
            coordinator.complete_operation(&op.operation_id, true);
        }
    }
    assert!(coordinator.get_queued_operations().is_empty());

    let mut lifecycles: HashMap<OperationId, Vec<&'static str>> = HashMap::new();
    loop {
        match events.try_recv() {
            Ok(CoordinationEvent::Operation(event)) => {
                lifecycles
                    .entry(event.operation_id().clone())
                    .or_default()
                    .push(lifecycle_step(&event));
            }
            Ok(CoordinationEvent::Container(_)) => {}
            Err(EventBusError::Empty) => break,
            Err(e) => panic!("event stream broken: {}", e),
        }
    }

    assert_eq!(lifecycles.len(), THREADS * ROUNDS);
    for (operation_id, steps) in &lifecycles {
        assert!(
            matches!(
                steps.as_slice(),
                ["admitted", "completed"] | ["queued", "promoted", "completed"] | ["rejected"]
            ),
            "{} saw events out of order: {:?}",
            operation_id,
            steps
        );
    }
}
