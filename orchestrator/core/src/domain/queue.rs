// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Operation Queue
//!
//! Operations that were accepted but had to wait for a conflicting operation.
//! Each container has its own ordered list:
//!
//! 1. higher `priority` first,
//! 2. then earlier `requested_at`,
//! 3. then submission order.
//!
//! Promotion only ever looks at the head of a container's list. The head is
//! re-graded against the operations active *now*; if nothing at `Medium` or
//! above remains it is handed to the [`LockManager`] and the next head is
//! tried.

use crate::domain::conflict::{AdmissionAction, ConflictCandidate, ConflictPolicy, ConflictRelation};
use crate::domain::lock::LockManager;
use crate::domain::operation::{Operation, OperationId, OperationType};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub operation_id: OperationId,
    pub container_name: String,
    pub operation_type: OperationType,
    pub priority: i32,
    pub requested_at: DateTime<Utc>,
    pub blocking_operation_id: OperationId,
    sequence: u64,
}

impl QueueEntry {
    fn as_candidate(&self, relation: ConflictRelation) -> ConflictCandidate<'_> {
        ConflictCandidate {
            operation_id: &self.operation_id,
            operation_type: self.operation_type,
            relation,
            active: false,
            requested_at: self.requested_at,
        }
    }

    fn runs_before(&self, other: &QueueEntry) -> bool {
        (std::cmp::Reverse(self.priority), self.requested_at, self.sequence)
            < (std::cmp::Reverse(other.priority), other.requested_at, other.sequence)
    }
}

/// Outcome of re-evaluating one container's queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Promotion {
    /// Entries moved to active, in the order they were activated.
    pub promoted: Vec<QueueEntry>,
    /// Head that is still blocked, with its refreshed blocker.
    pub still_blocked: Option<(OperationId, OperationId)>,
}

#[derive(Debug, Default)]
pub struct OperationQueue {
    queues: HashMap<String, Vec<QueueEntry>>,
    next_sequence: u64,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `operation` behind `blocking`, keeping priority/time order.
    /// Returns the zero-based position of the new entry in its container's queue.
    pub fn enqueue(&mut self, operation: &Operation, blocking: OperationId) -> usize {
        let entry = QueueEntry {
            operation_id: operation.operation_id.clone(),
            container_name: operation.container_name.clone(),
            operation_type: operation.operation_type,
            priority: operation.priority,
            requested_at: operation.requested_at,
            blocking_operation_id: blocking,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let queue = self.queues.entry(entry.container_name.clone()).or_default();
        let position = queue.partition_point(|queued| queued.runs_before(&entry));
        queue.insert(position, entry);
        position
    }

    /// Re-evaluate `container_name` against the locks held right now and
    /// activate every head that no longer conflicts.
    pub fn promote(
        &mut self,
        container_name: &str,
        dependents: &BTreeSet<String>,
        locks: &mut LockManager,
    ) -> Promotion {
        let mut promotion = Promotion::default();

        while let Some(head) = self.queues.get(container_name).and_then(|q| q.first()) {
            let candidates = locks.candidates_for(container_name, dependents);
            let assessment = ConflictPolicy::assess(head.operation_type, candidates);

            if assessment.severity.action() != AdmissionAction::Admit {
                if let Some(blocker) = assessment.blocking_operation_id {
                    let head_id = head.operation_id.clone();
                    debug!(
                        operation_id = %head_id,
                        blocking_operation_id = %blocker,
                        severity = %assessment.severity,
                        "Queue head still blocked"
                    );
                    if let Some(head) =
                        self.queues.get_mut(container_name).and_then(|q| q.first_mut())
                    {
                        head.blocking_operation_id = blocker.clone();
                    }
                    promotion.still_blocked = Some((head_id, blocker));
                }
                break;
            }

            let Some(entry) = self.pop_front(container_name) else {
                break;
            };
            locks.acquire(
                &entry.container_name,
                entry.operation_id.clone(),
                entry.operation_type,
                entry.requested_at,
            );
            promotion.promoted.push(entry);
        }

        promotion
    }

    /// Remove a queued operation. The caller re-runs [`Self::promote`] for the
    /// container afterwards.
    pub fn cancel(&mut self, operation_id: &OperationId) -> Option<QueueEntry> {
        let (container_name, index) = self.queues.iter().find_map(|(name, queue)| {
            queue
                .iter()
                .position(|entry| &entry.operation_id == operation_id)
                .map(|index| (name.clone(), index))
        })?;

        let queue = self.queues.get_mut(&container_name)?;
        let entry = queue.remove(index);
        if queue.is_empty() {
            self.queues.remove(&container_name);
        }
        Some(entry)
    }

    fn pop_front(&mut self, container_name: &str) -> Option<QueueEntry> {
        let queue = self.queues.get_mut(container_name)?;
        if queue.is_empty() {
            return None;
        }
        let entry = queue.remove(0);
        if queue.is_empty() {
            self.queues.remove(container_name);
        }
        Some(entry)
    }

    /// Queued operations a new request on `container_name` must be checked
    /// against: entries on the container itself and on each of its dependents.
    pub fn candidates_for<'a>(
        &'a self,
        container_name: &'a str,
        dependents: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = ConflictCandidate<'a>> + 'a {
        let same = self
            .entries(container_name)
            .iter()
            .map(|entry| entry.as_candidate(ConflictRelation::SameContainer));
        let edges = dependents.iter().flat_map(move |dependent| {
            self.entries(dependent).iter().map(|entry| {
                entry.as_candidate(ConflictRelation::DependencyEdge { existing_active: false })
            })
        });
        same.chain(edges)
    }

    pub fn entries(&self, container_name: &str) -> &[QueueEntry] {
        self.queues
            .get(container_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self, container_name: &str) -> usize {
        self.entries(container_name).len()
    }

    pub fn total_len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    /// Containers with at least one queued operation, sorted.
    pub fn containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every queued entry, grouped by container name then queue order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &QueueEntry> {
        let mut names: Vec<&String> = self.queues.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(move |name| self.queues[name].iter())
    }
}
