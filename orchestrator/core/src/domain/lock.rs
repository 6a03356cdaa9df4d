// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lock Manager
//!
//! Logical claims held by ACTIVE operations, per container. A claim is not an
//! OS-level lock; it only records which operations currently run against a
//! container and whether any of them holds it exclusively.

use crate::domain::conflict::{ConflictCandidate, ConflictRelation};
use crate::domain::operation::{OperationId, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Claim recorded for one active operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockClaim {
    pub operation_id: OperationId,
    pub container_name: String,
    pub operation_type: OperationType,
    pub exclusive: bool,
    pub requested_at: DateTime<Utc>,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LockManager {
    claims: HashMap<String, BTreeMap<OperationId, LockClaim>>,
    owners: HashMap<OperationId, String>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `operation_id` as active on `container_name`.
    ///
    /// Admission must never hand two exclusive claims on one container out at
    /// the same time; doing so is a bug in the caller.
    pub fn acquire(
        &mut self,
        container_name: &str,
        operation_id: OperationId,
        operation_type: OperationType,
        requested_at: DateTime<Utc>,
    ) -> &LockClaim {
        let exclusive = operation_type.is_exclusive();
        debug_assert!(
            !(exclusive && self.is_locked(container_name)),
            "second exclusive claim on container '{}'",
            container_name
        );

        self.owners
            .insert(operation_id.clone(), container_name.to_string());
        let claims = self.claims.entry(container_name.to_string()).or_default();
        claims.insert(
            operation_id.clone(),
            LockClaim {
                operation_id: operation_id.clone(),
                container_name: container_name.to_string(),
                operation_type,
                exclusive,
                requested_at,
                acquired_at: Utc::now(),
            },
        );
        &claims[&operation_id]
    }

    /// Drop the claim held by `operation_id`, returning the container it was
    /// held on so the caller can re-evaluate that container's queue.
    pub fn release(&mut self, operation_id: &OperationId) -> Option<String> {
        let container_name = self.owners.remove(operation_id)?;
        if let Some(claims) = self.claims.get_mut(&container_name) {
            claims.remove(operation_id);
            if claims.is_empty() {
                self.claims.remove(&container_name);
            }
        }
        Some(container_name)
    }

    /// True while any active claim on the container is exclusive.
    pub fn is_locked(&self, container_name: &str) -> bool {
        self.claims
            .get(container_name)
            .is_some_and(|claims| claims.values().any(|claim| claim.exclusive))
    }

    /// Claims on one container, ordered by operation id.
    pub fn claims_on(&self, container_name: &str) -> impl Iterator<Item = &LockClaim> {
        self.claims
            .get(container_name)
            .into_iter()
            .flat_map(|claims| claims.values())
    }

    pub fn active_ids(&self, container_name: &str) -> Vec<OperationId> {
        self.claims_on(container_name)
            .map(|claim| claim.operation_id.clone())
            .collect()
    }

    /// Active operations a request on `container_name` must be checked
    /// against: claims on the container itself and on each of its dependents.
    pub fn candidates_for<'a>(
        &'a self,
        container_name: &'a str,
        dependents: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = ConflictCandidate<'a>> + 'a {
        let same = self
            .claims_on(container_name)
            .map(|claim| claim.as_candidate(ConflictRelation::SameContainer));
        let edges = dependents.iter().flat_map(move |dependent| {
            self.claims_on(dependent).map(|claim| {
                claim.as_candidate(ConflictRelation::DependencyEdge { existing_active: true })
            })
        });
        same.chain(edges)
    }

    pub fn active_count(&self) -> usize {
        self.owners.len()
    }
}

impl LockClaim {
    fn as_candidate(&self, relation: ConflictRelation) -> ConflictCandidate<'_> {
        ConflictCandidate {
            operation_id: &self.operation_id,
            operation_type: self.operation_type,
            relation,
            active: true,
            requested_at: self.requested_at,
        }
    }
}
