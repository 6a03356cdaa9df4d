// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Policy
//!
//! Pure decision table grading how unsafe it is to run two operations at the
//! same time. No state, no I/O.
//!
//! ## Same-Container Matrix (symmetric)
//! | existing \ requested | read-only | destructive | config update |
//! |----------------------|-----------|-------------|---------------|
//! | read-only            | None      | None        | None          |
//! | destructive          | None      | Critical    | High          |
//! | config update        | None      | High        | Medium        |
//!
//! ## Dependency Edge
//! When the requested operation targets a container that others depend on,
//! operations on those dependents are weighed with a softer rule:
//! a pair that would be `Critical` on one container is `Medium` when the
//! dependent's operation is actively running, and every other conflicting pair
//! is `Low`. Edges are one-directional: a request on a dependent is never
//! weighed against work on the containers it depends on, and an edge never
//! escalates past `Medium`, so a dependent can delay but never reject work on
//! its dependency.
//!
//! ## Admission
//! | Severity | Effect |
//! |----------|--------|
//! | None, Low | admit (Low is logged) |
//! | Medium, High | queue behind the blocker |
//! | Critical | reject |

use crate::domain::operation::{OperationClass, OperationId, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictSeverity::None => "NONE",
            ConflictSeverity::Low => "LOW",
            ConflictSeverity::Medium => "MEDIUM",
            ConflictSeverity::High => "HIGH",
            ConflictSeverity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// What the admission path should do with a request at a given severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionAction {
    Admit,
    Enqueue,
    Reject,
}

impl ConflictSeverity {
    pub fn action(self) -> AdmissionAction {
        match self {
            ConflictSeverity::None | ConflictSeverity::Low => AdmissionAction::Admit,
            ConflictSeverity::Medium | ConflictSeverity::High => AdmissionAction::Enqueue,
            ConflictSeverity::Critical => AdmissionAction::Reject,
        }
    }
}

/// How an existing operation relates to the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictRelation {
    /// Both operations target the same container.
    SameContainer,
    /// The existing operation runs on a container that depends on the
    /// requested operation's target.
    DependencyEdge { existing_active: bool },
}

pub struct ConflictPolicy;

impl ConflictPolicy {
    pub fn classify(
        existing: OperationType,
        requested: OperationType,
        relation: ConflictRelation,
    ) -> ConflictSeverity {
        let base = Self::same_container(existing, requested);
        match relation {
            ConflictRelation::SameContainer => base,
            ConflictRelation::DependencyEdge { existing_active } => match base {
                ConflictSeverity::None => ConflictSeverity::None,
                ConflictSeverity::Critical if existing_active => ConflictSeverity::Medium,
                _ => ConflictSeverity::Low,
            },
        }
    }

    fn same_container(existing: OperationType, requested: OperationType) -> ConflictSeverity {
        use OperationClass::*;
        match (existing.class(), requested.class()) {
            (ReadOnly, _) | (_, ReadOnly) => ConflictSeverity::None,
            (Destructive, Destructive) => ConflictSeverity::Critical,
            (Destructive, Reconfiguring) | (Reconfiguring, Destructive) => ConflictSeverity::High,
            (Reconfiguring, Reconfiguring) => ConflictSeverity::Medium,
        }
    }

    /// Grade a request against every candidate and keep the worst conflict.
    ///
    /// Ties prefer an active blocker over a queued one, then the oldest.
    pub fn assess<'a>(
        requested: OperationType,
        candidates: impl IntoIterator<Item = ConflictCandidate<'a>>,
    ) -> ConflictAssessment {
        let mut assessment = ConflictAssessment::default();
        let mut best: Option<(ConflictSeverity, bool, DateTime<Utc>)> = None;

        for candidate in candidates {
            let severity = Self::classify(candidate.operation_type, requested, candidate.relation);
            if severity == ConflictSeverity::None {
                continue;
            }
            if severity == ConflictSeverity::Low {
                assessment.warnings.push(candidate.operation_id.clone());
            }

            let better = match best {
                None => true,
                Some((sev, active, at)) => {
                    severity > sev
                        || (severity == sev && candidate.active && !active)
                        || (severity == sev
                            && candidate.active == active
                            && candidate.requested_at < at)
                }
            };
            if better {
                best = Some((severity, candidate.active, candidate.requested_at));
                assessment.severity = severity;
                assessment.blocking_operation_id = Some(candidate.operation_id.clone());
            }
        }

        assessment
    }
}

/// An existing operation the requested one must be checked against.
#[derive(Debug, Clone, Copy)]
pub struct ConflictCandidate<'a> {
    pub operation_id: &'a OperationId,
    pub operation_type: OperationType,
    pub relation: ConflictRelation,
    pub active: bool,
    pub requested_at: DateTime<Utc>,
}

/// Worst conflict found for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictAssessment {
    pub severity: ConflictSeverity,
    pub blocking_operation_id: Option<OperationId>,
    /// Operations that produced a `Low` (warn-and-admit) conflict.
    pub warnings: Vec<OperationId>,
}

impl Default for ConflictAssessment {
    fn default() -> Self {
        Self {
            severity: ConflictSeverity::None,
            blocking_operation_id: None,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use OperationType::*;

    const SAME: ConflictRelation = ConflictRelation::SameContainer;
    const EDGE_ACTIVE: ConflictRelation = ConflictRelation::DependencyEdge {
        existing_active: true,
    };
    const EDGE_QUEUED: ConflictRelation = ConflictRelation::DependencyEdge {
        existing_active: false,
    };

    #[test]
    fn test_read_only_never_conflicts() {
        for read in [Read, HealthCheck, Logs] {
            for other in OperationType::ALL {
                for relation in [SAME, EDGE_ACTIVE, EDGE_QUEUED] {
                    assert_eq!(
                        ConflictPolicy::classify(read, other, relation),
                        ConflictSeverity::None
                    );
                    assert_eq!(
                        ConflictPolicy::classify(other, read, relation),
                        ConflictSeverity::None
                    );
                }
            }
        }
    }

    #[test]
    fn test_same_container_matrix() {
        for a in [Restart, Stop, Start, Deploy] {
            for b in [Restart, Stop, Start, Deploy] {
                assert_eq!(ConflictPolicy::classify(a, b, SAME), ConflictSeverity::Critical);
            }
            assert_eq!(ConflictPolicy::classify(a, ConfigUpdate, SAME), ConflictSeverity::High);
            assert_eq!(ConflictPolicy::classify(ConfigUpdate, a, SAME), ConflictSeverity::High);
        }
        assert_eq!(
            ConflictPolicy::classify(ConfigUpdate, ConfigUpdate, SAME),
            ConflictSeverity::Medium
        );
    }

    #[test]
    fn test_matrix_is_symmetric() {
        for a in OperationType::ALL {
            for b in OperationType::ALL {
                assert_eq!(
                    ConflictPolicy::classify(a, b, SAME),
                    ConflictPolicy::classify(b, a, SAME)
                );
            }
        }
    }

    #[test]
    fn test_dependency_edge_rule() {
        assert_eq!(
            ConflictPolicy::classify(Restart, Restart, EDGE_ACTIVE),
            ConflictSeverity::Medium
        );
        assert_eq!(ConflictPolicy::classify(Restart, Restart, EDGE_QUEUED), ConflictSeverity::Low);
        assert_eq!(
            ConflictPolicy::classify(ConfigUpdate, Restart, EDGE_ACTIVE),
            ConflictSeverity::Low
        );
        assert_eq!(
            ConflictPolicy::classify(ConfigUpdate, ConfigUpdate, EDGE_ACTIVE),
            ConflictSeverity::Low
        );
    }

    #[test]
    fn test_severity_ordering_and_actions() {
        assert!(ConflictSeverity::Critical > ConflictSeverity::High);
        assert!(ConflictSeverity::High > ConflictSeverity::Medium);
        assert!(ConflictSeverity::Low > ConflictSeverity::None);
        assert_eq!(ConflictSeverity::Low.action(), AdmissionAction::Admit);
        assert_eq!(ConflictSeverity::Medium.action(), AdmissionAction::Enqueue);
        assert_eq!(ConflictSeverity::Critical.action(), AdmissionAction::Reject);
    }

    #[test]
    fn test_assess_picks_worst_conflict() {
        let now = Utc::now();
        let config = OperationId::from("config");
        let restart = OperationId::from("restart");
        let candidates = vec![
            ConflictCandidate {
                operation_id: &config,
                operation_type: ConfigUpdate,
                relation: SAME,
                active: true,
                requested_at: now,
            },
            ConflictCandidate {
                operation_id: &restart,
                operation_type: Restart,
                relation: SAME,
                active: false,
                requested_at: now,
            },
        ];

        let assessment = ConflictPolicy::assess(Restart, candidates);
        assert_eq!(assessment.severity, ConflictSeverity::Critical);
        assert_eq!(assessment.blocking_operation_id, Some(restart));
    }

    fn candidate(
        id: &OperationId,
        active: bool,
        requested_at: DateTime<Utc>,
    ) -> ConflictCandidate<'_> {
        ConflictCandidate {
            operation_id: id,
            operation_type: ConfigUpdate,
            relation: SAME,
            active,
            requested_at,
        }
    }

    #[test]
    fn test_assess_tie_prefers_active_then_oldest() {
        let now = Utc::now();
        let queued = OperationId::from("queued");
        let young = OperationId::from("young");
        let old = OperationId::from("old");
        let assessment = ConflictPolicy::assess(
            ConfigUpdate,
            vec![
                candidate(&queued, false, now - Duration::seconds(60)),
                candidate(&young, true, now),
                candidate(&old, true, now - Duration::seconds(10)),
            ],
        );
        assert_eq!(assessment.severity, ConflictSeverity::Medium);
        assert_eq!(assessment.blocking_operation_id, Some(old));
    }

    #[test]
    fn test_assess_collects_low_warnings() {
        let now = Utc::now();
        let dependent = OperationId::from("dependent");
        let assessment = ConflictPolicy::assess(
            Restart,
            vec![ConflictCandidate {
                operation_id: &dependent,
                operation_type: ConfigUpdate,
                relation: EDGE_ACTIVE,
                active: true,
                requested_at: now,
            }],
        );
        assert_eq!(assessment.severity, ConflictSeverity::Low);
        assert_eq!(assessment.warnings, vec![dependent]);
    }

    #[test]
    fn test_assess_without_candidates() {
        let assessment = ConflictPolicy::assess(Restart, Vec::new());
        assert_eq!(assessment, ConflictAssessment::default());
    }
}
