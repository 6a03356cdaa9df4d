// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Convoy Core
//!
//! Coordination engine that admits, serialises or rejects lifecycle
//! operations (restart, stop, config update, deploy, reads) requested by
//! independent agents against a shared fleet of containers.
//!
//! # Architecture
//!
//! - **Domain:** registry, state tracking, conflict policy, lock manager,
//!   operation queue, configuration manifest
//! - **Application:** the [`application::Coordinator`] facade and the
//!   background queue sweeper
//! - **Infrastructure:** in-memory event bus and logging setup

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{AdmissionDecision, CoordinationService, Coordinator, SystemStatus};
pub use domain::*;
