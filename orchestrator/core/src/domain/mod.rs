// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Container fleet, operations and the rules deciding which operations may
//! run together. Everything here is synchronous and free of I/O; the
//! application layer owns the single lock that serialises access.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Registry, state tracking, conflict policy, locks and queues

pub mod conflict;
pub mod coordinator_config;
pub mod events;
pub mod lock;
pub mod operation;
pub mod queue;
pub mod registry;
pub mod state;
pub mod usage;
