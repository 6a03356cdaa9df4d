// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod coordination;
pub mod coordinator;
pub mod queue_sweeper;

pub use coordination::{AdmissionDecision, ContainerStatusView, CoordinationService, SystemStatus};
pub use coordinator::Coordinator;
pub use queue_sweeper::{QueueSweeper, QueueSweeperConfig};
