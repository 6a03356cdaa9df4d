// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Queue Sweeper - Background safety net for queue promotion
//!
//! Promotion normally happens synchronously inside `complete_operation`.
//! The sweeper periodically re-runs promotion for every container with
//! queued work, so a missed wake-up can delay an operation by at most one
//! interval.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic `promote_all` with graceful shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

use crate::application::coordination::CoordinationService;
use crate::domain::coordinator_config::SweepConfig;

/// Configuration for the queue sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSweeperConfig {
    /// How often to run a sweep (in seconds)
    pub interval_seconds: u64,

    /// Whether sweeping is enabled
    pub enabled: bool,
}

impl Default for QueueSweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            enabled: true,
        }
    }
}

impl From<&SweepConfig> for QueueSweeperConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            interval_seconds: config.interval_seconds,
            enabled: config.enabled,
        }
    }
}

/// Queue Sweeper - Background task
pub struct QueueSweeper {
    service: Arc<dyn CoordinationService>,
    config: QueueSweeperConfig,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl QueueSweeper {
    pub fn new(service: Arc<dyn CoordinationService>, config: QueueSweeperConfig) -> Self {
        Self {
            service,
            config,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweeper background task
    /// Returns a handle that can be used to await the task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the sweep loop with graceful shutdown support
    async fn run(&self) {
        if !self.config.enabled {
            info!("Queue sweeper is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting queue sweeper background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let promoted = self.sweep_cycle();
                    if promoted > 0 {
                        info!(promoted, "Queue sweep promoted stalled operations");
                    } else {
                        debug!("Queue sweep found nothing to promote");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping queue sweeper");
                    break;
                }
            }
        }

        info!("Queue sweeper background task stopped");
    }

    /// Execute a single sweep
    fn sweep_cycle(&self) -> usize {
        self.service.promote_all()
    }
}
