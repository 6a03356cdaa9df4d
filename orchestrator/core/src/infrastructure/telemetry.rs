// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Logging setup for processes embedding the coordinator.
//!
//! `RUST_LOG` takes precedence over the configured level. Metrics are emitted
//! through the `metrics` facade; installing a recorder/exporter is left to the
//! embedding binary.

use crate::domain::coordinator_config::LoggingConfig;
use anyhow::{Context, Result};

pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "text" | "compact" => builder.compact().try_init(),
        other => anyhow::bail!("Unsupported log format '{}'. Expected 'json' or 'text'", other),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_format() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
        };
        assert!(init_logging(&config).is_err());
    }
}
