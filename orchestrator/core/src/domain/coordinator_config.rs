// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Coordinator tuning (queue depth, history retention, sweep cadence)
// - The container fleet to register at startup (ports, dependency edges)
// - Logging settings

use crate::domain::operation::DEFAULT_PRIORITY;
use crate::domain::registry::ContainerSpec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "convoy.dev/v1";
pub const KIND: &str = "CoordinatorConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfigManifest {
    /// API version (must be "convoy.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: CoordinatorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable fleet name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfigSpec {
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    /// Containers registered when the coordinator is built from this manifest
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Priority given to operations built without an explicit one
    #[serde(default = "default_priority")]
    pub default_priority: i32,

    /// Maximum number of queued operations per container.
    /// Requests that would queue beyond this are rejected.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Number of finished operations kept for lookups
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            default_priority: default_priority(),
            max_queue_depth: default_max_queue_depth(),
            history_limit: default_history_limit(),
            event_bus_capacity: default_event_bus_capacity(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Background re-run of queue promotion for every container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_max_queue_depth() -> usize {
    32
}

fn default_history_limit() -> usize {
    1000
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for CoordinatorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "convoy".to_string(),
                labels: None,
            },
            spec: CoordinatorConfigSpec::default(),
        }
    }
}

impl CoordinatorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONVOY_CONFIG_PATH environment variable
    /// 2. ./convoy-config.yaml (working directory)
    /// 3. ~/.convoy/config.yaml (user home)
    /// 4. /etc/convoy/config.yaml (system, Unix) or C:\ProgramData\Convoy\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONVOY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./convoy-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".convoy").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/convoy/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Convoy\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!(
                "No configuration file found in standard locations. Using empty defaults."
            );
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONVOY_SWEEP_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: CONVOY_SWEEP_ENABLED=true");
                    self.spec.coordinator.sweep.enabled = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: CONVOY_SWEEP_ENABLED=false");
                    self.spec.coordinator.sweep.enabled = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CONVOY_SWEEP_ENABLED: '{}'. Expected true/false.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("CONVOY_SWEEP_INTERVAL_SECONDS") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!(
                        "Environment override: CONVOY_SWEEP_INTERVAL_SECONDS={}",
                        seconds
                    );
                    self.spec.coordinator.sweep.interval_seconds = seconds;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CONVOY_SWEEP_INTERVAL_SECONDS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CONVOY_MAX_QUEUE_DEPTH") {
            match val.parse::<usize>() {
                Ok(depth) => {
                    tracing::info!("Environment override: CONVOY_MAX_QUEUE_DEPTH={}", depth);
                    self.spec.coordinator.max_queue_depth = depth;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CONVOY_MAX_QUEUE_DEPTH: '{}'. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let settings = &self.spec.coordinator;
        if settings.max_queue_depth == 0 {
            anyhow::bail!("spec.coordinator.max_queue_depth must be greater than zero");
        }
        if settings.event_bus_capacity == 0 {
            anyhow::bail!("spec.coordinator.event_bus_capacity must be greater than zero");
        }
        if settings.sweep.enabled && settings.sweep.interval_seconds == 0 {
            anyhow::bail!("spec.coordinator.sweep.interval_seconds must be greater than zero");
        }

        let mut names = HashSet::new();
        for container in &self.spec.containers {
            if container.name.trim().is_empty() {
                anyhow::bail!("Container name cannot be empty");
            }
            if !names.insert(container.name.as_str()) {
                anyhow::bail!("Container '{}' is declared more than once", container.name);
            }
        }

        for container in &self.spec.containers {
            for dependency in &container.dependencies {
                if dependency == &container.name {
                    anyhow::bail!("Container '{}' cannot depend on itself", container.name);
                }
                if !names.contains(dependency.as_str()) {
                    anyhow::bail!(
                        "Container '{}' depends on undeclared container '{}'",
                        container.name,
                        dependency
                    );
                }
            }
        }

        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}
