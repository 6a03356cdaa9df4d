// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Container Registry
//!
//! Holds the fleet of registered containers with their declared ports and
//! dependency edges, and maintains the reverse **dependents** index used by
//! the conflict policy to flag operations that may affect other containers.
//!
//! An edge `A -> B` is declared on `A` ("A depends on B"). The reverse index
//! records `B -> {A}` so that an operation requested on `B` can be checked
//! against operations running on every container that depends on it.
//!
//! Registrations are never removed within the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Declared shape of a container: its name, published ports and the
/// containers it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub ports: BTreeSet<u16>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl ContainerSpec {
    pub fn new(
        name: impl Into<String>,
        ports: impl IntoIterator<Item = u16>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            ports: ports.into_iter().collect(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a successful registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The container was not known and has been added.
    Created,
    /// The container was already registered with identical parameters.
    Unchanged,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Container '{0}' is already registered with different ports or dependencies")]
    ConflictingRegistration(String),

    #[error("Container name cannot be empty")]
    EmptyName,

    #[error("Container '{0}' cannot depend on itself")]
    SelfDependency(String),
}

#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: HashMap<String, ContainerSpec>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container.
    ///
    /// Idempotent for identical parameters. A repeat registration with
    /// different ports or dependencies is refused and leaves the existing
    /// entry untouched.
    pub fn register(&mut self, spec: ContainerSpec) -> Result<RegistrationOutcome, RegistryError> {
        if spec.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if spec.dependencies.contains(&spec.name) {
            return Err(RegistryError::SelfDependency(spec.name));
        }

        if let Some(existing) = self.containers.get(&spec.name) {
            if existing == &spec {
                return Ok(RegistrationOutcome::Unchanged);
            }
            return Err(RegistryError::ConflictingRegistration(spec.name));
        }

        for dependency in &spec.dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(spec.name.clone());
        }
        self.containers.insert(spec.name.clone(), spec);

        Ok(RegistrationOutcome::Created)
    }

    pub fn get(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// Containers that declared a dependency on `name`.
    ///
    /// Dependents may be recorded before `name` itself is registered.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Containers that `name` depends on.
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.containers
            .get(name)
            .map(|spec| spec.dependencies.clone())
            .unwrap_or_default()
    }

    /// Registered container names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.keys().cloned().collect();
        names.sort();
        names
    }
}
