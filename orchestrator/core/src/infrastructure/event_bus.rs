// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Coordination Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Lets dashboards, audit sinks and agents observe admissions, queueing and
// completions without polling the coordinator.
//
// In-memory only: events published with no subscriber are dropped.

use crate::domain::events::{ContainerEvent, OperationEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    Container(ContainerEvent),
    Operation(OperationEvent),
}

impl CoordinationEvent {
    /// Container the event concerns.
    pub fn container_name(&self) -> &str {
        match self {
            CoordinationEvent::Container(
                ContainerEvent::ContainerRegistered { container_name, .. }
                | ContainerEvent::ContainerStateChanged { container_name, .. },
            ) => container_name,
            CoordinationEvent::Operation(event) => event.container_name(),
        }
    }
}

impl From<ContainerEvent> for CoordinationEvent {
    fn from(event: ContainerEvent) -> Self {
        CoordinationEvent::Container(event)
    }
}

impl From<OperationEvent> for CoordinationEvent {
    fn from(event: OperationEvent) -> Self {
        CoordinationEvent::Operation(event)
    }
}

/// Event bus for publishing and subscribing to coordination events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CoordinationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_container_event(&self, event: ContainerEvent) {
        self.publish(CoordinationEvent::Container(event));
    }

    pub fn publish_operation_event(&self, event: OperationEvent) {
        self.publish(CoordinationEvent::Operation(event));
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CoordinationEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is listening
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all coordination events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single container.
    /// Useful for following one service while its operations are queued and promoted.
    pub fn subscribe_container(&self, container_name: impl Into<String>) -> ContainerEventReceiver {
        ContainerEventReceiver {
            receiver: self.sender.subscribe(),
            container_name: container_name.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

fn map_try_recv_error(e: broadcast::error::TryRecvError) -> EventBusError {
    match e {
        broadcast::error::TryRecvError::Empty => EventBusError::Empty,
        broadcast::error::TryRecvError::Closed => EventBusError::Closed,
        broadcast::error::TryRecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all coordination events
pub struct EventReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.try_recv().map_err(map_try_recv_error)
    }
}

/// Receiver for events concerning one container (filtered)
pub struct ContainerEventReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
    container_name: String,
}

impl ContainerEventReceiver {
    /// Receive the next event for the subscribed container.
    /// Events for other containers are skipped.
    pub async fn recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.container_name() == self.container_name {
                return Ok(event);
            }
        }
    }

    /// Drain buffered events without waiting; `Empty` once nothing matching is left.
    pub fn try_recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(map_try_recv_error)?;
            if event.container_name() == self.container_name {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
