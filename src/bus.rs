//! # Engine Event Bus
//!
//! Lifecycle notifications for observers of the evolution engine - the
//! dashboard's evolution panel, structured logging, persistence hooks.
//!
//! Subscribers register a callback and receive every subsequent event
//! synchronously, in registration order. A panicking subscriber is
//! isolated: the panic is caught, logged, and dispatch continues to the
//! remaining subscribers. Unsubscribing is explicit via the returned
//! [`Subscription`] handle.
//!
//! ## Example
//!
//! ```rust
//! use telos::bus::{EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(|event| {
//!     println!("{}: {}", event.kind, event.data);
//! });
//!
//! bus.emit(EventKind::EvolutionStarted, serde_json::json!({}));
//! subscription.unsubscribe();
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// EVENT KINDS
// ============================================================================

/// Lifecycle events published by the engine.
///
/// The serialized names are the wire contract consumed by the dashboard;
/// they must not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A base directive was seeded into generation zero.
    EvolutionInitialized,
    /// The engine entered the Active state.
    EvolutionStarted,
    /// The engine entered the Stopped state; data retained.
    EvolutionStopped,
    /// The engine was reset; all generations discarded.
    EvolutionReset,
    /// One evolutionary step completed and a generation was appended.
    GenerationEvolved,
    /// The best-of-run directive was written into the backend's slot.
    SystemPromptUpdated,
}

impl EventKind {
    /// Wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvolutionInitialized => "evolution_initialized",
            Self::EvolutionStarted => "evolution_started",
            Self::EvolutionStopped => "evolution_stopped",
            Self::EvolutionReset => "evolution_reset",
            Self::GenerationEvolved => "generation_evolved",
            Self::SystemPromptUpdated => "system_prompt_updated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// One published event: kind, JSON payload, and emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// What happened.
    pub kind: EventKind,

    /// Event payload.
    pub data: serde_json::Value,

    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    /// Create an event stamped with the current time.
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// BUS
// ============================================================================

type Callback = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

/// Synchronous pub/sub channel for [`EngineEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for all subsequent events.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().expect("event bus lock poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .len()
    }

    /// Publish an event to every subscriber, in registration order.
    ///
    /// Each callback runs under `catch_unwind`; one panicking subscriber
    /// does not prevent the rest from observing the event.
    pub fn emit(&self, kind: EventKind, data: serde_json::Value) {
        let event = EngineEvent::new(kind, data);
        // Snapshot the callbacks so a subscriber may unsubscribe (or
        // subscribe) from inside its handler without deadlocking.
        let callbacks: Vec<(u64, Callback)> = {
            let registry = self.registry.lock().expect("event bus lock poisoned");
            registry.subscribers.clone()
        };

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!("event subscriber {} panicked during {}", id, event.kind);
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Handle returned by [`EventBus::subscribe`]. Dropping the handle does
/// **not** unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// The subscriber id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove this subscriber from the bus. No-op if the bus is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().expect("event bus lock poisoned");
            registry.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
