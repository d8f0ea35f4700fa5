//! Event system for progress tracking
//!
//! This module provides an in-process event bus for distributing progress
//! events to subscribers without blocking operations.
//!
//! # Architecture
//!
//! The event bus uses `tokio::sync::broadcast` for multi-subscriber support.
//! The orchestrator emits publish events and the scheduler emits cycle events;
//! any number of subscribers (CLI progress output, tests) can consume them.
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can lag
//! without blocking emitters.
//!
//! # Example
//!
//! ```no_run
//! use libfanout::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     platforms: vec!["archive".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{PlatformOutcome, PublishResult};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Default per-subscriber buffer
pub const DEFAULT_CAPACITY: usize = 100;

/// Event bus for distributing progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered per subscriber
    /// before older events are dropped (if the subscriber is lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Never blocks. With no subscribers the event is dropped.
    pub fn emit(&self, event: Event) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Events emitted by the orchestrator and the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A post is about to be fanned out
    PublishStarted {
        post_id: String,
        platforms: Vec<String>,
    },

    /// One platform attempt resolved
    PlatformCompleted {
        post_id: String,
        platform: String,
        outcome: PlatformOutcome,
    },

    /// All platform attempts for a post resolved
    PublishFinished { result: PublishResult },

    /// A scheduler cycle began with this many eligible posts
    CycleStarted { eligible: usize },

    /// A scheduler cycle ran to completion
    CycleCompleted {
        published: usize,
        failed: usize,
        skipped: usize,
    },

    /// A tick arrived while a cycle was still running and was dropped
    CycleSkipped,
}
