//! Event types for the CRM event system
//!
//! Lead and pipeline changes are broadcast on an [`EventBus`] and streamed to
//! dashboards over SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::stage::{LeadStatus, Stage};

/// CRM event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrmEvent {
    /// A lead was created (sales rep or public capture form)
    LeadCreated {
        lead_id: Uuid,
        status: LeadStatus,
        timestamp: DateTime<Utc>,
    },

    /// A lead moved to a different status
    LeadStatusChanged {
        lead_id: Uuid,
        old_status: LeadStatus,
        new_status: LeadStatus,
        timestamp: DateTime<Utc>,
    },

    /// A stage aggregate row was incremented
    PipelineStageUpdated {
        stage: Stage,
        count: i64,
        value: f64,
        timestamp: DateTime<Utc>,
    },

    /// Conversion rates were recomputed across all stages
    ConversionRatesRecalculated {
        stages_updated: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CrmEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            CrmEvent::LeadCreated { .. } => "LeadCreated",
            CrmEvent::LeadStatusChanged { .. } => "LeadStatusChanged",
            CrmEvent::PipelineStageUpdated { .. } => "PipelineStageUpdated",
            CrmEvent::ConversionRatesRecalculated { .. } => "ConversionRatesRecalculated",
        }
    }
}

/// Broadcast channel shared by everything that publishes or streams events
///
/// Cloning is cheap; all clones publish to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CrmEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CrmEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CrmEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
