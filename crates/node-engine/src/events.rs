//! Event types for streaming execution progress
//!
//! Events are sent from the engine to the canvas (or any consumer) to
//! report run boundaries, per-node transitions, provider progress, and
//! output nodes as they are materialized.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Trait for sending execution events
///
/// This abstracts over the transport mechanism (channel, websocket, log)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during graph execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A run started with the given dirty nodes in execution order
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        execution_id: String,
        node_ids: Vec<String>,
    },

    /// Every dirty node completed
    #[serde(rename_all = "camelCase")]
    ExecutionCompleted { execution_id: String },

    /// A node failed and the run stopped
    #[serde(rename_all = "camelCase")]
    ExecutionFailed {
        execution_id: String,
        node_id: Option<String>,
        error: String,
    },

    /// The run was aborted by the caller
    #[serde(rename_all = "camelCase")]
    ExecutionCancelled { execution_id: String },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        execution_id: String,
    },

    /// A node completed successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
    },

    /// A node failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// A node was passed over without running
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        node_id: String,
        execution_id: String,
        reason: String,
    },

    /// Progress reported by the inference provider
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        node_id: String,
        execution_id: String,
        /// Fraction in `0.0..=1.0`
        progress: f32,
        message: Option<String>,
    },

    /// A result node was added to the graph
    #[serde(rename_all = "camelCase")]
    OutputNodeCreated {
        source_node_id: String,
        output_node_id: String,
        execution_id: String,
    },

    /// The dependency graph contains a cycle through these nodes
    #[serde(rename_all = "camelCase")]
    CycleDetected {
        execution_id: String,
        from_node_id: String,
        to_node_id: String,
    },
}

impl WorkflowEvent {
    /// Create a node progress event
    pub fn node_progress(
        node_id: &str,
        execution_id: &str,
        progress: f32,
        message: Option<String>,
    ) -> Self {
        Self::NodeProgress {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            progress,
            message,
        }
    }

    /// Create a node skipped event
    pub fn node_skipped(node_id: &str, execution_id: &str, reason: impl Into<String>) -> Self {
        Self::NodeSkipped {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            reason: reason.into(),
        }
    }

    /// The run this event belongs to
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::ExecutionCompleted { execution_id }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::ExecutionCancelled { execution_id }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::NodeProgress { execution_id, .. }
            | Self::OutputNodeCreated { execution_id, .. }
            | Self::CycleDetected { execution_id, .. } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
