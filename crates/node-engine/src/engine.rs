//! Dirty-tracking execution engine
//!
//! The engine runs the parts of a node graph that are out of date. Each
//! call to [`ExecutionEngine::execute`] rebuilds an [`ExecutionGraph`] from
//! the store, orders the dirty nodes topologically, and runs them one at a
//! time. The first failure stops the run; everything that completed before
//! it keeps its status and outputs.
//!
//! # Key Concepts
//!
//! - **Dirty set**: a node is re-run unless it completed with cached outputs
//!   and nothing upstream of it is dirty
//! - **Single run**: a second `execute` while one is in flight is rejected
//! - **Output nodes**: generator nodes add a completed result node next to
//!   themselves and report it through [`EngineCallbacks`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inference::{AbortSignal, InferenceProvider, JobContext, JobProgress};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{EngineConfig, UnconnectedInputPolicy};
use crate::constants::ports;
use crate::error::{NodeEngineError, Result};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::graph::ExecutionGraph;
use crate::handlers::{self, HandlerContext, NodeInputs, NodeOutcome};
use crate::registry::NodeRegistry;
use crate::store::GraphStore;
use crate::types::{Edge, Node, NodeId, NodePatch, NodeStatus, OutputCache};

/// Called with `(producer_id, output_node_id)` after a generator node
/// materializes its result
pub type ModelJobCompleteCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Hooks into the host application
#[derive(Clone, Default)]
pub struct EngineCallbacks {
    pub on_model_job_complete: Option<ModelJobCompleteCallback>,
}

/// Outcome of one `execute` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node_id: Option<NodeId>,
}

impl ExecutionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            failed_node_id: None,
        }
    }

    pub fn failure(error: impl Into<String>, failed_node_id: Option<NodeId>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            failed_node_id,
        }
    }
}

/// What happened to a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRun {
    /// The handler ran and its outputs were stored
    Completed {
        /// Output node materialized by the run
        output_node_id: Option<NodeId>,
    },
    /// The node was passed over without running
    Skipped,
}

/// Clears the running flag when a run ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Executes node graphs held in a [`GraphStore`]
///
/// Shared through `Arc`; all methods take `&self`.
pub struct ExecutionEngine {
    store: Arc<dyn GraphStore>,
    registry: Arc<NodeRegistry>,
    provider: Arc<dyn InferenceProvider>,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    callbacks: RwLock<EngineCallbacks>,
    running: AtomicBool,
    abort: AbortSignal,
}

impl ExecutionEngine {
    /// Create an engine with the default configuration and no event sink
    pub fn new(
        store: Arc<dyn GraphStore>,
        registry: Arc<NodeRegistry>,
        provider: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            provider,
            config: EngineConfig::default(),
            events: Arc::new(NullEventSink),
            callbacks: RwLock::new(EngineCallbacks::default()),
            running: AtomicBool::new(false),
            abort: AbortSignal::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the host callbacks
    pub fn set_callbacks(&self, callbacks: EngineCallbacks) {
        *self.callbacks.write() = callbacks;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Whether a run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle that stops the current run when aborted
    ///
    /// The signal is cleared at the start of every run.
    pub fn abort_handle(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Stop the current run before its next node and interrupt any
    /// provider call in flight
    ///
    /// Only a run already in flight is affected. An abort issued while the
    /// engine is idle is cleared when the next run starts.
    pub fn abort(&self) {
        log::info!("Abort requested");
        self.abort.abort();
    }

    /// Run every dirty node in dependency order
    pub async fn execute(&self) -> ExecutionResult {
        let Some(_running) = self.claim() else {
            log::warn!("Execution already in progress; ignoring request");
            return ExecutionResult::failure(NodeEngineError::AlreadyRunning.to_string(), None);
        };

        let execution_id = Uuid::new_v4().to_string();
        let mut graph = ExecutionGraph::build(&self.store.nodes(), &self.store.edges());
        let sorted = graph.sort();

        for (from, to) in &sorted.back_edges {
            self.emit(WorkflowEvent::CycleDetected {
                execution_id: execution_id.clone(),
                from_node_id: from.clone(),
                to_node_id: to.clone(),
            });
        }

        if sorted.order.is_empty() {
            log::debug!("Nothing to execute; every node is up to date");
            return ExecutionResult::ok();
        }

        log::info!(
            "Starting execution {} with {} dirty node(s) of {}",
            execution_id,
            sorted.order.len(),
            graph.len()
        );
        self.emit(WorkflowEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            node_ids: sorted.order.clone(),
        });

        for node_id in &sorted.order {
            if self.abort.is_aborted() {
                return self.cancelled(&execution_id, None);
            }

            match self.run_node(node_id, &execution_id).await {
                Ok(_) => graph.mark_clean(node_id),
                Err(e) if e.is_cancelled() => {
                    return self.cancelled(&execution_id, Some(node_id.clone()));
                }
                Err(e) => {
                    let message = e.to_string();
                    self.emit(WorkflowEvent::ExecutionFailed {
                        execution_id: execution_id.clone(),
                        node_id: Some(node_id.clone()),
                        error: message.clone(),
                    });
                    return ExecutionResult::failure(message, Some(node_id.clone()));
                }
            }
        }

        log::info!("Execution {} completed", execution_id);
        self.emit(WorkflowEvent::ExecutionCompleted { execution_id });
        ExecutionResult::ok()
    }

    /// Run one node outside of a full execution
    ///
    /// Inputs are read from the upstream nodes' current caches; nothing
    /// upstream is recomputed. Fails with
    /// [`NodeEngineError::AlreadyRunning`] while another run is in flight.
    pub async fn execute_node(&self, node_id: &str) -> Result<NodeRun> {
        let Some(_running) = self.claim() else {
            log::warn!("Execution already in progress; not running '{}'", node_id);
            return Err(NodeEngineError::AlreadyRunning);
        };
        let execution_id = Uuid::new_v4().to_string();
        self.run_node(node_id, &execution_id).await
    }

    /// Invalidate a node and everything downstream of it
    ///
    /// Reached nodes go back to `idle` so the next run recomputes them.
    /// Returns the IDs reached. Does nothing while a run is in flight.
    pub fn mark_dirty(&self, node_id: &str) -> Vec<NodeId> {
        if self.is_running() {
            log::warn!("Execution in progress; not marking '{}' dirty", node_id);
            return Vec::new();
        }
        let mut graph = ExecutionGraph::build(&self.store.nodes(), &self.store.edges());
        let reached = graph.mark_dirty(node_id);
        for id in &reached {
            self.store
                .update_node(id, NodePatch::new().status(NodeStatus::Idle).clear_error());
        }
        log::debug!("Marked {} node(s) dirty from '{}'", reached.len(), node_id);
        reached
    }

    /// Take the running flag, clearing any stale abort request
    fn claim(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.abort.reset();
        Some(RunningGuard(&self.running))
    }

    async fn run_node(&self, node_id: &str, execution_id: &str) -> Result<NodeRun> {
        let Some(node) = self.store.get_node_by_id(node_id) else {
            log::debug!("Skipping '{}': node no longer exists", node_id);
            return Ok(NodeRun::Skipped);
        };
        if !self.registry.has_node_type(&node.node_type) {
            log::debug!("Skipping '{}': type '{}' is not registered", node_id, node.node_type);
            self.emit(WorkflowEvent::node_skipped(node_id, execution_id, "unregistered node type"));
            return Ok(NodeRun::Skipped);
        }

        let input_edges = self.store.get_input_edges(node_id);
        if self.skips_unconnected(&node, &input_edges) {
            log::debug!("Skipping '{}': image input is not connected", node_id);
            self.emit(WorkflowEvent::node_skipped(
                node_id,
                execution_id,
                "image input is not connected",
            ));
            return Ok(NodeRun::Skipped);
        }

        self.store
            .update_node(node_id, NodePatch::new().status(NodeStatus::Running).clear_error());
        self.emit(WorkflowEvent::NodeStarted {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
        });

        let inputs = self.gather_inputs(&input_edges);
        let ctx = HandlerContext {
            store: self.store.as_ref(),
            provider: self.provider.as_ref(),
            job: self.job_context(node_id, execution_id),
            layout: self.config.layout,
        };

        match handlers::dispatch(&node, &inputs, &ctx).await {
            Ok(outcome) => Ok(self.complete_node(node_id, execution_id, outcome)),
            Err(e) => {
                self.fail_node(node_id, execution_id, &e);
                Err(e)
            }
        }
    }

    fn complete_node(&self, node_id: &str, execution_id: &str, outcome: NodeOutcome) -> NodeRun {
        let mut patch = NodePatch::new()
            .status(NodeStatus::Complete)
            .output_cache(outcome.outputs)
            .clear_error();
        if let Some(params) = outcome.params {
            patch = patch.params(params);
        }
        if let Some(thumbnail) = outcome.thumbnail_url {
            patch = patch.thumbnail(thumbnail);
        }
        self.store.update_node(node_id, patch);

        log::debug!("Node '{}' completed", node_id);
        self.emit(WorkflowEvent::NodeCompleted {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
        });

        if let Some(output_node_id) = &outcome.output_node_id {
            self.emit(WorkflowEvent::OutputNodeCreated {
                source_node_id: node_id.to_string(),
                output_node_id: output_node_id.clone(),
                execution_id: execution_id.to_string(),
            });
            let callback = self.callbacks.read().on_model_job_complete.clone();
            if let Some(callback) = callback {
                callback(node_id, output_node_id);
            }
        }

        NodeRun::Completed {
            output_node_id: outcome.output_node_id,
        }
    }

    fn fail_node(&self, node_id: &str, execution_id: &str, error: &NodeEngineError) {
        if error.is_cancelled() {
            log::warn!("Node '{}' interrupted by abort", node_id);
            self.store
                .update_node(node_id, NodePatch::new().status(NodeStatus::Idle).clear_error());
            return;
        }

        let message = error.to_string();
        log::error!("Node '{}' failed: {}", node_id, message);
        self.store.update_node(
            node_id,
            NodePatch::new()
                .status(NodeStatus::Error)
                .error(message.clone())
                .output_cache(OutputCache::new()),
        );
        self.emit(WorkflowEvent::NodeFailed {
            node_id: node_id.to_string(),
            execution_id: execution_id.to_string(),
            error: message,
        });
    }

    fn cancelled(&self, execution_id: &str, node_id: Option<NodeId>) -> ExecutionResult {
        log::warn!("Execution {} cancelled", execution_id);
        self.emit(WorkflowEvent::ExecutionCancelled {
            execution_id: execution_id.to_string(),
        });
        ExecutionResult::failure(NodeEngineError::Cancelled.to_string(), node_id)
    }

    fn skips_unconnected(&self, node: &Node, input_edges: &[Edge]) -> bool {
        self.config.unconnected_input_policy == UnconnectedInputPolicy::Skip
            && node.kind().is_some_and(|kind| kind.is_generator())
            && !input_edges.iter().any(|edge| edge.target_port_id == ports::IMAGE)
    }

    /// Values on each input port, taken from the source node's cache
    fn gather_inputs(&self, input_edges: &[Edge]) -> NodeInputs {
        let mut inputs = NodeInputs::new();
        for edge in input_edges {
            let value = self
                .store
                .get_node_by_id(&edge.source_node_id)
                .and_then(|source| source.cached_output(&edge.source_port_id).cloned());
            match value {
                Some(value) => {
                    inputs.insert(edge.target_port_id.clone(), value);
                }
                None => log::debug!(
                    "No cached '{}' output on '{}' for edge '{}'",
                    edge.source_port_id,
                    edge.source_node_id,
                    edge.id
                ),
            }
        }
        inputs
    }

    fn job_context(&self, node_id: &str, execution_id: &str) -> JobContext {
        let events = self.events.clone();
        let node_id = node_id.to_string();
        let execution_id = execution_id.to_string();
        JobContext::new(self.abort.clone()).with_progress(Arc::new(move |progress: JobProgress| {
            let event = WorkflowEvent::node_progress(
                &node_id,
                &execution_id,
                progress.fraction(),
                Some(progress.stage.clone()),
            );
            if let Err(e) = events.send(event) {
                log::warn!("Dropping progress event: {}", e);
            }
        }))
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to send event: {}", e);
        }
    }
}
