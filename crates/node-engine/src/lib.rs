//! Node Engine - dirty-tracking execution for image-generation node graphs
//!
//! This crate runs graphs of prompt, image, diffusion, and mesh nodes
//! against an [`inference::InferenceProvider`]. It supports:
//!
//! - Incremental execution (only nodes without a valid cached output run)
//! - Deterministic topological ordering with cycle reporting
//! - Failure containment (the first failing node stops the run)
//! - Automatic output nodes placed next to the node that produced them
//!
//! # Architecture
//!
//! - `GraphStore`: nodes and edges, injected into the engine
//! - `ExecutionGraph`: per-run dependency graph with dirty flags
//! - `ExecutionEngine`: the run loop, per-node dispatch, and callbacks
//! - `EventSink`: generic event streaming (not tied to any UI transport)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inference::{ClientConfig, HttpInferenceProvider};
//! use node_engine::{ExecutionEngine, GraphBuilder, NodeRegistry};
//!
//! let store = GraphBuilder::new()
//!     .add_node("i1", "image", (0.0, 0.0))
//!     .with_param("imageUrl", "/uploads/cat.png")
//!     .add_node("m1", "model", (300.0, 0.0))
//!     .with_param("positive_prompt", "a cat in a spacesuit")
//!     .add_edge("i1", "image", "m1", "image")
//!     .into_store();
//!
//! let provider = HttpInferenceProvider::new(ClientConfig::from_env())?;
//! let engine = ExecutionEngine::new(
//!     Arc::new(store),
//!     Arc::new(NodeRegistry::with_builtins()),
//!     Arc::new(provider),
//! );
//! let result = engine.execute().await;
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod handlers;
pub mod placement;
pub mod registry;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export key types
pub use builder::GraphBuilder;
pub use config::{EngineConfig, LayoutConfig, UnconnectedInputPolicy};
pub use engine::{
    EngineCallbacks, ExecutionEngine, ExecutionResult, ModelJobCompleteCallback, NodeRun,
};
pub use error::{NodeEngineError, Result};
pub use events::{EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use graph::{ExecutionGraph, ExecutionNode};
pub use handlers::SeedControl;
pub use registry::NodeRegistry;
pub use store::{GraphStore, InMemoryGraphStore};
pub use types::{
    Edge, MeshAsset, Node, NodeId, NodeKind, NodePatch, NodeStatus, OutputCache, PortDataType,
    PortValue, WorkflowGraph,
};
