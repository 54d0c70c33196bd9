//! # baton-core - Deterministic workflow conductor
//!
//! A conductor advances a directed graph of tasks from a declarative
//! workflow definition. It does **not** execute anything: an external
//! runner reports task outcomes and asks what runs next. All state lives
//! in an in-memory, append-only flow log, every operation is synchronous,
//! and `get_next_tasks` is a pure function of (graph, flow log) - the same
//! log always yields the same answer.
//!
//! ## Core Concepts
//!
//! - **Graph**: tasks and guarded transitions compiled from a
//!   [`WorkflowSpec`](baton_specs::native::WorkflowSpec). Parallel edges
//!   between the same pair carry integer keys.
//! - **Flow log**: one entry per task *activation*. Cycles re-enter tasks
//!   by appending fresh entries; old entries stay as the trace.
//! - **Outbound marks**: when an activation ends, satisfied transitions
//!   are recorded as `"<target>__<key>": true` on its entry. A mark is
//!   pending until the target starts a newer activation.
//! - **Join barrier**: a task with `join` only becomes runnable when
//!   enough of its inbound transitions hold pending marks. Because
//!   pending-ness is scoped to activations, the barrier restarts
//!   automatically on re-entry.
//!
//! ## Quick Start
//!
//! ```rust
//! use baton_core::WorkflowConductor;
//! use baton_specs::native::WorkflowSpec;
//! use serde_json::Map;
//!
//! let definition = r#"
//! version: 1.0
//! tasks:
//!   fetch:
//!     action: core.http
//!     next:
//!       - do: store
//!   store:
//!     action: core.db
//! "#;
//!
//! let spec = WorkflowSpec::new("fetch-and-store", definition).unwrap();
//! let mut conductor = WorkflowConductor::new(spec, Map::new()).unwrap();
//! conductor.set_workflow_state("running").unwrap();
//!
//! // The host dispatches start tasks, then reports outcomes.
//! let start = conductor.get_next_tasks();
//! assert_eq!(start[0].name, "fetch");
//!
//! conductor.update_task_flow("fetch", "running", None).unwrap();
//! conductor.update_task_flow("fetch", "succeeded", None).unwrap();
//! assert_eq!(conductor.get_next_tasks()[0].name, "store");
//! ```
//!
//! ## Module Organization
//!
//! - [`conducting`] - [`WorkflowConductor`], the flow log, next-task
//!   computation
//! - [`graph`] - [`WorkflowGraph`] container with keyed parallel edges
//! - [`states`] - execution states and the transition matrix
//! - [`compose`] - spec → graph compilation
//! - [`error`] - [`ConductorError`] taxonomy

pub mod compose;
pub mod conducting;
pub mod error;
pub mod graph;
pub mod states;

// Re-export main types
pub use compose::compose;
pub use conducting::{
    ContextFrame, EvaluationFailure, NextTask, TaskFlow, TaskFlowEntry, WorkflowConductor,
};
pub use error::{ConductorError, Result};
pub use graph::{SequenceUpdate, TaskNode, TransitionEdge, WorkflowGraph};
pub use states::{is_transition_valid, ExecutionState};
