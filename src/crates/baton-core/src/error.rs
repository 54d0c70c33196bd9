//! Error types for graph and conductor operations
//!
//! A flat taxonomy: each variant carries what a host needs to act on the
//! failure. Conductor operations fail fast on the first offending argument
//! and leave the flow log and graph untouched; spec validation aggregates
//! instead, surfacing the full [`ValidationReport`] through
//! [`ConductorError::InvalidSpec`].

use thiserror::Error;

use baton_expr::ExpressionError;
use baton_specs::base::ValidationReport;
use baton_specs::error::SpecError;

use crate::states::ExecutionState;

/// Convenience result type using [`ConductorError`]
pub type Result<T> = std::result::Result<T, ConductorError>;

/// Errors from graph construction and conductor operations
#[derive(Error, Debug)]
pub enum ConductorError {
    /// Spec validation produced one or more violations
    ///
    /// The report aggregates every schema and expression violation found;
    /// nothing short-circuits.
    #[error("workflow specification is invalid: {0}")]
    InvalidSpec(ValidationReport),

    /// A task name that is not in the workflow graph
    #[error("task '{0}' is not in the workflow graph")]
    InvalidTask(String),

    /// `add_task` with a name that already exists
    #[error("task '{0}' already exists in the workflow graph")]
    DuplicateTask(String),

    /// `update_sequence` addressed a transition that does not exist
    #[error("transition '{source_task}' -> '{target}' with key {key} is not in the workflow graph")]
    InvalidTransition {
        source_task: String,
        target: String,
        key: usize,
    },

    /// A state string outside the allowed set
    #[error("'{0}' is not a valid execution state")]
    InvalidState(String),

    /// A state change outside the allowed transition matrix
    #[error(
        "transition from state '{}' to state '{to}' is not allowed",
        .from.as_ref().map(|s| s.as_str()).unwrap_or("unset")
    )]
    InvalidStateTransition {
        /// Prior state; `None` is the empty pseudo-state of a fresh entry
        from: Option<ExecutionState>,
        to: ExecutionState,
    },

    /// A flow mutation while the workflow is not in the running state
    #[error(
        "workflow is not running (current state: '{}')",
        .state.as_ref().map(|s| s.as_str()).unwrap_or("unset")
    )]
    WorkflowIsNotRunning { state: Option<ExecutionState> },

    /// An expression failure surfaced outside guard evaluation
    ///
    /// Guard failures during outbound evaluation are downgraded to a false
    /// guard and recorded; this variant covers failures the conductor
    /// cannot absorb, such as `vars` or `output` evaluation.
    #[error("expression failure: {0}")]
    Expression(#[from] ExpressionError),

    /// The spec document could not be constructed or modeled
    #[error(transparent)]
    Spec(#[from] SpecError),
}
