//! # baton-specs - Workflow definition model
//!
//! Parses and validates the declarative workflow documents the conductor
//! consumes. The crate has two layers:
//!
//! - [`base`] - kind-agnostic machinery: a [`base::SpecKind`] declares a
//!   schema (restricted JSON-schema subset) and an expression dialect; a
//!   [`base::SpecObject`] binds a kind to a parsed document and provides
//!   schema merging, expression-path discovery, and two-pass aggregated
//!   validation.
//! - [`native`] - the workflow document format itself:
//!   [`native::WorkflowSpec`] with tasks, guarded transitions, join
//!   barriers, published variables, and retry/with-items hints for the
//!   host runner.
//!
//! Validation never short-circuits: the caller receives every schema
//! violation and every malformed expression in one
//! [`base::ValidationReport`].
//!
//! ## Quick Start
//!
//! ```rust
//! use baton_specs::native::WorkflowSpec;
//!
//! let definition = r#"
//! version: 1.0
//! description: Two steps.
//! tasks:
//!   first:
//!     action: core.noop
//!     next:
//!       - do: second
//!   second:
//!     action: core.noop
//! "#;
//!
//! let spec = WorkflowSpec::new("two-steps", definition).unwrap();
//! assert!(spec.validate().is_empty());
//! assert_eq!(spec.tasks().unwrap().len(), 2);
//! ```

pub mod base;
pub mod error;
pub mod native;
pub mod types;

// Re-export main types
pub use base::{
    ExpressionViolation, SchemaViolation, SpecInput, SpecKind, SpecObject, ValidationReport,
};
pub use error::{Result, SpecError};
pub use native::{
    DoTargets, Join, RetrySpec, TaskSpec, TransitionSpec, WithItems, WorkflowKind, WorkflowSpec,
};
