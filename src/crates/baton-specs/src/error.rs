//! Error types for spec construction
//!
//! Construction errors are the hard failures: a definition that cannot even
//! be parsed into a document. Everything after that point is reported
//! through [`ValidationReport`](crate::base::ValidationReport), which
//! aggregates instead of failing fast.

use thiserror::Error;

/// Convenience result type using [`SpecError`]
pub type Result<T> = std::result::Result<T, SpecError>;

/// Errors constructing a spec from a definition
#[derive(Error, Debug)]
pub enum SpecError {
    /// The definition text was empty or blank
    #[error("spec definition is empty")]
    Empty,

    /// The definition text is not valid YAML/JSON
    #[error("failed to parse spec definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The definition parsed, but the document is not a mapping
    #[error("spec definition must be a mapping")]
    NotAMapping,

    /// The declared schema could not be compiled
    #[error("invalid spec schema: {0}")]
    Schema(String),

    /// A validated document did not fit the typed model
    ///
    /// This indicates a gap between the schema and the model types, not a
    /// user error; schema validation runs first and reports user mistakes.
    #[error("spec document does not match the model: {0}")]
    Model(String),
}
