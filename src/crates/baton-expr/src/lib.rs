//! # baton-expr - Expression dialects for workflow guards
//!
//! Transition guards and published variables in a workflow definition are
//! written as expression blocks embedded in strings. This crate provides
//! the evaluation facade the conductor and the spec model consult:
//!
//! - **Extraction** - locate `<% … %>` (or `{{ … }}`) blocks in a string
//! - **Validation** - parse-only checking with character offsets, so spec
//!   validation can point at the exact spot in a definition
//! - **Evaluation** - evaluate against a `serde_json::Value` context, with
//!   string interpolation when a block is embedded in literal text
//!
//! Two dialects share one expression core and differ only in delimiters:
//! `"query"` (data-query, used by the conductor) and `"template"`.
//!
//! ## Quick Start
//!
//! ```rust
//! use baton_expr::{get_evaluator, is_truthy};
//! use serde_json::json;
//!
//! let evaluator = get_evaluator("query").unwrap();
//! let ctx = json!({"approved": true, "count": 2});
//!
//! let value = evaluator.evaluate("<% $.approved and $.count < 3 %>", &ctx).unwrap();
//! assert!(is_truthy(&value));
//!
//! // Parse-only validation reports offsets without needing a context.
//! let errors = evaluator.validate("<% 1 +/ 2 %>");
//! assert_eq!(errors.len(), 1);
//! ```
//!
//! ## Module Organization
//!
//! - [`lexer`] - tokenizer with byte offsets
//! - [`parser`] - Pratt parser producing [`parser::Expr`]
//! - [`eval`] - tree-walking evaluation over JSON values
//! - [`dialect`] - fragment extraction and the per-dialect [`Evaluator`] impls
//! - [`error`] - [`ExpressionError`] taxonomy

pub mod dialect;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

use serde_json::Value;

pub use dialect::{Fragment, QueryEvaluator, TemplateEvaluator};
pub use error::{ExpressionError, Result};
pub use eval::is_truthy;

/// Capability trait for an expression dialect
///
/// The conductor and the spec model hold a `Box<dyn Evaluator>` selected by
/// dialect name; they never depend on a concrete dialect.
pub trait Evaluator: Send + Sync + std::fmt::Debug {
    /// Name of this dialect, used to tag validation errors
    fn dialect(&self) -> &'static str;

    /// Evaluate a string that may contain expression blocks
    ///
    /// Blank text evaluates to `true` (an absent guard always passes).
    /// Text without blocks is returned as a literal string. A single block
    /// spanning the text yields the block's value; mixed text interpolates
    /// each block's rendering into the literal parts.
    fn evaluate(&self, text: &str, ctx: &Value) -> Result<Value>;

    /// Locate all expression blocks in a string
    fn extract_expressions(&self, text: &str) -> Vec<Fragment>;

    /// Parse-only validation of every block in a string
    ///
    /// Returns all extraction and parse errors; empty means the text is
    /// well-formed. Never evaluates anything.
    fn validate(&self, text: &str) -> Vec<ExpressionError>;
}

/// Look up a dialect by name
///
/// # Errors
///
/// [`ExpressionError::UnknownDialect`] when the name is not registered.
pub fn get_evaluator(dialect: &str) -> Result<Box<dyn Evaluator>> {
    match dialect {
        "query" => Ok(Box::new(QueryEvaluator)),
        "template" => Ok(Box::new(TemplateEvaluator)),
        other => Err(ExpressionError::UnknownDialect(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_evaluator_by_name() {
        assert_eq!(get_evaluator("query").unwrap().dialect(), "query");
        assert_eq!(get_evaluator("template").unwrap().dialect(), "template");
    }

    #[test]
    fn test_get_evaluator_unknown_dialect() {
        let err = get_evaluator("lisp").unwrap_err();
        assert_eq!(err, ExpressionError::UnknownDialect("lisp".to_string()));
    }
}
