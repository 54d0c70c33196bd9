//! Expression dialects: fragment extraction and the [`Evaluator`] impls
//!
//! Both dialects share the same expression core and differ only in their
//! block delimiters:
//!
//! - [`QueryEvaluator`] — the data-query dialect, `<% … %>`. This is what
//!   the conductor uses for transition guards.
//! - [`TemplateEvaluator`] — the templating dialect, `{{ … }}`.
//!
//! Extraction pairs each opener with the next closer. A second opener
//! before the closer is not detected here; it lands inside the fragment
//! body and fails as a parse error of the inner expression, which keeps the
//! reported position on the stray opener.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ExpressionError, Result};
use crate::eval::{evaluate, render};
use crate::parser::parse;
use crate::Evaluator;

/// One extracted expression block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// The expression body, trimmed, without delimiters
    pub expression: String,
    /// The block as written, including delimiters
    pub source: String,
    /// Byte offset of the opening delimiter within the surrounding text
    pub start: usize,
}

impl Fragment {
    /// Byte offset one past the closing delimiter
    pub fn end(&self) -> usize {
        self.start + self.source.len()
    }
}

fn scan(text: &str, open: &str, close: &str) -> (Vec<Fragment>, Vec<ExpressionError>) {
    let mut fragments = Vec::new();
    let mut errors = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(open) {
        let start = cursor + rel;
        let body_start = start + open.len();
        match text[body_start..].find(close) {
            Some(rel_close) => {
                let end = body_start + rel_close + close.len();
                fragments.push(Fragment {
                    expression: text[body_start..body_start + rel_close].trim().to_string(),
                    source: text[start..end].to_string(),
                    start,
                });
                cursor = end;
            }
            None => {
                errors.push(ExpressionError::Unterminated { pos: start });
                break;
            }
        }
    }

    (fragments, errors)
}

fn validate_text(text: &str, open: &str, close: &str) -> Vec<ExpressionError> {
    let (fragments, mut errors) = scan(text, open, close);
    for fragment in &fragments {
        if let Err(err) = parse(&fragment.expression) {
            errors.push(err);
        }
    }
    errors
}

fn evaluate_text(text: &str, ctx: &Value, open: &str, close: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        // An absent guard always passes.
        return Ok(Value::Bool(true));
    }

    let (fragments, errors) = scan(text, open, close);
    if let Some(err) = errors.into_iter().next() {
        return Err(err);
    }
    if fragments.is_empty() {
        return Ok(Value::String(text.to_string()));
    }

    let eval_fragment = |fragment: &Fragment| -> Result<Value> {
        let expr = parse(&fragment.expression)?;
        evaluate(&expr, ctx).map_err(|e| ExpressionError::evaluation(&fragment.source, e.message))
    };

    if fragments.len() == 1 && fragments[0].source == trimmed {
        return eval_fragment(&fragments[0]);
    }

    // Mixed text: splice evaluated fragments back into the literal parts.
    let mut output = String::new();
    let mut cursor = 0;
    for fragment in &fragments {
        output.push_str(&text[cursor..fragment.start]);
        output.push_str(&render(&eval_fragment(fragment)?));
        cursor = fragment.end();
    }
    output.push_str(&text[cursor..]);
    Ok(Value::String(output))
}

/// The data-query dialect, delimited by `<% … %>`
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEvaluator;

impl QueryEvaluator {
    const OPEN: &'static str = "<%";
    const CLOSE: &'static str = "%>";
}

impl Evaluator for QueryEvaluator {
    fn dialect(&self) -> &'static str {
        "query"
    }

    fn evaluate(&self, text: &str, ctx: &Value) -> Result<Value> {
        evaluate_text(text, ctx, Self::OPEN, Self::CLOSE)
    }

    fn extract_expressions(&self, text: &str) -> Vec<Fragment> {
        scan(text, Self::OPEN, Self::CLOSE).0
    }

    fn validate(&self, text: &str) -> Vec<ExpressionError> {
        validate_text(text, Self::OPEN, Self::CLOSE)
    }
}

/// The templating dialect, delimited by `{{ … }}`
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEvaluator;

impl TemplateEvaluator {
    const OPEN: &'static str = "{{";
    const CLOSE: &'static str = "}}";
}

impl Evaluator for TemplateEvaluator {
    fn dialect(&self) -> &'static str {
        "template"
    }

    fn evaluate(&self, text: &str, ctx: &Value) -> Result<Value> {
        evaluate_text(text, ctx, Self::OPEN, Self::CLOSE)
    }

    fn extract_expressions(&self, text: &str) -> Vec<Fragment> {
        scan(text, Self::OPEN, Self::CLOSE).0
    }

    fn validate(&self, text: &str) -> Vec<ExpressionError> {
        validate_text(text, Self::OPEN, Self::CLOSE)
    }
}
