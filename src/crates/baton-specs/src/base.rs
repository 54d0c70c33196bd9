//! Base spec machinery: schema merging, expression paths, validation
//!
//! A **spec kind** declares a body schema (a restricted JSON-schema subset)
//! and an expression dialect. A [`SpecObject`] binds a kind to a parsed
//! document and provides the shared validation protocol:
//!
//! - [`SpecObject::get_schema`] - the kind's schema, with the shared meta
//!   attributes (`name`, `version`, `description`, `tags`) merged in at the
//!   root when requested. Nested kinds embed each other's body schemas and
//!   never repeat the meta block.
//! - [`SpecObject::get_expr_schema_paths`] - every dotted attribute path
//!   whose schema admits expression strings, mapped to its dotted schema
//!   path. The walk recurses through `properties`, `items`, and `oneOf`.
//! - [`SpecObject::validate`] - two aggregated passes: document-vs-schema
//!   (via the `jsonschema` crate) and parse-checking of every embedded
//!   expression block. Nothing short-circuits; the caller gets the full
//!   [`ValidationReport`] in one shot.
//!
//! # Examples
//!
//! ```rust
//! use baton_specs::base::{SpecKind, SpecObject};
//! use baton_specs::types;
//! use serde_json::{json, Value};
//!
//! struct GreetingKind;
//!
//! impl SpecKind for GreetingKind {
//!     const VERSION: &'static str = "1.0";
//!
//!     fn body_schema() -> Value {
//!         json!({
//!             "type": "object",
//!             "properties": { "greeting": types::nonempty_string() },
//!             "required": ["greeting"],
//!             "additionalProperties": false
//!         })
//!     }
//! }
//!
//! let spec: SpecObject<GreetingKind> =
//!     SpecObject::new("hello", "greeting: <% $.name %>").unwrap();
//! assert!(spec.validate().is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use baton_expr::{get_evaluator, Evaluator, ExpressionError};

use crate::error::{Result, SpecError};
use crate::types;

/// A family of specs sharing one schema and expression dialect
pub trait SpecKind {
    /// Version tag accepted in the meta `version` attribute
    const VERSION: &'static str;

    /// The kind's schema without the shared meta attributes
    fn body_schema() -> Value;

    /// Expression dialect used to check embedded blocks
    fn dialect() -> &'static str {
        "query"
    }
}

/// A definition the spec constructor accepts: YAML/JSON text or an
/// already-parsed mapping
pub enum SpecInput {
    Text(String),
    Document(Value),
}

impl From<&str> for SpecInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for SpecInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for SpecInput {
    fn from(value: Value) -> Self {
        Self::Document(value)
    }
}

impl From<Map<String, Value>> for SpecInput {
    fn from(map: Map<String, Value>) -> Self {
        Self::Document(Value::Object(map))
    }
}

/// One schema violation from the syntax pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// Dotted path into the document, `None` for a top-level `required`
    /// failure (there is no attribute to point at)
    pub spec_path: Option<String>,
    /// Dotted path into the schema
    pub schema_path: String,
    /// Human-readable description of the violation
    pub message: String,
}

/// One failed expression block from the expression pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionViolation {
    /// Dialect that rejected the block
    #[serde(rename = "type")]
    pub dialect: String,
    /// The block as written, including delimiters
    pub expression: String,
    /// Dotted path of the attribute holding the block
    pub spec_path: String,
    /// Dotted schema path of that attribute
    pub schema_path: String,
    /// Description of the failure, with its character offset
    pub message: String,
}

/// Aggregated validation outcome
///
/// Serialization omits empty sections, so a clean report serializes to
/// `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub syntax: Vec<SchemaViolation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<ExpressionViolation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.syntax.is_empty() && self.expressions.is_empty()
    }

    /// Total number of violations across both passes
    pub fn len(&self) -> usize {
        self.syntax.len() + self.expressions.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// A spec kind bound to a parsed document
pub struct SpecObject<K: SpecKind> {
    name: String,
    spec: Value,
    _kind: PhantomData<K>,
}

// Manual impls keep the marker type free of Clone/Debug bounds.
impl<K: SpecKind> Clone for SpecObject<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            spec: self.spec.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: SpecKind> fmt::Debug for SpecObject<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecObject")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish()
    }
}

impl<K: SpecKind> SpecObject<K> {
    /// Parse a definition into a spec
    ///
    /// Accepts YAML/JSON text or an already-parsed mapping. The document is
    /// only required to *be* a mapping here; schema conformance is checked
    /// by [`validate`](Self::validate) so all violations can be reported
    /// together.
    ///
    /// # Errors
    ///
    /// [`SpecError::Empty`] for blank text, [`SpecError::Parse`] for
    /// unparseable text, [`SpecError::NotAMapping`] when the document is
    /// not a mapping.
    pub fn new(name: impl Into<String>, definition: impl Into<SpecInput>) -> Result<Self> {
        let spec = match definition.into() {
            SpecInput::Text(text) => {
                if text.trim().is_empty() {
                    return Err(SpecError::Empty);
                }
                serde_yaml::from_str::<Value>(&text)?
            }
            SpecInput::Document(value) => value,
        };

        if !spec.is_object() {
            return Err(SpecError::NotAMapping);
        }

        Ok(Self {
            name: name.into(),
            spec,
            _kind: PhantomData,
        })
    }

    /// The instance name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed document
    pub fn spec(&self) -> &Value {
        &self.spec
    }

    /// The declared version of this spec kind
    pub fn get_version() -> &'static str {
        K::VERSION
    }

    /// The kind's schema, optionally with the meta attributes merged in
    ///
    /// Root specs ask for the meta block; nested kinds embed each other via
    /// `body_schema()` and leave it out.
    pub fn get_schema(with_meta: bool) -> Value {
        let mut schema = K::body_schema();
        if with_meta {
            if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
                for (key, fragment) in meta_properties(K::VERSION) {
                    props.entry(key).or_insert(fragment);
                }
            }
        }
        schema
    }

    /// Dotted attribute path → dotted schema path, for every leaf whose
    /// schema admits expression strings
    pub fn get_expr_schema_paths() -> BTreeMap<String, String> {
        let mut paths = BTreeMap::new();
        walk_expr_paths(&K::body_schema(), "", "", &mut paths);
        paths
    }

    /// Run both validation passes and return the aggregated report
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        self.validate_syntax(&mut report);
        self.validate_expressions(&mut report);
        if !report.is_empty() {
            debug!(
                spec = self.name.as_str(),
                syntax = report.syntax.len(),
                expressions = report.expressions.len(),
                "spec validation found violations"
            );
        }
        report
    }

    fn validate_syntax(&self, report: &mut ValidationReport) {
        let schema = Self::get_schema(true);
        let compiled = match JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
        {
            Ok(compiled) => compiled,
            Err(error) => {
                report.syntax.push(SchemaViolation {
                    spec_path: None,
                    schema_path: String::new(),
                    message: format!("schema failed to compile: {error}"),
                });
                return;
            }
        };

        if let Err(errors) = compiled.validate(&self.spec) {
            for error in errors {
                report.syntax.push(SchemaViolation {
                    spec_path: pointer_to_dotted(&error.instance_path.to_string()),
                    schema_path: pointer_to_dotted(&error.schema_path.to_string())
                        .unwrap_or_default(),
                    message: error.to_string(),
                });
            }
        }

        // The underlying validator reports in traversal order; pin a stable
        // order keyed on the schema location.
        report
            .syntax
            .sort_by(|a, b| (&a.schema_path, &a.spec_path).cmp(&(&b.schema_path, &b.spec_path)));
    }

    fn validate_expressions(&self, report: &mut ValidationReport) {
        let evaluator: Box<dyn Evaluator> = match get_evaluator(K::dialect()) {
            Ok(evaluator) => evaluator,
            Err(error) => {
                report.syntax.push(SchemaViolation {
                    spec_path: None,
                    schema_path: String::new(),
                    message: error.to_string(),
                });
                return;
            }
        };

        for (spec_path, schema_path) in Self::get_expr_schema_paths() {
            let Some(value) = lookup(&self.spec, &spec_path) else {
                continue;
            };

            let mut strings = Vec::new();
            collect_strings(value, &mut strings);

            for text in strings {
                for fragment in evaluator.extract_expressions(text) {
                    for error in evaluator.validate(&fragment.source) {
                        report.expressions.push(ExpressionViolation {
                            dialect: evaluator.dialect().to_string(),
                            expression: fragment.source.clone(),
                            spec_path: spec_path.clone(),
                            schema_path: schema_path.clone(),
                            message: error.to_string(),
                        });
                    }
                }
                // A trailing opener never becomes a fragment; surface it
                // from a scan of the whole string.
                for error in evaluator.validate(text) {
                    if let ExpressionError::Unterminated { pos } = error {
                        report.expressions.push(ExpressionViolation {
                            dialect: evaluator.dialect().to_string(),
                            expression: text[pos..].to_string(),
                            spec_path: spec_path.clone(),
                            schema_path: schema_path.clone(),
                            message: error.to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn meta_properties(version: &str) -> Vec<(String, Value)> {
    vec![
        ("name".to_string(), types::nonempty_string()),
        ("version".to_string(), types::version_enum(version)),
        ("description".to_string(), types::nonempty_string()),
        ("tags".to_string(), types::unique_string_list()),
    ]
}

fn walk_expr_paths(
    schema: &Value,
    spec_path: &str,
    schema_path: &str,
    out: &mut BTreeMap<String, String>,
) {
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, sub) in props {
            walk_expr_paths(
                sub,
                &joined(spec_path, key),
                &joined(&joined(schema_path, "properties"), key),
                out,
            );
        }
        return;
    }

    if let Some(items) = schema.get("items") {
        walk_expr_paths(items, spec_path, &joined(schema_path, "items"), out);
        return;
    }

    if let Some(alternatives) = schema.get("oneOf").and_then(Value::as_array) {
        for (index, alternative) in alternatives.iter().enumerate() {
            walk_expr_paths(
                alternative,
                spec_path,
                &joined(schema_path, &format!("oneOf.{index}")),
                out,
            );
        }
        return;
    }

    if admits_expressions(schema) && !spec_path.is_empty() {
        out.insert(spec_path.to_string(), schema_path.to_string());
    }
}

/// A leaf admits expression strings when it is untyped, a string, or an
/// open object (whose member values are free-form).
fn admits_expressions(schema: &Value) -> bool {
    match schema.get("type").and_then(Value::as_str) {
        None => true,
        Some("string") | Some("object") => true,
        Some(_) => false,
    }
}

fn joined(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}.{segment}")
    }
}

/// Convert a JSON pointer (`/a/b/0`) to a dotted path; an empty pointer
/// (the document root) maps to `None`.
fn pointer_to_dotted(pointer: &str) -> Option<String> {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.replace('/', "."))
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        Value::Object(map) => {
            for member in map.values() {
                collect_strings(member, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct LeafKind;

    impl SpecKind for LeafKind {
        const VERSION: &'static str = "1.0";

        fn body_schema() -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": types::nonempty_string(),
                    "count": {"type": "integer"},
                    "bag": types::nonempty_object(),
                    "labels": {"type": "array", "items": types::nonempty_string()},
                },
                "required": ["text"],
                "additionalProperties": false
            })
        }
    }

    #[test]
    fn test_meta_merge_at_root_only() {
        let merged = SpecObject::<LeafKind>::get_schema(true);
        let props = merged["properties"].as_object().unwrap();
        assert!(props.contains_key("name"));
        assert_eq!(props["version"], json!({"enum": ["1.0", 1.0]}));

        let bare = SpecObject::<LeafKind>::get_schema(false);
        assert!(bare["properties"].get("version").is_none());
        // Meta never adds required attributes.
        assert_eq!(merged["required"], json!(["text"]));
    }

    #[test]
    fn test_expr_paths_skip_non_string_leaves() {
        let paths = SpecObject::<LeafKind>::get_expr_schema_paths();
        let expected: BTreeMap<String, String> = [
            ("bag", "properties.bag"),
            ("labels", "properties.labels.items"),
            ("text", "properties.text"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_construct_rejects_bad_input() {
        assert!(matches!(
            SpecObject::<LeafKind>::new("s", ""),
            Err(SpecError::Empty)
        ));
        assert!(matches!(
            SpecObject::<LeafKind>::new("s", "just a scalar"),
            Err(SpecError::NotAMapping)
        ));
        assert!(matches!(
            SpecObject::<LeafKind>::new("s", "a: [unclosed"),
            Err(SpecError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_clean_report_is_empty() {
        let spec = SpecObject::<LeafKind>::new("s", "text: <% $.x %>").unwrap();
        let report = spec.validate();
        assert!(report.is_empty());
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({}));
    }

    #[test]
    fn test_validate_reports_schema_and_expression_errors_together() {
        let spec = SpecObject::<LeafKind>::new(
            "s",
            json!({
                "version": "9.9",
                "bag": {"x": "<% 1 +/ 2 %>"},
            }),
        )
        .unwrap();

        let report = spec.validate();
        // version enum violation + missing required "text".
        assert_eq!(report.syntax.len(), 2);
        assert_eq!(
            report.syntax[0].spec_path.as_deref(),
            Some("version")
        );
        assert_eq!(report.syntax[0].schema_path, "properties.version.enum");
        assert_eq!(report.syntax[1].spec_path, None);
        assert_eq!(report.syntax[1].schema_path, "required");

        assert_eq!(report.expressions.len(), 1);
        assert_eq!(report.expressions[0].dialect, "query");
        assert_eq!(report.expressions[0].expression, "<% 1 +/ 2 %>");
        assert_eq!(report.expressions[0].spec_path, "bag");
        assert_eq!(report.expressions[0].schema_path, "properties.bag");
    }

    #[test]
    fn test_validate_unterminated_block() {
        let spec = SpecObject::<LeafKind>::new("s", json!({"text": "x <% $.a"})).unwrap();
        let report = spec.validate();
        assert_eq!(report.expressions.len(), 1);
        assert_eq!(report.expressions[0].expression, "<% $.a");
        assert!(report.expressions[0].message.contains("unterminated"));
    }
}
