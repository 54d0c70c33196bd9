//! Base spec machinery exercised through a three-level mock hierarchy:
//! schema merging, expression path discovery, and the shape of the
//! aggregated validation report.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use baton_specs::base::{SpecKind, SpecObject};
use baton_specs::error::SpecError;
use baton_specs::types;

struct GrandchildKind;

impl SpecKind for GrandchildKind {
    const VERSION: &'static str = "2.0";

    fn body_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "attr1": types::nonempty_string()
            },
            "required": ["attr1"],
            "additionalProperties": false
        })
    }
}

struct ChildKind;

impl SpecKind for ChildKind {
    const VERSION: &'static str = "2.0";

    fn body_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "attr1": GrandchildKind::body_schema()
            },
            "required": ["attr1"],
            "additionalProperties": false
        })
    }
}

struct MockKind;

impl SpecKind for MockKind {
    const VERSION: &'static str = "2.0";

    fn body_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "attr1": types::nonempty_string(),
                "attr2": types::nonempty_object(),
                "attr3": types::nonempty_string(),
                "attr4": ChildKind::body_schema()
            },
            "required": ["attr1"],
            "additionalProperties": false
        })
    }
}

type MockSpec = SpecObject<MockKind>;

#[test]
fn test_get_version() {
    assert_eq!(MockSpec::get_version(), "2.0");
}

#[test]
fn test_get_schema_merges_meta() {
    let schema = MockSpec::get_schema(true);

    assert_eq!(
        schema,
        json!({
            "type": "object",
            "properties": {
                "attr1": types::nonempty_string(),
                "attr2": types::nonempty_object(),
                "attr3": types::nonempty_string(),
                "attr4": ChildKind::body_schema(),
                "name": types::nonempty_string(),
                "version": {"enum": ["2.0", 2.0]},
                "description": types::nonempty_string(),
                "tags": types::unique_string_list()
            },
            "required": ["attr1"],
            "additionalProperties": false
        })
    );
}

#[test]
fn test_get_schema_without_meta() {
    assert_eq!(MockSpec::get_schema(false), MockKind::body_schema());
}

#[test]
fn test_get_expr_schema_paths() {
    let expected: BTreeMap<String, String> = [
        ("attr1", "properties.attr1"),
        ("attr2", "properties.attr2"),
        ("attr3", "properties.attr3"),
        (
            "attr4.attr1.attr1",
            "properties.attr4.properties.attr1.properties.attr1",
        ),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();

    assert_eq!(MockSpec::get_expr_schema_paths(), expected);
}

#[test]
fn test_spec_init_arg_empty_str() {
    assert!(matches!(
        MockSpec::new("some_spec_name", ""),
        Err(SpecError::Empty)
    ));
}

#[test]
fn test_spec_init_arg_bad_document() {
    assert!(matches!(
        MockSpec::new("some_spec_name", "foobar"),
        Err(SpecError::NotAMapping)
    ));
}

#[test]
fn test_spec_valid() {
    let doc = json!({
        "name": "mock",
        "version": "2.0",
        "description": "This is a mock spec.",
        "attr1": "foobar",
        "attr2": {
            "macro": "polo"
        },
        "attr3": "<% $.foobar %>",
        "attr4": {
            "attr1": {
                "attr1": "<% $.macro %> <% $.polo %>"
            }
        }
    });

    let spec = MockSpec::new("some_spec_name", doc.clone()).unwrap();

    assert_eq!(spec.spec(), &doc);
    assert!(spec.validate().is_empty());
}

#[test]
fn test_spec_invalid() {
    let doc = json!({
        "name": "mock",
        "version": "1.0",
        "description": "This is a mock spec.",
        "attr2": {
            "macro": "polo"
        },
        "attr3": "<% 1 +/ 2 %> and <% {\"a\": 123} %>",
        "attr4": {
            "attr1": {
                "attr1": "<% <% $.foobar %> %>"
            }
        }
    });

    let spec = MockSpec::new("some_spec_name", doc).unwrap();
    let report = spec.validate();

    // Syntax pass: wrong version, then the missing required attribute.
    assert_eq!(report.syntax.len(), 2);

    assert_eq!(report.syntax[0].spec_path.as_deref(), Some("version"));
    assert_eq!(report.syntax[0].schema_path, "properties.version.enum");

    assert_eq!(report.syntax[1].spec_path, None);
    assert_eq!(report.syntax[1].schema_path, "required");
    assert!(report.syntax[1].message.contains("attr1"));

    // Expression pass: three malformed blocks, tagged with the dialect and
    // located by spec and schema path.
    assert_eq!(report.expressions.len(), 3);

    assert_eq!(report.expressions[0].dialect, "query");
    assert_eq!(report.expressions[0].expression, "<% 1 +/ 2 %>");
    assert_eq!(report.expressions[0].spec_path, "attr3");
    assert_eq!(report.expressions[0].schema_path, "properties.attr3");
    assert!(report.expressions[0].message.contains("position 3"));

    assert_eq!(report.expressions[1].dialect, "query");
    assert_eq!(report.expressions[1].expression, "<% {\"a\": 123} %>");
    assert_eq!(report.expressions[1].spec_path, "attr3");
    assert_eq!(report.expressions[1].schema_path, "properties.attr3");
    assert!(report.expressions[1].message.contains("illegal character"));

    assert_eq!(report.expressions[2].dialect, "query");
    assert_eq!(report.expressions[2].expression, "<% <% $.foobar %>");
    assert_eq!(report.expressions[2].spec_path, "attr4.attr1.attr1");
    assert_eq!(
        report.expressions[2].schema_path,
        "properties.attr4.properties.attr1.properties.attr1"
    );
    assert!(report.expressions[2].message.contains("position 0"));
}

#[test]
fn test_spec_valid_yaml() {
    let text = r#"
name: mock
version: '2.0'
description: This is a mock spec.
attr1: foobar
attr2:
    macro: polo
attr3: <% $.foobar %>
attr4:
    attr1:
        attr1: <% $.macro %> <% $.polo %>
"#;

    let spec = MockSpec::new("some_spec_name", text).unwrap();

    assert_eq!(
        spec.spec(),
        &json!({
            "name": "mock",
            "version": "2.0",
            "description": "This is a mock spec.",
            "attr1": "foobar",
            "attr2": {"macro": "polo"},
            "attr3": "<% $.foobar %>",
            "attr4": {"attr1": {"attr1": "<% $.macro %> <% $.polo %>"}}
        })
    );
    assert!(spec.validate().is_empty());
}

#[test]
fn test_report_serialization_omits_empty_sections() {
    let doc = json!({
        "version": "1.0",
        "attr1": "ok"
    });
    let spec = MockSpec::new("some_spec_name", doc).unwrap();
    let report = spec.validate();

    // Only the syntax section has content; the serialized report drops the
    // empty expressions section.
    let rendered = serde_json::to_value(&report).unwrap();
    assert!(rendered.get("syntax").is_some());
    assert!(rendered.get("expressions").is_none());
}
