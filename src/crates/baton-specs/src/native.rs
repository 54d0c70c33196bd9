//! Native workflow definition model
//!
//! The document format the conductor consumes: meta attributes plus
//! `input`, `vars`, `tasks`, and `output`. Tasks declare an `action`, an
//! optional `join` barrier, optional `with-items` and `retry` hints for the
//! host runner, and a `next` list of guarded transitions whose `do` targets
//! accept a single name, a comma-joined string, or a list.
//!
//! ```yaml
//! version: 1.0
//! description: Fan out, then join.
//! tasks:
//!   setup:
//!     action: core.noop
//!     next:
//!       - do: build, test
//!   build:
//!     action: core.local
//!     next:
//!       - when: <% $.succeeded %>
//!         publish:
//!           artifact: <% $.output_path %>
//!         do: finish
//!   test:
//!     action: core.local
//!     next:
//!       - do: finish
//!   finish:
//!     action: core.noop
//!     join: all
//! ```
//!
//! Schema conformance is checked by the base machinery
//! ([`SpecObject::validate`]); the typed accessors here deserialize a
//! validated document for composition.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::base::{SpecKind, SpecObject};
use crate::error::{Result, SpecError};
use crate::types;

/// The native workflow spec kind
pub struct WorkflowKind;

impl SpecKind for WorkflowKind {
    const VERSION: &'static str = "1.0";

    fn body_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "array",
                    "items": {
                        "oneOf": [types::nonempty_string(), types::nonempty_object()]
                    }
                },
                "vars": types::any_object(),
                "output": types::any_object(),
                "tasks": {
                    "type": "object",
                    "minProperties": 1,
                    "additionalProperties": task_schema()
                }
            },
            "required": ["version", "tasks"],
            "additionalProperties": false
        })
    }
}

fn task_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": types::nonempty_string(),
            "input": types::any_object(),
            "join": {
                "oneOf": [
                    {"enum": ["all"]},
                    types::positive_integer()
                ]
            },
            "with-items": {
                "oneOf": [
                    types::nonempty_string(),
                    {"type": "array", "items": types::nonempty_string()}
                ]
            },
            "retry": {
                "type": "object",
                "properties": {
                    "when": {"type": "string"},
                    "count": types::positive_integer(),
                    "delay": {"type": "integer", "minimum": 0}
                },
                "required": ["count"],
                "additionalProperties": false
            },
            "next": {
                "type": "array",
                "items": transition_schema()
            }
        },
        "required": ["action"],
        "additionalProperties": false
    })
}

fn transition_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "when": {"type": "string"},
            "publish": types::any_object(),
            "do": {
                "oneOf": [
                    types::nonempty_string(),
                    {"type": "array", "items": types::nonempty_string()}
                ]
            }
        },
        "additionalProperties": false
    })
}

/// A workflow definition bound to the native kind
pub type WorkflowSpec = SpecObject<WorkflowKind>;

impl SpecObject<WorkflowKind> {
    /// The `name` meta attribute, when present
    pub fn workflow_name(&self) -> Option<&str> {
        self.spec().get("name").and_then(Value::as_str)
    }

    /// The task table, deserialized and sorted by task name
    pub fn tasks(&self) -> Result<BTreeMap<String, TaskSpec>> {
        let tasks = self.spec().get("tasks").cloned().unwrap_or_else(|| json!({}));
        serde_json::from_value(tasks).map_err(|e| SpecError::Model(e.to_string()))
    }

    /// Declared input parameters with their defaults (`null` when none)
    pub fn input_defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        if let Some(entries) = self.spec().get("input").and_then(Value::as_array) {
            for entry in entries {
                match entry {
                    Value::String(name) => {
                        defaults.insert(name.clone(), Value::Null);
                    }
                    Value::Object(map) => {
                        for (name, default) in map {
                            defaults.insert(name.clone(), default.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
        defaults
    }

    /// The `vars` block, when present
    pub fn vars(&self) -> Option<&Map<String, Value>> {
        self.spec().get("vars").and_then(Value::as_object)
    }

    /// The `output` block, when present
    pub fn output(&self) -> Option<&Map<String, Value>> {
        self.spec().get("output").and_then(Value::as_object)
    }
}

/// One task declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Join>,
    #[serde(
        rename = "with-items",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub with_items: Option<WithItems>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<TransitionSpec>,
}

/// One guarded transition out of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<Map<String, Value>>,
    #[serde(rename = "do", default, skip_serializing_if = "DoTargets::is_empty")]
    pub targets: DoTargets,
}

/// The `do` targets of a transition, normalized to an ordered list
///
/// Accepts `task2`, `"task2, task5"`, or `[task2, task5]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoTargets(Vec<String>);

impl DoTargets {
    pub fn new(targets: Vec<String>) -> Self {
        Self(targets)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Serialize for DoTargets {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DoTargets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(joined) => Ok(Self(
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Value::Array(items) => {
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(name) => targets.push(name),
                        other => {
                            return Err(de::Error::custom(format!(
                                "task name must be a string, got {other}"
                            )))
                        }
                    }
                }
                Ok(Self(targets))
            }
            other => Err(de::Error::custom(format!(
                "'do' must be a task name or a list of task names, got {other}"
            ))),
        }
    }
}

/// A task's join barrier: wait for every inbound transition, or for a count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    All,
    Count(usize),
}

impl Serialize for Join {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Count(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Join {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) if s == "all" => Ok(Self::All),
            Value::Number(n) => match n.as_u64() {
                Some(count) if count >= 1 => Ok(Self::Count(count as usize)),
                _ => Err(de::Error::custom("join count must be a positive integer")),
            },
            other => Err(de::Error::custom(format!(
                "join must be \"all\" or a positive integer, got {other}"
            ))),
        }
    }
}

/// Items a task fans out over; consumed by the host runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WithItems {
    Single(String),
    Multiple(Vec<String>),
}

/// Retry hint for the host runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}
