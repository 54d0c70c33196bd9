//! Composition: turning a validated workflow spec into a graph
//!
//! Every task becomes a node carrying its join barrier; every `do` target
//! of every `next` item becomes a transition edge carrying the item's
//! `when` guard and `publish` block. Problems found here are spec
//! problems, so they are collected and surfaced together as
//! [`ConductorError::InvalidSpec`] rather than one at a time.

use tracing::debug;

use baton_specs::base::{SchemaViolation, ValidationReport};
use baton_specs::native::{Join, WorkflowSpec};

use crate::error::{ConductorError, Result};
use crate::graph::{TaskNode, WorkflowGraph};

/// Build the workflow graph from a spec
///
/// The spec is assumed schema-valid; what gets checked here is what the
/// schema cannot see: `do` targets referencing unknown tasks and numeric
/// join counts exceeding the task's inbound degree.
pub fn compose(spec: &WorkflowSpec) -> Result<WorkflowGraph> {
    let tasks = spec.tasks()?;
    let mut graph = WorkflowGraph::new();
    let mut problems: Vec<SchemaViolation> = Vec::new();

    for (name, task) in &tasks {
        graph.add_task(TaskNode::new(name.as_str()).with_join(task.join))?;
    }

    for (name, task) in &tasks {
        for (item_idx, transition) in task.next.iter().enumerate() {
            for target in transition.targets.iter() {
                if !graph.has_task(target) {
                    problems.push(SchemaViolation {
                        spec_path: Some(format!("tasks.{name}.next.{item_idx}.do")),
                        schema_path: String::new(),
                        message: format!(
                            "task '{name}' references unknown task '{target}'"
                        ),
                    });
                    continue;
                }
                let key = graph.add_transition(name, target, transition.when.clone())?;
                if transition.publish.is_some() {
                    graph.set_sequence_publish(name, target, key, transition.publish.clone())?;
                }
            }
        }
    }

    for (name, task) in &tasks {
        if let Some(Join::Count(count)) = task.join {
            let in_degree = graph.in_degree(name);
            if count > in_degree {
                problems.push(SchemaViolation {
                    spec_path: Some(format!("tasks.{name}.join")),
                    schema_path: String::new(),
                    message: format!(
                        "join count {count} exceeds the {in_degree} inbound transition(s) of task '{name}'"
                    ),
                });
            }
        }
    }

    if !problems.is_empty() {
        return Err(ConductorError::InvalidSpec(ValidationReport {
            syntax: problems,
            expressions: Vec::new(),
        }));
    }

    debug!(
        tasks = graph.task_count(),
        "workflow graph composed from spec"
    );
    Ok(graph)
}
