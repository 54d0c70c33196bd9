//! Workflow graph: task nodes and keyed transition edges
//!
//! A labeled directed multigraph. Nodes are tasks with unique names and an
//! optional join barrier; edges are transitions carrying a guard criteria,
//! a satisfaction flag, and an integer `key` numbering parallel edges
//! between the same pair of tasks.
//!
//! The graph never consults the flow log: membership, neighbor queries,
//! and cycle detection are pure functions of the structure. Neighbor
//! queries return stable orders (`(target, key)` for outbound, `(source,
//! key)` for inbound) so everything downstream is deterministic.
//!
//! # Examples
//!
//! ```rust
//! use baton_core::graph::{TaskNode, WorkflowGraph};
//!
//! let mut graph = WorkflowGraph::new();
//! graph.add_task(TaskNode::new("build")).unwrap();
//! graph.add_task(TaskNode::new("test")).unwrap();
//!
//! let key = graph.add_transition("build", "test", None).unwrap();
//! assert_eq!(key, 0);
//!
//! // A second edge between the same pair gets the next key.
//! let key = graph.add_transition("build", "test", Some("<% $.retry %>".into())).unwrap();
//! assert_eq!(key, 1);
//!
//! assert!(!graph.in_cycle("build"));
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use baton_specs::native::Join;

use crate::error::{ConductorError, Result};

/// A task node: unique name, optional join barrier, opaque extras
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub name: String,

    /// Join barrier gating this task when it has multiple inbound
    /// transitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Join>,

    /// Attributes the graph carries but does not interpret
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl TaskNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            join: None,
            attrs: Map::new(),
        }
    }

    pub fn with_join(mut self, join: Option<Join>) -> Self {
        self.join = join;
        self
    }
}

/// A transition edge between two tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub source: String,
    pub target: String,

    /// Ordinal among parallel edges for the same `(source, target)` pair,
    /// numbered from zero
    pub key: usize,

    /// Guard expression; absent or blank means the transition is
    /// unconditional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,

    /// Variables published into a new context frame when the transition is
    /// taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<Map<String, Value>>,

    /// Whether the current activation of the target has this transition
    /// satisfied
    #[serde(default)]
    pub satisfied: bool,
}

/// Attribute patch for [`WorkflowGraph::update_sequence`]
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SequenceUpdate {
    pub criteria: Option<String>,
    pub satisfied: Option<bool>,
}

/// Directed multigraph of tasks and transitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    tasks: HashMap<String, TaskNode>,
    sequences: Vec<TransitionEdge>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task node
    ///
    /// # Errors
    ///
    /// [`ConductorError::DuplicateTask`] when the name is already present.
    pub fn add_task(&mut self, node: TaskNode) -> Result<()> {
        if self.tasks.contains_key(&node.name) {
            return Err(ConductorError::DuplicateTask(node.name));
        }
        self.tasks.insert(node.name.clone(), node);
        Ok(())
    }

    /// Add a transition edge and return its key
    ///
    /// Parallel edges between the same pair are numbered in insertion
    /// order.
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidTask`] when either endpoint is missing.
    pub fn add_transition(
        &mut self,
        source: &str,
        target: &str,
        criteria: Option<String>,
    ) -> Result<usize> {
        if !self.tasks.contains_key(source) {
            return Err(ConductorError::InvalidTask(source.to_string()));
        }
        if !self.tasks.contains_key(target) {
            return Err(ConductorError::InvalidTask(target.to_string()));
        }

        let key = self
            .sequences
            .iter()
            .filter(|edge| edge.source == source && edge.target == target)
            .count();

        self.sequences.push(TransitionEdge {
            source: source.to_string(),
            target: target.to_string(),
            key,
            criteria,
            publish: None,
            satisfied: false,
        });

        Ok(key)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn get_task(&self, name: &str) -> Option<&TaskNode> {
        self.tasks.get(name)
    }

    /// Number of tasks in the graph
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Outbound transitions of a task, sorted by `(target, key)`
    pub fn get_next_sequences(&self, name: &str) -> Vec<&TransitionEdge> {
        let mut edges: Vec<&TransitionEdge> = self
            .sequences
            .iter()
            .filter(|edge| edge.source == name)
            .collect();
        edges.sort_by(|a, b| (&a.target, a.key).cmp(&(&b.target, b.key)));
        edges
    }

    /// Inbound transitions of a task, sorted by `(source, key)`
    pub fn get_prev_sequences(&self, name: &str) -> Vec<&TransitionEdge> {
        let mut edges: Vec<&TransitionEdge> = self
            .sequences
            .iter()
            .filter(|edge| edge.target == name)
            .collect();
        edges.sort_by(|a, b| (&a.source, a.key).cmp(&(&b.source, b.key)));
        edges
    }

    /// Patch the attributes of one edge
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidTransition`] when no edge matches.
    pub fn update_sequence(
        &mut self,
        source: &str,
        target: &str,
        key: usize,
        update: SequenceUpdate,
    ) -> Result<()> {
        let edge = self
            .sequences
            .iter_mut()
            .find(|edge| edge.source == source && edge.target == target && edge.key == key)
            .ok_or_else(|| ConductorError::InvalidTransition {
                source_task: source.to_string(),
                target: target.to_string(),
                key,
            })?;

        if let Some(criteria) = update.criteria {
            edge.criteria = Some(criteria);
        }
        if let Some(satisfied) = update.satisfied {
            edge.satisfied = satisfied;
        }
        Ok(())
    }

    /// Set the published variables carried by one edge
    pub fn set_sequence_publish(
        &mut self,
        source: &str,
        target: &str,
        key: usize,
        publish: Option<Map<String, Value>>,
    ) -> Result<()> {
        let edge = self
            .sequences
            .iter_mut()
            .find(|edge| edge.source == source && edge.target == target && edge.key == key)
            .ok_or_else(|| ConductorError::InvalidTransition {
                source_task: source.to_string(),
                target: target.to_string(),
                key,
            })?;
        edge.publish = publish;
        Ok(())
    }

    /// Number of inbound transitions of a task
    pub fn in_degree(&self, name: &str) -> usize {
        self.sequences
            .iter()
            .filter(|edge| edge.target == name)
            .count()
    }

    /// Whether a task lies on any directed cycle
    ///
    /// A pure function of the structure: true iff the task is reachable
    /// from one of its own successors.
    pub fn in_cycle(&self, name: &str) -> bool {
        let mut stack: Vec<&str> = self.successors(name).collect();
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == name {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.successors(current));
            }
        }
        false
    }

    /// Tasks with no inbound transitions, sorted by name
    pub fn get_start_tasks(&self) -> Vec<&TaskNode> {
        let mut starts: Vec<&TaskNode> = self
            .tasks
            .values()
            .filter(|task| self.in_degree(&task.name) == 0)
            .collect();
        starts.sort_by(|a, b| a.name.cmp(&b.name));
        starts
    }

    fn successors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let name = name.to_string();
        self.sequences
            .iter()
            .filter(move |edge| edge.source == name)
            .map(|edge| edge.target.as_str())
    }
}
