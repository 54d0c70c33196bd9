//! The workflow conductor and its task-flow log
//!
//! The conductor is consulted by an external runner: the runner reports
//! task outcomes through [`WorkflowConductor::update_task_flow`] and asks
//! [`WorkflowConductor::get_next_tasks`] what became runnable. It never
//! executes anything itself, and every operation is synchronous and
//! in-memory.
//!
//! # The flow log
//!
//! The log is an append-only sequence of [`TaskFlowEntry`] values plus a
//! `task name → index` map pointing at the latest entry per task. An entry
//! is one **activation** of a task; re-entering a finished task (a cycle)
//! appends a fresh entry and repoints the map, leaving the old entry in
//! place as the trace.
//!
//! When an activation reaches a terminal state the conductor walks its
//! outbound transitions in stable order, evaluates each guard against the
//! activation's context, marks satisfied transitions in the graph, and
//! records an outbound mark `"<target>__<key>": true` on the entry. Marks
//! are the durable record: a mark is **pending** until its target starts a
//! newer activation, and the join barrier of a target counts exactly the
//! inbound transitions with a pending mark. That makes
//! [`get_next_tasks`](WorkflowConductor::get_next_tasks) a pure function
//! of (graph, flow log), and it restarts a join barrier automatically when
//! a task is re-entered: marks consumed by an older activation are no
//! longer pending.
//!
//! # Contexts
//!
//! Context frames form an append-only chain. Frame 0 holds the workflow
//! inputs (overlaid on `vars`); a taken transition with `publish` appends
//! a frame recording which entry produced it, and successors spawned by
//! that entry start from the newest frame it produced. Guards see the
//! frame's variables plus `__task` (the completing task) and `__tasks`
//! (latest result per task name).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use baton_expr::{get_evaluator, is_truthy, Evaluator};
use baton_specs::native::{Join, WorkflowSpec};

use crate::compose::compose;
use crate::error::{ConductorError, Result};
use crate::graph::{SequenceUpdate, TransitionEdge, WorkflowGraph};
use crate::states::{is_transition_valid, ExecutionState};

/// Dialect used for transition guards, `vars`, `publish`, and `output`
const GUARD_DIALECT: &str = "query";

/// One activation of a task in the flow log
///
/// Serializes to the wire shape hosts persist: fixed fields plus the
/// outbound marks flattened into top-level `"<target>__<key>": true` keys.
/// Unset fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFlowEntry {
    /// Task name
    pub id: String,

    /// Index into the context chain this activation started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<usize>,

    /// Current state; absent until the first update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ExecutionState>,

    /// Outbound marks recorded when this activation reached a terminal
    /// state; an empty map serializes to no keys at all
    #[serde(flatten)]
    pub marks: BTreeMap<String, bool>,
}

/// One frame in the context chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFrame {
    /// Variable scope visible to guards evaluated against this frame
    pub vars: Map<String, Value>,

    /// Flow-log index of the entry whose `publish` produced this frame;
    /// absent for the initial frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<usize>,
}

/// The append-only task-flow log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFlow {
    /// Every activation, in the order it was opened
    pub sequence: Vec<TaskFlowEntry>,

    /// Task name → index of its latest activation
    pub tasks: HashMap<String, usize>,

    /// The context chain; frame 0 holds the workflow inputs
    pub contexts: Vec<ContextFrame>,

    /// Latest reported result per task name, fed to guard contexts
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub results: HashMap<String, Value>,
}

/// A task the host should dispatch next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextTask {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx: Option<usize>,
}

/// A guard or publish expression that failed to evaluate
///
/// Failures are downgraded to a false guard (or a skipped publish key) and
/// kept here for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFailure {
    pub task: String,
    pub expression: String,
    pub message: String,
}

/// Deterministic engine advancing a workflow graph from task outcomes
pub struct WorkflowConductor {
    spec: WorkflowSpec,
    graph: WorkflowGraph,
    flow: TaskFlow,
    workflow_state: Option<ExecutionState>,
    evaluator: Box<dyn Evaluator>,
    evaluation_failures: Vec<EvaluationFailure>,
}

impl fmt::Debug for WorkflowConductor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConductor")
            .field("spec", &self.spec.name())
            .field("graph", &self.graph)
            .field("flow", &self.flow)
            .field("workflow_state", &self.workflow_state)
            .field("evaluator", &self.evaluator.dialect())
            .field("evaluation_failures", &self.evaluation_failures)
            .finish()
    }
}

impl WorkflowConductor {
    /// Validate the spec, compose the graph, and seed an empty flow log
    ///
    /// Frame 0 of the context chain is the spec's declared input defaults,
    /// overlaid by the given inputs, overlaid by the spec's `vars`
    /// evaluated against those inputs. The workflow state starts unset.
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidSpec`] with the aggregated report when
    /// validation or composition finds violations;
    /// [`ConductorError::Expression`] when a `vars` expression fails to
    /// evaluate.
    pub fn new(spec: WorkflowSpec, inputs: Map<String, Value>) -> Result<Self> {
        let report = spec.validate();
        if !report.is_empty() {
            return Err(ConductorError::InvalidSpec(report));
        }

        let graph = compose(&spec)?;
        let evaluator = get_evaluator(GUARD_DIALECT)?;

        let mut frame = spec.input_defaults();
        frame.extend(inputs);
        if let Some(vars) = spec.vars() {
            let scope = Value::Object(frame.clone());
            for (key, raw) in vars {
                let value = match raw {
                    Value::String(text) => evaluator.evaluate(text, &scope)?,
                    other => other.clone(),
                };
                frame.insert(key.clone(), value);
            }
        }

        debug!(
            workflow = spec.name(),
            tasks = graph.task_count(),
            "workflow conductor constructed"
        );

        Ok(Self {
            spec,
            graph,
            flow: TaskFlow {
                sequence: Vec::new(),
                tasks: HashMap::new(),
                contexts: vec![ContextFrame {
                    vars: frame,
                    origin: None,
                }],
                results: HashMap::new(),
            },
            workflow_state: None,
            evaluator,
            evaluation_failures: Vec::new(),
        })
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn flow(&self) -> &TaskFlow {
        &self.flow
    }

    /// Guard and publish failures recorded so far
    pub fn evaluation_failures(&self) -> &[EvaluationFailure] {
        &self.evaluation_failures
    }

    /// Current workflow state; `None` until the first
    /// [`set_workflow_state`](Self::set_workflow_state)
    pub fn get_workflow_state(&self) -> Option<ExecutionState> {
        self.workflow_state
    }

    /// Move the workflow through the same state machine tasks use
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidState`] for an unknown state string,
    /// [`ConductorError::InvalidStateTransition`] when the move is outside
    /// the matrix.
    pub fn set_workflow_state(&mut self, state: &str) -> Result<()> {
        let to: ExecutionState = state.parse()?;
        if !is_transition_valid(self.workflow_state, to) {
            return Err(ConductorError::InvalidStateTransition {
                from: self.workflow_state,
                to,
            });
        }
        debug!(from = ?self.workflow_state, to = %to, "workflow state updated");
        self.workflow_state = Some(to);
        Ok(())
    }

    /// Index of the latest activation of a task, if it has one
    pub fn get_task_flow_idx(&self, name: &str) -> Option<usize> {
        self.flow.tasks.get(name).copied()
    }

    /// Latest activation of a task, if it has one
    pub fn get_task_flow_entry(&self, name: &str) -> Option<&TaskFlowEntry> {
        self.get_task_flow_idx(name)
            .and_then(|idx| self.flow.sequence.get(idx))
    }

    /// Open a new activation of a task
    ///
    /// # Errors
    ///
    /// [`ConductorError::WorkflowIsNotRunning`] unless the workflow is
    /// running, [`ConductorError::InvalidTask`] for a name outside the
    /// graph.
    pub fn add_task_flow(&mut self, name: &str, in_ctx_idx: Option<usize>) -> Result<&TaskFlowEntry> {
        self.ensure_running()?;
        if !self.graph.has_task(name) {
            return Err(ConductorError::InvalidTask(name.to_string()));
        }

        self.flow.sequence.push(TaskFlowEntry {
            id: name.to_string(),
            ctx: in_ctx_idx,
            state: None,
            marks: BTreeMap::new(),
        });
        let idx = self.flow.sequence.len() - 1;
        self.flow.tasks.insert(name.to_string(), idx);
        Ok(&self.flow.sequence[idx])
    }

    /// Record a task state change reported by the host
    ///
    /// The latest activation is the one updated; when it is already
    /// terminal, the update opens a new activation (the cycle case) and
    /// the target's previous inbound satisfactions are retired. A terminal
    /// state triggers outbound evaluation. Everything is validated before
    /// any mutation, so an error leaves the flow log and graph unchanged.
    ///
    /// # Errors
    ///
    /// [`ConductorError::WorkflowIsNotRunning`],
    /// [`ConductorError::InvalidTask`], [`ConductorError::InvalidState`],
    /// [`ConductorError::InvalidStateTransition`].
    pub fn update_task_flow(
        &mut self,
        name: &str,
        state: &str,
        result: Option<Value>,
    ) -> Result<()> {
        self.ensure_running()?;
        if !self.graph.has_task(name) {
            return Err(ConductorError::InvalidTask(name.to_string()));
        }
        let to: ExecutionState = state.parse()?;

        let (current, reentry) = match self.get_task_flow_entry(name) {
            Some(entry) => match entry.state {
                Some(state) if state.is_terminal() => (None, true),
                state => (state, false),
            },
            None => (None, false),
        };
        if !is_transition_valid(current, to) {
            return Err(ConductorError::InvalidStateTransition { from: current, to });
        }

        let needs_entry = reentry || !self.flow.tasks.contains_key(name);
        if needs_entry {
            let ctx = self.inbound_ctx_idx(name);
            if reentry {
                self.retire_inbound(name)?;
            }
            self.add_task_flow(name, ctx)?;
        }

        let idx = self.flow.tasks[name];
        self.flow.sequence[idx].state = Some(to);
        debug!(task = name, state = %to, entry = idx, "task state updated");

        if let Some(result) = result {
            self.flow.results.insert(name.to_string(), result);
        }

        if to.is_terminal() {
            self.evaluate_outbounds(idx)?;
        }
        Ok(())
    }

    /// The set of tasks that should run next, sorted by name
    ///
    /// A pure function of the graph and the flow log. Outside the running
    /// state the set is empty; with an empty log it is the graph's start
    /// tasks. Otherwise a task is runnable when some entry carries a
    /// pending outbound mark for it and its join barrier passes.
    pub fn get_next_tasks(&self) -> Vec<NextTask> {
        if self.workflow_state != Some(ExecutionState::Running) {
            return Vec::new();
        }

        if self.flow.sequence.is_empty() {
            return self
                .graph
                .get_start_tasks()
                .into_iter()
                .map(|task| NextTask {
                    id: task.name.clone(),
                    name: task.name.clone(),
                    ctx: Some(0),
                })
                .collect();
        }

        let mut next: BTreeMap<String, NextTask> = BTreeMap::new();
        for (idx, entry) in self.flow.sequence.iter().enumerate() {
            for mark in entry.marks.keys() {
                let target = mark_target(mark);
                if !self.mark_pending(idx, target) {
                    continue;
                }
                if !self.join_barrier_met(target) {
                    continue;
                }
                // Later entries overwrite: the newest contributor decides
                // the context.
                next.insert(
                    target.to_string(),
                    NextTask {
                        id: target.to_string(),
                        name: target.to_string(),
                        ctx: Some(self.effective_ctx(idx)),
                    },
                );
            }
        }
        next.into_values().collect()
    }

    /// Evaluate the spec's `output` block against the newest context
    ///
    /// `None` until the workflow is in a terminal state, or when the spec
    /// declares no output.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Expression`] when an output expression fails to
    /// evaluate.
    pub fn get_workflow_output(&self) -> Result<Option<Value>> {
        if !self.workflow_state.map_or(false, |state| state.is_terminal()) {
            return Ok(None);
        }
        let Some(output_spec) = self.spec.output().cloned() else {
            return Ok(None);
        };

        let ctx_idx = self.flow.contexts.len().saturating_sub(1);
        let scope = Value::Object(self.base_context(ctx_idx));

        let mut output = Map::new();
        for (key, raw) in output_spec {
            let value = match raw {
                Value::String(text) => self.evaluator.evaluate(&text, &scope)?,
                other => other,
            };
            output.insert(key, value);
        }
        Ok(Some(Value::Object(output)))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.workflow_state == Some(ExecutionState::Running) {
            Ok(())
        } else {
            Err(ConductorError::WorkflowIsNotRunning {
                state: self.workflow_state,
            })
        }
    }

    /// Walk the outbound transitions of a newly-terminal entry: evaluate
    /// guards, mark what fires, and append a publish frame when taken
    /// transitions publish variables.
    fn evaluate_outbounds(&mut self, entry_idx: usize) -> Result<()> {
        let name = self.flow.sequence[entry_idx].id.clone();
        let ctx_idx = self.flow.sequence[entry_idx].ctx.unwrap_or(0);
        let scope = self.guard_context(ctx_idx, &name);

        let outbounds: Vec<TransitionEdge> = self
            .graph
            .get_next_sequences(&name)
            .into_iter()
            .cloned()
            .collect();

        let mut published: Map<String, Value> = Map::new();
        for edge in outbounds {
            let taken = match edge.criteria.as_deref() {
                None => true,
                Some(text) if text.trim().is_empty() => true,
                Some(text) => match self.evaluator.evaluate(text, &scope) {
                    Ok(value) => is_truthy(&value),
                    Err(error) => {
                        warn!(
                            task = %name,
                            expression = text,
                            %error,
                            "transition guard failed to evaluate, treating as false"
                        );
                        self.evaluation_failures.push(EvaluationFailure {
                            task: name.clone(),
                            expression: text.to_string(),
                            message: error.to_string(),
                        });
                        false
                    }
                },
            };
            if !taken {
                continue;
            }

            self.graph.update_sequence(
                &edge.source,
                &edge.target,
                edge.key,
                SequenceUpdate {
                    satisfied: Some(true),
                    ..Default::default()
                },
            )?;
            self.flow.sequence[entry_idx]
                .marks
                .insert(mark_key(&edge.target, edge.key), true);
            debug!(task = %name, next = %edge.target, key = edge.key, "transition satisfied");

            if let Some(publish) = &edge.publish {
                for (key, raw) in publish.iter() {
                    match raw {
                        Value::String(text) => match self.evaluator.evaluate(text, &scope) {
                            Ok(value) => {
                                published.insert(key.clone(), value);
                            }
                            Err(error) => {
                                warn!(
                                    task = %name,
                                    variable = key.as_str(),
                                    %error,
                                    "publish expression failed to evaluate, skipping"
                                );
                                self.evaluation_failures.push(EvaluationFailure {
                                    task: name.clone(),
                                    expression: text.clone(),
                                    message: error.to_string(),
                                });
                            }
                        },
                        other => {
                            published.insert(key.clone(), other.clone());
                        }
                    }
                }
            }
        }

        if !published.is_empty() {
            let mut vars = self
                .flow
                .contexts
                .get(ctx_idx)
                .map(|frame| frame.vars.clone())
                .unwrap_or_default();
            vars.extend(published);
            self.flow.contexts.push(ContextFrame {
                vars,
                origin: Some(entry_idx),
            });
        }
        Ok(())
    }

    /// Whether the mark at `entry_idx` targeting `target` still feeds a
    /// future activation: pending until the target opens a newer entry.
    fn mark_pending(&self, entry_idx: usize, target: &str) -> bool {
        self.flow
            .tasks
            .get(target)
            .map_or(true, |&latest| latest <= entry_idx)
    }

    /// Join barrier of `target` against its current activation: count
    /// inbound transitions with a pending mark.
    fn join_barrier_met(&self, target: &str) -> bool {
        let Some(join) = self.graph.get_task(target).and_then(|task| task.join) else {
            return true;
        };
        let inbounds = self.graph.get_prev_sequences(target);
        let threshold = match join {
            Join::All => inbounds.len(),
            Join::Count(count) => count,
        };
        let satisfied = inbounds
            .iter()
            .filter(|edge| self.inbound_mark_pending(edge))
            .count();
        satisfied >= threshold
    }

    fn inbound_mark_pending(&self, edge: &TransitionEdge) -> bool {
        let mark = mark_key(&edge.target, edge.key);
        self.flow.sequence.iter().enumerate().any(|(idx, entry)| {
            entry.id == edge.source
                && entry.marks.contains_key(&mark)
                && self.mark_pending(idx, &edge.target)
        })
    }

    /// Context index a fresh activation of `name` should start from: the
    /// newest pending mark's effective context, frame 0 otherwise.
    fn inbound_ctx_idx(&self, name: &str) -> Option<usize> {
        let boundary = self.flow.tasks.get(name).copied();
        for (idx, entry) in self.flow.sequence.iter().enumerate().rev() {
            if boundary.map_or(false, |b| idx < b) {
                break;
            }
            if entry.marks.keys().any(|mark| mark_target(mark) == name) {
                return Some(self.effective_ctx(idx));
            }
        }
        Some(0)
    }

    /// Context successors of entry `entry_idx` start from: the frame its
    /// publish produced, or its own context.
    fn effective_ctx(&self, entry_idx: usize) -> usize {
        self.flow
            .contexts
            .iter()
            .rposition(|frame| frame.origin == Some(entry_idx))
            .unwrap_or_else(|| self.flow.sequence[entry_idx].ctx.unwrap_or(0))
    }

    /// Retire the previous activation's inbound satisfactions when a task
    /// is re-entered.
    fn retire_inbound(&mut self, name: &str) -> Result<()> {
        let inbounds: Vec<(String, String, usize)> = self
            .graph
            .get_prev_sequences(name)
            .into_iter()
            .map(|edge| (edge.source.clone(), edge.target.clone(), edge.key))
            .collect();
        for (source, target, key) in inbounds {
            self.graph.update_sequence(
                &source,
                &target,
                key,
                SequenceUpdate {
                    satisfied: Some(false),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    fn base_context(&self, ctx_idx: usize) -> Map<String, Value> {
        let mut ctx = self
            .flow
            .contexts
            .get(ctx_idx)
            .map(|frame| frame.vars.clone())
            .unwrap_or_default();
        let mut tasks = Map::new();
        for (name, result) in &self.flow.results {
            tasks.insert(name.clone(), result.clone());
        }
        ctx.insert("__tasks".to_string(), Value::Object(tasks));
        ctx
    }

    fn guard_context(&self, ctx_idx: usize, task: &str) -> Value {
        let mut ctx = self.base_context(ctx_idx);
        ctx.insert(
            "__task".to_string(),
            json!({
                "id": task,
                "state": self
                    .get_task_flow_entry(task)
                    .and_then(|entry| entry.state)
                    .map(|state| state.as_str()),
                "result": self.flow.results.get(task),
            }),
        );
        Value::Object(ctx)
    }
}

fn mark_key(target: &str, key: usize) -> String {
    format!("{target}__{key}")
}

/// Target task of an outbound mark key; the key ordinal sits after the
/// last `__`.
fn mark_target(mark: &str) -> &str {
    mark.rsplit_once("__").map(|(target, _)| target).unwrap_or(mark)
}
