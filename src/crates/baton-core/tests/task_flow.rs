//! Flow-log behavior: entries, latest-index pointers, cycles, and the
//! failure modes of `update_task_flow`.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use baton_core::{ConductorError, ExecutionState, WorkflowConductor};
use baton_specs::native::WorkflowSpec;

const WF_DEF: &str = r#"
version: 1.0

description: A basic sequential workflow.

tasks:
  task1:
    action: core.noop
    next:
      - do: task2, task5
  task2:
    action: core.noop
    next:
      - do: task3
  task3:
    action: core.noop
    next:
      - do: task4
  task4:
    action: core.noop
    next:
      - do: task2
  task5:
    action: core.noop
"#;

fn prep_conductor(state: Option<&str>) -> WorkflowConductor {
    let spec = WorkflowSpec::new("sequential", WF_DEF).expect("fixture spec parses");
    let mut conductor =
        WorkflowConductor::new(spec, Map::new()).expect("fixture spec is valid");
    if let Some(state) = state {
        conductor.set_workflow_state(state).unwrap();
    }
    conductor
}

fn entry_json(conductor: &WorkflowConductor, name: &str) -> Value {
    serde_json::to_value(conductor.get_task_flow_entry(name).unwrap()).unwrap()
}

fn sequence_json(conductor: &WorkflowConductor) -> Value {
    serde_json::to_value(&conductor.flow().sequence).unwrap()
}

#[test]
fn test_add_task_flow() {
    let mut conductor = prep_conductor(Some("running"));

    conductor.add_task_flow("task1", Some(0)).unwrap();

    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(entry_json(&conductor, "task1"), json!({"id": "task1", "ctx": 0}));
}

#[test]
fn test_add_task_flow_no_context() {
    let mut conductor = prep_conductor(Some("running"));

    conductor.add_task_flow("task1", None).unwrap();

    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(entry_json(&conductor, "task1"), json!({"id": "task1"}));
}

#[test]
fn test_add_task_flow_for_nonexistent_task() {
    let mut conductor = prep_conductor(Some("running"));

    assert!(matches!(
        conductor.add_task_flow("task999", None),
        Err(ConductorError::InvalidTask(name)) if name == "task999"
    ));
    assert!(conductor.flow().sequence.is_empty());
}

#[test]
fn test_add_task_flow_while_not_running() {
    let mut conductor = prep_conductor(None);

    assert!(matches!(
        conductor.add_task_flow("task1", Some(0)),
        Err(ConductorError::WorkflowIsNotRunning { state: None })
    ));
}

#[test]
fn test_update_task_flow() {
    let mut conductor = prep_conductor(Some("running"));

    conductor.update_task_flow("task1", "running", None).unwrap();

    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(
        entry_json(&conductor, "task1"),
        json!({"id": "task1", "state": "running", "ctx": 0})
    );

    conductor
        .update_task_flow("task1", "succeeded", Some(json!("foobar")))
        .unwrap();

    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(
        entry_json(&conductor, "task1"),
        json!({
            "id": "task1",
            "state": "succeeded",
            "task2__0": true,
            "task5__0": true,
            "ctx": 0
        })
    );
}

#[test]
fn test_update_task_flow_for_nonexistent_task() {
    let mut conductor = prep_conductor(Some("running"));

    assert!(matches!(
        conductor.update_task_flow("task999", "running", None),
        Err(ConductorError::InvalidTask(name)) if name == "task999"
    ));
    assert!(conductor.flow().sequence.is_empty());
}

#[test]
fn test_update_invalid_state_to_task_flow_item() {
    let mut conductor = prep_conductor(Some("running"));

    assert!(matches!(
        conductor.update_task_flow("task1", "foobar", None),
        Err(ConductorError::InvalidState(state)) if state == "foobar"
    ));

    // Empty pseudo-state straight to a terminal state is not in the matrix.
    assert!(matches!(
        conductor.update_task_flow("task1", "succeeded", None),
        Err(ConductorError::InvalidStateTransition {
            from: None,
            to: ExecutionState::Succeeded,
        })
    ));

    // Failed validations never touch the log.
    assert!(conductor.flow().sequence.is_empty());
}

#[test]
fn test_update_task_flow_while_not_running() {
    let mut conductor = prep_conductor(None);

    assert!(matches!(
        conductor.update_task_flow("task1", "running", None),
        Err(ConductorError::WorkflowIsNotRunning { state: None })
    ));
}

#[test]
fn test_add_sequence_to_task_flow() {
    let mut conductor = prep_conductor(Some("running"));

    conductor.update_task_flow("task1", "running", None).unwrap();
    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(
        entry_json(&conductor, "task1"),
        json!({"id": "task1", "state": "running", "ctx": 0})
    );

    conductor
        .update_task_flow("task1", "succeeded", Some(json!("foobar")))
        .unwrap();
    let expected_task1 = json!({
        "id": "task1",
        "state": "succeeded",
        "task2__0": true,
        "task5__0": true,
        "ctx": 0
    });
    assert_eq!(entry_json(&conductor, "task1"), expected_task1);
    assert_eq!(sequence_json(&conductor), json!([expected_task1]));

    conductor.update_task_flow("task2", "running", None).unwrap();
    assert_eq!(conductor.get_task_flow_idx("task2"), Some(1));
    assert_eq!(
        entry_json(&conductor, "task2"),
        json!({"id": "task2", "state": "running", "ctx": 0})
    );

    conductor
        .update_task_flow("task2", "succeeded", Some(json!("foobar")))
        .unwrap();
    let expected_task2 = json!({
        "id": "task2",
        "state": "succeeded",
        "task3__0": true,
        "ctx": 0
    });
    assert_eq!(conductor.get_task_flow_idx("task2"), Some(1));
    assert_eq!(entry_json(&conductor, "task2"), expected_task2);
    assert_eq!(
        sequence_json(&conductor),
        json!([expected_task1, expected_task2])
    );
}

#[test]
fn test_add_cycle_to_task_flow() {
    let mut conductor = prep_conductor(Some("running"));

    // The fixture loops task2 -> task3 -> task4 -> task2.
    assert!(!conductor.graph().in_cycle("task1"));
    assert!(conductor.graph().in_cycle("task2"));
    assert!(conductor.graph().in_cycle("task3"));
    assert!(conductor.graph().in_cycle("task4"));

    for task in ["task1", "task2", "task3", "task4"] {
        conductor.update_task_flow(task, "running", None).unwrap();
        conductor.update_task_flow(task, "succeeded", None).unwrap();
    }
    conductor.update_task_flow("task2", "running", None).unwrap();

    // The latest-index map points at the newest activation of each task.
    assert_eq!(conductor.get_task_flow_idx("task1"), Some(0));
    assert_eq!(conductor.get_task_flow_idx("task2"), Some(4));
    assert_eq!(conductor.get_task_flow_idx("task3"), Some(2));
    assert_eq!(conductor.get_task_flow_idx("task4"), Some(3));

    // Older activations stay in the sequence as the trace.
    assert_eq!(
        sequence_json(&conductor),
        json!([
            {"id": "task1", "state": "succeeded", "task2__0": true, "task5__0": true, "ctx": 0},
            {"id": "task2", "state": "succeeded", "task3__0": true, "ctx": 0},
            {"id": "task3", "state": "succeeded", "task4__0": true, "ctx": 0},
            {"id": "task4", "state": "succeeded", "task2__0": true, "ctx": 0},
            {"id": "task2", "state": "running", "ctx": 0},
        ])
    );
}

#[test]
fn test_flow_log_serde_round_trip() {
    let mut conductor = prep_conductor(Some("running"));
    conductor.update_task_flow("task1", "running", None).unwrap();
    conductor.update_task_flow("task1", "succeeded", None).unwrap();

    let serialized = serde_json::to_value(conductor.flow()).unwrap();
    let reparsed: baton_core::TaskFlow = serde_json::from_value(serialized.clone()).unwrap();
    assert_eq!(serde_json::to_value(&reparsed).unwrap(), serialized);
}

proptest! {
    /// Driving the conductor with arbitrary (task, state) reports keeps the
    /// log append-only and the latest-index map pointing at the newest
    /// entry per task, no matter which reports get rejected.
    #[test]
    fn latest_index_invariant_under_random_updates(
        ops in prop::collection::vec(
            (
                prop::sample::select(vec!["task1", "task2", "task3", "task4", "task5", "task999"]),
                prop::sample::select(vec![
                    "requested", "scheduled", "running", "pausing", "paused",
                    "resuming", "canceling", "canceled", "succeeded", "failed", "foobar",
                ]),
            ),
            0..40,
        )
    ) {
        let mut conductor = prep_conductor(Some("running"));
        let mut prior_len = 0;

        for (task, state) in ops {
            let before = serde_json::to_value(&conductor.flow().sequence).unwrap();
            let result = conductor.update_task_flow(task, state, None);
            let sequence = &conductor.flow().sequence;

            // Append-only: no shrinking, and rejected updates change nothing.
            prop_assert!(sequence.len() >= prior_len);
            if result.is_err() {
                prop_assert_eq!(&serde_json::to_value(sequence).unwrap(), &before);
            }
            prior_len = sequence.len();

            // Latest-index invariant.
            for name in ["task1", "task2", "task3", "task4", "task5"] {
                let newest = sequence.iter().rposition(|entry| entry.id == name);
                prop_assert_eq!(conductor.get_task_flow_idx(name), newest);
            }
        }
    }
}
