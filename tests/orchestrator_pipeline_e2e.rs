use labscout::capability::{CapabilityError, CapabilityProvider, CapabilityRequest};
use labscout::orchestrator::{fold_run_into_session, Orchestrator, StageStatus};
use labscout::pipeline::{OutputField, OutputSchema, StageCondition, TaskGraph, TaskStage};
use labscout::session::SessionState;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, CapabilityError>>>,
    requests: Mutex<Vec<CapabilityRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<String, CapabilityError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl CapabilityProvider for ScriptedProvider {
    fn invoke(&self, request: &CapabilityRequest) -> Result<String, CapabilityError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Api("script exhausted".to_string())))
    }
}

fn merged(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn three_stage_graph() -> TaskGraph {
    TaskGraph::builder("pipeline")
        .request_field("topic")
        .stage(
            TaskStage::builder("find", "matcher")
                .input("topic")
                .schema(OutputSchema::new(vec![OutputField::list("professors")]))
                .build()
                .expect("find stage"),
        )
        .stage(
            TaskStage::builder("profile", "profiler")
                .input("professors")
                .condition(StageCondition::has_field("professors"))
                .schema(OutputSchema::new(vec![OutputField::list("publications")]))
                .build()
                .expect("profile stage"),
        )
        .stage(
            TaskStage::builder("summarize", "writer")
                .input("publications")
                .schema(OutputSchema::new(vec![OutputField::text("summary")]))
                .build()
                .expect("summarize stage"),
        )
        .build()
        .expect("graph")
}

#[test]
fn full_pipeline_forwards_outputs_across_stages() {
    let provider = ScriptedProvider::new(vec![
        Ok(json!({"professors": [{"name": "Jane Doe"}]}).to_string()),
        Ok(json!({"publications": ["paper-1", "paper-2"]}).to_string()),
        Ok(json!({"summary": "two recent papers"}).to_string()),
    ]);
    let orchestrator = Orchestrator::new(provider.clone(), "scout-large");

    let run = orchestrator.execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));

    assert!(run
        .stages
        .iter()
        .all(|outcome| outcome.status == StageStatus::Ran));
    assert_eq!(run.output["publications"], json!(["paper-1", "paper-2"]));
    assert_eq!(run.output["summary"], json!("two recent papers"));
    assert_eq!(provider.request_count(), 3);
}

#[test]
fn conditional_stage_runs_iff_its_field_is_present_and_non_empty() {
    // Empty professors array: the gated stage must be recorded as skipped
    // and must not reach the provider.
    let provider = ScriptedProvider::new(vec![
        Ok(json!({"professors": []}).to_string()),
        Ok(json!({"summary": "nothing to profile"}).to_string()),
    ]);
    let orchestrator = Orchestrator::new(provider.clone(), "scout-large");

    let run = orchestrator.execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));

    assert_eq!(run.stages[0].status, StageStatus::Ran);
    assert_eq!(run.stages[1].status, StageStatus::Skipped);
    assert_eq!(run.stages[2].status, StageStatus::Ran);
    assert_eq!(run.stages.len(), 3, "skipped stages stay in the record");
    assert_eq!(provider.request_count(), 2);
}

#[test]
fn skipped_stage_leaves_prior_session_outputs_unchanged() {
    let mut state = SessionState::default();

    let first = ScriptedProvider::new(vec![
        Ok(json!({"professors": [{"name": "Jane Doe"}]}).to_string()),
        Ok(json!({"publications": ["paper-1"]}).to_string()),
        Ok(json!({"summary": "one paper"}).to_string()),
    ]);
    let run_one = Orchestrator::new(first, "scout-large")
        .execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));
    fold_run_into_session(&mut state, &run_one);
    assert_eq!(
        state.stage_outputs["profile"]["publications"],
        json!(["paper-1"])
    );

    let second = ScriptedProvider::new(vec![
        Ok(json!({"professors": []}).to_string()),
        Ok(json!({"summary": "empty pass"}).to_string()),
    ]);
    let run_two = Orchestrator::new(second, "scout-large")
        .execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));
    fold_run_into_session(&mut state, &run_two);

    assert_eq!(run_two.stages[1].status, StageStatus::Skipped);
    assert_eq!(
        state.stage_outputs["profile"]["publications"],
        json!(["paper-1"]),
        "skipped stage must not disturb its prior output"
    );
    assert_eq!(state.professors.len(), 1, "prior entities survive empty rerun");
}

#[test]
fn validation_failure_mid_pipeline_degrades_gracefully() {
    let provider = ScriptedProvider::new(vec![
        Ok(json!({"professors": [{"name": "Jane Doe"}]}).to_string()),
        // Wrong shape: publications must be a list.
        Ok(json!({"publications": "paper-1"}).to_string()),
        Ok(json!({"summary": "wrote it anyway"}).to_string()),
    ]);
    let orchestrator = Orchestrator::new(provider.clone(), "scout-large");

    let run = orchestrator.execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));

    assert_eq!(run.stages[1].status, StageStatus::Failed);
    assert!(run.stages[1]
        .message
        .as_deref()
        .expect("failure message")
        .contains("schema validation failed"));
    assert_eq!(run.stages[2].status, StageStatus::Ran);
    assert_eq!(run.output["summary"], json!("wrote it anyway"));
    assert_eq!(provider.request_count(), 3);

    // The failed stage contributed nothing to the merged output.
    assert!(run.output.get("publications").is_none());
}

#[test]
fn identical_scripts_produce_identical_decisions_and_outputs() {
    let script = || {
        ScriptedProvider::new(vec![
            Ok(json!({"professors": [{"name": "Jane Doe"}]}).to_string()),
            Ok(json!({"publications": ["paper-1"]}).to_string()),
            Ok(json!({"summary": "stable"}).to_string()),
        ])
    };

    let run_a = Orchestrator::new(script(), "scout-large")
        .execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));
    let run_b = Orchestrator::new(script(), "scout-large")
        .execute(&three_stage_graph(), merged(&[("topic", json!("AI"))]));

    let statuses_a: Vec<_> = run_a.stages.iter().map(|s| s.status).collect();
    let statuses_b: Vec<_> = run_b.stages.iter().map(|s| s.status).collect();
    assert_eq!(statuses_a, statuses_b);
    assert_eq!(run_a.output, run_b.output);
}

#[test]
fn transport_failures_consume_the_retry_budget_then_fail_the_stage() {
    let provider = ScriptedProvider::new(vec![
        Err(CapabilityError::Unavailable("refused".to_string())),
        Err(CapabilityError::Timeout {
            timeout_seconds: 120,
        }),
        Ok(json!({"summary": "never used"}).to_string()),
    ]);
    let orchestrator = Orchestrator::new(provider.clone(), "scout-large");

    let graph = TaskGraph::builder("single")
        .request_field("topic")
        .stage(
            TaskStage::builder("find", "matcher")
                .input("topic")
                .max_retries(1)
                .schema(OutputSchema::new(vec![OutputField::list("professors")]))
                .build()
                .expect("find stage"),
        )
        .build()
        .expect("graph");

    let run = orchestrator.execute(&graph, merged(&[("topic", json!("AI"))]));
    assert_eq!(run.stages[0].status, StageStatus::Failed);
    assert_eq!(provider.request_count(), 2, "one attempt plus one retry");
}
