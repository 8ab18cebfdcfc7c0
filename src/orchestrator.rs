use crate::capability::{CapabilityError, CapabilityProvider, CapabilityRequest};
use crate::extract::{extract_from_text, parse_lenient};
use crate::pipeline::{render_instruction, TaskGraph, TaskStage};
use crate::session::{Lab, Professor, SessionState};
use crate::shared::append_service_log_line;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ran,
    Skipped,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Ran => write!(f, "ran"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage_id: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl StageOutcome {
    fn skipped(stage: &TaskStage, message: Option<String>) -> Self {
        Self {
            stage_id: stage.id.to_string(),
            status: StageStatus::Skipped,
            message,
            outputs: Map::new(),
            raw_output: None,
        }
    }

    fn failed(stage: &TaskStage, message: String) -> Self {
        Self {
            stage_id: stage.id.to_string(),
            status: StageStatus::Failed,
            message: Some(message),
            outputs: Map::new(),
            raw_output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub run_id: String,
    pub graph_id: String,
    pub input: Map<String, Value>,
    pub stages: Vec<StageOutcome>,
    pub output: Map<String, Value>,
}

impl PipelineRun {
    /// True when at least one ran stage extracted a non-empty field; gates
    /// the best-effort snapshot write.
    pub fn produced_structured_output(&self) -> bool {
        self.stages.iter().any(|outcome| {
            outcome.status == StageStatus::Ran
                && outcome.outputs.values().any(value_is_non_empty)
        })
    }
}

pub struct Orchestrator {
    provider: Arc<dyn CapabilityProvider>,
    model: String,
    log_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CapabilityProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            log_root: None,
        }
    }

    pub fn with_log_root(mut self, log_root: impl Into<PathBuf>) -> Self {
        self.log_root = Some(log_root.into());
        self
    }

    /// Runs every stage of the graph in declaration order against the merged
    /// input. Stage failures are contained: the run itself never errors, and
    /// skipped stages are recorded rather than dropped.
    pub fn execute(&self, graph: &TaskGraph, merged_input: Map<String, Value>) -> PipelineRun {
        let run_id = format!("run-{}", now_nanos());
        let mut merged = merged_input.clone();
        let mut stages = Vec::with_capacity(graph.stages().len());
        let mut fatal_stage: Option<String> = None;

        for stage in graph.stages() {
            if let Some(failed_in) = &fatal_stage {
                self.log(&run_id, graph, stage, "skipped", "reason=fatal_failure");
                stages.push(StageOutcome::skipped(
                    stage,
                    Some(format!("skipped after fatal failure in stage `{failed_in}`")),
                ));
                continue;
            }

            if !stage.condition.evaluate(&merged) {
                self.log(&run_id, graph, stage, "skipped", "reason=condition_not_met");
                stages.push(StageOutcome::skipped(stage, None));
                continue;
            }

            let inputs = stage_input_payload(&merged, &stage.inputs);
            let request = CapabilityRequest {
                capability: stage.capability.clone(),
                model: self.model.clone(),
                instruction: render_instruction(&stage.instruction, &inputs),
                inputs,
                output_schema: stage.schema.clone(),
            };

            let raw = match self.invoke_with_retries(&run_id, graph, stage, &request) {
                Ok(raw) => raw,
                Err(err) => {
                    let message = err.to_string();
                    self.log(&run_id, graph, stage, "failed", &format!("error={message}"));
                    stages.push(StageOutcome::failed(stage, message));
                    if stage.fatal {
                        fatal_stage = Some(stage.id.to_string());
                    }
                    continue;
                }
            };

            if let Some(parsed) = parse_lenient(&raw) {
                if let Err(violation) = stage.schema.check_conformance(&parsed) {
                    let message = format!("schema validation failed: {violation}");
                    self.log(&run_id, graph, stage, "failed", &format!("error={violation}"));
                    stages.push(StageOutcome::failed(stage, message));
                    if stage.fatal {
                        fatal_stage = Some(stage.id.to_string());
                    }
                    continue;
                }
            }

            let extracted = extract_from_text(&raw, &stage.schema);
            for (field, value) in &extracted {
                merged.insert(field.clone(), value.clone());
            }
            self.log(&run_id, graph, stage, "ran", "");
            stages.push(StageOutcome {
                stage_id: stage.id.to_string(),
                status: StageStatus::Ran,
                message: None,
                outputs: extracted,
                raw_output: Some(raw),
            });
        }

        PipelineRun {
            run_id,
            graph_id: graph.id().to_string(),
            input: merged_input,
            stages,
            output: merged,
        }
    }

    fn invoke_with_retries(
        &self,
        run_id: &str,
        graph: &TaskGraph,
        stage: &TaskStage,
        request: &CapabilityRequest,
    ) -> Result<String, CapabilityError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.invoke(request) {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_retryable() && attempt < stage.max_retries => {
                    attempt += 1;
                    self.log(
                        run_id,
                        graph,
                        stage,
                        "retry",
                        &format!("attempt={attempt} error={err}"),
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn log(&self, run_id: &str, graph: &TaskGraph, stage: &TaskStage, decision: &str, detail: &str) {
        let Some(root) = &self.log_root else {
            return;
        };
        let line = if detail.is_empty() {
            format!(
                "run_id={run_id} graph={} stage={} decision={decision}",
                graph.id(),
                stage.id
            )
        } else {
            format!(
                "run_id={run_id} graph={} stage={} decision={decision} {detail}",
                graph.id(),
                stage.id
            )
        };
        let _ = append_service_log_line(root, &line);
    }
}

/// The stage's declared inputs taken from the merged view; a missing
/// dependency defaults to an empty string so downstream capability payloads
/// are always complete.
pub fn stage_input_payload(
    merged: &Map<String, Value>,
    declared_inputs: &[String],
) -> Map<String, Value> {
    let mut payload = Map::new();
    for name in declared_inputs {
        let value = merged
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        payload.insert(name.clone(), value);
    }
    payload
}

/// Union of session state and new request fields. Session memory is laid
/// down first; a request field overrides it only when the request actually
/// carries a value, so an omitted form field falls back to stored state.
pub fn merged_input_for(
    state: &SessionState,
    request_fields: Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    for outputs in state.stage_outputs.values() {
        for (field, value) in outputs {
            merged.entry(field.clone()).or_insert_with(|| value.clone());
        }
    }
    if !state.professors.is_empty() {
        merged.insert(
            "professors".to_string(),
            serde_json::to_value(&state.professors).unwrap_or(Value::Array(Vec::new())),
        );
    }
    if !state.labs.is_empty() {
        merged.insert(
            "labs".to_string(),
            serde_json::to_value(&state.labs).unwrap_or(Value::Array(Vec::new())),
        );
    }
    if let Some(university) = &state.university {
        merged.insert("university".to_string(), Value::String(university.clone()));
    }
    if let Some(resume) = &state.resume {
        merged.insert("resume".to_string(), Value::String(resume.clone()));
    }

    for (field, value) in request_fields {
        if value_is_non_empty(&value) || !merged.contains_key(&field) {
            merged.insert(field, value);
        }
    }
    merged
}

/// Folds a finished run back into the session: typed professor/lab records,
/// per-stage output memory, and the last raw text. Empty extraction defaults
/// never overwrite previously accumulated state.
pub fn fold_run_into_session(state: &mut SessionState, run: &PipelineRun) {
    for outcome in &run.stages {
        if outcome.status != StageStatus::Ran {
            continue;
        }
        if let Some(raw) = &outcome.raw_output {
            state.raw_result = Some(raw.clone());
        }

        let retained: Map<String, Value> = outcome
            .outputs
            .iter()
            .filter(|(_, value)| value_is_non_empty(value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if retained.is_empty() {
            continue;
        }

        if let Some(value) = retained.get("professors") {
            if let Ok(professors) = serde_json::from_value::<Vec<Professor>>(value.clone()) {
                if !professors.is_empty() {
                    state.professors = professors;
                }
            }
        }
        if let Some(value) = retained.get("labs") {
            if let Ok(labs) = serde_json::from_value::<Vec<Lab>>(value.clone()) {
                if !labs.is_empty() {
                    state.labs = labs;
                }
            }
        }
        state.stage_outputs.insert(outcome.stage_id.clone(), retained);
    }
}

pub fn value_is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn now_nanos() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}
