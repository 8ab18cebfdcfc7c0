use super::graph::GraphError;
use super::schema::OutputSchema;
use crate::shared::StageId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCondition {
    Always,
    HasField { field: String },
}

impl StageCondition {
    pub fn has_field(field: impl Into<String>) -> Self {
        Self::HasField {
            field: field.into(),
        }
    }

    pub fn evaluate(&self, merged: &Map<String, Value>) -> bool {
        match self {
            Self::Always => true,
            Self::HasField { field } => field_is_present(merged, field),
        }
    }
}

/// Present means present and non-empty: blank strings and empty
/// sequences count as absent for gating purposes.
pub fn field_is_present(merged: &Map<String, Value>, field: &str) -> bool {
    match merged.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(entries)) => !entries.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => true,
    }
}

pub fn render_instruction(template: &str, inputs: &Map<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in inputs {
        let placeholder = format!("{{{name}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }
        let text = match value {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };
        rendered = rendered.replace(&placeholder, &text);
    }
    rendered
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStage {
    pub id: StageId,
    pub capability: String,
    pub instruction: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default = "default_condition")]
    pub condition: StageCondition,
    #[serde(default)]
    pub schema: OutputSchema,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_condition() -> StageCondition {
    StageCondition::Always
}

fn default_max_retries() -> u32 {
    1
}

impl TaskStage {
    pub fn builder(id: &str, capability: &str) -> TaskStageBuilder {
        TaskStageBuilder {
            id: id.to_string(),
            capability: capability.to_string(),
            instruction: String::new(),
            inputs: Vec::new(),
            condition: StageCondition::Always,
            schema: OutputSchema::default(),
            fatal: false,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskStageBuilder {
    id: String,
    capability: String,
    instruction: String,
    inputs: Vec<String>,
    condition: StageCondition,
    schema: OutputSchema,
    fatal: bool,
    max_retries: u32,
}

impl TaskStageBuilder {
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn input(mut self, field: impl Into<String>) -> Self {
        self.inputs.push(field.into());
        self
    }

    pub fn condition(mut self, condition: StageCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Result<TaskStage, GraphError> {
        let id = StageId::parse(&self.id).map_err(GraphError::InvalidIdentifier)?;
        if self.capability.trim().is_empty() {
            return Err(GraphError::MissingCapability {
                stage_id: id.to_string(),
            });
        }
        Ok(TaskStage {
            id,
            capability: self.capability,
            instruction: self.instruction,
            inputs: self.inputs,
            condition: self.condition,
            schema: self.schema,
            fatal: self.fatal,
            max_retries: self.max_retries,
        })
    }
}
