use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    Text,
    List,
}

impl FieldShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::List => "list",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            Self::Text => Value::String(String::new()),
            Self::List => Value::Array(Vec::new()),
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::List => value.is_array(),
        }
    }
}

impl std::fmt::Display for FieldShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    pub shape: FieldShape,
}

impl OutputField {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: FieldShape::Text,
        }
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: FieldShape::List,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSchema {
    fields: Vec<OutputField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub field: String,
    pub expected: FieldShape,
    pub found: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field `{}` expected {} but capability returned {}",
            self.field, self.expected, self.found
        )
    }
}

impl OutputSchema {
    pub fn new(fields: Vec<OutputField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&OutputField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Shape-checks the fields a structured result carries. Absent fields are
    /// not violations; the extractor substitutes their defaults.
    pub fn check_conformance(&self, result: &Value) -> Result<(), SchemaViolation> {
        let Some(object) = result.as_object() else {
            return Ok(());
        };
        for field in &self.fields {
            if let Some(value) = object.get(&field.name) {
                if !field.shape.matches(value) {
                    return Err(SchemaViolation {
                        field: field.name.clone(),
                        expected: field.shape,
                        found: json_kind(value).to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn research_schema() -> OutputSchema {
        OutputSchema::new(vec![
            OutputField::list("professors"),
            OutputField::list("labs"),
        ])
    }

    #[test]
    fn shape_defaults_are_empty_string_and_empty_list() {
        assert_eq!(FieldShape::Text.default_value(), json!(""));
        assert_eq!(FieldShape::List.default_value(), json!([]));
    }

    #[test]
    fn conformance_accepts_matching_and_absent_fields() {
        let schema = research_schema();
        schema
            .check_conformance(&json!({"professors": [{"name": "a"}]}))
            .expect("partial result conforms");
        schema
            .check_conformance(&json!({"unrelated": 1}))
            .expect("unknown fields are ignored");
    }

    #[test]
    fn conformance_rejects_wrong_shaped_present_field() {
        let schema = research_schema();
        let err = schema
            .check_conformance(&json!({"professors": "Jane Doe"}))
            .expect_err("must fail");
        assert_eq!(err.field, "professors");
        assert!(err.to_string().contains("expected list"));
    }

    #[test]
    fn conformance_ignores_non_object_results() {
        let schema = research_schema();
        schema
            .check_conformance(&json!("free text"))
            .expect("non-objects are the extractor's problem");
    }
}
