use crate::pipeline::OutputSchema;
use serde_json::{Map, Value};

/// Total extraction: every declared schema field resolves to a value, falling
/// back to the shape default when the raw output is missing the field, is not
/// parseable, or carries a wrong-shaped value. Never errors.
pub fn extract_from_text(raw: &str, schema: &OutputSchema) -> Map<String, Value> {
    let parsed = parse_lenient(raw);
    extract_from_value(parsed.as_ref(), schema)
}

pub fn extract_from_value(raw: Option<&Value>, schema: &OutputSchema) -> Map<String, Value> {
    let object = raw.and_then(Value::as_object);
    let mut extracted = Map::new();
    for field in schema.fields() {
        let value = object
            .and_then(|entries| entries.get(&field.name))
            .filter(|value| field.shape.matches(value))
            .cloned()
            .unwrap_or_else(|| field.shape.default_value());
        extracted.insert(field.name.clone(), value);
    }
    extracted
}

/// Recovers a JSON object from raw capability output: the whole body, a
/// JSON-encoded string wrapping an object, or an object embedded in prose.
pub fn parse_lenient(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        match value {
            Value::Object(_) => return Some(value),
            // A JSON string whose content is itself an encoded object.
            Value::String(inner) => {
                if let Ok(nested @ Value::Object(_)) = serde_json::from_str::<Value>(inner.trim()) {
                    return Some(nested);
                }
                return None;
            }
            _ => return None,
        }
    }
    embedded_object(trimmed)
}

fn embedded_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
