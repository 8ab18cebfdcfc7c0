use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

macro_rules! define_id_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                validate_identifier_value($kind, raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(|err| {
                    D::Error::custom(format!("invalid {} `{}`: {}", $kind, raw, err))
                })
            }
        }
    };
}

define_id_type!(StageId, "stage id");
define_id_type!(GraphId, "graph id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_id_accepts_identifier_characters_only() {
        assert!(StageId::parse("deeper_research").is_ok());
        assert!(StageId::parse("stage-2").is_ok());
        assert!(StageId::parse("").is_err());
        assert!(StageId::parse("bad stage").is_err());
    }

    #[test]
    fn graph_id_round_trips_through_serde() {
        let id = GraphId::parse("research").expect("graph id");
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, "\"research\"");
        let decoded: GraphId = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }

    #[test]
    fn invalid_graph_id_fails_deserialization() {
        let err = serde_json::from_str::<GraphId>("\"bad graph\"").expect_err("must fail");
        assert!(err.to_string().contains("graph id"));
    }
}
