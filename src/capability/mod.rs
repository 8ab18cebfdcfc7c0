pub mod http;

pub use http::HttpCapabilityProvider;

use crate::pipeline::OutputSchema;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("missing required env var `{0}`")]
    MissingApiKey(String),
    #[error("capability service unavailable: {0}")]
    Unavailable(String),
    #[error("capability call timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },
    #[error("capability service rejected request: {0}")]
    Api(String),
    #[error("capability response was not readable: {0}")]
    InvalidResponse(String),
}

impl CapabilityError {
    /// Transport-level failures are worth a retry; service-level rejections
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequest {
    pub capability: String,
    pub model: String,
    pub instruction: String,
    pub inputs: Map<String, Value>,
    pub output_schema: OutputSchema,
}

pub trait CapabilityProvider: Send + Sync {
    fn invoke(&self, request: &CapabilityRequest) -> Result<String, CapabilityError>;
}
