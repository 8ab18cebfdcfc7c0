use super::{CapabilityError, CapabilityProvider, CapabilityRequest};
use crate::config::CapabilitySettings;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct CapabilityEnvelope {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    output: Value,
}

fn default_ok() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct HttpCapabilityProvider {
    agent: ureq::Agent,
    api_base: String,
    model: String,
    api_key: String,
    timeout_seconds: u64,
}

impl HttpCapabilityProvider {
    pub fn from_settings(settings: &CapabilitySettings) -> Result<Self, CapabilityError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| CapabilityError::MissingApiKey(settings.api_key_env.clone()))?;
        Ok(Self::new(
            &settings.api_base,
            &settings.model,
            api_key,
            settings.timeout_seconds,
        ))
    }

    pub fn new(
        api_base: &str,
        model: &str,
        api_key: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(timeout_seconds))
                .build(),
            api_base: api_base.to_string(),
            model: model.to_string(),
            api_key: api_key.into(),
            timeout_seconds,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/invoke", self.api_base.trim_end_matches('/'))
    }
}

impl CapabilityProvider for HttpCapabilityProvider {
    fn invoke(&self, request: &CapabilityRequest) -> Result<String, CapabilityError> {
        let body =
            serde_json::to_value(request).map_err(|e| CapabilityError::Api(e.to_string()))?;
        let response = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|error| classify_transport_error(error, self.timeout_seconds))?;

        let envelope: CapabilityEnvelope = response
            .into_json()
            .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;
        if !envelope.ok {
            return Err(CapabilityError::Api(
                envelope
                    .error
                    .unwrap_or_else(|| "capability reported failure without detail".to_string()),
            ));
        }
        match envelope.output {
            Value::String(text) => Ok(text),
            Value::Null => Err(CapabilityError::InvalidResponse(
                "capability response carried no output".to_string(),
            )),
            other => serde_json::to_string(&other)
                .map_err(|e| CapabilityError::InvalidResponse(e.to_string())),
        }
    }
}

fn classify_transport_error(error: ureq::Error, timeout_seconds: u64) -> CapabilityError {
    match error {
        ureq::Error::Status(code, response) => {
            let detail = response.into_string().unwrap_or_default();
            if code >= 500 {
                CapabilityError::Unavailable(format!("capability service returned {code}: {detail}"))
            } else {
                CapabilityError::Api(format!("capability service returned {code}: {detail}"))
            }
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if message.contains("timed out") || message.contains("timeout") {
                CapabilityError::Timeout { timeout_seconds }
            } else {
                CapabilityError::Unavailable(message)
            }
        }
    }
}
