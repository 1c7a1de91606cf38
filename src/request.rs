use serde_json::Value;

use crate::error::AgentError;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Validated `/generate` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub goal: Option<String>,
    pub notes: String,
    pub model: Option<String>,
}

impl GenerateRequest {
    /// Parse a raw request body. Anything that is not a JSON object with a
    /// non-empty string `notes` is rejected. `goal` and `model` count only
    /// when they are non-empty strings; other values are ignored.
    pub fn from_body(body: &[u8]) -> Result<Self, AgentError> {
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("unparseable /generate body: {e}");
                return Err(AgentError::InvalidRequest);
            }
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, AgentError> {
        let obj = value.as_object().ok_or(AgentError::InvalidRequest)?;

        let notes = obj
            .get("notes")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or(AgentError::InvalidRequest)?
            .to_string();

        Ok(Self {
            goal: non_empty_str(obj.get("goal")),
            notes,
            model: non_empty_str(obj.get("model")),
        })
    }

    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
