use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESPONSE: &str = "response";
pub const ERROR: &str = "error";

/// Renderer-to-host message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Host-to-renderer message. `error` is always present on the wire, `null` on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    pub fn response(request_id: String, outcome: Result<Value, String>) -> Self {
        let (data, error) = split(outcome);
        Self {
            command: RESPONSE.to_string(),
            request_id: Some(request_id),
            data: Some(data),
            error,
        }
    }

    /// Reply to a message that carried no `requestId`.
    pub fn legacy(command: &str, outcome: Result<Value, String>) -> Self {
        let (data, error) = split(outcome);
        Self {
            command: format!("{}Response", command),
            request_id: None,
            data: Some(data),
            error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            command: ERROR.to_string(),
            request_id: None,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_response(&self) -> bool {
        self.command == RESPONSE
    }
}

fn split(outcome: Result<Value, String>) -> (Value, Option<String>) {
    match outcome {
        Ok(data) => (data, None),
        Err(message) => (Value::Null, Some(message)),
    }
}
