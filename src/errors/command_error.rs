use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandErrorKind {
    InvalidParams,
    NotFound,
    Denied,
    Timeout,
    Network,
    Resolution,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CommandError {
    pub fn new(
        kind: CommandErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Denied, "DENIED", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Network, "NETWORK", message)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Resolution, "RESOLUTION", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CommandErrorKind::Internal, "INTERNAL", message)
    }

    /// Single-line form carried in the bridge reply's `error` field.
    pub fn to_reply_text(&self) -> String {
        match &self.hint {
            Some(hint) => format!("{} ({})", self.message, hint),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CommandError {}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        CommandError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_appends_hint() {
        let err = CommandError::not_found("Credential 'x' not found")
            .with_hint("Use getAllCredentials to list stored credentials.");
        assert_eq!(
            err.to_reply_text(),
            "Credential 'x' not found (Use getAllCredentials to list stored credentials.)"
        );
        assert_eq!(err.code, "NOT_FOUND");
    }
}
