use thiserror::Error;

/// Failures observed by the renderer side of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Request timeout: {command} did not answer within {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("{0}")]
    Remote(String),

    #[error("Bridge channel closed")]
    ChannelClosed,

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Unexpected reply shape for {command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
