use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to create network client: {0}")]
    Create(String),
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to disconnect: {0}")]
    Disconnect(String),
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("network client not connected")]
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("invalid JSON at line {line} column {column}")]
    Invalid { line: usize, column: usize },
    #[error("input ended inside a string or container")]
    Partial,
    #[error("more than {0} tokens")]
    TooManyTokens(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("thing name `{0}` cannot be used in a topic")]
    InvalidThingName(String),
    #[error("mqtt host cannot be empty")]
    EmptyMqttHost,
}
