use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Network link error: {0}")]
    Link(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected to broker")]
    NotConnected,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{endpoint} unreachable after {attempts} attempts")]
    RetriesExhausted { endpoint: &'static str, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    #[error("{quantity} reading {value} outside {min}..={max}")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl PublisherError {
    /// Failures that a broker reconnect can fix.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PublisherError::Transport(_) | PublisherError::Timeout(_) | PublisherError::NotConnected
        )
    }
}
