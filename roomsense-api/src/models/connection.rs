use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection bookkeeping for one endpoint (network link or broker session).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Current link status
    pub status: ConnectionStatus,
    /// Failures since the last successful connect
    pub retry_count: u32,
    /// Reason of the most recent failure
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn begin(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    pub fn succeed(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        self.last_error = None;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ConnectionStatus::Disconnected;
        self.retry_count += 1;
        self.last_error = Some(reason.into());
    }

    /// Marks the endpoint closed on request; not counted as a failure.
    pub fn close(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts before giving up
    pub max_retries: u32,
    /// Pause between two attempts
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}
