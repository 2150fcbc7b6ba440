use std::time::Duration;

use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Broker did not acknowledge within {0:?}")]
    Timeout(Duration),
}

impl SubscriberError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscriberError::Client(_) => StatusCode::BAD_GATEWAY,
            SubscriberError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}
