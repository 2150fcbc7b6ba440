use super::{StoreError, SubscriberError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Subscriber error: {0}")]
    SubscriberError(#[from] SubscriberError),
}
