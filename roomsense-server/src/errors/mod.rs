pub mod api;
pub mod store;
pub mod subscriber;

pub use api::ApiError;
pub use store::StoreError;
pub use subscriber::SubscriberError;

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::StoreError(e) => {
                tracing::error!("Store error: {}", e);
                (e.status_code(), e.to_string())
            }
            ApiError::SubscriberError(e) => {
                tracing::warn!("Subscriber error: {}", e);
                (e.status_code(), e.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
