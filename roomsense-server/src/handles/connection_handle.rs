use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use roomsense_api::ConnectionState;

use crate::errors::ApiError;
use crate::services::SubscriberService;

#[derive(Clone)]
pub struct BrokerState {
    pub subscriber: Arc<SubscriberService>,
}

pub async fn get_connection(State(state): State<BrokerState>) -> Json<ConnectionState> {
    Json(state.subscriber.connection_state())
}

pub async fn connect(State(state): State<BrokerState>) -> Result<Json<ConnectionState>, ApiError> {
    Ok(Json(state.subscriber.connect().await?))
}

pub async fn disconnect(State(state): State<BrokerState>) -> Json<ConnectionState> {
    Json(state.subscriber.disconnect().await)
}
