use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use roomsense_api::Reading;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::services::SubscriberService;
use crate::store::Snapshot;

#[derive(Clone)]
pub struct ReadingState {
    pub subscriber: Arc<SubscriberService>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlushBody {
    pub path: Option<String>,
}

pub async fn get_snapshot(State(state): State<ReadingState>) -> Json<Snapshot> {
    Json(state.subscriber.snapshot())
}

pub async fn get_history(State(state): State<ReadingState>) -> Json<Vec<Reading>> {
    Json(state.subscriber.history())
}

pub async fn get_records(State(state): State<ReadingState>) -> Result<Json<Vec<Reading>>, ApiError> {
    Ok(Json(state.subscriber.records().await?))
}

pub async fn force_flush(State(state): State<ReadingState>) -> Result<Json<FlushBody>, ApiError> {
    let path = state.subscriber.force_flush().await?;

    Ok(Json(FlushBody {
        path: path.map(|path| path.to_string_lossy().to_string()),
    }))
}
