use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handles::*;
use crate::services::SubscriberService;

pub fn create_app(subscriber: Arc<SubscriberService>) -> Router {
    let readings = Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/history", get(get_history))
        .route("/records", get(get_records))
        .route("/flush", post(force_flush))
        .with_state(ReadingState {
            subscriber: subscriber.clone(),
        });

    let broker = Router::new()
        .route("/connection", get(get_connection))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .with_state(BrokerState {
            subscriber: subscriber.clone(),
        });

    Router::new()
        .nest("/api", readings.merge(broker))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
