use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::app::create_app;
use crate::configs::Settings;
use crate::decoder::Decoder;
use crate::services::SubscriberService;
use crate::sink::CsvSink;
use crate::store::Store;

pub mod app;
pub mod configs;
pub mod decoder;
pub mod errors;
pub mod handles;
pub mod services;
pub mod sink;
pub mod store;

pub async fn run(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let sink = CsvSink::new(&settings.storage.data_dir, &settings.storage.file_prefix)?;
    let store = Arc::new(Store::new(
        Decoder::new(&settings.broker.topics),
        Box::new(sink),
        &settings.store_config(),
    ));
    let subscriber = Arc::new(SubscriberService::new(&settings.broker, &settings.subscriber, store));

    if settings.subscriber.auto_connect {
        if let Err(e) = subscriber.connect().await {
            tracing::warn!("Initial broker connect failed: {}", e);
        }
    }

    let app = create_app(subscriber.clone());

    let ip_addr = settings.server.host.parse::<IpAddr>()?;

    let address = SocketAddr::from((ip_addr, settings.server.port));

    let listener = TcpListener::bind(&address).await?;

    tracing::info!("listening on {:?}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    subscriber.disconnect().await;

    match subscriber.force_flush().await {
        Ok(Some(path)) => tracing::info!("Final flush written to {}", path.display()),
        Ok(None) => {}
        Err(e) => tracing::error!("Final flush failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutting down");
}
