use std::time::Duration;

use tokio::sync::watch;

use crate::broker::MqttBroker;
use crate::error::PublisherError;
use crate::indicator::LogIndicator;
use crate::link::HostLink;
use crate::publisher::Publisher;
use crate::sensor::{Checked, SimulatedSensor};
use crate::settings::Settings;

pub mod broker;
pub mod error;
pub mod indicator;
pub mod link;
pub mod publisher;
pub mod sensor;
pub mod settings;

pub async fn run(settings: &Settings) -> Result<(), PublisherError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!("cannot listen for shutdown signal: {}", e);
                // Dropping the sender would read as a shutdown
                let _keep = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    let connect_timeout = Duration::from_secs(settings.publish.connect_timeout_secs);

    let mut publisher = Publisher::new(
        HostLink::new(&settings.broker.host, settings.broker.port).with_timeout(connect_timeout),
        MqttBroker::new(&settings.broker, connect_timeout),
        Checked::new(SimulatedSensor::new(), settings.sensor_limits()),
        LogIndicator,
        settings.publisher_config(),
    );

    publisher.run(shutdown_rx).await
}
