use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use roomsense_server::app::create_app;
use roomsense_server::configs::settings::{Broker, Subscriber, Topics};
use roomsense_server::decoder::Decoder;
use roomsense_server::services::SubscriberService;
use roomsense_server::sink::CsvSink;
use roomsense_server::store::{Store, StoreConfig};
use tempfile::TempDir;

pub struct MockApp {
    pub router: Router,
    pub subscriber: Arc<SubscriberService>,
    pub data_dir: PathBuf,
    _temp_dir: TempDir,
}

impl MockApp {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::build(free_port(), 1, config)
    }

    /// An app whose subscriber points at a broker on `port`.
    pub fn with_broker(port: u16) -> Self {
        Self::build(port, 5, StoreConfig::default())
    }

    fn build(port: u16, connect_timeout_secs: u64, config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");

        let topics = Topics {
            all: "home/living_room/#".to_string(),
            temperature: "home/living_room/temperature".to_string(),
            humidity: "home/living_room/humidity".to_string(),
            light: "home/living_room/light".to_string(),
        };
        let broker = Broker {
            host: "127.0.0.1".to_string(),
            port,
            client_id: format!("roomsense_api_test_{port}"),
            keepalive_secs: 60,
            topics: topics.clone(),
            auth: None,
        };
        let subscriber = Subscriber {
            connect_timeout_secs,
            retry_delay_secs: 1,
            auto_connect: false,
        };

        let sink = CsvSink::new(&data_dir, "sensor_data").unwrap();
        let store = Arc::new(Store::new(Decoder::new(&topics), Box::new(sink), &config));
        let subscriber = Arc::new(SubscriberService::new(&broker, &subscriber, store));

        Self {
            router: create_app(subscriber.clone()),
            subscriber,
            data_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Feeds a message as if it came from the broker.
    pub fn receive(&self, topic: &str, payload: &str) {
        self.subscriber.store().ingest(topic, payload.as_bytes());
    }
}

/// A local port with nothing listening on it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
