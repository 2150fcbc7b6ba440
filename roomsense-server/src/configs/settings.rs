use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::store::StoreConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAuth {
    pub username: String,
    pub password: String,
}

/// Topic filter to subscribe to, plus the exact topic of each scalar field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topics {
    pub all: String,
    pub temperature: String,
    pub humidity: String,
    pub light: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive_secs: u64,
    pub topics: Topics,
    pub auth: Option<BrokerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub connect_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub data_dir: String,
    pub file_prefix: String,
    /// Accepted readings between two flushes, 0 flushes every reading
    pub flush_every: usize,
    pub buffer_capacity: usize,
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub logger: Logger,
    pub broker: Broker,
    pub subscriber: Subscriber,
    pub storage: Storage,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        let settings: Settings = Config::builder()
            .add_source(File::with_name("configs/server"))
            .add_source(File::with_name(&format!("configs/server.{run_mode}")).required(false))
            .add_source(Environment::with_prefix("ROOMSENSE").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.broker.client_id.trim().is_empty() {
            return Err(ConfigError::Message("broker.client_id must not be empty".into()));
        }
        if self.storage.buffer_capacity == 0 || self.storage.history_capacity == 0 {
            return Err(ConfigError::Message("storage capacities must be positive".into()));
        }

        Ok(self)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            flush_every: self.storage.flush_every,
            buffer_capacity: self.storage.buffer_capacity,
            history_capacity: self.storage.history_capacity,
        }
    }
}

impl Subscriber {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
