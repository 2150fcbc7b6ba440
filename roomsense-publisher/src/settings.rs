use std::env;
use std::error::Error;
use std::fs;
use std::time::Duration;

use roomsense_api::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::publisher::{FieldTopics, PublisherConfig};
use crate::sensor::SensorLimits;

pub const CONFIG_ENV: &str = "ROOMSENSE_PUBLISHER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive_secs: u64,
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    pub auth: Option<BrokerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publish {
    pub interval_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub cooldown_secs: u64,
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub disconnect_after_publish: bool,
}

/// Per-field topics. When present, every field goes out as a bare value on
/// its own topic instead of the combined JSON reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topics {
    pub temperature: String,
    pub humidity: String,
    pub light: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub broker: Broker,
    pub publish: Publish,
    pub topics: Option<Topics>,
    pub sensor: Sensor,
}

impl Settings {
    /// Loads the built-in defaults, or the file named by `ROOMSENSE_PUBLISHER_CONFIG`.
    pub fn new() -> Result<Self, Box<dyn Error>> {
        match env::var(CONFIG_ENV) {
            Ok(path) => {
                let content = fs::read_to_string(&path)
                    .map_err(|e| format!("failed to read {path}: {e}"))?;
                Self::from_toml(&content)
            }
            Err(_) => Self::from_toml(include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../",
                "configs/publisher.toml"
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, Box<dyn Error>> {
        let settings: Settings = toml::from_str(content)?;

        if settings.broker.client_id.trim().is_empty() {
            return Err("broker.client_id must not be empty".into());
        }
        if settings.broker.qos > 2 {
            return Err(format!("broker.qos must be 0, 1 or 2, got {}", settings.broker.qos).into());
        }

        Ok(settings)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            topic: self.broker.topic.clone(),
            fields: self.topics.as_ref().map(|topics| FieldTopics {
                temperature: topics.temperature.clone(),
                humidity: topics.humidity.clone(),
                light: topics.light.clone(),
            }),
            publish_interval: Duration::from_secs(self.publish.interval_secs),
            cooldown: Duration::from_secs(self.publish.cooldown_secs),
            retry: RetryPolicy::new(
                self.publish.max_retries,
                Duration::from_secs(self.publish.retry_delay_secs),
            ),
            disconnect_after_publish: self.publish.disconnect_after_publish,
        }
    }

    pub fn sensor_limits(&self) -> SensorLimits {
        SensorLimits {
            temperature: self.sensor.min_temperature..=self.sensor.max_temperature,
            humidity: self.sensor.min_humidity..=self.sensor.max_humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [logger]
        level = "debug"

        [broker]
        host = "192.168.0.210"
        port = 1883
        client_id = "pico_sensor_001"
        keepalive_secs = 30
        topic = "home/living_room/sensor"

        [publish]
        interval_secs = 5
        max_retries = 3
        retry_delay_secs = 2
        cooldown_secs = 5
        connect_timeout_secs = 10

        [sensor]
        min_temperature = -40.0
        max_temperature = 80.0
        min_humidity = 0.0
        max_humidity = 100.0
    "#;

    #[test]
    fn test_embedded_defaults_parse() {
        let settings = Settings::from_toml(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../",
            "configs/publisher.toml"
        )))
        .unwrap();

        assert_eq!(settings.broker.port, 1883);
        assert_eq!(settings.publish.max_retries, 5);
    }

    #[test]
    fn test_publisher_config() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        let config = settings.publisher_config();

        assert_eq!(settings.broker.qos, 0);
        assert!(settings.broker.auth.is_none());
        assert_eq!(config.topic, "home/living_room/sensor");
        assert_eq!(config.publish_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(2));
        assert_eq!(config.fields, None);
        assert!(!config.disconnect_after_publish);
    }

    #[test]
    fn test_field_topics_and_disconnect_strategy() {
        let content = SAMPLE
            .replace("connect_timeout_secs = 10", "connect_timeout_secs = 10\ndisconnect_after_publish = true")
            .replace(
                "[sensor]",
                r#"[topics]
        temperature = "home/living_room/temperature"
        humidity = "home/living_room/humidity"
        light = "home/living_room/light"

        [sensor]"#,
            );

        let config = Settings::from_toml(&content).unwrap().publisher_config();

        assert!(config.disconnect_after_publish);
        assert_eq!(
            config.fields,
            Some(FieldTopics {
                temperature: "home/living_room/temperature".to_string(),
                humidity: "home/living_room/humidity".to_string(),
                light: "home/living_room/light".to_string(),
            })
        );
    }

    #[test]
    fn test_rejects_empty_client_id() {
        let content = SAMPLE.replace("pico_sensor_001", " ");

        assert!(Settings::from_toml(&content).is_err());
    }

    #[test]
    fn test_rejects_invalid_qos() {
        let content = SAMPLE.replace("keepalive_secs = 30", "keepalive_secs = 30\nqos = 3");

        assert!(Settings::from_toml(&content).is_err());
    }
}
