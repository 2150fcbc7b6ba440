use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightStatus {
    On,
    Off,
    #[default]
    Unknown,
}

impl LightStatus {
    /// Recognizes on/off/boolean tokens, ignoring case and surrounding whitespace.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Some(LightStatus::On),
            "off" | "false" | "no" | "0" => Some(LightStatus::Off),
            "unknown" => Some(LightStatus::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LightStatus::On => "on",
            LightStatus::Off => "off",
            LightStatus::Unknown => "unknown",
        }
    }
}

impl From<bool> for LightStatus {
    fn from(value: bool) -> Self {
        if value { LightStatus::On } else { LightStatus::Off }
    }
}

impl fmt::Display for LightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in Celsius
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<f64>,
    /// Light switch state
    pub light_status: LightStatus,
    /// Time the sample was read or decoded
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Reading {
    pub fn new(
        temperature: Option<f64>,
        humidity: Option<f64>,
        light_status: LightStatus,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            temperature,
            humidity,
            light_status,
            timestamp,
        }
    }

    /// A reading without temperature and humidity is never buffered.
    pub fn is_bufferable(&self) -> bool {
        self.temperature.is_some() || self.humidity.is_some()
    }
}

/// Message body published by a sensor node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_status: LightStatus,
}

impl ReadingPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Reading> for ReadingPayload {
    fn from(reading: &Reading) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            light_status: reading.light_status,
        }
    }
}
