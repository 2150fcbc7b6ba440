use std::ops::RangeInclusive;

use rand::Rng;
use roomsense_api::{LightStatus, Reading};
use time::OffsetDateTime;

use crate::error::SensorError;

/// Raw values returned by one sensor measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Temperature in Celsius
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<f64>,
    /// Light state, `Unknown` when the node has no light sensor
    pub light_status: LightStatus,
}

impl SensorSample {
    pub fn new(temperature: Option<f64>, humidity: Option<f64>) -> Self {
        Self {
            temperature,
            humidity,
            light_status: LightStatus::Unknown,
        }
    }

    pub fn with_light(mut self, light_status: LightStatus) -> Self {
        self.light_status = light_status;
        self
    }

    pub fn into_reading(self, timestamp: OffsetDateTime) -> Reading {
        Reading::new(self.temperature, self.humidity, self.light_status, timestamp)
    }
}

pub trait Sensor: Send {
    fn read(&mut self) -> Result<SensorSample, SensorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorLimits {
    pub temperature: RangeInclusive<f64>,
    pub humidity: RangeInclusive<f64>,
}

impl Default for SensorLimits {
    fn default() -> Self {
        Self {
            temperature: -40.0..=80.0,
            humidity: 0.0..=100.0,
        }
    }
}

impl SensorLimits {
    pub fn check(&self, sample: SensorSample) -> Result<SensorSample, SensorError> {
        check_range("temperature", sample.temperature, &self.temperature)?;
        check_range("humidity", sample.humidity, &self.humidity)?;

        Ok(sample)
    }
}

fn check_range(quantity: &'static str, value: Option<f64>, range: &RangeInclusive<f64>) -> Result<(), SensorError> {
    match value {
        Some(value) if !range.contains(&value) => Err(SensorError::OutOfRange {
            quantity,
            value,
            min: *range.start(),
            max: *range.end(),
        }),
        _ => Ok(()),
    }
}

/// Rejects measurements outside the plausible range of the wrapped sensor.
pub struct Checked<S> {
    inner: S,
    limits: SensorLimits,
}

impl<S: Sensor> Checked<S> {
    pub fn new(inner: S, limits: SensorLimits) -> Self {
        Self { inner, limits }
    }
}

impl<S: Sensor> Sensor for Checked<S> {
    fn read(&mut self) -> Result<SensorSample, SensorError> {
        self.limits.check(self.inner.read()?)
    }
}

/// Day-cycle temperature and humidity with a little noise, for nodes without
/// hardware. The light is switched on and off on alternate reads.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    light_on: bool,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sensor for SimulatedSensor {
    fn read(&mut self) -> Result<SensorSample, SensorError> {
        let now = OffsetDateTime::now_utc();
        let seconds_since_midnight = now.hour() as u32 * 3600 + now.minute() as u32 * 60 + now.second() as u32;
        let day_fraction = seconds_since_midnight as f64 / 86400.0;

        let mut rng = rand::rng();
        let temperature = simulated_temperature(day_fraction) + rng.random_range(-0.5..0.5);
        let humidity = (simulated_humidity(day_fraction) + rng.random_range(-2.0..2.0)).clamp(0.0, 100.0);

        self.light_on = !self.light_on;

        Ok(SensorSample::new(Some(round_tenth(temperature)), Some(round_tenth(humidity)))
            .with_light(LightStatus::from(self.light_on)))
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn simulated_temperature(day_fraction: f64) -> f64 {
    // Coolest at midnight, warmest at noon
    let radians = (day_fraction - 0.25) * 2.0 * std::f64::consts::PI;

    22.0 + radians.sin() * 4.0
}

pub fn simulated_humidity(day_fraction: f64) -> f64 {
    let radians = day_fraction * 2.0 * std::f64::consts::PI;

    if (0.3..=0.7).contains(&day_fraction) {
        ((radians.sin().max(0.0) * 25.0) + 45.0).round()
    } else {
        ((radians.cos().max(0.0) * 30.0) + 40.0).round()
    }
}
