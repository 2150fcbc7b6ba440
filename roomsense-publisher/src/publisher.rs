use std::collections::VecDeque;
use std::time::Duration;

use roomsense_api::{ConnectionState, LightStatus, Reading, ReadingPayload, RetryPolicy};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::error::PublisherError;
use crate::indicator::Indicator;
use crate::link::Endpoint;
use crate::sensor::Sensor;

/// One topic per measured field, each carrying a bare scalar payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTopics {
    pub temperature: String,
    pub humidity: String,
    pub light: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Topic of the combined JSON reading
    pub topic: String,
    /// Publish each field on its own topic instead of the combined reading
    pub fields: Option<FieldTopics>,
    pub publish_interval: Duration,
    /// Pause after a cycle failed unexpectedly
    pub cooldown: Duration,
    pub retry: RetryPolicy,
    /// End the broker session after every delivered reading
    pub disconnect_after_publish: bool,
}

type Message = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Delivered on the first attempt
    Published,
    /// Delivered after one reconnect
    Republished,
    /// Sensor gave nothing to publish
    SkippedNoReading,
    /// Broker unreachable for this cycle, reading lost
    Dropped,
}

/// Connects with bounded retries, sleeping `retry_delay` between attempts.
pub async fn connect_with_retry<E>(
    endpoint: &mut E,
    state: &mut ConnectionState,
    policy: &RetryPolicy,
) -> Result<(), PublisherError>
where
    E: Endpoint + ?Sized,
{
    for attempt in 1..=policy.max_retries {
        state.begin();

        match endpoint.connect().await {
            Ok(()) => {
                state.succeed();
                info!("{} connected (attempt {}/{})", endpoint.name(), attempt, policy.max_retries);
                return Ok(());
            }
            Err(e) => {
                warn!("{} connect failed (attempt {}/{}): {}", endpoint.name(), attempt, policy.max_retries, e);
                state.fail(e.to_string());

                if attempt < policy.max_retries {
                    sleep(policy.retry_delay).await;
                }
            }
        }
    }

    Err(PublisherError::RetriesExhausted {
        endpoint: endpoint.name(),
        attempts: policy.max_retries,
    })
}

pub struct Publisher<L, B, S, I> {
    link: L,
    broker: B,
    sensor: S,
    indicator: I,
    config: PublisherConfig,
    network: ConnectionState,
    session: ConnectionState,
    published: u64,
    consecutive_failures: u32,
}

impl<L, B, S, I> Publisher<L, B, S, I>
where
    L: Endpoint,
    B: Broker,
    S: Sensor,
    I: Indicator,
{
    pub fn new(link: L, broker: B, sensor: S, indicator: I, config: PublisherConfig) -> Self {
        Self {
            link,
            broker,
            sensor,
            indicator,
            config,
            network: ConnectionState::new(),
            session: ConnectionState::new(),
            published: 0,
            consecutive_failures: 0,
        }
    }

    pub fn network_state(&self) -> &ConnectionState {
        &self.network
    }

    pub fn session_state(&self) -> &ConnectionState {
        &self.session
    }

    /// Messages delivered so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Cycles in a row that ended without delivering their reading.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Brings up the network and then the broker session. Either one running
    /// out of retries is fatal.
    pub async fn start(&mut self) -> Result<(), PublisherError> {
        connect_with_retry(&mut self.link, &mut self.network, &self.config.retry).await?;
        connect_with_retry(&mut self.broker, &mut self.session, &self.config.retry).await?;

        self.indicator.blink(3);

        Ok(())
    }

    /// One read-and-publish step.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, PublisherError> {
        let result = self.attempt().await;

        match &result {
            Ok(CycleOutcome::Published | CycleOutcome::Republished) => {
                self.consecutive_failures = 0;

                if self.config.disconnect_after_publish {
                    if let Err(e) = self.broker.disconnect().await {
                        debug!("disconnect after publish failed: {}", e);
                    }
                    self.session.close();
                }
            }
            Ok(CycleOutcome::SkippedNoReading) => {}
            Ok(CycleOutcome::Dropped) | Err(_) => {
                self.consecutive_failures += 1;
                warn!("reading not delivered ({} consecutive failures)", self.consecutive_failures);
            }
        }

        result
    }

    async fn attempt(&mut self) -> Result<CycleOutcome, PublisherError> {
        let sample = match self.sensor.read() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("sensor read failed, skipping publish: {}", e);
                return Ok(CycleOutcome::SkippedNoReading);
            }
        };

        let reading = sample.into_reading(OffsetDateTime::now_utc());
        if !reading.is_bufferable() {
            warn!("sensor returned no values, skipping publish");
            return Ok(CycleOutcome::SkippedNoReading);
        }

        let mut messages = self.messages(&reading)?;

        if self.session.is_connected() {
            if let Err(e) = self.broker.check().await {
                warn!("broker session lost since last cycle: {}", e);
                self.session.fail(e.to_string());
            }
        }

        if !self.session.is_connected() && !self.reconnect().await {
            warn!("broker still unreachable, dropping reading");
            return Ok(CycleOutcome::Dropped);
        }

        match self.send(&mut messages).await {
            Ok(()) => return Ok(CycleOutcome::Published),
            Err(e) if e.is_transport() => {
                warn!("publish failed, reconnecting: {}", e);
                self.session.fail(e.to_string());
            }
            Err(e) => return Err(e),
        }

        if !self.reconnect().await {
            warn!("reconnect failed, dropping reading");
            return Ok(CycleOutcome::Dropped);
        }

        // Only what was not delivered before the failure goes out again
        match self.send(&mut messages).await {
            Ok(()) => Ok(CycleOutcome::Republished),
            Err(e) if e.is_transport() => {
                warn!("publish failed after reconnect, dropping reading: {}", e);
                self.session.fail(e.to_string());
                Ok(CycleOutcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }

    fn messages(&self, reading: &Reading) -> Result<VecDeque<Message>, PublisherError> {
        let Some(fields) = &self.config.fields else {
            let payload = ReadingPayload::from(reading).to_json()?;
            return Ok(VecDeque::from([(self.config.topic.clone(), payload)]));
        };

        let mut messages = VecDeque::new();
        if let Some(temperature) = reading.temperature {
            messages.push_back((fields.temperature.clone(), temperature.to_string()));
        }
        if let Some(humidity) = reading.humidity {
            messages.push_back((fields.humidity.clone(), humidity.to_string()));
        }
        if reading.light_status != LightStatus::Unknown {
            messages.push_back((fields.light.clone(), reading.light_status.to_string()));
        }

        Ok(messages)
    }

    /// Runs until `shutdown` flips, then disconnects from the broker.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), PublisherError> {
        tokio::select! {
            result = self.start() => result?,
            _ = shutdown.changed() => return Ok(()),
        }

        match self.sensor.read() {
            Ok(sample) => info!("sensor self-test ok: {:?}", sample),
            Err(e) => warn!("sensor self-test failed, continuing: {}", e),
        }

        match &self.config.fields {
            Some(fields) => info!(
                "publishing to {}, {} and {} every {}s",
                fields.temperature,
                fields.humidity,
                fields.light,
                self.config.publish_interval.as_secs()
            ),
            None => info!(
                "publishing to {} every {}s",
                self.config.topic,
                self.config.publish_interval.as_secs()
            ),
        }

        loop {
            let pause = match self.cycle().await {
                Ok(outcome) => {
                    debug!("cycle finished: {:?}", outcome);
                    self.config.publish_interval
                }
                Err(e) => {
                    error!("publish cycle failed: {}", e);
                    self.config.cooldown
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.stop().await;

        Ok(())
    }

    /// Publishes queued messages in order, removing each once delivered.
    async fn send(&mut self, messages: &mut VecDeque<Message>) -> Result<(), PublisherError> {
        while let Some((topic, payload)) = messages.front() {
            self.broker.publish(topic, payload.as_bytes()).await?;

            self.published += 1;
            self.indicator.blink(1);
            info!("published {} to {} (total {})", payload, topic, self.published);

            messages.pop_front();
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> bool {
        if let Err(e) = self.broker.disconnect().await {
            debug!("disconnect before reconnect failed: {}", e);
        }

        self.session.begin();
        match self.broker.connect().await {
            Ok(()) => {
                self.session.succeed();
                info!("broker reconnected");
                true
            }
            Err(e) => {
                warn!("broker reconnect failed: {}", e);
                self.session.fail(e.to_string());
                false
            }
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = self.broker.disconnect().await {
            debug!("disconnect on shutdown failed: {}", e);
        }
        self.session.close();

        info!("publisher stopped after {} messages", self.published);
    }
}
