use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::timeout;

use crate::error::PublisherError;
use crate::link::Endpoint;
use crate::settings;

/// Upper bound on events handled by one `check`.
const MAX_PENDING_EVENTS: usize = 64;

#[async_trait]
pub trait Broker: Endpoint {
    /// Handles whatever the session has pending without waiting for more.
    /// An error means the session is gone.
    async fn check(&mut self) -> Result<(), PublisherError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublisherError>;

    async fn disconnect(&mut self) -> Result<(), PublisherError>;
}

/// Broker session on top of rumqttc.
///
/// The event loop is only driven from the publisher's own task: while
/// connecting, publishing and disconnecting, and by `check` between cycles,
/// which also lets due keepalive pings go out.
pub struct MqttBroker {
    options: MqttOptions,
    qos: QoS,
    timeout: Duration,
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttBroker {
    pub fn new(broker: &settings::Broker, timeout: Duration) -> Self {
        let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(broker.keepalive_secs.max(5)));
        options.set_clean_session(true);

        if let Some(auth) = &broker.auth {
            options.set_credentials(&auth.username, &auth.password);
        }

        let qos = match broker.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        };

        Self {
            options,
            qos,
            timeout,
            session: None,
        }
    }
}

fn is_delivered(qos: QoS, event: &Event) -> bool {
    matches!(
        (qos, event),
        (QoS::AtMostOnce, Event::Outgoing(Outgoing::Publish(_)))
            | (QoS::AtLeastOnce, Event::Incoming(Packet::PubAck(_)))
            | (QoS::ExactlyOnce, Event::Incoming(Packet::PubComp(_)))
    )
}

async fn await_connack(event_loop: &mut EventLoop) -> Result<(), PublisherError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(PublisherError::Transport(format!("broker refused connection: {code:?}"))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(PublisherError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl Endpoint for MqttBroker {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn connect(&mut self) -> Result<(), PublisherError> {
        self.session = None;

        let (client, mut event_loop) = AsyncClient::new(self.options.clone(), 10);

        timeout(self.timeout, await_connack(&mut event_loop))
            .await
            .map_err(|_| PublisherError::Timeout(self.timeout))??;

        tracing::info!("connected to broker {}:{}", self.options.broker_address().0, self.options.broker_address().1);

        self.session = Some((client, event_loop));

        Ok(())
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn check(&mut self) -> Result<(), PublisherError> {
        let Some((_, event_loop)) = self.session.as_mut() else {
            return Err(PublisherError::NotConnected);
        };

        for _ in 0..MAX_PENDING_EVENTS {
            let polled = timeout(Duration::ZERO, event_loop.poll()).await;

            match polled {
                Ok(Ok(event)) => tracing::trace!("pending event {:?}", event),
                Ok(Err(e)) => {
                    self.session = None;
                    return Err(PublisherError::Transport(e.to_string()));
                }
                // Nothing ready
                Err(_) => break,
            }
        }

        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublisherError> {
        let Some((client, mut event_loop)) = self.session.take() else {
            return Err(PublisherError::NotConnected);
        };

        client
            .publish(topic, self.qos, false, payload.to_vec())
            .await
            .map_err(|e| PublisherError::Transport(e.to_string()))?;

        let qos = self.qos;
        let delivery = timeout(self.timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(event) if is_delivered(qos, &event) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(PublisherError::Transport(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| PublisherError::Timeout(self.timeout))?;

        // A failed session is dropped; the next connect starts from scratch
        if delivery.is_ok() {
            self.session = Some((client, event_loop));
        }

        delivery
    }

    async fn disconnect(&mut self) -> Result<(), PublisherError> {
        let Some((client, mut event_loop)) = self.session.take() else {
            return Ok(());
        };

        client
            .disconnect()
            .await
            .map_err(|e| PublisherError::Transport(e.to_string()))?;

        timeout(self.timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(PublisherError::Transport(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| PublisherError::Timeout(self.timeout))?
    }
}
