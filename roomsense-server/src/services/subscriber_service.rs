use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use roomsense_api::{ConnectionState, Reading};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::configs::settings;
use crate::errors::{StoreError, SubscriberError};
use crate::store::{Snapshot, Store};

const CHANNEL_CAPACITY: usize = 100;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

type Message = (String, Vec<u8>);

struct Session {
    client: AsyncClient,
    io: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// Broker subscription feeding the store.
///
/// An I/O task drives the MQTT event loop and forwards every publish into a
/// channel; a single consumer task applies them to the store in delivery order.
pub struct SubscriberService {
    options: MqttOptions,
    topic_filter: String,
    connect_timeout: Duration,
    retry_delay: Duration,
    store: Arc<Store>,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
}

impl SubscriberService {
    pub fn new(broker: &settings::Broker, subscriber: &settings::Subscriber, store: Arc<Store>) -> Self {
        let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(broker.keepalive_secs.max(5)));
        options.set_clean_session(true);

        if let Some(auth) = &broker.auth {
            options.set_credentials(&auth.username, &auth.password);
        }

        let (state, _) = watch::channel(ConnectionState::new());

        Self {
            options,
            topic_filter: broker.topics.all.clone(),
            connect_timeout: subscriber.connect_timeout(),
            retry_delay: subscriber.retry_delay(),
            store,
            state: Arc::new(state),
            session: Mutex::new(None),
        }
    }

    /// Starts a session unless one is already connected, then waits up to the
    /// connect timeout for the broker to acknowledge.
    pub async fn connect(&self) -> Result<ConnectionState, SubscriberError> {
        let mut session = self.session.lock().await;

        let connected = self.state.borrow().is_connected();
        if session.is_some() && connected {
            return Ok(self.connection_state());
        }

        if let Some(stale) = session.take() {
            close(stale).await;
        }

        self.state.send_modify(ConnectionState::begin);

        let (client, event_loop) = AsyncClient::new(self.options.clone(), CHANNEL_CAPACITY);

        // Queued until the first ConnAck
        if let Err(e) = client.subscribe(&self.topic_filter, QoS::AtLeastOnce).await {
            self.state.send_modify(|state| state.fail(e.to_string()));
            return Err(e.into());
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let io = tokio::spawn(drive(
            client.clone(),
            event_loop,
            self.topic_filter.clone(),
            self.state.clone(),
            tx,
            self.retry_delay,
        ));
        let consumer = tokio::spawn(consume(rx, self.store.clone()));

        *session = Some(Session { client, io, consumer });
        drop(session);

        let mut status = self.state.subscribe();
        match timeout(self.connect_timeout, status.wait_for(|state| state.is_connected())).await {
            Ok(Ok(state)) => Ok((*state).clone()),
            _ => {
                tracing::warn!(
                    "Broker {}:{} not connected after {:?}, still retrying",
                    self.options.broker_address().0,
                    self.options.broker_address().1,
                    self.connect_timeout
                );
                Err(SubscriberError::Timeout(self.connect_timeout))
            }
        }
    }

    /// Ends the session if there is one. Messages already received are
    /// applied before this returns.
    pub async fn disconnect(&self) -> ConnectionState {
        let mut session = self.session.lock().await;

        if let Some(session) = session.take() {
            close(session).await;
            tracing::info!("Disconnected from broker");
        }

        self.state.send_modify(ConnectionState::close);

        self.connection_state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn history(&self) -> Vec<Reading> {
        self.store.history()
    }

    /// Reads every batch back on the blocking pool.
    pub async fn records(&self) -> Result<Vec<Reading>, StoreError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.records()).await?
    }

    /// Flushes on the blocking pool; the store lock is held for the write.
    pub async fn force_flush(&self) -> Result<Option<PathBuf>, StoreError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.force_flush()).await?
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

async fn close(mut session: Session) {
    if let Err(e) = session.client.try_disconnect() {
        tracing::debug!("Disconnect request not sent: {}", e);
    }

    if timeout(DISCONNECT_GRACE, &mut session.io).await.is_err() {
        session.io.abort();
    }

    // Ends once the I/O task has dropped its sender
    if let Err(e) = session.consumer.await {
        tracing::error!("Consumer task failed: {}", e);
    }
}

async fn drive(
    client: AsyncClient,
    mut event_loop: EventLoop,
    topic_filter: String,
    state: Arc<watch::Sender<ConnectionState>>,
    tx: mpsc::Sender<Message>,
    retry_delay: Duration,
) {
    let mut sessions = 0u32;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // The first subscription was queued by connect()
                if sessions > 0 {
                    if let Err(e) = client.try_subscribe(&topic_filter, QoS::AtLeastOnce) {
                        tracing::warn!("Resubscribe to {} failed: {}", topic_filter, e);
                    }
                }
                sessions += 1;

                state.send_modify(ConnectionState::succeed);
                tracing::info!("Connected to broker, subscribed to {}", topic_filter);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!("Received {} bytes on {}", publish.payload.len(), publish.topic);

                if tx.send((publish.topic, publish.payload.to_vec())).await.is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("MQTT connection error: {}", e);
                state.send_modify(|state| state.fail(e.to_string()));
                sleep(retry_delay).await;
            }
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<Message>, store: Arc<Store>) {
    while let Some((topic, payload)) = rx.recv().await {
        store.ingest(&topic, &payload);
    }
}
