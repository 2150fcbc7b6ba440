use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use roomsense_api::{LightStatus, Reading};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::decoder::{Decoder, ReadingUpdate};
use crate::errors::StoreError;
use crate::sink::RecordSink;

/// Latest known value of every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_status: LightStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
}

impl Snapshot {
    pub fn merge(&mut self, update: &ReadingUpdate, at: OffsetDateTime) {
        if let Some(temperature) = update.temperature {
            self.temperature = Some(temperature);
        }
        if let Some(humidity) = update.humidity {
            self.humidity = Some(humidity);
        }
        if let Some(light_status) = update.light_status {
            self.light_status = light_status;
        }
        self.last_update = Some(at);
    }

    /// The reading this snapshot stands for, if it holds any measurement.
    pub fn to_reading(&self) -> Option<Reading> {
        let reading = Reading::new(
            self.temperature,
            self.humidity,
            self.light_status,
            self.last_update?,
        );

        reading.is_bufferable().then_some(reading)
    }
}

/// The most recent readings, oldest evicted first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            readings: VecDeque::new(),
        }
    }

    pub fn push(&mut self, reading: Reading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }
}

/// Readings waiting for the next flush.
#[derive(Debug, Clone)]
pub struct Buffer {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            readings: VecDeque::new(),
        }
    }

    /// Appends a reading, dropping the oldest one when full.
    pub fn push(&mut self, reading: Reading) {
        if self.readings.len() == self.capacity {
            if let Some(dropped) = self.readings.pop_front() {
                tracing::warn!(
                    "Buffer full ({}), dropped unflushed reading from {}",
                    self.capacity,
                    dropped.timestamp
                );
            }
        }
        self.readings.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn as_slice(&mut self) -> &[Reading] {
        self.readings.make_contiguous()
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub flush_every: usize,
    pub buffer_capacity: usize,
    pub history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_every: 10,
            buffer_capacity: 10_000,
            history_capacity: 1000,
        }
    }
}

/// What a single message did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Nothing decodable in the message
    Ignored,
    /// Snapshot changed but holds no measurement yet
    Merged,
    /// Appended to history and buffer
    Accepted,
}

struct Inner {
    snapshot: Snapshot,
    history: HistoryWindow,
    buffer: Buffer,
    accepted: usize,
}

/// Snapshot, history and flush buffer behind one lock.
pub struct Store {
    decoder: Decoder,
    sink: Box<dyn RecordSink>,
    flush_every: usize,
    inner: Mutex<Inner>,
}

impl Store {
    pub fn new(decoder: Decoder, sink: Box<dyn RecordSink>, config: &StoreConfig) -> Self {
        Self {
            decoder,
            sink,
            flush_every: config.flush_every,
            inner: Mutex::new(Inner {
                snapshot: Snapshot::default(),
                history: HistoryWindow::new(config.history_capacity),
                buffer: Buffer::new(config.buffer_capacity),
                accepted: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes one message and applies it. Merge, history append and buffer
    /// append happen under a single lock, and so does a due flush.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Ingest {
        let Some(update) = self.decoder.decode(topic, payload) else {
            return Ingest::Ignored;
        };

        let mut inner = self.lock();
        inner.snapshot.merge(&update, OffsetDateTime::now_utc());

        let Some(reading) = inner.snapshot.to_reading() else {
            tracing::debug!("Snapshot updated from {} without a measurement", topic);
            return Ingest::Merged;
        };

        inner.history.push(reading.clone());
        inner.buffer.push(reading);
        inner.accepted += 1;

        if inner.accepted >= self.flush_every {
            if let Err(e) = self.flush_locked(&mut inner) {
                tracing::error!("Flush failed, keeping {} buffered readings: {}", inner.buffer.len(), e);
            }
        }

        Ingest::Accepted
    }

    /// Flushes the buffer now. `Ok(None)` when there was nothing to write.
    pub fn force_flush(&self) -> Result<Option<PathBuf>, StoreError> {
        let mut inner = self.lock();

        self.flush_locked(&mut inner).inspect_err(|e| {
            tracing::error!("Manual flush failed: {}", e);
        })
    }

    fn flush_locked(&self, inner: &mut Inner) -> Result<Option<PathBuf>, StoreError> {
        inner.accepted = 0;

        if inner.buffer.is_empty() {
            return Ok(None);
        }

        let count = inner.buffer.len();
        let path = self.sink.write_batch(inner.buffer.as_slice())?;
        inner.buffer.clear();

        tracing::info!("Flushed {} readings to {}", count, path.display());

        Ok(Some(path))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn history(&self) -> Vec<Reading> {
        self.lock().history.to_vec()
    }

    pub fn buffered(&self) -> Vec<Reading> {
        self.lock().buffer.to_vec()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Every reading flushed so far, read back from the sink.
    pub fn records(&self) -> Result<Vec<Reading>, StoreError> {
        self.sink.load_records()
    }
}
