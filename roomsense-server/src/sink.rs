use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use roomsense_api::{LightStatus, Reading};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::errors::StoreError;

/// Durable destination of flushed readings.
pub trait RecordSink: Send + Sync {
    /// Writes one batch and returns where it landed.
    fn write_batch(&self, readings: &[Reading]) -> Result<PathBuf, StoreError>;

    /// Reads back every batch written so far, oldest first.
    fn load_records(&self) -> Result<Vec<Reading>, StoreError>;
}

/// One CSV row. Column order is the file header.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    light_status: LightStatus,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

impl From<&Reading> for Row {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            light_status: reading.light_status,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

impl From<Row> for Reading {
    fn from(row: Row) -> Self {
        Reading::new(row.temperature, row.humidity, row.light_status, row.timestamp)
    }
}

/// Writes each batch to its own `{prefix}_{YYYYMMDD_HHMMSS_mmm}.csv` file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    data_dir: PathBuf,
    prefix: String,
}

impl CsvSink {
    pub fn new(data_dir: impl Into<PathBuf>, prefix: &str) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            prefix: prefix.to_string(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_stem(&self, now: OffsetDateTime) -> Result<String, StoreError> {
        let stamp = now.format(format_description!(
            "[year][month][day]_[hour][minute][second]_[subsecond digits:3]"
        ))?;

        Ok(format!("{}_{}", self.prefix, stamp))
    }

    fn is_batch(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };

        name.starts_with(&format!("{}_", self.prefix)) && name.ends_with(".csv")
    }

    fn read_batch(path: &Path) -> Result<Vec<Reading>, StoreError> {
        let mut reader = csv::Reader::from_path(path)?;

        reader
            .deserialize::<Row>()
            .map(|row| row.map(Reading::from).map_err(StoreError::from))
            .collect()
    }
}

impl RecordSink for CsvSink {
    fn write_batch(&self, readings: &[Reading]) -> Result<PathBuf, StoreError> {
        let stem = self.file_stem(OffsetDateTime::now_utc())?;

        // Two flushes within one millisecond get a numbered suffix
        let mut suffix = 0;
        let (path, file) = loop {
            let name = match suffix {
                0 => format!("{stem}.csv"),
                n => format!("{stem}_{n}.csv"),
            };
            let path = self.data_dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && suffix < 100 => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let written = write_rows(file, readings);
        discard_partial(path, written)
    }

    fn load_records(&self) -> Result<Vec<Reading>, StoreError> {
        let mut batches = fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| self.is_batch(path))
            .collect::<Vec<_>>();
        batches.sort();

        let mut records = Vec::new();
        for path in batches {
            match Self::read_batch(&path) {
                Ok(rows) => records.extend(rows),
                Err(e) => tracing::warn!("Skipped unreadable batch {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }
}

fn write_rows<W: Write>(writer: W, readings: &[Reading]) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(writer);
    for reading in readings {
        writer.serialize(Row::from(reading))?;
    }
    writer.flush()?;

    Ok(())
}

/// A batch file whose write failed is removed, so the rows still sitting in
/// the buffer are written exactly once by the next flush.
fn discard_partial(path: PathBuf, written: Result<(), StoreError>) -> Result<PathBuf, StoreError> {
    match written {
        Ok(()) => Ok(path),
        Err(e) => {
            if let Err(remove) = fs::remove_file(&path) {
                tracing::warn!("Partial batch {} left on disk: {}", path.display(), remove);
            }
            Err(e)
        }
    }
}
