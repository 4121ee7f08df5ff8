use std::path::{Path, PathBuf};

use async_trait::async_trait;
use myplace_core::{EnrichedGuest, TimestampStyle};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::{GuestSink, SinkError, SinkReport};

pub const DEFAULT_CSV_PATH: &str = "guests_data.csv";
pub const CSV_HEADER: [&str; 6] = [
    "subscriberkey",
    "first_name",
    "last_name",
    "email",
    "signup",
    "last_seen",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    subscriberkey: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    signup: &'a str,
    last_seen: &'a str,
}

impl<'a> From<&'a EnrichedGuest> for CsvRow<'a> {
    fn from(guest: &'a EnrichedGuest) -> Self {
        Self {
            subscriberkey: &guest.id,
            first_name: &guest.first_name,
            last_name: &guest.last_name,
            email: &guest.email,
            signup: &guest.signup,
            last_seen: &guest.last_seen,
        }
    }
}

/// Writes the batch to a single CSV file, replacing any previous export.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl Default for CsvSink {
    fn default() -> Self {
        Self::new(DEFAULT_CSV_PATH)
    }
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header plus one row per guest. The header is written even for an empty batch.
    pub fn render(guests: &[EnrichedGuest]) -> Result<Vec<u8>, SinkError> {
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        for guest in guests {
            writer.serialize(CsvRow::from(guest))?;
        }
        writer
            .into_inner()
            .map_err(|err| SinkError::Csv(err.into_error().into()))
    }
}

#[async_trait]
impl GuestSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn timestamp_style(&self) -> TimestampStyle {
        TimestampStyle::Locale
    }

    async fn accept(&self, guests: &[EnrichedGuest]) -> Result<SinkReport, SinkError> {
        let bytes = Self::render(guests)?;
        fs::write(&self.path, bytes).await.map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), rows = guests.len(), "CSV file created successfully");
        Ok(SinkReport {
            sink: self.name(),
            destination: self.path.display().to_string(),
            delivered: guests.len(),
        })
    }
}
