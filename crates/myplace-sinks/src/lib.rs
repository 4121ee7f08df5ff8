//! Destinations for the filtered daily guest batch.

use std::path::PathBuf;

use async_trait::async_trait;
use myplace_core::{EnrichedGuest, TimestampStyle};
use myplace_http::HttpError;
use serde::Serialize;
use thiserror::Error;

pub mod csv_file;
pub mod marketing_cloud;

pub use csv_file::{CsvSink, CSV_HEADER, DEFAULT_CSV_PATH};
pub use marketing_cloud::{
    MarketingCloudApi, RowsetEntry, RowsetKeys, RowsetValues, SfmcClient, SfmcSettings, SfmcSink,
};

pub const CRATE_NAME: &str = "myplace-sinks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub sink: &'static str,
    pub destination: String,
    pub delivered: usize,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding csv rows: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("marketing cloud token exchange failed: {0}")]
    Auth(#[source] HttpError),
    #[error("marketing cloud token response carried no access_token")]
    MissingToken,
    #[error("marketing cloud upsert failed: {0}")]
    Upsert(#[source] HttpError),
}

/// A destination that accepts the whole filtered batch in one call.
#[async_trait]
pub trait GuestSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Timestamp rendering this destination expects.
    fn timestamp_style(&self) -> TimestampStyle;

    async fn accept(&self, guests: &[EnrichedGuest]) -> Result<SinkReport, SinkError>;
}
