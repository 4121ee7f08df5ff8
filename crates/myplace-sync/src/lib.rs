//! Sync pipeline orchestration: fetch, filter to one day, enrich, deliver.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use myplace_core::{default_target_day, enrich_all, filter_for_day};
use myplace_http::HttpClient;
use myplace_sinks::{CsvSink, GuestSink, SfmcClient, SfmcSink};
use myplace_source::{GuestFetcher, GuestPageSource, MyPlaceSource};
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

pub mod config;

pub use config::{ConfigError, SinkKind, SyncConfig};

pub const CRATE_NAME: &str = "myplace-sync";

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target_day: NaiveDate,
    pub fetched: usize,
    pub matched: usize,
    pub sink: &'static str,
    pub destination: String,
    pub delivered: usize,
}

/// Which destination a run delivers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkChoice {
    Csv { output: PathBuf },
    Sfmc,
}

impl SinkChoice {
    pub fn kind(&self) -> SinkKind {
        match self {
            Self::Csv { .. } => SinkKind::Csv,
            Self::Sfmc => SinkKind::Sfmc,
        }
    }
}

pub struct SyncPipeline<S> {
    fetcher: GuestFetcher<S>,
}

impl<S: GuestPageSource> SyncPipeline<S> {
    pub fn new(source: S) -> Self {
        Self {
            fetcher: GuestFetcher::new(source),
        }
    }

    pub async fn run_once(&self, target_day: NaiveDate, sink: &dyn GuestSink) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("guest_sync", %run_id, %target_day, sink = sink.name());
        self.run_inner(run_id, target_day, sink).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        target_day: NaiveDate,
        sink: &dyn GuestSink,
    ) -> Result<SyncRunSummary> {
        let started_at = Utc::now();

        let guests = self.fetcher.fetch_all().await.context("fetching guests")?;
        for guest in &guests {
            debug!(
                guest_id = %guest.id,
                signup = guest.signup_raw().unwrap_or("No timestamp"),
                "fetched guest"
            );
        }
        let fetched = guests.len();

        let daily = filter_for_day(guests, target_day);
        let enriched = enrich_all(&daily, sink.timestamp_style());
        info!(fetched, matched = enriched.len(), "filtered guests to target day");
        match enriched.first() {
            Some(sample) => debug!(?sample, "sample filtered guest"),
            None => debug!("No data available"),
        }

        let report = sink
            .accept(&enriched)
            .await
            .with_context(|| format!("delivering guests to {} sink", sink.name()))?;

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            target_day,
            fetched,
            matched: enriched.len(),
            sink: report.sink,
            destination: report.destination,
            delivered: report.delivered,
        })
    }
}

/// Run one sync against the live MyPlace API using environment configuration.
///
/// The target day is fixed before anything else happens, and configuration is
/// validated before any client is built.
pub async fn run_once_from_env(choice: SinkChoice, target_day: Option<NaiveDate>) -> Result<SyncRunSummary> {
    let target_day = target_day.unwrap_or_else(default_target_day);
    let config = SyncConfig::from_env(choice.kind())?;

    let http = HttpClient::new(config.http.clone())?;
    let source = MyPlaceSource::new(http.clone(), &config.myplace.base_url, &config.myplace.api_key);
    let sink: Box<dyn GuestSink> = match choice {
        SinkChoice::Csv { output } => Box::new(CsvSink::new(output)),
        SinkChoice::Sfmc => {
            let settings = config
                .sfmc
                .context("marketing cloud settings missing from validated config")?;
            Box::new(SfmcSink::new(SfmcClient::new(http, settings)))
        }
    };

    SyncPipeline::new(source).run_once(target_day, sink.as_ref()).await
}
