//! MyPlace guest listing source and the paginating fetcher built on it.

use std::collections::HashSet;

use async_trait::async_trait;
use myplace_core::GuestRecord;
use myplace_http::{HttpClient, HttpError};
use reqwest::RequestBuilder;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "myplace-source";

pub const DEFAULT_BASE_URL: &str = "https://api.myplaceconnect.net/v1/guests/";
pub const DEFAULT_PER_PAGE: u64 = 10;

/// One page of the guest listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuestPage {
    #[serde(default, deserialize_with = "guests_skipping_malformed")]
    pub data: Vec<GuestRecord>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

// A guest that cannot be decoded is logged and dropped; the rest of the page survives.
fn guests_skipping_malformed<'de, D>(deserializer: D) -> Result<Vec<GuestRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<JsonValue>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<GuestRecord>(value) {
            Ok(guest) => Some(guest),
            Err(err) => {
                warn!(index, error = %err, "skipping malformed guest record");
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

impl PageMetadata {
    pub fn new(total_results: u64, per_page: u64) -> Self {
        Self {
            total_results: Some(total_results),
            per_page: Some(per_page),
        }
    }

    /// Server page size, falling back to the default when absent or zero.
    pub fn per_page(&self) -> u64 {
        match self.per_page {
            Some(n) if n > 0 => n,
            _ => DEFAULT_PER_PAGE,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total_results.unwrap_or(0).div_ceil(self.per_page())
    }
}

/// Result of asking for a single page.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Page(GuestPage),
    /// The server answered with a non-success status.
    Rejected { status: u16 },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching guest page {page}: {source}")]
    Transport {
        page: u64,
        #[source]
        source: HttpError,
    },
}

#[async_trait]
pub trait GuestPageSource: Send + Sync {
    async fn fetch_page(&self, page: u64, per_page: u64) -> Result<PageOutcome, FetchError>;
}

/// HTTP implementation against `GET <base_url>?page=&per_page=`.
#[derive(Clone)]
pub struct MyPlaceSource {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl MyPlaceSource {
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// `GET <base_url>?page=&per_page=` carrying the api key and a JSON accept header.
    pub fn page_request(&self, page: u64, per_page: u64) -> RequestBuilder {
        self.http
            .get(&self.base_url)
            .header("accept", "application/json")
            .header("x-api-key", &self.api_key)
            .query(&[("page", page), ("per_page", per_page)])
    }
}

#[async_trait]
impl GuestPageSource for MyPlaceSource {
    async fn fetch_page(&self, page: u64, per_page: u64) -> Result<PageOutcome, FetchError> {
        match self.http.send_json::<GuestPage>(self.page_request(page, per_page)).await {
            Ok(body) => Ok(PageOutcome::Page(body)),
            Err(HttpError::Status { status, .. }) => Ok(PageOutcome::Rejected { status }),
            Err(source) => Err(FetchError::Transport { page, source }),
        }
    }
}

/// Walks every page of a [`GuestPageSource`], keeping the first record seen for each id.
pub struct GuestFetcher<S> {
    source: S,
    initial_per_page: u64,
}

impl<S: GuestPageSource> GuestFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            initial_per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch pages `1..=total_pages` in order.
    ///
    /// `total_pages` and the requested page size are recomputed from every response's
    /// metadata, so the latest server-reported values win. A non-success status ends
    /// pagination and whatever was accumulated so far is returned.
    pub async fn fetch_all(&self) -> Result<Vec<GuestRecord>, FetchError> {
        let mut guests = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;
        let mut per_page = self.initial_per_page;
        let mut total_pages = 1;

        while page <= total_pages {
            let body = match self.source.fetch_page(page, per_page).await? {
                PageOutcome::Page(body) => body,
                PageOutcome::Rejected { status } => {
                    warn!(page, status, "failed to retrieve guests; keeping partial result");
                    break;
                }
            };

            let received = body.data.len();
            for guest in body.data {
                if seen.insert(guest.id.clone()) {
                    guests.push(guest);
                }
            }

            per_page = body.metadata.per_page();
            total_pages = body.metadata.total_pages();
            debug!(page, received, per_page, total_pages, accumulated = guests.len(), "fetched guest page");
            page += 1;
        }

        info!(guests = guests.len(), pages = page - 1, "guest fetch finished");
        Ok(guests)
    }
}
