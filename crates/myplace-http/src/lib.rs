//! Shared reqwest plumbing for the MyPlace source and the marketing cloud sink.

use std::time::Duration;

use anyhow::Context;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "myplace-http";

const ERROR_BODY_LIMIT: usize = 512;

/// Client settings. `timeout: None` leaves reqwest's default in place.
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("undecodable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request, fail on any non-2xx status, and decode the body as JSON.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HttpError> {
        let (url, body) = self.send_checked(request).await?;
        serde_json::from_slice(&body).map_err(|source| HttpError::Decode { url, source })
    }

    /// Send a request and fail on any non-2xx status, discarding the body.
    pub async fn send_ok(&self, request: RequestBuilder) -> Result<(), HttpError> {
        self.send_checked(request).await.map(|_| ())
    }

    async fn send_checked(&self, request: RequestBuilder) -> Result<(String, Vec<u8>), HttpError> {
        let resp = request.send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        debug!(%url, status = status.as_u16(), "http response");

        let body = resp.bytes().await?.to_vec();
        if !status.is_success() {
            return Err(status_error(status, url, &body));
        }
        Ok((url, body))
    }
}

fn status_error(status: StatusCode, url: String, body: &[u8]) -> HttpError {
    let text = String::from_utf8_lossy(body);
    let body = match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    };
    HttpError::Status {
        status: status.as_u16(),
        url,
        body,
    }
}
