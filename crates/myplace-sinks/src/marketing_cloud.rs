//! Keyed rowset upsert into a Salesforce Marketing Cloud data extension.

use async_trait::async_trait;
use myplace_core::{EnrichedGuest, TimestampStyle};
use myplace_http::HttpClient;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{GuestSink, SinkError, SinkReport};

/// Credentials and routing for one data extension.
#[derive(Clone)]
pub struct SfmcSettings {
    pub client_id: String,
    pub client_secret: String,
    pub subdomain: String,
    pub data_extension_key: String,
}

impl std::fmt::Debug for SfmcSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SfmcSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subdomain", &self.subdomain)
            .field("data_extension_key", &self.data_extension_key)
            .finish()
    }
}

impl SfmcSettings {
    pub fn auth_url(&self) -> String {
        format!("https://{}.auth.marketingcloudapis.com/v2/token", self.subdomain)
    }

    pub fn upsert_url(&self) -> String {
        format!(
            "https://{}.rest.marketingcloudapis.com/hub/v1/dataevents/key:{}/rowset",
            self.subdomain, self.data_extension_key
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowsetEntry {
    pub keys: RowsetKeys,
    pub values: RowsetValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RowsetKeys {
    pub subscriber_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RowsetValues {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub signup: String,
    pub last_seen: String,
}

impl From<&EnrichedGuest> for RowsetEntry {
    fn from(guest: &EnrichedGuest) -> Self {
        Self {
            keys: RowsetKeys {
                subscriber_key: guest.id.clone(),
            },
            values: RowsetValues {
                first_name: guest.first_name.clone(),
                last_name: guest.last_name.clone(),
                email: guest.email.clone(),
                signup: guest.signup.clone(),
                last_seen: guest.last_seen.clone(),
            },
        }
    }
}

/// The two marketing cloud calls the sink needs.
#[async_trait]
pub trait MarketingCloudApi: Send + Sync {
    fn destination(&self) -> String;

    async fn fetch_token(&self) -> Result<String, SinkError>;

    async fn upsert_rows(&self, token: &str, rows: &[RowsetEntry]) -> Result<(), SinkError>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SfmcClient {
    http: HttpClient,
    settings: SfmcSettings,
}

impl SfmcClient {
    pub fn new(http: HttpClient, settings: SfmcSettings) -> Self {
        Self { http, settings }
    }

    /// Client-credentials exchange: `POST /v2/token` with a JSON body.
    pub fn token_request(&self) -> RequestBuilder {
        let body = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
        };
        self.http.post(&self.settings.auth_url()).json(&body)
    }

    pub fn upsert_request(&self, token: &str, rows: &[RowsetEntry]) -> RequestBuilder {
        self.http
            .post(&self.settings.upsert_url())
            .bearer_auth(token)
            .json(rows)
    }
}

#[async_trait]
impl MarketingCloudApi for SfmcClient {
    fn destination(&self) -> String {
        self.settings.upsert_url()
    }

    async fn fetch_token(&self) -> Result<String, SinkError> {
        let response: TokenResponse = self
            .http
            .send_json(self.token_request())
            .await
            .map_err(SinkError::Auth)?;
        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(SinkError::MissingToken)
    }

    async fn upsert_rows(&self, token: &str, rows: &[RowsetEntry]) -> Result<(), SinkError> {
        self.http
            .send_ok(self.upsert_request(token, rows))
            .await
            .map_err(SinkError::Upsert)
    }
}

/// Sends the whole batch as one upsert. An empty batch makes no calls at all.
pub struct SfmcSink<A> {
    api: A,
}

impl<A: MarketingCloudApi> SfmcSink<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

#[async_trait]
impl<A: MarketingCloudApi> GuestSink for SfmcSink<A> {
    fn name(&self) -> &'static str {
        "sfmc"
    }

    fn timestamp_style(&self) -> TimestampStyle {
        TimestampStyle::Sortable
    }

    async fn accept(&self, guests: &[EnrichedGuest]) -> Result<SinkReport, SinkError> {
        let destination = self.api.destination();
        if guests.is_empty() {
            info!("nothing to send to marketing cloud");
            return Ok(SinkReport {
                sink: self.name(),
                destination,
                delivered: 0,
            });
        }

        let rows: Vec<RowsetEntry> = guests.iter().map(RowsetEntry::from).collect();
        debug!(
            payload = %serde_json::to_string_pretty(&rows).unwrap_or_default(),
            "marketing cloud payload"
        );

        let token = self.api.fetch_token().await?;
        self.api.upsert_rows(&token, &rows).await?;
        info!(rows = rows.len(), %destination, "data successfully pushed to marketing cloud");

        Ok(SinkReport {
            sink: self.name(),
            destination,
            delivered: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myplace_http::{HttpClientConfig, HttpError};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        token: Option<String>,
        fail_auth: bool,
        calls: Mutex<Vec<String>>,
        upserts: Mutex<Vec<(String, Vec<RowsetEntry>)>>,
    }

    impl RecordingApi {
        fn with_token(token: &str) -> Self {
            Self {
                token: Some(token.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MarketingCloudApi for RecordingApi {
        fn destination(&self) -> String {
            "sfmc://test".into()
        }

        async fn fetch_token(&self) -> Result<String, SinkError> {
            self.calls.lock().unwrap().push("token".into());
            if self.fail_auth {
                return Err(SinkError::Auth(HttpError::Status {
                    status: 401,
                    url: "https://x.auth.marketingcloudapis.com/v2/token".into(),
                    body: "unauthorized".into(),
                }));
            }
            self.token.clone().ok_or(SinkError::MissingToken)
        }

        async fn upsert_rows(&self, token: &str, rows: &[RowsetEntry]) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("upsert".into());
            self.upserts
                .lock()
                .unwrap()
                .push((token.to_string(), rows.to_vec()));
            Ok(())
        }
    }

    fn guest(id: &str) -> EnrichedGuest {
        EnrichedGuest {
            id: id.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            signup: "2023-03-14 09:00:00".into(),
            last_seen: "not-a-date".into(),
        }
    }

    fn settings() -> SfmcSettings {
        SfmcSettings {
            client_id: "cid".into(),
            client_secret: "shh".into(),
            subdomain: "mc123".into(),
            data_extension_key: "GUESTS_DE".into(),
        }
    }

    #[test]
    fn endpoints_follow_subdomain_and_key() {
        let s = settings();
        assert_eq!(s.auth_url(), "https://mc123.auth.marketingcloudapis.com/v2/token");
        assert_eq!(
            s.upsert_url(),
            "https://mc123.rest.marketingcloudapis.com/hub/v1/dataevents/key:GUESTS_DE/rowset"
        );
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("shh"));
        assert!(rendered.contains("cid"));
    }

    #[test]
    fn token_request_body_shape() {
        let body = TokenRequest {
            grant_type: "client_credentials",
            client_id: "cid",
            client_secret: "shh",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"grant_type": "client_credentials", "client_id": "cid", "client_secret": "shh"})
        );
    }

    fn client() -> SfmcClient {
        SfmcClient::new(HttpClient::new(HttpClientConfig::default()).unwrap(), settings())
    }

    fn json_body(request: &reqwest::Request) -> serde_json::Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).expect("buffered body");
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn token_request_posts_credentials_as_json() {
        let request = client().token_request().build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://mc123.auth.marketingcloudapis.com/v2/token"
        );
        assert_eq!(request.headers()["content-type"], "application/json");
        assert!(request.headers().get("authorization").is_none());
        assert_eq!(
            json_body(&request),
            json!({"grant_type": "client_credentials", "client_id": "cid", "client_secret": "shh"})
        );
    }

    #[test]
    fn upsert_request_sends_rowset_with_bearer_token() {
        let rows = vec![RowsetEntry::from(&guest("g1"))];
        let request = client().upsert_request("tok", &rows).build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://mc123.rest.marketingcloudapis.com/hub/v1/dataevents/key:GUESTS_DE/rowset"
        );
        assert_eq!(request.headers()["authorization"], "Bearer tok");
        assert_eq!(request.headers()["content-type"], "application/json");
        let body = json_body(&request);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["keys"]["SubscriberKey"], "g1");
        assert_eq!(body[0]["values"]["Signup"], "2023-03-14 09:00:00");
    }

    #[test]
    fn rowset_entry_serializes_keys_and_values() {
        let entry = RowsetEntry::from(&guest("g1"));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "keys": {"SubscriberKey": "g1"},
                "values": {
                    "FirstName": "Ada",
                    "LastName": "Lovelace",
                    "Email": "ada@example.com",
                    "Signup": "2023-03-14 09:00:00",
                    "LastSeen": "not-a-date"
                }
            })
        );
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let sink = SfmcSink::new(RecordingApi::with_token("t"));
        let report = sink.accept(&[]).await.unwrap();
        assert_eq!(report.delivered, 0);
        assert!(sink.api().calls().is_empty());
    }

    #[tokio::test]
    async fn sends_whole_batch_with_exchanged_token() {
        let sink = SfmcSink::new(RecordingApi::with_token("bearer-123"));
        let report = sink.accept(&[guest("g1"), guest("g2")]).await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.sink, "sfmc");
        assert_eq!(sink.api().calls(), vec!["token", "upsert"]);
        let upserts = sink.api().upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].0, "bearer-123");
        assert_eq!(upserts[0].1.len(), 2);
        assert_eq!(upserts[0].1[1].keys.subscriber_key, "g2");
    }

    #[tokio::test]
    async fn auth_failure_skips_upsert() {
        let api = RecordingApi {
            fail_auth: true,
            ..RecordingApi::default()
        };
        let sink = SfmcSink::new(api);

        let err = sink.accept(&[guest("g1")]).await.unwrap_err();

        assert!(matches!(err, SinkError::Auth(_)));
        assert_eq!(sink.api().calls(), vec!["token"]);
    }

    #[tokio::test]
    async fn missing_token_is_fatal() {
        let sink = SfmcSink::new(RecordingApi::default());
        let err = sink.accept(&[guest("g1")]).await.unwrap_err();
        assert!(matches!(err, SinkError::MissingToken));
        assert_eq!(sink.api().calls(), vec!["token"]);
    }
}
