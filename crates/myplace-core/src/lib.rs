//! Guest data model, daily filtering and sink-ready enrichment for the MyPlace sync.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

pub mod timestamp;

pub use timestamp::{parse_signup, TimestampError, TimestampStyle};

pub const CRATE_NAME: &str = "myplace-core";

/// One registered guest as returned by the MyPlace guest listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GuestRecord {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(default)]
    pub sign_up: Option<SignUp>,
    #[serde(default, rename = "last_seen", alias = "lastSeen", deserialize_with = "lenient_text")]
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SignUp {
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
}

impl GuestRecord {
    pub fn signup_raw(&self) -> Option<&str> {
        self.sign_up.as_ref().and_then(|s| s.timestamp.as_deref())
    }
}

// Ids are opaque; numeric ids are kept as their decimal text and a missing id collapses to "".
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

// Free-text fields keep whatever the API sent: non-string scalars and nested values
// become their JSON text rather than failing the whole page.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// A guest whose signup fell on the target day, with the parsed signup time attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyGuest {
    pub guest: GuestRecord,
    pub signed_up_at: NaiveDateTime,
}

/// Sink-ready view of a guest. Every optional field is flattened to a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedGuest {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub signup: String,
    pub last_seen: String,
}

impl DailyGuest {
    pub fn enrich(&self, style: TimestampStyle) -> EnrichedGuest {
        let guest = &self.guest;
        EnrichedGuest {
            id: guest.id.clone(),
            first_name: guest.first_name.clone().unwrap_or_default(),
            last_name: guest.last_name.clone().unwrap_or_default(),
            email: guest.email.clone().unwrap_or_default(),
            signup: style.format_signup(&self.signed_up_at),
            last_seen: style.format_last_seen(guest.last_seen.as_deref().unwrap_or_default()),
        }
    }
}

pub fn enrich_all(daily: &[DailyGuest], style: TimestampStyle) -> Vec<EnrichedGuest> {
    daily.iter().map(|d| d.enrich(style)).collect()
}

/// The calendar day before `today`.
pub fn yesterday_of(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// Yesterday in local time. Call once per run so every record is compared against the same day.
pub fn default_target_day() -> NaiveDate {
    yesterday_of(Local::now().date_naive())
}

/// Keep guests whose signup timestamp lands on `target_day`.
///
/// Guests without a signup timestamp are dropped silently; guests whose timestamp
/// cannot be parsed are dropped with a warning carrying the raw value.
pub fn filter_for_day<I>(records: I, target_day: NaiveDate) -> Vec<DailyGuest>
where
    I: IntoIterator<Item = GuestRecord>,
{
    let mut matched = Vec::new();
    for guest in records {
        let Some(raw) = guest.signup_raw() else {
            debug!(guest_id = %guest.id, "guest has no signup timestamp");
            continue;
        };
        let signed_up_at = match parse_signup(raw) {
            Ok(ts) => ts,
            Err(err) => {
                warn!(guest_id = %guest.id, raw = %err.raw, error = %err, "skipping guest");
                continue;
            }
        };
        if signed_up_at.date() == target_day {
            matched.push(DailyGuest {
                guest,
                signed_up_at,
            });
        }
    }
    matched
}
