//! Parsing and rendering of the two ad-hoc date formats MyPlace emits.
//!
//! Signup timestamps look like `Mon Jan 02 2023 14:05:09 GMT-0500 (EST)`; everything from
//! ` GMT` onward is discarded without interpretation. The weekday token must be a weekday
//! name but is not checked against the date. Last-seen values look like
//! `02/01/2023, 14:05` (day first).

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SIGNUP_WEEKDAY: &str = "%a";
const SIGNUP_PATTERN: &str = "%b %d %Y %H:%M:%S";
const LAST_SEEN_PATTERN: &str = "%d/%m/%Y, %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable signup timestamp {raw:?}: {source}")]
pub struct TimestampError {
    pub raw: String,
    #[source]
    pub source: chrono::ParseError,
}

pub fn parse_signup(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    let local_part = raw.split(" GMT").next().unwrap_or(raw);
    let (weekday, rest) = local_part.split_once(' ').unwrap_or((local_part, ""));
    parse(&mut Parsed::new(), weekday, StrftimeItems::new(SIGNUP_WEEKDAY))
        .and_then(|()| NaiveDateTime::parse_from_str(rest, SIGNUP_PATTERN))
        .map_err(|source| TimestampError {
            raw: raw.to_string(),
            source,
        })
}

/// Output shape expected by a destination. The two are not interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampStyle {
    /// `3/14/2023 9:00:00 AM` signups and `03/14/2023 18:30` last-seen values (CSV export).
    Locale,
    /// `2023-03-14 09:00:00` for both fields (marketing cloud upsert).
    Sortable,
}

impl TimestampStyle {
    pub fn format_signup(self, ts: &NaiveDateTime) -> String {
        match self {
            Self::Locale => ts.format("%-m/%-d/%Y %-I:%M:%S %p").to_string(),
            Self::Sortable => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Reformat a last-seen value, or hand it back untouched when it doesn't parse.
    pub fn format_last_seen(self, raw: &str) -> String {
        let Ok(ts) = NaiveDateTime::parse_from_str(raw, LAST_SEEN_PATTERN) else {
            return raw.to_string();
        };
        match self {
            Self::Locale => ts.format("%m/%d/%Y %H:%M").to_string(),
            Self::Sortable => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
