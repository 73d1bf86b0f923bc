use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Upper bound on `device_id` length, counted in characters.
pub const DEVICE_ID_MAX_LEN: usize = 128;

/// Validated metric values keyed by name. `BTreeMap` keeps the keys sorted,
/// which is also the order they are serialized in.
pub type Metrics = BTreeMap<String, f64>;

/// Body of `POST /ingest`.
///
/// Metric values are kept as raw JSON here and coerced to `f64` by
/// [`crate::validate::validate_metrics`], so that non-numeric values are
/// reported per key instead of as a generic body error.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub device_id: String,
    /// ISO-8601; a timestamp without an offset is taken as UTC. Server time
    /// is used when omitted.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// RFC 3339 first, then a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub status: String,
    pub device_id: String,
    pub received_at: String,
}

impl IngestResponse {
    pub fn ok(device_id: String, received_at: String) -> Self {
        Self {
            status: "ok".to_string(),
            device_id,
            received_at,
        }
    }
}

/// The latest stored reading for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub device_id: String,
    /// ISO-8601 UTC, second precision, `Z` suffix.
    pub timestamp: String,
    /// ISO-8601 UTC, second precision, `Z` suffix.
    pub received_at: String,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
