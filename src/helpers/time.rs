use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::utils::constants::MIN_SAFETY_MARGIN_SECS;

/// Effective safety margin: the configured value, never below the hard floor.
pub fn get_token_safety_margin_seconds(safety_margin_seconds_settings: Option<u64>) -> u64 {
    safety_margin_seconds_settings
        .unwrap_or(MIN_SAFETY_MARGIN_SECS)
        .max(MIN_SAFETY_MARGIN_SECS)
}

pub fn now_u64() -> u64 {
    now_i64().max(0) as u64
}

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

pub fn get_instant() -> Instant {
    Instant::now()
}

/// Render a unix timestamp for logs; falls back to the raw number.
pub fn format_unix_ts(ts: u64) -> String {
    DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
