use serde::Serialize;

use crate::helpers::time::now_u64;
use crate::utils::constants::BEARER_PREFIX;

/// The unit of token state. Replaced wholesale on every issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub value: String,
    pub expires_at: u64,  // UNIX TIMESTAMP
    pub last_update: u64, // UNIX TIMESTAMP, informational only
}

impl Token {
    pub fn new(value: String, expires_at: u64, last_update: u64) -> Self {
        Self { value, expires_at, last_update }
    }

    /// Usable only while `expires_at > now + safety_margin`.
    pub fn is_fresh_at(&self, now: u64, safety_margin_seconds: u64) -> bool {
        self.expires_at > now.saturating_add(safety_margin_seconds)
    }

    pub fn is_fresh(&self, safety_margin_seconds: u64) -> bool {
        self.is_fresh_at(now_u64(), safety_margin_seconds)
    }

    /// Seconds left until hard expiry, zero once expired.
    pub fn expires_in(&self) -> u64 {
        self.expires_at.saturating_sub(now_u64())
    }

    pub fn authorization_header(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.value)
    }
}
