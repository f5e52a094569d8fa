use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, warn};

/// Where the expiry of a freshly issued token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationSource {
    /// `exp` claim of the JWT payload
    JwtClaim,
    /// `expires_in` of the token endpoint response
    ExpiresIn,
    /// no introspectable expiry, fixed lifetime assumed
    DefaultLifetime,
}

impl ExpirationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationSource::JwtClaim => "jwt_claim",
            ExpirationSource::ExpiresIn => "expires_in",
            ExpirationSource::DefaultLifetime => "default_lifetime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub expires_at: u64,
    pub source: ExpirationSource,
}

/// Compute the absolute expiry of an issued token.
///
/// Order: JWT `exp` claim, then the response `expires_in`, then
/// `now + default_lifetime_seconds`. The JWT signature is not verified: the
/// token comes straight from the issuer over the provider connection.
pub fn resolve_expiration(
    token_value: &str,
    expires_in: Option<u64>,
    now: u64,
    default_lifetime_seconds: u64,
) -> Expiration {
    match decode_jwt_expiration(token_value) {
        Ok(exp) => {
            debug!(expires_at = exp, "jwt exp claim decoded");
            return Expiration { expires_at: exp, source: ExpirationSource::JwtClaim };
        }
        Err(e) => warn!(error = %e, "token expiry claim not decodable, using fallback"),
    }

    if let Some(secs) = expires_in {
        return Expiration {
            expires_at: now.saturating_add(secs),
            source: ExpirationSource::ExpiresIn,
        };
    }

    Expiration {
        expires_at: now.saturating_add(default_lifetime_seconds),
        source: ExpirationSource::DefaultLifetime,
    }
}

/// Read the `exp` claim of a compact JWS without verifying it.
pub fn decode_jwt_expiration(token_value: &str) -> Result<u64> {
    let parts: Vec<&str> = token_value.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("invalid JWT format"));
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| anyhow!("base64 decode error: {}", e))?;

    let claims: Value =
        serde_json::from_slice(&decoded).map_err(|e| anyhow!("invalid JWT payload: {}", e))?;

    match claims.get("exp") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| anyhow!("JWT exp claim is not a positive number: {}", n)),
        Some(other) => Err(anyhow!("JWT exp claim has unexpected type: {}", other)),
        None => Err(anyhow!("JWT has no exp claim")),
    }
}
