use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{TokenError, TokenResult};
use crate::utils::constants::GRANT_TYPE_CLIENT_CREDENTIALS;

const ERROR_BODY_LIMIT: usize = 256;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// providers disagree on the type; only a usable number of seconds is kept
    #[serde(default)]
    expires_in: Option<Value>,
}

/// Access token exactly as the token endpoint returned it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// POST the client-credentials grant to the token endpoint.
pub async fn request_client_credentials(
    client: &Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
) -> TokenResult<IssuedToken> {
    let form = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS),
    ];

    let response = client
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            TokenError::TokenEndpoint(format!("request to '{}' failed: {}", token_endpoint, e))
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TokenError::TokenEndpoint(format!(
            "token request failed: {} {}",
            status,
            truncate(&body, ERROR_BODY_LIMIT)
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| TokenError::TokenEndpoint(format!("malformed token response: {}", e)))?;

    let access_token = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TokenError::TokenEndpoint("token response has no 'access_token'".into()))?;

    let expires_in = body.expires_in.as_ref().and_then(|value| {
        let secs = lifetime_seconds(value);
        if secs.is_none() {
            debug!(expires_in = %value, "ignoring unusable expires_in");
        }
        secs
    });

    Ok(IssuedToken { access_token, expires_in })
}

/// Non-negative integer, float or numeric string; anything else is `None`.
fn lifetime_seconds(value: &Value) -> Option<u64> {
    let positive = |f: f64| (f.is_finite() && f >= 0.0).then_some(f as u64);
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(positive)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(positive))
        }
        _ => None,
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
