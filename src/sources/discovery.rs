use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{TokenError, TokenResult};

/// The part of the OpenID discovery document this agent needs.
#[derive(Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: Option<String>,
    pub token_endpoint: Option<String>,
}

/// GET the well-known document and return its `token_endpoint`.
pub async fn fetch_token_endpoint(client: &Client, discovery_url: &str) -> TokenResult<String> {
    let response = client
        .get(discovery_url)
        .send()
        .await
        .map_err(|e| TokenError::Discovery(format!("request to '{}' failed: {}", discovery_url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TokenError::Discovery(format!(
            "'{}' answered with status {}",
            discovery_url, status
        )));
    }

    let document: DiscoveryDocument = response
        .json()
        .await
        .map_err(|e| TokenError::Discovery(format!("malformed discovery document: {}", e)))?;

    debug!(issuer = ?document.issuer, "discovery document fetched");

    document
        .token_endpoint
        .filter(|endpoint| !endpoint.trim().is_empty())
        .ok_or_else(|| {
            TokenError::Discovery("discovery document has no 'token_endpoint'".to_string())
        })
}
