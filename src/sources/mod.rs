//! Identity-provider side of the token lifecycle: discovery + client-credentials grant.

pub mod client;
pub mod discovery;
pub mod oauth2;

use reqwest::Client;
use tracing::{info, warn};

use crate::error::TokenResult;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use oauth2::IssuedToken;

static DISCOVERY_MSG: &str = "discovery";
static TOKEN_MSG: &str = "token";

/// One configured client at one identity provider.
#[derive(Clone)]
pub struct OidcSource {
    client: Client,
    discovery_url: String,
    client_id: String,
    client_secret: String,
}

impl OidcSource {
    pub fn new(client: Client, discovery_url: String, client_id: String, client_secret: String) -> Self {
        Self { client, discovery_url, client_id, client_secret }
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run the full acquisition protocol once. No retry.
    pub async fn fetch_token(&self) -> TokenResult<IssuedToken> {
        let metrics = get_metrics().await;
        let start = get_instant();
        metrics
            .source_fetch_requests
            .with_label_values(&[self.client_id.as_str(), DISCOVERY_MSG])
            .inc();

        let result = self.discover_and_request(&metrics.source_fetch_requests).await;

        metrics
            .source_fetch_duration
            .with_label_values(&[self.client_id.as_str()])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => info!(client_id = %self.client_id, "new token issued"),
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "token acquisition failed");
                metrics
                    .source_fetch_failures
                    .with_label_values(&[self.client_id.as_str(), e.reason()])
                    .inc();
            }
        }
        result
    }

    async fn discover_and_request(
        &self,
        requests: &prometheus::IntCounterVec,
    ) -> TokenResult<IssuedToken> {
        info!(url = %self.discovery_url, "fetching OpenID configuration");
        let token_endpoint =
            discovery::fetch_token_endpoint(&self.client, &self.discovery_url).await?;

        info!(url = %token_endpoint, "requesting client-credentials token");
        requests
            .with_label_values(&[self.client_id.as_str(), TOKEN_MSG])
            .inc();
        oauth2::request_client_credentials(
            &self.client,
            &token_endpoint,
            &self.client_id,
            &self.client_secret,
        )
        .await
    }
}
