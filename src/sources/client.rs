use std::time::Duration;

use reqwest::{Certificate, Client};
use tracing::warn;

use crate::config::types::TlsConfig;
use crate::error::{TokenError, TokenResult};

/// Shared HTTP client for every identity-provider call.
pub fn build_http_client(tls: &TlsConfig, http_timeout_ms: u64) -> TokenResult<Client> {
    let mut builder = Client::builder().timeout(Duration::from_millis(http_timeout_ms));

    if let Some(ca_path) = &tls.ca_cert_path {
        let pem = std::fs::read(ca_path).map_err(|e| {
            TokenError::Configuration(format!(
                "cannot read CA certificate '{}': {}",
                ca_path.display(),
                e
            ))
        })?;
        let cert = Certificate::from_pem(&pem).map_err(|e| {
            TokenError::Configuration(format!(
                "invalid CA certificate '{}': {}",
                ca_path.display(),
                e
            ))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    if tls.insecure_skip_verify {
        warn!("TLS certificate validation is DISABLED for identity provider calls");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| TokenError::Configuration(format!("cannot build HTTP client: {}", e)))
}
