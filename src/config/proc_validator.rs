//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Credentials and the discovery location must be present and non-empty
//! - Safety margin never below the hard floor
//! - Retry / logging / server / metrics invariants

use reqwest::Url;

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::types::{IdentityConfig, ServiceConfig};
use crate::error::TokenError;
use crate::utils::constants::MIN_SAFETY_MARGIN_SECS;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_identity(&cfg.identity, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collapse aggregated issues into the single error the token manager reports.
pub fn into_configuration_error(errors: Vec<String>) -> TokenError {
    TokenError::Configuration(errors.join("; "))
}

/// IDENTITY VALIDATION
pub fn validate_identity(identity: &IdentityConfig, errors: &mut Vec<String>) {
    if identity.client_id.trim().is_empty() {
        errors.push("identity.client_id must not be empty".to_string());
    }
    if identity.client_secret.trim().is_empty() {
        errors.push("identity.client_secret must not be empty".to_string());
    }
    if identity.token_file.as_os_str().is_empty() {
        errors.push("identity.token_file must not be empty".to_string());
    }

    match identity.discovery_url() {
        None => errors.push(
            "identity: either 'discovery_url' or both 'issuer_base_url' and 'realm' must be provided"
                .to_string(),
        ),
        Some(url) => match Url::parse(&url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => errors.push(format!(
                "identity discovery url '{}' has unsupported scheme '{}'",
                url,
                parsed.scheme()
            )),
            Err(e) => errors.push(format!("identity discovery url '{}' is invalid: {}", url, e)),
        },
    }

    if let Some(ca) = &identity.tls.ca_cert_path {
        if ca.as_os_str().is_empty() {
            errors.push("identity.tls.ca_cert_path must not be empty when set".to_string());
        }
    }
}

/// SETTINGS VALIDATION
pub fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.safety_margin_seconds < MIN_SAFETY_MARGIN_SECS {
        errors.push(format!(
            "settings.safety_margin_seconds ({}) must be >= {}",
            settings.safety_margin_seconds, MIN_SAFETY_MARGIN_SECS
        ));
    }
    if settings.safety_margin_seconds > 60 * 60 * 24 {
        errors.push(format!(
            "settings.safety_margin_seconds ({}) is unreasonably large",
            settings.safety_margin_seconds
        ));
    }
    if settings.default_lifetime_seconds <= settings.safety_margin_seconds {
        errors.push(format!(
            "settings.default_lifetime_seconds ({}) must be greater than safety_margin_seconds ({})",
            settings.default_lifetime_seconds, settings.safety_margin_seconds
        ));
    }
    if settings.http_timeout_ms == 0 {
        errors.push("settings.http_timeout_ms must be > 0".to_string());
    }

    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if let Some(server) = &settings.server {
        if server.host.is_empty() {
            errors.push("settings.server.host must not be empty".to_string());
        }
        if server.port.parse::<u16>().is_err() {
            errors.push(format!(
                "settings.server.port '{}' must be an integer in range 0-65535",
                server.port
            ));
        }
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if let Some(attempts) = retry.attempts {
        if attempts == 0 {
            errors.push(format!("{}.attempts must be > 0", path));
        }
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}
