use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::settings::SettingsConfig;
use crate::utils::constants::{DEFAULT_TOKEN_FILE, DISCOVERY_PATH_SUFFIX};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub identity: IdentityConfig,
}

/// ================================
/// Identity provider + client credentials
/// ================================
#[derive(Deserialize, Clone)]
pub struct IdentityConfig {
    /// e.g. `https://sso.example.com`; combined with `realm` when
    /// `discovery_url` is not given
    #[serde(default)]
    pub issuer_base_url: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    /// full well-known URL, takes precedence over issuer_base_url + realm
    #[serde(default)]
    pub discovery_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// disables certificate validation for provider calls; off unless set
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// extra PEM root certificate trusted for provider calls
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
}

impl IdentityConfig {
    pub fn new(
        token_file: impl Into<PathBuf>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        discovery_url: impl Into<String>,
    ) -> Self {
        Self {
            issuer_base_url: None,
            realm: None,
            discovery_url: Some(discovery_url.into()),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_file: token_file.into(),
            tls: TlsConfig::default(),
        }
    }

    /// Keycloak-style construction: `{issuer_base}/auth/realms/{realm}/...`.
    pub fn for_realm(
        token_file: impl Into<PathBuf>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        issuer_base_url: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            issuer_base_url: Some(issuer_base_url.into()),
            realm: Some(realm.into()),
            discovery_url: None,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_file: token_file.into(),
            tls: TlsConfig::default(),
        }
    }

    /// Resolved discovery URL, if enough of the configuration is present.
    pub fn discovery_url(&self) -> Option<String> {
        if let Some(url) = self.discovery_url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_owned());
        }
        match (&self.issuer_base_url, &self.realm) {
            (Some(base), Some(realm)) if !base.trim().is_empty() && !realm.trim().is_empty() => {
                Some(format!(
                    "{}/auth/realms/{}/{}",
                    base.trim().trim_end_matches('/'),
                    realm.trim(),
                    DISCOVERY_PATH_SUFFIX
                ))
            }
            _ => None,
        }
    }
}

// client_secret must never reach the logs
impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("issuer_base_url", &self.issuer_base_url)
            .field("realm", &self.realm)
            .field("discovery_url", &self.discovery_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_file", &self.token_file)
            .field("tls", &self.tls)
            .finish()
    }
}

fn default_token_file() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_FILE)
}
