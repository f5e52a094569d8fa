use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::token::Token;
use crate::cache::token_file::TokenFile;
use crate::config::proc_validator::{into_configuration_error, validate_identity, validate_settings};
use crate::config::settings::SettingsConfig;
use crate::config::types::{IdentityConfig, ServiceConfig};
use crate::error::{TokenError, TokenResult};
use crate::helpers::time::{format_unix_ts, get_token_safety_margin_seconds, now_u64};
use crate::manager::BearerTokenProvider;
use crate::observability::metrics::{get_metrics, LAYER_DISK, LAYER_ISSUER, LAYER_MEMORY};
use crate::parser::expiration::resolve_expiration;
use crate::sources::client::build_http_client;
use crate::sources::OidcSource;

static READ_MSG: &str = "read";
static WRITE_MSG: &str = "write";
static REMOVE_MSG: &str = "remove";

/// Owns the token of one (client, realm) pair.
///
/// Lookup order is memory, then the persisted file, then a new
/// client-credentials grant. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    source: OidcSource,
    store: TokenFile,
    safety_margin_seconds: u64,
    default_lifetime_seconds: u64,
    current: RwLock<Option<Token>>,
    /// bumped under the `current` write lock whenever the token is issued or dropped
    generation: AtomicU64,
    /// persisted value that was invalidated but could not be removed
    stale_on_disk: RwLock<Option<String>>,
    refresh: Mutex<RefreshState>,
    /// mirror of `RefreshState::completed`, readable without the lock
    completed: AtomicU64,
}

/// Guarded by the refresh lock; at most one acquisition runs at a time.
#[derive(Default)]
struct RefreshState {
    completed: u64,
    last_error: Option<TokenError>,
}

impl TokenManager {
    /// Validates the configuration and builds the provider client. Fails with
    /// `TokenError::Configuration` before any I/O happens.
    pub fn new(identity: &IdentityConfig, settings: &SettingsConfig) -> TokenResult<Self> {
        let mut errors = Vec::new();
        validate_identity(identity, &mut errors);
        validate_settings(settings, &mut errors);
        if !errors.is_empty() {
            return Err(into_configuration_error(errors));
        }

        let discovery_url = identity.discovery_url().ok_or_else(|| {
            TokenError::Configuration("identity discovery url is not configured".to_string())
        })?;
        let client = build_http_client(&identity.tls, settings.http_timeout_ms)?;
        let source = OidcSource::new(
            client,
            discovery_url,
            identity.client_id.trim().to_owned(),
            identity.client_secret.clone(),
        );

        info!(
            client_id = %source.client_id(),
            discovery_url = %source.discovery_url(),
            token_file = %identity.token_file.display(),
            "token manager configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                store: TokenFile::new(identity.token_file.clone()),
                safety_margin_seconds: get_token_safety_margin_seconds(Some(settings.safety_margin_seconds)),
                default_lifetime_seconds: settings.default_lifetime_seconds,
                current: RwLock::new(None),
                generation: AtomicU64::new(0),
                stale_on_disk: RwLock::new(None),
                refresh: Mutex::new(RefreshState::default()),
                completed: AtomicU64::new(0),
            }),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> TokenResult<Self> {
        Self::new(&config.identity, &config.settings)
    }

    pub fn token_file(&self) -> &Path {
        self.inner.store.path()
    }

    pub fn safety_margin_seconds(&self) -> u64 {
        self.inner.safety_margin_seconds
    }

    /// Return a token whose expiry is beyond `now + safety margin`.
    ///
    /// Memory and disk hits never wait for an acquisition in flight. Only
    /// acquisition failures are returned; unreadable or failed writes of the
    /// persisted copy are logged and otherwise ignored.
    pub async fn get_token(&self) -> TokenResult<Token> {
        let observed = self.inner.completed.load(Ordering::Acquire);

        if let Some(token) = self.current().await {
            self.record_served(LAYER_MEMORY, &token).await;
            return Ok(token);
        }
        if let Some(token) = self.adopt_persisted().await {
            return Ok(token);
        }

        let mut state = self.inner.refresh.lock().await;

        // another caller may have refreshed while we waited for the lock
        if let Some(token) = self.current().await {
            self.record_served(LAYER_MEMORY, &token).await;
            return Ok(token);
        }
        if state.completed != observed {
            if let Some(err) = &state.last_error {
                debug!(error = %err, "sharing result of the acquisition we waited on");
                return Err(err.clone());
            }
        }

        let outcome = match self.adopt_persisted().await {
            Some(token) => Ok(token),
            None => self.issue().await,
        };

        state.completed += 1;
        state.last_error = outcome.as_ref().err().cloned();
        self.inner.completed.store(state.completed, Ordering::Release);
        outcome
    }

    /// In-memory token if still fresh. No I/O, never acquires.
    pub async fn current(&self) -> Option<Token> {
        self.inner
            .current
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_fresh(self.inner.safety_margin_seconds))
            .cloned()
    }

    /// Drop the memory and disk copies so the next `get_token` re-acquires.
    ///
    /// A persisted copy that cannot be removed is logged and remembered, so it
    /// is never served again.
    pub async fn invalidate(&self) {
        let mut state = self.inner.refresh.lock().await;
        self.invalidate_locked(&mut state).await;
    }

    /// Invalidate only if `rejected` is still the token being served, e.g.
    /// after a downstream 401. A newer token issued meanwhile is kept.
    pub async fn invalidate_token(&self, rejected: &str) -> bool {
        let mut state = self.inner.refresh.lock().await;
        let in_memory = self.inner.current.read().await.as_ref().map(|t| t.value.clone());
        let served = match in_memory {
            Some(value) => Some(value),
            None => self.inner.store.load().await.ok().flatten().map(|t| t.value),
        };
        match served {
            Some(value) if value != rejected => {
                debug!("rejected token already replaced, keeping current one");
                false
            }
            _ => {
                self.invalidate_locked(&mut state).await;
                true
            }
        }
    }

    async fn invalidate_locked(&self, state: &mut RefreshState) {
        {
            let mut current = self.inner.current.write().await;
            current.take();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }
        state.last_error = None;

        match self.inner.store.remove().await {
            Ok(()) => *self.inner.stale_on_disk.write().await = None,
            Err(e) => {
                warn!(error = %e, "persisted token could not be removed, ignoring it from now on");
                self.record_persistence_failure(REMOVE_MSG).await;
                if let Ok(Some(persisted)) = self.inner.store.load().await {
                    *self.inner.stale_on_disk.write().await = Some(persisted.value);
                }
            }
        }
        info!(client_id = %self.inner.source.client_id(), "token invalidated");
    }

    /// Adopt a fresh persisted token into memory.
    ///
    /// Runs without the refresh lock. The adoption is dropped if an issuance
    /// or invalidation replaced the in-memory token after the file was read.
    async fn adopt_persisted(&self) -> Option<Token> {
        let generation = self.inner.generation.load(Ordering::Acquire);
        let token = self.load_persisted().await?;

        let mut current = self.inner.current.write().await;
        if self.inner.generation.load(Ordering::Acquire) != generation {
            debug!("token replaced while reading the file, not adopting it");
            return None;
        }
        let existing = current
            .as_ref()
            .filter(|t| t.is_fresh(self.inner.safety_margin_seconds))
            .cloned();
        if let Some(existing) = existing {
            drop(current);
            self.record_served(LAYER_MEMORY, &existing).await;
            return Some(existing);
        }
        *current = Some(token.clone());
        drop(current);

        info!(expires_at = %format_unix_ts(token.expires_at), "token loaded from file");
        self.record_served(LAYER_DISK, &token).await;
        Some(token)
    }

    /// Persisted token if well-formed and fresh; anything else is a miss.
    async fn load_persisted(&self) -> Option<Token> {
        let stale = self.inner.stale_on_disk.read().await.clone();
        match self.inner.store.load().await {
            Ok(Some(token)) if stale.as_deref() == Some(token.value.as_str()) => {
                debug!("persisted token was invalidated, ignoring it");
                None
            }
            Ok(Some(token)) if token.is_fresh(self.inner.safety_margin_seconds) => Some(token),
            Ok(Some(token)) => {
                debug!(expires_at = %format_unix_ts(token.expires_at), "persisted token expired or expiring");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "persisted token ignored");
                self.record_persistence_failure(READ_MSG).await;
                None
            }
        }
    }

    async fn issue(&self) -> TokenResult<Token> {
        info!(client_id = %self.inner.source.client_id(), "requesting new token");
        let issued = self.inner.source.fetch_token().await?;

        let now = now_u64();
        let expiration = resolve_expiration(
            &issued.access_token,
            issued.expires_in,
            now,
            self.inner.default_lifetime_seconds,
        );
        let token = Token::new(issued.access_token, expiration.expires_at, now);

        if !token.is_fresh(self.inner.safety_margin_seconds) {
            return Err(TokenError::TokenEndpoint(format!(
                "issued token expires at {} ({}), within the {}s safety margin",
                format_unix_ts(token.expires_at),
                expiration.source.as_str(),
                self.inner.safety_margin_seconds
            )));
        }

        info!(
            expires_at = %format_unix_ts(token.expires_at),
            expiry_source = expiration.source.as_str(),
            "new token received"
        );
        {
            let mut current = self.inner.current.write().await;
            *current = Some(token.clone());
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }

        match self.inner.store.store(&token).await {
            // the file now holds the new record
            Ok(()) => *self.inner.stale_on_disk.write().await = None,
            Err(e) => {
                warn!(error = %e, "token not persisted, keeping it in memory only");
                self.record_persistence_failure(WRITE_MSG).await;
            }
        }

        self.record_served(LAYER_ISSUER, &token).await;
        Ok(token)
    }

    async fn record_served(&self, layer: &str, token: &Token) {
        let metrics = get_metrics().await;
        let client_id = self.inner.source.client_id();
        debug!(layer, client_id, "token served");
        metrics.token_requests.with_label_values(&[client_id, layer]).inc();
        metrics
            .token_expiry_unix
            .with_label_values(&[client_id])
            .set(token.expires_at as i64);
    }

    async fn record_persistence_failure(&self, operation: &str) {
        get_metrics()
            .await
            .persistence_failures
            .with_label_values(&[self.inner.source.client_id(), operation])
            .inc();
    }
}

impl BearerTokenProvider for TokenManager {
    async fn bearer_token(&self) -> TokenResult<String> {
        self.get_token().await.map(|token| token.value)
    }
}
