// tests/common/mod.rs
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::settings::SettingsConfig;
use crate::config::types::IdentityConfig;
use crate::helpers::time::now_u64;
use crate::manager::TokenManager;

pub const REALM: &str = "shops";
pub const CLIENT_ID: &str = "merch-client";
pub const CLIENT_SECRET: &str = "merch-secret";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

/// Minimal unsigned JWT carrying only `exp`.
pub fn sample_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"azp":"{}"}}"#, exp, CLIENT_ID));
    format!("{}.{}.", header, payload)
}

/// How the mock identity provider answers.
#[derive(Clone)]
pub struct IdpBehavior {
    pub discovery_status: StatusCode,
    /// `None` answers with a document pointing at the mock token endpoint
    pub discovery_body: Option<Value>,
    pub token_status: StatusCode,
    /// each request gets the next body; the last one repeats
    pub token_bodies: Vec<Value>,
    pub token_delay: Duration,
}

impl IdpBehavior {
    pub fn issuing(token: &str) -> Self {
        Self::issuing_sequence(vec![json!({ "access_token": token, "token_type": "Bearer" })])
    }

    pub fn issuing_sequence(token_bodies: Vec<Value>) -> Self {
        Self {
            discovery_status: StatusCode::OK,
            discovery_body: None,
            token_status: StatusCode::OK,
            token_bodies,
            token_delay: Duration::ZERO,
        }
    }
}

/// Keycloak-like provider on an ephemeral port counting every request.
pub struct MockIdp {
    pub base_url: String,
    pub discovery_hits: Arc<AtomicUsize>,
    pub token_hits: Arc<AtomicUsize>,
    pub token_forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    handle: JoinHandle<()>,
}

impl MockIdp {
    pub async fn start(behavior: IdpBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);
        let realm_path = format!("/auth/realms/{}", REALM);
        let token_path = format!("{}/protocol/openid-connect/token", realm_path);
        let token_endpoint = format!("{}{}", base_url, token_path);

        let discovery_hits = Arc::new(AtomicUsize::new(0));
        let token_hits = Arc::new(AtomicUsize::new(0));
        let token_forms = Arc::new(Mutex::new(Vec::new()));

        let discovery = {
            let hits = discovery_hits.clone();
            let behavior = behavior.clone();
            let issuer = format!("{}{}", base_url, realm_path);
            move || {
                let hits = hits.clone();
                let behavior = behavior.clone();
                let issuer = issuer.clone();
                let token_endpoint = token_endpoint.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let body = behavior.discovery_body.clone().unwrap_or_else(|| {
                        json!({ "issuer": issuer, "token_endpoint": token_endpoint })
                    });
                    (behavior.discovery_status, Json(body))
                }
            }
        };

        let token = {
            let hits = token_hits.clone();
            let forms = token_forms.clone();
            let behavior = behavior.clone();
            move |Form(form): Form<HashMap<String, String>>| {
                let hits = hits.clone();
                let forms = forms.clone();
                let behavior = behavior.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    forms.lock().unwrap().push(form);
                    if !behavior.token_delay.is_zero() {
                        tokio::time::sleep(behavior.token_delay).await;
                    }
                    let idx = n.min(behavior.token_bodies.len().saturating_sub(1));
                    let body = behavior.token_bodies.get(idx).cloned().unwrap_or(Value::Null);
                    (behavior.token_status, Json(body))
                }
            }
        };

        let router = Router::new()
            .route(&format!("{}/.well-known/openid-configuration", realm_path), get(discovery))
            .route(&token_path, post(token));

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server failed");
        });

        Self { base_url, discovery_hits, token_hits, token_forms, handle }
    }

    pub fn token_requests(&self) -> usize {
        self.token_hits.load(Ordering::SeqCst)
    }

    pub fn discovery_requests(&self) -> usize {
        self.discovery_hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockIdp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Token file inside a fresh temp dir; keep the `TempDir` alive.
pub fn temp_token_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("api_merch_token.json");
    (dir, path)
}

pub fn test_settings() -> SettingsConfig {
    let mut settings = SettingsConfig::default();
    settings.http_timeout_ms = 3000;
    settings
}

pub fn identity_for(base_url: &str, token_file: &PathBuf) -> IdentityConfig {
    IdentityConfig::for_realm(token_file.clone(), CLIENT_ID, CLIENT_SECRET, base_url, REALM)
}

pub fn manager_for(base_url: &str, token_file: &PathBuf) -> TokenManager {
    TokenManager::new(&identity_for(base_url, token_file), &test_settings()).expect("valid config")
}

/// Write a persisted record exactly as an earlier run would have.
pub fn write_token_file(path: &PathBuf, token: &str, expired_timestamp: i64, last_update: i64) {
    let body = json!({
        "token": token,
        "expired_timestamp": expired_timestamp,
        "last_update": last_update,
    });
    std::fs::write(path, serde_json::to_vec_pretty(&body).unwrap()).expect("write token file");
}

pub fn read_token_file(path: &PathBuf) -> Value {
    serde_json::from_slice(&std::fs::read(path).expect("token file exists")).expect("token file is json")
}

pub fn now() -> i64 {
    now_u64() as i64
}
