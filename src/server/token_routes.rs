use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cache::token::Token;
use crate::manager::TokenManager;
use crate::server::server::AppState;

pub const TOKEN_PATH: &str = "/token";
pub const INVALIDATE_PATH: &str = "/token/invalidate";

#[derive(Clone)]
pub struct TokenRouteState {
    pub manager: TokenManager,
}

impl TokenRouteState {
    pub fn new(manager: TokenManager) -> Self {
        Self { manager }
    }

    pub fn router(&self) -> Router<AppState> {
        info!("served paths: {}, {}", TOKEN_PATH, INVALIDATE_PATH);
        Router::new()
            .route(TOKEN_PATH, get(handle_token))
            .route(INVALIDATE_PATH, post(handle_invalidate))
    }
}

#[derive(Debug, Serialize)]
struct TokenBody<'a> {
    access_token: &'a str,
    token_type: &'static str,
    expires_at: u64,
    expires_in: u64,
}

impl<'a> From<&'a Token> for TokenBody<'a> {
    fn from(token: &'a Token) -> Self {
        Self {
            access_token: &token.value,
            token_type: "Bearer",
            expires_at: token.expires_at,
            expires_in: token.expires_in(),
        }
    }
}

async fn handle_token(State(state): State<AppState>) -> Response {
    match state.token_state.manager.get_token().await {
        Ok(token) => (StatusCode::OK, Json(TokenBody::from(&token))).into_response(),
        Err(e) => {
            warn!(error = %e, "token request failed");
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn handle_invalidate(State(state): State<AppState>) -> StatusCode {
    state.token_state.manager.invalidate().await;
    StatusCode::NO_CONTENT
}
