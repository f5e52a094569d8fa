pub mod token_manager;

use std::future::Future;

use crate::error::TokenResult;
use crate::utils::constants::BEARER_PREFIX;

pub use token_manager::TokenManager;

/// What downstream HTTP clients need from the token layer: a bearer value
/// that stays valid for at least the configured safety margin.
pub trait BearerTokenProvider {
    fn bearer_token(&self) -> impl Future<Output = TokenResult<String>> + Send;
}

/// `Authorization` header value for any provider.
pub async fn authorization_header<P: BearerTokenProvider + Sync>(provider: &P) -> TokenResult<String> {
    provider
        .bearer_token()
        .await
        .map(|token| format!("{}{}", BEARER_PREFIX, token))
}
