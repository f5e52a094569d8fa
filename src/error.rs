use thiserror::Error;

/// Errors produced while configuring, acquiring or persisting a token.
///
/// Only `Configuration`, `Discovery` and `TokenEndpoint` are ever returned by
/// [`crate::manager::TokenManager::get_token`]. The persistence variants are
/// produced by [`crate::cache::token_file::TokenFile`] and absorbed by the
/// manager, which logs them and degrades to "no cached token".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    #[error("cannot read persisted token '{path}': {reason}")]
    PersistenceRead { path: String, reason: String },

    #[error("cannot write persisted token '{path}': {reason}")]
    PersistenceWrite { path: String, reason: String },
}

impl TokenError {
    /// Short label used for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Configuration(_) => "configuration",
            TokenError::Discovery(_) => "discovery",
            TokenError::TokenEndpoint(_) => "token_endpoint",
            TokenError::PersistenceRead { .. } => "persistence_read",
            TokenError::PersistenceWrite { .. } => "persistence_write",
        }
    }

    /// Failures talking to the identity provider, the only ones worth retrying.
    pub fn is_acquisition(&self) -> bool {
        matches!(self, TokenError::Discovery(_) | TokenError::TokenEndpoint(_))
    }
}

pub type TokenResult<T> = Result<T, TokenError>;
