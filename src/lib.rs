//! # OIDC Token Agent Library
//!
//! Obtains client-credentials access tokens from an OpenID Connect provider,
//! keeps them in memory and in a JSON file across runs, and only contacts the
//! provider when neither copy is still valid.
//!
//! Modules:
//! - `config`: service configuration, env expansion and validation
//! - `cache`: token record and its on-disk mirror
//! - `sources`: discovery document and client-credentials grant
//! - `parser`: token expiry extraction
//! - `manager`: the token manager and the bearer-token contract

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod manager;
pub mod observability;
pub mod parser;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::cache::token::Token;
pub use crate::config::types::{IdentityConfig, ServiceConfig};
pub use crate::error::{TokenError, TokenResult};
pub use crate::manager::{BearerTokenProvider, TokenManager};
