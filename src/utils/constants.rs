//! Shared constants and invariants

/// Minimum remaining validity before a token is considered unusable.
pub const MIN_SAFETY_MARGIN_SECS: u64 = 20;
/// Lifetime assumed for tokens that carry no expiry information.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_CONFIG_PATH: &str = "oidc-token-agent.yaml";
pub const DEFAULT_TOKEN_FILE: &str = "api_merch_token.json";

// OpenID discovery layout of Keycloak realms
pub const DISCOVERY_PATH_SUFFIX: &str = ".well-known/openid-configuration";
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const BEARER_PREFIX: &str = "Bearer ";
