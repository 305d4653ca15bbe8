//! Inbound access control
//!
//! The gateway never inspects credentials itself; it delegates to an
//! [`Authorizer`] injected through the shared state. The default
//! implementation validates server-side access codes and optionally lets
//! callers bring their own provider API key, which is then passed through
//! to the upstream verbatim.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Serialize;

use crate::config::AuthConfig;

/// Tokens with this prefix are gateway access codes; anything else in the
/// Authorization header is treated as a caller-supplied provider API key.
pub const ACCESS_CODE_PREFIX: &str = "nk-";

/// Structured authorization failure, returned to the caller as the 401 body
#[derive(Debug, Clone, Serialize)]
pub struct AuthFailure {
    pub error: bool,
    pub msg: String,
}

impl AuthFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: true,
            msg: msg.into(),
        }
    }
}

/// Capability deciding whether a request carries valid credentials for the
/// given upstream provider
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, headers: &HeaderMap, provider: &str) -> Result<(), AuthFailure>;
}

/// Authorizer driven by the `auth` configuration section
pub struct AccessCodeAuthorizer {
    config: AuthConfig,
}

impl AccessCodeAuthorizer {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

/// Extract the bearer token from the Authorization header, if any
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[async_trait]
impl Authorizer for AccessCodeAuthorizer {
    async fn authorize(&self, headers: &HeaderMap, provider: &str) -> Result<(), AuthFailure> {
        // Open deployment: no codes configured, everything passes
        if self.config.access_codes.is_empty() {
            return Ok(());
        }

        let token = bearer_token(headers).unwrap_or("");

        if let Some(code) = token.strip_prefix(ACCESS_CODE_PREFIX) {
            if self.config.access_codes.iter().any(|c| c == code) {
                Ok(())
            } else {
                Err(AuthFailure::new("wrong access code"))
            }
        } else if token.is_empty() {
            Err(AuthFailure::new("empty access code"))
        } else if self.config.allow_user_api_key {
            tracing::debug!(provider, "caller provided its own api key");
            Ok(())
        } else {
            Err(AuthFailure::new("user api key not allowed"))
        }
    }
}
