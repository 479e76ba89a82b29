//! Soft authentication for HTTP requests.
//!
//! The gate never rejects a request for carrying no credential. It only rejects
//! a credential that is present and fails verification. Routes that need an
//! identity enforce that themselves.

use std::fmt;
use std::sync::Arc;

use crate::auth::context::UserContext;
use crate::auth::token::TokenService;
use crate::error::AppError;
use tracing::{debug, warn};

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Token signature, format or claims are invalid
    InvalidToken(String),
    /// Token was valid but has expired
    TokenExpired,
    /// Token could not be signed
    Signing(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::Signing(msg) => write!(f, "Token signing failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            _ => AppError::Unauthenticated("unauthenticated request".to_string()),
        }
    }
}

/// Decides, per request, which identity (if any) is attached.
pub struct AuthGate {
    tokens: Arc<TokenService>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Resolve the identity carried by an `Authorization` header.
    ///
    /// - no header, or not a `Bearer <token>` header: `Ok(None)` (anonymous)
    /// - a bearer token that fails verification: `Err`
    /// - a valid token: the decoded identity
    pub fn extract_user(
        &self,
        authorization: Option<&str>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Option<UserContext>, AuthError> {
        let Some(token) = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            debug!("no bearer credential, continuing anonymously");
            return Ok(None);
        };

        let claims = self.tokens.verify(token).inspect_err(|e| {
            warn!(error = %e, ip = ip_address.as_deref().unwrap_or("-"), "rejected credential");
        })?;

        debug!(user_id = %claims.user_id, "token verified");

        Ok(Some(
            UserContext::new(claims.user_id).with_client_info(ip_address, user_agent),
        ))
    }
}
