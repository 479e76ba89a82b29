//! User context for request-scoped identity.

use crate::types::UserId;
use serde::{Deserialize, Serialize};

/// Identity attached to a request by the auth gate.
///
/// Only present when the request carried a valid token. It is immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Public identifier of the authenticated user
    user_id: UserId,
    /// Client IP address (for logging)
    ip_address: Option<String>,
    /// Client user agent (for logging)
    user_agent: Option<String>,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Set client metadata for logging.
    pub fn with_client_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Whether this identity is the given user.
    pub fn is(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
