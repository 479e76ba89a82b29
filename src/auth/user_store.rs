//! User storage and credential checks.

use tracing::info;

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::db::schema::{UserCreate, UserRecord};
use crate::db::{Db, QueryBuilder};
use crate::error::{AppError, AppResult};
use crate::types::{Email, UserId};

/// User store for database operations.
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Register a new user. Fails with `Conflict` when the email is taken.
    pub async fn signup(&self, email: &str, password: &str) -> AppResult<UserRecord> {
        let email = Email::normalize(email);
        if email.as_str().is_empty() || password.is_empty() {
            return Err(AppError::validation("email and password are required"));
        }

        if self.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email is already registered".to_string()));
        }

        let create = UserCreate {
            key: UserId::generate(),
            email,
            password_hash: hash_password_blocking(password.to_string()).await?,
        };

        // The unique index catches a signup that raced past the check above.
        let user = QueryBuilder::create_user(&self.db, &create)
            .await?
            .ok_or_else(|| AppError::Conflict("email is already registered".to_string()))?;

        info!(user_id = %user.key, "user signed up");
        Ok(user)
    }

    /// Check an email/password pair and return the matching user.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<UserRecord> {
        let email = Email::normalize(email);
        if email.as_str().is_empty() || password.is_empty() {
            return Err(AppError::validation("email and password are required"));
        }

        let user = self
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("user not found".to_string()))?;

        if !verify_password_blocking(user.password_hash.clone(), password.to_string()).await? {
            return Err(AppError::Unauthenticated("incorrect password".to_string()));
        }

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &Email) -> AppResult<Option<UserRecord>> {
        Ok(QueryBuilder::find_user_by_email(&self.db, email).await?)
    }
}
