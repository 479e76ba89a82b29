//! Authentication and user identity.
//!
//! - **UserStore**: signup and credential checks against the `user` table
//! - **TokenService**: issues and verifies signed, time-limited tokens
//! - **AuthGate**: attaches an identity to a request when a valid bearer token
//!   is present, and lets anonymous requests through
//!
//! ## Security Model
//!
//! - Passwords are stored as Argon2 PHC strings only
//! - A present-but-invalid token is rejected; an absent one is not
//! - Routes that mutate state require an identity on their own

mod context;
mod extractor;
pub mod password;
pub mod token;
mod user_store;

pub use context::UserContext;
pub use extractor::{AuthError, AuthGate};
pub use token::{DEFAULT_TOKEN_TTL_HOURS, TokenClaims, TokenService};
pub use user_store::UserStore;
