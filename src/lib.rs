// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rating;
pub mod types;

// Catalog and HTTP surface
pub mod api;
pub mod catalog;
pub mod images;
pub mod server;

// Re-export key types and functions
pub use config::AppConfig;
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use error::{AppError, AppResult};
pub use server::{AppState, serve};
