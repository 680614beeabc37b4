// Admin API client - authenticated REST access with transparent token refresh

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;

pub use auth::{AuthManager, Credentials, MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use config::Config;
pub use error::ApiError;
pub use http_client::ApiClient;
