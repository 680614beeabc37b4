// Authentication module
// Persisted credentials, token endpoint calls and refresh coordination

mod manager;
mod refresh;
mod store;
mod types;

pub use manager::{AuthManager, Generation};
pub use store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use types::Credentials;
