// claude-auth - credential and token-lifecycle management for the Anthropic API
//
// Two credential modes behind one provider interface: long-lived static API
// keys and short-lived refreshable OAuth token pairs, with concurrency-safe
// refresh, multi-backend credential storage, and per-mode context limits.

pub mod authenticator;
pub mod config;
pub mod detector;
pub mod error;
pub mod estimator;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

pub use authenticator::RequestAuthenticator;
pub use config::AuthConfig;
pub use error::{AuthError, StorageError};
pub use provider::AuthProvider;
pub use service::AuthService;
pub use types::{AuthMode, AuthStatus, TokenSet};
