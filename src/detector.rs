// Credential classification
//
// A raw secret is classified once, at login, from its structural prefix.
// The mode decides which header family every subsequent request uses, so an
// unknown prefix is a hard error rather than a silent default.

use crate::error::AuthError;
use crate::types::AuthMode;

/// Prefix carried by long-lived static API keys.
pub const API_KEY_PREFIX: &str = "sk-ant-";

/// Prefix carried by refreshable OAuth secrets.
pub const OAUTH_TOKEN_PREFIX: &str = "oauth-";

/// Classify a raw secret as a static API key or a refreshable OAuth token.
///
/// Pure and deterministic: the decision depends solely on the prefix.
pub fn classify(secret: &str) -> Result<AuthMode, AuthError> {
    if secret.starts_with(API_KEY_PREFIX) {
        Ok(AuthMode::ApiKey)
    } else if secret.starts_with(OAUTH_TOKEN_PREFIX) {
        Ok(AuthMode::Oauth)
    } else {
        Err(AuthError::UnrecognizedCredentialFormat)
    }
}
