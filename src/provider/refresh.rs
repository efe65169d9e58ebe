// Token refresh over the network
//
// One refresh operation = up to `refresh_max_attempts` POSTs to the token
// endpoint with exponential backoff between attempts. Transient failures
// never cross this boundary individually; callers see either a new token set
// or exhaustion.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;

use crate::config::AuthConfig;
use crate::types::{RefreshRequest, RefreshResponse, TokenSet};

/// Terminal outcome of a refresh operation. Small and cloneable so every
/// waiter on a shared in-flight refresh can receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshError {
    /// The record carries no refresh token; nothing to send.
    MissingRefreshToken,
    /// Every attempt failed; the credential needs a fresh login.
    Exhausted,
}

/// Failure of a single attempt, with an optional server-provided delay hint.
struct AttemptError {
    reason: String,
    retry_after: Option<Duration>,
}

/// Run one full refresh operation against the configured token endpoint.
///
/// On success the returned set replaces the old one wholesale; the response's
/// refresh token is authoritative when present and the prior one is retained
/// only when the field is absent.
pub(crate) async fn execute(
    client: &Client,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenSet, RefreshError> {
    let mut attempt: u32 = 1;

    loop {
        match attempt_refresh(client, config, refresh_token).await {
            Ok(tokens) => {
                tracing::info!(
                    attempt,
                    expires_at = ?tokens.expires_at,
                    "token refresh succeeded"
                );
                return Ok(tokens);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.refresh_max_attempts,
                    reason = %e.reason,
                    "token refresh attempt failed"
                );

                if attempt >= config.refresh_max_attempts {
                    tracing::error!(
                        attempts = attempt,
                        "token refresh exhausted its attempt ceiling"
                    );
                    return Err(RefreshError::Exhausted);
                }

                let delay = e.retry_after.unwrap_or_else(|| backoff_delay(config, attempt));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff: base, 2x base, 4x base, ...
fn backoff_delay(config: &AuthConfig, attempt: u32) -> Duration {
    config.refresh_base_delay * 2_u32.saturating_pow(attempt - 1)
}

async fn attempt_refresh(
    client: &Client,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenSet, AttemptError> {
    let body = RefreshRequest {
        grant_type: "refresh_token",
        refresh_token,
        client_id: &config.client_id,
    };

    let response = client
        .post(&config.token_endpoint)
        .header("User-Agent", user_agent())
        .json(&body)
        .send()
        .await
        .map_err(|e| AttemptError {
            reason: transport_error_kind(&e).to_string(),
            retry_after: None,
        })?;

    let status = response.status();
    if !status.is_success() {
        // Do not read the body into the error: it is logged nowhere and a
        // misconfigured endpoint could echo the request back.
        let retry_after = (status.as_u16() == 429)
            .then(|| parse_retry_after(response.headers()))
            .flatten();
        return Err(AttemptError {
            reason: format!("token endpoint returned HTTP {}", status.as_u16()),
            retry_after,
        });
    }

    let data: RefreshResponse = response.json().await.map_err(|_| AttemptError {
        reason: "token endpoint response is not valid JSON".to_string(),
        retry_after: None,
    })?;

    if data.access_token.is_empty() {
        return Err(AttemptError {
            reason: "token endpoint response has no access token".to_string(),
            retry_after: None,
        });
    }

    let expires_in = data.expires_in.unwrap_or(3600);
    let expires_at = Utc::now() + chrono::Duration::seconds(expires_in as i64);

    TokenSet::new(
        data.access_token,
        Some(data.refresh_token.unwrap_or_else(|| refresh_token.to_string())),
        Some(expires_at),
    )
    .map_err(|e| AttemptError {
        reason: e.to_string(),
        retry_after: None,
    })
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_request() {
        "request error"
    } else if e.is_decode() {
        "decode error"
    } else {
        "transport error"
    }
}

/// User-Agent carrying the crate version and a stable machine fingerprint.
pub(crate) fn user_agent() -> String {
    format!(
        "claude-auth/{}-{}",
        env!("CARGO_PKG_VERSION"),
        machine_fingerprint()
    )
}

fn machine_fingerprint() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
