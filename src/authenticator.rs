// Request authentication
//
// Attaches the active credential to each outbound request, watches for the
// downstream API's authentication-rejection signal, and runs exactly one
// reactive refresh-and-retry cycle per request.

use std::sync::Arc;

use reqwest::header::HeaderValue;
use reqwest::{Client, Request, Response, StatusCode};

use crate::error::AuthError;
use crate::estimator;
use crate::provider::{AuthProvider, Credential};

/// Outcome of checking an input against the mode's context limit.
#[derive(Debug, Clone, Copy)]
pub struct ContextCheck {
    pub estimated_tokens: u32,
    pub limit: u32,
}

impl ContextCheck {
    pub fn exceeds_limit(&self) -> bool {
        self.estimated_tokens > self.limit
    }

    /// Within 10% of the limit.
    pub fn near_limit(&self) -> bool {
        !self.exceeds_limit() && self.estimated_tokens * 10 >= self.limit * 9
    }
}

pub struct RequestAuthenticator {
    provider: Arc<AuthProvider>,
    client: Client,
}

impl RequestAuthenticator {
    pub fn new(provider: Arc<AuthProvider>, client: Client) -> Self {
        Self { provider, client }
    }

    /// Advisory input-size limit for the active mode, in tokens.
    pub fn context_limit(&self) -> u32 {
        self.provider.mode().context_limit()
    }

    /// Conservative token estimate for `text`.
    pub fn estimate_size(&self, text: &str) -> u32 {
        estimator::estimate_tokens(text)
    }

    /// Estimate `text` against the active mode's limit, warning when the
    /// estimate approaches or exceeds it. Never truncates or blocks.
    pub fn check_context(&self, text: &str) -> ContextCheck {
        let check = ContextCheck {
            estimated_tokens: self.estimate_size(text),
            limit: self.context_limit(),
        };

        if check.exceeds_limit() {
            tracing::warn!(
                estimated_tokens = check.estimated_tokens,
                limit = check.limit,
                mode = %self.provider.mode(),
                "estimated input exceeds the context limit for this credential mode"
            );
        } else if check.near_limit() {
            tracing::warn!(
                estimated_tokens = check.estimated_tokens,
                limit = check.limit,
                mode = %self.provider.mode(),
                "estimated input approaches the context limit for this credential mode"
            );
        }

        check
    }

    /// Attach credentials and execute the request.
    ///
    /// On an authentication rejection (401): a static credential fails
    /// immediately; a refreshable one is refreshed reactively and the
    /// request retried exactly once. A second rejection after a successful
    /// refresh is a hard failure, never another retry.
    pub async fn authorized_call(&self, request: Request) -> Result<Response, AuthError> {
        // The retry clone is taken up front; a streaming body cannot be
        // replayed after the first send.
        let retry_request = request.try_clone();

        let credential = self.provider.credentials().await?;
        let response = self.send_with(request, &credential).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::warn!(
            mode = %self.provider.mode(),
            "downstream API rejected the request credentials"
        );

        // Static mode surfaces immediately inside on_auth_failure.
        self.provider.on_auth_failure().await?;

        let retry_request = retry_request.ok_or_else(|| {
            AuthError::Internal(anyhow::anyhow!(
                "request body cannot be replayed after token refresh"
            ))
        })?;

        let credential = self.provider.credentials().await?;
        let response = self.send_with(retry_request, &credential).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::error!("request rejected again after a successful refresh");
            return Err(AuthError::OauthTokenExpired);
        }

        Ok(response)
    }

    async fn send_with(
        &self,
        mut request: Request,
        credential: &Credential,
    ) -> Result<Response, AuthError> {
        let (name, value) = match credential {
            Credential::ApiKey(secret) => ("x-api-key", secret.clone()),
            Credential::Bearer(token) => ("Authorization", format!("Bearer {token}")),
        };

        let value = HeaderValue::from_str(&value).map_err(|_| {
            AuthError::Internal(anyhow::anyhow!(
                "credential contains characters not valid in an HTTP header"
            ))
        })?;
        request.headers_mut().insert(name, value);

        Ok(self.client.execute(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticCredentialProvider;
    use crate::types::{API_KEY_CONTEXT_LIMIT, OAUTH_CONTEXT_LIMIT};

    fn static_authenticator(secret: &str) -> RequestAuthenticator {
        let provider = AuthProvider::Static(
            StaticCredentialProvider::new(secret.to_string()).unwrap(),
        );
        RequestAuthenticator::new(Arc::new(provider), Client::new())
    }

    #[test]
    fn test_context_limit_follows_mode() {
        let authenticator = static_authenticator("sk-ant-api03-test");
        assert_eq!(authenticator.context_limit(), API_KEY_CONTEXT_LIMIT);
    }

    #[test]
    fn test_check_context_small_input() {
        let authenticator = static_authenticator("sk-ant-api03-test");
        let check = authenticator.check_context("Hello world");
        assert!(!check.near_limit());
        assert!(!check.exceeds_limit());
        assert!(check.estimated_tokens > 0);
    }

    #[test]
    fn test_context_check_boundaries() {
        let at_ninety = ContextCheck {
            estimated_tokens: OAUTH_CONTEXT_LIMIT / 10 * 9,
            limit: OAUTH_CONTEXT_LIMIT,
        };
        assert!(at_ninety.near_limit());
        assert!(!at_ninety.exceeds_limit());

        let over = ContextCheck {
            estimated_tokens: OAUTH_CONTEXT_LIMIT + 1,
            limit: OAUTH_CONTEXT_LIMIT,
        };
        assert!(over.exceeds_limit());
        assert!(!over.near_limit());

        let comfortable = ContextCheck {
            estimated_tokens: OAUTH_CONTEXT_LIMIT / 2,
            limit: OAUTH_CONTEXT_LIMIT,
        };
        assert!(!comfortable.near_limit());
        assert!(!comfortable.exceeds_limit());
    }

    #[tokio::test]
    async fn test_static_request_carries_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-api03-test")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let authenticator = static_authenticator("sk-ant-api03-test");
        let request = Client::new()
            .post(format!("{}/v1/messages", server.url()))
            .body("{}")
            .build()
            .unwrap();

        let response = authenticator.authorized_call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_static_rejection_is_immediate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let authenticator = static_authenticator("sk-ant-api03-revoked");
        let request = Client::new()
            .post(format!("{}/v1/messages", server.url()))
            .body("{}")
            .build()
            .unwrap();

        let err = authenticator.authorized_call(request).await.unwrap_err();
        assert!(matches!(err, AuthError::StaticCredentialInvalid));
        // No retry was attempted
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .create_async()
            .await;

        let authenticator = static_authenticator("sk-ant-api03-test");
        let request = Client::new()
            .post(format!("{}/v1/messages", server.url()))
            .body("{}")
            .build()
            .unwrap();

        // Overloaded is the caller's problem, not an auth signal
        let response = authenticator.authorized_call(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 529);
    }
}
