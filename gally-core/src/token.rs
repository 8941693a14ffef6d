use tokio::sync::Mutex;

use crate::auth::{AuthClient, AuthError};

/// Process-wide bearer token cache.
///
/// Shared between clients through `Arc`; the token is fetched lazily and kept
/// until [`TokenProvider::invalidate`] or [`TokenProvider::refresh_now`].
pub struct TokenProvider {
    auth: AuthClient,
    token: Mutex<Option<String>>,
}

impl TokenProvider {
    pub fn new(auth: AuthClient) -> Self {
        Self {
            auth,
            token: Mutex::new(None),
        }
    }

    /// Seeds the cache with a token obtained elsewhere.
    pub fn with_token(auth: AuthClient, token: impl Into<String>) -> Self {
        Self {
            auth,
            token: Mutex::new(Some(token.into())),
        }
    }

    pub async fn valid_token(&self) -> Result<String, AuthError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.auth.fetch_token().await?.token;
        tracing::debug!("fetched new gally access token");
        *cached = Some(token.clone());
        Ok(token)
    }

    pub async fn invalidate(&self) {
        self.token.lock().await.take();
    }

    pub async fn refresh_now(&self) -> Result<String, AuthError> {
        self.invalidate().await;
        self.valid_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/authentication_token"))
            .and(body_json(json!({
                "email": "admin@example.com",
                "password": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn auth_client(server: &MockServer) -> AuthClient {
        AuthClient::with_base_url(
            &format!("{}/api", server.uri()),
            "admin@example.com",
            "secret",
        )
        .expect("auth client should build")
    }

    #[tokio::test]
    async fn returns_seeded_token_without_fetching() {
        let server = MockServer::start().await;
        mount_token(&server, "fresh", 0).await;
        let provider = TokenProvider::with_token(auth_client(&server), "seeded");

        let token = provider.valid_token().await.expect("token should be cached");
        assert_eq!(token, "seeded");
    }

    #[tokio::test]
    async fn fetches_token_once_and_caches_it() {
        let server = MockServer::start().await;
        mount_token(&server, "token-1", 1).await;
        let provider = TokenProvider::new(auth_client(&server));

        assert_eq!(provider.valid_token().await.unwrap(), "token-1");
        assert_eq!(provider.valid_token().await.unwrap(), "token-1");
    }

    #[tokio::test]
    async fn refresh_now_discards_cached_token() {
        let server = MockServer::start().await;
        mount_token(&server, "token-2", 1).await;
        let provider = TokenProvider::with_token(auth_client(&server), "stale");

        let token = provider.refresh_now().await.expect("token should refresh");
        assert_eq!(token, "token-2");
        assert_eq!(provider.valid_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn surfaces_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/authentication_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid credentials."))
            .mount(&server)
            .await;
        let provider = TokenProvider::new(auth_client(&server));

        let err = provider
            .valid_token()
            .await
            .expect_err("expected authentication failure");
        assert!(matches!(err, AuthError::Api { status, .. } if status == 401));
    }
}
