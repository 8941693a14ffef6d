use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::client::normalize_base_url;

const AUTHENTICATION_ENDPOINT: &str = "authentication_token";
const LD_JSON: &str = "application/ld+json";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("an error happened when fetching the authentication token: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("authentication returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Exchanges account credentials for an API bearer token.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Url,
    email: String,
    password: String,
}

impl AuthClient {
    pub fn with_base_url(
        base_url: &str,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self::with_http(
            Client::new(),
            normalize_base_url(base_url)?,
            email,
            password,
        ))
    }

    pub(crate) fn with_http(
        http: Client,
        base_url: Url,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            email: email.into(),
            password: password.into(),
        }
    }

    pub async fn fetch_token(&self) -> Result<AuthToken, AuthError> {
        let url = self.base_url.join(AUTHENTICATION_ENDPOINT)?;
        let credentials = Credentials {
            email: &self.email,
            password: &self.password,
        };

        let response = self
            .http
            .post(url)
            .header(ACCEPT, LD_JSON)
            .header(CONTENT_TYPE, LD_JSON)
            .json(&credentials)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json::<AuthToken>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::Api { status, body })
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthToken {
    pub token: String,
}
