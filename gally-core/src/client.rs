use std::fmt;
use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::auth::{AuthClient, AuthError};
use crate::token::TokenProvider;

const LD_JSON: &str = "application/ld+json";
const GRAPHQL_ENDPOINT: &str = "graphql";

#[derive(Debug, Error)]
pub enum GallyError {
    #[error("an error happened when fetching the \"{endpoint}\" API endpoint: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api endpoint \"{endpoint}\" returned {status}: {body}")]
    Api {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("api endpoint \"{endpoint}\" returned malformed json: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("graphql error: {0}")]
    GraphQl(String),
    #[error("entity {0} not found")]
    NotFound(String),
    #[error("identity {identity} is ambiguous: {candidates} remote candidates match")]
    AmbiguousIdentity { identity: String, candidates: usize },
    #[error("entity not managed by the {resource} repository: {reason}")]
    UnmanagedEntity {
        resource: &'static str,
        reason: String,
    },
    #[error("{0}")]
    StructuralPrecondition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Connection settings for a Gally instance.
#[derive(Clone)]
pub struct Configuration {
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub check_ssl: bool,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"***")
            .field("check_ssl", &self.check_ssl)
            .finish()
    }
}

/// Authenticated JSON-LD transport for the Gally REST and GraphQL API.
///
/// Every private call carries a bearer token from the shared [`TokenProvider`].
/// A `401` answer invalidates the token, fetches a new one and replays the
/// request exactly once.
#[derive(Clone)]
pub struct GallyClient {
    http: Client,
    base_url: Url,
    tokens: Arc<TokenProvider>,
}

impl GallyClient {
    pub fn new(configuration: &Configuration) -> Result<Self, GallyError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!configuration.check_ssl)
            .build()
            .map_err(|source| GallyError::Transport {
                endpoint: configuration.base_url.clone(),
                source,
            })?;
        let base_url = normalize_base_url(&configuration.base_url)?;
        let auth = AuthClient::with_http(
            http.clone(),
            base_url.clone(),
            &configuration.user,
            &configuration.password,
        );
        Ok(Self {
            http,
            base_url,
            tokens: Arc::new(TokenProvider::new(auth)),
        })
    }

    pub async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, GallyError> {
        self.query(Method::GET, endpoint, query, None, &[], true)
            .await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, GallyError> {
        self.query(Method::POST, endpoint, &[], Some(body), &[], true)
            .await
    }

    pub async fn put(&self, endpoint: &str, body: &Value) -> Result<Value, GallyError> {
        self.query(Method::PUT, endpoint, &[], Some(body), &[], true)
            .await
    }

    pub async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, GallyError> {
        self.query(Method::PATCH, endpoint, &[], Some(body), &[], true)
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), GallyError> {
        self.query(Method::DELETE, endpoint, &[], None, &[], true)
            .await?;
        Ok(())
    }

    pub async fn graphql(
        &self,
        query: &str,
        variables: Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, GallyError> {
        self.graphql_request(query, variables, headers, true).await
    }

    /// Same as [`GallyClient::graphql`] without the bearer token, for the
    /// public search schema.
    pub async fn public_graphql(
        &self,
        query: &str,
        variables: Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, GallyError> {
        self.graphql_request(query, variables, headers, false).await
    }

    async fn graphql_request(
        &self,
        query: &str,
        variables: Value,
        headers: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, GallyError> {
        let body = json!({ "query": query, "variables": variables });
        let mut all_headers = vec![
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
        ];
        all_headers.extend_from_slice(headers);
        let response = self
            .query(
                Method::POST,
                GRAPHQL_ENDPOINT,
                &[],
                Some(&body),
                &all_headers,
                authenticated,
            )
            .await?;
        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            return Err(GallyError::GraphQl(first_graphql_error(errors)));
        }
        Ok(response)
    }

    async fn query(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        headers: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, GallyError> {
        let mut url = self.endpoint(endpoint)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        let headers = build_headers(headers)?;
        let token = if authenticated {
            Some(self.tokens.valid_token().await?)
        } else {
            None
        };

        tracing::debug!(%method, %url, "sending gally request");
        let mut response = self
            .send(method.clone(), url.clone(), body, &headers, token.as_deref())
            .await
            .map_err(|source| transport_error(endpoint, source))?;

        if authenticated && response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(endpoint, "access token rejected, requesting a new one");
            let token = self.tokens.refresh_now().await?;
            response = self
                .send(method, url, body, &headers, Some(&token))
                .await
                .map_err(|source| transport_error(endpoint, source))?;
        }

        Self::handle_response(endpoint, response).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        headers: &HeaderMap,
        token: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.http.request(method, url).headers(headers.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        request.send().await
    }

    fn endpoint(&self, path: &str) -> Result<Url, GallyError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Value, GallyError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GallyError::NotFound(endpoint.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GallyError::Api {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| transport_error(endpoint, source))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|source| GallyError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl GallyError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            GallyError::Api { status, .. } => Some(classify_api_status(*status)),
            GallyError::Transport { .. } => Some(ApiErrorClass::Transient),
            GallyError::Authentication(_) => Some(ApiErrorClass::Auth),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn transport_error(endpoint: &str, source: reqwest::Error) -> GallyError {
    GallyError::Transport {
        endpoint: endpoint.to_string(),
        source,
    }
}

fn build_headers(extra: &[(&str, &str)]) -> Result<HeaderMap, GallyError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(LD_JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(LD_JSON));
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GallyError::InvalidHeader((*name).to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| GallyError::InvalidHeader(name.as_str().to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn first_graphql_error(errors: &[Value]) -> String {
    let Some(error) = errors.first() else {
        return "graphql request failed".to_string();
    };
    error
        .pointer("/extensions/debugMessage")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .unwrap_or("graphql request failed")
        .to_string()
}

/// The base url always ends with `/` so relative endpoints resolve below it
/// while absolute IRIs such as `/api/catalogs/1` replace the path.
pub(crate) fn normalize_base_url(base_url: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
}
