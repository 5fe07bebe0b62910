//! OAuth2 token refresh
//!
//! The interactive login runs outside this crate; adapters receive an access
//! token and a refresh token. This module keeps the pair fresh by running the
//! refresh-token exchange through the `oauth2` crate.

use oauth2::{basic::BasicClient, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ProviderError;
use crate::config::{HttpConfig, OneDriveSettings};

/// Client with only the token endpoint set (v5 typestates)
type RefreshClient = BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Seconds before expiry at which a token already counts as expired
const EXPIRY_SKEW_SECS: i64 = 300;

/// Simple error wrapper for the oauth2 HTTP client adapter.
#[derive(Debug)]
struct OAuth2TransportError(String);

impl std::fmt::Display for OAuth2TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OAuth2TransportError {}

/// Async HTTP client adapter for oauth2 v5.
/// Bridges reqwest 0.13 with oauth2's `AsyncHttpClient` trait, since the
/// crate's built-in reqwest support targets 0.12.
struct OAuth2HttpClient {
    client: reqwest::Client,
}

impl<'c> oauth2::AsyncHttpClient<'c> for OAuth2HttpClient {
    type Error = oauth2::HttpClientError<OAuth2TransportError>;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<oauth2::HttpResponse, Self::Error>> + Send + Sync + 'c>,
    >;

    fn call(&'c self, request: oauth2::HttpRequest) -> Self::Future {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
                .unwrap_or(reqwest::Method::POST);
            let url = request.uri().to_string();

            let mut builder = self.client.request(method, &url);
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_bytes());
            }
            builder = builder.body(request.into_body());

            let response = builder
                .send()
                .await
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))?;

            let status_code = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))?;

            let mut http_response = http::Response::builder()
                .status(http::StatusCode::from_u16(status_code).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR));
            for (name, value) in headers.iter() {
                http_response = http_response.header(name.as_str(), value.as_bytes());
            }
            http_response
                .body(body.to_vec())
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))
        })
    }
}

/// OAuth2 token pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp
    pub expires_at: Option<i64>,
}

impl StoredTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, expires_in: Option<u64>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in.map(|secs| chrono::Utc::now().timestamp() + secs as i64),
        }
    }

    /// Check if token is expired (with 5 min buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= chrono::Utc::now().timestamp() + EXPIRY_SKEW_SECS,
            None => false,
        }
    }
}

/// Runs refresh-token exchanges against one token endpoint
pub struct TokenRefresher {
    client: RefreshClient,
    http: OAuth2HttpClient,
}

impl TokenRefresher {
    pub fn new(settings: &OneDriveSettings, http: &HttpConfig) -> Result<Self, ProviderError> {
        let token_url = TokenUrl::new(settings.token_url.clone())
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid token URL: {}", e)))?;

        let mut client = BasicClient::new(ClientId::new(settings.client_id.clone())).set_token_uri(token_url);
        if let Some(ref secret) = settings.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http: OAuth2HttpClient { client: http_client },
        })
    }

    /// Exchange `refresh_token` for a new pair. Servers that do not rotate the
    /// refresh token get the old one carried over.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredTokens, ProviderError> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::AuthExpired {
                message: "Access token expired".to_string(),
                refresh_failure: Some(e.to_string()),
            })?;

        let tokens = StoredTokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: token_result
                .expires_in()
                .map(|d| chrono::Utc::now().timestamp() + d.as_secs() as i64),
        };

        tracing::info!("[OAuth2] Tokens refreshed");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn test_is_expired_uses_skew() {
        let now = chrono::Utc::now().timestamp();
        let mut tokens = StoredTokens::new("a", None, None);
        assert!(!tokens.is_expired());

        tokens.expires_at = Some(now + 60);
        assert!(tokens.is_expired());

        tokens.expires_at = Some(now + 3600);
        assert!(!tokens.is_expired());
    }

    async fn token_endpoint(body: serde_json::Value) -> String {
        let app = Router::new().route("/token", post(move || async move { Json(body) }));
        format!("{}/token", serve(app).await)
    }

    fn settings(token_url: String) -> OneDriveSettings {
        OneDriveSettings {
            client_id: "client".to_string(),
            token_url,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token() {
        let url = token_endpoint(serde_json::json!({
            "access_token": "fresh",
            "token_type": "bearer",
            "expires_in": 3600
        }))
        .await;
        let refresher = TokenRefresher::new(&settings(url), &HttpConfig::default()).unwrap();

        let tokens = refresher.refresh("old-refresh").await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_auth_expired() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "invalid_grant"})),
                )
            }),
        );
        let url = format!("{}/token", serve(app).await);
        let refresher = TokenRefresher::new(&settings(url), &HttpConfig::default()).unwrap();

        match refresher.refresh("revoked").await {
            Err(ProviderError::AuthExpired { refresh_failure, .. }) => assert!(refresh_failure.is_some()),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
