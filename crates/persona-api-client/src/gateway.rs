//! Authenticated request gateway.
//!
//! Every backend call goes through [`Gateway::send`]. The stored bearer token
//! is attached to the request; a 401 triggers exactly one refresh, and when a
//! new token comes back the identical request is issued once more. Any other
//! status is handed back untouched for the caller to inspect.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::token::{NoRefresh, TokenRefresher, TokenStore};

/// Request body that can be replayed for the retry.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Raw {
        content_type: String,
        data: Bytes,
    },
}

/// Re-issuable description of a backend request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, serde_json::Error> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// HTTP gateway to the admin backend with bearer auth and refresh-on-401.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    tokens: TokenStore,
    refresher: Arc<dyn TokenRefresher>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl Gateway {
    pub fn new(
        base_url: String,
        tokens: TokenStore,
        refresher: Arc<dyn TokenRefresher>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, base_url, tokens, refresher))
    }

    pub fn with_client(
        client: Client,
        base_url: String,
        tokens: TokenStore,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            refresher,
        }
    }

    /// Create a gateway from client configuration.
    ///
    /// Uses the OAuth refresher when the configuration allows it, otherwise a
    /// 401 simply clears the session.
    pub fn from_config(config: &persona_core::ClientConfig) -> Result<Self> {
        let refresher: Arc<dyn TokenRefresher> =
            match crate::refresh::OAuthRefresher::from_config(config)? {
                Some(oauth) => Arc::new(oauth),
                None => Arc::new(NoRefresh),
            };

        Self::new(
            config.api_base_url.clone(),
            TokenStore::new(config.access_token.clone()),
            refresher,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Raw client, shared with the storage upload leg.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request with bearer auth and a single refresh-and-retry on 401.
    ///
    /// Transport failures are returned as errors; every HTTP status, including
    /// 4xx and 5xx, comes back as `Ok(response)`.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, reqwest::Error> {
        self.with_auth_retry(|token| self.issue(request, token))
            .await
    }

    /// Run `attempt` with the stored token; on 401, refresh once and run it
    /// again with the new token.
    ///
    /// A refresh that yields no token clears the store and the original 401
    /// response is returned. The retried response is returned whatever its
    /// status.
    pub async fn with_auth_retry<F, Fut>(&self, mut attempt: F) -> Result<Response, reqwest::Error>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let response = attempt(self.tokens.get()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "Received 401, refreshing access token");

        let refreshed = match self.refresher.refresh().await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                None
            }
        };

        match refreshed {
            Some(token) => {
                self.tokens.set(token.clone());
                attempt(Some(token)).await
            }
            None => {
                tracing::warn!("No refreshed token available, clearing session");
                self.tokens.clear();
                Ok(response)
            }
        }
    }

    async fn issue(
        &self,
        request: &ApiRequest,
        token: Option<String>,
    ) -> Result<Response, reqwest::Error> {
        let mut headers = request.headers.clone();
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                // The stored token replaces any caller-supplied Authorization.
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access token is not a valid header value, sending without it"),
            }
        }

        let mut builder = self
            .client
            .request(request.method.clone(), self.build_url(&request.path))
            .headers(headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Raw { content_type, data } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };

        tracing::debug!(method = %request.method, path = %request.path, "Sending API request");
        builder.send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRefresh {
        token: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedRefresh {
        fn new(token: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                token,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for FixedRefresh {
        async fn refresh(&self) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.map(str::to_string))
        }
    }

    struct FailingRefresh;

    #[async_trait]
    impl TokenRefresher for FailingRefresh {
        async fn refresh(&self) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("identity provider unreachable"))
        }
    }

    fn gateway(url: String, token: Option<&str>, refresher: Arc<dyn TokenRefresher>) -> Gateway {
        Gateway::with_client(
            Client::new(),
            url,
            TokenStore::new(token.map(str::to_string)),
            refresher,
        )
    }

    #[tokio::test]
    async fn test_non_401_is_returned_unchanged() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/characters")
            .match_header("authorization", "Bearer old")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let refresher = FixedRefresh::new(Some("new"));
        let gw = gateway(server.url(), Some("old"), refresher.clone());

        let response = gw.send(&ApiRequest::get("/admin/characters")).await.unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(response.text().await.unwrap(), "boom");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gw.tokens().get().as_deref(), Some("old"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/plans")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        let gw = gateway(server.url(), None, Arc::new(NoRefresh));
        let response = gw.send(&ApiRequest::get("/admin/plans")).await.unwrap();
        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_with_refresh_retries_once_with_new_token() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/admin/gifts")
            .match_header("authorization", "Bearer old")
            .match_body(Matcher::Json(serde_json::json!({ "name": "rose" })))
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let retry = server
            .mock("POST", "/admin/gifts")
            .match_header("authorization", "Bearer new")
            .match_body(Matcher::Json(serde_json::json!({ "name": "rose" })))
            .with_status(422)
            .with_body(r#"{"error":{"message":"invalid"}}"#)
            .expect(1)
            .create_async()
            .await;

        let refresher = FixedRefresh::new(Some("new"));
        let gw = gateway(server.url(), Some("old"), refresher.clone());

        let request = ApiRequest::post("/admin/gifts")
            .json(&serde_json::json!({ "name": "rose" }))
            .unwrap();
        let response = gw.send(&request).await.unwrap();

        assert_eq!(response.status(), 422);
        assert_eq!(
            response.text().await.unwrap(),
            r#"{"error":{"message":"invalid"}}"#
        );
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.tokens().get().as_deref(), Some("new"));
        first.assert_async().await;
        retry.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_that_is_also_401_is_not_retried_again() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/logs")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let refresher = FixedRefresh::new(Some("new"));
        let gw = gateway(server.url(), Some("old"), refresher.clone());

        let response = gw.send(&ApiRequest::get("/admin/logs")).await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_without_refresh_clears_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/datasets")
            .with_status(401)
            .with_body("expired")
            .expect(1)
            .create_async()
            .await;

        let refresher = FixedRefresh::new(None);
        let gw = gateway(server.url(), Some("old"), refresher.clone());

        let response = gw.send(&ApiRequest::get("/admin/datasets")).await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(response.text().await.unwrap(), "expired");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.tokens().get(), None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_error_is_treated_as_no_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/prompts")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let gw = gateway(server.url(), Some("old"), Arc::new(FailingRefresh));
        let response = gw.send(&ApiRequest::get("/admin/prompts")).await.unwrap();
        assert_eq!(response.status(), 401);
        assert!(!gw.tokens().is_present());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stored_token_overwrites_caller_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/characters")
            .match_header("authorization", "Bearer stored")
            .match_header("x-trace", "1")
            .with_status(200)
            .create_async()
            .await;

        let gw = gateway(server.url(), Some("stored"), Arc::new(NoRefresh));
        let request = ApiRequest::get("/admin/characters")
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"))
            .header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("1"),
            );

        assert_eq!(gw.send(&request).await.unwrap().status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_caller_authorization_kept_without_stored_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/characters")
            .match_header("authorization", "Bearer caller")
            .with_status(200)
            .create_async()
            .await;

        let gw = gateway(server.url(), None, Arc::new(NoRefresh));
        let request = ApiRequest::get("/admin/characters")
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"));

        assert_eq!(gw.send(&request).await.unwrap().status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        // Nothing listens on port 9 of the loopback interface.
        let gw = gateway("http://127.0.0.1:9".to_string(), Some("old"), Arc::new(NoRefresh));
        assert!(gw.send(&ApiRequest::get("/admin/characters")).await.is_err());
    }

    #[tokio::test]
    async fn test_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/logs")
            .match_query(Matcher::UrlEncoded("level".into(), "error".into()))
            .with_status(200)
            .create_async()
            .await;

        let gw = gateway(format!("{}/", server.url()), None, Arc::new(NoRefresh));
        let request = ApiRequest::get("/admin/logs").query("level", "error");
        assert_eq!(gw.send(&request).await.unwrap().status(), 200);
        mock.assert_async().await;
    }
}
