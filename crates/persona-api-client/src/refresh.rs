//! Token refreshers.
//!
//! [`OAuthRefresher`] performs an OAuth 2.0 `refresh_token` grant.
//! [`SingleFlight`] wraps any refresher so that concurrent 401s share one
//! in-flight refresh instead of each starting their own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::token::TokenRefresher;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth 2.0 refresh grant against a token endpoint.
pub struct OAuthRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    refresh_token: Mutex<String>,
}

impl OAuthRefresher {
    pub fn new(token_url: String, client_id: String, refresh_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client for token refresh")?;

        Ok(Self::with_client(client, token_url, client_id, refresh_token))
    }

    pub fn with_client(
        client: reqwest::Client,
        token_url: String,
        client_id: String,
        refresh_token: String,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            refresh_token: Mutex::new(refresh_token),
        }
    }

    /// Build a refresher from configuration, if it carries a token URL and refresh token.
    pub fn from_config(config: &persona_core::ClientConfig) -> Result<Option<Self>> {
        match (&config.oauth_token_url, &config.refresh_token) {
            (Some(url), Some(token)) => Ok(Some(Self::new(
                url.clone(),
                config.oauth_client_id.clone(),
                token.clone(),
            )?)),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for OAuthRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRefresher")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self) -> Result<Option<String>> {
        let refresh_token = self.refresh_token.lock().clone();

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            // invalid_grant: the refresh token is expired or revoked
            tracing::warn!(status = status.as_u16(), "Refresh token rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Token refresh failed with status {}: {}",
                status,
                error_text
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        if let Some(rotated) = body.refresh_token {
            *self.refresh_token.lock() = rotated;
        }

        tracing::debug!("Access token refreshed");
        Ok(Some(body.access_token).filter(|t| !t.is_empty()))
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Coalesces concurrent refreshes into one shared call.
pub struct SingleFlight<R> {
    inner: Arc<R>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl<R: TokenRefresher + 'static> SingleFlight<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Arc::new(inner),
            in_flight: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<R: TokenRefresher + 'static> TokenRefresher for SingleFlight<R> {
    async fn refresh(&self) -> Result<Option<String>> {
        let flight = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight = async move {
                        match inner.refresh().await {
                            Ok(token) => token,
                            Err(e) => {
                                tracing::warn!(error = %e, "Token refresh failed");
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let token = flight.clone().await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        Ok(token)
    }
}
