//! Access token state and the refresh seam.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// In-memory holder for the current bearer token.
///
/// Cloning yields another handle to the same token. Only `set` and `clear`
/// mutate it.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.filter(|t| !t.is_empty()))),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("present", &self.is_present())
            .finish()
    }
}

/// Obtains a new access token after the backend rejected the current one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `Ok(None)` means the session cannot be renewed.
    async fn refresh(&self) -> anyhow::Result<Option<String>>;
}

/// Refresher for sessions that cannot be renewed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
