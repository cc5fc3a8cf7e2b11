//! Access-token accessors.
//!
//! A turn receives one [`TokenProvider`] from its caller. Tools resolve it on
//! every invocation, so implementations should read an already established
//! session rather than perform a network round trip. Refreshing tokens is the
//! caller's business.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// OAuth scopes the tools need on the user's token.
pub const REQUIRED_SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
];

/// Zero-argument accessor for the current bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// `None` (or an empty string) means the user is not authenticated.
    async fn access_token(&self) -> Option<String>;
}

/// Shared handle passed into tools.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Fixed token, typically read once from the request's session.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token with a known expiry; yields nothing once expired.
#[derive(Debug, Clone)]
pub struct ExpiringToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl ExpiringToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[async_trait]
impl TokenProvider for ExpiringToken {
    async fn access_token(&self) -> Option<String> {
        if self.is_expired() {
            None
        } else {
            Some(self.token.clone())
        }
    }
}

/// Async closure accessor.
pub struct TokenFn<F>(F);

#[async_trait]
impl<F, Fut> TokenProvider for TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    async fn access_token(&self) -> Option<String> {
        (self.0)().await
    }
}

/// Sync closure accessor.
pub struct SyncTokenFn<F>(F);

#[async_trait]
impl<F> TokenProvider for SyncTokenFn<F>
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    async fn access_token(&self) -> Option<String> {
        (self.0)()
    }
}

/// Wrap an async closure as a shared provider.
pub fn token_fn<F, Fut>(f: F) -> SharedTokenProvider
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    Arc::new(TokenFn(f))
}

/// Wrap a sync closure as a shared provider.
pub fn sync_token_fn<F>(f: F) -> SharedTokenProvider
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    Arc::new(SyncTokenFn(f))
}

/// Resolve a provider, treating an empty token as absent.
pub(crate) async fn resolve(provider: &dyn TokenProvider) -> Option<String> {
    provider
        .access_token()
        .await
        .filter(|t| !t.trim().is_empty())
}
