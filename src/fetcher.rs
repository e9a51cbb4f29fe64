use async_trait::async_trait;
use std::future::Future;

use crate::error::FetchError;

/// Pluggable transport for loading a value by key.
///
/// The cache is agnostic to what a key means or where the value comes from
/// (HTTP, a database, local computation). It only requires that concurrent
/// fetches for the same key can safely share one invocation's result.
#[async_trait]
pub trait Fetcher<V>: Send + Sync {
    /// Load the value for `key`. Errors are recorded on the entry and never
    /// propagated to observers as exceptions.
    async fn fetch(&self, key: &str) -> Result<V, FetchError>;
}

/// Adapter turning an async closure into a [`Fetcher`].
///
/// # Example
/// ```ignore
/// let fetcher = FnFetcher::new(|key: String| async move {
///     http_get_json(&key).await.map_err(|e| FetchError::new(e.to_string()))
/// });
/// ```
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F> {
    /// Wrap an async closure. The closure receives the key being fetched.
    pub fn new(f: F) -> Self {
        FnFetcher { f }
    }
}

#[async_trait]
impl<V, F, Fut> Fetcher<V> for FnFetcher<F>
where
    V: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, FetchError>> + Send,
{
    async fn fetch(&self, key: &str) -> Result<V, FetchError> {
        (self.f)(key.to_string()).await
    }
}
