//! Short-lived cache over a [`ModelCatalog`].
//!
//! Routing consults the local model list on every call that reaches the
//! live-catalog rule. The list is fetched at most once per TTL; failed
//! fetches are not cached so the next call tries again.

use super::{ModelCatalog, ProviderError};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

pub struct CachedCatalog {
    inner: Arc<dyn ModelCatalog>,
    cache: Cache<(), Arc<Vec<String>>>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn ModelCatalog>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self { inner, cache }
    }

    /// Current model list, fetched if the cached copy is missing or stale.
    pub async fn models(&self) -> Result<Arc<Vec<String>>, Arc<ProviderError>> {
        let inner = Arc::clone(&self.inner);
        self.cache
            .try_get_with((), async move { inner.list_models().await.map(Arc::new) })
            .await
    }

    /// Drop the cached list.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for CachedCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCatalog")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ModelCatalog for CountingCatalog {
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(ProviderError::HttpError("connection refused".into()));
            }
            Ok(vec!["qwen3:4b".to_string()])
        }
    }

    #[tokio::test]
    async fn test_list_is_cached() {
        let catalog = Arc::new(CountingCatalog {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let cached = CachedCatalog::new(catalog.clone(), Duration::from_secs(60));

        assert_eq!(cached.models().await.unwrap().as_slice(), ["qwen3:4b"]);
        assert_eq!(cached.models().await.unwrap().as_slice(), ["qwen3:4b"]);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

        cached.invalidate();
        cached.models().await.unwrap();
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let catalog = Arc::new(CountingCatalog {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let cached = CachedCatalog::new(catalog.clone(), Duration::from_secs(60));

        assert!(cached.models().await.is_err());
        assert!(cached.models().await.is_ok());
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }
}
