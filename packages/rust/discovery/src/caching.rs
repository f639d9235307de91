//! Caching decorators that also apply retry and rate limiting.

use std::future::Future;

use async_trait::async_trait;
use leadscout_shared::{RateLimiter, Result, RetryPolicy, SearchHit, TrialRecord};
use leadscout_storage::{ResponseCache, fingerprint, normalize_query};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{SearchProvider, TrialsProvider};

/// Cache, retry and pacing shared by both decorators.
struct CallGuard {
    cache: ResponseCache,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

impl CallGuard {
    /// Serve from cache, or run `call` under retry and pacing and cache the success.
    async fn run<T, F, Fut>(&self, provider: &str, key: String, operation: &str, call: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(payload) = self.cache.get(&key).await {
            match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    debug!(provider, operation, "served from cache");
                    return Ok(value);
                }
                Err(e) => warn!(provider, error = %e, "discarding unreadable cache entry"),
            }
        }

        let call = &call;
        let value = self
            .retry
            .run(operation, || async move {
                self.limiter.acquire().await;
                call().await
            })
            .await?;

        if let Ok(payload) = serde_json::to_string(&value) {
            self.cache.put(&key, provider, &payload).await;
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// CachingSearch
// ---------------------------------------------------------------------------

/// Wraps a [`SearchProvider`]; cache key = provider + vertical + normalized query + max results.
pub struct CachingSearch {
    inner: Box<dyn SearchProvider>,
    guard: CallGuard,
}

impl CachingSearch {
    pub fn new(
        inner: Box<dyn SearchProvider>,
        cache: ResponseCache,
        retry: RetryPolicy,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            inner,
            guard: CallGuard {
                cache,
                retry,
                limiter,
            },
        }
    }

    fn key(&self, vertical: &str, query: &str, max_results: usize) -> String {
        fingerprint(&[
            self.inner.name(),
            vertical,
            &normalize_query(query),
            &max_results.to_string(),
        ])
    }
}

#[async_trait]
impl SearchProvider for CachingSearch {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let key = self.key("web", query, max_results);
        let operation = format!("{} search", self.inner.name());
        self.guard
            .run(self.inner.name(), key, &operation, || {
                self.inner.search(query, max_results)
            })
            .await
    }

    async fn search_news(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let key = self.key("news", query, max_results);
        let operation = format!("{} news search", self.inner.name());
        self.guard
            .run(self.inner.name(), key, &operation, || {
                self.inner.search_news(query, max_results)
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// CachingTrials
// ---------------------------------------------------------------------------

/// Wraps a [`TrialsProvider`]; cache key = provider + normalized query + max results.
pub struct CachingTrials {
    inner: Box<dyn TrialsProvider>,
    guard: CallGuard,
}

impl CachingTrials {
    pub fn new(
        inner: Box<dyn TrialsProvider>,
        cache: ResponseCache,
        retry: RetryPolicy,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            inner,
            guard: CallGuard {
                cache,
                retry,
                limiter,
            },
        }
    }
}

#[async_trait]
impl TrialsProvider for CachingTrials {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<TrialRecord>> {
        let key = fingerprint(&[
            self.inner.name(),
            &normalize_query(query),
            &max_results.to_string(),
        ]);
        let operation = format!("{} search", self.inner.name());
        self.guard
            .run(self.inner.name(), key, &operation, || {
                self.inner.search(query, max_results)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use leadscout_shared::LeadScoutError;
    use leadscout_storage::Storage;

    use super::*;

    /// Fails transiently `fail_first` times, then returns one hit per call.
    struct Flaky {
        calls: Arc<AtomicU32>,
        fail_first: u32,
        permanent: bool,
    }

    #[async_trait]
    impl SearchProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchHit>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.permanent {
                return Err(LeadScoutError::provider("flaky", "HTTP 403"));
            }
            if n <= self.fail_first {
                return Err(LeadScoutError::transient("flaky", "HTTP 502"));
            }
            Ok(vec![SearchHit {
                title: format!("{query} #{n}"),
                link: "https://example.com".into(),
                snippet: String::new(),
                source: None,
            }])
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    async fn cache() -> ResponseCache {
        let path = std::env::temp_dir().join(format!("ls_disc_{}.db", uuid::Uuid::now_v7()));
        let store = Storage::open(&path).await.expect("open cache db");
        ResponseCache::new(Some(Arc::new(store)), Duration::from_secs(3600))
    }

    fn wrap(calls: &Arc<AtomicU32>, fail_first: u32, permanent: bool, cache: ResponseCache) -> CachingSearch {
        CachingSearch::new(
            Box::new(Flaky {
                calls: calls.clone(),
                fail_first,
                permanent,
            }),
            cache,
            fast_retry(),
            RateLimiter::unlimited(),
        )
    }

    #[tokio::test]
    async fn second_identical_query_is_served_from_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = wrap(&calls, 0, false, cache().await);

        let first = provider.search("Obesity  Assets", 10).await.expect("first");
        let second = provider.search("obesity assets", 10).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.search("obesity assets", 20).await.expect("different max");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = wrap(&calls, 2, false, ResponseCache::disabled());

        let hits = provider.search("nash", 5).await.expect("third attempt succeeds");
        assert_eq!(hits[0].title, "nash #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_not_retried_or_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = wrap(&calls, 0, true, cache().await);

        assert!(provider.search("nash", 5).await.is_err());
        assert!(provider.search("nash", 5).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_typed_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = wrap(&calls, 10, false, ResponseCache::disabled());

        let err = provider.search("nash", 5).await.unwrap_err();
        assert!(matches!(err, LeadScoutError::RetriesExhausted { attempts: 3, .. }));
    }
}
