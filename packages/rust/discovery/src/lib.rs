//! Lead discovery: web search and clinical-trial registry providers.
//!
//! Providers are traits ([`SearchProvider`], [`TrialsProvider`]) with one
//! implementation per vendor. The factory functions wrap every provider in a
//! caching decorator that also applies the retry policy and rate limiter, so
//! pipeline code never talks to a bare vendor client.

mod caching;
mod contacts;
mod search;
mod trials;

use async_trait::async_trait;
use leadscout_shared::{
    AppConfig, RateLimiter, Result, RetryPolicy, SearchHit, SearchProviderKind, TrialRecord,
    http, resolve_api_key,
};
use leadscout_storage::ResponseCache;

pub use caching::{CachingSearch, CachingTrials};
pub use contacts::{accepts_title, contact_query, find_decision_makers, parse_profile_hit};
pub use search::{BraveSearch, SerpApiSearch};
pub use trials::{ClinicalTrialsGov, normalize_phase, valid_nct_id};

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// A web search vendor.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short stable name, used in cache keys and logs.
    fn name(&self) -> &str;

    /// Web results for `query`, in the order the service ranked them.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Recent news results. Vendors without a news vertical fall back to web search.
    async fn search_news(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.search(query, max_results).await
    }
}

/// A clinical-trial registry.
#[async_trait]
pub trait TrialsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Trials matching `query`, in registry order. Records without a valid id are dropped.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<TrialRecord>>;
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Build the configured web search provider, wrapped with cache, retry and pacing.
pub fn build_search_provider(
    config: &AppConfig,
    cache: ResponseCache,
) -> Result<Box<dyn SearchProvider>> {
    let api_key = resolve_api_key(config.search.api_key_env())?;
    let client = http::build_client(http::DEFAULT_TIMEOUT_SECS)?;
    let base_url = config.search.base_url.clone();

    let inner: Box<dyn SearchProvider> = match config.search.provider {
        SearchProviderKind::SerpApi => Box::new(SerpApiSearch::new(client, api_key, base_url)),
        SearchProviderKind::Brave => Box::new(BraveSearch::new(client, api_key, base_url)),
    };

    Ok(Box::new(CachingSearch::new(
        inner,
        cache,
        RetryPolicy::from_config(&config.retry),
        RateLimiter::per_minute(config.rate_limit.calls_per_minute),
    )))
}

/// Build the clinical-trials provider, wrapped with cache, retry and pacing.
pub fn build_trials_provider(
    config: &AppConfig,
    cache: ResponseCache,
) -> Result<Box<dyn TrialsProvider>> {
    let client = http::build_client(http::DEFAULT_TIMEOUT_SECS)?;
    let inner = ClinicalTrialsGov::new(
        client,
        config.trials.base_url.clone(),
        config.trials.status_filter.clone(),
    );

    Ok(Box::new(CachingTrials::new(
        Box::new(inner),
        cache,
        RetryPolicy::from_config(&config.retry),
        RateLimiter::per_minute(config.rate_limit.calls_per_minute),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_factory_requires_key() {
        let mut config = AppConfig::default();
        config.search.api_key_env = Some("LS_TEST_NO_SUCH_SEARCH_KEY_5521".into());
        let err = build_search_provider(&config, ResponseCache::disabled())
            .err()
            .expect("missing key must fail");
        assert!(err.to_string().contains("LS_TEST_NO_SUCH_SEARCH_KEY_5521"));
    }

    #[test]
    fn trials_factory_needs_no_key() {
        let provider = build_trials_provider(&AppConfig::default(), ResponseCache::disabled())
            .expect("trials provider");
        assert_eq!(provider.name(), "clinicaltrials");
    }
}
