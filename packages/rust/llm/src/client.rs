//! Retrying, caching front end over a [`LanguageModel`].

use leadscout_shared::{AppConfig, LeadScoutError, RateLimiter, Result, RetryPolicy};
use leadscout_storage::{ResponseCache, fingerprint};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::json::ResponseSchema;
use crate::{LanguageModel, ModelRequest, build_model};

/// A structured prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Deterministic prompts are cached; drafting prompts are not.
    pub cacheable: bool,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            cacheable: true,
        }
    }

    /// Never served from or stored in the cache.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// Language-model client used by the pipeline.
pub struct LlmClient {
    model: Box<dyn LanguageModel>,
    cache: ResponseCache,
    retry: RetryPolicy,
    limiter: RateLimiter,
    temperature: f32,
}

impl LlmClient {
    pub fn new(
        model: Box<dyn LanguageModel>,
        cache: ResponseCache,
        retry: RetryPolicy,
        limiter: RateLimiter,
        temperature: f32,
    ) -> Self {
        Self {
            model,
            cache,
            retry,
            limiter,
            temperature,
        }
    }

    /// Build from application config: vendor factory, retry policy and pacing.
    pub fn from_config(config: &AppConfig, cache: ResponseCache) -> Result<Self> {
        Ok(Self::new(
            build_model(&config.llm)?,
            cache,
            RetryPolicy::from_config(&config.retry),
            RateLimiter::per_minute(config.rate_limit.calls_per_minute),
            config.llm.temperature,
        ))
    }

    pub fn provider(&self) -> &str {
        self.model.provider()
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    fn cache_key(&self, prompt: &Prompt, schema_tag: &str) -> String {
        fingerprint(&[
            self.model.provider(),
            self.model.model(),
            &prompt.system,
            &prompt.user,
            schema_tag,
        ])
    }

    /// One vendor call under retry and pacing, bypassing the cache.
    async fn call(&self, system: &str, user: &str) -> Result<String> {
        let request = ModelRequest {
            system,
            user,
            temperature: self.temperature,
        };
        let request = &request;
        let operation = format!("{} completion", self.model.provider());
        self.retry
            .run(&operation, || async move {
                self.limiter.acquire().await;
                self.model.generate(request).await
            })
            .await
    }

    /// Free-text completion.
    #[instrument(skip_all, fields(provider = self.model.provider(), cacheable = prompt.cacheable))]
    pub async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let key = prompt.cacheable.then(|| self.cache_key(prompt, "text"));
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                debug!("completion served from cache");
                return Ok(hit);
            }
        }

        let text = self.call(&prompt.system, &prompt.user).await?;

        if let Some(key) = &key {
            self.cache.put(key, self.model.provider(), &text).await;
        }
        Ok(text)
    }

    /// JSON completion checked against `schema`.
    ///
    /// A reply that does not parse or match the schema gets one corrective
    /// retry; a second failure is an [`LeadScoutError::Extraction`].
    /// Only validated replies are cached.
    pub async fn complete_json(&self, prompt: &Prompt, schema: &ResponseSchema) -> Result<Value> {
        self.complete_decoded(prompt, schema, Ok).await
    }

    /// JSON completion deserialized into `T`.
    ///
    /// A reply whose fields do not deserialize into `T` counts as unusable,
    /// so it gets the same corrective retry and is never cached.
    pub async fn complete_as<T: DeserializeOwned>(
        &self,
        prompt: &Prompt,
        schema: &ResponseSchema,
    ) -> Result<T> {
        self.complete_decoded(prompt, schema, |value| {
            serde_json::from_value(value).map_err(|e| format!("unexpected reply structure: {e}"))
        })
        .await
    }

    /// Parse, schema-check and decode one reply text.
    fn accept<T>(
        schema: &ResponseSchema,
        text: &str,
        decode: &impl Fn(Value) -> std::result::Result<T, String>,
    ) -> std::result::Result<T, String> {
        schema.parse(text).and_then(decode)
    }

    #[instrument(skip_all, fields(provider = self.model.provider(), cacheable = prompt.cacheable))]
    async fn complete_decoded<T>(
        &self,
        prompt: &Prompt,
        schema: &ResponseSchema,
        decode: impl Fn(Value) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let system = format!("{}\n\n{}", prompt.system, schema.instruction());
        let key = prompt.cacheable.then(|| self.cache_key(prompt, &schema.instruction()));

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                match Self::accept(schema, &hit, &decode) {
                    Ok(decoded) => {
                        debug!("json completion served from cache");
                        return Ok(decoded);
                    }
                    Err(reason) => debug!(%reason, "cached reply unusable, calling the model"),
                }
            }
        }

        let first = self.call(&system, &prompt.user).await?;
        let (text, decoded) = match Self::accept(schema, &first, &decode) {
            Ok(decoded) => (first, decoded),
            Err(reason) => {
                warn!(%reason, "model reply unusable, asking again");
                let corrective = format!(
                    "{}\n\nYour previous reply could not be used ({reason}). {}",
                    prompt.user,
                    schema.instruction()
                );
                let second = self.call(&system, &corrective).await?;
                match Self::accept(schema, &second, &decode) {
                    Ok(decoded) => (second, decoded),
                    Err(reason) => {
                        return Err(LeadScoutError::extraction(format!(
                            "{} reply rejected twice: {reason}",
                            self.model.provider()
                        )));
                    }
                }
            }
        };

        if let Some(key) = &key {
            self.cache.put(key, self.model.provider(), &text).await;
        }
        Ok(decoded)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use leadscout_storage::Storage;

    use super::*;

    /// Replays canned replies and records every user prompt it saw.
    pub(crate) struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        pub(crate) seen: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        pub(crate) fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        fn provider(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "test-model"
        }
        async fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
            self.seen.lock().unwrap().push(request.user.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LeadScoutError::provider("scripted", "script exhausted")))
        }
    }

    fn client(model: Scripted, cache: ResponseCache) -> LlmClient {
        LlmClient::new(
            Box::new(model),
            cache,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            RateLimiter::unlimited(),
            0.2,
        )
    }

    async fn cache() -> ResponseCache {
        let path = std::env::temp_dir().join(format!("ls_llm_{}.db", uuid::Uuid::now_v7()));
        let store = Storage::open(&path).await.expect("open");
        ResponseCache::new(Some(Arc::new(store)), Duration::from_secs(3600))
    }

    fn score_schema() -> ResponseSchema {
        ResponseSchema::object(&["fit_score", "reason"], r#"{"fit_score": 0-100, "reason": "..."}"#)
    }

    #[tokio::test]
    async fn corrective_retry_recovers() {
        let model = Scripted::new(vec![
            Ok("I think it's a good fit!".into()),
            Ok("```json\n{\"fit_score\": 72, \"reason\": \"terminated phase 2\"}\n```".into()),
        ]);
        let seen = model.seen.clone();
        let llm = client(model, ResponseCache::disabled());

        let value = llm
            .complete_json(&Prompt::new("score", "Acme Bio"), &score_schema())
            .await
            .expect("second reply parses");
        assert_eq!(value["fit_score"], 72);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].contains("could not be used"));
    }

    #[tokio::test]
    async fn two_bad_replies_is_extraction_error() {
        let model = Scripted::new(vec![Ok("nope".into()), Ok("{\"fit_score\": 5}".into())]);
        let llm = client(model, ResponseCache::disabled());

        let err = llm
            .complete_json(&Prompt::new("score", "Acme Bio"), &score_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadScoutError::Extraction { .. }));
    }

    #[tokio::test]
    async fn transient_vendor_errors_are_retried() {
        let model = Scripted::new(vec![
            Err(LeadScoutError::transient("scripted", "HTTP 529")),
            Ok("hello".into()),
        ]);
        let llm = client(model, ResponseCache::disabled());
        assert_eq!(llm.complete(&Prompt::new("s", "u")).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn deterministic_prompts_hit_cache_drafts_do_not() {
        let model = Scripted::new(vec![
            Ok("[\"obesity licensing\"]".into()),
            Ok("draft one".into()),
            Ok("draft two".into()),
        ]);
        let seen = model.seen.clone();
        let llm = client(model, cache().await);
        let schema = ResponseSchema::array(&[], "[\"query\", ...]");

        let prompt = Prompt::new("expand", "obesity");
        let a = llm.complete_json(&prompt, &schema).await.unwrap();
        let b = llm.complete_json(&prompt, &schema).await.unwrap();
        assert_eq!(a, b);

        let draft = Prompt::new("draft", "Maria").uncached();
        assert_eq!(llm.complete(&draft).await.unwrap(), "draft one");
        assert_eq!(llm.complete(&draft).await.unwrap(), "draft two");

        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[derive(Debug, serde::Deserialize)]
    struct TypedScore {
        fit_score: f64,
        reason: String,
    }

    #[tokio::test]
    async fn mistyped_reply_gets_corrective_retry_and_is_not_cached() {
        let model = Scripted::new(vec![
            Ok(r#"{"fit_score": "high", "reason": "x"}"#.into()),
            Ok(r#"{"fit_score": 64, "reason": "terminated trial"}"#.into()),
        ]);
        let seen = model.seen.clone();
        let llm = client(model, cache().await);
        let prompt = Prompt::new("score", "Helix Therapeutics");

        let first: TypedScore = llm.complete_as(&prompt, &score_schema()).await.unwrap();
        assert_eq!(first.fit_score, 64.0);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(seen.lock().unwrap()[1].contains("could not be used"));

        // The valid second reply is what got cached.
        let again: TypedScore = llm.complete_as(&prompt, &score_schema()).await.unwrap();
        assert_eq!(again.reason, "terminated trial");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unusable_cache_entry_is_replaced() {
        let store = cache().await;
        let llm = client(
            Scripted::new(vec![Ok(r#"{"fit_score": 80, "reason": "fresh"}"#.into())]),
            store.clone(),
        );
        let prompt = Prompt::new("score", "Northwind Bio");
        let key = llm.cache_key(&prompt, &score_schema().instruction());
        store
            .put(&key, "scripted", r#"{"fit_score": "high", "reason": "stale"}"#)
            .await;

        let score: TypedScore = llm.complete_as(&prompt, &score_schema()).await.unwrap();
        assert_eq!(score.reason, "fresh");
    }

    #[tokio::test]
    async fn complete_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Score {
            fit_score: i64,
            reason: String,
        }
        let model = Scripted::new(vec![Ok(r#"{"fit_score": 140, "reason": "x"}"#.into())]);
        let llm = client(model, ResponseCache::disabled());
        let score: Score = llm
            .complete_as(&Prompt::new("s", "u"), &score_schema())
            .await
            .unwrap();
        assert_eq!(score.fit_score, 140);
        assert_eq!(score.reason, "x");
    }
}
