//! Web search vendors.

use async_trait::async_trait;
use leadscout_shared::{LeadScoutError, Result, SearchHit, http};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::SearchProvider;

const SERPAPI_URL: &str = "https://serpapi.com/search";
const BRAVE_URL: &str = "https://api.search.brave.com/res/v1";

/// Brave rejects `count` above this.
const BRAVE_MAX_COUNT: usize = 20;

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().trim().to_string()
}

/// Collect hits from an array of result objects, skipping entries without a title or link.
fn collect_hits(
    items: Option<&Value>,
    link_key: &str,
    snippet_key: &str,
    source: impl Fn(&Value) -> Option<String>,
    max_results: usize,
) -> Vec<SearchHit> {
    items
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let title = str_field(item, "title");
                    let link = str_field(item, link_key);
                    if title.is_empty() || link.is_empty() {
                        return None;
                    }
                    Some(SearchHit {
                        title,
                        link,
                        snippet: str_field(item, snippet_key),
                        source: source(item),
                    })
                })
                .take(max_results)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// SerpAPI
// ---------------------------------------------------------------------------

/// Google results via SerpAPI.
pub struct SerpApiSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiSearch {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| SERPAPI_URL.to_string()),
        }
    }

    async fn fetch(&self, query: &str, max_results: usize, news: bool) -> Result<Value> {
        let num = max_results.to_string();
        let mut params = vec![
            ("engine", "google"),
            ("q", query),
            ("api_key", self.api_key.as_str()),
            ("num", num.as_str()),
        ];
        if news {
            params.push(("tbm", "nws"));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| http::send_error("serpapi", e))?;
        let body = http::read_json("serpapi", response).await?;

        // SerpAPI reports "no results" as an error string on a 200.
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            if err.contains("hasn't returned any results") {
                debug!(query, "serpapi returned no results");
                return Ok(Value::Null);
            }
            return Err(LeadScoutError::provider("serpapi", err.to_string()));
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    #[instrument(skip_all, fields(provider = "serpapi", query = %query))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = self.fetch(query, max_results, false).await?;
        Ok(collect_hits(
            body.get("organic_results"),
            "link",
            "snippet",
            |item| item.get("source").and_then(Value::as_str).map(String::from),
            max_results,
        ))
    }

    #[instrument(skip_all, fields(provider = "serpapi", query = %query))]
    async fn search_news(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = self.fetch(query, max_results, true).await?;
        Ok(collect_hits(
            body.get("news_results"),
            "link",
            "snippet",
            |item| match item.get("source") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
                None => None,
            },
            max_results,
        ))
    }
}

// ---------------------------------------------------------------------------
// Brave Search
// ---------------------------------------------------------------------------

/// Brave Search API.
pub struct BraveSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl BraveSearch {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| BRAVE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn fetch(&self, endpoint: &str, query: &str, max_results: usize) -> Result<Value> {
        let count = max_results.clamp(1, BRAVE_MAX_COUNT).to_string();
        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| http::send_error("brave", e))?;
        http::read_json("brave", response).await
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    #[instrument(skip_all, fields(provider = "brave", query = %query))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = self.fetch("web/search", query, max_results).await?;
        Ok(collect_hits(
            body.get("web").and_then(|w| w.get("results")),
            "url",
            "description",
            |item| {
                item.get("profile")
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .map(String::from)
            },
            max_results,
        ))
    }

    #[instrument(skip_all, fields(provider = "brave", query = %query))]
    async fn search_news(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = self.fetch("news/search", query, max_results).await?;
        Ok(collect_hits(
            body.get("results"),
            "url",
            "description",
            |item| {
                item.get("meta_url")
                    .and_then(|m| m.get("hostname"))
                    .and_then(Value::as_str)
                    .map(String::from)
            },
            max_results,
        ))
    }
}
