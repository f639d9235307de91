//! HTTP client construction and response classification shared by all providers.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{LeadScoutError, Result};

/// Maximum number of redirects any provider call follows.
const MAX_REDIRECTS: usize = 3;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response size we accept from a provider (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for outbound requests.
pub const USER_AGENT: &str = concat!("LeadScout/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with the workspace's standard settings.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LeadScoutError::config(format!("failed to build HTTP client: {e}")))
}

/// Classify a reqwest send error. Timeouts and connection failures are transient.
pub fn send_error(provider: &str, err: reqwest::Error) -> LeadScoutError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        LeadScoutError::transient(provider, err.to_string())
    } else {
        LeadScoutError::provider(provider, err.to_string())
    }
}

/// Check the status, enforce the size cap and parse the body as JSON.
pub async fn read_json(provider: &str, response: Response) -> Result<serde_json::Value> {
    let status = response.status();
    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(LeadScoutError::provider(
                provider,
                format!("response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"),
            ));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| send_error(provider, e))?;

    if !status.is_success() {
        return Err(LeadScoutError::from_status(provider, status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| LeadScoutError::provider(provider, format!("malformed response body: {e}")))
}
