//! Google Gemini `generateContent`.

use async_trait::async_trait;
use leadscout_shared::{LeadScoutError, Result, http};
use reqwest::Client;
use serde_json::{Value, json};

use crate::{LanguageModel, ModelRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl GeminiModel {
    pub fn new(
        client: Client,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            max_tokens,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
        let body = json!({
            "systemInstruction": {"parts": [{"text": request.system}]},
            "contents": [{"role": "user", "parts": [{"text": request.user}]}],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error("gemini", e))?;
        let reply = http::read_json("gemini", response).await?;

        let text: String = reply
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LeadScoutError::provider("gemini", "empty completion"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"ok\": "}, {"text": "true}"}]}}]
            })))
            .mount(&server)
            .await;

        let model = GeminiModel::new(
            http::build_client(5).unwrap(),
            "g-key".into(),
            "gemini-test".into(),
            100,
            Some(server.uri()),
        );
        let text = model
            .generate(&ModelRequest {
                system: "s",
                user: "u",
                temperature: 0.3,
            })
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\": true}");
    }
}
