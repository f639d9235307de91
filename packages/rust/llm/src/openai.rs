//! OpenAI-compatible chat completions (OpenAI, OpenRouter).

use async_trait::async_trait;
use leadscout_shared::{LeadScoutError, Result, http};
use reqwest::Client;
use serde_json::{Value, json};

use crate::{LanguageModel, ModelRequest};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiCompatibleModel {
    client: Client,
    provider: &'static str,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl OpenAiCompatibleModel {
    fn build(
        provider: &'static str,
        default_base: &str,
        client: Client,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            provider,
            api_key,
            model,
            max_tokens,
            base_url: base_url
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn openai(
        client: Client,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Self {
        Self::build("openai", OPENAI_BASE_URL, client, api_key, model, max_tokens, base_url)
    }

    pub fn openrouter(
        client: Client,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Self {
        Self::build(
            "openrouter",
            OPENROUTER_BASE_URL,
            client,
            api_key,
            model,
            max_tokens,
            base_url,
        )
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(self.provider, e))?;
        let reply = http::read_json(self.provider, response).await?;

        reply
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(String::from)
            .ok_or_else(|| LeadScoutError::provider(self.provider, "empty completion"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "[\"a\", \"b\"]"}}]
            })))
            .mount(&server)
            .await;

        let model = OpenAiCompatibleModel::openrouter(
            http::build_client(5).unwrap(),
            "or-key".into(),
            "some/model".into(),
            100,
            Some(server.uri()),
        );
        assert_eq!(model.provider(), "openrouter");
        let text = model
            .generate(&ModelRequest {
                system: "s",
                user: "u",
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(text, "[\"a\", \"b\"]");
    }

    #[tokio::test]
    async fn empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let model = OpenAiCompatibleModel::openai(
            http::build_client(5).unwrap(),
            "k".into(),
            "gpt-test".into(),
            100,
            Some(server.uri()),
        );
        let err = model
            .generate(&ModelRequest {
                system: "s",
                user: "u",
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LeadScoutError::Provider { .. }));
    }
}
