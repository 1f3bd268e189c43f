use super::{upstream_error, Completion, CompletionRequest, ProviderAdapter, Simulator};
use crate::catalog::{ModelCatalog, Pricing};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::model::{ProviderKind, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Messages-API shaped adapter.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
    catalog: Arc<ModelCatalog>,
    simulator: Simulator,
}

impl AnthropicAdapter {
    pub fn new(
        client: reqwest::Client,
        settings: ProviderSettings,
        catalog: Arc<ModelCatalog>,
        simulator: Simulator,
    ) -> Self {
        Self {
            client,
            settings,
            catalog,
            simulator,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn pricing(&self, model: &str) -> Pricing {
        self.catalog.pricing(model, ProviderKind::Anthropic)
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, ProviderError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Ok(self.simulator.complete(request).await);
        };

        let body = MessagesRequest {
            model: request.model,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            messages: vec![Message {
                role: "user",
                content: request.prompt,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.settings.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(PROVIDER, resp).await);
        }

        let data: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        // Responses may interleave several blocks; only text blocks count.
        let text: String = data
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: format!("model {} returned no text content", request.model),
            });
        }

        let usage = data
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        Ok(Completion {
            text,
            usage,
            simulated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCode, ModelResult, TestOptions};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: &str, api_key: Option<&str>) -> AnthropicAdapter {
        AnthropicAdapter::new(
            reqwest::Client::new(),
            ProviderSettings {
                base_url: base_url.to_string(),
                api_key: api_key.map(str::to_string),
            },
            Arc::new(ModelCatalog::builtin()),
            Simulator::instant(),
        )
    }

    #[tokio::test]
    async fn parses_messages_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({"model": "claude-3-opus-20240229", "max_tokens": 200})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Hello, "},
                    {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                    {"type": "text", "text": "world."}
                ],
                "usage": {"input_tokens": 2000, "output_tokens": 1000}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = TestOptions {
            temperature: 0.5,
            max_tokens: 200,
        };
        let result = adapter(&server.uri(), Some("ant-test"))
            .test("Hello", "claude-3-opus-20240229", options)
            .await;
        let success = result.as_success().expect("success");

        assert_eq!(success.response, "Hello, world.");
        assert_eq!(success.tokens_prompt, 2000);
        assert_eq!(success.tokens_completion, 1000);
        assert_eq!(success.cost_input, 0.03);
        assert_eq!(success.cost_output, 0.075);
        assert_eq!(success.cost_total, 0.105);
        assert_eq!(success.provider, "anthropic");
    }

    #[tokio::test]
    async fn overloaded_upstream_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("ant-test"))
            .test("Hello", "claude-3-haiku-20240307", TestOptions::default())
            .await;

        match result {
            ModelResult::Failure(f) => {
                assert_eq!(f.error_code, ErrorCode::ProviderError);
                assert_eq!(f.error_message, "anthropic API error (529): Overloaded");
            }
            ModelResult::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("ant-test"))
            .test("Hello", "claude-3-haiku-20240307", TestOptions::default())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::InvalidResponse));
    }

    #[tokio::test]
    async fn client_timeout_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();
        let adapter = AnthropicAdapter::new(
            client,
            ProviderSettings {
                base_url: server.uri(),
                api_key: Some("ant-test".into()),
            },
            Arc::new(ModelCatalog::builtin()),
            Simulator::instant(),
        );

        let result = adapter
            .test("Hello", "claude-3-haiku-20240307", TestOptions::default())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::Timeout));
    }
}
