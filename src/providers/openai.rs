use super::{upstream_error, Completion, CompletionRequest, ProviderAdapter, Simulator};
use crate::catalog::{ModelCatalog, Pricing};
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::model::{ProviderKind, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Chat-completions shaped adapter.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
    catalog: Arc<ModelCatalog>,
    simulator: Simulator,
}

impl OpenAiAdapter {
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

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.settings.base_url)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn pricing(&self, model: &str) -> Pricing {
        self.catalog.pricing(model, ProviderKind::OpenAI)
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, ProviderError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Ok(self.simulator.complete(request).await);
        };

        let body = ChatRequest {
            model: request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(PROVIDER, resp).await);
        }

        let data: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let text = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: format!("model {} returned no content", request.model),
            })?;

        let usage = data
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
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

    fn adapter(base_url: &str, api_key: Option<&str>) -> OpenAiAdapter {
        OpenAiAdapter::new(
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
    async fn parses_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4",
                "max_tokens": 500,
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi!"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 1000, "completion_tokens": 1000, "total_tokens": 2000}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("sk-test"))
            .test("Hello", "gpt-4", TestOptions::default())
            .await;
        let success = result.as_success().expect("success");

        assert_eq!(success.response, "Hi!");
        assert_eq!(success.tokens_total, 2000);
        assert_eq!(success.cost_input, 0.03);
        assert_eq!(success.cost_output, 0.06);
        assert!(!success.simulated);
    }

    #[tokio::test]
    async fn surfaces_upstream_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("sk-bad"))
            .test("Hello", "gpt-4", TestOptions::default())
            .await;

        match result {
            ModelResult::Failure(f) => {
                assert_eq!(f.error_code, ErrorCode::ProviderError);
                assert_eq!(f.provider, "openai");
                assert!(f.error_message.contains("Incorrect API key provided"));
            }
            ModelResult::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn huge_upstream_token_counts_do_not_escape_the_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi!"}}],
                "usage": {"prompt_tokens": u32::MAX, "completion_tokens": 1}
            })))
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("sk-test"))
            .test("Hello", "gpt-4", TestOptions::default())
            .await;
        let success = result.as_success().expect("success");

        assert_eq!(success.tokens_prompt, u32::MAX);
        assert_eq!(success.tokens_total, u32::MAX);
        assert!(success.cost_total.is_finite());
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), Some("sk-test"))
            .test("Hello", "gpt-3.5-turbo", TestOptions::default())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::InvalidResponse));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_network_error() {
        // Port 9 (discard) is essentially never listening.
        let result = adapter("http://127.0.0.1:9", Some("sk-test"))
            .test("Hello", "gpt-4", TestOptions::default())
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::NetworkError));
    }

    #[tokio::test]
    async fn missing_key_simulates_without_calling_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let result = adapter(&server.uri(), None)
            .test("Hello", "gpt-4", TestOptions::default())
            .await;
        let success = result.as_success().expect("simulated success");
        assert!(success.simulated);
        assert!(success.cost_total > 0.0);
    }
}
