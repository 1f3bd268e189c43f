//! Provider adapters: translate one prompt into one upstream call and
//! normalize whatever comes back into a [`ModelResult`].

pub mod anthropic;
pub mod openai;
pub mod simulated;

use crate::catalog::Pricing;
use crate::error::ProviderError;
use crate::model::{round_cost, ModelResult, ProviderKind, SuccessResult, TestOptions, TokenUsage};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;
pub use simulated::Simulator;

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub options: TestOptions,
}

/// Raw output of one upstream call, before pricing and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub simulated: bool,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn pricing(&self, model: &str) -> Pricing;

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, ProviderError>;

    /// Runs one model and always returns a result, timing the call wall-clock.
    async fn test(&self, prompt: &str, model: &str, options: TestOptions) -> ModelResult {
        let provider = self.kind();
        let start = Instant::now();
        let outcome = self.complete(CompletionRequest { prompt, model, options }).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(completion) => {
                debug!(
                    model,
                    %provider,
                    elapsed_ms,
                    tokens = completion.usage.total_tokens,
                    "completion finished"
                );
                let pricing = self.pricing(model);
                let success = priced(prompt, model, provider, pricing, completion, elapsed_ms);
                ModelResult::Success(success)
            }
            Err(e) => {
                warn!(model, %provider, elapsed_ms, "completion failed: {}", e);
                ModelResult::failure(
                    model,
                    provider.as_str(),
                    prompt,
                    e.code(),
                    e.to_string(),
                    elapsed_ms,
                )
            }
        }
    }
}

fn priced(
    prompt: &str,
    model: &str,
    provider: ProviderKind,
    pricing: Pricing,
    completion: Completion,
    response_time_ms: u64,
) -> SuccessResult {
    let usage = completion.usage;
    let cost_input = round_cost(f64::from(usage.prompt_tokens) / 1000.0 * pricing.input);
    let cost_output = round_cost(f64::from(usage.completion_tokens) / 1000.0 * pricing.output);

    SuccessResult {
        model: model.to_string(),
        provider: provider.to_string(),
        prompt: prompt.to_string(),
        response: completion.text,
        tokens_prompt: usage.prompt_tokens,
        tokens_completion: usage.completion_tokens,
        tokens_total: usage.total_tokens,
        cost_input,
        cost_output,
        cost_total: round_cost(cost_input + cost_output),
        response_time_ms,
        timestamp: Utc::now(),
        simulated: completion.simulated,
    }
}

/// Turns a non-2xx upstream response into an error, preferring the
/// provider's own `error.message` over the bare status line.
pub(crate) async fn upstream_error(
    provider: &'static str,
    resp: reqwest::Response,
) -> ProviderError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    ProviderError::Upstream {
        provider,
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorCode;

    struct Fixed(Result<Completion, u16>);

    #[async_trait]
    impl ProviderAdapter for Fixed {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAI
        }

        fn pricing(&self, _model: &str) -> Pricing {
            Pricing::new(0.01, 0.03)
        }

        async fn complete(
            &self,
            _request: CompletionRequest<'_>,
        ) -> Result<Completion, ProviderError> {
            self.0.clone().map_err(|status| ProviderError::Upstream {
                provider: "openai",
                status,
                message: "Incorrect API key provided".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_prices_successful_completion() {
        let adapter = Fixed(Ok(Completion {
            text: "Hi there".into(),
            usage: TokenUsage::new(1000, 500),
            simulated: false,
        }));
        let result = adapter.test("Hello", "gpt-4", TestOptions::default()).await;
        let success = result.as_success().expect("success");

        assert_eq!(success.cost_input, 0.01);
        assert_eq!(success.cost_output, 0.015);
        assert_eq!(success.cost_total, 0.025);
        assert_eq!(success.tokens_total, 1500);
        assert_eq!(success.provider, "openai");
        assert!(!success.simulated);
    }

    #[tokio::test]
    async fn test_converts_errors_into_failure_results() {
        let adapter = Fixed(Err(401));
        let result = adapter.test("Hello", "gpt-4", TestOptions::default()).await;

        assert_eq!(result.error_code(), Some(ErrorCode::ProviderError));
        match result {
            ModelResult::Failure(f) => {
                assert!(f.error_message.contains("Incorrect API key provided"));
                assert_eq!(f.model, "gpt-4");
            }
            ModelResult::Success(_) => panic!("expected failure"),
        }
    }
}
