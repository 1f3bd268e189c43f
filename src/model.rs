use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_ITERATIONS: u32 = 1;

/// Which upstream wire format serves a model id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
}

impl ProviderKind {
    /// The single id -> provider mapping used by both routing and the catalog.
    ///
    /// Anything containing `gpt` is OpenAI-shaped, anything starting with
    /// `claude-` is Anthropic-shaped. The `gpt` check runs first.
    pub fn classify(model_id: &str) -> Option<Self> {
        if model_id.contains("gpt") {
            Some(ProviderKind::OpenAI)
        } else if model_id.starts_with("claude-") {
            Some(ProviderKind::Anthropic)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling options forwarded to every adapter in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// A validated user submission. Only constructible through [`PromptRequest::new`]
/// or [`PromptRequest::builder`], so a value of this type always satisfies its invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    prompt: String,
    models: Vec<String>,
    options: TestOptions,
    iterations: u32,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>, models: Vec<String>) -> Result<Self, Error> {
        Self::builder(prompt, models).build()
    }

    pub fn builder(prompt: impl Into<String>, models: Vec<String>) -> PromptRequestBuilder {
        PromptRequestBuilder {
            prompt: prompt.into(),
            models,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn options(&self) -> TestOptions {
        self.options
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

#[derive(Debug, Clone)]
pub struct PromptRequestBuilder {
    prompt: String,
    models: Vec<String>,
    temperature: f32,
    max_tokens: u32,
    iterations: u32,
}

impl PromptRequestBuilder {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn build(self) -> Result<PromptRequest, Error> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::validation("Prompt is required and cannot be empty"));
        }
        if self.models.is_empty() {
            return Err(Error::validation("At least one model must be selected"));
        }
        if let Some(idx) = self.models.iter().position(|m| m.trim().is_empty()) {
            return Err(Error::validation(format!("Model id at position {} is empty", idx)));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::validation("Temperature must be between 0.0 and 2.0"));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation("maxTokens must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(Error::validation("iterations must be at least 1"));
        }

        Ok(PromptRequest {
            prompt: prompt.to_string(),
            models: self.models,
            options: TestOptions {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            iterations: self.iterations,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnsupportedModel,
    ProviderError,
    NetworkError,
    Timeout,
    InvalidResponse,
    AdapterPanic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Counts come from upstream JSON, so the total saturates instead of
    /// overflowing.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResult {
    pub model: String,
    pub provider: String,
    pub prompt: String,
    pub response: String,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub tokens_total: u32,
    pub cost_input: f64,
    pub cost_output: f64,
    pub cost_total: f64,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Set when no credential was configured and the figures are synthetic.
    pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResult {
    pub model: String,
    pub provider: String,
    pub prompt: String,
    pub error_message: String,
    pub error_code: ErrorCode,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of testing one model within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModelResult {
    Success(SuccessResult),
    #[serde(rename = "error")]
    Failure(FailureResult),
}

impl ModelResult {
    pub fn failure(
        model: &str,
        provider: &str,
        prompt: &str,
        code: ErrorCode,
        message: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        ModelResult::Failure(FailureResult {
            model: model.to_string(),
            provider: provider.to_string(),
            prompt: prompt.to_string(),
            error_message: message.into(),
            error_code: code,
            response_time_ms,
            timestamp: Utc::now(),
        })
    }

    pub fn unsupported(model: &str, prompt: &str) -> Self {
        Self::failure(
            model,
            "unknown",
            prompt,
            ErrorCode::UnsupportedModel,
            format!("Unsupported model: {}", model),
            0,
        )
    }

    pub fn model(&self) -> &str {
        match self {
            ModelResult::Success(s) => &s.model,
            ModelResult::Failure(f) => &f.model,
        }
    }

    pub fn response_time_ms(&self) -> u64 {
        match self {
            ModelResult::Success(s) => s.response_time_ms,
            ModelResult::Failure(f) => f.response_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ModelResult::Success(_))
    }

    pub fn as_success(&self) -> Option<&SuccessResult> {
        match self {
            ModelResult::Success(s) => Some(s),
            ModelResult::Failure(_) => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ModelResult::Success(_) => None,
            ModelResult::Failure(f) => Some(f.error_code),
        }
    }
}

/// Aggregates over one batch. Counts cover every result, token/cost/latency
/// figures cover the successful subset only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_models: usize,
    pub successful_models: usize,
    pub failed_models: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_response_time_ms: u64,
    pub simulated_models: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ModelResult]) -> Self {
        let successes: Vec<&SuccessResult> =
            results.iter().filter_map(ModelResult::as_success).collect();

        let total_tokens = successes.iter().map(|s| u64::from(s.tokens_total)).sum();
        let total_cost = round_cost(successes.iter().map(|s| s.cost_total).sum());
        let avg_response_time_ms = if successes.is_empty() {
            0
        } else {
            let sum: u64 = successes.iter().map(|s| s.response_time_ms).sum();
            (sum as f64 / successes.len() as f64).round() as u64
        };

        Self {
            total_models: results.len(),
            successful_models: successes.len(),
            failed_models: results.len() - successes.len(),
            total_tokens,
            total_cost,
            avg_response_time_ms,
            simulated_models: successes.iter().filter(|s| s.simulated).count(),
        }
    }
}

/// Rounds a dollar amount to 6 decimal places.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
