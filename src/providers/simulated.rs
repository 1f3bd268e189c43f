use super::{Completion, CompletionRequest};
use crate::model::TokenUsage;
use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::sleep;

/// Stand-in used when a provider has no credential configured.
///
/// Produces a canned answer after an artificial delay. Every completion it
/// returns is marked `simulated` so callers never mistake the token and cost
/// figures for real measurements.
#[derive(Debug, Clone)]
pub struct Simulator {
    delay_ms: RangeInclusive<u64>,
}

impl Simulator {
    pub fn new(delay_ms: RangeInclusive<u64>) -> Self {
        Self { delay_ms }
    }

    /// No artificial delay. Handy in tests.
    pub fn instant() -> Self {
        Self::new(0..=0)
    }

    pub async fn complete(&self, request: CompletionRequest<'_>) -> Completion {
        // ThreadRng is !Send, so draw everything before the await.
        let (delay, completion_tokens) = {
            let mut rng = rand::thread_rng();
            let delay = if self.delay_ms.is_empty() {
                0
            } else {
                rng.gen_range(self.delay_ms.clone())
            };
            let upper = request.options.max_tokens.clamp(1, 300);
            let lower = upper.min(20);
            (delay, rng.gen_range(lower..=upper))
        };

        sleep(Duration::from_millis(delay)).await;

        Completion {
            text: format!(
                "[simulated {}] This is a placeholder answer to: \"{}\". \
                 Configure an API key to get a real response.",
                request.model,
                snippet(request.prompt, 80)
            ),
            usage: TokenUsage::new(estimate_tokens(request.prompt), completion_tokens),
            simulated: true,
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(500..=2000)
    }
}

/// Rough estimation: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as u32) / 4).max(1)
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
