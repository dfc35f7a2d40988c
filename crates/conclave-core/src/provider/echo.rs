//! Offline provider that answers deterministically from its prompt.

use async_trait::async_trait;
use std::time::Instant;

use super::{GenerateOptions, Generation, Provider};
use crate::error::ProviderError;

const MAX_ECHO_CHARS: usize = 200;

/// Echoes the last non-empty prompt line back, prefixed with its id.
///
/// Tokens are counted as whitespace-separated words of the prompt.
#[derive(Debug, Clone)]
pub struct EchoProvider {
    id: String,
    cost_per_1k_tokens: f64,
}

impl EchoProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cost_per_1k_tokens: 0.0,
        }
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let start = Instant::now();

        let last_line = prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let echoed: String = last_line.chars().take(MAX_ECHO_CHARS).collect();

        let tokens_used = prompt.split_whitespace().count() as u64;

        Ok(Generation {
            content: format!("[{}] {}", self.id, echoed),
            tokens_used,
            cost: tokens_used as f64 / 1000.0 * self.cost_per_1k_tokens,
            response_time_ms: start.elapsed().as_millis() as u64,
            artifacts: Vec::new(),
        })
    }
}
