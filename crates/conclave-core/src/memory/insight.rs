//! Insight extraction from experiences.
//!
//! Runs off the critical path of `record_experience`; see
//! [`MemoryEngine::derive_insights`](super::MemoryEngine::derive_insights).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::provider::{GenerateOptions, Provider};
use crate::types::ExperienceRecord;

/// Maximum insights kept per experience.
pub const MAX_INSIGHTS: usize = 3;

/// Derives short lessons from an experience.
#[async_trait]
pub trait InsightExtractor: Send + Sync {
    async fn extract(&self, record: &ExperienceRecord) -> Result<Vec<String>, ProviderError>;
}

/// Extracts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInsightExtractor;

#[async_trait]
impl InsightExtractor for NoopInsightExtractor {
    async fn extract(&self, _record: &ExperienceRecord) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Asks a provider for lessons, one per line.
pub struct ProviderInsightExtractor {
    provider: Arc<dyn Provider>,
    options: GenerateOptions,
}

impl ProviderInsightExtractor {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            options: GenerateOptions {
                temperature: Some(0.3),
                max_tokens: Some(200),
                ..Default::default()
            },
        }
    }

    fn prompt(record: &ExperienceRecord) -> String {
        let mut prompt = format!(
            "Extract between 1 and {MAX_INSIGHTS} short, reusable lessons from this experience.\n\
             Reply with one lesson per line and nothing else.\n\n\
             Type: {}\nContext: {}\nOutcome: {}\n",
            record.experience_type, record.context, record.outcome
        );
        if !record.lessons_learned.is_empty() {
            prompt.push_str("Lessons already noted:\n");
            for lesson in &record.lessons_learned {
                prompt.push_str(&format!("- {}\n", lesson));
            }
        }
        prompt
    }
}

#[async_trait]
impl InsightExtractor for ProviderInsightExtractor {
    async fn extract(&self, record: &ExperienceRecord) -> Result<Vec<String>, ProviderError> {
        let generation = self
            .provider
            .generate(&Self::prompt(record), &self.options)
            .await?;
        Ok(parse_insights(&generation.content))
    }
}

/// Split a reply into at most [`MAX_INSIGHTS`] lines, stripping list markers.
pub fn parse_insights(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')')
                })
                .trim()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_INSIGHTS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoProvider;
    use crate::types::{ExperienceType, NewExperience};
    use chrono::Utc;

    #[test]
    fn test_parse_insights() {
        let reply = "1. Check inputs early\n\n- Prefer small batches\n* Log failures\n4) Too many";
        assert_eq!(
            parse_insights(reply),
            vec!["Check inputs early", "Prefer small batches", "Log failures"]
        );
        assert!(parse_insights("   \n\n").is_empty());
    }

    #[tokio::test]
    async fn test_provider_extractor_uses_reply() {
        let extractor = ProviderInsightExtractor::new(Arc::new(EchoProvider::new("echo")));
        let record = ExperienceRecord::from_new(
            NewExperience::new("a1", ExperienceType::Failure, "deploy", "rolled back")
                .with_lessons(vec!["test migrations".into()]),
            Utc::now(),
        );

        let insights = extractor.extract(&record).await.unwrap();
        assert_eq!(insights, vec!["[echo] - test migrations"]);
    }

    #[tokio::test]
    async fn test_noop_extractor() {
        let record = ExperienceRecord::from_new(
            NewExperience::new("a1", ExperienceType::Success, "c", "o"),
            Utc::now(),
        );
        assert!(NoopInsightExtractor.extract(&record).await.unwrap().is_empty());
    }
}
