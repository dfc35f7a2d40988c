//! Agent memory and expertise engine.
//!
//! Owns per-agent knowledge and experiences on top of a [`Store`]:
//!
//! - **Knowledge** is deduplicated on write through a [`SimilarityStrategy`];
//!   a restated fact reinforces the existing item instead of inserting.
//! - **Experiences** are episodic and never deduplicated. Recording one
//!   spawns an insight extraction that may add `insight` knowledge;
//!   [`MemoryEngine::flush_insights`] waits for the outstanding ones.
//! - **Recall** is keyword-matched, scored, and side-effecting: every
//!   returned knowledge item has its access count bumped.
//! - **Decay** removes low-confidence knowledge nobody has touched lately.

mod expertise;
mod insight;
mod similarity;

pub use expertise::{
    CompetencyLevel, ExpertiseProfile, GENERAL_SPECIALTY, SpecialtyExpertise, build_profile,
};
pub use insight::{
    InsightExtractor, MAX_INSIGHTS, NoopInsightExtractor, ProviderInsightExtractor, parse_insights,
};
pub use similarity::{KeywordOverlap, MIN_KEYWORD_LEN, SimilarityStrategy, keywords, matches_any};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::store::{KnowledgeOrder, MemoryStats, Store};
use crate::types::{
    Agent, ExperienceRecord, ExperienceType, KnowledgeItem, KnowledgeType, NewAgent,
    NewExperience, NewKnowledge,
};

const DEDUP_BOOST: f64 = 10.0;
const REINFORCE_BOOST: f64 = 5.0;
const CORRECTION_PENALTY: f64 = -2.0;
const CORRECTION_CONFIDENCE: f64 = 70.0;
const INSIGHT_CONFIDENCE: f64 = 60.0;
const INSIGHT_RELEVANCE: f64 = 70.0;
const HIGH_CONFIDENCE: f64 = 70.0;
const UNCERTAIN_CONFIDENCE: f64 = 50.0;

/// Message returned when recall finds nothing.
pub const NOTHING_RECALLED: &str = "No relevant knowledge or experience found for this query";

/// Options for [`MemoryEngine::recall_memory`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecallOptions {
    pub specialty_id: Option<String>,
    pub limit: usize,
    /// Fraction in `[0, 1]`, compared against relevance scores divided by 100.
    pub min_relevance: f64,
}

impl RecallOptions {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            specialty_id: None,
            limit: config.recall_limit,
            min_relevance: config.min_relevance,
        }
    }

    pub fn with_specialty(mut self, specialty_id: Option<String>) -> Self {
        self.specialty_id = specialty_id;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

/// Result of a recall query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecall {
    pub knowledge: Vec<KnowledgeItem>,
    pub experiences: Vec<ExperienceRecord>,
    pub relevance_score: u32,
    /// Never empty.
    pub contextual_insights: Vec<String>,
    pub suggested_actions: Vec<String>,
}

impl MemoryRecall {
    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty() && self.experiences.is_empty()
    }
}

/// Outcome of [`MemoryEngine::store_knowledge`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Inserted(KnowledgeItem),
    /// An existing similar item was reinforced instead.
    Reinforced(KnowledgeItem),
}

impl StoreOutcome {
    pub fn item(&self) -> &KnowledgeItem {
        match self {
            Self::Inserted(item) | Self::Reinforced(item) => item,
        }
    }

    pub fn into_item(self) -> KnowledgeItem {
        match self {
            Self::Inserted(item) | Self::Reinforced(item) => item,
        }
    }

    pub fn was_deduplicated(&self) -> bool {
        matches!(self, Self::Reinforced(_))
    }
}

/// Outcome of [`MemoryEngine::correct_knowledge`].
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub original: KnowledgeItem,
    pub correction: KnowledgeItem,
    pub experience: ExperienceRecord,
}

/// Memory and expertise engine.
#[derive(Clone)]
pub struct MemoryEngine {
    store: Arc<dyn Store>,
    similarity: Arc<dyn SimilarityStrategy>,
    insights: Arc<dyn InsightExtractor>,
    /// Insight tasks spawned by `record_experience`, shared across clones.
    pending: Arc<Mutex<JoinSet<()>>>,
    config: MemoryConfig,
}

impl MemoryEngine {
    /// Engine with keyword-overlap dedup and no insight extraction.
    pub fn new(store: Arc<dyn Store>, config: MemoryConfig) -> Self {
        Self {
            store,
            similarity: Arc::new(KeywordOverlap),
            insights: Arc::new(NoopInsightExtractor),
            pending: Arc::new(Mutex::new(JoinSet::new())),
            config,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityStrategy>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_insight_extractor(mut self, insights: Arc<dyn InsightExtractor>) -> Self {
        self.insights = insights;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agents
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_agent(&self, new: NewAgent) -> Result<Agent> {
        new.validate()?;
        let agent = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            personality: new.personality,
            is_devils_advocate: new.is_devils_advocate,
            preferred_provider_id: new.preferred_provider_id,
            archived: false,
            created_at: Utc::now(),
        };
        self.store.insert_agent(&agent)?;
        info!(agent_id = %agent.id, name = %agent.name, "Created agent");
        Ok(agent)
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        self.store
            .get_agent(agent_id)?
            .ok_or_else(|| Error::not_found("Agent", agent_id))
    }

    pub fn list_agents(&self, include_archived: bool) -> Result<Vec<Agent>> {
        self.store.list_agents(include_archived)
    }

    pub fn archive_agent(&self, agent_id: &str) -> Result<()> {
        if !self.store.archive_agent(agent_id)? {
            return Err(Error::not_found("Agent", agent_id));
        }
        Ok(())
    }

    /// Delete an agent and all of its memory.
    pub fn delete_agent(&self, agent_id: &str) -> Result<()> {
        if !self.store.delete_agent(agent_id)? {
            return Err(Error::not_found("Agent", agent_id));
        }
        info!(agent_id, "Deleted agent");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Knowledge
    // ─────────────────────────────────────────────────────────────────────────

    /// Store knowledge, reinforcing the oldest similar item instead of duplicating.
    pub fn store_knowledge(&self, new: NewKnowledge) -> Result<StoreOutcome> {
        self.get_agent(&new.agent_id)?;

        let existing = self
            .store
            .list_knowledge(&new.agent_id, None, KnowledgeOrder::Oldest)?;

        if let Some(matched) = existing
            .iter()
            .find(|item| self.similarity.is_similar(&item.content, &new.content))
        {
            let reinforced = self
                .store
                .adjust_knowledge_confidence(&matched.id, DEDUP_BOOST)?
                .ok_or_else(|| Error::not_found("KnowledgeItem", matched.id.as_str()))?;
            debug!(
                agent_id = %new.agent_id,
                knowledge_id = %reinforced.id,
                confidence = reinforced.confidence,
                "Reinforced similar knowledge instead of inserting"
            );
            return Ok(StoreOutcome::Reinforced(reinforced));
        }

        let item = KnowledgeItem::from_new(new, Utc::now());
        self.store.insert_knowledge(&item)?;
        debug!(agent_id = %item.agent_id, knowledge_id = %item.id, "Stored knowledge");
        Ok(StoreOutcome::Inserted(item))
    }

    /// +5 confidence and a `knowledge_application` experience.
    pub fn reinforce_knowledge(
        &self,
        agent_id: &str,
        knowledge_id: &str,
        context: &str,
    ) -> Result<KnowledgeItem> {
        let item = self.owned_knowledge(agent_id, knowledge_id)?;
        let updated = self
            .store
            .adjust_knowledge_confidence(&item.id, REINFORCE_BOOST)?
            .ok_or_else(|| Error::not_found("KnowledgeItem", knowledge_id))?;

        let experience = ExperienceRecord::from_new(
            NewExperience::new(
                agent_id,
                ExperienceType::KnowledgeApplication,
                context,
                format!("Applied knowledge: {}", item.content),
            )
            .with_specialty(item.specialty_id.clone())
            .with_emotion("confident")
            .with_impact(75.0),
            Utc::now(),
        );
        self.store.insert_experience(&experience)?;

        debug!(agent_id, knowledge_id, confidence = updated.confidence, "Reinforced knowledge");
        Ok(updated)
    }

    /// −2 confidence on the old item, a new `correction` item, and a
    /// `mistake_correction` experience.
    pub fn correct_knowledge(
        &self,
        agent_id: &str,
        knowledge_id: &str,
        failure_context: &str,
        correction: &str,
    ) -> Result<Correction> {
        let item = self.owned_knowledge(agent_id, knowledge_id)?;
        let original = self
            .store
            .adjust_knowledge_confidence(&item.id, CORRECTION_PENALTY)?
            .ok_or_else(|| Error::not_found("KnowledgeItem", knowledge_id))?;

        let mut new = NewKnowledge::new(agent_id, KnowledgeType::Correction, correction)
            .with_confidence(CORRECTION_CONFIDENCE)
            .with_relevance(item.relevance_score)
            .with_tags(["correction"]);
        new.specialty_id = item.specialty_id.clone();
        let corrected = KnowledgeItem::from_new(new, Utc::now());
        self.store.insert_knowledge(&corrected)?;

        let experience = ExperienceRecord::from_new(
            NewExperience::new(
                agent_id,
                ExperienceType::MistakeCorrection,
                failure_context,
                format!("Corrected \"{}\" to \"{}\"", item.content, correction),
            )
            .with_specialty(item.specialty_id.clone())
            .with_lessons(vec![correction.to_string()])
            .with_emotion("determined")
            .with_impact(60.0),
            Utc::now(),
        );
        self.store.insert_experience(&experience)?;

        info!(agent_id, knowledge_id, correction_id = %corrected.id, "Corrected knowledge");
        Ok(Correction {
            original,
            correction: corrected,
            experience,
        })
    }

    /// Delete low-confidence knowledge not accessed within the configured window.
    pub fn forget_obsolete_knowledge(&self, agent_id: &str) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.obsolete_after_days);
        let removed = self.store.delete_obsolete_knowledge(
            agent_id,
            self.config.obsolete_confidence,
            cutoff,
        )?;
        if removed > 0 {
            info!(agent_id, removed, "Forgot obsolete knowledge");
        }
        Ok(removed)
    }

    fn owned_knowledge(&self, agent_id: &str, knowledge_id: &str) -> Result<KnowledgeItem> {
        match self.store.get_knowledge(knowledge_id)? {
            Some(item) if item.agent_id == agent_id => Ok(item),
            _ => Err(Error::not_found("KnowledgeItem", knowledge_id)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Experiences
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an experience and derive insights from it in the background.
    ///
    /// Outside a tokio runtime the insight step is skipped. Callers that exit
    /// soon after should await [`flush_insights`](Self::flush_insights).
    pub fn record_experience(&self, new: NewExperience) -> Result<ExperienceRecord> {
        let record = ExperienceRecord::from_new(new, Utc::now());
        self.store.insert_experience(&record)?;
        debug!(
            agent_id = %record.agent_id,
            experience_type = %record.experience_type,
            "Recorded experience"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = self.clone();
                let spawned = record.clone();
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                while pending.try_join_next().is_some() {}
                pending.spawn_on(
                    async move {
                        let timeout = engine.config.insight_timeout();
                        match tokio::time::timeout(timeout, engine.derive_insights(&spawned)).await {
                            Ok(Ok(items)) if !items.is_empty() => {
                                debug!(experience_id = %spawned.id, count = items.len(), "Derived insights");
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => {
                                warn!(experience_id = %spawned.id, error = %e, "Insight extraction failed");
                            }
                            Err(_) => {
                                warn!(
                                    experience_id = %spawned.id,
                                    timeout_ms = timeout.as_millis() as u64,
                                    "Insight extraction timed out"
                                );
                            }
                        }
                    },
                    &handle,
                );
            }
            Err(_) => debug!("No async runtime, skipping insight extraction"),
        }

        Ok(record)
    }

    /// Wait for insight tasks spawned by [`record_experience`](Self::record_experience).
    ///
    /// Bounded by the insight timeout; tasks still running after it are
    /// aborted. Returns the number of tasks that finished.
    pub async fn flush_insights(&self) -> usize {
        let mut tasks =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        if tasks.is_empty() {
            return 0;
        }

        let mut finished = 0;
        let drained = tokio::time::timeout(self.config.insight_timeout(), async {
            while tasks.join_next().await.is_some() {
                finished += 1;
            }
        })
        .await;

        if drained.is_err() {
            warn!(abandoned = tasks.len(), "Insight tasks still running at flush, aborting");
            tasks.abort_all();
        }
        finished
    }

    /// Extract up to three insights from `record` and store each as knowledge.
    pub async fn derive_insights(&self, record: &ExperienceRecord) -> Result<Vec<KnowledgeItem>> {
        let insights = self.insights.extract(record).await?;

        let mut stored = Vec::new();
        for content in insights
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_INSIGHTS)
        {
            let mut new = NewKnowledge::new(&record.agent_id, KnowledgeType::Insight, content)
                .with_confidence(INSIGHT_CONFIDENCE)
                .with_relevance(INSIGHT_RELEVANCE)
                .with_tags(["insight", "experience_derived"]);
            new.specialty_id = record.specialty_id.clone();
            let item = KnowledgeItem::from_new(new, Utc::now());
            self.store.insert_knowledge(&item)?;
            stored.push(item);
        }
        Ok(stored)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recall & profile
    // ─────────────────────────────────────────────────────────────────────────

    /// Keyword recall over an agent's knowledge and experiences.
    pub fn recall_memory(
        &self,
        agent_id: &str,
        query: &str,
        options: &RecallOptions,
    ) -> Result<MemoryRecall> {
        let now = Utc::now();
        let query_keywords: BTreeSet<String> = keywords(query);
        let min_relevance = options.min_relevance * 100.0;

        let mut knowledge: Vec<KnowledgeItem> = self
            .store
            .list_knowledge(
                agent_id,
                options.specialty_id.as_deref(),
                KnowledgeOrder::MostRelevant,
            )?
            .into_iter()
            .filter(|k| k.relevance_score >= min_relevance)
            .filter(|k| matches_any(&query_keywords, &k.content))
            .take(options.limit)
            .collect();

        let mut experiences: Vec<ExperienceRecord> = self
            .store
            .list_experiences(agent_id)?
            .into_iter()
            .filter(|e| {
                matches_any(&query_keywords, &e.context) || matches_any(&query_keywords, &e.outcome)
            })
            .collect();
        experiences.sort_by(|a, b| {
            b.impact_score
                .total_cmp(&a.impact_score)
                .then(b.created_at.cmp(&a.created_at))
        });
        experiences.truncate(options.limit);

        let ids: Vec<String> = knowledge.iter().map(|k| k.id.clone()).collect();
        self.store.touch_knowledge(&ids, now)?;
        for item in &mut knowledge {
            item.access_count += 1;
            item.last_accessed = now;
        }

        let avg_relevance = average(knowledge.iter().map(|k| k.relevance_score));
        let avg_impact = average(experiences.iter().map(|e| e.impact_score));
        let relevance_score = if knowledge.is_empty() && experiences.is_empty() {
            0
        } else {
            ((avg_relevance + avg_impact) / 2.0).round() as u32
        };

        let contextual_insights = self.contextual_insights(&knowledge, &experiences, now);
        let suggested_actions = self.suggested_actions(&knowledge, &experiences, now);

        debug!(
            agent_id,
            knowledge = knowledge.len(),
            experiences = experiences.len(),
            relevance_score,
            "Recalled memory"
        );

        Ok(MemoryRecall {
            knowledge,
            experiences,
            relevance_score,
            contextual_insights,
            suggested_actions,
        })
    }

    fn contextual_insights(
        &self,
        knowledge: &[KnowledgeItem],
        experiences: &[ExperienceRecord],
        now: chrono::DateTime<Utc>,
    ) -> Vec<String> {
        if knowledge.is_empty() && experiences.is_empty() {
            return vec![NOTHING_RECALLED.to_string()];
        }

        let mut insights = vec![format!(
            "Recalled {} knowledge items and {} past experiences",
            knowledge.len(),
            experiences.len()
        )];

        let confident_areas: BTreeSet<KnowledgeType> = knowledge
            .iter()
            .filter(|k| k.confidence > HIGH_CONFIDENCE)
            .map(|k| k.knowledge_type)
            .collect();
        if !confident_areas.is_empty() {
            insights.push(format!(
                "High-confidence knowledge in {} areas",
                confident_areas.len()
            ));
        }

        let recent_cutoff = now - Duration::days(self.config.recent_window_days);
        let recent = knowledge
            .iter()
            .filter(|k| k.created_at > recent_cutoff)
            .count();
        if recent > 0 {
            insights.push(format!(
                "{} items of recent knowledge from the last {} days",
                recent, self.config.recent_window_days
            ));
        }

        let successes = experiences
            .iter()
            .filter(|e| e.experience_type == ExperienceType::Success)
            .count();
        if successes > 0 {
            insights.push(format!("{} similar situations ended in success", successes));
        }

        insights
    }

    fn suggested_actions(
        &self,
        knowledge: &[KnowledgeItem],
        experiences: &[ExperienceRecord],
        now: chrono::DateTime<Utc>,
    ) -> Vec<String> {
        let mut actions = Vec::new();

        if knowledge.iter().any(|k| k.confidence < UNCERTAIN_CONFIDENCE) {
            actions.push("Validate uncertain knowledge before relying on it".to_string());
        }

        let failure_cutoff = now - Duration::days(self.config.failure_window_days);
        if experiences
            .iter()
            .any(|e| e.experience_type == ExperienceType::Failure && e.created_at > failure_cutoff)
        {
            actions.push("Avoid patterns from recent failures".to_string());
        }

        if knowledge.is_empty() {
            actions.push("Gather knowledge on this topic".to_string());
        }

        actions
    }

    pub fn build_expertise_profile(&self, agent_id: &str) -> Result<ExpertiseProfile> {
        self.get_agent(agent_id)?;
        let knowledge = self
            .store
            .list_knowledge(agent_id, None, KnowledgeOrder::Oldest)?;
        let experiences = self.store.list_experiences(agent_id)?;
        Ok(build_profile(agent_id, &knowledge, &experiences, Utc::now()))
    }

    pub fn stats(&self, agent_id: &str) -> Result<MemoryStats> {
        self.store.memory_stats(agent_id)
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
