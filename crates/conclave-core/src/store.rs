//! Persistence interface.
//!
//! The memory engine and the orchestrator depend only on [`Store`]. The SQLite
//! implementation lives in [`crate::db`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{
    Agent, ExperienceRecord, KnowledgeItem, KnowledgeType, Sequence, SequenceStatus, SequenceStep,
    StepResult,
};

/// Ordering for knowledge listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnowledgeOrder {
    /// Creation order, oldest first.
    #[default]
    Oldest,
    /// Relevance desc, then confidence desc.
    MostRelevant,
}

/// Per-agent memory statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub knowledge_count: usize,
    pub experience_count: usize,
    pub average_confidence: f64,
    pub total_accesses: u64,
    pub by_type: BTreeMap<KnowledgeType, usize>,
}

/// Rows touched by a crash-recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub steps_failed: usize,
    pub sequences_failed: usize,
}

/// Storage backend for agents, memory, and sequences.
///
/// Every mutation that touches a score or counter is a single atomic statement.
pub trait Store: Send + Sync {
    // ── Agents ──────────────────────────────────────────────────────────────

    fn insert_agent(&self, agent: &Agent) -> Result<()>;

    fn get_agent(&self, id: &str) -> Result<Option<Agent>>;

    fn list_agents(&self, include_archived: bool) -> Result<Vec<Agent>>;

    /// Mark an agent archived. Returns false if no such agent.
    fn archive_agent(&self, id: &str) -> Result<bool>;

    /// Delete an agent together with its knowledge and experiences.
    fn delete_agent(&self, id: &str) -> Result<bool>;

    // ── Knowledge ───────────────────────────────────────────────────────────

    fn insert_knowledge(&self, item: &KnowledgeItem) -> Result<()>;

    fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeItem>>;

    /// Knowledge owned by an agent, optionally restricted to one specialty.
    fn list_knowledge(
        &self,
        agent_id: &str,
        specialty_id: Option<&str>,
        order: KnowledgeOrder,
    ) -> Result<Vec<KnowledgeItem>>;

    /// Add `delta` to confidence, clamped to `[0, 100]`. Returns the updated item.
    fn adjust_knowledge_confidence(&self, id: &str, delta: f64) -> Result<Option<KnowledgeItem>>;

    /// Increment access counts and stamp last access.
    fn touch_knowledge(&self, ids: &[String], now: DateTime<Utc>) -> Result<()>;

    /// Delete items with confidence below `max_confidence` last accessed before `cutoff`.
    fn delete_obsolete_knowledge(
        &self,
        agent_id: &str,
        max_confidence: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize>;

    // ── Experiences ─────────────────────────────────────────────────────────

    fn insert_experience(&self, record: &ExperienceRecord) -> Result<()>;

    /// Experiences of an agent, oldest first.
    fn list_experiences(&self, agent_id: &str) -> Result<Vec<ExperienceRecord>>;

    fn memory_stats(&self, agent_id: &str) -> Result<MemoryStats>;

    // ── Sequences ───────────────────────────────────────────────────────────

    fn insert_sequence(&self, sequence: &Sequence) -> Result<()>;

    fn get_sequence(&self, id: &str) -> Result<Option<Sequence>>;

    /// Most recent sequences first.
    fn list_sequences(&self, limit: usize) -> Result<Vec<Sequence>>;

    /// Compare-and-set on status. Returns true if this call moved it.
    fn transition_sequence(&self, id: &str, from: SequenceStatus, to: SequenceStatus)
    -> Result<bool>;

    /// Move a running sequence to a terminal status.
    fn finish_sequence(
        &self,
        id: &str,
        status: SequenceStatus,
        total_cost: f64,
        failure_reason: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    // ── Steps ───────────────────────────────────────────────────────────────

    fn insert_step(&self, step: &SequenceStep) -> Result<()>;

    /// Finalize a non-terminal step.
    fn finish_step(&self, step_id: &str, result: &StepResult) -> Result<bool>;

    /// Steps ordered by (iteration, step number).
    fn list_steps(&self, sequence_id: &str) -> Result<Vec<SequenceStep>>;

    /// Sum of costs over completed steps.
    fn total_step_cost(&self, sequence_id: &str) -> Result<f64>;

    /// Fail every running step and running sequence with `reason`.
    fn recover_interrupted(&self, reason: &str, now: DateTime<Utc>) -> Result<RecoveryReport>;
}
