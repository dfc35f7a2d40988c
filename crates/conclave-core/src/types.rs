//! Shared types for conclave.
//!
//! Entities persisted by the [`Store`](crate::store::Store) and exchanged between
//! the orchestrator and the memory engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result, ValidationError};

/// Longest chain a sequence may configure.
pub const MAX_CHAIN_LENGTH: usize = 32;

/// Step number reserved for the synthesis step.
pub const SYNTHESIS_STEP_NUMBER: u32 = 1000;

const _: () = assert!(SYNTHESIS_STEP_NUMBER as usize > MAX_CHAIN_LENGTH);

/// Clamp a score into `[0, 100]`. NaN collapses to 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Personality
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed personality trait enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrait {
    Analytical,
    Creative,
    Pragmatic,
    Empathetic,
    Skeptical,
    Visionary,
    Methodical,
    Diplomatic,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 8] = [
        Self::Analytical,
        Self::Creative,
        Self::Pragmatic,
        Self::Empathetic,
        Self::Skeptical,
        Self::Visionary,
        Self::Methodical,
        Self::Diplomatic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Creative => "creative",
            Self::Pragmatic => "pragmatic",
            Self::Empathetic => "empathetic",
            Self::Skeptical => "skeptical",
            Self::Visionary => "visionary",
            Self::Methodical => "methodical",
            Self::Diplomatic => "diplomatic",
        }
    }
}

impl std::fmt::Display for PersonalityTrait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PersonalityTrait {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| ValidationError::UnknownTrait(s.to_string()))
    }
}

/// Primary/secondary trait pair. The secondary trait must differ from the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Personality {
    pub primary: PersonalityTrait,
    #[serde(default)]
    pub secondary: Option<PersonalityTrait>,
}

impl Personality {
    pub fn new(
        primary: PersonalityTrait,
        secondary: Option<PersonalityTrait>,
    ) -> std::result::Result<Self, ValidationError> {
        let personality = Self { primary, secondary };
        personality.validate()?;
        Ok(personality)
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.secondary == Some(self.primary) {
            return Err(ValidationError::DuplicatePersonality(self.primary.to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A reusable persona with its own memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub personality: Personality,
    pub is_devils_advocate: bool,
    pub preferred_provider_id: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub personality: Personality,
    #[serde(default)]
    pub is_devils_advocate: bool,
    #[serde(default)]
    pub preferred_provider_id: Option<String>,
}

impl NewAgent {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required("name"));
        }
        self.personality.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of retained knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    Fact,
    Concept,
    Procedure,
    Experience,
    Insight,
    Correction,
    CompetencyAchievement,
}

impl KnowledgeType {
    pub const ALL: [KnowledgeType; 7] = [
        Self::Fact,
        Self::Concept,
        Self::Procedure,
        Self::Experience,
        Self::Insight,
        Self::Correction,
        Self::CompetencyAchievement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Concept => "concept",
            Self::Procedure => "procedure",
            Self::Experience => "experience",
            Self::Insight => "insight",
            Self::Correction => "correction",
            Self::CompetencyAchievement => "competency_achievement",
        }
    }
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for KnowledgeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid knowledge type: {}", s))
    }
}

/// A unit of retained fact or insight owned by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub agent_id: String,
    pub specialty_id: Option<String>,
    pub knowledge_type: KnowledgeType,
    pub content: String,
    /// Always within `[0, 100]`.
    pub confidence: f64,
    /// Always within `[0, 100]`.
    pub relevance_score: f64,
    pub tags: BTreeSet<String>,
    pub access_count: u32,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeItem {
    /// Materialize a new item, clamping its scores.
    pub fn from_new(new: NewKnowledge, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: new.agent_id,
            specialty_id: new.specialty_id,
            knowledge_type: new.knowledge_type,
            content: new.content,
            confidence: clamp_score(new.confidence),
            relevance_score: clamp_score(new.relevance_score),
            tags: new.tags,
            access_count: 0,
            last_accessed: now,
            created_at: now,
        }
    }
}

/// Input for storing knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKnowledge {
    pub agent_id: String,
    pub specialty_id: Option<String>,
    pub knowledge_type: KnowledgeType,
    pub content: String,
    pub confidence: f64,
    pub relevance_score: f64,
    pub tags: BTreeSet<String>,
}

impl NewKnowledge {
    pub fn new(
        agent_id: impl Into<String>,
        knowledge_type: KnowledgeType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            specialty_id: None,
            knowledge_type,
            content: content.into(),
            confidence: 50.0,
            relevance_score: 50.0,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_specialty(mut self, specialty_id: impl Into<String>) -> Self {
        self.specialty_id = Some(specialty_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_relevance(mut self, relevance_score: f64) -> Self {
        self.relevance_score = relevance_score;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Experience
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of episodic experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceType {
    Success,
    Failure,
    Learning,
    Interaction,
    TrainingCompletion,
    Assessment,
    KnowledgeApplication,
    MistakeCorrection,
}

impl ExperienceType {
    pub const ALL: [ExperienceType; 8] = [
        Self::Success,
        Self::Failure,
        Self::Learning,
        Self::Interaction,
        Self::TrainingCompletion,
        Self::Assessment,
        Self::KnowledgeApplication,
        Self::MistakeCorrection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Learning => "learning",
            Self::Interaction => "interaction",
            Self::TrainingCompletion => "training_completion",
            Self::Assessment => "assessment",
            Self::KnowledgeApplication => "knowledge_application",
            Self::MistakeCorrection => "mistake_correction",
        }
    }
}

impl std::fmt::Display for ExperienceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExperienceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid experience type: {}", s))
    }
}

/// An immutable narrative outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub id: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub specialty_id: Option<String>,
    pub experience_type: ExperienceType,
    pub context: String,
    pub outcome: String,
    pub lessons_learned: Vec<String>,
    pub emotional_response: String,
    /// Always within `[0, 100]`.
    pub impact_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ExperienceRecord {
    pub fn from_new(new: NewExperience, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: new.agent_id,
            session_id: new.session_id,
            specialty_id: new.specialty_id,
            experience_type: new.experience_type,
            context: new.context,
            outcome: new.outcome,
            lessons_learned: new.lessons_learned,
            emotional_response: new.emotional_response,
            impact_score: clamp_score(new.impact_score),
            created_at: now,
        }
    }
}

/// Input for recording an experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperience {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub specialty_id: Option<String>,
    pub experience_type: ExperienceType,
    pub context: String,
    pub outcome: String,
    pub lessons_learned: Vec<String>,
    pub emotional_response: String,
    pub impact_score: f64,
}

impl NewExperience {
    pub fn new(
        agent_id: impl Into<String>,
        experience_type: ExperienceType,
        context: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: None,
            specialty_id: None,
            experience_type,
            context: context.into(),
            outcome: outcome.into(),
            lessons_learned: Vec::new(),
            emotional_response: "neutral".to_string(),
            impact_score: 50.0,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_specialty(mut self, specialty_id: Option<String>) -> Self {
        self.specialty_id = specialty_id;
        self
    }

    pub fn with_impact(mut self, impact_score: f64) -> Self {
        self.impact_score = impact_score;
        self
    }

    pub fn with_lessons(mut self, lessons: Vec<String>) -> Self {
        self.lessons_learned = lessons;
        self
    }

    pub fn with_emotion(mut self, emotional_response: impl Into<String>) -> Self {
        self.emotional_response = emotional_response.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status state machines
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a sequence: pending → running → {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SequenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Validated transition; illegal moves are rejected.
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::invalid_transition("sequence", self, next))
        }
    }
}

impl std::fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SequenceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid sequence status: {}", s)),
        }
    }
}

/// Lifecycle of a single step.
///
/// Same shape as [`SequenceStatus`], except a pending step may fail without
/// ever running (crash recovery, cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::invalid_transition("step", self, next))
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid step status: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence
// ─────────────────────────────────────────────────────────────────────────────

/// One configured position in a chain. Its index is its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStepConfig {
    pub provider_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub specialty_id: Option<String>,
    /// Overrides the agent's own personality when set.
    #[serde(default)]
    pub personality: Option<Personality>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub devils_advocate: bool,
}

impl ChainStepConfig {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            agent_id: None,
            specialty_id: None,
            personality: None,
            custom_instructions: None,
            devils_advocate: false,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_specialty(mut self, specialty_id: impl Into<String>) -> Self {
        self.specialty_id = Some(specialty_id.into());
        self
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = Some(personality);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    pub fn devils_advocate(mut self) -> Self {
        self.devils_advocate = true;
        self
    }
}

/// Input for submitting a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSequence {
    pub task_objective: String,
    pub initial_prompt: String,
    pub llm_chain: Vec<ChainStepConfig>,
    pub iterations: u32,
    pub synthesis_provider_id: String,
    #[serde(default)]
    pub selected_folders: Vec<String>,
}

impl NewSequence {
    /// Structural checks that do not need the provider registry.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_sequence_shape(
            &self.initial_prompt,
            &self.llm_chain,
            self.iterations,
            &self.synthesis_provider_id,
        )
    }
}

fn validate_sequence_shape(
    initial_prompt: &str,
    chain: &[ChainStepConfig],
    iterations: u32,
    synthesis_provider_id: &str,
) -> std::result::Result<(), ValidationError> {
    if chain.is_empty() {
        return Err(ValidationError::EmptyChain);
    }
    if chain.len() > MAX_CHAIN_LENGTH {
        return Err(ValidationError::ChainTooLong {
            len: chain.len(),
            max: MAX_CHAIN_LENGTH,
        });
    }
    if iterations == 0 {
        return Err(ValidationError::ZeroIterations);
    }
    if synthesis_provider_id.trim().is_empty() {
        return Err(ValidationError::MissingSynthesisProvider);
    }
    if initial_prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    for step in chain {
        if let Some(personality) = &step.personality {
            personality.validate()?;
        }
    }
    Ok(())
}

/// A configured multi-iteration run ("meeting").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub task_objective: String,
    pub initial_prompt: String,
    pub llm_chain: Vec<ChainStepConfig>,
    pub iterations: u32,
    pub synthesis_provider_id: String,
    pub selected_folders: Vec<String>,
    pub status: SequenceStatus,
    pub total_cost: f64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Sequence {
    pub fn from_new(new: NewSequence, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_objective: new.task_objective,
            initial_prompt: new.initial_prompt,
            llm_chain: new.llm_chain,
            iterations: new.iterations,
            synthesis_provider_id: new.synthesis_provider_id,
            selected_folders: new.selected_folders,
            status: SequenceStatus::Pending,
            total_cost: 0.0,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_sequence_shape(
            &self.initial_prompt,
            &self.llm_chain,
            self.iterations,
            &self.synthesis_provider_id,
        )
    }

    /// Distinct agents referenced by the chain, in first-appearance order.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for step in &self.llm_chain {
            if let Some(agent_id) = &step.agent_id {
                if !ids.contains(agent_id) {
                    ids.push(agent_id.clone());
                }
            }
        }
        ids
    }
}

/// File or code emitted by a provider alongside its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// One executed provider call within a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: String,
    pub sequence_id: String,
    pub iteration_number: u32,
    pub step_number: u32,
    pub provider_id: String,
    pub agent_id: Option<String>,
    pub input_prompt: String,
    pub output_content: String,
    pub tokens_used: u64,
    pub cost: f64,
    pub response_time_ms: u64,
    pub status: StepStatus,
    pub is_synthesis: bool,
    pub error: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl SequenceStep {
    /// A step about to be dispatched.
    pub fn running(
        sequence_id: &str,
        iteration_number: u32,
        step_number: u32,
        provider_id: &str,
        agent_id: Option<String>,
        input_prompt: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: sequence_id.to_string(),
            iteration_number,
            step_number,
            provider_id: provider_id.to_string(),
            agent_id,
            input_prompt,
            output_content: String::new(),
            tokens_used: 0,
            cost: 0.0,
            response_time_ms: 0,
            status: StepStatus::Running,
            is_synthesis: step_number == SYNTHESIS_STEP_NUMBER,
            error: None,
            artifacts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transcript line used for iteration context and synthesis input.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.provider_id, self.output_content)
    }
}

/// Terminal result of a dispatched step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub status: StepStatus,
    pub output_content: String,
    pub tokens_used: u64,
    pub cost: f64,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub artifacts: Vec<Artifact>,
}

impl StepResult {
    /// Failed result with a placeholder output. Failed steps carry no cost.
    pub fn failed(provider_id: &str, error: impl std::fmt::Display, response_time_ms: u64) -> Self {
        let error = error.to_string();
        Self {
            status: StepStatus::Failed,
            output_content: format!("[{} did not respond: {}]", provider_id, error),
            tokens_used: 0,
            cost: 0.0,
            response_time_ms,
            error: Some(error),
            artifacts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personality_rejects_duplicate() {
        let err = Personality::new(PersonalityTrait::Creative, Some(PersonalityTrait::Creative))
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicatePersonality("creative".into()));

        assert!(Personality::new(PersonalityTrait::Creative, Some(PersonalityTrait::Skeptical)).is_ok());
        assert!(Personality::new(PersonalityTrait::Creative, None).is_ok());
    }

    #[test]
    fn test_trait_parse() {
        for t in PersonalityTrait::ALL {
            assert_eq!(t.as_str().parse::<PersonalityTrait>().unwrap(), t);
        }
        assert_eq!("Analytical".parse::<PersonalityTrait>().unwrap(), PersonalityTrait::Analytical);
        assert!("grumpy".parse::<PersonalityTrait>().is_err());
    }

    #[test]
    fn test_sequence_status_transitions() {
        use SequenceStatus::*;

        assert_eq!(Pending.transition(Running).unwrap(), Running);
        assert_eq!(Running.transition(Completed).unwrap(), Completed);
        assert_eq!(Running.transition(Failed).unwrap(), Failed);

        assert!(Pending.transition(Completed).is_err());
        assert!(Completed.transition(Running).is_err());
        assert!(Failed.transition(Pending).is_err());
        assert!(Running.transition(Pending).is_err());
    }

    #[test]
    fn test_step_status_transitions() {
        use StepStatus::*;

        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_scores_are_clamped() {
        let item = KnowledgeItem::from_new(
            NewKnowledge::new("agent-1", KnowledgeType::Fact, "x")
                .with_confidence(150.0)
                .with_relevance(-3.0),
            Utc::now(),
        );
        assert_eq!(item.confidence, 100.0);
        assert_eq!(item.relevance_score, 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_sequence_validation() {
        let mut new = NewSequence {
            task_objective: "Plan launch".into(),
            initial_prompt: "How do we launch?".into(),
            llm_chain: vec![ChainStepConfig::new("a")],
            iterations: 1,
            synthesis_provider_id: "a".into(),
            selected_folders: Vec::new(),
        };
        assert!(new.validate().is_ok());

        new.iterations = 0;
        assert_eq!(new.validate().unwrap_err(), ValidationError::ZeroIterations);

        new.iterations = 2;
        new.llm_chain = vec![ChainStepConfig::new("a"); MAX_CHAIN_LENGTH + 1];
        assert!(matches!(new.validate().unwrap_err(), ValidationError::ChainTooLong { .. }));

        new.llm_chain.clear();
        assert_eq!(new.validate().unwrap_err(), ValidationError::EmptyChain);
    }

    #[test]
    fn test_synthesis_sentinel_flagged() {
        let step = SequenceStep::running("seq", 2, SYNTHESIS_STEP_NUMBER, "judge", None, "p".into());
        assert!(step.is_synthesis);

        let step = SequenceStep::running("seq", 1, 0, "a", None, "p".into());
        assert!(!step.is_synthesis);
    }

    #[test]
    fn test_agent_ids_distinct_in_order() {
        let seq = Sequence::from_new(
            NewSequence {
                task_objective: "t".into(),
                initial_prompt: "p".into(),
                llm_chain: vec![
                    ChainStepConfig::new("a").with_agent("bob"),
                    ChainStepConfig::new("b"),
                    ChainStepConfig::new("c").with_agent("alice"),
                    ChainStepConfig::new("d").with_agent("bob"),
                ],
                iterations: 1,
                synthesis_provider_id: "a".into(),
                selected_folders: Vec::new(),
            },
            Utc::now(),
        );
        assert_eq!(seq.agent_ids(), vec!["bob".to_string(), "alice".to_string()]);
    }
}
