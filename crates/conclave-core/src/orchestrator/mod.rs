//! Sequence orchestrator ("meeting" engine).
//!
//! Runs a chain of provider calls across N iterations and finishes with one
//! synthesis call over the whole transcript.
//!
//! ```text
//!  submit ──▶ pending ──run_sequence──▶ running ──▶ completed | failed
//!
//!  iteration 1      initial prompt + documents + per-step memory recall
//!  iteration k>1    transcript of iteration k-1 + initial prompt
//!  each step        conditioning + input ─▶ provider (timeout) ─▶ step row
//!  synthesis        transcript of every iteration ─▶ synthesis provider
//! ```
//!
//! Provider failures and timeouts are absorbed per step. Only a failed
//! synthesis (or a cancellation) fails the whole sequence. Storage errors
//! propagate to the caller.

pub mod conditioning;
pub mod prompt;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::context::{DocumentSource, NoDocuments, render_documents};
use crate::error::{Error, ProviderError, Result, ValidationError};
use crate::events::{Event, EventSink, EventType, NoopEventSink};
use crate::memory::{MemoryEngine, RecallOptions};
use crate::provider::ProviderRegistry;
use crate::store::{RecoveryReport, Store};
use crate::types::{
    Agent, ChainStepConfig, ExperienceType, NewExperience, NewSequence, SYNTHESIS_STEP_NUMBER,
    Sequence, SequenceStatus, SequenceStep, StepResult, StepStatus,
};

/// Failure reason recorded by crash recovery.
pub const INTERRUPTED: &str = "interrupted";

/// Drives sequences through their lifecycle.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    providers: ProviderRegistry,
    memory: MemoryEngine,
    events: Arc<dyn EventSink>,
    documents: Arc<dyn DocumentSource>,
    config: OrchestratorConfig,
    cancellations: Mutex<HashMap<String, String>>,
}

impl Orchestrator {
    pub fn new(memory: MemoryEngine, providers: ProviderRegistry, config: OrchestratorConfig) -> Self {
        Self {
            store: memory.store().clone(),
            providers,
            memory,
            events: Arc::new(NoopEventSink),
            documents: Arc::new(NoDocuments),
            config,
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = documents;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn memory(&self) -> &MemoryEngine {
        &self.memory
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission & queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and persist a new pending sequence.
    pub fn submit(&self, new: NewSequence) -> Result<Sequence> {
        new.validate()?;
        self.validate_references(&new.llm_chain, &new.synthesis_provider_id)?;

        let sequence = Sequence::from_new(new, Utc::now());
        self.store.insert_sequence(&sequence)?;
        info!(
            sequence_id = %sequence.id,
            chain = sequence.llm_chain.len(),
            iterations = sequence.iterations,
            "Submitted sequence"
        );
        Ok(sequence)
    }

    fn validate_references(&self, chain: &[ChainStepConfig], synthesis: &str) -> Result<()> {
        for (step, config) in chain.iter().enumerate() {
            if !self.providers.contains(&config.provider_id) {
                return Err(ValidationError::UnknownProvider {
                    step,
                    provider_id: config.provider_id.clone(),
                }
                .into());
            }
            if let Some(agent_id) = &config.agent_id {
                if self.store.get_agent(agent_id)?.is_none() {
                    return Err(ValidationError::UnknownAgent {
                        step,
                        agent_id: agent_id.clone(),
                    }
                    .into());
                }
            }
        }
        if !self.providers.contains(synthesis) {
            return Err(ValidationError::UnknownSynthesisProvider(synthesis.to_string()).into());
        }
        Ok(())
    }

    pub fn get_sequence(&self, sequence_id: &str) -> Result<Sequence> {
        self.store
            .get_sequence(sequence_id)?
            .ok_or_else(|| Error::not_found("Sequence", sequence_id))
    }

    pub fn list_sequences(&self, limit: usize) -> Result<Vec<Sequence>> {
        self.store.list_sequences(limit)
    }

    /// Every step of a sequence in (iteration, step number) order.
    pub fn transcript(&self, sequence_id: &str) -> Result<Vec<SequenceStep>> {
        self.store.list_steps(sequence_id)
    }

    pub fn synthesis(&self, sequence_id: &str) -> Result<Option<SequenceStep>> {
        Ok(self
            .store
            .list_steps(sequence_id)?
            .into_iter()
            .find(|step| step.is_synthesis))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cancellation & recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask a running sequence to stop. In-flight calls finish; nothing new is
    /// dispatched. Returns false if the sequence is not running.
    pub fn cancel(&self, sequence_id: &str, reason: impl Into<String>) -> Result<bool> {
        let sequence = self.get_sequence(sequence_id)?;
        if sequence.status != SequenceStatus::Running {
            return Ok(false);
        }
        let reason = reason.into();
        info!(sequence_id, reason = %reason, "Cancellation requested");
        self.cancellations
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .insert(sequence_id.to_string(), reason);
        Ok(true)
    }

    fn cancel_reason(&self, sequence_id: &str) -> Option<String> {
        self.cancellations
            .lock()
            .ok()
            .and_then(|map| map.get(sequence_id).cloned())
    }

    fn clear_cancel(&self, sequence_id: &str) {
        if let Ok(mut map) = self.cancellations.lock() {
            map.remove(sequence_id);
        }
    }

    /// Fail steps and sequences left `running` by a previous process.
    pub fn recover_stale_steps(&self) -> Result<RecoveryReport> {
        self.store.recover_interrupted(INTERRUPTED, Utc::now())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a pending sequence to a terminal state.
    ///
    /// A sequence that is not pending is returned unchanged.
    pub async fn run_sequence(&self, sequence_id: &str) -> Result<Sequence> {
        let sequence = self.get_sequence(sequence_id)?;
        if sequence.status != SequenceStatus::Pending {
            debug!(sequence_id, status = %sequence.status, "Sequence not pending, nothing to run");
            return Ok(sequence);
        }

        sequence.validate()?;
        self.validate_references(&sequence.llm_chain, &sequence.synthesis_provider_id)?;

        if !self.store.transition_sequence(
            sequence_id,
            SequenceStatus::Pending,
            SequenceStatus::Running,
        )? {
            debug!(sequence_id, "Sequence claimed by another runner");
            return self.get_sequence(sequence_id);
        }

        info!(
            sequence_id,
            chain = sequence.llm_chain.len(),
            iterations = sequence.iterations,
            "Sequence started"
        );
        self.emit(Event::new(
            EventType::SequenceStarted,
            sequence_id,
            json!({
                "iterations": sequence.iterations,
                "chain_length": sequence.llm_chain.len(),
            }),
        ));

        let outcome = self.execute(&sequence).await;
        self.clear_cancel(sequence_id);
        let (status, failure_reason) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.abandon(sequence_id, &e);
                return Err(e);
            }
        };

        let total_cost = self.store.total_step_cost(sequence_id)?;
        self.store.finish_sequence(
            sequence_id,
            status,
            total_cost,
            failure_reason.as_deref(),
            Utc::now(),
        )?;

        match status {
            SequenceStatus::Completed => {
                info!(sequence_id, total_cost, "Sequence completed");
                self.emit(Event::new(
                    EventType::SequenceCompleted,
                    sequence_id,
                    json!({ "total_cost": total_cost }),
                ));
            }
            _ => {
                warn!(sequence_id, reason = ?failure_reason, "Sequence failed");
                self.emit(Event::new(
                    EventType::SequenceFailed,
                    sequence_id,
                    json!({ "total_cost": total_cost, "reason": failure_reason }),
                ));
            }
        }

        let finished = self.get_sequence(sequence_id)?;
        self.record_participation(&finished);
        Ok(finished)
    }

    /// Best-effort terminal write after a storage error interrupted a run.
    fn abandon(&self, sequence_id: &str, error: &Error) {
        let reason = format!("persistence error: {}", error);
        error!(sequence_id, error = %error, "Sequence aborted by storage error");

        match self.store.list_steps(sequence_id) {
            Ok(steps) => {
                for step in steps.iter().filter(|step| !step.status.is_terminal()) {
                    let result = StepResult::failed(&step.provider_id, &reason, 0);
                    if let Err(e) = self.store.finish_step(&step.id, &result) {
                        warn!(step_id = %step.id, error = %e, "Failed to fail step");
                    }
                }
            }
            Err(e) => warn!(sequence_id, error = %e, "Failed to list steps"),
        }

        let total_cost = self.store.total_step_cost(sequence_id).unwrap_or_default();
        if let Err(e) = self.store.finish_sequence(
            sequence_id,
            SequenceStatus::Failed,
            total_cost,
            Some(&reason),
            Utc::now(),
        ) {
            warn!(sequence_id, error = %e, "Failed to mark sequence failed");
        }

        self.emit(Event::new(
            EventType::SequenceFailed,
            sequence_id,
            json!({ "total_cost": total_cost, "reason": reason }),
        ));
    }

    /// Iterations then synthesis. Returns the terminal status to persist.
    async fn execute(&self, sequence: &Sequence) -> Result<(SequenceStatus, Option<String>)> {
        let agents = self.load_agents(sequence);
        let documents = self.load_documents(sequence).await;
        let mut previous: Vec<SequenceStep> = Vec::new();

        for iteration in 1..=sequence.iterations {
            if let Some(reason) = self.cancel_reason(&sequence.id) {
                return Ok((SequenceStatus::Failed, Some(format!("cancelled: {}", reason))));
            }

            debug!(sequence_id = %sequence.id, iteration, "Iteration started");
            self.emit(Event::new(
                EventType::IterationStarted,
                &sequence.id,
                json!({ "iteration": iteration }),
            ));

            let input = if iteration == 1 {
                prompt::first_iteration_input(&sequence.initial_prompt, &documents)
            } else {
                prompt::iteration_input(&sequence.initial_prompt, &previous)
            };

            // Rows go in before dispatch so persisted order matches the chain.
            let mut rows = Vec::with_capacity(sequence.llm_chain.len());
            for (index, config) in sequence.llm_chain.iter().enumerate() {
                let agent = config.agent_id.as_ref().and_then(|id| agents.get(id));
                let memory = if iteration == 1 {
                    self.recall_context(config, &sequence.initial_prompt)
                } else {
                    String::new()
                };
                let conditioning = conditioning::render(
                    config.personality.as_ref().or(agent.map(|a| &a.personality)),
                    config.devils_advocate || agent.is_some_and(|a| a.is_devils_advocate),
                    config.custom_instructions.as_deref(),
                );
                let row = SequenceStep::running(
                    &sequence.id,
                    iteration,
                    index as u32,
                    &config.provider_id,
                    config.agent_id.clone(),
                    prompt::step_prompt(&input, &conditioning, &memory),
                );
                self.store.insert_step(&row)?;
                self.emit(
                    Event::new(
                        EventType::StepStarted,
                        &sequence.id,
                        json!({
                            "iteration": iteration,
                            "step": index,
                            "provider_id": config.provider_id,
                        }),
                    )
                    .with_agent(config.agent_id.clone()),
                );
                rows.push(row);
            }

            let results = if self.config.concurrent_steps {
                join_all(rows.iter().map(|row| self.dispatch(row))).await
            } else {
                let mut results = Vec::with_capacity(rows.len());
                for row in &rows {
                    match self.cancel_reason(&sequence.id) {
                        Some(reason) => results.push(StepResult::failed(
                            &row.provider_id,
                            format!("cancelled: {}", reason),
                            0,
                        )),
                        None => results.push(self.dispatch(row).await),
                    }
                }
                results
            };

            for (row, result) in rows.iter().zip(results.iter()) {
                self.store.finish_step(&row.id, result)?;
                self.emit_step_result(row, result);
            }

            previous = self
                .store
                .list_steps(&sequence.id)?
                .into_iter()
                .filter(|step| step.iteration_number == iteration && !step.is_synthesis)
                .collect();
        }

        if let Some(reason) = self.cancel_reason(&sequence.id) {
            return Ok((SequenceStatus::Failed, Some(format!("cancelled: {}", reason))));
        }

        self.synthesize(sequence).await
    }

    async fn synthesize(&self, sequence: &Sequence) -> Result<(SequenceStatus, Option<String>)> {
        let steps = self.store.list_steps(&sequence.id)?;
        let row = SequenceStep::running(
            &sequence.id,
            sequence.iterations,
            SYNTHESIS_STEP_NUMBER,
            &sequence.synthesis_provider_id,
            None,
            prompt::synthesis_prompt(&sequence.task_objective, &steps),
        );
        self.store.insert_step(&row)?;

        debug!(sequence_id = %sequence.id, provider = %row.provider_id, "Synthesis started");
        self.emit(Event::new(
            EventType::SynthesisStarted,
            &sequence.id,
            json!({ "provider_id": row.provider_id }),
        ));

        let result = self.dispatch(&row).await;
        self.store.finish_step(&row.id, &result)?;
        self.emit_step_result(&row, &result);

        Ok(match result.status {
            StepStatus::Completed => (SequenceStatus::Completed, None),
            _ => (
                SequenceStatus::Failed,
                Some(format!(
                    "synthesis failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                )),
            ),
        })
    }

    /// One provider call with the configured timeout. Never fails.
    async fn dispatch(&self, row: &SequenceStep) -> StepResult {
        let Some(provider) = self.providers.get(&row.provider_id) else {
            return StepResult::failed(
                &row.provider_id,
                ProviderError::UnknownProvider(row.provider_id.clone()),
                0,
            );
        };

        let timeout = self.config.step_timeout();
        let start = Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            provider.generate(&row.input_prompt, &self.config.generation),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(generation)) => StepResult {
                status: StepStatus::Completed,
                output_content: generation.content,
                tokens_used: generation.tokens_used,
                cost: generation.cost,
                response_time_ms: generation.response_time_ms,
                error: None,
                artifacts: generation.artifacts,
            },
            Ok(Err(e)) => {
                warn!(
                    sequence_id = %row.sequence_id,
                    iteration = row.iteration_number,
                    step = row.step_number,
                    provider = %row.provider_id,
                    error = %e,
                    "Provider call failed"
                );
                StepResult::failed(&row.provider_id, e, elapsed_ms)
            }
            Err(_) => {
                let e = ProviderError::timeout(timeout.as_millis() as u64);
                warn!(
                    sequence_id = %row.sequence_id,
                    iteration = row.iteration_number,
                    step = row.step_number,
                    provider = %row.provider_id,
                    "Provider call timed out"
                );
                StepResult::failed(&row.provider_id, e, elapsed_ms)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context & side effects
    // ─────────────────────────────────────────────────────────────────────────

    fn load_agents(&self, sequence: &Sequence) -> HashMap<String, Agent> {
        let mut agents = HashMap::new();
        for agent_id in sequence.agent_ids() {
            match self.store.get_agent(&agent_id) {
                Ok(Some(agent)) => {
                    agents.insert(agent_id, agent);
                }
                Ok(None) => warn!(agent_id = %agent_id, "Agent not found, running without persona"),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "Failed to load agent"),
            }
        }
        agents
    }

    async fn load_documents(&self, sequence: &Sequence) -> String {
        if sequence.selected_folders.is_empty() {
            return String::new();
        }
        match self.documents.documents(&sequence.selected_folders).await {
            Ok(docs) => render_documents(&docs),
            Err(e) => {
                warn!(sequence_id = %sequence.id, error = %e, "Document context unavailable");
                String::new()
            }
        }
    }

    fn recall_context(&self, config: &ChainStepConfig, query: &str) -> String {
        let Some(agent_id) = &config.agent_id else {
            return String::new();
        };
        let options = RecallOptions::from_config(self.memory.config())
            .with_limit(self.config.recall_limit)
            .with_specialty(config.specialty_id.clone());

        match self.memory.recall_memory(agent_id, query, &options) {
            Ok(recall) => prompt::render_recall(&recall),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Memory recall failed");
                String::new()
            }
        }
    }

    /// One experience per distinct agent in the chain. Best effort.
    fn record_participation(&self, sequence: &Sequence) {
        let steps = match self.store.list_steps(&sequence.id) {
            Ok(steps) => steps,
            Err(e) => {
                warn!(sequence_id = %sequence.id, error = %e, "Skipping experience recording");
                return;
            }
        };

        for agent_id in sequence.agent_ids() {
            let own: Vec<&SequenceStep> = steps
                .iter()
                .filter(|s| !s.is_synthesis && s.agent_id.as_deref() == Some(agent_id.as_str()))
                .collect();
            if own.is_empty() {
                continue;
            }
            let completed = own
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .count();

            let (experience_type, impact, emotion) = if completed == own.len() {
                (ExperienceType::Success, 70.0, "satisfied")
            } else if completed == 0 {
                (ExperienceType::Failure, 40.0, "frustrated")
            } else {
                (ExperienceType::Learning, 55.0, "reflective")
            };

            let specialty = sequence
                .llm_chain
                .iter()
                .find(|c| c.agent_id.as_deref() == Some(agent_id.as_str()))
                .and_then(|c| c.specialty_id.clone());

            let new = NewExperience::new(
                &agent_id,
                experience_type,
                format!("Participant in \"{}\"", sequence.task_objective),
                format!(
                    "{} of {} steps completed; sequence {}",
                    completed,
                    own.len(),
                    sequence.status
                ),
            )
            .with_session(&sequence.id)
            .with_specialty(specialty)
            .with_emotion(emotion)
            .with_impact(impact);

            if let Err(e) = self.memory.record_experience(new) {
                warn!(agent_id = %agent_id, error = %e, "Failed to record participation");
            }
        }
    }

    fn emit_step_result(&self, row: &SequenceStep, result: &StepResult) {
        let event_type = match result.status {
            StepStatus::Completed => EventType::StepCompleted,
            _ => EventType::StepFailed,
        };
        self.emit(
            Event::new(
                event_type,
                &row.sequence_id,
                json!({
                    "iteration": row.iteration_number,
                    "step": row.step_number,
                    "provider_id": row.provider_id,
                    "is_synthesis": row.is_synthesis,
                    "cost": result.cost,
                    "response_time_ms": result.response_time_ms,
                    "error": result.error,
                }),
            )
            .with_agent(row.agent_id.clone()),
        );

        if row.agent_id.is_some() {
            let mood = match result.status {
                StepStatus::Completed => "satisfied",
                _ => "frustrated",
            };
            self.emit(
                Event::new(
                    EventType::AgentMood,
                    &row.sequence_id,
                    json!({ "mood": mood, "step": row.step_number }),
                )
                .with_agent(row.agent_id.clone()),
            );
        }
    }

    fn emit(&self, event: Event) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::context::{Document, StaticDocuments};
    use crate::db::Database;
    use crate::events::ChannelEventSink;
    use crate::provider::{EchoProvider, GenerateOptions, Generation, Provider};
    use crate::types::{KnowledgeType, NewAgent, NewKnowledge, Personality, PersonalityTrait};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fixed cost per call; fails on the listed call numbers (1-based).
    struct ScriptedProvider {
        id: String,
        cost: f64,
        fail_on: HashSet<usize>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(id: &str, cost: f64) -> Self {
            Self {
                id: id.to_string(),
                cost,
                fail_on: HashSet::new(),
                delay: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, calls: &[usize]) -> Self {
            self.fail_on = calls.iter().copied().collect();
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerateOptions,
        ) -> std::result::Result<Generation, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.contains(&call) {
                return Err(ProviderError::api("boom", format!("{} call {}", self.id, call)));
            }
            Ok(Generation {
                content: format!("{} says #{}", self.id, call),
                tokens_used: 10,
                cost: self.cost,
                response_time_ms: 1,
                artifacts: Vec::new(),
            })
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        providers: HashMap<String, Arc<ScriptedProvider>>,
    }

    fn harness(providers: Vec<ScriptedProvider>, config: OrchestratorConfig) -> Harness {
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        let memory = MemoryEngine::new(store, MemoryConfig::default());
        let mut registry = ProviderRegistry::new();
        let mut handles = HashMap::new();
        for provider in providers {
            let provider = Arc::new(provider);
            handles.insert(provider.id.clone(), provider.clone());
            registry.register(provider);
        }
        Harness {
            orchestrator: Orchestrator::new(memory, registry, config),
            providers: handles,
        }
    }

    fn new_sequence(chain: &[&str], iterations: u32, synthesis: &str) -> NewSequence {
        NewSequence {
            task_objective: "Choose a database".into(),
            initial_prompt: "Which database should we use for analytics?".into(),
            llm_chain: chain.iter().map(|p| ChainStepConfig::new(*p)).collect(),
            iterations,
            synthesis_provider_id: synthesis.into(),
            selected_folders: Vec::new(),
        }
    }

    fn regular(steps: &[SequenceStep]) -> Vec<&SequenceStep> {
        steps.iter().filter(|s| !s.is_synthesis).collect()
    }

    #[tokio::test]
    async fn test_step_counts_and_sentinel() {
        for (chain_len, iterations) in [(1usize, 1u32), (3, 2), (5, 3)] {
            let ids: Vec<String> = (0..chain_len).map(|i| format!("p{}", i)).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let h = harness(
                ids.iter().map(|id| ScriptedProvider::new(id, 0.0)).collect(),
                OrchestratorConfig::default(),
            );

            let seq = h.orchestrator.submit(new_sequence(&refs, iterations, "p0")).unwrap();
            h.orchestrator.run_sequence(&seq.id).await.unwrap();

            let steps = h.orchestrator.transcript(&seq.id).unwrap();
            assert_eq!(regular(&steps).len(), chain_len * iterations as usize);

            let synthesis: Vec<&SequenceStep> = steps.iter().filter(|s| s.is_synthesis).collect();
            assert_eq!(synthesis.len(), 1);
            assert!(synthesis[0].step_number as usize >= chain_len);
            assert_eq!(synthesis[0].step_number, SYNTHESIS_STEP_NUMBER);
            assert_eq!(synthesis[0].iteration_number, iterations);
        }
    }

    #[tokio::test]
    async fn test_regular_failure_still_completes() {
        let h = harness(
            vec![
                ScriptedProvider::new("a", 0.1),
                ScriptedProvider::new("b", 0.2).failing_on(&[1]),
                ScriptedProvider::new("c", 0.3),
                ScriptedProvider::new("judge", 1.0),
            ],
            OrchestratorConfig::default(),
        );

        let seq = h.orchestrator.submit(new_sequence(&["a", "b", "c"], 2, "judge")).unwrap();
        let finished = h.orchestrator.run_sequence(&seq.id).await.unwrap();

        assert_eq!(finished.status, SequenceStatus::Completed);
        assert!(finished.completed_at.is_some());

        let steps = h.orchestrator.transcript(&seq.id).unwrap();
        let regular = regular(&steps);
        assert_eq!(regular.len(), 6);

        let failed: Vec<&&SequenceStep> = regular
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].provider_id, "b");
        assert_eq!(failed[0].iteration_number, 1);
        assert_eq!(failed[0].cost, 0.0);
        assert!(failed[0].output_content.starts_with("[b did not respond"));
        assert!(failed[0].error.is_some());

        // a,c twice at 0.1 + 0.3, b once at 0.2, synthesis 1.0
        let expected = 2.0 * 0.1 + 2.0 * 0.3 + 0.2 + 1.0;
        assert!((finished.total_cost - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_iff_synthesis_failed() {
        let h = harness(
            vec![
                ScriptedProvider::new("a", 0.5),
                ScriptedProvider::new("judge", 1.0).failing_on(&[1]),
            ],
            OrchestratorConfig::default(),
        );

        let seq = h.orchestrator.submit(new_sequence(&["a"], 2, "judge")).unwrap();
        let finished = h.orchestrator.run_sequence(&seq.id).await.unwrap();

        assert_eq!(finished.status, SequenceStatus::Failed);
        assert!(finished.failure_reason.unwrap().starts_with("synthesis failed"));
        assert_eq!(finished.total_cost, 1.0);

        let synthesis = h.orchestrator.synthesis(&seq.id).unwrap().unwrap();
        assert_eq!(synthesis.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_all_regular_steps_failed_still_completes() {
        let h = harness(
            vec![
                ScriptedProvider::new("a", 0.5).failing_on(&[1, 2]),
                ScriptedProvider::new("judge", 1.0),
            ],
            OrchestratorConfig::default(),
        );

        let seq = h.orchestrator.submit(new_sequence(&["a"], 2, "judge")).unwrap();
        let finished = h.orchestrator.run_sequence(&seq.id).await.unwrap();
        assert_eq!(finished.status, SequenceStatus::Completed);
        assert_eq!(finished.total_cost, 1.0);
    }

    #[tokio::test]
    async fn test_iteration_input_threads_previous_transcript() {
        let h = harness(
            vec![ScriptedProvider::new("a", 0.0), ScriptedProvider::new("b", 0.0)],
            OrchestratorConfig {
                concurrent_steps: false,
                ..Default::default()
            },
        );

        let seq = h.orchestrator.submit(new_sequence(&["a", "b"], 2, "a")).unwrap();
        h.orchestrator.run_sequence(&seq.id).await.unwrap();

        let b_prompts = h.providers["b"].prompts();
        assert_eq!(b_prompts[0], "Which database should we use for analytics?");
        assert_eq!(
            b_prompts[1],
            "Previous round of discussion:\na: a says #1\n\nb: b says #1\n\n\
             Which database should we use for analytics?"
        );

        let synthesis = h.orchestrator.synthesis(&seq.id).unwrap().unwrap();
        assert!(synthesis.input_prompt.ends_with(
            "a: a says #1\n\nb: b says #1\n\na: a says #2\n\nb: b says #2"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_keeps_chain_order() {
        let h = harness(
            vec![
                ScriptedProvider::new("slow", 0.0).delayed(Duration::from_millis(50)),
                ScriptedProvider::new("fast", 0.0),
                ScriptedProvider::new("judge", 0.0),
            ],
            OrchestratorConfig::default(),
        );

        let seq = h.orchestrator.submit(new_sequence(&["slow", "fast"], 1, "judge")).unwrap();
        h.orchestrator.run_sequence(&seq.id).await.unwrap();

        let steps = h.orchestrator.transcript(&seq.id).unwrap();
        let order: Vec<(&str, u32)> = steps
            .iter()
            .map(|s| (s.provider_id.as_str(), s.step_number))
            .collect();
        assert_eq!(
            order,
            vec![("slow", 0), ("fast", 1), ("judge", SYNTHESIS_STEP_NUMBER)]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_step_failure() {
        let h = harness(
            vec![
                ScriptedProvider::new("sleepy", 0.5).delayed(Duration::from_millis(200)),
                ScriptedProvider::new("judge", 0.0),
            ],
            OrchestratorConfig {
                step_timeout_ms: 20,
                ..Default::default()
            },
        );

        let seq = h.orchestrator.submit(new_sequence(&["sleepy"], 1, "judge")).unwrap();
        let finished = h.orchestrator.run_sequence(&seq.id).await.unwrap();
        assert_eq!(finished.status, SequenceStatus::Completed);

        let steps = h.orchestrator.transcript(&seq.id).unwrap();
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert!(steps[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());

        let seq = h.orchestrator.submit(new_sequence(&["a"], 1, "a")).unwrap();
        let first = h.orchestrator.run_sequence(&seq.id).await.unwrap();
        let second = h.orchestrator.run_sequence(&seq.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.providers["a"].calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.orchestrator.transcript(&seq.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_configuration() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());

        let err = h.orchestrator.submit(new_sequence(&["a", "ghost"], 1, "a")).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnknownProvider { step: 1, .. })
        ));

        let err = h.orchestrator.submit(new_sequence(&["a"], 1, "ghost")).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownSynthesisProvider(_))));

        let err = h.orchestrator.submit(new_sequence(&["a"], 0, "a")).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::ZeroIterations)));

        let mut bad_agent = new_sequence(&["a"], 1, "a");
        bad_agent.llm_chain[0].agent_id = Some("nobody".into());
        let err = h.orchestrator.submit(bad_agent).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownAgent { .. })));

        assert!(h.orchestrator.list_sequences(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_stored_sequence_stays_pending() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());

        let seq = Sequence::from_new(new_sequence(&["missing"], 1, "a"), Utc::now());
        h.orchestrator.store.insert_sequence(&seq).unwrap();

        assert!(h.orchestrator.run_sequence(&seq.id).await.is_err());
        let loaded = h.orchestrator.get_sequence(&seq.id).unwrap();
        assert_eq!(loaded.status, SequenceStatus::Pending);
    }

    #[tokio::test]
    async fn test_agent_memory_and_experiences() {
        let h = harness(
            vec![
                ScriptedProvider::new("a", 0.0),
                ScriptedProvider::new("b", 0.0).failing_on(&[1]),
                ScriptedProvider::new("judge", 0.0),
            ],
            OrchestratorConfig::default(),
        );
        let memory = h.orchestrator.memory().clone();

        let ada = memory
            .create_agent(NewAgent {
                name: "Ada".into(),
                personality: Personality::new(
                    PersonalityTrait::Analytical,
                    Some(PersonalityTrait::Skeptical),
                )
                .unwrap(),
                is_devils_advocate: true,
                preferred_provider_id: None,
            })
            .unwrap();
        let bob = memory
            .create_agent(NewAgent {
                name: "Bob".into(),
                personality: Personality::new(PersonalityTrait::Creative, None).unwrap(),
                is_devils_advocate: false,
                preferred_provider_id: None,
            })
            .unwrap();
        memory
            .store_knowledge(
                NewKnowledge::new(&ada.id, KnowledgeType::Fact, "Columnar databases suit analytics")
                    .with_relevance(90.0),
            )
            .unwrap();

        let mut new = new_sequence(&["a", "b"], 1, "judge");
        new.llm_chain[0].agent_id = Some(ada.id.clone());
        new.llm_chain[1].agent_id = Some(bob.id.clone());
        let seq = h.orchestrator.submit(new).unwrap();
        h.orchestrator.run_sequence(&seq.id).await.unwrap();

        let a_prompt = &h.providers["a"].prompts()[0];
        assert!(a_prompt.contains("Your primary perspective is analytical."));
        assert!(a_prompt.contains("devil's advocate"));
        assert!(a_prompt.contains("Columnar databases suit analytics"));

        let b_prompt = &h.providers["b"].prompts()[0];
        assert!(b_prompt.contains("Your primary perspective is creative."));
        assert!(!b_prompt.contains("Columnar"));

        let ada_exp = memory.store().list_experiences(&ada.id).unwrap();
        assert_eq!(ada_exp.len(), 1);
        assert_eq!(ada_exp[0].experience_type, ExperienceType::Success);
        assert_eq!(ada_exp[0].session_id.as_deref(), Some(seq.id.as_str()));

        let bob_exp = memory.store().list_experiences(&bob.id).unwrap();
        assert_eq!(bob_exp[0].experience_type, ExperienceType::Failure);
    }

    #[tokio::test]
    async fn test_documents_prefix_first_iteration() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());
        let orchestrator = h.orchestrator.with_documents(Arc::new(
            StaticDocuments::new().with_document("specs", Document::new("req.md", "Must be cheap")),
        ));

        let mut new = new_sequence(&["a"], 1, "a");
        new.selected_folders = vec!["specs".into()];
        let seq = orchestrator.submit(new).unwrap();
        orchestrator.run_sequence(&seq.id).await.unwrap();

        let prompt = &h.providers["a"].prompts()[0];
        assert!(prompt.starts_with("Reference documents:\n--- req.md ---\nMust be cheap"));
    }

    #[tokio::test]
    async fn test_cancel_marks_failed() {
        let h = harness(
            vec![
                ScriptedProvider::new("a", 0.0).delayed(Duration::from_millis(100)),
                ScriptedProvider::new("b", 0.0),
            ],
            OrchestratorConfig {
                concurrent_steps: false,
                ..Default::default()
            },
        );
        let orchestrator = Arc::new(h.orchestrator);

        let seq = orchestrator.submit(new_sequence(&["a", "b"], 3, "b")).unwrap();
        let runner = {
            let orchestrator = orchestrator.clone();
            let id = seq.id.clone();
            tokio::spawn(async move { orchestrator.run_sequence(&id).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(orchestrator.cancel(&seq.id, "user stopped").unwrap());

        let finished = runner.await.unwrap().unwrap();
        assert_eq!(finished.status, SequenceStatus::Failed);
        assert_eq!(finished.failure_reason.as_deref(), Some("cancelled: user stopped"));

        let steps = orchestrator.transcript(&seq.id).unwrap();
        assert!(steps.iter().all(|s| s.status.is_terminal()));
        assert!(steps.iter().all(|s| !s.is_synthesis));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].status, StepStatus::Failed);
        assert_eq!(h.providers["b"].calls.load(Ordering::SeqCst), 0);

        assert!(!orchestrator.cancel(&seq.id, "again").unwrap());
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());
        let orchestrator = h.orchestrator.with_events(Arc::new(sink));

        let seq = orchestrator.submit(new_sequence(&["a"], 1, "a")).unwrap();
        orchestrator.run_sequence(&seq.id).await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.session_id, seq.id);
            types.push(event.event_type);
        }
        assert_eq!(
            types,
            vec![
                EventType::SequenceStarted,
                EventType::IterationStarted,
                EventType::StepStarted,
                EventType::StepCompleted,
                EventType::SynthesisStarted,
                EventType::StepCompleted,
                EventType::SequenceCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_recover_stale_steps() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());
        let seq = h.orchestrator.submit(new_sequence(&["a"], 1, "a")).unwrap();

        h.orchestrator
            .store
            .transition_sequence(&seq.id, SequenceStatus::Pending, SequenceStatus::Running)
            .unwrap();
        h.orchestrator
            .store
            .insert_step(&SequenceStep::running(&seq.id, 1, 0, "a", None, "p".into()))
            .unwrap();

        let report = h.orchestrator.recover_stale_steps().unwrap();
        assert_eq!(report.steps_failed, 1);
        assert_eq!(report.sequences_failed, 1);

        let loaded = h.orchestrator.get_sequence(&seq.id).unwrap();
        assert_eq!(loaded.status, SequenceStatus::Failed);
        assert_eq!(loaded.failure_reason.as_deref(), Some(INTERRUPTED));
    }

    #[tokio::test]
    async fn test_storage_error_marks_sequence_failed() {
        let h = harness(vec![ScriptedProvider::new("a", 0.0)], OrchestratorConfig::default());
        let seq = h.orchestrator.submit(new_sequence(&["a"], 1, "a")).unwrap();

        // Occupies (iteration 1, step 0) so the first step insert conflicts.
        h.orchestrator
            .store
            .insert_step(&SequenceStep::running(&seq.id, 1, 0, "a", None, "x".into()))
            .unwrap();

        let err = h.orchestrator.run_sequence(&seq.id).await.unwrap_err();
        assert!(err.is_persistence());

        let loaded = h.orchestrator.get_sequence(&seq.id).unwrap();
        assert_eq!(loaded.status, SequenceStatus::Failed);
        assert!(loaded.completed_at.is_some());
        assert!(
            loaded
                .failure_reason
                .as_deref()
                .is_some_and(|r| r.starts_with("persistence error"))
        );

        let steps = h.orchestrator.transcript(&seq.id).unwrap();
        assert!(steps.iter().all(|s| s.status.is_terminal()));
    }

    #[tokio::test]
    async fn test_echo_provider_end_to_end() {
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        let memory = MemoryEngine::new(store, MemoryConfig::default());
        let registry = ProviderRegistry::new()
            .with(Arc::new(EchoProvider::new("left").with_cost(1.0)))
            .with(Arc::new(EchoProvider::new("right").with_cost(1.0)));
        let orchestrator = Orchestrator::new(memory, registry, OrchestratorConfig::default());

        let seq = orchestrator.submit(new_sequence(&["left", "right"], 2, "left")).unwrap();
        let finished = orchestrator.run_sequence(&seq.id).await.unwrap();

        assert_eq!(finished.status, SequenceStatus::Completed);
        let steps = orchestrator.transcript(&seq.id).unwrap();
        let sum: f64 = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.cost)
            .sum();
        assert!((finished.total_cost - sum).abs() < 1e-9);
        assert!(finished.total_cost > 0.0);
    }
}
