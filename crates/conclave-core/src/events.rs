//! Progress and mood events.
//!
//! Sinks are fire-and-forget: `emit` never blocks and never reports failure
//! back to the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SequenceStarted,
    IterationStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    SynthesisStarted,
    SequenceCompleted,
    SequenceFailed,
    AgentMood,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequenceStarted => "sequence_started",
            Self::IterationStarted => "iteration_started",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::SynthesisStarted => "synthesis_started",
            Self::SequenceCompleted => "sequence_completed",
            Self::SequenceFailed => "sequence_failed",
            Self::AgentMood => "agent_mood",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One emitted event. `session_id` is the sequence id for orchestrator events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub agent_id: Option<String>,
    pub session_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, session_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type,
            agent_id: None,
            session_id: session_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }
}

/// Receiver of orchestrator events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: Event) {}
}

/// Logs events through `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        tracing::debug!(
            event_type = %event.event_type,
            session_id = %event.session_id,
            agent_id = event.agent_id.as_deref().unwrap_or("-"),
            data = %event.data,
            "event"
        );
    }
}

/// Forwards events into an unbounded channel. Send errors are ignored.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
