//! conclave-core - Core library for Conclave
//!
//! Runs multi-provider "meetings" and keeps per-agent memory:
//!
//! - **orchestrator**: Sequence execution across iterations plus synthesis
//! - **memory**: Knowledge, experiences, recall, decay, and expertise profiles
//! - **provider**: Provider adapter trait, registry, echo and HTTP adapters
//! - **db**: SQLite implementation of the [`store::Store`] interface
//! - **events**: Fire-and-forget progress and mood events
//! - **context**: Document context for the first iteration

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{CoreConfig, MemoryConfig, OrchestratorConfig};
pub use db::Database;
pub use error::{Error, ProviderError, Result, ValidationError};
pub use memory::{MemoryEngine, MemoryRecall, RecallOptions};
pub use orchestrator::Orchestrator;
pub use provider::{Provider, ProviderRegistry};
pub use store::Store;
