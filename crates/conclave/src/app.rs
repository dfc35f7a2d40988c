//! Wiring between the CLI configuration and conclave-core.
//!
//! Every command opens the same SQLite file; the orchestrator and memory
//! engine share one store handle.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use conclave_core::context::{DirectoryDocuments, DocumentSource, NoDocuments};
use conclave_core::events::EventSink;
use conclave_core::memory::ProviderInsightExtractor;
use conclave_core::{Database, MemoryEngine, Orchestrator, Store};

use crate::config::Config;

/// Open the configured database, creating it on first use.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database at {}", config.database_path.display())
    })?;
    Ok(Arc::new(db))
}

/// Memory engine without insight extraction.
pub fn memory_engine(config: &Config) -> Result<MemoryEngine> {
    Ok(MemoryEngine::new(open_store(config)?, config.memory.clone()))
}

/// Attach the configured insight provider, if any.
pub fn with_insights(engine: MemoryEngine, config: &Config) -> Result<MemoryEngine> {
    let Some(id) = &config.insight_provider else {
        return Ok(engine);
    };
    let registry = config.provider_registry()?;
    let provider = registry
        .get(id)
        .with_context(|| format!("Insight provider {} is not registered", id))?;
    Ok(engine.with_insight_extractor(Arc::new(ProviderInsightExtractor::new(provider))))
}

/// Orchestrator over the configured providers.
pub fn orchestrator(
    config: &Config,
    events: Arc<dyn EventSink>,
    documents: Option<&Path>,
    sequential: bool,
) -> Result<Orchestrator> {
    let providers = config
        .provider_registry()
        .context("Failed to configure providers")?;
    let memory = with_insights(memory_engine(config)?, config)?;

    let mut orchestrator_config = config.orchestrator.clone();
    if sequential {
        orchestrator_config.concurrent_steps = false;
    }

    let documents: Arc<dyn DocumentSource> = match documents.or(config.documents_dir.as_deref()) {
        Some(root) => Arc::new(DirectoryDocuments::new(root)),
        None => Arc::new(NoDocuments),
    };

    Ok(Orchestrator::new(memory, providers, orchestrator_config)
        .with_events(events)
        .with_documents(documents))
}

/// Parse a sequence definition file.
pub fn read_sequence(path: &Path) -> Result<conclave_core::types::NewSequence> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_sequence_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meeting.toml");
        std::fs::write(
            &path,
            r#"
task_objective = "Pick a storage engine"
initial_prompt = "SQLite or Postgres for a single-node service?"
iterations = 2
synthesis_provider_id = "echo"

[[llm_chain]]
provider_id = "echo"

[[llm_chain]]
provider_id = "echo"
devils_advocate = true
custom_instructions = "Focus on operations cost."
"#,
        )
        .unwrap();

        let sequence = read_sequence(&path).unwrap();
        assert_eq!(sequence.iterations, 2);
        assert_eq!(sequence.llm_chain.len(), 2);
        assert!(sequence.llm_chain[1].devils_advocate);
        assert!(sequence.selected_folders.is_empty());
        assert!(sequence.validate().is_ok());
    }

    #[tokio::test]
    async fn test_open_store_creates_database() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            database_path: dir.path().join("nested").join("conclave.db"),
            ..Config::default()
        };

        let orchestrator =
            orchestrator(&config, Arc::new(conclave_core::events::NoopEventSink), None, true)
                .unwrap();
        assert!(orchestrator.providers().contains("echo"));
        assert!(config.database_path.exists());
    }
}
