//! Run a sequence from a definition file.
//!
//! Progress is driven by orchestrator events on a channel; the drain task
//! ends once the orchestrator (the only sender) is dropped. Background
//! insight tasks are awaited before that so they finish before exit.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use conclave_core::events::{ChannelEventSink, Event, EventType, NoopEventSink};
use conclave_core::types::{Sequence, SequenceStatus};

use crate::app;
use crate::cli::RunCommand;
use crate::commands::sequence::print_steps;
use crate::config::Config;

/// Execute run command.
pub async fn execute(cmd: RunCommand, config: &Config) -> Result<()> {
    let new = app::read_sequence(&cmd.file)?;

    let documents = cmd
        .documents
        .clone()
        .or_else(|| config.documents_dir.clone())
        .or_else(|| cmd.file.parent().map(Path::to_path_buf));

    let submitted = app::orchestrator(config, Arc::new(NoopEventSink), None, false)?
        .submit(new)
        .context("Failed to submit sequence")?;

    if !cmd.json {
        println!("{} Submitted sequence {}", "✓".green(), submitted.id.cyan());
        println!(
            "  {} step(s) x {} iteration(s), synthesis by {}",
            submitted.llm_chain.len(),
            submitted.iterations,
            submitted.synthesis_provider_id.cyan()
        );
    }

    drive(config, &submitted.id, documents, cmd.sequential, cmd.json, cmd.transcript).await
}

/// Run a stored sequence with a progress bar and print the result.
pub(crate) async fn drive(
    config: &Config,
    sequence_id: &str,
    documents: Option<PathBuf>,
    sequential: bool,
    json: bool,
    show_transcript: bool,
) -> Result<()> {
    let (sink, events) = ChannelEventSink::new();
    let orchestrator = app::orchestrator(config, Arc::new(sink), documents.as_deref(), sequential)?;

    let pending = orchestrator
        .get_sequence(sequence_id)
        .context("Failed to load sequence")?;
    if pending.status != SequenceStatus::Pending {
        println!(
            "{} Sequence {} is already {}",
            "⚠".yellow(),
            sequence_id,
            pending.status.as_str()
        );
        return Ok(());
    }

    let bar = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total_steps(&pending))
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let drain = tokio::spawn(render_progress(events, bar.clone()));

    let finished = orchestrator.run_sequence(sequence_id).await;
    let steps = orchestrator.transcript(sequence_id);
    let synthesis = orchestrator.synthesis(sequence_id);
    let derived = orchestrator.memory().flush_insights().await;
    debug!(derived, "Insight tasks drained");
    drop(orchestrator);

    drain.await.context("Progress task failed")?;
    bar.finish_and_clear();

    let sequence = finished.context("Sequence run failed")?;
    let steps = steps.context("Failed to load transcript")?;
    let synthesis = synthesis.context("Failed to load synthesis")?;

    if json {
        let output = serde_json::json!({
            "sequence": sequence,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if show_transcript {
        let regular: Vec<_> = steps.iter().filter(|step| !step.is_synthesis).cloned().collect();
        println!();
        print_steps(&regular, false);
    }

    print_outcome(&sequence);
    if let Some(step) = synthesis {
        println!();
        println!("{}", "Synthesis".bold().underline());
        println!("{}", step.output_content);
    }

    Ok(())
}

fn total_steps(sequence: &Sequence) -> u64 {
    sequence.iterations as u64 * sequence.llm_chain.len() as u64 + 1
}

async fn render_progress(mut events: UnboundedReceiver<Event>, bar: ProgressBar) {
    while let Some(event) = events.recv().await {
        match event.event_type {
            EventType::IterationStarted => {
                bar.set_message(format!("iteration {}", event.data["iteration"]));
            }
            EventType::SynthesisStarted => bar.set_message("synthesizing"),
            EventType::StepCompleted => bar.inc(1),
            EventType::StepFailed => {
                bar.inc(1);
                bar.println(format!(
                    "{} {} did not respond: {}",
                    "✗".red(),
                    event.data["provider_id"].as_str().unwrap_or("provider"),
                    event.data["error"].as_str().unwrap_or("unknown error")
                ));
            }
            _ => {}
        }
    }
}

fn print_outcome(sequence: &Sequence) {
    println!();
    match sequence.status {
        SequenceStatus::Completed => {
            println!("{} Sequence {} completed", "✓".green(), sequence.id.cyan());
        }
        _ => {
            println!(
                "{} Sequence {} {}",
                "✗".red(),
                sequence.id.cyan(),
                sequence.status.as_str()
            );
            if let Some(reason) = &sequence.failure_reason {
                println!("  Reason: {}", reason);
            }
        }
    }
    println!("  Total cost: ${:.4}", sequence.total_cost);
}
