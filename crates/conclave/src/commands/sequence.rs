//! Sequence inspection and manual start.

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use conclave_core::events::NoopEventSink;
use conclave_core::types::{SequenceStatus, SequenceStep, StepStatus};

use crate::app;
use crate::cli::{SequenceAction, SequenceCommand};
use crate::commands::{preview, short_id};
use crate::config::Config;

/// Execute sequence command.
pub async fn execute(cmd: SequenceCommand, config: &Config) -> Result<()> {
    match cmd.action {
        SequenceAction::List { limit } => list(limit, config),
        SequenceAction::Show { id, prompts, json } => show(&id, prompts, json, config),
        SequenceAction::Submit { file } => submit(&file, config),
        SequenceAction::Start { id, documents } => {
            let documents = documents.or_else(|| config.documents_dir.clone());
            super::run::drive(config, &id, documents, false, false, false).await
        }
    }
}

fn list(limit: usize, config: &Config) -> Result<()> {
    let orchestrator = app::orchestrator(config, Arc::new(NoopEventSink), None, false)?;
    let sequences = orchestrator
        .list_sequences(limit)
        .context("Failed to list sequences")?;

    if sequences.is_empty() {
        println!("{} No sequences found", "⚠".yellow());
        return Ok(());
    }

    println!("{} {} sequence(s):", "✓".green(), sequences.len());
    println!();
    for sequence in &sequences {
        println!(
            "  {} {:<10} ${:<8.4} {}",
            short_id(&sequence.id).cyan(),
            status_label(sequence.status),
            sequence.total_cost,
            preview(&sequence.task_objective, 60)
        );
    }

    Ok(())
}

fn show(id: &str, prompts: bool, json: bool, config: &Config) -> Result<()> {
    let orchestrator = app::orchestrator(config, Arc::new(NoopEventSink), None, false)?;
    let sequence = orchestrator
        .get_sequence(id)
        .with_context(|| format!("Sequence not found: {}", id))?;
    let steps = orchestrator.transcript(id).context("Failed to load transcript")?;

    if json {
        let output = serde_json::json!({
            "sequence": sequence,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Sequence".bold());
    println!("  ID:         {}", sequence.id.cyan());
    println!("  Objective:  {}", sequence.task_objective);
    println!("  Status:     {}", status_label(sequence.status));
    println!(
        "  Chain:      {}",
        sequence
            .llm_chain
            .iter()
            .map(|step| step.provider_id.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    );
    println!("  Iterations: {}", sequence.iterations);
    println!("  Cost:       ${:.4}", sequence.total_cost);
    println!(
        "  Created:    {}",
        sequence.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed_at) = sequence.completed_at {
        println!("  Finished:   {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(reason) = &sequence.failure_reason {
        println!("  Reason:     {}", reason.red());
    }
    println!();

    print_steps(&steps, prompts);
    Ok(())
}

fn submit(file: &std::path::Path, config: &Config) -> Result<()> {
    let new = app::read_sequence(file)?;
    let orchestrator = app::orchestrator(config, Arc::new(NoopEventSink), None, false)?;
    let sequence = orchestrator.submit(new).context("Failed to submit sequence")?;

    println!("{} Submitted sequence {}", "✓".green(), sequence.id.cyan());
    println!("  Start it with: conclave sequence start {}", sequence.id);
    Ok(())
}

/// Print steps in transcript order, synthesis last.
pub(crate) fn print_steps(steps: &[SequenceStep], prompts: bool) {
    let mut iteration = 0;
    for step in steps {
        if step.is_synthesis {
            println!("{}", "── Synthesis ──".bold());
        } else if step.iteration_number != iteration {
            iteration = step.iteration_number;
            println!("{}", format!("── Iteration {} ──", iteration).bold());
        }

        let marker = match step.status {
            StepStatus::Completed => "✓".green(),
            StepStatus::Failed => "✗".red(),
            _ => "…".yellow(),
        };
        let agent = step
            .agent_id
            .as_deref()
            .map(|id| format!(" ({})", short_id(id)))
            .unwrap_or_default();
        println!(
            "{} {}{} [{} ms, ${:.4}]",
            marker,
            step.provider_id.cyan(),
            agent,
            step.response_time_ms,
            step.cost
        );
        if prompts {
            println!("{}", "  prompt:".dimmed());
            for line in step.input_prompt.lines() {
                println!("    {}", line.dimmed());
            }
        }
        for line in step.output_content.lines() {
            println!("  {}", line);
        }
        println!();
    }
}

fn status_label(status: SequenceStatus) -> colored::ColoredString {
    match status {
        SequenceStatus::Pending => status.as_str().yellow(),
        SequenceStatus::Running => status.as_str().cyan(),
        SequenceStatus::Completed => status.as_str().green(),
        SequenceStatus::Failed => status.as_str().red(),
    }
}
