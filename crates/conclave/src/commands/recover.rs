//! Crash recovery for sequences interrupted mid-run.

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use conclave_core::events::NoopEventSink;

use crate::app;
use crate::config::Config;

/// Execute recover command.
pub fn execute(config: &Config) -> Result<()> {
    let orchestrator = app::orchestrator(config, Arc::new(NoopEventSink), None, false)?;
    let report = orchestrator
        .recover_stale_steps()
        .context("Failed to recover interrupted sequences")?;

    if report.steps_failed == 0 && report.sequences_failed == 0 {
        println!("{} Nothing to recover", "✓".green());
        return Ok(());
    }

    println!(
        "{} Marked {} step(s) and {} sequence(s) as failed",
        "✓".green(),
        report.steps_failed,
        report.sequences_failed
    );
    Ok(())
}
