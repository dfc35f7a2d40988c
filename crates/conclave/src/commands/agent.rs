//! Agent management commands.

use anyhow::{Context, Result};
use colored::Colorize;

use conclave_core::types::{Agent, NewAgent, Personality, PersonalityTrait};

use crate::app;
use crate::cli::{AgentAction, AgentCommand};
use crate::commands::short_id;
use crate::config::Config;

/// Execute agent command.
pub fn execute(cmd: AgentCommand, config: &Config) -> Result<()> {
    match cmd.action {
        AgentAction::Create {
            name,
            primary,
            secondary,
            devils_advocate,
            provider,
        } => create(name, &primary, secondary.as_deref(), devils_advocate, provider, config),
        AgentAction::List { all } => list(all, config),
        AgentAction::Show { id } => show(&id, config),
        AgentAction::Archive { id } => {
            app::memory_engine(config)?
                .archive_agent(&id)
                .with_context(|| format!("Failed to archive agent {}", id))?;
            println!("{} Archived agent {}", "✓".green(), id.cyan());
            Ok(())
        }
        AgentAction::Delete { id } => {
            app::memory_engine(config)?
                .delete_agent(&id)
                .with_context(|| format!("Failed to delete agent {}", id))?;
            println!("{} Deleted agent {} and its memory", "✓".green(), id.cyan());
            Ok(())
        }
    }
}

fn create(
    name: String,
    primary: &str,
    secondary: Option<&str>,
    is_devils_advocate: bool,
    preferred_provider_id: Option<String>,
    config: &Config,
) -> Result<()> {
    let primary: PersonalityTrait = primary.parse()?;
    let secondary = secondary.map(str::parse::<PersonalityTrait>).transpose()?;

    if let Some(provider) = &preferred_provider_id {
        if !config.provider_registry()?.contains(provider) {
            println!(
                "{} Provider {} is not configured",
                "⚠".yellow(),
                provider.cyan()
            );
        }
    }

    let agent = app::memory_engine(config)?
        .create_agent(NewAgent {
            name,
            personality: Personality::new(primary, secondary)?,
            is_devils_advocate,
            preferred_provider_id,
        })
        .context("Failed to create agent")?;

    println!("{} Created agent {}", "✓".green(), agent.name.bold());
    println!("  ID: {}", agent.id);
    println!("  Personality: {}", personality_label(&agent.personality));
    if agent.is_devils_advocate {
        println!("  Devil's advocate: yes");
    }
    Ok(())
}

fn list(include_archived: bool, config: &Config) -> Result<()> {
    let agents = app::memory_engine(config)?
        .list_agents(include_archived)
        .context("Failed to list agents")?;

    if agents.is_empty() {
        println!("{} No agents found", "⚠".yellow());
        return Ok(());
    }

    println!("{} {} agent(s):", "✓".green(), agents.len());
    println!();
    for agent in &agents {
        print_agent_row(agent);
    }
    Ok(())
}

fn show(id: &str, config: &Config) -> Result<()> {
    let engine = app::memory_engine(config)?;
    let agent = engine
        .get_agent(id)
        .with_context(|| format!("Agent not found: {}", id))?;
    let stats = engine.stats(id).context("Failed to load memory stats")?;

    println!("{}", agent.name.bold());
    println!("  ID:          {}", agent.id);
    println!("  Personality: {}", personality_label(&agent.personality));
    println!(
        "  Provider:    {}",
        agent.preferred_provider_id.as_deref().unwrap_or("-")
    );
    println!(
        "  Devil's advocate: {}",
        if agent.is_devils_advocate { "yes" } else { "no" }
    );
    if agent.archived {
        println!("  {}", "archived".dimmed());
    }
    println!(
        "  Memory:      {} knowledge, {} experiences",
        stats.knowledge_count, stats.experience_count
    );
    println!("  Created:     {}", agent.created_at.format("%Y-%m-%d %H:%M"));
    Ok(())
}

fn print_agent_row(agent: &Agent) {
    let name = if agent.archived {
        agent.name.dimmed()
    } else {
        agent.name.normal()
    };
    let advocate = if agent.is_devils_advocate { " [devil's advocate]" } else { "" };
    println!(
        "  {} {} ({}){}",
        short_id(&agent.id).cyan(),
        name,
        personality_label(&agent.personality),
        advocate.magenta()
    );
}

fn personality_label(personality: &Personality) -> String {
    match personality.secondary {
        Some(secondary) => format!("{} / {}", personality.primary, secondary),
        None => personality.primary.to_string(),
    }
}
