//! Agent memory commands.
//!
//! Uses the local SQLite database directly; no provider is contacted except
//! the configured insight provider when recording experiences.

use anyhow::{Context, Result};
use colored::Colorize;

use conclave_core::memory::{CompetencyLevel, RecallOptions};
use conclave_core::types::{
    ExperienceType, KnowledgeItem, KnowledgeType, NewExperience, NewKnowledge,
};

use crate::app;
use crate::cli::{MemoryAction, MemoryCommand};
use crate::commands::{preview, short_id};
use crate::config::Config;

/// Execute memory command.
pub async fn execute(cmd: MemoryCommand, config: &Config) -> Result<()> {
    match cmd.action {
        MemoryAction::Store {
            agent,
            content,
            knowledge_type,
            specialty,
            confidence,
            relevance,
            tags,
        } => {
            let knowledge_type: KnowledgeType =
                knowledge_type.parse().map_err(anyhow::Error::msg)?;
            let mut new = NewKnowledge::new(&agent, knowledge_type, content)
                .with_confidence(confidence)
                .with_relevance(relevance)
                .with_tags(tags);
            new.specialty_id = specialty;
            store(new, config)
        }

        MemoryAction::Recall {
            agent,
            query,
            specialty,
            limit,
            json,
        } => recall(&agent, &query, specialty, limit, json, config),

        MemoryAction::Reinforce { agent, id, context } => {
            let item = app::memory_engine(config)?
                .reinforce_knowledge(&agent, &id, &context)
                .context("Failed to reinforce knowledge")?;
            println!(
                "{} Reinforced {} (confidence {:.0})",
                "✓".green(),
                short_id(&item.id).cyan(),
                item.confidence
            );
            Ok(())
        }

        MemoryAction::Correct {
            agent,
            id,
            correction,
            context,
        } => {
            let outcome = app::memory_engine(config)?
                .correct_knowledge(&agent, &id, &context, &correction)
                .context("Failed to correct knowledge")?;
            println!(
                "{} Corrected {} (confidence now {:.0})",
                "✓".green(),
                short_id(&outcome.original.id).cyan(),
                outcome.original.confidence
            );
            println!("  Correction: {}", outcome.correction.id);
            Ok(())
        }

        MemoryAction::Experience {
            agent,
            context,
            outcome,
            experience_type,
            specialty,
            impact,
            emotion,
            lessons,
        } => {
            let experience_type: ExperienceType =
                experience_type.parse().map_err(anyhow::Error::msg)?;
            let new = NewExperience::new(&agent, experience_type, context, outcome)
                .with_specialty(specialty)
                .with_impact(impact)
                .with_emotion(emotion)
                .with_lessons(lessons);
            experience(new, config).await
        }

        MemoryAction::Forget { agent } => {
            let removed = app::memory_engine(config)?
                .forget_obsolete_knowledge(&agent)
                .context("Failed to forget knowledge")?;
            println!("{} Forgot {} obsolete item(s)", "✓".green(), removed);
            Ok(())
        }

        MemoryAction::Profile { agent, json } => profile(&agent, json, config),

        MemoryAction::Stats { agent } => stats(&agent, config),
    }
}

fn store(new: NewKnowledge, config: &Config) -> Result<()> {
    let outcome = app::memory_engine(config)?
        .store_knowledge(new)
        .context("Failed to store knowledge")?;

    let item = outcome.item();
    if outcome.was_deduplicated() {
        println!(
            "{} Reinforced similar knowledge {} (confidence {:.0})",
            "✓".green(),
            short_id(&item.id).cyan(),
            item.confidence
        );
    } else {
        println!("{} Stored {} knowledge", "✓".green(), item.knowledge_type.as_str().cyan());
        println!("  ID: {}", item.id);
    }
    Ok(())
}

fn recall(
    agent: &str,
    query: &str,
    specialty: Option<String>,
    limit: Option<usize>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let mut options = RecallOptions::from_config(&config.memory).with_specialty(specialty);
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }

    let recall = app::memory_engine(config)?
        .recall_memory(agent, query, &options)
        .context("Failed to recall memory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recall)?);
        return Ok(());
    }

    println!(
        "{} Relevance {} ({} knowledge, {} experiences)",
        "✓".green(),
        recall.relevance_score.to_string().bold(),
        recall.knowledge.len(),
        recall.experiences.len()
    );

    if !recall.knowledge.is_empty() {
        println!();
        println!("{}", "Knowledge".bold());
        for item in &recall.knowledge {
            print_knowledge(item);
        }
    }

    if !recall.experiences.is_empty() {
        println!();
        println!("{}", "Experiences".bold());
        for record in &recall.experiences {
            println!(
                "  {} {:<20} impact {:>3.0}  {}",
                short_id(&record.id).cyan(),
                record.experience_type.as_str(),
                record.impact_score,
                preview(&record.outcome, 60)
            );
        }
    }

    println!();
    for insight in &recall.contextual_insights {
        println!("  {} {}", "→".cyan(), insight);
    }
    for action in &recall.suggested_actions {
        println!("  {} {}", "!".yellow(), action);
    }

    Ok(())
}

async fn experience(new: NewExperience, config: &Config) -> Result<()> {
    let engine = app::memory_engine(config)?;
    let record = engine
        .record_experience(new)
        .context("Failed to record experience")?;
    println!("{} Recorded {} experience", "✓".green(), record.experience_type.as_str().cyan());
    println!("  ID: {}", record.id);

    if config.insight_provider.is_none() {
        return Ok(());
    }

    let engine = app::with_insights(engine, config)?;
    let derived = tokio::time::timeout(
        config.memory.insight_timeout(),
        engine.derive_insights(&record),
    )
    .await;

    match derived {
        Ok(Ok(items)) if items.is_empty() => {
            println!("{} No insights derived", "⚠".yellow());
        }
        Ok(Ok(items)) => {
            println!("{} Derived {} insight(s):", "✓".green(), items.len());
            for item in &items {
                println!("  {} {}", "→".cyan(), item.content);
            }
        }
        Ok(Err(e)) => println!("{} Insight extraction failed: {}", "⚠".yellow(), e),
        Err(_) => println!("{} Insight extraction timed out", "⚠".yellow()),
    }
    Ok(())
}

fn profile(agent: &str, json: bool, config: &Config) -> Result<()> {
    let profile = app::memory_engine(config)?
        .build_expertise_profile(agent)
        .context("Failed to build expertise profile")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    println!("{}", "Expertise Profile".bold());
    println!("  Overall:      {}", profile.overall_expertise);
    println!("  Velocity:     {}", profile.learning_velocity);
    println!("  Retention:    {}", profile.knowledge_retention);
    println!("  Adaptability: {}", profile.adaptability_score);

    if profile.specialties.is_empty() {
        println!();
        println!("{} No knowledge recorded yet", "⚠".yellow());
        return Ok(());
    }

    println!();
    for specialty in &profile.specialties {
        let level = match specialty.competency_level {
            CompetencyLevel::Expert => specialty.competency_level.as_str().green(),
            CompetencyLevel::Advanced => specialty.competency_level.as_str().cyan(),
            CompetencyLevel::Intermediate => specialty.competency_level.as_str().yellow(),
            CompetencyLevel::Beginner => specialty.competency_level.as_str().normal(),
        };
        println!(
            "  {} {} (confidence {}, {} items, {} experiences)",
            specialty.specialty_id.bold(),
            level,
            specialty.confidence_score,
            specialty.knowledge_depth,
            specialty.experience_count
        );
        if !specialty.strong_areas.is_empty() {
            println!("    strong:     {}", join_types(&specialty.strong_areas));
        }
        if !specialty.developing_areas.is_empty() {
            println!("    developing: {}", join_types(&specialty.developing_areas));
        }
    }
    Ok(())
}

fn stats(agent: &str, config: &Config) -> Result<()> {
    let stats = app::memory_engine(config)?
        .stats(agent)
        .context("Failed to get memory stats")?;

    println!("{}", "Memory Statistics".bold());
    println!("  Knowledge:   {}", stats.knowledge_count);
    println!("  Experiences: {}", stats.experience_count);
    println!("  Avg confidence: {:.1}", stats.average_confidence);
    println!("  Accesses:    {}", stats.total_accesses);
    if !stats.by_type.is_empty() {
        println!();
        println!("{}", "By type".bold());
        for (knowledge_type, count) in &stats.by_type {
            println!("  {:<12} {}", knowledge_type.as_str(), count);
        }
    }
    Ok(())
}

fn print_knowledge(item: &KnowledgeItem) {
    println!(
        "  {} {:<11} conf {:>3.0} rel {:>3.0}  {}",
        short_id(&item.id).cyan(),
        item.knowledge_type.as_str(),
        item.confidence,
        item.relevance_score,
        preview(&item.content, 60)
    );
}

fn join_types(types: &[KnowledgeType]) -> String {
    types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
}
