//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Conclave CLI
///
/// Runs multi-provider meetings and manages per-agent memory.
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a sequence file and run it to completion
    Run(RunCommand),

    /// Inspect and start stored sequences
    Sequence(SequenceCommand),

    /// Agent management (create, list, archive, delete)
    Agent(AgentCommand),

    /// Agent memory (knowledge, experiences, recall, expertise)
    Memory(MemoryCommand),

    /// Fail steps and sequences left running by a previous process
    Recover,

    /// Print the effective configuration
    Config,

    /// Show version information
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct RunCommand {
    /// Sequence definition (TOML)
    pub file: PathBuf,

    /// Root directory that `selected_folders` resolve against
    #[arg(short, long)]
    pub documents: Option<PathBuf>,

    /// Dispatch chain steps one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Print the full transcript after the synthesis
    #[arg(short, long)]
    pub transcript: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SequenceCommand {
    #[command(subcommand)]
    pub action: SequenceAction,
}

#[derive(Subcommand, Debug)]
pub enum SequenceAction {
    /// List recent sequences
    List {
        /// Maximum sequences to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a sequence with its transcript and synthesis
    Show {
        /// Sequence ID
        id: String,

        /// Include input prompts
        #[arg(short, long)]
        prompts: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and store a sequence without running it
    Submit {
        /// Sequence definition (TOML)
        file: PathBuf,
    },

    /// Run a pending sequence
    Start {
        /// Sequence ID
        id: String,

        /// Root directory that `selected_folders` resolve against
        #[arg(short, long)]
        documents: Option<PathBuf>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AgentCommand {
    #[command(subcommand)]
    pub action: AgentAction,
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Create an agent
    Create {
        /// Display name
        name: String,

        /// Primary personality trait (analytical, creative, pragmatic, ...)
        #[arg(short, long)]
        primary: String,

        /// Secondary personality trait
        #[arg(short, long)]
        secondary: Option<String>,

        /// Always argue against the emerging consensus
        #[arg(long)]
        devils_advocate: bool,

        /// Preferred provider ID
        #[arg(long)]
        provider: Option<String>,
    },

    /// List agents
    List {
        /// Include archived agents
        #[arg(short, long)]
        all: bool,
    },

    /// Show one agent
    Show {
        /// Agent ID
        id: String,
    },

    /// Archive an agent (keeps its memory)
    Archive {
        /// Agent ID
        id: String,
    },

    /// Delete an agent and all of its memory
    Delete {
        /// Agent ID
        id: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MemoryCommand {
    #[command(subcommand)]
    pub action: MemoryAction,
}

#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Store knowledge (similar knowledge is reinforced instead)
    Store {
        /// Agent ID
        agent: String,

        /// Knowledge content
        content: String,

        /// Knowledge type (fact, pattern, preference, skill, insight, correction, context)
        #[arg(short = 't', long = "type", default_value = "fact")]
        knowledge_type: String,

        /// Specialty ID
        #[arg(short, long)]
        specialty: Option<String>,

        /// Confidence 0-100
        #[arg(long, default_value = "50")]
        confidence: f64,

        /// Relevance 0-100
        #[arg(long, default_value = "50")]
        relevance: f64,

        /// Tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Recall knowledge and experiences relevant to a query
    Recall {
        /// Agent ID
        agent: String,

        /// Query text
        query: String,

        /// Restrict to a specialty
        #[arg(short, long)]
        specialty: Option<String>,

        /// Maximum results per set
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reinforce knowledge that was applied successfully
    Reinforce {
        /// Agent ID
        agent: String,

        /// Knowledge ID
        id: String,

        /// Where the knowledge was applied
        #[arg(short, long, default_value = "manual reinforcement")]
        context: String,
    },

    /// Correct knowledge that turned out wrong
    Correct {
        /// Agent ID
        agent: String,

        /// Knowledge ID
        id: String,

        /// Corrected content
        correction: String,

        /// What went wrong
        #[arg(short, long, default_value = "manual correction")]
        context: String,
    },

    /// Record an experience and derive insights from it
    Experience {
        /// Agent ID
        agent: String,

        /// What happened
        context: String,

        /// How it turned out
        outcome: String,

        /// Experience type (success, failure, learning, ...)
        #[arg(short = 't', long = "type", default_value = "learning")]
        experience_type: String,

        /// Specialty ID
        #[arg(short, long)]
        specialty: Option<String>,

        /// Impact 0-100
        #[arg(long, default_value = "50")]
        impact: f64,

        /// Emotional response
        #[arg(long, default_value = "neutral")]
        emotion: String,

        /// Lessons learned (comma-separated)
        #[arg(long, value_delimiter = ',')]
        lessons: Vec<String>,
    },

    /// Forget low-confidence knowledge that has not been used recently
    Forget {
        /// Agent ID
        agent: String,
    },

    /// Show an agent's expertise profile
    Profile {
        /// Agent ID
        agent: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show memory statistics
    Stats {
        /// Agent ID
        agent: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_memory_store() {
        let cli = Cli::try_parse_from([
            "conclave", "memory", "store", "agent-1", "use WAL mode", "-t", "pattern",
            "--tags", "sqlite,perf",
        ])
        .unwrap();

        match cli.command {
            Commands::Memory(MemoryCommand {
                action: MemoryAction::Store { agent, knowledge_type, tags, confidence, .. },
            }) => {
                assert_eq!(agent, "agent-1");
                assert_eq!(knowledge_type, "pattern");
                assert_eq!(tags, vec!["sqlite", "perf"]);
                assert_eq!(confidence, 50.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["conclave", "run", "meeting.toml", "--sequential"]).unwrap();
        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.file, PathBuf::from("meeting.toml"));
                assert!(cmd.sequential);
                assert!(cmd.documents.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
