//! Command implementations for the conclave CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod agent;
pub mod memory;
pub mod recover;
pub mod run;
pub mod sequence;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;

/// Print the effective configuration as TOML.
pub fn show_config(config: &Config) -> Result<()> {
    println!("{} {}", "Config file:".bold(), Config::config_path().display());
    println!();
    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", rendered);
    Ok(())
}

/// Shorten an id for table output.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate text to one line of at most `max` characters.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_preview_truncates_first_line() {
        assert_eq!(preview("first line\nsecond", 80), "first line");
        assert_eq!(preview("abcdefghij", 8), "abcde...");
    }
}
