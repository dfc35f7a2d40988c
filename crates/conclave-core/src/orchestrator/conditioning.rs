//! Personality conditioning templates.
//!
//! Deterministic text keyed by trait and the devil's-advocate flag. The same
//! inputs always render the same preamble.

use crate::types::{Personality, PersonalityTrait};

fn directive(personality: PersonalityTrait) -> &'static str {
    match personality {
        PersonalityTrait::Analytical => {
            "Break the problem into parts, reason from evidence, and quantify where you can."
        }
        PersonalityTrait::Creative => {
            "Look for unconventional angles and propose ideas others may not have considered."
        }
        PersonalityTrait::Pragmatic => {
            "Focus on what can actually be done, with the resources and time available."
        }
        PersonalityTrait::Empathetic => {
            "Consider the people affected and how each option would feel to them."
        }
        PersonalityTrait::Skeptical => {
            "Question assumptions and ask what evidence would prove each claim wrong."
        }
        PersonalityTrait::Visionary => {
            "Think about long-term consequences and where this could lead in the future."
        }
        PersonalityTrait::Methodical => {
            "Work step by step, keep the structure explicit, and do not skip details."
        }
        PersonalityTrait::Diplomatic => {
            "Find common ground between viewpoints and frame disagreements constructively."
        }
    }
}

const DEVILS_ADVOCATE: &str = "Act as devil's advocate: challenge the prevailing view, \
     point out weaknesses and risks, and argue the strongest opposing case.";

/// Render the conditioning preamble for one step. Empty when there is nothing to add.
pub fn render(
    personality: Option<&Personality>,
    devils_advocate: bool,
    custom_instructions: Option<&str>,
) -> String {
    let mut lines = Vec::new();

    if let Some(personality) = personality {
        lines.push(format!(
            "Your primary perspective is {}. {}",
            personality.primary,
            directive(personality.primary)
        ));
        if let Some(secondary) = personality.secondary {
            lines.push(format!(
                "Your secondary perspective is {}. {}",
                secondary,
                directive(secondary)
            ));
        }
    }

    if devils_advocate {
        lines.push(DEVILS_ADVOCATE.to_string());
    }

    if let Some(instructions) = custom_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        lines.push(format!("Additional instructions: {}", instructions));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_stable() {
        let personality =
            Personality::new(PersonalityTrait::Skeptical, Some(PersonalityTrait::Pragmatic)).unwrap();

        let first = render(Some(&personality), true, Some("Keep it short"));
        let second = render(Some(&personality), true, Some("Keep it short"));
        assert_eq!(first, second);

        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Your primary perspective is skeptical."));
        assert!(lines[1].starts_with("Your secondary perspective is pragmatic."));
        assert!(lines[2].contains("devil's advocate"));
        assert_eq!(lines[3], "Additional instructions: Keep it short");
    }

    #[test]
    fn test_every_trait_has_distinct_directive() {
        let mut seen = std::collections::HashSet::new();
        for t in PersonalityTrait::ALL {
            assert!(seen.insert(directive(t)));
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(None, false, None), "");
        assert_eq!(render(None, false, Some("   ")), "");
    }
}
