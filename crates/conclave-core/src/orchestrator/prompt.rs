//! Prompt assembly for iterations, steps, and synthesis.

use crate::memory::MemoryRecall;
use crate::types::SequenceStep;

/// `<providerId>: <outputContent>` per step, in the order given.
pub fn transcript<'a>(steps: impl IntoIterator<Item = &'a SequenceStep>) -> String {
    steps
        .into_iter()
        .filter(|step| !step.is_synthesis)
        .map(SequenceStep::transcript_line)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First iteration: documents (if any) followed by the initial prompt.
pub fn first_iteration_input(initial_prompt: &str, documents: &str) -> String {
    if documents.trim().is_empty() {
        initial_prompt.to_string()
    } else {
        format!("Reference documents:\n{}\n\n{}", documents.trim_end(), initial_prompt)
    }
}

/// Later iterations: the previous iteration's transcript followed by the initial prompt.
pub fn iteration_input(initial_prompt: &str, previous: &[SequenceStep]) -> String {
    format!(
        "Previous round of discussion:\n{}\n\n{}",
        transcript(previous),
        initial_prompt
    )
}

/// Advisory memory block. Empty recall renders as nothing.
pub fn render_recall(recall: &MemoryRecall) -> String {
    if recall.is_empty() {
        return String::new();
    }

    let mut out = String::from("Relevant memory (advisory):\n");
    for item in &recall.knowledge {
        out.push_str(&format!(
            "- [{} {:.0}%] {}\n",
            item.knowledge_type, item.confidence, item.content
        ));
    }
    for exp in &recall.experiences {
        out.push_str(&format!(
            "- past {}: {} -> {}\n",
            exp.experience_type, exp.context, exp.outcome
        ));
    }
    for insight in &recall.contextual_insights {
        out.push_str(&format!("Note: {}\n", insight));
    }
    for action in &recall.suggested_actions {
        out.push_str(&format!("Suggestion: {}\n", action));
    }
    out
}

/// Conditioning, then memory, then the shared iteration input.
pub fn step_prompt(input: &str, conditioning: &str, memory: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    for part in [conditioning, memory] {
        let part = part.trim_end();
        if !part.is_empty() {
            parts.push(part);
        }
    }
    parts.push(input);
    parts.join("\n\n")
}

pub fn synthesis_prompt(task_objective: &str, steps: &[SequenceStep]) -> String {
    format!(
        "Objective: {}\n\n\
         Synthesize the discussion below into a single final answer. \
         Resolve disagreements, keep what is useful, and drop what is not.\n\n{}",
        task_objective,
        transcript(steps)
    )
}
