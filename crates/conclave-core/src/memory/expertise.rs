//! Expertise profile computation.
//!
//! Pure functions over an agent's knowledge and experiences. Specialties are
//! the union of those seen on knowledge and on experiences; records without a
//! specialty are grouped as [`GENERAL_SPECIALTY`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ExperienceRecord, ExperienceType, KnowledgeItem, KnowledgeType};

pub const GENERAL_SPECIALTY: &str = "general";

const LEARNING_WINDOW_DAYS: i64 = 30;
const RETENTION_AGE_DAYS: i64 = 30;
const MAX_AREAS: usize = 3;

/// Competency tier derived from average confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompetencyLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl CompetencyLevel {
    pub fn from_confidence(average: f64) -> Self {
        if average >= 90.0 {
            Self::Expert
        } else if average >= 75.0 {
            Self::Advanced
        } else if average >= 60.0 {
            Self::Intermediate
        } else {
            Self::Beginner
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
            Self::Expert => "Expert",
        }
    }
}

impl std::fmt::Display for CompetencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Competency within one specialty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyExpertise {
    pub specialty_id: String,
    pub competency_level: CompetencyLevel,
    pub knowledge_depth: usize,
    pub experience_count: usize,
    pub confidence_score: u32,
    pub strong_areas: Vec<KnowledgeType>,
    pub developing_areas: Vec<KnowledgeType>,
}

/// Aggregate expertise of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseProfile {
    pub agent_id: String,
    pub specialties: Vec<SpecialtyExpertise>,
    pub overall_expertise: u32,
    pub learning_velocity: u32,
    pub knowledge_retention: u32,
    pub adaptability_score: u32,
}

pub fn build_profile(
    agent_id: &str,
    knowledge: &[KnowledgeItem],
    experiences: &[ExperienceRecord],
    now: DateTime<Utc>,
) -> ExpertiseProfile {
    let mut groups: BTreeMap<&str, Vec<&KnowledgeItem>> = BTreeMap::new();
    for item in knowledge {
        groups
            .entry(item.specialty_id.as_deref().unwrap_or(GENERAL_SPECIALTY))
            .or_default()
            .push(item);
    }
    for record in experiences {
        groups
            .entry(record.specialty_id.as_deref().unwrap_or(GENERAL_SPECIALTY))
            .or_default();
    }

    let specialties: Vec<SpecialtyExpertise> = groups
        .into_iter()
        .map(|(specialty, items)| specialty_expertise(specialty, &items, experiences))
        .collect();

    let overall_expertise = if specialties.is_empty() {
        0
    } else {
        let sum: u32 = specialties.iter().map(|s| s.confidence_score).sum();
        (sum as f64 / specialties.len() as f64).round() as u32
    };

    let learning_cutoff = now - Duration::days(LEARNING_WINDOW_DAYS);
    let recent = knowledge
        .iter()
        .filter(|k| k.created_at >= learning_cutoff)
        .count();
    let learning_velocity = (recent * 5).min(100) as u32;

    let retention_cutoff = now - Duration::days(RETENTION_AGE_DAYS);
    let aged: Vec<f64> = knowledge
        .iter()
        .filter(|k| k.created_at < retention_cutoff)
        .map(|k| k.confidence)
        .collect();
    let knowledge_retention = mean(&aged).map(|m| m.round() as u32).unwrap_or(100);

    ExpertiseProfile {
        agent_id: agent_id.to_string(),
        specialties,
        overall_expertise,
        learning_velocity,
        knowledge_retention,
        adaptability_score: adaptability(experiences),
    }
}

fn specialty_expertise(
    specialty: &str,
    items: &[&KnowledgeItem],
    experiences: &[ExperienceRecord],
) -> SpecialtyExpertise {
    let confidences: Vec<f64> = items.iter().map(|k| k.confidence).collect();
    let average = mean(&confidences).unwrap_or(0.0);

    let experience_count = experiences
        .iter()
        .filter(|e| e.specialty_id.as_deref().unwrap_or(GENERAL_SPECIALTY) == specialty)
        .count();

    let mut by_confidence: Vec<&KnowledgeItem> = items.to_vec();
    by_confidence.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let strong_areas = distinct_types(by_confidence.iter().filter(|k| k.confidence > 80.0));
    let developing_areas =
        distinct_types(by_confidence.iter().rev().filter(|k| k.confidence < 60.0));

    SpecialtyExpertise {
        specialty_id: specialty.to_string(),
        competency_level: CompetencyLevel::from_confidence(average),
        knowledge_depth: items.len(),
        experience_count,
        confidence_score: average.round() as u32,
        strong_areas,
        developing_areas,
    }
}

fn distinct_types<'a>(items: impl Iterator<Item = &'a &'a KnowledgeItem>) -> Vec<KnowledgeType> {
    let mut areas = Vec::new();
    for item in items {
        if !areas.contains(&item.knowledge_type) {
            areas.push(item.knowledge_type);
            if areas.len() == MAX_AREAS {
                break;
            }
        }
    }
    areas
}

/// `round((variety + recovery) / 2)`.
fn adaptability(experiences: &[ExperienceRecord]) -> u32 {
    let distinct: BTreeSet<ExperienceType> =
        experiences.iter().map(|e| e.experience_type).collect();
    let variety = (distinct.len() * 20).min(100) as f64;

    let failures: Vec<&ExperienceRecord> = experiences
        .iter()
        .filter(|e| e.experience_type == ExperienceType::Failure)
        .collect();
    let recovery = if failures.is_empty() {
        100.0
    } else {
        let recovered = failures
            .iter()
            .filter(|failure| {
                experiences.iter().any(|e| {
                    e.experience_type == ExperienceType::Success
                        && e.created_at > failure.created_at
                })
            })
            .count();
        recovered as f64 / failures.len() as f64 * 100.0
    };

    ((variety + recovery) / 2.0).round() as u32
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
