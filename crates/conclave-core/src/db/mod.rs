//! SQLite persistence for conclave.
//!
//! Timestamps are stored as Unix milliseconds. List fields (tags, lessons,
//! chain configuration, folders, artifacts) are stored as JSON text.

pub mod migrations;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{KnowledgeOrder, MemoryStats, RecoveryReport, Store};
use crate::types::{
    Agent, ExperienceRecord, KnowledgeItem, KnowledgeType, Personality, Sequence, SequenceStatus,
    SequenceStep, StepResult, StepStatus,
};

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened database");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row mappers
    // ─────────────────────────────────────────────────────────────────────────

    fn map_agent(row: &Row) -> rusqlite::Result<Agent> {
        let secondary: Option<String> = row.get(3)?;
        Ok(Agent {
            id: row.get(0)?,
            name: row.get(1)?,
            personality: Personality {
                primary: parse_column(2, row.get(2)?)?,
                secondary: secondary.map(|s| parse_column(3, s)).transpose()?,
            },
            is_devils_advocate: row.get(4)?,
            preferred_provider_id: row.get(5)?,
            archived: row.get(6)?,
            created_at: from_millis(row.get(7)?),
        })
    }

    fn map_knowledge(row: &Row) -> rusqlite::Result<KnowledgeItem> {
        Ok(KnowledgeItem {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            specialty_id: row.get(2)?,
            knowledge_type: parse_column(3, row.get(3)?)?,
            content: row.get(4)?,
            confidence: row.get(5)?,
            relevance_score: row.get(6)?,
            tags: parse_json(7, row.get(7)?)?,
            access_count: row.get::<_, i64>(8)? as u32,
            last_accessed: from_millis(row.get(9)?),
            created_at: from_millis(row.get(10)?),
        })
    }

    fn map_experience(row: &Row) -> rusqlite::Result<ExperienceRecord> {
        Ok(ExperienceRecord {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            session_id: row.get(2)?,
            specialty_id: row.get(3)?,
            experience_type: parse_column(4, row.get(4)?)?,
            context: row.get(5)?,
            outcome: row.get(6)?,
            lessons_learned: parse_json(7, row.get(7)?)?,
            emotional_response: row.get(8)?,
            impact_score: row.get(9)?,
            created_at: from_millis(row.get(10)?),
        })
    }

    fn map_sequence(row: &Row) -> rusqlite::Result<Sequence> {
        let completed_at: Option<i64> = row.get(11)?;
        Ok(Sequence {
            id: row.get(0)?,
            task_objective: row.get(1)?,
            initial_prompt: row.get(2)?,
            llm_chain: parse_json(3, row.get(3)?)?,
            iterations: row.get::<_, i64>(4)? as u32,
            synthesis_provider_id: row.get(5)?,
            selected_folders: parse_json(6, row.get(6)?)?,
            status: parse_column(7, row.get(7)?)?,
            total_cost: row.get(8)?,
            failure_reason: row.get(9)?,
            created_at: from_millis(row.get(10)?),
            completed_at: completed_at.map(from_millis),
        })
    }

    fn map_step(row: &Row) -> rusqlite::Result<SequenceStep> {
        Ok(SequenceStep {
            id: row.get(0)?,
            sequence_id: row.get(1)?,
            iteration_number: row.get::<_, i64>(2)? as u32,
            step_number: row.get::<_, i64>(3)? as u32,
            provider_id: row.get(4)?,
            agent_id: row.get(5)?,
            input_prompt: row.get(6)?,
            output_content: row.get(7)?,
            tokens_used: row.get::<_, i64>(8)? as u64,
            cost: row.get(9)?,
            response_time_ms: row.get::<_, i64>(10)? as u64,
            status: parse_column(11, row.get(11)?)?,
            is_synthesis: row.get(12)?,
            error: row.get(13)?,
            artifacts: parse_json(14, row.get(14)?)?,
            created_at: from_millis(row.get(15)?),
        })
    }
}

const AGENT_COLUMNS: &str = "id, name, primary_personality, secondary_personality, \
     is_devils_advocate, preferred_provider_id, archived, created_at";

const KNOWLEDGE_COLUMNS: &str = "id, agent_id, specialty_id, knowledge_type, content, \
     confidence, relevance_score, tags, access_count, last_accessed, created_at";

const EXPERIENCE_COLUMNS: &str = "id, agent_id, session_id, specialty_id, experience_type, \
     context, outcome, lessons_learned, emotional_response, impact_score, created_at";

const SEQUENCE_COLUMNS: &str = "id, task_objective, initial_prompt, llm_chain, iterations, \
     synthesis_provider_id, selected_folders, status, total_cost, failure_reason, created_at, \
     completed_at";

const STEP_COLUMNS: &str = "id, sequence_id, iteration_number, step_number, provider_id, \
     agent_id, input_prompt, output_content, tokens_used, cost, response_time_ms, status, \
     is_synthesis, error, artifacts, created_at";

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into()))
}

fn parse_json<T: DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Store for Database {
    // ─────────────────────────────────────────────────────────────────────────
    // Agent Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!("INSERT INTO agent ({AGENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                agent.id,
                agent.name,
                agent.personality.primary.as_str(),
                agent.personality.secondary.map(|s| s.as_str()),
                agent.is_devils_advocate,
                agent.preferred_provider_id,
                agent.archived,
                agent.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!("SELECT {AGENT_COLUMNS} FROM agent WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], Self::map_agent).optional()?)
    }

    fn list_agents(&self, include_archived: bool) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agent
             WHERE ?1 OR archived = 0
             ORDER BY created_at, rowid"
        ))?;
        let agents = stmt
            .query_map(params![include_archived], Self::map_agent)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(agents)
    }

    fn archive_agent(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute("UPDATE agent SET archived = 1 WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_agent(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute("DELETE FROM agent WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Knowledge Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_knowledge(&self, item: &KnowledgeItem) -> Result<()> {
        let tags = serde_json::to_string(&item.tags)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO knowledge_item ({KNOWLEDGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                item.id,
                item.agent_id,
                item.specialty_id,
                item.knowledge_type.as_str(),
                item.content,
                item.confidence,
                item.relevance_score,
                tags,
                item.access_count as i64,
                item.last_accessed.timestamp_millis(),
                item.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_item WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], Self::map_knowledge).optional()?)
    }

    fn list_knowledge(
        &self,
        agent_id: &str,
        specialty_id: Option<&str>,
        order: KnowledgeOrder,
    ) -> Result<Vec<KnowledgeItem>> {
        let order_by = match order {
            KnowledgeOrder::Oldest => "created_at ASC, rowid ASC",
            KnowledgeOrder::MostRelevant => {
                "relevance_score DESC, confidence DESC, created_at ASC, rowid ASC"
            }
        };
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_item
             WHERE agent_id = ?1 AND (?2 IS NULL OR specialty_id = ?2)
             ORDER BY {order_by}"
        ))?;
        let items = stmt
            .query_map(params![agent_id, specialty_id], Self::map_knowledge)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn adjust_knowledge_confidence(&self, id: &str, delta: f64) -> Result<Option<KnowledgeItem>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "UPDATE knowledge_item
             SET confidence = MIN(100.0, MAX(0.0, confidence + ?2))
             WHERE id = ?1",
            params![id, delta],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_item WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], Self::map_knowledge).optional()?)
    }

    fn touch_knowledge(&self, ids: &[String], now: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE knowledge_item
                 SET access_count = access_count + 1, last_accessed = ?2
                 WHERE id = ?1",
            )?;
            for id in ids {
                stmt.execute(params![id, now.timestamp_millis()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_obsolete_knowledge(
        &self,
        agent_id: &str,
        max_confidence: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "DELETE FROM knowledge_item
             WHERE agent_id = ?1 AND confidence < ?2 AND last_accessed < ?3",
            params![agent_id, max_confidence, cutoff.timestamp_millis()],
        )?;
        Ok(rows)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Experience Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_experience(&self, record: &ExperienceRecord) -> Result<()> {
        let lessons = serde_json::to_string(&record.lessons_learned)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO experience_record ({EXPERIENCE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                record.id,
                record.agent_id,
                record.session_id,
                record.specialty_id,
                record.experience_type.as_str(),
                record.context,
                record.outcome,
                lessons,
                record.emotional_response,
                record.impact_score,
                record.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn list_experiences(&self, agent_id: &str) -> Result<Vec<ExperienceRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experience_record
             WHERE agent_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let records = stmt
            .query_map(params![agent_id], Self::map_experience)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn memory_stats(&self, agent_id: &str) -> Result<MemoryStats> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let (knowledge_count, average_confidence, total_accesses): (i64, f64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(AVG(confidence), 0), COALESCE(SUM(access_count), 0)
                 FROM knowledge_item WHERE agent_id = ?1",
                params![agent_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let experience_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM experience_record WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT knowledge_type, COUNT(*) FROM knowledge_item
             WHERE agent_id = ?1 GROUP BY knowledge_type",
        )?;
        let by_type: BTreeMap<KnowledgeType, usize> = stmt
            .query_map(params![agent_id], |row| {
                let knowledge_type: KnowledgeType = parse_column(0, row.get(0)?)?;
                let count: i64 = row.get(1)?;
                Ok((knowledge_type, count as usize))
            })?
            .collect::<std::result::Result<_, _>>()?;

        Ok(MemoryStats {
            knowledge_count: knowledge_count as usize,
            experience_count: experience_count as usize,
            average_confidence,
            total_accesses: total_accesses as u64,
            by_type,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sequence Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_sequence(&self, sequence: &Sequence) -> Result<()> {
        let chain = serde_json::to_string(&sequence.llm_chain)?;
        let folders = serde_json::to_string(&sequence.selected_folders)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO sequence_run ({SEQUENCE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                sequence.id,
                sequence.task_objective,
                sequence.initial_prompt,
                chain,
                sequence.iterations as i64,
                sequence.synthesis_provider_id,
                folders,
                sequence.status.as_str(),
                sequence.total_cost,
                sequence.failure_reason,
                sequence.created_at.timestamp_millis(),
                sequence.completed_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    fn get_sequence(&self, id: &str) -> Result<Option<Sequence>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SEQUENCE_COLUMNS} FROM sequence_run WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], Self::map_sequence).optional()?)
    }

    fn list_sequences(&self, limit: usize) -> Result<Vec<Sequence>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SEQUENCE_COLUMNS} FROM sequence_run
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1"
        ))?;
        let sequences = stmt
            .query_map(params![limit as i64], Self::map_sequence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sequences)
    }

    fn transition_sequence(
        &self,
        id: &str,
        from: SequenceStatus,
        to: SequenceStatus,
    ) -> Result<bool> {
        from.transition(to)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "UPDATE sequence_run SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.as_str(), to.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn finish_sequence(
        &self,
        id: &str,
        status: SequenceStatus,
        total_cost: f64,
        failure_reason: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        SequenceStatus::Running.transition(status)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "UPDATE sequence_run
             SET status = ?2, total_cost = ?3, failure_reason = ?4, completed_at = ?5
             WHERE id = ?1 AND status = 'running'",
            params![
                id,
                status.as_str(),
                total_cost,
                failure_reason,
                completed_at.timestamp_millis(),
            ],
        )?;
        Ok(rows > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_step(&self, step: &SequenceStep) -> Result<()> {
        let artifacts = serde_json::to_string(&step.artifacts)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO sequence_step ({STEP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                step.id,
                step.sequence_id,
                step.iteration_number as i64,
                step.step_number as i64,
                step.provider_id,
                step.agent_id,
                step.input_prompt,
                step.output_content,
                step.tokens_used as i64,
                step.cost,
                step.response_time_ms as i64,
                step.status.as_str(),
                step.is_synthesis,
                step.error,
                artifacts,
                step.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn finish_step(&self, step_id: &str, result: &StepResult) -> Result<bool> {
        StepStatus::Running.transition(result.status)?;
        let artifacts = serde_json::to_string(&result.artifacts)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute(
            "UPDATE sequence_step
             SET status = ?2, output_content = ?3, tokens_used = ?4, cost = ?5,
                 response_time_ms = ?6, error = ?7, artifacts = ?8
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![
                step_id,
                result.status.as_str(),
                result.output_content,
                result.tokens_used as i64,
                result.cost,
                result.response_time_ms as i64,
                result.error,
                artifacts,
            ],
        )?;
        Ok(rows > 0)
    }

    fn list_steps(&self, sequence_id: &str) -> Result<Vec<SequenceStep>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM sequence_step
             WHERE sequence_id = ?1
             ORDER BY iteration_number ASC, step_number ASC"
        ))?;
        let steps = stmt
            .query_map(params![sequence_id], Self::map_step)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    fn total_step_cost(&self, sequence_id: &str) -> Result<f64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost), 0) FROM sequence_step
             WHERE sequence_id = ?1 AND status = 'completed'",
            params![sequence_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn recover_interrupted(&self, reason: &str, now: DateTime<Utc>) -> Result<RecoveryReport> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;

        let steps_failed = tx.execute(
            "UPDATE sequence_step
             SET status = 'failed', cost = 0, error = ?1,
                 output_content = '[' || provider_id || ' did not respond: ' || ?1 || ']'
             WHERE status IN ('pending', 'running')",
            params![reason],
        )?;

        let sequences_failed = tx.execute(
            "UPDATE sequence_run
             SET status = 'failed', failure_reason = ?1, completed_at = ?2,
                 total_cost = (
                     SELECT COALESCE(SUM(s.cost), 0) FROM sequence_step s
                     WHERE s.sequence_id = sequence_run.id AND s.status = 'completed'
                 )
             WHERE status = 'running'",
            params![reason, now.timestamp_millis()],
        )?;

        tx.commit()?;

        if steps_failed > 0 || sequences_failed > 0 {
            info!(steps_failed, sequences_failed, "Recovered interrupted work");
        }

        Ok(RecoveryReport {
            steps_failed,
            sequences_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChainStepConfig, ExperienceType, NewExperience, NewKnowledge, NewSequence,
        PersonalityTrait, SYNTHESIS_STEP_NUMBER,
    };
    use chrono::Duration;

    fn agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: format!("Agent {}", id),
            personality: Personality::new(
                PersonalityTrait::Analytical,
                Some(PersonalityTrait::Skeptical),
            )
            .unwrap(),
            is_devils_advocate: false,
            preferred_provider_id: None,
            archived: false,
            created_at: Utc::now(),
        }
    }

    fn knowledge(agent_id: &str, content: &str, confidence: f64) -> KnowledgeItem {
        KnowledgeItem::from_new(
            NewKnowledge::new(agent_id, KnowledgeType::Fact, content).with_confidence(confidence),
            Utc::now(),
        )
    }

    fn sequence() -> Sequence {
        Sequence::from_new(
            NewSequence {
                task_objective: "Decide".into(),
                initial_prompt: "What should we do?".into(),
                llm_chain: vec![ChainStepConfig::new("a"), ChainStepConfig::new("b")],
                iterations: 2,
                synthesis_provider_id: "a".into(),
                selected_folders: vec!["docs".into()],
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_agent_crud_and_cascade() {
        let db = Database::open_in_memory().unwrap();
        db.insert_agent(&agent("a1")).unwrap();
        db.insert_agent(&agent("a2")).unwrap();
        db.insert_knowledge(&knowledge("a1", "rust ownership rules", 50.0)).unwrap();
        db.insert_experience(&ExperienceRecord::from_new(
            NewExperience::new("a1", ExperienceType::Success, "ctx", "ok"),
            Utc::now(),
        ))
        .unwrap();

        let loaded = db.get_agent("a1").unwrap().unwrap();
        assert_eq!(loaded.personality.secondary, Some(PersonalityTrait::Skeptical));

        assert!(db.archive_agent("a2").unwrap());
        assert_eq!(db.list_agents(false).unwrap().len(), 1);
        assert_eq!(db.list_agents(true).unwrap().len(), 2);

        assert!(db.delete_agent("a1").unwrap());
        assert!(db.get_agent("a1").unwrap().is_none());
        assert!(db.list_knowledge("a1", None, KnowledgeOrder::Oldest).unwrap().is_empty());
        assert!(db.list_experiences("a1").unwrap().is_empty());
        assert!(!db.delete_agent("a1").unwrap());
    }

    #[test]
    fn test_adjust_confidence_clamps() {
        let db = Database::open_in_memory().unwrap();
        db.insert_agent(&agent("a1")).unwrap();
        let item = knowledge("a1", "tokio timeouts", 97.0);
        db.insert_knowledge(&item).unwrap();

        let updated = db.adjust_knowledge_confidence(&item.id, 10.0).unwrap().unwrap();
        assert_eq!(updated.confidence, 100.0);

        let updated = db.adjust_knowledge_confidence(&item.id, -250.0).unwrap().unwrap();
        assert_eq!(updated.confidence, 0.0);

        assert!(db.adjust_knowledge_confidence("missing", 1.0).unwrap().is_none());
    }

    #[test]
    fn test_touch_and_obsolete() {
        let db = Database::open_in_memory().unwrap();
        db.insert_agent(&agent("a1")).unwrap();

        let now = Utc::now();
        let mut stale = knowledge("a1", "stale fact", 10.0);
        stale.last_accessed = now - Duration::days(45);
        let mut fresh = knowledge("a1", "fresh fact", 10.0);
        fresh.last_accessed = now - Duration::days(5);
        db.insert_knowledge(&stale).unwrap();
        db.insert_knowledge(&fresh).unwrap();

        let deleted = db
            .delete_obsolete_knowledge("a1", 20.0, now - Duration::days(30))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_knowledge(&stale.id).unwrap().is_none());

        db.touch_knowledge(&[fresh.id.clone()], now).unwrap();
        let touched = db.get_knowledge(&fresh.id).unwrap().unwrap();
        assert_eq!(touched.access_count, 1);
        assert_eq!(touched.last_accessed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_sequence_compare_and_set() {
        let db = Database::open_in_memory().unwrap();
        let seq = sequence();
        db.insert_sequence(&seq).unwrap();

        assert!(db
            .transition_sequence(&seq.id, SequenceStatus::Pending, SequenceStatus::Running)
            .unwrap());
        assert!(!db
            .transition_sequence(&seq.id, SequenceStatus::Pending, SequenceStatus::Running)
            .unwrap());
        assert!(db
            .transition_sequence(&seq.id, SequenceStatus::Pending, SequenceStatus::Completed)
            .is_err());

        assert!(db
            .finish_sequence(&seq.id, SequenceStatus::Completed, 1.5, None, Utc::now())
            .unwrap());
        assert!(!db
            .finish_sequence(&seq.id, SequenceStatus::Failed, 0.0, Some("late"), Utc::now())
            .unwrap());

        let loaded = db.get_sequence(&seq.id).unwrap().unwrap();
        assert_eq!(loaded.status, SequenceStatus::Completed);
        assert_eq!(loaded.total_cost, 1.5);
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.llm_chain, seq.llm_chain);
    }

    #[test]
    fn test_step_ordering_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conclave.db");
        let seq = sequence();

        {
            let db = Database::open(&path).unwrap();
            db.insert_sequence(&seq).unwrap();
            // Inserted out of order on purpose.
            for (iteration, step) in [(2, 1), (1, 1), (2, 0), (2, SYNTHESIS_STEP_NUMBER), (1, 0)] {
                let row = SequenceStep::running(&seq.id, iteration, step, "a", None, "p".into());
                db.insert_step(&row).unwrap();
            }
        }

        let db = Database::open(&path).unwrap();
        let order: Vec<(u32, u32)> = db
            .list_steps(&seq.id)
            .unwrap()
            .iter()
            .map(|s| (s.iteration_number, s.step_number))
            .collect();
        assert_eq!(
            order,
            vec![(1, 0), (1, 1), (2, 0), (2, 1), (2, SYNTHESIS_STEP_NUMBER)]
        );
    }

    #[test]
    fn test_step_cost_only_counts_completed() {
        let db = Database::open_in_memory().unwrap();
        let seq = sequence();
        db.insert_sequence(&seq).unwrap();

        let ok = SequenceStep::running(&seq.id, 1, 0, "a", None, "p".into());
        let bad = SequenceStep::running(&seq.id, 1, 1, "b", None, "p".into());
        db.insert_step(&ok).unwrap();
        db.insert_step(&bad).unwrap();

        db.finish_step(
            &ok.id,
            &StepResult {
                status: StepStatus::Completed,
                output_content: "fine".into(),
                tokens_used: 10,
                cost: 0.25,
                response_time_ms: 3,
                error: None,
                artifacts: Vec::new(),
            },
        )
        .unwrap();
        db.finish_step(&bad.id, &StepResult::failed("b", "boom", 2)).unwrap();

        assert_eq!(db.total_step_cost(&seq.id).unwrap(), 0.25);
        assert!(!db.finish_step(&ok.id, &StepResult::failed("a", "again", 0)).unwrap());
    }

    #[test]
    fn test_recover_interrupted() {
        let db = Database::open_in_memory().unwrap();
        let seq = sequence();
        db.insert_sequence(&seq).unwrap();
        db.transition_sequence(&seq.id, SequenceStatus::Pending, SequenceStatus::Running)
            .unwrap();
        db.insert_step(&SequenceStep::running(&seq.id, 1, 0, "a", None, "p".into()))
            .unwrap();

        let report = db.recover_interrupted("interrupted", Utc::now()).unwrap();
        assert_eq!(report.steps_failed, 1);
        assert_eq!(report.sequences_failed, 1);

        let loaded = db.get_sequence(&seq.id).unwrap().unwrap();
        assert_eq!(loaded.status, SequenceStatus::Failed);
        assert_eq!(loaded.failure_reason.as_deref(), Some("interrupted"));

        let steps = db.list_steps(&seq.id).unwrap();
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert_eq!(steps[0].error.as_deref(), Some("interrupted"));

        let report = db.recover_interrupted("interrupted", Utc::now()).unwrap();
        assert_eq!(report, RecoveryReport::default());
    }

    #[test]
    fn test_memory_stats() {
        let db = Database::open_in_memory().unwrap();
        db.insert_agent(&agent("a1")).unwrap();
        db.insert_knowledge(&knowledge("a1", "one", 40.0)).unwrap();
        db.insert_knowledge(&knowledge("a1", "two", 80.0)).unwrap();

        let stats = db.memory_stats("a1").unwrap();
        assert_eq!(stats.knowledge_count, 2);
        assert_eq!(stats.experience_count, 0);
        assert_eq!(stats.average_confidence, 60.0);
        assert_eq!(stats.by_type.get(&KnowledgeType::Fact), Some(&2));

        let empty = db.memory_stats("nobody").unwrap();
        assert_eq!(empty, MemoryStats::default());
    }
}
