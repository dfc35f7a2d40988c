//! Schema migrations
//!
//! SQL is embedded at compile time and applied when a database is opened.

use rusqlite::Connection;

use crate::error::Result;

/// Agents, memory, sequences, and steps (001)
pub const CORE_TABLES_SQL: &str = include_str!("001_core_tables.sql");

/// Run all migrations. Every statement is idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(CORE_TABLES_SQL)?;
    Ok(())
}
