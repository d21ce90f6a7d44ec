//! SQLite activity log
//!
//! Append-only: records are inserted once and never updated or deleted.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use workforce_core::{
    ActivitySink, ActivityStatus, AgentActivity, AgentKind, TokenUsage, ToolCallRecord,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS agent_activities (
    id TEXT PRIMARY KEY,
    agent_type TEXT NOT NULL,
    action TEXT NOT NULL,
    requester_id TEXT NOT NULL,
    input_summary TEXT NOT NULL,
    result_status TEXT NOT NULL,
    tool_calls TEXT NOT NULL,
    related_entity_id TEXT,
    error TEXT,
    iterations INTEGER NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agent_activities_entity ON agent_activities(related_entity_id);";

const COLUMNS: &str = "id, agent_type, action, requester_id, input_summary, result_status, \
    tool_calls, related_entity_id, error, iterations, input_tokens, output_tokens, created_at";

/// Activity records in a SQLite database (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct SqliteActivityLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivityLog {
    /// Open or create the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open activity database at {}", path.display()))?;
        info!("Activity log at {:?}", path);
        Self::init(conn)
    }

    /// Database that lives only as long as this handle
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create activity schema")?;
        debug!("Activity schema initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Up to `limit` records, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<AgentActivity>> {
        let sql = format!("SELECT {COLUMNS} FROM agent_activities ORDER BY rowid DESC LIMIT ?1");
        self.query(sql, vec![limit.to_string()]).await
    }

    /// Up to `limit` records about one lead, property, campaign or document, newest first
    pub async fn for_entity(&self, entity_id: &str, limit: usize) -> Result<Vec<AgentActivity>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM agent_activities
             WHERE related_entity_id = ?1
             ORDER BY rowid DESC LIMIT ?2"
        );
        self.query(sql, vec![entity_id.to_string(), limit.to_string()])
            .await
    }

    async fn query(&self, sql: String, args: Vec<String>) -> Result<Vec<AgentActivity>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            let mut stmt = conn.prepare(&sql)?;
            let activities = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), row_to_activity)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(activities)
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

#[async_trait]
impl ActivitySink for SqliteActivityLog {
    async fn append(&self, activity: &AgentActivity) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let activity = activity.clone();

        tokio::task::spawn_blocking(move || {
            let tool_calls = serde_json::to_string(&activity.tool_calls)?;
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });

            conn.execute(
                &format!(
                    "INSERT INTO agent_activities ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    &activity.id,
                    activity.agent_type.to_string(),
                    &activity.action,
                    &activity.requester_id,
                    &activity.input_summary,
                    activity.result_status.as_str(),
                    tool_calls,
                    &activity.related_entity_id,
                    &activity.error,
                    activity.iterations,
                    activity.usage.input_tokens as i64,
                    activity.usage.output_tokens as i64,
                    activity
                        .timestamp
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )
            .with_context(|| format!("Failed to insert activity {}", activity.id))?;

            debug!("Recorded activity {} ({})", activity.id, activity.result_status);
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<AgentActivity> {
    let agent_type: String = row.get(1)?;
    let agent_type = AgentKind::from_string(&agent_type)
        .ok_or_else(|| conversion_error(1, format!("unknown agent type '{}'", agent_type)))?;

    let status: String = row.get(5)?;
    let result_status = ActivityStatus::from_string(&status)
        .ok_or_else(|| conversion_error(5, format!("unknown result status '{}'", status)))?;

    let tool_calls: String = row.get(6)?;
    let tool_calls: Vec<ToolCallRecord> = serde_json::from_str(&tool_calls).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp: String = row.get(12)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(12, e.to_string()))?;

    Ok(AgentActivity {
        id: row.get(0)?,
        agent_type,
        action: row.get(2)?,
        requester_id: row.get(3)?,
        input_summary: row.get(4)?,
        result_status,
        tool_calls,
        related_entity_id: row.get(7)?,
        error: row.get(8)?,
        iterations: row.get(9)?,
        usage: TokenUsage::new(row.get::<_, i64>(10)? as u64, row.get::<_, i64>(11)? as u64),
        timestamp,
    })
}
