//! The reference store adapter: SQLite with an FTS5 retrieval index.
//!
//! Implements the logical schema (`runs`, `trajectories`, `judgments`,
//! `memory_items`, `memory_usage`) plus the virtual table
//! `memory_fts(memory_id UNINDEXED, document)` over `title ‖ description
//! ‖ tags`, ranked with SQLite's built-in `bm25()`. Writes are
//! serialised by a connection mutex, which also gives the serialisable
//! ordering the concurrency model asks for.

use crate::bm25::tokenize;
use crate::store::{ExportFilter, MemoryStore, RunRecord, TrajectoryDigest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvid_core::{
    Confidence, Judgment, MemoryId, MemoryItem, MemoryScope, MemoryUsage, OntologyId, Provenance,
    SourceType, StoreError, Trajectory, TrajectoryId,
};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs(
    run_id        TEXT PRIMARY KEY,
    created_at    TEXT NOT NULL,
    model_id      TEXT NOT NULL,
    ontology_id   TEXT,
    ontology_path TEXT,
    notes         TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS trajectories(
    trajectory_id   TEXT PRIMARY KEY,
    run_id          TEXT NOT NULL,
    task_query      TEXT NOT NULL,
    final_answer    TEXT,
    iteration_count INTEGER NOT NULL,
    converged       INTEGER NOT NULL,
    artifact_doc    TEXT NOT NULL,
    log_ref         TEXT,
    created_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS judgments(
    trajectory_id TEXT PRIMARY KEY,
    is_success    INTEGER NOT NULL,
    reason        TEXT NOT NULL,
    confidence    TEXT NOT NULL,
    missing_doc   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS memory_items(
    memory_id      TEXT PRIMARY KEY,
    title          TEXT NOT NULL,
    description    TEXT NOT NULL,
    content        TEXT NOT NULL,
    source_type    TEXT NOT NULL,
    task_query     TEXT,
    created_at     TEXT NOT NULL,
    tags_doc       TEXT NOT NULL,
    scope_doc      TEXT NOT NULL,
    provenance_doc TEXT NOT NULL,
    access_count   INTEGER NOT NULL DEFAULT 0,
    success_count  INTEGER NOT NULL DEFAULT 0,
    failure_count  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS memory_usage(
    trajectory_id TEXT NOT NULL,
    memory_id     TEXT NOT NULL,
    rank          INTEGER NOT NULL,
    score         REAL NOT NULL
);
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    memory_id UNINDEXED,
    document
);
"#;

/// The SQLite-backed ReasoningBank.
pub struct SqliteBank {
    conn: Mutex<Connection>,
}

impl SqliteBank {
    /// Open (or create) a bank at a path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// A transient in-memory bank.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection poisoned")
    }
}

/// Build an FTS5 MATCH expression from free text: bare terms, quoted,
/// OR-joined. Empty input yields `None` (retrieval returns nothing).
fn match_expression(query: &str) -> Option<String> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryItem> {
    let source_type: String = row.get("source_type")?;
    let created_at: String = row.get("created_at")?;
    let tags_doc: String = row.get("tags_doc")?;
    let scope_doc: String = row.get("scope_doc")?;
    let provenance_doc: String = row.get("provenance_doc")?;
    Ok(MemoryItem {
        memory_id: MemoryId::new(row.get::<_, String>("memory_id")?),
        title: row.get("title")?,
        description: row.get("description")?,
        content: row.get("content")?,
        source_type: SourceType::parse(&source_type).unwrap_or(SourceType::Success),
        task_query: row.get("task_query")?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        tags: serde_json::from_str(&tags_doc).unwrap_or_default(),
        scope: serde_json::from_str::<MemoryScope>(&scope_doc).unwrap_or_default(),
        provenance: serde_json::from_str::<Provenance>(&provenance_doc).unwrap_or_default(),
        access_count: row.get::<_, i64>("access_count")? as u64,
        success_count: row.get::<_, i64>("success_count")? as u64,
        failure_count: row.get::<_, i64>("failure_count")? as u64,
    })
}

fn write_err(e: rusqlite::Error) -> StoreError {
    StoreError::WriteFailed(e.to_string())
}

fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn json_err(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

#[async_trait]
impl MemoryStore for SqliteBank {
    async fn upsert_item(&self, item: &MemoryItem) -> Result<bool, StoreError> {
        let conn = self.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM memory_items WHERE memory_id = ?1)",
                params![item.memory_id.as_str()],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        if exists {
            conn.execute(
                "UPDATE memory_items SET access_count = access_count + 1 WHERE memory_id = ?1",
                params![item.memory_id.as_str()],
            )
            .map_err(write_err)?;
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO memory_items(memory_id, title, description, content, source_type, \
             task_query, created_at, tags_doc, scope_doc, provenance_doc, access_count, \
             success_count, failure_count) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                item.memory_id.as_str(),
                item.title,
                item.description,
                item.content,
                item.source_type.as_str(),
                item.task_query,
                item.created_at.to_rfc3339(),
                serde_json::to_string(&item.tags).map_err(json_err)?,
                serde_json::to_string(&item.scope).map_err(json_err)?,
                serde_json::to_string(&item.provenance).map_err(json_err)?,
                item.access_count as i64,
                item.success_count as i64,
                item.failure_count as i64,
            ],
        )
        .map_err(write_err)?;
        conn.execute(
            "INSERT INTO memory_fts(memory_id, document) VALUES(?1, ?2)",
            params![item.memory_id.as_str(), item.document()],
        )
        .map_err(write_err)?;
        tracing::debug!(id = %item.memory_id, title = %item.title, "memory item stored");
        Ok(true)
    }

    async fn get_item(&self, id: &MemoryId) -> Result<Option<MemoryItem>, StoreError> {
        let conn = self.lock();
        let mut statement = conn
            .prepare("SELECT * FROM memory_items WHERE memory_id = ?1")
            .map_err(query_err)?;
        let mut rows = statement
            .query_map(params![id.as_str()], item_from_row)
            .map_err(query_err)?;
        rows.next().transpose().map_err(query_err)
    }

    async fn retrieve(
        &self,
        query: &str,
        ontology: Option<&OntologyId>,
        k: usize,
    ) -> Result<Vec<(MemoryItem, f64)>, StoreError> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };
        let ontology_param = ontology.map(|o| o.as_str().to_string()).unwrap_or_default();
        let conn = self.lock();
        let mut statement = conn
            .prepare(
                "SELECT m.*, -bm25(memory_fts) AS score \
                 FROM memory_fts \
                 JOIN memory_items m ON m.memory_id = memory_fts.memory_id \
                 WHERE memory_fts MATCH ?1 \
                   AND (json_extract(m.scope_doc, '$.ontology') IS NULL \
                        OR (?2 != '' AND json_extract(m.scope_doc, '$.ontology') = ?2)) \
                 ORDER BY bm25(memory_fts) ASC, (m.source_type = 'meta-analysis') DESC \
                 LIMIT ?3",
            )
            .map_err(query_err)?;
        let scored: Vec<(MemoryItem, f64)> = statement
            .query_map(params![expression, ontology_param, k as i64], |row| {
                Ok((item_from_row(row)?, row.get::<_, f64>("score")?))
            })
            .map_err(query_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(query_err)?;

        for (item, _) in &scored {
            conn.execute(
                "UPDATE memory_items SET access_count = access_count + 1 WHERE memory_id = ?1",
                params![item.memory_id.as_str()],
            )
            .map_err(write_err)?;
        }
        Ok(scored)
    }

    async fn record_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO runs(run_id, created_at, model_id, ontology_id, \
                 ontology_path, notes) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.run_id.as_str(),
                    run.created_at.to_rfc3339(),
                    run.model_id,
                    run.ontology_id.as_ref().map(OntologyId::as_str),
                    run.ontology_path,
                    run.notes,
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    async fn record_trajectory(
        &self,
        trajectory: &Trajectory,
        artifact: &str,
        log_ref: Option<&str>,
    ) -> Result<(), StoreError> {
        let final_answer = trajectory
            .final_output
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_default());
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO trajectories(trajectory_id, run_id, task_query, \
                 final_answer, iteration_count, converged, artifact_doc, log_ref, created_at) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    trajectory.trajectory_id.as_str(),
                    trajectory.run_id.as_str(),
                    trajectory.query,
                    final_answer,
                    trajectory.iteration_count() as i64,
                    trajectory.converged as i64,
                    artifact,
                    log_ref,
                    trajectory.created_at.to_rfc3339(),
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    async fn record_judgment(
        &self,
        trajectory_id: &TrajectoryId,
        judgment: &Judgment,
    ) -> Result<(), StoreError> {
        let confidence = match judgment.confidence {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO judgments(trajectory_id, is_success, reason, \
                 confidence, missing_doc) VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    trajectory_id.as_str(),
                    judgment.is_success as i64,
                    judgment.reason,
                    confidence,
                    serde_json::to_string(&judgment.missing).map_err(json_err)?,
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    async fn record_usage(&self, usage: &[MemoryUsage]) -> Result<(), StoreError> {
        let conn = self.lock();
        for record in usage {
            conn.execute(
                "INSERT INTO memory_usage(trajectory_id, memory_id, rank, score) \
                 VALUES(?1, ?2, ?3, ?4)",
                params![
                    record.trajectory_id.as_str(),
                    record.memory_id.as_str(),
                    record.rank as i64,
                    record.score,
                ],
            )
            .map_err(write_err)?;
        }
        Ok(())
    }

    async fn bump_outcome(&self, ids: &[MemoryId], success: bool) -> Result<(), StoreError> {
        let conn = self.lock();
        let column = if success {
            "success_count"
        } else {
            "failure_count"
        };
        for id in ids {
            conn.execute(
                &format!(
                    "UPDATE memory_items SET {column} = {column} + 1 WHERE memory_id = ?1"
                ),
                params![id.as_str()],
            )
            .map_err(write_err)?;
        }
        Ok(())
    }

    async fn all_items(&self, filter: &ExportFilter) -> Result<Vec<MemoryItem>, StoreError> {
        let conn = self.lock();
        let mut statement = conn
            .prepare("SELECT * FROM memory_items ORDER BY memory_id")
            .map_err(query_err)?;
        let items: Vec<MemoryItem> = statement
            .query_map([], item_from_row)
            .map_err(query_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(query_err)?;
        Ok(items.into_iter().filter(|i| filter.admits(i)).collect())
    }

    async fn item_count(&self) -> Result<usize, StoreError> {
        self.lock()
            .query_row("SELECT COUNT(*) FROM memory_items", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(query_err)
    }

    async fn recent_trajectory_digests(
        &self,
        n: usize,
    ) -> Result<Vec<TrajectoryDigest>, StoreError> {
        let conn = self.lock();
        let mut statement = conn
            .prepare(
                "SELECT t.trajectory_id, t.task_query, t.iteration_count, t.converged, \
                        t.artifact_doc, j.is_success \
                 FROM trajectories t \
                 LEFT JOIN judgments j ON j.trajectory_id = t.trajectory_id \
                 ORDER BY t.rowid DESC LIMIT ?1",
            )
            .map_err(query_err)?;
        let digests: Vec<TrajectoryDigest> = statement
            .query_map(params![n as i64], |row| {
                Ok(TrajectoryDigest {
                    trajectory_id: TrajectoryId::new(row.get::<_, String>(0)?),
                    query: row.get(1)?,
                    iteration_count: row.get::<_, i64>(2)? as u32,
                    converged: row.get::<_, i64>(3)? != 0,
                    artifact: row.get(4)?,
                    is_success: row
                        .get::<_, Option<i64>>(5)?
                        .map(|v| v != 0),
                })
            })
            .map_err(query_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(query_err)?;
        Ok(digests)
    }
}
