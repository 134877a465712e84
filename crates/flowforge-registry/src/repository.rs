//! Relational repository for agents, versions, runs, round traces, and the artifact index
//! (C11). The default backend is `rusqlite`-backed; an in-memory test double implements the
//! same trait so unit tests never touch a file, following the connection-per-call
//! `spawn_blocking` bridge used for the orchestrator's own durable task queue.

use async_trait::async_trait;
use flowforge_core::error::{ForgeError, Result};
use flowforge_core::{AgentLifecycle, AgentVersionRecord, ArtifactIndexEntry, OptimizationRun, SearchRoundTrace};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

fn lifecycle_from_str(value: &str) -> AgentLifecycle {
    match value {
        "validated" => AgentLifecycle::Validated,
        "deployed" => AgentLifecycle::Deployed,
        "archived" => AgentLifecycle::Archived,
        _ => AgentLifecycle::Draft,
    }
}

/// Persistence boundary for agents, versions, optimization runs, and their artifacts.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn ensure_agent(&self, agent_name: &str) -> Result<()>;

    /// Next monotonic version number for `agent_name`, starting at 1.
    async fn next_version(&self, agent_name: &str) -> Result<u32>;

    async fn create_version(&self, record: AgentVersionRecord, run_id: Option<&str>) -> Result<()>;

    async fn list_versions(&self, agent_name: &str) -> Result<Vec<AgentVersionRecord>>;

    async fn get_version(&self, agent_name: &str, version: u32) -> Result<Option<AgentVersionRecord>>;

    /// Transitions `version` to `lifecycle`. Moving to `Deployed` demotes the agent's
    /// previously deployed version (if any) to `Validated` in the same transaction.
    async fn set_lifecycle(&self, agent_name: &str, version: u32, lifecycle: AgentLifecycle) -> Result<()>;

    async fn create_run(&self, run: &OptimizationRun) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<OptimizationRun>>;

    async fn insert_round_traces(&self, run_id: &str, traces: &[SearchRoundTrace]) -> Result<()>;

    /// Upserts by the unique `(run_id, artifact_type)` pair.
    async fn insert_artifact(&self, run_id: &str, entry: &ArtifactIndexEntry) -> Result<()>;
}

/// `rusqlite`-backed repository. Opens a fresh connection per call under `spawn_blocking`
/// rather than holding one across an `await` point.
pub struct SqliteRepository {
    db_path: std::path::PathBuf,
}

impl SqliteRepository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let init_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&init_path).map_err(sqlite_err)?;
            create_schema(&conn)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))??;
        Ok(SqliteRepository { db_path: path })
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path).map_err(sqlite_err)
    }
}

fn sqlite_err(e: rusqlite::Error) -> ForgeError {
    ForgeError::Persistence(e.to_string())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS agent_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            lifecycle TEXT NOT NULL,
            blueprint_id TEXT NOT NULL,
            score REAL NOT NULL,
            artifact_path TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            run_id TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(agent_id, version)
        );
        CREATE TABLE IF NOT EXISTS optimization_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            agent_name TEXT NOT NULL,
            task_desc TEXT NOT NULL,
            best_blueprint_id TEXT NOT NULL,
            best_train_score REAL NOT NULL,
            best_val_score REAL,
            best_test_score REAL,
            artifact_dir TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS optimization_round_traces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES optimization_runs(run_id) ON DELETE CASCADE,
            round_num INTEGER NOT NULL,
            selected_node_id TEXT NOT NULL,
            selected_blueprint_id TEXT NOT NULL,
            mutation TEXT NOT NULL,
            train_objective REAL NOT NULL,
            val_objective REAL NOT NULL,
            best_train_objective REAL NOT NULL,
            best_val_objective REAL NOT NULL,
            improvement REAL NOT NULL,
            regret REAL NOT NULL
        );
        CREATE TABLE IF NOT EXISTS optimization_artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES optimization_runs(run_id) ON DELETE CASCADE,
            artifact_type TEXT NOT NULL,
            uri TEXT NOT NULL,
            checksum TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(run_id, artifact_type)
        );
        "#,
    )
    .map_err(sqlite_err)
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn ensure_agent(&self, agent_name: &str) -> Result<()> {
        let conn = self.connect()?;
        let agent_name = agent_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            conn.execute(
                "INSERT OR IGNORE INTO agents (name, created_at) VALUES (?1, ?2)",
                params![agent_name, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn next_version(&self, agent_name: &str) -> Result<u32> {
        let conn = self.connect()?;
        let agent_name = agent_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<u32> {
            let max: Option<i64> = conn
                .query_row(
                    "SELECT MAX(v.version) FROM agent_versions v
                     JOIN agents a ON a.id = v.agent_id WHERE a.name = ?1",
                    params![agent_name],
                    |row| row.get(0),
                )
                .map_err(sqlite_err)?;
            Ok(max.unwrap_or(0) as u32 + 1)
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn create_version(&self, record: AgentVersionRecord, run_id: Option<&str>) -> Result<()> {
        let mut conn = self.connect()?;
        let run_id = run_id.map(str::to_string);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let tx = conn.transaction().map_err(sqlite_err)?;
            tx.execute(
                "INSERT OR IGNORE INTO agents (name, created_at) VALUES (?1, ?2)",
                params![record.agent_name, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(sqlite_err)?;
            let agent_id: i64 = tx
                .query_row("SELECT id FROM agents WHERE name = ?1", params![record.agent_name], |row| row.get(0))
                .map_err(sqlite_err)?;
            tx.execute(
                "INSERT INTO agent_versions
                 (agent_id, version, lifecycle, blueprint_id, score, artifact_path, notes, run_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    agent_id,
                    record.version,
                    record.lifecycle.to_string(),
                    record.blueprint_id,
                    record.score,
                    record.artifact_path,
                    record.notes,
                    run_id,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(sqlite_err)?;
            tx.commit().map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn list_versions(&self, agent_name: &str) -> Result<Vec<AgentVersionRecord>> {
        let conn = self.connect()?;
        let agent_name = agent_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<AgentVersionRecord>> {
            let mut stmt = conn
                .prepare(
                    "SELECT v.version, v.lifecycle, v.blueprint_id, v.score, v.artifact_path, v.notes, v.created_at
                     FROM agent_versions v JOIN agents a ON a.id = v.agent_id
                     WHERE a.name = ?1 ORDER BY v.version ASC",
                )
                .map_err(sqlite_err)?;
            let rows = stmt
                .query_map(params![agent_name], |row| row_to_version(row, &agent_name))
                .map_err(sqlite_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(sqlite_err)?);
            }
            Ok(out)
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn get_version(&self, agent_name: &str, version: u32) -> Result<Option<AgentVersionRecord>> {
        let conn = self.connect()?;
        let agent_name = agent_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<AgentVersionRecord>> {
            conn.query_row(
                "SELECT v.version, v.lifecycle, v.blueprint_id, v.score, v.artifact_path, v.notes, v.created_at
                 FROM agent_versions v JOIN agents a ON a.id = v.agent_id
                 WHERE a.name = ?1 AND v.version = ?2",
                params![agent_name, version],
                |row| row_to_version(row, &agent_name),
            )
            .optional()
            .map_err(sqlite_err)
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn set_lifecycle(&self, agent_name: &str, version: u32, lifecycle: AgentLifecycle) -> Result<()> {
        let mut conn = self.connect()?;
        let agent_name = agent_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let tx = conn.transaction().map_err(sqlite_err)?;
            let agent_id: i64 = tx
                .query_row("SELECT id FROM agents WHERE name = ?1", params![agent_name], |row| row.get(0))
                .map_err(sqlite_err)?;
            if lifecycle == AgentLifecycle::Deployed {
                tx.execute(
                    "UPDATE agent_versions SET lifecycle = 'validated'
                     WHERE agent_id = ?1 AND lifecycle = 'deployed' AND version != ?2",
                    params![agent_id, version],
                )
                .map_err(sqlite_err)?;
            }
            let changed = tx
                .execute(
                    "UPDATE agent_versions SET lifecycle = ?1 WHERE agent_id = ?2 AND version = ?3",
                    params![lifecycle.to_string(), agent_id, version],
                )
                .map_err(sqlite_err)?;
            if changed == 0 {
                return Err(ForgeError::NotFound(format!("version {version} of agent {agent_name} not found")));
            }
            tx.commit().map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn create_run(&self, run: &OptimizationRun) -> Result<()> {
        let conn = self.connect()?;
        let run = run.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            conn.execute(
                "INSERT INTO optimization_runs
                 (run_id, agent_name, task_desc, best_blueprint_id, best_train_score, best_val_score,
                  best_test_score, artifact_dir, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.run_id,
                    run.agent_name,
                    run.task_desc,
                    run.best_blueprint_id,
                    run.best_train_score,
                    run.best_val_score,
                    run.best_test_score,
                    run.artifact_dir,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<OptimizationRun>> {
        let conn = self.connect()?;
        let run_id = run_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<OptimizationRun>> {
            let base: Option<(String, String, String, f64, Option<f64>, Option<f64>, String)> = conn
                .query_row(
                    "SELECT agent_name, task_desc, best_blueprint_id, best_train_score, best_val_score,
                            best_test_score, artifact_dir
                     FROM optimization_runs WHERE run_id = ?1",
                    params![run_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    },
                )
                .optional()
                .map_err(sqlite_err)?;
            let Some((agent_name, task_desc, best_blueprint_id, best_train_score, best_val_score, best_test_score, artifact_dir)) =
                base
            else {
                return Ok(None);
            };

            let mut trace_stmt = conn
                .prepare(
                    "SELECT round_num, selected_node_id, selected_blueprint_id, mutation, train_objective,
                            val_objective, best_train_objective, best_val_objective, improvement, regret
                     FROM optimization_round_traces WHERE run_id = ?1 ORDER BY round_num ASC",
                )
                .map_err(sqlite_err)?;
            let round_traces = trace_stmt
                .query_map(params![run_id], |row| {
                    Ok(SearchRoundTrace {
                        round_num: row.get::<_, i64>(0)? as u32,
                        selected_node_id: row.get(1)?,
                        selected_blueprint_id: row.get(2)?,
                        mutation: row.get(3)?,
                        train_objective: row.get(4)?,
                        val_objective: row.get(5)?,
                        best_train_objective: row.get(6)?,
                        best_val_objective: row.get(7)?,
                        improvement: row.get(8)?,
                        regret: row.get(9)?,
                        uncertainty: 0.0,
                        generalization_gap: 0.0,
                    })
                })
                .map_err(sqlite_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(sqlite_err)?;

            let mut artifact_stmt = conn
                .prepare(
                    "SELECT artifact_type, uri, checksum, size_bytes, created_at
                     FROM optimization_artifacts WHERE run_id = ?1 ORDER BY artifact_type ASC",
                )
                .map_err(sqlite_err)?;
            let artifact_index = artifact_stmt
                .query_map(params![run_id], |row| {
                    let created_at: String = row.get(4)?;
                    Ok(ArtifactIndexEntry {
                        artifact_type: row.get(0)?,
                        uri: row.get(1)?,
                        checksum: row.get(2)?,
                        size_bytes: row.get::<_, i64>(3)? as u64,
                        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                            .unwrap_or_else(|_| chrono::Utc::now().into())
                            .with_timezone(&chrono::Utc),
                    })
                })
                .map_err(sqlite_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(sqlite_err)?;

            Ok(Some(OptimizationRun {
                run_id,
                agent_name,
                task_desc,
                artifact_dir,
                best_blueprint_id,
                best_train_score,
                best_val_score,
                best_test_score,
                round_traces,
                artifact_index,
            }))
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn insert_round_traces(&self, run_id: &str, traces: &[SearchRoundTrace]) -> Result<()> {
        let mut conn = self.connect()?;
        let run_id = run_id.to_string();
        let traces = traces.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let tx = conn.transaction().map_err(sqlite_err)?;
            for trace in &traces {
                tx.execute(
                    "INSERT INTO optimization_round_traces
                     (run_id, round_num, selected_node_id, selected_blueprint_id, mutation, train_objective,
                      val_objective, best_train_objective, best_val_objective, improvement, regret)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        run_id,
                        trace.round_num,
                        trace.selected_node_id,
                        trace.selected_blueprint_id,
                        trace.mutation,
                        trace.train_objective,
                        trace.val_objective,
                        trace.best_train_objective,
                        trace.best_val_objective,
                        trace.improvement,
                        trace.regret,
                    ],
                )
                .map_err(sqlite_err)?;
            }
            tx.commit().map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }

    async fn insert_artifact(&self, run_id: &str, entry: &ArtifactIndexEntry) -> Result<()> {
        let conn = self.connect()?;
        let run_id = run_id.to_string();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            conn.execute(
                "INSERT INTO optimization_artifacts (run_id, artifact_type, uri, checksum, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(run_id, artifact_type) DO UPDATE SET
                    uri = excluded.uri, checksum = excluded.checksum, size_bytes = excluded.size_bytes,
                    created_at = excluded.created_at",
                params![
                    run_id,
                    entry.artifact_type,
                    entry.uri,
                    entry.checksum,
                    entry.size_bytes,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(sqlite_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ForgeError::Persistence(e.to_string()))?
    }
}

fn row_to_version(row: &rusqlite::Row<'_>, agent_name: &str) -> rusqlite::Result<AgentVersionRecord> {
    let created_at: String = row.get(6)?;
    let lifecycle: String = row.get(1)?;
    Ok(AgentVersionRecord {
        agent_name: agent_name.to_string(),
        version: row.get::<_, i64>(0)? as u32,
        lifecycle: lifecycle_from_str(&lifecycle),
        blueprint_id: row.get(2)?,
        score: row.get(3)?,
        artifact_path: row.get(4)?,
        notes: row.get(5)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .unwrap_or_else(|_| chrono::Utc::now().into())
            .with_timezone(&chrono::Utc),
    })
}

#[derive(Default)]
struct MemoryState {
    agents: Vec<String>,
    versions: Vec<(String, AgentVersionRecord)>,
    runs: HashMap<String, OptimizationRun>,
}

/// In-memory test double implementing the same repository contract, so unit tests never
/// touch a file.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        InMemoryRepository::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ensure_agent(&self, agent_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.agents.iter().any(|a| a == agent_name) {
            state.agents.push(agent_name.to_string());
        }
        Ok(())
    }

    async fn next_version(&self, agent_name: &str) -> Result<u32> {
        let state = self.state.lock();
        let max = state
            .versions
            .iter()
            .filter(|(name, _)| name == agent_name)
            .map(|(_, record)| record.version)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn create_version(&self, record: AgentVersionRecord, _run_id: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.agents.iter().any(|a| a == &record.agent_name) {
            state.agents.push(record.agent_name.clone());
        }
        state.versions.push((record.agent_name.clone(), record));
        Ok(())
    }

    async fn list_versions(&self, agent_name: &str) -> Result<Vec<AgentVersionRecord>> {
        let state = self.state.lock();
        let mut out: Vec<AgentVersionRecord> =
            state.versions.iter().filter(|(name, _)| name == agent_name).map(|(_, r)| r.clone()).collect();
        out.sort_by_key(|r| r.version);
        Ok(out)
    }

    async fn get_version(&self, agent_name: &str, version: u32) -> Result<Option<AgentVersionRecord>> {
        let state = self.state.lock();
        Ok(state
            .versions
            .iter()
            .find(|(name, r)| name == agent_name && r.version == version)
            .map(|(_, r)| r.clone()))
    }

    async fn set_lifecycle(&self, agent_name: &str, version: u32, lifecycle: AgentLifecycle) -> Result<()> {
        let mut state = self.state.lock();
        if lifecycle == AgentLifecycle::Deployed {
            for (name, record) in state.versions.iter_mut() {
                if name == agent_name && record.version != version && record.lifecycle == AgentLifecycle::Deployed {
                    record.lifecycle = AgentLifecycle::Validated;
                }
            }
        }
        let target = state
            .versions
            .iter_mut()
            .find(|(name, r)| name == agent_name && r.version == version);
        match target {
            Some((_, record)) => {
                record.lifecycle = lifecycle;
                Ok(())
            }
            None => Err(ForgeError::NotFound(format!("version {version} of agent {agent_name} not found"))),
        }
    }

    async fn create_run(&self, run: &OptimizationRun) -> Result<()> {
        self.state.lock().runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<OptimizationRun>> {
        Ok(self.state.lock().runs.get(run_id).cloned())
    }

    async fn insert_round_traces(&self, run_id: &str, traces: &[SearchRoundTrace]) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(run) = state.runs.get_mut(run_id) {
            run.round_traces.extend_from_slice(traces);
        }
        Ok(())
    }

    async fn insert_artifact(&self, run_id: &str, entry: &ArtifactIndexEntry) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(run) = state.runs.get_mut(run_id) {
            if let Some(existing) = run.artifact_index.iter_mut().find(|e| e.artifact_type == entry.artifact_type) {
                *existing = entry.clone();
            } else {
                run.artifact_index.push(entry.clone());
            }
        }
        Ok(())
    }
}

/// Shared handle used by services that need to hand out repository access without committing
/// to a concrete backend.
pub type SharedRepository = Arc<dyn Repository>;

#[cfg(test)]
mod tests {
    use super::*;

    fn version(agent: &str, version: u32, lifecycle: AgentLifecycle) -> AgentVersionRecord {
        AgentVersionRecord {
            agent_name: agent.to_string(),
            version,
            lifecycle,
            blueprint_id: format!("bp-{version}"),
            score: 0.5,
            artifact_path: "agents/demo/run-1/workflow.yml".to_string(),
            created_at: chrono::Utc::now(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_next_version_starts_at_one_and_increments() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.next_version("demo").await.unwrap(), 1);
        repo.create_version(version("demo", 1, AgentLifecycle::Draft), None).await.unwrap();
        assert_eq!(repo.next_version("demo").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deploying_a_version_demotes_the_previous_deployed_version() {
        let repo = InMemoryRepository::new();
        repo.create_version(version("demo", 1, AgentLifecycle::Deployed), None).await.unwrap();
        repo.create_version(version("demo", 2, AgentLifecycle::Validated), None).await.unwrap();
        repo.set_lifecycle("demo", 2, AgentLifecycle::Deployed).await.unwrap();

        let v1 = repo.get_version("demo", 1).await.unwrap().unwrap();
        let v2 = repo.get_version("demo", 2).await.unwrap().unwrap();
        assert_eq!(v1.lifecycle, AgentLifecycle::Validated);
        assert_eq!(v2.lifecycle, AgentLifecycle::Deployed);
    }

    #[tokio::test]
    async fn set_lifecycle_on_missing_version_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.set_lifecycle("demo", 1, AgentLifecycle::Deployed).await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn sqlite_repository_persists_versions_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.db");
        let repo = SqliteRepository::open(&db_path).await.unwrap();
        repo.create_version(version("demo", 1, AgentLifecycle::Draft), None).await.unwrap();
        let fetched = repo.get_version("demo", 1).await.unwrap().unwrap();
        assert_eq!(fetched.blueprint_id, "bp-1");
        assert_eq!(repo.next_version("demo").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sqlite_repository_deploy_demotes_previous_deployed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.db");
        let repo = SqliteRepository::open(&db_path).await.unwrap();
        repo.create_version(version("demo", 1, AgentLifecycle::Deployed), None).await.unwrap();
        repo.create_version(version("demo", 2, AgentLifecycle::Validated), None).await.unwrap();
        repo.set_lifecycle("demo", 2, AgentLifecycle::Deployed).await.unwrap();

        let v1 = repo.get_version("demo", 1).await.unwrap().unwrap();
        let v2 = repo.get_version("demo", 2).await.unwrap().unwrap();
        assert_eq!(v1.lifecycle, AgentLifecycle::Validated);
        assert_eq!(v2.lifecycle, AgentLifecycle::Deployed);
    }

    #[tokio::test]
    async fn sqlite_repository_round_trips_run_with_traces_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.db");
        let repo = SqliteRepository::open(&db_path).await.unwrap();
        let run = OptimizationRun {
            run_id: "run-abc123".to_string(),
            agent_name: "demo".to_string(),
            task_desc: "answer questions".to_string(),
            artifact_dir: "agents/demo/run-abc123".to_string(),
            best_blueprint_id: "bp-1".to_string(),
            best_train_score: 0.8,
            best_val_score: Some(0.75),
            best_test_score: None,
            round_traces: vec![],
            artifact_index: vec![],
        };
        repo.create_run(&run).await.unwrap();
        repo.insert_round_traces(
            "run-abc123",
            &[SearchRoundTrace {
                round_num: 0,
                selected_node_id: "node-0".to_string(),
                selected_blueprint_id: "bp-1".to_string(),
                mutation: "mutation:disabled".to_string(),
                train_objective: 0.8,
                val_objective: 0.75,
                best_train_objective: 0.8,
                best_val_objective: 0.75,
                improvement: 0.0,
                regret: 0.0,
                uncertainty: 0.0,
                generalization_gap: 0.05,
            }],
        )
        .await
        .unwrap();
        repo.insert_artifact(
            "run-abc123",
            &ArtifactIndexEntry {
                artifact_type: "workflow_yaml".to_string(),
                uri: "local://agents/demo/run-abc123/workflow.yml".to_string(),
                checksum: "sha256:abc".to_string(),
                size_bytes: 128,
                created_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

        let fetched = repo.get_run("run-abc123").await.unwrap().unwrap();
        assert_eq!(fetched.round_traces.len(), 1);
        assert_eq!(fetched.artifact_index.len(), 1);
        assert_eq!(fetched.artifact_index[0].artifact_type, "workflow_yaml");
    }
}
