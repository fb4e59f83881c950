use rusqlite::{Connection, params};
use std::path::Path;

/// SQLite-backed audit log of job runs and batch loads.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS job_runs (
                id TEXT PRIMARY KEY,
                job_name TEXT,
                processor TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER,
                rows INTEGER NOT NULL DEFAULT 0,
                failures INTEGER NOT NULL DEFAULT 0,
                error TEXT
            );
            CREATE TABLE IF NOT EXISTS batch_loads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES job_runs(id),
                destination TEXT NOT NULL,
                status TEXT NOT NULL,
                records INTEGER NOT NULL,
                error TEXT,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status);
            CREATE INDEX IF NOT EXISTS idx_batch_loads_run_id ON batch_loads(run_id);"
        )?;
        Ok(())
    }

    /// Record a job run as started.
    pub fn insert_job_run(
        &self,
        id: &str,
        job_name: Option<&str>,
        processor: &str,
        started_at: &str,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO job_runs (id, job_name, processor, status, started_at)
             VALUES (?1, ?2, ?3, 'running', ?4)",
            params![id, job_name, processor, started_at],
        )?;
        Ok(())
    }

    /// Complete a job run.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_job_run(
        &self,
        id: &str,
        status: &str,
        finished_at: &str,
        duration_ms: i64,
        rows: i64,
        failures: i64,
        error: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE job_runs
             SET status = ?2, finished_at = ?3, duration_ms = ?4, rows = ?5, failures = ?6, error = ?7
             WHERE id = ?1",
            params![id, status, finished_at, duration_ms, rows, failures, error],
        )?;
        Ok(())
    }

    /// Record the outcome of one batch load.
    pub fn insert_batch_load(
        &self,
        run_id: &str,
        destination: &str,
        status: &str,
        records: i64,
        error: Option<&str>,
        at: &str,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO batch_loads (run_id, destination, status, records, error, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, destination, status, records, error, at],
        )?;
        Ok(())
    }

    /// Mark runs left `running` by a process that went away as `abandoned`.
    pub fn mark_unfinished_as_abandoned(&self) -> Result<usize, rusqlite::Error> {
        let count = self.conn.execute(
            "UPDATE job_runs SET status = 'abandoned' WHERE status = 'running'",
            [],
        )?;
        Ok(count)
    }

    /// Get recent job runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<JobRunRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_name, processor, status, started_at, finished_at, duration_ms, rows, failures, error
             FROM job_runs ORDER BY started_at DESC LIMIT ?1"
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(JobRunRow {
                id: row.get(0)?,
                job_name: row.get(1)?,
                processor: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
                duration_ms: row.get(6)?,
                rows: row.get(7)?,
                failures: row.get(8)?,
                error: row.get(9)?,
            })
        })?;
        rows.collect()
    }

    /// Get batch loads for a specific job run in the order they happened.
    pub fn batch_loads_for(&self, run_id: &str) -> Result<Vec<BatchLoadRow>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, destination, status, records, error, at
             FROM batch_loads WHERE run_id = ?1 ORDER BY id"
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(BatchLoadRow {
                run_id: row.get(0)?,
                destination: row.get(1)?,
                status: row.get(2)?,
                records: row.get(3)?,
                error: row.get(4)?,
                at: row.get(5)?,
            })
        })?;
        rows.collect()
    }
}

#[derive(Debug)]
pub struct JobRunRow {
    pub id: String,
    pub job_name: Option<String>,
    pub processor: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub rows: i64,
    pub failures: i64,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct BatchLoadRow {
    pub run_id: String,
    pub destination: String,
    pub status: String,
    pub records: i64,
    pub error: Option<String>,
    pub at: String,
}
