//! Durable job queue: a pending table and a dead-letter table.

use authledger_db::{format_timestamp, Connections, Migration, Migrator, TableMigration};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::error::JobError;
use crate::job::{JobPayload, StoredJob};

/// Table holding pending jobs.
pub const TABLE_JOBS: &str = "jobs";
/// Table holding jobs whose processing failed.
pub const TABLE_FAILED_JOBS: &str = "failed_jobs";
/// Maximum length of the stored type discriminator.
pub const JOB_TYPE_MAX_LENGTH: usize = 1024;

fn migrations() -> Vec<Box<dyn Migration>> {
    let columns = format!(
        "id INTEGER PRIMARY KEY AUTOINCREMENT,
         type VARCHAR({JOB_TYPE_MAX_LENGTH}) NOT NULL
            CHECK (length(type) <= {JOB_TYPE_MAX_LENGTH}),
         payload TEXT NOT NULL,
         created_at TEXT NOT NULL"
    );

    vec![
        Box::new(TableMigration::new(20220801000100, "", TABLE_JOBS, &columns)),
        Box::new(
            TableMigration::new(
                20220801000200,
                "",
                TABLE_FAILED_JOBS,
                &format!(
                    "{columns},
                     error_message TEXT NOT NULL,
                     failed_at TEXT NOT NULL"
                ),
            )
            .with_index("failed_at", "failed_at"),
        ),
    ]
}

/// The job queue over the master connection.
///
/// Every operation uses the master pool: claiming a job is a write.
#[derive(Debug, Clone)]
pub struct JobsStore {
    connections: Connections,
}

impl JobsStore {
    pub fn new(connections: Connections) -> Self {
        Self { connections }
    }

    /// Whether the queue tables are missing.
    pub fn needs_setup(&self) -> Result<bool, JobError> {
        let conn = self.connections.writer()?;
        let migrator = Migrator::new(&conn);

        if migrator.needs_setup()? {
            return Ok(true);
        }

        Ok(!migrator.pending(&migrations())?.is_empty())
    }

    /// Creates the queue tables. Logs a warning and does nothing if they
    /// already exist.
    pub fn run_setup(&self) -> Result<(), JobError> {
        if !self.needs_setup()? {
            tracing::warn!(store = "jobs", "setup requested but schema is already current");
            return Ok(());
        }

        let conn = self.connections.writer()?;
        let applied = Migrator::new(&conn).run_pending(&migrations())?;
        tracing::info!(store = "jobs", applied, "job queue setup complete");

        Ok(())
    }

    /// Appends a job. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Serialization` if the payload cannot be encoded.
    pub fn enqueue(&self, payload: &JobPayload) -> Result<i64, JobError> {
        let kind = payload.kind();
        let encoded = payload.encode()?;

        let conn = self.connections.writer()?;
        conn.execute(
            &format!("INSERT INTO {TABLE_JOBS} (type, payload, created_at) VALUES (?1, ?2, ?3)"),
            params![kind.as_str(), encoded, format_timestamp(&Utc::now())],
        )?;
        let id = conn.last_insert_rowid();

        tracing::debug!(job_id = id, job_type = %kind, "enqueued job");
        Ok(id)
    }

    /// Claims the oldest pending job, removing it from the queue.
    ///
    /// The select and delete run in one immediate transaction, which holds
    /// the database write lock, so concurrent callers never claim the same
    /// row. Once claimed, the job exists only in the returned value until
    /// it is moved to the failed table.
    ///
    /// Columns are not interpreted here: a row with a malformed type,
    /// payload or timestamp is still claimed, and fails later in
    /// [`StoredJob::decode`].
    pub fn dequeue_next(&self) -> Result<Option<StoredJob>, JobError> {
        let mut conn = self.connections.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                &format!(
                    "SELECT id, type, payload, created_at FROM {TABLE_JOBS}
                     ORDER BY id ASC LIMIT 1"
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Value>(1)?,
                        row.get::<_, Value>(2)?,
                        row.get::<_, Value>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, job_type, payload, created_at)) = row else {
            return Ok(None);
        };

        tx.execute(&format!("DELETE FROM {TABLE_JOBS} WHERE id = ?1"), [id])?;
        tx.commit()?;

        let job = StoredJob {
            id,
            job_type: column_text(job_type),
            payload: column_text(payload),
            created_at: column_text(created_at),
        };
        tracing::debug!(job_id = id, job_type = %job.job_type, "claimed job");

        Ok(Some(job))
    }

    /// Records a claimed job in the failed table together with `error`.
    /// Returns the failed row id.
    pub fn mark_failed(&self, job: &StoredJob, error: &str) -> Result<i64, JobError> {
        let conn = self.connections.writer()?;
        conn.execute(
            &format!(
                "INSERT INTO {TABLE_FAILED_JOBS}
                    (type, payload, created_at, error_message, failed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                job.job_type,
                job.payload,
                job.created_at,
                error,
                format_timestamp(&Utc::now()),
            ],
        )?;
        let failed_id = conn.last_insert_rowid();

        tracing::warn!(
            job_id = job.id,
            failed_id,
            job_type = %job.job_type,
            error,
            "moved job to failed table"
        );
        Ok(failed_id)
    }

    /// Moves a failed job back to the pending table.
    ///
    /// Returns the new pending job id, or `None` if no failed job has
    /// `failed_id`.
    pub fn replay_failed(&self, failed_id: i64) -> Result<Option<i64>, JobError> {
        let mut conn = self.connections.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            &format!(
                "INSERT INTO {TABLE_JOBS} (type, payload, created_at)
                 SELECT type, payload, created_at FROM {TABLE_FAILED_JOBS} WHERE id = ?1"
            ),
            [failed_id],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        let job_id = tx.last_insert_rowid();

        tx.execute(
            &format!("DELETE FROM {TABLE_FAILED_JOBS} WHERE id = ?1"),
            [failed_id],
        )?;
        tx.commit()?;

        tracing::info!(failed_id, job_id, "replayed failed job");
        Ok(Some(job_id))
    }

    /// Number of jobs waiting to be claimed.
    pub fn count_pending(&self) -> Result<u64, JobError> {
        self.count(TABLE_JOBS)
    }

    /// Number of jobs in the failed table.
    pub fn count_failed(&self) -> Result<u64, JobError> {
        self.count(TABLE_FAILED_JOBS)
    }

    fn count(&self, table: &str) -> Result<u64, JobError> {
        let conn = self.connections.reader()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}

/// Renders a stored value as text the way SQLite's `CAST(x AS TEXT)` does.
fn column_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(text) => text,
        Value::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}
