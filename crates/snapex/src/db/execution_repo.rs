//! Execution history: one `job_executions` row per pipeline run.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRow {
    pub id: String,
    pub job_id: String,
    pub status: String,
    pub session_id: Option<String>,
    pub mount_kind: Option<String>,
    pub mount_point: Option<String>,
    pub files_processed: i64,
    pub chunks_created: i64,
    pub databases_extracted: i64,
    pub errors_count: i64,
    pub output_path: Option<String>,
    pub error_log: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl ExecutionRow {
    pub fn started(id: String, job_id: String, started_at: String) -> Self {
        Self {
            id,
            job_id,
            status: "running".to_string(),
            session_id: None,
            mount_kind: None,
            mount_point: None,
            files_processed: 0,
            chunks_created: 0,
            databases_extracted: 0,
            errors_count: 0,
            output_path: None,
            error_log: None,
            started_at,
            completed_at: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            status: row.get("status")?,
            session_id: row.get("session_id")?,
            mount_kind: row.get("mount_kind")?,
            mount_point: row.get("mount_point")?,
            files_processed: row.get("files_processed")?,
            chunks_created: row.get("chunks_created")?,
            databases_extracted: row.get("databases_extracted")?,
            errors_count: row.get("errors_count")?,
            output_path: row.get("output_path")?,
            error_log: row.get("error_log")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Aggregate figures over every recorded execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionTotals {
    pub executions: u64,
    pub files_processed: u64,
    pub chunks_created: u64,
    pub databases_extracted: u64,
    pub errors: u64,
}

pub fn insert(db: &Database, execution: &ExecutionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_executions (id, job_id, status, session_id, mount_kind, mount_point,
             files_processed, chunks_created, databases_extracted, errors_count, output_path,
             error_log, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                execution.id,
                execution.job_id,
                execution.status,
                execution.session_id,
                execution.mount_kind,
                execution.mount_point,
                execution.files_processed,
                execution.chunks_created,
                execution.databases_extracted,
                execution.errors_count,
                execution.output_path,
                execution.error_log,
                execution.started_at,
                execution.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites everything except the identity columns and `started_at`.
pub fn update(db: &Database, execution: &ExecutionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE job_executions SET status=?2, session_id=?3, mount_kind=?4, mount_point=?5,
             files_processed=?6, chunks_created=?7, databases_extracted=?8, errors_count=?9,
             output_path=?10, error_log=?11, completed_at=?12
             WHERE id=?1",
            params![
                execution.id,
                execution.status,
                execution.session_id,
                execution.mount_kind,
                execution.mount_point,
                execution.files_processed,
                execution.chunks_created,
                execution.databases_extracted,
                execution.errors_count,
                execution.output_path,
                execution.error_log,
                execution.completed_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(
    db: &Database,
    job_id: &str,
    execution_id: &str,
) -> Result<Option<ExecutionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_executions WHERE job_id = ?1 AND id = ?2")?;
        let mut rows = stmt.query_map(params![job_id, execution_id], ExecutionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Executions of one job, newest first.
pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<ExecutionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job_executions WHERE job_id = ?1
             ORDER BY started_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![job_id], ExecutionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn totals(db: &Database) -> Result<ExecutionTotals, DatabaseError> {
    db.with_conn(|conn| {
        let totals = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(files_processed), 0), COALESCE(SUM(chunks_created), 0),
             COALESCE(SUM(databases_extracted), 0), COALESCE(SUM(errors_count), 0)
             FROM job_executions",
            [],
            |r| {
                Ok(ExecutionTotals {
                    executions: r.get(0)?,
                    files_processed: r.get(1)?,
                    chunks_created: r.get(2)?,
                    databases_extracted: r.get(3)?,
                    errors: r.get(4)?,
                })
            },
        )?;
        Ok(totals)
    })
}
