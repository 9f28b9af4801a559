//! Job repository: CRUD operations for the `extraction_jobs` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::job::{
    ExtractionLevel, FileTypeFilter, JobConfig, JobRecord, JobSpec, JobStatus, OutputFormat,
};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub backup_id: String,
    pub created_by: Option<String>,
    pub extraction_level: String,
    pub file_type_filter: String,
    /// JSON array of extensions.
    pub custom_file_types: String,
    pub directory_path: String,
    pub max_depth: i64,
    pub max_file_size: i64,
    pub chunk_size: i64,
    pub include_attributes: bool,
    pub parallel_processing: bool,
    pub max_workers: i64,
    pub enable_document_parsing: bool,
    pub enable_spreadsheet_parsing: bool,
    pub enable_presentation_parsing: bool,
    pub enable_log_parsing: bool,
    pub enable_config_parsing: bool,
    pub enable_sqlite_extraction: bool,
    pub enable_sql_dump_parsing: bool,
    pub enable_enterprise_db_extraction: bool,
    pub max_db_rows_per_table: i64,
    pub output_format: String,
    pub include_raw_content: bool,
    pub include_chunks: bool,
    pub include_embeddings: bool,
    pub status: String,
    pub total_files: i64,
    pub processed_files: i64,
    pub failed_files: i64,
    pub progress_percentage: f64,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
    /// JSON object.
    pub results_summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            backup_id: row.get("backup_id")?,
            created_by: row.get("created_by")?,
            extraction_level: row.get("extraction_level")?,
            file_type_filter: row.get("file_type_filter")?,
            custom_file_types: row.get("custom_file_types")?,
            directory_path: row.get("directory_path")?,
            max_depth: row.get("max_depth")?,
            max_file_size: row.get("max_file_size")?,
            chunk_size: row.get("chunk_size")?,
            include_attributes: row.get("include_attributes")?,
            parallel_processing: row.get("parallel_processing")?,
            max_workers: row.get("max_workers")?,
            enable_document_parsing: row.get("enable_document_parsing")?,
            enable_spreadsheet_parsing: row.get("enable_spreadsheet_parsing")?,
            enable_presentation_parsing: row.get("enable_presentation_parsing")?,
            enable_log_parsing: row.get("enable_log_parsing")?,
            enable_config_parsing: row.get("enable_config_parsing")?,
            enable_sqlite_extraction: row.get("enable_sqlite_extraction")?,
            enable_sql_dump_parsing: row.get("enable_sql_dump_parsing")?,
            enable_enterprise_db_extraction: row.get("enable_enterprise_db_extraction")?,
            max_db_rows_per_table: row.get("max_db_rows_per_table")?,
            output_format: row.get("output_format")?,
            include_raw_content: row.get("include_raw_content")?,
            include_chunks: row.get("include_chunks")?,
            include_embeddings: row.get("include_embeddings")?,
            status: row.get("status")?,
            total_files: row.get("total_files")?,
            processed_files: row.get("processed_files")?,
            failed_files: row.get("failed_files")?,
            progress_percentage: row.get("progress_percentage")?,
            error_message: row.get("error_message")?,
            output_path: row.get("output_path")?,
            results_summary: row.get("results_summary")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn from_record(record: &JobRecord) -> Result<Self, DatabaseError> {
        let spec = &record.spec;
        let config = &spec.config;
        Ok(Self {
            id: record.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            backup_id: spec.backup_id.clone(),
            created_by: spec.created_by.clone(),
            extraction_level: config.extraction_level.as_str().to_string(),
            file_type_filter: config.file_type_filter.as_str().to_string(),
            custom_file_types: serde_json::to_string(&config.custom_file_types)?,
            directory_path: config.directory_path.clone(),
            max_depth: config.max_depth as i64,
            max_file_size: config.max_file_size as i64,
            chunk_size: config.chunk_size as i64,
            include_attributes: config.include_attributes,
            parallel_processing: config.parallel_processing,
            max_workers: config.max_workers as i64,
            enable_document_parsing: config.enable_document_parsing,
            enable_spreadsheet_parsing: config.enable_spreadsheet_parsing,
            enable_presentation_parsing: config.enable_presentation_parsing,
            enable_log_parsing: config.enable_log_parsing,
            enable_config_parsing: config.enable_config_parsing,
            enable_sqlite_extraction: config.enable_sqlite_extraction,
            enable_sql_dump_parsing: config.enable_sql_dump_parsing,
            enable_enterprise_db_extraction: config.enable_enterprise_db_extraction,
            max_db_rows_per_table: config.max_db_rows_per_table as i64,
            output_format: config.output_format.as_str().to_string(),
            include_raw_content: config.include_raw_content,
            include_chunks: config.include_chunks,
            include_embeddings: config.include_embeddings,
            status: record.status.as_str().to_string(),
            total_files: record.total_files as i64,
            processed_files: record.processed_files as i64,
            failed_files: record.failed_files as i64,
            progress_percentage: record.progress_percentage,
            error_message: record.error_message.clone(),
            output_path: record.output_path.clone(),
            results_summary: record
                .results_summary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            started_at: record.started_at.map(|t| t.to_rfc3339()),
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
        })
    }

    pub fn into_record(self) -> Result<JobRecord, DatabaseError> {
        let config = JobConfig {
            extraction_level: ExtractionLevel::parse(&self.extraction_level)
                .ok_or_else(|| DatabaseError::invalid("extraction_level", &self.extraction_level))?,
            file_type_filter: FileTypeFilter::parse(&self.file_type_filter)
                .ok_or_else(|| DatabaseError::invalid("file_type_filter", &self.file_type_filter))?,
            custom_file_types: serde_json::from_str(&self.custom_file_types)?,
            directory_path: self.directory_path,
            max_depth: self.max_depth.max(0) as u32,
            max_file_size: self.max_file_size.max(0) as u64,
            chunk_size: self.chunk_size.max(0) as usize,
            include_attributes: self.include_attributes,
            parallel_processing: self.parallel_processing,
            max_workers: self.max_workers.max(0) as u32,
            enable_document_parsing: self.enable_document_parsing,
            enable_spreadsheet_parsing: self.enable_spreadsheet_parsing,
            enable_presentation_parsing: self.enable_presentation_parsing,
            enable_log_parsing: self.enable_log_parsing,
            enable_config_parsing: self.enable_config_parsing,
            enable_sqlite_extraction: self.enable_sqlite_extraction,
            enable_sql_dump_parsing: self.enable_sql_dump_parsing,
            enable_enterprise_db_extraction: self.enable_enterprise_db_extraction,
            max_db_rows_per_table: self.max_db_rows_per_table.max(0) as u32,
            output_format: OutputFormat::parse(&self.output_format)
                .ok_or_else(|| DatabaseError::invalid("output_format", &self.output_format))?,
            include_raw_content: self.include_raw_content,
            include_chunks: self.include_chunks,
            include_embeddings: self.include_embeddings,
        };

        Ok(JobRecord {
            id: self.id,
            spec: JobSpec {
                name: self.name,
                description: self.description,
                backup_id: self.backup_id,
                created_by: self.created_by,
                config,
            },
            status: JobStatus::parse(&self.status)
                .ok_or_else(|| DatabaseError::invalid("status", &self.status))?,
            total_files: self.total_files.max(0) as u64,
            processed_files: self.processed_files.max(0) as u64,
            failed_files: self.failed_files.max(0) as u64,
            progress_percentage: self.progress_percentage,
            error_message: self.error_message,
            output_path: self.output_path,
            results_summary: self
                .results_summary
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            started_at: self
                .started_at
                .as_deref()
                .map(|t| parse_timestamp("started_at", t))
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|t| parse_timestamp("completed_at", t))
                .transpose()?,
        })
    }
}

pub(crate) fn parse_timestamp(
    column: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DatabaseError::invalid(column, value))
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub backup_id: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extraction_jobs (id, name, description, backup_id, created_by,
             extraction_level, file_type_filter, custom_file_types, directory_path, max_depth,
             max_file_size, chunk_size, include_attributes, parallel_processing, max_workers,
             enable_document_parsing, enable_spreadsheet_parsing, enable_presentation_parsing,
             enable_log_parsing, enable_config_parsing, enable_sqlite_extraction,
             enable_sql_dump_parsing, enable_enterprise_db_extraction, max_db_rows_per_table,
             output_format, include_raw_content, include_chunks, include_embeddings, status,
             total_files, processed_files, failed_files, progress_percentage, error_message,
             output_path, results_summary, created_at, updated_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32,
             ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40)",
            params![
                job.id,
                job.name,
                job.description,
                job.backup_id,
                job.created_by,
                job.extraction_level,
                job.file_type_filter,
                job.custom_file_types,
                job.directory_path,
                job.max_depth,
                job.max_file_size,
                job.chunk_size,
                job.include_attributes,
                job.parallel_processing,
                job.max_workers,
                job.enable_document_parsing,
                job.enable_spreadsheet_parsing,
                job.enable_presentation_parsing,
                job.enable_log_parsing,
                job.enable_config_parsing,
                job.enable_sqlite_extraction,
                job.enable_sql_dump_parsing,
                job.enable_enterprise_db_extraction,
                job.max_db_rows_per_table,
                job.output_format,
                job.include_raw_content,
                job.include_chunks,
                job.include_embeddings,
                job.status,
                job.total_files,
                job.processed_files,
                job.failed_files,
                job.progress_percentage,
                job.error_message,
                job.output_path,
                job.results_summary,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates an existing job row. All fields except `id` and `created_at` are overwritten.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE extraction_jobs SET name=?2, description=?3, backup_id=?4, created_by=?5,
             extraction_level=?6, file_type_filter=?7, custom_file_types=?8, directory_path=?9,
             max_depth=?10, max_file_size=?11, chunk_size=?12, include_attributes=?13,
             parallel_processing=?14, max_workers=?15, enable_document_parsing=?16,
             enable_spreadsheet_parsing=?17, enable_presentation_parsing=?18,
             enable_log_parsing=?19, enable_config_parsing=?20, enable_sqlite_extraction=?21,
             enable_sql_dump_parsing=?22, enable_enterprise_db_extraction=?23,
             max_db_rows_per_table=?24, output_format=?25, include_raw_content=?26,
             include_chunks=?27, include_embeddings=?28, status=?29, total_files=?30,
             processed_files=?31, failed_files=?32, progress_percentage=?33, error_message=?34,
             output_path=?35, results_summary=?36, updated_at=?37, started_at=?38,
             completed_at=?39
             WHERE id=?1",
            params![
                job.id,
                job.name,
                job.description,
                job.backup_id,
                job.created_by,
                job.extraction_level,
                job.file_type_filter,
                job.custom_file_types,
                job.directory_path,
                job.max_depth,
                job.max_file_size,
                job.chunk_size,
                job.include_attributes,
                job.parallel_processing,
                job.max_workers,
                job.enable_document_parsing,
                job.enable_spreadsheet_parsing,
                job.enable_presentation_parsing,
                job.enable_log_parsing,
                job.enable_config_parsing,
                job.enable_sqlite_extraction,
                job.enable_sql_dump_parsing,
                job.enable_enterprise_db_extraction,
                job.max_db_rows_per_table,
                job.output_format,
                job.include_raw_content,
                job.include_chunks,
                job.include_embeddings,
                job.status,
                job.total_files,
                job.processed_files,
                job.failed_files,
                job.progress_percentage,
                job.error_message,
                job.output_path,
                job.results_summary,
                job.updated_at,
                job.started_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Writes only the live counters of a running job.
pub fn update_progress(
    db: &Database,
    id: &str,
    total: u64,
    processed: u64,
    failed: u64,
    percentage: f64,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE extraction_jobs SET total_files = ?2, processed_files = ?3,
             failed_files = ?4, progress_percentage = ?5, updated_at = ?6 WHERE id = ?1",
            params![
                id,
                total as i64,
                processed as i64,
                failed as i64,
                percentage,
                updated_at
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM extraction_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries jobs with filters, newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref backup_id) = filter.backup_id {
            conditions.push(format!("backup_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(backup_id.clone()));
        }
        if let Some(ref created_by) = filter.created_by {
            conditions.push(format!("created_by = ?{}", param_values.len() + 1));
            param_values.push(Box::new(created_by.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM extraction_jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM extraction_jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Deletes a job and, through the foreign key, its executions.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM extraction_jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM extraction_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Every job in the given status, oldest first.
pub fn list_by_status(db: &Database, status: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extraction_jobs WHERE status = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![status], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
