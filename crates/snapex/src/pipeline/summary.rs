use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ExtractionError;
use crate::extractor::{ExtractorFamily, FileExtraction};
use crate::worker::ScanReport;

pub const DEFAULT_MAX_ERROR_DETAILS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub path: String,
    pub error: String,
}

/// Aggregate of one run, stored as the job's `results_summary`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_by_type: BTreeMap<String, u64>,
    pub chunks_created: u64,
    pub records_extracted: u64,
    pub databases_extracted: u64,
    pub oversize_skipped: u64,
    pub filtered_out: u64,
    pub unreadable_entries: u64,
    pub skipped_after_cancel: u64,
    /// `path:table` for every table cut short by the row cap.
    pub truncated_tables: Vec<String>,
    pub error_details: Vec<ErrorDetail>,
    /// Errors recorded beyond the detail cap.
    pub errors_omitted: u64,
    #[serde(skip)]
    max_error_details: usize,
}

impl RunSummary {
    pub fn new(max_error_details: usize) -> Self {
        Self {
            max_error_details,
            ..Default::default()
        }
    }

    pub fn record_scan(&mut self, report: &ScanReport) {
        self.oversize_skipped = report.oversize_skipped as u64;
        self.filtered_out = report.ineligible as u64;
        self.unreadable_entries = report.unreadable as u64;
    }

    pub fn record_completed(&mut self, extraction: &FileExtraction) {
        *self
            .files_by_type
            .entry(extraction.file_type.as_str().to_string())
            .or_insert(0) += 1;

        let Some(outcome) = extraction.outcome.as_ref() else {
            return;
        };
        self.chunks_created += outcome.chunks.len() as u64;
        self.records_extracted += outcome.records.len() as u64;

        let is_database = extraction
            .extractor
            .is_some_and(|kind| kind.family() == ExtractorFamily::Database);
        if !is_database {
            return;
        }
        self.databases_extracted += 1;
        for record in &outcome.records {
            if record.get("truncated") == Some(&Value::Bool(true)) {
                let table = record.get("table").and_then(Value::as_str).unwrap_or("?");
                self.truncated_tables
                    .push(format!("{}:{}", extraction.relative_path, table));
            }
        }
    }

    pub fn record_failed(&mut self, path: &str, error: &ExtractionError) {
        if self.error_details.len() < self.max_error_details {
            self.error_details.push(ErrorDetail {
                path: path.to_string(),
                error: error.to_string(),
            });
        } else {
            self.errors_omitted += 1;
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped_after_cancel += 1;
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
