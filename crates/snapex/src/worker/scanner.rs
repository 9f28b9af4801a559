use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::classifier::{classify, eligible, refine_with_signature, Classification, ExtensionSet};
use crate::error::WorkerError;
use crate::job::{FileTypeFilter, JobConfig};

/// A file discovered during traversal. Lives only for the duration of a run.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Path below the traversal root, `/`-separated.
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub classification: Classification,
}

impl FileDescriptor {
    pub fn extractable(&self) -> bool {
        self.classification.extractor.is_some()
    }
}

/// Result of a complete traversal. `files` is final: nothing is discovered
/// after the scan returns.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<FileDescriptor>,
    pub oversize_skipped: usize,
    pub ineligible: usize,
    pub unreadable: usize,
}

/// Depth-bounded walk of a job's root directory applying the file-type
/// filter and size limit.
pub struct TreeScanner {
    root: PathBuf,
    max_depth: usize,
    max_file_size: u64,
    filter: FileTypeFilter,
    custom: ExtensionSet,
}

impl TreeScanner {
    pub fn new<P: AsRef<Path>>(root: P, config: &JobConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_depth: config.max_depth.max(1) as usize,
            max_file_size: config.max_file_size,
            filter: config.file_type_filter,
            custom: config.custom_extensions(),
        }
    }

    pub fn scan(&self) -> Result<ScanReport, WorkerError> {
        if !self.root.is_dir() {
            return Err(WorkerError::RootNotFound(self.root.clone()));
        }

        let mut report = ScanReport::default();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: self.root.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    report.unreadable += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let classification = refine_with_signature(path, classify(path));
            if !eligible(&classification, self.filter, &self.custom) {
                report.ineligible += 1;
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    report.unreadable += 1;
                    continue;
                }
            };

            if metadata.len() > self.max_file_size {
                debug!(
                    "Skipping {} ({} bytes exceeds limit of {})",
                    path.display(),
                    metadata.len(),
                    self.max_file_size
                );
                report.oversize_skipped += 1;
                continue;
            }

            report.files.push(FileDescriptor {
                relative_path: relative_path(&self.root, path),
                path: path.to_path_buf(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                classification,
            });
        }

        info!(
            "Scanned {}: {} eligible files, {} oversize, {} filtered out",
            self.root.display(),
            report.files.len(),
            report.oversize_skipped,
            report.ineligible
        );
        Ok(report)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
