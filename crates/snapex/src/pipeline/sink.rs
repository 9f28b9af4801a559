//! Per-file output ledger of a run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::error::PipelineError;
use crate::error::ExtractionError;
use crate::extractor::{ExtractorKind, FileExtraction};
use crate::job::{JobConfig, OutputFormat};
use crate::worker::FileDescriptor;

const CSV_HEADER: [&str; 10] = [
    "path",
    "size",
    "modified",
    "file_type",
    "mime_type",
    "extractor",
    "record_count",
    "chunk_count",
    "truncated",
    "error",
];

enum SinkWriter {
    Json(BufWriter<File>),
    Csv(csv::Writer<File>),
}

/// Writes one entry per attempted file to
/// `{output_directory}/{job_id}/results.{jsonl,csv}`.
pub struct OutputSink {
    path: PathBuf,
    writer: SinkWriter,
    include_raw_content: bool,
    include_chunks: bool,
    include_embeddings: bool,
    written: u64,
}

impl OutputSink {
    pub fn create(
        output_directory: &Path,
        job_id: &str,
        config: &JobConfig,
    ) -> Result<Self, PipelineError> {
        let directory = output_directory.join(job_id);
        std::fs::create_dir_all(&directory).map_err(|e| PipelineError::output(&directory, e))?;

        let (path, writer) = match config.output_format {
            OutputFormat::Csv => {
                let path = directory.join("results.csv");
                let mut writer = csv::Writer::from_path(&path)?;
                writer.write_record(CSV_HEADER)?;
                (path, SinkWriter::Csv(writer))
            }
            // Parquet never passes validation; json is the fallback shape.
            OutputFormat::Json | OutputFormat::Parquet => {
                let path = directory.join("results.jsonl");
                let file = File::create(&path).map_err(|e| PipelineError::output(&path, e))?;
                (path, SinkWriter::Json(BufWriter::new(file)))
            }
        };

        Ok(Self {
            path,
            writer,
            include_raw_content: config.include_raw_content,
            include_chunks: config.include_chunks,
            include_embeddings: config.include_embeddings,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write_extraction(&mut self, extraction: &FileExtraction) -> Result<(), PipelineError> {
        if let SinkWriter::Csv(writer) = &mut self.writer {
            let outcome = extraction.outcome.as_ref();
            writer.write_record([
                extraction.relative_path.clone(),
                extraction.size.to_string(),
                extraction
                    .modified
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                extraction.file_type.as_str().to_string(),
                mime_type(&extraction.relative_path).unwrap_or_default().to_string(),
                extraction
                    .extractor
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_default(),
                outcome.map_or(0, |o| o.records.len()).to_string(),
                outcome.map_or(0, |o| o.chunks.len()).to_string(),
                outcome.is_some_and(|o| o.truncated).to_string(),
                String::new(),
            ])?;
        } else {
            let value = self.json_entry(extraction);
            self.write_json(&value)?;
        }
        self.written += 1;
        Ok(())
    }

    pub fn write_failure(
        &mut self,
        descriptor: &FileDescriptor,
        extractor: Option<ExtractorKind>,
        error: &ExtractionError,
    ) -> Result<(), PipelineError> {
        let extractor = extractor.map(|k| k.as_str());
        if let SinkWriter::Csv(writer) = &mut self.writer {
            writer.write_record([
                descriptor.relative_path.clone(),
                descriptor.size.to_string(),
                descriptor
                    .modified
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                descriptor.classification.file_type.as_str().to_string(),
                mime_type(&descriptor.relative_path).unwrap_or_default().to_string(),
                extractor.unwrap_or_default().to_string(),
                "0".to_string(),
                "0".to_string(),
                "false".to_string(),
                error.to_string(),
            ])?;
        } else {
            let value = json!({
                "path": descriptor.relative_path,
                "size": descriptor.size,
                "modified": descriptor.modified.map(|t| t.to_rfc3339()),
                "file_type": descriptor.classification.file_type.as_str(),
                "extension": descriptor.classification.extension,
                "mime_type": mime_type(&descriptor.relative_path),
                "extractor": extractor,
                "status": "failed",
                "error": error.to_string(),
            });
            self.write_json(&value)?;
        }
        self.written += 1;
        Ok(())
    }

    fn write_json(&mut self, value: &Value) -> Result<(), PipelineError> {
        if let SinkWriter::Json(writer) = &mut self.writer {
            serde_json::to_writer(&mut *writer, value)?;
            writer
                .write_all(b"\n")
                .map_err(|e| PipelineError::output(&self.path, e))?;
        }
        Ok(())
    }

    fn json_entry(&self, extraction: &FileExtraction) -> Value {
        let mut entry = Map::new();
        entry.insert("path".into(), json!(extraction.relative_path));
        entry.insert("size".into(), json!(extraction.size));
        entry.insert(
            "modified".into(),
            json!(extraction.modified.map(|t| t.to_rfc3339())),
        );
        entry.insert("file_type".into(), json!(extraction.file_type.as_str()));
        entry.insert("extension".into(), json!(extraction.extension));
        entry.insert(
            "mime_type".into(),
            json!(mime_type(&extraction.relative_path)),
        );
        entry.insert(
            "extractor".into(),
            json!(extraction.extractor.map(|k| k.as_str())),
        );
        entry.insert(
            "status".into(),
            json!(if extraction.outcome.is_some() {
                "extracted"
            } else {
                "metadata"
            }),
        );
        if let Some(attributes) = &extraction.attributes {
            entry.insert("attributes".into(), json!(attributes));
        }

        if let Some(outcome) = &extraction.outcome {
            entry.insert("metadata".into(), Value::Object(outcome.metadata.clone()));
            entry.insert("records".into(), Value::Array(outcome.records.clone()));
            entry.insert("truncated".into(), json!(outcome.truncated));
            if self.include_raw_content {
                entry.insert("raw_content".into(), json!(outcome.raw_content));
            }
            if self.include_chunks {
                let chunks = outcome
                    .chunks
                    .iter()
                    .map(|chunk| {
                        let mut value = json!({"offset": chunk.offset, "text": chunk.text});
                        if self.include_embeddings {
                            value["embedding"] = Value::Null;
                        }
                        value
                    })
                    .collect();
                entry.insert("chunks".into(), Value::Array(chunks));
            }
        }
        Value::Object(entry)
    }

    /// Flushes buffered output and returns the file path.
    pub fn finish(self) -> Result<PathBuf, PipelineError> {
        match self.writer {
            SinkWriter::Json(mut writer) => writer
                .flush()
                .map_err(|e| PipelineError::output(&self.path, e))?,
            SinkWriter::Csv(mut writer) => writer
                .flush()
                .map_err(|e| PipelineError::output(&self.path, e))?,
        }
        Ok(self.path)
    }
}

fn mime_type(path: &str) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}
