use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde_json::Value;

use crate::classifier::{normalize_extension, FileType};
use crate::error::ExtractionError;
use crate::extractor::sqlite::{tables_outcome, TableDump};
use crate::extractor::{ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind};

/// Version bytes of dBASE, FoxPro and Visual FoxPro table files.
const DBASE_VERSIONS: &[u8] = &[
    0x02, 0x03, 0x04, 0x05, 0x30, 0x31, 0x32, 0x43, 0x63, 0x83, 0x8B, 0xCB, 0xF5, 0xFB,
];
const FIELD_TERMINATOR: u8 = 0x0D;
const DELETED_MARKER: u8 = b'*';

/// Enterprise database files. Only dBASE-family tables are readable without
/// a database engine; SQL Server and Oracle datafiles are reported as
/// unsupported dialects.
pub struct EnterpriseDbExtractor;

impl EnterpriseDbExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnterpriseDbExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for EnterpriseDbExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::EnterpriseDb
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        matches!(file_type, FileType::SqlserverDb | FileType::OracleDb)
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
            .unwrap_or_default();

        match extension.as_str() {
            "mdf" | "ldf" | "ndf" => Err(ExtractionError::UnsupportedDialect(format!(
                "SQL Server {} file requires a database engine",
                extension
            ))),
            "dbf" => {
                let table = read_dbase(path, options.max_rows_per_table)?;
                Ok(tables_outcome(std::slice::from_ref(&table), options)
                    .with_meta("dialect", "dbase"))
            }
            _ => Err(ExtractionError::UnsupportedDialect(format!(
                "Oracle .{} file requires a database engine",
                extension
            ))),
        }
    }
}

struct FieldDescriptor {
    name: String,
    kind: u8,
    length: usize,
}

struct DbaseHeader {
    record_count: usize,
    header_length: u64,
    record_length: usize,
}

fn read_dbase(path: &Path, max_rows: usize) -> Result<TableDump, ExtractionError> {
    let _span = tracing::info_span!("extractor.dbase").entered();

    let file = File::open(path).map_err(|e| ExtractionError::read(path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| ExtractionError::read(path, e))?
        .len();
    let mut reader = BufReader::new(file);

    let mut prefix = [0u8; 32];
    if reader.read_exact(&mut prefix).is_err() {
        return Err(oracle_datafile());
    }
    let header = parse_header(&prefix, file_len)?;
    let fields = read_fields(&mut reader, header.header_length)?;

    let declared: usize = fields.iter().map(|f| f.length).sum::<usize>() + 1;
    if declared != header.record_length {
        return Err(ExtractionError::corrupt(
            "dBASE",
            format!(
                "field lengths sum to {} but records are {} bytes",
                declared, header.record_length
            ),
        ));
    }

    reader
        .seek(SeekFrom::Start(header.header_length))
        .map_err(|e| ExtractionError::read(path, e))?;

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut record = vec![0u8; header.record_length];
    for _ in 0..header.record_count {
        if reader.read_exact(&mut record).is_err() {
            tracing::debug!("{} ends before its declared record count", path.display());
            break;
        }
        if record[0] == DELETED_MARKER {
            continue;
        }
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        rows.push(decode_record(&fields, &record[1..]));
    }

    Ok(TableDump {
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        columns: fields
            .iter()
            .map(|f| (f.name.clone(), field_type_name(f.kind).to_string()))
            .collect(),
        rows,
        truncated,
        estimated_rows: Some(header.record_count),
    })
}

fn oracle_datafile() -> ExtractionError {
    ExtractionError::UnsupportedDialect(
        "not a dBASE table; Oracle datafiles require a database engine".to_string(),
    )
}

/// Rejects anything that does not look like a dBASE table. Oracle datafiles
/// share the `.dbf` extension and land here.
fn parse_header(prefix: &[u8; 32], file_len: u64) -> Result<DbaseHeader, ExtractionError> {
    if !DBASE_VERSIONS.contains(&prefix[0]) {
        return Err(oracle_datafile());
    }
    let record_count = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
    let header_length = u16::from_le_bytes([prefix[8], prefix[9]]) as u64;
    let record_length = u16::from_le_bytes([prefix[10], prefix[11]]) as usize;

    let month = prefix[2];
    let day = prefix[3];
    let plausible = header_length >= 33
        && record_length >= 1
        && header_length <= file_len
        && (1..=12).contains(&month)
        && (1..=31).contains(&day);
    if !plausible {
        return Err(oracle_datafile());
    }

    Ok(DbaseHeader {
        record_count,
        header_length,
        record_length,
    })
}

fn read_fields<R: Read>(
    reader: &mut R,
    header_length: u64,
) -> Result<Vec<FieldDescriptor>, ExtractionError> {
    let max_fields = ((header_length - 32) / 32) as usize;
    let mut fields = Vec::new();

    loop {
        let mut first = [0u8; 1];
        reader
            .read_exact(&mut first)
            .map_err(|e| ExtractionError::corrupt("dBASE", e))?;
        if first[0] == FIELD_TERMINATOR {
            break;
        }
        if fields.len() >= max_fields {
            return Err(ExtractionError::corrupt(
                "dBASE",
                "field descriptors overrun the header",
            ));
        }

        let mut rest = [0u8; 31];
        reader
            .read_exact(&mut rest)
            .map_err(|e| ExtractionError::corrupt("dBASE", e))?;

        let mut raw_name = Vec::with_capacity(11);
        raw_name.push(first[0]);
        raw_name.extend_from_slice(&rest[..10]);
        let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());

        fields.push(FieldDescriptor {
            name: String::from_utf8_lossy(&raw_name[..name_end]).trim().to_string(),
            kind: rest[10],
            length: rest[15] as usize,
        });
    }

    if fields.is_empty() {
        return Err(ExtractionError::corrupt("dBASE", "table declares no fields"));
    }
    Ok(fields)
}

fn decode_record(fields: &[FieldDescriptor], data: &[u8]) -> Vec<Value> {
    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 0;
    for field in fields {
        let end = (offset + field.length).min(data.len());
        values.push(decode_field(field.kind, &data[offset..end]));
        offset = end;
    }
    values
}

fn decode_field(kind: u8, raw: &[u8]) -> Value {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    match kind {
        b'N' | b'F' => {
            if trimmed.is_empty() {
                Value::Null
            } else if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(trimmed.to_string()))
            }
        }
        b'L' => match trimmed.chars().next() {
            Some('T' | 't' | 'Y' | 'y') => Value::Bool(true),
            Some('F' | 'f' | 'N' | 'n') => Value::Bool(false),
            _ => Value::Null,
        },
        b'D' => {
            if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
                Value::String(format!(
                    "{}-{}-{}",
                    &trimmed[..4],
                    &trimmed[4..6],
                    &trimmed[6..]
                ))
            } else {
                Value::Null
            }
        }
        b'I' if raw.len() == 4 => Value::from(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        _ if trimmed.is_empty() => Value::Null,
        _ => Value::String(trimmed.to_string()),
    }
}

fn field_type_name(kind: u8) -> &'static str {
    match kind {
        b'C' => "character",
        b'N' => "numeric",
        b'F' => "float",
        b'L' => "logical",
        b'D' => "date",
        b'I' => "integer",
        b'M' => "memo",
        _ => "unknown",
    }
}
