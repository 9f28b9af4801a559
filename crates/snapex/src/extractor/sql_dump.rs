use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::classifier::FileType;
use crate::error::ExtractionError;
use crate::extractor::sqlite::{tables_outcome, TableDump};
use crate::extractor::{
    read_text_lossy, ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind,
};

/// Plain-text SQL dumps. `CREATE TABLE` statements define tables and
/// `INSERT INTO ... VALUES` tuples are attributed to their table, capped at
/// the per-table row limit. Nothing is executed.
pub struct SqlDumpExtractor;

impl SqlDumpExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqlDumpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for SqlDumpExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::SqlDump
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::SqlDump
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let text = read_text_lossy(path)?;
        let dialect = detect_dialect(&text);

        let mut parser = DumpParser::new(options.max_rows_per_table);
        let statements = split_statements(&text);
        for statement in &statements {
            parser.statement(statement);
        }

        let create_count = parser.create_count;
        let insert_count = parser.insert_count;
        let tables = parser.finish();

        Ok(tables_outcome(&tables, options)
            .with_meta("dialect", dialect)
            .with_meta("statement_count", statements.len())
            .with_meta("create_table_count", create_count)
            .with_meta("insert_count", insert_count))
    }
}

fn detect_dialect(text: &str) -> &'static str {
    let head: String = text.chars().take(4096).collect();
    if head.contains("MySQL dump") || head.contains("MariaDB dump") {
        "mysql"
    } else if head.contains("PostgreSQL database dump") {
        "postgresql"
    } else if head.contains("SQLite") || head.starts_with("PRAGMA") {
        "sqlite"
    } else {
        "generic"
    }
}

struct DumpParser {
    max_rows: usize,
    tables: Vec<TableDump>,
    index: HashMap<String, usize>,
    create_count: usize,
    insert_count: usize,
}

impl DumpParser {
    fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            tables: Vec::new(),
            index: HashMap::new(),
            create_count: 0,
            insert_count: 0,
        }
    }

    fn statement(&mut self, statement: &str) {
        let upper = statement.to_ascii_uppercase();
        if upper.starts_with("CREATE TABLE") {
            self.create_table(statement);
        } else if upper.starts_with("INSERT INTO") {
            self.insert(statement);
        }
    }

    fn table_mut(&mut self, name: &str) -> &mut TableDump {
        let position = match self.index.get(&name.to_ascii_lowercase()) {
            Some(&i) => i,
            None => {
                self.tables.push(TableDump {
                    name: name.to_string(),
                    columns: Vec::new(),
                    rows: Vec::new(),
                    truncated: false,
                    estimated_rows: Some(0),
                });
                let i = self.tables.len() - 1;
                self.index.insert(name.to_ascii_lowercase(), i);
                i
            }
        };
        &mut self.tables[position]
    }

    fn create_table(&mut self, statement: &str) {
        let Some(open) = statement.find('(') else {
            return;
        };
        let Some(close) = statement.rfind(')') else {
            return;
        };
        if close <= open {
            return;
        }
        let Some(name) = table_name(&statement[..open]) else {
            return;
        };
        self.create_count += 1;

        let columns: Vec<(String, String)> = split_top_level(&statement[open + 1..close])
            .into_iter()
            .filter_map(|definition| column_definition(&definition))
            .collect();

        let table = self.table_mut(&name);
        if table.columns.is_empty() {
            table.columns = columns;
        }
    }

    fn insert(&mut self, statement: &str) {
        let upper = statement.to_ascii_uppercase();
        let Some(values_at) = upper.find("VALUES") else {
            return;
        };
        let head = &statement["INSERT INTO".len()..values_at];
        let (name_part, column_list) = match head.find('(') {
            Some(open) => {
                let close = head.rfind(')').unwrap_or(head.len());
                (
                    &head[..open],
                    split_top_level(&head[open + 1..close.max(open + 1)])
                        .into_iter()
                        .map(|c| unquote(&c))
                        .collect::<Vec<_>>(),
                )
            }
            None => (head, Vec::new()),
        };
        let Some(name) = table_name(name_part) else {
            return;
        };
        self.insert_count += 1;

        let tuples = parse_tuples(&statement[values_at + "VALUES".len()..]);
        let max_rows = self.max_rows;
        let table = self.table_mut(&name);
        table.estimated_rows = Some(table.estimated_rows.unwrap_or(0) + tuples.len());

        for tuple in tuples {
            if table.rows.len() >= max_rows {
                table.truncated = true;
                break;
            }
            let row = align_row(table, &column_list, tuple);
            table.rows.push(row);
        }
    }

    fn finish(self) -> Vec<TableDump> {
        self.tables
    }
}

/// Places values at their table column positions, adding columns the
/// table has not declared.
fn align_row(table: &mut TableDump, column_list: &[String], tuple: Vec<Value>) -> Vec<Value> {
    if column_list.is_empty() {
        while table.columns.len() < tuple.len() {
            let n = table.columns.len() + 1;
            table.columns.push((format!("column_{}", n), String::new()));
        }
        return tuple;
    }

    let mut row = vec![Value::Null; table.columns.len()];
    for (column, value) in column_list.iter().zip(tuple) {
        let position = match table
            .columns
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(column))
        {
            Some(p) => p,
            None => {
                table.columns.push((column.clone(), String::new()));
                row.push(Value::Null);
                table.columns.len() - 1
            }
        };
        row[position] = value;
    }
    row
}

/// Last identifier in `CREATE TABLE [IF NOT EXISTS] schema.name`.
fn table_name(head: &str) -> Option<String> {
    let cleaned = head.trim();
    let last = cleaned.split_whitespace().last()?;
    let name = last.rsplit('.').next().unwrap_or(last);
    let name = unquote(name);
    let upper = name.to_ascii_uppercase();
    if name.is_empty() || upper == "TABLE" || upper == "INTO" || upper == "EXISTS" {
        return None;
    }
    Some(name)
}

fn column_definition(definition: &str) -> Option<(String, String)> {
    const CONSTRAINTS: &[&str] = &[
        "PRIMARY",
        "FOREIGN",
        "UNIQUE",
        "CONSTRAINT",
        "KEY",
        "INDEX",
        "CHECK",
        "FULLTEXT",
    ];
    let mut parts = definition.split_whitespace();
    let name = parts.next()?;
    if CONSTRAINTS.contains(&name.to_ascii_uppercase().as_str()) {
        return None;
    }
    let ty = parts.next().unwrap_or_default();
    Some((unquote(name), ty.to_string()))
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']')
        .to_string()
}

/// Splits on commas that are not nested in parentheses or quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Splits a dump into statements at `;` outside quotes and comments.
/// Comments are dropped.
fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' && c == '\'' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c {
                        if chars.peek() == Some(&c) {
                            if let Some(doubled) = chars.next() {
                                current.push(doubled);
                            }
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            ';' => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

/// Parses `(a, 'b', NULL), (...)` into value tuples.
fn parse_tuples(text: &str) -> Vec<Vec<Value>> {
    let mut tuples = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|&c| c != '(') {
            chars.next();
        }
        if chars.next().is_none() {
            break;
        }

        let mut tuple = Vec::new();
        let mut token = String::new();
        let mut quoted: Option<String> = None;
        let mut depth = 0usize;

        while let Some(c) = chars.next() {
            match c {
                '\'' if depth == 0 => {
                    let mut literal = String::new();
                    while let Some(inner) = chars.next() {
                        match inner {
                            '\\' => {
                                if let Some(escaped) = chars.next() {
                                    literal.push(match escaped {
                                        'n' => '\n',
                                        't' => '\t',
                                        'r' => '\r',
                                        '0' => '\0',
                                        other => other,
                                    });
                                }
                            }
                            '\'' if chars.peek() == Some(&'\'') => {
                                chars.next();
                                literal.push('\'');
                            }
                            '\'' => break,
                            other => literal.push(other),
                        }
                    }
                    quoted = Some(literal);
                }
                '(' => {
                    depth += 1;
                    token.push(c);
                }
                ')' if depth > 0 => {
                    depth -= 1;
                    token.push(c);
                }
                ',' if depth == 0 => {
                    tuple.push(literal_value(quoted.take(), &token));
                    token.clear();
                }
                ')' => {
                    tuple.push(literal_value(quoted.take(), &token));
                    break;
                }
                _ => token.push(c),
            }
        }
        tuples.push(tuple);
    }
    tuples
}

fn literal_value(quoted: Option<String>, token: &str) -> Value {
    if let Some(text) = quoted {
        return Value::String(text);
    }
    let token = token.trim();
    if token.eq_ignore_ascii_case("NULL") {
        Value::Null
    } else if token.eq_ignore_ascii_case("TRUE") {
        Value::Bool(true)
    } else if token.eq_ignore_ascii_case("FALSE") {
        Value::Bool(false)
    } else if let Ok(i) = token.parse::<i64>() {
        Value::from(i)
    } else if let Some(n) = token.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Value::Number(n)
    } else {
        Value::String(token.to_string())
    }
}
