use std::io::Read;
use std::path::Path;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::{normalize_extension, FileType};
use crate::error::ExtractionError;
use crate::extractor::{
    read_text_lossy, ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind,
};

/// PDF, DOCX, plain text and RTF documents.
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for DocumentExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Document
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Document
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

        let (text, outcome) = match extension.as_str() {
            "pdf" => {
                let (text, pages) = extract_pdf_text(path)?;
                (text, ExtractionOutcome::default().with_meta("page_count", pages))
            }
            "docx" => {
                let text = extract_docx_text(path)?;
                (text, ExtractionOutcome::default())
            }
            "rtf" => (strip_rtf(&read_text_lossy(path)?), ExtractionOutcome::default()),
            "txt" => (read_text_lossy(path)?, ExtractionOutcome::default()),
            other => {
                return Err(ExtractionError::UnsupportedFormat(format!(
                    "legacy or unknown document format '.{}'",
                    other
                )))
            }
        };

        let chunks = chunk_text(&text, options.chunk_size, Boundary::Paragraph);
        let mut outcome = outcome
            .with_meta("format", extension)
            .with_meta("character_count", text.chars().count())
            .with_meta("word_count", text.split_whitespace().count());
        outcome.chunks = chunks;
        outcome.raw_content = Some(text);
        Ok(outcome)
    }
}

fn extract_pdf_text(path: &Path) -> Result<(String, usize), ExtractionError> {
    let _span = tracing::info_span!("extractor.pdf").entered();

    let bytes = std::fs::read(path).map_err(|e| ExtractionError::read(path, e))?;
    let doc = lopdf::Document::load_mem(&bytes).map_err(|e| ExtractionError::corrupt("PDF", e))?;

    let pages = doc.get_pages();
    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                // Page breaks double as paragraph breaks for chunking.
                text.push_str("\n\n");
            }
            Err(e) => {
                tracing::debug!("Skipping unreadable page {} in {}: {}", page_num, path.display(), e)
            }
        }
    }

    Ok((text, pages.len()))
}

fn extract_docx_text(path: &Path) -> Result<String, ExtractionError> {
    let file = std::fs::File::open(path).map_err(|e| ExtractionError::read(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ExtractionError::corrupt("DOCX", e))?;

    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::corrupt("DOCX", format!("missing document.xml: {}", e)))?;

    let mut xml = String::new();
    document_xml
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::corrupt("DOCX", e))?;

    let paragraphs = xml_paragraphs(&xml).map_err(|e| ExtractionError::corrupt("DOCX", e))?;
    Ok(paragraphs.join("\n\n"))
}

/// Collects the text runs (`t` elements) of an OOXML part, one string per
/// non-empty paragraph (`p` element). Shared by DOCX and PPTX.
pub(crate) fn xml_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Set at each `t` start; runs are joined with a single space.
    let mut run_start = false;

    loop {
        let piece = match reader.read_event()? {
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => {
                in_text = true;
                run_start = true;
                continue;
            }
            Event::End(ref e) => {
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" => {
                        let paragraph = current.trim();
                        if !paragraph.is_empty() {
                            paragraphs.push(paragraph.to_string());
                        }
                        current.clear();
                    }
                    _ => {}
                }
                continue;
            }
            Event::Text(e) if in_text => e.decode()?.into_owned(),
            Event::GeneralRef(r) if in_text => resolve_reference(&r)?,
            Event::Eof => break,
            _ => continue,
        };

        if run_start && !current.is_empty() && !current.ends_with(char::is_whitespace) {
            current.push(' ');
        }
        run_start = false;
        current.push_str(&piece);
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs)
}

/// Text an entity or character reference stands for. Named entities outside
/// the XML predefined set are kept as written.
pub(crate) fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, quick_xml::Error> {
    if let Some(ch) = reference.resolve_char_ref()? {
        return Ok(ch.to_string());
    }
    let name = reference.decode()?;
    Ok(match resolve_predefined_entity(&name) {
        Some(text) => text.to_string(),
        None => format!("&{};", name),
    })
}

/// Drops RTF control words and destination groups, keeping visible text.
fn strip_rtf(rtf: &str) -> String {
    const SKIPPED_DESTINATIONS: &[&str] = &[
        "fonttbl",
        "colortbl",
        "stylesheet",
        "info",
        "pict",
        "header",
        "footer",
    ];

    let mut out = String::new();
    let mut chars = rtf.chars().peekable();
    let mut depth: usize = 0;
    let mut skip_below: Option<usize> = None;

    while let Some(c) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' => {
                if skip_below == Some(depth) {
                    skip_below = None;
                }
                depth = depth.saturating_sub(1);
            }
            '\\' => {
                let Some(&next) = chars.peek() else { break };
                if next.is_ascii_alphabetic() {
                    let mut word = String::new();
                    while let Some(&ch) = chars.peek() {
                        if ch.is_ascii_alphabetic() {
                            word.push(ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    while let Some(&ch) = chars.peek() {
                        if ch.is_ascii_digit() || ch == '-' {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    if skip_below.is_none() {
                        if SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                            skip_below = Some(depth);
                        } else if word == "par" || word == "line" {
                            out.push('\n');
                        } else if word == "tab" {
                            out.push('\t');
                        }
                    }
                } else {
                    chars.next();
                    match next {
                        '*' => {
                            if skip_below.is_none() {
                                skip_below = Some(depth);
                            }
                        }
                        '\'' => {
                            let hex: String = chars.by_ref().take(2).collect();
                            if skip_below.is_none() {
                                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                    out.push(byte as char);
                                }
                            }
                        }
                        '\\' | '{' | '}' if skip_below.is_none() => out.push(next),
                        _ => {}
                    }
                }
            }
            '\r' | '\n' => {}
            _ if skip_below.is_none() => out.push(c),
            _ => {}
        }
    }
    out
}
