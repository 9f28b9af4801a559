use std::io::Read;
use std::path::Path;

use serde_json::json;

use crate::chunking::{chunk_text, Boundary};
use crate::classifier::{normalize_extension, FileType};
use crate::error::ExtractionError;
use crate::extractor::document::xml_paragraphs;
use crate::extractor::{ContentExtractor, ExtractOptions, ExtractionOutcome, ExtractorKind};

/// PPTX slide decks. Each slide becomes one paragraph of text and one record.
pub struct PresentationExtractor;

impl PresentationExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PresentationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for PresentationExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Presentation
    }

    fn can_handle(&self, file_type: FileType) -> bool {
        file_type == FileType::Presentation
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
        if extension != "pptx" {
            return Err(ExtractionError::UnsupportedFormat(format!(
                "legacy presentation format '.{}'",
                extension
            )));
        }

        let slides = read_slides(path)?;

        let mut text = String::new();
        let mut records = Vec::with_capacity(slides.len());
        for (number, slide_text) in &slides {
            if !slide_text.is_empty() {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(slide_text);
            }
            records.push(json!({ "slide": number, "text": slide_text }));
        }

        let chunks = chunk_text(&text, options.chunk_size, Boundary::Paragraph);
        let outcome = ExtractionOutcome {
            raw_content: Some(text),
            records,
            chunks,
            ..Default::default()
        };
        Ok(outcome
            .with_meta("format", extension)
            .with_meta("slide_count", slides.len()))
    }
}

/// Slide texts in slide order. Archive entry order is not slide order, so
/// entries are sorted by the number in `slideN.xml`.
fn read_slides(path: &Path) -> Result<Vec<(u32, String)>, ExtractionError> {
    let file = std::fs::File::open(path).map_err(|e| ExtractionError::read(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ExtractionError::corrupt("PPTX", e))?;

    let mut slide_entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slide_entries.sort_by_key(|(n, _)| *n);

    let mut slides = Vec::with_capacity(slide_entries.len());
    for (number, name) in slide_entries {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| ExtractionError::corrupt("PPTX", e))?
            .read_to_string(&mut xml)
            .map_err(|e| ExtractionError::corrupt("PPTX", e))?;

        let paragraphs = xml_paragraphs(&xml).map_err(|e| ExtractionError::corrupt("PPTX", e))?;
        slides.push((number, paragraphs.join("\n")));
    }
    Ok(slides)
}

fn slide_number(entry: &str) -> Option<u32> {
    entry
        .strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}
