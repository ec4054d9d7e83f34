// Document loaders for already-extracted page text
//
// The loader is the boundary between "some file on disk" and a validated
// `Document`. PDF text extraction happens upstream of this crate; loaders
// only accept text that has already been pulled out of the PDF.

use crate::types::{Document, Page};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Page separator emitted by common PDF-to-text tools.
pub const FORM_FEED: char = '\x0C';

/// Loader trait - turns raw bytes into a validated `Document`
pub trait DocumentLoader: Send + Sync {
    fn load(&self, document_id: &str, bytes: &[u8]) -> Result<Document>;

    /// Read the file and load it, using the file name as the document id.
    fn load_file(&self, path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        self.load(&document_id_for(path), &bytes)
            .with_context(|| format!("Failed to load document: {}", path.display()))
    }

    /// Loader name for logging
    fn name(&self) -> &str;

    fn supports_file_type(&self, path: &Path) -> bool;
}

/// Plain UTF-8 text, pages separated by form feeds.
#[derive(Debug, Default, Clone)]
pub struct PlainTextLoader;

impl PlainTextLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for PlainTextLoader {
    fn load(&self, document_id: &str, bytes: &[u8]) -> Result<Document> {
        let text = std::str::from_utf8(bytes).context("Document text is not valid UTF-8")?;
        let mut pages: Vec<&str> = text.split(FORM_FEED).collect();
        // pdftotext ends every page with a form feed
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Ok(Document::from_texts(document_id, pages.into_iter().map(str::trim)))
    }

    fn name(&self) -> &str {
        "plain-text"
    }

    fn supports_file_type(&self, path: &Path) -> bool {
        matches!(extension(path).as_deref(), Some("txt") | Some("text") | None)
    }
}

/// JSON page lists: `{"id": ..., "pages": [...]}`, `[{"page_number": 1, "text": ...}]`
/// or a bare array of page strings.
#[derive(Debug, Default, Clone)]
pub struct JsonPagesLoader;

impl JsonPagesLoader {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct PageRecord {
    #[serde(alias = "number", alias = "page")]
    page_number: u32,
    text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Object {
        id: Option<String>,
        pages: Vec<PageRecord>,
    },
    Records(Vec<PageRecord>),
    Texts(Vec<String>),
}

impl DocumentLoader for JsonPagesLoader {
    fn load(&self, document_id: &str, bytes: &[u8]) -> Result<Document> {
        let parsed: JsonDocument =
            serde_json::from_slice(bytes).context("Unrecognised JSON page layout")?;

        let document = match parsed {
            JsonDocument::Object { id, pages } => Document::new(
                id.unwrap_or_else(|| document_id.to_string()),
                pages.into_iter().map(PageRecord::into_page).collect(),
            )?,
            JsonDocument::Records(pages) => Document::new(
                document_id,
                pages.into_iter().map(PageRecord::into_page).collect(),
            )?,
            JsonDocument::Texts(texts) => Document::from_texts(document_id, texts),
        };
        Ok(document)
    }

    fn name(&self) -> &str {
        "json-pages"
    }

    fn supports_file_type(&self, path: &Path) -> bool {
        extension(path).as_deref() == Some("json")
    }
}

impl PageRecord {
    fn into_page(self) -> Page {
        Page::new(self.page_number, self.text)
    }
}

/// Pick a loader from the file extension; anything that is not JSON is
/// treated as plain text.
pub fn loader_for_path(path: &Path) -> Box<dyn DocumentLoader> {
    let json = JsonPagesLoader::new();
    if json.supports_file_type(path) {
        Box::new(json)
    } else {
        Box::new(PlainTextLoader::new())
    }
}

pub fn document_id_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}
