// src/documents/extract.rs
//! Text extraction for attached documents

use crate::error::{PentadError, Result};

use super::StoredFile;

/// Declared type of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Pick a kind from the filename extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// Extract plain text from raw bytes of the given kind
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String> {
    let raw = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| PentadError::Extraction(format!("failed to extract PDF text: {}", e)))?,
        DocumentKind::PlainText => String::from_utf8_lossy(bytes).into_owned(),
    };

    let cleaned = clean_text(&raw);
    if cleaned.is_empty() {
        return Err(PentadError::Extraction("document contains no text".to_string()));
    }
    Ok(cleaned)
}

/// Extract a stored upload off the async runtime (PDF parsing is CPU-bound)
pub async fn extract_file(file: StoredFile) -> Result<String> {
    let kind = DocumentKind::from_filename(&file.filename).ok_or_else(|| {
        PentadError::Extraction(format!("unsupported file type: {}", file.filename))
    })?;

    tokio::task::spawn_blocking(move || extract_text(&file.bytes, kind))
        .await
        .map_err(|e| PentadError::Extraction(format!("extraction task failed: {}", e)))?
}

/// Strip control characters and blank lines, trim each line
pub fn clean_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
