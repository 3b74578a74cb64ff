//! Attached documents
//!
//! Uploaded files are stored by `uploads::UploadStore`; at chat time each
//! referenced URL is resolved back to bytes and turned into a labeled text
//! block by `extract`.

pub mod extract;
pub mod uploads;

pub use extract::{DocumentKind, clean_text, extract_text};
pub use uploads::{StoredFile, UploadStore};

use tracing::warn;

/// Extracted text of one attachment, labeled with its stored filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBlock {
    pub label: String,
    pub text: String,
}

impl DocumentBlock {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Resolve each upload URL and extract its text, preserving order.
///
/// Failures never abort the request: the block for a file that cannot be
/// read or extracted says so, and the personas see that note instead.
pub async fn load_attachments(store: &UploadStore, urls: &[String]) -> Vec<DocumentBlock> {
    let mut blocks = Vec::with_capacity(urls.len());

    for url in urls {
        let block = match store.fetch(url).await {
            Ok(file) => {
                let label = file.filename.clone();
                match extract::extract_file(file).await {
                    Ok(text) => DocumentBlock::new(label, text),
                    Err(e) => {
                        warn!(url = %url, error = %e, "attachment extraction failed");
                        DocumentBlock::new(label, format!("[Could not extract text: {}]", e))
                    }
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "attachment could not be loaded");
                DocumentBlock::new(url.clone(), format!("[Could not load file: {}]", e))
            }
        };
        blocks.push(block);
    }

    blocks
}
