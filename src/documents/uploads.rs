//! Upload storage
//!
//! Files are written under `<uuid>.<original extension>` and addressed by
//! `/static/uploads/<stored name>` URLs, which is also where the HTTP layer
//! serves them from.

use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::DocumentKind;
use crate::error::{PentadError, Result};

/// URL path prefix uploads are served under
pub const UPLOAD_URL_PREFIX: &str = "/static/uploads/";

/// Per-file size limit (10 MiB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Raw bytes of a stored upload plus the name it is stored under
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the upload directory if missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Generate the stored name for an upload, keeping its extension.
    ///
    /// Only extensions the extractor understands are accepted.
    pub fn stored_name(original_name: &str) -> Result<String> {
        check_kind(original_name)?;

        let extension = Path::new(original_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        Ok(format!("{}.{}", Uuid::new_v4(), extension))
    }

    /// Check an upload's type and size without touching the disk
    pub fn validate(original_name: &str, bytes: &[u8]) -> Result<()> {
        check_kind(original_name)?;
        if bytes.is_empty() {
            return Err(PentadError::Upload(format!("{} is empty", original_name)));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(PentadError::Upload(format!(
                "{} exceeds the {} byte limit",
                original_name, MAX_UPLOAD_BYTES
            )));
        }
        Ok(())
    }

    /// Store one upload and return its URL
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        Self::validate(original_name, bytes)?;

        let stored = Self::stored_name(original_name)?;
        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&stored), bytes).await?;

        debug!(original = %original_name, stored = %stored, bytes = bytes.len(), "upload stored");
        Ok(format!("{}{}", UPLOAD_URL_PREFIX, stored))
    }

    /// Map an upload URL (relative, or absolute on any host) to its file path.
    ///
    /// Rejects URLs outside the upload prefix and names that could escape the
    /// upload directory.
    pub fn resolve(&self, url: &str) -> Result<PathBuf> {
        let path = if url.starts_with("http://") || url.starts_with("https://") {
            url::Url::parse(url)
                .map_err(|e| PentadError::Upload(format!("invalid upload URL {}: {}", url, e)))?
                .path()
                .to_string()
        } else {
            url.to_string()
        };

        let name = path
            .strip_prefix(UPLOAD_URL_PREFIX)
            .ok_or_else(|| PentadError::Upload(format!("not an upload URL: {}", url)))?;

        if !is_safe_name(name) {
            return Err(PentadError::Upload(format!("invalid upload name: {}", name)));
        }

        Ok(self.dir.join(name))
    }

    /// Fetch the bytes behind an upload URL
    pub async fn fetch(&self, url: &str) -> Result<StoredFile> {
        let path = self.resolve(url)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PentadError::Upload(format!("cannot read {}: {}", url, e)))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(StoredFile { filename, bytes })
    }
}

fn check_kind(original_name: &str) -> Result<()> {
    match DocumentKind::from_filename(original_name) {
        Some(_) => Ok(()),
        None => Err(PentadError::Upload(format!(
            "unsupported file type: {} (allowed: pdf, txt, md)",
            original_name
        ))),
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
