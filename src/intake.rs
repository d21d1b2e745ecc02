//! Document intake: validates an upload and stores it under a sanitized name.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// An uploaded file as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct UploadedBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Locator of a stored document, enough for a scorer to read it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    path: PathBuf,
}

impl DocumentHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Flat directory of uploaded documents keyed by sanitized file name.
/// A second upload with the same key overwrites the first.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validates the blob and persists it. Rejected uploads touch nothing on disk.
    pub async fn intake(&self, blob: &UploadedBlob) -> PipelineResult<DocumentHandle> {
        if blob.file_name.trim().is_empty() {
            return Err(PipelineError::InvalidSubmission("no file provided".into()));
        }
        if blob.bytes.is_empty() {
            return Err(PipelineError::InvalidSubmission(format!(
                "uploaded file {} is empty",
                blob.file_name
            )));
        }

        let key = sanitize(&blob.file_name);
        if key.is_empty() {
            return Err(PipelineError::InvalidSubmission(format!(
                "file name {:?} has no usable characters",
                blob.file_name
            )));
        }

        let path = self.dir.join(&key);
        tokio::fs::write(&path, &blob.bytes).await.map_err(|err| {
            PipelineError::StoreUnavailable(format!("failed to store {}: {err}", path.display()))
        })?;
        debug!(key = %key, size = blob.bytes.len(), "stored uploaded document");

        Ok(DocumentHandle { path })
    }
}

/// Reduces an untrusted file name to a safe storage key.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`. Any run of other characters,
/// path separators and whitespace included, collapses into one `_`. Leading
/// and trailing `.`/`_` are stripped so the key can never be `..` or hidden.
/// Only the final path component is considered. The result may be empty.
pub fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let mut key = String::with_capacity(base.len());
    let mut pending_gap = false;

    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            if pending_gap {
                key.push('_');
                pending_gap = false;
            }
            key.push(ch);
        } else {
            pending_gap = true;
        }
    }

    key.trim_matches(|c| c == '.' || c == '_').to_string()
}
