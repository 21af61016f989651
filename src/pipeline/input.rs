//! Input resolution: load the source document that gets submitted.
//!
//! The document is read into memory once. It is moved into the extraction
//! stage and dropped as soon as the submission request completes, so the
//! file is never held open for the rest of the run.

use crate::error::PipelineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name used for the multipart part when the caller gives none.
const FALLBACK_FILE_NAME: &str = "document.pdf";

/// A document ready for submission.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    file_name: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Wrap bytes that are already in memory.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            file_name: if file_name.is_empty() {
                FALLBACK_FILE_NAME.to_string()
            } else {
                file_name
            },
            bytes,
        }
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::FileNotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => PipelineError::Internal(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(file_name_of(path), bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Split into file name and contents.
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.file_name, self.bytes)
    }
}

/// Resolve the sample document the `test` command runs against.
///
/// An explicit path wins; otherwise the sample is looked up in `input_dir`
/// when one is configured, and in `./misc/` as a last resort.
pub fn resolve_sample(explicit: Option<&Path>, input_dir: Option<&Path>, sample: &str) -> PathBuf {
    match (explicit, input_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => dir.join(sample),
        (None, None) => Path::new("./misc").join(sample),
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
