use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::ports::static_files::{StaticFile, StaticFileError, StaticFileResult, StaticFiles};

/// File served when the request resolves to a directory.
const INDEX_FILE: &str = "index.html";

/// File system adapter serving static files from a root directory
#[derive(Debug, Clone)]
pub struct FileSystemAdapter {
    root: PathBuf,
}

impl FileSystemAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StaticFiles for FileSystemAdapter {
    async fn serve(&self, path: &str) -> StaticFileResult<StaticFile> {
        let full_path = self.root.join(path.trim_start_matches('/'));

        // Security check: ensure the resolved path is still within root
        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(StaticFileError::IoError)?;
        let mut canonical_path = tokio::fs::canonicalize(&full_path)
            .await
            .map_err(|e| StaticFileError::from_io(e, path))?;

        if !canonical_path.starts_with(&canonical_root) {
            tracing::warn!("Path traversal attempt detected: {}", path);
            return Err(StaticFileError::PermissionDenied(path.to_string()));
        }

        let metadata = tokio::fs::metadata(&canonical_path)
            .await
            .map_err(|e| StaticFileError::from_io(e, path))?;
        if metadata.is_dir() {
            canonical_path.push(INDEX_FILE);
        }

        let bytes = tokio::fs::read(&canonical_path)
            .await
            .map_err(|e| StaticFileError::from_io(e, path))?;
        let content_type = mime_guess::from_path(&canonical_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        tracing::debug!("Serving static file {}", canonical_path.display());
        Ok(StaticFile {
            bytes: Bytes::from(bytes),
            content_type,
        })
    }
}
