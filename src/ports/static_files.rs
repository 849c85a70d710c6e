use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::error::HttpError;

/// Error type for static file resolution
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StaticFileError {
    /// Nothing exists at the requested path
    #[error("File not found: {0}")]
    NotFound(String),

    /// The file exists but may not be read, or the path escapes the root
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any other IO failure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StaticFileError {
    /// Classify an IO error raised while resolving `path`.
    pub fn from_io(error: std::io::Error, path: &str) -> Self {
        match error.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => Self::NotFound(path.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::IoError(error),
        }
    }
}

impl From<StaticFileError> for HttpError {
    fn from(error: StaticFileError) -> Self {
        match error {
            StaticFileError::NotFound(path) => HttpError::not_found(format!("{path} not found")),
            StaticFileError::PermissionDenied(path) => {
                HttpError::forbidden(format!("access to {path} is forbidden"))
            }
            StaticFileError::IoError(e) => {
                HttpError::new(http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

/// Result type for static file operations
pub type StaticFileResult<T> = Result<T, StaticFileError>;

/// A resolved file ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    pub bytes: Bytes,
    pub content_type: String,
}

/// StaticFiles defines the port (interface) for serving files when no route matches
#[async_trait]
pub trait StaticFiles: Send + Sync + 'static {
    /// Resolve a request path (already percent-decoded) to a file
    ///
    /// # Arguments
    /// * `path` - The URL path, relative to the configured root
    ///
    /// # Returns
    /// The file contents and content type, or why it could not be served
    async fn serve(&self, path: &str) -> StaticFileResult<StaticFile>;
}
