//! Error kinds surfaced by route handlers and the dispatch pipeline.
//!
//! Two kinds exist. An [`HttpError`] is raised on purpose and carries the status
//! code the client should see. Everything else is an unclassified fault wrapped in
//! an [`eyre::Report`]; it always maps to `500 Internal Server Error` and is
//! logged by the dispatcher before the response is sent.
use http::StatusCode;
use thiserror::Error;

/// A classified HTTP fault: explicit status code plus a human readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure returned by a route handler or raised while dispatching a request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    /// Deliberate failure with a client-visible status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Any other failure. Always answered with status 500.
    #[error("{0:#}")]
    Internal(#[from] eyre::Report),
}

impl HandlerError {
    /// Shorthand for raising a classified fault from a handler.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http(HttpError::new(status, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client and handed to error routes.
    pub fn message(&self) -> String {
        match self {
            Self::Http(e) => e.message().to_string(),
            Self::Internal(report) => report.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
