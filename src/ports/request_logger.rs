use std::{net::SocketAddr, time::Duration};

use http::{Method, StatusCode};

use crate::core::error::HandlerError;

/// What the dispatcher reports about a finished request.
#[derive(Debug)]
pub struct RequestLogEntry<'a> {
    pub client: Option<SocketAddr>,
    pub method: &'a Method,
    pub url: &'a str,
    pub status: StatusCode,
    /// `None` when the request completed without a fault.
    pub error: Option<&'a HandlerError>,
    pub elapsed: Duration,
}

/// RequestLogger defines the port for per-request logging hooks.
///
/// Called exactly once per request, whatever path the request took.
pub trait RequestLogger: Send + Sync + 'static {
    fn log(&self, entry: &RequestLogEntry<'_>);
}

impl<F> RequestLogger for F
where
    F: Fn(&RequestLogEntry<'_>) + Send + Sync + 'static,
{
    fn log(&self, entry: &RequestLogEntry<'_>) {
        (self)(entry)
    }
}
