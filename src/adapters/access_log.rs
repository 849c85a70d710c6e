use crate::ports::request_logger::{RequestLogEntry, RequestLogger};

/// Request logger writing one `tracing` event per request.
#[derive(Debug, Default, Clone)]
pub struct TracingRequestLogger;

impl TracingRequestLogger {
    pub fn new() -> Self {
        Self
    }
}

impl RequestLogger for TracingRequestLogger {
    fn log(&self, entry: &RequestLogEntry<'_>) {
        let client = entry
            .client
            .map_or_else(|| "-".to_string(), |addr| addr.to_string());
        let elapsed_ms = entry.elapsed.as_secs_f64() * 1000.0;

        match entry.error {
            Some(error) if error.is_internal() => tracing::warn!(
                client = %client,
                method = %entry.method,
                url = entry.url,
                status = entry.status.as_u16(),
                elapsed_ms,
                error = %error,
                "request failed"
            ),
            Some(error) => tracing::info!(
                client = %client,
                method = %entry.method,
                url = entry.url,
                status = entry.status.as_u16(),
                elapsed_ms,
                error = %error,
                "request rejected"
            ),
            None => tracing::info!(
                client = %client,
                method = %entry.method,
                url = entry.url,
                status = entry.status.as_u16(),
                elapsed_ms,
                "request served"
            ),
        }
    }
}
