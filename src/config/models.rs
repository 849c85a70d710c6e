//! Configuration data structures for the server.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! `VSHS_`-prefixed environment variables. Every field has a default so an empty
//! config serves `./routes` on `localhost:8080`.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{dispatcher::DEFAULT_MAX_BODY_BYTES, route_table::DEFAULT_ROUTE_EXTENSION};

/// Top-level server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub hostname: String,
    pub port: u16,
    /// Root of the route directory
    pub routes: PathBuf,
    /// Extension identifying route files inside `routes`
    pub route_extension: String,
    /// Directory served for requests that match no route
    pub static_root: Option<PathBuf>,
    /// Emit one log event per request
    pub access_log: bool,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// `hostname:port` as passed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 8080,
            routes: PathBuf::from("./routes"),
            route_extension: DEFAULT_ROUTE_EXTENSION.to_string(),
            static_root: None,
            access_log: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Values of the CORS headers attached to every response
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allow_headers: "*".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `vshs=debug,tower_http=info`
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
