//! vshs - a very simple HTTP server.
//!
//! vshs maps a directory of route files onto URL routes. A file at
//! `routes/params/{route}/POST.route` answers `POST /params/<anything>`, with
//! `route` bound to the matched segment. Handlers are Rust values registered
//! under the same template in a [`HandlerRegistry`](core::HandlerRegistry); the
//! directory decides which of them are exposed and in which order they match.
//!
//! # Features
//! - Path templates with `{name}` variables, first match wins in discovery order
//! - Request bodies decoded by content type (text, JSON, form, binary, blob)
//! - Handler results encoded the same way, JSON pretty-printed
//! - Server-sent event streams with a close callback
//! - Error pages rendered by an `/errors/{status}` route when one exists
//! - Static file fallback for unmatched requests
//! - CORS headers on every response and a per-request log hook
//!
//! # Quick Example
//! ```no_run
//! use vshs::{
//!     config::ServerConfig,
//!     core::{HandlerRegistry, HandlerResponse, RequestContext},
//!     server,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let registry = HandlerRegistry::new().with("/hello/{name}/GET", |ctx: RequestContext| async move {
//!     HandlerResponse::json(&serde_json::json!({ "hello": ctx.var("name") }))
//! });
//! let config = ServerConfig::default();
//! let dispatcher = server::build_dispatcher(&config, registry)?;
//! server::run(&config, dispatcher).await
//! # }
//! ```
//!
//! # Architecture
//! `core` holds the request pipeline, `ports` the traits it talks through and
//! `adapters` their implementations (file system, `tracing`, axum).
pub mod builtin;
pub mod config;
pub mod ports;
pub mod server;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileSystemAdapter, HttpHandler, TracingRequestLogger},
    core::{Dispatcher, HandlerRegistry, RouteTable},
    utils::GracefulShutdown,
};
