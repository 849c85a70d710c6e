pub mod access_log;
pub mod file_system;
pub mod http_handler;

/// Re-export commonly used types from adapters
pub use access_log::TracingRequestLogger;
pub use file_system::FileSystemAdapter;
pub use http_handler::HttpHandler;
