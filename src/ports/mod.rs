pub mod request_logger;
pub mod static_files;
