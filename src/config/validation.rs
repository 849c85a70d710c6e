use std::path::Path;

use eyre::Result;

use crate::config::models::{CorsConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Directory '{path}' for {field} does not exist")]
    MissingDirectory { field: String, path: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.hostname.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "hostname".to_string(),
            });
        }

        if config.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: "port".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        if let Err(e) = Self::validate_directory("routes", &config.routes) {
            errors.push(e);
        }

        if let Some(static_root) = &config.static_root {
            if let Err(e) = Self::validate_directory("static_root", static_root) {
                errors.push(e);
            }
        }

        if config.route_extension.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "route_extension".to_string(),
            });
        } else if config.route_extension.starts_with('.') {
            errors.push(ValidationError::InvalidField {
                field: "route_extension".to_string(),
                message: "Extension must not include the leading '.'".to_string(),
            });
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Body limit must be greater than zero".to_string(),
            });
        }

        errors.extend(Self::validate_cors(&config.cors));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_directory(field: &str, path: &Path) -> ValidationResult<()> {
        if !path.is_dir() {
            return Err(ValidationError::MissingDirectory {
                field: field.to_string(),
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Header values must be representable in an HTTP response
    fn validate_cors(cors: &CorsConfig) -> Vec<ValidationError> {
        [
            ("cors.allow_origin", &cors.allow_origin),
            ("cors.allow_methods", &cors.allow_methods),
            ("cors.allow_headers", &cors.allow_headers),
        ]
        .into_iter()
        .filter(|(_, value)| http::HeaderValue::from_str(value).is_err())
        .map(|(field, _)| ValidationError::InvalidField {
            field: field.to_string(),
            message: "Not a valid header value".to_string(),
        })
        .collect()
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
