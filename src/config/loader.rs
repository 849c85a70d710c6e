use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables overriding file values, e.g. `VSHS_PORT`
pub const ENV_PREFIX: &str = "VSHS";

/// Load configuration from defaults, an optional file and the process environment.
///
/// Nested keys use a double underscore: `VSHS_CORS__ALLOW_ORIGIN`.
pub fn load_config(config_path: Option<&Path>) -> Result<ServerConfig> {
    load_config_with_env(config_path, None)
}

/// Same as [`load_config`] but reads environment values from `env` when given.
pub fn load_config_with_env(
    config_path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        // Determine file format based on extension
        let format = match config_path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };
        let name = config_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?;
        builder = builder.add_source(File::new(name, format));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to build configuration")?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(server_config)
}
