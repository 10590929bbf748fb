//! Configuration loading (ambient stack).
//!
//! `ServerOptions` already derives `Serialize`/`Deserialize` with
//! `#[serde(default)]` (see `types.rs`), in the style of
//! `heAdz0r-rtk/src/config.rs`'s per-section `#[serde(default)]` +
//! `Default` pattern. This module adds the TOML file/string loaders.

use std::path::Path;

use crate::types::ServerOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ServerOptions {
    /// Load from a TOML file. Missing keys fall back to
    /// `ServerOptions::default()`'s values via `#[serde(default)]`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let options = ServerOptions::from_toml_str("").unwrap();
        assert_eq!(options.port, ServerOptions::default().port);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let options = ServerOptions::from_toml_str("port = 9999\nhost = \"0.0.0.0\"\n").unwrap();
        assert_eq!(options.port, 9999);
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.long_poll_timeout_ms, ServerOptions::default().long_poll_timeout_ms);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ServerOptions::load_from_file("/nonexistent/path/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = ServerOptions::from_toml_str("not valid = = toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
