//! Adapter configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration for a DS4QB++ guest rooted at the current directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{binary, clipboard, token};

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("unable to read {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`AdapterConfig`]
    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Values are out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// DS4QB protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// DS4QB++ binary command file
    #[default]
    Binary,
    /// DS4QB2 token DAT file
    Token,
    /// DS4QB1 clipboard text
    Clipboard,
}

impl ProtocolVariant {
    /// Parse a variant name as used on the command line
    pub fn from_name(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "binary" | "ds4qb++" => Some(Self::Binary),
            "token" | "ds4qb2" => Some(Self::Token),
            "clipboard" | "ds4qb1" => Some(Self::Clipboard),
            _ => None,
        }
    }

    /// Polling interval the DOS-side driver used
    pub fn default_interval(self) -> Duration {
        match self {
            Self::Binary => binary::DEFAULT_INTERVAL,
            Self::Token => token::DEFAULT_INTERVAL,
            Self::Clipboard => clipboard::DEFAULT_INTERVAL,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Protocol generation to speak
    pub protocol: ProtocolVariant,
    /// Host directory standing in for the guest disk
    pub root: PathBuf,
    /// Guest working directory of the program
    pub working_dir: String,
    /// Guest directory holding `DS4QB2.DAT`
    pub dat_path: String,
    /// Guest path of the signal word file
    pub signal_file: String,
    /// Guest path of the clipboard file
    pub clipboard_file: String,
    /// Polling interval override in milliseconds
    pub poll_interval_ms: Option<u64>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolVariant::Binary,
            root: PathBuf::from("."),
            working_dir: String::new(),
            dat_path: String::new(),
            signal_file: "DS4QB.SIG".to_string(),
            clipboard_file: "DS4QB.CLP".to_string(),
            poll_interval_ms: None,
        }
    }
}

impl AdapterConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == Some(0) {
            return Err(ConfigError::Invalid("poll_interval_ms must be non-zero".into()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root must not be empty".into()));
        }
        Ok(())
    }

    /// Configured interval, or the protocol's default
    pub fn interval(&self) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.protocol.default_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_config("{}");
        let config = AdapterConfig::load(file.path()).unwrap();
        assert_eq!(config, AdapterConfig::default());
        assert_eq!(config.interval(), Duration::from_millis(2));
    }

    #[test]
    fn test_fields_and_override() {
        let file = write_config(
            r#"{ "protocol": "token", "root": "/srv/dos", "working_dir": "GAME",
                 "dat_path": "GAME\\DATA", "poll_interval_ms": 20 }"#,
        );
        let config = AdapterConfig::load(file.path()).unwrap();
        assert_eq!(config.protocol, ProtocolVariant::Token);
        assert_eq!(config.root, PathBuf::from("/srv/dos"));
        assert_eq!(config.dat_path, "GAME\\DATA");
        assert_eq!(config.signal_file, "DS4QB.SIG");
        assert_eq!(config.interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_protocol_default_intervals() {
        let config = AdapterConfig {
            protocol: ProtocolVariant::Clipboard,
            ..AdapterConfig::default()
        };
        assert_eq!(config.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_validation() {
        let file = write_config(r#"{ "poll_interval_ms": 0 }"#);
        assert!(matches!(AdapterConfig::load(file.path()), Err(ConfigError::Invalid(_))));
        let file = write_config(r#"{ "root": "" }"#);
        assert!(matches!(AdapterConfig::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_errors() {
        let file = write_config(r#"{ "protocol": "midi" }"#);
        assert!(matches!(AdapterConfig::load(file.path()), Err(ConfigError::Parse(_))));
        assert!(matches!(
            AdapterConfig::load("/nonexistent/ds4qb.json"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(ProtocolVariant::from_name("Clipboard"), Some(ProtocolVariant::Clipboard));
        assert_eq!(ProtocolVariant::from_name("ds4qb2"), Some(ProtocolVariant::Token));
        assert_eq!(ProtocolVariant::from_name("midi"), None);
    }
}
