//! Client configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty or missing file
//! yields [`ClientConfig::default`].
//!
//! ```toml
//! fallback_editor_name = "System"
//!
//! [notifications]
//! capacity = 64
//! dedupe_window_ms = 500
//! success_notifications = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use quire_types::SYSTEM_EDITOR_NAME;

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_DEDUPE_WINDOW_MS, DEFAULT_NOTIFICATION_CAPACITY,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name of the editor a dangling active-editor pointer falls back to.
    pub fallback_editor_name: String,
    pub notifications: NotificationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fallback_editor_name: SYSTEM_EDITOR_NAME.to_string(),
            notifications: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Maximum queued notifications.
    pub capacity: usize,
    /// Identical non-error notifications within this window collapse.
    pub dedupe_window_ms: u64,
    /// Whether successful mutations produce a `Success` notification.
    pub success_notifications: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_NOTIFICATION_CAPACITY,
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            success_notifications: false,
        }
    }
}

impl ClientConfig {
    /// Parse from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no client config, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from [`default_path`], or the defaults if there is no config dir.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// `$XDG_CONFIG_HOME/quire/client.toml` (or the platform equivalent).
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(ClientConfig::from_str("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig::from_str(
            r#"
            fallback_editor_name = "Root"

            [notifications]
            success_notifications = true
            "#,
        )
        .unwrap();
        assert_eq!(config.fallback_editor_name, "Root");
        assert!(config.notifications.success_notifications);
        assert_eq!(config.notifications.capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[notifications]\ncapacity = 8\ndedupe_window_ms = 0\n").unwrap();
        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.notifications.capacity, 8);
        assert_eq!(config.notifications.dedupe_window_ms, 0);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "capacity = [").unwrap();
        let err = ClientConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("client.toml"));
    }

    #[test]
    fn test_default_path_ends_with_quire_client_toml() {
        if let Some(path) = default_path() {
            assert!(path.ends_with("quire/client.toml"));
        }
    }
}
