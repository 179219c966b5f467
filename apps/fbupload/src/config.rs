//! fbupload configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fbupload/config.toml`
//! - Windows: `%APPDATA%/fbupload/config.toml`

use std::path::{Path, PathBuf};

use fbupload_client::UploadOptions;
use fbupload_manager::ManagerConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// File Browser base URL.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Directory holding the write-ahead log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Replace remote files on the first upload attempt instead of resuming.
    #[serde(default)]
    pub overwrite: bool,

    /// Verify uploads against the server's SHA-256.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// Deadline for metadata requests, in seconds.
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    #[serde(default)]
    pub manager: ManagerConfig,
}

fn default_host() -> String {
    "http://localhost:8080".into()
}

fn default_username() -> String {
    "admin".into()
}

fn default_data_dir() -> PathBuf {
    config_base_dir().join("fbupload")
}

fn default_true() -> bool {
    true
}

fn default_metadata_timeout_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: default_username(),
            password: String::new(),
            data_dir: default_data_dir(),
            overwrite: false,
            verify_checksum: default_true(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            manager: ManagerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map_or_else(config_path, Path::to_path_buf);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Holds the password.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            overwrite: self.overwrite,
            verify_checksum: self.verify_checksum,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.db")
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    config_base_dir().join("fbupload").join("config.toml")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.host, "http://localhost:8080");
        assert_eq!(config.username, "admin");
        assert!(!config.overwrite);
        assert!(config.verify_checksum);
        assert_eq!(config.metadata_timeout_secs, 5);
        assert_eq!(config.manager.queue_capacity, 10);
        assert!(config.wal_path().ends_with("fbupload/wal.db"));
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            host = "https://files.example.com"
            password = "s3cret"

            [manager]
            max_concurrent_items = 8

            [manager.retry]
            initial_delay_ms = 100
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "https://files.example.com");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.manager.max_concurrent_items, 8);
        assert_eq!(config.manager.resumable_retries, 3);
        assert_eq!(config.manager.retry.initial_delay_ms, 100);
        assert_eq!(config.manager.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn upload_options_follow_config() {
        let config = Config {
            overwrite: true,
            verify_checksum: false,
            ..Config::default()
        };
        let opts = config.upload_options();
        assert!(opts.overwrite);
        assert!(!opts.verify_checksum);
    }

    #[test]
    fn load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.host, "http://localhost:8080");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let config = Config {
            host: "http://nas.local:8080".into(),
            data_dir: tmp.path().join("data"),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.host, "http://nas.local:8080");
        assert_eq!(loaded.data_dir, tmp.path().join("data"));
        assert_eq!(loaded.manager, ManagerConfig::default());
    }
}
