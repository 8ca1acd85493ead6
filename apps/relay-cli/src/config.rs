//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/mediarelay/relay.toml`
//! - Windows: `%APPDATA%/mediarelay/relay.toml`

use std::path::{Path, PathBuf};

use mediarelay_pipeline::RelayConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory receiving assembled files and the delivery manifest.
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,

    /// Recipient recorded in the delivery manifest.
    #[serde(default = "default_recipient")]
    pub recipient: String,

    #[serde(default)]
    pub relay: RelayConfig,
}

fn default_outbox_dir() -> PathBuf {
    data_dir().join("outbox")
}

fn default_recipient() -> String {
    "me".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            outbox_dir: default_outbox_dir(),
            recipient: default_recipient(),
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or the default location.
    ///
    /// A missing file is created with default values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path` with owner-only permissions.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("mediarelay").join("relay.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("mediarelay")
            .join("relay.toml"))
    }
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let local =
            std::env::var("LOCALAPPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(local).join("mediarelay")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".local").join("share").join("mediarelay")
    }
}
