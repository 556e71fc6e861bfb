//! `packgate.toml`: bridge settings plus the pack configuration.
//!
//! ```toml
//! [bridge]
//! bind = "127.0.0.1:25580"
//! secret = "change-me"
//! data_dir = "data"
//! retention_days = 365
//!
//! [pack]
//! url = "https://cdn.example.net/pack.zip"
//! sha1 = "da39a3ee5e6b4b0d3255bfef95601890afd80709"
//! policy = "login"
//! ```
//!
//! Every field has a default. A missing file is created with the
//! defaults filled in, so operators have something to edit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use packgate_core::PackConfig;
use serde::{Deserialize, Serialize};

use crate::SettingsError;

/// The whole settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeSettings,
    pub pack: PackConfig,
}

/// The `[bridge]` section: where the proxy plugin connects and where
/// records are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Address the host bridge listens on.
    pub bind: String,

    /// Shared secret the proxy plugin must present in its handshake.
    /// Unset means any host may connect; only do that on loopback.
    pub secret: Option<String>,

    /// Directory holding `packgate.redb`. Unset keeps records in memory
    /// only, which forgets every acceptance on restart.
    pub data_dir: Option<PathBuf>,

    /// Evict records not updated for this many days. Unset keeps them
    /// forever.
    pub retention_days: Option<u32>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:25580".to_string(),
            secret: None,
            data_dir: Some(PathBuf::from("data")),
            retention_days: None,
        }
    }
}

impl BridgeSettings {
    /// `retention_days` as a duration.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_days
            .map(|days| Duration::from_secs(u64::from(days) * 24 * 60 * 60))
    }

    /// Path of the database file, if records are persisted.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("packgate.redb"))
    }
}

impl Settings {
    /// Loads settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Loads settings from `path`, first writing the defaults there if
    /// the file doesn't exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            let defaults = Settings::default();
            defaults.save(path)?;
            tracing::info!(path = %path.display(), "wrote default settings");
            return Ok(defaults);
        }
        Self::load(path)
    }

    /// Writes these settings to `path` as TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }

    /// Logs what is being offered and how answers are handled.
    pub fn log_summary(&self) {
        let pack = &self.pack;
        let sha1 = if pack.sha1.is_empty() { "(none)" } else { pack.sha1.as_str() };
        tracing::info!(
            url = %pack.url,
            sha1,
            policy = ?pack.policy,
            force = pack.force(),
            kick_on_decline = pack.kick_on_decline,
            kick_on_failed_download = pack.kick_on_failed_download,
            offer_only_once = pack.offer_only_once,
            "pack configuration"
        );
        tracing::info!(
            bind = %self.bridge.bind,
            authenticated = self.bridge.secret.is_some(),
            data_dir = ?self.bridge.data_dir,
            retention_days = ?self.bridge.retention_days,
            "bridge configuration"
        );
    }
}
