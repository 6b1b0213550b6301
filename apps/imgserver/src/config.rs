//! Server configuration management.
//!
//! Configuration is stored as TOML, at `$SCDFT_CONFIG` when set, else:
//! - Linux: `~/.config/scdft/server.toml`
//! - Windows: `%APPDATA%/scdft/server.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use scdft_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "SCDFT_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Storage root; every request path resolves below it.
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Drop connections that stay silent this long (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

fn default_port() -> u16 {
    scdft_server::DEFAULT_PORT
}

fn default_root_path() -> String {
    "./".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            root_path: default_root_path(),
            idle_timeout_secs: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, writing defaults there if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Library configuration for the dispatcher.
    pub fn server_config(&self) -> ServerConfig {
        let config = ServerConfig::new(self.port, &self.root_path);
        match self.idle_timeout_secs {
            Some(secs) => config.with_idle_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("scdft").join("server.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("scdft")
            .join("server.toml")
    }
}
