//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::tokens::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";
const DEFAULT_LOGIN_ROUTE: &str = "/login";
const DEFAULT_SUCCESS_CODE: u16 = 200;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gateway endpoints and response conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Backend gateway root, e.g. `https://api.localperks.example`
    pub base_url: String,
    /// Requests whose URL contains this path never trigger a refresh
    pub login_path: String,
    /// Endpoint minting a new token pair from a refresh token
    pub refresh_path: String,
    /// Where a forced logout sends the session
    pub login_route: String,
    /// Application-level status marking a successful envelope
    pub success_code: u16,
    /// Per-request transport timeout
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            success_code: DEFAULT_SUCCESS_CODE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Stored bearer token
    pub access_token: Option<String>,
    /// Stored refresh token
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub gateway: GatewaySettings,
    /// File this config was loaded from; writes through `TokenStore` go here.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "localperks", "localperks")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the platform config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Self>(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => Self::config_path()?,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist session tokens: {:#}", e);
        }
    }
}

impl TokenStore for Config {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            ACCESS_TOKEN_KEY => self.access_token.clone(),
            REFRESH_TOKEN_KEY => self.refresh_token.clone(),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: String) {
        match key {
            ACCESS_TOKEN_KEY => self.access_token = Some(value),
            REFRESH_TOKEN_KEY => self.refresh_token = Some(value),
            other => {
                tracing::warn!("Ignoring unknown token key {}", other);
                return;
            }
        }
        self.persist();
    }

    fn remove(&mut self, key: &str) {
        let slot = match key {
            ACCESS_TOKEN_KEY => &mut self.access_token,
            REFRESH_TOKEN_KEY => &mut self.refresh_token,
            _ => return,
        };
        if slot.take().is_some() {
            self.persist();
        }
    }
}
