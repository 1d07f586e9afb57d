use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Largest list page a client may ask for.
pub const MAX_LIST_PAGE_SIZE: u32 = 500;

/// Settings shared by the server and the CLI.
///
/// Layered: built-in defaults, then `~/.specdb/config.toml` (or an explicit
/// file), then environment variables. Command-line flags are applied last by
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecdbConfig {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub cors_permissive: bool,
    /// Where unauthenticated users are sent, with `?next=<path>` appended.
    pub login_url: String,
    /// Base URL of the specimen photo store. Image probing is off when unset.
    pub image_base_url: Option<String>,
    pub image_probe_timeout_secs: u64,
    pub preview_page_size: usize,
    pub list_page_size: u32,
    /// Enables `POST /debug/bulk-delete/{kind}`.
    pub debug_bulk_delete: bool,
    pub backup_dir: PathBuf,
    /// Copies kept per backup family.
    pub backup_keep: usize,
    pub max_connections: u32,
    /// Seconds to wait for a free pooled connection.
    pub db_acquire_timeout_secs: u64,
}

impl Default for SpecdbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: "127.0.0.1:3030".to_string(),
            cors_permissive: false,
            login_url: "/accounts/login/".to_string(),
            image_base_url: None,
            image_probe_timeout_secs: 3,
            preview_page_size: 25,
            list_page_size: 50,
            debug_bulk_delete: false,
            backup_dir: PathBuf::from("${HOME}/.specdb/backups"),
            backup_keep: 3,
            max_connections: 5,
            db_acquire_timeout_secs: 10,
        }
    }
}

impl SpecdbConfig {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| env::var(key).ok());
        config.expand_variables();
        config.clamp();
        Ok(config)
    }

    /// Parse one TOML file over the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).context("Failed to parse config file (invalid TOML)")
    }

    /// Get config file path: ~/.specdb/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".specdb/config.toml")
    }

    /// Override fields from environment variables found by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(bind) = lookup("SPECDB_BIND") {
            self.bind_addr = bind;
        }
        if let Some(url) = lookup("SPECDB_LOGIN_URL") {
            self.login_url = url;
        }
        if let Some(url) = lookup("SPECDB_IMAGE_BASE_URL") {
            self.image_base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(flag) = lookup("SPECDB_DEBUG_BULK_DELETE") {
            self.debug_bulk_delete = parse_flag(&flag);
        }
        if let Some(flag) = lookup("SPECDB_CORS_PERMISSIVE") {
            self.cors_permissive = parse_flag(&flag);
        }
        if let Some(dir) = lookup("SPECDB_BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }
        if let Some(n) = lookup("SPECDB_MAX_CONNECTIONS").and_then(|v| v.trim().parse().ok()) {
            self.max_connections = n;
        }
    }

    /// Expand ${HOME} in paths
    fn expand_variables(&mut self) {
        let home = env::var("HOME").unwrap_or_default();
        let expanded = self.backup_dir.display().to_string().replace("${HOME}", &home);
        self.backup_dir = PathBuf::from(expanded);
    }

    fn clamp(&mut self) {
        self.list_page_size = self.list_page_size.clamp(1, MAX_LIST_PAGE_SIZE);
        self.preview_page_size = self.preview_page_size.max(1);
        self.backup_keep = self.backup_keep.max(1);
        self.max_connections = self.max_connections.max(1);
        self.db_acquire_timeout_secs = self.db_acquire_timeout_secs.max(1);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
