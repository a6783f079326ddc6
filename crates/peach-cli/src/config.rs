//! Configuration Vault – reads/writes `~/.peach/config.toml`.

use peach_memory::MemoryConfig;
use peach_types::PeachError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted user configuration stored in `~/.peach/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the databases and the embedding failure log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model used for tag enrichment and self-dialogue.
    #[serde(default = "default_model")]
    pub active_model: String,

    /// Ollama embedding model.  Empty selects the local hashing embedder.
    #[serde(default)]
    pub embedding_model: String,

    /// Upper bound on every model request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds between background decay passes.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Ingestion pipeline tunables.
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_data_dir() -> PathBuf {
    peach_home(&home_dir())
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_request_timeout() -> u64 {
    20
}
fn default_maintenance_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ollama_url: default_ollama_url(),
            active_model: default_model(),
            embedding_model: String::new(),
            request_timeout_secs: default_request_timeout(),
            maintenance_interval_secs: default_maintenance_interval(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("peach.db")
    }

    pub fn semantic_path(&self) -> PathBuf {
        self.data_dir.join("semantic_index.db")
    }

    pub fn failure_log_path(&self) -> PathBuf {
        self.data_dir.join("embedding_failures.log")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn peach_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".peach")
}

/// Return the path to `~/.peach/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    peach_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, PeachError> {
    load_from(&config_path())
}

/// Load the config from a specific path, applying environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, PeachError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        PeachError::Config(format!("Failed to read config at {}: {}", path.display(), e))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| PeachError::Config(format!("Failed to parse config: {}", e)))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Defaults with environment overrides applied.
pub fn from_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Apply `PEACH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PEACH_DATA_DIR` | `data_dir` |
/// | `PEACH_OLLAMA_URL` | `ollama_url` |
/// | `PEACH_MODEL` | `active_model` |
/// | `PEACH_EMBEDDING_MODEL` | `embedding_model` |
/// | `PEACH_MAINTENANCE_SECS` | `maintenance_interval_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PEACH_DATA_DIR") {
        cfg.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PEACH_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("PEACH_MODEL") {
        cfg.active_model = v;
    }
    if let Ok(v) = std::env::var("PEACH_EMBEDDING_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("PEACH_MAINTENANCE_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.maintenance_interval_secs = secs;
    }
}

/// Save the config to disk, creating `~/.peach/` if necessary.
pub fn save(cfg: &Config) -> Result<(), PeachError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), PeachError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| PeachError::Config(format!("Failed to serialize config: {}", e)))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(raw.as_bytes())?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)?;
    Ok(())
}
