//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a per-module TOML file. Every section is
//! optional: a missing file or missing keys fall back to built-in defaults so
//! a fresh install starts without any configuration.
//!
//! Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `LYRA_ROOT_FOLDER` environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LYRA_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "lyra.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and durable cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Corpus cache tuning
    #[serde(default)]
    pub cache: CacheConfig,

    /// Annotation pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Remote classification service
    #[serde(default)]
    pub annotation: AnnotationServiceConfig,

    /// Known corpus sources keyed by corpus type (e.g. `gaucho`)
    #[serde(default)]
    pub corpora: BTreeMap<String, CorpusSourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Corpus cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime after load, in minutes
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Persist corpora to the durable (SQLite) tier
    #[serde(default = "default_true")]
    pub durable_enabled: bool,
}

impl CacheConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_minutes * 60)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            durable_enabled: true,
        }
    }
}

/// Annotation pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum words per remote call
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Attempts per chunk, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Pause between successive chunks
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,

    /// Discarded-entry ratio above which a chunk logs a warning
    #[serde(default = "default_malformed_warn_ratio")]
    pub malformed_warn_ratio: f64,

    /// Finished runs kept for status and result queries
    #[serde(default = "default_retained_runs")]
    pub retained_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            malformed_warn_ratio: default_malformed_warn_ratio(),
            retained_runs: default_retained_runs(),
        }
    }
}

/// Remote classification service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationServiceConfig {
    /// Classification endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API key (database and environment take precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Client-side request budget
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Total request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnnotationServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Where a corpus type's raw source lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSourceConfig {
    /// URL returning the raw corpus JSON
    pub url: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl_minutes() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_inter_chunk_delay_ms() -> u64 {
    500
}

fn default_malformed_warn_ratio() -> f64 {
    0.1
}

fn default_retained_runs() -> usize {
    32
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/lyra (or /var/lib/lyra for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("lyra"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lyra"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("lyra"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lyra"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("lyra"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lyra"))
    } else {
        PathBuf::from("./lyra_data")
    }
}

/// Locate the TOML config file for a module
///
/// Linux checks `~/.config/lyra/<module>.toml` then `/etc/lyra/<module>.toml`;
/// other platforms only check the user config directory.
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let user_config = dirs::config_dir().map(|d| d.join("lyra").join(&file_name));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lyra").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load module configuration, degrading to defaults
///
/// An explicit path that fails to load is an error. A missing or broken
/// discovered file logs a warning and yields defaults.
pub fn load_module_config(module_name: &str, explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    match config_file_path(module_name) {
        Some(path) => match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Ok(TomlConfig::default())
            }
        },
        None => {
            warn!("No config file found for {}; using built-in defaults", module_name);
            Ok(TomlConfig::default())
        }
    }
}

/// Standard User-Agent for outbound HTTP requests
pub fn get_user_agent() -> String {
    format!("Lyra/{} (corpus research dashboard)", env!("CARGO_PKG_VERSION"))
}

/// Resolves the root folder using the 4-tier priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_override: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_override: None,
            toml_root: None,
        }
    }

    /// Command-line value (priority 1)
    pub fn with_cli_override(mut self, path: Option<PathBuf>) -> Self {
        self.cli_override = path;
        self
    }

    /// TOML value (priority 3)
    pub fn with_toml_root(mut self, path: Option<PathBuf>) -> Self {
        self.toml_root = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_override {
            info!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!("{}: root folder from TOML config", self.module_name);
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
            std::fs::create_dir_all(&self.root_folder)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}
