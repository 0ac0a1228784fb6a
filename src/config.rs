//! Workspace configuration file support
//!
//! Handles parsing of `.data-load.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::load::LoadOptions;
use crate::models::ErrorPolicy;

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".data-load.toml";

/// Default directory for persisted tables and load history
pub const DEFAULT_STATE_DIR: &str = ".data-load";

/// Environment variable for the default error policy
pub const ENV_ON_ERROR: &str = "DATA_LOAD_ON_ERROR";

/// Environment variable for the state directory
pub const ENV_STATE_PATH: &str = "DATA_LOAD_STATE_PATH";

/// Environment variable for load parallelism
pub const ENV_PARALLELISM: &str = "DATA_LOAD_PARALLELISM";

/// Environment variable for the log level
pub const ENV_LOG_LEVEL: &str = "DATA_LOAD_LOG_LEVEL";

/// Errors reading or writing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Config error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load defaults section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSection {
    /// Policy used when a load does not name one
    #[serde(default)]
    pub on_error: ErrorPolicy,

    /// Cap on rejections kept in a load result (unbounded when unset)
    #[serde(default)]
    pub max_recorded_rejections: Option<usize>,

    /// Files decoded concurrently within one load
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Reload files already in the load history
    #[serde(default)]
    pub force: bool,
}

fn default_parallelism() -> usize {
    1
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::default(),
            max_recorded_rejections: None,
            parallelism: default_parallelism(),
            force: false,
        }
    }
}

/// State persistence section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSection {
    /// Directory for `tables.json`, `history.json` and `views.json` (relative to workspace)
    #[serde(default = "default_state_path")]
    pub path: String,
}

fn default_state_path() -> String {
    DEFAULT_STATE_DIR.to_string()
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `.data-load.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    #[serde(default)]
    pub load: LoadSection,

    #[serde(default)]
    pub state: StateSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a workspace directory
    ///
    /// Looks for `.data-load.toml` in the workspace directory and falls back
    /// to defaults if not found. Environment overrides are applied last.
    pub fn load(workspace_path: &Path) -> ConfigResult<Self> {
        let config_path = workspace_path.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(format!("Failed to read config: {}", e)))?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a workspace directory
    pub fn save(&self, workspace_path: &Path) -> ConfigResult<()> {
        let config_path = workspace_path.join(CONFIG_FILENAME);
        let content = self.to_toml()?;
        std::fs::write(&config_path, content)
            .map_err(|e| ConfigError::Io(format!("Failed to write config: {}", e)))
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Serialization(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(policy) = lookup(ENV_ON_ERROR)
            && let Ok(policy) = policy.parse()
        {
            self.load.on_error = policy;
        }

        if let Some(path) = lookup(ENV_STATE_PATH) {
            self.state.path = path;
        }

        if let Some(n) = lookup(ENV_PARALLELISM)
            && let Ok(n) = n.parse::<usize>()
            && n > 0
        {
            self.load.parallelism = n;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    /// State directory for a workspace
    pub fn state_dir(&self, workspace_path: &Path) -> PathBuf {
        if Path::new(&self.state.path).is_absolute() {
            PathBuf::from(&self.state.path)
        } else {
            workspace_path.join(&self.state.path)
        }
    }

    /// Load options seeded from the `[load]` section
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            force: self.load.force,
            parallelism: self.load.parallelism,
            max_recorded_rejections: self.load.max_recorded_rejections,
            ..LoadOptions::default()
        }
    }

    /// Check if configuration exists in a workspace
    pub fn exists(workspace_path: &Path) -> bool {
        workspace_path.join(CONFIG_FILENAME).exists()
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Data Loading SDK Configuration

[load]
# Policy when a load does not name one: ABORT_STATEMENT, CONTINUE, SKIP_FILE or SKIP_FILE_<n>
on_error = "ABORT_STATEMENT"

# Files decoded concurrently within one load
parallelism = 1

# Reload files already recorded in the load history
force = false

# Cap on rejections kept in a load result (unbounded when unset)
# max_recorded_rejections = 1000

[state]
# Directory for persisted tables, load history and views (relative to workspace, or absolute)
path = ".data-load"

[logging]
# Default log filter when RUST_LOG is not set
level = "info"
"#
}
