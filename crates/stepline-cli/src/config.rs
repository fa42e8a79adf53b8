//! Configuration for the stepline CLI
//!
//! Layers, lowest first: built-in defaults, an optional YAML file,
//! `STEPLINE_*` environment variables, then command-line flags (applied by
//! the command handlers).

use crate::duration::parse_duration;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepline_core::RetryPolicy;
use tracing::debug;

/// Remote API settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the step service, e.g. `https://api.example.com/api`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Sent as the `organizationId` query parameter
    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_name: Option<String>,
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Limit for each remote call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Limit for a whole run
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,

    /// Concurrent definitions in batch mode
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_parallel() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            run_timeout_ms: None,
            parallel: default_parallel(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of pretty output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session record location; defaults to `~/.stepline/session.json`
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    #[serde(default)]
    pub output: OutputFormat,

    /// Explicit checkpoint from `STEPLINE_CHECKPOINT_ID`; never read from files
    #[serde(skip)]
    pub checkpoint_override: Option<i64>,

    /// Environment values that were present but unusable
    #[serde(skip)]
    pub rejected_env: Vec<String>,
}

impl Config {
    /// Default config file location, `~/.stepline/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".stepline").join("config.yaml"))
    }

    /// Loads configuration from an explicit file, or the default file when it
    /// exists, then applies the process environment.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads a YAML config file.
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> CliResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Overrides values from `STEPLINE_*` variables. Unusable values are
    /// recorded in `rejected_env` and otherwise ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STEPLINE_BASE_URL") {
            self.api.base_url = Some(url);
        }
        if let Some(token) = lookup("STEPLINE_TOKEN") {
            self.api.token = Some(token);
        }
        if let Some(org) = lookup("STEPLINE_ORG_ID") {
            self.api.organization_id = Some(org);
        }
        if let Some(id) = lookup("STEPLINE_CLIENT_ID") {
            self.api.client_id = Some(id);
        }
        if let Some(name) = lookup("STEPLINE_CLIENT_NAME") {
            self.api.client_name = Some(name);
        }

        if let Some(value) = lookup("STEPLINE_CALL_TIMEOUT") {
            match parse_duration(&value) {
                Ok(timeout) => self.execution.call_timeout_ms = timeout.as_millis() as u64,
                Err(e) => self.reject("STEPLINE_CALL_TIMEOUT", &value, e),
            }
        }
        if let Some(value) = lookup("STEPLINE_RUN_TIMEOUT") {
            match parse_duration(&value) {
                Ok(timeout) => self.execution.run_timeout_ms = Some(timeout.as_millis() as u64),
                Err(e) => self.reject("STEPLINE_RUN_TIMEOUT", &value, e),
            }
        }
        if let Some(value) = lookup("STEPLINE_PARALLEL") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.execution.parallel = n,
                _ => self.reject("STEPLINE_PARALLEL", &value, "expected a positive integer"),
            }
        }
        if let Some(value) = lookup("STEPLINE_MAX_ATTEMPTS") {
            match value.parse::<u32>() {
                Ok(n) if n > 0 => self.execution.retry.max_attempts = n,
                _ => self.reject("STEPLINE_MAX_ATTEMPTS", &value, "expected a positive integer"),
            }
        }

        if let Some(path) = lookup("STEPLINE_SESSION_FILE") {
            self.session_file = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("STEPLINE_CHECKPOINT_ID") {
            match value.trim().parse::<i64>() {
                Ok(id) if id > 0 => self.checkpoint_override = Some(id),
                _ => self.reject("STEPLINE_CHECKPOINT_ID", &value, "expected a positive integer"),
            }
        }

        if let Some(level) = lookup("STEPLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("STEPLINE_LOG_JSON") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json = true,
                "0" | "false" | "no" => self.logging.json = false,
                _ => self.reject("STEPLINE_LOG_JSON", &value, "expected true or false"),
            }
        }
        if let Some(value) = lookup("STEPLINE_OUTPUT") {
            match value.parse::<OutputFormat>() {
                Ok(format) => self.output = format,
                Err(e) => self.reject("STEPLINE_OUTPUT", &value, e),
            }
        }
    }

    fn reject(&mut self, key: &str, value: &str, reason: impl std::fmt::Display) {
        self.rejected_env
            .push(format!("Invalid {} value '{}': {}", key, value, reason));
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.execution.call_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.execution.run_timeout_ms.map(Duration::from_millis)
    }

    /// Session file location, falling back to the home directory default.
    pub fn session_path(&self) -> CliResult<PathBuf> {
        self.session_file
            .clone()
            .or_else(stepline_core::FileSessionStore::default_path)
            .ok_or_else(|| CliError::Config("cannot determine a home directory for the session file".into()))
    }

    /// The API base URL, required for anything that talks to the service.
    pub fn base_url(&self) -> CliResult<&str> {
        self.api
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                CliError::Config("no API base URL; set api.base_url or STEPLINE_BASE_URL".into())
            })
    }
}
