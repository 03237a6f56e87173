//! Console configuration file support.
//!
//! Configuration is layered: built-in defaults, then `~/.lorakit/config.toml`,
//! then `./.lorakitrc`, then `LORAKIT_*` environment variables. Command-line
//! flags are applied last by the binary.

use crate::error::{ConfigError, ConfigResult};
use crate::forms::{EvalForm, TrainForm};
use crate::jobs::JobTimeouts;
use lorakit_client::DEFAULT_BACKEND_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BACKEND_URL: &str = "LORAKIT_BACKEND_URL";
pub const ENV_LOG_LEVEL: &str = "LORAKIT_LOG_LEVEL";

const DEFAULT_SHORT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Backend base URL
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Initial form values
    #[serde(default)]
    pub defaults: FormDefaults,
}

/// Per-request time limits, in seconds. Zero disables the limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Non-training requests; 60 seconds when unset.
    #[serde(default)]
    pub short_secs: Option<u64>,

    /// Training requests are unbounded unless set.
    #[serde(default)]
    pub train_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn short_secs(&self) -> u64 {
        self.short_secs.unwrap_or(DEFAULT_SHORT_TIMEOUT_SECS)
    }

    pub fn job_timeouts(&self) -> JobTimeouts {
        let limit = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        JobTimeouts { short: limit(self.short_secs()), train: self.train_secs.and_then(limit) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefaults {
    #[serde(default)]
    pub base_model: Option<String>,

    #[serde(default)]
    pub lora_type: Option<String>,

    #[serde(default)]
    pub adapter_path: Option<String>,
}

impl FormDefaults {
    pub fn train_form(&self) -> TrainForm {
        let mut form = TrainForm::default();
        if let Some(ref model) = self.base_model {
            form.base_model.clone_from(model);
        }
        if let Some(ref lora_type) = self.lora_type {
            form.lora_type.clone_from(lora_type);
        }
        form
    }

    pub fn eval_form(&self) -> EvalForm {
        let mut form = EvalForm::default();
        if let Some(ref model) = self.base_model {
            form.base_model.clone_from(model);
        }
        if let Some(ref path) = self.adapter_path {
            form.adapter_path.clone_from(path);
        }
        form
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// `~/.lorakit/config.toml`
    pub fn default_global_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lorakit")
            .join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".lorakitrc")
    }

    /// Loads the global then local config files and applies environment
    /// overrides. Missing files are skipped; a file that exists but cannot be
    /// read or parsed is an error.
    pub fn discover_and_load() -> ConfigResult<Self> {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(file_config) => config.merge(&file_config),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Merge another configuration into this one. Values set in `other` win.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref url) = other.backend_url {
            self.backend_url = Some(url.clone());
        }
        if let Some(ref level) = other.log_level {
            self.log_level = Some(level.clone());
        }
        if other.timeouts.short_secs.is_some() {
            self.timeouts.short_secs = other.timeouts.short_secs;
        }
        if other.timeouts.train_secs.is_some() {
            self.timeouts.train_secs = other.timeouts.train_secs;
        }
        if let Some(ref model) = other.defaults.base_model {
            self.defaults.base_model = Some(model.clone());
        }
        if let Some(ref lora_type) = other.defaults.lora_type {
            self.defaults.lora_type = Some(lora_type.clone());
        }
        if let Some(ref path) = other.defaults.adapter_path {
            self.defaults.adapter_path = Some(path.clone());
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Applies `LORAKIT_*` overrides read through `lookup`. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_blank(ENV_BACKEND_URL) {
            self.backend_url = Some(url);
        }
        if let Some(level) = non_blank(ENV_LOG_LEVEL) {
            self.log_level = Some(level);
        }
    }

    pub fn backend_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or(DEFAULT_BACKEND_URL)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
