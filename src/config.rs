//! Reporter configuration.
//!
//! Loaded from a TOML file when one is given (or named by
//! `ALLURE_REPORT_CONFIG`), otherwise compiled-in defaults. A non-empty
//! `ALLURE_RESULTS_PATH` always overrides the results directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::executor::ENV_PREFIX;
use crate::tracker::FlightMode;

pub const CONFIG_ENV: &str = "ALLURE_REPORT_CONFIG";
pub const RESULTS_PATH_ENV: &str = "ALLURE_RESULTS_PATH";
pub const DEFAULT_RESULTS_PATH: &str = "./allure-results";
pub const DEFAULT_SUITE: &str = "Features";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving every artifact.
    pub results_path: PathBuf,
    /// Container name and `suite` label.
    pub suite: String,
    pub mode: FlightMode,
    /// Prefix of environment keys exported to `environment.properties`.
    pub env_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            suite: DEFAULT_SUITE.to_string(),
            mode: FlightMode::Multi,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }
}

impl ReportConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ReportError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded report configuration");
        Ok(config.normalized())
    }

    /// Resolve configuration from, in order:
    /// 1. `explicit`, when given (errors are returned).
    /// 2. The file named by `ALLURE_REPORT_CONFIG`.
    /// 3. Compiled-in defaults.
    ///
    /// `ALLURE_RESULTS_PATH` is applied on top.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::from_env_file(),
        };
        Ok(config.with_env_overrides(std::env::var(RESULTS_PATH_ENV).ok()))
    }

    fn from_env_file() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ALLURE_REPORT_CONFIG set but file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file, using compiled-in defaults");
        Self::default()
    }

    /// Apply a results path override; empty values are ignored.
    pub fn with_env_overrides(mut self, results_path: Option<String>) -> Self {
        if let Some(path) = results_path.filter(|p| !p.trim().is_empty()) {
            self.results_path = PathBuf::from(path);
        }
        self.normalized()
    }

    /// Trim a trailing `/` from the results path and default an empty suite.
    pub fn normalized(mut self) -> Self {
        let raw = self.results_path.to_string_lossy().into_owned();
        let trimmed = raw.trim_end_matches('/');
        if raw.is_empty() {
            self.results_path = PathBuf::from(DEFAULT_RESULTS_PATH);
        } else if !trimmed.is_empty() && trimmed.len() != raw.len() {
            self.results_path = PathBuf::from(trimmed);
        }

        if self.suite.is_empty() {
            self.suite = DEFAULT_SUITE.to_string();
        }
        self
    }
}
