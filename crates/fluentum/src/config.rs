//! Session configuration.
//!
//! Loaded from YAML, then optionally overridden from the environment:
//!
//! ```yaml
//! match_policy: strict
//! log_filter: fluentum=debug
//! max_unwrap_depth: 16
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::locator::MatchPolicy;
use crate::result::{FluentError, FluentResult};

/// Environment variable overriding [`FluentConfig::match_policy`]
pub const MATCH_POLICY_ENV: &str = "FLUENTUM_MATCH_POLICY";

/// Environment variable overriding [`FluentConfig::log_filter`]
pub const LOG_FILTER_ENV: &str = "FLUENTUM_LOG";

fn default_log_filter() -> String {
    "warn".to_string()
}

const fn default_max_unwrap_depth() -> usize {
    32
}

/// Configuration shared by a session, its registry and its components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FluentConfig {
    /// What a single-element lookup does with several matches
    #[serde(default)]
    pub match_policy: MatchPolicy,
    /// `tracing` filter directive used by [`crate::init_logging`]
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Longest handle decoration chain followed when computing identity
    #[serde(default = "default_max_unwrap_depth")]
    pub max_unwrap_depth: usize,
}

impl Default for FluentConfig {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            log_filter: default_log_filter(),
            max_unwrap_depth: default_max_unwrap_depth(),
        }
    }
}

impl FluentConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the match policy
    #[must_use]
    pub const fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Set the log filter directive
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the unwrap depth bound
    #[must_use]
    pub const fn with_max_unwrap_depth(mut self, depth: usize) -> Self {
        self.max_unwrap_depth = depth;
        self
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// `Config` if the document is not valid YAML or has unknown keys.
    pub fn from_yaml_str(yaml: &str) -> FluentResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| FluentError::config(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Config` if it cannot be parsed.
    pub fn from_file(path: &Path) -> FluentResult<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// `Config` if serialization fails.
    pub fn to_yaml(&self) -> FluentResult<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| FluentError::config(format!("Failed to serialize configuration: {e}")))
    }

    /// Apply `FLUENTUM_MATCH_POLICY` and `FLUENTUM_LOG` when set
    ///
    /// # Errors
    ///
    /// `Config` if the match policy variable holds an unknown value.
    pub fn with_env_overrides(self) -> FluentResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// `Config` if the match policy override holds an unknown value.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> FluentResult<Self> {
        if let Some(policy) = lookup(MATCH_POLICY_ENV) {
            self.match_policy = MatchPolicy::parse(&policy)?;
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV) {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> FluentResult<()> {
        if self.max_unwrap_depth == 0 {
            return Err(FluentError::config("max_unwrap_depth must be at least 1"));
        }
        Ok(())
    }
}
