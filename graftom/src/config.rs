use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::RepoError;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 8;

/// Process-wide write settings. Writers receive them explicitly; nothing is
/// read from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Wrap each write in a store transaction unless a call overrides it.
    #[serde(default)]
    pub use_database_transactions: bool,
    /// Reject malformed relation values instead of skipping them.
    #[serde(default)]
    pub strict_submissions: bool,
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_database_transactions: false,
            strict_submissions: false,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// Per-call overrides of [`Settings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub use_transactions: Option<bool>,
}

impl WriteOptions {
    pub fn transactional() -> Self {
        Self {
            use_transactions: Some(true),
        }
    }

    pub fn non_transactional() -> Self {
        Self {
            use_transactions: Some(false),
        }
    }

    pub fn use_transactions(&self, settings: &Settings) -> bool {
        self.use_transactions.unwrap_or(settings.use_database_transactions)
    }
}

/// Configuration stored in `.graftom/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraftomConfig {
    #[serde(default)]
    pub graftom: Settings,
    #[serde(default)]
    pub redis: RedisSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

fn default_prefix() -> String {
    "graftom".to_string()
}

impl GraftomConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, RepoError> {
        toml::from_str(content).map_err(|err| RepoError::Other {
            message: format!("failed to parse config: {err}").into(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, RepoError> {
        let content = std::fs::read_to_string(path).map_err(|err| RepoError::Other {
            message: format!("failed to read {}: {err}", path.display()).into(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Redis URL with `${VAR}` references expanded; unset variables fall back
    /// to the local default instance.
    pub fn redis_url(&self) -> String {
        let expanded = expand_env(&self.redis.url);
        if expanded.is_empty() {
            "redis://127.0.0.1/".to_string()
        } else {
            expanded
        }
    }
}

/// Replaces `${VAR}` occurrences with the variable's value (empty when unset).
pub fn expand_env(value: &str) -> String {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                expanded.push_str(&std::env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                expanded.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    expanded.push_str(rest);
    expanded
}
