//! Configuration loading, validation, and management for Waymark.
//!
//! Reads `~/.waymark/config.toml`, applies environment overrides, and
//! validates the result before anything else starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration, one section per subsystem.
///
/// Maps directly to `~/.waymark/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Expensive-call budget ceilings
    #[serde(default)]
    pub budget: BudgetSection,

    /// Hybrid recall tuning
    #[serde(default)]
    pub memory: MemorySection,

    /// Session store backend
    #[serde(default)]
    pub session: SessionSection,

    /// Semantic index backend
    #[serde(default)]
    pub index: IndexSection,
}

/// Per-user ceilings on expensive semantic-index calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSection {
    /// Semantic queries allowed per user per UTC calendar day
    #[serde(default = "default_daily_ceiling")]
    pub daily_call_ceiling: u32,

    /// Semantic queries allowed per user per ISO week
    #[serde(default = "default_weekly_ceiling")]
    pub weekly_call_ceiling: u32,
}

fn default_daily_ceiling() -> u32 {
    20
}
fn default_weekly_ceiling() -> u32 {
    100
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_call_ceiling: default_daily_ceiling(),
            weekly_call_ceiling: default_weekly_ceiling(),
        }
    }
}

/// Knobs for the hybrid memory orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    /// Hard cap on corpora touched by one cross-corpus query
    #[serde(default = "default_max_corpora")]
    pub max_corpora_per_query: usize,

    /// Hard cap on merged context items handed to completion
    #[serde(default = "default_merged_cap")]
    pub merged_memory_cap: usize,

    /// Hits requested from a semantic query
    #[serde(default = "default_top_k")]
    pub semantic_query_top_k: usize,

    /// Read-only memory: skip semantic writes, treat ceilings as advisory
    /// minimums (test environments)
    #[serde(default)]
    pub cost_optimized_mode: bool,

    /// Turns shorter than this are not worth indexing
    #[serde(default = "default_min_index_chars")]
    pub min_index_chars: usize,
}

fn default_max_corpora() -> usize {
    5
}
fn default_merged_cap() -> usize {
    6
}
fn default_top_k() -> usize {
    10
}
fn default_min_index_chars() -> usize {
    10
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_corpora_per_query: default_max_corpora(),
            merged_memory_cap: default_merged_cap(),
            semantic_query_top_k: default_top_k(),
            cost_optimized_mode: false,
            min_index_chars: default_min_index_chars(),
        }
    }
}

/// Session store backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Application name sessions are keyed under
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Turns fetched for the lexical/recency tier
    #[serde(default = "default_turn_limit")]
    pub recent_turn_limit: usize,

    /// REST backend endpoint; unset = in-memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_app_name() -> String {
    "waymark".into()
}
fn default_turn_limit() -> usize {
    10
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            recent_turn_limit: default_turn_limit(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Semantic index backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct IndexSection {
    /// REST backend endpoint; unset = in-memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Document chunking size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Overlap between consecutive chunks in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Hits scoring below this are dropped by the backend
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f32,
}

fn default_chunk_size() -> u32 {
    512
}
fn default_chunk_overlap() -> u32 {
    100
}
fn default_similarity_floor() -> f32 {
    0.5
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            similarity_floor: default_similarity_floor(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for SessionSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSection")
            .field("app_name", &self.app_name)
            .field("recent_turn_limit", &self.recent_turn_limit)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl std::fmt::Debug for IndexSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSection")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("similarity_floor", &self.similarity_floor)
            .finish()
    }
}

impl CoreConfig {
    /// Load configuration from the default path (~/.waymark/config.toml),
    /// then apply environment variable overrides:
    /// - `WAYMARK_DAILY_CEILING` / `WAYMARK_WEEKLY_CEILING`
    /// - `WAYMARK_COST_OPTIMIZED`
    /// - `WAYMARK_SESSION_URL` / `WAYMARK_SESSION_API_KEY`
    /// - `WAYMARK_INDEX_URL` / `WAYMARK_INDEX_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(v) = std::env::var("WAYMARK_DAILY_CEILING") {
            config.budget.daily_call_ceiling = v.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYMARK_DAILY_CEILING is not a number: {v}"))
            })?;
        }
        if let Ok(v) = std::env::var("WAYMARK_WEEKLY_CEILING") {
            config.budget.weekly_call_ceiling = v.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYMARK_WEEKLY_CEILING is not a number: {v}"))
            })?;
        }
        if let Ok(v) = std::env::var("WAYMARK_COST_OPTIMIZED") {
            config.memory.cost_optimized_mode = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("WAYMARK_SESSION_URL") {
            config.session.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("WAYMARK_SESSION_API_KEY") {
            config.session.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("WAYMARK_INDEX_URL") {
            config.index.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("WAYMARK_INDEX_API_KEY") {
            config.index.api_key = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// The directory holding `config.toml`.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".waymark")
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.daily_call_ceiling == 0 && !self.memory.cost_optimized_mode {
            return Err(ConfigError::ValidationError(
                "daily_call_ceiling must be > 0 unless cost_optimized_mode is set".into(),
            ));
        }

        if self.budget.weekly_call_ceiling < self.budget.daily_call_ceiling {
            return Err(ConfigError::ValidationError(
                "weekly_call_ceiling must be >= daily_call_ceiling".into(),
            ));
        }

        if self.memory.merged_memory_cap == 0 {
            return Err(ConfigError::ValidationError(
                "merged_memory_cap must be > 0".into(),
            ));
        }

        if self.memory.max_corpora_per_query == 0 {
            return Err(ConfigError::ValidationError(
                "max_corpora_per_query must be > 0".into(),
            ));
        }

        if self.memory.semantic_query_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "semantic_query_top_k must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.index.similarity_floor) {
            return Err(ConfigError::ValidationError(
                "similarity_floor must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for onboarding docs).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Resolve the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget.daily_call_ceiling, 20);
        assert_eq!(config.memory.merged_memory_cap, 6);
        assert_eq!(config.session.app_name, "waymark");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = CoreConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CoreConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.budget.weekly_call_ceiling,
            config.budget.weekly_call_ceiling
        );
        assert_eq!(parsed.memory.semantic_query_top_k, 10);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = CoreConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().budget.daily_call_ceiling, 20);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[budget]\ndaily_call_ceiling = 2").unwrap();

        let config = CoreConfig::load_from(file.path()).unwrap();
        assert_eq!(config.budget.daily_call_ceiling, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.budget.weekly_call_ceiling, 100);
        assert_eq!(config.memory.merged_memory_cap, 6);
    }

    #[test]
    fn zero_daily_ceiling_rejected_unless_cost_optimized() {
        let mut config = CoreConfig::default();
        config.budget.daily_call_ceiling = 0;
        assert!(config.validate().is_err());

        config.memory.cost_optimized_mode = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn weekly_below_daily_rejected() {
        let mut config = CoreConfig::default();
        config.budget.daily_call_ceiling = 50;
        config.budget.weekly_call_ceiling = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn similarity_floor_out_of_range_rejected() {
        let mut config = CoreConfig::default();
        config.index.similarity_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_after_file_load() {
        // One test owns every WAYMARK_* variable: the environment is
        // process-global, so spreading these across parallel tests would race.
        let home = tempfile::tempdir().unwrap();
        let original_home = std::env::var_os("HOME");
        unsafe {
            std::env::set_var("HOME", home.path());
            std::env::set_var("WAYMARK_DAILY_CEILING", "3");
            std::env::set_var("WAYMARK_WEEKLY_CEILING", "30");
            std::env::set_var("WAYMARK_COST_OPTIMIZED", "true");
            std::env::set_var("WAYMARK_SESSION_URL", "http://sessions.internal:9000");
            std::env::set_var("WAYMARK_SESSION_API_KEY", "sk-session");
            std::env::set_var("WAYMARK_INDEX_URL", "http://index.internal:7000");
            std::env::set_var("WAYMARK_INDEX_API_KEY", "sk-index");
        }

        let config = CoreConfig::load().unwrap();
        assert_eq!(config.budget.daily_call_ceiling, 3);
        assert_eq!(config.budget.weekly_call_ceiling, 30);
        assert!(config.memory.cost_optimized_mode);
        assert_eq!(
            config.session.base_url.as_deref(),
            Some("http://sessions.internal:9000")
        );
        assert_eq!(config.session.api_key.as_deref(), Some("sk-session"));
        assert_eq!(
            config.index.base_url.as_deref(),
            Some("http://index.internal:7000")
        );
        assert_eq!(config.index.api_key.as_deref(), Some("sk-index"));

        // A ceiling that does not parse is a validation error, not a panic.
        unsafe { std::env::set_var("WAYMARK_DAILY_CEILING", "plenty") };
        let err = CoreConfig::load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("WAYMARK_DAILY_CEILING"));

        unsafe { std::env::set_var("WAYMARK_WEEKLY_CEILING", "several") };
        unsafe { std::env::set_var("WAYMARK_DAILY_CEILING", "3") };
        let err = CoreConfig::load().unwrap_err();
        assert!(err.to_string().contains("WAYMARK_WEEKLY_CEILING"));

        unsafe {
            for key in [
                "WAYMARK_DAILY_CEILING",
                "WAYMARK_WEEKLY_CEILING",
                "WAYMARK_COST_OPTIMIZED",
                "WAYMARK_SESSION_URL",
                "WAYMARK_SESSION_API_KEY",
                "WAYMARK_INDEX_URL",
                "WAYMARK_INDEX_API_KEY",
            ] {
                std::env::remove_var(key);
            }
            match original_home {
                Some(value) => std::env::set_var("HOME", value),
                None => std::env::remove_var("HOME"),
            }
        }
    }

    #[test]
    fn api_keys_redacted_in_debug() {
        let mut config = CoreConfig::default();
        config.index.api_key = Some("sk-secret-key".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = CoreConfig::default_toml();
        assert!(toml_str.contains("daily_call_ceiling"));
        assert!(toml_str.contains("merged_memory_cap"));
    }
}
