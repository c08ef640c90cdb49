//! Daemon configuration.
//!
//! [`DaemonConfig`] is plain data with serde support so hosts can keep it in a JSON settings
//! file. Every field has a default; a partial JSON object only overrides what it names.

use insight_core_lang::{LanguageConfig, LanguageRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while loading or validating a [`DaemonConfig`].
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    /// The JSON could not be parsed.
    Json(#[from] serde_json::Error),

    #[error("transfer_batch_size must be at least 1")]
    /// Zero transfer batch size.
    ZeroBatchSize,

    #[error("progress_chunk_percent must be within 1..=100, got {0}")]
    /// Percentage outside `1..=100`.
    InvalidPercent(u8),

    #[error("invalid TODO pattern '{pattern}': {message}")]
    /// A TODO pattern failed to compile.
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

/// Tunables of the highlighting daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Maximum number of records handed to the writer thread at once.
    pub transfer_batch_size: usize,
    /// Progress is reported in chunks of this percentage of the element count.
    pub progress_chunk_percent: u8,
    /// Upper bound of the random delay before restarting after inconsistent results.
    pub restart_jitter_ms: u64,
    /// Number of restarts after inconsistent results before giving up with `Canceled`.
    pub max_inconsistency_restarts: u32,
    /// Regular expressions recognized as TODO markers inside comments.
    pub todo_patterns: Vec<String>,
    /// Skip re-visiting the parents of an element that produced an ERROR record.
    pub suppress_parents_on_error: bool,
    /// Skip passes flagged `skip_when_errors` while the file is known to contain errors.
    pub skip_external_tools_on_error: bool,
    /// Languages whose roots are never analyzed.
    pub disabled_languages: Vec<String>,
    /// Extra or overriding language configurations.
    pub languages: Vec<LanguageConfig>,
    /// Files for which the host hides hints. Serialized as a sorted list of URLs.
    pub disabled_hint_files: BTreeSet<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            transfer_batch_size: 200,
            progress_chunk_percent: 1,
            restart_jitter_ms: 100,
            max_inconsistency_restarts: 3,
            todo_patterns: vec![r"\bTODO\b".to_string(), r"\bFIXME\b".to_string()],
            suppress_parents_on_error: true,
            skip_external_tools_on_error: true,
            disabled_languages: Vec::new(),
            languages: Vec::new(),
            disabled_hint_files: BTreeSet::new(),
        }
    }
}

impl DaemonConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges and TODO patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if !(1..=100).contains(&self.progress_chunk_percent) {
            return Err(ConfigError::InvalidPercent(self.progress_chunk_percent));
        }
        for pattern in &self.todo_patterns {
            regex::Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })?;
        }
        Ok(())
    }

    /// Built-in languages overridden by [`Self::languages`], with
    /// [`Self::disabled_languages`] switched off.
    pub fn language_registry(&self) -> LanguageRegistry {
        let mut registry = LanguageRegistry::with_builtins();
        for language in &self.languages {
            registry.register(language.clone());
        }
        for id in &self.disabled_languages {
            if !registry.disable(id) {
                registry.register(LanguageConfig::new(id.clone()).with_enabled(false));
            }
        }
        registry
    }

    /// Set the hint visibility of `url`. Returns `true` if the set changed.
    pub fn set_hints_disabled(&mut self, url: impl Into<String>, disabled: bool) -> bool {
        let url = url.into();
        if disabled {
            self.disabled_hint_files.insert(url)
        } else {
            self.disabled_hint_files.remove(&url)
        }
    }

    /// Whether hints are hidden for `url`.
    pub fn are_hints_disabled(&self, url: &str) -> bool {
        self.disabled_hint_files.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DaemonConfig::from_json_str(r#"{ "transfer_batch_size": 16 }"#).unwrap();
        assert_eq!(config.transfer_batch_size, 16);
        assert_eq!(config.progress_chunk_percent, 1);
        assert_eq!(config.todo_patterns.len(), 2);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            DaemonConfig::from_json_str(r#"{ "transfer_batch_size": 0 }"#),
            Err(ConfigError::ZeroBatchSize)
        ));
        assert!(matches!(
            DaemonConfig::from_json_str(r#"{ "progress_chunk_percent": 101 }"#),
            Err(ConfigError::InvalidPercent(101))
        ));
        assert!(matches!(
            DaemonConfig::from_json_str(r#"{ "todo_patterns": ["("] }"#),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(matches!(
            DaemonConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_hint_files_serialize_sorted() {
        let mut config = DaemonConfig::default();
        assert!(config.set_hints_disabled("file:///b.rs", true));
        assert!(config.set_hints_disabled("file:///a.rs", true));
        assert!(!config.set_hints_disabled("file:///a.rs", true));

        let value: serde_json::Value =
            serde_json::from_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(
            value["disabled_hint_files"],
            serde_json::json!(["file:///a.rs", "file:///b.rs"])
        );
        assert!(config.set_hints_disabled("file:///a.rs", false));
        assert!(!config.are_hints_disabled("file:///a.rs"));
    }

    #[test]
    fn test_language_registry_applies_overrides() {
        let config = DaemonConfig {
            disabled_languages: vec!["python".to_string(), "sql".to_string()],
            languages: vec![LanguageConfig::new("rust").with_highlight_parents_on_error(true)],
            ..DaemonConfig::default()
        };
        let registry = config.language_registry();
        assert!(!registry.is_enabled("python"));
        assert!(!registry.is_enabled("sql"));
        assert!(registry.highlight_parents_on_error("rust"));
        assert!(registry.is_enabled("text"));
    }
}
