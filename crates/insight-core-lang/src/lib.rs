#![warn(missing_docs)]
//! `insight-core-lang` - data-driven language configuration for `insight-core`.
//!
//! This crate stays lightweight and does **not** depend on any parser. It provides small
//! serializable structs that hosts use to tell the highlighting daemon how to treat a language:
//! which comment tokens start a TODO-searchable comment, whether parent elements are still
//! highlighted after a child reported an error, and whether the language is analyzed at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comment tokens/config for a given language.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentConfig {
    /// Line comment token (e.g. `//`, `#`).
    pub line: Option<String>,
    /// Block comment start token (e.g. `/*`).
    pub block_start: Option<String>,
    /// Block comment end token (e.g. `*/`).
    pub block_end: Option<String>,
}

impl CommentConfig {
    /// Create a config that supports only line comments.
    pub fn line(token: impl Into<String>) -> Self {
        Self {
            line: Some(token.into()),
            block_start: None,
            block_end: None,
        }
    }

    /// Create a config that supports only block comments.
    pub fn block(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            line: None,
            block_start: Some(start.into()),
            block_end: Some(end.into()),
        }
    }

    /// Create a config that supports both line and block comments.
    pub fn line_and_block(
        line: impl Into<String>,
        block_start: impl Into<String>,
        block_end: impl Into<String>,
    ) -> Self {
        Self {
            line: Some(line.into()),
            block_start: Some(block_start.into()),
            block_end: Some(block_end.into()),
        }
    }

    /// Returns `true` if a line comment token is configured.
    pub fn has_line(&self) -> bool {
        self.line.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Returns `true` if both block comment tokens are configured.
    pub fn has_block(&self) -> bool {
        self.block_start.as_deref().is_some_and(|s| !s.is_empty())
            && self.block_end.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Byte offset of the first comment opener in `line`, if any.
    ///
    /// Block comment continuation lines (` * TODO`) are not detected.
    pub fn comment_start_in(&self, line: &str) -> Option<usize> {
        let line_token = self.line.as_deref().filter(|t| !t.is_empty());
        let block_token = self.block_start.as_deref().filter(|t| !t.is_empty());
        [line_token, block_token]
            .into_iter()
            .flatten()
            .filter_map(|token| line.find(token))
            .min()
    }
}

/// Per-language analysis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language id (e.g. `"rust"`).
    pub id: String,
    /// File extensions (without the dot) mapped to this language.
    pub extensions: Vec<String>,
    /// Comment tokens.
    pub comments: CommentConfig,
    /// Keep highlighting parent elements even when a child element reported an error.
    pub highlight_parents_on_error: bool,
    /// Whether files of this language are analyzed at all.
    pub enabled: bool,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            extensions: Vec::new(),
            comments: CommentConfig::default(),
            highlight_parents_on_error: false,
            enabled: true,
        }
    }
}

impl LanguageConfig {
    /// Create an enabled language without comment tokens.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the comment tokens.
    pub fn with_comments(mut self, comments: CommentConfig) -> Self {
        self.comments = comments;
        self
    }

    /// Add a file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Keep highlighting parents after child errors.
    pub fn with_highlight_parents_on_error(mut self, enabled: bool) -> Self {
        self.highlight_parents_on_error = enabled;
        self
    }

    /// Enable/disable analysis.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Configuration for plain text: no comments, analyzed.
    pub fn plain_text() -> Self {
        Self::new("text").with_extension("txt")
    }

    /// Configuration for Rust sources.
    pub fn rust() -> Self {
        Self::new("rust")
            .with_extension("rs")
            .with_comments(CommentConfig::line_and_block("//", "/*", "*/"))
    }

    /// Configuration for Python sources.
    pub fn python() -> Self {
        Self::new("python")
            .with_extension("py")
            .with_comments(CommentConfig::line("#"))
    }
}

/// Set of known languages, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, LanguageConfig>,
}

impl LanguageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in configurations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LanguageConfig::plain_text());
        registry.register(LanguageConfig::rust());
        registry.register(LanguageConfig::python());
        registry
    }

    /// Register (or replace) a language.
    pub fn register(&mut self, config: LanguageConfig) {
        self.languages.insert(config.id.clone(), config);
    }

    /// Look up a language.
    pub fn get(&self, id: &str) -> Option<&LanguageConfig> {
        self.languages.get(id)
    }

    /// Language registered for a file extension.
    pub fn for_extension(&self, extension: &str) -> Option<&LanguageConfig> {
        self.languages
            .values()
            .find(|l| l.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)))
    }

    /// Whether `id` is analyzed. Unknown languages are analyzed with default settings.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.get(id).is_none_or(|l| l.enabled)
    }

    /// Whether parents are still highlighted after a child error in `id`.
    pub fn highlight_parents_on_error(&self, id: &str) -> bool {
        self.get(id).is_some_and(|l| l.highlight_parents_on_error)
    }

    /// Comment tokens of `id`.
    pub fn comments(&self, id: &str) -> Option<&CommentConfig> {
        self.get(id).map(|l| &l.comments)
    }

    /// Disable a language. Returns `false` if it is unknown.
    pub fn disable(&mut self, id: &str) -> bool {
        match self.languages.get_mut(id) {
            Some(config) => {
                config.enabled = false;
                true
            }
            None => false,
        }
    }

    /// All registered languages, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.languages.values()
    }
}

impl FromIterator<LanguageConfig> for LanguageRegistry {
    fn from_iter<T: IntoIterator<Item = LanguageConfig>>(iter: T) -> Self {
        let mut registry = Self::new();
        for config in iter {
            registry.register(config);
        }
        registry
    }
}
