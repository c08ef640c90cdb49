//! TODO comment scanning.
//!
//! A lightweight line scan run by passes that opt into it. A line produces a TODO record when a
//! pattern matches after the line's first comment opener; the record spans from the match to the
//! end of the line.

use crate::config::ConfigError;
use crate::document::DocumentSnapshot;
use crate::error::BuildError;
use crate::highlight_record::{HighlightRecord, HighlightType};
use crate::text_range::TextRange;
use insight_core_lang::CommentConfig;
use regex::Regex;

/// TODO records of one scan, bucketed by the priority range.
#[derive(Debug, Default)]
pub struct TodoScan {
    /// Records fully inside the priority range.
    pub inside: Vec<HighlightRecord>,
    /// Every other record.
    pub outside: Vec<HighlightRecord>,
}

impl TodoScan {
    /// Total number of records.
    pub fn len(&self) -> usize {
        self.inside.len() + self.outside.len()
    }

    /// Returns `true` if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.inside.is_empty() && self.outside.is_empty()
    }
}

/// Compiled TODO patterns.
#[derive(Debug, Clone)]
pub struct TodoScanner {
    patterns: Vec<Regex>,
}

impl TodoScanner {
    /// Compile `patterns`.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|err| ConfigError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns `true` if no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Scan the lines touched by `restrict`. Only records lying within `restrict` are kept.
    pub fn scan(
        &self,
        snapshot: &DocumentSnapshot,
        comments: &CommentConfig,
        restrict: TextRange,
        priority: TextRange,
    ) -> Result<TodoScan, BuildError> {
        let mut scan = TodoScan::default();
        if self.patterns.is_empty() || !(comments.has_line() || comments.has_block()) {
            return Ok(scan);
        }
        for (line_start, line) in snapshot.lines_in(restrict) {
            let Some(comment_at) = comments.comment_start_in(&line) else {
                continue;
            };
            let comment = &line[comment_at..];
            let Some(found) = self
                .patterns
                .iter()
                .filter_map(|re| re.find(comment))
                .min_by_key(|m| m.start())
            else {
                continue;
            };

            let start = line_start + comment_at + found.start();
            let range = TextRange::new(start, line_start + line.len());
            if !restrict.contains_range(range) {
                continue;
            }
            let text = comment[found.start()..].trim_end();
            let record = HighlightRecord::builder(HighlightType::TODO)
                .range(range)?
                .description(text)?
                .build()?;
            if priority.contains_range(range) {
                scan.inside.push(record);
            } else {
                scan.outside.push(record);
            }
        }
        Ok(scan)
    }
}
