//! `insight-core-highlight-simple` - Simple (regex-based) highlight visitors for `insight-core`.
//!
//! This crate is intended for lightweight formats (JSON/INI/etc.) where a real grammar is
//! unnecessary. Rules run against the text of syntax elements and produce
//! [`HighlightRecord`]s; [`RegexVisitor`] plugs a rule set into a pass.

use insight_core::{
    BuildError, Element, HighlightRecord, HighlightSink, HighlightType, HighlightVisitor, Severity,
    TextRange, VisitError, VisitorRegistration,
};
use regex::Regex;
use std::sync::Arc;

/// A single regex highlighting rule.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    highlight_type: HighlightType,
    severity: Option<Severity>,
    capture_group: Option<usize>,
    kind: Option<String>,
    description: Option<String>,
}

impl RegexRule {
    pub fn new(pattern: &str, highlight_type: HighlightType) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            highlight_type,
            severity: None,
            capture_group: None,
            kind: None,
            description: None,
        })
    }

    /// Highlight only a capture group of each match.
    ///
    /// Example (INI key):
    /// - pattern: `^\\s*([^=\\s]+)\\s*=`
    /// - capture_group: `1` (the key)
    pub fn with_capture_group(mut self, group: usize) -> Self {
        self.capture_group = Some(group);
        self
    }

    /// Override the severity of the highlight type.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Only run on elements of `kind`. Rules without a kind run on leaf elements.
    pub fn for_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn highlight_type(&self) -> &HighlightType {
        &self.highlight_type
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    fn applies_to(&self, element: &Element<'_>) -> bool {
        match &self.kind {
            Some(kind) => element.kind() == kind,
            None => element.children().next().is_none(),
        }
    }

    fn matches(&self, text: &str) -> Vec<(usize, usize)> {
        match self.capture_group {
            Some(group) => self
                .regex
                .captures_iter(text)
                .filter_map(|caps| caps.get(group))
                .map(|m| (m.start(), m.end()))
                .collect(),
            None => self
                .regex
                .find_iter(text)
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }

    fn record(&self, range: TextRange) -> Result<HighlightRecord, BuildError> {
        let mut builder = HighlightRecord::builder(self.highlight_type.clone()).range(range)?;
        if let Some(severity) = &self.severity {
            builder = builder.severity(severity.clone())?;
        }
        if let Some(description) = &self.description {
            builder = builder.description(description.clone())?;
        }
        builder.build()
    }
}

/// A simple regex-based rule set.
///
/// Designed for simple formats (JSON/INI/etc.). It is *not* intended to be a full parser.
#[derive(Debug, Clone)]
pub struct RegexHighlighter {
    rules: Vec<RegexRule>,
}

impl RegexHighlighter {
    pub fn new(rules: Vec<RegexRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }

    /// Assign `kind` to every rule that has none.
    pub fn for_kind(mut self, kind: &str) -> Self {
        for rule in &mut self.rules {
            if rule.kind.is_none() {
                rule.kind = Some(kind.to_string());
            }
        }
        self
    }

    /// Run every rule over `text`, which starts at byte `offset` of the document. Element kinds
    /// are not consulted.
    pub fn highlight_text(
        &self,
        text: &str,
        offset: usize,
    ) -> Result<Vec<HighlightRecord>, BuildError> {
        let mut records = Vec::new();
        for rule in &self.rules {
            push_matches(rule, text, offset, &mut records)?;
        }
        Ok(records)
    }

    /// Run the rules applying to `element` over its text.
    pub fn highlight(&self, element: Element<'_>) -> Result<Vec<HighlightRecord>, BuildError> {
        let mut records = Vec::new();
        let mut text = None;
        for rule in self.rules.iter().filter(|r| r.applies_to(&element)) {
            let text = text.get_or_insert_with(|| element.text());
            push_matches(rule, text, element.range().start(), &mut records)?;
        }
        Ok(records)
    }

    /// A small default JSON grammar (strings, numbers, booleans, null).
    pub fn json_default(types: SimpleJsonTypes) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            // JSON string (single-line, handles escapes)
            RegexRule::new(r#""(?:\\.|[^"\\])*""#, types.string)?,
            // JSON number
            RegexRule::new(
                r#"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?"#,
                types.number,
            )?,
            // JSON boolean / null
            RegexRule::new(r#"\b(?:true|false)\b"#, types.boolean)?,
            RegexRule::new(r#"\bnull\b"#, types.null)?,
        ]))
    }

    /// A small default INI grammar (section, key, comment).
    pub fn ini_default(types: SimpleIniTypes) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            // Section header: [section]
            RegexRule::new(r#"^\s*\[([^\]]+)\]\s*$"#, types.section)?.with_capture_group(1),
            // Key: key = value
            RegexRule::new(r#"^\s*([^=\s]+)\s*="#, types.key)?.with_capture_group(1),
            // Comment: ;... or #...
            RegexRule::new(r#"^\s*[;#].*$"#, types.comment)?,
        ]))
    }
}

/// A [`HighlightVisitor`] applying a shared [`RegexHighlighter`].
#[derive(Debug, Clone)]
pub struct RegexVisitor {
    highlighter: Arc<RegexHighlighter>,
}

impl RegexVisitor {
    pub fn new(highlighter: Arc<RegexHighlighter>) -> Self {
        Self { highlighter }
    }

    pub fn highlighter(&self) -> &RegexHighlighter {
        &self.highlighter
    }

    /// A dumb-aware registration creating visitors over `highlighter`.
    pub fn registration(
        name: impl Into<String>,
        highlighter: Arc<RegexHighlighter>,
    ) -> VisitorRegistration {
        VisitorRegistration::new(name, move || RegexVisitor::new(Arc::clone(&highlighter)))
            .dumb_aware(true)
    }
}

impl HighlightVisitor for RegexVisitor {
    fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
        for record in self.highlighter.highlight(element)? {
            sink.add(record);
        }
        Ok(())
    }
}

/// Highlight types used by [`RegexHighlighter::json_default`].
#[derive(Debug, Clone)]
pub struct SimpleJsonTypes {
    pub string: HighlightType,
    pub number: HighlightType,
    pub boolean: HighlightType,
    pub null: HighlightType,
}

impl Default for SimpleJsonTypes {
    fn default() -> Self {
        Self {
            string: simple_type("JSON_STRING"),
            number: simple_type("JSON_NUMBER"),
            boolean: simple_type("JSON_BOOLEAN"),
            null: simple_type("JSON_NULL"),
        }
    }
}

/// Highlight types used by [`RegexHighlighter::ini_default`].
#[derive(Debug, Clone)]
pub struct SimpleIniTypes {
    pub section: HighlightType,
    pub key: HighlightType,
    pub comment: HighlightType,
}

impl Default for SimpleIniTypes {
    fn default() -> Self {
        Self {
            section: simple_type("INI_SECTION"),
            key: simple_type("INI_KEY"),
            comment: simple_type("INI_COMMENT"),
        }
    }
}

/// Informational syntax type whose attributes key equals its id.
///
/// These are only identifiers. The host theme is expected to map them to actual colors.
pub fn simple_type(id: &str) -> HighlightType {
    HighlightType::new(id, Severity::INFORMATION, id)
}

fn push_matches(
    rule: &RegexRule,
    text: &str,
    offset: usize,
    out: &mut Vec<HighlightRecord>,
) -> Result<(), BuildError> {
    for (start, end) in rule.matches(text) {
        if start >= end {
            continue;
        }
        out.push(rule.record(TextRange::new(offset + start, offset + end))?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_highlighter_json_strings() {
        let text = r#"{ "key": "值", "n": 12, "ok": true, "x": null }"#;
        let types = SimpleJsonTypes::default();
        let highlighter = RegexHighlighter::json_default(types.clone()).unwrap();
        let records = highlighter.highlight_text(text, 0).unwrap();

        // Expect at least the 4 quoted strings and a number/keyword.
        assert!(records.len() >= 6);
        assert!(records.iter().any(|r| r.highlight_type() == &types.string));
        assert!(records.iter().any(|r| r.highlight_type() == &types.number));
        // Byte offsets: the multi-byte value spans 5 bytes including its quotes.
        let value = records
            .iter()
            .find(|r| r.range().start() == 9)
            .unwrap();
        assert_eq!(value.range(), TextRange::new(9, 14));
    }

    #[test]
    fn test_regex_highlighter_ini_capture_groups() {
        let types = SimpleIniTypes::default();
        let highlighter = RegexHighlighter::ini_default(types.clone()).unwrap();

        let section = highlighter.highlight_text("[core]", 100).unwrap();
        assert_eq!(section.len(), 1);
        assert_eq!(section[0].range(), TextRange::new(101, 105));
        assert_eq!(section[0].highlight_type(), &types.section);

        let key = highlighter.highlight_text("name = insight", 0).unwrap();
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].range(), TextRange::new(0, 4));

        let comment = highlighter.highlight_text(";comment", 0).unwrap();
        assert_eq!(comment[0].highlight_type(), &types.comment);
    }

    #[test]
    fn test_rule_options_shape_records() {
        let rule = RegexRule::new(r"\bunsafe\b", HighlightType::WARNING)
            .unwrap()
            .with_severity(Severity::ERROR)
            .with_description("unsafe block")
            .for_kind("WORD");
        assert_eq!(rule.kind(), Some("WORD"));

        let records = RegexHighlighter::new(vec![rule])
            .highlight_text("fn f() { unsafe {} }", 0)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity(), &Severity::ERROR);
        assert_eq!(records[0].description(), Some("unsafe block"));
        assert_eq!(records[0].range(), TextRange::new(9, 15));
    }
}
