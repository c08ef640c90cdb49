//! Highlight records: the immutable output of highlighting passes.
//!
//! A [`HighlightRecord`] describes one diagnostic or syntax highlight over a byte range. It is
//! built once with [`HighlightRecordBuilder`] (each field may be set at most once) and then only
//! shared through `Arc`. The only state written after construction is the binding to the live
//! highlighter that materializes the record, which is set at most once by the reconciler.

use crate::document::RangeMarker;
use crate::error::BuildError;
use crate::markup::RangeHighlighter;
use crate::pass::PassId;
use crate::severity::Severity;
use crate::text_range::TextRange;
use bitflags::bitflags;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Semantic category of a highlight, driving its default severity and styling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HighlightType {
    id: Cow<'static, str>,
    default_severity: Severity,
    attributes_key: Cow<'static, str>,
    wrong_reference: bool,
    update_on_typing: bool,
}

impl HighlightType {
    /// Generic error.
    pub const ERROR: Self = Self::builtin("ERROR", Severity::ERROR, "ERRORS_ATTRIBUTES", false, true);
    /// Generic warning.
    pub const WARNING: Self =
        Self::builtin("WARNING", Severity::WARNING, "WARNING_ATTRIBUTES", false, true);
    /// Weak warning.
    pub const WEAK_WARNING: Self = Self::builtin(
        "WEAK_WARNING",
        Severity::WEAK_WARNING,
        "INFO_ATTRIBUTES",
        false,
        true,
    );
    /// Informational highlight.
    pub const INFORMATION: Self = Self::builtin(
        "INFORMATION",
        Severity::INFORMATION,
        "INFORMATION_ATTRIBUTES",
        false,
        false,
    );
    /// Unresolved reference; likely stale as soon as the user types over it.
    pub const WRONG_REFERENCE: Self = Self::builtin(
        "WRONG_REFERENCE",
        Severity::ERROR,
        "WRONG_REFERENCES_ATTRIBUTES",
        true,
        true,
    );
    /// TODO comment marker.
    pub const TODO: Self =
        Self::builtin("TODO", Severity::INFORMATION, "TODO_DEFAULT_ATTRIBUTES", false, false);
    /// Plain syntax coloring.
    pub const SYMBOL: Self = Self::builtin(
        "SYMBOL_TYPE_SEVERITY",
        Severity::INFORMATION,
        "DEFAULT_IDENTIFIER",
        false,
        false,
    );

    const fn builtin(
        id: &'static str,
        default_severity: Severity,
        attributes_key: &'static str,
        wrong_reference: bool,
        update_on_typing: bool,
    ) -> Self {
        Self {
            id: Cow::Borrowed(id),
            default_severity,
            attributes_key: Cow::Borrowed(attributes_key),
            wrong_reference,
            update_on_typing,
        }
    }

    /// Create a custom type.
    pub fn new(
        id: impl Into<String>,
        default_severity: Severity,
        attributes_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            default_severity,
            attributes_key: Cow::Owned(attributes_key.into()),
            wrong_reference: false,
            update_on_typing: true,
        }
    }

    /// Mark the type as a wrong-reference type.
    pub fn as_wrong_reference(mut self) -> Self {
        self.wrong_reference = true;
        self
    }

    /// Type id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Severity used when the builder does not set one.
    pub fn default_severity(&self) -> &Severity {
        &self.default_severity
    }

    /// Key of the text attributes used for rendering.
    pub fn attributes_key(&self) -> &str {
        &self.attributes_key
    }

    /// Returns `true` for unresolved-reference style types.
    pub fn is_wrong_reference(&self) -> bool {
        self.wrong_reference
    }

    /// Default of [`HighlightRecord::needs_update_on_typing`] for records of this type.
    pub fn updates_on_typing(&self) -> bool {
        self.update_on_typing
    }
}

/// Explicit rendering attributes overriding the type's attributes key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextAttributes {
    /// Foreground color (0xRRGGBB).
    pub foreground: Option<u32>,
    /// Background color (0xRRGGBB).
    pub background: Option<u32>,
    /// Effect (underline/box) color.
    pub effect_color: Option<u32>,
    /// Bold font.
    pub bold: bool,
    /// Italic font.
    pub italic: bool,
}

/// A gutter icon attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GutterMark {
    /// Icon id understood by the host.
    pub icon: String,
    /// Optional tooltip.
    pub tooltip: Option<String>,
}

/// A quick fix offered for a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuickFix {
    /// Display name.
    pub name: String,
    /// Host action id.
    pub action_id: String,
    /// Range where the fix is offered; defaults to the record's fix range.
    pub fix_range: Option<TextRange>,
}

impl QuickFix {
    /// Create a quick fix applicable over the record's fix range.
    pub fn new(name: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: action_id.into(),
            fix_range: None,
        }
    }

    /// Restrict/extend the fix to a specific range.
    pub fn with_range(mut self, range: TextRange) -> Self {
        self.fix_range = Some(range);
        self
    }
}

bitflags! {
    /// Boolean properties of a [`HighlightRecord`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HighlightFlags: u8 {
        /// The record's range is exactly the range of the element that produced it.
        const BIJECTIVE = 1 << 0;
        /// Rendered after the end of the line.
        const AFTER_END_OF_LINE = 1 << 1;
        /// Invalidated by the typing fast path when an edit touches it.
        const NEEDS_UPDATE_ON_TYPING = 1 << 2;
        /// Shown as a banner for the whole file rather than inline.
        const FILE_LEVEL_ANNOTATION = 1 << 3;
    }
}

/// Live objects a record got bound to during reconciliation.
#[derive(Debug)]
pub struct RecordBinding {
    /// The highlighter materializing the record.
    pub highlighter: Weak<RangeHighlighter>,
    /// Marker over the record's fix range, if it differs from the record range.
    pub fix_marker: Option<RangeMarker>,
    /// Markers over the quick fixes' own ranges, parallel to [`HighlightRecord::quick_fixes`].
    pub quick_fix_markers: Vec<Option<RangeMarker>>,
}

/// An immutable highlight.
pub struct HighlightRecord {
    range: TextRange,
    highlight_type: HighlightType,
    severity: Severity,
    description: Option<String>,
    tooltip: Option<String>,
    forced_attributes: Option<TextAttributes>,
    gutter: Option<GutterMark>,
    group: Option<PassId>,
    fix_range: TextRange,
    quick_fixes: Vec<QuickFix>,
    flags: HighlightFlags,
    binding: OnceLock<RecordBinding>,
}

impl HighlightRecord {
    /// Start building a record of the given type.
    pub fn builder(highlight_type: HighlightType) -> HighlightRecordBuilder {
        HighlightRecordBuilder::new(highlight_type)
    }

    /// Start offset.
    pub fn start(&self) -> usize {
        self.range.start()
    }

    /// End offset.
    pub fn end(&self) -> usize {
        self.range.end()
    }

    /// Highlighted range.
    pub fn range(&self) -> TextRange {
        self.range
    }

    /// Highlight type.
    pub fn highlight_type(&self) -> &HighlightType {
        &self.highlight_type
    }

    /// Severity.
    pub fn severity(&self) -> &Severity {
        &self.severity
    }

    /// Short description (problem text).
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tooltip; falls back to the description.
    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref().or(self.description.as_deref())
    }

    /// Explicit attributes, if any.
    pub fn forced_attributes(&self) -> Option<&TextAttributes> {
        self.forced_attributes.as_ref()
    }

    /// Gutter icon, if any.
    pub fn gutter(&self) -> Option<&GutterMark> {
        self.gutter.as_ref()
    }

    /// Pass that produced the record.
    pub fn group(&self) -> Option<PassId> {
        self.group
    }

    /// Range where quick fixes are offered (at least the record range).
    pub fn fix_range(&self) -> TextRange {
        self.fix_range
    }

    /// Attached quick fixes.
    pub fn quick_fixes(&self) -> &[QuickFix] {
        &self.quick_fixes
    }

    /// Raw flag set.
    pub fn flags(&self) -> HighlightFlags {
        self.flags
    }

    /// See [`HighlightFlags::BIJECTIVE`].
    pub fn is_bijective(&self) -> bool {
        self.flags.contains(HighlightFlags::BIJECTIVE)
    }

    /// See [`HighlightFlags::AFTER_END_OF_LINE`].
    pub fn is_after_end_of_line(&self) -> bool {
        self.flags.contains(HighlightFlags::AFTER_END_OF_LINE)
    }

    /// See [`HighlightFlags::NEEDS_UPDATE_ON_TYPING`].
    pub fn needs_update_on_typing(&self) -> bool {
        self.flags.contains(HighlightFlags::NEEDS_UPDATE_ON_TYPING)
    }

    /// See [`HighlightFlags::FILE_LEVEL_ANNOTATION`].
    pub fn is_file_level_annotation(&self) -> bool {
        self.flags.contains(HighlightFlags::FILE_LEVEL_ANNOTATION)
    }

    /// Records that must not become inline range highlighters.
    pub fn is_side_list_only(&self) -> bool {
        self.is_file_level_annotation() || self.gutter.is_some()
    }

    /// Attributes key used for rendering.
    pub fn attributes_key(&self) -> &str {
        self.highlight_type.attributes_key()
    }

    /// Returns the live highlighter this record is bound to, if it is still alive.
    pub fn highlighter(&self) -> Option<Arc<RangeHighlighter>> {
        self.binding.get().and_then(|b| b.highlighter.upgrade())
    }

    /// Live binding, if the record was materialized.
    pub fn binding(&self) -> Option<&RecordBinding> {
        self.binding.get()
    }

    /// Returns `true` once the record was bound to a highlighter.
    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Bind the record. Fails (returning the binding back) if it was already bound.
    pub(crate) fn bind(&self, binding: RecordBinding) -> Result<(), RecordBinding> {
        self.binding.set(binding)
    }

    /// Copy of the record without a binding.
    pub fn unbound_copy(&self) -> HighlightRecord {
        HighlightRecord {
            range: self.range,
            highlight_type: self.highlight_type.clone(),
            severity: self.severity.clone(),
            description: self.description.clone(),
            tooltip: self.tooltip.clone(),
            forced_attributes: self.forced_attributes,
            gutter: self.gutter.clone(),
            group: self.group,
            fix_range: self.fix_range,
            quick_fixes: self.quick_fixes.clone(),
            flags: self.flags,
            binding: OnceLock::new(),
        }
    }

    /// Copy of the record attributed to `group`, if it does not carry a group yet.
    pub(crate) fn in_group(self, group: PassId) -> HighlightRecord {
        if self.group.is_some() {
            return self;
        }
        HighlightRecord {
            group: Some(group),
            ..self
        }
    }

    /// Returns `true` if both records describe the same highlight (range, severity, type,
    /// description).
    pub fn same_highlight(&self, other: &HighlightRecord) -> bool {
        self.range == other.range
            && self.severity == other.severity
            && self.highlight_type == other.highlight_type
            && self.description == other.description
    }

    /// Returns `true` if everything visible about both records is equal.
    pub fn equals_by_value(&self, other: &HighlightRecord) -> bool {
        self.same_highlight(other)
            && self.tooltip == other.tooltip
            && self.forced_attributes == other.forced_attributes
            && self.gutter == other.gutter
            && self.group == other.group
            && self.fix_range == other.fix_range
            && self.quick_fixes == other.quick_fixes
            && self.flags == other.flags
    }
}

impl fmt::Debug for HighlightRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightRecord")
            .field("range", &self.range)
            .field("type", &self.highlight_type.id())
            .field("severity", &self.severity.name())
            .field("description", &self.description)
            .field("group", &self.group)
            .field("flags", &self.flags)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Builder for [`HighlightRecord`]. Every single-valued field may be set at most once.
#[derive(Debug, Clone)]
pub struct HighlightRecordBuilder {
    highlight_type: HighlightType,
    range: Option<TextRange>,
    severity: Option<Severity>,
    description: Option<String>,
    tooltip: Option<String>,
    forced_attributes: Option<TextAttributes>,
    gutter: Option<GutterMark>,
    group: Option<PassId>,
    fix_range: Option<TextRange>,
    quick_fixes: Vec<QuickFix>,
    flags: HighlightFlags,
    update_on_typing: Option<bool>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), BuildError> {
    if slot.is_some() {
        return Err(BuildError::FieldAlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

impl HighlightRecordBuilder {
    /// Create a builder for a record of `highlight_type`.
    pub fn new(highlight_type: HighlightType) -> Self {
        Self {
            highlight_type,
            range: None,
            severity: None,
            description: None,
            tooltip: None,
            forced_attributes: None,
            gutter: None,
            group: None,
            fix_range: None,
            quick_fixes: Vec::new(),
            flags: HighlightFlags::empty(),
            update_on_typing: None,
        }
    }

    /// Set the highlighted range.
    pub fn range(mut self, range: TextRange) -> Result<Self, BuildError> {
        set_once(&mut self.range, range, "range")?;
        Ok(self)
    }

    /// Set the highlighted range from raw offsets.
    pub fn range_at(self, start: usize, end: usize) -> Result<Self, BuildError> {
        let range = TextRange::try_new(start, end).ok_or(BuildError::InvalidRange { start, end })?;
        self.range(range)
    }

    /// Override the type's default severity.
    pub fn severity(mut self, severity: Severity) -> Result<Self, BuildError> {
        set_once(&mut self.severity, severity, "severity")?;
        Ok(self)
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Result<Self, BuildError> {
        set_once(&mut self.description, description.into(), "description")?;
        Ok(self)
    }

    /// Set the tooltip.
    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Result<Self, BuildError> {
        set_once(&mut self.tooltip, tooltip.into(), "tooltip")?;
        Ok(self)
    }

    /// Force explicit text attributes.
    pub fn forced_attributes(mut self, attributes: TextAttributes) -> Result<Self, BuildError> {
        set_once(&mut self.forced_attributes, attributes, "forced_attributes")?;
        Ok(self)
    }

    /// Attach a gutter icon. Records with a gutter icon are routed to the file-level side list.
    pub fn gutter(mut self, gutter: GutterMark) -> Result<Self, BuildError> {
        set_once(&mut self.gutter, gutter, "gutter")?;
        Ok(self)
    }

    /// Attribute the record to a pass. Normally filled in by the pass itself.
    pub fn group(mut self, group: PassId) -> Result<Self, BuildError> {
        set_once(&mut self.group, group, "group")?;
        Ok(self)
    }

    /// Set the range where quick fixes are offered.
    pub fn fix_range(mut self, range: TextRange) -> Result<Self, BuildError> {
        set_once(&mut self.fix_range, range, "fix_range")?;
        Ok(self)
    }

    /// Explicitly set whether the typing fast path invalidates this record.
    pub fn needs_update_on_typing(mut self, value: bool) -> Result<Self, BuildError> {
        set_once(&mut self.update_on_typing, value, "needs_update_on_typing")?;
        Ok(self)
    }

    /// Attach a quick fix.
    pub fn quick_fix(mut self, fix: QuickFix) -> Self {
        self.quick_fixes.push(fix);
        self
    }

    /// Mark the record as bijective with the element that produced it.
    pub fn bijective(mut self) -> Self {
        self.flags |= HighlightFlags::BIJECTIVE;
        self
    }

    /// Render the record after the end of the line.
    pub fn after_end_of_line(mut self) -> Self {
        self.flags |= HighlightFlags::AFTER_END_OF_LINE;
        self
    }

    /// Show the record as a file-level annotation.
    pub fn file_level_annotation(mut self) -> Self {
        self.flags |= HighlightFlags::FILE_LEVEL_ANNOTATION;
        self
    }

    /// Build the record.
    pub fn build(self) -> Result<HighlightRecord, BuildError> {
        let range = self.range.ok_or(BuildError::MissingField("range"))?;
        let mut flags = self.flags;
        if self
            .update_on_typing
            .unwrap_or(self.highlight_type.updates_on_typing())
        {
            flags |= HighlightFlags::NEEDS_UPDATE_ON_TYPING;
        }
        let severity = self
            .severity
            .unwrap_or_else(|| self.highlight_type.default_severity().clone());
        let fix_range = self.fix_range.map_or(range, |r| r.union(range));

        Ok(HighlightRecord {
            range,
            highlight_type: self.highlight_type,
            severity,
            description: self.description,
            tooltip: self.tooltip,
            forced_attributes: self.forced_attributes,
            gutter: self.gutter,
            group: self.group,
            fix_range,
            quick_fixes: self.quick_fixes,
            flags,
            binding: OnceLock::new(),
        })
    }

    /// Build the record and wrap it for sharing.
    pub fn create(self) -> Result<Arc<HighlightRecord>, BuildError> {
        self.build().map(Arc::new)
    }
}
