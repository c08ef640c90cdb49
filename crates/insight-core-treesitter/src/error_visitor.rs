use insight_core::{
    Element, HighlightRecord, HighlightSink, HighlightType, HighlightVisitor, VisitError,
    VisitorRegistration,
};

/// Reports one error highlight per error node of the syntax tree.
///
/// `ERROR` nodes are described as syntax errors; `MISSING` nodes (zero-width, named after the
/// token the grammar expected) as the missing token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxErrorVisitor;

impl SyntaxErrorVisitor {
    /// Registration name used by [`SyntaxErrorVisitor::registration`].
    pub const NAME: &'static str = "tree-sitter-errors";

    /// A dumb-aware registration: syntax errors need no indexes.
    pub fn registration() -> VisitorRegistration {
        VisitorRegistration::new(Self::NAME, || SyntaxErrorVisitor).dumb_aware(true)
    }
}

impl HighlightVisitor for SyntaxErrorVisitor {
    fn visit(&mut self, element: Element<'_>, sink: &mut HighlightSink) -> Result<(), VisitError> {
        if !element.is_error() {
            return Ok(());
        }
        let description = match element.kind() {
            "ERROR" => "syntax error".to_string(),
            expected => format!("missing `{expected}`"),
        };
        sink.add(
            HighlightRecord::builder(HighlightType::ERROR)
                .range(element.range())?
                .description(description)?
                .build()?,
        );
        Ok(())
    }
}
