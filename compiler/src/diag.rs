// diag.rs: Unified diagnostics model
//
// Provides the shared diagnostic types used by the front end (parse and
// resolve) and by the pipeline when the engine reports a dimension error.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `E0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// Lex or parse error.
    pub const E0001: DiagCode = DiagCode("E0001");
    /// Unknown name.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// Alias declared twice.
    pub const E0101: DiagCode = DiagCode("E0101");
    /// Alias value is not a variable declaration.
    pub const E0102: DiagCode = DiagCode("E0102");
    /// Unknown function.
    pub const E0103: DiagCode = DiagCode("E0103");
    /// Wrong number or form of arguments.
    pub const E0104: DiagCode = DiagCode("E0104");
    /// Dimension contract violated.
    pub const E0200: DiagCode = DiagCode("E0200");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    /// Shorthand for an error carrying `code`.
    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with a `line:col` prefix computed from `source`.
    pub fn render(&self, origin: &str, source: &str) -> String {
        let (line, col) = line_col(source, self.span.start);
        let mut out = format!("{}:{}:{}: {}", origin, line, col, self);
        for rel in &self.related_spans {
            let (line, col) = line_col(source, rel.span.start);
            out.push_str(&format!("\n  {}:{}:{}: {}", origin, line, col, rel.label));
        }
        out
    }
}

/// 1-based line and column of byte `offset`.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset.min(source.len())).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.len() - prefix.rfind('\n').map_or(0, |i| i + 1) + 1;
    (line, col)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        use chumsky::span::Span as _;
        Span::new((), start..end)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, span(0, 1), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_hint() {
        let d = Diagnostic::error(codes::E0100, span(0, 1), "unknown name `z`")
            .with_hint("declare it with `-a z=Vi(0,3)`");
        assert_eq!(
            format!("{d}"),
            "error[E0100]: unknown name `z`\n  hint: declare it with `-a z=Vi(0,3)`"
        );
    }

    #[test]
    fn render_reports_line_and_column() {
        let source = "x = Vi(0,3)\nx = Vj(1,3)";
        let d = Diagnostic::error(codes::E0101, span(12, 13), "alias `x` declared twice")
            .with_related(span(0, 1), "first declared here");
        assert_eq!(
            d.render("aliases", source),
            "aliases:2:1: error[E0101]: alias `x` declared twice\n  aliases:1:1: first declared here"
        );
    }

    #[test]
    fn line_col_is_one_based() {
        assert_eq!(line_col("abc", 0), (1, 1));
        assert_eq!(line_col("ab\ncd", 4), (2, 2));
        assert_eq!(line_col("ab", 99), (1, 3));
    }
}
