// diag.rs — Diagnostics model and the fatal IR error type
//
// Provides the diagnostic record shared by the builder, inference rules,
// passes and the well-formedness checker, plus `IrError`, the single error
// type that aborts construction or a pass.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::expr::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code is never reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
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

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain, e.g. the pass that was running when an
/// inference rule failed.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub span: Option<Span>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related spans, or causes.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            span,
        });
        self
    }
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

// ── Codes ────────────────────────────────────────────────────────────────

pub mod codes {
    use super::DiagCode;

    // Scope discipline (E01xx)
    pub const E0100: DiagCode = DiagCode("E0100"); // frame misuse / emit after end
    pub const E0101: DiagCode = DiagCode("E0101"); // unbound or out-of-scope var
    pub const E0102: DiagCode = DiagCode("E0102"); // exit with unmet obligations
    pub const E0103: DiagCode = DiagCode("E0103"); // duplicate var or function name

    // Struct-info inference (E02xx)
    pub const E0200: DiagCode = DiagCode("E0200"); // arity mismatch
    pub const E0201: DiagCode = DiagCode("E0201"); // wrong struct-info category
    pub const E0202: DiagCode = DiagCode("E0202"); // axis out of range
    pub const E0203: DiagCode = DiagCode("E0203"); // duplicate axis
    pub const E0204: DiagCode = DiagCode("E0204"); // irreconcilable shapes
    pub const E0205: DiagCode = DiagCode("E0205"); // irreconcilable dtypes
    pub const E0206: DiagCode = DiagCode("E0206"); // missing or malformed attribute
    pub const E0207: DiagCode = DiagCode("E0207"); // unregistered operator

    // Well-formedness (E03xx / W03xx)
    pub const E0300: DiagCode = DiagCode("E0300"); // var used outside its scope or rebound
    pub const W0300: DiagCode = DiagCode("W0300"); // binding value lacks struct info
}

// ── Error kinds ──────────────────────────────────────────────────────────

/// Category of a fatal IR error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Frame or visibility discipline violated.
    Scope,
    /// Wrong number of operator arguments.
    Arity,
    /// Argument struct info of the wrong category.
    Kind,
    /// Axis outside `[-ndim, ndim)`.
    Range,
    /// Two axes normalize to the same value.
    DuplicateAxis,
    /// Literal dims that cannot be reconciled.
    ShapeConflict,
    /// Known element types that cannot be reconciled.
    DtypeConflict,
    /// Operator attribute missing or of the wrong type.
    Attr,
    /// Call to an operator with no registered inference rule.
    UnknownOp,
}

impl ErrorKind {
    /// Default diagnostic code for this kind.
    pub fn code(self) -> DiagCode {
        match self {
            ErrorKind::Scope => codes::E0100,
            ErrorKind::Arity => codes::E0200,
            ErrorKind::Kind => codes::E0201,
            ErrorKind::Range => codes::E0202,
            ErrorKind::DuplicateAxis => codes::E0203,
            ErrorKind::ShapeConflict => codes::E0204,
            ErrorKind::DtypeConflict => codes::E0205,
            ErrorKind::Attr => codes::E0206,
            ErrorKind::UnknownOp => codes::E0207,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Scope => "ScopeError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::Kind => "KindError",
            ErrorKind::Range => "RangeError",
            ErrorKind::DuplicateAxis => "DuplicateAxisError",
            ErrorKind::ShapeConflict => "ShapeConflictError",
            ErrorKind::DtypeConflict => "DtypeConflictError",
            ErrorKind::Attr => "AttrError",
            ErrorKind::UnknownOp => "UnknownOpError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── IrError ──────────────────────────────────────────────────────────────

/// Fatal error raised by the builder, an inference rule, or a pass.
///
/// Every `IrError` aborts the operation that produced it; callers never
/// observe partially built IR.
#[derive(Debug, Clone)]
pub struct IrError {
    pub kind: ErrorKind,
    pub diagnostic: Diagnostic,
}

impl IrError {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        IrError {
            kind,
            diagnostic: Diagnostic::new(DiagLevel::Error, span, message).with_code(kind.code()),
        }
    }

    pub fn scope(span: Span, message: impl Into<String>) -> Self {
        IrError::new(ErrorKind::Scope, span, message)
    }

    /// Override the default code for the kind.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.diagnostic.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.diagnostic = self.diagnostic.with_hint(hint);
        self
    }

    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.diagnostic = self.diagnostic.with_cause(message, span);
        self
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }

    pub fn span(&self) -> Span {
        self.diagnostic.span
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic)
    }
}

impl std::error::Error for IrError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "block already ended");
        assert_eq!(format!("{d}"), "error: block already ended");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::new(DiagLevel::Warning, dummy_span(), "binding never used")
            .with_code(DiagCode("W0300"));
        assert_eq!(format!("{d}"), "warning[W0300]: binding never used");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "dtype mismatch")
            .with_code(DiagCode("E0205"))
            .with_hint("insert an astype call")
            .with_related(dummy_span(), "lhs bound here")
            .with_cause("while running to_anf", Some(dummy_span()));

        assert_eq!(d.code, Some(DiagCode("E0205")));
        assert_eq!(d.hint.as_deref(), Some("insert an astype call"));
        assert_eq!(d.related_spans.len(), 1);
        assert_eq!(d.cause_chain.len(), 1);
    }

    #[test]
    fn ir_error_carries_kind_code() {
        let e = IrError::new(ErrorKind::DuplicateAxis, dummy_span(), "axes repeat");
        assert_eq!(e.diagnostic.code, Some(codes::E0203));
        assert_eq!(e.to_string(), "error[E0203]: axes repeat");
        assert_eq!(e.kind.name(), "DuplicateAxisError");
    }

    #[test]
    fn ir_error_hint_is_rendered() {
        let e = IrError::scope(dummy_span(), "cannot emit").with_hint("open a block first");
        assert_eq!(
            e.to_string(),
            "error[E0100]: cannot emit\n  hint: open a block first"
        );
    }
}
