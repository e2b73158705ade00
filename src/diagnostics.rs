use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::span::Span;

/// Infrastructure errors. Type-level problems are never reported through
/// this enum; they surface as [`Diagnostic`]s instead.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("syntax error: {msg}")]
    Syntax { msg: String, span: Span },

    #[error("constraint store invariant violated: {msg}")]
    InvariantViolation { msg: String },

    #[error("configuration error: {msg}")]
    Config { msg: String, path: PathBuf },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckError {
    pub fn syntax(msg: impl Into<String>, span: Span) -> Self {
        Self::Syntax { msg: msg.into(), span }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Stable diagnostic codes, reported to editors as the LSP `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    SyntaxError,
    UnknownTypeName,
    ArityMismatch,
    DuplicateDeclaration,
    AliasCycle,
    InheritanceCycle,
    UnknownSuperclass,
    InvalidInclude,
    IncompatibleOverride,
    MissingInterfaceMethod,
    UnsatisfiableConstraint,
    TypeMismatch,
    UndefinedVariable,
    UnknownMethod,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::SyntaxError => "sigil:syntax-error",
            DiagnosticCode::UnknownTypeName => "sigil:unknown-type-name",
            DiagnosticCode::ArityMismatch => "sigil:arity-mismatch",
            DiagnosticCode::DuplicateDeclaration => "sigil:duplicate-declaration",
            DiagnosticCode::AliasCycle => "sigil:alias-cycle",
            DiagnosticCode::InheritanceCycle => "sigil:inheritance-cycle",
            DiagnosticCode::UnknownSuperclass => "sigil:unknown-superclass",
            DiagnosticCode::InvalidInclude => "sigil:invalid-include",
            DiagnosticCode::IncompatibleOverride => "sigil:incompatible-override",
            DiagnosticCode::MissingInterfaceMethod => "sigil:missing-interface-method",
            DiagnosticCode::UnsatisfiableConstraint => "sigil:unsatisfiable-constraint",
            DiagnosticCode::TypeMismatch => "sigil:type-mismatch",
            DiagnosticCode::UndefinedVariable => "sigil:undefined-variable",
            DiagnosticCode::UnknownMethod => "sigil:unknown-method",
        }
    }
}

/// A source-ranged problem found while checking a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub span: Span,
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn error(
        path: impl Into<PathBuf>,
        span: Span,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            span,
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }
}

/// Render a diagnostic with ariadne for terminal output.
pub fn render_diagnostic(source: &str, path: &Path, diag: &Diagnostic) {
    use ariadne::{Label, Report, ReportKind, Source};

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };
    eprintln!("--> {}", path.display());
    Report::build(kind, (), diag.span.start)
        .with_code(diag.code.as_str())
        .with_message(&diag.message)
        .with_label(
            Label::new(diag.span.start..diag.span.end).with_message(&diag.message),
        )
        .finish()
        .eprint(Source::from(source))
        .ok();
}
