//! Pascal Compiler Diagnostics
//!
//! This crate defines the structured diagnostic record shared by every
//! compiler phase, the closed taxonomy of diagnostic kinds with their
//! message templates, and the parser's error type.

use std::collections::BTreeMap;
use std::fmt;

use colored::Colorize;
use serde::Serialize;
use thiserror::Error;
use tokens::Span;

/// Compiler phase that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticSource {
    #[serde(rename = "LEXER")]
    Lexer,
    #[serde(rename = "SYNANAL")]
    Parser,
    #[serde(rename = "SEMANAL")]
    Semantic,
    #[serde(rename = "OPTIM")]
    Optimizer,
    #[serde(rename = "CODEGEN")]
    Codegen,
}

impl DiagnosticSource {
    /// Short tag shown when source emission is enabled
    pub fn tag(&self) -> &'static str {
        match self {
            DiagnosticSource::Lexer => "<LEX>",
            DiagnosticSource::Parser => "<SYN>",
            DiagnosticSource::Semantic => "<SEM>",
            DiagnosticSource::Optimizer => "<OPT>",
            DiagnosticSource::Codegen => "<GEN>",
        }
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ErrorSeverity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl ErrorSeverity {
    pub fn mark(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARN",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    /// Error and critical diagnostics invalidate a compilation
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorSeverity::Error | ErrorSeverity::Critical)
    }
}

/// Closed taxonomy of diagnostic types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    // Lexical
    UnexpectedCharacter,
    NonterminatedComment,
    MismatchedCommentDelimiter,
    // Syntactic
    UnexpectedEof,
    UnexpectedToken,
    InvalidLabel,
    InvalidType,
    UnterminatedType,
    MalterminatedType,
    RecordNoFixedPart,
    InvalidVariable,
    // Semantic
    UnknownDirective,
    UndeclaredLabel,
    DuplicateLabel,
    UnusedLabel,
    UndeclaredConst,
    DuplicateConst,
    UnusedConst,
    UndeclaredType,
    DuplicateType,
    UnusedType,
    ZeroDiv,
    NanResult,
    InfinityResult,
    UndefinedReference,
    TypeMismatch,
    DuplicateIdentifier,
    UndeclaredVariable,
    IncompatibleVariable,
    UndeclaredActivatable,
    ArgumentCountMismatch,
    RangeViolation,
    // Code generation
    UnsupportedConstruct,
}

impl DiagnosticKind {
    /// Upper-snake type tag used in raw records
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::UnexpectedCharacter => "UNEXPECTED_CHARACTER",
            DiagnosticKind::NonterminatedComment => "NONTERMINATED_COMMENT",
            DiagnosticKind::MismatchedCommentDelimiter => "MISMATCHED_COMMENT_DELIMITER",
            DiagnosticKind::UnexpectedEof => "UNEXPECTED_EOF",
            DiagnosticKind::UnexpectedToken => "UNEXPECTED_TOKEN",
            DiagnosticKind::InvalidLabel => "INVALID_LABEL",
            DiagnosticKind::InvalidType => "INVALID_TYPE",
            DiagnosticKind::UnterminatedType => "UNTERMINATED_TYPE",
            DiagnosticKind::MalterminatedType => "MALTERMINATED_TYPE",
            DiagnosticKind::RecordNoFixedPart => "RECORD_NO_FIXED_PART",
            DiagnosticKind::InvalidVariable => "INVALID_VARIABLE",
            DiagnosticKind::UnknownDirective => "UNKNOWN_DIRECTIVE",
            DiagnosticKind::UndeclaredLabel => "UNDECLARED_LABEL",
            DiagnosticKind::DuplicateLabel => "DUPLICATE_LABEL",
            DiagnosticKind::UnusedLabel => "UNUSED_LABEL",
            DiagnosticKind::UndeclaredConst => "UNDECLARED_CONST",
            DiagnosticKind::DuplicateConst => "DUPLICATE_CONST",
            DiagnosticKind::UnusedConst => "UNUSED_CONST",
            DiagnosticKind::UndeclaredType => "UNDECLARED_TYPE",
            DiagnosticKind::DuplicateType => "DUPLICATE_TYPE",
            DiagnosticKind::UnusedType => "UNUSED_TYPE",
            DiagnosticKind::ZeroDiv => "ZERO_DIV",
            DiagnosticKind::NanResult => "NAN_RESULT",
            DiagnosticKind::InfinityResult => "INFINITY_RESULT",
            DiagnosticKind::UndefinedReference => "UNDEFINED_REFERENCE",
            DiagnosticKind::TypeMismatch => "TYPE_MISMATCH",
            DiagnosticKind::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            DiagnosticKind::UndeclaredVariable => "UNDECLARED_VARIABLE",
            DiagnosticKind::IncompatibleVariable => "INCOMPATIBLE_VARIABLE",
            DiagnosticKind::UndeclaredActivatable => "UNDECLARED_ACTIVATABLE",
            DiagnosticKind::ArgumentCountMismatch => "ARGUMENT_COUNT_MISMATCH",
            DiagnosticKind::RangeViolation => "RANGE_VIOLATION",
            DiagnosticKind::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
        }
    }

    /// Message template; `{name}` placeholders are substituted from the diagnostic's args
    pub fn template(&self) -> &'static str {
        match self {
            DiagnosticKind::UnexpectedCharacter => "Unexpected character: {character}",
            DiagnosticKind::NonterminatedComment => "Non-terminated comment",
            DiagnosticKind::MismatchedCommentDelimiter => {
                "Mismatched comment delimiter. Expected '{expected}', got '{actual}'."
            }
            DiagnosticKind::UnexpectedEof => "Unexpected End-Of-File.",
            DiagnosticKind::UnexpectedToken => "Unexpected token: {token}",
            DiagnosticKind::InvalidLabel => "Invalid label: {value}",
            DiagnosticKind::InvalidType => "Invalid type: {value}",
            DiagnosticKind::UnterminatedType => "Unterminated type.",
            DiagnosticKind::MalterminatedType => {
                "Type terminated with unknown separator. Expected '{expected}', got '{actual}'."
            }
            DiagnosticKind::RecordNoFixedPart => "Record must have a fixed part before a variant part.",
            DiagnosticKind::InvalidVariable => "Invalid variable: {value}",
            DiagnosticKind::UnknownDirective => "Unknown directive: {value}",
            DiagnosticKind::UndeclaredLabel => "Label not declared: {value}.",
            DiagnosticKind::DuplicateLabel => "Label already declared: {value}.",
            DiagnosticKind::UnusedLabel => "Label not used: {value}.",
            DiagnosticKind::UndeclaredConst => "Constant not declared: {value}.",
            DiagnosticKind::DuplicateConst => "Constant already declared: {value}.",
            DiagnosticKind::UnusedConst => "Constant not used: {value}.",
            DiagnosticKind::UndeclaredType => "Type not declared: {value}.",
            DiagnosticKind::DuplicateType => "Type already declared: {value}.",
            DiagnosticKind::UnusedType => "Type not used: {value}.",
            DiagnosticKind::ZeroDiv => "Division by zero.",
            DiagnosticKind::NanResult => "Operation resulted in NaN value.",
            DiagnosticKind::InfinityResult => "Operation resulted in Infinity value.",
            DiagnosticKind::UndefinedReference => "Undefined reference: {value}.",
            DiagnosticKind::TypeMismatch => "Type Mismatch. Expected {aType}, got {bType}.",
            DiagnosticKind::DuplicateIdentifier => "Identifier already declared: {value}.",
            DiagnosticKind::UndeclaredVariable => "Variable not declared: {value}.",
            DiagnosticKind::IncompatibleVariable => {
                "Incompatible variable. Expected '{expected}', got '{actual}'."
            }
            DiagnosticKind::UndeclaredActivatable => "Procedure / Function not declared: {value}.",
            DiagnosticKind::ArgumentCountMismatch => {
                "Wrong number of arguments for {value}. Expected {expected}, got {actual}."
            }
            DiagnosticKind::RangeViolation => "Value {value} out of range {start}..{end}.",
            DiagnosticKind::UnsupportedConstruct => "Unsupported construct: {value}.",
        }
    }

    /// Phase that owns this kind
    pub fn source(&self) -> DiagnosticSource {
        use DiagnosticKind::*;
        match self {
            UnexpectedCharacter | NonterminatedComment | MismatchedCommentDelimiter => DiagnosticSource::Lexer,
            UnexpectedEof | UnexpectedToken | InvalidLabel | InvalidType | UnterminatedType
            | MalterminatedType | RecordNoFixedPart | InvalidVariable => DiagnosticSource::Parser,
            UnsupportedConstruct => DiagnosticSource::Codegen,
            _ => DiagnosticSource::Semantic,
        }
    }

    /// Default severity of this kind
    pub fn severity(&self) -> ErrorSeverity {
        use DiagnosticKind::*;
        match self {
            MismatchedCommentDelimiter | UnusedLabel | UnusedConst | UnusedType => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Substitute `{name}` placeholders in a template
///
/// Unknown placeholders are left verbatim.
pub fn format_template(template: &str, args: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match args.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Switches for human-readable rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub emit_mark: bool,
    pub emit_pos: bool,
    pub emit_source: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            emit_mark: true,
            emit_pos: true,
            emit_source: false,
        }
    }
}

/// A structured compiler diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source: DiagnosticSource,
    pub severity: ErrorSeverity,
    pub span: Span,
    pub args: BTreeMap<String, String>,
    pub file: Option<String>,
}

/// Serializable view of a diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "kind")]
    pub severity: ErrorSeverity,
    pub source: DiagnosticSource,
    #[serde(rename = "startPos")]
    pub start_pos: [usize; 3],
    #[serde(rename = "endPos")]
    pub end_pos: [usize; 3],
    pub args: BTreeMap<String, String>,
}

impl Diagnostic {
    /// Create a diagnostic with the kind's default source and severity
    pub fn new(kind: DiagnosticKind, span: Span) -> Self {
        Self {
            kind,
            source: kind.source(),
            severity: kind.severity(),
            span,
            args: BTreeMap::new(),
            file: None,
        }
    }

    pub fn with_arg(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.args.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_source(mut self, source: DiagnosticSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn is_fatal(&self) -> bool {
        self.severity.is_fatal()
    }

    /// Formatted message without mark or position
    pub fn message(&self) -> String {
        format_template(self.kind.template(), &self.args)
    }

    /// Position prefix: `[row:col - row:col] `
    pub fn position(&self) -> String {
        format!(
            "[{}:{} - {}:{}] ",
            self.span.start.row, self.span.start.col, self.span.end.row, self.span.end.col
        )
    }

    /// Render for the console, colouring the severity mark
    pub fn render(&self, options: &RenderOptions) -> String {
        let mut out = String::new();
        if options.emit_mark {
            let mark = self.severity.mark();
            let painted = match self.severity {
                ErrorSeverity::Info => mark.blue(),
                ErrorSeverity::Warning => mark.yellow(),
                ErrorSeverity::Error => mark.red(),
                ErrorSeverity::Critical => mark.bright_white().on_red(),
            };
            out.push_str(&format!("{} ", painted));
        }
        if options.emit_source {
            out.push_str(self.source.tag());
            out.push(' ');
        }
        if options.emit_pos {
            out.push_str(&self.position());
        }
        out.push_str(&self.message());
        out
    }

    pub fn raw(&self) -> DiagnosticRecord {
        DiagnosticRecord {
            kind: self.kind.name(),
            severity: self.severity,
            source: self.source,
            start_pos: self.span.start.triple(),
            end_pos: self.span.end.triple(),
            args: self.args.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.raw()).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}: ", file)?;
        }
        write!(f, "{} {}{}", self.severity.mark(), self.position(), self.message())
    }
}

/// Does any diagnostic invalidate the compilation?
pub fn has_fatal(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_fatal)
}

/// Errors raised by the parser
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    /// Unrecoverable: a token no rule can accept
    #[error("Unexpected token: {found} (expected {expected})")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    /// Unrecoverable: input ended mid-construct
    #[error("Unexpected End-Of-File (expected {expected})")]
    UnexpectedEof { expected: String, span: Span },
    /// Rule-specific failure carrying the diagnostic a recovery point will report
    #[error("{diagnostic}")]
    InvalidSyntax { diagnostic: Box<Diagnostic> },
}

pub type ParserResult<T> = Result<T, ParserError>;

impl ParserError {
    pub fn invalid(diagnostic: Diagnostic) -> Self {
        ParserError::InvalidSyntax {
            diagnostic: Box::new(diagnostic),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ParserError::UnexpectedToken { span, .. } | ParserError::UnexpectedEof { span, .. } => *span,
            ParserError::InvalidSyntax { diagnostic } => diagnostic.span,
        }
    }

    /// Convert to a diagnostic; unrecoverable errors are critical
    pub fn to_diagnostic(&self, filename: Option<String>) -> Diagnostic {
        match self {
            ParserError::UnexpectedToken { found, span, .. } => {
                Diagnostic::new(DiagnosticKind::UnexpectedToken, *span)
                    .with_arg("token", found)
                    .with_severity(ErrorSeverity::Critical)
                    .with_file(filename)
            }
            ParserError::UnexpectedEof { span, .. } => Diagnostic::new(DiagnosticKind::UnexpectedEof, *span)
                .with_severity(ErrorSeverity::Critical)
                .with_file(filename),
            ParserError::InvalidSyntax { diagnostic } => (**diagnostic).clone().with_file(filename),
        }
    }
}
