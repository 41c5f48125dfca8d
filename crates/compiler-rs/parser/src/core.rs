//! Core parser functionality
//!
//! This module contains the fundamental token management, error construction
//! and resynchronization utilities used throughout the parser.

use ast::{Identifier, Label, MAX_LABEL};
use errors::{Diagnostic, DiagnosticKind, ParserError, ParserResult};
use tokens::{Span, Token, TokenKind};

/// Core parser functionality for token management
impl super::Parser {
    /// Advance to the next token
    pub(super) fn advance(&mut self) {
        let next = self.lexer.next_token();
        let previous = std::mem::replace(&mut self.current, std::mem::replace(&mut self.peek, next));
        if previous.kind != TokenKind::Eof {
            self.last_span = previous.span;
        }
    }

    /// Advance and return the token that was current
    pub(super) fn bump(&mut self) -> Token {
        let token = self.current.clone();
        self.advance();
        token
    }

    /// Get the current token
    pub(super) fn current(&self) -> &Token {
        &self.current
    }

    /// Get the peek token
    pub(super) fn peek_token(&self) -> &Token {
        &self.peek
    }

    /// Check if current token matches a kind (literal payloads ignored)
    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        self.current.kind.same_kind(kind)
    }

    /// Check if peek token matches a kind (literal payloads ignored)
    pub(super) fn check_peek(&self, kind: &TokenKind) -> bool {
        self.peek.kind.same_kind(kind)
    }

    pub(super) fn at_eof(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Consume the current token if it matches, returning whether it did
    pub(super) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume current token if it matches, otherwise error
    pub(super) fn consume(&mut self, kind: TokenKind, expected: &str) -> ParserResult<Token> {
        if self.check(&kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Error for the current token
    pub(super) fn unexpected(&self, expected: &str) -> ParserError {
        if self.at_eof() {
            ParserError::UnexpectedEof {
                expected: expected.to_string(),
                span: self.current.span,
            }
        } else {
            ParserError::UnexpectedToken {
                expected: expected.to_string(),
                found: self.current.kind.name().to_string(),
                span: self.current.span,
            }
        }
    }

    /// Rule-specific error located at the current token
    pub(super) fn invalid_here(&self, kind: DiagnosticKind) -> ParserError {
        ParserError::invalid(self.diagnostic_here(kind))
    }

    /// Diagnostic located at the current token
    pub(super) fn diagnostic_here(&self, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic::new(kind, self.current.span).with_file(self.filename.clone())
    }

    /// Consume an identifier
    pub(super) fn expect_identifier(&mut self) -> ParserResult<Identifier> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let ident = Identifier::new(name.clone(), self.current.span);
                self.advance();
                Ok(ident)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Consume `ident {, ident}`
    pub(super) fn parse_identifier_list(&mut self) -> ParserResult<Vec<Identifier>> {
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        Ok(names)
    }

    /// Consume a label (digit sequence)
    /// Labels are digit sequences of at most four digits
    pub(super) fn expect_label(&mut self) -> ParserResult<Label> {
        match self.current.kind {
            TokenKind::UnsignedInteger(value) => match u32::try_from(value) {
                Ok(value) if value <= MAX_LABEL => {
                    let span = self.current.span;
                    self.advance();
                    Ok(Label { value, span })
                }
                _ => Err(self.invalid_here(DiagnosticKind::InvalidLabel).with_value(&self.current.text)),
            },
            _ => Err(self.unexpected("label")),
        }
    }

    /// Span from `start` to the end of the last consumed token
    pub(super) fn span_from(&self, start: Span) -> Span {
        start.merge(self.last_span)
    }

    /// Record a recovered syntax error
    pub(super) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record the error carried by `error`, or `fallback` for a generic one
    pub(super) fn report_recovered(&mut self, error: ParserError, fallback: Diagnostic) {
        match error {
            ParserError::InvalidSyntax { diagnostic } => self.report(*diagnostic),
            ParserError::UnexpectedToken { .. } | ParserError::UnexpectedEof { .. } => self.report(fallback),
        }
    }

    /// Skip tokens until one of `terminators` (not consumed) or end of input
    pub(super) fn synchronize(&mut self, terminators: &[TokenKind]) {
        while !self.at_eof() && !terminators.iter().any(|t| self.check(t)) {
            self.advance();
        }
    }
}

/// Attach the `{value}` argument to a rule-specific error
pub(super) trait WithValue {
    fn with_value(self, value: &str) -> Self;
}

impl WithValue for ParserError {
    fn with_value(self, value: &str) -> Self {
        match self {
            ParserError::InvalidSyntax { diagnostic } => ParserError::invalid(diagnostic.with_arg("value", value)),
            other => other,
        }
    }
}
