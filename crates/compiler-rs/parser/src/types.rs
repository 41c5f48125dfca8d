//! Type parsing
//!
//! This module handles parsing of type denoters (identifiers, enumerations,
//! subranges, arrays, records with variant parts, sets, files, pointers)
//! and of constants.

use ast::{
    Constant, Number, RecordSection, RecordType, Sign, StringLiteral, TypeKind, TypeNode, VariantCase, VariantPart,
};
use errors::{DiagnosticKind, ParserError, ParserResult};
use tokens::TokenKind;

use crate::core::WithValue;

/// Type parsing functionality
impl super::Parser {
    /// Parse type denoter
    pub(crate) fn parse_type(&mut self) -> ParserResult<TypeNode> {
        let start = self.current().span;
        match self.current().kind {
            TokenKind::UpArrow => {
                self.advance();
                let target = self.expect_identifier()?;
                Ok(TypeNode {
                    kind: TypeKind::Pointer(target),
                    span: self.span_from(start),
                })
            }
            TokenKind::KwPacked => {
                self.advance();
                self.parse_structured_type(true, start)
            }
            TokenKind::KwArray | TokenKind::KwRecord | TokenKind::KwSet | TokenKind::KwFile => {
                self.parse_structured_type(false, start)
            }
            _ => self.parse_simple_type(),
        }
    }

    /// Parse ordinal type: identifier, enumeration or subrange
    pub(crate) fn parse_simple_type(&mut self) -> ParserResult<TypeNode> {
        let start = self.current().span;
        match &self.current().kind {
            TokenKind::LeftParen => self.parse_enumerated_type(),
            TokenKind::Identifier(_) if !self.check_peek(&TokenKind::DotDot) => {
                let name = self.expect_identifier()?;
                Ok(TypeNode {
                    span: name.span,
                    kind: TypeKind::Identifier(name),
                })
            }
            TokenKind::Identifier(_)
            | TokenKind::UnsignedInteger(_)
            | TokenKind::UnsignedReal(_)
            | TokenKind::StringLiteral(_)
            | TokenKind::Plus
            | TokenKind::Minus => {
                let first = self.parse_constant()?;
                self.consume(TokenKind::DotDot, "..")?;
                let last = self.parse_constant()?;
                Ok(TypeNode {
                    kind: TypeKind::Subrange { start: first, end: last },
                    span: self.span_from(start),
                })
            }
            _ => Err(self.invalid_here(DiagnosticKind::InvalidType).with_value(&self.current().text)),
        }
    }

    /// Parse `( ident {, ident} )`
    ///
    /// A list that stops at anything but `)` is malterminated; the rule ends
    /// there without consuming the stray token.
    fn parse_enumerated_type(&mut self) -> ParserResult<TypeNode> {
        let start = self.current().span;
        self.consume(TokenKind::LeftParen, "(")?;

        let mut values = vec![];
        loop {
            match self.current_identifier() {
                Some(ident) => {
                    self.advance();
                    values.push(ident);
                }
                None => {
                    let diagnostic = self
                        .diagnostic_here(DiagnosticKind::InvalidType)
                        .with_arg("value", &self.current().text);
                    self.report(diagnostic);
                    self.synchronize(&[TokenKind::RightParen, TokenKind::Semicolon]);
                    break;
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        if !self.eat(&TokenKind::RightParen) {
            let diagnostic = self
                .diagnostic_here(DiagnosticKind::MalterminatedType)
                .with_arg("expected", ")")
                .with_arg("actual", &self.current().text);
            self.report(diagnostic);
        }

        Ok(TypeNode {
            kind: TypeKind::Enumerated(values),
            span: self.span_from(start),
        })
    }

    fn parse_structured_type(&mut self, packed: bool, start: tokens::Span) -> ParserResult<TypeNode> {
        let kind = match self.current().kind {
            TokenKind::KwArray => self.parse_array_type(packed)?,
            TokenKind::KwRecord => {
                self.advance();
                let record = self.parse_field_list(packed)?;
                if !self.eat(&TokenKind::KwEnd) {
                    return Err(self.invalid_here(DiagnosticKind::UnterminatedType));
                }
                TypeKind::Record(RecordType {
                    span: self.span_from(start),
                    ..record
                })
            }
            TokenKind::KwSet => {
                self.advance();
                self.consume(TokenKind::KwOf, "OF")?;
                let base = self.parse_simple_type()?;
                TypeKind::Set {
                    packed,
                    base: Box::new(base),
                }
            }
            TokenKind::KwFile => {
                self.advance();
                self.consume(TokenKind::KwOf, "OF")?;
                let base = self.parse_type()?;
                TypeKind::File {
                    packed,
                    base: Box::new(base),
                }
            }
            _ => return Err(self.invalid_here(DiagnosticKind::InvalidType).with_value(&self.current().text)),
        };
        Ok(TypeNode {
            kind,
            span: self.span_from(start),
        })
    }

    /// Parse `array [ simple {, simple} ] of type`
    ///
    /// Failures are reported at the token that broke the index list or element
    /// type rather than at the definition's terminator.
    fn parse_array_type(&mut self, packed: bool) -> ParserResult<TypeKind> {
        self.consume(TokenKind::KwArray, "ARRAY")?;
        let indices = self.with_invalid_type(|p| {
            p.consume(TokenKind::LeftBracket, "[")?;
            let mut indices = vec![p.parse_simple_type()?];
            while p.eat(&TokenKind::Comma) {
                indices.push(p.parse_simple_type()?);
            }
            p.consume(TokenKind::RightBracket, "]")?;
            Ok(indices)
        })?;
        self.consume(TokenKind::KwOf, "OF")?;
        let element = self.with_invalid_type(|p| p.parse_type())?;
        Ok(TypeKind::Array {
            packed,
            indices,
            element: Box::new(element),
        })
    }

    /// Turn a generic failure inside `rule` into `InvalidType` at the offending token
    fn with_invalid_type<T>(&mut self, rule: impl FnOnce(&mut Self) -> ParserResult<T>) -> ParserResult<T> {
        rule(self).map_err(|err| match err {
            ParserError::UnexpectedToken { .. } => {
                self.invalid_here(DiagnosticKind::InvalidType).with_value(&self.current().text)
            }
            other => other,
        })
    }

    /// Parse a record field list: [fixed-part] [; variant-part] [;]
    fn parse_field_list(&mut self, packed: bool) -> ParserResult<RecordType> {
        let start = self.current().span;
        let mut fixed = vec![];
        let mut variant = None;

        while self.check(&TokenKind::Identifier(String::new())) {
            fixed.push(self.parse_record_section()?);
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }

        if self.check(&TokenKind::KwCase) {
            variant = Some(Box::new(self.parse_variant_part(packed)?));
            self.eat(&TokenKind::Semicolon);
        }

        Ok(RecordType {
            packed,
            fixed,
            variant,
            span: self.span_from(start),
        })
    }

    /// Parse `ident {, ident} : type`
    fn parse_record_section(&mut self) -> ParserResult<RecordSection> {
        let start = self.current().span;
        let names = self.parse_identifier_list()?;
        self.consume(TokenKind::Colon, ":")?;
        let ty = self.parse_type()?;
        Ok(RecordSection {
            names,
            ty,
            span: self.span_from(start),
        })
    }

    /// Parse `case [tag :] TagType of variant {; variant}`
    fn parse_variant_part(&mut self, packed: bool) -> ParserResult<VariantPart> {
        let start = self.current().span;
        self.consume(TokenKind::KwCase, "CASE")?;

        let (tag, tag_type) = if self.check_peek(&TokenKind::Colon) {
            let tag = self.expect_identifier()?;
            self.advance();
            (Some(tag), self.expect_identifier()?)
        } else {
            (None, self.expect_identifier()?)
        };
        self.consume(TokenKind::KwOf, "OF")?;

        let mut cases = vec![self.parse_variant_case(packed)?];
        while self.eat(&TokenKind::Semicolon) {
            if self.check(&TokenKind::KwEnd) || self.check(&TokenKind::RightParen) {
                break;
            }
            cases.push(self.parse_variant_case(packed)?);
        }

        Ok(VariantPart {
            tag,
            tag_type,
            cases,
            span: self.span_from(start),
        })
    }

    /// Parse `const {, const} : ( field-list )`
    fn parse_variant_case(&mut self, packed: bool) -> ParserResult<VariantCase> {
        let start = self.current().span;
        let mut constants = vec![self.parse_constant()?];
        while self.eat(&TokenKind::Comma) {
            constants.push(self.parse_constant()?);
        }
        self.consume(TokenKind::Colon, ":")?;

        // `name: Type` after a variant part is a fixed section in the wrong place
        if !self.check(&TokenKind::LeftParen) {
            return Err(self.invalid_here(DiagnosticKind::RecordNoFixedPart));
        }
        self.advance();
        let fields = self.parse_field_list(packed)?;
        if !self.eat(&TokenKind::RightParen) {
            return Err(self.invalid_here(DiagnosticKind::UnterminatedType));
        }

        Ok(VariantCase {
            constants,
            fields,
            span: self.span_from(start),
        })
    }

    /// Parse constant: [sign] (unsigned-number | constant-identifier) | string
    pub(crate) fn parse_constant(&mut self) -> ParserResult<Constant> {
        let start = self.current().span;
        let sign = match self.current().kind {
            TokenKind::Plus => Some(Sign::Plus),
            TokenKind::Minus => Some(Sign::Minus),
            _ => None,
        };
        if sign.is_some() {
            self.advance();
        }

        let token = self.current().clone();
        let constant = match token.kind {
            TokenKind::UnsignedInteger(value) => {
                self.advance();
                let number = Number::integer(value, token.span);
                Constant::Number(match sign {
                    Some(sign) => number.signed(sign, start),
                    None => number,
                })
            }
            TokenKind::UnsignedReal(value) => {
                self.advance();
                let number = Number::real(value, token.span);
                Constant::Number(match sign {
                    Some(sign) => number.signed(sign, start),
                    None => number,
                })
            }
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier()?;
                Constant::Identifier {
                    sign,
                    name,
                    span: self.span_from(start),
                }
            }
            TokenKind::StringLiteral(value) if sign.is_none() => {
                self.advance();
                Constant::String(StringLiteral {
                    value,
                    span: token.span,
                })
            }
            _ => return Err(self.unexpected("constant")),
        };
        Ok(constant)
    }
}
