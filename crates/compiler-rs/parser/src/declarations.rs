//! Declaration parsing
//!
//! This module handles parsing of the label, constant, type and variable
//! declaration parts, and of procedure and function declarations with their
//! formal parameter lists.

use ast::{
    ConformantArraySchema, ConstantDefinition, FormalParameter, Identifier, IndexTypeSpecification, Label, ParamType,
    ParameterSpecification, RoutineBody, RoutineDeclaration, RoutineHeading, RoutineKind, TypeDefinition,
    VariableDeclaration,
};
use errors::{DiagnosticKind, ParserResult};
use tokens::TokenKind;

/// Declaration parsing functionality
impl super::Parser {
    /// Parse `label n {, n} ;`
    pub(super) fn parse_label_part(&mut self) -> ParserResult<Vec<Label>> {
        self.consume(TokenKind::KwLabel, "LABEL")?;

        let labels = match self.parse_label_list() {
            Ok(labels) => labels,
            Err(err) => {
                let fallback = self
                    .diagnostic_here(DiagnosticKind::InvalidLabel)
                    .with_arg("value", &self.current().text);
                self.report_recovered(err, fallback);
                self.synchronize(&[TokenKind::Semicolon]);
                vec![]
            }
        };
        self.consume(TokenKind::Semicolon, ";")?;
        Ok(labels)
    }

    fn parse_label_list(&mut self) -> ParserResult<Vec<Label>> {
        let mut labels = vec![self.expect_label()?];
        while self.eat(&TokenKind::Comma) {
            labels.push(self.expect_label()?);
        }
        Ok(labels)
    }

    /// Parse `const name = constant ; {name = constant ;}`
    pub(super) fn parse_const_part(&mut self) -> ParserResult<Vec<ConstantDefinition>> {
        self.consume(TokenKind::KwConst, "CONST")?;

        let mut constants = vec![];
        loop {
            let start = self.current().span;
            let name = self.expect_identifier()?;
            self.consume(TokenKind::Equal, "=")?;
            let value = self.parse_constant()?;
            constants.push(ConstantDefinition {
                name,
                value,
                span: self.span_from(start),
            });
            self.consume(TokenKind::Semicolon, ";")?;

            if self.current_identifier().is_none() {
                break;
            }
        }
        Ok(constants)
    }

    /// Parse `type name = type ; {name = type ;}`
    ///
    /// A malformed definition is reported and skipped up to its `;`.
    pub(super) fn parse_type_part(&mut self) -> ParserResult<Vec<TypeDefinition>> {
        self.consume(TokenKind::KwType, "TYPE")?;

        let mut types = vec![];
        while self.current_identifier().is_some() {
            match self.parse_type_definition() {
                Ok(definition) => types.push(definition),
                Err(err) => {
                    let fallback = self
                        .diagnostic_here(DiagnosticKind::InvalidType)
                        .with_arg("value", &self.current().text);
                    self.report_recovered(err, fallback);
                    self.synchronize(&[TokenKind::Semicolon]);
                }
            }
            self.consume(TokenKind::Semicolon, ";")?;
        }
        Ok(types)
    }

    fn parse_type_definition(&mut self) -> ParserResult<TypeDefinition> {
        let start = self.current().span;
        let name = self.expect_identifier()?;
        self.consume(TokenKind::Equal, "=")?;
        let ty = self.parse_type()?;
        Ok(TypeDefinition {
            name,
            ty,
            span: self.span_from(start),
        })
    }

    /// Parse `var names : type ; {names : type ;}`
    pub(super) fn parse_var_part(&mut self) -> ParserResult<Vec<VariableDeclaration>> {
        self.consume(TokenKind::KwVar, "VAR")?;

        let mut variables = vec![];
        while self.current_identifier().is_some() {
            match self.parse_variable_declaration() {
                Ok(declaration) => variables.push(declaration),
                Err(err) => {
                    let fallback = self
                        .diagnostic_here(DiagnosticKind::InvalidVariable)
                        .with_arg("value", &self.current().text);
                    self.report_recovered(err, fallback);
                    self.synchronize(&[TokenKind::Semicolon]);
                }
            }
            self.consume(TokenKind::Semicolon, ";")?;
        }
        Ok(variables)
    }

    fn parse_variable_declaration(&mut self) -> ParserResult<VariableDeclaration> {
        let start = self.current().span;
        let names = self.parse_identifier_list()?;
        self.consume(TokenKind::Colon, ":")?;
        let ty = self.parse_type()?;
        Ok(VariableDeclaration {
            names,
            ty,
            span: self.span_from(start),
        })
    }

    /// Parse procedure or function declaration: heading ; (block | directive)
    pub(super) fn parse_routine_declaration(&mut self) -> ParserResult<RoutineDeclaration> {
        let start = self.current().span;
        let heading = self.parse_routine_heading(false)?;
        self.consume(TokenKind::Semicolon, ";")?;

        let body = match self.current_identifier() {
            Some(directive) => {
                self.advance();
                if !directive.matches("forward") {
                    let diagnostic = errors::Diagnostic::new(DiagnosticKind::UnknownDirective, directive.span)
                        .with_arg("value", &directive.name)
                        .with_file(self.filename.clone());
                    self.report(diagnostic);
                }
                RoutineBody::Directive(directive)
            }
            None => RoutineBody::Block(Box::new(self.parse_block()?)),
        };

        Ok(RoutineDeclaration {
            id: self.ids.next_id(),
            heading,
            body,
            span: self.span_from(start),
        })
    }

    /// Parse `procedure name [params]` or `function name [params] [: type]`
    ///
    /// The result type is mandatory for procedural/functional parameters and
    /// optional on declarations (completing a forward declaration).
    fn parse_routine_heading(&mut self, as_parameter: bool) -> ParserResult<RoutineHeading> {
        let start = self.current().span;
        let is_function = match self.current().kind {
            TokenKind::KwProcedure => false,
            TokenKind::KwFunction => true,
            _ => return Err(self.unexpected("PROCEDURE or FUNCTION")),
        };
        self.advance();
        let name = self.expect_identifier()?;

        let params = if self.check(&TokenKind::LeftParen) {
            self.parse_formal_parameters()?
        } else {
            vec![]
        };

        let kind = if is_function {
            let return_type = if as_parameter || self.check(&TokenKind::Colon) {
                self.consume(TokenKind::Colon, ":")?;
                Some(self.expect_identifier()?)
            } else {
                None
            };
            RoutineKind::Function { return_type }
        } else {
            RoutineKind::Procedure
        };

        Ok(RoutineHeading {
            kind,
            name,
            params,
            span: self.span_from(start),
        })
    }

    /// Parse `( section {; section} )`
    ///
    /// A malformed list is reported once and skipped up to its `)`.
    fn parse_formal_parameters(&mut self) -> ParserResult<Vec<FormalParameter>> {
        self.consume(TokenKind::LeftParen, "(")?;

        let params = match self.parse_formal_parameter_list() {
            Ok(params) => params,
            Err(err) => {
                let fallback = self
                    .diagnostic_here(DiagnosticKind::UnexpectedToken)
                    .with_arg("token", self.current().kind.name());
                self.report_recovered(err, fallback);
                self.synchronize(&[TokenKind::RightParen]);
                vec![]
            }
        };
        self.consume(TokenKind::RightParen, ")")?;
        Ok(params)
    }

    fn parse_formal_parameter_list(&mut self) -> ParserResult<Vec<FormalParameter>> {
        let mut params = vec![self.parse_formal_parameter_section()?];
        while self.eat(&TokenKind::Semicolon) {
            params.push(self.parse_formal_parameter_section()?);
        }
        if !self.check(&TokenKind::RightParen) {
            return Err(self.unexpected(")"));
        }
        Ok(params)
    }

    fn parse_formal_parameter_section(&mut self) -> ParserResult<FormalParameter> {
        match self.current().kind {
            TokenKind::KwProcedure | TokenKind::KwFunction => {
                Ok(FormalParameter::Routine(self.parse_routine_heading(true)?))
            }
            _ => {
                let start = self.current().span;
                let by_ref = self.eat(&TokenKind::KwVar);
                let names = self.parse_identifier_list()?;
                self.consume(TokenKind::Colon, ":")?;
                let ty = self.parse_parameter_type()?;
                Ok(FormalParameter::Value(ParameterSpecification {
                    names,
                    ty,
                    by_ref,
                    span: self.span_from(start),
                }))
            }
        }
    }

    /// Parse a type identifier or a conformant array schema
    fn parse_parameter_type(&mut self) -> ParserResult<ParamType> {
        let start = self.current().span;
        let packed = self.eat(&TokenKind::KwPacked);
        if !packed && !self.check(&TokenKind::KwArray) {
            return Ok(ParamType::Identifier(self.expect_identifier()?));
        }

        self.consume(TokenKind::KwArray, "ARRAY")?;
        self.consume(TokenKind::LeftBracket, "[")?;
        let mut indices = vec![self.parse_index_type_specification()?];
        while self.eat(&TokenKind::Semicolon) {
            indices.push(self.parse_index_type_specification()?);
        }
        self.consume(TokenKind::RightBracket, "]")?;
        self.consume(TokenKind::KwOf, "OF")?;
        let element = self.parse_parameter_type()?;

        Ok(ParamType::ConformantArray(ConformantArraySchema {
            packed,
            indices,
            element: Box::new(element),
            span: self.span_from(start),
        }))
    }

    /// Parse `low .. high : OrdinalType`
    fn parse_index_type_specification(&mut self) -> ParserResult<IndexTypeSpecification> {
        let start = self.current().span;
        let low = self.expect_identifier()?;
        self.consume(TokenKind::DotDot, "..")?;
        let high = self.expect_identifier()?;
        self.consume(TokenKind::Colon, ":")?;
        let ty: Identifier = self.expect_identifier()?;
        Ok(IndexTypeSpecification {
            low,
            high,
            ty,
            span: self.span_from(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Parser;
    use ast::{FormalParameter, ParamType, Program, RoutineBody, RoutineKind};
    use errors::DiagnosticKind;

    fn parse_with_diagnostics(source: &str) -> (Program, Vec<errors::Diagnostic>) {
        let mut parser = Parser::new(source);
        let program = parser.parse().unwrap();
        (program, parser.take_diagnostics())
    }

    #[test]
    fn test_declaration_parts() {
        let (program, diags) = parse_with_diagnostics(
            "program P;
             label 1, 2;
             const max = 10; neg = -max; greeting = 'hi';
             type Idx = 1..max;
             var a, b: Integer; c: array [Idx] of Real;
             begin end.",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let block = &program.block;
        assert_eq!(block.labels.iter().map(|l| l.value).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(block.constants.len(), 3);
        assert_eq!(block.types.len(), 1);
        assert_eq!(block.variables.len(), 2);
        assert_eq!(block.variables[0].names.len(), 2);
    }

    #[test]
    fn test_invalid_label_recovers() {
        let (program, diags) = parse_with_diagnostics("program P; label 1, x; var a: Integer; begin end.");
        assert!(program.block.labels.is_empty());
        assert_eq!(program.block.variables.len(), 1);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message(), "Invalid label: x");
    }

    #[test]
    fn test_invalid_variable_recovers() {
        let (program, diags) = parse_with_diagnostics("program P; var a Integer; b: Real; begin end.");
        assert_eq!(program.block.variables.len(), 1);
        assert_eq!(program.block.variables[0].names[0].name, "b");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::InvalidVariable);
        assert_eq!(diags[0].arg("value"), Some("Integer"));
    }

    #[test]
    fn test_forward_function() {
        let (program, diags) = parse_with_diagnostics(
            "program P;
             function F(x: Integer): Integer; forward;
             function F; begin F := x end;
             begin end.",
        );
        assert!(diags.is_empty());
        let routines = &program.block.routines;
        assert!(routines[0].is_forward());
        assert!(matches!(
            routines[0].heading.kind,
            RoutineKind::Function { return_type: Some(_) }
        ));
        assert!(matches!(routines[1].heading.kind, RoutineKind::Function { return_type: None }));
        assert!(matches!(routines[1].body, RoutineBody::Block(_)));
    }

    #[test]
    fn test_unknown_directive_is_reported() {
        let (program, diags) = parse_with_diagnostics("program P; procedure Q; external; begin end.");
        assert!(matches!(program.block.routines[0].body, RoutineBody::Directive(_)));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnknownDirective);
    }

    #[test]
    fn test_formal_parameter_kinds() {
        let (program, diags) = parse_with_diagnostics(
            "program P;
             procedure Q(a, b: Integer; var c: Real; function f(x: Real): Real; procedure g;
                         var m: packed array [lo..hi: Integer; l2..h2: Char] of Real);
             begin end;
             begin end.",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        let params = &program.block.routines[0].heading.params;
        assert_eq!(params.len(), 5);
        assert_eq!(program.block.routines[0].heading.arity(), 6);
        match &params[1] {
            FormalParameter::Value(spec) => assert!(spec.by_ref),
            _ => panic!("Expected value parameter"),
        }
        match &params[2] {
            FormalParameter::Routine(heading) => assert!(heading.is_function()),
            _ => panic!("Expected functional parameter"),
        }
        match &params[4] {
            FormalParameter::Value(spec) => match &spec.ty {
                ParamType::ConformantArray(schema) => {
                    assert!(schema.packed);
                    assert_eq!(schema.indices.len(), 2);
                }
                _ => panic!("Expected conformant array"),
            },
            _ => panic!("Expected value parameter"),
        }
    }

    #[test]
    fn test_malformed_parameter_list_recovers() {
        let (program, diags) = parse_with_diagnostics(
            "program P; procedure Q(a: Integer; 5); begin end; begin end.",
        );
        assert!(program.block.routines[0].heading.params.is_empty());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message(), "Unexpected token: UNSIGNED_INTEGER");
    }
}
