//! Pascal Parser
//!
//! This crate implements a recursive descent parser for the Pascal subset.
//! It builds an AST from tokens produced by the lexer.
//!
//! Recoverable syntax errors (malformed labels, types, variables, parameter
//! lists and case arms) are reported and the parser resynchronizes at the
//! rule's own terminator. Any other syntax error aborts the parse.

use ast::{
    Block, Expression, ExpressionKind, Identifier, NodeIdGen, Number, Program, ProgramHeading, SetElement, Sign,
    StringLiteral, UnaryOp, Variable, VariableKind,
};
use errors::{Diagnostic, DiagnosticKind, ParserError, ParserResult};
use lexer::Lexer;
use tokens::{Span, Token, TokenKind};

mod core;
mod declarations;
mod statements;
mod types;

/// Parser for Pascal programs
pub struct Parser {
    lexer: Lexer,
    current: Token,
    peek: Token,
    /// Span of the last consumed token
    last_span: Span,
    filename: Option<String>,
    diagnostics: Vec<Diagnostic>,
    ids: NodeIdGen,
}

impl Parser {
    /// Create a new parser from source code
    pub fn new(source: &str) -> Self {
        Self::new_with_file(source, None)
    }

    /// Create a new parser from source code with filename
    pub fn new_with_file(source: &str, filename: Option<String>) -> Self {
        Self::from_lexer(Lexer::new_with_file(source, filename.clone()), filename)
    }

    /// Drive an existing lexer, e.g. one reset after a diagnostic pass
    pub fn from_lexer(mut lexer: Lexer, filename: Option<String>) -> Self {
        // Prime the parser with first two tokens
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            last_span: Span::at(current.span.start),
            current,
            peek,
            filename,
            diagnostics: vec![],
            ids: NodeIdGen::new(),
        }
    }

    /// Recovered syntax diagnostics so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Give the lexer back (its line table is complete once parsing finished)
    pub fn into_lexer(self) -> Lexer {
        self.lexer
    }

    /// Convert a ParserError to a Diagnostic
    pub fn error_to_diagnostic(&self, error: &ParserError) -> Diagnostic {
        error.to_diagnostic(self.filename.clone())
    }

    /// Parse a complete program
    pub fn parse(&mut self) -> ParserResult<Program> {
        let program = self.parse_program()?;
        self.lexer.finish();
        Ok(program)
    }

    /// Parse program: PROGRAM identifier [( externals )] ; block .
    fn parse_program(&mut self) -> ParserResult<Program> {
        let start = self.current().span;
        let heading = self.parse_program_heading()?;
        self.consume(TokenKind::Semicolon, ";")?;
        let block = self.parse_block()?;
        self.consume(TokenKind::Dot, ".")?;
        if !self.at_eof() {
            return Err(self.unexpected("end of file"));
        }
        Ok(Program {
            heading,
            block,
            span: self.span_from(start),
        })
    }

    fn parse_program_heading(&mut self) -> ParserResult<ProgramHeading> {
        let start = self.current().span;
        self.consume(TokenKind::KwProgram, "PROGRAM")?;
        let name = self.expect_identifier()?;

        let mut externals = vec![];
        if self.eat(&TokenKind::LeftParen) {
            match self.parse_identifier_list() {
                Ok(list) => externals = list,
                Err(err) => {
                    let fallback = self
                        .diagnostic_here(DiagnosticKind::UnexpectedToken)
                        .with_arg("token", self.current().kind.name());
                    self.report_recovered(err, fallback);
                    self.synchronize(&[TokenKind::RightParen]);
                }
            }
            self.consume(TokenKind::RightParen, ")")?;
        }

        Ok(ProgramHeading {
            name,
            externals,
            span: self.span_from(start),
        })
    }

    /// Parse block: [label] [const] [type] [var] {routine ;} compound-statement
    fn parse_block(&mut self) -> ParserResult<Block> {
        let start = self.current().span;

        let labels = if self.check(&TokenKind::KwLabel) {
            self.parse_label_part()?
        } else {
            vec![]
        };
        // Consecutive repetitions of a declaration part accumulate
        let mut constants = vec![];
        while self.check(&TokenKind::KwConst) {
            constants.extend(self.parse_const_part()?);
        }
        let mut types = vec![];
        while self.check(&TokenKind::KwType) {
            types.extend(self.parse_type_part()?);
        }
        let mut variables = vec![];
        while self.check(&TokenKind::KwVar) {
            variables.extend(self.parse_var_part()?);
        }

        let mut routines = vec![];
        while self.check(&TokenKind::KwProcedure) || self.check(&TokenKind::KwFunction) {
            routines.push(self.parse_routine_declaration()?);
            self.consume(TokenKind::Semicolon, ";")?;
        }

        if !self.check(&TokenKind::KwBegin) {
            return Err(self.unexpected("BEGIN"));
        }
        let body = self.parse_compound_statement()?;

        Ok(Block {
            labels,
            constants,
            types,
            variables,
            routines,
            body,
            span: self.span_from(start),
        })
    }

    // ===== Expressions =====

    /// expression = simple-expression [relational-operator simple-expression]
    pub(crate) fn parse_expression(&mut self) -> ParserResult<Expression> {
        let left = self.parse_simple_expression()?;
        match self.relational_operator() {
            Some(op) => {
                self.advance();
                let right = self.parse_simple_expression()?;
                Ok(self.binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    /// simple-expression = [sign] term {adding-operator term}
    fn parse_simple_expression(&mut self) -> ParserResult<Expression> {
        let start = self.current().span;
        let sign = match self.current().kind {
            TokenKind::Plus => Some(Sign::Plus),
            TokenKind::Minus => Some(Sign::Minus),
            _ => None,
        };
        if sign.is_some() {
            self.advance();
        }

        let mut left = self.parse_term()?;
        if let Some(sign) = sign {
            left = self.apply_sign(sign, start, left);
        }

        while let Some(op) = self.adding_operator() {
            self.advance();
            let right = self.parse_term()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    /// A sign on an unsigned number literal folds into a signed number
    fn apply_sign(&mut self, sign: Sign, sign_span: Span, term: Expression) -> Expression {
        match term.kind {
            ExpressionKind::Number(number) if !number.is_signed() => {
                let number = number.signed(sign, sign_span);
                Expression {
                    id: term.id,
                    span: number.span,
                    kind: ExpressionKind::Number(number),
                }
            }
            kind => {
                let operand = Expression {
                    id: term.id,
                    kind,
                    span: term.span,
                };
                let op = match sign {
                    Sign::Plus => UnaryOp::Plus,
                    Sign::Minus => UnaryOp::Minus,
                };
                Expression {
                    id: self.ids.next_id(),
                    span: sign_span.merge(operand.span),
                    kind: ExpressionKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                }
            }
        }
    }

    /// term = factor {multiplying-operator factor}
    fn parse_term(&mut self) -> ParserResult<Expression> {
        let mut left = self.parse_factor()?;
        while let Some(op) = self.multiplying_operator() {
            self.advance();
            let right = self.parse_factor()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    /// factor = variable | unsigned-constant | function-designator | set | ( expression ) | not factor
    fn parse_factor(&mut self) -> ParserResult<Expression> {
        let start = self.current().span;
        let kind = match self.current().kind.clone() {
            TokenKind::UnsignedInteger(value) => {
                self.advance();
                ExpressionKind::Number(Number::integer(value, start))
            }
            TokenKind::UnsignedReal(value) => {
                self.advance();
                ExpressionKind::Number(Number::real(value, start))
            }
            TokenKind::StringLiteral(value) => {
                self.advance();
                ExpressionKind::String(StringLiteral { value, span: start })
            }
            TokenKind::KwNil => {
                self.advance();
                ExpressionKind::Nil
            }
            TokenKind::KwNot => {
                self.advance();
                let operand = self.parse_factor()?;
                ExpressionKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, ")")?;
                return Ok(inner);
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = vec![];
                if !self.check(&TokenKind::RightBracket) {
                    elements.push(self.parse_set_element()?);
                    while self.eat(&TokenKind::Comma) {
                        elements.push(self.parse_set_element()?);
                    }
                }
                self.consume(TokenKind::RightBracket, "]")?;
                ExpressionKind::Set(elements)
            }
            TokenKind::Identifier(_) => {
                if self.check_peek(&TokenKind::LeftParen) {
                    let name = self.expect_identifier()?;
                    let args = self.parse_actual_parameters()?;
                    ExpressionKind::Call { name, args }
                } else {
                    ExpressionKind::Variable(self.parse_variable_access()?)
                }
            }
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expression {
            id: self.ids.next_id(),
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_set_element(&mut self) -> ParserResult<SetElement> {
        let start = self.current().span;
        let first = self.parse_expression()?;
        let end = if self.eat(&TokenKind::DotDot) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(SetElement {
            start: first,
            end,
            span: self.span_from(start),
        })
    }

    /// `( expression {, expression} )`
    pub(crate) fn parse_actual_parameters(&mut self) -> ParserResult<Vec<Expression>> {
        self.consume(TokenKind::LeftParen, "(")?;
        let mut args = vec![self.parse_expression()?];
        while self.eat(&TokenKind::Comma) {
            args.push(self.parse_expression()?);
        }
        self.consume(TokenKind::RightParen, ")")?;
        Ok(args)
    }

    /// variable-access = identifier { [ indices ] | . field | ^ }
    pub(crate) fn parse_variable_access(&mut self) -> ParserResult<Variable> {
        let name = self.expect_identifier()?;
        let start = name.span;
        let mut variable = Variable {
            id: self.ids.next_id(),
            span: name.span,
            kind: VariableKind::Entire(name),
        };

        loop {
            let kind = if self.eat(&TokenKind::LeftBracket) {
                let mut indices = vec![self.parse_expression()?];
                while self.eat(&TokenKind::Comma) {
                    indices.push(self.parse_expression()?);
                }
                self.consume(TokenKind::RightBracket, "]")?;
                VariableKind::Indexed {
                    base: Box::new(variable),
                    indices,
                }
            } else if self.eat(&TokenKind::Dot) {
                let field = self.expect_identifier()?;
                VariableKind::Field {
                    base: Box::new(variable),
                    field,
                }
            } else if self.eat(&TokenKind::UpArrow) {
                VariableKind::Dereference(Box::new(variable))
            } else {
                return Ok(variable);
            };
            variable = Variable {
                id: self.ids.next_id(),
                kind,
                span: self.span_from(start),
            };
        }
    }

    fn binary(&mut self, op: ast::BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression {
            id: self.ids.next_id(),
            span: left.span.merge(right.span),
            kind: ExpressionKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    fn relational_operator(&self) -> Option<ast::BinaryOp> {
        use ast::BinaryOp;
        match self.current().kind {
            TokenKind::Equal => Some(BinaryOp::Equal),
            TokenKind::NotEqual => Some(BinaryOp::NotEqual),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEqual),
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
            TokenKind::KwIn => Some(BinaryOp::In),
            _ => None,
        }
    }

    fn adding_operator(&self) -> Option<ast::BinaryOp> {
        use ast::BinaryOp;
        match self.current().kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Subtract),
            TokenKind::KwOr => Some(BinaryOp::Or),
            _ => None,
        }
    }

    fn multiplying_operator(&self) -> Option<ast::BinaryOp> {
        use ast::BinaryOp;
        match self.current().kind {
            TokenKind::Star => Some(BinaryOp::Multiply),
            TokenKind::Slash => Some(BinaryOp::Divide),
            TokenKind::KwDiv => Some(BinaryOp::Div),
            TokenKind::KwMod => Some(BinaryOp::Mod),
            TokenKind::KwAnd => Some(BinaryOp::And),
            _ => None,
        }
    }

    /// Identifier node from the current token, if it is one
    pub(crate) fn current_identifier(&self) -> Option<Identifier> {
        match &self.current().kind {
            TokenKind::Identifier(name) => Some(Identifier::new(name.clone(), self.current().span)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{BinaryOp, Dump, NumberKind, NumberValue, RoutineBody, StatementKind};

    fn parse_ok(source: &str) -> Program {
        let mut parser = Parser::new(source);
        let program = parser.parse().unwrap();
        assert!(parser.diagnostics().is_empty(), "{:?}", parser.diagnostics());
        program
    }

    fn first_statement(program: &Program) -> &ast::Statement {
        match &program.block.body.kind {
            StatementKind::Compound(stmts) => &stmts[0],
            _ => panic!("Expected compound statement"),
        }
    }

    fn assigned_value(program: &Program) -> &Expression {
        match &first_statement(program).kind {
            StatementKind::Assignment { value, .. } => value,
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_parse_simple_program() {
        let program = parse_ok("program Hello; begin end.");
        assert_eq!(program.heading.name.name, "Hello");
        assert!(program.heading.externals.is_empty());
        match &program.block.body.kind {
            StatementKind::Compound(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert_eq!(stmts[0].kind, StatementKind::Empty);
            }
            _ => panic!("Expected compound statement"),
        }
    }

    #[test]
    fn test_parse_program_externals() {
        let program = parse_ok("program P(input, output); begin end.");
        let names: Vec<&str> = program.heading.externals.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["input", "output"]);
    }

    #[test]
    fn test_program_externals_recovery() {
        let mut parser = Parser::new("program P(1); begin end.");
        let program = parser.parse().unwrap();
        assert!(program.heading.externals.is_empty());
        assert_eq!(parser.diagnostics().len(), 1);
        assert_eq!(parser.diagnostics()[0].message(), "Unexpected token: UNSIGNED_INTEGER");
    }

    #[test]
    fn test_relational_binds_loosest() {
        let program = parse_ok("program P; begin b := a + 1 < c * 2 end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Binary { op, left, right } => {
                assert_eq!(*op, BinaryOp::Less);
                assert!(matches!(left.kind, ExpressionKind::Binary { op: BinaryOp::Add, .. }));
                assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOp::Multiply, .. }));
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_multiplying_binds_tighter_than_adding() {
        let program = parse_ok("program P; begin x := a + b * c end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOp::Multiply, .. }));
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_adding_is_left_associative() {
        let program = parse_ok("program P; begin x := a - b - c end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Binary { op, left, .. } => {
                assert_eq!(*op, BinaryOp::Subtract);
                assert!(matches!(left.kind, ExpressionKind::Binary { op: BinaryOp::Subtract, .. }));
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_sign_folds_into_number() {
        let program = parse_ok("program P; begin x := -5 end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Number(n) => {
                assert_eq!(n.value, NumberValue::Integer(-5));
                assert_eq!(n.kind, NumberKind::SignedInteger);
            }
            _ => panic!("Expected signed number"),
        }
    }

    #[test]
    fn test_sign_on_variable_is_unary() {
        let program = parse_ok("program P; begin x := -y end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Unary { op, operand } => {
                assert_eq!(*op, UnaryOp::Minus);
                assert!(operand.as_identifier().is_some());
            }
            _ => panic!("Expected unary expression"),
        }
    }

    #[test]
    fn test_not_applies_to_factor() {
        let program = parse_ok("program P; begin b := not a and c end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Binary { op, left, .. } => {
                assert_eq!(*op, BinaryOp::And);
                assert!(matches!(left.kind, ExpressionKind::Unary { op: UnaryOp::Not, .. }));
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_function_call_and_set_constructor() {
        let program = parse_ok("program P; begin x := f(1, y); s := [1, 3..5] end.");
        match &assigned_value(&program).kind {
            ExpressionKind::Call { name, args } => {
                assert_eq!(name.name, "f");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("Expected call"),
        }
        match &program.block.body.kind {
            StatementKind::Compound(stmts) => match &stmts[1].kind {
                StatementKind::Assignment { value, .. } => match &value.kind {
                    ExpressionKind::Set(elements) => {
                        assert_eq!(elements.len(), 2);
                        assert!(elements[0].end.is_none());
                        assert!(elements[1].end.is_some());
                    }
                    _ => panic!("Expected set constructor"),
                },
                _ => panic!("Expected assignment"),
            },
            _ => panic!("Expected compound statement"),
        }
    }

    #[test]
    fn test_variable_access_chain() {
        let program = parse_ok("program P; begin a[i, j].f^ := 1 end.");
        match &first_statement(&program).kind {
            StatementKind::Assignment { target, .. } => match &target.kind {
                VariableKind::Dereference(base) => match &base.kind {
                    VariableKind::Field { base, field } => {
                        assert_eq!(field.name, "f");
                        match &base.kind {
                            VariableKind::Indexed { indices, .. } => assert_eq!(indices.len(), 2),
                            _ => panic!("Expected indexed variable"),
                        }
                    }
                    _ => panic!("Expected field designator"),
                },
                _ => panic!("Expected dereference"),
            },
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_node_ids_are_unique() {
        let program = parse_ok("program P; begin x := a + b; y := c end.");
        let mut ids = vec![];
        match &program.block.body.kind {
            StatementKind::Compound(stmts) => {
                for stmt in stmts {
                    ids.push(stmt.id);
                    if let StatementKind::Assignment { target, value } = &stmt.kind {
                        ids.push(target.id);
                        ids.push(value.id);
                    }
                }
            }
            _ => panic!("Expected compound statement"),
        }
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }

    #[test]
    fn test_positions_span_first_to_last_token() {
        let program = parse_ok("program P;\nbegin\n  x := 1\nend.");
        let stmt = first_statement(&program);
        assert_eq!(stmt.span.start.row, 3);
        assert_eq!(stmt.span.start.col, 2);
        assert_eq!(stmt.span.end.col, 8);
        assert_eq!(program.span.start.offset, 0);
    }

    #[test]
    fn test_missing_semicolon_is_unrecoverable() {
        let mut parser = Parser::new("program P begin end.");
        let err = parser.parse().unwrap_err();
        let diag = parser.error_to_diagnostic(&err);
        assert_eq!(diag.message(), "Unexpected token: KW_BEGIN");
        assert!(diag.is_fatal());
    }

    #[test]
    fn test_unexpected_eof() {
        let mut parser = Parser::new("program P; begin x := 1");
        let err = parser.parse().unwrap_err();
        assert!(matches!(err, ParserError::UnexpectedEof { .. }));
        assert_eq!(parser.error_to_diagnostic(&err).message(), "Unexpected End-Of-File.");
    }

    #[test]
    fn test_trailing_tokens_after_dot() {
        let mut parser = Parser::new("program P; begin end. x");
        assert!(parser.parse().is_err());
    }

    #[test]
    fn test_nested_routines() {
        let program = parse_ok(
            "program P;
             procedure Outer;
               function Inner(a: Integer): Integer;
               begin Inner := a end;
             begin end;
             begin Outer end.",
        );
        assert_eq!(program.block.routines.len(), 1);
        match &program.block.routines[0].body {
            RoutineBody::Block(block) => {
                assert_eq!(block.routines.len(), 1);
                assert!(block.routines[0].heading.is_function());
            }
            RoutineBody::Directive(_) => panic!("Expected block body"),
        }
    }

    #[test]
    fn test_dump_round_trip() {
        let program = parse_ok(
            "program P;
             label 10;
             const c = -3; s = 'str';
             type Color = (red, green); R = record a: Integer; case t: Color of red: (x: Real) end;
             var a: array [1..3] of Integer; r: R;
             procedure Q(var n: Integer; m: Real); forward;
             procedure Q; begin n := n + 1 end;
             begin
               10: a[1] := c;
               if a[1] > 0 then WriteLn('pos') else WriteLn('neg');
               while a[1] < 5 do a[1] := a[1] + 1;
               repeat a[2] := 0 until true;
               for i := 1 to 3 do ;
               case a[1] of 1, 2: ; 3: goto 10 end;
               with r do a := 1
             end.",
        );
        let dumped = program.dump();
        let text = serde_json::to_string_pretty(&dumped).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, dumped);
        assert_eq!(dumped["type"], "ProgramNode");
        assert_eq!(dumped["heading"]["name"], "P");
        assert_eq!(dumped["body"]["labels"][0]["value"], 10);
    }
}
