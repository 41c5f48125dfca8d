//! Statement parsing
//!
//! This module handles parsing of all statement types: assignments, procedure
//! calls, goto, compound, if, case, while, repeat, for and with.

use ast::{CaseArm, Constant, ForDirection, Statement, StatementKind};
use errors::{DiagnosticKind, ParserResult};
use tokens::{Span, TokenKind};

/// Statement parsing functionality
impl super::Parser {
    /// Parse statement: [label :] unlabelled-statement
    pub(crate) fn parse_statement(&mut self) -> ParserResult<Statement> {
        let start = self.current().span;

        let label = if self.check(&TokenKind::UnsignedInteger(0)) && self.check_peek(&TokenKind::Colon) {
            let label = self.expect_label()?;
            self.advance();
            Some(label)
        } else {
            None
        };

        let kind = self.parse_unlabelled_statement()?;
        let span = if matches!(kind, StatementKind::Empty) && label.is_none() {
            Span::at(start.start)
        } else {
            self.span_from(start)
        };

        Ok(Statement {
            id: self.ids.next_id(),
            label,
            kind,
            span,
        })
    }

    fn parse_unlabelled_statement(&mut self) -> ParserResult<StatementKind> {
        match self.current().kind {
            TokenKind::KwBegin => self.parse_compound_kind(),
            TokenKind::KwIf => self.parse_if_statement(),
            TokenKind::KwCase => self.parse_case_statement(),
            TokenKind::KwWhile => self.parse_while_statement(),
            TokenKind::KwRepeat => self.parse_repeat_statement(),
            TokenKind::KwFor => self.parse_for_statement(),
            TokenKind::KwWith => self.parse_with_statement(),
            TokenKind::KwGoto => {
                self.advance();
                Ok(StatementKind::Goto(self.expect_label()?))
            }
            TokenKind::Identifier(_) => self.parse_simple_statement(),
            TokenKind::Semicolon | TokenKind::KwEnd | TokenKind::KwElse | TokenKind::KwUntil => {
                Ok(StatementKind::Empty)
            }
            _ => Err(self.unexpected("statement")),
        }
    }

    /// Assignment or procedure statement, told apart by the token after the name
    fn parse_simple_statement(&mut self) -> ParserResult<StatementKind> {
        let is_assignment = [
            TokenKind::Assign,
            TokenKind::LeftBracket,
            TokenKind::Dot,
            TokenKind::UpArrow,
        ]
        .iter()
        .any(|kind| self.check_peek(kind));

        if is_assignment {
            let target = self.parse_variable_access()?;
            self.consume(TokenKind::Assign, ":=")?;
            let value = self.parse_expression()?;
            return Ok(StatementKind::Assignment { target, value });
        }

        let name = self.expect_identifier()?;
        let args = if self.check(&TokenKind::LeftParen) {
            self.parse_actual_parameters()?
        } else {
            vec![]
        };
        Ok(StatementKind::ProcedureCall { name, args })
    }

    /// Parse `begin statement {; statement} end`
    pub(crate) fn parse_compound_statement(&mut self) -> ParserResult<Statement> {
        let start = self.current().span;
        let kind = self.parse_compound_kind()?;
        Ok(Statement {
            id: self.ids.next_id(),
            label: None,
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_compound_kind(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwBegin, "BEGIN")?;
        let statements = self.parse_statement_sequence()?;
        self.consume(TokenKind::KwEnd, "END")?;
        Ok(StatementKind::Compound(statements))
    }

    fn parse_statement_sequence(&mut self) -> ParserResult<Vec<Statement>> {
        let mut statements = vec![self.parse_statement()?];
        while self.eat(&TokenKind::Semicolon) {
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /// Parse `if cond then stmt [else stmt]`; an `else` binds to the nearest `if`
    fn parse_if_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwIf, "IF")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::KwThen, "THEN")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(&TokenKind::KwElse) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StatementKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// Parse `case expr of arm {; arm} [;] end`
    fn parse_case_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwCase, "CASE")?;
        let selector = self.parse_expression()?;
        self.consume(TokenKind::KwOf, "OF")?;

        let mut arms = vec![];
        loop {
            if self.check(&TokenKind::KwEnd) || self.at_eof() {
                break;
            }
            match self.parse_case_arm() {
                Ok(arm) => arms.push(arm),
                Err(err) => {
                    let fallback = self
                        .diagnostic_here(DiagnosticKind::UnexpectedToken)
                        .with_arg("token", self.current().kind.name());
                    self.report_recovered(err, fallback);
                    self.synchronize(&[TokenKind::Semicolon, TokenKind::KwEnd]);
                }
            }
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }

        self.consume(TokenKind::KwEnd, "END")?;
        Ok(StatementKind::Case { selector, arms })
    }

    fn parse_case_arm(&mut self) -> ParserResult<CaseArm> {
        let start = self.current().span;
        let mut constants: Vec<Constant> = vec![self.parse_constant()?];
        while self.eat(&TokenKind::Comma) {
            constants.push(self.parse_constant()?);
        }
        self.consume(TokenKind::Colon, ":")?;
        let body = self.parse_statement()?;
        Ok(CaseArm {
            constants,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_while_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwWhile, "WHILE")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::KwDo, "DO")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StatementKind::While { condition, body })
    }

    fn parse_repeat_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwRepeat, "REPEAT")?;
        let body = self.parse_statement_sequence()?;
        self.consume(TokenKind::KwUntil, "UNTIL")?;
        let condition = self.parse_expression()?;
        Ok(StatementKind::Repeat { body, condition })
    }

    /// Parse `for ident := initial (to | downto) limit do stmt`
    fn parse_for_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwFor, "FOR")?;
        let control = self.expect_identifier()?;
        self.consume(TokenKind::Assign, ":=")?;
        let initial = self.parse_expression()?;

        let direction = match self.current().kind {
            TokenKind::KwTo => ForDirection::To,
            TokenKind::KwDownto => ForDirection::Downto,
            _ => return Err(self.unexpected("TO or DOWNTO")),
        };
        self.advance();

        let limit = self.parse_expression()?;
        self.consume(TokenKind::KwDo, "DO")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StatementKind::For {
            control,
            initial,
            direction,
            limit,
            body,
        })
    }

    /// Parse `with var {, var} do stmt`
    fn parse_with_statement(&mut self) -> ParserResult<StatementKind> {
        self.consume(TokenKind::KwWith, "WITH")?;
        let mut records = vec![self.parse_variable_access()?];
        while self.eat(&TokenKind::Comma) {
            records.push(self.parse_variable_access()?);
        }
        self.consume(TokenKind::KwDo, "DO")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StatementKind::With { records, body })
    }
}
