//! Pascal Lexer
//!
//! This crate implements the lexical analysis (tokenization) phase of the compiler.
//! It converts source code into a stream of tokens, absorbing comments and
//! recording lexical diagnostics without ever halting.

use errors::{Diagnostic, DiagnosticKind};
use thiserror::Error;
use tokens::{lookup_keyword, Position, Span, Token, TokenKind};

/// Lexer error
///
/// Errors are recorded as diagnostics; the lexer always reaches end of input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    /// Character that starts no token
    #[error("Unexpected character {ch:?}")]
    UnexpectedCharacter { ch: char, span: Span },
    /// End of input inside a comment
    #[error("Non-terminated comment")]
    NonterminatedComment { span: Span },
    /// Comment opened with one delimiter kind and closed with the other
    #[error("Mismatched comment delimiter: expected {expected}, got {actual}")]
    MismatchedCommentDelimiter {
        expected: &'static str,
        actual: &'static str,
        span: Span,
    },
}

impl LexerError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LexerError::UnexpectedCharacter { ch, span } => {
                Diagnostic::new(DiagnosticKind::UnexpectedCharacter, *span).with_arg("character", format!("{:?}", ch))
            }
            LexerError::NonterminatedComment { span } => Diagnostic::new(DiagnosticKind::NonterminatedComment, *span),
            LexerError::MismatchedCommentDelimiter { expected, actual, span } => {
                Diagnostic::new(DiagnosticKind::MismatchedCommentDelimiter, *span)
                    .with_arg("expected", expected)
                    .with_arg("actual", actual)
            }
        }
    }
}

/// Comment delimiter family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentBrace {
    /// `{ }`
    Mono,
    /// `(* *)`
    Dual,
}

impl CommentBrace {
    fn closer(&self) -> &'static str {
        match self {
            CommentBrace::Mono => "}",
            CommentBrace::Dual => "*)",
        }
    }
}

/// Completed-line bookkeeping used to turn offsets back into rows and columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    /// Byte length of every completed line, newline included
    line_lens: Vec<usize>,
    /// Offset at which the current line starts
    last_line_pos: usize,
    finished: bool,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newline; `next_line_start` is the offset just after it
    fn newline(&mut self, next_line_start: usize) {
        self.line_lens.push(next_line_start - self.last_line_pos);
        self.last_line_pos = next_line_start;
    }

    /// Push the length of the final, unterminated line
    fn finish(&mut self, end: usize) {
        if !self.finished {
            self.line_lens.push(end - self.last_line_pos);
            self.last_line_pos = end;
            self.finished = true;
        }
    }

    /// Current 1-based line number
    pub fn lineno(&self) -> usize {
        if self.finished {
            self.line_lens.len()
        } else {
            self.line_lens.len() + 1
        }
    }

    pub fn line_lens(&self) -> &[usize] {
        &self.line_lens
    }

    /// Convert a byte offset to `(row, col)`: row 1-based, column 0-based.
    ///
    /// Linear scan over completed lines; diagnostics only.
    pub fn pos_to_row_col(&self, pos: usize) -> (usize, usize) {
        if !self.finished && pos >= self.last_line_pos {
            return (self.lineno(), pos - self.last_line_pos);
        }
        let mut acc = 0;
        for (i, len) in self.line_lens.iter().enumerate() {
            if pos < acc + len {
                return (i + 1, pos - acc);
            }
            acc += len;
        }
        if self.finished {
            let last = self.line_lens.last().copied().unwrap_or(0);
            let row = self.line_lens.len().max(1);
            return (row, pos.saturating_sub(acc - last));
        }
        (self.lineno(), pos.saturating_sub(self.last_line_pos))
    }
}

/// Lexer (scanner) for Pascal
pub struct Lexer {
    /// Source code
    source: Vec<char>,
    /// Current position (char index)
    position: usize,
    /// Current byte offset
    offset: usize,
    lines: LineMap,
    /// Lookahead buffer (for peek)
    lookahead: Option<Token>,
    diagnostics: Vec<Diagnostic>,
    filename: Option<String>,
}

impl Lexer {
    /// Create a new lexer from source code
    pub fn new(source: &str) -> Self {
        Self::new_with_file(source, None)
    }

    pub fn new_with_file(source: &str, filename: Option<String>) -> Self {
        Self {
            source: source.chars().collect(),
            position: 0,
            offset: 0,
            lines: LineMap::new(),
            lookahead: None,
            diagnostics: vec![],
            filename,
        }
    }

    /// Restore the initial state for another pass over the same source
    pub fn reset(&mut self) {
        self.position = 0;
        self.offset = 0;
        self.lines = LineMap::new();
        self.lookahead = None;
        self.diagnostics.clear();
    }

    /// Close the line table after the last token
    pub fn finish(&mut self) {
        self.lines.finish(self.offset);
    }

    /// Lex the whole input, returning every token before EOF
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = vec![];
        loop {
            let token = self.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token);
        }
        self.finish();
        tokens
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn line_lens(&self) -> &[usize] {
        self.lines.line_lens()
    }

    pub fn pos_to_row_col(&self, pos: usize) -> (usize, usize) {
        self.lines.pos_to_row_col(pos)
    }

    /// Get the next token; `Eof` is returned forever once input is exhausted
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.lookahead.take() {
            return token;
        }

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                let pos = self.position_here();
                return Token::new(TokenKind::Eof, "", Span::at(pos));
            }

            let ch = self.current_char();
            if ch == '{' {
                self.skip_comment(CommentBrace::Mono);
                continue;
            }
            if ch == '(' && self.peek_char() == Some('*') {
                self.skip_comment(CommentBrace::Dual);
                continue;
            }

            let start_pos = self.position;
            let start = self.position_here();

            let kind = if ch.is_ascii_alphabetic() || ch == '_' {
                Some(self.scan_identifier_or_keyword())
            } else if ch.is_ascii_digit() {
                Some(self.scan_number())
            } else if ch == '\'' {
                self.scan_string()
            } else {
                self.scan_operator_or_delimiter()
            };

            match kind {
                Some(kind) => {
                    let text: String = self.source[start_pos..self.position].iter().collect();
                    let span = Span::new(start, self.position_here());
                    return Token::new(kind, text, span);
                }
                None => {
                    // Skip exactly one character and keep going
                    self.advance();
                    let span = Span::new(start, self.position_here());
                    self.report(LexerError::UnexpectedCharacter { ch, span });
                }
            }
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> &Token {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.next_token(),
        };
        self.lookahead.insert(token)
    }

    fn report(&mut self, error: LexerError) {
        let diagnostic = error.to_diagnostic().with_file(self.filename.clone());
        self.diagnostics.push(diagnostic);
    }

    fn position_here(&self) -> Position {
        let (row, col) = self.lines.pos_to_row_col(self.offset);
        Position::new(self.offset, row, col)
    }

    /// Check if we're at the end of source
    fn is_at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    /// Get current character
    fn current_char(&self) -> char {
        self.source.get(self.position).copied().unwrap_or('\0')
    }

    /// Peek at next character without advancing
    fn peek_char(&self) -> Option<char> {
        self.peek_char_at(1)
    }

    /// Peek at character at offset without advancing
    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.position + offset).copied()
    }

    /// Advance to next character
    fn advance(&mut self) {
        if let Some(&ch) = self.source.get(self.position) {
            self.position += 1;
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.lines.newline(self.offset);
            }
        }
    }

    /// Skip separators
    fn skip_whitespace(&mut self) {
        while matches!(self.current_char(), ' ' | '\t' | '\n' | '\r' | '\x0c') && !self.is_at_end() {
            self.advance();
        }
    }

    /// Skip a comment opened by `{` or `(*`; it closes at the first `}` or `*)`
    fn skip_comment(&mut self, opener: CommentBrace) {
        let start = self.position_here();
        match opener {
            CommentBrace::Mono => self.advance(),
            CommentBrace::Dual => {
                self.advance();
                self.advance();
            }
        }

        while !self.is_at_end() {
            let closer = if self.current_char() == '}' {
                Some(CommentBrace::Mono)
            } else if self.current_char() == '*' && self.peek_char() == Some(')') {
                Some(CommentBrace::Dual)
            } else {
                None
            };

            match closer {
                Some(closer) => {
                    self.advance();
                    if closer == CommentBrace::Dual {
                        self.advance();
                    }
                    if closer != opener {
                        let span = Span::new(start, self.position_here());
                        self.report(LexerError::MismatchedCommentDelimiter {
                            expected: opener.closer(),
                            actual: closer.closer(),
                            span,
                        });
                    }
                    return;
                }
                None => self.advance(),
            }
        }

        let span = Span::new(start, self.position_here());
        self.report(LexerError::NonterminatedComment { span });
    }

    /// Scan identifier or keyword
    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while self.current_char().is_ascii_alphanumeric() || self.current_char() == '_' {
            self.advance();
        }

        let text: String = self.source[start..self.position].iter().collect();
        lookup_keyword(&text).unwrap_or(TokenKind::Identifier(text))
    }

    /// Length of an exponent part (`e`, optional sign, digits) starting `at` chars ahead, if any
    fn exponent_len(&self, at: usize) -> Option<usize> {
        match self.peek_char_at(at) {
            Some('e') | Some('E') => {}
            _ => return None,
        }
        let mut len = 1;
        if matches!(self.peek_char_at(at + len), Some('+') | Some('-')) {
            len += 1;
        }
        let digits_start = len;
        while self.peek_char_at(at + len).is_some_and(|c| c.is_ascii_digit()) {
            len += 1;
        }
        if len == digits_start {
            None
        } else {
            Some(len)
        }
    }

    /// Scan an unsigned number
    ///
    /// Reals are tried before integers: `1.5`, `1e3`, `1.e3`, `1.5e-3`.
    /// `1..5` lexes as integer, range, integer.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;
        while self.current_char().is_ascii_digit() && !self.is_at_end() {
            self.advance();
        }

        let mut is_real = false;
        if self.current_char() == '.' && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(); // '.'
            while self.current_char().is_ascii_digit() && !self.is_at_end() {
                self.advance();
            }
            is_real = true;
            if let Some(len) = self.exponent_len(0) {
                for _ in 0..len {
                    self.advance();
                }
            }
        } else if self.current_char() == '.' && self.peek_char() != Some('.') {
            if let Some(len) = self.exponent_len(1) {
                for _ in 0..=len {
                    self.advance();
                }
                is_real = true;
            }
        } else if let Some(len) = self.exponent_len(0) {
            for _ in 0..len {
                self.advance();
            }
            is_real = true;
        }

        let text: String = self.source[start..self.position].iter().collect();
        if is_real {
            TokenKind::UnsignedReal(text.parse::<f64>().unwrap_or(f64::MAX))
        } else {
            TokenKind::UnsignedInteger(text.parse::<i64>().unwrap_or(i64::MAX))
        }
    }

    /// Scan a `'`-delimited string; `''` stands for one quote.
    ///
    /// Returns `None` without consuming anything when the string never closes.
    fn scan_string(&mut self) -> Option<TokenKind> {
        let mut look = self.position + 1;
        let mut value = String::new();
        loop {
            match self.source.get(look) {
                None => return None,
                Some('\'') => {
                    if self.source.get(look + 1) == Some(&'\'') {
                        value.push('\'');
                        look += 2;
                    } else {
                        look += 1;
                        break;
                    }
                }
                Some(&c) => {
                    value.push(c);
                    look += 1;
                }
            }
        }
        while self.position < look {
            self.advance();
        }
        Some(TokenKind::StringLiteral(value))
    }

    /// Scan operator or delimiter; `None` for an unexpected character
    fn scan_operator_or_delimiter(&mut self) -> Option<TokenKind> {
        let ch = self.current_char();
        let next = self.peek_char();

        let (kind, width) = match (ch, next) {
            // Two-character operators
            (':', Some('=')) => (TokenKind::Assign, 2),
            ('<', Some('>')) => (TokenKind::NotEqual, 2),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('.', Some('.')) => (TokenKind::DotDot, 2),
            ('(', Some('.')) => (TokenKind::LeftBracket, 2),
            ('.', Some(')')) => (TokenKind::RightBracket, 2),
            // Single-character operators/delimiters
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('=', _) => (TokenKind::Equal, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('>', _) => (TokenKind::Greater, 1),
            ('(', _) => (TokenKind::LeftParen, 1),
            (')', _) => (TokenKind::RightParen, 1),
            ('[', _) => (TokenKind::LeftBracket, 1),
            (']', _) => (TokenKind::RightBracket, 1),
            ('.', _) => (TokenKind::Dot, 1),
            (',', _) => (TokenKind::Comma, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('^', _) | ('@', _) | ('↑', _) => (TokenKind::UpArrow, 1),
            _ => return None,
        };

        for _ in 0..width {
            self.advance();
        }
        Some(kind)
    }
}

impl Iterator for Lexer {
    type Item = Token;

    /// Yields tokens up to, not including, EOF
    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    // ===== Basic Token Recognition =====

    #[test]
    fn test_keywords() {
        let mut lexer = Lexer::new("program begin end var const type label");
        assert_eq!(lexer.next_token().kind, TokenKind::KwProgram);
        assert_eq!(lexer.next_token().kind, TokenKind::KwBegin);
        assert_eq!(lexer.next_token().kind, TokenKind::KwEnd);
        assert_eq!(lexer.next_token().kind, TokenKind::KwVar);
        assert_eq!(lexer.next_token().kind, TokenKind::KwConst);
        assert_eq!(lexer.next_token().kind, TokenKind::KwType);
        assert_eq!(lexer.next_token().kind, TokenKind::KwLabel);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("BEGIN Begin begin"),
            vec![TokenKind::KwBegin, TokenKind::KwBegin, TokenKind::KwBegin]
        );
    }

    #[test]
    fn test_identifiers_vs_keywords() {
        let tokens = kinds("beginning end_x do1 x");
        assert_eq!(tokens[0], TokenKind::Identifier("beginning".into()));
        assert_eq!(tokens[1], TokenKind::Identifier("end_x".into()));
        assert_eq!(tokens[2], TokenKind::Identifier("do1".into()));
        assert_eq!(tokens[3], TokenKind::Identifier("x".into()));
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(
            kinds("0 42 2147483647"),
            vec![
                TokenKind::UnsignedInteger(0),
                TokenKind::UnsignedInteger(42),
                TokenKind::UnsignedInteger(2147483647),
            ]
        );
    }

    #[test]
    fn test_real_literals_before_integers() {
        assert_eq!(
            kinds("1.5 2e3 1.e2 3.25E-2"),
            vec![
                TokenKind::UnsignedReal(1.5),
                TokenKind::UnsignedReal(2000.0),
                TokenKind::UnsignedReal(100.0),
                TokenKind::UnsignedReal(0.0325),
            ]
        );
    }

    #[test]
    fn test_range_is_not_real() {
        assert_eq!(
            kinds("1..10"),
            vec![TokenKind::UnsignedInteger(1), TokenKind::DotDot, TokenKind::UnsignedInteger(10)]
        );
    }

    #[test]
    fn test_integer_then_dot() {
        assert_eq!(kinds("1."), vec![TokenKind::UnsignedInteger(1), TokenKind::Dot]);
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            kinds("'hello' 'it''s' ''"),
            vec![
                TokenKind::StringLiteral("hello".into()),
                TokenKind::StringLiteral("it's".into()),
                TokenKind::StringLiteral(String::new()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_skips_quote() {
        let mut lexer = Lexer::new("'abc");
        let tokens: Vec<TokenKind> = lexer.by_ref().map(|t| t.kind).collect();
        assert_eq!(tokens, vec![TokenKind::Identifier("abc".into())]);
        assert_eq!(lexer.diagnostics().len(), 1);
        assert_eq!(lexer.diagnostics()[0].kind, DiagnosticKind::UnexpectedCharacter);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ - * / = <> < <= > >= := .. ^ @ ↑"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Assign,
                TokenKind::DotDot,
                TokenKind::UpArrow,
                TokenKind::UpArrow,
                TokenKind::UpArrow,
            ]
        );
    }

    #[test]
    fn test_delimiters_and_alternate_brackets() {
        assert_eq!(
            kinds("( ) [ ] (. .) , ; : ."),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Colon,
                TokenKind::Dot,
            ]
        );
    }

    // ===== Comments =====

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a { comment } b (* other *) c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Identifier("b".into()),
                TokenKind::Identifier("c".into()),
            ]
        );
    }

    #[test]
    fn test_comment_closes_at_first_closer() {
        assert_eq!(
            kinds("{ a { b } c"),
            vec![TokenKind::Identifier("c".into())]
        );
    }

    #[test]
    fn test_mismatched_comment_delimiter_warns() {
        let mut lexer = Lexer::new("{ abc *) x");
        let tokens = lexer.tokenize();
        assert_eq!(tokens.len(), 1);
        let diags = lexer.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::MismatchedCommentDelimiter);
        assert!(!diags[0].is_fatal());
        assert_eq!(
            diags[0].message(),
            "Mismatched comment delimiter. Expected '}', got '*)'."
        );
    }

    #[test]
    fn test_nonterminated_comment() {
        let mut lexer = Lexer::new("x := 1; { abc");
        let tokens = lexer.tokenize();
        assert_eq!(tokens.len(), 4);
        let diags = lexer.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::NonterminatedComment);
        assert!(diags[0].is_fatal());
    }

    #[test]
    fn test_unexpected_character_skips_one() {
        let mut lexer = Lexer::new("a $ b");
        let tokens = lexer.tokenize();
        assert_eq!(tokens.len(), 2);
        let diags = lexer.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message(), "Unexpected character: '$'");
        assert_eq!(diags[0].span.start.offset, 2);
    }

    // ===== Positions =====

    #[test]
    fn test_token_positions() {
        let mut lexer = Lexer::new("program p;\n  var x");
        let program = lexer.next_token();
        assert_eq!(program.span.start, Position::new(0, 1, 0));
        assert_eq!(program.span.end, Position::new(7, 1, 7));
        lexer.next_token();
        lexer.next_token();
        let var = lexer.next_token();
        assert_eq!(var.kind, TokenKind::KwVar);
        assert_eq!(var.span.start, Position::new(13, 2, 2));
        assert_eq!(var.text, "var");
    }

    #[test]
    fn test_positions_after_multiline_comment() {
        let mut lexer = Lexer::new("a {\n\n} b");
        lexer.next_token();
        let b = lexer.next_token();
        assert_eq!(b.span.start.row, 3);
        assert_eq!(b.span.start.col, 2);
    }

    #[test]
    fn test_line_lens_and_lookup() {
        let mut lexer = Lexer::new("ab\ncde\nf");
        lexer.tokenize();
        assert_eq!(lexer.line_lens(), &[3, 4, 1]);
        assert_eq!(lexer.pos_to_row_col(0), (1, 0));
        assert_eq!(lexer.pos_to_row_col(3), (2, 0));
        assert_eq!(lexer.pos_to_row_col(5), (2, 2));
        assert_eq!(lexer.pos_to_row_col(7), (3, 0));
    }

    // ===== Lookahead and reset =====

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("x := 1");
        assert_eq!(lexer.peek_token().kind, TokenKind::Identifier("x".into()));
        assert_eq!(lexer.peek_token().kind, TokenKind::Identifier("x".into()));
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier("x".into()));
        assert_eq!(lexer.next_token().kind, TokenKind::Assign);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut lexer = Lexer::new("a\n$ b");
        let first = lexer.tokenize();
        assert_eq!(lexer.diagnostics().len(), 1);
        lexer.reset();
        assert!(lexer.diagnostics().is_empty());
        assert!(lexer.line_lens().is_empty());
        let second = lexer.tokenize();
        assert_eq!(first, second);
        assert_eq!(lexer.diagnostics().len(), 1);
    }

    #[test]
    fn test_simple_program() {
        let source = "program Hello;\nbegin\n  WriteLn('Hi')\nend.";
        let tokens = kinds(source);
        assert_eq!(
            tokens,
            vec![
                TokenKind::KwProgram,
                TokenKind::Identifier("Hello".into()),
                TokenKind::Semicolon,
                TokenKind::KwBegin,
                TokenKind::Identifier("WriteLn".into()),
                TokenKind::LeftParen,
                TokenKind::StringLiteral("Hi".into()),
                TokenKind::RightParen,
                TokenKind::KwEnd,
                TokenKind::Dot,
            ]
        );
    }
}
