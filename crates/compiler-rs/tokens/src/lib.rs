//! Pascal Token Definitions
//!
//! This crate defines all token types for the Pascal compiler.
//! Tokens are the atomic units of the language that the lexer produces.

use serde::Serialize;

/// A point in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Byte offset from the start of the source
    pub offset: usize,
    /// Row number (1-based)
    pub row: usize,
    /// Column number (0-based)
    pub col: usize,
}

impl Position {
    pub fn new(offset: usize, row: usize, col: usize) -> Self {
        Self { offset, row, col }
    }

    /// `[offset, row, col]` triple used by the AST dump and raw diagnostics
    pub fn triple(&self) -> [usize; 3] {
        [self.offset, self.row, self.col]
    }
}

/// Source code location information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: Position,
    /// End position (exclusive offset)
    pub end: Position,
}

impl Span {
    /// Create a new span
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Create a zero-length span at a position
    pub fn at(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    /// Merge two spans (from start of first to end of second)
    pub fn merge(self, other: Self) -> Self {
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        Self { start, end }
    }

    /// Length of the spanned text in bytes
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token kinds for Pascal
///
/// Based on the ISO 7185 lexical structure:
/// - Word symbols (keywords)
/// - Identifiers
/// - Unsigned numbers and character strings
/// - Special symbols
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ===== Keywords =====
    KwAnd,
    KwArray,
    KwBegin,
    KwCase,
    KwConst,
    KwDiv,
    KwDo,
    KwDownto,
    KwElse,
    KwEnd,
    KwFile,
    KwFor,
    KwFunction,
    KwGoto,
    KwIf,
    KwIn,
    KwLabel,
    KwMod,
    KwNil,
    KwNot,
    KwOf,
    KwOr,
    KwPacked,
    KwProcedure,
    KwProgram,
    KwRecord,
    KwRepeat,
    KwSet,
    KwThen,
    KwTo,
    KwType,
    KwUntil,
    KwVar,
    KwWhile,
    KwWith,

    // ===== Identifiers =====
    Identifier(String),

    // ===== Literals =====
    /// Unsigned real: `1.5`, `2e10`, `3.0E-2`
    UnsignedReal(f64),
    /// Unsigned integer: digit sequence
    UnsignedInteger(i64),
    /// Character string with `''` already decoded to `'`
    StringLiteral(String),

    // ===== Operators =====
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Equal,        // =
    NotEqual,     // <>
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Assign,       // :=
    DotDot,       // ..
    UpArrow,      // ↑ ^ @

    // ===== Delimiters =====
    Dot,          // .
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [ (.
    RightBracket, // ] .)

    // ===== Special =====
    /// End of file
    Eof,
}

impl TokenKind {
    /// Upper-snake name of the kind, as used in diagnostics (`KW_BEGIN`, `SEMICOLON`)
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::KwAnd => "KW_AND",
            TokenKind::KwArray => "KW_ARRAY",
            TokenKind::KwBegin => "KW_BEGIN",
            TokenKind::KwCase => "KW_CASE",
            TokenKind::KwConst => "KW_CONST",
            TokenKind::KwDiv => "KW_DIV",
            TokenKind::KwDo => "KW_DO",
            TokenKind::KwDownto => "KW_DOWNTO",
            TokenKind::KwElse => "KW_ELSE",
            TokenKind::KwEnd => "KW_END",
            TokenKind::KwFile => "KW_FILE",
            TokenKind::KwFor => "KW_FOR",
            TokenKind::KwFunction => "KW_FUNCTION",
            TokenKind::KwGoto => "KW_GOTO",
            TokenKind::KwIf => "KW_IF",
            TokenKind::KwIn => "KW_IN",
            TokenKind::KwLabel => "KW_LABEL",
            TokenKind::KwMod => "KW_MOD",
            TokenKind::KwNil => "KW_NIL",
            TokenKind::KwNot => "KW_NOT",
            TokenKind::KwOf => "KW_OF",
            TokenKind::KwOr => "KW_OR",
            TokenKind::KwPacked => "KW_PACKED",
            TokenKind::KwProcedure => "KW_PROCEDURE",
            TokenKind::KwProgram => "KW_PROGRAM",
            TokenKind::KwRecord => "KW_RECORD",
            TokenKind::KwRepeat => "KW_REPEAT",
            TokenKind::KwSet => "KW_SET",
            TokenKind::KwThen => "KW_THEN",
            TokenKind::KwTo => "KW_TO",
            TokenKind::KwType => "KW_TYPE",
            TokenKind::KwUntil => "KW_UNTIL",
            TokenKind::KwVar => "KW_VAR",
            TokenKind::KwWhile => "KW_WHILE",
            TokenKind::KwWith => "KW_WITH",
            TokenKind::Identifier(_) => "IDENTIFIER",
            TokenKind::UnsignedReal(_) => "UNSIGNED_REAL",
            TokenKind::UnsignedInteger(_) => "UNSIGNED_INTEGER",
            TokenKind::StringLiteral(_) => "STRING",
            TokenKind::Plus => "OP_PLUS",
            TokenKind::Minus => "OP_MINUS",
            TokenKind::Star => "OP_MULT",
            TokenKind::Slash => "OP_DIV",
            TokenKind::Equal => "OP_EQ",
            TokenKind::NotEqual => "OP_NEQ",
            TokenKind::Less => "OP_LT",
            TokenKind::LessEqual => "OP_LTE",
            TokenKind::Greater => "OP_GT",
            TokenKind::GreaterEqual => "OP_GTE",
            TokenKind::Assign => "OP_ASSIGN",
            TokenKind::DotDot => "OP_RANGE",
            TokenKind::UpArrow => "OP_UPARROW",
            TokenKind::Dot => "DOT",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::LeftParen => "LPAREN",
            TokenKind::RightParen => "RPAREN",
            TokenKind::LeftBracket => "LSBRACKET",
            TokenKind::RightBracket => "RSBRACKET",
            TokenKind::Eof => "EOF",
        }
    }

    /// Compare kinds ignoring literal payloads
    pub fn same_kind(&self, other: &TokenKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A token with source location information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text the token was scanned from
    pub text: String,
    pub span: Span,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Check if token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::KwAnd
                | TokenKind::KwArray
                | TokenKind::KwBegin
                | TokenKind::KwCase
                | TokenKind::KwConst
                | TokenKind::KwDiv
                | TokenKind::KwDo
                | TokenKind::KwDownto
                | TokenKind::KwElse
                | TokenKind::KwEnd
                | TokenKind::KwFile
                | TokenKind::KwFor
                | TokenKind::KwFunction
                | TokenKind::KwGoto
                | TokenKind::KwIf
                | TokenKind::KwIn
                | TokenKind::KwLabel
                | TokenKind::KwMod
                | TokenKind::KwNil
                | TokenKind::KwNot
                | TokenKind::KwOf
                | TokenKind::KwOr
                | TokenKind::KwPacked
                | TokenKind::KwProcedure
                | TokenKind::KwProgram
                | TokenKind::KwRecord
                | TokenKind::KwRepeat
                | TokenKind::KwSet
                | TokenKind::KwThen
                | TokenKind::KwTo
                | TokenKind::KwType
                | TokenKind::KwUntil
                | TokenKind::KwVar
                | TokenKind::KwWhile
                | TokenKind::KwWith
        )
    }

    /// Check if token is an operator
    pub fn is_operator(&self) -> bool {
        self.kind.is_binary_operator() || self.kind.is_unary_operator() || self.kind == TokenKind::Assign
    }

    /// Check if token is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::UnsignedReal(_) | TokenKind::UnsignedInteger(_) | TokenKind::StringLiteral(_)
        )
    }
}

/// Operator precedence levels (higher = tighter binding)
///
/// Relational operators bind loosest: an expression is at most one
/// comparison between two simple expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence (assignment, etc.)
    Lowest = 0,
    /// Comparison operators (=, <>, <, <=, >, >=, in)
    Relational = 1,
    /// Adding operators (+, -, or)
    Add = 2,
    /// Multiplying operators (*, /, div, mod, and)
    Mul = 3,
    /// Unary `not`
    Unary = 4,
    /// Highest precedence (parentheses, brackets)
    Highest = 5,
}

impl TokenKind {
    /// Get operator precedence (if this is an operator)
    ///
    /// Plus and Minus return their binary precedence; signs are handled by the parser.
    pub fn precedence(&self) -> Option<Precedence> {
        match self {
            TokenKind::KwNot => Some(Precedence::Unary),
            TokenKind::Star | TokenKind::Slash | TokenKind::KwDiv | TokenKind::KwMod | TokenKind::KwAnd => {
                Some(Precedence::Mul)
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::KwOr => Some(Precedence::Add),
            TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::KwIn => Some(Precedence::Relational),
            TokenKind::Assign => Some(Precedence::Lowest),
            TokenKind::LeftParen | TokenKind::LeftBracket => Some(Precedence::Highest),
            _ => None,
        }
    }

    /// Check if this is a binary operator
    pub fn is_binary_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::KwDiv
                | TokenKind::KwMod
                | TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::KwAnd
                | TokenKind::KwOr
                | TokenKind::KwIn
        )
    }

    /// Check if this is a unary operator
    pub fn is_unary_operator(&self) -> bool {
        matches!(self, TokenKind::Plus | TokenKind::Minus | TokenKind::KwNot)
    }
}

/// Fast case-insensitive ASCII character comparison
#[inline]
fn ascii_to_lower(ch: u8) -> u8 {
    if ch.is_ascii_uppercase() {
        ch | 0x20
    } else {
        ch
    }
}

/// Fast case-insensitive string comparison (ASCII only)
///
/// Early exit on mismatch, no allocation.
#[inline]
pub fn eq_ignore_ascii_case(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .all(|(a_ch, b_ch)| ascii_to_lower(a_ch) == ascii_to_lower(b_ch))
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("and", TokenKind::KwAnd),
    ("array", TokenKind::KwArray),
    ("begin", TokenKind::KwBegin),
    ("case", TokenKind::KwCase),
    ("const", TokenKind::KwConst),
    ("div", TokenKind::KwDiv),
    ("do", TokenKind::KwDo),
    ("downto", TokenKind::KwDownto),
    ("else", TokenKind::KwElse),
    ("end", TokenKind::KwEnd),
    ("file", TokenKind::KwFile),
    ("for", TokenKind::KwFor),
    ("function", TokenKind::KwFunction),
    ("goto", TokenKind::KwGoto),
    ("if", TokenKind::KwIf),
    ("in", TokenKind::KwIn),
    ("label", TokenKind::KwLabel),
    ("mod", TokenKind::KwMod),
    ("nil", TokenKind::KwNil),
    ("not", TokenKind::KwNot),
    ("of", TokenKind::KwOf),
    ("or", TokenKind::KwOr),
    ("packed", TokenKind::KwPacked),
    ("procedure", TokenKind::KwProcedure),
    ("program", TokenKind::KwProgram),
    ("record", TokenKind::KwRecord),
    ("repeat", TokenKind::KwRepeat),
    ("set", TokenKind::KwSet),
    ("then", TokenKind::KwThen),
    ("to", TokenKind::KwTo),
    ("type", TokenKind::KwType),
    ("until", TokenKind::KwUntil),
    ("var", TokenKind::KwVar),
    ("while", TokenKind::KwWhile),
    ("with", TokenKind::KwWith),
];

/// Keyword lookup
///
/// Maps keyword strings (case-insensitive) to TokenKind
pub fn lookup_keyword(s: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(word, _)| eq_ignore_ascii_case(s, word))
        .map(|(_, kind)| kind.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        // Case-insensitive lookup
        assert_eq!(lookup_keyword("if"), Some(TokenKind::KwIf));
        assert_eq!(lookup_keyword("IF"), Some(TokenKind::KwIf));
        assert_eq!(lookup_keyword("If"), Some(TokenKind::KwIf));
        assert_eq!(lookup_keyword("downto"), Some(TokenKind::KwDownto));
        assert_eq!(lookup_keyword("With"), Some(TokenKind::KwWith));

        // Non-keywords return None
        assert_eq!(lookup_keyword("myvar"), None);
        assert_eq!(lookup_keyword("integer"), None);
        assert_eq!(lookup_keyword("forward"), None);
    }

    #[test]
    fn test_eq_ignore_ascii_case() {
        assert!(eq_ignore_ascii_case("hello", "hello"));
        assert!(eq_ignore_ascii_case("HELLO", "hello"));
        assert!(eq_ignore_ascii_case("HeLlO", "hElLo"));
        assert!(!eq_ignore_ascii_case("hello", "hell"));
        assert!(eq_ignore_ascii_case("", ""));
        assert!(!eq_ignore_ascii_case("", "a"));
    }

    #[test]
    fn test_token_kind_names() {
        assert_eq!(TokenKind::Semicolon.name(), "SEMICOLON");
        assert_eq!(TokenKind::KwBegin.name(), "KW_BEGIN");
        assert_eq!(TokenKind::Identifier("x".to_string()).name(), "IDENTIFIER");
        assert_eq!(TokenKind::UnsignedInteger(3).name(), "UNSIGNED_INTEGER");
        assert_eq!(TokenKind::Plus.name(), "OP_PLUS");
        assert_eq!(TokenKind::LeftBracket.name(), "LSBRACKET");
    }

    #[test]
    fn test_token_kind_precedence() {
        assert_eq!(TokenKind::KwNot.precedence(), Some(Precedence::Unary));
        assert_eq!(TokenKind::KwAnd.precedence(), Some(Precedence::Mul));
        assert_eq!(TokenKind::KwOr.precedence(), Some(Precedence::Add));
        assert_eq!(TokenKind::KwIn.precedence(), Some(Precedence::Relational));
        assert!(Precedence::Mul > Precedence::Add);
        assert!(Precedence::Add > Precedence::Relational);
        assert_eq!(TokenKind::Semicolon.precedence(), None);
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(Position::new(0, 1, 0), Position::new(5, 1, 5));
        let b = Span::new(Position::new(10, 2, 3), Position::new(15, 2, 8));
        let merged = a.merge(b);
        assert_eq!(merged.start, Position::new(0, 1, 0));
        assert_eq!(merged.end, Position::new(15, 2, 8));
        assert_eq!(merged.len(), 15);
        assert_eq!(b.merge(a), merged);
    }

    #[test]
    fn test_token_checks() {
        let span = Span::at(Position::new(0, 1, 0));
        assert!(Token::new(TokenKind::KwWhile, "while", span).is_keyword());
        assert!(Token::new(TokenKind::Star, "*", span).is_operator());
        assert!(Token::new(TokenKind::UnsignedInteger(42), "42", span).is_literal());
        assert!(!Token::new(TokenKind::Identifier("x".into()), "x", span).is_literal());
    }

    #[test]
    fn test_same_kind_ignores_payload() {
        let a = TokenKind::Identifier("a".into());
        let b = TokenKind::Identifier("b".into());
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&TokenKind::Comma));
    }
}
