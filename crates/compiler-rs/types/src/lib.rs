//! Pascal Built-in Type Model
//!
//! This crate defines the predefined types (`Integer`, `Real`, `Boolean`,
//! `Char`, `String`, `Nil`) together with the compile-time value model used
//! for constant folding. Every arithmetic result is clamped into the range
//! of its type; division by zero, NaN and infinity are reported as errors
//! instead of producing IEEE special values.

use std::fmt;

use thiserror::Error;

/// Largest (and negated, smallest) `Integer` value
pub const MAX_INTEGER: i64 = 0x7fff_ffff;
pub const INTEGER_STEP: i64 = 1;

/// Largest (and negated, smallest) `Real` value
pub const MAX_REAL: f64 = 1.0e38;
pub const REAL_STEP: f64 = 1.0e-6;

/// Largest `Char` code
pub const MAX_CHAR: i64 = 255;

/// Predefined types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Integer,
    Real,
    Boolean,
    Char,
    String,
    Nil,
    /// Matches any type; only used for the parameters of `Write`, `WriteLn` and `ReadLn`
    Any,
}

impl BuiltinType {
    /// Name as declared in the built-in scope
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::Integer => "Integer",
            BuiltinType::Real => "Real",
            BuiltinType::Boolean => "Boolean",
            BuiltinType::Char => "Char",
            BuiltinType::String => "String",
            BuiltinType::Nil => "Nil",
            BuiltinType::Any => "@Any",
        }
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(self, BuiltinType::Integer | BuiltinType::Boolean | BuiltinType::Char)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, BuiltinType::Integer | BuiltinType::Real)
    }

    /// Inclusive ordinal bounds, for ordinal types
    pub fn ordinal_bounds(&self) -> Option<(i64, i64)> {
        match self {
            BuiltinType::Integer => Some((-MAX_INTEGER, MAX_INTEGER)),
            BuiltinType::Boolean => Some((0, 1)),
            BuiltinType::Char => Some((0, MAX_CHAR)),
            _ => None,
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors raised while folding constant expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("division by zero")]
    ZeroDivision,
    #[error("operation resulted in NaN")]
    NanResult,
    #[error("operation resulted in infinity")]
    InfinityResult,
    /// The operator is not defined for the operand types
    #[error("operator {op} not applicable to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: BuiltinType,
        right: BuiltinType,
    },
    #[error("value {value} out of range for {ty}")]
    OutOfRange { value: i64, ty: BuiltinType },
}

pub type TypeResult<T> = Result<T, TypeError>;

/// Binary operators understood by the value model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    /// `/`, always real
    Divide,
    /// `div`
    IntDivide,
    Mod,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntDivide => "div",
            BinaryOperator::Mod => "mod",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Less
                | BinaryOperator::LessEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
    Not,
}

/// Compile-time value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// Character code, 0..=255
    Char(u8),
    String(String),
    Nil,
}

impl ConstValue {
    /// The predefined type a value belongs to
    pub fn builtin_type(&self) -> BuiltinType {
        match self {
            ConstValue::Integer(_) => BuiltinType::Integer,
            ConstValue::Real(_) => BuiltinType::Real,
            ConstValue::Boolean(_) => BuiltinType::Boolean,
            ConstValue::Char(_) => BuiltinType::Char,
            ConstValue::String(_) => BuiltinType::String,
            ConstValue::Nil => BuiltinType::Nil,
        }
    }

    /// Ordinal number of an ordinal value
    pub fn ord(&self) -> Option<i64> {
        match self {
            ConstValue::Integer(v) => Some(*v),
            ConstValue::Boolean(b) => Some(*b as i64),
            ConstValue::Char(c) => Some(*c as i64),
            _ => None,
        }
    }

    /// Value of an ordinal type from its ordinal number
    pub fn from_ord(ty: BuiltinType, ord: i64) -> TypeResult<ConstValue> {
        let (low, high) = ty.ordinal_bounds().ok_or(TypeError::OutOfRange { value: ord, ty })?;
        if ord < low || ord > high {
            return Err(TypeError::OutOfRange { value: ord, ty });
        }
        Ok(match ty {
            BuiltinType::Boolean => ConstValue::Boolean(ord == 1),
            BuiltinType::Char => ConstValue::Char(ord as u8),
            _ => ConstValue::Integer(ord),
        })
    }

    /// `chr(n)`
    pub fn chr(code: i64) -> TypeResult<ConstValue> {
        Self::from_ord(BuiltinType::Char, code)
    }

    /// Predecessor, saturating at the lower bound
    pub fn pred(&self) -> Option<ConstValue> {
        self.step_ordinal(-1)
    }

    /// Successor, saturating at the upper bound
    pub fn succ(&self) -> Option<ConstValue> {
        self.step_ordinal(1)
    }

    fn step_ordinal(&self, delta: i64) -> Option<ConstValue> {
        match self {
            ConstValue::Real(v) => Some(ConstValue::Real(clamp_real(v + delta as f64 * REAL_STEP))),
            _ => {
                let ty = self.builtin_type();
                let (low, high) = ty.ordinal_bounds()?;
                let ord = (self.ord()? + delta * INTEGER_STEP).clamp(low, high);
                Self::from_ord(ty, ord).ok()
            }
        }
    }

    /// Numeric value as real, promoting integers
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ConstValue::Integer(v) => Some(*v as f64),
            ConstValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// A string of exactly one character converts to `Char`
    pub fn as_char(&self) -> Option<u8> {
        match self {
            ConstValue::Char(c) => Some(*c),
            ConstValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) if (ch as u32) <= MAX_CHAR as u32 => Some(ch as u32 as u8),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Apply a unary operator
    pub fn unary(&self, op: UnaryOperator) -> TypeResult<ConstValue> {
        match (op, self) {
            (UnaryOperator::Plus, ConstValue::Integer(_) | ConstValue::Real(_)) => Ok(self.clone()),
            (UnaryOperator::Minus, ConstValue::Integer(v)) => {
                Ok(ConstValue::Integer(clamp_integer(v.saturating_neg())))
            }
            (UnaryOperator::Minus, ConstValue::Real(v)) => real_result(-v),
            (UnaryOperator::Not, ConstValue::Boolean(b)) => Ok(ConstValue::Boolean(!b)),
            _ => Err(TypeError::InvalidOperands {
                op: match op {
                    UnaryOperator::Plus => "+",
                    UnaryOperator::Minus => "-",
                    UnaryOperator::Not => "not",
                },
                left: self.builtin_type(),
                right: self.builtin_type(),
            }),
        }
    }

    /// Apply a binary operator
    pub fn binary(&self, op: BinaryOperator, rhs: &ConstValue) -> TypeResult<ConstValue> {
        use ConstValue::*;

        let invalid = || TypeError::InvalidOperands {
            op: op.symbol(),
            left: self.builtin_type(),
            right: rhs.builtin_type(),
        };

        match (self, rhs) {
            (Integer(a), Integer(b)) => integer_op(op, *a, *b).unwrap_or_else(|| Err(invalid())),
            (Integer(_) | Real(_), Integer(_) | Real(_)) => {
                let (a, b) = match (self.as_real(), rhs.as_real()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(invalid()),
                };
                real_op(op, a, b).unwrap_or_else(|| Err(invalid()))
            }
            (Boolean(a), Boolean(b)) => boolean_op(op, *a, *b).ok_or_else(invalid),
            (Char(a), Char(b)) => compare(op, a, b).map(Boolean).ok_or_else(invalid),
            (String(_) | Char(_), String(_) | Char(_)) => {
                let a = self.to_text();
                let b = rhs.to_text();
                match op {
                    BinaryOperator::Add => Ok(String(a + &b)),
                    _ => compare(op, &a, &b).map(Boolean).ok_or_else(invalid),
                }
            }
            (Nil, Nil) => match op {
                BinaryOperator::Equal => Ok(Boolean(true)),
                BinaryOperator::NotEqual => Ok(Boolean(false)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    fn to_text(&self) -> String {
        match self {
            ConstValue::Char(c) => (*c as char).to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Integer(v) => write!(f, "{}", v),
            ConstValue::Real(v) => write!(f, "{:?}", v),
            ConstValue::Boolean(b) => write!(f, "{}", b),
            ConstValue::Char(c) => write!(f, "{}", *c as char),
            ConstValue::String(s) => write!(f, "{}", s),
            ConstValue::Nil => write!(f, "nil"),
        }
    }
}

/// Value of an integer literal; literals beyond the Integer range are rejected, not clamped
pub fn integer_literal(value: i64) -> TypeResult<ConstValue> {
    if (-MAX_INTEGER..=MAX_INTEGER).contains(&value) {
        Ok(ConstValue::Integer(value))
    } else {
        Err(TypeError::OutOfRange {
            value,
            ty: BuiltinType::Integer,
        })
    }
}

pub fn clamp_integer(value: i64) -> i64 {
    value.clamp(-MAX_INTEGER, MAX_INTEGER)
}

pub fn clamp_real(value: f64) -> f64 {
    value.clamp(-MAX_REAL, MAX_REAL)
}

fn real_result(value: f64) -> TypeResult<ConstValue> {
    if value.is_nan() {
        return Err(TypeError::NanResult);
    }
    if value.is_infinite() {
        return Err(TypeError::InfinityResult);
    }
    Ok(ConstValue::Real(clamp_real(value)))
}

/// Integer arithmetic; `None` when the operator does not apply
fn integer_op(op: BinaryOperator, a: i64, b: i64) -> Option<TypeResult<ConstValue>> {
    let (a, b) = (clamp_integer(a), clamp_integer(b));
    let value = match op {
        BinaryOperator::Add => a.saturating_add(b),
        BinaryOperator::Subtract => a.saturating_sub(b),
        BinaryOperator::Multiply => a.saturating_mul(b),
        BinaryOperator::Divide => {
            if b == 0 {
                return Some(Err(TypeError::ZeroDivision));
            }
            return Some(real_result(a as f64 / b as f64));
        }
        BinaryOperator::IntDivide => {
            if b == 0 {
                return Some(Err(TypeError::ZeroDivision));
            }
            floor_div(a, b)
        }
        BinaryOperator::Mod => {
            if b == 0 {
                return Some(Err(TypeError::ZeroDivision));
            }
            a.rem_euclid(b)
        }
        _ => return compare(op, &a, &b).map(|r| Ok(ConstValue::Boolean(r))),
    };
    Some(Ok(ConstValue::Integer(clamp_integer(value))))
}

/// Integer division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> i64 {
    let quotient = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

fn real_op(op: BinaryOperator, a: f64, b: f64) -> Option<TypeResult<ConstValue>> {
    let value = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Some(Err(TypeError::ZeroDivision));
            }
            a / b
        }
        BinaryOperator::IntDivide | BinaryOperator::Mod | BinaryOperator::And | BinaryOperator::Or => return None,
        _ => return compare(op, &a, &b).map(|r| Ok(ConstValue::Boolean(r))),
    };
    Some(real_result(value))
}

/// Boolean operators; `<=` is implication, `=` equivalence and `<>` exclusive or
fn boolean_op(op: BinaryOperator, a: bool, b: bool) -> Option<ConstValue> {
    let result = match op {
        BinaryOperator::And => a && b,
        BinaryOperator::Or => a || b,
        BinaryOperator::Equal => a == b,
        BinaryOperator::NotEqual => a ^ b,
        BinaryOperator::LessEqual => !a || b,
        BinaryOperator::Less => !a && b,
        BinaryOperator::Greater => a && !b,
        BinaryOperator::GreaterEqual => a || !b,
        _ => return None,
    };
    Some(ConstValue::Boolean(result))
}

fn compare<T: PartialOrd + ?Sized>(op: BinaryOperator, a: &T, b: &T) -> Option<bool> {
    Some(match op {
        BinaryOperator::Equal => a == b,
        BinaryOperator::NotEqual => a != b,
        BinaryOperator::Less => a < b,
        BinaryOperator::LessEqual => a <= b,
        BinaryOperator::Greater => a > b,
        BinaryOperator::GreaterEqual => a >= b,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> ConstValue {
        ConstValue::Integer(v)
    }

    #[test]
    fn test_builtin_names_and_classes() {
        assert_eq!(BuiltinType::Integer.name(), "Integer");
        assert_eq!(BuiltinType::Any.name(), "@Any");
        assert!(BuiltinType::Char.is_ordinal());
        assert!(!BuiltinType::Real.is_ordinal());
        assert!(BuiltinType::Real.is_numeric());
        assert_eq!(BuiltinType::Boolean.ordinal_bounds(), Some((0, 1)));
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(int(2).binary(BinaryOperator::Add, &int(3)), Ok(int(5)));
        assert_eq!(int(7).binary(BinaryOperator::IntDivide, &int(2)), Ok(int(3)));
        assert_eq!(int(-7).binary(BinaryOperator::IntDivide, &int(2)), Ok(int(-4)));
        assert_eq!(int(-7).binary(BinaryOperator::Mod, &int(3)), Ok(int(2)));
        assert_eq!(int(1).binary(BinaryOperator::Divide, &int(4)), Ok(ConstValue::Real(0.25)));
    }

    #[test]
    fn test_integer_results_are_clamped() {
        assert_eq!(int(MAX_INTEGER).binary(BinaryOperator::Add, &int(1)), Ok(int(MAX_INTEGER)));
        assert_eq!(
            int(-MAX_INTEGER).binary(BinaryOperator::Multiply, &int(MAX_INTEGER)),
            Ok(int(-MAX_INTEGER))
        );
        assert_eq!(int(i64::MAX).binary(BinaryOperator::Add, &int(1)), Ok(int(MAX_INTEGER)));
        assert_eq!(int(i64::MIN).binary(BinaryOperator::Subtract, &int(1)), Ok(int(-MAX_INTEGER)));
        assert_eq!(int(i64::MIN).unary(UnaryOperator::Minus), Ok(int(MAX_INTEGER)));
    }

    #[test]
    fn test_integer_literal_range() {
        assert_eq!(integer_literal(MAX_INTEGER), Ok(int(MAX_INTEGER)));
        assert_eq!(integer_literal(-MAX_INTEGER), Ok(int(-MAX_INTEGER)));
        assert_eq!(
            integer_literal(MAX_INTEGER + 1),
            Err(TypeError::OutOfRange {
                value: MAX_INTEGER + 1,
                ty: BuiltinType::Integer
            })
        );
    }

    #[test]
    fn test_real_arithmetic() {
        let r = ConstValue::Real(1.5);
        assert_eq!(r.binary(BinaryOperator::Add, &int(1)), Ok(ConstValue::Real(2.5)));
        assert_eq!(
            ConstValue::Real(1.0e38).binary(BinaryOperator::Multiply, &ConstValue::Real(10.0)),
            Ok(ConstValue::Real(MAX_REAL))
        );
        assert!(r.binary(BinaryOperator::Mod, &int(1)).is_err());
    }

    #[test]
    fn test_division_errors() {
        assert_eq!(int(1).binary(BinaryOperator::IntDivide, &int(0)), Err(TypeError::ZeroDivision));
        assert_eq!(int(1).binary(BinaryOperator::Divide, &int(0)), Err(TypeError::ZeroDivision));
        assert_eq!(
            ConstValue::Real(1.0).binary(BinaryOperator::Divide, &ConstValue::Real(0.0)),
            Err(TypeError::ZeroDivision)
        );
        assert_eq!(real_result(f64::NAN), Err(TypeError::NanResult));
        assert_eq!(real_result(f64::INFINITY), Err(TypeError::InfinityResult));
    }

    #[test]
    fn test_boolean_operators() {
        let t = ConstValue::Boolean(true);
        let f = ConstValue::Boolean(false);
        assert_eq!(t.binary(BinaryOperator::LessEqual, &f), Ok(f.clone()));
        assert_eq!(f.binary(BinaryOperator::LessEqual, &t), Ok(t.clone()));
        assert_eq!(f.binary(BinaryOperator::LessEqual, &f), Ok(t.clone()));
        assert_eq!(t.binary(BinaryOperator::NotEqual, &t), Ok(f.clone()));
        assert_eq!(f.binary(BinaryOperator::Equal, &f), Ok(t.clone()));
        assert_eq!(t.unary(UnaryOperator::Not), Ok(f));
        assert!(t.binary(BinaryOperator::Add, &t).is_err());
    }

    #[test]
    fn test_char_and_string() {
        let a = ConstValue::Char(b'a');
        let b = ConstValue::Char(b'b');
        assert_eq!(a.binary(BinaryOperator::Less, &b), Ok(ConstValue::Boolean(true)));
        assert_eq!(
            ConstValue::String("ab".into()).binary(BinaryOperator::Add, &a),
            Ok(ConstValue::String("aba".into()))
        );
        assert_eq!(ConstValue::String("x".into()).as_char(), Some(b'x'));
        assert_eq!(ConstValue::String("xy".into()).as_char(), None);
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ConstValue::chr(65), Ok(ConstValue::Char(b'A')));
        assert!(ConstValue::chr(256).is_err());
        assert_eq!(ConstValue::Char(b'A').ord(), Some(65));
        assert_eq!(ConstValue::Char(0).pred(), Some(ConstValue::Char(0)));
        assert_eq!(ConstValue::Char(255).succ(), Some(ConstValue::Char(255)));
        assert_eq!(int(MAX_INTEGER).succ(), Some(int(MAX_INTEGER)));
        assert_eq!(ConstValue::Boolean(false).succ(), Some(ConstValue::Boolean(true)));
        assert_eq!(ConstValue::String("s".into()).succ(), None);
    }

    #[test]
    fn test_unary() {
        assert_eq!(int(3).unary(UnaryOperator::Minus), Ok(int(-3)));
        assert_eq!(ConstValue::Real(2.0).unary(UnaryOperator::Plus), Ok(ConstValue::Real(2.0)));
        assert!(int(1).unary(UnaryOperator::Not).is_err());
    }
}
