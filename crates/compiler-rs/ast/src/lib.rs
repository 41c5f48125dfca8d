//! Pascal Abstract Syntax Tree (AST)
//!
//! This crate defines the AST node types for the Pascal compiler.
//! The AST represents the syntactic structure of Pascal programs.
//!
//! Each node family (types, statements, expressions, variables) is a closed
//! sum type. Statements, expressions and variables carry a [`NodeId`] so that
//! later phases can attach annotations in side tables instead of mutating the tree.

use std::collections::BTreeSet;
use std::fmt;

use tokens::Span;

pub mod dump;

pub use dump::Dump;

/// Identity of a statement, expression, variable or routine node within one parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Monotonic [`NodeId`] source owned by the parser
#[derive(Debug, Default, Clone)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

// ===== Primitives =====

/// Identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Identifiers compare case-insensitively
    pub fn matches(&self, name: &str) -> bool {
        tokens::eq_ignore_ascii_case(&self.name, name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Character string literal (quotes removed, `''` decoded)
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    pub span: Span,
}

/// Numeric value of a number literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Integer(i64),
    Real(f64),
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberValue::Integer(v) => write!(f, "{}", v),
            NumberValue::Real(v) => write!(f, "{:?}", v),
        }
    }
}

/// Number literal kind; discriminants are the dump's wire values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    UnsignedReal = 1,
    UnsignedInteger = 2,
    SignedReal = 3,
    SignedInteger = 4,
}

/// Sign applied to a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

/// Number literal
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub value: NumberValue,
    pub kind: NumberKind,
    pub span: Span,
}

impl Number {
    pub fn integer(value: i64, span: Span) -> Self {
        Self {
            value: NumberValue::Integer(value),
            kind: NumberKind::UnsignedInteger,
            span,
        }
    }

    pub fn real(value: f64, span: Span) -> Self {
        Self {
            value: NumberValue::Real(value),
            kind: NumberKind::UnsignedReal,
            span,
        }
    }

    /// Turn an unsigned number into its signed counterpart, widening the span over the sign.
    ///
    /// Must only be applied to an unsigned number.
    pub fn signed(self, sign: Sign, sign_span: Span) -> Self {
        let kind = match self.kind {
            NumberKind::UnsignedInteger | NumberKind::SignedInteger => NumberKind::SignedInteger,
            NumberKind::UnsignedReal | NumberKind::SignedReal => NumberKind::SignedReal,
        };
        let value = match (sign, self.value) {
            (Sign::Plus, v) => v,
            (Sign::Minus, NumberValue::Integer(v)) => NumberValue::Integer(v.saturating_neg()),
            (Sign::Minus, NumberValue::Real(v)) => NumberValue::Real(-v),
        };
        Self {
            value,
            kind,
            span: sign_span.merge(self.span),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.kind, NumberKind::SignedInteger | NumberKind::SignedReal)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.value, NumberValue::Integer(_))
    }
}

/// Largest label value, four digits
pub const MAX_LABEL: u32 = 9999;

/// Statement label (a digit sequence)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub value: u32,
    pub span: Span,
}

/// Constant as written in constant definitions, subranges and case labels
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Number(Number),
    String(StringLiteral),
    /// Constant identifier, optionally signed
    Identifier { sign: Option<Sign>, name: Identifier, span: Span },
}

impl Constant {
    pub fn span(&self) -> Span {
        match self {
            Constant::Number(n) => n.span,
            Constant::String(s) => s.span,
            Constant::Identifier { span, .. } => *span,
        }
    }
}

// ===== Program Structure =====

/// Program node - root of the AST
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub heading: ProgramHeading,
    pub block: Block,
    pub span: Span,
}

/// `program name (externals);`
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramHeading {
    pub name: Identifier,
    pub externals: Vec<Identifier>,
    pub span: Span,
}

/// Block node - contains declarations and statements
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub labels: Vec<Label>,
    pub constants: Vec<ConstantDefinition>,
    pub types: Vec<TypeDefinition>,
    pub variables: Vec<VariableDeclaration>,
    pub routines: Vec<RoutineDeclaration>,
    /// Compound statement
    pub body: Statement,
    pub span: Span,
}

impl Block {
    /// Largest label number declared or attached anywhere in this block, nested routines included
    pub fn max_label(&self) -> Option<u32> {
        let own = self
            .labels
            .iter()
            .map(|l| l.value)
            .chain(self.body.labels())
            .max();
        let nested = self.routines.iter().filter_map(|r| match &r.body {
            RoutineBody::Block(block) => block.max_label(),
            RoutineBody::Directive(_) => None,
        });
        own.into_iter().chain(nested).max()
    }
}

// ===== Declarations =====

/// Constant definition (`name = constant`)
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDefinition {
    pub name: Identifier,
    pub value: Constant,
    pub span: Span,
}

/// Type definition (`name = type`)
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: Identifier,
    pub ty: TypeNode,
    pub span: Span,
}

/// Variable declaration (`a, b: type`)
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub names: Vec<Identifier>,
    pub ty: TypeNode,
    pub span: Span,
}

// ===== Types =====

/// Type denoter
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub kind: TypeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Named type reference
    Identifier(Identifier),
    /// `(a, b, c)`
    Enumerated(Vec<Identifier>),
    /// `start..end`
    Subrange { start: Constant, end: Constant },
    /// `[packed] array [i1, i2] of element`
    Array {
        packed: bool,
        indices: Vec<TypeNode>,
        element: Box<TypeNode>,
    },
    Record(RecordType),
    /// `[packed] set of base`
    Set { packed: bool, base: Box<TypeNode> },
    /// `[packed] file of base`
    File { packed: bool, base: Box<TypeNode> },
    /// `^name`
    Pointer(Identifier),
}

impl TypeNode {
    /// Ordinal types are identifiers, enumerations and subranges
    pub fn is_simple(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Identifier(_) | TypeKind::Enumerated(_) | TypeKind::Subrange { .. }
        )
    }
}

/// Record type (fixed part plus optional variant part)
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub packed: bool,
    pub fixed: Vec<RecordSection>,
    pub variant: Option<Box<VariantPart>>,
    pub span: Span,
}

/// Field section `a, b: type`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSection {
    pub names: Vec<Identifier>,
    pub ty: TypeNode,
    pub span: Span,
}

/// `case [tag:] TagType of ...`
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPart {
    pub tag: Option<Identifier>,
    pub tag_type: Identifier,
    pub cases: Vec<VariantCase>,
    pub span: Span,
}

/// `c1, c2: (field list)`
#[derive(Debug, Clone, PartialEq)]
pub struct VariantCase {
    pub constants: Vec<Constant>,
    pub fields: RecordType,
    pub span: Span,
}

// ===== Routines =====

/// Procedure or function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDeclaration {
    pub id: NodeId,
    pub heading: RoutineHeading,
    pub body: RoutineBody,
    pub span: Span,
}

impl RoutineDeclaration {
    pub fn is_forward(&self) -> bool {
        matches!(&self.body, RoutineBody::Directive(d) if d.matches("forward"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutineHeading {
    pub kind: RoutineKind,
    pub name: Identifier,
    pub params: Vec<FormalParameter>,
    pub span: Span,
}

impl RoutineHeading {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, RoutineKind::Function { .. })
    }

    /// Number of actual arguments the routine takes
    pub fn arity(&self) -> usize {
        self.params
            .iter()
            .map(|p| match p {
                FormalParameter::Value(spec) => spec.names.len(),
                FormalParameter::Routine(_) => 1,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutineKind {
    Procedure,
    /// Return type may be omitted on the full declaration of a forward function
    Function { return_type: Option<Identifier> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutineBody {
    Block(Box<Block>),
    /// e.g. `forward`
    Directive(Identifier),
}

/// Formal parameter section
#[derive(Debug, Clone, PartialEq)]
pub enum FormalParameter {
    /// Value (`a: T`) or variable (`var a: T`) parameters
    Value(ParameterSpecification),
    /// Procedural or functional parameter
    Routine(RoutineHeading),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpecification {
    pub names: Vec<Identifier>,
    pub ty: ParamType,
    /// `var` parameter
    pub by_ref: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Identifier(Identifier),
    ConformantArray(ConformantArraySchema),
}

/// `[packed] array [lo..hi: T; ...] of element`
#[derive(Debug, Clone, PartialEq)]
pub struct ConformantArraySchema {
    pub packed: bool,
    pub indices: Vec<IndexTypeSpecification>,
    pub element: Box<ParamType>,
    pub span: Span,
}

/// `lo..hi: T`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTypeSpecification {
    pub low: Identifier,
    pub high: Identifier,
    pub ty: Identifier,
    pub span: Span,
}

// ===== Statements =====

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: NodeId,
    pub label: Option<Label>,
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Empty,
    Assignment { target: Variable, value: Expression },
    ProcedureCall { name: Identifier, args: Vec<Expression> },
    Goto(Label),
    Compound(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    Case { selector: Expression, arms: Vec<CaseArm> },
    While { condition: Expression, body: Box<Statement> },
    Repeat { body: Vec<Statement>, condition: Expression },
    For {
        control: Identifier,
        initial: Expression,
        direction: ForDirection,
        limit: Expression,
        body: Box<Statement>,
    },
    With { records: Vec<Variable>, body: Box<Statement> },
}

/// Case arm `c1, c2: statement`
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub constants: Vec<Constant>,
    pub body: Statement,
    pub span: Span,
}

/// For loop direction; discriminants are the dump's wire values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForDirection {
    To = 1,     // for i := 1 to 10
    Downto = 2, // for i := 10 downto 1
}

impl Statement {
    /// Numeric labels attached to this statement or any statement nested in it
    pub fn labels(&self) -> BTreeSet<u32> {
        let mut labels = BTreeSet::new();
        self.collect_labels(&mut labels);
        labels
    }

    fn collect_labels(&self, out: &mut BTreeSet<u32>) {
        if let Some(label) = self.label {
            out.insert(label.value);
        }
        match &self.kind {
            StatementKind::Compound(stmts) | StatementKind::Repeat { body: stmts, .. } => {
                for stmt in stmts {
                    stmt.collect_labels(out);
                }
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.collect_labels(out);
                if let Some(else_branch) = else_branch {
                    else_branch.collect_labels(out);
                }
            }
            StatementKind::Case { arms, .. } => {
                for arm in arms {
                    arm.body.collect_labels(out);
                }
            }
            StatementKind::While { body, .. }
            | StatementKind::For { body, .. }
            | StatementKind::With { body, .. } => body.collect_labels(out),
            StatementKind::Empty
            | StatementKind::Assignment { .. }
            | StatementKind::ProcedureCall { .. }
            | StatementKind::Goto(_) => {}
        }
    }

    /// Goto targets used by this statement or any statement nested in it
    pub fn goto_targets(&self) -> Vec<Label> {
        let mut out = vec![];
        self.collect_gotos(&mut out);
        out
    }

    fn collect_gotos(&self, out: &mut Vec<Label>) {
        match &self.kind {
            StatementKind::Goto(label) => out.push(*label),
            StatementKind::Compound(stmts) | StatementKind::Repeat { body: stmts, .. } => {
                for stmt in stmts {
                    stmt.collect_gotos(out);
                }
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.collect_gotos(out);
                if let Some(else_branch) = else_branch {
                    else_branch.collect_gotos(out);
                }
            }
            StatementKind::Case { arms, .. } => {
                for arm in arms {
                    arm.body.collect_gotos(out);
                }
            }
            StatementKind::While { body, .. }
            | StatementKind::For { body, .. }
            | StatementKind::With { body, .. } => body.collect_gotos(out),
            StatementKind::Empty | StatementKind::Assignment { .. } | StatementKind::ProcedureCall { .. } => {}
        }
    }
}

// ===== Expressions =====

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: NodeId,
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Number(Number),
    String(StringLiteral),
    Nil,
    /// Variable access; a bare identifier may also name a constant or a parameterless function
    Variable(Variable),
    /// Function designator with actual parameters
    Call { name: Identifier, args: Vec<Expression> },
    /// Set constructor `[a, b..c]`
    Set(Vec<SetElement>),
    Unary { op: UnaryOp, operand: Box<Expression> },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            ExpressionKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Bare identifier (`Variable::Entire`) behind this expression, if any
    pub fn as_identifier(&self) -> Option<&Identifier> {
        self.as_variable().and_then(Variable::as_entire)
    }
}

/// Set constructor element `a` or `a..b`
#[derive(Debug, Clone, PartialEq)]
pub struct SetElement {
    pub start: Expression,
    pub end: Option<Expression>,
    pub span: Span,
}

/// Binary operator; discriminants are the dump's wire values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add = 1,      // +
    Subtract = 2, // -
    Multiply = 3, // *
    Divide = 4,   // /
    Mod = 5,      // mod
    // Logical
    Or = 6,  // or
    And = 7, // and
    // Relational
    Equal = 8,         // =
    NotEqual = 9,      // <>
    Less = 10,         // <
    LessEqual = 11,    // <=
    Greater = 12,      // >
    GreaterEqual = 13, // >=
    In = 14,           // in
    Div = 15,          // div
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::In
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,  // +
    Minus, // -
    Not,   // not
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
        }
    }
}

// ===== Variables =====

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: NodeId,
    pub kind: VariableKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    /// `x`
    Entire(Identifier),
    /// `a[i, j]`
    Indexed { base: Box<Variable>, indices: Vec<Expression> },
    /// `r.f`
    Field { base: Box<Variable>, field: Identifier },
    /// `p^`
    Dereference(Box<Variable>),
}

impl Variable {
    pub fn as_entire(&self) -> Option<&Identifier> {
        match &self.kind {
            VariableKind::Entire(ident) => Some(ident),
            _ => None,
        }
    }

    /// Identifier at the root of the access path
    pub fn root(&self) -> &Identifier {
        match &self.kind {
            VariableKind::Entire(ident) => ident,
            VariableKind::Indexed { base, .. } | VariableKind::Field { base, .. } | VariableKind::Dereference(base) => {
                base.root()
            }
        }
    }
}
