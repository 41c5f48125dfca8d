//! Side tables produced by semantic analysis
//!
//! The AST is never mutated; everything later phases need to know about a
//! node is recorded here, keyed by its [`NodeId`].

use std::collections::{HashMap, HashSet};

use ast::NodeId;
use symbols::{ScopeId, SymbolId};
use ::types::ConstValue;

/// Implicit conversion applied to an expression's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Integer operand in a real context
    IntToReal,
    /// One-character string literal in a `Char` context
    CharCode,
}

/// A bare identifier that names a field of a `with` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithField {
    /// Record variable of the enclosing `with` statement
    pub record: NodeId,
    pub field: SymbolId,
}

#[derive(Debug, Default, Clone)]
pub struct Annotations {
    /// Root user scope of the program
    pub program_scope: Option<ScopeId>,
    /// Evaluated type of every analyzed expression
    pub expression_types: HashMap<NodeId, SymbolId>,
    /// Type of every analyzed variable access
    pub variable_types: HashMap<NodeId, SymbolId>,
    pub coercions: HashMap<NodeId, Coercion>,
    /// Values of expressions folded at compile time
    pub constants: HashMap<NodeId, ConstValue>,
    /// Routine called by a call expression or procedure statement
    pub calls: HashMap<NodeId, SymbolId>,
    /// Variable, parameter or function-result symbol of an entire variable
    pub bindings: HashMap<NodeId, SymbolId>,
    pub with_fields: HashMap<NodeId, WithField>,
    /// Symbol of each routine declaration
    pub routine_symbols: HashMap<NodeId, SymbolId>,
    /// Control variable of each `for` statement
    pub for_controls: HashMap<NodeId, SymbolId>,
    /// Ordinal values of each `case` arm's constants
    pub case_labels: HashMap<NodeId, Vec<Vec<i64>>>,
    /// `goto` statements whose label belongs to an enclosing block
    pub nonlocal_gotos: HashSet<NodeId>,
    /// Array types introduced by conformant-array parameters
    pub conformant_arrays: HashSet<SymbolId>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expression_type(&self, id: NodeId) -> Option<SymbolId> {
        self.expression_types.get(&id).copied()
    }

    pub fn variable_type(&self, id: NodeId) -> Option<SymbolId> {
        self.variable_types.get(&id).copied()
    }

    pub fn coercion(&self, id: NodeId) -> Option<Coercion> {
        self.coercions.get(&id).copied()
    }

    pub fn constant(&self, id: NodeId) -> Option<&ConstValue> {
        self.constants.get(&id)
    }

    pub fn call(&self, id: NodeId) -> Option<SymbolId> {
        self.calls.get(&id).copied()
    }

    pub fn binding(&self, id: NodeId) -> Option<SymbolId> {
        self.bindings.get(&id).copied()
    }

    pub fn with_field(&self, id: NodeId) -> Option<WithField> {
        self.with_fields.get(&id).copied()
    }

    pub fn routine_symbol(&self, id: NodeId) -> Option<SymbolId> {
        self.routine_symbols.get(&id).copied()
    }

    pub fn for_control(&self, id: NodeId) -> Option<SymbolId> {
        self.for_controls.get(&id).copied()
    }

    pub fn case_labels(&self, id: NodeId) -> Option<&[Vec<i64>]> {
        self.case_labels.get(&id).map(Vec::as_slice)
    }
}
