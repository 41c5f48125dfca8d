//! Pascal Symbol Table
//!
//! This crate implements the scope manager for the compiler: an arena of
//! nested lexical scopes holding declared symbols, with name resolution
//! walking from the current scope to the built-in root.
//!
//! Each scope keeps its symbols in declaration order and indexes them with
//! Turbo Pascal's case-insensitive identifier hash:
//! - Custom hash function for case-insensitive identifier hashing
//! - Hash buckets with chaining for collision resolution
//!
//! Routine scopes are pushed *deferred*: while their owner is being analyzed
//! their parent is the built-in root, and they are attached to their lexical
//! parent only when popped (see [`UnlinkedScope`]).

use std::collections::HashMap;

use tokens::eq_ignore_ascii_case;
use types::{BuiltinType, ConstValue};

/// Resolution of alias chains gives up past this depth (cyclic aliases)
const MAX_ALIAS_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Symbol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Constant,
    /// Named or anonymous type with a concrete structure
    TypeDefinition,
    /// Enumeration value (including `false` and `true`)
    TypeLiteral,
    /// `type A = B`; resolved lazily by name
    Alias,
    Label,
    RecordField,
    /// `type P = ^T`; the target is resolved lazily by name
    Pointer,
    /// Procedure or function
    Activatable,
}

/// Predefined procedures and functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRoutine {
    ReadLn,
    Write,
    WriteLn,
    Length,
    Atoi,
}

impl BuiltinRoutine {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinRoutine::ReadLn => "ReadLn",
            BuiltinRoutine::Write => "Write",
            BuiltinRoutine::WriteLn => "WriteLn",
            BuiltinRoutine::Length => "Length",
            BuiltinRoutine::Atoi => "Atoi",
        }
    }
}

/// Signature and state of a procedure or function
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    /// Parameter symbols in declaration order
    pub params: Vec<SymbolId>,
    /// Result type; `None` for procedures
    pub return_type: Option<SymbolId>,
    pub builtin: Option<BuiltinRoutine>,
    /// Accepts any number of arguments (each matched against the first parameter)
    pub variadic: bool,
    /// Declared `forward` and still waiting for its body
    pub forward: bool,
    /// Scope holding the parameters and locals
    pub scope: Option<ScopeId>,
}

impl Routine {
    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
    }
}

/// Symbol payload
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolValue {
    None,
    Label(u32),
    Constant { value: ConstValue, ty: SymbolId },
    /// Predefined type
    Builtin(BuiltinType),
    Enumerated { values: Vec<String> },
    /// Inclusive ordinal bounds over `base`
    Subrange { start: i64, end: i64, base: SymbolId },
    Array { indices: Vec<SymbolId>, element: SymbolId },
    /// Fields live in `fields`; each variant is an anonymous record type
    Record { fields: ScopeId, variants: Vec<SymbolId> },
    Set { base: SymbolId },
    File { base: SymbolId },
    Pointer { target: String },
    Alias { target: String },
    TypeLiteral { owner: SymbolId, ordinal: i64 },
    /// Variable or record field of the given type
    Typed { ty: SymbolId },
    /// Formal parameter; procedural parameters carry their signature instead of a type
    Parameter {
        ty: Option<SymbolId>,
        by_ref: bool,
        signature: Option<Box<Routine>>,
    },
    Routine(Routine),
}

/// Symbol entry in the symbol table
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    pub value: SymbolValue,
    /// Scope the symbol was declared in
    pub scope: ScopeId,
}

impl Symbol {
    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::TypeDefinition | SymbolKind::Alias | SymbolKind::Pointer
        )
    }

    pub fn routine(&self) -> Option<&Routine> {
        match &self.value {
            SymbolValue::Routine(routine) => Some(routine),
            SymbolValue::Parameter { signature, .. } => signature.as_deref(),
            _ => None,
        }
    }

    /// Whether the symbol can be called
    pub fn is_activatable(&self) -> bool {
        self.routine().is_some()
    }

    /// Internal names (anonymous types, `@Any`) cannot be written in source
    pub fn is_internal(&self) -> bool {
        self.name.starts_with('@')
    }
}

// ===== Turbo Pascal Hash Function =====

/// Calculate hash value for an identifier using Turbo Pascal's hash function.
///
/// Algorithm (from Turbo Pascal):
/// 1. Start with negative length: `hash = -length`
/// 2. For each character: `hash += (byte[i] & 0xDF)` (uppercase conversion)
/// 3. Shift left by 1: `hash <<= 1`
pub fn identifier_hash(identifier: &str) -> u16 {
    // 16-bit arithmetic throughout; long names wrap
    let mut hash = (identifier.len() as i16).wrapping_neg();

    for byte in identifier.bytes() {
        // 0xDF clears bit 5, folding lowercase onto uppercase
        hash = hash.wrapping_add((byte & 0xDF) as i16);
    }

    (hash << 1) as u16
}

/// One lexical scope
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    /// Symbols in declaration order
    pub symbols: Vec<SymbolId>,
    pub children: Vec<ScopeId>,
    /// Routine whose parameters and locals this scope holds
    pub routine: Option<SymbolId>,
    buckets: HashMap<u16, Vec<SymbolId>>,
}

impl Scope {
    fn new(id: ScopeId, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            parent,
            symbols: vec![],
            children: vec![],
            routine: None,
            buckets: HashMap::new(),
        }
    }
}

/// Handle to a scope whose parent link is not yet established.
///
/// While the handle is alive the scope's parent is the built-in root; it is
/// only attached to its lexical parent by [`ScopeManager::pop_deferred_scope`].
#[derive(Debug)]
#[must_use = "a deferred scope must be attached with pop_deferred_scope"]
pub struct UnlinkedScope {
    id: ScopeId,
}

impl UnlinkedScope {
    pub fn id(&self) -> ScopeId {
        self.id
    }
}

/// Arena of scopes and symbols with a stack of open scopes
#[derive(Debug, Clone)]
pub struct ScopeManager {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
    builtin_types: HashMap<BuiltinType, SymbolId>,
}

impl ScopeManager {
    /// Create a scope manager holding only the built-in scope
    pub fn new() -> Self {
        let mut manager = Self {
            symbols: vec![],
            scopes: vec![Scope::new(ScopeId(0), None)],
            stack: vec![ScopeId(0)],
            builtin_types: HashMap::new(),
        };
        manager.register_builtins();
        manager
    }

    fn register_builtins(&mut self) {
        let root = self.builtin_scope();

        for ty in [
            BuiltinType::Real,
            BuiltinType::Integer,
            BuiltinType::Boolean,
            BuiltinType::Char,
            BuiltinType::String,
            BuiltinType::Nil,
        ] {
            let id = self.add_symbol_to(root, SymbolKind::TypeDefinition, ty.name(), SymbolValue::Builtin(ty));
            self.builtin_types.insert(ty, id);
        }

        let boolean = self.builtin_type(BuiltinType::Boolean);
        for (ordinal, name) in ["false", "true"].into_iter().enumerate() {
            self.add_symbol_to(
                root,
                SymbolKind::TypeLiteral,
                name,
                SymbolValue::TypeLiteral {
                    owner: boolean,
                    ordinal: ordinal as i64,
                },
            );
        }

        // Parameters of the predefined routines live in a scope nothing looks up through
        let params = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(params, Some(root)));

        let any = self.add_symbol_to(
            params,
            SymbolKind::TypeDefinition,
            BuiltinType::Any.name(),
            SymbolValue::Builtin(BuiltinType::Any),
        );
        self.builtin_types.insert(BuiltinType::Any, any);
        let string = self.builtin_type(BuiltinType::String);
        let integer = self.builtin_type(BuiltinType::Integer);

        for (builtin, param_ty, return_type, variadic) in [
            (BuiltinRoutine::ReadLn, any, None, true),
            (BuiltinRoutine::Write, any, None, true),
            (BuiltinRoutine::WriteLn, any, None, true),
            (BuiltinRoutine::Length, string, Some(integer), false),
            (BuiltinRoutine::Atoi, string, Some(integer), false),
        ] {
            let param = self.add_symbol_to(
                params,
                SymbolKind::Parameter,
                "input",
                SymbolValue::Parameter {
                    ty: Some(param_ty),
                    by_ref: false,
                    signature: None,
                },
            );
            self.add_symbol_to(
                root,
                SymbolKind::Activatable,
                builtin.name(),
                SymbolValue::Routine(Routine {
                    params: vec![param],
                    return_type,
                    builtin: Some(builtin),
                    variadic,
                    forward: false,
                    scope: None,
                }),
            );
        }
    }

    // ===== Scopes =====

    pub fn builtin_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Innermost open scope
    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId(0))
    }

    /// Number of open scopes, the built-in scope included
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a scope nested in the current one
    pub fn push_scope(&mut self) -> ScopeId {
        let parent = self.current();
        let id = self.new_scope(Some(parent));
        self.scopes[parent.0 as usize].children.push(id);
        self.stack.push(id);
        id
    }

    /// Close the current scope (the built-in scope is never closed)
    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    /// Open a scope whose parent is the built-in root until it is popped
    pub fn push_deferred_scope(&mut self) -> UnlinkedScope {
        let id = self.new_scope(Some(self.builtin_scope()));
        self.stack.push(id);
        UnlinkedScope { id }
    }

    /// Close a deferred scope and attach it to the scope that is current afterwards
    pub fn pop_deferred_scope(&mut self, scope: UnlinkedScope) -> ScopeId {
        if let Some(position) = self.stack.iter().rposition(|&id| id == scope.id) {
            self.stack.truncate(position);
        }
        let parent = self.current();
        self.scopes[scope.id.0 as usize].parent = Some(parent);
        self.scopes[parent.0 as usize].children.push(scope.id);
        scope.id
    }

    fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(id, parent));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Symbols declared directly in `scope`, in order
    pub fn scope_symbols(&self, scope: ScopeId) -> impl Iterator<Item = &Symbol> + '_ {
        self.scope(scope).symbols.iter().map(move |&id| self.symbol(id))
    }

    /// Mark `scope` as the body scope of `routine`
    pub fn set_scope_routine(&mut self, scope: ScopeId, routine: SymbolId) {
        self.scopes[scope.0 as usize].routine = Some(routine);
    }

    /// Routine owning the innermost routine scope around the current scope
    pub fn enclosing_routine(&self) -> Option<SymbolId> {
        let mut scope = Some(self.current());
        while let Some(id) = scope {
            let current = self.scope(id);
            if current.routine.is_some() {
                return current.routine;
            }
            scope = current.parent;
        }
        None
    }

    // ===== Symbols =====

    /// Declare a symbol in the current scope
    pub fn add_symbol(&mut self, kind: SymbolKind, name: &str, value: SymbolValue) -> SymbolId {
        let scope = self.current();
        self.add_symbol_to(scope, kind, name, value)
    }

    /// Declare a symbol in a given scope
    pub fn add_symbol_to(&mut self, scope: ScopeId, kind: SymbolKind, name: &str, value: SymbolValue) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            kind,
            name: name.to_string(),
            value,
            scope,
        });
        self.link_symbol(scope, id);
        id
    }

    /// Make an existing symbol visible in another scope as well
    pub fn link_symbol(&mut self, scope: ScopeId, id: SymbolId) {
        let hash = identifier_hash(&self.symbols[id.0 as usize].name);
        let target = &mut self.scopes[scope.0 as usize];
        target.symbols.push(id);
        target.buckets.entry(hash).or_default().push(id);
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Mutable access, used to complete forward-declared routines
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Symbol of a predefined type
    pub fn builtin_type(&self, ty: BuiltinType) -> SymbolId {
        self.builtin_types[&ty]
    }

    /// Whether `name` (of `kind`, if given) is visible from the current scope
    pub fn has_symbol(&self, name: &str, kind: Option<SymbolKind>, local: bool) -> bool {
        self.get_symbol_by_name_and_kind(name, kind, local).is_some()
    }

    /// Look `name` up from the current scope; the first declaration wins
    pub fn get_symbol_by_name_and_kind(&self, name: &str, kind: Option<SymbolKind>, local: bool) -> Option<SymbolId> {
        self.lookup_from(self.current(), name, kind, local)
    }

    /// Look `name` up starting at `scope`
    pub fn lookup_from(&self, scope: ScopeId, name: &str, kind: Option<SymbolKind>, local: bool) -> Option<SymbolId> {
        let hash = identifier_hash(name);
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            let found = scope.buckets.get(&hash).and_then(|bucket| {
                bucket.iter().copied().find(|&sym| {
                    let symbol = self.symbol(sym);
                    eq_ignore_ascii_case(&symbol.name, name) && kind.map_or(true, |k| symbol.kind == k)
                })
            });
            if found.is_some() || local {
                return found;
            }
            current = scope.parent;
        }
        None
    }

    /// Resolve an identifier through the scope chain
    pub fn resolve_reference(&self, name: &str) -> Option<SymbolId> {
        self.get_symbol_by_name_and_kind(name, None, false)
    }

    /// Follow alias and type-literal indirection to the underlying symbol.
    ///
    /// Constants and other symbols resolve to themselves. `None` when an
    /// alias names nothing or the chain is cyclic.
    pub fn resolve_symbol_reference(&self, id: SymbolId) -> Option<SymbolId> {
        let mut current = id;
        for _ in 0..MAX_ALIAS_DEPTH {
            let symbol = self.symbol(current);
            current = match &symbol.value {
                SymbolValue::Alias { target } => self.lookup_from(symbol.scope, target, None, false)?,
                SymbolValue::TypeLiteral { owner, .. } => *owner,
                _ => return Some(current),
            };
        }
        None
    }

    /// Target type of a pointer type, resolved by name where the pointer was declared
    pub fn resolve_pointer_target(&self, id: SymbolId) -> Option<SymbolId> {
        let symbol = self.symbol(id);
        match &symbol.value {
            SymbolValue::Pointer { target } => {
                let target = self.lookup_from(symbol.scope, target, None, false)?;
                self.resolve_symbol_reference(target)
            }
            _ => None,
        }
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer_var(manager: &mut ScopeManager, name: &str) -> SymbolId {
        let ty = manager.builtin_type(BuiltinType::Integer);
        manager.add_symbol(SymbolKind::Variable, name, SymbolValue::Typed { ty })
    }

    #[test]
    fn test_builtin_scope_order() {
        let manager = ScopeManager::new();
        let names: Vec<&str> = manager
            .scope_symbols(manager.builtin_scope())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Real", "Integer", "Boolean", "Char", "String", "Nil", "false", "true", "ReadLn", "Write", "WriteLn",
                "Length", "Atoi"
            ]
        );
        assert!(!manager.has_symbol("@Any", None, false));
        assert!(manager.symbol(manager.builtin_type(BuiltinType::Any)).is_internal());
    }

    #[test]
    fn test_builtin_routines() {
        let manager = ScopeManager::new();
        let length = manager.resolve_reference("length").unwrap();
        let routine = manager.symbol(length).routine().unwrap();
        assert_eq!(routine.builtin, Some(BuiltinRoutine::Length));
        assert!(routine.is_function());
        assert!(!routine.variadic);
        let writeln = manager.resolve_reference("WriteLn").unwrap();
        assert!(manager.symbol(writeln).routine().unwrap().variadic);
        assert!(!manager.has_symbol("input", None, false));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut manager = ScopeManager::new();
        manager.push_scope();
        let id = integer_var(&mut manager, "Counter");
        assert_eq!(manager.resolve_reference("COUNTER"), Some(id));
        assert_eq!(manager.resolve_reference("counter"), Some(id));
        assert!(manager.has_symbol("counter", Some(SymbolKind::Variable), true));
        assert!(!manager.has_symbol("counter", Some(SymbolKind::Constant), true));
    }

    #[test]
    fn test_nested_scopes_and_local_lookup() {
        let mut manager = ScopeManager::new();
        let outer_scope = manager.push_scope();
        let outer = integer_var(&mut manager, "x");
        let inner_scope = manager.push_scope();
        assert_eq!(manager.scope(inner_scope).parent, Some(outer_scope));
        assert_eq!(manager.resolve_reference("x"), Some(outer));
        assert!(!manager.has_symbol("x", None, true));

        let inner = integer_var(&mut manager, "x");
        assert_eq!(manager.resolve_reference("x"), Some(inner));
        manager.pop_scope();
        assert_eq!(manager.resolve_reference("x"), Some(outer));
        assert_eq!(manager.scope(outer_scope).children, vec![inner_scope]);
    }

    #[test]
    fn test_builtin_scope_is_never_popped() {
        let mut manager = ScopeManager::new();
        assert_eq!(manager.pop_scope(), None);
        assert_eq!(manager.current(), manager.builtin_scope());
    }

    #[test]
    fn test_deferred_scope_links_on_pop() {
        let mut manager = ScopeManager::new();
        let program = manager.push_scope();
        integer_var(&mut manager, "global");

        let routine = manager.push_deferred_scope();
        let routine_id = routine.id();
        assert_eq!(manager.scope(routine_id).parent, Some(manager.builtin_scope()));
        assert!(!manager.has_symbol("global", None, false));
        assert!(manager.has_symbol("Integer", None, false));
        assert!(manager.scope(program).children.is_empty());

        let linked = manager.pop_deferred_scope(routine);
        assert_eq!(linked, routine_id);
        assert_eq!(manager.current(), program);
        assert_eq!(manager.scope(linked).parent, Some(program));
        assert_eq!(manager.scope(program).children, vec![linked]);
        assert_eq!(
            manager.lookup_from(linked, "global", None, false),
            manager.resolve_reference("global")
        );
    }

    #[test]
    fn test_alias_resolution_is_lazy() {
        let mut manager = ScopeManager::new();
        manager.push_scope();
        let alias = manager.add_symbol(
            SymbolKind::Alias,
            "A",
            SymbolValue::Alias { target: "B".to_string() },
        );
        assert_eq!(manager.resolve_symbol_reference(alias), None);

        let b = manager.add_symbol(
            SymbolKind::Alias,
            "B",
            SymbolValue::Alias {
                target: "Integer".to_string(),
            },
        );
        assert_ne!(b, alias);
        assert_eq!(
            manager.resolve_symbol_reference(alias),
            Some(manager.builtin_type(BuiltinType::Integer))
        );
    }

    #[test]
    fn test_cyclic_alias_does_not_resolve() {
        let mut manager = ScopeManager::new();
        manager.push_scope();
        let a = manager.add_symbol(SymbolKind::Alias, "A", SymbolValue::Alias { target: "B".into() });
        manager.add_symbol(SymbolKind::Alias, "B", SymbolValue::Alias { target: "A".into() });
        assert_eq!(manager.resolve_symbol_reference(a), None);
    }

    #[test]
    fn test_type_literal_and_constant_resolution() {
        let mut manager = ScopeManager::new();
        let t = manager.resolve_reference("true").unwrap();
        assert_eq!(
            manager.resolve_symbol_reference(t),
            Some(manager.builtin_type(BuiltinType::Boolean))
        );

        manager.push_scope();
        let ty = manager.builtin_type(BuiltinType::Integer);
        let c = manager.add_symbol(
            SymbolKind::Constant,
            "c",
            SymbolValue::Constant {
                value: ConstValue::Integer(3),
                ty,
            },
        );
        assert_eq!(manager.resolve_symbol_reference(c), Some(c));
    }

    #[test]
    fn test_pointer_target_resolution() {
        let mut manager = ScopeManager::new();
        manager.push_scope();
        let p = manager.add_symbol(SymbolKind::Pointer, "P", SymbolValue::Pointer { target: "Node".into() });
        assert_eq!(manager.resolve_pointer_target(p), None);
        let node = manager.add_symbol(
            SymbolKind::TypeDefinition,
            "Node",
            SymbolValue::Enumerated { values: vec!["a".into()] },
        );
        assert_eq!(manager.resolve_pointer_target(p), Some(node));
    }

    #[test]
    fn test_enclosing_routine() {
        let mut manager = ScopeManager::new();
        manager.push_scope();
        let routine = manager.add_symbol(SymbolKind::Activatable, "Q", SymbolValue::None);
        let scope = manager.push_deferred_scope();
        manager.set_scope_routine(scope.id(), routine);
        manager.link_symbol(scope.id(), routine);
        manager.push_scope();
        assert_eq!(manager.enclosing_routine(), Some(routine));
        assert_eq!(manager.get_symbol_by_name_and_kind("q", None, false), Some(routine));
        manager.pop_scope();
        manager.pop_deferred_scope(scope);
        assert_eq!(manager.enclosing_routine(), None);
    }

    #[test]
    fn test_identifier_hash_case_insensitive() {
        assert_eq!(identifier_hash("WriteLn"), identifier_hash("WRITELN"));
        assert_eq!(identifier_hash("writeln"), identifier_hash("WriteLn"));
        assert_ne!(identifier_hash("a"), identifier_hash("ab"));
    }

    #[test]
    fn test_identifier_hash_long_names_wrap() {
        let long = "a".repeat(32768);
        assert_eq!(identifier_hash(&long), identifier_hash(&long.to_uppercase()));
        let longer = "a".repeat(65536 + 3);
        assert_eq!(identifier_hash(&longer), identifier_hash("aaa"));
    }
}
