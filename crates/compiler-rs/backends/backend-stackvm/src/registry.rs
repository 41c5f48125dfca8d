//! Activatable registry: how each callable symbol is emitted

use std::collections::HashMap;

use ir::Label;
use symbols::{BuiltinRoutine, ScopeManager, SymbolId};

/// Emission rule of a procedure or function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activatable {
    /// Predefined routine with a hand-written instruction sequence
    Builtin(BuiltinRoutine),
    /// User routine entered through `PUSHA label; CALL`
    Routine { label: Label, argc: usize, function: bool },
}

/// Callable symbols known to the code generator, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct ActivatableRegistry {
    entries: HashMap<SymbolId, Activatable>,
}

impl ActivatableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every predefined routine of the built-in scope
    pub fn with_builtins(scopes: &ScopeManager) -> Self {
        let mut registry = Self::new();
        for symbol in scopes.scope_symbols(scopes.builtin_scope()) {
            if let Some(builtin) = symbol.routine().and_then(|routine| routine.builtin) {
                registry.register(symbol.id, Activatable::Builtin(builtin));
            }
        }
        registry
    }

    pub fn register(&mut self, symbol: SymbolId, activatable: Activatable) {
        self.entries.insert(symbol, activatable);
    }

    pub fn get(&self, symbol: SymbolId) -> Option<Activatable> {
        self.entries.get(&symbol).copied()
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.entries.contains_key(&symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbols::SymbolKind;

    #[test]
    fn test_builtins_registered() {
        let scopes = ScopeManager::new();
        let registry = ActivatableRegistry::with_builtins(&scopes);
        assert_eq!(registry.len(), 5);

        let writeln = scopes
            .get_symbol_by_name_and_kind("writeln", Some(SymbolKind::Activatable), false)
            .unwrap();
        assert_eq!(registry.get(writeln), Some(Activatable::Builtin(BuiltinRoutine::WriteLn)));
    }

    #[test]
    fn test_register_routine() {
        let mut registry = ActivatableRegistry::new();
        assert!(registry.is_empty());
        let routine = Activatable::Routine {
            label: Label(4),
            argc: 2,
            function: true,
        };
        registry.register(SymbolId(42), routine);
        assert!(registry.contains(SymbolId(42)));
        assert_eq!(registry.get(SymbolId(42)), Some(routine));
        assert_eq!(registry.get(SymbolId(43)), None);
    }
}
