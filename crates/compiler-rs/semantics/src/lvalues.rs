//! Variable access analysis

use std::collections::VecDeque;

use ast::{Expression, Identifier, NodeId, Variable, VariableKind};
use errors::DiagnosticKind;
use symbols::{SymbolId, SymbolKind, SymbolValue};
use tokens::Span;
use ::types::BuiltinType;

use crate::core::{find_field, ordinal_bounds, resolve_type, symbol_type};
use crate::{SemanticAnalyzer, SemanticResult, WithField};

impl SemanticAnalyzer {
    /// Analyze a variable access and return its type
    pub(crate) fn analyze_variable(&mut self, var: &Variable) -> SemanticResult<SymbolId> {
        let ty = match &var.kind {
            VariableKind::Entire(ident) => self.analyze_entire_variable(var.id, ident)?,
            VariableKind::Indexed { base, indices } => self.analyze_indexed_variable(base, indices)?,
            VariableKind::Field { base, field } => {
                let record = self.analyze_variable(base)?;
                let field_symbol = self.record_field(record, field, base.span)?;
                symbol_type(&self.core.scopes, field_symbol).unwrap_or(record)
            }
            VariableKind::Dereference(base) => {
                let pointer = self.analyze_variable(base)?;
                let resolved = resolve_type(&self.core.scopes, pointer);
                match &self.core.scopes.symbol(resolved).value {
                    SymbolValue::Pointer { target } => {
                        self.core.scopes.resolve_pointer_target(resolved).ok_or_else(|| {
                            self.core
                                .error(DiagnosticKind::UndefinedReference, var.span)
                                .with_arg("value", target)
                        })?
                    }
                    _ => return Err(self.incompatible("pointer", pointer, base.span)),
                }
            }
        };
        self.core.annotations.variable_types.insert(var.id, ty);
        Ok(ty)
    }

    fn analyze_entire_variable(&mut self, id: NodeId, ident: &Identifier) -> SemanticResult<SymbolId> {
        if let Some(binding) = self.lookup_with_field(&ident.name) {
            self.core.annotations.with_fields.insert(id, binding);
            return Ok(symbol_type(&self.core.scopes, binding.field).unwrap_or(binding.field));
        }

        let undeclared = || {
            self.core
                .error(DiagnosticKind::UndeclaredVariable, ident.span)
                .with_arg("value", &ident.name)
        };
        let symbol_id = self.core.scopes.resolve_reference(&ident.name).ok_or_else(|| undeclared())?;
        let symbol = self.core.scopes.symbol(symbol_id);

        let ty = match (&symbol.kind, &symbol.value) {
            (SymbolKind::Variable, SymbolValue::Typed { ty }) => *ty,
            (
                SymbolKind::Parameter,
                SymbolValue::Parameter {
                    ty: Some(ty),
                    signature: None,
                    ..
                },
            ) => *ty,
            // A function assigns its result through its own name
            (SymbolKind::Activatable, SymbolValue::Routine(routine))
                if self.core.scopes.enclosing_routine() == Some(symbol_id) =>
            {
                routine.return_type.ok_or_else(|| undeclared())?
            }
            _ => return Err(undeclared().into()),
        };
        self.core.annotations.bindings.insert(id, symbol_id);
        Ok(ty)
    }

    fn analyze_indexed_variable(&mut self, base: &Variable, indices: &[Expression]) -> SemanticResult<SymbolId> {
        let mut ty = self.analyze_variable(base)?;
        let mut pending: VecDeque<SymbolId> = VecDeque::new();

        for index in indices {
            if pending.is_empty() {
                let resolved = resolve_type(&self.core.scopes, ty);
                match &self.core.scopes.symbol(resolved).value {
                    SymbolValue::Array { indices, element } => {
                        pending.extend(indices.iter().copied());
                        ty = *element;
                    }
                    SymbolValue::Builtin(BuiltinType::String) => {
                        pending.push_back(self.core.builtin(BuiltinType::Integer));
                        ty = self.core.builtin(BuiltinType::Char);
                    }
                    _ => return Err(self.incompatible("array", ty, base.span)),
                }
            }

            let index_ty = self.analyze_expression(index)?;
            if let Some(expected) = pending.pop_front() {
                self.check_index(expected, index_ty, index)?;
            }
        }

        // Partially indexed arrays denote the remaining dimensions
        if !pending.is_empty() {
            let name = self.core.anonymous_name("ARR");
            ty = self.core.scopes.add_symbol(
                SymbolKind::TypeDefinition,
                &name,
                SymbolValue::Array {
                    indices: pending.into_iter().collect(),
                    element: ty,
                },
            );
        }
        Ok(ty)
    }

    fn check_index(&mut self, expected: SymbolId, actual: SymbolId, index: &Expression) -> SemanticResult<()> {
        self.check_assignable(expected, actual, index)?;
        self.check_range(expected, index)
    }

    /// Constant values must lie within the bounds of a subrange or index type
    pub(crate) fn check_range(&self, ty: SymbolId, expr: &Expression) -> SemanticResult<()> {
        let Some(value) = self.core.annotations.constant(expr.id) else {
            return Ok(());
        };
        let Some(ordinal) = value.ord().or_else(|| value.as_char().map(i64::from)) else {
            return Ok(());
        };
        let resolved = resolve_type(&self.core.scopes, ty);
        if !matches!(self.core.scopes.symbol(resolved).value, SymbolValue::Subrange { .. }) {
            return Ok(());
        }
        match ordinal_bounds(&self.core.scopes, resolved) {
            Some((start, end)) if ordinal < start || ordinal > end => Err(self
                .core
                .error(DiagnosticKind::RangeViolation, expr.span)
                .with_arg("value", value)
                .with_arg("start", start)
                .with_arg("end", end)
                .into()),
            _ => Ok(()),
        }
    }

    fn record_field(&self, record: SymbolId, field: &Identifier, span: Span) -> SemanticResult<SymbolId> {
        let resolved = resolve_type(&self.core.scopes, record);
        if !matches!(self.core.scopes.symbol(resolved).value, SymbolValue::Record { .. }) {
            return Err(self.incompatible("record", record, span));
        }
        find_field(&self.core.scopes, resolved, &field.name).ok_or_else(|| {
            self.core
                .error(DiagnosticKind::UndefinedReference, field.span)
                .with_arg("value", &field.name)
                .into()
        })
    }

    /// Field of a record opened by an enclosing `with`, innermost first
    pub(crate) fn lookup_with_field(&self, name: &str) -> Option<WithField> {
        self.with_frames.iter().rev().find_map(|frame| {
            find_field(&self.core.scopes, frame.record, name).map(|field| WithField {
                record: frame.variable,
                field,
            })
        })
    }

    pub(crate) fn incompatible(&self, expected: &str, actual: SymbolId, span: Span) -> crate::SemanticError {
        self.core
            .error(DiagnosticKind::IncompatibleVariable, span)
            .with_arg("expected", expected)
            .with_arg("actual", self.core.type_name(actual))
            .into()
    }
}
