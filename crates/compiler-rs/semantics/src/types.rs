//! Type definitions, type resolution and constants

use ast::{
    Constant, ConformantArraySchema, Identifier, NumberValue, ParamType, RecordType, Sign, TypeKind, TypeNode,
};
use errors::DiagnosticKind;
use symbols::{SymbolId, SymbolKind, SymbolValue};
use ::types::{integer_literal, BuiltinType, ConstValue, UnaryOperator};

use crate::core::{ordinal_bounds, resolve_type};
use crate::{SemanticAnalyzer, SemanticResult};

impl SemanticAnalyzer {
    /// Evaluate a constant as written in a definition, subrange or case label
    pub(crate) fn evaluate_constant(&mut self, constant: &Constant) -> SemanticResult<(ConstValue, SymbolId)> {
        match constant {
            Constant::Number(number) => Ok(match number.value {
                NumberValue::Integer(v) => {
                    let value = integer_literal(v).map_err(|error| self.core.type_error(error, number.span))?;
                    (value, self.core.builtin(BuiltinType::Integer))
                }
                NumberValue::Real(v) => (ConstValue::Real(v), self.core.builtin(BuiltinType::Real)),
            }),
            Constant::String(literal) => {
                let value = ConstValue::String(literal.value.clone());
                Ok(match value.as_char() {
                    Some(code) => (ConstValue::Char(code), self.core.builtin(BuiltinType::Char)),
                    None => (value, self.core.builtin(BuiltinType::String)),
                })
            }
            Constant::Identifier { sign, name, span } => {
                let undeclared = || {
                    self.core
                        .error(DiagnosticKind::UndeclaredConst, name.span)
                        .with_arg("value", &name.name)
                };
                let id = self.core.scopes.resolve_reference(&name.name).ok_or_else(|| undeclared())?;
                let (value, ty) = match &self.core.scopes.symbol(id).value {
                    SymbolValue::Constant { value, ty } => (value.clone(), *ty),
                    SymbolValue::TypeLiteral { owner, ordinal } => (self.core.literal_value(*owner, *ordinal), *owner),
                    _ => return Err(undeclared().into()),
                };

                match sign {
                    None => Ok((value, ty)),
                    Some(sign) => {
                        if !self.core.static_type(ty).is_numeric() {
                            return Err(self.core.mismatch_named("Integer", ty, *span));
                        }
                        let op = match sign {
                            Sign::Plus => UnaryOperator::Plus,
                            Sign::Minus => UnaryOperator::Minus,
                        };
                        let value = value.unary(op).map_err(|e| self.core.type_error(e, *span))?;
                        Ok((value, ty))
                    }
                }
            }
        }
    }

    /// Define the named type of a type definition
    pub(crate) fn define_type(&mut self, name: &str, node: &TypeNode) -> SemanticResult<SymbolId> {
        match &node.kind {
            TypeKind::Identifier(target) => Ok(self.core.scopes.add_symbol(
                SymbolKind::Alias,
                name,
                SymbolValue::Alias {
                    target: target.name.clone(),
                },
            )),
            TypeKind::Pointer(target) => Ok(self.core.scopes.add_symbol(
                SymbolKind::Pointer,
                name,
                SymbolValue::Pointer {
                    target: target.name.clone(),
                },
            )),
            _ => self.define_structured_type(name, node),
        }
    }

    /// Resolve a type denoter, defining anonymous types as needed
    pub(crate) fn resolve_type_node(&mut self, node: &TypeNode) -> SemanticResult<SymbolId> {
        let prefix = match &node.kind {
            TypeKind::Identifier(ident) => return self.resolve_type_identifier(ident),
            TypeKind::Pointer(_) => "PTR",
            TypeKind::Enumerated(_) => "ENUM",
            TypeKind::Subrange { .. } => "ART",
            TypeKind::Array { .. } => "ARR",
            TypeKind::Record(_) => "REC",
            TypeKind::Set { .. } => "SET",
            TypeKind::File { .. } => "FILE",
        };
        let name = self.core.anonymous_name(prefix);
        self.define_type(&name, node)
    }

    /// Resolve a type name, following aliases
    pub(crate) fn resolve_type_identifier(&mut self, ident: &Identifier) -> SemanticResult<SymbolId> {
        let undeclared = |value: &str| {
            self.core
                .error(DiagnosticKind::UndeclaredType, ident.span)
                .with_arg("value", value)
        };

        let id = self
            .core
            .scopes
            .resolve_reference(&ident.name)
            .filter(|&id| self.core.scopes.symbol(id).is_type())
            .ok_or_else(|| undeclared(&ident.name))?;

        match &self.core.scopes.symbol(id).value {
            SymbolValue::Alias { target } => self
                .core
                .scopes
                .resolve_symbol_reference(id)
                .filter(|&resolved| self.core.scopes.symbol(resolved).is_type())
                .ok_or_else(|| undeclared(target).into()),
            _ => Ok(id),
        }
    }

    fn define_structured_type(&mut self, name: &str, node: &TypeNode) -> SemanticResult<SymbolId> {
        match &node.kind {
            TypeKind::Identifier(_) | TypeKind::Pointer(_) => self.resolve_type_node(node),
            TypeKind::Enumerated(values) => {
                let owner = self.core.scopes.add_symbol(
                    SymbolKind::TypeDefinition,
                    name,
                    SymbolValue::Enumerated {
                        values: values.iter().map(|v| v.name.clone()).collect(),
                    },
                );
                for (ordinal, value) in values.iter().enumerate() {
                    if self.core.scopes.has_symbol(&value.name, None, true) {
                        return Err(self
                            .core
                            .error(DiagnosticKind::DuplicateType, value.span)
                            .with_arg("value", &value.name)
                            .into());
                    }
                    self.core.scopes.add_symbol(
                        SymbolKind::TypeLiteral,
                        &value.name,
                        SymbolValue::TypeLiteral {
                            owner,
                            ordinal: ordinal as i64,
                        },
                    );
                }
                Ok(owner)
            }
            TypeKind::Subrange { start, end } => {
                let (start_value, start_ty) = self.evaluate_constant(start)?;
                let (end_value, end_ty) = self.evaluate_constant(end)?;
                let base = self.core.base_type(start_ty);
                if base != self.core.base_type(end_ty) || ordinal_bounds(&self.core.scopes, base).is_none() {
                    return Err(self.core.mismatch(start_ty, end_ty, node.span));
                }
                let (Some(low), Some(high)) = (start_value.ord(), end_value.ord()) else {
                    return Err(self.core.mismatch(start_ty, end_ty, node.span));
                };
                Ok(self.core.scopes.add_symbol(
                    SymbolKind::TypeDefinition,
                    name,
                    SymbolValue::Subrange {
                        start: low,
                        end: high,
                        base,
                    },
                ))
            }
            TypeKind::Array { indices, element, .. } => {
                let mut index_types = Vec::with_capacity(indices.len());
                for index in indices {
                    let ty = self.resolve_type_node(index)?;
                    self.require_index_type(ty, index)?;
                    index_types.push(ty);
                }
                let element = self.resolve_type_node(element)?;
                Ok(self.core.scopes.add_symbol(
                    SymbolKind::TypeDefinition,
                    name,
                    SymbolValue::Array {
                        indices: index_types,
                        element,
                    },
                ))
            }
            TypeKind::Record(record) => self.define_record(name, record),
            TypeKind::Set { base, .. } => {
                let base = self.resolve_type_node(base)?;
                if ordinal_bounds(&self.core.scopes, base).is_none() {
                    return Err(self.core.mismatch_named("ordinal", base, node.span));
                }
                Ok(self
                    .core
                    .scopes
                    .add_symbol(SymbolKind::TypeDefinition, name, SymbolValue::Set { base }))
            }
            TypeKind::File { base, .. } => {
                let base = self.resolve_type_node(base)?;
                Ok(self
                    .core
                    .scopes
                    .add_symbol(SymbolKind::TypeDefinition, name, SymbolValue::File { base }))
            }
        }
    }

    /// Array indices are ordinal types of bounded size
    fn require_index_type(&self, ty: SymbolId, node: &TypeNode) -> SemanticResult<()> {
        let resolved = resolve_type(&self.core.scopes, ty);
        let bounded = match &self.core.scopes.symbol(resolved).value {
            SymbolValue::Subrange { .. } | SymbolValue::Enumerated { .. } => true,
            SymbolValue::Builtin(builtin) => matches!(builtin, BuiltinType::Boolean | BuiltinType::Char),
            _ => false,
        };
        if bounded {
            Ok(())
        } else {
            Err(self.core.mismatch_named("ordinal", ty, node.span))
        }
    }

    /// Define a record type; its fields live in a fresh scope
    fn define_record(&mut self, name: &str, record: &RecordType) -> SemanticResult<SymbolId> {
        let fields = self.core.scopes.push_scope();
        self.record_scopes.push(fields);
        let result = self.define_record_fields(record);
        self.record_scopes.pop();
        self.core.scopes.pop_scope();

        let variants = result?;
        Ok(self.core.scopes.add_symbol(
            SymbolKind::TypeDefinition,
            name,
            SymbolValue::Record { fields, variants },
        ))
    }

    fn define_record_fields(&mut self, record: &RecordType) -> SemanticResult<Vec<SymbolId>> {
        for section in &record.fixed {
            let ty = self.resolve_type_node(&section.ty)?;
            for name in &section.names {
                self.declare_field(name, ty)?;
            }
        }

        let mut variants = vec![];
        if let Some(part) = &record.variant {
            let tag_ty = self.resolve_type_identifier(&part.tag_type)?;
            if ordinal_bounds(&self.core.scopes, tag_ty).is_none() {
                return Err(self.core.mismatch_named("ordinal", tag_ty, part.tag_type.span));
            }
            if let Some(tag) = &part.tag {
                self.declare_field(tag, tag_ty)?;
            }

            for case in &part.cases {
                for constant in &case.constants {
                    let (_, ty) = self.evaluate_constant(constant)?;
                    if self.core.base_type(ty) != self.core.base_type(tag_ty) {
                        return Err(self.core.mismatch(tag_ty, ty, constant.span()));
                    }
                }
                let name = self.core.anonymous_name("VAR");
                variants.push(self.define_record(&name, &case.fields)?);
            }
        }
        Ok(variants)
    }

    /// Field names are unique across a record and all of its variants
    fn declare_field(&mut self, name: &Identifier, ty: SymbolId) -> SemanticResult<SymbolId> {
        let duplicate = self
            .record_scopes
            .iter()
            .any(|&scope| self.core.scopes.lookup_from(scope, &name.name, None, true).is_some());
        if duplicate {
            return Err(self
                .core
                .error(DiagnosticKind::DuplicateIdentifier, name.span)
                .with_arg("value", &name.name)
                .into());
        }
        Ok(self
            .core
            .scopes
            .add_symbol(SymbolKind::RecordField, &name.name, SymbolValue::Typed { ty }))
    }

    /// Resolve the type of a formal parameter
    pub(crate) fn resolve_parameter_type(&mut self, ty: &ParamType) -> SemanticResult<SymbolId> {
        match ty {
            ParamType::Identifier(ident) => self.resolve_type_identifier(ident),
            ParamType::ConformantArray(schema) => self.define_conformant_array(schema),
        }
    }

    /// Conformant arrays declare their bound identifiers as read-only parameters
    fn define_conformant_array(&mut self, schema: &ConformantArraySchema) -> SemanticResult<SymbolId> {
        let mut indices = Vec::with_capacity(schema.indices.len());
        for spec in &schema.indices {
            let index = self.resolve_type_identifier(&spec.ty)?;
            if ordinal_bounds(&self.core.scopes, index).is_none() {
                return Err(self.core.mismatch_named("ordinal", index, spec.ty.span));
            }
            for bound in [&spec.low, &spec.high] {
                self.declare_unique(bound)?;
                self.core.scopes.add_symbol(
                    SymbolKind::Parameter,
                    &bound.name,
                    SymbolValue::Parameter {
                        ty: Some(index),
                        by_ref: false,
                        signature: None,
                    },
                );
            }
            indices.push(index);
        }
        let element = self.resolve_parameter_type(&schema.element)?;

        let name = self.core.anonymous_name("CONF");
        let id = self.core.scopes.add_symbol(
            SymbolKind::TypeDefinition,
            &name,
            SymbolValue::Array { indices, element },
        );
        self.core.annotations.conformant_arrays.insert(id);
        Ok(id)
    }

    /// Fail with `DuplicateIdentifier` when `name` is already declared in the current scope
    pub(crate) fn declare_unique(&self, name: &Identifier) -> SemanticResult<()> {
        if self.core.scopes.has_symbol(&name.name, None, true) {
            Err(self
                .core
                .error(DiagnosticKind::DuplicateIdentifier, name.span)
                .with_arg("value", &name.name)
                .into())
        } else {
            Ok(())
        }
    }
}
