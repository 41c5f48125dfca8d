//! Expressions, variable access and activations

use std::collections::VecDeque;

use ast::{BinaryOp, Expression, ExpressionKind, Identifier, NodeId, NumberValue, UnaryOp, Variable, VariableKind};
use ir::{CodeTree, Opcode, Operand};
use semantics::{find_field, resolve_type, Coercion, StaticType};
use symbols::{BuiltinRoutine, SymbolId, SymbolValue};
use tokens::Span;
use ::types::{BuiltinType, ConstValue};

use crate::layout::{field_offset, index_bounds, index_count, size_of, Location};
use crate::registry::Activatable;
use crate::{load_slot, store_slot, CodeGenerator, CodegenError, CodegenResult};

/// One component of a computed address
#[derive(Debug, Clone)]
enum Step {
    Index { expr: Expression, low: i64, stride: i64 },
    Field(i64),
}

impl CodeGenerator<'_> {
    pub(crate) fn emit_expression(&mut self, expr: &Expression, code: &mut CodeTree) -> CodegenResult<()> {
        if let Some(value) = self.annotations.constant(expr.id) {
            emit_constant(value, expr.span, code)?;
        } else {
            match &expr.kind {
                ExpressionKind::Number(number) => match number.value {
                    NumberValue::Integer(value) => code.push_int(value),
                    NumberValue::Real(value) => code.push_real(value),
                },
                ExpressionKind::String(literal) => code.push_string(&literal.value),
                ExpressionKind::Nil => return Err(CodegenError::unsupported("nil value", expr.span)),
                ExpressionKind::Variable(var) => {
                    if self.annotations.call(expr.id).is_some() {
                        self.emit_call(expr.id, var.root(), &[], true, code)?;
                    } else {
                        self.emit_load(var, code)?;
                    }
                }
                ExpressionKind::Call { name, args } => self.emit_call(expr.id, name, args, true, code)?,
                ExpressionKind::Set(_) => return Err(CodegenError::unsupported("set constructor", expr.span)),
                ExpressionKind::Unary { op, operand } => self.emit_unary(expr, *op, operand, code)?,
                ExpressionKind::Binary { op, left, right } => self.emit_binary(expr, *op, left, right, code)?,
            }
        }

        match self.annotations.coercion(expr.id) {
            Some(Coercion::IntToReal) => code.emit(Opcode::Itof),
            Some(Coercion::CharCode) => code.emit(Opcode::ChrCode),
            None => {}
        }
        Ok(())
    }

    fn emit_unary(&mut self, expr: &Expression, op: UnaryOp, operand: &Expression, code: &mut CodeTree) -> CodegenResult<()> {
        if op == UnaryOp::Not {
            self.emit_expression(operand, code)?;
            code.emit(Opcode::Not);
            return Ok(());
        }

        // `-x` is `0 - x`
        let real = self.expression_static_type(expr) == StaticType::Real;
        if real {
            code.push_real(0.0);
        } else {
            code.push_int(0);
        }
        self.emit_expression(operand, code)?;
        code.emit(match (op, real) {
            (UnaryOp::Minus, true) => Opcode::FSub,
            (UnaryOp::Minus, false) => Opcode::Sub,
            (_, true) => Opcode::FAdd,
            (_, false) => Opcode::Add,
        });
        Ok(())
    }

    fn emit_binary(
        &mut self,
        expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        code: &mut CodeTree,
    ) -> CodegenResult<()> {
        let (l, r) = (self.expression_static_type(left), self.expression_static_type(right));
        if op == BinaryOp::In {
            return Err(CodegenError::unsupported("set membership", expr.span));
        }
        if l == StaticType::Set || r == StaticType::Set {
            return Err(CodegenError::unsupported("set operation", expr.span));
        }

        self.emit_expression(left, code)?;
        self.emit_expression(right, code)?;

        let real = op == BinaryOp::Divide || l == StaticType::Real || r == StaticType::Real;
        let string = l == StaticType::String && r == StaticType::String;
        let pick = |integer: Opcode, float: Opcode| if real { float } else { integer };

        let opcode = match op {
            BinaryOp::And => Opcode::And,
            BinaryOp::Or => Opcode::Or,
            BinaryOp::Equal => Opcode::Equal,
            BinaryOp::NotEqual => {
                code.emit(Opcode::Equal);
                Opcode::Not
            }
            BinaryOp::Add if string => Opcode::Concat,
            _ if string => return Err(CodegenError::unsupported("string ordering", expr.span)),
            BinaryOp::Add => pick(Opcode::Add, Opcode::FAdd),
            BinaryOp::Subtract => pick(Opcode::Sub, Opcode::FSub),
            BinaryOp::Multiply => pick(Opcode::Mul, Opcode::FMul),
            BinaryOp::Divide => Opcode::FDiv,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Less => pick(Opcode::Inf, Opcode::FInf),
            BinaryOp::LessEqual => pick(Opcode::InfEq, Opcode::FInfEq),
            BinaryOp::Greater => pick(Opcode::Sup, Opcode::FSup),
            BinaryOp::GreaterEqual => pick(Opcode::SupEq, Opcode::FSupEq),
            BinaryOp::In => return Err(CodegenError::unsupported("set membership", expr.span)),
        };
        code.emit(opcode);
        Ok(())
    }

    fn expression_static_type(&self, expr: &Expression) -> StaticType {
        self.annotations
            .expression_type(expr.id)
            .map_or(StaticType::Any, |ty| self.static_type(ty))
    }

    // ===== Activations =====

    /// Emit a call; a function result the caller does not use is dropped
    pub(crate) fn emit_call(
        &mut self,
        id: NodeId,
        name: &Identifier,
        args: &[Expression],
        value: bool,
        code: &mut CodeTree,
    ) -> CodegenResult<()> {
        let unresolved = || CodegenError::UnresolvedActivatable {
            name: name.name.clone(),
            span: name.span,
        };
        let symbol = self.annotations.call(id).ok_or_else(unresolved)?;

        let function = match self.registry.get(symbol) {
            Some(Activatable::Builtin(builtin)) => {
                self.emit_builtin(builtin, args, name.span, code)?;
                self.scopes.symbol(symbol).routine().is_some_and(|routine| routine.is_function())
            }
            Some(Activatable::Routine { label, argc, function }) => {
                if function {
                    code.push_int(0);
                }
                for arg in args {
                    self.emit_expression(arg, code)?;
                }
                code.emit_with(Opcode::PushA, Operand::Label(label));
                code.emit(Opcode::Call);
                if argc > 0 {
                    code.emit_with(Opcode::Pop, Operand::Int(argc as i64));
                }
                function
            }
            None if matches!(self.scopes.symbol(symbol).value, SymbolValue::Parameter { .. }) => {
                return Err(CodegenError::unsupported("procedural parameter", name.span));
            }
            None => return Err(unresolved()),
        };

        if function && !value {
            code.emit_with(Opcode::Pop, Operand::Int(1));
        }
        Ok(())
    }

    fn emit_builtin(&mut self, builtin: BuiltinRoutine, args: &[Expression], span: Span, code: &mut CodeTree) -> CodegenResult<()> {
        match builtin {
            BuiltinRoutine::Write | BuiltinRoutine::WriteLn => {
                for arg in args {
                    self.emit_expression(arg, code)?;
                    let opcode = match self.expression_static_type(arg) {
                        StaticType::Integer | StaticType::Boolean | StaticType::Enumerated => Opcode::WriteI,
                        StaticType::Real => Opcode::WriteF,
                        StaticType::String => Opcode::WriteS,
                        StaticType::Char => Opcode::WriteChr,
                        _ => return Err(CodegenError::unsupported("write of a structured value", arg.span)),
                    };
                    code.emit(opcode);
                }
                if builtin == BuiltinRoutine::WriteLn {
                    code.emit(Opcode::WriteLn);
                }
            }
            BuiltinRoutine::ReadLn => {
                if args.is_empty() {
                    code.emit(Opcode::Read);
                    code.emit_with(Opcode::Pop, Operand::Int(1));
                }
                for arg in args {
                    let var = arg
                        .as_variable()
                        .ok_or_else(|| CodegenError::unsupported("read into an expression", arg.span))?;
                    let conversion = match self.static_type(self.variable_type(var)?) {
                        StaticType::Integer => Some(Opcode::Atoi),
                        StaticType::Real => Some(Opcode::Atof),
                        _ => None,
                    };
                    self.emit_store(
                        var,
                        |_, code| {
                            code.emit(Opcode::Read);
                            if let Some(conversion) = conversion {
                                code.emit(conversion);
                            }
                            Ok(())
                        },
                        code,
                    )?;
                }
            }
            BuiltinRoutine::Length | BuiltinRoutine::Atoi => {
                let arg = args
                    .first()
                    .ok_or_else(|| CodegenError::unsupported(format!("{} without argument", builtin.name()), span))?;
                self.emit_expression(arg, code)?;
                code.emit(if builtin == BuiltinRoutine::Length {
                    Opcode::StrLen
                } else {
                    Opcode::Atoi
                });
            }
        }
        Ok(())
    }

    // ===== Variable access =====

    pub(crate) fn variable_type(&self, var: &Variable) -> CodegenResult<SymbolId> {
        self.annotations
            .variable_type(var.id)
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                name: var.root().name.clone(),
                span: var.span,
            })
    }

    fn require_scalar(&self, var: &Variable) -> CodegenResult<()> {
        if self.static_type(self.variable_type(var)?).is_scalar() {
            Ok(())
        } else {
            Err(CodegenError::unsupported("structured value copy", var.span))
        }
    }

    /// Character of a string variable, `s[i]`
    fn string_element<'v>(&self, var: &'v Variable) -> CodegenResult<Option<(&'v Variable, &'v Expression)>> {
        if let VariableKind::Indexed { base, indices } = &var.kind {
            if self.static_type(self.variable_type(base)?) == StaticType::String {
                return match indices.as_slice() {
                    [index] => Ok(Some((base, index))),
                    _ => Err(CodegenError::unsupported("multi-dimensional string index", var.span)),
                };
            }
        }
        Ok(None)
    }

    pub(crate) fn emit_load(&mut self, var: &Variable, code: &mut CodeTree) -> CodegenResult<()> {
        self.require_scalar(var)?;
        if let Some((base, index)) = self.string_element(var)? {
            // Strings are indexed from 1, CHARAT from 0
            self.emit_load(base, code)?;
            self.emit_expression(index, code)?;
            code.push_int(1);
            code.emit(Opcode::Sub);
            code.emit(Opcode::CharAt);
            return Ok(());
        }

        let (root, steps) = self.lower(var)?;
        if steps.is_empty() {
            load_slot(code, root);
        } else {
            self.emit_address(root, &steps, code)?;
            code.emit(Opcode::LoadN);
        }
        Ok(())
    }

    /// Store the value produced by `value` into `var`
    pub(crate) fn emit_store<F>(&mut self, var: &Variable, value: F, code: &mut CodeTree) -> CodegenResult<()>
    where
        F: FnOnce(&mut Self, &mut CodeTree) -> CodegenResult<()>,
    {
        self.require_scalar(var)?;
        if self.string_element(var)?.is_some() {
            return Err(CodegenError::unsupported("string element assignment", var.span));
        }

        let (root, steps) = self.lower(var)?;
        if steps.is_empty() {
            value(self, code)?;
            store_slot(code, root);
        } else {
            self.emit_address(root, &steps, code)?;
            value(self, code)?;
            code.emit(Opcode::StoreN);
        }
        Ok(())
    }

    /// Base pointer, then the slot offset of the accessed component
    fn emit_address(&mut self, root: Location, steps: &[Step], code: &mut CodeTree) -> CodegenResult<()> {
        code.emit(match root {
            Location::Global(_) => Opcode::PushGp,
            Location::Local(_) => Opcode::PushFp,
        });
        code.push_int(root.offset());
        for step in steps {
            match step {
                Step::Index { expr, low, stride } => {
                    self.emit_expression(expr, code)?;
                    code.push_int(*low);
                    code.emit(Opcode::Sub);
                    if *stride != 1 {
                        code.push_int(*stride);
                        code.emit(Opcode::Mul);
                    }
                    code.emit(Opcode::Add);
                }
                Step::Field(offset) => {
                    code.push_int(*offset);
                    code.emit(Opcode::Add);
                }
            }
        }
        Ok(())
    }

    /// Split an access into its root slot and the components applied to it
    fn lower(&self, var: &Variable) -> CodegenResult<(Location, Vec<Step>)> {
        let unresolved = |name: &str| CodegenError::UnresolvedVariable {
            name: name.to_string(),
            span: var.span,
        };

        match &var.kind {
            VariableKind::Entire(ident) => {
                if let Some(binding) = self.annotations.with_field(var.id) {
                    let record = self
                        .with_record(binding.record)
                        .ok_or_else(|| unresolved(&ident.name))?;
                    let (root, mut steps) = self.lower(&record)?;
                    let record_ty = self.variable_type(&record)?;
                    let offset = field_offset(self.scopes, record_ty, binding.field, var.span)?
                        .ok_or_else(|| unresolved(&ident.name))?;
                    steps.push(Step::Field(offset));
                    return Ok((root, steps));
                }
                let symbol = self.annotations.binding(var.id).ok_or_else(|| unresolved(&ident.name))?;
                Ok((self.locate(symbol, ident)?, vec![]))
            }
            VariableKind::Indexed { base, indices } => {
                let (root, mut steps) = self.lower(base)?;
                let mut element = self.variable_type(base)?;
                let mut pending: VecDeque<SymbolId> = VecDeque::new();

                for index in indices {
                    if pending.is_empty() {
                        let resolved = resolve_type(self.scopes, element);
                        match &self.scopes.symbol(resolved).value {
                            SymbolValue::Array { indices, element: inner } => {
                                pending.extend(indices.iter().copied());
                                element = *inner;
                            }
                            SymbolValue::Builtin(BuiltinType::String) => {
                                return Err(CodegenError::unsupported("string element of a structure", index.span));
                            }
                            _ => return Err(unresolved(&var.root().name)),
                        }
                    }
                    let Some(index_ty) = pending.pop_front() else {
                        return Err(unresolved(&var.root().name));
                    };
                    let (low, _) = index_bounds(self.scopes, index_ty, index.span)?;
                    let mut stride = size_of(self.scopes, element, index.span)?;
                    for &rest in &pending {
                        stride *= index_count(self.scopes, rest, index.span)?;
                    }
                    steps.push(Step::Index {
                        expr: index.clone(),
                        low,
                        stride,
                    });
                }
                Ok((root, steps))
            }
            VariableKind::Field { base, field } => {
                let (root, mut steps) = self.lower(base)?;
                let record_ty = self.variable_type(base)?;
                let symbol = find_field(self.scopes, record_ty, &field.name).ok_or_else(|| unresolved(&field.name))?;
                let offset = field_offset(self.scopes, record_ty, symbol, field.span)?
                    .ok_or_else(|| unresolved(&field.name))?;
                steps.push(Step::Field(offset));
                Ok((root, steps))
            }
            VariableKind::Dereference(_) => Err(CodegenError::unsupported("pointer dereference", var.span)),
        }
    }

    pub(crate) fn locate(&self, symbol: SymbolId, ident: &Identifier) -> CodegenResult<Location> {
        self.frame
            .as_ref()
            .and_then(|frame| frame.location(symbol))
            .or_else(|| self.globals.location(symbol))
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                name: ident.name.clone(),
                span: ident.span,
            })
    }
}

fn emit_constant(value: &ConstValue, span: Span, code: &mut CodeTree) -> CodegenResult<()> {
    match value {
        ConstValue::Integer(v) => code.push_int(*v),
        ConstValue::Real(v) => code.push_real(*v),
        ConstValue::Boolean(v) => code.push_int(i64::from(*v)),
        ConstValue::Char(v) => code.push_int(i64::from(*v)),
        ConstValue::String(v) => code.push_string(v),
        ConstValue::Nil => return Err(CodegenError::unsupported("nil value", span)),
    }
    Ok(())
}
