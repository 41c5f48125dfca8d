//! Expression analysis and activations

use ast::{BinaryOp, Expression, ExpressionKind, Identifier, NodeId, NumberValue, SetElement, UnaryOp, Variable};
use errors::DiagnosticKind;
use symbols::{BuiltinRoutine, Routine, SymbolId, SymbolKind, SymbolValue};
use ::types::{integer_literal, BinaryOperator, BuiltinType, ConstValue, UnaryOperator};

use crate::core::{ordinal_bounds, resolve_type, StaticType};
use crate::{Coercion, SemanticAnalyzer, SemanticResult};

impl SemanticAnalyzer {
    /// Analyze an expression and return its type
    pub(crate) fn analyze_expression(&mut self, expr: &Expression) -> SemanticResult<SymbolId> {
        let ty = match &expr.kind {
            ExpressionKind::Number(number) => {
                let (value, ty) = match number.value {
                    NumberValue::Integer(v) => {
                        let value = integer_literal(v).map_err(|error| self.core.type_error(error, expr.span))?;
                        (value, BuiltinType::Integer)
                    }
                    NumberValue::Real(v) => (ConstValue::Real(v), BuiltinType::Real),
                };
                self.fold(expr.id, value);
                self.core.builtin(ty)
            }
            ExpressionKind::String(literal) => {
                self.fold(expr.id, ConstValue::String(literal.value.clone()));
                self.core.builtin(BuiltinType::String)
            }
            ExpressionKind::Nil => {
                self.fold(expr.id, ConstValue::Nil);
                self.core.builtin(BuiltinType::Nil)
            }
            ExpressionKind::Variable(var) => self.analyze_variable_expression(expr.id, var)?,
            ExpressionKind::Call { name, args } => self.analyze_function_call(expr.id, name, args)?,
            ExpressionKind::Set(elements) => self.analyze_set(elements)?,
            ExpressionKind::Unary { op, operand } => self.analyze_unary(expr, *op, operand)?,
            ExpressionKind::Binary { op, left, right } => self.analyze_binary(expr, *op, left, right)?,
        };
        self.core.annotations.expression_types.insert(expr.id, ty);
        Ok(ty)
    }

    fn fold(&mut self, id: NodeId, value: ConstValue) {
        self.core.annotations.constants.insert(id, value);
    }

    /// Identifiers in expressions may also name constants, enumeration literals or functions
    fn analyze_variable_expression(&mut self, id: NodeId, var: &Variable) -> SemanticResult<SymbolId> {
        if let Some(ident) = var.as_entire() {
            if self.lookup_with_field(&ident.name).is_none() {
                if let Some(symbol_id) = self.core.scopes.resolve_reference(&ident.name) {
                    let symbol = self.core.scopes.symbol(symbol_id);
                    let constant = match &symbol.value {
                        SymbolValue::Constant { value, ty } => Some((value.clone(), *ty)),
                        SymbolValue::TypeLiteral { owner, ordinal } => {
                            Some((self.core.literal_value(*owner, *ordinal), *owner))
                        }
                        _ => None,
                    };
                    let callable = symbol.is_activatable();

                    if let Some((value, ty)) = constant {
                        self.fold(id, value);
                        return Ok(ty);
                    }
                    if callable {
                        return self.analyze_function_call(id, ident, &[]);
                    }
                }
            }
        }
        self.analyze_variable(var)
    }

    fn analyze_function_call(&mut self, id: NodeId, name: &Identifier, args: &[Expression]) -> SemanticResult<SymbolId> {
        match self.analyze_activation(id, name, args)? {
            Some(ty) => Ok(ty),
            None => Err(self
                .core
                .error(DiagnosticKind::TypeMismatch, name.span)
                .with_arg("aType", "function")
                .with_arg("bType", "procedure")
                .into()),
        }
    }

    /// Check a procedure or function activation; returns the result type of functions
    pub(crate) fn analyze_activation(
        &mut self,
        id: NodeId,
        name: &Identifier,
        args: &[Expression],
    ) -> SemanticResult<Option<SymbolId>> {
        let found = self.core.scopes.resolve_reference(&name.name).and_then(|symbol| {
            self.core
                .scopes
                .symbol(symbol)
                .routine()
                .cloned()
                .map(|routine| (symbol, routine))
        });
        let Some((symbol, routine)) = found else {
            return Err(self
                .core
                .error(DiagnosticKind::UndeclaredActivatable, name.span)
                .with_arg("value", &name.name)
                .into());
        };
        self.core.annotations.calls.insert(id, symbol);

        if !routine.variadic && args.len() != routine.params.len() {
            return Err(self
                .core
                .error(DiagnosticKind::ArgumentCountMismatch, name.span)
                .with_arg("value", &name.name)
                .with_arg("expected", routine.params.len())
                .with_arg("actual", args.len())
                .into());
        }

        for (index, arg) in args.iter().enumerate() {
            let Some(&param) = routine.params.get(index).or(routine.params.last()) else {
                break;
            };
            self.analyze_argument(&routine, param, arg)?;
        }
        Ok(routine.return_type)
    }

    fn analyze_argument(&mut self, routine: &Routine, param: SymbolId, arg: &Expression) -> SemanticResult<()> {
        let (formal, by_ref, procedural) = match &self.core.scopes.symbol(param).value {
            SymbolValue::Parameter { ty, by_ref, signature } => (*ty, *by_ref, signature.is_some()),
            _ => (None, false, false),
        };

        if procedural {
            let target = arg
                .as_identifier()
                .and_then(|ident| self.core.scopes.resolve_reference(&ident.name))
                .filter(|&symbol| self.core.scopes.symbol(symbol).is_activatable());
            if target.is_none() {
                let value = arg.as_identifier().map_or("expression", |ident| ident.name.as_str());
                return Err(self
                    .core
                    .error(DiagnosticKind::UndeclaredActivatable, arg.span)
                    .with_arg("value", value)
                    .into());
            }
            return Ok(());
        }

        let formal = formal.unwrap_or_else(|| self.core.builtin(BuiltinType::Any));
        let reads = routine.builtin == Some(BuiltinRoutine::ReadLn);
        if by_ref || reads {
            let Some(var) = arg.as_variable() else {
                return Err(self
                    .core
                    .error(DiagnosticKind::IncompatibleVariable, arg.span)
                    .with_arg("expected", "variable")
                    .with_arg("actual", "expression")
                    .into());
            };
            let actual = self.analyze_variable(var)?;
            self.core.annotations.expression_types.insert(arg.id, actual);

            if reads {
                let readable = matches!(
                    self.core.static_type(actual),
                    StaticType::Integer | StaticType::Real | StaticType::String
                );
                if !readable {
                    return Err(self.core.mismatch_named("String", actual, arg.span));
                }
            } else if self.core.base_type(formal) != self.core.base_type(actual) {
                return Err(self.core.mismatch(formal, actual, arg.span));
            }
            return Ok(());
        }

        let actual = self.analyze_expression(arg)?;
        self.check_assignable(formal, actual, arg)
    }

    /// Assignment compatibility of a value with a target type, recording any implicit conversion
    pub(crate) fn check_assignable(&mut self, target: SymbolId, value: SymbolId, expr: &Expression) -> SemanticResult<()> {
        let target_static = self.core.static_type(target);
        if target_static == StaticType::Any || self.core.base_type(target) == self.core.base_type(value) {
            return Ok(());
        }

        match (target_static, self.core.static_type(value)) {
            (StaticType::Real, StaticType::Integer) => {
                self.core.annotations.coercions.insert(expr.id, Coercion::IntToReal);
                Ok(())
            }
            (StaticType::Char, StaticType::String) if self.is_char_literal(expr) => {
                self.core.annotations.coercions.insert(expr.id, Coercion::CharCode);
                Ok(())
            }
            (StaticType::Pointer, StaticType::Nil) => Ok(()),
            _ => Err(self.core.mismatch(target, value, expr.span)),
        }
    }

    fn is_char_literal(&self, expr: &Expression) -> bool {
        matches!(self.core.annotations.constant(expr.id), Some(value @ ConstValue::String(_)) if value.as_char().is_some())
    }

    fn analyze_set(&mut self, elements: &[SetElement]) -> SemanticResult<SymbolId> {
        let mut base: Option<SymbolId> = None;
        for element in elements {
            for bound in std::iter::once(&element.start).chain(element.end.as_ref()) {
                let ty = self.analyze_expression(bound)?;
                if ordinal_bounds(&self.core.scopes, ty).is_none() {
                    return Err(self.core.mismatch_named("ordinal", ty, bound.span));
                }
                match base {
                    Some(expected) if self.core.base_type(expected) != self.core.base_type(ty) => {
                        return Err(self.core.mismatch(expected, ty, bound.span));
                    }
                    Some(_) => {}
                    None => base = Some(self.core.base_type(ty)),
                }
            }
        }

        let base = base.unwrap_or_else(|| self.core.builtin(BuiltinType::Any));
        let name = self.core.anonymous_name("SET");
        Ok(self
            .core
            .scopes
            .add_symbol(SymbolKind::TypeDefinition, &name, SymbolValue::Set { base }))
    }

    fn analyze_unary(&mut self, expr: &Expression, op: UnaryOp, operand: &Expression) -> SemanticResult<SymbolId> {
        let ty = self.analyze_expression(operand)?;
        let result = match op {
            UnaryOp::Plus | UnaryOp::Minus => {
                if !self.core.static_type(ty).is_numeric() {
                    return Err(self.core.mismatch_named("Integer", ty, operand.span));
                }
                self.core.base_type(ty)
            }
            UnaryOp::Not => {
                if self.core.static_type(ty) != StaticType::Boolean {
                    return Err(self.core.mismatch_named("Boolean", ty, operand.span));
                }
                self.core.builtin(BuiltinType::Boolean)
            }
        };

        if let Some(value) = self.core.annotations.constant(operand.id).cloned() {
            let op = match op {
                UnaryOp::Plus => UnaryOperator::Plus,
                UnaryOp::Minus => UnaryOperator::Minus,
                UnaryOp::Not => UnaryOperator::Not,
            };
            let folded = value.unary(op).map_err(|e| self.core.type_error(e, expr.span))?;
            self.fold(expr.id, folded);
        }
        Ok(result)
    }

    fn analyze_binary(
        &mut self,
        expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> SemanticResult<SymbolId> {
        let left_ty = self.analyze_expression(left)?;
        let right_ty = self.analyze_expression(right)?;
        let (l, r) = (self.core.static_type(left_ty), self.core.static_type(right_ty));
        let boolean = self.core.builtin(BuiltinType::Boolean);
        let integer = self.core.builtin(BuiltinType::Integer);
        let real = self.core.builtin(BuiltinType::Real);

        let result = match op {
            BinaryOp::In => {
                let resolved = resolve_type(&self.core.scopes, right_ty);
                match self.core.scopes.symbol(resolved).value {
                    SymbolValue::Set { base } => {
                        let any = self.core.builtin(BuiltinType::Any);
                        if base != any && self.core.base_type(base) != self.core.base_type(left_ty) {
                            return Err(self.core.mismatch(base, left_ty, left.span));
                        }
                    }
                    _ => return Err(self.core.mismatch_named("set", right_ty, right.span)),
                }
                return Ok(boolean);
            }
            BinaryOp::And | BinaryOp::Or => {
                for (ty, side) in [(left_ty, left), (right_ty, right)] {
                    if self.core.static_type(ty) != StaticType::Boolean {
                        return Err(self.core.mismatch(boolean, ty, side.span));
                    }
                }
                boolean
            }
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply => match (l, r) {
                (StaticType::Integer, StaticType::Integer) => integer,
                (StaticType::Integer | StaticType::Real, StaticType::Integer | StaticType::Real) => {
                    self.promote(left, l);
                    self.promote(right, r);
                    real
                }
                (StaticType::String, StaticType::String) if op == BinaryOp::Add => {
                    self.core.builtin(BuiltinType::String)
                }
                (StaticType::Set, StaticType::Set) => left_ty,
                _ => return Err(self.core.mismatch(left_ty, right_ty, expr.span)),
            },
            BinaryOp::Divide => {
                if !l.is_numeric() || !r.is_numeric() {
                    return Err(self.core.mismatch(left_ty, right_ty, expr.span));
                }
                self.promote(left, l);
                self.promote(right, r);
                real
            }
            BinaryOp::Div | BinaryOp::Mod => {
                for (ty, side) in [(left_ty, left), (right_ty, right)] {
                    if self.core.static_type(ty) != StaticType::Integer {
                        return Err(self.core.mismatch(integer, ty, side.span));
                    }
                }
                integer
            }
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => {
                self.check_comparable(op, expr, (left, left_ty), (right, right_ty))?;
                boolean
            }
        };

        let values = (
            self.core.annotations.constant(left.id).cloned(),
            self.core.annotations.constant(right.id).cloned(),
        );
        if let ((Some(a), Some(b)), Some(operator)) = (values, value_operator(op)) {
            let folded = a.binary(operator, &b).map_err(|e| self.core.type_error(e, expr.span))?;
            self.fold(expr.id, folded);
        }
        Ok(result)
    }

    /// Integer operands in a real operation are converted
    fn promote(&mut self, operand: &Expression, ty: StaticType) {
        if ty == StaticType::Integer {
            self.core.annotations.coercions.insert(operand.id, Coercion::IntToReal);
        }
    }

    fn check_comparable(
        &mut self,
        op: BinaryOp,
        expr: &Expression,
        (left, left_ty): (&Expression, SymbolId),
        (right, right_ty): (&Expression, SymbolId),
    ) -> SemanticResult<()> {
        let (l, r) = (self.core.static_type(left_ty), self.core.static_type(right_ty));
        let equality = matches!(op, BinaryOp::Equal | BinaryOp::NotEqual);

        let comparable = match (l, r) {
            _ if !l.is_scalar() || !r.is_scalar() => false,
            (StaticType::Pointer | StaticType::Nil, StaticType::Pointer | StaticType::Nil) => {
                equality && (l == StaticType::Nil || r == StaticType::Nil || self.core.base_type(left_ty) == self.core.base_type(right_ty))
            }
            _ if self.core.base_type(left_ty) == self.core.base_type(right_ty) => true,
            (StaticType::Integer | StaticType::Real, StaticType::Integer | StaticType::Real) => {
                self.promote(left, l);
                self.promote(right, r);
                true
            }
            (StaticType::Char, StaticType::String) if self.is_char_literal(right) => {
                self.core.annotations.coercions.insert(right.id, Coercion::CharCode);
                true
            }
            (StaticType::String, StaticType::Char) if self.is_char_literal(left) => {
                self.core.annotations.coercions.insert(left.id, Coercion::CharCode);
                true
            }
            _ => false,
        };

        if comparable {
            Ok(())
        } else {
            Err(self.core.mismatch(left_ty, right_ty, expr.span))
        }
    }
}

/// Operator of the constant-folding value model
fn value_operator(op: BinaryOp) -> Option<BinaryOperator> {
    Some(match op {
        BinaryOp::Add => BinaryOperator::Add,
        BinaryOp::Subtract => BinaryOperator::Subtract,
        BinaryOp::Multiply => BinaryOperator::Multiply,
        BinaryOp::Divide => BinaryOperator::Divide,
        BinaryOp::Div => BinaryOperator::IntDivide,
        BinaryOp::Mod => BinaryOperator::Mod,
        BinaryOp::And => BinaryOperator::And,
        BinaryOp::Or => BinaryOperator::Or,
        BinaryOp::Equal => BinaryOperator::Equal,
        BinaryOp::NotEqual => BinaryOperator::NotEqual,
        BinaryOp::Less => BinaryOperator::Less,
        BinaryOp::LessEqual => BinaryOperator::LessEqual,
        BinaryOp::Greater => BinaryOperator::Greater,
        BinaryOp::GreaterEqual => BinaryOperator::GreaterEqual,
        BinaryOp::In => return None,
    })
}
