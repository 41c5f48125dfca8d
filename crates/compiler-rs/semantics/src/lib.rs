//! Pascal Semantic Analysis
//!
//! This crate performs semantic analysis on the AST, including:
//! - Symbol resolution through nested scopes
//! - Label, constant, type, variable and routine declarations
//! - Type checking and assignment compatibility
//! - Constant folding with the built-in value model
//!
//! Errors abort the analysis of the innermost declaration or statement only;
//! they are collected and analysis continues with its siblings.
//! Results for later phases are recorded in [`Annotations`].

use ast::{
    Block, CaseArm, Expression, FormalParameter, Identifier, Label, NodeId, Program, RoutineBody,
    RoutineDeclaration, RoutineHeading, RoutineKind, Statement, StatementKind, Variable,
};
use errors::{Diagnostic, DiagnosticKind};
use symbols::{Routine, ScopeId, ScopeManager, SymbolId, SymbolKind, SymbolValue};
use thiserror::Error;
use ::types::BuiltinType;

mod annotations;
mod core;
mod expressions;
mod lvalues;
mod types;

pub use annotations::{Annotations, Coercion, WithField};
pub use crate::core::{
    base_type, find_field, ordinal_bounds, resolve_type, static_type, symbol_type, type_name, CoreAnalyzer,
    StaticType,
};

/// A semantic error aborting the current declaration or statement
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .0.message())]
pub struct SemanticError(Box<Diagnostic>);

impl SemanticError {
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.0
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        *self.0
    }
}

impl From<Diagnostic> for SemanticError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(Box::new(diagnostic))
    }
}

pub type SemanticResult<T> = Result<T, SemanticError>;

/// Record variable opened by a `with` statement
#[derive(Debug, Clone, Copy)]
struct WithFrame {
    variable: NodeId,
    record: SymbolId,
}

/// Semantic analyzer
pub struct SemanticAnalyzer {
    core: CoreAnalyzer,
    /// Labels declared by each enclosing block, innermost last
    label_blocks: Vec<Vec<u32>>,
    with_frames: Vec<WithFrame>,
    /// Field scopes of the records being defined, innermost last
    record_scopes: Vec<ScopeId>,
}

impl SemanticAnalyzer {
    /// Create a new semantic analyzer with a fresh scope manager
    pub fn new(filename: Option<String>) -> Self {
        Self::with_scopes(ScopeManager::new(), filename)
    }

    /// Create an analyzer populating the given scope manager
    pub fn with_scopes(scopes: ScopeManager, filename: Option<String>) -> Self {
        Self {
            core: CoreAnalyzer::new(scopes, filename),
            label_blocks: vec![],
            with_frames: vec![],
            record_scopes: vec![],
        }
    }

    /// Analyze a program AST
    pub fn analyze(&mut self, program: &Program) -> Vec<Diagnostic> {
        let scope = self.core.scopes.push_scope();
        self.core.annotations.program_scope = Some(scope);
        self.analyze_block(&program.block);
        self.core.scopes.pop_scope();

        self.core.diagnostics.clone()
    }

    pub fn scopes(&self) -> &ScopeManager {
        &self.core.scopes
    }

    pub fn annotations(&self) -> &Annotations {
        &self.core.annotations
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.core.diagnostics
    }

    /// Hand the populated scopes, annotations and diagnostics to later phases
    pub fn into_parts(self) -> (ScopeManager, Annotations, Vec<Diagnostic>) {
        (self.core.scopes, self.core.annotations, self.core.diagnostics)
    }

    /// Analyze a block: labels, constants, types, variables, routines, then statements
    fn analyze_block(&mut self, block: &Block) {
        self.declare_labels(&block.labels, &block.body);

        for definition in &block.constants {
            let result = self.analyze_constant_definition(&definition.name, &definition.value);
            self.core.recover(result);
        }
        for definition in &block.types {
            let result = self.analyze_type_definition(&definition.name, &definition.ty);
            self.core.recover(result);
        }
        for declaration in &block.variables {
            let result = self.analyze_variable_declaration(&declaration.names, &declaration.ty);
            self.core.recover(result);
        }
        for routine in &block.routines {
            let result = self.analyze_routine(routine);
            self.core.recover(result);
        }

        self.analyze_statement(&block.body);
        self.report_uncompleted_forwards(&block.routines);
        self.label_blocks.pop();
    }

    /// A forward declaration needs its full declaration in the same block
    fn report_uncompleted_forwards(&mut self, routines: &[RoutineDeclaration]) {
        for decl in routines.iter().filter(|decl| decl.is_forward()) {
            let Some(&symbol) = self.core.annotations.routine_symbols.get(&decl.id) else {
                continue;
            };
            if self.core.scopes.symbol(symbol).routine().is_some_and(|r| r.forward) {
                let name = &decl.heading.name;
                let diagnostic = self
                    .core
                    .error(DiagnosticKind::UndefinedReference, name.span)
                    .with_arg("value", &name.name);
                self.core.report(diagnostic);
            }
        }
    }

    fn declare_labels(&mut self, labels: &[Label], body: &Statement) {
        let mut declared = vec![];
        for label in labels {
            let name = label.value.to_string();
            if self.core.scopes.has_symbol(&name, Some(SymbolKind::Label), true) {
                let diagnostic = self
                    .core
                    .error(DiagnosticKind::DuplicateLabel, label.span)
                    .with_arg("value", label.value);
                self.core.report(diagnostic);
                continue;
            }
            self.core
                .scopes
                .add_symbol(SymbolKind::Label, &name, SymbolValue::Label(label.value));
            declared.push(label.value);
        }

        let attached = body.labels();
        for &value in &declared {
            if attached.contains(&value) {
                continue;
            }
            if let Some(label) = labels.iter().find(|l| l.value == value) {
                let diagnostic = self
                    .core
                    .error(DiagnosticKind::UnusedLabel, label.span)
                    .with_arg("value", value);
                self.core.report(diagnostic);
            }
        }
        self.label_blocks.push(declared);
    }

    fn analyze_constant_definition(&mut self, name: &Identifier, value: &ast::Constant) -> SemanticResult<()> {
        if self.core.scopes.has_symbol(&name.name, None, true) {
            return Err(self
                .core
                .error(DiagnosticKind::DuplicateConst, name.span)
                .with_arg("value", &name.name)
                .into());
        }
        let (value, ty) = self.evaluate_constant(value)?;
        self.core
            .scopes
            .add_symbol(SymbolKind::Constant, &name.name, SymbolValue::Constant { value, ty });
        Ok(())
    }

    fn analyze_type_definition(&mut self, name: &Identifier, ty: &ast::TypeNode) -> SemanticResult<()> {
        if self.core.scopes.has_symbol(&name.name, None, true) {
            return Err(self
                .core
                .error(DiagnosticKind::DuplicateType, name.span)
                .with_arg("value", &name.name)
                .into());
        }
        self.define_type(&name.name, ty)?;
        Ok(())
    }

    /// All names of one declaration share the same type symbol
    fn analyze_variable_declaration(&mut self, names: &[Identifier], ty: &ast::TypeNode) -> SemanticResult<()> {
        let ty = self.resolve_type_node(ty)?;
        for name in names {
            let result = self.declare_unique(name);
            if self.core.recover(result).is_some() {
                self.core
                    .scopes
                    .add_symbol(SymbolKind::Variable, &name.name, SymbolValue::Typed { ty });
            }
        }
        Ok(())
    }

    // ===== Routines =====

    fn analyze_routine(&mut self, decl: &RoutineDeclaration) -> SemanticResult<()> {
        let heading = &decl.heading;
        let name = &heading.name;
        let forward = decl.is_forward();

        // A pending forward declaration is completed rather than redeclared
        let pending = self
            .core
            .scopes
            .get_symbol_by_name_and_kind(&name.name, Some(SymbolKind::Activatable), true)
            .filter(|&id| self.core.scopes.symbol(id).routine().is_some_and(|r| r.forward));
        if (forward && pending.is_some()) || (pending.is_none() && self.core.scopes.has_symbol(&name.name, None, true)) {
            return Err(self
                .core
                .error(DiagnosticKind::DuplicateIdentifier, name.span)
                .with_arg("value", &name.name)
                .into());
        }

        let previous_return = pending
            .and_then(|id| self.core.scopes.symbol(id).routine())
            .and_then(|routine| routine.return_type);
        let return_type = self.resolve_return_type(heading, previous_return)?;

        let symbol = match pending {
            Some(id) => id,
            None => self.core.scopes.add_symbol(
                SymbolKind::Activatable,
                &name.name,
                SymbolValue::Routine(Routine {
                    params: vec![],
                    return_type,
                    builtin: None,
                    variadic: false,
                    forward,
                    scope: None,
                }),
            ),
        };
        self.core.annotations.routine_symbols.insert(decl.id, symbol);

        let scope = self.core.scopes.push_deferred_scope();
        let scope_id = scope.id();
        self.core.scopes.set_scope_routine(scope_id, symbol);
        self.core.scopes.link_symbol(scope_id, symbol);

        let result = self.analyze_routine_contents(decl, symbol, pending.is_some(), return_type, scope_id);
        self.core.scopes.pop_deferred_scope(scope);
        result
    }

    /// Result types resolve against the enclosing scope
    fn resolve_return_type(
        &mut self,
        heading: &RoutineHeading,
        previous: Option<SymbolId>,
    ) -> SemanticResult<Option<SymbolId>> {
        match &heading.kind {
            RoutineKind::Procedure => Ok(None),
            RoutineKind::Function {
                return_type: Some(ident),
            } => self.resolve_type_identifier(ident).map(Some),
            RoutineKind::Function { return_type: None } => match previous {
                Some(ty) => Ok(Some(ty)),
                None => Err(self
                    .core
                    .error(DiagnosticKind::UndeclaredType, heading.name.span)
                    .with_arg("value", &heading.name.name)
                    .into()),
            },
        }
    }

    fn analyze_routine_contents(
        &mut self,
        decl: &RoutineDeclaration,
        symbol: SymbolId,
        completing: bool,
        return_type: Option<SymbolId>,
        scope: ScopeId,
    ) -> SemanticResult<()> {
        let previous = self
            .core
            .scopes
            .symbol(symbol)
            .routine()
            .map(|routine| routine.params.clone())
            .unwrap_or_default();

        let params = if completing && decl.heading.params.is_empty() {
            for &param in &previous {
                self.core.scopes.link_symbol(scope, param);
            }
            previous
        } else {
            self.declare_parameters(&decl.heading.params)?
        };

        self.core.scopes.symbol_mut(symbol).value = SymbolValue::Routine(Routine {
            params,
            return_type,
            builtin: None,
            variadic: false,
            forward: decl.is_forward(),
            scope: Some(scope),
        });

        if let RoutineBody::Block(block) = &decl.body {
            self.analyze_block(block);
        }
        Ok(())
    }

    /// Declare formal parameters in the current scope, in order
    fn declare_parameters(&mut self, params: &[FormalParameter]) -> SemanticResult<Vec<SymbolId>> {
        let mut ids = vec![];
        for param in params {
            match param {
                FormalParameter::Value(spec) => {
                    let ty = self.resolve_parameter_type(&spec.ty)?;
                    for name in &spec.names {
                        self.declare_unique(name)?;
                        ids.push(self.core.scopes.add_symbol(
                            SymbolKind::Parameter,
                            &name.name,
                            SymbolValue::Parameter {
                                ty: Some(ty),
                                by_ref: spec.by_ref,
                                signature: None,
                            },
                        ));
                    }
                }
                FormalParameter::Routine(heading) => {
                    let signature = self.routine_signature(heading)?;
                    self.declare_unique(&heading.name)?;
                    ids.push(self.core.scopes.add_symbol(
                        SymbolKind::Parameter,
                        &heading.name.name,
                        SymbolValue::Parameter {
                            ty: signature.return_type,
                            by_ref: false,
                            signature: Some(Box::new(signature)),
                        },
                    ));
                }
            }
        }
        Ok(ids)
    }

    /// Signature of a procedural or functional parameter
    fn routine_signature(&mut self, heading: &RoutineHeading) -> SemanticResult<Routine> {
        let return_type = self.resolve_return_type(heading, None)?;
        let scope = self.core.scopes.push_deferred_scope();
        let params = self.declare_parameters(&heading.params);
        let scope = self.core.scopes.pop_deferred_scope(scope);
        Ok(Routine {
            params: params?,
            return_type,
            builtin: None,
            variadic: false,
            forward: false,
            scope: Some(scope),
        })
    }

    // ===== Statements =====

    fn analyze_statement(&mut self, stmt: &Statement) {
        if let Some(label) = stmt.label {
            let declared = self.label_blocks.last().is_some_and(|labels| labels.contains(&label.value));
            if !declared {
                let diagnostic = self
                    .core
                    .error(DiagnosticKind::UndeclaredLabel, label.span)
                    .with_arg("value", label.value);
                self.core.report(diagnostic);
            }
        }
        let result = self.check_statement(stmt);
        self.core.recover(result);
    }

    fn check_statement(&mut self, stmt: &Statement) -> SemanticResult<()> {
        match &stmt.kind {
            StatementKind::Empty => Ok(()),
            StatementKind::Assignment { target, value } => self.analyze_assignment(target, value),
            StatementKind::ProcedureCall { name, args } => self.analyze_activation(stmt.id, name, args).map(|_| ()),
            StatementKind::Goto(label) => self.analyze_goto(stmt.id, label),
            StatementKind::Compound(stmts) => {
                for stmt in stmts {
                    self.analyze_statement(stmt);
                }
                Ok(())
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let result = self.analyze_condition(condition);
                self.core.recover(result);
                self.analyze_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.analyze_statement(else_branch);
                }
                Ok(())
            }
            StatementKind::Case { selector, arms } => self.analyze_case(stmt.id, selector, arms),
            StatementKind::While { condition, body } => {
                let result = self.analyze_condition(condition);
                self.core.recover(result);
                self.analyze_statement(body);
                Ok(())
            }
            StatementKind::Repeat { body, condition } => {
                for stmt in body {
                    self.analyze_statement(stmt);
                }
                self.analyze_condition(condition)
            }
            StatementKind::For {
                control,
                initial,
                limit,
                body,
                ..
            } => self.analyze_for(stmt.id, control, initial, limit, body),
            StatementKind::With { records, body } => {
                self.analyze_with(records, body);
                Ok(())
            }
        }
    }

    fn analyze_assignment(&mut self, target: &Variable, value: &Expression) -> SemanticResult<()> {
        let target_ty = self.analyze_variable(target)?;
        let value_ty = self.analyze_expression(value)?;
        self.check_assignable(target_ty, value_ty, value)?;
        self.check_range(target_ty, value)
    }

    fn analyze_condition(&mut self, condition: &Expression) -> SemanticResult<()> {
        let ty = self.analyze_expression(condition)?;
        if self.core.static_type(ty) != StaticType::Boolean {
            return Err(self.core.mismatch(self.core.builtin(BuiltinType::Boolean), ty, condition.span));
        }
        Ok(())
    }

    /// Goto targets must be declared in this or an enclosing block
    fn analyze_goto(&mut self, id: NodeId, label: &Label) -> SemanticResult<()> {
        let depth = self
            .label_blocks
            .iter()
            .rposition(|labels| labels.contains(&label.value))
            .ok_or_else(|| {
                self.core
                    .error(DiagnosticKind::UndeclaredLabel, label.span)
                    .with_arg("value", label.value)
            })?;
        if depth + 1 != self.label_blocks.len() {
            self.core.annotations.nonlocal_gotos.insert(id);
        }
        Ok(())
    }

    fn analyze_case(&mut self, id: NodeId, selector: &Expression, arms: &[CaseArm]) -> SemanticResult<()> {
        let selector_ty = self.analyze_expression(selector)?;
        if ordinal_bounds(&self.core.scopes, selector_ty).is_none() {
            return Err(self.core.mismatch_named("ordinal", selector_ty, selector.span));
        }

        let mut labels = Vec::with_capacity(arms.len());
        for arm in arms {
            let result = self.case_arm_labels(selector_ty, arm);
            labels.push(self.core.recover(result).unwrap_or_default());
            self.analyze_statement(&arm.body);
        }
        self.core.annotations.case_labels.insert(id, labels);
        Ok(())
    }

    fn case_arm_labels(&mut self, selector_ty: SymbolId, arm: &CaseArm) -> SemanticResult<Vec<i64>> {
        let mut values = Vec::with_capacity(arm.constants.len());
        for constant in &arm.constants {
            let (value, ty) = self.evaluate_constant(constant)?;
            if self.core.base_type(ty) != self.core.base_type(selector_ty) {
                return Err(self.core.mismatch(selector_ty, ty, constant.span()));
            }
            if let Some(ordinal) = value.ord() {
                values.push(ordinal);
            }
        }
        Ok(values)
    }

    fn analyze_for(
        &mut self,
        id: NodeId,
        control: &Identifier,
        initial: &Expression,
        limit: &Expression,
        body: &Statement,
    ) -> SemanticResult<()> {
        let symbol = self
            .core
            .scopes
            .resolve_reference(&control.name)
            .filter(|&symbol| {
                matches!(
                    self.core.scopes.symbol(symbol).value,
                    SymbolValue::Typed { .. }
                        | SymbolValue::Parameter {
                            ty: Some(_),
                            signature: None,
                            ..
                        }
                )
            })
            .ok_or_else(|| {
                self.core
                    .error(DiagnosticKind::UndeclaredVariable, control.span)
                    .with_arg("value", &control.name)
            })?;
        let ty = symbol_type(&self.core.scopes, symbol).unwrap_or(symbol);
        if ordinal_bounds(&self.core.scopes, ty).is_none() {
            return Err(self.core.mismatch_named("ordinal", ty, control.span));
        }

        for bound in [initial, limit] {
            let bound_ty = self.analyze_expression(bound)?;
            self.check_assignable(ty, bound_ty, bound)?;
        }
        self.core.annotations.for_controls.insert(id, symbol);

        self.analyze_statement(body);
        Ok(())
    }

    fn analyze_with(&mut self, records: &[Variable], body: &Statement) {
        let depth = self.with_frames.len();
        for record in records {
            let result = self.analyze_variable(record).and_then(|ty| {
                if self.core.static_type(ty) == StaticType::Record {
                    Ok(ty)
                } else {
                    Err(self.incompatible("record", ty, record.span))
                }
            });
            if let Some(ty) = self.core.recover(result) {
                self.with_frames.push(WithFrame {
                    variable: record.id,
                    record: ty,
                });
            }
        }
        self.analyze_statement(body);
        self.with_frames.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::Parser;

    fn analyze(source: &str) -> (SemanticAnalyzer, Program, Vec<Diagnostic>) {
        let mut parser = Parser::new(source);
        let program = parser.parse().expect("program should parse");
        assert!(parser.diagnostics().is_empty(), "syntax errors: {:?}", parser.diagnostics());
        let mut analyzer = SemanticAnalyzer::new(None);
        let diagnostics = analyzer.analyze(&program);
        (analyzer, program, diagnostics)
    }

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diagnostics.iter().map(|d| d.kind).collect()
    }

    fn body_statements(program: &Program) -> &[Statement] {
        match &program.block.body.kind {
            StatementKind::Compound(stmts) => stmts,
            _ => panic!("Expected compound statement"),
        }
    }

    #[test]
    fn test_simple_program_is_valid() {
        let (_, _, diagnostics) = analyze("program P; var x: Integer; begin x := 1; WriteLn(x) end.");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_integer_addition_is_integer() {
        let (analyzer, program, diagnostics) =
            analyze("program P; var a, b, c: Integer; begin a := b + c end.");
        assert!(diagnostics.is_empty());
        match &body_statements(&program)[0].kind {
            StatementKind::Assignment { value, .. } => {
                let ty = analyzer.annotations().expression_type(value.id).unwrap();
                assert_eq!(ty, analyzer.scopes().builtin_type(BuiltinType::Integer));
                assert!(analyzer.annotations().coercion(value.id).is_none());
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_duplicate_variable() {
        let (_, _, diagnostics) = analyze("program P; var x: Integer; var x: Integer; begin end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::DuplicateIdentifier]);
        assert_eq!(diagnostics[0].message(), "Identifier already declared: x.");
    }

    #[test]
    fn test_lookup_ignores_case() {
        let (_, _, diagnostics) = analyze("program P; var Count: integer; begin COUNT := 1; writeln(count) end.");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_labels() {
        let (_, _, diagnostics) = analyze("program P; label 1, 2; begin 1: goto 1 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnusedLabel]);
        assert!(!diagnostics[0].is_fatal());

        let (_, _, diagnostics) = analyze("program P; label 1; begin 1: goto 7 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndeclaredLabel]);
        assert_eq!(diagnostics[0].arg("value"), Some("7"));

        let (_, _, diagnostics) = analyze("program P; label 1; begin 1: ; 3: goto 1 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndeclaredLabel]);

        let (_, _, diagnostics) = analyze("program P; label 1, 1; begin 1: end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::DuplicateLabel]);
    }

    #[test]
    fn test_goto_to_enclosing_block_is_nonlocal() {
        let (analyzer, _, diagnostics) = analyze(
            "program P; label 9; procedure Q; begin goto 9 end; begin Q; 9: end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(analyzer.annotations().nonlocal_gotos.len(), 1);
    }

    #[test]
    fn test_constants_fold() {
        let (analyzer, program, diagnostics) =
            analyze("program P; const n = 10; m = -n; var x: Integer; begin x := n * 2 + m end.");
        assert!(diagnostics.is_empty());
        match &body_statements(&program)[0].kind {
            StatementKind::Assignment { value, .. } => {
                assert_eq!(
                    analyzer.annotations().constant(value.id),
                    Some(&::types::ConstValue::Integer(10))
                );
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_duplicate_constant_and_undeclared_constant() {
        let (_, _, diagnostics) = analyze("program P; const a = 1; a = 2; b = c; begin end.");
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::DuplicateConst, DiagnosticKind::UndeclaredConst]
        );
    }

    #[test]
    fn test_zero_division_in_constant_expression() {
        let (_, _, diagnostics) = analyze("program P; var x: Integer; begin x := 1 div 0 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::ZeroDiv]);
    }

    #[test]
    fn test_enumerated_and_subrange_types() {
        let (analyzer, _, diagnostics) = analyze(
            "program P; type Color = (red, green, blue); Small = 1..10; Warm = red..green; \
             var c: Color; s: Small; w: Warm; begin c := blue; s := 5; w := red end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let scopes = analyzer.scopes();
        let green = scopes
            .lookup_from(analyzer.annotations().program_scope.unwrap(), "green", None, true)
            .unwrap();
        match scopes.symbol(green).value {
            SymbolValue::TypeLiteral { ordinal, .. } => assert_eq!(ordinal, 1),
            _ => panic!("Expected type literal"),
        }
    }

    #[test]
    fn test_duplicate_enumeration_literal() {
        let (_, _, diagnostics) = analyze("program P; type A = (x, y); B = (y, z); begin end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::DuplicateType]);
        assert_eq!(diagnostics[0].arg("value"), Some("y"));
    }

    #[test]
    fn test_subrange_bounds_must_share_type() {
        let (_, _, diagnostics) = analyze("program P; type T = 1..'z'; begin end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::TypeMismatch]);
        assert_eq!(diagnostics[0].message(), "Type Mismatch. Expected Integer, got Char.");
    }

    #[test]
    fn test_subrange_constant_out_of_range() {
        let (_, _, diagnostics) = analyze("program P; type T = 1..10; var x: T; begin x := 11 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::RangeViolation]);
        assert_eq!(diagnostics[0].message(), "Value 11 out of range 1..10.");
    }

    #[test]
    fn test_integer_to_real_coercion() {
        let (analyzer, program, diagnostics) = analyze("program P; var r: Real; i: Integer; begin r := i end.");
        assert!(diagnostics.is_empty());
        match &body_statements(&program)[0].kind {
            StatementKind::Assignment { value, .. } => {
                assert_eq!(analyzer.annotations().coercion(value.id), Some(Coercion::IntToReal));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let (_, _, diagnostics) = analyze("program P; var i: Integer; r: Real; begin i := r end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::TypeMismatch]);
        assert_eq!(diagnostics[0].message(), "Type Mismatch. Expected Integer, got Real.");
    }

    #[test]
    fn test_char_literal_coercion() {
        let (analyzer, program, diagnostics) = analyze("program P; var c: Char; begin c := 'a' end.");
        assert!(diagnostics.is_empty());
        match &body_statements(&program)[0].kind {
            StatementKind::Assignment { value, .. } => {
                assert_eq!(analyzer.annotations().coercion(value.id), Some(Coercion::CharCode));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_undeclared_variable_continues_with_siblings() {
        let (_, _, diagnostics) = analyze("program P; var x: Integer; begin y := 1; x := z; x := 2 end.");
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::UndeclaredVariable, DiagnosticKind::UndeclaredVariable]
        );
        assert_eq!(diagnostics[0].message(), "Variable not declared: y.");
    }

    #[test]
    fn test_condition_must_be_boolean() {
        let (_, _, diagnostics) = analyze("program P; var x: Integer; begin if x then x := 1; while x > 0 do x := x - 1 end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::TypeMismatch]);
        assert_eq!(diagnostics[0].arg("aType"), Some("Boolean"));
    }

    #[test]
    fn test_routines_and_calls() {
        let (analyzer, _, diagnostics) = analyze(
            "program P; var r: Integer; \
             function Sq(n: Integer): Integer; begin Sq := n * n end; \
             procedure Show(v: Integer); begin WriteLn(v) end; \
             begin r := Sq(3); Show(r) end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(analyzer.annotations().routine_symbols.len(), 2);
    }

    #[test]
    fn test_argument_count_and_type() {
        let (_, _, diagnostics) = analyze(
            "program P; procedure Q(a: Integer); begin end; begin Q(1, 2); Q('x'); Q(2) end.",
        );
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::ArgumentCountMismatch, DiagnosticKind::TypeMismatch]
        );
        assert_eq!(
            diagnostics[0].message(),
            "Wrong number of arguments for Q. Expected 1, got 2."
        );
    }

    #[test]
    fn test_undeclared_activatable() {
        let (_, _, diagnostics) = analyze("program P; begin Missing(1) end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndeclaredActivatable]);
        assert_eq!(diagnostics[0].message(), "Procedure / Function not declared: Missing.");
    }

    #[test]
    fn test_routine_scope_does_not_see_globals() {
        let (_, _, diagnostics) = analyze(
            "program P; var g: Integer; procedure Q; begin g := 1 end; begin g := 2 end.",
        );
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndeclaredVariable]);
    }

    #[test]
    fn test_routine_scope_is_linked_after_analysis() {
        let (analyzer, program, _) = analyze("program P; procedure Q; var l: Integer; begin l := 1 end; begin Q end.");
        let routine = analyzer
            .annotations()
            .routine_symbol(program.block.routines[0].id)
            .unwrap();
        let scopes = analyzer.scopes();
        let scope = scopes.symbol(routine).routine().unwrap().scope.unwrap();
        assert_eq!(scopes.scope(scope).parent, analyzer.annotations().program_scope);
    }

    #[test]
    fn test_forward_declaration_completed() {
        let (_, _, diagnostics) = analyze(
            "program P; function F(n: Integer): Integer; forward; \
             procedure Q; begin end; \
             function F; begin F := n end; \
             begin WriteLn(F(2)) end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_forward_declaration_never_completed() {
        let (_, _, diagnostics) = analyze("program P; procedure Q; forward; begin Q end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndefinedReference]);
        assert_eq!(diagnostics[0].message(), "Undefined reference: Q.");
    }

    #[test]
    fn test_duplicate_routine() {
        let (_, _, diagnostics) = analyze("program P; procedure Q; begin end; procedure Q; begin end; begin end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::DuplicateIdentifier]);
    }

    #[test]
    fn test_var_parameter_requires_variable() {
        let (_, _, diagnostics) = analyze(
            "program P; var x: Integer; procedure Inc(var v: Integer); begin v := v + 1 end; begin Inc(x); Inc(3) end.",
        );
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::IncompatibleVariable]);
    }

    #[test]
    fn test_records_and_with() {
        let (analyzer, _, diagnostics) = analyze(
            "program P; type R = record a: Integer; case tag: Boolean of true: (b: Real); false: (c: Char) end; \
             var r: R; begin r.a := 1; with r do begin b := 2.0; c := 'x' end end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(analyzer.annotations().with_fields.len(), 2);
    }

    #[test]
    fn test_unknown_field_and_non_record_access() {
        let (_, _, diagnostics) = analyze(
            "program P; type R = record a: Integer end; var r: R; i: Integer; begin r.z := 1; i.a := 2 end.",
        );
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::UndefinedReference, DiagnosticKind::IncompatibleVariable]
        );
    }

    #[test]
    fn test_arrays_and_strings() {
        let (_, _, diagnostics) = analyze(
            "program P; var a: array[1..3, 'a'..'c'] of Integer; s: String; ch: Char; \
             begin a[1, 'b'] := 2; ch := s[1]; a[4, 'a'] := 0 end.",
        );
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::RangeViolation]);
    }

    #[test]
    fn test_case_statement_labels() {
        let (analyzer, program, diagnostics) = analyze(
            "program P; var x: Integer; begin case x of 1, 2: x := 0; 3: x := 1 end end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let labels = analyzer.annotations().case_labels(body_statements(&program)[0].id).unwrap();
        assert_eq!(labels, &[vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_for_loop_control() {
        let (analyzer, _, diagnostics) =
            analyze("program P; var i: Integer; begin for i := 1 to 10 do WriteLn(i) end.");
        assert!(diagnostics.is_empty());
        assert_eq!(analyzer.annotations().for_controls.len(), 1);

        let (_, _, diagnostics) = analyze("program P; begin for k := 1 to 2 do end.");
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UndeclaredVariable]);
    }

    #[test]
    fn test_undeclared_type() {
        let (_, _, diagnostics) = analyze("program P; type A = B; var x: Missing; y: A; begin end.");
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::UndeclaredType, DiagnosticKind::UndeclaredType]
        );
        assert_eq!(diagnostics[1].arg("value"), Some("B"));
    }

    #[test]
    fn test_pointer_types_resolve_lazily() {
        let (_, _, diagnostics) = analyze(
            "program P; type Link = ^Node; Node = record value: Integer; next: Link end; \
             var p: Link; begin p := nil; p^.value := 1 end.",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_semantic_error_wraps_diagnostic() {
        let span = tokens::Span::default();
        let err: SemanticError = Diagnostic::new(DiagnosticKind::ZeroDiv, span).into();
        assert_eq!(err.to_string(), "Division by zero.");
        assert_eq!(err.into_diagnostic().kind, DiagnosticKind::ZeroDiv);
    }
}
