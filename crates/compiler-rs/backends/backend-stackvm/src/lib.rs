//! Stack machine backend
//!
//! This crate generates the instruction listing of the target stack machine
//! from an analyzed program.
//!
//! # Machine model
//!
//! - **Globals**: one slot run per variable, addressed from the global pointer
//!   (`PUSHG`/`STOREG`), allocated with `PUSHN` before `START`
//! - **Frames**: slot 0 of a routine frame holds the function result, locals
//!   follow it; parameters sit below the frame pointer, the last one at `-1`
//! - **Calls**: the caller pushes a result placeholder for functions, then the
//!   arguments left to right, `PUSHA`/`CALL`, and pops the arguments
//! - **Structured variables**: components are reached with `PUSHGP`/`PUSHFP`,
//!   a computed slot offset and `LOADN`/`STOREN`
//!
//! Constructs the machine cannot express are rejected with
//! [`CodegenError::Unsupported`] rather than miscompiled.

use std::collections::HashMap;

use ast::{Block, Identifier, Program, RoutineBody, RoutineDeclaration, Variable};
use errors::{Diagnostic, DiagnosticKind};
use ir::{CodeTree, LabelAllocator, Opcode, Operand};
use semantics::{static_type, symbol_type, Annotations, StaticType};
use symbols::{Routine, ScopeId, ScopeManager, SymbolId, SymbolKind, SymbolValue};
use thiserror::Error;
use tokens::Span;

mod expressions;
mod layout;
mod registry;
mod statements;

pub use layout::{field_offset, size_of, Frame, Location};
pub use registry::{Activatable, ActivatableRegistry};

/// Errors raised by the code generator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A construct the stack machine backend does not implement
    #[error("Unsupported construct: {construct}")]
    Unsupported { construct: String, span: Span },
    #[error("Unresolved variable: {name}")]
    UnresolvedVariable { name: String, span: Span },
    #[error("Unresolved procedure / function: {name}")]
    UnresolvedActivatable { name: String, span: Span },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        CodegenError::Unsupported {
            construct: construct.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            CodegenError::Unsupported { span, .. }
            | CodegenError::UnresolvedVariable { span, .. }
            | CodegenError::UnresolvedActivatable { span, .. } => *span,
        }
    }

    /// Convert to a code generation diagnostic
    pub fn to_diagnostic(&self, filename: Option<String>) -> Diagnostic {
        let value = match self {
            CodegenError::Unsupported { construct, .. } => construct.clone(),
            CodegenError::UnresolvedVariable { name, .. } => format!("unresolved variable {}", name),
            CodegenError::UnresolvedActivatable { name, .. } => format!("unresolved call to {}", name),
        };
        Diagnostic::new(DiagnosticKind::UnsupportedConstruct, self.span())
            .with_arg("value", value)
            .with_file(filename)
    }
}

pub(crate) fn load_slot(code: &mut CodeTree, location: Location) {
    match location {
        Location::Global(offset) => code.emit_with(Opcode::PushG, Operand::Int(offset)),
        Location::Local(offset) => code.emit_with(Opcode::PushL, Operand::Int(offset)),
    }
}

pub(crate) fn store_slot(code: &mut CodeTree, location: Location) {
    match location {
        Location::Global(offset) => code.emit_with(Opcode::StoreG, Operand::Int(offset)),
        Location::Local(offset) => code.emit_with(Opcode::StoreL, Operand::Int(offset)),
    }
}

/// Stack machine code generator for one compilation
pub struct CodeGenerator<'a> {
    scopes: &'a ScopeManager,
    annotations: &'a Annotations,
    labels: LabelAllocator,
    registry: ActivatableRegistry,
    globals: Frame,
    /// Frame of the routine being emitted; `None` in the main program
    frame: Option<Frame>,
    /// Record variables opened by enclosing `with` statements
    with_records: Vec<Variable>,
    /// Generated labels standing in for the user labels of the routine being emitted
    user_labels: HashMap<u32, ir::Label>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(scopes: &'a ScopeManager, annotations: &'a Annotations) -> Self {
        Self {
            scopes,
            annotations,
            labels: LabelAllocator::default(),
            registry: ActivatableRegistry::with_builtins(scopes),
            globals: Frame::global(),
            frame: None,
            with_records: vec![],
            user_labels: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ActivatableRegistry {
        &self.registry
    }

    pub fn labels(&self) -> &LabelAllocator {
        &self.labels
    }

    /// Hand the label allocator and registry back to the compilation
    pub fn into_state(self) -> (LabelAllocator, ActivatableRegistry) {
        (self.labels, self.registry)
    }

    /// Generate the listing of a whole program
    ///
    /// Layout: global allocations, `START`, main body, `STOP`, then every
    /// routine, nested routines before the routine containing them.
    pub fn generate(&mut self, program: &Program) -> CodegenResult<CodeTree> {
        self.labels = LabelAllocator::above(program.block.max_label());
        self.globals = Frame::global();
        self.frame = None;
        self.user_labels.clear();
        self.register_routines(&program.block.routines)?;

        let scope = self
            .annotations
            .program_scope
            .ok_or_else(|| CodegenError::unsupported("program without analysis", program.span))?;
        self.allocate_variables(scope, &program.block)?;

        let mut body = CodeTree::new();
        self.emit_statement(&program.block.body, &mut body)?;

        let mut code = CodeTree::new();
        emit_allocations(&self.globals, &mut code);
        code.emit(Opcode::Start);
        code.append(body);
        code.emit(Opcode::Stop);

        for routine in &program.block.routines {
            self.emit_routine(routine, &mut code)?;
        }
        Ok(code)
    }

    /// Give every user routine a label up front so calls may precede definitions
    fn register_routines(&mut self, routines: &[RoutineDeclaration]) -> CodegenResult<()> {
        for decl in routines {
            let symbol = self.routine_symbol(decl)?;
            if !self.registry.contains(symbol) {
                let routine = self.routine(symbol, &decl.heading.name)?;
                let activatable = Activatable::Routine {
                    label: self.labels.next_label(),
                    argc: routine.params.len(),
                    function: routine.is_function(),
                };
                self.registry.register(symbol, activatable);
            }
            if let RoutineBody::Block(block) = &decl.body {
                self.register_routines(&block.routines)?;
            }
        }
        Ok(())
    }

    fn routine_symbol(&self, decl: &RoutineDeclaration) -> CodegenResult<SymbolId> {
        self.annotations
            .routine_symbol(decl.id)
            .ok_or_else(|| CodegenError::UnresolvedActivatable {
                name: decl.heading.name.name.clone(),
                span: decl.heading.name.span,
            })
    }

    fn routine(&self, symbol: SymbolId, name: &Identifier) -> CodegenResult<Routine> {
        self.scopes
            .symbol(symbol)
            .routine()
            .cloned()
            .ok_or_else(|| CodegenError::UnresolvedActivatable {
                name: name.name.clone(),
                span: name.span,
            })
    }

    fn emit_routine(&mut self, decl: &RoutineDeclaration, out: &mut CodeTree) -> CodegenResult<()> {
        // Forward declarations are emitted with their full declaration
        let RoutineBody::Block(block) = &decl.body else {
            return Ok(());
        };
        for nested in &block.routines {
            self.emit_routine(nested, out)?;
        }

        let name = &decl.heading.name;
        let symbol = self.routine_symbol(decl)?;
        let routine = self.routine(symbol, name)?;
        let Some(Activatable::Routine { label, .. }) = self.registry.get(symbol) else {
            return Err(CodegenError::UnresolvedActivatable {
                name: name.name.clone(),
                span: name.span,
            });
        };
        self.check_parameters(&routine, decl.heading.span)?;
        let scope = routine
            .scope
            .ok_or_else(|| CodegenError::unsupported("routine without analysis", decl.span))?;

        // Label numbers are per block, so a routine may reuse one of the main program
        let mut values = block.body.labels();
        values.extend(block.labels.iter().map(|l| l.value));
        let renamed = values.into_iter().map(|value| (value, self.labels.next_label())).collect();
        let outer_labels = std::mem::replace(&mut self.user_labels, renamed);
        let outer = self.frame.replace(Frame::routine(symbol, &routine.params));
        let result = self.emit_frame(label, &routine, scope, block);
        self.frame = outer;
        self.user_labels = outer_labels;
        out.append(result?);
        Ok(())
    }

    fn emit_frame(&mut self, label: ir::Label, routine: &Routine, scope: ScopeId, block: &Block) -> CodegenResult<CodeTree> {
        self.allocate_variables(scope, block)?;
        let mut body = CodeTree::new();
        self.emit_statement(&block.body, &mut body)?;

        let frame = self.frame_mut().clone();
        let mut code = CodeTree::new();
        code.mark(label);
        code.emit_with(Opcode::PushN, Operand::Int(1));
        emit_allocations(&frame, &mut code);
        code.append(body);
        if routine.is_function() {
            code.emit_with(Opcode::PushL, Operand::Int(0));
            code.emit_with(Opcode::StoreL, Operand::Int(-(frame.argc() as i64 + 1)));
        }
        code.emit_with(Opcode::Pop, Operand::Int(frame.size()));
        code.emit(Opcode::Return);
        Ok(code)
    }

    /// Only one-slot value parameters can be passed on the stack
    fn check_parameters(&self, routine: &Routine, span: Span) -> CodegenResult<()> {
        for &param in &routine.params {
            let SymbolValue::Parameter { ty, by_ref, signature } = &self.scopes.symbol(param).value else {
                continue;
            };
            if signature.is_some() {
                return Err(CodegenError::unsupported("procedural parameter", span));
            }
            if *by_ref {
                return Err(CodegenError::unsupported("var parameter", span));
            }
            if let Some(ty) = ty {
                if self.annotations.conformant_arrays.contains(ty) {
                    return Err(CodegenError::unsupported("conformant array parameter", span));
                }
                if !self.static_type(*ty).is_scalar() {
                    return Err(CodegenError::unsupported("structured value parameter", span));
                }
            }
        }
        Ok(())
    }

    /// Reserve slots for the variables of `block`, in declaration order
    fn allocate_variables(&mut self, scope: ScopeId, block: &Block) -> CodegenResult<()> {
        for declaration in &block.variables {
            for name in &declaration.names {
                let symbol = self
                    .scopes
                    .lookup_from(scope, &name.name, Some(SymbolKind::Variable), true)
                    .ok_or_else(|| CodegenError::UnresolvedVariable {
                        name: name.name.clone(),
                        span: name.span,
                    })?;
                let ty = symbol_type(self.scopes, symbol).ok_or_else(|| CodegenError::UnresolvedVariable {
                    name: name.name.clone(),
                    span: name.span,
                })?;
                let size = size_of(self.scopes, ty, declaration.span)?;
                self.frame_mut().allocate(symbol, size);
            }
        }
        Ok(())
    }

    /// Jump target of a user label in the block being emitted
    pub(crate) fn user_label(&self, value: u32) -> ir::Label {
        self.user_labels.get(&value).copied().unwrap_or(ir::Label(value))
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        match &mut self.frame {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    pub(crate) fn with_record(&self, id: ast::NodeId) -> Option<Variable> {
        self.with_records.iter().rev().find(|record| record.id == id).cloned()
    }

    pub(crate) fn static_type(&self, ty: SymbolId) -> StaticType {
        static_type(self.scopes, ty)
    }
}

/// `PUSHN` per declared variable, then one per hidden temporary
fn emit_allocations(frame: &Frame, code: &mut CodeTree) {
    for &size in frame.allocations() {
        code.emit_with(Opcode::PushN, Operand::Int(size));
    }
    for _ in 0..frame.temps() {
        code.emit_with(Opcode::PushN, Operand::Int(1));
    }
}

/// Generate the listing of an analyzed program
pub fn generate(program: &Program, scopes: &ScopeManager, annotations: &Annotations) -> CodegenResult<CodeTree> {
    CodeGenerator::new(scopes, annotations).generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::Parser;
    use semantics::SemanticAnalyzer;

    fn analyze(source: &str) -> (Program, SemanticAnalyzer) {
        let mut parser = Parser::new(source);
        let program = parser.parse().expect("program should parse");
        let mut analyzer = SemanticAnalyzer::new(None);
        let diagnostics = analyzer.analyze(&program);
        assert!(
            diagnostics.iter().all(|d| !d.is_fatal()),
            "semantic errors: {:?}",
            diagnostics
        );
        (program, analyzer)
    }

    fn compile(source: &str) -> String {
        let (program, analyzer) = analyze(source);
        generate(&program, analyzer.scopes(), analyzer.annotations())
            .expect("program should generate")
            .render()
    }

    fn compile_err(source: &str) -> CodegenError {
        let (program, analyzer) = analyze(source);
        generate(&program, analyzer.scopes(), analyzer.annotations()).expect_err("generation should fail")
    }

    fn lines(listing: &str) -> Vec<&str> {
        listing.lines().collect()
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(compile("program P; begin end."), "START\nSTOP\n");
    }

    #[test]
    fn test_assignment_and_writeln() {
        let listing = compile("program P; var x: Integer; begin x := 1; WriteLn(x) end.");
        assert_eq!(
            lines(&listing),
            vec!["PUSHN 1", "START", "PUSHI 1", "STOREG 0", "PUSHG 0", "WRITEI", "WRITELN", "STOP"]
        );
    }

    #[test]
    fn test_integer_addition() {
        let listing = compile("program P; var a, b, c: Integer; begin a := b + c end.");
        let body = lines(&listing);
        assert_eq!(body.iter().filter(|l| **l == "ADD").count(), 1);
        assert_eq!(body.iter().filter(|l| l.starts_with("STOREG")).count(), 1);
        assert!(!listing.contains("FADD"));
        assert!(listing.contains("PUSHG 1\nPUSHG 2\nADD\nSTOREG 0\n"));
    }

    #[test]
    fn test_real_arithmetic_converts_integers() {
        let listing = compile("program P; var r: Real; i: Integer; begin r := i + 1.5; r := i end.");
        assert!(listing.contains("PUSHG 1\nITOF\nPUSHF 1.5\nFADD\nSTOREG 0\n"));
        assert!(listing.contains("PUSHG 1\nITOF\nSTOREG 0\n"));
    }

    #[test]
    fn test_relational_and_not_equal() {
        let listing = compile("program P; var a: Integer; b: Boolean; begin b := a < 3; b := a <> 3 end.");
        assert!(listing.contains("PUSHG 0\nPUSHI 3\nINF\nSTOREG 1\n"));
        assert!(listing.contains("PUSHG 0\nPUSHI 3\nEQUAL\nNOT\nSTOREG 1\n"));
    }

    #[test]
    fn test_unary_minus() {
        let listing = compile("program P; var a: Integer; r: Real; begin a := -a; r := -r end.");
        assert!(listing.contains("PUSHI 0\nPUSHG 0\nSUB\nSTOREG 0\n"));
        assert!(listing.contains("PUSHF 0.0\nPUSHG 1\nFSUB\nSTOREG 1\n"));
    }

    #[test]
    fn test_constants_are_folded() {
        let listing = compile("program P; const n = 2; var a: Integer; begin a := n * 3 + 1 end.");
        assert!(listing.contains("PUSHI 7\nSTOREG 0\n"));
    }

    #[test]
    fn test_if_statement() {
        let listing = compile("program P; var a: Integer; begin if a = 0 then a := 1 else a := 2 end.");
        assert_eq!(
            lines(&listing),
            vec![
                "PUSHN 1", "START", "PUSHG 0", "PUSHI 0", "EQUAL", "JZ L0", "PUSHI 1", "STOREG 0", "JUMP L1",
                "L0: PUSHI 2", "STOREG 0", "L1: STOP",
            ]
        );
    }

    #[test]
    fn test_while_statement() {
        let listing = compile("program P; var a: Integer; begin while a < 10 do a := a + 1 end.");
        assert!(listing.contains("L0: PUSHG 0\nPUSHI 10\nINF\nJZ L1\n"));
        assert!(listing.contains("JUMP L0\nL1: NOP\n"));
    }

    #[test]
    fn test_labelled_while_reuses_user_label() {
        let listing = compile("program P; label 5; var a: Integer; begin 5: while a < 1 do a := 1 end.");
        // Generated labels start above the user's
        assert!(listing.contains("L5: PUSHG 0\n"));
        assert!(listing.contains("JZ L6\n"));
        assert!(listing.contains("JUMP L5\nL6: NOP\n"));
    }

    #[test]
    fn test_goto() {
        let listing = compile("program P; label 1; begin 1: goto 1 end.");
        assert_eq!(listing, "START\nL1: JUMP L1\nSTOP\n");
    }

    #[test]
    fn test_routine_label_renamed_apart_from_main() {
        let listing = compile(
            "program P; label 1; procedure Q; label 1; begin 1: goto 1 end; begin Q; 1: goto 1 end.",
        );
        assert_eq!(listing.matches("L1: ").count(), 1);
        assert!(listing.contains("L1: JUMP L1\n"));
        // Q is L2, its label 1 becomes the next generated label
        assert!(listing.contains("L2: PUSHN 1\nL3: JUMP L3\n"));
    }

    #[test]
    fn test_repeat_statement() {
        let listing = compile("program P; var a: Integer; begin repeat a := a + 1 until a = 3 end.");
        assert!(listing.contains("L0: PUSHG 0\nPUSHI 1\nADD\nSTOREG 0\nPUSHG 0\nPUSHI 3\nEQUAL\nJZ L0\n"));
    }

    #[test]
    fn test_for_statement() {
        let listing = compile("program P; var i: Integer; begin for i := 1 to 3 do WriteLn(i) end.");
        assert_eq!(
            lines(&listing),
            vec![
                "PUSHN 1", "PUSHN 1", "START", "PUSHI 1", "STOREG 0", "PUSHI 3", "PUSHI 1", "ADD", "STOREG 1",
                "L0: PUSHG 0", "WRITEI", "WRITELN", "PUSHG 0", "PUSHI 1", "ADD", "DUP 1", "STOREG 0", "PUSHG 1",
                "EQUAL", "JZ L0", "STOP",
            ]
        );
    }

    #[test]
    fn test_for_downto() {
        let listing = compile("program P; var i: Integer; begin for i := 3 downto 1 do end.");
        assert!(listing.contains("PUSHI 1\nPUSHI 1\nSUB\nSTOREG 1\n"));
        assert!(listing.contains("PUSHG 0\nPUSHI 1\nSUB\nDUP 1\nSTOREG 0\n"));
    }

    #[test]
    fn test_case_statement() {
        let listing = compile(
            "program P; var a: Integer; begin case a of 1, 2: a := 0; 3: a := 1 end end.",
        );
        assert!(listing.starts_with("PUSHN 1\nPUSHN 1\nSTART\nPUSHG 0\nSTOREG 1\n"));
        assert!(listing.contains("PUSHG 1\nPUSHI 1\nEQUAL\nPUSHG 1\nPUSHI 2\nEQUAL\nOR\nJZ L1\n"));
        assert!(listing.contains("JUMP L0\nL1: PUSHG 1\nPUSHI 3\nEQUAL\nJZ L2\n"));
        assert!(listing.contains("L2: L0: NOP\n"));
    }

    #[test]
    fn test_strings_and_chars() {
        let listing = compile(
            "program P; var s: String; c: Char; n: Integer; \
             begin s := s + 'c'; c := 'x'; n := Length(s); c := s[1]; WriteLn(s, c) end.",
        );
        assert!(listing.contains("PUSHG 0\nPUSHS \"c\"\nCONCAT\nSTOREG 0\n"));
        assert!(listing.contains("PUSHS \"x\"\nCHRCODE\nSTOREG 1\n"));
        assert!(listing.contains("PUSHG 0\nSTRLEN\nSTOREG 2\n"));
        assert!(listing.contains("PUSHG 0\nPUSHI 1\nPUSHI 1\nSUB\nCHARAT\nSTOREG 1\n"));
        assert!(listing.contains("PUSHG 0\nWRITES\nPUSHG 1\nWRITECHR\nWRITELN\n"));
    }

    #[test]
    fn test_readln_converts_by_type() {
        let listing = compile("program P; var i: Integer; r: Real; s: String; begin ReadLn(i); ReadLn(r); ReadLn(s) end.");
        assert!(listing.contains("READ\nATOI\nSTOREG 0\n"));
        assert!(listing.contains("READ\nATOF\nSTOREG 1\n"));
        assert!(listing.contains("READ\nSTOREG 2\n"));
    }

    #[test]
    fn test_array_access() {
        let listing = compile(
            "program P; var a: array [1..5] of Integer; i: Integer; begin a[2] := 7; i := a[i] end.",
        );
        assert!(listing.starts_with("PUSHN 5\nPUSHN 1\nSTART\n"));
        assert!(listing.contains("PUSHGP\nPUSHI 0\nPUSHI 2\nPUSHI 1\nSUB\nADD\nPUSHI 7\nSTOREN\n"));
        assert!(listing.contains("PUSHGP\nPUSHI 0\nPUSHG 5\nPUSHI 1\nSUB\nADD\nLOADN\nSTOREG 5\n"));
    }

    #[test]
    fn test_two_dimensional_array_stride() {
        let listing = compile("program P; var m: array [0..2, 1..4] of Integer; begin m[1, 2] := 0 end.");
        assert!(listing.starts_with("PUSHN 12\nSTART\n"));
        assert!(listing.contains("PUSHGP\nPUSHI 0\nPUSHI 1\nPUSHI 0\nSUB\nPUSHI 4\nMUL\nADD\nPUSHI 2\nPUSHI 1\nSUB\nADD\nPUSHI 0\nSTOREN\n"));
    }

    #[test]
    fn test_record_fields_and_with() {
        let listing = compile(
            "program P; type R = record a: Integer; b: Real end; var x: Integer; r: R; \
             begin r.b := 1.0; with r do a := 2 end.",
        );
        assert!(listing.starts_with("PUSHN 1\nPUSHN 2\nSTART\n"));
        assert!(listing.contains("PUSHGP\nPUSHI 1\nPUSHI 1\nADD\nPUSHF 1.0\nSTOREN\n"));
        assert!(listing.contains("PUSHGP\nPUSHI 1\nPUSHI 0\nADD\nPUSHI 2\nSTOREN\n"));
    }

    #[test]
    fn test_enumeration_values() {
        let listing = compile("program P; type Color = (red, green, blue); var c: Color; begin c := blue; WriteLn(c) end.");
        assert!(listing.contains("PUSHI 2\nSTOREG 0\nPUSHG 0\nWRITEI\nWRITELN\n"));
    }

    #[test]
    fn test_function_frame_and_call() {
        let listing = compile(
            "program P; var r: Integer; \
             function Add(a, b: Integer): Integer; var t: Integer; begin t := a + b; Add := t end; \
             begin r := Add(1, 2) end.",
        );
        assert_eq!(
            lines(&listing),
            vec![
                "PUSHN 1", "START", "PUSHI 0", "PUSHI 1", "PUSHI 2", "PUSHA L0", "CALL", "POP 2", "STOREG 0", "STOP",
                "L0: PUSHN 1", "PUSHN 1", "PUSHL -2", "PUSHL -1", "ADD", "STOREL 1", "PUSHL 1", "STOREL 0", "PUSHL 0",
                "STOREL -3", "POP 2", "RETURN",
            ]
        );
    }

    #[test]
    fn test_procedure_call_statement() {
        let listing = compile("program P; procedure Hello; begin WriteLn('hi') end; begin Hello; Hello end.");
        assert_eq!(
            lines(&listing),
            vec![
                "START", "PUSHA L0", "CALL", "PUSHA L0", "CALL", "STOP", "L0: PUSHN 1", "PUSHS \"hi\"", "WRITES",
                "WRITELN", "POP 1", "RETURN",
            ]
        );
    }

    #[test]
    fn test_unused_function_result_is_dropped() {
        let listing = compile("program P; function F: Integer; begin F := 1 end; begin F end.");
        assert!(listing.contains("START\nPUSHI 0\nPUSHA L0\nCALL\nPOP 1\nSTOP\n"));
    }

    #[test]
    fn test_nested_routines_post_order() {
        let listing = compile(
            "program P; procedure Outer; procedure Inner; begin end; begin Inner end; begin Outer end.",
        );
        let outer = listing.find("L0: ").unwrap();
        let inner = listing.find("L1: ").unwrap();
        assert!(inner < outer);
        assert!(listing.contains("L0: PUSHN 1\nPUSHA L1\nCALL\nPOP 1\nRETURN\n"));
    }

    #[test]
    fn test_forward_declaration_shares_label() {
        let listing = compile(
            "program P; procedure Q; forward; procedure Q; begin WriteLn(1) end; begin Q end.",
        );
        assert_eq!(listing.matches("L0: ").count(), 1);
        assert!(listing.contains("PUSHA L0\nCALL\n"));
    }

    #[test]
    fn test_set_constructor_rejected() {
        let err = compile_err("program P; var b: Boolean; begin b := 1 in [1, 2] end.");
        assert!(matches!(err, CodegenError::Unsupported { .. }));
        let diagnostic = err.to_diagnostic(None);
        assert_eq!(diagnostic.kind, DiagnosticKind::UnsupportedConstruct);
        assert_eq!(diagnostic.message(), "Unsupported construct: set membership.");
    }

    #[test]
    fn test_var_parameter_rejected() {
        let err = compile_err("program P; procedure Q(var a: Integer); begin a := 1 end; begin end.");
        assert_eq!(
            err,
            CodegenError::Unsupported {
                construct: "var parameter".to_string(),
                span: err.span(),
            }
        );
    }

    #[test]
    fn test_whole_array_copy_rejected() {
        let err = compile_err(
            "program P; type A = array [1..2] of Integer; var a, b: A; begin a := b end.",
        );
        assert!(matches!(err, CodegenError::Unsupported { construct, .. } if construct == "structured value copy"));
    }

    #[test]
    fn test_generator_state() {
        let (program, analyzer) = analyze("program P; label 9; begin 9: end.");
        let mut generator = CodeGenerator::new(analyzer.scopes(), analyzer.annotations());
        generator.generate(&program).unwrap();
        assert_eq!(generator.labels().peek(), ir::Label(10));
        let (_, registry) = generator.into_state();
        assert_eq!(registry.len(), 5);
    }
}
