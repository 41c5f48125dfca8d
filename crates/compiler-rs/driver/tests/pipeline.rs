//! End-to-end runs of the whole pipeline

use ast::Dump;
use driver::{CompilationContext, Compiler, CompilerOptions, Phase};
use errors::DiagnosticKind;
use lexer::Lexer;
use serde_json::Value;

fn compile(source: &str) -> CompilationContext {
    Compiler::default().compile_source(source, Some("test.pas".to_string()))
}

fn kinds(context: &CompilationContext) -> Vec<DiagnosticKind> {
    context.diagnostics().map(|d| d.kind).collect()
}

/// Drop every `pos` entry so trees from differently laid out sources compare equal
fn strip_positions(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("pos");
            for child in map.values_mut() {
                strip_positions(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_positions),
        _ => {}
    }
}

fn dump(source: &str) -> Value {
    let context = Compiler::default().parse_source(source, None);
    assert!(context.is_valid(false), "{:?}", kinds(&context));
    match context.program() {
        Some(program) => program.dump(),
        None => panic!("Expected a program"),
    }
}

#[test]
fn test_empty_program_references_no_slot() {
    let context = compile("program P; begin end.");
    assert!(kinds(&context).is_empty());
    let listing = context.listing().unwrap();
    assert_eq!(listing, "START\nSTOP\n");
    for mnemonic in ["PUSHG", "STOREG", "PUSHL", "STOREL", "PUSHN"] {
        assert!(!listing.contains(mnemonic), "{} in {:?}", mnemonic, listing);
    }
}

#[test]
fn test_assign_and_print() {
    let context = compile("program P; var x: Integer; begin x := 1; WriteLn(x) end.");
    assert!(kinds(&context).is_empty());
    assert_eq!(
        context.listing(),
        Some("PUSHN 1\nSTART\nPUSHI 1\nSTOREG 0\nPUSHG 0\nWRITEI\nWRITELN\nSTOP\n")
    );
}

#[test]
fn test_integer_sum_emits_one_add() {
    let context = compile("program P; var a, b, c: Integer; begin a := b + c end.");
    assert!(kinds(&context).is_empty());

    let listing = context.listing().unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.iter().filter(|line| **line == "ADD").count(), 1);
    assert_eq!(lines.iter().filter(|line| line.starts_with("STOREG")).count(), 1);
    assert!(!listing.contains("FADD"));
    assert!(!listing.contains("ITOF"));
}

#[test]
fn test_goto_declared_label() {
    let context = compile("program P; label 1; var i: Integer; begin 1: i := i + 1; if i < 3 then goto 1 end.");
    assert!(kinds(&context).is_empty());
    let listing = context.listing().unwrap();
    assert!(listing.contains("L1: PUSHG 0\n"));
    assert!(listing.contains("JUMP L1\n"));
}

#[test]
fn test_goto_undeclared_label() {
    let context = compile("program P; label 1; begin 1: goto 5 end.");
    assert_eq!(kinds(&context), vec![DiagnosticKind::UndeclaredLabel]);
    assert!(!context.is_valid(false));
    assert!(context.listing().is_none());
}

#[test]
fn test_goto_enclosing_label_passes_analysis() {
    let source = "program P; label 9; procedure Q; begin goto 9 end; begin Q; 9: end.";
    let context = Compiler::default().check_source(source, None);
    assert!(kinds(&context).is_empty());

    // The stack machine cannot unwind frames, so generation rejects it
    let context = compile(source);
    assert_eq!(kinds(&context), vec![DiagnosticKind::UnsupportedConstruct]);
    assert_eq!(context.phase_diagnostics(Phase::Codegen).len(), 1);
}

#[test]
fn test_subrange_assignment_out_of_range() {
    let context = compile("program P; type T = 1..10; var x: T; begin x := 11 end.");
    assert_eq!(kinds(&context), vec![DiagnosticKind::RangeViolation]);
    assert!(context.listing().is_none());

    let context = compile("program P; type T = 1..10; var x: T; begin x := 10 end.");
    assert!(kinds(&context).is_empty());
}

#[test]
fn test_integer_literal_beyond_range() {
    let context = compile("program P; var x: Integer; begin x := 9223372036854775807 + 1 end.");
    assert_eq!(kinds(&context), vec![DiagnosticKind::RangeViolation]);
    assert!(context.listing().is_none());
}

#[test]
fn test_label_beyond_four_digits() {
    let context = compile("program P; label 4294967295; begin 4294967295: end.");
    assert!(kinds(&context).contains(&DiagnosticKind::InvalidLabel));
    assert!(!context.is_valid(false));
    assert!(context.listing().is_none());
}

#[test]
fn test_label_reused_by_routine() {
    let context = compile("program P; label 1; procedure Q; label 1; begin 1: goto 1 end; begin Q; 1: goto 1 end.");
    assert!(kinds(&context).is_empty(), "{:?}", kinds(&context));
    let listing = context.listing().unwrap();
    assert_eq!(listing.matches("L1: ").count(), 1);
}

#[test]
fn test_forward_without_body() {
    let context = compile("program P; procedure Q; forward; begin Q end.");
    assert_eq!(kinds(&context), vec![DiagnosticKind::UndefinedReference]);
    assert!(context.listing().is_none());
}

#[test]
fn test_duplicate_variable() {
    let context = compile("program P; var x: Integer; var x: Integer; begin end.");
    assert_eq!(kinds(&context), vec![DiagnosticKind::DuplicateIdentifier]);
    assert!(!context.is_valid(false));
}

#[test]
fn test_unterminated_comment() {
    let mut lexer = Lexer::new("program P; { abc");
    let tokens = lexer.tokenize();
    assert_eq!(tokens.len(), 3);
    assert_eq!(lexer.diagnostics().len(), 1);
    assert_eq!(lexer.diagnostics()[0].kind, DiagnosticKind::NonterminatedComment);

    let context = compile("program P; begin end. { abc");
    assert_eq!(context.phase_diagnostics(Phase::Lexical).len(), 1);
    assert_eq!(
        context.phase_diagnostics(Phase::Lexical)[0].kind,
        DiagnosticKind::NonterminatedComment
    );
    assert!(context.program().is_some());
    assert!(context.listing().is_none());
}

#[test]
fn test_dump_round_trip() {
    let source = "program P; type T = 1..10; var a: array [T] of Integer; i: T;
        begin for i := 1 to 10 do a[i] := i * i end.";
    let value = dump(source);

    let text = serde_json::to_string_pretty(&value).unwrap();
    let reparsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(reparsed, value);

    let mut relaid = dump(
        "program P;\ntype T = 1 .. 10;\nvar a : array[T] of Integer;\n    i : T;\nbegin\n  for i := 1 to 10 do\n    a[i] := i * i\nend.",
    );
    let mut original = reparsed;
    strip_positions(&mut original);
    strip_positions(&mut relaid);
    assert_eq!(original, relaid);
}

#[test]
fn test_routines_and_loops() {
    let source = "program P;
        var n: Integer;
        function Square(x: Integer): Integer;
        begin Square := x * x end;
        begin
          n := 0;
          repeat n := n + 1 until n = 3;
          case n of 1, 2: WriteLn(0); 3: WriteLn(Square(n)) end
        end.";
    let context = compile(source);
    assert!(kinds(&context).is_empty(), "{:?}", kinds(&context));

    let listing = context.listing().unwrap();
    assert!(listing.contains("PUSHI 0\nPUSHG 0\nPUSHA"));
    assert!(listing.contains("CALL\nPOP 1\nWRITEI\nWRITELN\n"));
    assert!(listing.ends_with("RETURN\n"));
    assert!(context.registry().is_some_and(|registry| registry.len() == 6));
}

#[test]
fn test_warnings_do_not_block_by_default() {
    let source = "program P; label 1; begin end.";
    let context = compile(source);
    assert_eq!(kinds(&context), vec![DiagnosticKind::UnusedLabel]);
    assert!(context.listing().is_some());

    let strict = Compiler::new(CompilerOptions {
        warnings_as_errors: true,
        ..CompilerOptions::default()
    });
    assert!(strict.compile_source(source, None).listing().is_none());
}
