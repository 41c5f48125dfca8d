//! Stack machine intermediate representation
//!
//! This crate defines the instruction set of the target stack machine
//! (global pointer, frame pointer, stack pointer) together with:
//! - `CodeTree`, an ordered instruction sequence with nested subtrees
//! - `LabelAllocator`, the per-compilation source of branch targets
//! - the textual listing consumed by the virtual machine

use std::fmt;

/// Stack machine opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Integer arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Inf,
    InfEq,
    Sup,
    SupEq,
    // Real arithmetic
    FAdd,
    FSub,
    FMul,
    FDiv,
    FInf,
    FInfEq,
    FSup,
    FSupEq,
    // Strings
    Concat,
    ChrCode,
    StrLen,
    CharAt,
    // Logic
    And,
    Or,
    Equal,
    // Conversion
    Atoi,
    Atof,
    Itof,
    Ftoi,
    Stri,
    Strf,
    // Data
    PushI,
    PushN,
    PushF,
    PushS,
    PushG,
    PushL,
    PushSp,
    PushFp,
    PushGp,
    Load,
    LoadN,
    Dup,
    Pop,
    StoreL,
    StoreG,
    Store,
    StoreN,
    Swap,
    // I/O
    WriteI,
    WriteF,
    WriteS,
    WriteLn,
    WriteChr,
    Read,
    // Control
    PushA,
    Jump,
    Jz,
    Call,
    Return,
    Start,
    Nop,
    Err,
    Stop,
}

impl Opcode {
    /// Mnemonic as it appears in the listing
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Not => "NOT",
            Opcode::Inf => "INF",
            Opcode::InfEq => "INFEQ",
            Opcode::Sup => "SUP",
            Opcode::SupEq => "SUPEQ",
            Opcode::FAdd => "FADD",
            Opcode::FSub => "FSUB",
            Opcode::FMul => "FMUL",
            Opcode::FDiv => "FDIV",
            Opcode::FInf => "FINF",
            Opcode::FInfEq => "FINFEQ",
            Opcode::FSup => "FSUP",
            Opcode::FSupEq => "FSUPEQ",
            Opcode::Concat => "CONCAT",
            Opcode::ChrCode => "CHRCODE",
            Opcode::StrLen => "STRLEN",
            Opcode::CharAt => "CHARAT",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Equal => "EQUAL",
            Opcode::Atoi => "ATOI",
            Opcode::Atof => "ATOF",
            Opcode::Itof => "ITOF",
            Opcode::Ftoi => "FTOI",
            Opcode::Stri => "STRI",
            Opcode::Strf => "STRF",
            Opcode::PushI => "PUSHI",
            Opcode::PushN => "PUSHN",
            Opcode::PushF => "PUSHF",
            Opcode::PushS => "PUSHS",
            Opcode::PushG => "PUSHG",
            Opcode::PushL => "PUSHL",
            Opcode::PushSp => "PUSHSP",
            Opcode::PushFp => "PUSHFP",
            Opcode::PushGp => "PUSHGP",
            Opcode::Load => "LOAD",
            Opcode::LoadN => "LOADN",
            Opcode::Dup => "DUP",
            Opcode::Pop => "POP",
            Opcode::StoreL => "STOREL",
            Opcode::StoreG => "STOREG",
            Opcode::Store => "STORE",
            Opcode::StoreN => "STOREN",
            Opcode::Swap => "SWAP",
            Opcode::WriteI => "WRITEI",
            Opcode::WriteF => "WRITEF",
            Opcode::WriteS => "WRITES",
            Opcode::WriteLn => "WRITELN",
            Opcode::WriteChr => "WRITECHR",
            Opcode::Read => "READ",
            Opcode::PushA => "PUSHA",
            Opcode::Jump => "JUMP",
            Opcode::Jz => "JZ",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::Start => "START",
            Opcode::Nop => "NOP",
            Opcode::Err => "ERR",
            Opcode::Stop => "STOP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Branch target; renders as `L<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Instruction argument
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64),
    Real(f64),
    Str(String),
    Label(Label),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(value) => write!(f, "{}", value),
            // `{:?}` keeps the fractional part on whole numbers (`0.0`)
            Operand::Real(value) => write!(f, "{:?}", value),
            Operand::Str(value) => write!(f, "\"{}\"", value.replace('"', "\\\"")),
            Operand::Label(label) => write!(f, "{}", label),
        }
    }
}

/// A single stack machine instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: vec![],
        }
    }

    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Entry of a code tree
#[derive(Debug, Clone, PartialEq)]
pub enum CodeItem {
    Instruction(Instruction),
    /// Label definition; prefixes the next instruction
    Label(Label),
    /// Nested tree, flattened in place when rendered
    Subtree(CodeTree),
}

/// Ordered instruction sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeTree {
    items: Vec<CodeItem>,
}

impl CodeTree {
    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn items(&self) -> &[CodeItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Flattened instructions, subtrees included, labels skipped
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = vec![];
        self.collect_instructions(&mut out);
        out
    }

    fn collect_instructions<'a>(&'a self, out: &mut Vec<&'a Instruction>) {
        for item in &self.items {
            match item {
                CodeItem::Instruction(inst) => out.push(inst),
                CodeItem::Subtree(tree) => tree.collect_instructions(out),
                CodeItem::Label(_) => {}
            }
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.items.push(CodeItem::Instruction(inst));
    }

    /// Instruction without operands
    pub fn emit(&mut self, opcode: Opcode) {
        self.push(Instruction::new(opcode));
    }

    pub fn emit_with(&mut self, opcode: Opcode, operand: Operand) {
        self.push(Instruction::new(opcode).with_operand(operand));
    }

    pub fn push_int(&mut self, value: i64) {
        self.emit_with(Opcode::PushI, Operand::Int(value));
    }

    pub fn push_real(&mut self, value: f64) {
        self.emit_with(Opcode::PushF, Operand::Real(value));
    }

    pub fn push_string(&mut self, value: &str) {
        self.emit_with(Opcode::PushS, Operand::Str(value.to_string()));
    }

    pub fn mark(&mut self, label: Label) {
        self.items.push(CodeItem::Label(label));
    }

    pub fn jump(&mut self, label: Label) {
        self.emit_with(Opcode::Jump, Operand::Label(label));
    }

    pub fn jz(&mut self, label: Label) {
        self.emit_with(Opcode::Jz, Operand::Label(label));
    }

    pub fn append(&mut self, tree: CodeTree) {
        if !tree.is_empty() {
            self.items.push(CodeItem::Subtree(tree));
        }
    }

    /// Render the listing: one instruction per line, labels inline
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut pending = false;
        self.render_into(&mut out, &mut pending);
        // A label still open at the end needs something to point at
        if pending {
            out.push_str("NOP\n");
        }
        out
    }

    fn render_into(&self, out: &mut String, pending: &mut bool) {
        for item in &self.items {
            match item {
                CodeItem::Label(label) => {
                    out.push_str(&format!("{}: ", label));
                    *pending = true;
                }
                CodeItem::Instruction(inst) => {
                    out.push_str(&inst.to_string());
                    out.push('\n');
                    *pending = false;
                }
                CodeItem::Subtree(tree) => tree.render_into(out, pending),
            }
        }
    }
}

impl fmt::Display for CodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Issues unique labels for one compilation
///
/// Generated labels start above the largest user label so that a `goto`
/// target `L<n>` never collides with a compiler generated one.
#[derive(Debug, Clone)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new(start: u32) -> Self {
        Self { next: start }
    }

    /// Allocator seeded after the largest user label, if any
    pub fn above(max_user_label: Option<u32>) -> Self {
        Self::new(max_user_label.map_or(0, |label| label.saturating_add(1)))
    }

    pub fn next_label(&mut self) -> Label {
        let label = Label(self.next);
        self.next = self.next.saturating_add(1);
        label
    }

    /// Next label that would be issued
    pub fn peek(&self) -> Label {
        Label(self.next)
    }
}

impl Default for LabelAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_mnemonics() {
        assert_eq!(Opcode::PushI.mnemonic(), "PUSHI");
        assert_eq!(Opcode::FInfEq.mnemonic(), "FINFEQ");
        assert_eq!(Opcode::WriteChr.to_string(), "WRITECHR");
        assert_eq!(Opcode::StoreN.to_string(), "STOREN");
    }

    #[test]
    fn test_instruction_display() {
        assert_eq!(Instruction::new(Opcode::Add).to_string(), "ADD");
        let push = Instruction::new(Opcode::PushI).with_operand(Operand::Int(-3));
        assert_eq!(push.to_string(), "PUSHI -3");
        let store = Instruction::new(Opcode::StoreL).with_operand(Operand::Int(-2));
        assert_eq!(store.to_string(), "STOREL -2");
    }

    #[test]
    fn test_operand_display() {
        assert_eq!(Operand::Real(0.0).to_string(), "0.0");
        assert_eq!(Operand::Real(2.5).to_string(), "2.5");
        assert_eq!(Operand::Str("hi".to_string()).to_string(), "\"hi\"");
        assert_eq!(Operand::Str("a\"b".to_string()).to_string(), "\"a\\\"b\"");
        assert_eq!(Operand::Label(Label(7)).to_string(), "L7");
    }

    #[test]
    fn test_render_labels_inline() {
        let mut tree = CodeTree::new();
        tree.mark(Label(3));
        tree.push_int(1);
        tree.jz(Label(4));
        tree.jump(Label(3));
        tree.mark(Label(4));
        tree.emit(Opcode::Nop);

        assert_eq!(tree.render(), "L3: PUSHI 1\nJZ L4\nJUMP L3\nL4: NOP\n");
    }

    #[test]
    fn test_render_subtrees_flatten() {
        let mut routine = CodeTree::new();
        routine.mark(Label(0));
        routine.emit_with(Opcode::PushN, Operand::Int(1));
        routine.emit(Opcode::Return);

        let mut program = CodeTree::new();
        program.emit(Opcode::Start);
        program.emit(Opcode::Stop);
        program.append(routine);

        assert_eq!(program.render(), "START\nSTOP\nL0: PUSHN 1\nRETURN\n");
        assert_eq!(program.instructions().len(), 4);
    }

    #[test]
    fn test_render_trailing_label() {
        let mut tree = CodeTree::new();
        tree.emit(Opcode::Stop);
        tree.mark(Label(1));
        assert_eq!(tree.render(), "STOP\nL1: NOP\n");
    }

    #[test]
    fn test_render_empty_tree() {
        assert_eq!(CodeTree::new().render(), "");
        let mut tree = CodeTree::new();
        tree.append(CodeTree::new());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_string_push() {
        let mut tree = CodeTree::new();
        tree.push_string("hello world");
        tree.emit(Opcode::WriteS);
        assert_eq!(tree.render(), "PUSHS \"hello world\"\nWRITES\n");
    }

    #[test]
    fn test_label_allocator() {
        let mut labels = LabelAllocator::default();
        assert_eq!(labels.next_label(), Label(0));
        assert_eq!(labels.next_label(), Label(1));
        assert_eq!(labels.peek(), Label(2));

        let mut seeded = LabelAllocator::above(Some(10));
        assert_eq!(seeded.next_label(), Label(11));
        assert_eq!(LabelAllocator::above(None).peek(), Label(0));
        assert_eq!(LabelAllocator::above(Some(u32::MAX)).peek(), Label(u32::MAX));
    }
}
