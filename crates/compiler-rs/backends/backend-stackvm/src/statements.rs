//! Statement emission

use ast::{CaseArm, Expression, ForDirection, Identifier, Statement, StatementKind};
use ir::{CodeTree, Opcode, Operand};

use crate::{load_slot, store_slot, CodeGenerator, CodegenError, CodegenResult};

impl CodeGenerator<'_> {
    pub(crate) fn emit_statement(&mut self, stmt: &Statement, code: &mut CodeTree) -> CodegenResult<()> {
        // User labels are jump targets; inside a routine they go through its renaming
        if let Some(label) = stmt.label {
            code.mark(self.user_label(label.value));
        }

        match &stmt.kind {
            StatementKind::Empty => {}
            StatementKind::Assignment { target, value } => {
                self.emit_store(target, |gen, code| gen.emit_expression(value, code), code)?;
            }
            StatementKind::ProcedureCall { name, args } => self.emit_call(stmt.id, name, args, false, code)?,
            StatementKind::Goto(label) => {
                if self.annotations.nonlocal_gotos.contains(&stmt.id) {
                    return Err(CodegenError::unsupported("goto out of a routine", label.span));
                }
                code.jump(self.user_label(label.value));
            }
            StatementKind::Compound(stmts) => {
                for stmt in stmts {
                    self.emit_statement(stmt, code)?;
                }
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let otherwise = self.labels.next_label();
                let join = self.labels.next_label();

                self.emit_expression(condition, code)?;
                code.jz(otherwise);
                self.emit_statement(then_branch, code)?;
                code.jump(join);
                code.mark(otherwise);
                if let Some(else_branch) = else_branch {
                    self.emit_statement(else_branch, code)?;
                }
                code.mark(join);
            }
            StatementKind::Case { selector, arms } => self.emit_case(stmt, selector, arms, code)?,
            StatementKind::While { condition, body } => {
                let top = match stmt.label {
                    Some(label) => self.user_label(label.value),
                    None => {
                        let top = self.labels.next_label();
                        code.mark(top);
                        top
                    }
                };
                let end = self.labels.next_label();

                self.emit_expression(condition, code)?;
                code.jz(end);
                self.emit_statement(body, code)?;
                code.jump(top);
                code.mark(end);
                code.emit(Opcode::Nop);
            }
            StatementKind::Repeat { body, condition } => {
                let top = self.labels.next_label();
                code.mark(top);
                for stmt in body {
                    self.emit_statement(stmt, code)?;
                }
                self.emit_expression(condition, code)?;
                code.jz(top);
            }
            StatementKind::For {
                control,
                initial,
                direction,
                limit,
                body,
            } => {
                let step = match direction {
                    ForDirection::To => Opcode::Add,
                    ForDirection::Downto => Opcode::Sub,
                };
                self.emit_for(stmt, control, (initial, limit), step, body, code)?;
            }
            StatementKind::With { records, body } => {
                let depth = self.with_records.len();
                self.with_records.extend(records.iter().cloned());
                let result = self.emit_statement(body, code);
                self.with_records.truncate(depth);
                result?;
            }
        }
        Ok(())
    }

    /// The body runs first; the loop ends once the control variable reaches `limit` plus one step
    fn emit_for(
        &mut self,
        stmt: &Statement,
        control: &Identifier,
        (initial, limit): (&Expression, &Expression),
        step: Opcode,
        body: &Statement,
        code: &mut CodeTree,
    ) -> CodegenResult<()> {
        let symbol = self
            .annotations
            .for_control(stmt.id)
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                name: control.name.clone(),
                span: control.span,
            })?;
        let variable = self.locate(symbol, control)?;

        self.emit_expression(initial, code)?;
        store_slot(code, variable);

        let counter = self.frame_mut().allocate_temp();
        self.emit_expression(limit, code)?;
        code.push_int(1);
        code.emit(step);
        store_slot(code, counter);

        let top = self.labels.next_label();
        code.mark(top);
        self.emit_statement(body, code)?;

        load_slot(code, variable);
        code.push_int(1);
        code.emit(step);
        code.emit_with(Opcode::Dup, Operand::Int(1));
        store_slot(code, variable);
        load_slot(code, counter);
        code.emit(Opcode::Equal);
        code.jz(top);
        Ok(())
    }

    fn emit_case(&mut self, stmt: &Statement, selector: &Expression, arms: &[CaseArm], code: &mut CodeTree) -> CodegenResult<()> {
        let labels = self
            .annotations
            .case_labels(stmt.id)
            .map(<[Vec<i64>]>::to_vec)
            .ok_or_else(|| CodegenError::unsupported("case statement without analyzed labels", stmt.span))?;

        let selected = self.frame_mut().allocate_temp();
        self.emit_expression(selector, code)?;
        store_slot(code, selected);

        let end = self.labels.next_label();
        for (arm, values) in arms.iter().zip(labels) {
            if values.is_empty() {
                continue;
            }
            let next = self.labels.next_label();
            for (index, value) in values.into_iter().enumerate() {
                load_slot(code, selected);
                code.push_int(value);
                code.emit(Opcode::Equal);
                if index > 0 {
                    code.emit(Opcode::Or);
                }
            }
            code.jz(next);
            self.emit_statement(&arm.body, code)?;
            code.jump(end);
            code.mark(next);
        }
        code.mark(end);
        code.emit(Opcode::Nop);
        Ok(())
    }
}
