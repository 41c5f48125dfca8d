//! Tree-of-maps serialization of the AST
//!
//! Every node becomes `{type, pos: {start: [offset, row, col], end: [...]}, ...fields}`.
//! Type tags and field names are a stable wire format for external tooling.

use serde_json::{json, Map, Value};
use tokens::Span;

use crate::*;

/// Serialize a node to its tagged-map form
pub trait Dump {
    fn dump(&self) -> Value;
}

fn pos(span: Span) -> Value {
    json!({
        "start": span.start.triple(),
        "end": span.end.triple(),
    })
}

fn node(tag: &str, span: Span, fields: Value) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), Value::from(tag));
    if let Value::Object(fields) = fields {
        map.extend(fields);
    }
    map.insert("pos".into(), pos(span));
    Value::Object(map)
}

fn list<T: Dump>(items: &[T]) -> Value {
    Value::Array(items.iter().map(Dump::dump).collect())
}

fn list_or_null<T: Dump>(items: &[T]) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        list(items)
    }
}

fn sign_symbol(sign: Sign) -> &'static str {
    match sign {
        Sign::Plus => "+",
        Sign::Minus => "-",
    }
}

impl<T: Dump> Dump for Box<T> {
    fn dump(&self) -> Value {
        (**self).dump()
    }
}

impl<T: Dump> Dump for Option<T> {
    fn dump(&self) -> Value {
        self.as_ref().map_or(Value::Null, Dump::dump)
    }
}

impl Dump for Identifier {
    fn dump(&self) -> Value {
        node("IdentifierNode", self.span, json!({ "value": self.name }))
    }
}

impl Dump for StringLiteral {
    fn dump(&self) -> Value {
        node("StringNode", self.span, json!({ "value": self.value }))
    }
}

impl Dump for Number {
    fn dump(&self) -> Value {
        let value = match self.value {
            NumberValue::Integer(v) => json!(v),
            NumberValue::Real(v) => json!(v),
        };
        node("NumberNode", self.span, json!({ "value": value, "kind": self.kind as u8 }))
    }
}

impl Dump for Label {
    fn dump(&self) -> Value {
        node(
            "NumberNode",
            self.span,
            json!({ "value": self.value, "kind": NumberKind::UnsignedInteger as u8 }),
        )
    }
}

impl Dump for Constant {
    fn dump(&self) -> Value {
        match self {
            Constant::Number(n) => n.dump(),
            Constant::String(s) => s.dump(),
            Constant::Identifier { sign, name, span } => node(
                "ConstantIdentifierNode",
                *span,
                json!({
                    "value": name.dump(),
                    "sign": sign.map(sign_symbol),
                }),
            ),
        }
    }
}

impl Dump for Program {
    fn dump(&self) -> Value {
        node(
            "ProgramNode",
            self.span,
            json!({ "heading": self.heading.dump(), "body": self.block.dump() }),
        )
    }
}

impl Dump for ProgramHeading {
    fn dump(&self) -> Value {
        let externals: Vec<&str> = self.externals.iter().map(|e| e.name.as_str()).collect();
        node(
            "ProgramHeadingNode",
            self.span,
            json!({ "name": self.name.name, "externals": externals }),
        )
    }
}

impl Dump for Block {
    fn dump(&self) -> Value {
        node(
            "BlockNode",
            self.span,
            json!({
                "labels": list_or_null(&self.labels),
                "consts": list_or_null(&self.constants),
                "types": list_or_null(&self.types),
                "variables": list_or_null(&self.variables),
                "subfuncs": list_or_null(&self.routines),
                "stmt": self.body.dump(),
            }),
        )
    }
}

impl Dump for ConstantDefinition {
    fn dump(&self) -> Value {
        node(
            "ConstantDefinitionNode",
            self.span,
            json!({ "key": self.name.name, "value": self.value.dump() }),
        )
    }
}

impl Dump for TypeDefinition {
    fn dump(&self) -> Value {
        node(
            "TypeDefinitionNode",
            self.span,
            json!({ "key": self.name.name, "value": self.ty.dump() }),
        )
    }
}

impl Dump for VariableDeclaration {
    fn dump(&self) -> Value {
        node(
            "VariableDeclarationNode",
            self.span,
            json!({ "keys": list(&self.names), "value": self.ty.dump() }),
        )
    }
}

impl Dump for TypeNode {
    fn dump(&self) -> Value {
        match &self.kind {
            TypeKind::Identifier(ident) => node("TypeIdentifierNode", self.span, json!({ "value": ident.dump() })),
            TypeKind::Enumerated(values) => node("EnumeratedTypeNode", self.span, json!({ "value": list(values) })),
            TypeKind::Subrange { start, end } => node(
                "SubrangeTypeNode",
                self.span,
                json!({ "start": start.dump(), "end": end.dump() }),
            ),
            TypeKind::Array {
                packed,
                indices,
                element,
            } => node(
                "ArrayTypeNode",
                self.span,
                json!({ "packed": packed, "value": list(indices), "basetype": element.dump() }),
            ),
            TypeKind::Record(record) => record.dump(),
            TypeKind::Set { packed, base } => node(
                "SetTypeNode",
                self.span,
                json!({ "packed": packed, "basetype": base.dump() }),
            ),
            TypeKind::File { packed, base } => node(
                "FileTypeNode",
                self.span,
                json!({ "packed": packed, "basetype": base.dump() }),
            ),
            TypeKind::Pointer(target) => node("PointerTypeNode", self.span, json!({ "basetype": target.dump() })),
        }
    }
}

impl Dump for RecordType {
    fn dump(&self) -> Value {
        node(
            "RecordTypeNode",
            self.span,
            json!({
                "packed": self.packed,
                "fixedPart": list_or_null(&self.fixed),
                "variantPart": self.variant.dump(),
            }),
        )
    }
}

impl Dump for RecordSection {
    fn dump(&self) -> Value {
        node(
            "RecordSectionNode",
            self.span,
            json!({ "identifiers": list(&self.names), "basetype": self.ty.dump() }),
        )
    }
}

impl Dump for VariantPart {
    fn dump(&self) -> Value {
        node(
            "RecordVariantNode",
            self.span,
            json!({
                "identifier": self.tag.as_ref().map(|t| t.name.as_str()),
                "basetype": self.tag_type.dump(),
                "cases": list(&self.cases),
            }),
        )
    }
}

impl Dump for VariantCase {
    fn dump(&self) -> Value {
        node(
            "RecordVariantCaseNode",
            self.span,
            json!({
                "consts": list(&self.constants),
                "fixedPart": list_or_null(&self.fields.fixed),
                "variantPart": self.fields.variant.dump(),
            }),
        )
    }
}

impl Dump for RoutineDeclaration {
    fn dump(&self) -> Value {
        let tag = if self.heading.is_function() {
            "FunctionDeclarationNode"
        } else {
            "ProcedureDeclarationNode"
        };
        let body = match &self.body {
            RoutineBody::Block(block) => block.dump(),
            RoutineBody::Directive(directive) => {
                node("DirectiveNode", directive.span, json!({ "value": directive.name }))
            }
        };
        node(tag, self.span, json!({ "heading": self.heading.dump(), "body": body }))
    }
}

impl Dump for RoutineHeading {
    fn dump(&self) -> Value {
        match &self.kind {
            RoutineKind::Procedure => node(
                "ProcedureHeadingNode",
                self.span,
                json!({ "name": self.name.name, "params": list_or_null(&self.params) }),
            ),
            RoutineKind::Function { return_type } => node(
                "FunctionHeadingNode",
                self.span,
                json!({
                    "name": self.name.name,
                    "params": list_or_null(&self.params),
                    "rettype": return_type.dump(),
                }),
            ),
        }
    }
}

impl Dump for FormalParameter {
    fn dump(&self) -> Value {
        match self {
            FormalParameter::Value(spec) => spec.dump(),
            FormalParameter::Routine(heading) => heading.dump(),
        }
    }
}

impl Dump for ParameterSpecification {
    fn dump(&self) -> Value {
        let names: Vec<&str> = self.names.iter().map(|n| n.name.as_str()).collect();
        node(
            "ParameterSpecificationNode",
            self.span,
            json!({ "identifiers": names, "basetype": self.ty.dump(), "variable": self.by_ref }),
        )
    }
}

impl Dump for ParamType {
    fn dump(&self) -> Value {
        match self {
            ParamType::Identifier(ident) => node("TypeIdentifierNode", ident.span, json!({ "value": ident.dump() })),
            ParamType::ConformantArray(schema) => schema.dump(),
        }
    }
}

impl Dump for ConformantArraySchema {
    fn dump(&self) -> Value {
        let tag = if self.packed {
            "PackedConformantArraySchemaNode"
        } else {
            "UnpackedConformantArraySchemaNode"
        };
        node(
            tag,
            self.span,
            json!({ "name": self.element.dump(), "specifications": list(&self.indices) }),
        )
    }
}

impl Dump for IndexTypeSpecification {
    fn dump(&self) -> Value {
        node(
            "IndexTypeSpecificationNode",
            self.span,
            json!({ "lb": self.low.name, "hb": self.high.name, "name": self.ty.name }),
        )
    }
}

impl Dump for Statement {
    fn dump(&self) -> Value {
        let (tag, fields) = match &self.kind {
            StatementKind::Empty => ("StatementNode", json!({})),
            StatementKind::Assignment { target, value } => (
                "AssignmentStatementNode",
                json!({ "key": target.dump(), "value": value.dump() }),
            ),
            StatementKind::ProcedureCall { name, args } => (
                "ProcedureStatementNode",
                json!({ "key": name.dump(), "value": list_or_null(args) }),
            ),
            StatementKind::Goto(label) => ("GotoStatementNode", json!({ "value": label.dump() })),
            StatementKind::Compound(stmts) => ("CompoundStatementNode", json!({ "value": list(stmts) })),
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => (
                "ConditionalStatementNode",
                json!({
                    "cond": condition.dump(),
                    "ifStmt": then_branch.dump(),
                    "elseStmt": else_branch.dump(),
                }),
            ),
            StatementKind::Case { selector, arms } => (
                "CaseStatementNode",
                json!({ "index": selector.dump(), "cases": list(arms) }),
            ),
            StatementKind::While { condition, body } => (
                "WhileStatementNode",
                json!({ "cond": condition.dump(), "body": body.dump() }),
            ),
            StatementKind::Repeat { body, condition } => (
                "RepeatStatementNode",
                json!({ "cond": condition.dump(), "body": list(body) }),
            ),
            StatementKind::For {
                control,
                initial,
                direction,
                limit,
                body,
            } => (
                "ForStatementNode",
                json!({
                    "controlVar": control.dump(),
                    "initial": initial.dump(),
                    "traversalMode": *direction as u8,
                    "final": limit.dump(),
                    "body": body.dump(),
                }),
            ),
            StatementKind::With { records, body } => (
                "WithStatementNode",
                json!({ "recVars": list(records), "body": body.dump() }),
            ),
        };
        let mut value = node(tag, self.span, fields);
        if let Value::Object(map) = &mut value {
            map.insert("label".into(), self.label.map_or(Value::Null, |l| Value::from(l.value)));
        }
        value
    }
}

impl Dump for CaseArm {
    fn dump(&self) -> Value {
        node(
            "CaseNode",
            self.span,
            json!({ "heading": list(&self.constants), "body": self.body.dump() }),
        )
    }
}

impl Dump for Expression {
    fn dump(&self) -> Value {
        match &self.kind {
            ExpressionKind::Number(n) => n.dump(),
            ExpressionKind::String(s) => s.dump(),
            ExpressionKind::Nil => node("SpecialSymbolNode", self.span, json!({ "value": "nil" })),
            ExpressionKind::Variable(v) => v.dump(),
            ExpressionKind::Call { name, args } => node(
                "FunctionDesignatorNode",
                self.span,
                json!({ "key": name.dump(), "params": list_or_null(args) }),
            ),
            ExpressionKind::Set(elements) => node("SetConstructorNode", self.span, json!({ "value": list(elements) })),
            ExpressionKind::Unary { op, operand } => node(
                "ExpressionNode",
                self.span,
                json!({ "kind": 1, "lhs": Value::Null, "op": op.symbol(), "rhs": operand.dump() }),
            ),
            ExpressionKind::Binary { op, left, right } => node(
                "ExpressionNode",
                self.span,
                json!({ "kind": 2, "lhs": left.dump(), "op": op.symbol(), "rhs": right.dump() }),
            ),
        }
    }
}

impl Dump for SetElement {
    fn dump(&self) -> Value {
        node(
            "ElementDescriptionNode",
            self.span,
            json!({ "start": self.start.dump(), "end": self.end.dump() }),
        )
    }
}

impl Dump for Variable {
    fn dump(&self) -> Value {
        match &self.kind {
            VariableKind::Entire(ident) => node("EntireVariableNode", self.span, json!({ "kind": 1, "value": ident.name })),
            VariableKind::Indexed { base, indices } => node(
                "IndexedVariableNode",
                self.span,
                json!({ "kind": 2, "value": base.dump(), "indices": list(indices) }),
            ),
            VariableKind::Field { base, field } => node(
                "FieldDesignatorNode",
                self.span,
                json!({ "kind": 2, "key": base.dump(), "value": field.dump() }),
            ),
            VariableKind::Dereference(base) => node(
                "IdentifiedVariableNode",
                self.span,
                json!({ "kind": 3, "value": base.dump() }),
            ),
        }
    }
}
