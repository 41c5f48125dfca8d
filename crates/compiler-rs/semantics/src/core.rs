//! Core semantic analyzer functionality

use errors::{Diagnostic, DiagnosticKind};
use symbols::{ScopeManager, SymbolId, SymbolKind, SymbolValue};
use tokens::Span;
use ::types::{BuiltinType, ConstValue};

use crate::{Annotations, SemanticError, SemanticResult};

/// Coarse classification of a type, used for operator and opcode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticType {
    Integer,
    Real,
    Boolean,
    Char,
    String,
    Enumerated,
    Array,
    Record,
    Pointer,
    Set,
    File,
    Nil,
    Any,
}

impl StaticType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, StaticType::Integer | StaticType::Real)
    }

    /// Values that fit one stack slot
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            StaticType::Array | StaticType::Record | StaticType::Set | StaticType::File
        )
    }
}

/// Follow aliases to the underlying type symbol
pub fn resolve_type(scopes: &ScopeManager, ty: SymbolId) -> SymbolId {
    scopes.resolve_symbol_reference(ty).unwrap_or(ty)
}

/// Underlying type with subranges reduced to their host type
pub fn base_type(scopes: &ScopeManager, ty: SymbolId) -> SymbolId {
    let resolved = resolve_type(scopes, ty);
    match &scopes.symbol(resolved).value {
        SymbolValue::Subrange { base, .. } => resolve_type(scopes, *base),
        _ => resolved,
    }
}

pub fn static_type(scopes: &ScopeManager, ty: SymbolId) -> StaticType {
    let base = base_type(scopes, ty);
    let symbol = scopes.symbol(base);
    match &symbol.value {
        SymbolValue::Builtin(builtin) => match builtin {
            BuiltinType::Integer => StaticType::Integer,
            BuiltinType::Real => StaticType::Real,
            BuiltinType::Boolean => StaticType::Boolean,
            BuiltinType::Char => StaticType::Char,
            BuiltinType::String => StaticType::String,
            BuiltinType::Nil => StaticType::Nil,
            BuiltinType::Any => StaticType::Any,
        },
        SymbolValue::Enumerated { .. } => StaticType::Enumerated,
        SymbolValue::Array { .. } => StaticType::Array,
        SymbolValue::Record { .. } => StaticType::Record,
        SymbolValue::Set { .. } => StaticType::Set,
        SymbolValue::File { .. } => StaticType::File,
        SymbolValue::Pointer { .. } => StaticType::Pointer,
        _ => StaticType::Any,
    }
}

/// Inclusive ordinal bounds of an ordinal type
pub fn ordinal_bounds(scopes: &ScopeManager, ty: SymbolId) -> Option<(i64, i64)> {
    let resolved = resolve_type(scopes, ty);
    match &scopes.symbol(resolved).value {
        SymbolValue::Subrange { start, end, .. } => Some((*start, *end)),
        SymbolValue::Enumerated { values } => Some((0, values.len() as i64 - 1)),
        SymbolValue::Builtin(builtin) => builtin.ordinal_bounds(),
        _ => None,
    }
}

/// Field `name` of a record type, searching the variant part too
pub fn find_field(scopes: &ScopeManager, record: SymbolId, name: &str) -> Option<SymbolId> {
    let resolved = resolve_type(scopes, record);
    match &scopes.symbol(resolved).value {
        SymbolValue::Record { fields, variants } => scopes
            .lookup_from(*fields, name, Some(SymbolKind::RecordField), true)
            .or_else(|| variants.iter().find_map(|&variant| find_field(scopes, variant, name))),
        _ => None,
    }
}

/// Declared type of a variable, parameter or field symbol
pub fn symbol_type(scopes: &ScopeManager, symbol: SymbolId) -> Option<SymbolId> {
    match &scopes.symbol(symbol).value {
        SymbolValue::Typed { ty } => Some(*ty),
        SymbolValue::Parameter { ty, signature: None, .. } => *ty,
        SymbolValue::Routine(routine) => routine.return_type,
        SymbolValue::Constant { ty, .. } => Some(*ty),
        _ => None,
    }
}

/// Name of a type for diagnostics
pub fn type_name(scopes: &ScopeManager, ty: SymbolId) -> String {
    let symbol = scopes.symbol(ty);
    if !symbol.is_internal() {
        return symbol.name.clone();
    }
    match &symbol.value {
        SymbolValue::Builtin(BuiltinType::Any) => "Any".to_string(),
        SymbolValue::Subrange { start, end, .. } => format!("{}..{}", start, end),
        SymbolValue::Enumerated { values } => format!("({})", values.join(", ")),
        SymbolValue::Array { element, .. } => format!("array of {}", type_name(scopes, *element)),
        SymbolValue::Record { .. } => "record".to_string(),
        SymbolValue::Set { base } => format!("set of {}", type_name(scopes, *base)),
        SymbolValue::File { base } => format!("file of {}", type_name(scopes, *base)),
        SymbolValue::Pointer { target } => format!("^{}", target),
        SymbolValue::Alias { target } => target.clone(),
        _ => symbol.name.trim_start_matches('@').to_string(),
    }
}

/// Core semantic analyzer functionality
pub struct CoreAnalyzer {
    pub scopes: ScopeManager,
    pub annotations: Annotations,
    pub diagnostics: Vec<Diagnostic>,
    pub filename: Option<String>,
    anonymous: u32,
}

impl CoreAnalyzer {
    /// Create a new core analyzer
    pub(super) fn new(scopes: ScopeManager, filename: Option<String>) -> Self {
        Self {
            scopes,
            annotations: Annotations::new(),
            diagnostics: vec![],
            filename,
            anonymous: 0,
        }
    }

    /// Diagnostic of `kind` at `span`, tagged with the file name
    pub fn error(&self, kind: DiagnosticKind, span: Span) -> Diagnostic {
        Diagnostic::new(kind, span).with_file(self.filename.clone())
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record a failed analysis step and carry on
    pub fn recover<T>(&mut self, result: SemanticResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.diagnostics.push(err.into_diagnostic());
                None
            }
        }
    }

    /// Fresh name for an anonymous type; `@` keeps it out of reach of source identifiers
    pub fn anonymous_name(&mut self, prefix: &str) -> String {
        self.anonymous += 1;
        format!("@{}_{}", prefix, self.anonymous)
    }

    pub fn builtin(&self, ty: BuiltinType) -> SymbolId {
        self.scopes.builtin_type(ty)
    }

    pub fn base_type(&self, ty: SymbolId) -> SymbolId {
        base_type(&self.scopes, ty)
    }

    pub fn static_type(&self, ty: SymbolId) -> StaticType {
        static_type(&self.scopes, ty)
    }

    pub fn type_name(&self, ty: SymbolId) -> String {
        type_name(&self.scopes, ty)
    }

    /// Value of an enumeration literal
    pub fn literal_value(&self, owner: SymbolId, ordinal: i64) -> ConstValue {
        if owner == self.builtin(BuiltinType::Boolean) {
            ConstValue::Boolean(ordinal == 1)
        } else {
            ConstValue::Integer(ordinal)
        }
    }

    pub fn mismatch(&self, expected: SymbolId, actual: SymbolId, span: Span) -> SemanticError {
        self.mismatch_named(&self.type_name(expected), actual, span)
    }

    pub fn mismatch_named(&self, expected: &str, actual: SymbolId, span: Span) -> SemanticError {
        self.error(DiagnosticKind::TypeMismatch, span)
            .with_arg("aType", expected)
            .with_arg("bType", self.type_name(actual))
            .into()
    }

    /// Turn a constant-folding failure into a diagnostic
    pub fn type_error(&self, error: ::types::TypeError, span: Span) -> SemanticError {
        use ::types::TypeError;

        let diagnostic = match error {
            TypeError::ZeroDivision => self.error(DiagnosticKind::ZeroDiv, span),
            TypeError::NanResult => self.error(DiagnosticKind::NanResult, span),
            TypeError::InfinityResult => self.error(DiagnosticKind::InfinityResult, span),
            TypeError::InvalidOperands { left, right, .. } => self
                .error(DiagnosticKind::TypeMismatch, span)
                .with_arg("aType", left)
                .with_arg("bType", right),
            TypeError::OutOfRange { value, ty } => {
                let (start, end) = ty.ordinal_bounds().unwrap_or((0, 0));
                self.error(DiagnosticKind::RangeViolation, span)
                    .with_arg("value", value)
                    .with_arg("start", start)
                    .with_arg("end", end)
            }
        };
        diagnostic.into()
    }
}
