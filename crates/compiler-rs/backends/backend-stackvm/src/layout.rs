//! Storage layout: slot sizes, record field offsets and frames

use std::collections::HashMap;

use semantics::{ordinal_bounds, resolve_type, symbol_type};
use symbols::{ScopeManager, SymbolId, SymbolKind, SymbolValue};
use tokens::Span;

use crate::{CodegenError, CodegenResult};

/// Address of a slot relative to the global or the frame pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Global(i64),
    Local(i64),
}

impl Location {
    pub fn offset(&self) -> i64 {
        match self {
            Location::Global(offset) | Location::Local(offset) => *offset,
        }
    }
}

/// Number of stack slots a value of type `ty` occupies
pub fn size_of(scopes: &ScopeManager, ty: SymbolId, span: Span) -> CodegenResult<i64> {
    let too_large = || CodegenError::unsupported("type larger than the address space", span);
    let resolved = resolve_type(scopes, ty);
    match &scopes.symbol(resolved).value {
        SymbolValue::Array { indices, element } => {
            let mut size = size_of(scopes, *element, span)?;
            for &index in indices {
                size = size.checked_mul(index_count(scopes, index, span)?).ok_or_else(too_large)?;
            }
            Ok(size)
        }
        SymbolValue::Record { fields, variants } => {
            let mut size: i64 = 0;
            for field in record_fields(scopes, *fields) {
                let field_size = size_of(scopes, field_type(scopes, field, span)?, span)?;
                size = size.checked_add(field_size).ok_or_else(too_large)?;
            }
            let mut widest = 0;
            for &variant in variants {
                widest = widest.max(size_of(scopes, variant, span)?);
            }
            size.checked_add(widest).ok_or_else(too_large)
        }
        SymbolValue::Set { .. } => Err(CodegenError::unsupported("set type", span)),
        SymbolValue::File { .. } => Err(CodegenError::unsupported("file type", span)),
        _ => Ok(1),
    }
}

/// Number of values of an index type
pub fn index_count(scopes: &ScopeManager, index: SymbolId, span: Span) -> CodegenResult<i64> {
    let (low, high) = index_bounds(scopes, index, span)?;
    Ok(high - low + 1)
}

pub fn index_bounds(scopes: &ScopeManager, index: SymbolId, span: Span) -> CodegenResult<(i64, i64)> {
    ordinal_bounds(scopes, index).ok_or_else(|| CodegenError::unsupported("array with dynamic bounds", span))
}

/// Slot offset of `field` from the start of a record of type `record`
pub fn field_offset(scopes: &ScopeManager, record: SymbolId, field: SymbolId, span: Span) -> CodegenResult<Option<i64>> {
    let resolved = resolve_type(scopes, record);
    let SymbolValue::Record { fields, variants } = &scopes.symbol(resolved).value else {
        return Ok(None);
    };

    let mut offset = 0;
    for candidate in record_fields(scopes, *fields) {
        if candidate == field {
            return Ok(Some(offset));
        }
        offset += size_of(scopes, field_type(scopes, candidate, span)?, span)?;
    }
    // Variants overlay each other after the fixed part
    for &variant in variants {
        if let Some(inner) = field_offset(scopes, variant, field, span)? {
            return Ok(Some(offset + inner));
        }
    }
    Ok(None)
}

fn record_fields(scopes: &ScopeManager, fields: symbols::ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
    scopes
        .scope_symbols(fields)
        .filter(|symbol| symbol.kind == SymbolKind::RecordField)
        .map(|symbol| symbol.id)
}

fn field_type(scopes: &ScopeManager, field: SymbolId, span: Span) -> CodegenResult<SymbolId> {
    symbol_type(scopes, field).ok_or_else(|| CodegenError::UnresolvedVariable {
        name: scopes.symbol(field).name.clone(),
        span,
    })
}

/// Slots of the program globals or of one routine activation
#[derive(Debug, Clone)]
pub struct Frame {
    global: bool,
    slots: HashMap<SymbolId, i64>,
    /// `PUSHN` sizes of the declared variables, in slot order
    allocations: Vec<i64>,
    next: i64,
    temps: usize,
    argc: usize,
}

impl Frame {
    pub fn global() -> Self {
        Self {
            global: true,
            slots: HashMap::new(),
            allocations: vec![],
            next: 0,
            temps: 0,
            argc: 0,
        }
    }

    /// Routine frame: slot 0 holds the result, parameters sit below the frame pointer
    pub fn routine(routine: SymbolId, params: &[SymbolId]) -> Self {
        let argc = params.len();
        let mut slots = HashMap::new();
        slots.insert(routine, 0);
        for (index, &param) in params.iter().enumerate() {
            slots.insert(param, index as i64 - argc as i64);
        }
        Self {
            global: false,
            slots,
            allocations: vec![],
            next: 1,
            temps: 0,
            argc,
        }
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn argc(&self) -> usize {
        self.argc
    }

    fn at(&self, offset: i64) -> Location {
        if self.global {
            Location::Global(offset)
        } else {
            Location::Local(offset)
        }
    }

    pub fn allocate(&mut self, symbol: SymbolId, size: i64) -> Location {
        let offset = self.next;
        self.slots.insert(symbol, offset);
        self.allocations.push(size);
        self.next = self.next.saturating_add(size);
        self.at(offset)
    }

    /// Hidden one-slot variable, reserved after all declared variables
    pub fn allocate_temp(&mut self) -> Location {
        let offset = self.next;
        self.next += 1;
        self.temps += 1;
        self.at(offset)
    }

    pub fn location(&self, symbol: SymbolId) -> Option<Location> {
        self.slots.get(&symbol).map(|&offset| self.at(offset))
    }

    pub fn allocations(&self) -> &[i64] {
        &self.allocations
    }

    pub fn temps(&self) -> usize {
        self.temps
    }

    /// Slots above the frame pointer, result slot included
    pub fn size(&self) -> i64 {
        self.next
    }
}
