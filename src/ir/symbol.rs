//! Symbols: named entities referenced by the front end (spec §3 "Symbols").

use crate::ir::entities::SymbolId;
use rustc_hash::FxHashMap;

/// Kind of a source-level variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    Integer,
    Buffer,
    BufferRef,
    Protocol,
}

/// Compile-time constant kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstKind {
    Integer(i64),
    String(String),
    Float(f64),
}

/// What a code label marks (spec §3: "Labels carry a kind").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LabelKind {
    FallThrough,
    JumpTarget,
    SwitchCase,
    Default,
    Prologue,
    Epilogue,
}

/// A named entity in the symbol table.
#[derive(Clone, Debug)]
pub enum Symbol {
    Variable { name: String, kind: VarKind },
    Constant { name: String, value: ConstKind },
    Label { name: String, kind: LabelKind },
    LookupTable { name: String, table: crate::ir::entities::LookupTableId },
    Regex { name: String, pattern: String },
    Field { name: String, offset: u32, size: u32 },
    FieldContainer { name: String, fields: Vec<SymbolId> },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable { name, .. }
            | Symbol::Constant { name, .. }
            | Symbol::Label { name, .. }
            | Symbol::LookupTable { name, .. }
            | Symbol::Regex { name, .. }
            | Symbol::Field { name, .. }
            | Symbol::FieldContainer { name, .. } => name,
        }
    }
}

/// Maps names to symbols; a global table scopes the whole application, a
/// per-function table scopes local names (spec §3).
#[derive(Default)]
pub struct SymbolTable {
    symbols: cranelift_entity::PrimaryMap<SymbolId, Symbol>,
    by_name: FxHashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, symbol: Symbol) -> SymbolId {
        let name = symbol.name().to_string();
        let id = self.symbols.push(symbol);
        self.by_name.insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }
}

/// Per-function scope layered on top of the global table: local lookups
/// shadow global ones of the same name.
pub struct LocalScope<'g> {
    global: &'g SymbolTable,
    locals: FxHashMap<String, SymbolId>,
    local_symbols: cranelift_entity::PrimaryMap<SymbolId, Symbol>,
}

impl<'g> LocalScope<'g> {
    pub fn new(global: &'g SymbolTable) -> Self {
        LocalScope {
            global,
            locals: FxHashMap::default(),
            local_symbols: cranelift_entity::PrimaryMap::new(),
        }
    }

    pub fn declare_local(&mut self, symbol: Symbol) -> SymbolId {
        let name = symbol.name().to_string();
        let id = self.local_symbols.push(symbol);
        self.locals.insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.locals.get(name).copied().or_else(|| self.global.lookup(name))
    }
}
