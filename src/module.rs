use alloc::string::String;
use alloc::vec::Vec;

use crate::limits::Limits;
use crate::signature::Signature;

/// The kind of an import or export, plus its kind-specific descriptor.
///
/// Mirrors the `ExternVal`/`External` kind split found throughout this
/// crate family, but as a plain descriptor rather than a runtime reference
/// — the Loader Driver only ever needs to check kind and shape, never hold
/// the entity itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternKind {
    Func(Signature),
    Table(Limits),
    Memory(Limits),
    Global { value_type: crate::types::ValueType, mutable: bool },
}

impl ExternKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExternKind::Func(_) => "func",
            ExternKind::Table(_) => "table",
            ExternKind::Memory(_) => "memory",
            ExternKind::Global { .. } => "global",
        }
    }
}

/// An import declaration (§3, §4.2): `(module_name, field_name, kind)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module_name: String,
    pub field_name: String,
    pub kind: ExternKind,
}

/// An export declaration: a name plus the environment-global index of the
/// exported entity, tagged by kind so the Import Resolver can check the
/// requesting import's kind against it without a second lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportIndex {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub index: ExportIndex,
}

/// A module entry in the `Environment` (§3): the result of one load.
///
/// Host modules (`is_host = true`) are registered directly by the embedder
/// as import-resolution targets and never go through the Loader Driver;
/// defined modules are produced by [`crate::loader::Loader::finish`].
#[derive(Debug, Clone)]
pub struct Module {
    is_host: bool,
    table_index: Option<u32>,
    memory_index: Option<u32>,
    start_func_index: Option<u32>,
    imports: Vec<Import>,
    exports: Vec<Export>,
    /// Only meaningful for defined modules: the half-open byte range
    /// `[istream_start, istream_end)` of this module's code in the
    /// environment's shared istream buffer.
    istream_start: u32,
    istream_end: u32,
}

impl Module {
    pub fn new_host(imports: Vec<Import>, exports: Vec<Export>) -> Self {
        Module {
            is_host: true,
            table_index: None,
            memory_index: None,
            start_func_index: None,
            imports,
            exports,
            istream_start: 0,
            istream_end: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_defined(
        table_index: Option<u32>,
        memory_index: Option<u32>,
        start_func_index: Option<u32>,
        imports: Vec<Import>,
        exports: Vec<Export>,
        istream_start: u32,
        istream_end: u32,
    ) -> Self {
        Module {
            is_host: false,
            table_index,
            memory_index,
            start_func_index,
            imports,
            exports,
            istream_start,
            istream_end,
        }
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn table_index(&self) -> Option<u32> {
        self.table_index
    }

    pub fn memory_index(&self) -> Option<u32> {
        self.memory_index
    }

    pub fn start_func_index(&self) -> Option<u32> {
        self.start_func_index
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn find_export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn istream_range(&self) -> (u32, u32) {
        (self.istream_start, self.istream_end)
    }
}
