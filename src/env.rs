use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::func::Function;
use crate::global::Global;
use crate::memory::Memory;
use crate::module::Module;
use crate::signature::Signature;
use crate::table::Table;

/// The process-wide (or loader-wide) container every load appends to (§3).
///
/// Holds ordered vectors of every entity kind plus a single contiguous
/// istream byte buffer shared across all loaded modules, mirroring how
/// this crate family's `Arena`-backed stores grow monotonically and are
/// indexed by plain `u32`s rather than handles.
#[derive(Debug, Default)]
pub struct Environment {
    signatures: Vec<Signature>,
    functions: Vec<Function>,
    globals: Vec<Global>,
    tables: Vec<Table>,
    memories: Vec<Memory>,
    modules: Vec<Module>,
    istream: Vec<u8>,
    module_names: BTreeMap<String, u32>,
}

/// An opaque snapshot of every `Environment` vector's length, taken before
/// a load begins. Rollback on error is an infallible `truncate` back to
/// these lengths — no heap allocation happens in `mark()` itself (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    signatures: usize,
    functions: usize,
    globals: usize,
    tables: usize,
    memories: usize,
    modules: usize,
    istream: usize,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn mark(&self) -> Mark {
        Mark {
            signatures: self.signatures.len(),
            functions: self.functions.len(),
            globals: self.globals.len(),
            tables: self.tables.len(),
            memories: self.memories.len(),
            modules: self.modules.len(),
            istream: self.istream.len(),
        }
    }

    /// Discards every entry and istream byte appended since `mark` was taken.
    /// Does not remove registered module names for modules that predate the
    /// mark (only modules appended since `mark` are removed).
    pub fn rollback_to(&mut self, mark: Mark) {
        self.signatures.truncate(mark.signatures);
        self.functions.truncate(mark.functions);
        self.globals.truncate(mark.globals);
        self.tables.truncate(mark.tables);
        self.memories.truncate(mark.memories);
        self.istream.truncate(mark.istream);
        self.modules.truncate(mark.modules);
        self.module_names
            .retain(|_, &mut index| (index as usize) < mark.modules);
    }

    // --- Signatures ---

    pub fn push_signature(&mut self, signature: Signature) -> u32 {
        self.signatures.push(signature);
        (self.signatures.len() - 1) as u32
    }

    pub fn signature(&self, index: u32) -> &Signature {
        &self.signatures[index as usize]
    }

    // --- Functions ---

    pub fn push_function(&mut self, function: Function) -> u32 {
        self.functions.push(function);
        (self.functions.len() - 1) as u32
    }

    pub fn function(&self, index: u32) -> &Function {
        &self.functions[index as usize]
    }

    pub fn function_mut(&mut self, index: u32) -> &mut Function {
        &mut self.functions[index as usize]
    }

    pub fn function_count(&self) -> u32 {
        self.functions.len() as u32
    }

    // --- Globals ---

    pub fn push_global(&mut self, global: Global) -> u32 {
        self.globals.push(global);
        (self.globals.len() - 1) as u32
    }

    pub fn global(&self, index: u32) -> &Global {
        &self.globals[index as usize]
    }

    pub fn global_mut(&mut self, index: u32) -> &mut Global {
        &mut self.globals[index as usize]
    }

    // --- Tables ---

    pub fn push_table(&mut self, table: Table) -> u32 {
        self.tables.push(table);
        (self.tables.len() - 1) as u32
    }

    pub fn table(&self, index: u32) -> &Table {
        &self.tables[index as usize]
    }

    pub fn table_mut(&mut self, index: u32) -> &mut Table {
        &mut self.tables[index as usize]
    }

    // --- Memories ---

    pub fn push_memory(&mut self, memory: Memory) -> u32 {
        self.memories.push(memory);
        (self.memories.len() - 1) as u32
    }

    pub fn memory(&self, index: u32) -> &Memory {
        &self.memories[index as usize]
    }

    pub fn memory_mut(&mut self, index: u32) -> &mut Memory {
        &mut self.memories[index as usize]
    }

    // --- Modules ---

    pub fn register_module(&mut self, name: String, module: Module) -> u32 {
        self.modules.push(module);
        let index = (self.modules.len() - 1) as u32;
        self.module_names.insert(name, index);
        index
    }

    pub fn module(&self, index: u32) -> &Module {
        &self.modules[index as usize]
    }

    pub fn find_module(&self, name: &str) -> Option<(u32, &Module)> {
        self.module_names
            .get(name)
            .map(|&index| (index, self.module(index)))
    }

    // --- Istream ---

    pub fn istream_len(&self) -> u32 {
        self.istream.len() as u32
    }

    pub(crate) fn istream_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.istream
    }

    pub fn istream_bytes(&self) -> &[u8] {
        &self.istream
    }
}
