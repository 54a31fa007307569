use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::ReadConfig;
use crate::env::{Environment, Mark};
use crate::error::{Error, Result};
use crate::events::{ExternKindTag, ModuleEvents, Operator};
use crate::func::Function;
use crate::global::{ConstValue, Global};
use crate::host::{HostModuleDelegate, ImportSite};
use crate::index_map::IndexMap;
use crate::init_expr::{self, InitExprOp};
use crate::limits::Limits;
use crate::memory::Memory;
use crate::module::{Export, ExportIndex, ExternKind, Import, Module};
use crate::signature::Signature;
use crate::table::Table;
use crate::translator::FunctionTranslator;
use crate::types::ValueType;

/// Looks up a host module's delegate by name, so the Import Resolver can
/// route a host import without the Loader Driver owning the registry
/// (§6 "module-name registries, host-binding delegates ... their
/// required interfaces only").
pub trait HostModuleLookup {
    fn delegate_for(&mut self, module_name: &str) -> Option<&mut dyn HostModuleDelegate>;
}

/// Tracks which kind of import is pending between `on_import` and the
/// following `on_import_<kind>` callback (§4.2).
enum PendingImport {
    Host { module_name: String, field_name: String },
    Resolved {
        kind: ExternKind,
        env_index: u32,
    },
}

struct PendingGlobal {
    value_type: ValueType,
    mutable: bool,
    init: Option<InitExprOp>,
}

struct PendingSegment {
    offset: Option<InitExprOp>,
}

/// Drives one module load (§2 "Loader Driver"): implements `ModuleEvents`
/// so a decoder (or test harness) can push callbacks directly into it.
/// On success, registers a new `Module` in the environment; on any error,
/// rolls the environment back to the mark taken at construction.
pub struct Loader<'env, 'host> {
    env: &'env mut Environment,
    host_lookup: &'host mut dyn HostModuleLookup,
    config: ReadConfig,
    mark: Mark,

    sig_map: IndexMap,
    func_map: IndexMap,
    global_map: IndexMap,

    defined_func_count: u32,
    func_fixups: Vec<Vec<u32>>,

    table_index: Option<u32>,
    memory_index: Option<u32>,
    start_func_index: Option<u32>,

    imports: Vec<Import>,
    exports: Vec<Export>,
    pending_imports: Vec<PendingImport>,

    pending_global: Option<PendingGlobal>,
    pending_segment: Option<PendingSegment>,

    current_function: Option<FunctionTranslator>,

    istream_start: u32,
    failed: bool,
    decoder_error: Option<(Option<u32>, String)>,
}

impl<'env, 'host> Loader<'env, 'host> {
    pub fn new(env: &'env mut Environment, host_lookup: &'host mut dyn HostModuleLookup, config: ReadConfig) -> Self {
        let mark = env.mark();
        let istream_start = env.istream_len();
        Loader {
            env,
            host_lookup,
            config,
            mark,
            sig_map: IndexMap::new(),
            func_map: IndexMap::new(),
            global_map: IndexMap::new(),
            defined_func_count: 0,
            func_fixups: Vec::new(),
            table_index: None,
            memory_index: None,
            start_func_index: None,
            imports: Vec::new(),
            exports: Vec::new(),
            pending_imports: Vec::new(),
            pending_global: None,
            pending_segment: None,
            current_function: None,
            istream_start,
            failed: false,
            decoder_error: None,
        }
    }

    /// Registers the finished module under `name` in the environment, or
    /// rolls back and returns the error if the load failed at any point.
    pub fn finish(mut self, name: &str) -> Result<u32> {
        if self.failed {
            self.env.rollback_to(self.mark);
            return Err(match self.decoder_error {
                Some((Some(offset), message)) => Error::malformed(alloc::format!("at offset {}: {}", offset, message)),
                Some((None, message)) => Error::malformed(message),
                None => Error::validation("module load failed"),
            });
        }
        let istream_end = self.env.istream_len();
        let module = Module::new_defined(
            self.table_index,
            self.memory_index,
            self.start_func_index,
            self.imports,
            self.exports,
            self.istream_start,
            istream_end,
        );
        Ok(self.env.register_module(name.to_string(), module))
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.failed = true;
        Err(err)
    }

    fn has_table(&self) -> bool {
        self.table_index.is_some()
    }

    fn has_memory(&self) -> bool {
        self.memory_index.is_some()
    }

    fn check_limits_compat(&self, actual: Limits, declared: Limits) -> Result<()> {
        if actual.is_compatible_with(declared) {
            Ok(())
        } else {
            Err(Error::link("import limits incompatible with declaration"))
        }
    }
}

impl<'env, 'host> ModuleEvents for Loader<'env, 'host> {
    fn on_error(&mut self, offset: Option<u32>, message: &str) {
        self.failed = true;
        self.decoder_error = Some((offset, message.to_string()));
    }

    fn on_signature_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn on_signature(&mut self, _index: u32, params: &[ValueType], results: &[ValueType]) -> Result<()> {
        let sig = Signature::new(params.to_vec(), results.to_vec());
        let env_index = self.env.push_signature(sig);
        self.sig_map.push_defined(env_index);
        Ok(())
    }

    fn on_import_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn on_import(&mut self, _index: u32, module_name: &str, field_name: &str) -> Result<()> {
        if let Some((_, module)) = self.env.find_module(module_name) {
            if module.is_host() {
                self.pending_imports.push(PendingImport::Host {
                    module_name: module_name.to_string(),
                    field_name: field_name.to_string(),
                });
            } else {
                match module.find_export(field_name) {
                    Some(export) => {
                        let (kind, env_index) = match export.index {
                            ExportIndex::Func(i) => (ExternKind::Func(self.env.function(i).signature().clone()), i),
                            ExportIndex::Table(i) => (ExternKind::Table(self.env.table(i).limits()), i),
                            ExportIndex::Memory(i) => (ExternKind::Memory(self.env.memory(i).limits()), i),
                            ExportIndex::Global(i) => {
                                let g = self.env.global(i);
                                (ExternKind::Global { value_type: g.value_type(), mutable: g.is_mutable() }, i)
                            }
                        };
                        self.pending_imports.push(PendingImport::Resolved { kind, env_index });
                    }
                    None => return self.fail(Error::link(alloc::format!("unknown module field: {}", field_name))),
                }
            }
        } else {
            return self.fail(Error::link(alloc::format!("unknown import module: {}", module_name)));
        }
        self.imports.push(Import {
            module_name: module_name.to_string(),
            field_name: field_name.to_string(),
            // Filled precisely once the `on_import_<kind>` callback arrives;
            // placeholder kind recorded here is overwritten below.
            kind: ExternKind::Func(Signature::new(Vec::new(), Vec::new())),
        });
        Ok(())
    }

    fn on_import_func(&mut self, import_index: u32, signature_index: u32) -> Result<()> {
        let env_sig_index = self.sig_map.index_of(signature_index);
        let signature = self.env.signature(env_sig_index).clone();
        let pending = self.pending_imports.pop().expect("on_import_func without matching on_import");
        let env_index = match pending {
            PendingImport::Host { module_name, field_name } => {
                let env_index = self.env.push_function(Function::Host { signature: signature.clone(), host_index: 0 });
                let requested = ExternKind::Func(signature.clone());
                let site = ImportSite { field_name: &field_name, requested: &requested, env_index };
                if let Some(delegate) = self.host_lookup.delegate_for(&module_name) {
                    delegate.import_func(site)?;
                } else if self.config.unknown_host_import_is_fatal() {
                    return self.fail(Error::link("unknown host module"));
                }
                env_index
            }
            PendingImport::Resolved { kind, env_index } => {
                match kind {
                    ExternKind::Func(exported_sig) if exported_sig == signature => {}
                    ExternKind::Func(_) => return self.fail(Error::link("import signature mismatch")),
                    _ => return self.fail(Error::link("import kind mismatch")),
                }
                env_index
            }
        };
        self.func_map.push_imported(env_index);
        self.imports[import_index as usize].kind = ExternKind::Func(signature);
        Ok(())
    }

    fn on_import_table(&mut self, import_index: u32, initial: u32, maximum: Option<u32>) -> Result<()> {
        if self.has_table() {
            return self.fail(Error::validation("module may import or define at most one table"));
        }
        let declared = Limits::new(initial, maximum).map_err(|_| Error::validation("invalid table limits"))?;
        let pending = self.pending_imports.pop().expect("on_import_table without matching on_import");
        let env_index = match pending {
            PendingImport::Host { module_name, field_name } => {
                let env_index = self.env.push_table(Table::new(declared));
                let requested = ExternKind::Table(declared);
                let site = ImportSite { field_name: &field_name, requested: &requested, env_index };
                if let Some(delegate) = self.host_lookup.delegate_for(&module_name) {
                    delegate.import_table(site)?;
                } else if self.config.unknown_host_import_is_fatal() {
                    return self.fail(Error::link("unknown host module"));
                }
                env_index
            }
            PendingImport::Resolved { kind, env_index } => {
                match kind {
                    ExternKind::Table(actual) => self.check_limits_compat(actual, declared)?,
                    _ => return self.fail(Error::link("import kind mismatch")),
                }
                env_index
            }
        };
        self.table_index = Some(env_index);
        self.imports[import_index as usize].kind = ExternKind::Table(declared);
        Ok(())
    }

    fn on_import_memory(&mut self, import_index: u32, initial: u32, maximum: Option<u32>) -> Result<()> {
        if self.has_memory() {
            return self.fail(Error::validation("module may import or define at most one memory"));
        }
        let declared = Limits::new(initial, maximum).map_err(|_| Error::validation("invalid memory limits"))?;
        let pending = self.pending_imports.pop().expect("on_import_memory without matching on_import");
        let env_index = match pending {
            PendingImport::Host { module_name, field_name } => {
                let env_index = self.env.push_memory(Memory::new(declared));
                let requested = ExternKind::Memory(declared);
                let site = ImportSite { field_name: &field_name, requested: &requested, env_index };
                if let Some(delegate) = self.host_lookup.delegate_for(&module_name) {
                    delegate.import_memory(site)?;
                } else if self.config.unknown_host_import_is_fatal() {
                    return self.fail(Error::link("unknown host module"));
                }
                env_index
            }
            PendingImport::Resolved { kind, env_index } => {
                match kind {
                    ExternKind::Memory(actual) => self.check_limits_compat(actual, declared)?,
                    _ => return self.fail(Error::link("import kind mismatch")),
                }
                env_index
            }
        };
        self.memory_index = Some(env_index);
        self.imports[import_index as usize].kind = ExternKind::Memory(declared);
        Ok(())
    }

    fn on_import_global(&mut self, import_index: u32, value_type: ValueType, mutable: bool) -> Result<()> {
        let pending = self.pending_imports.pop().expect("on_import_global without matching on_import");
        let env_index = match pending {
            PendingImport::Host { module_name, field_name } => {
                // Append-then-record: the appended global's own index is
                // what gets recorded, never the pre-append length (§9.1).
                let env_index = self.env.push_global(Global::new(ConstValue::I32(0), mutable));
                let requested = ExternKind::Global { value_type, mutable };
                let site = ImportSite { field_name: &field_name, requested: &requested, env_index };
                if let Some(delegate) = self.host_lookup.delegate_for(&module_name) {
                    delegate.import_global(site)?;
                } else if self.config.unknown_host_import_is_fatal() {
                    return self.fail(Error::link("unknown host module"));
                }
                env_index
            }
            PendingImport::Resolved { kind, env_index } => {
                match kind {
                    ExternKind::Global { value_type: actual_type, mutable: actual_mutable }
                        if actual_type == value_type && actual_mutable == mutable => {}
                    ExternKind::Global { .. } => return self.fail(Error::link("import global type/mutability mismatch")),
                    _ => return self.fail(Error::link("import kind mismatch")),
                }
                env_index
            }
        };
        self.global_map.push_imported(env_index);
        self.imports[import_index as usize].kind = ExternKind::Global { value_type, mutable };
        Ok(())
    }

    fn on_function_signatures_count(&mut self, count: u32) -> Result<()> {
        self.defined_func_count = count;
        self.func_fixups = (0..count).map(|_| Vec::new()).collect();
        Ok(())
    }

    fn on_function_signature(&mut self, _index: u32, signature_index: u32) -> Result<()> {
        let env_sig_index = self.sig_map.index_of(signature_index);
        let signature = self.env.signature(env_sig_index).clone();
        let env_index = self.env.push_function(Function::Defined {
            signature,
            istream_offset: crate::istream::INVALID_OFFSET,
        });
        self.func_map.push_defined(env_index);
        Ok(())
    }

    fn on_table(&mut self, _index: u32, initial: u32, maximum: Option<u32>) -> Result<()> {
        if self.has_table() {
            return self.fail(Error::validation("module may import or define at most one table"));
        }
        let limits = Limits::new(initial, maximum).map_err(|_| Error::validation("invalid table limits"))?;
        let env_index = self.env.push_table(Table::new(limits));
        self.table_index = Some(env_index);
        Ok(())
    }

    fn on_memory(&mut self, _index: u32, initial: u32, maximum: Option<u32>) -> Result<()> {
        if self.has_memory() {
            return self.fail(Error::validation("module may import or define at most one memory"));
        }
        let limits = Limits::new(initial, maximum).map_err(|_| Error::validation("invalid memory limits"))?;
        let env_index = self.env.push_memory(Memory::new(limits));
        self.memory_index = Some(env_index);
        Ok(())
    }

    fn on_global_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn begin_global(&mut self, _index: u32, value_type: ValueType, mutable: bool) -> Result<()> {
        self.pending_global = Some(PendingGlobal { value_type, mutable, init: None });
        Ok(())
    }

    fn on_init_expr_i32_const(&mut self, value: i32) -> Result<()> {
        if let Some(g) = &mut self.pending_global {
            g.init = Some(InitExprOp::I32Const(value));
        } else if let Some(s) = &mut self.pending_segment {
            s.offset = Some(InitExprOp::I32Const(value));
        }
        Ok(())
    }

    fn on_init_expr_i64_const(&mut self, value: i64) -> Result<()> {
        if let Some(g) = &mut self.pending_global {
            g.init = Some(InitExprOp::I64Const(value));
        }
        Ok(())
    }

    fn on_init_expr_f32_const(&mut self, bits: u32) -> Result<()> {
        if let Some(g) = &mut self.pending_global {
            g.init = Some(InitExprOp::F32Const(bits));
        }
        Ok(())
    }

    fn on_init_expr_f64_const(&mut self, bits: u64) -> Result<()> {
        if let Some(g) = &mut self.pending_global {
            g.init = Some(InitExprOp::F64Const(bits));
        }
        Ok(())
    }

    fn on_init_expr_get_global(&mut self, global_index: u32) -> Result<()> {
        if let Some(g) = &mut self.pending_global {
            g.init = Some(InitExprOp::GetGlobal(global_index));
        } else if let Some(s) = &mut self.pending_segment {
            s.offset = Some(InitExprOp::GetGlobal(global_index));
        }
        Ok(())
    }

    fn end_global(&mut self) -> Result<()> {
        let pending = self.pending_global.take().expect("end_global without begin_global");
        let op = pending.init.ok_or_else(|| Error::validation("global missing initializer"))?;
        let value = init_expr::evaluate(self.env, &self.global_map, op)?;
        init_expr::check_type(value, pending.value_type)?;
        let env_index = self.env.push_global(Global::new(value, pending.mutable));
        self.global_map.push_defined(env_index);
        Ok(())
    }

    fn on_export(&mut self, _index: u32, kind: ExternKindTag, item_index: u32, name: &str) -> Result<()> {
        if self.exports.iter().any(|e| e.name == name) {
            return self.fail(Error::link(alloc::format!("duplicate export: {}", name)));
        }
        let index = match kind {
            ExternKindTag::Func => ExportIndex::Func(self.func_map.index_of(item_index)),
            ExternKindTag::Table => ExportIndex::Table(self.table_index.ok_or_else(|| Error::validation("no table to export"))?),
            ExternKindTag::Memory => ExportIndex::Memory(self.memory_index.ok_or_else(|| Error::validation("no memory to export"))?),
            ExternKindTag::Global => {
                let env_index = self.global_map.index_of(item_index);
                if self.env.global(env_index).is_mutable() {
                    return self.fail(Error::validation("cannot export a mutable global"));
                }
                ExportIndex::Global(env_index)
            }
        };
        self.exports.push(Export { name: name.to_string(), index });
        Ok(())
    }

    fn on_start_function(&mut self, func_index: u32) -> Result<()> {
        let env_index = self.func_map.index_of(func_index);
        let signature = self.env.function(env_index).signature();
        if !signature.params().is_empty() || !signature.results().is_empty() {
            return self.fail(Error::validation("start function must be `() -> ()`"));
        }
        self.start_func_index = Some(env_index);
        Ok(())
    }

    fn begin_function_body(&mut self, index: u32) -> Result<()> {
        // `index` is the module-absolute function index (imports counted),
        // matching `on_function_signature`'s indexing (§4.6).
        let defined_index = self
            .func_map
            .defined_index(index)
            .expect("begin_function_body must target a defined function");
        let env_index = self.func_map.index_of(index);
        let signature = self.env.function(env_index).signature().clone();
        let translator = FunctionTranslator::begin(
            self.env,
            &mut self.func_fixups,
            signature,
            defined_index,
            self.config.max_operand_stack_height(),
        )?;
        self.current_function = Some(translator);
        Ok(())
    }

    fn on_local_decl_count(&mut self, count: u32) -> Result<()> {
        self.current_function.as_mut().expect("on_local_decl_count outside a function body").on_local_decl_count(count)
    }

    fn on_local_decl(&mut self, decl_index: u32, count: u32, value_type: ValueType) -> Result<()> {
        let mut translator = self.current_function.take().expect("on_local_decl outside a function body");
        let result = translator.on_local_decl(self.env, decl_index, count, value_type);
        self.current_function = Some(translator);
        result
    }

    fn on_opcode(&mut self, op: Operator) -> Result<()> {
        let mut translator = self.current_function.take().expect("on_opcode outside a function body");
        let result = translator.on_opcode(
            self.env,
            &mut self.func_fixups,
            &self.sig_map,
            &self.func_map,
            &self.global_map,
            self.has_table(),
            self.has_memory(),
            op,
        );
        self.current_function = Some(translator);
        result
    }

    fn end_function_body(&mut self, _index: u32) -> Result<()> {
        let translator = self.current_function.take().expect("end_function_body outside a function body");
        translator.end_function(self.env)
    }

    fn on_elem_segment_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn begin_elem_segment(&mut self, _index: u32, _table_index: u32) -> Result<()> {
        // At most one table per module (§1 Non-goals), so the segment's
        // table index is always this module's single table.
        self.pending_segment = Some(PendingSegment { offset: None });
        Ok(())
    }

    fn on_elem_segment_init_expr_i32_const(&mut self, value: i32) -> Result<()> {
        self.on_init_expr_i32_const(value)
    }

    fn on_elem_segment_init_expr_get_global(&mut self, global_index: u32) -> Result<()> {
        self.on_init_expr_get_global(global_index)
    }

    fn on_elem_segment_function_index(&mut self, seg_index: u32, func_index: u32) -> Result<()> {
        let pending = self.pending_segment.as_ref().expect("elem segment function index before offset");
        let op = pending.offset.ok_or_else(|| Error::validation("element segment missing offset expression"))?;
        let offset_value = init_expr::evaluate(self.env, &self.global_map, op)?;
        init_expr::check_type(offset_value, ValueType::I32)?;
        let offset = match offset_value {
            ConstValue::I32(v) => v as u32,
            _ => return self.fail(Error::validation("element segment offset must be i32")),
        };
        let env_func_index = self.func_map.index_of(func_index);
        let table_index = self.table_index.ok_or_else(|| Error::validation("element segment without a table"))?;
        self.env.table_mut(table_index).set(offset + seg_index, env_func_index)?;
        Ok(())
    }

    fn end_elem_segment(&mut self, _index: u32) -> Result<()> {
        self.pending_segment = None;
        Ok(())
    }

    fn on_data_segment_count(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn begin_data_segment(&mut self, _index: u32, _memory_index: u32) -> Result<()> {
        self.pending_segment = Some(PendingSegment { offset: None });
        Ok(())
    }

    fn on_data_segment_init_expr_i32_const(&mut self, value: i32) -> Result<()> {
        self.on_init_expr_i32_const(value)
    }

    fn on_data_segment_init_expr_get_global(&mut self, global_index: u32) -> Result<()> {
        self.on_init_expr_get_global(global_index)
    }

    fn on_data_segment_data(&mut self, _index: u32, _bytes: &[u8]) -> Result<()> {
        // Writing bytes into the memory's backing buffer is a pass-2,
        // runtime-adjacent concern; the data segment's only effect this
        // crate models is checking its offset expression (§1 Non-goals:
        // the runtime interpreter's memory contents are out of scope).
        let pending = self.pending_segment.as_ref().expect("data segment bytes before offset");
        let op = pending.offset.ok_or_else(|| Error::validation("data segment missing offset expression"))?;
        let offset_value = init_expr::evaluate(self.env, &self.global_map, op)?;
        init_expr::check_type(offset_value, ValueType::I32)?;
        Ok(())
    }

    fn end_data_segment(&mut self, _index: u32) -> Result<()> {
        self.pending_segment = None;
        Ok(())
    }

    fn end_module(&mut self) -> Result<()> {
        Ok(())
    }
}
