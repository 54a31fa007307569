use alloc::vec::Vec;

use crate::error::Result;
use crate::module::ExternKind;
use crate::types::ValueType;

/// One function-body operator, as handed to the Validator/Emitter
/// coroutine by `on_opcode` (§4.4-4.5). Named after the Wasm operator it
/// represents rather than after any particular opcode encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Unreachable,
    Nop,
    Block(Option<ValueType>),
    Loop(Option<ValueType>),
    If(Option<ValueType>),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable(Vec<u32>, u32),
    Return,
    Call(u32),
    CallIndirect(u32),
    Drop,
    Select,
    GetLocal(u32),
    SetLocal(u32),
    TeeLocal(u32),
    GetGlobal(u32),
    SetGlobal(u32),
    I32Load { align_log2: u32, offset: u32 },
    I64Load { align_log2: u32, offset: u32 },
    F32Load { align_log2: u32, offset: u32 },
    F64Load { align_log2: u32, offset: u32 },
    I32Store { align_log2: u32, offset: u32 },
    I64Store { align_log2: u32, offset: u32 },
    F32Store { align_log2: u32, offset: u32 },
    F64Store { align_log2: u32, offset: u32 },
    CurrentMemory,
    GrowMemory,
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    /// Every remaining unary/binary/compare/convert operator, identified
    /// by its raw Wasm opcode byte plus its declared operand/result types
    /// (§4.5 "Unary/binary/compare/convert").
    Simple {
        wasm_opcode: u8,
        params: &'static [ValueType],
        result: Option<ValueType>,
    },
}

/// The decoder-consumed callback interface (§6), expressed as a single
/// Rust trait so a test harness (or a future real decoder) can drive the
/// Loader by calling methods directly rather than through an FFI vtable.
/// Method names mirror their C-original counterparts.
pub trait ModuleEvents {
    fn on_error(&mut self, offset: Option<u32>, message: &str);

    fn on_signature_count(&mut self, count: u32) -> Result<()>;
    fn on_signature(&mut self, index: u32, params: &[ValueType], results: &[ValueType]) -> Result<()>;

    fn on_import_count(&mut self, count: u32) -> Result<()>;
    fn on_import(&mut self, index: u32, module_name: &str, field_name: &str) -> Result<()>;
    fn on_import_func(&mut self, import_index: u32, signature_index: u32) -> Result<()>;
    fn on_import_table(&mut self, import_index: u32, initial: u32, maximum: Option<u32>) -> Result<()>;
    fn on_import_memory(&mut self, import_index: u32, initial: u32, maximum: Option<u32>) -> Result<()>;
    fn on_import_global(&mut self, import_index: u32, value_type: ValueType, mutable: bool) -> Result<()>;

    fn on_function_signatures_count(&mut self, count: u32) -> Result<()>;
    fn on_function_signature(&mut self, index: u32, signature_index: u32) -> Result<()>;

    fn on_table(&mut self, index: u32, initial: u32, maximum: Option<u32>) -> Result<()>;
    fn on_memory(&mut self, index: u32, initial: u32, maximum: Option<u32>) -> Result<()>;

    fn on_global_count(&mut self, count: u32) -> Result<()>;
    fn begin_global(&mut self, index: u32, value_type: ValueType, mutable: bool) -> Result<()>;
    fn on_init_expr_i32_const(&mut self, value: i32) -> Result<()>;
    fn on_init_expr_i64_const(&mut self, value: i64) -> Result<()>;
    fn on_init_expr_f32_const(&mut self, bits: u32) -> Result<()>;
    fn on_init_expr_f64_const(&mut self, bits: u64) -> Result<()>;
    fn on_init_expr_get_global(&mut self, global_index: u32) -> Result<()>;
    fn end_global(&mut self) -> Result<()>;

    fn on_export(&mut self, index: u32, kind: ExternKindTag, item_index: u32, name: &str) -> Result<()>;
    fn on_start_function(&mut self, func_index: u32) -> Result<()>;

    fn begin_function_body(&mut self, index: u32) -> Result<()>;
    fn on_local_decl_count(&mut self, count: u32) -> Result<()>;
    fn on_local_decl(&mut self, decl_index: u32, count: u32, value_type: ValueType) -> Result<()>;
    fn on_opcode(&mut self, op: Operator) -> Result<()>;
    fn end_function_body(&mut self, index: u32) -> Result<()>;

    fn on_elem_segment_count(&mut self, count: u32) -> Result<()>;
    fn begin_elem_segment(&mut self, index: u32, table_index: u32) -> Result<()>;
    fn on_elem_segment_init_expr_i32_const(&mut self, value: i32) -> Result<()>;
    fn on_elem_segment_init_expr_get_global(&mut self, global_index: u32) -> Result<()>;
    fn on_elem_segment_function_index(&mut self, seg_index: u32, func_index: u32) -> Result<()>;
    fn end_elem_segment(&mut self, index: u32) -> Result<()>;

    fn on_data_segment_count(&mut self, count: u32) -> Result<()>;
    fn begin_data_segment(&mut self, index: u32, memory_index: u32) -> Result<()>;
    fn on_data_segment_init_expr_i32_const(&mut self, value: i32) -> Result<()>;
    fn on_data_segment_init_expr_get_global(&mut self, global_index: u32) -> Result<()>;
    fn on_data_segment_data(&mut self, index: u32, bytes: &[u8]) -> Result<()>;
    fn end_data_segment(&mut self, index: u32) -> Result<()>;

    fn end_module(&mut self) -> Result<()>;
}

/// The kind tag carried by `on_export`, separate from `ExternKind` (which
/// also carries the descriptor) since exports only need to name an
/// existing environment-indexed entity, not redeclare its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKindTag {
    Func,
    Table,
    Memory,
    Global,
}

impl ExternKindTag {
    pub fn matches(self, kind: &ExternKind) -> bool {
        matches!(
            (self, kind),
            (ExternKindTag::Func, ExternKind::Func(_))
                | (ExternKindTag::Table, ExternKind::Table(_))
                | (ExternKindTag::Memory, ExternKind::Memory(_))
                | (ExternKindTag::Global, ExternKind::Global { .. })
        )
    }
}
