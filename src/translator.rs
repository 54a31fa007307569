use alloc::vec::Vec;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::events::Operator;
use crate::index_map::IndexMap;
use crate::istream::{Op, Writer, INVALID_OFFSET};
use crate::signature::Signature;
use crate::types::ValueType;
use crate::validator::{ControlFrame, ControlStack, FrameKind, TypeStack};

/// Natural alignment (log2 of byte width) for a load/store operator,
/// looked up against the declared `alignment_log2` per §4.5 "load / store".
fn natural_alignment_log2(value_type: ValueType, bit_width: u32) -> u32 {
    let _ = value_type;
    match bit_width {
        8 => 0,
        16 => 1,
        32 => 2,
        64 => 3,
        _ => unreachable!("unsupported load/store width"),
    }
}

/// The combined Validator + Code Emitter coroutine for a single function
/// body (§4.4-§4.7): one type-checker and one istream emitter advancing
/// in lockstep over the operator sequence handed in by `ModuleEvents`.
pub struct FunctionTranslator {
    type_stack: TypeStack,
    control: ControlStack,
    param_and_local_types: Vec<ValueType>,
    signature: Signature,
    defined_index: u32,
    entry_offset: u32,
    locals_declared: u32,
    locals_expected: u32,
    max_operand_stack_height: Option<u32>,
}

impl FunctionTranslator {
    /// `begin_function_body` (§4.6).
    pub fn begin(
        env: &mut Environment,
        func_fixups: &mut [Vec<u32>],
        signature: Signature,
        defined_index: u32,
        max_operand_stack_height: Option<u32>,
    ) -> Result<Self> {
        let entry_offset = env.istream_len();

        // Resolve every pending fixup for this callee now that its entry
        // offset is known.
        {
            let mut writer = Writer::new(env.istream_buffer_mut());
            for &fixup_offset in &func_fixups[defined_index as usize] {
                writer.write_u32_at(fixup_offset, entry_offset);
            }
        }
        func_fixups[defined_index as usize].clear();

        let mut type_stack = TypeStack::new();
        for &param in signature.params() {
            type_stack.push(param);
        }
        let param_and_local_types: Vec<ValueType> = signature.params().to_vec();

        let mut control = ControlStack::new();
        control.push(ControlFrame {
            kind: FrameKind::Func,
            signature: signature.results().first().copied(),
            floor: type_stack.len(),
            offset: None,
            fixup_offset: None,
        });

        Ok(FunctionTranslator {
            type_stack,
            control,
            param_and_local_types,
            signature,
            defined_index,
            entry_offset,
            locals_declared: 0,
            locals_expected: 0,
            max_operand_stack_height,
        })
    }

    pub fn entry_offset(&self) -> u32 {
        self.entry_offset
    }

    pub fn on_local_decl_count(&mut self, count: u32) -> Result<()> {
        self.locals_expected = count;
        self.locals_declared = 0;
        Ok(())
    }

    pub fn on_local_decl(&mut self, env: &mut Environment, decl_index: u32, count: u32, value_type: ValueType) -> Result<()> {
        for _ in 0..count {
            self.param_and_local_types.push(value_type);
            self.type_stack.push(value_type);
        }
        self.locals_declared += 1;
        if self.locals_declared == self.locals_expected {
            let total_locals = (self.param_and_local_types.len() as u32) - self.signature.params().len() as u32;
            let mut writer = Writer::new(env.istream_buffer_mut());
            writer.append_op(Op::Alloca);
            writer.append_u32(total_locals);
            let func_frame = self.control.top_mut()?;
            func_frame.floor += total_locals;
        }
        let _ = decl_index;
        Ok(())
    }

    fn check_operand_stack_height(&self) -> Result<()> {
        if let Some(max) = self.max_operand_stack_height {
            if self.type_stack.len() > max {
                return Err(Error::resource("operand stack height exceeds configured maximum"));
            }
        }
        Ok(())
    }

    /// Emits the drop/keep sequence dropping everything above `floor + keep`
    /// down to `floor`, keeping the top `keep` values (§4.5).
    fn emit_drop_keep(&self, writer: &mut Writer<'_>, floor: u32, keep: u32) {
        let drop_count = self.type_stack.height_above(floor).saturating_sub(keep);
        if drop_count == 0 && keep == 0 {
            return;
        }
        if drop_count == 0 {
            return;
        }
        writer.append_op(Op::DropKeep);
        writer.append_u32(drop_count);
        writer.append_u8(keep as u8);
    }

    /// Shared tail of `br`/`br_if`/`return`-style branches: checks the
    /// target frame's signature against the stack top (unless Loop),
    /// emits drop/keep, emits `BR`, and records a fixup if the target
    /// offset is not yet known (§4.5 `br depth`).
    fn emit_branch(
        &mut self,
        env: &mut Environment,
        frame_index: u32,
    ) -> Result<()> {
        let frame = *self.control.frame_at(frame_index);
        let arity = frame.branch_arity();
        if frame.kind != FrameKind::Loop {
            if let Some(result_type) = frame.signature {
                self.type_stack.pop()?.check(result_type)?;
                self.type_stack.push(result_type);
            }
        }
        let mut writer = Writer::new(env.istream_buffer_mut());
        self.emit_drop_keep(&mut writer, frame.floor, arity);
        writer.append_op(Op::Br);
        match frame.offset {
            Some(target_offset) => {
                writer.append_u32(target_offset);
            }
            None => {
                let fixup_site = writer.append_placeholder_u32();
                drop(writer);
                self.control.add_depth_fixup(frame_index, fixup_site);
            }
        }
        Ok(())
    }

    pub fn on_opcode(
        &mut self,
        env: &mut Environment,
        func_fixups: &mut Vec<Vec<u32>>,
        sig_map: &IndexMap,
        func_map: &IndexMap,
        global_map: &IndexMap,
        has_table: bool,
        has_memory: bool,
        op: Operator,
    ) -> Result<()> {
        self.check_operand_stack_height()?;
        match op {
            Operator::Unreachable => {
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::Unreachable);
                drop(writer);
                let floor = self.control.top()?.floor;
                self.type_stack.mark_unreachable(floor);
            }
            Operator::Nop => {}
            Operator::I32Const(v) => {
                // Wasm opcode 0x41 (`i32.const`), emitted verbatim (§6).
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(0x41);
                writer.append_i32(v);
                drop(writer);
                self.type_stack.push(ValueType::I32);
            }
            Operator::I64Const(v) => {
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(0x42);
                writer.append_i64(v);
                drop(writer);
                self.type_stack.push(ValueType::I64);
            }
            Operator::F32Const(bits) => {
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(0x43);
                writer.append_u32(bits);
                drop(writer);
                self.type_stack.push(ValueType::F32);
            }
            Operator::F64Const(bits) => {
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(0x44);
                writer.append_u64(bits);
                drop(writer);
                self.type_stack.push(ValueType::F64);
            }
            Operator::Simple { wasm_opcode, params, result } => {
                for &p in params.iter().rev() {
                    self.type_stack.pop()?.check(p)?;
                }
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(wasm_opcode);
                drop(writer);
                if let Some(r) = result {
                    self.type_stack.push(r);
                }
            }
            Operator::GetLocal(index) => {
                let local_type = *self
                    .param_and_local_types
                    .get(index as usize)
                    .ok_or_else(|| Error::validation("local index out of range"))?;
                let depth = self.type_stack.len() - index;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::GetLocal);
                writer.append_u32(depth);
                drop(writer);
                self.type_stack.push(local_type);
            }
            Operator::SetLocal(index) => {
                let local_type = *self
                    .param_and_local_types
                    .get(index as usize)
                    .ok_or_else(|| Error::validation("local index out of range"))?;
                self.type_stack.pop()?.check(local_type)?;
                // depth is computed after the value has been popped, matching
                // the "depth-from-top at the operator's point of emission" rule.
                let depth = self.type_stack.len() - index;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::SetLocal);
                writer.append_u32(depth);
            }
            Operator::TeeLocal(index) => {
                let local_type = *self
                    .param_and_local_types
                    .get(index as usize)
                    .ok_or_else(|| Error::validation("local index out of range"))?;
                self.type_stack.pop()?.check(local_type)?;
                self.type_stack.push(local_type);
                let depth = self.type_stack.len() - 1 - index;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::TeeLocal);
                writer.append_u32(depth);
            }
            Operator::GetGlobal(index) => {
                let env_index = global_map.index_of(index);
                let global = env.global(env_index);
                let value_type = global.value_type();
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::GetGlobal);
                writer.append_u32(env_index);
                drop(writer);
                self.type_stack.push(value_type);
            }
            Operator::SetGlobal(index) => {
                let env_index = global_map.index_of(index);
                let global = env.global(env_index);
                if !global.is_mutable() {
                    return Err(Error::validation("cannot set an immutable global"));
                }
                let value_type = global.value_type();
                self.type_stack.pop()?.check(value_type)?;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::SetGlobal);
                writer.append_u32(env_index);
            }
            Operator::Drop => {
                self.type_stack.pop()?;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::Drop);
            }
            Operator::Select => {
                self.type_stack.pop()?.check(ValueType::I32)?;
                let b = self.type_stack.pop()?;
                let a = self.type_stack.pop()?;
                let result_type = match (a.value_type(), b.value_type()) {
                    (Some(t1), Some(t2)) if t1 == t2 => Some(t1),
                    (None, Some(t)) | (Some(t), None) => Some(t),
                    (None, None) => None,
                    (Some(t1), Some(t2)) => {
                        return Err(Error::validation(alloc::format!(
                            "select operand type mismatch: {} vs {}",
                            t1, t2
                        )))
                    }
                };
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_u8(0x1b); // Wasm opcode for `select`, verbatim (§6).
                drop(writer);
                match result_type {
                    Some(t) => self.type_stack.push(t),
                    None => self.type_stack.push_any(),
                }
            }
            Operator::Block(sig) => {
                let floor = self.type_stack.len();
                self.control.push(ControlFrame {
                    kind: FrameKind::Block,
                    signature: sig,
                    floor,
                    offset: None,
                    fixup_offset: None,
                });
            }
            Operator::Loop(sig) => {
                let floor = self.type_stack.len();
                let loop_offset = env.istream_len();
                self.control.push(ControlFrame {
                    kind: FrameKind::Loop,
                    signature: sig,
                    floor,
                    offset: Some(loop_offset),
                    fixup_offset: None,
                });
            }
            Operator::If(sig) => {
                self.type_stack.pop()?.check(ValueType::I32)?;
                let floor = self.type_stack.len();
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::BrUnless);
                let fixup_offset = writer.append_placeholder_u32();
                drop(writer);
                self.control.push(ControlFrame {
                    kind: FrameKind::If,
                    signature: sig,
                    floor,
                    offset: None,
                    fixup_offset: Some(fixup_offset),
                });
            }
            Operator::Else => {
                let frame = *self.control.top()?;
                if frame.kind != FrameKind::If {
                    return Err(Error::validation("`else` without matching `if`"));
                }
                let is_any_on_top = self.type_stack.nth_from_top(0).is_none() && self.type_stack.len() > frame.floor;
                if let Some(result_type) = frame.signature {
                    if !is_any_on_top {
                        self.type_stack.pop()?.check(result_type)?;
                    }
                } else if self.type_stack.height_above(frame.floor) != 0 && !is_any_on_top {
                    return Err(Error::validation("`if` true-arm left extra values on the stack"));
                }
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::Br);
                let skip_fixup = writer.append_placeholder_u32();
                let after_jump = writer.current_offset();
                writer.write_u32_at(
                    frame.fixup_offset.expect("if frame always carries a fixup_offset"),
                    after_jump,
                );
                drop(writer);
                self.type_stack.truncate_to(frame.floor);
                let top = self.control.top_mut()?;
                top.kind = FrameKind::Else;
                top.fixup_offset = Some(skip_fixup);
            }
            Operator::End => {
                let frame = *self.control.top()?;
                if frame.kind == FrameKind::Func {
                    return Err(Error::validation(
                        "`end` of the implicit function frame must go through end_function_body",
                    ));
                }
                self.finish_frame(env)?;
            }
            Operator::Br(depth) => {
                let frame_index = self.control.frame_index_for_branch_depth(depth)?;
                self.emit_branch(env, frame_index)?;
                let floor = self.control.top()?.floor;
                self.type_stack.mark_unreachable(floor);
            }
            Operator::BrIf(depth) => {
                self.type_stack.pop()?.check(ValueType::I32)?;
                let frame_index = self.control.frame_index_for_branch_depth(depth)?;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::BrUnless);
                let skip_fixup = writer.append_placeholder_u32();
                drop(writer);
                self.emit_branch(env, frame_index)?;
                let mut writer = Writer::new(env.istream_buffer_mut());
                let after = writer.current_offset();
                writer.write_u32_at(skip_fixup, after);
            }
            Operator::BrTable(depths, default_depth) => {
                self.type_stack.pop()?.check(ValueType::I32)?;
                let all_depths: Vec<u32> = depths.iter().copied().chain(core::iter::once(default_depth)).collect();
                let mut frame_indices = Vec::with_capacity(all_depths.len());
                for &d in &all_depths {
                    let fi = self.control.frame_index_for_branch_depth(d)?;
                    let frame = *self.control.frame_at(fi);
                    if frame.kind != FrameKind::Loop {
                        if let Some(result_type) = frame.signature {
                            let top = self.type_stack.nth_from_top(0);
                            if top.is_some() && top != Some(result_type) {
                                return Err(Error::validation("br_table target signature mismatch"));
                            }
                        }
                    }
                    frame_indices.push(fi);
                }
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::BrTable);
                writer.append_u32(all_depths.len() as u32 - 1);
                let table_offset_site = writer.append_placeholder_u32();
                writer.append_op(Op::Data);
                let entry_size: u32 = 4 + 4 + 1;
                writer.append_u32(all_depths.len() as u32 * entry_size);
                let table_start = writer.current_offset();
                writer.write_u32_at(table_offset_site, table_start);
                drop(writer);
                for &fi in &frame_indices {
                    let frame = *self.control.frame_at(fi);
                    let arity = frame.branch_arity();
                    let mut writer = Writer::new(env.istream_buffer_mut());
                    match frame.offset {
                        Some(target) => writer.append_u32(target),
                        None => {
                            let site = writer.append_placeholder_u32();
                            drop(writer);
                            self.control.add_depth_fixup(fi, site);
                            let mut writer = Writer::new(env.istream_buffer_mut());
                            writer.append_u32(self.type_stack.height_above(frame.floor).saturating_sub(arity));
                            writer.append_u8(arity as u8);
                            continue;
                        }
                    }
                    writer.append_u32(self.type_stack.height_above(frame.floor).saturating_sub(arity));
                    writer.append_u8(arity as u8);
                }
                let floor = self.control.top()?.floor;
                self.type_stack.mark_unreachable(floor);
            }
            Operator::Return => {
                let func_floor = self.func_frame_floor();
                let result_sig = self.signature.results().first().copied();
                if let Some(result_type) = result_sig {
                    self.type_stack.pop()?.check(result_type)?;
                    self.type_stack.push(result_type);
                }
                let arity = result_sig.is_some() as u32;
                let mut writer = Writer::new(env.istream_buffer_mut());
                self.emit_drop_keep(&mut writer, func_floor, arity);
                writer.append_op(Op::Return);
                drop(writer);
                self.type_stack.mark_unreachable(func_floor);
            }
            Operator::Call(func_index) => {
                let env_func_index = func_map.index_of(func_index);
                let function = env.function(env_func_index).clone();
                let sig = function.signature().clone();
                for &p in sig.params().iter().rev() {
                    self.type_stack.pop()?.check(p)?;
                }
                let mut writer = Writer::new(env.istream_buffer_mut());
                match &function {
                    crate::func::Function::Host { host_index, .. } => {
                        writer.append_op(Op::CallHost);
                        writer.append_u32(*host_index);
                    }
                    crate::func::Function::Defined { istream_offset, .. } => {
                        writer.append_op(Op::Call);
                        if *istream_offset == INVALID_OFFSET {
                            let site = writer.append_placeholder_u32();
                            drop(writer);
                            let callee_defined_index = func_map
                                .defined_index(func_index)
                                .expect("forward call must target a defined function");
                            func_fixups[callee_defined_index as usize].push(site);
                        } else {
                            writer.append_u32(*istream_offset);
                        }
                    }
                }
                for &r in sig.results() {
                    self.type_stack.push(r);
                }
                let _ = sig_map;
            }
            Operator::CallIndirect(sig_index) => {
                if !has_table {
                    return Err(Error::validation("call_indirect requires a table"));
                }
                self.type_stack.pop()?.check(ValueType::I32)?;
                let env_sig_index = sig_map.index_of(sig_index);
                let sig = env.signature(env_sig_index).clone();
                for &p in sig.params().iter().rev() {
                    self.type_stack.pop()?.check(p)?;
                }
                let table_index = 0u32;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::CallIndirect);
                writer.append_u32(table_index);
                writer.append_u32(env_sig_index);
                drop(writer);
                for &r in sig.results() {
                    self.type_stack.push(r);
                }
            }
            Operator::I32Load { align_log2, offset } => self.emit_load(env, has_memory, ValueType::I32, 32, 0x28, align_log2, offset)?,
            Operator::I64Load { align_log2, offset } => self.emit_load(env, has_memory, ValueType::I64, 64, 0x29, align_log2, offset)?,
            Operator::F32Load { align_log2, offset } => self.emit_load(env, has_memory, ValueType::F32, 32, 0x2a, align_log2, offset)?,
            Operator::F64Load { align_log2, offset } => self.emit_load(env, has_memory, ValueType::F64, 64, 0x2b, align_log2, offset)?,
            Operator::I32Store { align_log2, offset } => self.emit_store(env, has_memory, ValueType::I32, 32, 0x36, align_log2, offset)?,
            Operator::I64Store { align_log2, offset } => self.emit_store(env, has_memory, ValueType::I64, 64, 0x37, align_log2, offset)?,
            Operator::F32Store { align_log2, offset } => self.emit_store(env, has_memory, ValueType::F32, 32, 0x38, align_log2, offset)?,
            Operator::F64Store { align_log2, offset } => self.emit_store(env, has_memory, ValueType::F64, 64, 0x39, align_log2, offset)?,
            Operator::CurrentMemory => {
                if !has_memory {
                    return Err(Error::validation("current_memory requires a memory"));
                }
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::CurrentMemory);
                writer.append_u32(0);
                drop(writer);
                self.type_stack.push(ValueType::I32);
            }
            Operator::GrowMemory => {
                if !has_memory {
                    return Err(Error::validation("grow_memory requires a memory"));
                }
                self.type_stack.pop()?.check(ValueType::I32)?;
                let mut writer = Writer::new(env.istream_buffer_mut());
                writer.append_op(Op::GrowMemory);
                writer.append_u32(0);
                drop(writer);
                self.type_stack.push(ValueType::I32);
            }
        }
        Ok(())
    }

    fn func_frame_floor(&self) -> u32 {
        // Func frame always sits at stack index 0.
        self.control.frame_at(0).floor
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_load(
        &mut self,
        env: &mut Environment,
        has_memory: bool,
        value_type: ValueType,
        bit_width: u32,
        wasm_opcode: u8,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        if !has_memory {
            return Err(Error::validation("load requires a memory"));
        }
        if align_log2 >= 32 || (1u64 << align_log2) > (1u64 << natural_alignment_log2(value_type, bit_width)) {
            return Err(Error::validation("load alignment exceeds natural alignment"));
        }
        self.type_stack.pop()?.check(ValueType::I32)?;
        let mut writer = Writer::new(env.istream_buffer_mut());
        writer.append_u8(wasm_opcode);
        writer.append_u32(0);
        writer.append_u32(offset);
        drop(writer);
        self.type_stack.push(value_type);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_store(
        &mut self,
        env: &mut Environment,
        has_memory: bool,
        value_type: ValueType,
        bit_width: u32,
        wasm_opcode: u8,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        if !has_memory {
            return Err(Error::validation("store requires a memory"));
        }
        if align_log2 >= 32 || (1u64 << align_log2) > (1u64 << natural_alignment_log2(value_type, bit_width)) {
            return Err(Error::validation("store alignment exceeds natural alignment"));
        }
        self.type_stack.pop()?.check(value_type)?;
        self.type_stack.pop()?.check(ValueType::I32)?;
        let mut writer = Writer::new(env.istream_buffer_mut());
        writer.append_u8(wasm_opcode);
        writer.append_u32(0);
        writer.append_u32(offset);
        Ok(())
    }

    /// Shared tail of `end`/`else` frame closing: patches every pending
    /// depth-fixup for the frame to the current offset, resets the stack
    /// to the frame's floor, and pushes its declared result type (§4.5 `end`).
    fn finish_frame(&mut self, env: &mut Environment) -> Result<()> {
        let frame = *self.control.top()?;
        let is_any_on_top = self.type_stack.nth_from_top(0).is_none() && self.type_stack.len() > frame.floor;
        if let Some(result_type) = frame.signature {
            if !is_any_on_top {
                self.type_stack.pop()?.check(result_type)?;
                if self.type_stack.height_above(frame.floor) != 0 {
                    return Err(Error::validation("block left extra values on the stack"));
                }
            }
        } else if self.type_stack.height_above(frame.floor) != 0 && !is_any_on_top {
            return Err(Error::validation("block left extra values on the stack"));
        }

        if matches!(frame.kind, FrameKind::If | FrameKind::Else) {
            let current_offset = env.istream_len();
            let mut writer = Writer::new(env.istream_buffer_mut());
            writer.write_u32_at(
                frame.fixup_offset.expect("if/else frame always carries a fixup_offset"),
                current_offset,
            );
        }

        let (_, fixups) = self.control.pop()?;
        let current_offset = env.istream_len();
        let mut writer = Writer::new(env.istream_buffer_mut());
        for fixup_site in fixups {
            writer.write_u32_at(fixup_site, current_offset);
        }
        drop(writer);

        self.type_stack.truncate_to(frame.floor);
        if let Some(result_type) = frame.signature {
            self.type_stack.push(result_type);
        }
        Ok(())
    }

    /// `end_function_body` (§4.6).
    pub fn end_function(mut self, env: &mut Environment) -> Result<()> {
        let frame = *self.control.top()?;
        debug_assert_eq!(frame.kind, FrameKind::Func);

        let result_sig = self.signature.results().first().copied();
        let is_any_on_top = self.type_stack.nth_from_top(0).is_none() && self.type_stack.len() > frame.floor;
        if let Some(result_type) = result_sig {
            if is_any_on_top {
                self.type_stack.truncate_to(frame.floor);
                self.type_stack.push(result_type);
            } else {
                self.type_stack.pop()?.check(result_type)?;
                if self.type_stack.height_above(frame.floor) != 0 {
                    return Err(Error::validation("function body left extra values on the stack"));
                }
                self.type_stack.push(result_type);
            }
        } else if self.type_stack.height_above(frame.floor) != 0 && !is_any_on_top {
            return Err(Error::validation("function body left extra values on the stack"));
        }

        let (_, fixups) = self.control.pop()?;
        let current_offset = env.istream_len();
        {
            let mut writer = Writer::new(env.istream_buffer_mut());
            for fixup_site in fixups {
                writer.write_u32_at(fixup_site, current_offset);
            }
        }

        let arity = result_sig.is_some() as u32;
        let mut writer = Writer::new(env.istream_buffer_mut());
        self.emit_drop_keep(&mut writer, frame.floor, arity);
        writer.append_op(Op::Return);

        let _ = self.defined_index;
        Ok(())
    }
}
