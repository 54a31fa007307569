//! A tiny istream interpreter, used only to assert concrete results in
//! round-trip tests (§4.8, §8). Understands exactly the opcode bytes the
//! translator emits: the control/stack-shaping primitives in
//! `crate::istream::Op` (re-declared here as raw byte constants, since that
//! enum is private) plus the verbatim Wasm opcodes used for constants,
//! `select`, loads/stores, and a handful of `i32` arithmetic/comparison
//! operators. It is not a general Wasm interpreter and traps on anything
//! else.

use wasmi_istream_loader::{ConstValue, Environment, Function, PAGE_SIZE_BYTES};

// `Op` tags (§6), duplicated here since `istream::Op` is crate-private.
const OP_BR: u8 = 0x00;
const OP_BR_UNLESS: u8 = 0x01;
const OP_BR_TABLE: u8 = 0x02;
const OP_RETURN: u8 = 0x03;
const OP_UNREACHABLE: u8 = 0x04;
const OP_DROP: u8 = 0x05;
const OP_DROP_KEEP: u8 = 0x06;
const OP_ALLOCA: u8 = 0x07;
const OP_CALL: u8 = 0x08;
const OP_CALL_HOST: u8 = 0x09;
const OP_CALL_INDIRECT: u8 = 0x0a;
const OP_GET_LOCAL: u8 = 0x0b;
const OP_SET_LOCAL: u8 = 0x0c;
const OP_TEE_LOCAL: u8 = 0x0d;
const OP_GET_GLOBAL: u8 = 0x0e;
const OP_SET_GLOBAL: u8 = 0x0f;
const OP_GROW_MEMORY: u8 = 0x12;
const OP_CURRENT_MEMORY: u8 = 0x13;

// Verbatim Wasm opcodes this executor understands.
const WASM_I32_LOAD: u8 = 0x28;
const WASM_I32_STORE: u8 = 0x36;
const WASM_I32_CONST: u8 = 0x41;
const WASM_I64_CONST: u8 = 0x42;
const WASM_I32_EQZ: u8 = 0x45;
const WASM_I32_EQ: u8 = 0x46;
const WASM_I32_NE: u8 = 0x47;
const WASM_I32_LT_S: u8 = 0x48;
const WASM_I32_GT_S: u8 = 0x4a;
const WASM_I32_LE_S: u8 = 0x4c;
const WASM_I32_GE_S: u8 = 0x4e;
const WASM_I32_ADD: u8 = 0x6a;
const WASM_I32_SUB: u8 = 0x6b;
const WASM_I32_MUL: u8 = 0x6c;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
}

impl Value {
    fn as_i32(self) -> i32 {
        match self {
            Value::I32(v) => v,
            Value::I64(v) => v as i32,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Trap {
    Unreachable,
    UndefinedElement,
    IndirectCallSignatureMismatch,
    MemoryAccessOutOfBounds,
}

struct Frame {
    stack: Vec<Value>,
    istream_pos: u32,
}

fn read_u32(bytes: &[u8], pos: &mut u32) -> u32 {
    let p = *pos as usize;
    let v = u32::from_le_bytes([bytes[p], bytes[p + 1], bytes[p + 2], bytes[p + 3]]);
    *pos += 4;
    v
}

fn read_i32(bytes: &[u8], pos: &mut u32) -> i32 {
    read_u32(bytes, pos) as i32
}

fn read_i64(bytes: &[u8], pos: &mut u32) -> i64 {
    let p = *pos as usize;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[p..p + 8]);
    *pos += 8;
    i64::from_le_bytes(buf)
}

fn read_u8(bytes: &[u8], pos: &mut u32) -> u8 {
    let v = bytes[*pos as usize];
    *pos += 1;
    v
}

/// Drops `drop_count` values just below the top `keep` values (§4.5 `DropKeep`).
fn apply_drop_keep(stack: &mut Vec<Value>, drop_count: usize, keep: usize) {
    if drop_count == 0 {
        return;
    }
    let len = stack.len();
    let kept: Vec<Value> = stack[len - keep..].to_vec();
    stack.truncate(len - keep - drop_count);
    stack.extend(kept);
}

/// Runs the function whose compiled code starts at `entry_offset`, with
/// `args` already typed to its signature. Executes until that function's
/// own `Op::Return`, resolving nested `Call`/`CallIndirect` by re-entering
/// this same loop.
pub fn execute(env: &mut Environment, entry_offset: u32, args: Vec<Value>) -> Result<Vec<Value>, Trap> {
    let istream = env.istream_bytes().to_vec();
    run(env, &istream, entry_offset, args)
}

/// `(param_count, result_count)` for the defined function whose code starts
/// at `istream_offset`, found by a linear scan of the environment's
/// function entries (there is no offset-indexed lookup in the public API;
/// this executor is test-only and never runs on a hot path).
fn function_arity(env: &Environment, istream_offset: u32) -> (u32, u32) {
    for i in 0..env.function_count() {
        if let Function::Defined { signature, istream_offset: off } = env.function(i) {
            if *off == istream_offset {
                return (signature.params().len() as u32, signature.results().len() as u32);
            }
        }
    }
    unreachable!("no defined function at istream offset {}", istream_offset)
}

fn run(env: &mut Environment, istream: &[u8], entry_offset: u32, args: Vec<Value>) -> Result<Vec<Value>, Trap> {
    let (_, result_count) = function_arity(env, entry_offset);
    let mut frame = Frame { stack: args, istream_pos: entry_offset };

    loop {
        let opcode = read_u8(istream, &mut frame.istream_pos);
        match opcode {
            OP_ALLOCA => {
                let total_locals = read_u32(istream, &mut frame.istream_pos);
                for _ in 0..total_locals {
                    frame.stack.push(Value::I32(0));
                }
            }
            OP_DROP => {
                frame.stack.pop();
            }
            OP_DROP_KEEP => {
                let drop_count = read_u32(istream, &mut frame.istream_pos);
                let keep = read_u8(istream, &mut frame.istream_pos) as usize;
                apply_drop_keep(&mut frame.stack, drop_count as usize, keep);
            }
            OP_GET_LOCAL => {
                let depth = read_u32(istream, &mut frame.istream_pos) as usize;
                let absolute = frame.stack.len() - depth;
                frame.stack.push(frame.stack[absolute]);
            }
            OP_SET_LOCAL => {
                let depth = read_u32(istream, &mut frame.istream_pos) as usize;
                let v = frame.stack.pop().expect("set_local: empty stack");
                let absolute = frame.stack.len() - depth;
                frame.stack[absolute] = v;
            }
            OP_TEE_LOCAL => {
                let depth = read_u32(istream, &mut frame.istream_pos) as usize;
                let v = *frame.stack.last().expect("tee_local: empty stack");
                let absolute = frame.stack.len() - 1 - depth;
                frame.stack[absolute] = v;
            }
            OP_GET_GLOBAL => {
                let env_index = read_u32(istream, &mut frame.istream_pos);
                frame.stack.push(const_value_to_value(env.global(env_index).value()));
            }
            OP_SET_GLOBAL => {
                let env_index = read_u32(istream, &mut frame.istream_pos);
                let v = frame.stack.pop().expect("set_global: empty stack");
                env.global_mut(env_index).set_value(value_to_const_value(v));
            }
            OP_BR => {
                let target = read_u32(istream, &mut frame.istream_pos);
                frame.istream_pos = target;
            }
            OP_BR_UNLESS => {
                let target = read_u32(istream, &mut frame.istream_pos);
                let cond = frame.stack.pop().expect("br_unless: empty stack").as_i32();
                if cond == 0 {
                    frame.istream_pos = target;
                }
            }
            OP_BR_TABLE => {
                let max_index = read_u32(istream, &mut frame.istream_pos);
                let _table_start = read_u32(istream, &mut frame.istream_pos);
                // Skip the inline `Op::Data` header the emitter wrote; what
                // follows it is the branch table's first entry.
                let _data_tag = read_u8(istream, &mut frame.istream_pos);
                let _data_len = read_u32(istream, &mut frame.istream_pos);
                let entries_start = frame.istream_pos;
                let selector = frame.stack.pop().expect("br_table: empty stack").as_i32() as u32;
                let index = selector.min(max_index);
                let entry_size = 4 + 4 + 1;
                let mut entry_pos = entries_start + index * entry_size;
                let target = read_u32(istream, &mut entry_pos);
                let drop_count = read_u32(istream, &mut entry_pos);
                let keep = read_u8(istream, &mut entry_pos) as usize;
                apply_drop_keep(&mut frame.stack, drop_count as usize, keep);
                frame.istream_pos = target;
            }
            OP_RETURN => {
                let len = frame.stack.len();
                return Ok(frame.stack.split_off(len - result_count as usize));
            }
            OP_UNREACHABLE => return Err(Trap::Unreachable),
            OP_CALL => {
                let target = read_u32(istream, &mut frame.istream_pos);
                let (param_count, _) = function_arity(env, target);
                let param_count = param_count as usize;
                let len = frame.stack.len();
                let call_args = frame.stack.split_off(len - param_count);
                let results = run(env, istream, target, call_args)?;
                frame.stack.extend(results);
            }
            OP_CALL_HOST => {
                let _host_index = read_u32(istream, &mut frame.istream_pos);
                unimplemented!("host calls are not exercised by this executor");
            }
            OP_CALL_INDIRECT => {
                let table_index = read_u32(istream, &mut frame.istream_pos);
                let env_sig_index = read_u32(istream, &mut frame.istream_pos);
                let elem_index = frame.stack.pop().expect("call_indirect: empty stack").as_i32() as u32;
                let env_func_index = env.table(table_index).get(elem_index).ok_or(Trap::UndefinedElement)?;
                let function = env.function(env_func_index).clone();
                let expected = env.signature(env_sig_index);
                if function.signature() != expected {
                    return Err(Trap::IndirectCallSignatureMismatch);
                }
                let param_count = function.signature().params().len();
                let len = frame.stack.len();
                let call_args = frame.stack.split_off(len - param_count);
                let target = match function {
                    Function::Defined { istream_offset, .. } => istream_offset,
                    Function::Host { .. } => unimplemented!("host calls are not exercised by this executor"),
                };
                let results = run(env, istream, target, call_args)?;
                frame.stack.extend(results);
            }
            WASM_I32_LOAD => {
                let _mem_idx = read_u32(istream, &mut frame.istream_pos);
                let offset = read_u32(istream, &mut frame.istream_pos);
                let addr = frame.stack.pop().expect("i32.load: empty stack").as_i32() as u32;
                let memory = env.memory(0);
                let start = (addr + offset) as usize;
                let bytes = memory.bytes().get(start..start + 4).ok_or(Trap::MemoryAccessOutOfBounds)?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                frame.stack.push(Value::I32(i32::from_le_bytes(buf)));
            }
            WASM_I32_STORE => {
                let _mem_idx = read_u32(istream, &mut frame.istream_pos);
                let offset = read_u32(istream, &mut frame.istream_pos);
                let v = frame.stack.pop().expect("i32.store: empty stack").as_i32();
                let addr = frame.stack.pop().expect("i32.store: empty stack").as_i32() as u32;
                let memory = env.memory_mut(0);
                let start = (addr + offset) as usize;
                let slot = memory.bytes_mut().get_mut(start..start + 4).ok_or(Trap::MemoryAccessOutOfBounds)?;
                slot.copy_from_slice(&v.to_le_bytes());
            }
            OP_GROW_MEMORY => {
                let _mem_idx = read_u32(istream, &mut frame.istream_pos);
                frame.stack.pop();
                frame.stack.push(Value::I32(-1));
            }
            OP_CURRENT_MEMORY => {
                let _mem_idx = read_u32(istream, &mut frame.istream_pos);
                let pages = env.memory(0).size_bytes() / PAGE_SIZE_BYTES;
                frame.stack.push(Value::I32(pages as i32));
            }
            WASM_I32_CONST => {
                let v = read_i32(istream, &mut frame.istream_pos);
                frame.stack.push(Value::I32(v));
            }
            WASM_I64_CONST => {
                let v = read_i64(istream, &mut frame.istream_pos);
                frame.stack.push(Value::I64(v));
            }
            WASM_I32_EQZ => {
                let a = frame.stack.pop().expect("i32.eqz: empty stack").as_i32();
                frame.stack.push(Value::I32((a == 0) as i32));
            }
            WASM_I32_EQ | WASM_I32_NE | WASM_I32_LT_S | WASM_I32_GT_S | WASM_I32_LE_S | WASM_I32_GE_S => {
                let b = frame.stack.pop().expect("i32 compare: empty stack").as_i32();
                let a = frame.stack.pop().expect("i32 compare: empty stack").as_i32();
                let result = match opcode {
                    WASM_I32_EQ => a == b,
                    WASM_I32_NE => a != b,
                    WASM_I32_LT_S => a < b,
                    WASM_I32_GT_S => a > b,
                    WASM_I32_LE_S => a <= b,
                    WASM_I32_GE_S => a >= b,
                    _ => unreachable!(),
                };
                frame.stack.push(Value::I32(result as i32));
            }
            WASM_I32_ADD | WASM_I32_SUB | WASM_I32_MUL => {
                let b = frame.stack.pop().expect("i32 arith: empty stack").as_i32();
                let a = frame.stack.pop().expect("i32 arith: empty stack").as_i32();
                let result = match opcode {
                    WASM_I32_ADD => a.wrapping_add(b),
                    WASM_I32_SUB => a.wrapping_sub(b),
                    WASM_I32_MUL => a.wrapping_mul(b),
                    _ => unreachable!(),
                };
                frame.stack.push(Value::I32(result));
            }
            other => unimplemented!("opcode 0x{:02x} not supported by the test executor", other),
        }
    }
}

fn const_value_to_value(value: ConstValue) -> Value {
    match value {
        ConstValue::I32(v) => Value::I32(v),
        ConstValue::I64(v) => Value::I64(v),
        ConstValue::F32Bits(bits) => Value::I32(bits as i32),
        ConstValue::F64Bits(bits) => Value::I64(bits as i64),
    }
}

fn value_to_const_value(value: Value) -> ConstValue {
    match value {
        Value::I32(v) => ConstValue::I32(v),
        Value::I64(v) => ConstValue::I64(v),
    }
}
