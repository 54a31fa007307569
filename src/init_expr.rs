use crate::env::Environment;
use crate::error::{Error, Result};
use crate::global::ConstValue;
use crate::index_map::IndexMap;
use crate::types::ValueType;

/// The single operator admitted into a constant initializer expression
/// (§4.3): one of the four `*.const` forms, or a read of an *imported,
/// immutable* global (defined globals cannot be referenced — they have no
/// value yet at the point their own siblings' initializers run, §9).
#[derive(Debug, Clone, Copy)]
pub enum InitExprOp {
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    GetGlobal(u32),
}

/// A minimal constant-folding evaluator producing one typed scalar from a
/// constrained initializer sequence, used for global initializers,
/// element-segment offsets, and data-segment offsets (§4.3).
///
/// Each init-expr admits exactly one producing operator (checked by the
/// caller via `on_import_<kind>`-style single-shot usage — this evaluator
/// itself just folds whatever single op it's given).
pub fn evaluate(
    env: &Environment,
    global_map: &IndexMap,
    op: InitExprOp,
) -> Result<ConstValue> {
    match op {
        InitExprOp::I32Const(v) => Ok(ConstValue::I32(v)),
        InitExprOp::I64Const(v) => Ok(ConstValue::I64(v)),
        InitExprOp::F32Const(bits) => Ok(ConstValue::F32Bits(bits)),
        InitExprOp::F64Const(bits) => Ok(ConstValue::F64Bits(bits)),
        InitExprOp::GetGlobal(module_local_index) => {
            if global_map.defined_index(module_local_index).is_some() {
                return Err(Error::validation(
                    "init expression may not reference a defined global",
                ));
            }
            let env_index = global_map.index_of(module_local_index);
            let global = env.global(env_index);
            if global.is_mutable() {
                return Err(Error::validation(
                    "init expression may not reference a mutable global",
                ));
            }
            Ok(global.value())
        }
    }
}

/// Checks the evaluated init-expr's type against the type the surrounding
/// context expects (global declaration type, or `i32` for segment
/// offsets), per §4.3's "type mismatches ... are reported as errors".
pub fn check_type(value: ConstValue, expected: ValueType) -> Result<()> {
    if value.value_type() == expected {
        Ok(())
    } else {
        Err(Error::validation(alloc::format!(
            "init expression type mismatch: expected {}, found {}",
            expected,
            value.value_type()
        )))
    }
}
