//! Primitive Wasm value types shared by every other module.
//!
//! Reference types and vector types are outside this crate's scope (see
//! the crate-level Non-goals): only the four MVP numeric types are needed
//! to validate and lower function bodies.

use core::fmt;

/// A Wasm operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}
