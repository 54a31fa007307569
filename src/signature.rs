use crate::types::ValueType;
use alloc::vec::Vec;

/// Signature of a function: an ordered list of parameter types and an
/// ordered list of result types.
///
/// Current Wasm constrains result arity to 0 or 1, but this type keeps
/// `results` as a `Vec` rather than an `Option<ValueType>` so the rest of
/// the crate (signature equality checks, the emitter's push-result-types
/// step) does not need to special-case the arity; the constraint is
/// enforced once, at decode time, by whoever builds a `Signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ValueType>,
    results: Vec<ValueType>,
}

impl Signature {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Signature { params, results }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn results(&self) -> &[ValueType] {
        &self.results
    }
}
