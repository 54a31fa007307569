//! A streaming WebAssembly module loader.
//!
//! Given a sequence of decoder callbacks (§6 `ModuleEvents`) describing one
//! Wasm binary module, this crate validates every function body and
//! compiles it, in the same pass, into a flat "istream" bytecode an
//! in-process interpreter can execute. It also resolves the module's
//! imports against an ambient [`Environment`] of previously loaded modules
//! and host-provided bindings.
//!
//! The binary decoder itself and the runtime interpreter that executes the
//! istream are out of scope: this crate only specifies the event interface
//! the former must drive it through, and the opcode ABI the latter must
//! understand.
//!
//! On any error the [`Environment`] is rolled back to the mark taken when
//! the load began, so a failed load never leaves partial state behind.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::len_without_is_empty)]

#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

mod config;
mod env;
mod error;
mod events;
mod func;
mod global;
mod host;
mod index_map;
mod init_expr;
mod istream;
mod limits;
mod loader;
mod memory;
mod module;
mod signature;
mod table;
mod translator;
mod types;
mod validator;

pub use config::ReadConfig;
pub use env::{Environment, Mark};
pub use error::{Error, Result};
pub use events::{ExternKindTag, ModuleEvents, Operator};
pub use func::Function;
pub use global::{ConstValue, Global};
pub use host::{HostError, HostModuleDelegate, ImportSite};
pub use index_map::IndexMap;
pub use limits::{Limits, LimitsError};
pub use loader::{HostModuleLookup, Loader};
pub use memory::{Memory, PAGE_SIZE_BYTES};
pub use module::{Export, ExportIndex, ExternKind, Import, Module};
pub use signature::Signature;
pub use table::Table;
pub use types::ValueType;

/// WebAssembly-specific sizes and units, re-exported from `memory_units`.
pub mod memory_units {
    pub use memory_units::wasm32::*;
    pub use memory_units::{size_of, ByteSize, Bytes, RoundUpTo};
}
