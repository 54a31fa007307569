//! Test-only module encoder and istream executor (§4.8, §8).
//!
//! Because the binary decoder is out of scope for the loader crate, these
//! tests drive `Loader` the same way a decoder would: by calling
//! `ModuleEvents` methods directly, in decoder order. Neither type here is
//! part of the crate's public surface.

pub mod executor;

pub use encoder::{FunctionBody, ModuleEncoder};
pub use executor::{execute, Trap, Value};

use wasmi_istream_loader::{Environment, HostModuleDelegate, HostModuleLookup, Loader, ReadConfig};

/// A `HostModuleLookup` with no registered delegates, for tests whose
/// modules only import from other already-loaded modules.
pub struct NoHost;

impl HostModuleLookup for NoHost {
    fn delegate_for(&mut self, _module_name: &str) -> Option<&mut dyn HostModuleDelegate> {
        None
    }
}

/// Loads `encoder`'s module into `env` under `name` using the default
/// `ReadConfig` and no host modules.
///
/// `finish` is always called, even when `emit` fails partway through, so
/// the environment is rolled back on any error (§3.1 `Mark`/`rollback_to`).
/// The more specific error `emit` stopped on (if any) is what's returned;
/// `finish`'s own failure message is only used when `emit` itself ran
/// to completion but the loader was still marked failed.
pub fn load(env: &mut Environment, name: &str, encoder: &ModuleEncoder) -> wasmi_istream_loader::Result<u32> {
    load_with(env, name, encoder, &mut NoHost, ReadConfig::new())
}

/// As [`load`], but with an explicit host-module lookup and `ReadConfig`.
pub fn load_with(
    env: &mut Environment,
    name: &str,
    encoder: &ModuleEncoder,
    host_lookup: &mut dyn HostModuleLookup,
    config: ReadConfig,
) -> wasmi_istream_loader::Result<u32> {
    let mut loader = Loader::new(env, host_lookup, config);
    let emit_result = encoder.emit(&mut loader);
    let finish_result = loader.finish(name);
    match emit_result {
        Err(e) => Err(e),
        Ok(()) => finish_result,
    }
}
