/// Load-time configuration knobs (§1.1, §3.1).
///
/// Threaded from the Loader Driver's public entry point down into the
/// Validator/Emitter coroutine and the Import Resolver. The defaults
/// reproduce the distilled spec's behavior exactly: no extra resource
/// guard, and an unresolvable host import is always a hard link error.
#[derive(Debug, Clone, Copy)]
pub struct ReadConfig {
    max_operand_stack_height: Option<u32>,
    unknown_host_import_is_fatal: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            max_operand_stack_height: None,
            unknown_host_import_is_fatal: true,
        }
    }
}

impl ReadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the validator's operand type stack height as a resource guard
    /// against pathological input. `None` (the default) means unbounded.
    pub fn with_max_operand_stack_height(mut self, max: u32) -> Self {
        self.max_operand_stack_height = Some(max);
        self
    }

    pub fn max_operand_stack_height(&self) -> Option<u32> {
        self.max_operand_stack_height
    }

    /// When `false`, an import targeting a host module that the delegate
    /// declines to resolve is silently skipped rather than aborting the
    /// load. Defaults to `true` (hard error), matching §4.2.
    pub fn with_unknown_host_import_is_fatal(mut self, fatal: bool) -> Self {
        self.unknown_host_import_is_fatal = fatal;
        self
    }

    pub fn unknown_host_import_is_fatal(&self) -> bool {
        self.unknown_host_import_is_fatal
    }
}
