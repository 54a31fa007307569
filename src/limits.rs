use core::fmt;

/// Minimum/maximum size pair shared by tables and memories.
///
/// Mirrors the `TableType`/`MemoryType` limit builders found elsewhere in
/// this crate family: a resizable range with an optional upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    initial: u32,
    maximum: Option<u32>,
}

/// An invalid resizable limit: `initial` exceeds `maximum`.
#[derive(Debug)]
#[non_exhaustive]
pub struct LimitsError;

impl fmt::Display for LimitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "initial limit exceeds maximum limit")
    }
}

impl Limits {
    /// Creates a new resizable limit.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `maximum` is `Some` and less than `initial`.
    pub fn new(initial: u32, maximum: Option<u32>) -> Result<Self, LimitsError> {
        if let Some(maximum) = maximum {
            if initial > maximum {
                return Err(LimitsError);
            }
        }
        Ok(Limits { initial, maximum })
    }

    pub fn initial(self) -> u32 {
        self.initial
    }

    pub fn maximum(self) -> Option<u32> {
        self.maximum
    }

    /// Whether `self`, as an *actual* resolved limit, satisfies a module's
    /// *declared* import limit (§4.2): the actual initial must be at least
    /// as large as declared, and if the declaration has a maximum, the
    /// actual must have one too and it must not exceed the declared one.
    pub fn is_compatible_with(self, declared: Limits) -> bool {
        if self.initial < declared.initial {
            return false;
        }
        match declared.maximum {
            None => true,
            Some(declared_max) => match self.maximum {
                None => false,
                Some(actual_max) => actual_max <= declared_max,
            },
        }
    }
}
