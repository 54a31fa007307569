use alloc::string::String;
use core::fmt;

/// The crate's single root error type.
///
/// Every fallible operation in the loader returns one of these four kinds
/// (§7). There is deliberately no nested `Box<dyn std::error::Error>`
/// source chain: every message is already self-contained, the way
/// `validation::Error` in this crate family wraps a single `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Reported by the decoder; the loader only relays it (§7).
    Malformed(String),
    /// Unknown import module/field, kind mismatch, signature mismatch,
    /// limits incompatibility, duplicate export (§7).
    Link(String),
    /// Operand-stack underflow, type mismatch, invalid index, misplaced
    /// control operator, and the other structural checks of §4.4/§4.5.
    Validation(String),
    /// Allocation failure while growing the environment.
    ///
    /// This crate's `Environment` is `Vec`-backed and never produces this
    /// variant itself; it exists so an allocator-aware environment can be
    /// swapped in later without an API break (§7, open question).
    Resource(String),
}

impl Error {
    pub fn malformed<M: Into<String>>(message: M) -> Self {
        Error::Malformed(message.into())
    }

    pub fn link<M: Into<String>>(message: M) -> Self {
        Error::Link(message.into())
    }

    pub fn validation<M: Into<String>>(message: M) -> Self {
        Error::Validation(message.into())
    }

    pub fn resource<M: Into<String>>(message: M) -> Self {
        Error::Resource(message.into())
    }

    /// The message carried by this error, regardless of kind.
    pub fn message(&self) -> &str {
        match self {
            Error::Malformed(m) | Error::Link(m) | Error::Validation(m) | Error::Resource(m) => m,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Error::Malformed(_) => "malformed module",
            Error::Link(_) => "link error",
            Error::Validation(_) => "validation error",
            Error::Resource(_) => "resource error",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Shorthand used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
