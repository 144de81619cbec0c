//! Error types.

use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A hex string had the wrong length or a non-hex character.
    InvalidHex,
    /// A coordinate was empty or used where its layer does not exist.
    InvalidCoordinate,
    /// The layer state machine saw a combination it cannot classify.
    ProtocolInvariantViolation(String),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidHex => write!(f, "invalid hex encoding"),
            KernelError::InvalidCoordinate => write!(f, "invalid coordinate"),
            KernelError::ProtocolInvariantViolation(msg) => {
                write!(f, "protocol invariant violation: {}", msg)
            }
        }
    }
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
pub type Result<T> = KernelResult<T>;
