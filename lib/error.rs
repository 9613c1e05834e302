//! Coarse error categories shared by every error type in the crate.

use std::fmt;

/// Broad category of a failure, reported by each module's error type through
/// its `kind` method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed shapes, unknown gate names, out-of-range indices, or bad
    /// configuration values.
    InvalidArgument,
    /// The generated Clifford table is not exactly 24 distinct elements in
    /// canonical order.
    Consistency,
    /// A matrix that had to be inverted exactly is singular.
    Numerical,
    /// A row total was not positive during negative-count repair.
    InvariantViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Consistency => write!(f, "consistency error"),
            Self::Numerical => write!(f, "numerical error"),
            Self::InvariantViolation => write!(f, "invariant violation"),
        }
    }
}
