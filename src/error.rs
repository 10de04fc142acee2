//! Crate-wide error type.
//!
//! Every fallible public operation returns `anyhow::Result<T>`, matching the
//! rest of this crate's surface; [`MrError`] is the concrete value carried
//! inside that `anyhow::Error` so callers (and tests) can match on the
//! failure category when they need to.

use std::fmt;

/// The three failure categories a [`crate::driver::MapReduce`] run can produce.
///
/// `count == 0` is explicitly *not* an error here: an empty input completes
/// with an empty result and is represented as `Ok(vec![])`.
#[derive(Debug)]
pub enum MrError {
    /// Pool, lock, or per-lane buffer allocation failed.
    ResourceExhausted { detail: String },
    /// A programming bug: more than a 2-way sorted merge requested, a stale
    /// write-view committed twice, or a combiner API misused.
    InvariantViolation { detail: String },
    /// A user-supplied map/reduce/splitter/locator callback returned an
    /// error; the original error chain is preserved.
    UserCode(anyhow::Error),
}

impl fmt::Display for MrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MrError::ResourceExhausted { detail } => {
                write!(f, "resource exhausted: {detail}")
            }
            MrError::InvariantViolation { detail } => {
                write!(f, "invariant violation: {detail}")
            }
            MrError::UserCode(e) => write!(f, "user code failed: {e}"),
        }
    }
}

impl std::error::Error for MrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MrError::UserCode(e) => Some(e.root_cause()),
            _ => None,
        }
    }
}

impl MrError {
    pub fn resource_exhausted(detail: impl Into<String>) -> Self {
        MrError::ResourceExhausted { detail: detail.into() }
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        MrError::InvariantViolation { detail: detail.into() }
    }

    pub fn user_code(e: anyhow::Error) -> Self {
        MrError::UserCode(e)
    }
}
