//! The error surface of the public API.
//!
//! Only genuinely recoverable outcomes live here. A tree-invariant
//! violation (an unresolvable page id, an internal page with no
//! children, a corrupted header) is a bug, not an error condition, and
//! is reported by panicking at the point of detection rather than by
//! threading a `Result` through every call site.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("key not found")]
    KeyNotFound,

    #[error("key already exists")]
    KeyDuplicate,

    /// Reserved: every page in this engine is backed by process memory, so
    /// there is no capacity limit below what the host can allocate. Kept
    /// in the enum for API completeness with systems that do enforce one.
    #[error("out of space")]
    OutOfSpace,
}

pub type IndexResult<T> = Result<T, IndexError>;
