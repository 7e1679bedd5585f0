//! Error types for kvcache
//!
//! Storage operations report expected outcomes (too large, not found, already
//! present) through their return values. The errors here only describe broken
//! internal state, as found by [`LruStore::check_invariants`](crate::LruStore::check_invariants).

use std::fmt;

/// Result type alias for kvcache consistency checks
pub type Result<T> = std::result::Result<T, Error>;

/// Internal consistency violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Tracked size differs from the bytes actually held
    SizeMismatch {
        /// Value held by the size budget
        tracked: usize,
        /// Sum of key and value lengths over live entries
        actual: usize,
    },

    /// Tracked size is above the configured maximum
    OverBudget {
        /// Current size in bytes
        current: usize,
        /// Maximum size in bytes
        max: usize,
    },

    /// Index and recency chain disagree about the live entries
    IndexMismatch {
        /// Number of keys in the index
        indexed: usize,
        /// Number of entries reachable along the chain
        chained: usize,
    },

    /// A prev/next link, head or tail pointer is inconsistent
    BrokenChain(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SizeMismatch { tracked, actual } => {
                write!(f, "Size mismatch: tracked {} bytes, holding {} bytes", tracked, actual)
            }
            Error::OverBudget { current, max } => {
                write!(f, "Over budget: {} bytes used (max {} bytes)", current, max)
            }
            Error::IndexMismatch { indexed, chained } => {
                write!(f, "Index mismatch: {} indexed, {} in chain", indexed, chained)
            }
            Error::BrokenChain(msg) => write!(f, "Broken chain: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
