//! # kvcache
//!
//! In-memory key-value cache bounded by total bytes, with LRU eviction.
//!
//! ## Architecture
//! - **Arena**: entries in slots addressed by handles
//! - **LRU List**: doubly-linked list of handles for O(1) reordering and eviction
//! - **HashMap**: AHash index from key to handle for O(1) lookups
//! - **Guarded**: one exclusive lock around a store for concurrent callers
//!
//! ```
//! use kvcache::{LruStore, Storage};
//!
//! let mut store = LruStore::new(10);
//! assert!(store.put(b"a", b"aaaa"));
//! assert!(store.put(b"b", b"bbbb"));
//! // Full: admitting "c" evicts the least recently used entry
//! assert!(store.put(b"c", b"c"));
//! assert_eq!(store.get(b"a"), None);
//! assert_eq!(store.get(b"b"), Some(b"bbbb".to_vec()));
//! ```

#![warn(missing_docs)]

mod budget;
mod error;
mod guarded;
mod lru;
mod storage;


pub use error::{Error, Result};
pub use guarded::Guarded;
pub use lru::{Keys, LruStore, DEFAULT_MAX_SIZE};
pub use storage::{SharedStorage, Storage};
