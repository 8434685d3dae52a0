//! # trie-pool
//!
//! String interning on a sorted-children trie that lives entirely inside a
//! segmented byte arena. Nodes and child tables are addressed by 32-bit
//! offsets instead of references, so the whole structure is a handful of
//! large buffers.
//!
//! ## Example
//!
//! ```rust
//! use trie_pool::StringPool;
//!
//! let mut pool = StringPool::new(4096);
//! let a = pool.insert("a").unwrap();
//! let ab = pool.insert("ab").unwrap();
//!
//! assert_ne!(a, ab);
//! assert_eq!(pool.insert("a").unwrap(), a);
//! assert_eq!(pool.resolve(ab).unwrap(), "ab");
//! assert_eq!(pool.lookup("b").unwrap(), None);
//! ```
//!
//! ## Layers
//!
//! - [`arena`]: segmented bump allocator with virtual pointers
//! - [`layout`]: declarative struct and list shapes over byte ranges
//! - [`pool`]: the trie itself
//! - [`codec`]: text to 7-bit byte mapping used by the trie
//! - [`sync`]: lock-guarded wrapper for shared use

#![forbid(unsafe_code)]

pub mod arena;
pub mod codec;
pub mod error;
pub mod layout;
pub mod pool;
pub mod sync;

pub use arena::{ArenaStats, Ptr, SegmentedArena};
pub use codec::{ByteCodec, CodecError, PercentCodec};
pub use error::{Error, Result};
pub use pool::{Handle, Handles, PoolStats, StringPool};
pub use sync::SharedStringPool;

/// Default segment capacity in bytes.
pub const DEFAULT_SEGMENT_SIZE: usize = 4096;

/// Default number of recent segments scanned for free space.
pub const DEFAULT_RECYCLE_WINDOW: usize = 4;

/// Configuration for a [`StringPool`] and its arena.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each new segment. Larger allocations get a segment of
    /// their own size.
    pub segment_size: usize,
    /// How many of the most recent segments an allocation may reuse.
    pub recycle_window: usize,
    /// Upper bound on the arena's address space. Clamped to 4 GiB.
    pub max_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            recycle_window: DEFAULT_RECYCLE_WINDOW,
            max_bytes: arena::ADDRESS_SPACE,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    #[must_use]
    pub fn with_recycle_window(mut self, recycle_window: usize) -> Self {
        self.recycle_window = recycle_window;
        self
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}


#[cfg(test)]
mod proptests;
