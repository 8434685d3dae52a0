//! Lock-guarded pool for callers on several threads.
//!
//! The pool itself is single-writer: growing a child table rewrites a node in
//! place. [`SharedStringPool`] serialises writers behind a `parking_lot`
//! read-write lock while letting readers resolve concurrently.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::{ByteCodec, PercentCodec};
use crate::error::Result;
use crate::pool::{Handle, PoolStats, StringPool};
use crate::Config;

/// Cloneable handle to a pool shared between threads.
pub struct SharedStringPool<C = PercentCodec> {
    inner: Arc<RwLock<StringPool<C>>>,
}

impl SharedStringPool<PercentCodec> {
    pub fn new(segment_size: usize) -> Self {
        Self::from_pool(StringPool::new(segment_size))
    }

    pub fn with_config(config: Config) -> Result<Self> {
        StringPool::with_config(config).map(Self::from_pool)
    }
}

impl<C: ByteCodec> SharedStringPool<C> {
    pub fn from_pool(pool: StringPool<C>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(pool)),
        }
    }

    pub fn insert(&self, text: &str) -> Result<Handle> {
        // Already interned strings only need the read lock.
        if let Some(handle) = self.inner.read().lookup(text)? {
            return Ok(handle);
        }
        self.inner.write().insert(text)
    }

    pub fn lookup(&self, text: &str) -> Result<Option<Handle>> {
        self.inner.read().lookup(text)
    }

    pub fn resolve(&self, handle: Handle) -> Result<String> {
        self.inner.read().resolve(handle)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.read().stats()
    }
}

impl<C> Clone for SharedStringPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SharedStringPool<PercentCodec> {
    fn default() -> Self {
        Self::from_pool(StringPool::default())
    }
}
