//! Error types for the string pool.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors returned by pool and arena operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The arena cannot grow far enough to satisfy an allocation.
    #[error(
        "arena exhausted: requested {requested} bytes with {reserved} bytes reserved (limit {limit})"
    )]
    ResourceExhausted {
        /// Bytes asked for.
        requested: usize,
        /// Address space already covered by segments.
        reserved: u64,
        /// Configured address space limit.
        limit: u64,
    },

    /// A handle that this pool never returned.
    #[error("invalid handle {handle:#x}: {reason}")]
    InvalidHandle {
        /// The raw handle value.
        handle: u32,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The codec produced a byte outside the trie's 7-bit alphabet.
    #[error("codec produced byte {byte:#04x} at position {position}, outside the 7-bit alphabet")]
    NonAsciiByte {
        /// Offending byte.
        byte: u8,
        /// Its index in the encoded sequence.
        position: usize,
    },

    /// Stored bytes could not be decoded back to text.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
