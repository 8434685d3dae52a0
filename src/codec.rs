//! Reversible mapping between text and the trie's 7-bit alphabet.
//!
//! The trie only stores bytes `0..=127`. A [`ByteCodec`] turns arbitrary text
//! into such a byte sequence and back again. [`PercentCodec`] is the default:
//! it percent-escapes every non-ASCII byte of the UTF-8 encoding, plus `%`
//! itself and ASCII control characters.

use std::borrow::Cow;

use percent_encoding::{percent_decode, percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Failure to turn stored bytes back into text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("stored bytes do not decode to text: {reason}")]
pub struct CodecError {
    reason: String,
}

impl CodecError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A pair of mutually inverse functions between text and 7-bit bytes.
///
/// Implementations must satisfy `decode(&encode(x)) == Ok(x)` for every `x`,
/// and `encode` must only produce bytes in `0..=127`.
pub trait ByteCodec {
    fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]>;

    fn decode(&self, bytes: &[u8]) -> Result<String, CodecError>;
}

/// Bytes escaped on top of the non-ASCII range, which is always escaped.
const ESCAPED: &AsciiSet = &CONTROLS.add(b'%');

/// Percent-style escaping of non-ASCII text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentCodec;

impl ByteCodec for PercentCodec {
    fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match Cow::<str>::from(percent_encode(text.as_bytes(), ESCAPED)) {
            Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
            Cow::Owned(s) => Cow::Owned(s.into_bytes()),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CodecError> {
        percent_decode(bytes)
            .decode_utf8()
            .map(Cow::into_owned)
            .map_err(|e| CodecError::new(e.to_string()))
    }
}
