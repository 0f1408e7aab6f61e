use crate::chunk::ChunkTag;
use thiserror::Error;

/// Errors produced while decoding a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// A read needed more bytes than remained.
    #[error("truncated {what}: need {wanted} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        /// The structure being decoded.
        what: &'static str,
        /// Byte offset of the failed read, relative to the structure.
        offset: usize,
        /// Bytes the read needed.
        wanted: usize,
        /// Bytes that were left.
        remaining: usize,
    },
    /// A chunk tag occurred more than once.
    #[error("chunk {tag} appears more than once")]
    DuplicateChunk {
        /// The repeated tag.
        tag: ChunkTag,
    },
    /// A required chunk was not present.
    #[error("missing required chunk {tag}")]
    MissingChunk {
        /// The absent tag.
        tag: ChunkTag,
    },
    /// A length-prefixed string was not valid UTF-8.
    #[error("{what} is not valid UTF-8")]
    InvalidUtf8 {
        /// The field being decoded.
        what: &'static str,
    },
    /// A count exceeded one of the decoder's hard caps.
    #[error("{what} count {count} exceeds maximum {max}")]
    CountTooLarge {
        /// The counted item.
        what: &'static str,
        /// The declared count.
        count: u64,
        /// The cap.
        max: u64,
    },
    /// A structurally valid record violated a format invariant.
    #[error("invalid {what}: {reason}")]
    Invalid {
        /// The offending structure.
        what: &'static str,
        /// Human readable detail.
        reason: String,
    },
}

impl BundleError {
    /// Shorthand for [`BundleError::Invalid`].
    pub fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        BundleError::Invalid {
            what,
            reason: reason.into(),
        }
    }
}
