//! A safe parser and encoder for `fxvm` bytecode bundles.
//!
//! A bundle is a flat little-endian byte buffer split into length-prefixed chunks:
//! `CONSTANTS`, `LAYOUT`, `CODE` and the optional `EXTERNS`. Bundles are treated as
//! **untrusted** input; every length-prefixed read is checked against the bytes that
//! remain and decoding fails with a [`BundleError`] instead of reading past the end.
//!
//! This crate is purely about the container format. Instruction semantics live in the
//! `fxvm` crate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chunk;
mod error;
mod externs;
mod layout;
mod limits;
mod reader;
mod type_layout;
mod writer;

pub use crate::chunk::{decode_bundle, BundleChunk, BundleFile, ChunkTag, DecodedBundle};
pub use crate::error::BundleError;
pub use crate::externs::{parse_externs_chunk, ExternDesc};
pub use crate::layout::{parse_layout_chunk, ConstantDesc};
pub use crate::limits::{MAX_CHUNK_COUNT, MAX_TYPE_DEPTH};
pub use crate::reader::ByteReader;
pub use crate::type_layout::{TypeField, TypeLayout};
pub use crate::writer::{
    encode_externs_chunk, encode_layout_chunk, BundleWriter, ConstantPool,
};

/// Number of 32-bit words in one encoded instruction (`op, a, b, c, d`).
pub const INSTRUCTION_WORDS: usize = 5;

/// Reinterprets little-endian bytes as 32-bit words.
///
/// Trailing bytes that do not fill a whole word are ignored; callers validate the
/// length first when that matters.
pub fn words_from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

/// Serializes 32-bit words as little-endian bytes.
pub fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}
