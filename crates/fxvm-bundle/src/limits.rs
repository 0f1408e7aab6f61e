//! Hard caps applied while decoding untrusted bundles.
//!
//! Real bundles carry a handful of chunks, a few dozen constants and a few externs.
//! The caps only exist so hostile input cannot request unbounded work or recursion.

/// Maximum number of chunks accepted in one bundle.
pub const MAX_CHUNK_COUNT: usize = 64;

/// Maximum nesting depth of a [`crate::TypeLayout`] tree.
pub const MAX_TYPE_DEPTH: u32 = 32;

/// Maximum number of records in a `LAYOUT` or `EXTERNS` chunk, and of fields or
/// parameters in a single type.
pub(crate) const MAX_RECORD_COUNT: u32 = 65_536;
