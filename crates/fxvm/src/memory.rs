//! Word-addressable shared memory.
//!
//! Inputs bound into a bundle (constant buffers, UAVs, textures, system values) are all
//! [`MemoryView`]s: a window over reference-counted storage of 32-bit words. Cloning a
//! view aliases the same storage, so a UAV bound into several bundles observes every
//! write. Words are accessed with relaxed atomics; the interpreter is sequential, and
//! host-side counter updates use atomic read-modify-write.

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::error::{Space, VmError};

/// An access outside a [`MemoryView`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("memory access out of bounds: {size} bytes at byte offset {offset}, view is {len} bytes")]
pub struct MemoryError {
    pub offset: usize,
    pub size: usize,
    pub len: usize,
}

impl MemoryError {
    /// Converts into a VM fault, reporting word indices.
    pub(crate) fn into_vm(self, space: Space) -> VmError {
        VmError::IndexOutOfRange {
            space,
            index: (self.offset / 4) as i64,
            len: self.len / 4,
        }
    }
}

/// A window over shared 32-bit word storage.
#[derive(Clone)]
pub struct MemoryView {
    storage: Arc<[AtomicU32]>,
    offset: usize,
    len: usize,
}

impl MemoryView {
    /// Allocates `words` zeroed words.
    pub fn zeroed(words: usize) -> Self {
        let storage: Arc<[AtomicU32]> = (0..words).map(|_| AtomicU32::new(0)).collect();
        Self {
            storage,
            offset: 0,
            len: words,
        }
    }

    /// Allocates storage initialised from `words`.
    pub fn from_words(words: &[u32]) -> Self {
        let storage: Arc<[AtomicU32]> = words.iter().map(|&w| AtomicU32::new(w)).collect();
        Self {
            storage,
            offset: 0,
            len: words.len(),
        }
    }

    /// Allocates storage initialised from little-endian `bytes`, zero padded to a word.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let view = Self::zeroed(bytes.len().div_ceil(4));
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut w = [0u8; 4];
            w[..chunk.len()].copy_from_slice(chunk);
            view.storage[i].store(u32::from_le_bytes(w), Ordering::Relaxed);
        }
        view
    }

    /// Length in words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        self.len * 4
    }

    fn slot(&self, index: usize) -> Result<&AtomicU32, MemoryError> {
        if index < self.len {
            Ok(&self.storage[self.offset + index])
        } else {
            Err(MemoryError {
                offset: index.saturating_mul(4),
                size: 4,
                len: self.byte_len(),
            })
        }
    }

    pub fn read_u32(&self, index: usize) -> Result<u32, MemoryError> {
        Ok(self.slot(index)?.load(Ordering::Relaxed))
    }

    pub fn read_i32(&self, index: usize) -> Result<i32, MemoryError> {
        self.read_u32(index).map(|w| w as i32)
    }

    pub fn read_f32(&self, index: usize) -> Result<f32, MemoryError> {
        self.read_u32(index).map(f32::from_bits)
    }

    pub fn write_u32(&self, index: usize, value: u32) -> Result<(), MemoryError> {
        self.slot(index)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn write_i32(&self, index: usize, value: i32) -> Result<(), MemoryError> {
        self.write_u32(index, value as u32)
    }

    pub fn write_f32(&self, index: usize, value: f32) -> Result<(), MemoryError> {
        self.write_u32(index, value.to_bits())
    }

    /// Atomically adds `delta` (wrapping) to a word and returns the previous value.
    pub fn fetch_add(&self, index: usize, delta: u32) -> Result<u32, MemoryError> {
        Ok(self.slot(index)?.fetch_add(delta, Ordering::AcqRel))
    }

    /// Atomically subtracts `delta` (wrapping) from a word and returns the previous value.
    pub fn fetch_sub(&self, index: usize, delta: u32) -> Result<u32, MemoryError> {
        Ok(self.slot(index)?.fetch_sub(delta, Ordering::AcqRel))
    }

    fn check_bytes(&self, byte_offset: usize, size: usize) -> Result<(), MemoryError> {
        match byte_offset.checked_add(size) {
            Some(end) if end <= self.byte_len() => Ok(()),
            _ => Err(MemoryError {
                offset: byte_offset,
                size,
                len: self.byte_len(),
            }),
        }
    }

    /// Copies bytes starting at `byte_offset` into `dst`.
    pub fn read_bytes(&self, byte_offset: usize, dst: &mut [u8]) -> Result<(), MemoryError> {
        self.check_bytes(byte_offset, dst.len())?;
        for (i, out) in dst.iter_mut().enumerate() {
            let at = byte_offset + i;
            let word = self.storage[self.offset + at / 4].load(Ordering::Relaxed);
            *out = (word >> ((at % 4) * 8)) as u8;
        }
        Ok(())
    }

    /// Writes `src` starting at `byte_offset`.
    pub fn write_bytes(&self, byte_offset: usize, src: &[u8]) -> Result<(), MemoryError> {
        self.check_bytes(byte_offset, src.len())?;
        if byte_offset % 4 == 0 {
            let words = src.chunks_exact(4);
            let tail = words.remainder();
            let mut at = byte_offset / 4;
            for w in words {
                self.storage[self.offset + at]
                    .store(u32::from_le_bytes([w[0], w[1], w[2], w[3]]), Ordering::Relaxed);
                at += 1;
            }
            return self.write_unaligned(at * 4, tail);
        }
        self.write_unaligned(byte_offset, src)
    }

    fn write_unaligned(&self, byte_offset: usize, src: &[u8]) -> Result<(), MemoryError> {
        for (i, &b) in src.iter().enumerate() {
            let at = byte_offset + i;
            let shift = (at % 4) * 8;
            let mask = !(0xffu32 << shift);
            let _ = self.storage[self.offset + at / 4].fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |w| Some((w & mask) | (u32::from(b) << shift)),
            );
        }
        Ok(())
    }

    /// Copies the words out.
    pub fn to_words(&self) -> Vec<u32> {
        self.storage[self.offset..self.offset + self.len]
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect()
    }

    /// Copies the contents out as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for w in self.to_words() {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Sets every word to `value`.
    pub fn fill(&self, value: u32) {
        for w in &self.storage[self.offset..self.offset + self.len] {
            w.store(value, Ordering::Relaxed);
        }
    }

    /// A view of `len` words starting `offset` words into this one, sharing storage.
    pub fn subview(&self, offset: usize, len: usize) -> Result<MemoryView, MemoryError> {
        let err = || MemoryError {
            offset: offset.saturating_mul(4),
            size: len.saturating_mul(4),
            len: self.byte_len(),
        };
        let end = offset.checked_add(len).ok_or_else(err)?;
        if end > self.len {
            return Err(err());
        }
        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + offset,
            len,
        })
    }

    /// Whether both views share storage and overlap.
    pub fn aliases(&self, other: &MemoryView) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
            && self.offset < other.offset + other.len
            && other.offset < self.offset + self.len
    }
}

impl fmt::Debug for MemoryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryView")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("storage_len", &self.storage.len())
            .finish()
    }
}
