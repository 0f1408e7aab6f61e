use crate::error::BundleError;
use crate::limits::MAX_RECORD_COUNT;

/// A bounds-checked little-endian cursor over a byte slice.
///
/// Every read validates the remaining length and advances only on success, so a
/// failed read leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    /// Creates a cursor over `bytes`. `what` names the structure in error messages.
    pub fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, pos: 0, what }
    }

    /// Current byte offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BundleError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(BundleError::Truncated {
                what: self.what,
                offset: self.pos,
                wanted: len,
                remaining: self.remaining(),
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Reads one little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, BundleError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a `u32` byte length followed by that many UTF-8 bytes.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, BundleError> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len).inspect_err(|_| self.pos = start)?;
        match core::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => {
                self.pos = start;
                Err(BundleError::InvalidUtf8 { what: field })
            }
        }
    }

    /// Reads a record count and returns it together with a capacity hint that is safe
    /// to pre-allocate.
    ///
    /// Each record occupies at least `min_record_bytes`, so the hint never exceeds
    /// what the remaining bytes could actually hold.
    pub fn read_count(
        &mut self,
        what: &'static str,
        min_record_bytes: usize,
    ) -> Result<(usize, usize), BundleError> {
        let count = self.read_u32()?;
        if count > MAX_RECORD_COUNT {
            return Err(BundleError::CountTooLarge {
                what,
                count: u64::from(count),
                max: u64::from(MAX_RECORD_COUNT),
            });
        }
        let count = count as usize;
        let hint = count.min(self.remaining() / min_record_bytes.max(1));
        Ok((count, hint))
    }
}
