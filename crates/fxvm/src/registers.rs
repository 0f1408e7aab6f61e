use crate::error::{Space, VmError};

/// The interpreter's scratch registers.
///
/// One array of 32-bit words read through three lanes (`i32`, `u32`, `f32`) that
/// alias the same bits: a value written as a float and read as an int observes the
/// float's bit pattern. The register file is owned by the caller and borrowed by
/// `Bundle::play`/`Bundle::dispatch`; registers are not cleared between invocations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    words: Box<[u32]>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEN)
    }
}

impl RegisterFile {
    pub const DEFAULT_LEN: usize = 8192;

    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u32; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    fn index(&self, r: i64) -> Result<usize, VmError> {
        usize::try_from(r)
            .ok()
            .filter(|&i| i < self.words.len())
            .ok_or_else(|| VmError::IndexOutOfRange {
                space: Space::Register,
                index: r,
                len: self.words.len(),
            })
    }

    #[inline]
    pub fn u32(&self, r: u32) -> Result<u32, VmError> {
        self.at(i64::from(r))
    }

    #[inline]
    pub fn i32(&self, r: u32) -> Result<i32, VmError> {
        self.u32(r).map(|w| w as i32)
    }

    #[inline]
    pub fn f32(&self, r: u32) -> Result<f32, VmError> {
        self.u32(r).map(f32::from_bits)
    }

    #[inline]
    pub fn set_u32(&mut self, r: u32, value: u32) -> Result<(), VmError> {
        self.set_at(i64::from(r), value)
    }

    #[inline]
    pub fn set_i32(&mut self, r: u32, value: i32) -> Result<(), VmError> {
        self.set_u32(r, value as u32)
    }

    #[inline]
    pub fn set_f32(&mut self, r: u32, value: f32) -> Result<(), VmError> {
        self.set_u32(r, value.to_bits())
    }

    /// Reads a register through a computed (possibly negative) index.
    #[inline]
    pub fn at(&self, r: i64) -> Result<u32, VmError> {
        let i = self.index(r)?;
        Ok(self.words[i])
    }

    /// Writes a register through a computed (possibly negative) index.
    #[inline]
    pub fn set_at(&mut self, r: i64, value: u32) -> Result<(), VmError> {
        let i = self.index(r)?;
        self.words[i] = value;
        Ok(())
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// The registers as native-endian bytes, as seen by extern marshalling.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    /// Zeroes every register.
    pub fn reset(&mut self) {
        self.words.fill(0);
    }
}
