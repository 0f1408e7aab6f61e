//! UAVs, read-only resource views, and the input register windows they bind into.

use core::fmt::Write as _;

use crate::error::{Space, VmError};
use crate::memory::MemoryView;

/// Number of input slots per bundle.
pub const INPUT_SLOT_COUNT: usize = 64;

/// Slot of the constants buffer.
pub const CBUFFER0_REGISTER: u32 = 0;
/// First general input slot.
pub const INPUT0_REGISTER: u32 = 1;
pub const INPUT_REGISTER_COUNT: u32 = 16;
/// First UAV slot.
pub const UAV0_REGISTER: u32 = INPUT0_REGISTER + INPUT_REGISTER_COUNT;
pub const UAV_REGISTER_COUNT: u32 = 16;
/// First read-only buffer/texture slot.
pub const SRV0_REGISTER: u32 = UAV0_REGISTER + UAV_REGISTER_COUNT;
pub const SRV_REGISTER_COUNT: u32 = INPUT_SLOT_COUNT as u32 - SRV0_REGISTER;

/// `uint3` group id.
pub const SV_GROUP_ID: u32 = INPUT0_REGISTER;
/// `uint` flattened thread index within the group.
pub const SV_GROUP_INDEX: u32 = INPUT0_REGISTER + 1;
/// `uint3` thread id within the group.
pub const SV_GROUP_THREAD_ID: u32 = INPUT0_REGISTER + 2;
/// `uint3` global thread id.
pub const SV_DISPATCH_THREAD_ID: u32 = INPUT0_REGISTER + 3;

const COUNTER_BYTES: u64 = 4;
const MINIDUMP_BYTES: usize = 64;

/// A counter-prefixed structured buffer.
///
/// `raw` is `[counter, elements...]`; `data` views the elements only. Both alias the
/// same storage, as does every bundle slot the UAV is bound to, so the storage
/// outlives [`destroy_uav`] for as long as any binding remains.
#[derive(Debug, Clone)]
pub struct Uav {
    pub name: String,
    /// Bytes per element.
    pub element_size: u32,
    /// Element count.
    pub length: u32,
    /// Register declared in the shader (`u#`).
    pub register: u32,
    /// Bundle input slot (`UAV0_REGISTER + register`).
    pub index: u32,
    pub data: MemoryView,
    pub raw: MemoryView,
}

/// Allocates a zeroed UAV of `length` elements of `element_size` bytes.
pub fn create_uav(
    name: impl Into<String>,
    element_size: u32,
    length: u32,
    register: u32,
) -> Result<Uav, VmError> {
    let name = name.into();
    if register >= UAV_REGISTER_COUNT {
        return Err(VmError::InvalidResource(format!(
            "uav {name:?}: register u{register} exceeds u{}",
            UAV_REGISTER_COUNT - 1
        )));
    }
    if element_size == 0 {
        return Err(VmError::InvalidResource(format!(
            "uav {name:?}: element size is zero"
        )));
    }
    let bytes = u64::from(element_size) * u64::from(length) + COUNTER_BYTES;
    if bytes % 4 != 0 {
        return Err(VmError::InvalidResource(format!(
            "uav {name:?}: {bytes} bytes is not a whole number of words"
        )));
    }
    let words = usize::try_from(bytes / 4)
        .map_err(|_| VmError::InvalidResource(format!("uav {name:?}: {bytes} bytes is too large")))?;

    let raw = MemoryView::zeroed(words);
    let data = raw
        .subview(1, words - 1)
        .map_err(|e| VmError::InvalidResource(e.to_string()))?;
    Ok(Uav {
        name,
        element_size,
        length,
        register,
        index: UAV0_REGISTER + register,
        data,
        raw,
    })
}

/// Releases the caller's handle on a UAV.
///
/// Taking the UAV by value ends every use through this handle; storage is freed once
/// no bundle still binds it.
pub fn destroy_uav(uav: Uav) {
    drop(uav);
}

impl Uav {
    pub fn byte_len(&self) -> usize {
        self.raw.byte_len()
    }

    pub fn read_counter(&self) -> u32 {
        self.raw.read_u32(0).unwrap_or(0)
    }

    pub fn overwrite_counter(&self, value: u32) {
        let _ = self.raw.write_u32(0, value);
    }

    /// Atomically increments the counter, returning the previous value.
    pub fn increment_counter(&self) -> u32 {
        self.raw.fetch_add(0, 1).unwrap_or(0)
    }

    /// Atomically decrements the counter, returning the previous value.
    pub fn decrement_counter(&self) -> u32 {
        self.raw.fetch_sub(0, 1).unwrap_or(0)
    }

    fn element_offset(&self, i: u32) -> Result<usize, VmError> {
        if i >= self.length {
            return Err(VmError::out_of_range(
                Space::Input(self.index),
                i64::from(i),
                self.length as usize,
            ));
        }
        Ok(i as usize * self.element_size as usize)
    }

    /// A view of element `i` (`ceil(element_size / 4)` words).
    ///
    /// Only available when the element starts on a word boundary.
    pub fn element(&self, i: u32) -> Result<MemoryView, VmError> {
        let offset = self.element_offset(i)?;
        if offset % 4 != 0 {
            return Err(VmError::InvalidResource(format!(
                "uav {:?}: element {i} is not word aligned",
                self.name
            )));
        }
        let words = (self.element_size as usize).div_ceil(4);
        let words = words.min(self.data.len() - offset / 4);
        self.data
            .subview(offset / 4, words)
            .map_err(|e| e.into_vm(Space::Input(self.index)))
    }

    /// Copies element `i` out.
    pub fn read_element(&self, i: u32) -> Result<Vec<u8>, VmError> {
        let offset = self.element_offset(i)?;
        let mut out = vec![0u8; self.element_size as usize];
        self.data
            .read_bytes(offset, &mut out)
            .map_err(|e| e.into_vm(Space::Input(self.index)))?;
        Ok(out)
    }

    /// Header line plus a hex dump of the first 64 element bytes.
    pub fn minidump(&self) -> String {
        let mut out = format!(
            "uav {}[{}x{}:u{}:cnt({})]\n",
            self.name,
            self.length,
            self.element_size,
            self.register,
            self.read_counter()
        );
        let n = MINIDUMP_BYTES.min(self.length as usize * self.element_size as usize);
        let mut bytes = vec![0u8; n];
        if self.data.read_bytes(0, &mut bytes).is_ok() {
            for b in &bytes {
                let _ = write!(out, "{b:02x} ");
            }
        }
        out.push_str("...");
        out
    }
}

/// A named read-only buffer or texture binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceView {
    pub name: String,
    /// Register declared in the shader (`t#`).
    pub register: u32,
    /// Bundle input slot (`SRV0_REGISTER + register`).
    pub index: u32,
}

fn create_view(kind: &str, name: String, register: u32) -> Result<ResourceView, VmError> {
    if register >= SRV_REGISTER_COUNT {
        return Err(VmError::InvalidResource(format!(
            "{kind} {name:?}: register t{register} exceeds t{}",
            SRV_REGISTER_COUNT - 1
        )));
    }
    Ok(ResourceView {
        name,
        register,
        index: SRV0_REGISTER + register,
    })
}

pub fn create_buffer_view(name: impl Into<String>, register: u32) -> Result<ResourceView, VmError> {
    create_view("buffer", name.into(), register)
}

pub fn create_texture_view(name: impl Into<String>, register: u32) -> Result<ResourceView, VmError> {
    create_view("texture", name.into(), register)
}
