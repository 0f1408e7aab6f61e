//! R8G8B8A8 textures as bindable input memory.
//!
//! Layout: a 16-word header `[width, height, format, reserved...]` followed by
//! `width * height` texel words, row-major. Channel `R` is the low byte.

use crate::error::{Space, VmError};
use crate::memory::MemoryView;

/// Words before the first texel.
pub const TEXTURE_HEADER_WORDS: usize = 16;

/// The only supported texel format.
pub const FORMAT_R8G8B8A8: u32 = 0;

/// Builds texture memory from packed RGBA8 texels (`R` in the low byte).
///
/// Missing texels are zero; extra texels are ignored.
pub fn create_texture_memory(width: u32, height: u32, texels: &[u32]) -> MemoryView {
    let count = width as usize * height as usize;
    let mut words = Vec::with_capacity(TEXTURE_HEADER_WORDS + count);
    words.extend_from_slice(&[width, height, FORMAT_R8G8B8A8]);
    words.resize(TEXTURE_HEADER_WORDS, 0);
    words.extend(texels.iter().take(count));
    words.resize(TEXTURE_HEADER_WORDS + count, 0);
    MemoryView::from_words(&words)
}

/// Packs normalized channels into an RGBA8 texel.
pub fn pack_rgba8(rgba: [f32; 4]) -> u32 {
    rgba.iter().enumerate().fold(0u32, |acc, (i, c)| {
        let byte = (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        acc | (byte << (8 * i))
    })
}

/// Unpacks a texel into channels in `[0, 1]`.
pub fn unpack_rgba8(texel: u32) -> [f32; 4] {
    [
        (texel & 0xff) as f32 / 255.0,
        ((texel >> 8) & 0xff) as f32 / 255.0,
        ((texel >> 16) & 0xff) as f32 / 255.0,
        ((texel >> 24) & 0xff) as f32 / 255.0,
    ]
}

/// Samples texel `(u, v)` of the texture bound at input `slot`.
pub(crate) fn load_texel(tex: &MemoryView, slot: u32, u: i32, v: i32) -> Result<[f32; 4], VmError> {
    let header = |i| tex.read_u32(i).map_err(|e| e.into_vm(Space::Input(slot)));
    let width = header(0)?;
    let height = header(1)?;

    let u_ok = u >= 0 && (u as u32) < width;
    let v_ok = v >= 0 && (v as u32) < height;
    if !u_ok || !v_ok {
        let index = i64::from(v) * i64::from(width) + i64::from(u);
        return Err(VmError::out_of_range(
            Space::Input(slot),
            index,
            width as usize * height as usize,
        ));
    }

    let index = TEXTURE_HEADER_WORDS + v as usize * width as usize + u as usize;
    let texel = tex
        .read_u32(index)
        .map_err(|e| e.into_vm(Space::Input(slot)))?;
    Ok(unpack_rgba8(texel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_texels() {
        let tex = create_texture_memory(2, 1, &[0x11, 0x22]);
        assert_eq!(tex.len(), TEXTURE_HEADER_WORDS + 2);
        assert_eq!(tex.read_u32(0).unwrap(), 2);
        assert_eq!(tex.read_u32(1).unwrap(), 1);
        assert_eq!(tex.read_u32(TEXTURE_HEADER_WORDS + 1).unwrap(), 0x22);
    }

    #[test]
    fn channels_unpack_low_byte_first() {
        let tex = create_texture_memory(1, 1, &[0xFF00_80FF]);
        let [r, g, b, a] = load_texel(&tex, 33, 0, 0).unwrap();
        assert_eq!(r, 1.0);
        assert_eq!(g, 128.0 / 255.0);
        assert_eq!(b, 0.0);
        assert_eq!(a, 1.0);
        assert_eq!(pack_rgba8([r, g, b, a]), 0xFF00_80FF);
    }

    #[test]
    fn out_of_bounds_uv_faults() {
        let tex = create_texture_memory(2, 2, &[0; 4]);
        assert!(matches!(
            load_texel(&tex, 33, 2, 0),
            Err(VmError::IndexOutOfRange { .. })
        ));
        assert!(load_texel(&tex, 33, 0, -1).is_err());
    }

    #[test]
    fn header_larger_than_view_faults() {
        let tex = create_texture_memory(1, 1, &[0]);
        tex.write_u32(0, 100).unwrap();
        assert!(load_texel(&tex, 33, 50, 0).is_err());
    }
}
