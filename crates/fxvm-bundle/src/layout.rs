use crate::error::BundleError;
use crate::reader::ByteReader;

/// Reflection for one named constant inside the `CONSTANTS` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDesc {
    /// Unique constant name.
    pub name: String,
    /// Source-level type name (`float`, `float3`, `uint`, ...).
    pub type_name: String,
    /// HLSL-style semantic, often empty.
    pub semantic: String,
    /// Byte offset into the constants buffer.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

impl ConstantDesc {
    /// Convenience constructor.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        semantic: impl Into<String>,
        offset: u32,
        size: u32,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            semantic: semantic.into(),
            offset,
            size,
        }
    }
}

// name len + type len + semantic len + offset + size
const MIN_RECORD_LEN: usize = 5 * 4;

/// Parses the content of a `LAYOUT` chunk.
///
/// Entries keep their file order. Names must be unique. Bytes after the last
/// record are word padding and are ignored.
pub fn parse_layout_chunk(bytes: &[u8]) -> Result<Vec<ConstantDesc>, BundleError> {
    let mut r = ByteReader::new(bytes, "LAYOUT chunk");
    let (count, hint) = r.read_count("layout entry", MIN_RECORD_LEN)?;

    let mut entries: Vec<ConstantDesc> = Vec::with_capacity(hint);
    for _ in 0..count {
        let name = r.read_string("constant name")?;
        let type_name = r.read_string("constant type")?;
        let semantic = r.read_string("constant semantic")?;
        let offset = r.read_u32()?;
        let size = r.read_u32()?;

        if entries.iter().any(|e| e.name == name) {
            return Err(BundleError::invalid(
                "LAYOUT chunk",
                format!("constant {name:?} is declared twice"),
            ));
        }
        entries.push(ConstantDesc {
            name,
            type_name,
            semantic,
            offset,
            size,
        });
    }
    Ok(entries)
}
