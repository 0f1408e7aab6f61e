use crate::error::BundleError;
use crate::reader::ByteReader;
use crate::type_layout::TypeLayout;

/// A reflected native function callable from bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDesc {
    /// Dense id, `0..count`.
    pub id: u32,
    /// Function name.
    pub name: String,
    /// Return type (`void` for none).
    pub ret: TypeLayout,
    /// Parameter types in call order.
    pub params: Vec<TypeLayout>,
}

impl ExternDesc {
    /// Total bytes of the packed return value.
    pub fn return_size(&self) -> u32 {
        self.ret.size
    }

    /// Total bytes of the packed arguments.
    pub fn params_size(&self) -> u64 {
        self.params.iter().map(|p| u64::from(p.size)).sum()
    }

    /// `ret name(p0, p1, ...)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(TypeLayout::display_name).collect();
        format!(
            "{} {}({})",
            self.ret.display_name(),
            self.name,
            params.join(", ")
        )
    }
}

// id + name len + return type header + param count
const MIN_RECORD_LEN: usize = 4 + 4 + 5 * 4 + 4;
const MIN_TYPE_LEN: usize = 5 * 4;

/// Parses the content of an `EXTERNS` chunk.
///
/// The ids must be unique and dense (`0..count`); the result is sorted by id.
pub fn parse_externs_chunk(bytes: &[u8]) -> Result<Vec<ExternDesc>, BundleError> {
    let mut r = ByteReader::new(bytes, "EXTERNS chunk");
    let (count, hint) = r.read_count("extern", MIN_RECORD_LEN)?;

    let mut externs = Vec::with_capacity(hint);
    for _ in 0..count {
        let id = r.read_u32()?;
        let name = r.read_string("extern name")?;
        let ret = TypeLayout::read(&mut r, 0)?;
        let (param_count, param_hint) = r.read_count("extern parameter", MIN_TYPE_LEN)?;
        let mut params = Vec::with_capacity(param_hint);
        for _ in 0..param_count {
            params.push(TypeLayout::read(&mut r, 0)?);
        }
        externs.push(ExternDesc {
            id,
            name,
            ret,
            params,
        });
    }

    externs.sort_by_key(|e| e.id);
    for (expected, e) in externs.iter().enumerate() {
        if e.id as usize != expected {
            return Err(BundleError::invalid(
                "EXTERNS chunk",
                format!(
                    "extern ids must be dense from 0; found id {} ({:?}) at position {expected}",
                    e.id, e.name
                ),
            ));
        }
    }
    Ok(externs)
}
