use crate::error::BundleError;
use crate::limits::MAX_TYPE_DEPTH;
use crate::reader::ByteReader;

/// A recursive description of a native type, used for extern marshalling and
/// constant reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLayout {
    /// Type name (`void`, `int`, `float3`, `string`, or a struct name).
    pub name: String,
    /// Total size in bytes.
    pub size: u32,
    /// Element count for arrays; [`TypeLayout::NOT_ARRAY`] or `0` otherwise.
    pub array_length: u32,
    /// Struct members. Leaf types have none.
    pub fields: Vec<TypeField>,
}

/// One member of a struct [`TypeLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeField {
    /// Member name.
    pub name: String,
    /// Member semantic, often empty.
    pub semantic: String,
    /// Member size in bytes.
    pub size: u32,
    /// Byte offset of the member within the enclosing type.
    pub padding: u32,
    /// Member type.
    pub ty: TypeLayout,
}

impl TypeLayout {
    /// `array_length` value the encoder writes for non-array types (`-1` as `u32`).
    pub const NOT_ARRAY: u32 = u32::MAX;

    /// A leaf type with no fields.
    pub fn scalar(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            array_length: Self::NOT_ARRAY,
            fields: Vec::new(),
        }
    }

    /// The zero-sized `void` type.
    pub fn void() -> Self {
        Self::scalar("void", 0)
    }

    /// An array of `length` elements of `element`.
    pub fn array(element: TypeLayout, length: u32) -> Self {
        Self {
            name: element.name,
            size: element.size.saturating_mul(length),
            array_length: length,
            fields: element.fields,
        }
    }

    /// A struct made of `fields`; its size is the end of the last field.
    pub fn structure(name: impl Into<String>, fields: Vec<TypeField>) -> Self {
        let size = fields
            .iter()
            .map(|f| f.padding.saturating_add(f.size))
            .max()
            .unwrap_or(0);
        Self {
            name: name.into(),
            size,
            array_length: Self::NOT_ARRAY,
            fields,
        }
    }

    /// Whether this layout describes an array.
    pub fn is_array(&self) -> bool {
        self.array_length != 0 && self.array_length != Self::NOT_ARRAY
    }

    /// Whether this layout has no fields.
    pub fn is_leaf(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether this is the constants-indirected `string` type.
    pub fn is_string(&self) -> bool {
        self.name == "string"
    }

    /// Whether this is `void`.
    pub fn is_void(&self) -> bool {
        self.size == 0 && self.name == "void"
    }

    /// Renders a short C-like signature fragment such as `float3` or `Part[8]`.
    pub fn display_name(&self) -> String {
        if self.is_array() {
            format!("{}[{}]", self.name, self.array_length)
        } else {
            self.name.clone()
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>, depth: u32) -> Result<TypeLayout, BundleError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(BundleError::CountTooLarge {
                what: "type nesting",
                count: u64::from(depth),
                max: u64::from(MAX_TYPE_DEPTH),
            });
        }
        let size = r.read_u32()?;
        let array_length = r.read_u32()?;
        let name = r.read_string("type name")?;
        // padding + size + semantic len + name len + nested type header
        let (count, hint) = r.read_count("type field", 4 * 4 + 5 * 4)?;

        let mut fields = Vec::with_capacity(hint);
        for _ in 0..count {
            let padding = r.read_u32()?;
            let field_size = r.read_u32()?;
            let semantic = r.read_string("field semantic")?;
            let field_name = r.read_string("field name")?;
            let ty = TypeLayout::read(r, depth + 1)?;

            let end = u64::from(padding) + u64::from(field_size);
            if end > u64::from(size) {
                return Err(BundleError::invalid(
                    "type layout",
                    format!(
                        "field {field_name:?} of {name:?} ends at byte {end}, past the type size {size}"
                    ),
                ));
            }
            fields.push(TypeField {
                name: field_name,
                semantic,
                size: field_size,
                padding,
                ty,
            });
        }

        Ok(TypeLayout {
            name,
            size,
            array_length,
            fields,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.array_length.to_le_bytes());
        write_string(out, &self.name);
        out.extend_from_slice(&(self.fields.len() as u32).to_le_bytes());
        for f in &self.fields {
            out.extend_from_slice(&f.padding.to_le_bytes());
            out.extend_from_slice(&f.size.to_le_bytes());
            write_string(out, &f.semantic);
            write_string(out, &f.name);
            f.ty.write(out);
        }
    }
}

impl TypeField {
    /// A field at byte offset `padding` with the size of `ty`.
    pub fn new(name: impl Into<String>, padding: u32, ty: TypeLayout) -> Self {
        Self {
            name: name.into(),
            semantic: String::new(),
            size: ty.size,
            padding,
            ty,
        }
    }
}

pub(crate) fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}
