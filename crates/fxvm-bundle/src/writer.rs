use crate::chunk::ChunkTag;
use crate::externs::ExternDesc;
use crate::layout::ConstantDesc;
use crate::type_layout::write_string;
use crate::words_to_le_bytes;

/// Encodes bundles.
///
/// `finish` always emits `CONSTANTS`, `LAYOUT` and `CODE` (in that order), then
/// `EXTERNS` unless [`BundleWriter::without_externs`] was called, then any raw
/// chunks.
#[derive(Debug, Clone, Default)]
pub struct BundleWriter {
    code: Vec<u32>,
    constants: Vec<u8>,
    layout: Vec<ConstantDesc>,
    externs: Option<Vec<ExternDesc>>,
    extra: Vec<(ChunkTag, Vec<u8>)>,
}

impl BundleWriter {
    /// An empty writer with an (empty) `EXTERNS` chunk.
    pub fn new() -> Self {
        Self {
            externs: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Sets the instruction words.
    pub fn code(mut self, words: &[u32]) -> Self {
        self.code = words.to_vec();
        self
    }

    /// Sets the constants buffer from words.
    pub fn constants(mut self, words: &[u32]) -> Self {
        self.constants = words_to_le_bytes(words);
        self
    }

    /// Sets the constants buffer from bytes; padded with zeros to a word boundary.
    pub fn constants_bytes(mut self, bytes: &[u8]) -> Self {
        self.constants = bytes.to_vec();
        self
    }

    /// Sets the constant reflection.
    pub fn layout(mut self, entries: &[ConstantDesc]) -> Self {
        self.layout = entries.to_vec();
        self
    }

    /// Sets the reflected externs.
    pub fn externs(mut self, externs: &[ExternDesc]) -> Self {
        self.externs = Some(externs.to_vec());
        self
    }

    /// Omits the optional `EXTERNS` chunk.
    pub fn without_externs(mut self) -> Self {
        self.externs = None;
        self
    }

    /// Appends an extra chunk verbatim (padded to a word boundary).
    pub fn raw_chunk(mut self, tag: ChunkTag, bytes: &[u8]) -> Self {
        self.extra.push((tag, bytes.to_vec()));
        self
    }

    /// Produces the bundle bytes.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_chunk(&mut out, ChunkTag::CONSTANTS, &self.constants);
        push_chunk(&mut out, ChunkTag::LAYOUT, &encode_layout_chunk(&self.layout));
        push_chunk(&mut out, ChunkTag::CODE, &words_to_le_bytes(&self.code));
        if let Some(externs) = &self.externs {
            push_chunk(&mut out, ChunkTag::EXTERNS, &encode_externs_chunk(externs));
        }
        for (tag, bytes) in &self.extra {
            push_chunk(&mut out, *tag, bytes);
        }
        out
    }
}

fn push_chunk(out: &mut Vec<u8>, tag: ChunkTag, content: &[u8]) {
    let words = content.len().div_ceil(4);
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&(words as u32).to_le_bytes());
    out.extend_from_slice(content);
    out.resize(out.len() + (words * 4 - content.len()), 0);
}

fn pad_to_word(out: &mut Vec<u8>) {
    let padded = out.len().div_ceil(4) * 4;
    out.resize(padded, 0);
}

/// Encodes `LAYOUT` chunk content (word padded).
pub fn encode_layout_chunk(entries: &[ConstantDesc]) -> Vec<u8> {
    let mut out = (entries.len() as u32).to_le_bytes().to_vec();
    for e in entries {
        write_string(&mut out, &e.name);
        write_string(&mut out, &e.type_name);
        write_string(&mut out, &e.semantic);
        out.extend_from_slice(&e.offset.to_le_bytes());
        out.extend_from_slice(&e.size.to_le_bytes());
    }
    pad_to_word(&mut out);
    out
}

/// Encodes `EXTERNS` chunk content (word padded).
pub fn encode_externs_chunk(externs: &[ExternDesc]) -> Vec<u8> {
    let mut out = (externs.len() as u32).to_le_bytes().to_vec();
    for e in externs {
        out.extend_from_slice(&e.id.to_le_bytes());
        write_string(&mut out, &e.name);
        e.ret.write(&mut out);
        out.extend_from_slice(&(e.params.len() as u32).to_le_bytes());
        for p in &e.params {
            p.write(&mut out);
        }
    }
    pad_to_word(&mut out);
    out
}

/// Builds a constants buffer together with its layout.
///
/// Strings are stored as `{u32 length, bytes}` aligned to a word; the returned byte
/// offset is what bytecode passes for a `string` extern argument.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    bytes: Vec<u8>,
    layout: Vec<ConstantDesc>,
}

impl ConstantPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_named(&mut self, name: &str, type_name: &str, value: &[u8]) -> u32 {
        pad_to_word(&mut self.bytes);
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(value);
        self.layout.push(ConstantDesc::new(
            name,
            type_name,
            "",
            offset,
            value.len() as u32,
        ));
        offset
    }

    /// Appends a named `float`; returns its byte offset.
    pub fn float(&mut self, name: &str, value: f32) -> u32 {
        self.push_named(name, "float", &value.to_le_bytes())
    }

    /// Appends a named `float3`; returns its byte offset.
    pub fn float3(&mut self, name: &str, value: [f32; 3]) -> u32 {
        let mut bytes = Vec::with_capacity(12);
        for v in value {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.push_named(name, "float3", &bytes)
    }

    /// Appends a named `int`; returns its byte offset.
    pub fn int(&mut self, name: &str, value: i32) -> u32 {
        self.push_named(name, "int", &value.to_le_bytes())
    }

    /// Appends a named `uint`; returns its byte offset.
    pub fn uint(&mut self, name: &str, value: u32) -> u32 {
        self.push_named(name, "uint", &value.to_le_bytes())
    }

    /// Appends an anonymous length-prefixed string; returns its byte offset.
    pub fn string(&mut self, value: &str) -> u32 {
        pad_to_word(&mut self.bytes);
        let offset = self.bytes.len() as u32;
        write_string(&mut self.bytes, value);
        offset
    }

    /// The constants bytes (word padded).
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        pad_to_word(&mut out);
        out
    }

    /// The layout entries, in insertion order.
    pub fn layout(&self) -> &[ConstantDesc] {
        &self.layout
    }

    /// Moves the pool's bytes and layout into `writer`.
    pub fn apply(&self, writer: BundleWriter) -> BundleWriter {
        writer.constants_bytes(&self.bytes()).layout(&self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_bundle;

    #[test]
    fn chunks_are_word_padded() {
        let bytes = BundleWriter::new()
            .constants_bytes(&[1, 2, 3])
            .code(&[50, 0, 0, 0, 0])
            .finish();
        assert_eq!(bytes.len() % 4, 0);
        let decoded = decode_bundle(&bytes).unwrap();
        assert_eq!(decoded.constants, vec![0x0003_0201]);
    }

    #[test]
    fn pool_strings_are_length_prefixed_and_aligned() {
        let mut pool = ConstantPool::new();
        pool.float("speed", 2.0);
        let a = pool.string("hello");
        let b = pool.string("hi");
        assert_eq!(a, 4);
        assert_eq!(b, 4 + 4 + 8);
        let bytes = pool.bytes();
        assert_eq!(&bytes[a as usize..a as usize + 4], &5u32.to_le_bytes());
        assert_eq!(&bytes[a as usize + 4..a as usize + 9], b"hello");
        assert_eq!(pool.layout().len(), 1);
    }
}
