use crate::error::BundleError;
use crate::externs::{parse_externs_chunk, ExternDesc};
use crate::layout::{parse_layout_chunk, ConstantDesc};
use crate::limits::MAX_CHUNK_COUNT;
use crate::reader::ByteReader;
use crate::{words_from_le_bytes, INSTRUCTION_WORDS};
use core::fmt;

const CHUNK_HEADER_LEN: usize = 8; // tag + content word count

/// Identifies the kind of a chunk.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkTag(
    /// Raw tag value.
    pub u32,
);

impl ChunkTag {
    /// Raw constant buffer words.
    pub const CONSTANTS: ChunkTag = ChunkTag(0);
    /// Constant buffer reflection.
    pub const LAYOUT: ChunkTag = ChunkTag(1);
    /// Instruction stream.
    pub const CODE: ChunkTag = ChunkTag(2);
    /// Reflected native extern signatures.
    pub const EXTERNS: ChunkTag = ChunkTag(3);

    /// Human readable name for known tags.
    pub fn name(self) -> Option<&'static str> {
        match self {
            ChunkTag::CONSTANTS => Some("CONSTANTS"),
            ChunkTag::LAYOUT => Some("LAYOUT"),
            ChunkTag::CODE => Some("CODE"),
            ChunkTag::EXTERNS => Some("EXTERNS"),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "chunk#{}", self.0),
        }
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkTag({self})")
    }
}

/// A single chunk within a bundle.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct BundleChunk<'a> {
    /// The chunk type.
    pub tag: ChunkTag,
    /// Byte offset of the chunk header within the bundle.
    pub offset: usize,
    /// Content bytes (always a whole number of words).
    pub data: &'a [u8],
}

impl fmt::Debug for BundleChunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleChunk")
            .field("tag", &self.tag)
            .field("offset", &self.offset)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A bundle split into chunks, borrowing the input bytes.
///
/// Parsing only validates the chunk framing. Use [`BundleFile::decode`] (or
/// [`decode_bundle`]) to also decode the chunk contents.
#[derive(Debug, Clone)]
pub struct BundleFile<'a> {
    bytes: &'a [u8],
    chunks: Vec<BundleChunk<'a>>,
}

impl<'a> BundleFile<'a> {
    /// Splits `bytes` into chunks.
    ///
    /// Each declared content length is checked against the bytes that remain, a tag
    /// may occur only once, and trailing bytes too short for a chunk header are an
    /// error. Unknown tags are kept and ignored by [`BundleFile::decode`].
    pub fn parse(bytes: &'a [u8]) -> Result<BundleFile<'a>, BundleError> {
        let mut reader = ByteReader::new(bytes, "chunk header");
        let mut chunks: Vec<BundleChunk<'a>> = Vec::new();

        while !reader.is_empty() {
            let offset = reader.position();
            if reader.remaining() < CHUNK_HEADER_LEN {
                return Err(BundleError::Truncated {
                    what: "chunk header",
                    offset,
                    wanted: CHUNK_HEADER_LEN,
                    remaining: reader.remaining(),
                });
            }
            let tag = ChunkTag(reader.read_u32()?);
            let word_count = reader.read_u32()?;
            let byte_len = (word_count as usize).checked_mul(4).ok_or_else(|| {
                BundleError::invalid("chunk header", format!("{tag} word count overflows"))
            })?;
            let data = reader.read_bytes(byte_len).map_err(|_| BundleError::Truncated {
                what: "chunk content",
                offset: offset + CHUNK_HEADER_LEN,
                wanted: byte_len,
                remaining: reader.remaining(),
            })?;

            if chunks.iter().any(|c| c.tag == tag) {
                return Err(BundleError::DuplicateChunk { tag });
            }
            if chunks.len() == MAX_CHUNK_COUNT {
                return Err(BundleError::CountTooLarge {
                    what: "chunk",
                    count: MAX_CHUNK_COUNT as u64 + 1,
                    max: MAX_CHUNK_COUNT as u64,
                });
            }
            chunks.push(BundleChunk { tag, offset, data });
        }

        Ok(BundleFile { bytes, chunks })
    }

    /// The full input buffer.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Chunks in file order.
    pub fn chunks(&self) -> &[BundleChunk<'a>] {
        &self.chunks
    }

    /// Content of the chunk with `tag`, if present.
    pub fn get(&self, tag: ChunkTag) -> Option<&'a [u8]> {
        self.chunks.iter().find(|c| c.tag == tag).map(|c| c.data)
    }

    /// Content of a chunk that must be present.
    pub fn require(&self, tag: ChunkTag) -> Result<&'a [u8], BundleError> {
        self.get(tag).ok_or(BundleError::MissingChunk { tag })
    }

    /// Decodes the chunk contents into an owned [`DecodedBundle`].
    pub fn decode(&self) -> Result<DecodedBundle, BundleError> {
        let constants_bytes = self.require(ChunkTag::CONSTANTS)?;
        let layout_bytes = self.require(ChunkTag::LAYOUT)?;
        let code_bytes = self.require(ChunkTag::CODE)?;

        let code = words_from_le_bytes(code_bytes);
        if code.is_empty() {
            return Err(BundleError::invalid("CODE chunk", "no instructions"));
        }
        if code.len() % INSTRUCTION_WORDS != 0 {
            return Err(BundleError::invalid(
                "CODE chunk",
                format!(
                    "{} words is not a whole number of {INSTRUCTION_WORDS}-word instructions",
                    code.len()
                ),
            ));
        }

        let constants = words_from_le_bytes(constants_bytes);
        let layout = parse_layout_chunk(layout_bytes)?;
        for entry in &layout {
            let end = u64::from(entry.offset) + u64::from(entry.size);
            if end > constants_bytes.len() as u64 {
                return Err(BundleError::invalid(
                    "LAYOUT chunk",
                    format!(
                        "constant {:?} spans bytes {}..{end} but CONSTANTS holds {} bytes",
                        entry.name,
                        entry.offset,
                        constants_bytes.len()
                    ),
                ));
            }
        }

        let externs = match self.get(ChunkTag::EXTERNS) {
            Some(bytes) => parse_externs_chunk(bytes)?,
            None => Vec::new(),
        };

        Ok(DecodedBundle {
            code,
            constants,
            layout,
            externs,
        })
    }

    /// A compact one-line-per-chunk summary for logs and tooling.
    pub fn debug_summary(&self) -> String {
        let mut out = format!("bundle: {} bytes, {} chunks", self.bytes.len(), self.chunks.len());
        for c in &self.chunks {
            out.push_str(&format!(
                "\n  {:>9} @ {:#06x}: {} words",
                c.tag.to_string(),
                c.offset,
                c.data.len() / 4
            ));
        }
        out
    }
}

/// The owned, decoded contents of a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBundle {
    /// Flat instruction words, five per instruction.
    pub code: Vec<u32>,
    /// Constant buffer words.
    pub constants: Vec<u32>,
    /// Constant reflection, in file order.
    pub layout: Vec<ConstantDesc>,
    /// Reflected externs, sorted by id (ids are `0..externs.len()`).
    pub externs: Vec<ExternDesc>,
}

/// Parses and decodes a bundle in one step.
pub fn decode_bundle(bytes: &[u8]) -> Result<DecodedBundle, BundleError> {
    BundleFile::parse(bytes)?.decode()
}
