use fxvm_bundle::{
    decode_bundle, BundleError, BundleFile, BundleWriter, ChunkTag, ConstantPool, ExternDesc,
    TypeField, TypeLayout,
};
use pretty_assertions::assert_eq;

fn emitter_like_bundle() -> Vec<u8> {
    let mut pool = ConstantPool::new();
    pool.float("elapsedTime", 0.016);
    pool.float3("emitterPos", [1.0, 2.0, 3.0]);
    pool.uint("maxParticles", 1024);
    pool.string("spawned");

    let particle = TypeLayout::structure(
        "Part",
        vec![
            TypeField::new("pos", 0, TypeLayout::scalar("float3", 12)),
            TypeField::new("timelife", 12, TypeLayout::scalar("float", 4)),
        ],
    );
    let externs = [
        ExternDesc {
            id: 0,
            name: "trace".into(),
            ret: TypeLayout::void(),
            params: vec![TypeLayout::scalar("string", 4), TypeLayout::scalar("int", 4)],
        },
        ExternDesc {
            id: 1,
            name: "initPart".into(),
            ret: particle,
            params: vec![TypeLayout::scalar("uint", 4)],
        },
    ];

    pool.apply(BundleWriter::new())
        .code(&[0, 0, 42, 0, 0, 50, 0, 0, 0, 0])
        .externs(&externs)
        .finish()
}

#[test]
fn decodes_full_bundle() {
    let bytes = emitter_like_bundle();
    let file = BundleFile::parse(&bytes).unwrap();
    let tags: Vec<ChunkTag> = file.chunks().iter().map(|c| c.tag).collect();
    assert_eq!(
        tags,
        vec![
            ChunkTag::CONSTANTS,
            ChunkTag::LAYOUT,
            ChunkTag::CODE,
            ChunkTag::EXTERNS
        ]
    );

    let decoded = file.decode().unwrap();
    assert_eq!(decoded.code.len(), 10);
    let names: Vec<&str> = decoded.layout.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["elapsedTime", "emitterPos", "maxParticles"]);
    assert_eq!(decoded.layout[1].offset, 4);
    assert_eq!(decoded.layout[1].size, 12);
    assert_eq!(f32::from_bits(decoded.constants[0]), 0.016);

    assert_eq!(decoded.externs[0].signature(), "void trace(string, int)");
    assert_eq!(decoded.externs[1].ret.fields.len(), 2);
    assert_eq!(decoded.externs[1].return_size(), 16);
}

#[test]
fn every_truncation_point_fails_cleanly() {
    let bytes = emitter_like_bundle();
    let file = BundleFile::parse(&bytes).unwrap();
    // Stopping right before the optional EXTERNS chunk is a valid bundle.
    let externs_at = file.chunks()[3].offset;
    for len in (0..bytes.len()).filter(|&len| len != externs_at) {
        let res = decode_bundle(&bytes[..len]);
        assert!(res.is_err(), "prefix of {len} bytes decoded");
    }
}

#[test]
fn missing_code_is_reported() {
    let mut bytes = Vec::new();
    for tag in [ChunkTag::CONSTANTS, ChunkTag::LAYOUT] {
        bytes.extend_from_slice(&tag.0.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
    }
    assert_eq!(
        decode_bundle(&bytes).unwrap_err(),
        BundleError::MissingChunk {
            tag: ChunkTag::CODE
        }
    );
}

#[test]
fn errors_render_context() {
    let mut bytes = 2u32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&1000u32.to_le_bytes());
    let err = decode_bundle(&bytes).unwrap_err();
    assert_eq!(
        err.to_string(),
        "truncated chunk content: need 4000 bytes at offset 8, 0 remaining"
    );
}
