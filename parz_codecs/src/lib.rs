mod gzip_codec;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use gzip_codec::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use parz_core::format::{CODEC_GZIP, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use parz_core::Codec;
use std::sync::Arc;

/// Names accepted by [`codec_by_name`], for help text.
pub const CODEC_NAMES: &[&str] = &["gzip", "zstd", "lz4", "passthrough"];

/// Resolve a codec from its on-disk `codec_id`.
///
/// Used when opening an existing container, so decompression picks the
/// codec the container was written with.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_GZIP => Ok(Arc::new(GzipCodec::default())),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (passthrough), 1 (gzip), 2 (zstd), 3 (lz4)",
            id
        ),
    }
}

/// Resolve a codec by name, with an optional codec-specific level.
pub fn codec_by_name(name: &str, level: Option<i32>) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "gzip" | "gz" | "deflate" => Ok(Arc::new(match level {
            Some(l) => GzipCodec::new(l.clamp(0, 9) as u32),
            None => GzipCodec::default(),
        })),
        "zstd" | "z" => Ok(Arc::new(ZstdCodec::new(level.unwrap_or(3)))),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_names_agree() {
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, None).unwrap();
            assert_eq!(codec.name(), *name);
            assert_eq!(codec_by_id(codec.id()).unwrap().name(), *name);
        }
    }

    #[test]
    fn unknown_codecs_are_rejected() {
        assert!(codec_by_id(42).is_err());
        let err = codec_by_name("brotli", None).err().unwrap().to_string();
        assert!(err.contains("unknown codec"), "got: {err}");
    }

    #[test]
    fn every_codec_roundtrips_a_block() {
        let raw = b"0123456789abcdef".repeat(1000);
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, None).unwrap();
            let compressed = codec.compress_block(&raw).unwrap();
            assert_eq!(codec.decompress_block(&compressed, raw.len()).unwrap(), raw, "codec {name}");
        }
    }
}
