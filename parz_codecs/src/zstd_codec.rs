use parz_core::codec::Codec;
use parz_core::format::CODEC_ZSTD;

/// Zstandard block codec.
///
/// Each block is compressed independently with `zstd` at the configured level
/// (default: 3).
///
/// Best for: large inputs where ratio and speed both matter.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(zstd::bulk::compress(raw, self.level)?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_size: usize) -> anyhow::Result<Vec<u8>> {
        // bulk decompression fails instead of growing past its capacity
        zstd::bulk::decompress(compressed, raw_size)
            .map_err(|e| anyhow::anyhow!("zstd decompress error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let raw: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let codec = ZstdCodec::new(5);
        let compressed = codec.compress_block(&raw).unwrap();
        assert_eq!(codec.decompress_block(&compressed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn output_larger_than_recorded_size_is_an_error() {
        let raw = vec![1u8; 10_000];
        let codec = ZstdCodec::default();
        let compressed = codec.compress_block(&raw).unwrap();
        assert!(codec.decompress_block(&compressed, 10).is_err());
    }
}
