use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parz_core::codec::Codec;
use parz_core::format::CODEC_GZIP;

/// DEFLATE block codec with gzip framing.
///
/// Every block becomes one complete gzip member, so a block can be inflated
/// on its own with nothing but its byte span from the container.
///
/// Best for: the default; broad tooling familiarity, moderate ratio.
pub struct GzipCodec {
    /// Compression level (0 = store, 9 = slow / smallest).
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Codec for GzipCodec {
    fn id(&self) -> u16 {
        CODEC_GZIP
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(self.level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_size: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_size);
        // one byte past the recorded size is enough to detect an oversized block
        GzDecoder::new(compressed)
            .take(raw_size as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| anyhow::anyhow!("gzip decompress error: {}", e))?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_shrinks_text() {
        let raw = b"the quick brown fox jumps over the lazy dog. ".repeat(200);
        let codec = GzipCodec::default();
        let compressed = codec.compress_block(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(codec.decompress_block(&compressed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn empty_block_roundtrips() {
        let codec = GzipCodec::new(1);
        let compressed = codec.compress_block(&[]).unwrap();
        assert!(!compressed.is_empty());
        assert!(codec.decompress_block(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(GzipCodec::default().decompress_block(b"definitely not gzip", 64).is_err());
    }

    #[test]
    fn inflation_stops_just_past_recorded_size() {
        let raw = vec![0u8; 4 * 1024 * 1024];
        let codec = GzipCodec::default();
        let compressed = codec.compress_block(&raw).unwrap();
        assert!(compressed.len() < 16 * 1024);

        let inflated = codec.decompress_block(&compressed, 100).unwrap();
        assert_eq!(inflated.len(), 101);
    }
}
