use parz_core::codec::Codec;
use parz_core::format::CODEC_PASSTHROUGH;

/// No-op codec: stores blocks verbatim.
///
/// Useful for checking the container round trip independently of any codec,
/// and for inputs that are already compressed.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_size: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_bytes_verbatim() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let stored = PassThroughCodec.compress_block(&raw).unwrap();
        assert_eq!(stored, raw);
        assert_eq!(PassThroughCodec.decompress_block(&stored, raw.len()).unwrap(), raw);
    }
}
