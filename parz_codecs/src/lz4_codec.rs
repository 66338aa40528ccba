use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use parz_core::codec::Codec;
use parz_core::format::CODEC_LZ4;

/// LZ4 block codec.
///
/// Fastest of the bundled codecs; the raw length is prepended to each block
/// so decompression can size its buffer up front.
///
/// Best for: fast local disks where decode speed matters more than size.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_size: usize) -> anyhow::Result<Vec<u8>> {
        let prefix: [u8; 4] = compressed
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| anyhow::anyhow!("lz4 block is shorter than its size prefix"))?;
        let declared = u32::from_le_bytes(prefix) as usize;
        if declared > raw_size {
            anyhow::bail!("lz4 block declares {} bytes, index records {}", declared, raw_size);
        }
        decompress_size_prepended(compressed).map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))
    }
}
