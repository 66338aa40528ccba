/// Single-block compression primitive.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` stored in the container header.
/// - Must compress/decompress individual blocks independently; no state may
///   carry from one block to the next. Blocks are processed on many threads
///   at once and in no particular order.
pub trait Codec: Send + Sync {
    /// Stable codec ID stored in the container header.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress a single independent block.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single independent block. Malformed input is an error.
    ///
    /// `raw_size` is the length recorded in the index. Implementations must
    /// not produce much more than that; a longer result is rejected by the
    /// caller anyway, so inflating past `raw_size + 1` bytes is wasted work.
    fn decompress_block(&self, compressed: &[u8], raw_size: usize) -> anyhow::Result<Vec<u8>>;
}
