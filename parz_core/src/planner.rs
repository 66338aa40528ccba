use crate::error::{ParzError, Result};
use crate::index::BlockDescriptor;

/// Partition a file of `file_length` bytes into ordered blocks of
/// `block_size` bytes.
///
/// The last block holds the remainder and may be shorter. An exact multiple
/// of `block_size` produces no trailing zero-size block; an empty file
/// produces exactly one zero-size block so every plan has at least one entry.
pub fn plan(file_name: &str, file_length: u64, block_size: u64) -> Result<Vec<BlockDescriptor>> {
    if block_size == 0 {
        return Err(ParzError::InvalidInput("block size must be greater than zero".into()));
    }

    let full_blocks = file_length / block_size;
    let remainder = file_length - full_blocks * block_size;

    let mut blocks: Vec<BlockDescriptor> = (0..full_blocks)
        .map(|order| BlockDescriptor::new(order, block_name(file_name, order), block_size))
        .collect();

    if remainder > 0 || full_blocks == 0 {
        blocks.push(BlockDescriptor::new(
            full_blocks,
            block_name(file_name, full_blocks),
            remainder,
        ));
    }

    Ok(blocks)
}

/// Byte offset within the original file at which block `order` starts.
#[inline]
pub fn byte_offset(order: u64, block_size: u64) -> u64 {
    order * block_size
}

fn block_name(file_name: &str, order: u64) -> String {
    format!("{file_name}_block_{order}")
}
