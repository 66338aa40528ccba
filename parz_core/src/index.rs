use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ParzError, Result};

/// Widest decimal rendering of a `u64` field in the JSON payload.
const U64_DIGITS: u64 = 20;

/// Numeric fields per serialized entry: order, raw_size, container_offset,
/// compressed_size, checksum.
const NUMERIC_FIELDS: u64 = 5;

/// Upper bound for the punctuation and key names of one serialized entry,
/// including the separating comma.
/// `{"order":,"name":"","raw_size":,"container_offset":,"compressed_size":,"checksum":},`
/// is 84 bytes.
const ENTRY_OVERHEAD: u64 = 96;

/// Worst-case growth of a string under JSON escaping (`\u00XX`).
const ESCAPE_FACTOR: u64 = 6;

/// Metadata for one block of the partitioned input.
///
/// Created by the planner with `order`, `name`, and `raw_size`. The
/// remaining fields are filled in by the block processor as the block
/// completes. `output_path` is local to a decompress run and is never
/// written into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Dense position `0..N-1`: input read position and reassembly position.
    pub order: u64,
    /// `"{file}_block_{order}"`, used for temp-file naming.
    pub name: String,
    /// Bytes of original data spanned by this block.
    pub raw_size: u64,
    /// Byte offset of the compressed payload from the container start.
    pub container_offset: Option<u64>,
    /// Length of the compressed payload in bytes.
    pub compressed_size: Option<u64>,
    /// xxhash3-64 of the compressed payload.
    pub checksum: Option<u64>,
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
}

impl BlockDescriptor {
    pub fn new(order: u64, name: String, raw_size: u64) -> Self {
        Self {
            order,
            name,
            raw_size,
            container_offset: None,
            compressed_size: None,
            checksum: None,
            output_path: None,
        }
    }

    /// True once offset, size, and checksum have all been recorded.
    pub fn is_located(&self) -> bool {
        self.container_offset.is_some() && self.compressed_size.is_some() && self.checksum.is_some()
    }
}

/// Upper bound on the serialized size of a single entry whose name is at
/// most `max_name_len` bytes.
pub fn per_entry_estimate(max_name_len: usize) -> u64 {
    ENTRY_OVERHEAD + NUMERIC_FIELDS * U64_DIGITS + ESCAPE_FACTOR * max_name_len as u64
}

/// Upper bound on `encode(descriptors).len()` for any values the processor
/// may later record on these descriptors.
pub fn payload_bound(descriptors: &[BlockDescriptor]) -> u64 {
    let max_name_len = descriptors.iter().map(|d| d.name.len()).max().unwrap_or(0);
    // surrounding `[` `]`
    2 + descriptors.len() as u64 * per_entry_estimate(max_name_len)
}

/// Serialize the completed descriptor list into the index payload.
pub fn encode(descriptors: &[BlockDescriptor]) -> Result<Vec<u8>> {
    if let Some(d) = descriptors.iter().find(|d| !d.is_located()) {
        return Err(ParzError::CorruptIndex(format!(
            "block {} has no recorded container location",
            d.name
        )));
    }
    serde_json::to_vec(descriptors).map_err(|e| ParzError::CorruptIndex(e.to_string()))
}

/// Parse an index payload and check that it describes a complete, dense
/// block list.
pub fn decode(payload: &[u8]) -> Result<Vec<BlockDescriptor>> {
    let descriptors: Vec<BlockDescriptor> =
        serde_json::from_slice(payload).map_err(|e| ParzError::CorruptIndex(e.to_string()))?;

    if descriptors.is_empty() {
        return Err(ParzError::CorruptIndex("index lists no blocks".into()));
    }
    for (expected, d) in descriptors.iter().enumerate() {
        if d.order != expected as u64 {
            return Err(ParzError::CorruptIndex(format!(
                "block order {} found where {} was expected",
                d.order, expected
            )));
        }
        if !d.is_located() {
            return Err(ParzError::CorruptIndex(format!(
                "block {} is missing its offset, size or checksum",
                d.name
            )));
        }
    }
    Ok(descriptors)
}
