use std::path::Path;

use crate::container::ContainerInput;
use crate::error::{ParzError, Result};
use crate::index::{self, BlockDescriptor};

/// Identifies a PARZ container. Stored in the reserved bytes after the
/// length prefix.
pub const MAGIC: &[u8; 4] = b"PRZ1";

/// Bytes before the index payload.
///   payload_len:u32 + magic[4] + codec_id:u16 + reserved[6]
///   = 4 + 4 + 2 + 6 = 16
pub const FIXED_PREFIX: u64 = 16;

/// Padding written after the index payload up to the end of the header region.
pub const FILLER: u8 = b' ';

/// Default raw bytes per block: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Upper bound on blocks dispatched together in one batch.
pub const MAX_BATCH_SIZE: u32 = 64;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_GZIP: u16 = 1;
pub const CODEC_ZSTD: u16 = 2;
pub const CODEC_LZ4: u16 = 3;

// ── Header prefix ──────────────────────────────────────────────────────────

/// Decoded representation of the fixed 16-byte header prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPrefix {
    /// Length of the JSON index payload that follows the prefix.
    pub payload_len: u32,
    pub codec_id: u16,
}

impl HeaderPrefix {
    /// Serialize to exactly `FIXED_PREFIX` bytes.
    pub fn to_bytes(&self) -> [u8; FIXED_PREFIX as usize] {
        let mut buf = [0u8; FIXED_PREFIX as usize];
        buf[0..4].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[4..8].copy_from_slice(MAGIC);
        buf[8..10].copy_from_slice(&self.codec_id.to_le_bytes());
        // reserved[6] stays zero
        buf
    }

    /// Deserialize from `FIXED_PREFIX` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; FIXED_PREFIX as usize]) -> Result<Self> {
        if &buf[4..8] != MAGIC {
            return Err(ParzError::CorruptIndex(
                "invalid magic bytes, not a PARZ container".into(),
            ));
        }
        Ok(Self {
            payload_len: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            codec_id: u16::from_le_bytes([buf[8], buf[9]]),
        })
    }
}

// ── Header region ──────────────────────────────────────────────────────────

/// Size of the header region reserved before any block is written.
///
/// Large enough for the encoded index of `descriptors` whatever offsets,
/// sizes, and checksums end up being recorded on them.
pub fn reserved_header_size(descriptors: &[BlockDescriptor]) -> u64 {
    FIXED_PREFIX + index::payload_bound(descriptors)
}

/// Filler-only header written during the first pass.
pub fn placeholder_header(header_size: u64) -> Vec<u8> {
    vec![FILLER; header_size as usize]
}

/// Build the final header region: prefix, payload, filler.
///
/// Fails with `IndexOverflow` when the payload does not fit the reservation.
pub fn encode_header(codec_id: u16, payload: &[u8], header_size: u64) -> Result<Vec<u8>> {
    let needed = FIXED_PREFIX + payload.len() as u64;
    if needed > header_size || payload.len() > u32::MAX as usize {
        return Err(ParzError::IndexOverflow {
            needed,
            reserved: header_size,
        });
    }

    let prefix = HeaderPrefix {
        payload_len: payload.len() as u32,
        codec_id,
    };
    let mut buf = Vec::with_capacity(header_size as usize);
    buf.extend_from_slice(&prefix.to_bytes());
    buf.extend_from_slice(payload);
    buf.resize(header_size as usize, FILLER);
    Ok(buf)
}

/// Read and validate the header of an open container.
///
/// Returns the prefix and the decoded block list. Every block span must lie
/// past the index payload and inside the container.
pub fn read_index(input: &ContainerInput) -> Result<(HeaderPrefix, Vec<BlockDescriptor>)> {
    let prefix = read_prefix(input)?;

    let payload_end = FIXED_PREFIX + prefix.payload_len as u64;
    if payload_end > input.len() {
        return Err(ParzError::CorruptIndex(format!(
            "length prefix {} runs past the end of a {}-byte container",
            prefix.payload_len,
            input.len()
        )));
    }
    let payload = input.read_at(FIXED_PREFIX, prefix.payload_len as u64)?;
    let descriptors = index::decode(&payload)?;

    for d in &descriptors {
        // decode() guarantees both are present
        let offset = d.container_offset.unwrap_or_default();
        let size = d.compressed_size.unwrap_or_default();
        let end = offset.checked_add(size);
        if offset < payload_end || end.map_or(true, |end| end > input.len()) {
            return Err(ParzError::CorruptIndex(format!(
                "block {} span {}+{} lies outside the container payload area",
                d.name, offset, size
            )));
        }
    }

    Ok((prefix, descriptors))
}

/// Read only the codec id of the container at `path`, so a caller can pick
/// the matching codec before decompressing.
pub fn peek_codec_id(path: impl AsRef<Path>) -> Result<u16> {
    let input = ContainerInput::open(path)?;
    let prefix = read_prefix(&input)?;
    input.close();
    Ok(prefix.codec_id)
}

fn read_prefix(input: &ContainerInput) -> Result<HeaderPrefix> {
    let bytes = input.read_at(0, FIXED_PREFIX)?;
    let mut buf = [0u8; FIXED_PREFIX as usize];
    buf.copy_from_slice(&bytes);
    HeaderPrefix::from_bytes(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner;

    #[test]
    fn prefix_layout_is_fixed() {
        let prefix = HeaderPrefix {
            payload_len: 0x0102_0304,
            codec_id: CODEC_GZIP,
        };
        let bytes = prefix.to_bytes();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..8], MAGIC);
        assert_eq!(&bytes[8..10], &[1, 0]);
        assert_eq!(HeaderPrefix::from_bytes(&bytes).unwrap(), prefix);
    }

    #[test]
    fn bad_magic_is_corrupt_index() {
        let mut bytes = HeaderPrefix {
            payload_len: 2,
            codec_id: 0,
        }
        .to_bytes();
        bytes[5] = b'X';
        assert!(matches!(
            HeaderPrefix::from_bytes(&bytes),
            Err(ParzError::CorruptIndex(_))
        ));
    }

    #[test]
    fn header_is_padded_to_reservation() {
        let header = encode_header(CODEC_ZSTD, b"[]", 40).unwrap();
        assert_eq!(header.len(), 40);
        assert_eq!(&header[16..18], b"[]");
        assert!(header[18..].iter().all(|&b| b == FILLER));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![b'x'; 100];
        match encode_header(CODEC_GZIP, &payload, 64) {
            Err(ParzError::IndexOverflow { needed, reserved }) => {
                assert_eq!((needed, reserved), (116, 64));
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn reservation_grows_with_block_count() {
        let small = planner::plan("f", 10, 1).unwrap();
        let large = planner::plan("f", 1000, 1).unwrap();
        assert!(reserved_header_size(&large) > reserved_header_size(&small));
        assert!(reserved_header_size(&small) > FIXED_PREFIX);
    }
}
