use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::cancel::CancellationFlag;
use crate::codec::Codec;
use crate::container::{ContainerInput, ContainerOutput};
use crate::error::{ParzError, Result};
use crate::index::BlockDescriptor;
use crate::planner;

/// Lifecycle of one block: `Pending -> Running -> {Completed | Cancelled | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// A single block's failure, carried back to the scheduler.
#[derive(Debug)]
pub struct BlockFailure {
    pub order: u64,
    pub name: String,
    pub error: ParzError,
}

#[derive(Debug)]
pub enum BlockOutcome {
    Completed,
    /// The cancellation flag was up when the block was dispatched; no work was done.
    Cancelled,
    Failed(BlockFailure),
}

impl BlockOutcome {
    pub fn state(&self) -> BlockState {
        match self {
            BlockOutcome::Completed => BlockState::Completed,
            BlockOutcome::Cancelled => BlockState::Cancelled,
            BlockOutcome::Failed(_) => BlockState::Failed,
        }
    }
}

/// What a processor does with each block.
#[derive(Clone, Copy)]
pub enum Mode<'a> {
    /// Read the raw span from the input, compress it, append to `output`.
    Compress {
        output: &'a ContainerOutput,
        block_size: u64,
    },
    /// Read the compressed span from the input container, decompress it into
    /// a temp file under `scratch_dir`.
    Decompress { scratch_dir: &'a Path },
}

/// Runs one block at a time against the run's shared handles.
///
/// Borrowed by every block thread of a batch; a processor holds no per-block
/// state of its own.
pub struct BlockProcessor<'a> {
    codec: &'a dyn Codec,
    input: &'a ContainerInput,
    mode: Mode<'a>,
    cancel: &'a CancellationFlag,
}

impl<'a> BlockProcessor<'a> {
    pub fn new(
        codec: &'a dyn Codec,
        input: &'a ContainerInput,
        mode: Mode<'a>,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            codec,
            input,
            mode,
            cancel,
        }
    }

    /// Process `block`, recording its location (compress) or temp file
    /// (decompress) on the descriptor. Never retries.
    pub fn process(&self, block: &mut BlockDescriptor) -> BlockOutcome {
        if self.cancel.is_cancelled() {
            tracing::debug!(block = %block.name, "block cancelled before start");
            return BlockOutcome::Cancelled;
        }
        tracing::trace!(block = %block.name, state = ?BlockState::Running);

        let result = match self.mode {
            Mode::Compress { output, block_size } => self.compress(block, output, block_size),
            Mode::Decompress { scratch_dir } => self.decompress(block, scratch_dir),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    block = %block.name,
                    raw = block.raw_size,
                    compressed = ?block.compressed_size,
                    "block completed"
                );
                BlockOutcome::Completed
            }
            Err(error) => BlockOutcome::Failed(BlockFailure {
                order: block.order,
                name: block.name.clone(),
                error,
            }),
        }
    }

    fn compress(
        &self,
        block: &mut BlockDescriptor,
        output: &ContainerOutput,
        block_size: u64,
    ) -> Result<()> {
        let raw = self
            .input
            .read_at(planner::byte_offset(block.order, block_size), block.raw_size)?;
        let compressed = self
            .codec
            .compress_block(&raw)
            .map_err(|e| ParzError::Codec(format!("{e:#}")))?;
        let checksum = xxh3_64(&compressed);

        let offset = output.append(&compressed)?;

        block.container_offset = Some(offset);
        block.compressed_size = Some(compressed.len() as u64);
        block.checksum = Some(checksum);
        Ok(())
    }

    fn decompress(&self, block: &mut BlockDescriptor, scratch_dir: &Path) -> Result<()> {
        let (offset, size) = match (block.container_offset, block.compressed_size) {
            (Some(offset), Some(size)) => (offset, size),
            _ => {
                return Err(ParzError::CorruptIndex(format!(
                    "block {} has no recorded container location",
                    block.name
                )))
            }
        };

        let compressed = self.input.read_at(offset, size)?;

        if let Some(expected) = block.checksum {
            let actual = xxh3_64(&compressed);
            if actual != expected {
                return Err(ParzError::ChecksumMismatch {
                    name: block.name.clone(),
                    expected,
                    actual,
                });
            }
        }

        let raw_size = usize::try_from(block.raw_size).map_err(|_| {
            ParzError::CorruptIndex(format!("block {} raw size {} is too large", block.name, block.raw_size))
        })?;
        let raw = self
            .codec
            .decompress_block(&compressed, raw_size)
            .map_err(|e| ParzError::Codec(format!("{e:#}")))?;
        if raw.len() as u64 != block.raw_size {
            return Err(ParzError::BlockSizeMismatch {
                name: block.name.clone(),
                expected: block.raw_size,
                actual: raw.len() as u64,
            });
        }

        let path = part_path(scratch_dir, block.order);
        std::fs::write(&path, &raw)?;
        block.output_path = Some(path);
        Ok(())
    }
}

/// Temp file holding the decompressed bytes of block `order`.
///
/// Built from the order alone: block names come from the container index and
/// never reach the filesystem.
fn part_path(scratch_dir: &Path, order: u64) -> PathBuf {
    scratch_dir.join(format!("block_{order}.part"))
}
