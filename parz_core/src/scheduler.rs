use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::thread::{self, Scope, ScopedJoinHandle};

use crossbeam_channel::{bounded, Sender};

use crate::cancel::CancellationFlag;
use crate::container::ContainerOutput;
use crate::error::{ParzError, Result};
use crate::format::MAX_BATCH_SIZE;
use crate::gate::AdmissionGate;
use crate::index::BlockDescriptor;
use crate::processor::{BlockFailure, BlockOutcome, BlockProcessor, BlockState};

/// Reassembled batches allowed to queue up behind the reassembly thread
/// before dispatch of further batches waits for it.
const REASSEMBLY_QUEUE_DEPTH: usize = 2;

/// Result of scheduling every block of a run.
#[derive(Debug)]
pub struct ScheduleReport {
    /// Terminal state of each block, indexed like the scheduled slice.
    pub states: Vec<BlockState>,
    /// The failure that raised the cancellation flag.
    pub first_failure: Option<BlockFailure>,
    /// Blocks that failed, including the first.
    pub failed: usize,
    /// Bytes appended to the reassembly target (decompress only).
    pub reassembled_bytes: u64,
}

impl ScheduleReport {
    pub fn count(&self, state: BlockState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    pub fn is_success(&self) -> bool {
        self.first_failure.is_none() && self.states.iter().all(|&s| s == BlockState::Completed)
    }
}

/// Dispatches blocks to a [`BlockProcessor`] in bounded batches.
///
/// Every block of a batch gets its own thread, admitted through a gate sized
/// to `thread_pool_size`. A batch is joined before the next one starts. The
/// first failing block raises the shared cancellation flag: blocks not yet
/// started end `Cancelled` and later batches are never dispatched.
pub struct BatchScheduler<'a> {
    processor: &'a BlockProcessor<'a>,
    cancel: &'a CancellationFlag,
    batch_size: usize,
    thread_pool_size: usize,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        processor: &'a BlockProcessor<'a>,
        cancel: &'a CancellationFlag,
        batch_size: u32,
        thread_pool_size: u32,
    ) -> Self {
        Self {
            processor,
            cancel,
            batch_size: (batch_size as usize).clamp(1, MAX_BATCH_SIZE as usize),
            thread_pool_size: (thread_pool_size as usize).max(1),
        }
    }

    /// Run every block. `blocks` must be sorted by `order`.
    ///
    /// With a `reassembly` target, each fully completed batch has its temp
    /// files appended to it in block order: inline for small runs, on a
    /// dedicated thread overlapping the next batch for runs of more than
    /// [`MAX_BATCH_SIZE`] blocks.
    ///
    /// Block failures are reported in the returned report. `Err` is reserved
    /// for reassembly I/O failures.
    pub fn run(
        &self,
        blocks: &mut [BlockDescriptor],
        reassembly: Option<&ContainerOutput>,
    ) -> Result<ScheduleReport> {
        let pipelined = blocks.len() > MAX_BATCH_SIZE as usize;
        let mut report = ScheduleReport {
            states: vec![BlockState::Pending; blocks.len()],
            first_failure: None,
            failed: 0,
            reassembled_bytes: 0,
        };

        thread::scope(|scope| -> Result<()> {
            let mut reassembler = match reassembly {
                Some(target) if pipelined => Some(Reassembler::spawn(scope, target)),
                _ => None,
            };

            for (batch_no, batch) in blocks.chunks_mut(self.batch_size).enumerate() {
                let start = batch_no * self.batch_size;
                let states = &mut report.states[start..start + batch.len()];

                if self.cancel.is_cancelled() {
                    states.fill(BlockState::Cancelled);
                    continue;
                }

                tracing::debug!(batch = batch_no, blocks = batch.len(), "dispatching batch");
                let mut batch_ok = true;
                for (i, (outcome, raised)) in self.run_batch(batch).into_iter().enumerate() {
                    states[i] = outcome.state();
                    if let BlockOutcome::Failed(failure) = outcome {
                        batch_ok = false;
                        report.failed += 1;
                        if raised {
                            report.first_failure = Some(failure);
                        }
                    } else if states[i] != BlockState::Completed {
                        batch_ok = false;
                    }
                }

                let Some(target) = reassembly else { continue };
                if !batch_ok || self.cancel.is_cancelled() {
                    continue;
                }
                let parts: Vec<PathBuf> = batch.iter().filter_map(|b| b.output_path.clone()).collect();
                match reassembler.as_mut() {
                    Some(worker) => {
                        if !worker.submit(parts) {
                            self.cancel.cancel();
                            break;
                        }
                    }
                    None => report.reassembled_bytes += reassemble(target, &parts)?,
                }
            }

            if let Some(worker) = reassembler {
                report.reassembled_bytes += worker.finish()?;
            }
            Ok(())
        })?;

        Ok(report)
    }

    /// Spawn and join one thread per block of `batch`, in ascending order.
    ///
    /// Each outcome is paired with whether that block raised the
    /// cancellation flag.
    fn run_batch(&self, batch: &mut [BlockDescriptor]) -> Vec<(BlockOutcome, bool)> {
        let gate = AdmissionGate::new(self.thread_pool_size);

        thread::scope(|s| {
            let handles: Vec<_> = batch
                .iter_mut()
                .map(|block| {
                    let order = block.order;
                    let name = block.name.clone();
                    let gate = &gate;
                    let handle = thread::Builder::new()
                        .name(format!("parz-block-{order}"))
                        .spawn_scoped(s, move || {
                            let _permit = gate.acquire();
                            let outcome = self.processor.process(block);
                            let raised = match &outcome {
                                BlockOutcome::Failed(failure) => self.signal_failure(failure),
                                _ => false,
                            };
                            (outcome, raised)
                        });
                    (order, name, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(order, name, handle)| {
                    let cause = match handle {
                        Ok(handle) => match handle.join() {
                            Ok(result) => return result,
                            Err(_) => "block worker panicked".to_string(),
                        },
                        Err(e) => format!("failed to spawn block worker: {e}"),
                    };
                    let failure = BlockFailure {
                        order,
                        name,
                        error: ParzError::Io(io::Error::other(cause)),
                    };
                    let raised = self.signal_failure(&failure);
                    (BlockOutcome::Failed(failure), raised)
                })
                .collect()
        })
    }

    /// Log a block failure and raise the cancellation flag. Returns `true` if
    /// this failure was the one that raised it.
    fn signal_failure(&self, failure: &BlockFailure) -> bool {
        tracing::error!(block = %failure.name, error = %failure.error, "block failed");
        let raised = self.cancel.cancel();
        if raised {
            tracing::warn!(block = %failure.name, "cancelling remaining blocks");
        }
        raised
    }
}

/// Append `parts` to `target` in the given order, removing each once copied.
fn reassemble(target: &ContainerOutput, parts: &[PathBuf]) -> Result<u64> {
    let mut total = 0;
    for part in parts {
        let mut file = File::open(part)?;
        total += file.metadata()?.len();
        target.append_from(&mut file)?;
        drop(file);
        std::fs::remove_file(part)?;
    }
    Ok(total)
}

/// Ordered reassembly on its own thread, fed batch by batch through a
/// bounded queue. FIFO delivery keeps batches in dispatch order.
struct Reassembler<'scope> {
    queue: Sender<Vec<PathBuf>>,
    worker: ScopedJoinHandle<'scope, Result<u64>>,
}

impl<'scope> Reassembler<'scope> {
    fn spawn<'env>(scope: &'scope Scope<'scope, 'env>, target: &'env ContainerOutput) -> Self {
        let (queue, batches) = bounded::<Vec<PathBuf>>(REASSEMBLY_QUEUE_DEPTH);
        let worker = scope.spawn(move || -> Result<u64> {
            let mut total = 0;
            for parts in batches {
                total += reassemble(target, &parts)?;
            }
            Ok(total)
        });
        Self { queue, worker }
    }

    /// Queue a batch. `false` means the worker has stopped on an error,
    /// which [`Reassembler::finish`] will return.
    fn submit(&mut self, parts: Vec<PathBuf>) -> bool {
        self.queue.send(parts).is_ok()
    }

    /// Close the queue and wait for every queued batch to be written.
    fn finish(self) -> Result<u64> {
        drop(self.queue);
        self.worker
            .join()
            .unwrap_or_else(|_| Err(ParzError::Io(io::Error::other("reassembly worker panicked"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::container::ContainerInput;
    use crate::processor::Mode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Identity codec that fails on any block starting with `b'!'`.
    struct Tripwire {
        calls: AtomicUsize,
    }

    impl Codec for Tripwire {
        fn id(&self) -> u16 {
            250
        }
        fn name(&self) -> &'static str {
            "tripwire"
        }
        fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if raw.first() == Some(&b'!') {
                anyhow::bail!("tripwire hit");
            }
            Ok(raw.to_vec())
        }
        fn decompress_block(&self, compressed: &[u8], _raw_size: usize) -> anyhow::Result<Vec<u8>> {
            Ok(compressed.to_vec())
        }
    }

    fn compress_run(data: &[u8], block_size: u64, batch: u32, threads: u32) -> (ScheduleReport, usize) {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        std::fs::write(&raw, data).unwrap();

        let codec = Tripwire {
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationFlag::new();
        let input = ContainerInput::open(&raw).unwrap();
        let output = ContainerOutput::create(dir.path().join("out")).unwrap();
        let processor = BlockProcessor::new(
            &codec,
            &input,
            Mode::Compress {
                output: &output,
                block_size,
            },
            &cancel,
        );
        let mut blocks = crate::planner::plan("raw", data.len() as u64, block_size).unwrap();
        let report = BatchScheduler::new(&processor, &cancel, batch, threads)
            .run(&mut blocks, None)
            .unwrap();
        (report, codec.calls.load(Ordering::SeqCst))
    }

    #[test]
    fn all_blocks_complete_and_get_offsets() {
        let data = vec![7u8; 10 * 16 + 3];
        let (report, calls) = compress_run(&data, 16, 4, 3);
        assert!(report.is_success());
        assert_eq!(report.states.len(), 11);
        assert_eq!(report.count(BlockState::Completed), 11);
        assert_eq!(calls, 11);
    }

    #[test]
    fn failure_cancels_later_batches() {
        // one block per batch: block 1 trips, blocks 2.. must never be dispatched
        let mut data = vec![0u8; 8 * 4];
        data[4] = b'!';
        let (report, calls) = compress_run(&data, 4, 1, 1);

        assert!(!report.is_success());
        assert_eq!(report.failed, 1);
        let failure = report.first_failure.as_ref().unwrap();
        assert_eq!(failure.name, "raw_block_1");
        assert!(matches!(failure.error, ParzError::Codec(_)));
        assert_eq!(report.states[0], BlockState::Completed);
        assert_eq!(report.states[1], BlockState::Failed);
        assert!(report.states[2..].iter().all(|&s| s == BlockState::Cancelled));
        assert_eq!(calls, 2);
    }

    #[test]
    fn every_block_reaches_a_terminal_state() {
        let mut data = vec![0u8; 64 * 4];
        for i in [5usize, 9, 40] {
            data[i * 4] = b'!';
        }
        let (report, _) = compress_run(&data, 4, 16, 4);

        assert!(report.failed >= 1);
        assert!(report.first_failure.is_some());
        assert!(report
            .states
            .iter()
            .all(|s| matches!(s, BlockState::Completed | BlockState::Cancelled | BlockState::Failed)));
        assert!(report.states[16..].iter().all(|&s| s == BlockState::Cancelled));
    }
}
