use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancellationFlag;
use crate::codec::Codec;
use crate::config::PipelineConfig;
use crate::container::{ContainerInput, ContainerOutput};
use crate::error::{ParzError, Result};
use crate::format;
use crate::index;
use crate::planner;
use crate::processor::{BlockProcessor, Mode};
use crate::scheduler::{BatchScheduler, ScheduleReport};

/// Suffix of the per-run scratch directory holding decompressed block files.
const SCRATCH_SUFFIX: &str = "parz-blocks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Compress,
    Decompress,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Compress => f.write_str("compress"),
            Command::Decompress => f.write_str("decompress"),
        }
    }
}

/// Final outcome of a run, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    CancelledByError,
    ApplicationError,
    InputFileDoesNotExist,
    OutputFileExists,
}

impl Status {
    /// Process exit code for this status; zero only for `Ok`.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::ApplicationError => 1,
            Status::CancelledByError => 5,
            Status::InputFileDoesNotExist => 7,
            Status::OutputFileExists => 8,
        }
    }
}

impl From<&ParzError> for Status {
    fn from(err: &ParzError) -> Self {
        match err {
            ParzError::Cancelled { .. } => Status::CancelledByError,
            ParzError::InputNotFound(_) => Status::InputFileDoesNotExist,
            ParzError::OutputExists(_) => Status::OutputFileExists,
            _ => Status::ApplicationError,
        }
    }
}

/// Figures from a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub command: Command,
    pub blocks: usize,
    /// Uncompressed bytes read (compress) or written (decompress).
    pub raw_bytes: u64,
    /// Size of the container written (compress) or read (decompress).
    pub container_bytes: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Compression ratio (raw / container).
    pub fn ratio(&self) -> f64 {
        if self.container_bytes == 0 {
            return 1.0;
        }
        self.raw_bytes as f64 / self.container_bytes as f64
    }
}

/// Drives a whole compress or decompress run over one codec and config.
///
/// # Compress
/// 1. Plan the blocks and reserve a header region sized for their index.
/// 2. Write a filler-only placeholder header.
/// 3. Let the scheduler append every compressed block after it.
/// 4. Encode the completed index and overwrite the placeholder.
///
/// # Decompress
/// 1. Read and validate the header and index.
/// 2. Let the scheduler decompress blocks into a scratch directory and
///    reassemble them, in order, into the output.
///
/// An existing output is refused unless [`Pipeline::overwrite`] allows it.
pub struct Pipeline {
    codec: Arc<dyn Codec>,
    config: PipelineConfig,
    overwrite: bool,
}

impl Pipeline {
    pub fn new(codec: Arc<dyn Codec>, config: PipelineConfig) -> Self {
        Self {
            codec,
            config,
            overwrite: false,
        }
    }

    /// Replace an existing output file instead of failing with `OutputExists`.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn execute(&self, command: Command, input: &Path, output: &Path) -> Result<RunSummary> {
        if !input.exists() {
            return Err(ParzError::InputNotFound(input.to_path_buf()));
        }
        if input == output {
            return Err(ParzError::InvalidInput(format!(
                "input and output are the same file: {input:?}"
            )));
        }
        if output.exists() && !self.overwrite {
            return Err(ParzError::OutputExists(output.to_path_buf()));
        }
        self.config.validate()?;

        tracing::info!(
            %command,
            input = %input.display(),
            output = %output.display(),
            codec = self.codec.name(),
            threads = self.config.thread_pool_size,
            batch = self.config.batch_size,
            "starting run"
        );

        let started = Instant::now();
        let mut summary = match command {
            Command::Compress => self.compress(input, output)?,
            Command::Decompress => self.decompress(input, output)?,
        };
        summary.elapsed = started.elapsed();

        tracing::info!(
            %command,
            blocks = summary.blocks,
            raw = summary.raw_bytes,
            container = summary.container_bytes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<RunSummary> {
        let source = ContainerInput::open(input)?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let mut blocks = planner::plan(&file_name, source.len(), self.config.block_size)?;

        let header_size = format::reserved_header_size(&blocks);
        tracing::debug!(blocks = blocks.len(), header_size, "reserving header region");

        let container = ContainerOutput::create(output)?;
        container.append(&format::placeholder_header(header_size))?;

        let cancel = CancellationFlag::new();
        let processor = BlockProcessor::new(
            self.codec.as_ref(),
            &source,
            Mode::Compress {
                output: &container,
                block_size: self.config.block_size,
            },
            &cancel,
        );
        let report = self.scheduler(&processor, &cancel).run(&mut blocks, None)?;

        if !report.is_success() {
            container.close()?;
            source.close();
            return Err(cancelled(report));
        }

        let payload = index::encode(&blocks)?;
        let header = format::encode_header(self.codec.id(), &payload, header_size)?;
        container.overwrite_at(0, &header)?;

        let container_bytes = container.len()?;
        container.close()?;
        let raw_bytes = source.len();
        source.close();

        Ok(RunSummary {
            command: Command::Compress,
            blocks: blocks.len(),
            raw_bytes,
            container_bytes,
            elapsed: Duration::ZERO,
        })
    }

    fn decompress(&self, input: &Path, output: &Path) -> Result<RunSummary> {
        let source = ContainerInput::open(input)?;
        let (prefix, mut blocks) = format::read_index(&source)?;
        if prefix.codec_id != self.codec.id() {
            return Err(ParzError::InvalidInput(format!(
                "codec mismatch: container uses codec {} but provided codec has id {}",
                prefix.codec_id,
                self.codec.id()
            )));
        }

        let scratch = scratch_dir(output);
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }
        std::fs::create_dir_all(&scratch)?;

        if output.exists() {
            std::fs::remove_file(output)?;
        }
        let target = ContainerOutput::open_for_append(output)?;
        let cancel = CancellationFlag::new();
        let processor = BlockProcessor::new(
            self.codec.as_ref(),
            &source,
            Mode::Decompress {
                scratch_dir: &scratch,
            },
            &cancel,
        );
        let report = self.scheduler(&processor, &cancel).run(&mut blocks, Some(&target))?;

        target.close()?;
        let container_bytes = source.len();
        source.close();

        if !report.is_success() {
            return Err(cancelled(report));
        }
        std::fs::remove_dir_all(&scratch)?;

        Ok(RunSummary {
            command: Command::Decompress,
            blocks: blocks.len(),
            raw_bytes: report.reassembled_bytes,
            container_bytes,
            elapsed: Duration::ZERO,
        })
    }

    fn scheduler<'a>(
        &self,
        processor: &'a BlockProcessor<'a>,
        cancel: &'a CancellationFlag,
    ) -> BatchScheduler<'a> {
        BatchScheduler::new(
            processor,
            cancel,
            self.config.batch_size,
            self.config.thread_pool_size,
        )
    }
}

/// Run `command` from `input` to `output` and report the final status.
///
/// Failures are logged here; callers only see the status. An existing
/// output is refused.
pub fn run(
    command: Command,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    codec: Arc<dyn Codec>,
) -> Status {
    let result = Pipeline::new(codec, config.clone()).execute(command, input, output);
    outcome_status(command, &result)
}

/// Log a failed run and map its outcome to a [`Status`].
pub fn outcome_status(command: Command, result: &Result<RunSummary>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(err) => {
            tracing::error!(%command, error = %err, "run failed");
            Status::from(err)
        }
    }
}

/// Scratch directory used while decompressing into `output`.
pub fn scratch_dir(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{name}.{SCRATCH_SUFFIX}"))
}

fn cancelled(report: ScheduleReport) -> ParzError {
    match report.first_failure {
        Some(failure) => ParzError::Cancelled {
            name: failure.name,
            cause: failure.error.to_string(),
        },
        None => ParzError::Cancelled {
            name: "<none>".into(),
            cause: "blocks did not complete".into(),
        },
    }
}
