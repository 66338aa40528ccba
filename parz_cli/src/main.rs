mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parz_codecs::{codec_by_id, codec_by_name};
use parz_core::container::ContainerInput;
use parz_core::format;
use parz_core::{outcome_status, Command, ParzError, Pipeline, RunSummary, Status};

use crate::config::ConfigOverrides;

/// Extension given to containers when no output path is supplied.
const CONTAINER_EXTENSION: &str = "parz";

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "parz",
    about = "Parallel block archiver: compress a file into independently addressable blocks and back",
    version
)]
struct Cli {
    /// TOML config file (defaults to ./parz.toml when present)
    #[arg(long, global = true, env = "PARZ_CONFIG")]
    config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a PARZ container
    Compress {
        /// Source file
        input: PathBuf,
        /// Destination container (default: <input>.parz)
        output: Option<PathBuf>,
        /// Codec to use: gzip | zstd | lz4 | passthrough
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        /// Codec level (gzip 0–9, zstd 1–22)
        #[arg(long)]
        level: Option<i32>,
        /// Replace the output if it already exists
        #[arg(short, long)]
        force: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Decompress a PARZ container back to the original bytes
    Decompress {
        /// Source container
        input: PathBuf,
        /// Destination file (default: <input> without .parz, else <input>.out)
        output: Option<PathBuf>,
        /// Replace the output if it already exists
        #[arg(short, long)]
        force: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Print the container header and block index
    Inspect {
        /// Container to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
}

#[derive(Args)]
struct TuningArgs {
    /// Raw bytes per block (compress only; default 1 MiB)
    #[arg(short, long)]
    block_size: Option<u64>,
    /// Blocks dispatched together (1–64)
    #[arg(long)]
    batch_size: Option<u32>,
    /// Block processors running at once (default: CPUs − 1)
    #[arg(short = 't', long = "threads")]
    thread_pool_size: Option<u32>,
}

impl From<TuningArgs> for ConfigOverrides {
    fn from(args: TuningArgs) -> Self {
        Self {
            block_size: args.block_size,
            batch_size: args.batch_size,
            thread_pool_size: args.thread_pool_size,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parz_core={level},parz_cli={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn default_compress_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".");
    name.push(CONTAINER_EXTENSION);
    PathBuf::from(name)
}

fn default_decompress_output(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == CONTAINER_EXTENSION) {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_os_string();
        name.push(".out");
        PathBuf::from(name)
    }
}

fn print_summary(summary: &RunSummary, codec_name: &str) {
    eprintln!("  codec       : {}", codec_name);
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  raw size    : {}", human_bytes(summary.raw_bytes));
    eprintln!("  container   : {}", human_bytes(summary.container_bytes));
    eprintln!("  ratio       : {:.2}x", summary.ratio());
    let secs = summary.elapsed.as_secs_f64();
    if secs > 0.0 {
        eprintln!(
            "  throughput  : {}/s",
            human_bytes((summary.raw_bytes as f64 / secs) as u64)
        );
    }
    eprintln!("  elapsed     : {:.3}s", secs);
}

/// Report the outcome of a pipeline run and turn it into a status.
fn finish(command: Command, result: parz_core::Result<RunSummary>, codec_name: &str) -> Status {
    if let Ok(summary) = &result {
        print_summary(summary, codec_name);
    }
    let status = outcome_status(command, &result);
    eprintln!("  status      : {:?}", status);
    status
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    cli_config: Option<&Path>,
    input: PathBuf,
    output: Option<PathBuf>,
    codec_name: &str,
    level: Option<i32>,
    force: bool,
    tuning: TuningArgs,
) -> anyhow::Result<Status> {
    let config = config::load(cli_config, &tuning.into())?;
    let codec = codec_by_name(codec_name, level)?;
    let output = output.unwrap_or_else(|| default_compress_output(&input));

    let display = codec.name();
    let result = Pipeline::new(codec, config)
        .overwrite(force)
        .execute(Command::Compress, &input, &output);
    Ok(finish(Command::Compress, result, display))
}

fn run_decompress(
    cli_config: Option<&Path>,
    input: PathBuf,
    output: Option<PathBuf>,
    force: bool,
    tuning: TuningArgs,
) -> anyhow::Result<Status> {
    if !input.exists() {
        return Ok(finish(Command::Decompress, Err(ParzError::InputNotFound(input)), "-"));
    }
    let config = config::load(cli_config, &tuning.into())?;

    // the header names the codec the container was written with
    let codec_id = format::peek_codec_id(&input)
        .with_context(|| format!("reading container header of {:?}", input))?;
    let codec = codec_by_id(codec_id)?;
    let output = output.unwrap_or_else(|| default_decompress_output(&input));

    let display = codec.name();
    let result = Pipeline::new(codec, config)
        .overwrite(force)
        .execute(Command::Decompress, &input, &output);
    Ok(finish(Command::Decompress, result, display))
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<Status> {
    let source = ContainerInput::open(&file).with_context(|| format!("opening {:?}", file))?;
    let (prefix, blocks) = format::read_index(&source)?;
    let codec_name = codec_by_id(prefix.codec_id).map(|c| c.name()).unwrap_or("unknown");

    let raw: u64 = blocks.iter().map(|b| b.raw_size).sum();
    let compressed: u64 = blocks.iter().filter_map(|b| b.compressed_size).sum();
    let ratio = if compressed == 0 { 1.0 } else { raw as f64 / compressed as f64 };

    println!("=== PARZ container: {:?} ===", file);
    println!();
    println!("  codec          : {} (id={})", codec_name, prefix.codec_id);
    println!("  index payload  : {} bytes", prefix.payload_len);
    println!("  block count    : {}", blocks.len());
    println!("  raw size       : {}", human_bytes(raw));
    println!("  compressed     : {}", human_bytes(compressed));
    println!("  file on disk   : {}", human_bytes(source.len()));
    println!("  ratio          : {:.2}x", ratio);

    if show_blocks {
        println!();
        println!(
            "  {:>8}  {:>14}  {:>12}  {:>12}  {:>16}",
            "block", "file offset", "compressed", "raw", "checksum"
        );
        println!("  {}", "-".repeat(70));
        for b in &blocks {
            println!(
                "  {:>8}  {:>14}  {:>12}  {:>12}  {:016x}",
                b.order,
                b.container_offset.unwrap_or_default(),
                human_bytes(b.compressed_size.unwrap_or_default()),
                human_bytes(b.raw_size),
                b.checksum.unwrap_or_default()
            );
        }
    }

    source.close();
    Ok(Status::Ok)
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cli_config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Compress {
            input,
            output,
            codec,
            level,
            force,
            tuning,
        } => run_compress(cli_config, input, output, &codec, level, force, tuning),
        Commands::Decompress {
            input,
            output,
            force,
            tuning,
        } => run_decompress(cli_config, input, output, force, tuning),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
    };

    let status = match result {
        Ok(status) => status,
        Err(err) => {
            eprintln!("error: {:#}", err);
            Status::ApplicationError
        }
    };
    ExitCode::from(status.exit_code() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn force_flag_is_per_subcommand() {
        let cli = Cli::try_parse_from(["parz", "decompress", "a.parz", "-f"]).unwrap();
        assert!(matches!(cli.command, Commands::Decompress { force: true, .. }));
        let cli = Cli::try_parse_from(["parz", "compress", "a.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::Compress { force: false, .. }));
    }

    #[test]
    fn default_output_names() {
        assert_eq!(default_compress_output(Path::new("/d/a.txt")), PathBuf::from("/d/a.txt.parz"));
        assert_eq!(default_decompress_output(Path::new("/d/a.txt.parz")), PathBuf::from("/d/a.txt"));
        assert_eq!(default_decompress_output(Path::new("/d/blob")), PathBuf::from("/d/blob.out"));
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
