//! fastfile: stream files through the buffered engine
//!
//! Usage: fastfile <COMMAND> [OPTIONS]

use clap::{ArgAction, Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fastfile::stream::buffers::DEFAULT_PUSHBACK_CAPACITY;
use fastfile::{
    BufferedStream, CodecDispatcher, ExitInfo, LineEnding, Mode, StreamConfig, StreamError,
};

type Result<T> = std::result::Result<T, StreamError>;

#[derive(Parser)]
#[command(name = "fastfile")]
#[command(version)]
#[command(about = "Copy and count files through block-buffered streams, compressing by extension", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Fixed block size in bytes (default: the filesystem's preferred size)
    #[arg(long, global = true)]
    block_size: Option<usize>,

    /// Pushback capacity in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_PUSHBACK_CAPACITY)]
    pushback: usize,

    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate files, decompressing .gz/.bz2/.xz inputs
    Cat {
        /// Input files (use - for stdin)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file, compressed by extension (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print line and byte counts of the decompressed contents
    Count {
        /// Input files (use - for stdin)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Recompress INPUT into OUTPUT according to their extensions
    Convert {
        /// Input file
        input: PathBuf,

        /// Output file
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            eprintln!("Error: Failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let mut config = StreamConfig::new().with_pushback_capacity(cli.pushback);
    if let Some(block_size) = cli.block_size {
        config = config.with_block_size(block_size);
    }
    let result = config.validate().and_then(|()| {
        let dispatcher = CodecDispatcher::new(config);
        match cli.command {
            Commands::Cat { inputs, output } => run_cat(&dispatcher, &inputs, output.as_deref()),
            Commands::Count { inputs } => run_count(&dispatcher, &inputs),
            Commands::Convert { input, output } => {
                run_cat(&dispatcher, &[input], Some(output.as_path()))
            }
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

fn open_input(dispatcher: &CodecDispatcher, path: &Path) -> Result<BufferedStream> {
    if is_stdio(path) {
        BufferedStream::stdin(dispatcher.config())
    } else {
        dispatcher.open(path, Mode::Read)
    }
}

/// A child that ran but failed is an error for the command as a whole.
fn check_status(status: ExitInfo) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StreamError::ChildFailed(status))
    }
}

fn run_cat(dispatcher: &CodecDispatcher, inputs: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let target = output.filter(|path| !is_stdio(path));
    let mut out = match target {
        Some(path) => dispatcher.open(path, Mode::Write)?,
        None => BufferedStream::stdout(dispatcher.config())?,
    };

    let copied = inputs
        .iter()
        .try_for_each(|input| copy_input(dispatcher, input, &mut out));
    let closed = dispatcher.close(out).and_then(check_status);
    let result = copied.and(closed);

    if result.is_err() {
        if let Some(path) = target {
            warn!(path = %path.display(), "removing partial output");
            let _ = std::fs::remove_file(path);
        }
    }
    result
}

fn copy_input(dispatcher: &CodecDispatcher, path: &Path, out: &mut BufferedStream) -> Result<()> {
    let mut input = open_input(dispatcher, path)?;
    let copied = copy_bytes(&mut input, out);
    let closed = dispatcher.close(input).and_then(check_status);
    let copied = copied?;
    debug!(path = %path.display(), bytes = copied, "copied input");
    closed
}

fn copy_bytes(input: &mut BufferedStream, out: &mut BufferedStream) -> Result<u64> {
    let mut copied = 0u64;
    while let Some(byte) = input.read_byte()? {
        out.write_byte(byte)?;
        copied += 1;
    }
    Ok(copied)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    lines: u64,
    bytes: u64,
}

fn run_count(dispatcher: &CodecDispatcher, inputs: &[PathBuf]) -> Result<()> {
    let counts: Vec<Result<Counts>> = inputs
        .par_iter()
        .map(|input| count_input(dispatcher, input))
        .collect();

    let mut out = BufferedStream::stdout(dispatcher.config())?;
    let written = write_counts(&mut out, inputs, counts);
    let closed = dispatcher.close(out).map(|_| ());
    written.and(closed)
}

fn count_input(dispatcher: &CodecDispatcher, path: &Path) -> Result<Counts> {
    let mut input = open_input(dispatcher, path)?;
    let mut counts = Counts::default();
    let mut line = Vec::new();
    let scanned = loop {
        match input.read_line_growable(&mut line) {
            Ok(LineEnding::Newline) => {
                counts.lines += 1;
                counts.bytes += line.len() as u64 + 1;
            }
            Ok(LineEnding::EndOfStream) => {
                if !line.is_empty() {
                    counts.lines += 1;
                    counts.bytes += line.len() as u64;
                }
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };
    let closed = dispatcher.close(input).and_then(check_status);
    scanned.and(closed)?;
    debug!(path = %path.display(), lines = counts.lines, bytes = counts.bytes, "counted input");
    Ok(counts)
}

fn write_counts(
    out: &mut BufferedStream,
    inputs: &[PathBuf],
    counts: Vec<Result<Counts>>,
) -> Result<()> {
    let mut buf = itoa::Buffer::new();
    for (path, counts) in inputs.iter().zip(counts) {
        let counts = counts?;
        out.write_bytes(buf.format(counts.lines).as_bytes())?;
        out.write_byte(b'\t')?;
        out.write_bytes(buf.format(counts.bytes).as_bytes())?;
        out.write_byte(b'\t')?;
        out.write_string(&path.to_string_lossy())?;
        out.write_byte(b'\n')?;
    }
    Ok(())
}
