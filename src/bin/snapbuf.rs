//! snapbuf command-line tool
//!
//! Packs a byte stream into a single compressed block through a streaming
//! buffer, and unpacks it again.
//!
//! # Examples
//!
//! ```bash
//! # Compress a file
//! snapbuf pack -i snapshot.bin -o snapshot.zst
//!
//! # Decompress to stdout
//! snapbuf unpack -i snapshot.zst -o -
//!
//! # Show effective settings
//! snapbuf --config snapbuf.toml inspect
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use snapbuf::compression::{decompress, CompressionAlgorithm};
use snapbuf::{Buffer, BufferConfig, PagePool, ReadChannel, WriteChannel};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// snapbuf - chunked streaming buffer with compressed export
#[derive(Parser, Debug)]
#[command(name = "snapbuf")]
#[command(version = snapbuf::VERSION)]
#[command(about = "Chunked streaming buffer with compressed export", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Buffer configuration file (TOML, JSON, YAML, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a stream to its end and write it as one compressed block
    Pack(PackArgs),

    /// Decompress a block produced by `pack`
    Unpack(UnpackArgs),

    /// Print the effective configuration and page pool statistics
    Inspect,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Input file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Store without compression
    #[arg(long)]
    no_compress: bool,
}

#[derive(Args, Debug)]
struct UnpackArgs {
    /// Input file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Input was stored without compression
    #[arg(long)]
    no_compress: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli);

    let config = BufferConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    debug!(?config, "Effective buffer config");

    match cli.command {
        Commands::Pack(args) => pack_command(config, args),
        Commands::Unpack(args) => unpack_command(config, args),
        Commands::Inspect => inspect_command(&config),
    }
}

/// Console logging to stderr so stdout stays free for data
fn setup_logging(cli: &Cli) {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(file))
}

fn open_output(path: &Path) -> anyhow::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdout()));
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn codec(no_compress: bool, config: &BufferConfig) -> CompressionAlgorithm {
    if no_compress {
        CompressionAlgorithm::None
    } else {
        config.compression
    }
}

/// Pack command - fill a buffer from the input until end of stream
fn pack_command(config: BufferConfig, args: PackArgs) -> anyhow::Result<()> {
    let codec = codec(args.no_compress, &config);
    let input = open_input(&args.input)?;
    let mut buffer = Buffer::with_channel(config.with_compression(codec), ReadChannel::new(input));

    loop {
        match buffer.fill_from_channel() {
            Ok(_) => continue,
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => return Err(e).context("Failed to read input"),
        }
    }

    let (block, stats) = buffer
        .export_all_with_stats(&codec)
        .context("Failed to compress input")?;

    let mut output = open_output(&args.output)?;
    output.write_all(&block)?;
    output.flush()?;

    info!(
        original = stats.original_size,
        compressed = stats.exported_size,
        ratio = stats.ratio(),
        chunks = stats.chunks,
        "Packed input"
    );
    Ok(())
}

/// Unpack command - decompress and stream out through a bound buffer
fn unpack_command(config: BufferConfig, args: UnpackArgs) -> anyhow::Result<()> {
    let codec = codec(args.no_compress, &config);

    let mut packed = Vec::new();
    open_input(&args.input)?
        .read_to_end(&mut packed)
        .context("Failed to read input")?;
    let restored = decompress(&packed, &codec).context("Failed to decompress input")?;
    let restored_len = restored.len();

    let output = open_output(&args.output)?;
    let mut buffer = Buffer::with_channel(config, WriteChannel::new(output));
    buffer.append_bytes(restored.into())?;
    buffer.flush(true).context("Failed to write output")?;

    info!(
        compressed = packed.len(),
        original = restored_len,
        "Unpacked input"
    );
    Ok(())
}

/// Inspect command - effective config and page pool usage
fn inspect_command(config: &BufferConfig) -> anyhow::Result<()> {
    println!("# Buffer configuration");
    print!("{}", config.to_toml()?);
    println!();
    println!("# Page pool");
    println!("{}", serde_json::to_string_pretty(&PagePool::global().stats())?);
    Ok(())
}
