//! tarsplitter: split a tar archive into size-bounded pieces
//!
//! Every piece is a complete tar archive holding whole entries, so each one
//! can be extracted independently:
//!
//! ```bash
//! tarsplitter split backup.tar.gz /srv/parts --split-size 100
//! ls /srv/parts
//! # backup_000000.tar.gz  backup_000001.tar.gz  ...
//! ```
//!
//! Compressed input is detected from the gzip magic bytes, not the file
//! name. By default the pieces are compressed when the input was.
//!
//! Logging goes to stderr; stdout only carries the summary selected with
//! `--format`.

mod output;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use output::{OutputFormat, format_size, render_stats};
use std::fs::File;
use std::path::{Path, PathBuf};
use tarsplitter::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tarsplitter")]
#[command(version, about = "Split tar archives into size-bounded pieces", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a tar (or tar.gz) archive into pieces on entry boundaries
    Split {
        /// Archive to split
        tar_file: PathBuf,

        /// Directory receiving the pieces (created if missing)
        dest_dir: PathBuf,

        /// Maximum size of each piece in MiB, measured before compression
        #[arg(
            short,
            long,
            env = "TARSPLITTER_SPLIT_SIZE",
            default_value_t = DEFAULT_SPLIT_SIZE_MIB,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        split_size: u64,

        /// Compression of the pieces
        #[arg(long, value_enum, default_value = "auto")]
        output: OutputCompression,

        /// Gzip level for compressed pieces
        #[arg(
            long,
            default_value_t = DEFAULT_GZIP_LEVEL,
            value_parser = clap::value_parser!(u32).range(0..=9)
        )]
        level: u32,

        /// Base name of the pieces (default: input file name without extensions)
        #[arg(long)]
        name: Option<String>,

        /// Summary format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Compression of the produced pieces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputCompression {
    /// Same as the input.
    #[default]
    Auto,
    /// Plain tar.
    Tar,
    /// Gzip-compressed tar.
    TarGz,
}

impl OutputCompression {
    fn gzip(self, input_is_gzip: bool) -> bool {
        match self {
            OutputCompression::Auto => input_is_gzip,
            OutputCompression::Tar => false,
            OutputCompression::TarGz => true,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Split {
            tar_file,
            dest_dir,
            split_size,
            output,
            level,
            name,
            format,
        } => {
            let config = SplitConfig::from_mib(split_size).with_gzip_level(level);
            split_archive(&tar_file, &dest_dir, config, output, name, format)?
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` overrides `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn split_archive(
    tar_file: &Path,
    dest_dir: &Path,
    config: SplitConfig,
    output: OutputCompression,
    name: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let gzip_input = is_gzip_file(tar_file)
        .with_context(|| format!("Failed to read {}", tar_file.display()))?;
    let config = config
        .with_gzip_input(gzip_input)
        .with_gzip_output(output.gzip(gzip_input));
    tracing::debug!(
        "splitting {} (gzip input: {}, gzip output: {}) into {}",
        tar_file.display(),
        config.gzip_input,
        config.gzip_output,
        dest_dir.display()
    );

    let base = name.unwrap_or_else(|| base_name(tar_file));
    let splitter = TarSplitter::new(dest_dir, base, config)
        .with_context(|| format!("Failed to prepare {}", dest_dir.display()))?;

    let input =
        File::open(tar_file).with_context(|| format!("Failed to open {}", tar_file.display()))?;
    let stats = splitter
        .split(input)
        .with_context(|| format!("Failed to split {}", tar_file.display()))?;

    let rendered = render_stats(&stats, format).context("Failed to render summary")?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }

    if matches!(format, OutputFormat::Text) {
        let total: u64 = stats.files.iter().map(|f| f.bytes).sum();
        eprintln!(
            "Split {} entries into {} archive(s), {} of tar data",
            stats.records,
            stats.files.len(),
            format_size(total)
        );
    }

    Ok(())
}
