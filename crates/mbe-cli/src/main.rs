//! mbe - A tool for converting and patching .mbe game data tables
//!
//! Usage:
//!   mbe info <mbe_file>                        - Show sheets and layout
//!   mbe export <mbe_file|dir> [-o output]      - Export sheets to CSV
//!   mbe import <csv...> -o <mbe_file> [--base]  - Build an MBE from CSV
//!   mbe diff <base> <modified> -o <patch.json> - Write a JSON patch
//!   mbe patch <mbe_file> <patch.json>          - Apply a JSON patch

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use mvlib::mbe::utils::{
    apply_patch_file, export_csv, export_dir, import_csv, show_mbe_info, write_patch,
};
use mvlib::CsvOptions;

#[derive(Parser)]
#[command(name = "mbe")]
#[command(version = "0.1.0")]
#[command(about = "Convert, diff and patch .mbe game data tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CsvArgs {
    /// CSV field delimiter
    #[arg(short, long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,
    /// Write \r\n line endings
    #[arg(long)]
    crlf: bool,
    /// Strip one extra layer of quotes around string cells
    #[arg(long)]
    legacy_quotes: bool,
}

impl From<&CsvArgs> for CsvOptions {
    fn from(args: &CsvArgs) -> Self {
        CsvOptions {
            delimiter: args.delimiter,
            crlf: args.crlf,
            legacy_quotes: args.legacy_quotes,
        }
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(format!("delimiter must be a single ASCII character, got {:?}", s)),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show sheets, row counts and column layout
    Info {
        /// Path to the .mbe file
        mbe_file: PathBuf,
    },
    /// Export sheets to CSV files
    Export {
        /// Path to an .mbe file or a directory of .mbe files
        input: PathBuf,
        /// Output directory (default: input path without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Filter pattern for directory export (e.g., *.mbe, item)
        #[arg(short, long)]
        filter: Option<String>,
        #[command(flatten)]
        csv: CsvArgs,
    },
    /// Build an .mbe file from CSV files
    Import {
        /// CSV files or directories containing them
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Output .mbe file
        #[arg(short, long)]
        output: PathBuf,
        /// Existing .mbe file whose sheets are kept unless replaced
        #[arg(short, long)]
        base: Option<PathBuf>,
        #[command(flatten)]
        csv: CsvArgs,
    },
    /// Write a JSON patch of the changes between two .mbe files
    Diff {
        /// Original .mbe file
        base: PathBuf,
        /// Modified .mbe file
        modified: PathBuf,
        /// Output patch file
        #[arg(short, long, default_value = "patch.json")]
        output: PathBuf,
    },
    /// Apply a JSON patch to an .mbe file
    Patch {
        /// Target .mbe file
        mbe_file: PathBuf,
        /// Patch file produced by `mbe diff`
        patch_file: PathBuf,
        /// Output .mbe file (default: overwrite the target)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { mbe_file } => {
            show_mbe_info(&mbe_file)?;
        }
        Commands::Export {
            input,
            output,
            filter,
            csv,
        } => {
            let options = CsvOptions::from(&csv);
            if input.is_dir() {
                let output = output.unwrap_or_else(|| input.join("csv"));
                export_dir(&input, &output, filter.as_deref(), &options)?;
            } else if input.is_file() {
                if filter.is_some() {
                    debug!("Filter ignored for single file export");
                }
                export_csv(&input, output.as_deref(), &options)?;
            } else {
                bail!("{} is not a valid file or directory", input.display());
            }
        }
        Commands::Import {
            inputs,
            output,
            base,
            csv,
        } => {
            import_csv(&inputs, base.as_deref(), &output, &CsvOptions::from(&csv))?;
        }
        Commands::Diff {
            base,
            modified,
            output,
        } => {
            write_patch(&base, &modified, &output)?;
        }
        Commands::Patch {
            mbe_file,
            patch_file,
            output,
        } => {
            apply_patch_file(&mbe_file, &patch_file, output.as_deref())?;
        }
    }

    Ok(())
}
