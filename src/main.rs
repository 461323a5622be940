//! fatelf-glue CLI
//!
//! Packs ELF binaries into a FatELF container, or recursively merges
//! directory trees of such binaries.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Pack ELF binaries into a FatELF container, or merge directory trees.
///
/// USAGE:
///   fatelf-glue <out> <bin1> <bin2> [... binN]
///   fatelf-glue -r <out> <dir1> <dir2> [... dirN]
#[derive(Parser, Debug)]
#[command(name = "fatelf-glue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recursively merge directory trees instead of packing binaries.
    #[arg(short = 'r', long = "recursive")]
    recursive: bool,

    /// Verbose diagnostic logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output file (plain mode) or output directory (-r mode).
    out: PathBuf,

    /// Input binaries (plain mode) or input directories (-r mode).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("fatelf=debug")
            .init();
    }

    let result = fatelf::machine::host_descriptor()
        .ok_or_else(|| fatelf::FatElfError::Configuration {
            message: "unrecognized host architecture; the machine registry has no entry for it"
                .to_string(),
        })
        .and_then(|_| {
            if args.recursive {
                fatelf::glue_recursive(&args.out, &args.inputs)
            } else {
                fatelf::glue(&args.out, &args.inputs)
            }
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatelf-glue: {e}");
            ExitCode::FAILURE
        }
    }
}
