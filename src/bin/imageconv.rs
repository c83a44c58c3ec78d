use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pdownload_core::imageconv::{ConvertError, Format, convert_tree};

/// Convert every image of one format under a directory into another format.
///
/// Converted files are written next to the originals with the new extension.
#[derive(Parser, Debug)]
#[command(name = "imageconv")]
#[command(author, version, about)]
struct Args {
    /// Directory to convert, searched recursively
    dir: PathBuf,

    /// Source format (png, jpg, jpeg, gif)
    #[arg(short = 'f', long = "from", default_value = "jpg", value_parser = parse_format)]
    from: Format,

    /// Target format (png, jpg, jpeg, gif)
    #[arg(short = 't', long = "to", default_value = "png", value_parser = parse_format)]
    to: Format,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_format(value: &str) -> Result<Format, String> {
    value.parse().map_err(|e: ConvertError| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.from == args.to {
        eprintln!("error: source and target format are both {}", args.from);
        return ExitCode::from(2);
    }

    let report = match convert_tree(&args.dir, args.from, args.to) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    for path in &report.converted {
        println!("{}", path.display());
    }
    for (path, error) in &report.failed {
        eprintln!("error: {}: {error}", path.display());
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
