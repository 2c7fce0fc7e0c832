#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use log::{error, info};
use structopt::StructOpt;

use ungzip::decompress;

#[derive(Debug, StructOpt)]
#[structopt(about = "Decompress gzip files encoded with dynamic Huffman blocks")]
struct Opts {
    /// Input file
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Output file; defaults to the name stored in the header, or stdout
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,

    /// Log more; repeat for more detail
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,
}

fn run(opts: Opts) -> Result<()> {
    let input = File::open(&opts.input)
        .with_context(|| format!("opening {}", opts.input.display()))?;
    let mut decoded = Vec::new();
    let summary = decompress(BufReader::new(input), &mut decoded)
        .with_context(|| format!("decompressing {}", opts.input.display()))?;

    info!(
        "{} block(s), {} bytes decoded, trailer declares {}",
        summary.block_count, summary.output_size, summary.original_size
    );

    let destination = opts
        .output
        .or_else(|| summary.header.name.as_deref().map(PathBuf::from));
    match destination {
        Some(path) => {
            fs::write(&path, &decoded).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            io::stdout()
                .write_all(&decoded)
                .context("writing to stdout")?;
        }
    }
    Ok(())
}

fn main() {
    let opts = Opts::from_args();

    stderrlog::new()
        .verbosity(1 + opts.verbose)
        .timestamp(stderrlog::Timestamp::Off)
        .init()
        .expect("failed to initialize logging");

    if let Err(err) = run(opts) {
        error!("{:#}", err);
        exit(1);
    }
}
