use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

use ipbdd_set::cli::{self, Verbosity};
use ipbdd_set::{IpSet, NodeStore};

/// Prints a binary IP set's contents as text, one address or network per
/// line.
#[derive(Parser)]
#[command(name = "ipset-cat")]
struct Args {
    /// Binary input file; stdin if omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Text output file; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Summarize as CIDR networks instead of expanding every address.
    #[arg(short = 'n', long)]
    networks: bool,
    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args.verbosity);

    let mut store = NodeStore::new();
    let mut reader: Box<dyn io::Read> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let set = IpSet::load(&mut store, &mut reader)?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    if args.networks {
        let records = set.iterate_networks(&store, true).map(|r| (r.address, r.prefix));
        cli::write_text_records(&mut writer, records)?;
    } else {
        let records = set.iterate(&store, true).map(|address| {
            let prefix = if address.is_ipv4() { 32 } else { 128 };
            (address, prefix)
        });
        cli::write_text_records(&mut writer, records)?;
    }
    writer.flush()?;

    std::process::exit(cli::exit_code(false));
}
