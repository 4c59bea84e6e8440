use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

use ipbdd_set::cli::{self, Verbosity};
use ipbdd_set::{IpSet, NodeStore};

/// Renders a binary IP set's CIDR-summarized contents as a GraphViz `.dot`
/// file.
#[derive(Parser)]
#[command(name = "ipset-dot")]
struct Args {
    /// Binary input file; stdin if omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// `.dot` output file; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
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

    let records = set.iterate_networks(&store, true).map(|r| (r.address, r.prefix, 1i32));
    cli::write_dot(&mut writer, "ip_set", records)?;
    writer.flush()?;

    std::process::exit(cli::exit_code(false));
}
