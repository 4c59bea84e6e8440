use std::cell::Cell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

use ipbdd_set::cli::{self, Verbosity};
use ipbdd_set::{IpSet, NodeStore};

/// Builds a binary IP set from a line-oriented text description.
#[derive(Parser)]
#[command(name = "ipset-build")]
struct Args {
    /// Text input file (one [!]address[/prefix] per line); stdin if omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Binary output file; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Accept networks whose host bits are non-zero instead of rejecting them.
    #[arg(short = 'l', long = "loose-cidr")]
    loose_cidr: bool,
    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args.verbosity);

    let mut store = NodeStore::new();
    let mut set = IpSet::new();
    let had_mutation_errors = Cell::new(false);

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let had_parse_errors = cli::read_text_entries(reader, |entry| {
        let outcome = match entry.prefix {
            Some(prefix) if entry.remove => set
                .remove_network(&mut store, entry.address, prefix, args.loose_cidr)
                .map(|_| ()),
            Some(prefix) => set
                .add_network(&mut store, entry.address, prefix, args.loose_cidr)
                .map(|_| ()),
            None => {
                if entry.remove {
                    set.remove(&mut store, entry.address);
                } else {
                    set.add(&mut store, entry.address);
                }
                Ok(())
            }
        };
        if let Err(err) = outcome {
            eprintln!("{:#}", err);
            had_mutation_errors.set(true);
        }
    })?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    set.save(&store, &mut writer)?;
    writer.flush()?;
    set.free(&mut store);

    std::process::exit(cli::exit_code(had_parse_errors || had_mutation_errors.get()));
}
