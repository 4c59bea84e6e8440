use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use ipbdd_set::cli::{self, Verbosity};
use ipbdd_set::{IpSet, NodeStore};

/// Bound on how many addresses the per-address benchmarks touch, so a huge
/// set (e.g. a whole `/8`) doesn't turn a quick benchmark into a full scan.
const SAMPLE_SIZE: usize = 10_000;

/// Times `contains`/`iterate`/`iterate_networks` over a binary or
/// text-described IP set.
#[derive(Parser)]
#[command(name = "ipset-bench")]
struct Args {
    /// Input file: a binary set, or a text description as `ipset-build`
    /// accepts; stdin if omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Where to print timings; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Time `iterate_networks` instead of the per-address iterator.
    #[arg(short = 'n', long)]
    networks: bool,
    /// When building from a text description, accept networks whose host
    /// bits are non-zero instead of rejecting them.
    #[arg(short = 'l', long = "loose-cidr")]
    loose_cidr: bool,
    #[command(flatten)]
    verbosity: Verbosity,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args.verbosity);

    let mut input_bytes = Vec::new();
    match &args.input {
        Some(path) => {
            File::open(path)?.read_to_end(&mut input_bytes)?;
        }
        None => {
            io::stdin().read_to_end(&mut input_bytes)?;
        }
    }

    let mut store = NodeStore::new();
    let mut had_errors = false;
    let load_start = Instant::now();
    let set = if input_bytes.starts_with(b"IP set") {
        IpSet::load(&mut store, &mut Cursor::new(&input_bytes))?
    } else {
        let mut set = IpSet::new();
        had_errors = cli::read_text_entries(input_bytes.as_slice(), |entry| {
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
            }
        })?;
        set
    };
    let load_elapsed = load_start.elapsed();

    let sample: Vec<_> = set.iterate(&store, true).take(SAMPLE_SIZE).collect();

    let contains_start = Instant::now();
    let hits = sample.iter().filter(|&&addr| set.contains(&store, addr)).count();
    let contains_elapsed = contains_start.elapsed();

    let iterate_start = Instant::now();
    let iterate_count = if args.networks {
        set.iterate_networks(&store, true).count()
    } else {
        set.iterate(&store, true).take(SAMPLE_SIZE).count()
    };
    let iterate_elapsed = iterate_start.elapsed();

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    writeln!(writer, "load:     {:?}", load_elapsed)?;
    writeln!(writer, "memory:   {} bytes", set.memory_size(&store))?;
    writeln!(writer, "contains: {:?} over {} addresses ({} hits)", contains_elapsed, sample.len(), hits)?;
    if args.networks {
        writeln!(writer, "iterate_networks: {:?} over {} records", iterate_elapsed, iterate_count)?;
    } else {
        writeln!(writer, "iterate:  {:?} over {} addresses", iterate_elapsed, iterate_count)?;
    }
    writer.flush()?;

    set.free(&mut store);
    std::process::exit(cli::exit_code(had_errors));
}
