//! Shared argument parsing, text-format parsing, and GraphViz dump used by
//! the three `ipset-*` CLI collaborators (SPEC_FULL §1, §6). None of this
//! carries BDD logic of its own — it only translates between addresses,
//! the line-oriented text format, and byte streams.

use std::io::{BufRead, Write};
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::Context;

/// `-v`/`-q` flags shared by every collaborator, mapped onto `env_logger`'s
/// usual filter precedence: the flags pick a default, `RUST_LOG` overrides
/// it.
#[derive(clap::Args, Debug)]
pub struct Verbosity {
    #[arg(short, long, action = clap::ArgAction::Count, help = "increase log verbosity (repeatable)")]
    pub verbose: u8,
    #[arg(short, long, help = "suppress all but error-level logging")]
    pub quiet: bool,
}

pub fn init_logging(verbosity: &Verbosity) {
    let default_level = if verbosity.quiet {
        log::LevelFilter::Error
    } else {
        match verbosity.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level.to_string())).init();
}

/// One line of the text format, already stripped of comments/whitespace.
pub struct TextEntry {
    pub remove: bool,
    pub address: IpAddr,
    pub prefix: Option<u8>,
}

/// Parses the line-oriented input format (SPEC_FULL §6): one
/// `[!]address[/prefix]` per line; `#`-prefixed or blank lines are
/// ignored. Returns one error per malformed line rather than aborting the
/// whole read, so the caller can report them all and continue.
pub fn parse_text_line(line: &str) -> anyhow::Result<Option<TextEntry>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (remove, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (addr_part, prefix_part) = match rest.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (rest, None),
    };

    let address = IpAddr::from_str(addr_part).with_context(|| format!("invalid address {:?}", addr_part))?;
    let prefix = match prefix_part {
        None => None,
        Some(text) => Some(
            text.parse::<u8>()
                .with_context(|| format!("invalid CIDR prefix {:?}", text))?,
        ),
    };

    Ok(Some(TextEntry { remove, address, prefix }))
}

/// Reads every entry from `reader`, printing one error per offending line
/// to stderr (via `anyhow`'s context chaining) and continuing; returns
/// `true` iff at least one line failed, so the caller can set a non-zero
/// exit code.
pub fn read_text_entries<R: BufRead>(reader: R, mut on_entry: impl FnMut(TextEntry)) -> anyhow::Result<bool> {
    let mut any_error = false;
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", number + 1))?;
        match parse_text_line(&line) {
            Ok(Some(entry)) => on_entry(entry),
            Ok(None) => {}
            Err(err) => {
                eprintln!("line {}: {:#}", number + 1, err);
                any_error = true;
            }
        }
    }
    Ok(any_error)
}

/// Writes one `address[/prefix]` per line, omitting `/prefix` for a
/// full-length (single address) record.
pub fn write_text_records<W: Write>(writer: &mut W, records: impl Iterator<Item = (IpAddr, u8)>) -> std::io::Result<()> {
    for (address, prefix) in records {
        let full_length = if address.is_ipv4() { 32 } else { 128 };
        if prefix == full_length {
            writeln!(writer, "{}", address)?;
        } else {
            writeln!(writer, "{}/{}", address, prefix)?;
        }
    }
    Ok(())
}

/// A minimal GraphViz rendering of a set/map's CIDR-summarized contents: a
/// root fanning out to one leaf per network. This deliberately does not
/// walk the BDD's internal node graph (that representation is private to
/// the engine, by design — see SPEC_FULL §1's "no BDD-specific logic of
/// their own").
pub fn write_dot<W: Write>(writer: &mut W, label: &str, records: impl Iterator<Item = (IpAddr, u8, i32)>) -> std::io::Result<()> {
    writeln!(writer, "digraph {} {{", dot_quote(label))?;
    writeln!(writer, "    root [shape=point];")?;
    for (address, prefix, value) in records {
        let full_length = if address.is_ipv4() { 32 } else { 128 };
        let node_label = if prefix == full_length {
            format!("{}", address)
        } else {
            format!("{}/{}", address, prefix)
        };
        writeln!(
            writer,
            "    root -> {} [label=\"{}\"];",
            dot_quote(&node_label),
            value
        )?;
    }
    writeln!(writer, "}}")?;
    Ok(())
}

fn dot_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\\\""))
}

/// A tiny guard used by the binaries to turn "some lines failed" into the
/// documented exit-code convention (0 on success, 1 on any user-facing
/// error) without every `main` re-deriving it.
pub fn exit_code(had_errors: bool) -> i32 {
    if had_errors {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_address_line() {
        let entry = parse_text_line("10.0.0.1").unwrap().unwrap();
        assert!(!entry.remove);
        assert_eq!(None, entry.prefix);
    }

    #[test]
    fn parses_a_network_with_removal_prefix() {
        let entry = parse_text_line("!10.0.0.0/8").unwrap().unwrap();
        assert!(entry.remove);
        assert_eq!(Some(8), entry.prefix);
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        assert!(parse_text_line("# a comment").unwrap().is_none());
        assert!(parse_text_line("   ").unwrap().is_none());
    }

    #[test]
    fn rejects_a_malformed_address() {
        assert!(parse_text_line("not-an-address").is_err());
    }
}
