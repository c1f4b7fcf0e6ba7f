//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Command-line property list converter: reads one plist, optionally
//! re-sorts and re-serializes it, and writes it back out in any of the
//! four supported wire formats (or a human-readable print format).

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;

use plist::codec::print::{self, PrintStyle};
use plist::{format, Error, Format, WriteOptions};

/// Apple property list converter (binary, XML, JSON, OpenStep).
#[derive(Parser, Debug)]
#[command(name = "plist", version, disable_version_flag = true)]
struct Args {
    /// Print version information and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Input file, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    infile: String,

    /// Output file, or `-` for stdout.
    #[arg(short, long, default_value = "-")]
    outfile: String,

    /// Output format.
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<String>,

    /// Emit without extraneous whitespace.
    #[arg(short, long)]
    compact: bool,

    /// Sort dictionary keys recursively before writing.
    #[arg(short, long)]
    sort: bool,

    /// Print a human-readable representation instead of re-serializing.
    #[arg(short, long)]
    print: bool,

    /// Enable verbose XML parser diagnostics (also settable via `PLIST_XML_DEBUG=1`).
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.debug {
        plist::set_xml_debug(true);
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("plist: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let input = read_input(&args.infile)?;
    let (mut tree, root) = format::read_from_memory(&input)?;

    if args.print {
        let style = std::env::var("PLIST_OUTPUT_FORMAT")
            .ok()
            .and_then(|name| PrintStyle::from_env_name(&name))
            .unwrap_or(PrintStyle::Plutil);
        if args.sort {
            tree.sort(root);
        }
        let text = print::print(&tree, root, style);
        return write_output(&args.outfile, text.as_bytes());
    }

    let output_format = match &args.format {
        Some(name) => Format::from_name(name)?,
        None => Format::Xml,
    };
    let options = WriteOptions { compact: args.compact, sort_keys: args.sort, coerce: false };
    let bytes = format::write(&mut tree, root, output_format, options)?;
    write_output(&args.outfile, &bytes)
}

fn read_input(path: &str) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    if path == "-" {
        io::stdin().read_to_end(&mut buffer)?;
    } else {
        buffer = fs::read(path)?;
    }
    Ok(buffer)
}

fn write_output(path: &str, bytes: &[u8]) -> Result<(), Error> {
    if path == "-" {
        io::stdout().write_all(bytes)?;
    } else {
        fs::write(path, bytes)?;
    }
    Ok(())
}
