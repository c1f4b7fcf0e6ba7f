//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The error taxonomy shared by the node tree, every codec, and the CLI.
//!
//! Collapsed from an earlier, binary-reader-only version's per-object-format
//! `Expected*` variants into a single taxonomy shared across all four
//! codecs.

use std::fmt::{self, Display};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Property list error taxonomy.
#[derive(Debug)]
pub enum Error {
    /// NULL where required, wrong tag for a typed accessor, out-of-range index.
    InvalidArg(String),
    /// Structurally valid tree but not representable in the target format.
    Format(String),
    /// Input bytes do not conform to the declared format.
    Parse(String),
    /// Allocation failure.
    NoMem,
    /// File I/O failure (file helpers only).
    Io(io::Error),
    /// Depth limit exceeded during parse, copy, or write.
    MaxNesting,
    /// Binary reader detected a cycle via the object-reference graph.
    CircularRef,
    /// Fallback; not expected in practice.
    Unknown,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArg(msg) => write!(f, "invalid argument: {}", msg),
            Error::Format(msg) => write!(f, "format error: {}", msg),
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::NoMem => f.write_str("allocation failure"),
            Error::Io(err) => write!(f, "i/o error: {}", err),
            Error::MaxNesting => f.write_str("maximum nesting depth exceeded"),
            Error::CircularRef => f.write_str("circular reference detected"),
            Error::Unknown => f.write_str("unknown error"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Error {
    /// The process exit code this error maps to, per the CLI's contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Format(_) => 2,
            Error::Parse(_) => 3,
            Error::MaxNesting => 4,
            Error::CircularRef => 5,
            _ => 1,
        }
    }
}
