//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Format detection and the top-level read/write dispatcher.
//!
//! Grounded on `examples/original_source/tools/plistutil.c`'s
//! `plist_is_binary` check ahead of its `plist_from_bin`/`plist_from_xml`
//! dispatch, which looks only at the first few significant bytes rather
//! than fully parsing the input before dispatch.

use crate::codec::{binary, json, openstep, xml};
use crate::document::HEADER_MAGIC_NUMBER;
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

/// The serialization format of a plist document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Binary,
    Xml,
    Json,
    OpenStep,
}

impl Format {
    /// Parses a format name as accepted by the CLI's `-f`/`--format` flag
    /// and the `PLIST_OUTPUT_FORMAT` environment variable.
    pub fn from_name(name: &str) -> Result<Format> {
        match name {
            "bin" | "binary" => Ok(Format::Binary),
            "xml" => Ok(Format::Xml),
            "json" => Ok(Format::Json),
            "openstep" | "ascii" => Ok(Format::OpenStep),
            other => Err(Error::InvalidArg(format!("unrecognized format {:?}", other))),
        }
    }
}

/// Options shared by every writer; codec-specific options (JSON's `coerce`)
/// are layered on top by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub compact: bool,
    pub sort_keys: bool,
    pub coerce: bool,
}

/// Parses `bytes`, detecting the format from its content per invariant 6.
pub fn read_from_memory(bytes: &[u8]) -> Result<(Tree, NodeId)> {
    sniff(bytes)
        .and_then(|format| read_as(bytes, format).map(|(tree, root)| (tree, root, format)))
        .map(|(tree, root, _)| (tree, root))
}

/// Parses `bytes` as an explicitly-named format, skipping detection.
pub fn read_as(bytes: &[u8], format: Format) -> Result<(Tree, NodeId)> {
    match format {
        Format::Binary => binary::read(bytes),
        Format::Xml => xml::read(bytes),
        Format::Json => json::read(bytes),
        Format::OpenStep => openstep::read(bytes),
    }
}

fn sniff(bytes: &[u8]) -> Result<Format> {
    if bytes.starts_with(HEADER_MAGIC_NUMBER) {
        return Ok(Format::Binary);
    }
    let trimmed = skip_leading_whitespace(bytes);
    match trimmed.first() {
        Some(b'<') => Ok(Format::Xml),
        Some(b'[') => Ok(Format::Json),
        Some(b'(') => Ok(Format::OpenStep),
        Some(b'{') => Ok(sniff_brace(trimmed)),
        _ => Err(Error::Parse("unable to detect plist format from input".into())),
    }
}

fn skip_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    &bytes[i..]
}

/// Disambiguates `{` between JSON and OpenStep by peeking for the `"key":`
/// signature (OpenStep's separator is `=`, never `:`).
fn sniff_brace(bytes: &[u8]) -> Format {
    let after_brace = skip_leading_whitespace(&bytes[1..]);
    if after_brace.first() != Some(&b'"') {
        // A bareword key is valid OpenStep but not JSON (which requires a
        // quoted key), so a non-quote byte settles it immediately.
        return Format::OpenStep;
    }
    let mut i = 1;
    let mut escaped = false;
    while i < after_brace.len() {
        let b = after_brace[i];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            i += 1;
            break;
        }
        i += 1;
    }
    let after_key = skip_leading_whitespace(&after_brace[i.min(after_brace.len())..]);
    match after_key.first() {
        Some(b':') => Format::Json,
        _ => Format::OpenStep,
    }
}

/// Serializes `root` into `format`, applying `options` uniformly.
pub fn write(tree: &mut Tree, root: NodeId, format: Format, options: WriteOptions) -> Result<Vec<u8>> {
    if options.sort_keys {
        tree.sort(root);
    }
    match format {
        Format::Binary => binary::write(tree, root),
        Format::Xml => xml::write(tree, root, xml::WriteOptions { compact: options.compact }),
        Format::Json => json::write(tree, root, json::Options { compact: options.compact, coerce: options.coerce }),
        Format::OpenStep => openstep::write(tree, root, openstep::WriteOptions { compact: options.compact }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_binary() {
        assert_eq!(sniff(b"bplist00\x00\x00").unwrap(), Format::Binary);
    }

    #[test]
    fn test_sniff_xml() {
        assert_eq!(sniff(b"  <?xml version=\"1.0\"?>").unwrap(), Format::Xml);
    }

    #[test]
    fn test_sniff_json_array() {
        assert_eq!(sniff(b"[1, 2, 3]").unwrap(), Format::Json);
    }

    #[test]
    fn test_sniff_json_object() {
        assert_eq!(sniff(br#"{"a": 1}"#).unwrap(), Format::Json);
    }

    #[test]
    fn test_sniff_openstep_brace() {
        assert_eq!(sniff(b"{ a = 1; }").unwrap(), Format::OpenStep);
    }

    #[test]
    fn test_sniff_openstep_paren() {
        assert_eq!(sniff(b"(1, 2, 3)").unwrap(), Format::OpenStep);
    }
}
