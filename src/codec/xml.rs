//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The Apple XML plist 1.0 codec.
//!
//! Grounded on `examples/original_source/src/xplist.c` for the document
//! shape (prolog, DOCTYPE, single root value) and the `CF$UID` promotion
//! rule; built with `quick-xml`, the crate
//! `examples/betrusted-io-xous-core` reaches for to parse SVD/register XML.

use std::io::BufRead;

use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;

use crate::date;
use crate::debug::xml_debug_log;
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree, Value, MAX_NESTING_DEPTH};

const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";
const DOCTYPE: &str = "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">";

/// Parses an Apple XML plist document.
pub fn read(bytes: &[u8]) -> Result<(Tree, NodeId)> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    reader.expand_empty_elements(true);

    let mut tree = Tree::new();
    let mut buf = Vec::new();

    // Skip prolog, DOCTYPE, comments until the <plist> start tag.
    loop {
        match reader.read_event(&mut buf).map_err(xml_parse_err)? {
            Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Start(ref e) if e.name() == b"plist" => break,
            Event::Eof => return Err(Error::Parse("no <plist> root element found".into())),
            _ => {}
        }
        buf.clear();
    }

    let mut root: Option<NodeId> = None;
    loop {
        buf.clear();
        match reader.read_event(&mut buf).map_err(xml_parse_err)? {
            Event::End(ref e) if e.name() == b"plist" => break,
            Event::Comment(_) | Event::PI(_) | Event::Text(_) => {}
            Event::Start(ref e) => {
                if root.is_some() {
                    return Err(Error::Parse("a second value child of <plist> is not permitted".into()));
                }
                let name = e.name().to_vec();
                root = Some(read_value(&mut tree, &mut reader, &mut buf, &name, 0)?);
            }
            Event::Eof => return Err(Error::Parse("unexpected end of input inside <plist>".into())),
            _ => {}
        }
    }

    let root = root.ok_or_else(|| Error::Parse("<plist> has no value child".into()))?;
    Ok((tree, root))
}

fn xml_parse_err(e: quick_xml::Error) -> Error {
    Error::Parse(format!("xml parse error: {}", e))
}

/// Reads the value whose start tag (`tag_name`) has already been consumed,
/// through its matching end tag.
fn read_value<R: BufRead>(
    tree: &mut Tree,
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    tag_name: &[u8],
    depth: usize,
) -> Result<NodeId> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    xml_debug_log!("reading <{}>", String::from_utf8_lossy(tag_name));
    match tag_name {
        b"true" => Ok(tree.new_bool(true)),
        b"false" => Ok(tree.new_bool(false)),
        b"integer" => {
            let text = read_text_content(tree, reader, buf, tag_name)?;
            parse_integer(tree, text.trim())
        }
        b"real" => {
            let text = read_text_content(tree, reader, buf, tag_name)?;
            let value: f64 = text.trim().parse()
                .map_err(|_| Error::Parse(format!("invalid real literal {:?}", text)))?;
            Ok(tree.new_real(value))
        }
        b"string" => {
            let text = read_text_content(tree, reader, buf, tag_name)?;
            Ok(tree.new_string(text))
        }
        b"data" => {
            let text = read_text_content(tree, reader, buf, tag_name)?;
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::decode(&cleaned)
                .map_err(|e| Error::Parse(format!("invalid base64 in <data>: {}", e)))?;
            Ok(tree.new_data(bytes))
        }
        b"date" => {
            let text = read_text_content(tree, reader, buf, tag_name)?;
            let absolute_time = date::parse_iso8601(text.trim())?;
            Ok(tree.new_date(absolute_time))
        }
        b"array" => {
            let array_id = tree.new_array();
            loop {
                buf.clear();
                match reader.read_event(buf).map_err(xml_parse_err)? {
                    Event::End(ref e) if e.name() == b"array" => break,
                    Event::Comment(_) | Event::PI(_) | Event::Text(_) => {}
                    Event::Start(ref e) => {
                        let name = e.name().to_vec();
                        let child = read_value(tree, reader, buf, &name, depth + 1)?;
                        tree.array_append_item(array_id, child)?;
                    }
                    Event::Eof => return Err(Error::Parse("unexpected end of input inside <array>".into())),
                    _ => {}
                }
            }
            Ok(array_id)
        }
        b"dict" => read_dict(tree, reader, buf, depth),
        other => Err(Error::Parse(format!("unrecognized plist element <{}>", String::from_utf8_lossy(other)))),
    }
}

fn read_dict<R: BufRead>(tree: &mut Tree, reader: &mut Reader<R>, buf: &mut Vec<u8>, depth: usize) -> Result<NodeId> {
    let mut entries: Vec<(String, NodeId)> = Vec::new();
    let mut pending_key: Option<String> = None;
    loop {
        buf.clear();
        match reader.read_event(buf).map_err(xml_parse_err)? {
            Event::End(ref e) if e.name() == b"dict" => break,
            Event::Comment(_) | Event::PI(_) | Event::Text(_) => {}
            Event::Start(ref e) if e.name() == b"key" => {
                if pending_key.is_some() {
                    return Err(Error::Parse("two consecutive <key> elements in <dict>".into()));
                }
                let text = read_text_content(tree, reader, buf, b"key")?;
                pending_key = Some(text);
            }
            Event::Start(ref e) => {
                let key = pending_key.take()
                    .ok_or_else(|| Error::Parse("dict value with no preceding <key>".into()))?;
                let name = e.name().to_vec();
                let value = read_value(tree, reader, buf, &name, depth + 1)?;
                entries.push((key, value));
            }
            Event::Eof => return Err(Error::Parse("unexpected end of input inside <dict>".into())),
            _ => {}
        }
    }
    if pending_key.is_some() {
        return Err(Error::Parse("<key> with no following value in <dict>".into()));
    }

    // CF$UID promotion: a single-entry dict {"CF$UID": N} is a Uid node.
    if entries.len() == 1 && entries[0].0 == "CF$UID" {
        if let Value::Integer(i) = tree.value_ref(entries[0].1) {
            if let Some(n) = i.as_u64() {
                tree.free(entries[0].1);
                return Ok(tree.new_uid(n));
            }
        }
    }

    let dict_id = tree.new_dict();
    let mut had_duplicate_key = false;
    for (key, value) in entries {
        if tree.dict_set_item_tolerating_duplicate(dict_id, &key, value)? {
            had_duplicate_key = true;
        }
    }
    if had_duplicate_key {
        return Err(Error::Parse("dict contains a duplicate key".into()));
    }
    Ok(dict_id)
}

fn parse_integer(tree: &mut Tree, text: &str) -> Result<NodeId> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value: u128 = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u128::from_str_radix(hex, 16)
    } else {
        digits.parse()
    }.map_err(|_| Error::Parse(format!("invalid integer literal {:?}", text)))?;

    if negative {
        let signed = i64::try_from(value).map_err(|_| Error::Parse("negative integer out of i64 range".into()))?;
        Ok(tree.new_int(-signed))
    } else if value <= i64::MAX as u128 {
        Ok(tree.new_int(value as i64))
    } else if value <= u64::MAX as u128 {
        Ok(tree.new_uint(value as u64))
    } else {
        Err(Error::Parse("integer literal exceeds 64 bits".into()))
    }
}

/// Reads text content (mixing plain text, entities and CDATA) up to the
/// matching end tag `tag_name`, concatenating every part.
fn read_text_content<R: BufRead>(
    _tree: &mut Tree,
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    tag_name: &[u8],
) -> Result<String> {
    let mut out = String::new();
    loop {
        buf.clear();
        match reader.read_event(buf).map_err(xml_parse_err)? {
            Event::End(ref e) if e.name() == tag_name => break,
            Event::Text(ref e) => out.push_str(&decode_text(e, reader)?),
            Event::CData(ref e) => out.push_str(&String::from_utf8_lossy(e)),
            Event::Eof => return Err(Error::Parse("unexpected end of input inside text element".into())),
            _ => {}
        }
    }
    Ok(out)
}

fn decode_text<R: BufRead>(text: &BytesText, reader: &Reader<R>) -> Result<String> {
    text.unescape_and_decode(reader).map_err(|e| Error::Parse(format!("malformed entity reference: {}", e)))
}

// -- Writer ---------------------------------------------------------------

/// Options controlling XML writer output.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub compact: bool,
}

pub fn write(tree: &Tree, root: NodeId, options: WriteOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(PROLOG.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(DOCTYPE.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(b"<plist version=\"1.0\">");
    if !options.compact {
        out.push(b'\n');
    }
    write_value(tree, root, 1, options, &mut out)?;
    if !options.compact {
        out.push(b'\n');
    }
    out.extend_from_slice(b"</plist>\n");
    Ok(out)
}

fn indent(out: &mut Vec<u8>, depth: usize, options: WriteOptions) {
    if !options.compact {
        for _ in 0..depth {
            out.push(b'\t');
        }
    }
}

fn newline(out: &mut Vec<u8>, options: WriteOptions) {
    if !options.compact {
        out.push(b'\n');
    }
}

fn write_value(tree: &Tree, id: NodeId, depth: usize, options: WriteOptions, out: &mut Vec<u8>) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    indent(out, depth, options);
    match tree.value_ref(id) {
        Value::Bool(true) => out.extend_from_slice(b"<true/>"),
        Value::Bool(false) => out.extend_from_slice(b"<false/>"),
        Value::Null => return Err(Error::Format("XML plist has no representation for Null".into())),
        Value::Integer(i) => {
            let text = match i.as_i64() {
                Some(v) => v.to_string(),
                None => i.as_u64().unwrap().to_string(),
            };
            write_element(out, b"integer", &text);
        }
        Value::Real(r) => write_element(out, b"real", &format_real(r.into_inner())),
        Value::String(s) | Value::Key(s) => {
            let tag: &[u8] = if matches!(tree.value_ref(id), Value::Key(_)) { b"key" } else { b"string" };
            write_element(out, tag, &escape_xml_text(s));
        }
        Value::Data(bytes) => write_data_element(out, bytes, depth, options),
        Value::Date(d) => write_element(out, b"date", &date::format_iso8601(d.absolute_time)),
        Value::Uid(u) => {
            newline(out, options);
            indent(out, depth, options);
            out.extend_from_slice(b"<dict>");
            newline(out, options);
            indent(out, depth + 1, options);
            out.extend_from_slice(b"<key>CF$UID</key>");
            newline(out, options);
            indent(out, depth + 1, options);
            write_element(out, b"integer", &u.0.to_string());
            newline(out, options);
            indent(out, depth, options);
            out.extend_from_slice(b"</dict>");
            return Ok(());
        }
        Value::Array(_) => {
            let len = tree.array_len(id);
            if len == 0 {
                out.extend_from_slice(b"<array/>");
                return Ok(());
            }
            out.extend_from_slice(b"<array>");
            newline(out, options);
            for i in 0..len {
                let child = tree.array_get_item(id, i).unwrap();
                write_value(tree, child, depth + 1, options, out)?;
                newline(out, options);
            }
            indent(out, depth, options);
            out.extend_from_slice(b"</array>");
        }
        Value::Dict(_) => {
            let keys = tree.dict_key_ids(id);
            if keys.is_empty() {
                out.extend_from_slice(b"<dict/>");
                return Ok(());
            }
            out.extend_from_slice(b"<dict>");
            newline(out, options);
            for key_id in keys {
                let key_text = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key_text).unwrap();
                indent(out, depth + 1, options);
                write_element(out, b"key", &escape_xml_text(&key_text));
                newline(out, options);
                write_value(tree, value_id, depth + 1, options, out)?;
                newline(out, options);
            }
            indent(out, depth, options);
            out.extend_from_slice(b"</dict>");
        }
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, tag: &[u8], text: &str) {
    out.push(b'<');
    out.extend_from_slice(tag);
    out.push(b'>');
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"</");
    out.extend_from_slice(tag);
    out.push(b'>');
}

fn write_data_element(out: &mut Vec<u8>, bytes: &[u8], depth: usize, options: WriteOptions) {
    let encoded = base64::encode(bytes);
    if options.compact {
        write_element(out, b"data", &encoded);
        return;
    }
    out.extend_from_slice(b"<data>");
    out.push(b'\n');
    for chunk in encoded.as_bytes().chunks(76) {
        indent(out, depth + 1, options);
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }
    indent(out, depth, options);
    out.extend_from_slice(b"</data>");
}

fn escape_xml_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats a double the way `plutil` does: fixed-point with up to 6 fraction
/// digits (rounded half-away-from-zero), trailing zeros stripped, and a
/// guaranteed decimal point so it round-trips as `<real>` rather than
/// `<integer>` on re-parse.
fn format_real(value: f64) -> String {
    let mut text = format!("{:.6}", value);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.push('0');
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_dict() {
        let input = b"<plist><dict><key>a</key><integer>1</integer><key>b</key><true/></dict></plist>";
        let (tree, root) = read(input).unwrap();
        assert_eq!(tree.dict_len(root), 2);
        assert_eq!(tree.get_int_val(tree.dict_get_item(root, "a").unwrap()), 1);
        assert!(tree.get_bool_val(tree.dict_get_item(root, "b").unwrap()));
    }

    #[test]
    fn test_cfuid_promotion() {
        let input = b"<plist><dict><key>obj</key><dict><key>CF$UID</key><integer>7</integer></dict></dict></plist>";
        let (tree, root) = read(input).unwrap();
        let obj = tree.dict_get_item(root, "obj").unwrap();
        assert_eq!(tree.get_uid_val(obj), 7);
    }

    #[test]
    fn test_rejects_second_root_value() {
        let input = b"<plist><string>one</string><string>two</string></plist>";
        assert!(read(input).is_err());
    }

    #[test]
    fn test_date_epoch() {
        let input = b"<plist><date>2001-01-01T00:00:00Z</date></plist>";
        let (tree, root) = read(input).unwrap();
        assert_eq!(tree.get_date_val(root), 0.0);
        assert_eq!(tree.get_unix_date_val(root), 978_307_200.0);
    }

    #[test]
    fn test_base64_round_trip() {
        let input = b"<plist><data>\n  SGVsbG8sIFdvcmxkIQ==\n</data></plist>";
        let (tree, root) = read(input).unwrap();
        assert_eq!(tree.get_data_val(root), b"Hello, World!".to_vec());
    }
}
