//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The JSON codec.
//!
//! There is no JSON format in the original property list type set
//! (`examples/original_source/include/plist/plist.h`'s `plist_type` has no
//! JSON member), so there is nothing upstream to port here. Written in the
//! same hand-rolled recursive-descent style as this crate's own OpenStep
//! codec rather than pulling in `serde_json`, since a plist value has no
//! lossless direct mapping to JSON's type set (`Data`/`Date`/`Uid` need
//! either a lossy downgrade or an explicit "coerce" side channel) and the
//! lexer is small enough not to need a generic library's machinery.

use crate::date;
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree, Value, MAX_NESTING_DEPTH};

/// Options controlling both directions of the JSON codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Compact (no whitespace) vs. pretty (2-space indent, LF) output.
    pub compact: bool,
    /// When set, `Data`/`Date`/`Uid` are coerced into a JSON-representable
    /// shape (base64 string, ISO 8601 string, `{"CF$UID": N}` object)
    /// instead of failing the write with `Error::Format`.
    pub coerce: bool,
}

// -- Reader -----------------------------------------------------------------

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

pub fn read(bytes: &[u8]) -> Result<(Tree, NodeId)> {
    let mut tree = Tree::new();
    let mut parser = Parser { bytes, pos: 0 };
    parser.skip_whitespace();
    let root = parser.parse_value(&mut tree, 0)?;
    parser.skip_whitespace();
    if parser.pos != parser.bytes.len() {
        return Err(Error::Parse("trailing data after top-level JSON value".into()));
    }
    Ok((tree, root))
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            Err(Error::Parse(format!("expected '{}' at byte offset {}", b as char, self.pos)))
        }
    }

    fn expect_literal(&mut self, literal: &str) -> Result<()> {
        for expected in literal.bytes() {
            if self.bump() != Some(expected) {
                return Err(Error::Parse(format!("expected literal {:?}", literal)));
            }
        }
        Ok(())
    }

    fn parse_value(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(Error::MaxNesting);
        }
        self.skip_whitespace();
        match self.peek() {
            Some(b'{') => self.parse_object(tree, depth),
            Some(b'[') => self.parse_array(tree, depth),
            Some(b'"') => {
                let s = self.parse_string()?;
                Ok(tree.new_string(s))
            }
            Some(b't') => { self.expect_literal("true")?; Ok(tree.new_bool(true)) }
            Some(b'f') => { self.expect_literal("false")?; Ok(tree.new_bool(false)) }
            Some(b'n') => { self.expect_literal("null")?; Ok(tree.new_null()) }
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(tree),
            Some(c) => Err(Error::Parse(format!("unexpected byte {:?} at offset {}", c as char, self.pos))),
            None => Err(Error::Parse("unexpected end of input".into())),
        }
    }

    fn parse_object(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        self.expect(b'{')?;
        let dict_id = tree.new_dict();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(dict_id);
        }
        let mut had_duplicate_key = false;
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.parse_value(tree, depth + 1)?;
            if tree.dict_set_item_tolerating_duplicate(dict_id, &key, value)? {
                had_duplicate_key = true;
            }
            self.skip_whitespace();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(Error::Parse("expected ',' or '}' in object".into())),
            }
        }
        if had_duplicate_key {
            return Err(Error::Parse("dict contains a duplicate key".into()));
        }
        Ok(dict_id)
    }

    fn parse_array(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        self.expect(b'[')?;
        let array_id = tree.new_array();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(array_id);
        }
        loop {
            let value = self.parse_value(tree, depth + 1)?;
            tree.array_append_item(array_id, value)?;
            self.skip_whitespace();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                _ => return Err(Error::Parse("expected ',' or ']' in array".into())),
            }
        }
        Ok(array_id)
    }

    fn parse_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'/') => out.push('/'),
                    Some(b'b') => out.push('\u{8}'),
                    Some(b'f') => out.push('\u{c}'),
                    Some(b'n') => out.push('\n'),
                    Some(b'r') => out.push('\r'),
                    Some(b't') => out.push('\t'),
                    Some(b'u') => {
                        let high = self.parse_hex4()?;
                        let code_point = if (0xD800..=0xDBFF).contains(&high) {
                            self.expect(b'\\')?;
                            self.expect(b'u')?;
                            let low = self.parse_hex4()?;
                            if !(0xDC00..=0xDFFF).contains(&low) {
                                return Err(Error::Parse("unpaired UTF-16 surrogate".into()));
                            }
                            0x10000 + ((high as u32 - 0xD800) << 10) + (low as u32 - 0xDC00)
                        } else {
                            high as u32
                        };
                        out.push(char::from_u32(code_point)
                            .ok_or_else(|| Error::Parse("invalid unicode escape".into()))?);
                    }
                    _ => return Err(Error::Parse("invalid escape sequence".into())),
                },
                Some(b) if b < 0x20 => return Err(Error::Parse("unescaped control character in string".into())),
                Some(b) => {
                    // Re-walk as UTF-8 rather than assuming single-byte ASCII.
                    let start = self.pos - 1;
                    let width = utf8_width(b);
                    let end = start + width;
                    if end > self.bytes.len() {
                        return Err(Error::Parse("truncated UTF-8 sequence in string".into()));
                    }
                    let slice = &self.bytes[start..end];
                    out.push_str(std::str::from_utf8(slice)
                        .map_err(|e| Error::Parse(format!("invalid UTF-8 in string: {}", e)))?);
                    self.pos = end;
                }
                None => return Err(Error::Parse("unterminated string".into())),
            }
        }
        Ok(out)
    }

    fn parse_hex4(&mut self) -> Result<u16> {
        if self.pos + 4 > self.bytes.len() {
            return Err(Error::Parse("truncated \\u escape".into()));
        }
        let text = std::str::from_utf8(&self.bytes[self.pos..self.pos + 4])
            .map_err(|_| Error::Parse("invalid \\u escape".into()))?;
        let value = u16::from_str_radix(text, 16).map_err(|_| Error::Parse("invalid \\u escape".into()))?;
        self.pos += 4;
        Ok(value)
    }

    fn parse_number(&mut self, tree: &mut Tree) -> Result<NodeId> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        if is_float {
            let value: f64 = text.parse().map_err(|_| Error::Parse(format!("invalid number {:?}", text)))?;
            Ok(tree.new_real(value))
        } else if let Ok(signed) = text.parse::<i64>() {
            Ok(tree.new_int(signed))
        } else if let Ok(unsigned) = text.parse::<u64>() {
            Ok(tree.new_uint(unsigned))
        } else {
            Err(Error::Parse(format!("integer literal {:?} exceeds 64 bits", text)))
        }
    }
}

fn utf8_width(lead: u8) -> usize {
    if lead & 0x80 == 0 { 1 } else if lead & 0xE0 == 0xC0 { 2 } else if lead & 0xF0 == 0xE0 { 3 } else { 4 }
}

// -- Writer -------------------------------------------------------------

pub fn write(tree: &Tree, root: NodeId, options: Options) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(tree, root, 0, options, &mut out)?;
    if !options.compact {
        out.push(b'\n');
    }
    Ok(out)
}

fn indent(out: &mut Vec<u8>, depth: usize, options: Options) {
    if !options.compact {
        for _ in 0..depth {
            out.extend_from_slice(b"  ");
        }
    }
}

fn write_value(tree: &Tree, id: NodeId, depth: usize, options: Options, out: &mut Vec<u8>) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    match tree.value_ref(id) {
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Null => out.extend_from_slice(b"null"),
        Value::Integer(i) => {
            let text = match i.as_i64() {
                Some(v) => v.to_string(),
                None => i.as_u64().unwrap().to_string(),
            };
            out.extend_from_slice(text.as_bytes());
        }
        Value::Real(r) => out.extend_from_slice(format_real(r.into_inner()).as_bytes()),
        Value::String(s) | Value::Key(s) => write_json_string(s, out),
        Value::Data(bytes) => {
            if !options.coerce {
                return Err(Error::Format("JSON has no representation for Data without coercion".into()));
            }
            write_json_string(&base64::encode(bytes), out);
        }
        Value::Date(d) => {
            if !options.coerce {
                return Err(Error::Format("JSON has no representation for Date without coercion".into()));
            }
            write_json_string(&date::format_iso8601(d.absolute_time), out);
        }
        Value::Uid(u) => {
            if !options.coerce {
                return Err(Error::Format("JSON has no representation for Uid without coercion".into()));
            }
            out.extend_from_slice(b"{\"CF$UID\":");
            if !options.compact {
                out.push(b' ');
            }
            out.extend_from_slice(u.0.to_string().as_bytes());
            out.push(b'}');
        }
        Value::Array(_) => {
            let len = tree.array_len(id);
            if len == 0 {
                out.extend_from_slice(b"[]");
                return Ok(());
            }
            out.push(b'[');
            if !options.compact {
                out.push(b'\n');
            }
            for i in 0..len {
                indent(out, depth + 1, options);
                write_value(tree, tree.array_get_item(id, i).unwrap(), depth + 1, options, out)?;
                if i + 1 != len {
                    out.push(b',');
                }
                if !options.compact {
                    out.push(b'\n');
                }
            }
            indent(out, depth, options);
            out.push(b']');
        }
        Value::Dict(_) => {
            let keys = tree.dict_key_ids(id);
            if keys.is_empty() {
                out.extend_from_slice(b"{}");
                return Ok(());
            }
            out.push(b'{');
            if !options.compact {
                out.push(b'\n');
            }
            let count = keys.len();
            for (i, key_id) in keys.into_iter().enumerate() {
                let key_text = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key_text).unwrap();
                indent(out, depth + 1, options);
                write_json_string(&key_text, out);
                out.push(b':');
                if !options.compact {
                    out.push(b' ');
                }
                write_value(tree, value_id, depth + 1, options, out)?;
                if i + 1 != count {
                    out.push(b',');
                }
                if !options.compact {
                    out.push(b'\n');
                }
            }
            indent(out, depth, options);
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes()),
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

fn format_real(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_nested() {
        let input = br#"{"a": [1, 2.5, true, null, "x"]}"#;
        let (tree, root) = read(input).unwrap();
        let a = tree.dict_get_item(root, "a").unwrap();
        assert_eq!(tree.array_len(a), 5);
    }

    #[test]
    fn test_unicode_escape() {
        let (tree, root) = read(br#""Aé""#).unwrap();
        assert_eq!(tree.get_string_val(root), "A\u{e9}");
    }

    #[test]
    fn test_raw_utf8_multibyte() {
        let (tree, root) = read(br#""😀""#).unwrap();
        assert_eq!(tree.get_string_val(root), "\u{1F600}");
    }

    #[test]
    fn test_surrogate_pair_escape() {
        let (tree, root) = read(b"\"\\uD83D\\uDE00\"").unwrap();
        assert_eq!(tree.get_string_val(root), "\u{1F600}");
    }

    #[test]
    fn test_write_without_coerce_rejects_data() {
        let mut tree = Tree::new();
        let id = tree.new_data(vec![1, 2, 3]);
        assert!(write(&tree, id, Options::default()).is_err());
    }

    #[test]
    fn test_write_with_coerce_encodes_data() {
        let mut tree = Tree::new();
        let id = tree.new_data(vec![1, 2, 3]);
        let options = Options { compact: true, coerce: true };
        let out = write(&tree, id, options).unwrap();
        assert_eq!(out, format!("\"{}\"", base64::encode([1, 2, 3])).into_bytes());
    }
}
