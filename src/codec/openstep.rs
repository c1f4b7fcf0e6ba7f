//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The OpenStep/NeXTSTEP ASCII plist codec.
//!
//! No OpenStep reader or writer is present in `examples/original_source`
//! (only `xplist.c`'s XML codec is captured there), so this is written in
//! the same hand-rolled recursive-descent style as that XML reader and this
//! crate's own JSON codec: a lexer/parser for `{ key = value; }` / `( v, v )`
//! syntax, barewords, quoted strings with octal escapes, `<hex data>`, and
//! the GNUstep `<*I...>`/`<*R...>`/`<*B...>`/`<*D...>` typed-literal
//! extensions.

use crate::date;
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree, Value, MAX_NESTING_DEPTH};

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

pub fn read(bytes: &[u8]) -> Result<(Tree, NodeId)> {
    let mut tree = Tree::new();
    let mut parser = Parser { bytes, pos: 0 };
    parser.skip_whitespace_and_comments();
    let root = parser.parse_value(&mut tree, 0)?;
    parser.skip_whitespace_and_comments();
    if parser.pos != parser.bytes.len() {
        return Err(Error::Parse("trailing data after top-level OpenStep value".into()));
    }
    Ok((tree, root))
}

fn is_bareword_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'/' | b'$' | b':' | b'-')
}

/// Writer's bareword character class, stricter than the reader's: `:` and
/// `-` are accepted on read (GNUstep barewords commonly carry them) but must
/// round-trip through quotes on write, since the reader for those bytes is
/// a courtesy extension, not part of the bareword grammar a writer promises.
fn is_bareword_byte_for_write(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'/' | b'$')
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            Err(Error::Parse(format!("expected '{}' at byte offset {}", b as char, self.pos)))
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while !(self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/')) {
                        if self.bump().is_none() {
                            break;
                        }
                    }
                    self.pos += 2;
                }
                _ => break,
            }
        }
    }

    fn parse_value(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(Error::MaxNesting);
        }
        self.skip_whitespace_and_comments();
        match self.peek() {
            Some(b'{') => self.parse_dict(tree, depth),
            Some(b'(') => self.parse_array(tree, depth),
            Some(b'"') => Ok(tree.new_string(self.parse_quoted_string()?)),
            Some(b'<') => self.parse_angle_bracket(tree),
            Some(b) if is_bareword_byte(b) => Ok(tree.new_string(self.parse_bareword()?)),
            Some(c) => Err(Error::Parse(format!("unexpected byte {:?} at offset {}", c as char, self.pos))),
            None => Err(Error::Parse("unexpected end of input".into())),
        }
    }

    fn parse_dict(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        self.expect(b'{')?;
        let dict_id = tree.new_dict();
        let mut had_duplicate_key = false;
        loop {
            self.skip_whitespace_and_comments();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                break;
            }
            let key = match self.peek() {
                Some(b'"') => self.parse_quoted_string()?,
                Some(b) if is_bareword_byte(b) => self.parse_bareword()?,
                _ => return Err(Error::Parse("expected dict key".into())),
            };
            self.skip_whitespace_and_comments();
            self.expect(b'=')?;
            let value = self.parse_value(tree, depth + 1)?;
            if tree.dict_set_item_tolerating_duplicate(dict_id, &key, value)? {
                had_duplicate_key = true;
            }
            self.skip_whitespace_and_comments();
            self.expect(b';')?;
        }
        if had_duplicate_key {
            return Err(Error::Parse("dict contains a duplicate key".into()));
        }
        Ok(dict_id)
    }

    fn parse_array(&mut self, tree: &mut Tree, depth: usize) -> Result<NodeId> {
        self.expect(b'(')?;
        let array_id = tree.new_array();
        self.skip_whitespace_and_comments();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(array_id);
        }
        loop {
            let value = self.parse_value(tree, depth + 1)?;
            tree.array_append_item(array_id, value)?;
            self.skip_whitespace_and_comments();
            match self.bump() {
                Some(b',') => {
                    self.skip_whitespace_and_comments();
                    if self.peek() == Some(b')') {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b')') => break,
                _ => return Err(Error::Parse("expected ',' or ')' in array".into())),
            }
        }
        Ok(array_id)
    }

    fn parse_bareword(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_bareword_byte(b)) {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn parse_quoted_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b'r') => out.push('\r'),
                    Some(b't') => out.push('\t'),
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(c) if c.is_ascii_digit() => {
                        let mut value = (c - b'0') as u32;
                        for _ in 0..2 {
                            if matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                                value = value * 8 + (self.bump().unwrap() - b'0') as u32;
                            }
                        }
                        out.push(char::from_u32(value).unwrap_or('\u{FFFD}'));
                    }
                    Some(c) => out.push(c as char),
                    None => return Err(Error::Parse("unterminated escape in quoted string".into())),
                },
                Some(b) => {
                    let start = self.pos - 1;
                    let width = utf8_width(b);
                    let end = start + width;
                    if end > self.bytes.len() {
                        return Err(Error::Parse("truncated UTF-8 sequence in quoted string".into()));
                    }
                    out.push_str(std::str::from_utf8(&self.bytes[start..end])
                        .map_err(|e| Error::Parse(format!("invalid UTF-8: {}", e)))?);
                    self.pos = end;
                }
                None => return Err(Error::Parse("unterminated quoted string".into())),
            }
        }
        Ok(out)
    }

    /// Parses either plain `<hex bytes>` data or a GNUstep `<*X...>` typed literal.
    fn parse_angle_bracket(&mut self, tree: &mut Tree) -> Result<NodeId> {
        self.expect(b'<')?;
        if self.peek() == Some(b'*') {
            self.pos += 1;
            let tag = self.bump().ok_or_else(|| Error::Parse("truncated GNUstep literal".into()))?;
            let start = self.pos;
            while !matches!(self.peek(), None | Some(b'>')) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.bytes[start..self.pos])
                .map_err(|e| Error::Parse(format!("invalid UTF-8 in GNUstep literal: {}", e)))?
                .to_string();
            self.expect(b'>')?;
            return match tag {
                b'I' => {
                    let value: i64 = text.parse()
                        .map_err(|_| Error::Parse(format!("invalid <*I> literal {:?}", text)))?;
                    Ok(tree.new_int(value))
                }
                b'R' => {
                    let value: f64 = text.parse()
                        .map_err(|_| Error::Parse(format!("invalid <*R> literal {:?}", text)))?;
                    Ok(tree.new_real(value))
                }
                b'B' => match text.as_str() {
                    "Y" => Ok(tree.new_bool(true)),
                    "N" => Ok(tree.new_bool(false)),
                    _ => Err(Error::Parse(format!("invalid <*B> literal {:?}", text))),
                },
                b'D' => {
                    let iso = text.trim().replace(' ', "T") + "Z";
                    let absolute_time = date::parse_iso8601(&iso)?;
                    Ok(tree.new_date(absolute_time))
                }
                other => Err(Error::Parse(format!("unrecognized GNUstep literal tag '{}'", other as char))),
            };
        }
        let start = self.pos;
        while !matches!(self.peek(), None | Some(b'>')) {
            self.pos += 1;
        }
        let hex_text: String = self.bytes[start..self.pos]
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|&b| b as char)
            .collect();
        self.expect(b'>')?;
        if hex_text.len() % 2 != 0 {
            return Err(Error::Parse("odd number of hex digits in <data>".into()));
        }
        let mut bytes = Vec::with_capacity(hex_text.len() / 2);
        let hex_bytes = hex_text.as_bytes();
        for chunk in hex_bytes.chunks(2) {
            let pair = std::str::from_utf8(chunk).unwrap();
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::Parse(format!("invalid hex byte {:?}", pair)))?;
            bytes.push(byte);
        }
        Ok(tree.new_data(bytes))
    }
}

fn utf8_width(lead: u8) -> usize {
    if lead & 0x80 == 0 { 1 } else if lead & 0xE0 == 0xC0 { 2 } else if lead & 0xF0 == 0xE0 { 3 } else { 4 }
}

// -- Writer -------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub compact: bool,
}

pub fn write(tree: &Tree, root: NodeId, options: WriteOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(tree, root, 0, options, &mut out)?;
    if !options.compact {
        out.push(b'\n');
    }
    Ok(out)
}

fn indent(out: &mut Vec<u8>, depth: usize, options: WriteOptions) {
    if !options.compact {
        for _ in 0..depth {
            out.push(b'\t');
        }
    }
}

fn write_value(tree: &Tree, id: NodeId, depth: usize, options: WriteOptions, out: &mut Vec<u8>) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    match tree.value_ref(id) {
        Value::Bool(b) => out.extend_from_slice(if *b { b"<*BY>" } else { b"<*BN>" }),
        Value::Null => return Err(Error::Format("OpenStep plist has no representation for Null".into())),
        Value::Integer(i) => {
            let text = match i.as_i64() {
                Some(v) => v.to_string(),
                None => i.as_u64().unwrap().to_string(),
            };
            out.extend_from_slice(format!("<*I{}>", text).as_bytes());
        }
        Value::Real(r) => out.extend_from_slice(format!("<*R{}>", r.into_inner()).as_bytes()),
        Value::String(s) | Value::Key(s) => write_openstep_string(s, out),
        Value::Data(bytes) => {
            out.push(b'<');
            for b in bytes {
                out.extend_from_slice(format!("{:02x}", b).as_bytes());
            }
            out.push(b'>');
        }
        Value::Date(d) => {
            let iso = date::format_iso8601(d.absolute_time);
            let gnustep = iso.trim_end_matches('Z').replace('T', " ") + " +0000";
            out.extend_from_slice(format!("<*D{}>", gnustep).as_bytes());
        }
        Value::Uid(u) => {
            // No native OpenStep literal: written as a single-entry dict.
            out.extend_from_slice(b"{ CF$UID = ");
            out.extend_from_slice(format!("<*I{}>", u.0).as_bytes());
            out.extend_from_slice(b"; }");
        }
        Value::Array(_) => {
            let len = tree.array_len(id);
            out.push(b'(');
            if !options.compact && len > 0 {
                out.push(b'\n');
            }
            for i in 0..len {
                indent(out, depth + 1, options);
                write_value(tree, tree.array_get_item(id, i).unwrap(), depth + 1, options, out)?;
                out.push(b',');
                if !options.compact {
                    out.push(b'\n');
                } else if i + 1 != len {
                    out.push(b' ');
                }
            }
            if !options.compact && len > 0 {
                indent(out, depth, options);
            }
            out.push(b')');
        }
        Value::Dict(_) => {
            let keys = tree.dict_key_ids(id);
            out.push(b'{');
            if !options.compact && !keys.is_empty() {
                out.push(b'\n');
            }
            for key_id in keys {
                let key_text = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key_text).unwrap();
                indent(out, depth + 1, options);
                write_openstep_string(&key_text, out);
                out.extend_from_slice(b" = ");
                write_value(tree, value_id, depth + 1, options, out)?;
                out.push(b';');
                if !options.compact {
                    out.push(b'\n');
                } else {
                    out.push(b' ');
                }
            }
            if !options.compact {
                indent(out, depth, options);
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn is_bareword_clean(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_bareword_byte_for_write)
}

fn write_openstep_string(s: &str, out: &mut Vec<u8>) {
    if is_bareword_clean(s) {
        out.extend_from_slice(s.as_bytes());
        return;
    }
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_dict_and_array() {
        let input = b"{ a = 1; b = ( x, y, \"z z\" ); }";
        let (tree, root) = read(input).unwrap();
        let a = tree.dict_get_item(root, "a").unwrap();
        assert_eq!(tree.get_string_val(a), "1");
        let b = tree.dict_get_item(root, "b").unwrap();
        assert_eq!(tree.array_len(b), 3);
    }

    #[test]
    fn test_hex_data() {
        let (tree, root) = read(b"<68656c6c6f>").unwrap();
        assert_eq!(tree.get_data_val(root), b"hello".to_vec());
    }

    #[test]
    fn test_gnustep_int_and_bool() {
        let (tree, root) = read(b"{ n = <*I-7>; flag = <*BY>; }").unwrap();
        let n = tree.dict_get_item(root, "n").unwrap();
        assert_eq!(tree.get_int_val(n), -7);
        let flag = tree.dict_get_item(root, "flag").unwrap();
        assert!(tree.get_bool_val(flag));
    }

    #[test]
    fn test_bareword_vs_quoted_write() {
        let mut tree = Tree::new();
        let bareword = tree.new_string("simple.key_1");
        let mut out = Vec::new();
        write_openstep_string(&tree.get_string_val(bareword), &mut out);
        assert_eq!(out, b"simple.key_1");

        let quoted = tree.new_string("has space");
        out.clear();
        write_openstep_string(&tree.get_string_val(quoted), &mut out);
        assert_eq!(out, b"\"has space\"");
    }
}
