//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Human-readable, writer-only print formats.
//!
//! Two styles, selected by the `PLIST_OUTPUT_FORMAT` environment variable:
//! `plutil`, an indented tree dump resembling Apple's `plutil -p`, and
//! `limd`, a flat one-line-per-leaf dump in the style of a debug logger
//! walking a node tree (`<path>: <value>`, containers never printed
//! directly).

use crate::date;
use crate::tree::{NodeId, Tree, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrintStyle {
    Plutil,
    Limd,
}

impl PrintStyle {
    pub fn from_env_name(name: &str) -> Option<PrintStyle> {
        match name {
            "plutil" => Some(PrintStyle::Plutil),
            "limd" => Some(PrintStyle::Limd),
            _ => None,
        }
    }
}

pub fn print(tree: &Tree, root: NodeId, style: PrintStyle) -> String {
    let mut out = String::new();
    match style {
        PrintStyle::Plutil => write_plutil(tree, root, 0, &mut out),
        PrintStyle::Limd => write_limd(tree, root, "$", &mut out),
    }
    out
}

fn write_plutil(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
    match tree.value_ref(id) {
        Value::Array(_) => {
            out.push_str("[\n");
            let len = tree.array_len(id);
            for i in 0..len {
                push_indent(out, depth + 1);
                out.push_str(&format!("{} => ", i));
                write_plutil(tree, tree.array_get_item(id, i).unwrap(), depth + 1, out);
                out.push('\n');
            }
            push_indent(out, depth);
            out.push(']');
        }
        Value::Dict(_) => {
            out.push_str("{\n");
            for key_id in tree.dict_key_ids(id) {
                let key = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key).unwrap();
                push_indent(out, depth + 1);
                out.push_str(&format!("{} => ", key));
                write_plutil(tree, value_id, depth + 1, out);
                out.push('\n');
            }
            push_indent(out, depth);
            out.push('}');
        }
        scalar => out.push_str(&scalar_text(scalar)),
    }
}

fn write_limd(tree: &Tree, id: NodeId, path: &str, out: &mut String) {
    match tree.value_ref(id) {
        Value::Array(_) => {
            let len = tree.array_len(id);
            for i in 0..len {
                let child_path = format!("{}[{}]", path, i);
                write_limd(tree, tree.array_get_item(id, i).unwrap(), &child_path, out);
            }
        }
        Value::Dict(_) => {
            for key_id in tree.dict_key_ids(id) {
                let key = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key).unwrap();
                let child_path = format!("{}.{}", path, key);
                write_limd(tree, value_id, &child_path, out);
            }
        }
        scalar => {
            out.push_str(path);
            out.push_str(": ");
            out.push_str(&scalar_text(scalar));
            out.push('\n');
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Integer(i) => match i.as_i64() {
            Some(v) => v.to_string(),
            None => i.as_u64().unwrap().to_string(),
        },
        Value::Real(r) => r.into_inner().to_string(),
        Value::String(s) | Value::Key(s) => s.clone(),
        Value::Data(bytes) => format!("<{} byte(s)>", bytes.len()),
        Value::Date(d) => date::format_iso8601(d.absolute_time),
        Value::Uid(u) => format!("CF$UID({})", u.0),
        Value::Array(_) | Value::Dict(_) => unreachable!("containers are handled by their own branch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limd_flattens_paths() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let value = tree.new_int(42);
        tree.dict_set_item(dict, "answer", value).unwrap();
        let text = print(&tree, dict, PrintStyle::Limd);
        assert_eq!(text, "$.answer: 42\n");
    }

    #[test]
    fn test_plutil_brace_dict() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let value = tree.new_bool(true);
        tree.dict_set_item(dict, "flag", value).unwrap();
        let text = print(&tree, dict, PrintStyle::Plutil);
        assert!(text.starts_with("{\n"));
        assert!(text.contains("flag => true"));
    }
}
