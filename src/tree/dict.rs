//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Dict container operations.
//!
//! The children list alternates Key, value, Key, value, ... (invariant 1).
//! A hash index from key text to the *position* of its value in `children`
//! is built lazily once the dict crosses [`super::DICT_CACHE_THRESHOLD`]
//! entries, and is dropped (not patched) on every structural change so it
//! can never go stale silently.

use crate::error::{Error, Result};
use super::{DictData, NodeId, Tree, Value, DICT_CACHE_THRESHOLD};

fn dict<'a>(tree: &'a Tree, id: NodeId) -> Result<&'a DictData> {
    match tree.value(id) {
        Value::Dict(d) => Ok(d),
        _ => Err(Error::InvalidArg("node is not a Dict".into())),
    }
}

fn dict_mut<'a>(tree: &'a mut Tree, id: NodeId) -> Result<&'a mut DictData> {
    match tree.value_mut(id) {
        Value::Dict(d) => Ok(d),
        _ => Err(Error::InvalidArg("node is not a Dict".into())),
    }
}

pub fn len(tree: &Tree, id: NodeId) -> usize {
    dict(tree, id).map(|d| d.children.len() / 2).unwrap_or(0)
}

/// Finds the position (into `children`) of the value node for `key`,
/// building the hash index first if the dict is large enough to warrant it.
fn position_of(tree: &mut Tree, id: NodeId, key: &str) -> Result<Option<usize>> {
    let needs_index = {
        let d = dict(tree, id)?;
        d.index.is_none() && d.children.len() / 2 > DICT_CACHE_THRESHOLD
    };
    if needs_index {
        build_index(tree, id)?;
    }
    let d = dict(tree, id)?;
    if let Some(index) = &d.index {
        return Ok(index.get(key).map(|&pos| pos as usize));
    }
    for (slot, pair) in d.children.chunks_exact(2).enumerate() {
        let key_id = tree.id_for_index(pair[0]);
        if tree.get_key_val(key_id) == key {
            return Ok(Some(slot));
        }
    }
    Ok(None)
}

fn build_index(tree: &mut Tree, id: NodeId) -> Result<()> {
    let d = dict(tree, id)?;
    let mut map = std::collections::HashMap::with_capacity(d.children.len() / 2);
    for (slot, pair) in d.children.chunks_exact(2).enumerate() {
        let key_id = tree.id_for_index(pair[0]);
        map.insert(tree.get_key_val(key_id), slot as u32);
    }
    dict_mut(tree, id)?.index = Some(map);
    Ok(())
}

pub fn get_item(tree: &Tree, id: NodeId, key: &str) -> Option<NodeId> {
    // Read-only lookup: fall back to linear scan rather than requiring `&mut`.
    let d = dict(tree, id).ok()?;
    if let Some(index) = &d.index {
        return index.get(key).map(|&pos| tree.id_for_index(d.children[pos as usize * 2 + 1]));
    }
    d.children
        .chunks_exact(2)
        .find(|pair| tree.get_key_val(tree.id_for_index(pair[0])) == key)
        .map(|pair| tree.id_for_index(pair[1]))
}

/// Inserts the entry for `key`. A no-op, leaving `item` detached, if `id`
/// already owns an entry under that key: keys may not be set to a string
/// that already exists in the parent Dict. Fails if `item` already has a
/// parent.
pub fn set_item(tree: &mut Tree, id: NodeId, key: &str, item: NodeId) -> Result<()> {
    if tree.parent(item).is_some() {
        return Err(Error::InvalidArg("item already has a parent".into()));
    }
    if position_of(tree, id, key)?.is_some() {
        return Ok(());
    }
    let key_node = tree.new_key(key);
    tree.set_parent(key_node, id)?;
    tree.set_parent(item, id)?;
    let d = dict_mut(tree, id)?;
    d.children.push(key_node.index);
    d.children.push(item.index);
    d.index = None;
    Ok(())
}

/// Inserts or overwrites the entry for `key`, used internally where
/// last-wins semantics are explicitly wanted (codec readers tolerating
/// duplicate keys during construction, `merge`). Fails if `item` already
/// has a parent.
fn set_item_overwrite(tree: &mut Tree, id: NodeId, key: &str, item: NodeId) -> Result<()> {
    if tree.parent(item).is_some() {
        return Err(Error::InvalidArg("item already has a parent".into()));
    }
    if let Some(pos) = position_of(tree, id, key)? {
        // Replace the value in place, keeping the existing Key node: this is
        // not a structural change to the pair list, just a swap at a fixed
        // position, so there is nothing for `detach_from_parent` to do here.
        let old_value = tree.id_for_index(dict(tree, id)?.children[pos * 2 + 1]);
        tree.set_parent(item, id)?;
        dict_mut(tree, id)?.children[pos * 2 + 1] = item.index;
        tree.free_unchecked(old_value);
        return Ok(());
    }
    let key_node = tree.new_key(key);
    tree.set_parent(key_node, id)?;
    tree.set_parent(item, id)?;
    let d = dict_mut(tree, id)?;
    d.children.push(key_node.index);
    d.children.push(item.index);
    d.index = None;
    Ok(())
}

/// Inserts or overwrites the entry for `key`, tolerating a duplicate key
/// with last-wins semantics during parsing. Returns `true` if `key` already
/// had an entry (the caller fails the parse once the document is built).
pub fn set_item_tolerating_duplicate(tree: &mut Tree, id: NodeId, key: &str, item: NodeId) -> Result<bool> {
    let is_duplicate = position_of(tree, id, key)?.is_some();
    set_item_overwrite(tree, id, key, item)?;
    Ok(is_duplicate)
}

pub fn remove_item(tree: &mut Tree, id: NodeId, key: &str) -> Result<()> {
    let pos = match position_of(tree, id, key)? {
        Some(p) => p,
        None => return Ok(()),
    };
    let key_idx = {
        let d = dict(tree, id)?;
        d.children[pos * 2]
    };
    // `Tree::free` on an attached Dict child removes and frees the whole
    // Key/value pair, which is exactly what we want here.
    tree.free(tree.id_for_index(key_idx));
    Ok(())
}

/// Returns the key text under which `value_id` is stored in `id`, if any.
pub fn item_get_key(tree: &Tree, id: NodeId, value_id: NodeId) -> Option<String> {
    let d = dict(tree, id).ok()?;
    d.children
        .chunks_exact(2)
        .find(|pair| tree.id_for_index(pair[1]) == value_id)
        .map(|pair| tree.get_key_val(tree.id_for_index(pair[0])))
}

/// Deep-copies every entry of `source` into `target`, overwriting same-keyed entries.
pub fn merge(tree: &mut Tree, target: NodeId, source: NodeId) -> Result<()> {
    let entries: Vec<(String, NodeId)> = {
        let d = dict(tree, source)?;
        d.children
            .chunks_exact(2)
            .map(|pair| (tree.get_key_val(tree.id_for_index(pair[0])), tree.id_for_index(pair[1])))
            .collect()
    };
    for (key, value_id) in entries {
        let copied = tree.copy(value_id)?;
        set_item_overwrite(tree, target, &key, copied)?;
    }
    Ok(())
}

pub fn copy_item(tree: &mut Tree, target: NodeId, source: NodeId, source_key: &str, target_key: &str) -> Result<()> {
    let value_id = get_item(tree, source, source_key).ok_or(Error::InvalidArg("key not found".into()))?;
    let copied = tree.copy(value_id)?;
    set_item(tree, target, target_key, copied)
}

/// Interprets an Integer, numeric String, or little-endian 1/2/4/8-byte
/// Data value under `key` as a signed integer.
pub fn coerce_int(tree: &Tree, id: NodeId, key: &str) -> Option<i64> {
    coerce_uint(tree, id, key).map(|v| v as i64).or_else(|| {
        let value_id = get_item(tree, id, key)?;
        match tree.value(value_id) {
            Value::Integer(i) => i.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    })
}

pub fn coerce_uint(tree: &Tree, id: NodeId, key: &str) -> Option<u64> {
    let value_id = get_item(tree, id, key)?;
    match tree.value(value_id) {
        Value::Integer(i) => i.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Data(bytes) => le_bytes_to_u64(bytes),
        _ => None,
    }
}

fn le_bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    match bytes.len() {
        1 => Some(bytes[0] as u64),
        2 => Some(u16::from_le_bytes(bytes.try_into().unwrap()) as u64),
        4 => Some(u32::from_le_bytes(bytes.try_into().unwrap()) as u64),
        8 => Some(u64::from_le_bytes(bytes.try_into().unwrap())),
        _ => None,
    }
}

/// Interprets an Integer, the literal strings "true"/"false", or a
/// little-endian Data value under `key` as a boolean.
pub fn coerce_bool(tree: &Tree, id: NodeId, key: &str) -> Option<bool> {
    let value_id = get_item(tree, id, key)?;
    match tree.value(value_id) {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Integer(i) => i.as_i64().map(|v| v != 0),
        Value::Data(bytes) => le_bytes_to_u64(bytes).map(|v| v != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_item() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let value = tree.new_int(42);
        tree.dict_set_item(dict, "answer", value).unwrap();
        assert_eq!(tree.dict_len(dict), 1);
        assert_eq!(tree.get_int_val(tree.dict_get_item(dict, "answer").unwrap()), 42);
        assert!(tree.dict_get_item(dict, "missing").is_none());
    }

    #[test]
    fn test_set_item_is_no_op_on_existing_key() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let first = tree.new_int(1);
        tree.dict_set_item(dict, "k", first).unwrap();
        let second = tree.new_int(2);
        tree.dict_set_item(dict, "k", second).unwrap();
        assert_eq!(tree.dict_len(dict), 1);
        assert_eq!(tree.get_int_val(tree.dict_get_item(dict, "k").unwrap()), 1);
        // The rejected value is left detached, not silently dropped or freed.
        assert!(tree.parent(second).is_none());
    }

    #[test]
    fn test_set_item_tolerating_duplicate_overwrites_and_reports() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let first = tree.new_int(1);
        assert_eq!(tree.dict_set_item_tolerating_duplicate(dict, "k", first).unwrap(), false);
        let second = tree.new_int(2);
        assert_eq!(tree.dict_set_item_tolerating_duplicate(dict, "k", second).unwrap(), true);
        assert_eq!(tree.dict_len(dict), 1);
        assert_eq!(tree.get_int_val(tree.dict_get_item(dict, "k").unwrap()), 2);
    }

    #[test]
    fn test_remove_item() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let value = tree.new_int(1);
        tree.dict_set_item(dict, "k", value).unwrap();
        tree.dict_remove_item(dict, "k").unwrap();
        assert_eq!(tree.dict_len(dict), 0);
        assert!(tree.dict_get_item(dict, "k").is_none());
    }

    #[test]
    fn test_remove_item_missing_key_is_no_op() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        assert!(tree.dict_remove_item(dict, "absent").is_ok());
    }

    #[test]
    fn test_merge_overwrites_same_keyed_entries() {
        let mut tree = Tree::new();
        let target = tree.new_dict();
        let source = tree.new_dict();
        let target_value = tree.new_int(1);
        tree.dict_set_item(target, "k", target_value).unwrap();
        let source_value = tree.new_int(2);
        tree.dict_set_item(source, "k", source_value).unwrap();
        let other_value = tree.new_int(3);
        tree.dict_set_item(source, "other", other_value).unwrap();
        tree.dict_merge(target, source).unwrap();
        assert_eq!(tree.dict_len(target), 2);
        assert_eq!(tree.get_int_val(tree.dict_get_item(target, "k").unwrap()), 2);
        assert_eq!(tree.get_int_val(tree.dict_get_item(target, "other").unwrap()), 3);
    }

    #[test]
    fn test_copy_item_under_alternate_key() {
        let mut tree = Tree::new();
        let source = tree.new_dict();
        let target = tree.new_dict();
        let value = tree.new_int(7);
        tree.dict_set_item(source, "src_key", value).unwrap();
        tree.dict_copy_item(target, source, "src_key", "dst_key").unwrap();
        assert_eq!(tree.get_int_val(tree.dict_get_item(target, "dst_key").unwrap()), 7);
        assert!(tree.dict_get_item(target, "src_key").is_none());
    }

    #[test]
    fn test_coerce_int_from_string_and_data() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let string_value = tree.new_string("42");
        tree.dict_set_item(dict, "as_string", string_value).unwrap();
        let data_value = tree.new_data(vec![0x2a, 0x00]);
        tree.dict_set_item(dict, "as_data", data_value).unwrap();
        assert_eq!(tree.dict_get_int(dict, "as_string"), Some(42));
        assert_eq!(tree.dict_get_uint(dict, "as_data"), Some(42));
    }

    #[test]
    fn test_coerce_bool_from_string_and_integer() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let true_string = tree.new_string("true");
        tree.dict_set_item(dict, "flag_str", true_string).unwrap();
        let nonzero_int = tree.new_int(1);
        tree.dict_set_item(dict, "flag_int", nonzero_int).unwrap();
        assert_eq!(tree.dict_get_bool(dict, "flag_str"), Some(true));
        assert_eq!(tree.dict_get_bool(dict, "flag_int"), Some(true));
        assert_eq!(tree.dict_get_bool(dict, "missing"), None);
    }

    #[test]
    fn test_item_get_key_roundtrip() {
        let mut tree = Tree::new();
        let dict = tree.new_dict();
        let value = tree.new_int(1);
        tree.dict_set_item(dict, "k", value).unwrap();
        assert_eq!(tree.dict_item_get_key(dict, value), Some("k".to_string()));
    }
}
