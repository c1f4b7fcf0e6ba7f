//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Array container operations.

use crate::error::{Error, Result};
use super::{NodeId, Tree, Value};

fn children(tree: &Tree, id: NodeId) -> Result<&Vec<u32>> {
    match tree.value(id) {
        Value::Array(arr) => Ok(&arr.children),
        _ => Err(Error::InvalidArg("node is not an Array".into())),
    }
}

fn children_mut<'a>(tree: &'a mut Tree, id: NodeId) -> Result<&'a mut Vec<u32>> {
    match tree.value_mut(id) {
        Value::Array(arr) => Ok(&mut arr.children),
        _ => Err(Error::InvalidArg("node is not an Array".into())),
    }
}

pub fn len(tree: &Tree, id: NodeId) -> usize {
    children(tree, id).map(|c| c.len()).unwrap_or(0)
}

pub fn get_item(tree: &Tree, id: NodeId, index: usize) -> Option<NodeId> {
    let kids = children(tree, id).ok()?;
    kids.get(index).map(|&idx| tree.id_for_index(idx))
}

/// Inserts `item` at `index`, shifting following elements right. Fails if
/// `item` is already attached to a parent.
pub fn insert_item(tree: &mut Tree, id: NodeId, index: usize, item: NodeId) -> Result<()> {
    if tree.parent(item).is_some() {
        return Err(Error::InvalidArg("item already has a parent".into()));
    }
    let len = len(tree, id);
    if index > len {
        return Err(Error::InvalidArg("index out of range".into()));
    }
    tree.set_parent(item, id)?;
    children_mut(tree, id)?.insert(index, item.index);
    Ok(())
}

pub fn append_item(tree: &mut Tree, id: NodeId, item: NodeId) -> Result<()> {
    let len = len(tree, id);
    insert_item(tree, id, len, item)
}

/// Atomically replaces the element at `index`: the old value is detached
/// and the new one inserted at the same position. If attaching the new
/// value fails, the old value is reinserted so the array is never left
/// malformed.
pub fn set_item(tree: &mut Tree, id: NodeId, index: usize, item: NodeId) -> Result<()> {
    let old = get_item(tree, id, index).ok_or_else(|| Error::InvalidArg("index out of range".into()))?;
    tree.detach_from_parent(old);
    match insert_item(tree, id, index, item) {
        Ok(()) => {
            tree.free(old);
            Ok(())
        }
        Err(e) => {
            // Guarantee the array stays well-formed: put the old value back.
            tree.set_parent(old, id).ok();
            children_mut(tree, id)?.insert(index, old.index);
            Err(e)
        }
    }
}

pub fn remove_item(tree: &mut Tree, id: NodeId, index: usize) -> Result<()> {
    let item = get_item(tree, id, index).ok_or_else(|| Error::InvalidArg("index out of range".into()))?;
    tree.free(item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_get() {
        let mut tree = Tree::new();
        let array = tree.new_array();
        let a = tree.new_int(1);
        let b = tree.new_int(2);
        tree.array_append_item(array, a).unwrap();
        tree.array_append_item(array, b).unwrap();
        assert_eq!(tree.array_len(array), 2);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 0).unwrap()), 1);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 1).unwrap()), 2);
    }

    #[test]
    fn test_insert_shifts_following_elements() {
        let mut tree = Tree::new();
        let array = tree.new_array();
        let a = tree.new_int(1);
        let b = tree.new_int(2);
        let mid = tree.new_int(99);
        tree.array_append_item(array, a).unwrap();
        tree.array_append_item(array, b).unwrap();
        tree.array_insert_item(array, 1, mid).unwrap();
        assert_eq!(tree.array_len(array), 3);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 1).unwrap()), 99);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 2).unwrap()), 2);
    }

    #[test]
    fn test_insert_rejects_already_attached_item() {
        let mut tree = Tree::new();
        let outer = tree.new_array();
        let inner = tree.new_array();
        let item = tree.new_int(1);
        tree.array_append_item(outer, item).unwrap();
        assert!(tree.array_append_item(inner, item).is_err());
    }

    #[test]
    fn test_set_item_replaces_in_place() {
        let mut tree = Tree::new();
        let array = tree.new_array();
        let a = tree.new_int(1);
        tree.array_append_item(array, a).unwrap();
        let b = tree.new_int(2);
        tree.array_set_item(array, 0, b).unwrap();
        assert_eq!(tree.array_len(array), 1);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 0).unwrap()), 2);
    }

    #[test]
    fn test_set_item_out_of_range_is_err() {
        let mut tree = Tree::new();
        let array = tree.new_array();
        let item = tree.new_int(1);
        assert!(tree.array_set_item(array, 0, item).is_err());
    }

    #[test]
    fn test_remove_item() {
        let mut tree = Tree::new();
        let array = tree.new_array();
        let a = tree.new_int(1);
        let b = tree.new_int(2);
        tree.array_append_item(array, a).unwrap();
        tree.array_append_item(array, b).unwrap();
        tree.array_remove_item(array, 0).unwrap();
        assert_eq!(tree.array_len(array), 1);
        assert_eq!(tree.get_int_val(tree.array_get_item(array, 0).unwrap()), 2);
    }

    #[test]
    fn test_len_on_non_array_is_zero() {
        let mut tree = Tree::new();
        let scalar = tree.new_int(1);
        assert_eq!(tree.array_len(scalar), 0);
    }
}
