//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The plist node tree.
//!
//! Every plist value is a node owned by a [`Tree`] arena. Containers own
//! their children by identifier rather than by pointer, which is what lets
//! detach/reattach be a pointer-swap and keeps every recursive walk
//! (copy, free, compare, codec traversal) iterative with an explicit work
//! stack, per the re-architecture notes: this rules out stack overflows on
//! adversarial input and sidesteps the cyclic-ownership problem a parent
//! back-reference would otherwise create.
//!
//! # References
//!
//! 1. `examples/original_source/include/plist/Node.h`
//! 2. `examples/original_source/libcnary/node_list.c`

mod array;
mod dict;
pub mod iter;
mod value;

pub use value::{
    ArrayData, Date, DictData, Integer, NodeType, Uid, Value,
    ARRAY_CACHE_THRESHOLD, DICT_CACHE_THRESHOLD, MAC_EPOCH_UNIX_OFFSET,
};

use crate::error::{Error, Result};

/// Maximum nesting depth enforced by every codec and by copy operations (invariant 5).
pub const MAX_NESTING_DEPTH: usize = 4096;

/// A stable handle to a node owned by a [`Tree`].
///
/// Handles from one tree are never valid against another; using one that way
/// is a programmer error, not a recoverable condition (see `Tree::slot`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    parent: Option<NodeId>,
    /// `None` marks a freed, reusable slot.
    value: Option<Value>,
}

/// An arena owning every node reachable from any tree built against it.
///
/// A single `Tree` may contain several disjoint, parentless subtrees at
/// once (a root plus any detached-but-not-yet-freed values); callers are
/// responsible for eventually freeing or re-attaching each one.
#[derive(Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { slots: Vec::new(), free: Vec::new() }
    }

    fn alloc(&mut self, value: Value) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.parent = None;
            slot.value = Some(value);
            NodeId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, parent: None, value: Some(value) });
            NodeId { index, generation: 0 }
        }
    }

    fn slot(&self, id: NodeId) -> &Slot {
        let slot = &self.slots[id.index as usize];
        assert!(
            slot.generation == id.generation && slot.value.is_some(),
            "use of a stale or freed node handle"
        );
        slot
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        let slot = &mut self.slots[id.index as usize];
        assert!(
            slot.generation == id.generation && slot.value.is_some(),
            "use of a stale or freed node handle"
        );
        slot
    }

    fn value(&self, id: NodeId) -> &Value {
        self.slot(id).value.as_ref().unwrap()
    }

    fn value_mut(&mut self, id: NodeId) -> &mut Value {
        self.slot_mut(id).value.as_mut().unwrap()
    }

    // -- Constructors --------------------------------------------------

    pub fn new_bool(&mut self, value: bool) -> NodeId {
        self.alloc(Value::Bool(value))
    }

    pub fn new_int(&mut self, value: i64) -> NodeId {
        self.alloc(Value::Integer(Integer::from_i64(value)))
    }

    pub fn new_uint(&mut self, value: u64) -> NodeId {
        self.alloc(Value::Integer(Integer::from_u64(value)))
    }

    /// Builds an integer node from an already-classified [`Integer`], used
    /// by the binary codec reader to preserve the wire's width attribute
    /// exactly (a plain `from_u64` would re-narrow a `Wide` value that
    /// happens to fit in 63 bits back down to `Signed`).
    pub fn new_integer(&mut self, value: Integer) -> NodeId {
        self.alloc(Value::Integer(value))
    }

    pub fn new_real(&mut self, value: f64) -> NodeId {
        self.alloc(Value::Real(value.into()))
    }

    pub fn new_string(&mut self, value: impl Into<String>) -> NodeId {
        self.alloc(Value::String(value.into()))
    }

    pub fn new_key(&mut self, value: impl Into<String>) -> NodeId {
        self.alloc(Value::Key(value.into()))
    }

    pub fn new_data(&mut self, value: impl Into<Vec<u8>>) -> NodeId {
        self.alloc(Value::Data(value.into()))
    }

    /// Builds a date directly from Apple-epoch seconds.
    pub fn new_date(&mut self, absolute_time: f64) -> NodeId {
        self.alloc(Value::Date(Date { absolute_time }))
    }

    /// Builds a date from a Unix timestamp (seconds since 1970-01-01T00:00:00Z).
    pub fn new_unix_date(&mut self, unix_seconds: f64) -> NodeId {
        self.alloc(Value::Date(Date::from_unix(unix_seconds)))
    }

    pub fn new_uid(&mut self, value: u64) -> NodeId {
        self.alloc(Value::Uid(Uid(value)))
    }

    pub fn new_null(&mut self) -> NodeId {
        self.alloc(Value::Null)
    }

    pub fn new_array(&mut self) -> NodeId {
        self.alloc(Value::Array(ArrayData::default()))
    }

    pub fn new_dict(&mut self) -> NodeId {
        self.alloc(Value::Dict(DictData::default()))
    }

    // -- Introspection ---------------------------------------------------

    pub fn get_type(&self, id: NodeId) -> NodeType {
        self.value(id).node_type()
    }

    /// Direct read-only access to the node's payload, for codecs that need
    /// to match on every variant (typed getters above cover the common
    /// single-variant case; this is for writers walking the whole tagged union).
    pub fn value_ref(&self, id: NodeId) -> &Value {
        self.value(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    // -- Typed getters ---------------------------------------------------
    //
    // Getters silently yield a zero/empty value when the tag does not
    // match, per the ergonomic, non-fatal contract in the error design.

    pub fn get_bool_val(&self, id: NodeId) -> bool {
        match self.value(id) {
            Value::Bool(v) => *v,
            _ => false,
        }
    }

    pub fn get_int_val(&self, id: NodeId) -> i64 {
        match self.value(id) {
            Value::Integer(v) => v.as_i64().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn get_uint_val(&self, id: NodeId) -> u64 {
        match self.value(id) {
            Value::Integer(v) => v.as_u64().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn get_integer(&self, id: NodeId) -> Option<Integer> {
        match self.value(id) {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_real_val(&self, id: NodeId) -> f64 {
        match self.value(id) {
            Value::Real(v) => v.into_inner(),
            _ => 0.0,
        }
    }

    pub fn get_string_val(&self, id: NodeId) -> String {
        self.get_string_ptr(id).unwrap_or("").to_string()
    }

    pub fn get_string_ptr(&self, id: NodeId) -> Option<&str> {
        match self.value(id) {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_key_val(&self, id: NodeId) -> String {
        match self.value(id) {
            Value::Key(v) => v.clone(),
            _ => String::new(),
        }
    }

    pub fn get_data_val(&self, id: NodeId) -> Vec<u8> {
        self.get_data_ptr(id).unwrap_or(&[]).to_vec()
    }

    pub fn get_data_ptr(&self, id: NodeId) -> Option<&[u8]> {
        match self.value(id) {
            Value::Data(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_date_val(&self, id: NodeId) -> f64 {
        match self.value(id) {
            Value::Date(v) => v.absolute_time,
            _ => 0.0,
        }
    }

    pub fn get_unix_date_val(&self, id: NodeId) -> f64 {
        match self.value(id) {
            Value::Date(v) => v.to_unix(),
            _ => 0.0,
        }
    }

    pub fn get_uid_val(&self, id: NodeId) -> u64 {
        match self.value(id) {
            Value::Uid(v) => v.0,
            _ => 0,
        }
    }

    // -- Typed setters ---------------------------------------------------

    /// Replaces the payload of `id` with a new scalar value, freeing any
    /// children if `id` was previously a container.
    fn replace_scalar(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.free_children_of(id)?;
        *self.value_mut(id) = value;
        Ok(())
    }

    pub fn set_bool_val(&mut self, id: NodeId, value: bool) -> Result<()> {
        self.replace_scalar(id, Value::Bool(value))
    }

    pub fn set_int_val(&mut self, id: NodeId, value: i64) -> Result<()> {
        self.replace_scalar(id, Value::Integer(Integer::from_i64(value)))
    }

    pub fn set_uint_val(&mut self, id: NodeId, value: u64) -> Result<()> {
        self.replace_scalar(id, Value::Integer(Integer::from_u64(value)))
    }

    pub fn set_real_val(&mut self, id: NodeId, value: f64) -> Result<()> {
        self.replace_scalar(id, Value::Real(value.into()))
    }

    pub fn set_string_val(&mut self, id: NodeId, value: impl Into<String>) -> Result<()> {
        self.replace_scalar(id, Value::String(value.into()))
    }

    /// Sets the key text of `id`. A no-op if the parent Dict already owns a
    /// distinct Key child with the same text (keys must stay unique within
    /// their Dict).
    pub fn set_key_val(&mut self, id: NodeId, value: impl Into<String>) -> Result<()> {
        let text = value.into();
        if let Some(parent) = self.parent(id) {
            if let Value::Dict(dict) = self.value(parent) {
                let clashes = dict
                    .children
                    .iter()
                    .step_by(2)
                    .any(|&key_idx| {
                        key_idx != id.index && self.slots[key_idx as usize]
                            .value
                            .as_ref()
                            .map_or(false, |v| matches!(v, Value::Key(k) if k == &text))
                    });
                if clashes {
                    return Ok(());
                }
            }
        }
        self.replace_scalar(id, Value::Key(text))
    }

    pub fn set_data_val(&mut self, id: NodeId, value: impl Into<Vec<u8>>) -> Result<()> {
        self.replace_scalar(id, Value::Data(value.into()))
    }

    pub fn set_date_val(&mut self, id: NodeId, absolute_time: f64) -> Result<()> {
        self.replace_scalar(id, Value::Date(Date { absolute_time }))
    }

    pub fn set_unix_date_val(&mut self, id: NodeId, unix_seconds: f64) -> Result<()> {
        self.replace_scalar(id, Value::Date(Date::from_unix(unix_seconds)))
    }

    pub fn set_uid_val(&mut self, id: NodeId, value: u64) -> Result<()> {
        self.replace_scalar(id, Value::Uid(Uid(value)))
    }

    // -- Structural mutation ---------------------------------------------

    /// Detaches `id` from its parent, if any. The node remains owned by the
    /// arena and must eventually be freed or re-attached.
    /// Detaches `id` from an Array parent. Dict children go through
    /// `free`'s pair-aware handling instead, since a lone Key or value
    /// cannot be removed without breaking invariant 1.
    pub(crate) fn detach_from_parent(&mut self, id: NodeId) {
        let parent = match self.slot(id).parent {
            Some(p) => p,
            None => return,
        };
        match self.value_mut(parent) {
            Value::Array(arr) => arr.children.retain(|&c| c != id.index),
            Value::Dict(_) => unreachable!("Dict children are detached via Tree::free's pair-aware path"),
            _ => unreachable!("parent of an attached node is always a container"),
        }
        self.slot_mut(id).parent = None;
    }

    /// Re-parents a detached node under `parent`. Fails if `id` already has a parent.
    pub(crate) fn set_parent(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        if self.slot(id).parent.is_some() {
            return Err(Error::InvalidArg("node already has a parent".into()));
        }
        self.slot_mut(id).parent = Some(parent);
        Ok(())
    }

    fn is_live(&self, id: NodeId) -> bool {
        id.index as usize < self.slots.len() && {
            let slot = &self.slots[id.index as usize];
            slot.generation == id.generation && slot.value.is_some()
        }
    }

    /// Frees the entire subtree rooted at `id`. Silently no-ops if the
    /// handle is already free. If `id` has a parent it is detached first.
    ///
    /// Freeing either half of a Dict's Key/value pair frees the other half
    /// too: the pair is the indivisible unit invariant 1 describes, so
    /// there is no well-formed way to detach only one side of it.
    pub fn free(&mut self, id: NodeId) {
        if !self.is_live(id) {
            return;
        }
        if let Some(parent) = self.slot(id).parent {
            if matches!(self.value(parent), Value::Dict(_)) {
                let pair: Option<Vec<u32>> = if let Value::Dict(d) = self.value_mut(parent) {
                    d.children.iter().position(|&c| c == id.index).map(|pos| {
                        let pair_start = pos - (pos % 2);
                        let drained: Vec<u32> = d.children.drain(pair_start..pair_start + 2).collect();
                        d.index = None;
                        drained
                    })
                } else {
                    None
                };
                if let Some(pair) = pair {
                    for idx in pair {
                        let pair_id = self.id_for_index(idx);
                        self.free_unchecked(pair_id);
                    }
                    return;
                }
            }
        }
        self.detach_from_parent(id);
        self.free_unchecked(id);
    }

    /// Frees `id` and its descendants without touching its parent's child
    /// list (used when the parent's list is already being rebuilt/dropped).
    fn free_unchecked(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let index = node.index as usize;
            let value = self.slots[index].value.take();
            self.slots[index].generation = self.slots[index].generation.wrapping_add(1);
            self.free.push(node.index);
            match value {
                Some(Value::Array(arr)) => {
                    for child in arr.children {
                        stack.push(self.id_for_index(child));
                    }
                }
                Some(Value::Dict(dict)) => {
                    for child in dict.children {
                        stack.push(self.id_for_index(child));
                    }
                }
                _ => {}
            }
        }
    }

    fn id_for_index(&self, index: u32) -> NodeId {
        NodeId { index, generation: self.slots[index as usize].generation }
    }

    /// Frees the children of `id` without freeing `id` itself (used when a
    /// container is overwritten with a scalar).
    fn free_children_of(&mut self, id: NodeId) -> Result<()> {
        let children = match self.value_mut(id) {
            Value::Array(arr) => std::mem::take(&mut arr.children),
            Value::Dict(dict) => {
                dict.index = None;
                std::mem::take(&mut dict.children)
            }
            _ => return Ok(()),
        };
        for child in children {
            self.free_unchecked(self.id_for_index(child));
        }
        Ok(())
    }

    /// Deep-copies the subtree rooted at `id`, returning a new detached
    /// root. Caches are never shared with the source; each container's
    /// cache is rebuilt from scratch as children are copied in.
    pub fn copy(&mut self, id: NodeId) -> Result<NodeId> {
        self.copy_with_depth(id, 0)
    }

    fn copy_with_depth(&mut self, id: NodeId, depth: usize) -> Result<NodeId> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(Error::MaxNesting);
        }
        let value = self.value(id).clone();
        match value {
            Value::Array(arr) => {
                let new_id = self.new_array();
                for &child in &arr.children {
                    let child_id = self.id_for_index(child);
                    let new_child = self.copy_with_depth(child_id, depth + 1)?;
                    self.array_append_item(new_id, new_child)?;
                }
                Ok(new_id)
            }
            Value::Dict(dict) => {
                let new_id = self.new_dict();
                let mut pairs = dict.children.chunks_exact(2);
                for pair in &mut pairs {
                    let key_id = self.id_for_index(pair[0]);
                    let val_id = self.id_for_index(pair[1]);
                    let key_text = self.get_key_val(key_id);
                    let new_val = self.copy_with_depth(val_id, depth + 1)?;
                    self.dict_set_item(new_id, &key_text, new_val)?;
                }
                Ok(new_id)
            }
            scalar => Ok(self.alloc(scalar)),
        }
    }

    // -- Array operations (see `array` submodule) ------------------------

    pub fn array_len(&self, id: NodeId) -> usize {
        array::len(self, id)
    }

    pub fn array_get_item(&self, id: NodeId, index: usize) -> Option<NodeId> {
        array::get_item(self, id, index)
    }

    pub fn array_set_item(&mut self, id: NodeId, index: usize, item: NodeId) -> Result<()> {
        array::set_item(self, id, index, item)
    }

    pub fn array_append_item(&mut self, id: NodeId, item: NodeId) -> Result<()> {
        array::append_item(self, id, item)
    }

    pub fn array_insert_item(&mut self, id: NodeId, index: usize, item: NodeId) -> Result<()> {
        array::insert_item(self, id, index, item)
    }

    pub fn array_remove_item(&mut self, id: NodeId, index: usize) -> Result<()> {
        array::remove_item(self, id, index)
    }

    // -- Dict operations (see `dict` submodule) ---------------------------

    pub fn dict_len(&self, id: NodeId) -> usize {
        dict::len(self, id)
    }

    pub fn dict_get_item(&self, id: NodeId, key: &str) -> Option<NodeId> {
        dict::get_item(self, id, key)
    }

    pub fn dict_set_item(&mut self, id: NodeId, key: &str, item: NodeId) -> Result<()> {
        dict::set_item(self, id, key, item)
    }

    /// Last-wins insert used while parsing: returns `true` if `key` already
    /// had an entry, so the caller can fail the parse once the whole
    /// document has been read rather than reject on the very first
    /// duplicate encountered.
    pub fn dict_set_item_tolerating_duplicate(&mut self, id: NodeId, key: &str, item: NodeId) -> Result<bool> {
        dict::set_item_tolerating_duplicate(self, id, key, item)
    }

    pub fn dict_remove_item(&mut self, id: NodeId, key: &str) -> Result<()> {
        dict::remove_item(self, id, key)
    }

    pub fn dict_item_get_key(&self, id: NodeId, value_id: NodeId) -> Option<String> {
        dict::item_get_key(self, id, value_id)
    }

    /// Deep-copies each entry of `source` into `target`, overwriting any
    /// entries already present under the same key.
    pub fn dict_merge(&mut self, target: NodeId, source: NodeId) -> Result<()> {
        dict::merge(self, target, source)
    }

    pub fn dict_get_bool(&self, id: NodeId, key: &str) -> Option<bool> {
        dict::coerce_bool(self, id, key)
    }

    pub fn dict_get_int(&self, id: NodeId, key: &str) -> Option<i64> {
        dict::coerce_int(self, id, key)
    }

    pub fn dict_get_uint(&self, id: NodeId, key: &str) -> Option<u64> {
        dict::coerce_uint(self, id, key)
    }

    pub fn dict_copy_item(&mut self, target: NodeId, source: NodeId, source_key: &str, target_key: &str) -> Result<()> {
        dict::copy_item(self, target, source, source_key, target_key)
    }

    /// Returns the Key-node handle for each entry of a Dict, in order. Codecs
    /// that need to address a dict's keys as nodes (binary writer object
    /// indices, sort) use this rather than the text-only `dict_iter`.
    pub fn dict_key_ids(&self, id: NodeId) -> Vec<NodeId> {
        match self.value(id) {
            Value::Dict(d) => d.children.iter().step_by(2).map(|&idx| self.id_for_index(idx)).collect(),
            _ => Vec::new(),
        }
    }

    // -- Path access / comparison / sort -----------------------------------

    /// Navigates `steps` from `root`. An `Array` step is `PathStep::Index`
    /// and a `Dict` step is `PathStep::Key`. Returns `None` on any miss.
    pub fn access_path(&self, root: NodeId, steps: &[PathStep]) -> Option<NodeId> {
        let mut current = root;
        for step in steps {
            current = match (step, self.value(current)) {
                (PathStep::Index(n), Value::Array(_)) => self.array_get_item(current, *n)?,
                (PathStep::Key(k), Value::Dict(_)) => self.dict_get_item(current, k)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Structural equality for scalars; containers compare equal only by identity.
    pub fn compare_value(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        match (self.value(a), self.value(b)) {
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Integer(x), Value::Integer(y)) => x == y,
            (Value::Real(x), Value::Real(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Key(x), Value::Key(y)) => x == y,
            (Value::Data(x), Value::Data(y)) => x == y,
            (Value::Date(x), Value::Date(y)) => x.absolute_time == y.absolute_time,
            (Value::Uid(x), Value::Uid(y)) => x == y,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }

    /// Recursively sorts every Dict reachable from `root` by key, ASCII
    /// byte order, using a stable bubble sort of Key/value pairs. Arrays
    /// are descended into but never reordered.
    pub fn sort(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match self.value(node).clone() {
                Value::Dict(dict) => {
                    self.bubble_sort_dict(node);
                    // Re-fetch: bubble_sort_dict mutates `children` order in place.
                    if let Value::Dict(sorted) = self.value(node) {
                        for &v in sorted.children.iter().skip(1).step_by(2) {
                            stack.push(self.id_for_index(v));
                        }
                    }
                }
                Value::Array(arr) => {
                    for &c in &arr.children {
                        stack.push(self.id_for_index(c));
                    }
                }
                _ => {}
            }
        }
    }

    fn bubble_sort_dict(&mut self, id: NodeId) {
        let len_pairs = match self.value(id) {
            Value::Dict(d) => d.children.len() / 2,
            _ => return,
        };
        if len_pairs < 2 {
            return;
        }
        let mut swapped = true;
        while swapped {
            swapped = false;
            for i in 0..len_pairs - 1 {
                let (key_a, key_b) = {
                    let dict = match self.value(id) {
                        Value::Dict(d) => d,
                        _ => return,
                    };
                    let a = self.id_for_index(dict.children[i * 2]);
                    let b = self.id_for_index(dict.children[(i + 1) * 2]);
                    (self.get_key_val(a), self.get_key_val(b))
                };
                if key_a.as_bytes() > key_b.as_bytes() {
                    if let Value::Dict(dict) = self.value_mut(id) {
                        dict.children.swap(i * 2, (i + 1) * 2);
                        dict.children.swap(i * 2 + 1, (i + 1) * 2 + 1);
                    }
                    swapped = true;
                }
            }
        }
        if let Value::Dict(dict) = self.value_mut(id) {
            dict.index = None;
        }
    }

    /// Total number of live nodes currently owned by the arena.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// One step of a path traversal passed to [`Tree::access_path`].
#[derive(Clone, Debug)]
pub enum PathStep {
    Index(usize),
    Key(String),
}
