//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Forward iterators over Array and Dict children.
//!
//! Both iterators snapshot the child list at construction time. Per the
//! contract in the node tree design, any structural change to the owning
//! container invalidates outstanding iterators; here that means the
//! snapshot simply no longer reflects reality; it does not panic or
//! produce inconsistent positions mid-walk.

use super::{NodeId, NodeType, Tree, Value};

/// Iterates the elements of an Array in order.
pub struct ArrayIter<'a> {
    tree: &'a Tree,
    remaining: std::slice::Iter<'a, u32>,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.remaining.next().map(|&idx| self.tree.id_for_index(idx))
    }
}

/// Iterates the (key, value) pairs of a Dict in insertion order.
pub struct DictIter<'a> {
    tree: &'a Tree,
    remaining: std::slice::Chunks<'a, u32>,
}

impl<'a> Iterator for DictIter<'a> {
    type Item = (String, NodeId);

    fn next(&mut self) -> Option<(String, NodeId)> {
        let pair = self.remaining.next()?;
        let key_id = self.tree.id_for_index(pair[0]);
        let value_id = self.tree.id_for_index(pair[1]);
        Some((self.tree.get_key_val(key_id), value_id))
    }
}

impl Tree {
    /// Returns a forward iterator over the elements of an Array node.
    /// Yields nothing if `id` is not an Array.
    pub fn array_iter(&self, id: NodeId) -> ArrayIter<'_> {
        let children: &[u32] = match self.value(id) {
            Value::Array(arr) => &arr.children,
            _ => &[],
        };
        ArrayIter { tree: self, remaining: children.iter() }
    }

    /// Returns a forward iterator over the (key, value) pairs of a Dict
    /// node. Yields nothing if `id` is not a Dict.
    pub fn dict_iter(&self, id: NodeId) -> DictIter<'_> {
        let children: &[u32] = match self.value(id) {
            Value::Dict(d) => &d.children,
            _ => &[],
        };
        DictIter { tree: self, remaining: children.chunks(2) }
    }

    /// Convenience: true if `id` currently denotes a container (Array or Dict).
    pub fn is_container(&self, id: NodeId) -> bool {
        self.get_type(id) == NodeType::Array || self.get_type(id) == NodeType::Dict
    }
}
