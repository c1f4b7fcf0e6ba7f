//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The bplist00 binary codec.
//!
//! The object-table nom combinators (moved here under `parser`) and the
//! wire constants in `document.rs` carry over from an earlier read-only,
//! `serde::Deserializer`-backed version of this reader; the writer is new,
//! and the reader itself now builds a [`crate::tree::Tree`] directly
//! instead of feeding a deserializer.

mod parser;
mod utils;

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

use crate::document::{HEADER_MAGIC_NUMBER, HEADER_SIZE, HEADER_VERSION_00, TRAILER_SIZE};
use crate::error::{Error, Result};
use crate::tree::{Integer, NodeId, Tree, Value, MAX_NESTING_DEPTH};

struct Metadata<'a> {
    bytes: &'a [u8],
    offset_table: Vec<usize>,
    object_reference_size: usize,
    object_table_end: usize,
}

impl<'a> Metadata<'a> {
    fn object_bytes(&self, object: usize) -> Result<&'a [u8]> {
        let offset = *self.offset_table.get(object)
            .ok_or_else(|| Error::Parse("object reference out of range".into()))?;
        if offset >= self.object_table_end {
            return Err(Error::Parse("invalid offset to object".into()));
        }
        Ok(&self.bytes[offset..self.object_table_end])
    }
}

/// Parses a bplist00 document, returning the populated tree and its root node.
pub fn read(bytes: &[u8]) -> Result<(Tree, NodeId)> {
    if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(Error::Parse("input too short to contain a bplist header and trailer".into()));
    }
    if &bytes[0..6] != HEADER_MAGIC_NUMBER || (bytes[6], bytes[7]) != HEADER_VERSION_00 {
        return Err(Error::Parse("missing or invalid bplist magic/version".into()));
    }

    let trailer_start = bytes.len() - TRAILER_SIZE;
    let trailer = &bytes[trailer_start..];
    let offset_size = trailer[6] as usize;
    let object_reference_size = trailer[7] as usize;
    if !matches!(offset_size, 1 | 2 | 4 | 8) || !matches!(object_reference_size, 1 | 2 | 4 | 8) {
        return Err(Error::Parse("invalid offset_size or object_reference_size".into()));
    }
    let number_of_objects = be_usize(&trailer[8..16])?;
    let top_object = be_usize(&trailer[16..24])?;
    let offset_table_start = be_usize(&trailer[24..32])?;

    if offset_table_start > trailer_start || offset_table_start < HEADER_SIZE {
        return Err(Error::Parse("offset table start out of range".into()));
    }
    let offset_table_bytes = &bytes[offset_table_start..trailer_start];
    if offset_table_bytes.len() != number_of_objects * offset_size {
        return Err(Error::Parse("offset table size does not match object count".into()));
    }

    let mut offset_table = Vec::with_capacity(number_of_objects);
    for chunk in offset_table_bytes.chunks_exact(offset_size) {
        offset_table.push(be_usize(chunk)?);
    }
    if top_object >= offset_table.len() {
        return Err(Error::Parse("invalid root object index".into()));
    }

    let metadata = Metadata {
        bytes,
        offset_table,
        object_reference_size,
        object_table_end: offset_table_start,
    };

    let mut tree = Tree::new();
    let mut in_progress: HashSet<usize> = HashSet::new();
    let root = match materialize(&mut tree, &metadata, top_object, 0, &mut in_progress) {
        Ok(id) => id,
        Err(e) => return Err(e),
    };
    Ok((tree, root))
}

fn be_usize(bytes: &[u8]) -> Result<usize> {
    let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) + b as u64);
    usize::try_from(value).map_err(|_| Error::Parse("value out of range for this platform".into()))
}

fn materialize(
    tree: &mut Tree,
    meta: &Metadata,
    object: usize,
    depth: usize,
    in_progress: &mut HashSet<usize>,
) -> Result<NodeId> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    if !in_progress.insert(object) {
        return Err(Error::CircularRef);
    }
    let result = materialize_inner(tree, meta, object, depth, in_progress);
    in_progress.remove(&object);
    result
}

fn materialize_inner(
    tree: &mut Tree,
    meta: &Metadata,
    object: usize,
    depth: usize,
    in_progress: &mut HashSet<usize>,
) -> Result<NodeId> {
    let bytes = meta.object_bytes(object)?;
    if let Ok((_, ())) = parser::null(bytes) {
        return Ok(tree.new_null());
    }
    if let Ok((_, value)) = parser::boolean(bytes) {
        return Ok(tree.new_bool(value));
    }
    if let Ok((_, value)) = parser::uint8(bytes) {
        return Ok(tree.new_uint(value as u64));
    }
    if let Ok((_, value)) = parser::uint16(bytes) {
        return Ok(tree.new_uint(value as u64));
    }
    if let Ok((_, value)) = parser::uint32(bytes) {
        return Ok(tree.new_uint(value as u64));
    }
    if let Ok((_, value)) = parser::sint64(bytes) {
        return Ok(tree.new_integer(Integer::Signed(value)));
    }
    if let Ok((_, value)) = parser::uint128_low64(bytes) {
        return Ok(tree.new_integer(Integer::Wide(value)));
    }
    if let Ok((_, value)) = parser::float32(bytes) {
        return Ok(tree.new_real(value as f64));
    }
    if let Ok((_, value)) = parser::float64(bytes) {
        return Ok(tree.new_real(value));
    }
    if let Ok((_, value)) = parser::date(bytes) {
        return Ok(tree.new_date(value));
    }
    if let Ok((_, value)) = parser::data(bytes) {
        return Ok(tree.new_data(value.to_vec()));
    }
    if let Ok((_, value)) = parser::ascii_string(bytes) {
        return Ok(tree.new_string(value));
    }
    if let Ok((_, value)) = parser::utf16_string(bytes) {
        return Ok(tree.new_string(value));
    }
    if let Ok((_, value)) = parser::uid(bytes) {
        let n = value.iter().fold(0u64, |acc, &b| (acc << 8) + b as u64);
        return Ok(tree.new_uid(n));
    }
    if let Ok((_, refs)) = parser::array(meta.object_reference_size)(bytes) {
        let array_id = tree.new_array();
        for child_ref in refs {
            let child = materialize(tree, meta, child_ref, depth + 1, in_progress)?;
            tree.array_append_item(array_id, child)?;
        }
        return Ok(array_id);
    }
    if let Ok((_, pairs)) = parser::dictionary(meta.object_reference_size)(bytes) {
        let dict_id = tree.new_dict();
        let mut had_duplicate_key = false;
        for (key_ref, value_ref) in pairs {
            let key_bytes = meta.object_bytes(key_ref)?;
            let key_text = parser::ascii_string(key_bytes).map(|(_, s)| s)
                .or_else(|_| parser::utf16_string(key_bytes).map(|(_, s)| s))
                .map_err(|_: nom::Err<(&[u8], nom::error::ErrorKind)>| Error::Parse("dict key is not a string".into()))?;
            let value_id = materialize(tree, meta, value_ref, depth + 1, in_progress)?;
            if tree.dict_set_item_tolerating_duplicate(dict_id, &key_text, value_id)? {
                had_duplicate_key = true;
            }
        }
        if had_duplicate_key {
            return Err(Error::Parse("dict contains a duplicate key".into()));
        }
        return Ok(dict_id);
    }
    Err(Error::Parse("unrecognized or unsupported object marker".into()))
}

// -- Writer ---------------------------------------------------------------

#[derive(Clone, PartialEq)]
enum DedupKey {
    Bool(bool),
    Int(Integer),
    Real(u64),
    Date(u64),
    Data(Vec<u8>),
    Uid(u64),
    Null,
}

impl Eq for DedupKey {}
impl std::hash::Hash for DedupKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            DedupKey::Bool(b) => b.hash(state),
            DedupKey::Int(i) => i.hash(state),
            DedupKey::Real(bits) => bits.hash(state),
            DedupKey::Date(bits) => bits.hash(state),
            DedupKey::Data(d) => d.hash(state),
            DedupKey::Uid(u) => u.hash(state),
            DedupKey::Null => {}
        }
    }
}

struct Indexer {
    objects: Vec<NodeId>,
    node_index: HashMap<NodeId, usize>,
    dedup: HashMap<DedupKey, usize>,
}

/// Assigns a unique object-table index to every reachable node, deduplicating
/// Bool/Integer/Real/Date/Data/Uid/Null scalars by structural equality;
/// containers and strings each keep their own index.
pub fn write(tree: &Tree, root: NodeId) -> Result<Vec<u8>> {
    let mut indexer = Indexer { objects: Vec::new(), node_index: HashMap::new(), dedup: HashMap::new() };
    assign_index(tree, root, 0, &mut indexer)?;

    let object_reference_size = byte_width_for_count(indexer.objects.len());

    let mut records: Vec<Vec<u8>> = Vec::with_capacity(indexer.objects.len());
    for &id in &indexer.objects {
        records.push(encode_object(tree, id, object_reference_size, &indexer.node_index)?);
    }

    let mut output = Vec::new();
    output.extend_from_slice(HEADER_MAGIC_NUMBER);
    output.push(HEADER_VERSION_00.0);
    output.push(HEADER_VERSION_00.1);

    let mut offsets = Vec::with_capacity(records.len());
    for record in &records {
        offsets.push(output.len());
        output.extend_from_slice(record);
    }

    let offset_table_start = output.len();
    let max_offset = offsets.last().copied().unwrap_or(0) as u64;
    let offset_size = byte_width_for_value(max_offset.max(offset_table_start as u64));
    for offset in &offsets {
        output.extend_from_slice(&be_bytes(*offset as u64, offset_size));
    }

    output.extend_from_slice(&[0u8; 5]);
    output.push(0u8); // sort_version
    output.push(offset_size as u8);
    output.push(object_reference_size as u8);
    output.extend_from_slice(&be_bytes(records.len() as u64, 8));
    output.extend_from_slice(&be_bytes(indexer.node_index[&root] as u64, 8));
    output.extend_from_slice(&be_bytes(offset_table_start as u64, 8));

    Ok(output)
}

fn assign_index(tree: &Tree, id: NodeId, depth: usize, indexer: &mut Indexer) -> Result<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MaxNesting);
    }
    if let Some(&idx) = indexer.node_index.get(&id) {
        return Ok(idx);
    }
    let dedup_key = match tree.value_ref(id) {
        Value::Bool(b) => Some(DedupKey::Bool(*b)),
        Value::Integer(i) => Some(DedupKey::Int(*i)),
        Value::Real(r) => Some(DedupKey::Real(r.into_inner().to_bits())),
        Value::Date(d) => Some(DedupKey::Date(d.absolute_time.to_bits())),
        Value::Data(d) => Some(DedupKey::Data(d.clone())),
        Value::Uid(u) => Some(DedupKey::Uid(u.0)),
        Value::Null => Some(DedupKey::Null),
        _ => None,
    };
    if let Some(key) = dedup_key {
        if let Some(&idx) = indexer.dedup.get(&key) {
            indexer.node_index.insert(id, idx);
            return Ok(idx);
        }
        let idx = indexer.objects.len();
        indexer.objects.push(id);
        indexer.node_index.insert(id, idx);
        indexer.dedup.insert(key, idx);
        return Ok(idx);
    }

    match tree.value_ref(id) {
        Value::String(_) | Value::Key(_) => {
            let idx = indexer.objects.len();
            indexer.objects.push(id);
            indexer.node_index.insert(id, idx);
            Ok(idx)
        }
        Value::Array(_) => {
            let idx = indexer.objects.len();
            indexer.objects.push(id);
            indexer.node_index.insert(id, idx);
            let len = tree.array_len(id);
            for i in 0..len {
                let child = tree.array_get_item(id, i).unwrap();
                assign_index(tree, child, depth + 1, indexer)?;
            }
            Ok(idx)
        }
        Value::Dict(_) => {
            let idx = indexer.objects.len();
            indexer.objects.push(id);
            indexer.node_index.insert(id, idx);
            for key_id in tree.dict_key_ids(id) {
                let key_text = tree.get_key_val(key_id);
                let value_id = tree.dict_get_item(id, &key_text).unwrap();
                assign_index(tree, key_id, depth + 1, indexer)?;
                assign_index(tree, value_id, depth + 1, indexer)?;
            }
            Ok(idx)
        }
        _ => unreachable!("dedup-eligible variants handled above"),
    }
}

fn byte_width_for_count(count: usize) -> usize {
    let max_index = count.saturating_sub(1);
    byte_width_for_value(max_index as u64)
}

fn byte_width_for_value(value: u64) -> usize {
    if value <= 0xFF { 1 } else if value <= 0xFFFF { 2 } else if value <= 0xFFFF_FFFF { 4 } else { 8 }
}

fn be_bytes(value: u64, width: usize) -> Vec<u8> {
    value.to_be_bytes()[8 - width..].to_vec()
}

fn encode_length(tag_high_nibble: u8, len: usize, out: &mut Vec<u8>) {
    if len < 0xF {
        out.push(tag_high_nibble | len as u8);
    } else {
        out.push(tag_high_nibble | 0x0F);
        encode_uint_object(len as u64, out);
    }
}

/// Encodes `value` as a self-describing unsigned integer object (used for
/// extended-length payload counts, which are themselves integer objects).
fn encode_uint_object(value: u64, out: &mut Vec<u8>) {
    if value <= 0xFF {
        out.push(0x10);
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(0x11);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= 0xFFFF_FFFF {
        out.push(0x12);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(0x13);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn encode_object(tree: &Tree, id: NodeId, object_reference_size: usize, node_index: &HashMap<NodeId, usize>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match tree.value_ref(id) {
        Value::Null => out.push(0x00),
        Value::Bool(false) => out.push(0x08),
        Value::Bool(true) => out.push(0x09),
        Value::Integer(Integer::Signed(v)) if *v < 0 => {
            out.push(0x13);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Integer(Integer::Signed(v)) => {
            encode_uint_object(*v as u64, &mut out);
        }
        Value::Integer(Integer::Wide(v)) => {
            out.push(0x14);
            out.extend_from_slice(&[0u8; 8]);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Real(r) => {
            out.push(0x23);
            out.extend_from_slice(&r.into_inner().to_be_bytes());
        }
        Value::Date(d) => {
            out.push(0x33);
            out.extend_from_slice(&d.absolute_time.to_be_bytes());
        }
        Value::Data(data) => {
            encode_length(0x40, data.len(), &mut out);
            out.extend_from_slice(data);
        }
        Value::String(s) | Value::Key(s) => encode_string(s, &mut out),
        Value::Uid(u) => {
            let bytes = u.0.to_be_bytes();
            let width = byte_width_for_value(u.0).max(1);
            out.push(0x80 | (width as u8 - 1));
            out.extend_from_slice(&bytes[8 - width..]);
        }
        Value::Array(_) => {
            let len = tree.array_len(id);
            encode_length(0xA0, len, &mut out);
            for i in 0..len {
                let child = tree.array_get_item(id, i).unwrap();
                let idx = node_index[&child];
                out.extend_from_slice(&be_bytes(idx as u64, object_reference_size));
            }
        }
        Value::Dict(_) => {
            let keys = tree.dict_key_ids(id);
            encode_length(0xD0, keys.len(), &mut out);
            for key_id in &keys {
                out.extend_from_slice(&be_bytes(node_index[key_id] as u64, object_reference_size));
            }
            for key_id in &keys {
                let key_text = tree.get_key_val(*key_id);
                let value_id = tree.dict_get_item(id, &key_text).unwrap();
                out.extend_from_slice(&be_bytes(node_index[&value_id] as u64, object_reference_size));
            }
        }
    }
    Ok(out)
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    if s.is_ascii() {
        encode_length(0x50, s.len(), out);
        out.extend_from_slice(s.as_bytes());
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        encode_length(0x60, units.len(), out);
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
}
