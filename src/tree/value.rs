//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The tagged value carried by a single node.
//!
//! See the `tree` module documentation for the containing arena.

use ordered_float::OrderedFloat;

/// A date, represented as seconds offset from the Apple reference epoch
/// (2001-01-01T00:00:00Z), matching `CFAbsoluteTime`.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct Date {
    pub absolute_time: f64,
}

/// The number of seconds the Apple reference epoch sits after the Unix epoch.
pub const MAC_EPOCH_UNIX_OFFSET: i64 = 978_307_200;

impl Date {
    /// Builds a date from a Unix timestamp (seconds since 1970-01-01T00:00:00Z).
    pub fn from_unix(unix_seconds: f64) -> Self {
        Date { absolute_time: unix_seconds - MAC_EPOCH_UNIX_OFFSET as f64 }
    }

    /// Returns the number of seconds since the Unix epoch.
    pub fn to_unix(self) -> f64 {
        self.absolute_time + MAC_EPOCH_UNIX_OFFSET as f64
    }
}

/// A UID value as used by `NSKeyedArchiver`, a 64-bit unsigned integer with
/// its own wire tag in every codec.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Debug)]
pub struct Uid(pub u64);

/// An integer value with an explicit wire "width" attribute.
///
/// `Signed` covers every value which fits in a 64-bit two's complement
/// integer (this includes all negative values, per invariant 4).
/// `Wide` is reserved for unsigned values in `(i64::MAX, u64::MAX]`, which
/// require the 16-byte binary encoding.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Integer {
    Signed(i64),
    Wide(u64),
}

impl Integer {
    /// Constructs the narrowest representation able to hold `value`.
    pub fn from_i64(value: i64) -> Self {
        Integer::Signed(value)
    }

    /// Constructs the narrowest representation able to hold `value`, promoting
    /// to the wide (width=16) form when it exceeds `i64::MAX`.
    pub fn from_u64(value: u64) -> Self {
        if value <= i64::MAX as u64 {
            Integer::Signed(value as i64)
        } else {
            Integer::Wide(value)
        }
    }

    /// Returns the value as a signed 64-bit integer, if it fits.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Integer::Signed(v) => Some(v),
            Integer::Wide(_) => None,
        }
    }

    /// Returns the value as an unsigned 64-bit integer, if it is non-negative.
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Integer::Signed(v) if v >= 0 => Some(v as u64),
            Integer::Signed(_) => None,
            Integer::Wide(v) => Some(v),
        }
    }

    /// True if this integer requires the 16-byte binary encoding.
    pub fn is_wide(self) -> bool {
        matches!(self, Integer::Wide(_))
    }
}

/// The tag of a `Value`, independent of its payload.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum NodeType {
    Bool,
    Integer,
    Real,
    String,
    Key,
    Data,
    Date,
    Uid,
    Null,
    Array,
    Dict,
}

/// The tagged payload of a single node in the tree.
///
/// Containers (`Array`, `Dict`) store child identifiers rather than nested
/// `Value`s directly; see `tree::Tree` for how the arena links them together.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Integer(Integer),
    Real(OrderedFloat<f64>),
    String(String),
    /// Only legal as the "odd" child of a `Dict`; binds to the following sibling.
    Key(String),
    Data(Vec<u8>),
    Date(Date),
    Uid(Uid),
    /// Sentinel used only by binary codec v1 extensions.
    Null,
    Array(ArrayData),
    Dict(DictData),
}

impl Value {
    pub fn node_type(&self) -> NodeType {
        match self {
            Value::Bool(_) => NodeType::Bool,
            Value::Integer(_) => NodeType::Integer,
            Value::Real(_) => NodeType::Real,
            Value::String(_) => NodeType::String,
            Value::Key(_) => NodeType::Key,
            Value::Data(_) => NodeType::Data,
            Value::Date(_) => NodeType::Date,
            Value::Uid(_) => NodeType::Uid,
            Value::Null => NodeType::Null,
            Value::Array(_) => NodeType::Array,
            Value::Dict(_) => NodeType::Dict,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Dict(_))
    }
}

/// Lazily-built cache mapping array index to child identifier.
///
/// Built on first access once the array exceeds [`ARRAY_CACHE_THRESHOLD`]
/// children; invalidated implicitly because it is always rebuilt rather than
/// patched in place, so it can never outlive a structural change.
pub const ARRAY_CACHE_THRESHOLD: usize = 100;

/// Lazily-built cache mapping dict key to value-node identifier.
pub const DICT_CACHE_THRESHOLD: usize = 500;

/// An ordered sequence of child node identifiers.
///
/// Indexing `children` directly is already O(1), which satisfies (and
/// exceeds) the lazily-built position index the original C tree needed to
/// avoid O(n) linked-list walks; see `DESIGN.md` for the rationale.
#[derive(Clone, Debug, Default)]
pub struct ArrayData {
    pub(crate) children: Vec<u32>,
}

/// An ordered sequence of (Key, value) child node identifiers, with an
/// optional key lookup cache.
#[derive(Clone, Debug, Default)]
pub struct DictData {
    /// Alternates Key, value, Key, value, ... per invariant 1.
    pub(crate) children: Vec<u32>,
    /// Lazily built once `children.len() / 2` exceeds [`DICT_CACHE_THRESHOLD`].
    /// Maps a key's byte string to the index (in `children`) of its value node.
    pub(crate) index: Option<std::collections::HashMap<String, u32>>,
}
