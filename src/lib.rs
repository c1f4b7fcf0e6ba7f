//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! A native Rust encoder and decoder of Apple property lists, built around a
//! single mutable node tree ([`Tree`]) rather than a generic
//! `serde`-style `Deserialize` target. Four wire codecs are supported:
//! binary (`bplist00`), XML plist 1.0, JSON, and OpenStep/NeXTSTEP ASCII.

pub mod codec;
pub(crate) mod date;
pub(crate) mod debug;
pub mod document;
pub mod error;
pub mod format;
pub mod tree;

pub use debug::set_xml_debug;
pub use error::{Error, Result};
pub use format::{read_as, read_from_memory, write, Format, WriteOptions};
pub use tree::{NodeId, Tree, Value};
