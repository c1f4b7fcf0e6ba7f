//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The four wire codecs, one module each. Every codec exposes a `read`
//! taking the whole input buffer and a `write` taking a tree and root,
//! mirroring the `plist_from_xml`/`plist_to_xml` entry-point shape defined in
//! `examples/original_source/src/xplist.c` and dispatched to by format in
//! `examples/original_source/tools/plistutil.c`.

pub mod binary;
pub mod json;
pub mod openstep;
pub mod print;
pub mod xml;
