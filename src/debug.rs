//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Process-wide, read-only-after-init debug flag.
//!
//! Mirrors `PLIST_XML_DEBUG` from `examples/original_source/src/xplist.c`,
//! which gates verbose parser diagnostics. Set once at startup (from the
//! environment, or explicitly by the CLI's `-d` flag); every later read is a
//! relaxed atomic load, never a global mutable sprinkled across modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static XML_DEBUG: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

/// Reads `PLIST_XML_DEBUG` from the environment the first time it's called;
/// subsequent calls are a cheap atomic load. Callers that want to force the
/// flag on (e.g. the CLI's `-d`) should call [`set_xml_debug`] instead.
pub fn xml_debug_enabled() -> bool {
    INIT.call_once(|| {
        let enabled = std::env::var("PLIST_XML_DEBUG").map(|v| v == "1").unwrap_or(false);
        XML_DEBUG.store(enabled, Ordering::Relaxed);
    });
    XML_DEBUG.load(Ordering::Relaxed)
}

/// Forces the debug flag on or off, overriding the environment. Intended to
/// be called once at process startup, before any codec runs.
pub fn set_xml_debug(enabled: bool) {
    INIT.call_once(|| {});
    XML_DEBUG.store(enabled, Ordering::Relaxed);
}

macro_rules! xml_debug_log {
    ($($arg:tt)*) => {
        if crate::debug::xml_debug_enabled() {
            log::debug!($($arg)*);
        }
    };
}

pub(crate) use xml_debug_log;
