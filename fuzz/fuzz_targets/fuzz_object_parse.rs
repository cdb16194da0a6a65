//! Fuzz target for object envelope parsing.
//!
//! Tests that envelope and body parsing handle arbitrary input without
//! panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = grit_storage::Object::parse(data);
});
