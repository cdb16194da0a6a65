//! Fuzz target for delta stream parsing.
//!
//! Tests that delta size and instruction decoding handle arbitrary input
//! without panicking.

#![no_main]

use grit_protocol::DeltaBase;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = grit_protocol::parse_delta(DeltaBase::Offset(0), data, 0);
});
