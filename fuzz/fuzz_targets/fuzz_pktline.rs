//! Fuzz target for pkt-line framing.
//!
//! Tests that the frame reader handles arbitrary input without panicking.

#![no_main]

use grit_protocol::FrameReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = FrameReader::new(data);
    while let Ok(Some(_)) = reader.next_frame() {}
});
