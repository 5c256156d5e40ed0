//! Feeds arbitrary bytes to the viewer payload parser.

#![no_main]

use gtbot::payload::parse_payload_slice;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = parse_payload_slice(data);
});
