//! Feeds arbitrary text to the viewer link parser, including `#!` states.

#![no_main]

use gtbot::payload::parse_viewer_link;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = parse_viewer_link(text);
});
