//! Feeds arbitrary chat messages to the command parser.

#![no_main]

use gtbot::command::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = Command::parse(text, Some("<@U0>"));
});
