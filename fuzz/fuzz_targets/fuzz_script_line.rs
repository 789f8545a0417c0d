#![no_main]

use clawdaw_cli::script::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = Command::parse(line);
    }
});
