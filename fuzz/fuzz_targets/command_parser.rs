#![no_main]
use libfuzzer_sys::fuzz_target;
use tributary::command::Command;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(command) = Command::parse(line) {
            // Parsing has no hidden state.
            let again = Command::parse(line).expect("parse is deterministic");
            assert_eq!(command, again);
        }
    }
});
