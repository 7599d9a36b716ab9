#![no_main]
use libfuzzer_sys::fuzz_target;

use relfix_ir::witness::Classification;
use relfix_oracles::parse::{assemble_bundle, parse_witness_file, RawWitnesses};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // The artifact parser must never panic on any input.
        if let Ok(counterexamples) = parse_witness_file(s, Classification::Counterexample) {
            let _ = assemble_bundle(RawWitnesses {
                counterexamples,
                ..RawWitnesses::default()
            });
        }
    }
});
