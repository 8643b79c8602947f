#![no_main]

use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as a patch over arbitrary source bytes: the applier must
// accept or reject, never crash.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = (data[0] as usize).min(data.len() - 1);
    let (source, patch) = data[1..].split_at(split.min(data.len() - 1));
    let _ = jdelta::jdf::patcher::apply_bytes(source, patch);
});
