#![no_main]

use jdelta::engine::{self, DiffOptions};
use libfuzzer_sys::fuzz_target;

// Diff two slices of the input against each other and verify the patch
// rebuilds the destination exactly.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = (data[0] as usize * data.len()) / 256;
    let (source, dest) = data[1..].split_at(split.min(data.len() - 1));

    let opts = DiffOptions {
        index_size: 64 * 1024,
        ..DiffOptions::default()
    };
    let patch = engine::diff_bytes(source, dest, &opts).unwrap();
    let rebuilt = jdelta::jdf::patcher::apply_bytes(source, &patch).unwrap();
    assert_eq!(rebuilt, dest);
});
