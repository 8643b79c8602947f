#![no_main]

use jdelta::jdf::lengths;
use libfuzzer_sys::fuzz_target;

// Decoding arbitrary bytes must never crash, and whatever decodes must
// re-encode to a form that decodes to the same value.
fuzz_target!(|data: &[u8]| {
    if let Ok((value, _consumed)) = lengths::decode(data) {
        let mut buf = [0u8; lengths::MAX_ENCODED_LEN];
        let len = lengths::encode(value, &mut buf);
        let (again, used) = lengths::decode(&buf[..len]).unwrap();
        assert_eq!(again, value);
        assert_eq!(used, len);
    }
});
