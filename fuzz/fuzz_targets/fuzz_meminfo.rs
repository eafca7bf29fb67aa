//! Fuzz target for memory-information parsing.
//!
//! Arbitrary text must parse to some counters without panicking, and the
//! pool size must never overflow.

#![no_main]

use hugetest_matrix::host::MemInfo;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let info = MemInfo::parse(text);
        let _ = info.pool_bytes();
    }
});
