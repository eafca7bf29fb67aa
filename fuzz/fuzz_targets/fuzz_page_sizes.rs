//! Fuzz target for page size tool output.

#![no_main]

use hugetest_matrix::resolver::parse_page_sizes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Zero is never a valid page size.
        assert!(parse_page_sizes(text).iter().all(|p| p.bytes() > 0));
    }
});
