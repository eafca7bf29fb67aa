//! Fuzz target for command-line parsing.
//!
//! Splits the input on NUL bytes into an argument vector. Parsing may
//! reject it but must never panic.

#![no_main]

use hugetest_matrix::cli::parse_args;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let args: Vec<String> = data
        .split(|&b| b == 0)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect();
    let _ = parse_args(&args);
});
