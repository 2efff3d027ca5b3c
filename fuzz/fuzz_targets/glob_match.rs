//! Fuzz target for the wildcard matcher.
//!
//! Run with: cargo +nightly fuzz run glob_match
//!
//! The input is split at the first NUL byte into a pattern and a name.
//! Besides looking for panics and hangs, this checks a few invariants that
//! hold for every pattern.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tarlite::glob::glob_match;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (pattern, name) = text.split_once('\0').unwrap_or((text, ""));

    let matched = glob_match(pattern, name);

    // A literal pattern matches exactly itself
    if !pattern.contains(['*', '?']) {
        assert_eq!(matched, pattern == name);
    }

    // Appending a star never turns a match into a mismatch
    if matched {
        assert!(glob_match(&format!("{}*", pattern), name));
    }

    assert!(glob_match("*", name));
    assert!(glob_match(name, name) || name.contains(['*', '?']));
});
