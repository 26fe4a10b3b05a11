// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for field path parsing.
// Run with: cargo +nightly fuzz run fuzz_field_path
//
// Any UTF-8 input must either be rejected or parse into a path that
// displays back to the exact input.

#![no_main]

use fieldscope_schema::FieldPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if input.len() <= 4096 {
            if let Ok(path) = FieldPath::parse(input) {
                assert_eq!(path.to_string(), input);
                assert!(!path.is_empty());
                if let Some(parent) = path.parent() {
                    assert!(path.starts_with(&parent));
                    assert_eq!(parent.len() + 1, path.len());
                }
            }
        }
    }
});
