// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::*;

fn map() -> LineMap {
    LineMap {
        segments: vec![
            Segment {
                gen_start: 2,
                len: 3,
                source: "setup.js".into(),
                src_start: 1,
            },
            Segment {
                gen_start: 6,
                len: 10,
                source: "tests/a.test.js".into(),
                src_start: 1,
            },
        ],
    }
}

#[yare::parameterized(
    first_file_start = { 2, Some(("setup.js", 1)) },
    first_file_last = { 4, Some(("setup.js", 3)) },
    banner_between = { 5, None },
    second_file = { 8, Some(("tests/a.test.js", 3)) },
    before_everything = { 1, None },
    past_the_end = { 40, None },
)]
fn resolves_generated_lines(line: u32, expected: Option<(&str, u32)>) {
    assert_eq!(map().resolve(line), expected);
}

#[test]
fn remaps_stack_frames_to_sources() {
    let mut maps = HashMap::new();
    maps.insert("/test.js".to_owned(), map());

    let stack = "Error: boom\n    at run (http://127.0.0.1:4000/test.js:8:5)\n    at http://127.0.0.1:4000/vendor.js:1:1";
    let remapped = remap_stack(stack, &maps);
    assert!(remapped.contains("tests/a.test.js:3"), "{remapped}");
    // Unmapped frames stay as they were.
    assert!(remapped.contains("vendor.js:1:1"), "{remapped}");
}

#[test]
fn map_json_carries_sources() {
    let json = map().to_json();
    assert_eq!(json["version"], 3);
    assert_eq!(json["sources"][1], "tests/a.test.js");
}
