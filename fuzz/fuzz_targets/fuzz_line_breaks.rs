//! Fuzz target for line wrapping and position mapping.
//!
//! Wrapping arbitrary text at any width must terminate, land every break on
//! a cursor stop, and never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use textdoc::LineBuffer;

fuzz_target!(|input: (&str, u8, u8)| {
    let (text, width, tabsize) = input;
    let line = LineBuffer::from(text.replace('\n', " ").as_str());
    let width = usize::from(width).max(1);
    let tabsize = usize::from(tabsize % 17);

    let mut start = 0;
    while let Some(brk) = line.find_next_break_pos(start, width, tabsize) {
        assert!(brk.pos > start);
        assert!(line.width_at(brk.pos) > 0);
        start = brk.pos;
    }

    for col in 0..width {
        let pos = line.calculate_line_pos(0, usize::MAX, col, tabsize);
        assert!(pos <= line.len());
        let _ = line.calculate_screen_width(0, pos, tabsize);
    }
});
