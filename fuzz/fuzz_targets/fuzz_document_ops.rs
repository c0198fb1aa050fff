//! Fuzz target for document editing.
//!
//! Replays arbitrary edit sequences, then checks that undoing everything
//! restores the original text and that an incrementally maintained wrap
//! index matches one built from scratch.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use textdoc::{Document, TextCoordinate, WrapIndex};

#[derive(Arbitrary, Debug)]
enum Op {
    Move(u8, u8),
    Insert(char),
    Overwrite(char),
    Delete,
    Backspace,
    Break,
    Merge(bool),
    InsertBlock(String),
    DeleteBlock(u8, u8, u8, u8),
    Sync,
}

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    width: u8,
    ops: Vec<Op>,
}

fn coord(doc: &Document, line: u8, pos: u8) -> TextCoordinate {
    TextCoordinate::new(usize::from(line) % doc.line_count(), usize::from(pos))
}

fuzz_target!(|input: Input| {
    let Ok(mut doc) = Document::from_text(&input.text) else {
        return;
    };
    let original = doc.text();
    let mut wrap = WrapIndex::new(usize::from(input.width), 8);
    if wrap.attach(&mut doc).is_err() {
        return;
    }

    for op in input.ops.iter().take(256) {
        let result = match op {
            Op::Move(line, pos) => {
                doc.set_cursor(coord(&doc, *line, *pos));
                Ok(true)
            }
            Op::Insert(c) if *c != '\n' => doc.insert_char(*c),
            Op::Overwrite(c) if *c != '\n' => doc.overwrite_char(*c),
            Op::Insert(_) | Op::Overwrite(_) => Ok(false),
            Op::Delete => doc.delete_char(),
            Op::Backspace => doc.backspace_char(),
            Op::Break => doc.break_line(None),
            Op::Merge(backspace) => doc.merge(*backspace),
            Op::InsertBlock(text) => doc.insert_block(text),
            Op::DeleteBlock(l1, p1, l2, p2) => {
                let (start, end) = (coord(&doc, *l1, *p1), coord(&doc, *l2, *p2));
                doc.delete_block(start, end)
            }
            Op::Sync => wrap.sync(&mut doc).map(|()| true),
        };
        if result.is_err() {
            return;
        }
    }

    if wrap.sync(&mut doc).is_ok() {
        let mut fresh = WrapIndex::new(usize::from(input.width), 8);
        if fresh.attach(&mut doc).is_ok() {
            assert_eq!(wrap.size(), fresh.size());
            assert_eq!(wrap.line_count(), doc.line_count());
            for line in 0..doc.line_count() {
                assert_eq!(wrap.breaks(line), fresh.breaks(line));
            }
        }
    }

    while let Ok(true) = doc.apply_undo() {}
    assert_eq!(doc.text(), original);
});
