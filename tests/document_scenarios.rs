//! End-to-end document scenarios: editing, undo/redo, notifications.
//!
//! Run with:
//!   cargo test --test document_scenarios
//! With logging:
//!   cargo test --test document_scenarios -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use textdoc::{
    Document, EVENT_MODIFIED, LineBuffer, LogLevel, SelectionMode, TextCoordinate, WrapIndex,
    clear_event_callback, clear_log_callback, set_event_callback, set_log_callback,
};
use tracing::{Level, debug, error, info, warn};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_test_writer()
        .try_init();
}

fn at(line: usize, pos: usize) -> TextCoordinate {
    TextCoordinate::new(line, pos)
}

#[test]
fn typing_is_one_undo_step() {
    let mut doc = Document::new();
    for _ in 0..3 {
        doc.insert_char('a').unwrap();
    }
    assert_eq!(doc.line(0).unwrap().as_str(), "aaa");
    assert_eq!(doc.undo_log().len(), 1);

    assert!(doc.apply_undo().unwrap());
    assert_eq!(doc.text(), "");
    assert_eq!(doc.cursor(), at(0, 0));
}

#[test]
fn merge_and_undo_restore_lines() {
    let mut doc = Document::from_text("abc\ndef").unwrap();
    doc.set_cursor(at(0, 3));
    assert!(doc.merge(false).unwrap());
    assert_eq!(doc.line_count(), 1);
    assert_eq!(doc.text(), "abcdef");
    assert_eq!(doc.cursor(), at(0, 3));

    assert!(doc.apply_undo().unwrap());
    assert_eq!(doc.lines().iter().map(LineBuffer::as_str).collect::<Vec<_>>(), ["abc", "def"]);
    assert_eq!(doc.cursor(), at(0, 3));
}

#[test]
fn breaks_never_split_a_cluster() {
    let line = LineBuffer::from("ae\u{0301} b".repeat(6).as_str());
    let combining: Vec<usize> = line
        .as_str()
        .char_indices()
        .filter(|&(_, c)| c == '\u{0301}')
        .map(|(i, _)| i)
        .collect();

    let mut start = 0;
    while let Some(brk) = line.find_next_break_pos(start, 5, 8) {
        assert!(brk.pos > start);
        assert!(!combining.contains(&brk.pos), "break at {} splits a cluster", brk.pos);
        start = brk.pos;
    }
}

#[test]
fn delete_everything_leaves_one_empty_line() {
    let mut doc = Document::from_text("first\nsecond\nthird").unwrap();
    doc.set_selection_mode(SelectionMode::All);
    let (start, end) = (doc.selection_start(), doc.selection_end());
    assert!(doc.delete_block(start, end).unwrap());
    assert_eq!(doc.line_count(), 1);
    assert_eq!(doc.text(), "");
    assert_eq!(doc.cursor(), at(0, 0));
}

#[test]
fn nested_replace_undo_redo() {
    let mut doc = Document::from_text("one two three").unwrap();
    doc.replace_block(at(0, 4), at(0, 7), "2\n2").unwrap();
    assert_eq!(doc.text(), "one 2\n2 three");
    doc.replace_block(at(0, 0), at(0, 3), "1").unwrap();
    assert_eq!(doc.text(), "1 2\n2 three");
    doc.replace_block(at(1, 2), at(0, 2), "").unwrap();
    assert_eq!(doc.text(), "1 three");

    let states = ["1 2\n2 three", "one 2\n2 three", "one two three"];
    for expected in states {
        assert!(doc.apply_undo().unwrap());
        assert_eq!(doc.text(), expected);
    }
    assert!(!doc.apply_undo().unwrap());

    for expected in ["one 2\n2 three", "1 2\n2 three", "1 three"] {
        assert!(doc.apply_redo().unwrap());
        assert_eq!(doc.text(), expected);
    }
    assert!(!doc.apply_redo().unwrap());

    // Partial undo then a fresh replace drops the redo tail.
    doc.apply_undo().unwrap();
    doc.replace_block(at(0, 0), at(0, 1), "I").unwrap();
    assert_eq!(doc.text(), "I 2\n2 three");
    assert!(!doc.apply_redo().unwrap());
    doc.apply_undo().unwrap();
    assert_eq!(doc.text(), "1 2\n2 three");
}

#[test]
fn modified_flag_notifies_on_change() {
    let me = thread::current().id();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    set_event_callback(move |name, data| {
        if name == EVENT_MODIFIED && thread::current().id() == me {
            if let Ok(mut seen) = sink.lock() {
                seen.push(data.to_string());
            }
        }
    });

    let mut doc = Document::new();
    doc.insert_char('x').unwrap();
    doc.insert_char('y').unwrap();
    doc.set_undo_mark();
    doc.insert_char('z').unwrap();
    doc.apply_undo().unwrap();
    clear_event_callback();

    assert!(!doc.is_modified());
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, ["true", "false", "true", "false"]);
}

#[test]
fn log_records_reach_tracing() {
    init_logging();
    let me = thread::current().id();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    set_log_callback(move |level, message| {
        match level {
            LogLevel::Debug => debug!(target: "textdoc", "{message}"),
            LogLevel::Info => info!(target: "textdoc", "{message}"),
            LogLevel::Warn => warn!(target: "textdoc", "{message}"),
            LogLevel::Error => error!(target: "textdoc", "{message}"),
        }
        if thread::current().id() == me {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    let mut doc = Document::new();
    doc.start_undo_block();
    doc.insert_block("a\nb").unwrap();
    doc.insert_char('c').unwrap();
    doc.end_undo_block().unwrap();
    doc.apply_undo().unwrap();
    doc.apply_redo().unwrap();
    clear_log_callback();

    assert_eq!(doc.text(), "a\nbc");
    assert!(count.load(Ordering::Relaxed) >= 2);
}

#[test]
fn wrap_index_follows_an_editing_session() {
    let mut doc = Document::from_text("The quick brown fox jumps over the lazy dog").unwrap();
    let mut wrap = WrapIndex::new(10, 8);
    wrap.attach(&mut doc).unwrap();
    assert_eq!(wrap.breaks(0), [0, 10, 20, 26, 35]);

    doc.set_cursor(at(0, 20));
    doc.break_line(None).unwrap();
    for c in "very ".chars() {
        doc.insert_char(c).unwrap();
    }
    wrap.sync(&mut doc).unwrap();
    assert_eq!(wrap.line_count(), 2);
    assert_eq!(wrap.breaks(0), [0, 10]);
    assert_eq!(doc.line(1).unwrap().as_str(), "very jumps over the lazy dog");
    assert_eq!(wrap.breaks(1), [0, 5, 11, 20]);

    while doc.apply_undo().unwrap() {}
    wrap.sync(&mut doc).unwrap();
    assert_eq!(wrap.line_count(), 1);
    assert_eq!(wrap.breaks(0), [0, 10, 20, 26, 35]);
    assert_eq!(wrap.size(), 5);
    wrap.detach(&mut doc);
}
