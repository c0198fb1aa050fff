//! Editable multi-line text: lines, undo history, documents and wrapping.
//!
//! Key types:
//!
//! - [`LineBuffer`]: one line of UTF-8 text with width and word queries
//! - [`UndoLog`]: linear undo/redo history of [`UndoEntry`] records
//! - [`Document`]: lines plus cursor, selection and undo history
//! - [`WrapIndex`]: per-line wrap points for a fixed display width
//!
//! # Examples
//!
//! ```
//! use textdoc::{Document, TextCoordinate};
//!
//! let mut doc = Document::new();
//! doc.insert_char('h').unwrap();
//! doc.insert_char('i').unwrap();
//! assert_eq!(doc.text(), "hi");
//!
//! // Consecutive keystrokes form one undo step
//! assert!(doc.apply_undo().unwrap());
//! assert_eq!(doc.text(), "");
//! assert_eq!(doc.cursor(), TextCoordinate::new(0, 0));
//! ```

mod document;
mod find;
mod history;
mod line;
mod paint;
mod undo;
mod wrap;

pub use document::{Document, DocumentOptions, RewrapEvent, RewrapSubscription, SelectionMode};
pub use find::{FindFlags, FindResult, Finder, LiteralFinder, RegexFinder};
pub use line::{BreakFlags, BreakPos, LineBuffer};
pub use paint::{PaintAttr, PaintFlags, PaintInfo, PaintSurface, WRAP_SYMBOL};
pub use undo::{Caret, INDENT_SEPARATOR, UndoEntry, UndoKind, UndoLog};
pub use wrap::WrapIndex;

/// Position in a document: line index and byte offset within the line.
///
/// Orders by line first, then offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextCoordinate {
    pub line: usize,
    pub pos: usize,
}

impl TextCoordinate {
    #[must_use]
    pub const fn new(line: usize, pos: usize) -> Self {
        Self { line, pos }
    }
}

/// Position of a display row: logical line and sub-line index within it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayRow {
    pub line: usize,
    pub subline: usize,
}

impl DisplayRow {
    #[must_use]
    pub const fn new(line: usize, subline: usize) -> Self {
        Self { line, subline }
    }
}
