//! `textdoc` - editable text documents for terminal widgets
//!
//! A multi-line text engine for the edit fields of terminal UIs: UTF-8 line
//! buffers with display-width and word queries, a coalescing undo/redo
//! history, a document with cursor, selection and search, and an
//! incrementally maintained line-wrap index.

// Crate-level lint configuration
#![forbid(unsafe_code)]
#![allow(clippy::cast_possible_truncation)] // Intentional width conversions
#![allow(clippy::cast_sign_loss)] // Intentional offset conversions
#![allow(clippy::cast_possible_wrap)] // Offsets stay far below isize::MAX
#![allow(clippy::module_name_repetitions)] // Allow text::TextCoordinate etc
#![allow(clippy::struct_excessive_bools)] // Document state needs multiple flags
#![allow(clippy::missing_errors_doc)] // Every fallible call fails only on allocation
#![allow(clippy::missing_panics_doc)] // Docs WIP
#![allow(clippy::missing_const_for_fn)] // Many functions could be const, not critical
#![allow(clippy::doc_markdown)] // Allow technical names without backticks
#![allow(clippy::use_self)] // Allow explicit type names in impl blocks
#![allow(clippy::collapsible_if)] // Sometimes nested ifs are clearer
#![allow(clippy::cast_lossless)] // as casts are fine for primitive widening
#![allow(clippy::items_after_statements)] // Common pattern in tests
#![allow(clippy::needless_collect)] // Collect for assertions is clear

pub mod clipboard;
pub mod error;
pub mod event;
pub mod text;
pub mod unicode;

// Re-export core types at crate root
pub use clipboard::{ClipboardLock, ClipboardSink, MemoryClipboard};
pub use error::{Error, Result};
pub use event::{
    EVENT_MODIFIED, LogLevel, clear_event_callback, clear_log_callback, emit_event, emit_log,
    set_event_callback, set_log_callback,
};

// Re-export document types
pub use text::{
    Caret, DisplayRow, Document, DocumentOptions, FindFlags, FindResult, Finder, LineBuffer,
    LiteralFinder, PaintAttr, PaintFlags, PaintInfo, PaintSurface, RegexFinder, RewrapEvent,
    RewrapSubscription, SelectionMode, TextCoordinate, UndoEntry, UndoKind, UndoLog, WrapIndex,
};
pub use unicode::{WidthMethod, set_width_method};
