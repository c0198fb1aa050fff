//! Multi-line document with cursor, selection and undo history.
//!
//! [`Document`] owns its lines exclusively and performs every structural
//! edit. Each edit records an [`UndoEntry`] and queues [`RewrapEvent`]s for
//! every registered subscriber; a [`WrapIndex`](super::WrapIndex) drains its
//! queue with [`WrapIndex::sync`](super::WrapIndex::sync).
//!
//! Multi-line edits perform every allocation before the line array is
//! touched, so a failed edit leaves the document unchanged.

use std::fmt;
use std::sync::Arc;

use crate::clipboard::{ClipboardLock, ClipboardSink};
use crate::error::{Error, Result};
use crate::event::{EVENT_MODIFIED, LogLevel, emit_event, emit_log_with};
use crate::text::find::{FindFlags, FindResult, Finder};
use crate::text::line::{LineBuffer, tab_width};
use crate::text::paint::{PaintFlags, PaintInfo, PaintSurface};
use crate::text::undo::{Caret, INDENT_SEPARATOR, UndoEntry, UndoKind, UndoLog};
use crate::text::TextCoordinate;

/// Pending events per subscriber before the queue collapses into
/// [`RewrapEvent::All`].
const MAX_PENDING_REWRAP_EVENTS: usize = 1024;

/// How the selection follows the cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SelectionMode {
    /// No selection.
    #[default]
    None,
    /// Selection extends while a shift-modified motion is held.
    Shift,
    /// Selection anchored by an explicit mark; persists across motion.
    Mark,
    /// The whole document.
    All,
}

/// Change notification for views that cache per-line layout.
///
/// Line ranges are half-open: `first..last`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewrapEvent {
    /// Every line must be recomputed.
    All,
    /// `line` changed from byte offset `pos` on.
    Line { line: usize, pos: usize },
    /// A single cursor stop changed at `pos`; later wrap points most likely
    /// did not move.
    LineLocal { line: usize, pos: usize },
    /// Empty lines were inserted at `first..last`.
    InsertLines { first: usize, last: usize },
    /// Lines `first..last` were removed.
    DeleteLines { first: usize, last: usize },
}

/// Handle of a rewrap event queue. See [`Document::subscribe_rewrap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RewrapSubscription(u64);

/// Editing options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Tab stop distance for screen positions and indentation.
    pub tabsize: usize,
    /// Indent with `tabsize` spaces instead of a tab.
    pub indent_with_spaces: bool,
    /// Copy the leading white space of the current line into new lines.
    pub auto_indent: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            tabsize: 8,
            indent_with_spaces: false,
            auto_indent: true,
        }
    }
}

fn normalize(start: TextCoordinate, end: TextCoordinate) -> (TextCoordinate, TextCoordinate) {
    if end < start { (end, start) } else { (start, end) }
}

fn log_failure(operation: &str, err: &Error) {
    emit_log_with(LogLevel::Warn, || format!("{operation} failed: {err}"));
}

/// Bytes of leading white space that make up one indentation step.
fn unindent_len(line: &LineBuffer, tabsize: usize) -> usize {
    let tabsize = tabsize.max(1);
    let mut col = 0;
    let mut len = 0;
    for c in line.as_str().chars() {
        if col >= tabsize {
            break;
        }
        match c {
            ' ' => col += 1,
            '\t' => col += tab_width(col, tabsize),
            _ => break,
        }
        len += 1;
    }
    len
}

/// Editable text with cursor, selection and undo history.
pub struct Document {
    lines: Vec<LineBuffer>,
    pub(super) cursor: TextCoordinate,
    selection_start: TextCoordinate,
    selection_end: TextCoordinate,
    selection_mode: SelectionMode,
    pub(super) undo_log: UndoLog,
    pub(super) last_undo_kind: Option<UndoKind>,
    last_undo_position: TextCoordinate,
    undo_block_depth: usize,
    undo_block_pending: bool,
    was_modified: bool,
    options: DocumentOptions,
    subscribers: Vec<(RewrapSubscription, Vec<RewrapEvent>)>,
    next_subscription: u64,
    clipboard: Option<Arc<dyn ClipboardSink + Send + Sync>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("lines", &self.lines.len())
            .field("cursor", &self.cursor)
            .field("selection_mode", &self.selection_mode)
            .field("undo_entries", &self.undo_log.len())
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document holding one empty line.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DocumentOptions::default())
    }

    #[must_use]
    pub fn with_options(options: DocumentOptions) -> Self {
        Self {
            lines: vec![LineBuffer::new()],
            cursor: TextCoordinate::default(),
            selection_start: TextCoordinate::default(),
            selection_end: TextCoordinate::default(),
            selection_mode: SelectionMode::None,
            undo_log: UndoLog::new(),
            last_undo_kind: None,
            last_undo_position: TextCoordinate::default(),
            undo_block_depth: 0,
            undo_block_pending: false,
            was_modified: false,
            options,
            subscribers: Vec::new(),
            next_subscription: 0,
            clipboard: None,
        }
    }

    /// Create a document from `\n`-separated text. Nothing is recorded in
    /// the undo history.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut doc = Self::new();
        doc.append_text(text)?;
        Ok(doc)
    }

    /// Append `\n`-separated text at the end without recording undo.
    pub fn append_text(&mut self, text: &str) -> Result<()> {
        let block = LineBuffer::try_from_str(text)?;
        let cursor = self.cursor;
        let at = TextCoordinate::new(self.lines.len() - 1, usize::MAX);
        self.insert_block_internal(at, &block)?;
        self.cursor = cursor;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Content access
    // ------------------------------------------------------------------

    /// Number of lines; never zero.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&LineBuffer> {
        self.lines.get(index)
    }

    #[must_use]
    pub fn lines(&self) -> &[LineBuffer] {
        &self.lines
    }

    /// Byte length of line `index`, 0 if it does not exist.
    #[must_use]
    pub fn line_len(&self, index: usize) -> usize {
        self.lines.get(index).map_or(0, LineBuffer::len)
    }

    /// Whole content with `\n` between lines.
    #[must_use]
    pub fn text(&self) -> String {
        let total = self.lines.iter().map(|line| line.len() + 1).sum::<usize>();
        let mut text = String::with_capacity(total);
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(line.as_str());
        }
        text
    }

    #[must_use]
    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: DocumentOptions) {
        self.options = options;
    }

    #[must_use]
    pub fn undo_log(&self) -> &UndoLog {
        &self.undo_log
    }

    /// Install the sink that receives the primary selection.
    pub fn set_clipboard(&mut self, clipboard: Option<Arc<dyn ClipboardSink + Send + Sync>>) {
        self.clipboard = clipboard;
    }

    // ------------------------------------------------------------------
    // Rewrap notification
    // ------------------------------------------------------------------

    /// Register a new rewrap event queue.
    pub fn subscribe_rewrap(&mut self) -> RewrapSubscription {
        let id = RewrapSubscription(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Vec::new()));
        id
    }

    /// Drop a queue registered with [`subscribe_rewrap`](Self::subscribe_rewrap).
    pub fn unsubscribe_rewrap(&mut self, subscription: RewrapSubscription) {
        self.subscribers.retain(|(id, _)| *id != subscription);
    }

    /// Take the events queued for `subscription` since the last call.
    ///
    /// Returns an empty list for unknown subscriptions.
    pub fn take_rewrap_events(&mut self, subscription: RewrapSubscription) -> Vec<RewrapEvent> {
        self.subscribers
            .iter_mut()
            .find(|(id, _)| *id == subscription)
            .map(|(_, queue)| std::mem::take(queue))
            .unwrap_or_default()
    }

    /// Ask every subscriber to recompute all lines, e.g. after the width
    /// method changed.
    pub fn invalidate_wrapping(&mut self) {
        self.emit(RewrapEvent::All);
    }

    pub(super) fn emit(&mut self, event: RewrapEvent) {
        for (_, queue) in &mut self.subscribers {
            if event == RewrapEvent::All || queue.len() >= MAX_PENDING_REWRAP_EVENTS {
                queue.clear();
                queue.push(RewrapEvent::All);
            } else if queue.first() != Some(&RewrapEvent::All) {
                queue.push(event);
            }
        }
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    #[must_use]
    pub fn cursor(&self) -> TextCoordinate {
        self.cursor
    }

    /// Move the cursor, clamping it into the document and onto a cursor stop.
    pub fn set_cursor(&mut self, coord: TextCoordinate) {
        self.cursor = self.clamp_coordinate(coord);
    }

    /// Move the cursor `adjust` stops within its line.
    pub fn adjust_position(&mut self, adjust: isize) {
        self.cursor.pos = self.lines[self.cursor.line].adjust_position(self.cursor.pos, adjust);
    }

    fn clamp_coordinate(&self, coord: TextCoordinate) -> TextCoordinate {
        let line_index = coord.line.min(self.lines.len() - 1);
        let line = &self.lines[line_index];
        let pos = if coord.pos == 0 || coord.pos >= line.len() {
            coord.pos.min(line.len())
        } else if line.width_at(coord.pos) > 0 {
            coord.pos
        } else {
            line.adjust_position(line.adjust_position(coord.pos, 1), -1)
        };
        TextCoordinate::new(line_index, pos)
    }

    /// Screen column of `at` (the cursor if `None`), tabs expanded. `at` is
    /// clamped into the document first.
    #[must_use]
    pub fn calculate_screen_pos(&self, at: Option<TextCoordinate>) -> usize {
        let at = at.map_or(self.cursor, |at| self.clamp_coordinate(at));
        self.lines[at.line].calculate_screen_width(0, at.pos, self.options.tabsize)
    }

    /// Byte offset on `line` covering screen column `col`. Lines past the
    /// end resolve to the last line.
    #[must_use]
    pub fn calculate_line_pos(&self, line: usize, col: usize) -> usize {
        self.lines[line.min(self.lines.len() - 1)].calculate_line_pos(0, usize::MAX, col, self.options.tabsize)
    }

    /// Move the cursor to the start of the next word, continuing on the
    /// following lines if this one has no further word.
    pub fn get_next_word(&mut self) {
        let mut line = self.cursor.line;
        let mut pos = if self.cursor.pos >= self.lines[line].len() {
            None
        } else {
            self.lines[line].get_next_word(Some(self.cursor.pos))
        };
        while pos.is_none() && line + 1 < self.lines.len() {
            line += 1;
            pos = self.lines[line].get_next_word(None);
        }
        self.cursor = TextCoordinate::new(line, pos.unwrap_or(self.lines[line].len()));
    }

    /// Move the cursor to the start of the previous word, continuing on
    /// earlier lines if necessary.
    pub fn get_previous_word(&mut self) {
        let mut line = self.cursor.line;
        let mut pos = self.lines[line].get_previous_word(Some(self.cursor.pos));
        while pos.is_none() && line > 0 {
            line -= 1;
            pos = self.lines[line].get_previous_word(None);
        }
        self.cursor = TextCoordinate::new(line, pos.unwrap_or(0));
    }

    // ------------------------------------------------------------------
    // Undo bookkeeping
    // ------------------------------------------------------------------

    /// Whether the content differs from the state marked by
    /// [`set_undo_mark`](Self::set_undo_mark).
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.undo_log.is_at_mark()
    }

    /// Mark the current state as saved.
    pub fn set_undo_mark(&mut self) {
        self.undo_log.set_mark();
        // The marked entry must not grow any further.
        self.last_undo_kind = None;
        self.notify_modified();
    }

    pub(super) fn notify_modified(&mut self) {
        let modified = self.is_modified();
        if modified != self.was_modified {
            self.was_modified = modified;
            emit_event(EVENT_MODIFIED, if modified { "true" } else { "false" });
        }
    }

    /// Open an undo group. Edits until the matching
    /// [`end_undo_block`](Self::end_undo_block) undo and redo as one step.
    ///
    /// Groups nest; only the outermost one is recorded, and a group without
    /// edits records nothing.
    pub fn start_undo_block(&mut self) {
        self.undo_block_depth += 1;
        if self.undo_block_depth == 1 {
            self.undo_block_pending = true;
        }
    }

    pub fn end_undo_block(&mut self) -> Result<()> {
        if self.undo_block_depth == 0 {
            return Ok(());
        }
        self.undo_block_depth -= 1;
        if self.undo_block_depth > 0 {
            return Ok(());
        }
        self.finish_undo_block()
    }

    /// Close any open undo group regardless of nesting.
    pub(super) fn close_undo_block(&mut self) -> Result<()> {
        if self.undo_block_depth == 0 {
            return Ok(());
        }
        self.undo_block_depth = 0;
        self.finish_undo_block()
    }

    fn finish_undo_block(&mut self) -> Result<()> {
        if self.undo_block_pending {
            self.undo_block_pending = false;
            return Ok(());
        }
        if let Some(tail) = self.undo_log.tail_mut() {
            tail.minimize();
        }
        self.undo_log.add(UndoEntry::new(UndoKind::BlockEnd, self.cursor))?;
        self.last_undo_kind = None;
        emit_log_with(LogLevel::Debug, || {
            format!("undo group closed at entry {}", self.undo_log.current())
        });
        Ok(())
    }

    /// Append `entry` to the history. Callers reserve two slots in the log
    /// before mutating anything, so this cannot fail after an edit.
    fn record(&mut self, entry: UndoEntry) -> Result<()> {
        if let Some(tail) = self.undo_log.tail_mut() {
            tail.minimize();
        }
        if self.undo_block_pending {
            self.undo_block_pending = false;
            self.undo_log
                .add(UndoEntry::new(UndoKind::BlockStart, entry.start()))?;
        }
        let kind = entry.kind();
        self.undo_log.add(entry)?;
        self.last_undo_kind = kind.coalesces().then_some(kind);
        self.notify_modified();
        Ok(())
    }

    fn coalesces_with_tail(&self, kind: UndoKind, at: TextCoordinate) -> bool {
        self.last_undo_kind == Some(kind)
            && self.last_undo_position == at
            && !self.undo_block_pending
            && self.undo_log.tail().is_some_and(|tail| tail.kind() == kind)
    }

    /// Run a single-character edit on the line at `at`, extending the most
    /// recent undo entry when the edit continues it.
    fn edit_char<F>(&mut self, kind: UndoKind, at: TextCoordinate, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut LineBuffer, Option<&mut UndoEntry>) -> Result<bool>,
    {
        self.undo_log.reserve(2)?;
        if self.coalesces_with_tail(kind, at) {
            return edit(&mut self.lines[at.line], self.undo_log.tail_mut());
        }
        let mut entry = UndoEntry::new(kind, at);
        let changed = edit(&mut self.lines[at.line], Some(&mut entry))?;
        if changed {
            self.record(entry)?;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Character edits
    // ------------------------------------------------------------------

    /// Insert `c` at the cursor and move past it.
    pub fn insert_char(&mut self, c: char) -> Result<bool> {
        let at = self.cursor;
        let changed = self
            .edit_char(UndoKind::Add, at, |line, undo| line.insert_char(at.pos, c, undo))
            .inspect_err(|err| log_failure("insert_char", err))?;
        if changed {
            self.emit(RewrapEvent::LineLocal {
                line: at.line,
                pos: at.pos,
            });
            self.step_past_edit(at, c);
        }
        Ok(changed)
    }

    /// Move the cursor past `c`, just written at `at`, and remember where a
    /// contiguous edit would continue.
    ///
    /// A combining mark written in front of a character leaves the cursor in
    /// front of that character. A base written in front of combining marks
    /// takes them over, and the cursor skips them; the edit then no longer
    /// continues at the cursor, so the next one starts a new undo entry.
    fn step_past_edit(&mut self, at: TextCoordinate, c: char) {
        let next = at.pos + c.len_utf8();
        let line = &self.lines[at.line];
        self.cursor.pos = if next >= line.len() || line.width_at(next) > 0 {
            next
        } else {
            line.adjust_position(at.pos, 1)
        };
        self.last_undo_position = TextCoordinate::new(at.line, next);
    }

    /// Replace the character under the cursor with `c` and move past it.
    pub fn overwrite_char(&mut self, c: char) -> Result<bool> {
        let at = self.cursor;
        let changed = self
            .edit_char(UndoKind::Overwrite, at, |line, undo| {
                line.overwrite_char(at.pos, c, undo)
            })
            .inspect_err(|err| log_failure("overwrite_char", err))?;
        if changed {
            self.emit(RewrapEvent::LineLocal {
                line: at.line,
                pos: at.pos,
            });
            self.step_past_edit(at, c);
        }
        Ok(changed)
    }

    /// Delete the character under the cursor. Returns `false` at the end of
    /// the line; joining lines is [`merge`](Self::merge)'s job.
    pub fn delete_char(&mut self) -> Result<bool> {
        let at = self.cursor;
        let changed = self
            .edit_char(UndoKind::Delete, at, |line, undo| line.delete_char(at.pos, undo))
            .inspect_err(|err| log_failure("delete_char", err))?;
        if changed {
            self.emit(RewrapEvent::LineLocal {
                line: at.line,
                pos: at.pos,
            });
            self.last_undo_position = at;
        }
        Ok(changed)
    }

    /// Delete the character before the cursor. Returns `false` at the start
    /// of the line.
    pub fn backspace_char(&mut self) -> Result<bool> {
        let at = self.cursor;
        let new_pos = self.lines[at.line].adjust_position(at.pos, -1);
        let changed = self
            .edit_char(UndoKind::Backspace, at, |line, undo| {
                line.backspace_char(at.pos, undo)
            })
            .inspect_err(|err| log_failure("backspace_char", err))?;
        if changed {
            self.cursor.pos = new_pos;
            self.emit(RewrapEvent::LineLocal {
                line: at.line,
                pos: new_pos,
            });
            self.last_undo_position = self.cursor;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Line structure
    // ------------------------------------------------------------------

    /// Join the cursor line with the previous line (`backspace`) or the next
    /// one. Returns `false` at the first or last line respectively.
    pub fn merge(&mut self, backspace: bool) -> Result<bool> {
        let line = if backspace {
            if self.cursor.line == 0 {
                return Ok(false);
            }
            self.cursor.line - 1
        } else {
            if self.cursor.line + 1 >= self.lines.len() {
                return Ok(false);
            }
            self.cursor.line
        };
        let kind = if backspace {
            UndoKind::BackspaceNewline
        } else {
            UndoKind::DeleteNewline
        };
        let at = TextCoordinate::new(line, self.lines[line].len());
        self.undo_log
            .reserve(2)
            .and_then(|()| self.merge_internal(line))
            .and_then(|()| self.record(UndoEntry::new(kind, at)))
            .inspect_err(|err| log_failure("merge", err))?;
        Ok(true)
    }

    /// Append line `line + 1` to `line` and leave the cursor at the join.
    pub(super) fn merge_internal(&mut self, line: usize) -> Result<()> {
        let next_len = self.lines[line + 1].len();
        self.lines[line].reserve(next_len)?;
        let pos = self.lines[line].len();
        let next = self.lines.remove(line + 1);
        self.lines[line].merge(next)?;
        self.cursor = TextCoordinate::new(line, pos);
        self.emit(RewrapEvent::DeleteLines {
            first: line + 1,
            last: line + 2,
        });
        self.emit(RewrapEvent::Line { line, pos });
        Ok(())
    }

    /// Split the cursor line at the cursor. With a non-empty `indent`, the
    /// new line starts with it and the cursor is placed after it.
    pub fn break_line(&mut self, indent: Option<&str>) -> Result<bool> {
        self.break_line_recorded(indent.unwrap_or(""))
            .inspect_err(|err| log_failure("break_line", err))?;
        Ok(true)
    }

    /// Split the cursor line, repeating its leading white space on the new
    /// line when [`DocumentOptions::auto_indent`] is set.
    pub fn break_line_auto_indent(&mut self) -> Result<bool> {
        if !self.options.auto_indent {
            return self.break_line(None);
        }
        let line = self.lines[self.cursor.line].as_str();
        let limit = self.cursor.pos.min(line.len());
        let indent_len = line[..limit]
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(limit);
        let mut indent = String::new();
        indent.try_reserve(indent_len)?;
        indent.push_str(&line[..indent_len]);
        self.break_line(Some(&indent))
    }

    fn break_line_recorded(&mut self, indent: &str) -> Result<()> {
        debug_assert!(!indent.contains('\n'));
        self.undo_log.reserve(2)?;
        let at = self.cursor;
        let entry = if indent.is_empty() {
            UndoEntry::new(UndoKind::AddNewline, at)
        } else {
            let mut text = String::new();
            text.try_reserve(indent.len() + 1)?;
            text.push('\n');
            text.push_str(indent);
            UndoEntry::Text {
                kind: UndoKind::AddNewlineIndent,
                start: at,
                text,
            }
        };
        self.break_line_internal(indent)?;
        self.record(entry)
    }

    /// Split the cursor line at the cursor, prefixing the new line with
    /// `indent`. The cursor moves to the new line, after the indent.
    pub(super) fn break_line_internal(&mut self, indent: &str) -> Result<()> {
        let at = self.cursor;
        self.lines.try_reserve(1)?;
        let mut new_line = LineBuffer::try_from_str(indent)?;
        new_line.merge(self.lines[at.line].clone_range(at.pos, None)?)?;

        self.lines[at.line].truncate(at.pos);
        self.lines.insert(at.line + 1, new_line);
        self.emit(RewrapEvent::Line {
            line: at.line,
            pos: at.pos,
        });
        self.emit(RewrapEvent::InsertLines {
            first: at.line + 1,
            last: at.line + 2,
        });
        self.cursor = TextCoordinate::new(at.line + 1, indent.len());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Copy `[start, end)` (in either order) into `out`, lines joined by `\n`.
    fn copy_block(&self, start: TextCoordinate, end: TextCoordinate, out: &mut String) -> Result<()> {
        let (start, end) = normalize(start, end);
        if start.line == end.line {
            let line = self.lines[start.line].as_str();
            let end_pos = end.pos.min(line.len());
            out.try_reserve(end_pos.saturating_sub(start.pos))?;
            out.push_str(&line[start.pos.min(end_pos)..end_pos]);
            return Ok(());
        }

        let end_pos = end.pos.min(self.lines[end.line].len());
        let total = self.lines[start.line + 1..end.line]
            .iter()
            .map(|line| line.len() + 1)
            .sum::<usize>()
            + self.lines[start.line].len().saturating_sub(start.pos)
            + 1
            + end_pos;
        out.try_reserve(total)?;
        out.push_str(&self.lines[start.line].as_str()[start.pos..]);
        out.push('\n');
        for line in &self.lines[start.line + 1..end.line] {
            out.push_str(line.as_str());
            out.push('\n');
        }
        out.push_str(&self.lines[end.line].as_str()[..end_pos]);
        Ok(())
    }

    /// Text of `[start, end)` (in either order), or `None` for an empty range.
    pub fn convert_block(&self, start: TextCoordinate, end: TextCoordinate) -> Result<Option<String>> {
        let start = self.clamp_coordinate(start);
        let end = self.clamp_coordinate(end);
        if start == end {
            return Ok(None);
        }
        let mut text = String::new();
        self.copy_block(start, end, &mut text)?;
        Ok(Some(text))
    }

    /// Remove `[start, end)` (in either order), optionally capturing the
    /// removed text. The cursor is not moved.
    pub(super) fn delete_block_internal(
        &mut self,
        start: TextCoordinate,
        end: TextCoordinate,
        capture: Option<&mut String>,
    ) -> Result<()> {
        let (start, end) = normalize(start, end);

        if start.line == end.line {
            let end_pos = end.pos.min(self.lines[start.line].len());
            if start.pos >= end_pos {
                return Ok(());
            }
            if let Some(capture) = capture {
                capture.try_reserve(end_pos - start.pos)?;
                let removed = self.lines[start.line].cut_line(start.pos, end_pos)?;
                capture.push_str(removed.as_str());
            } else {
                self.lines[start.line].cut_line(start.pos, end_pos)?;
            }
            self.emit(RewrapEvent::Line {
                line: start.line,
                pos: start.pos,
            });
            return Ok(());
        }

        let end_pos = end.pos.min(self.lines[end.line].len());
        let first_len = self.lines[start.line].len();
        let tail_len = self.lines[end.line].len() - end_pos;
        if start.pos + tail_len > first_len {
            self.lines[start.line].reserve(start.pos + tail_len - first_len)?;
        }
        if let Some(capture) = capture {
            self.copy_block(start, end, capture)?;
        }

        let (head, rest) = self.lines.split_at_mut(end.line);
        head[start.line].splice_tail(start.pos, &rest[0].as_str()[end_pos..]);
        self.lines.drain(start.line + 1..=end.line);

        self.emit(RewrapEvent::DeleteLines {
            first: start.line + 1,
            last: end.line + 1,
        });
        self.emit(RewrapEvent::Line {
            line: start.line,
            pos: start.pos,
        });
        if start.line + 1 < self.lines.len() {
            self.emit(RewrapEvent::Line {
                line: start.line + 1,
                pos: 0,
            });
        }
        Ok(())
    }

    /// Insert the `\n`-separated `block` at `at`. An offset past the end of
    /// the line appends. The cursor ends up after the inserted text.
    pub(super) fn insert_block_internal(&mut self, at: TextCoordinate, block: &LineBuffer) -> Result<()> {
        let pos = at.pos.min(self.lines[at.line].len());
        let mut next = Some(0);
        let first = block.break_on_nl(&mut next)?;
        let mut new_lines: Vec<LineBuffer> = Vec::new();
        while next.is_some() {
            new_lines.try_reserve(1)?;
            new_lines.push(block.break_on_nl(&mut next)?);
        }

        let Some(last) = new_lines.last_mut() else {
            self.lines[at.line].insert_str(pos, first.as_str())?;
            self.cursor = TextCoordinate::new(at.line, pos + first.len());
            self.emit(RewrapEvent::Line { line: at.line, pos });
            return Ok(());
        };

        let end_pos = last.len();
        last.merge(self.lines[at.line].clone_range(pos, None)?)?;
        self.lines.try_reserve(new_lines.len())?;
        let line_len = self.lines[at.line].len();
        if pos + first.len() > line_len {
            self.lines[at.line].reserve(pos + first.len() - line_len)?;
        }

        let count = new_lines.len();
        self.lines[at.line].splice_tail(pos, first.as_str());
        self.lines.splice(at.line + 1..at.line + 1, new_lines);
        self.cursor = TextCoordinate::new(at.line + count, end_pos);

        self.emit(RewrapEvent::Line { line: at.line, pos });
        for line in at.line + 1..=at.line + count {
            self.emit(RewrapEvent::InsertLines {
                first: line,
                last: line + 1,
            });
        }
        Ok(())
    }

    /// Insert `text` at the cursor as one undo step. Returns `false` for
    /// empty text.
    pub fn insert_block(&mut self, text: &str) -> Result<bool> {
        if text.is_empty() {
            return Ok(false);
        }
        self.insert_block_recorded(text)
            .inspect_err(|err| log_failure("insert_block", err))?;
        Ok(true)
    }

    fn insert_block_recorded(&mut self, text: &str) -> Result<()> {
        self.undo_log.reserve(2)?;
        let block = LineBuffer::try_from_str(text)?;
        let at = self.cursor;
        self.insert_block_internal(at, &block)?;
        let end = self.cursor;
        self.record(UndoEntry::block(UndoKind::AddBlock, at, end, block.into_string()))
    }

    /// Remove `[start, end)` (in either order) as one undo step and put the
    /// cursor at the start of the range. Returns `false` for an empty range.
    pub fn delete_block(&mut self, start: TextCoordinate, end: TextCoordinate) -> Result<bool> {
        let start = self.clamp_coordinate(start);
        let end = self.clamp_coordinate(end);
        if start == end {
            return Ok(false);
        }
        self.delete_block_recorded(start, end)
            .inspect_err(|err| log_failure("delete_block", err))?;
        Ok(true)
    }

    fn delete_block_recorded(&mut self, start: TextCoordinate, end: TextCoordinate) -> Result<()> {
        self.undo_log.reserve(2)?;
        let mut captured = String::new();
        self.delete_block_internal(start, end, Some(&mut captured))?;
        self.cursor = start.min(end);
        self.record(UndoEntry::block(UndoKind::DeleteBlock, start, end, captured))
    }

    /// Replace `[start, end)` (in either order) with `text` as one undo step.
    /// An empty range inserts at `start`. The cursor ends up after the
    /// inserted text.
    pub fn replace_block(&mut self, start: TextCoordinate, end: TextCoordinate, text: &str) -> Result<bool> {
        let start = self.clamp_coordinate(start);
        let end = self.clamp_coordinate(end);
        if start == end && text.is_empty() {
            return Ok(false);
        }
        self.replace_block_recorded(start, end, text)
            .inspect_err(|err| log_failure("replace_block", err))?;
        Ok(true)
    }

    fn replace_block_recorded(&mut self, start: TextCoordinate, end: TextCoordinate, text: &str) -> Result<()> {
        self.undo_log.reserve(2)?;
        let block = LineBuffer::try_from_str(text)?;
        let low = start.min(end);
        let cursor = self.cursor;

        let mut deleted = String::new();
        self.delete_block_internal(start, end, Some(&mut deleted))?;
        if let Err(err) = self.insert_block_internal(low, &block) {
            let restore = LineBuffer::from(deleted);
            if self.insert_block_internal(low, &restore).is_err() {
                emit_log_with(LogLevel::Error, || {
                    format!("replace_block could not restore {} bytes", restore.len())
                });
            }
            self.cursor = cursor;
            return Err(err);
        }

        let new_end = self.cursor;
        self.record(UndoEntry::Replace {
            start,
            end,
            new_end,
            text: deleted,
            replacement: block.into_string(),
        })
    }

    // ------------------------------------------------------------------
    // Indentation
    // ------------------------------------------------------------------

    /// Lines touched by an indent of `[start, end)`. A range ending at the
    /// start of a line does not include that line.
    fn indent_lines(&self, start: TextCoordinate, end: TextCoordinate) -> (usize, usize) {
        let (start, end) = normalize(self.clamp_coordinate(start), self.clamp_coordinate(end));
        let last = if end.pos == 0 && end.line > start.line {
            end.line - 1
        } else {
            end.line
        };
        (start.line, last)
    }

    pub(super) fn caret(&self) -> Caret {
        Caret {
            cursor: self.cursor,
            selection_start: self.selection_start,
            selection_end: self.selection_end,
        }
    }

    pub(super) fn restore_caret(&mut self, caret: Caret) {
        self.cursor = caret.cursor;
        self.selection_start = caret.selection_start;
        self.selection_end = caret.selection_end;
    }

    fn shift_positions(&mut self, line: usize, delta: usize, grow: bool) {
        for coord in [&mut self.cursor, &mut self.selection_start, &mut self.selection_end] {
            if coord.line == line && coord.pos > 0 {
                coord.pos = if grow {
                    coord.pos + delta
                } else {
                    coord.pos.saturating_sub(delta)
                };
            }
        }
    }

    /// Prefix each line from `first_line` on with its segment of `payload`.
    pub(super) fn insert_indent_segments(&mut self, first_line: usize, payload: &str) -> Result<()> {
        for (i, segment) in payload.split_terminator(INDENT_SEPARATOR).enumerate() {
            if let Some(line) = self.lines.get_mut(first_line + i) {
                line.reserve(segment.len())?;
            }
        }
        for (i, segment) in payload.split_terminator(INDENT_SEPARATOR).enumerate() {
            let line = first_line + i;
            if segment.is_empty() || line >= self.lines.len() {
                continue;
            }
            self.lines[line].insert_str(0, segment)?;
            self.shift_positions(line, segment.len(), true);
            self.emit(RewrapEvent::Line { line, pos: 0 });
        }
        Ok(())
    }

    /// Strip each line's segment of `payload` from the lines starting at
    /// `first_line`.
    pub(super) fn remove_indent_segments(&mut self, first_line: usize, payload: &str) {
        for (i, segment) in payload.split_terminator(INDENT_SEPARATOR).enumerate() {
            let line = first_line + i;
            if segment.is_empty() || line >= self.lines.len() {
                continue;
            }
            debug_assert!(self.lines[line].as_str().starts_with(segment));
            self.lines[line].remove_prefix(segment.len());
            self.shift_positions(line, segment.len(), false);
            self.emit(RewrapEvent::Line { line, pos: 0 });
        }
    }

    /// Indent every non-empty line of `[start, end)` by one step: a tab, or
    /// `tabsize` spaces with `use_spaces`.
    pub fn indent_block(
        &mut self,
        start: TextCoordinate,
        end: TextCoordinate,
        tabsize: usize,
        use_spaces: bool,
    ) -> Result<bool> {
        let (first, last) = self.indent_lines(start, end);
        let step = if use_spaces { tabsize.max(1) } else { 1 };
        let mut payload = String::new();
        payload.try_reserve((last - first + 1) * (step + 1))?;
        let mut changed = false;
        for line in &self.lines[first..=last] {
            if !line.is_empty() {
                if use_spaces {
                    payload.extend(std::iter::repeat_n(' ', step));
                } else {
                    payload.push('\t');
                }
                changed = true;
            }
            payload.push(INDENT_SEPARATOR);
        }
        if !changed {
            return Ok(false);
        }

        self.undo_log
            .reserve(2)
            .and_then(|()| self.insert_indent_segments(first, &payload))
            .and_then(|()| {
                self.record(UndoEntry::block(
                    UndoKind::Indent,
                    TextCoordinate::new(first, 0),
                    TextCoordinate::new(last, 0),
                    payload,
                ))
            })
            .inspect_err(|err| log_failure("indent_block", err))?;
        Ok(true)
    }

    /// Remove up to one indentation step of leading white space from every
    /// line of `[start, end)`.
    ///
    /// Tabs and spaces are both removed whatever the indent style, so
    /// `_use_spaces` does not affect the result. It mirrors
    /// [`indent_block`](Self::indent_block) so both can be driven from the
    /// same options.
    pub fn unindent_block(
        &mut self,
        start: TextCoordinate,
        end: TextCoordinate,
        tabsize: usize,
        _use_spaces: bool,
    ) -> Result<bool> {
        let (first, last) = self.indent_lines(start, end);
        let mut payload = String::new();
        let mut changed = false;
        for line in &self.lines[first..=last] {
            let len = unindent_len(line, tabsize);
            payload.try_reserve(len + 1)?;
            payload.push_str(&line.as_str()[..len]);
            payload.push(INDENT_SEPARATOR);
            changed |= len > 0;
        }
        if !changed {
            return Ok(false);
        }

        self.undo_log.reserve(2)?;
        // Coordinates inside the removed white space collapse to the line
        // start; keep them for undo.
        let caret = self.caret();
        self.remove_indent_segments(first, &payload);
        self.record(
            UndoEntry::block(
                UndoKind::Unindent,
                TextCoordinate::new(first, 0),
                TextCoordinate::new(last, 0),
                payload,
            )
            .with_caret(caret),
        )?;
        Ok(true)
    }

    /// Indent the selected lines, or the cursor line without a selection.
    pub fn indent_selection(&mut self) -> Result<bool> {
        let (start, end) = self.selection_or_cursor();
        self.indent_block(start, end, self.options.tabsize, self.options.indent_with_spaces)
    }

    /// Unindent the selected lines, or the cursor line without a selection.
    pub fn unindent_selection(&mut self) -> Result<bool> {
        let (start, end) = self.selection_or_cursor();
        self.unindent_block(start, end, self.options.tabsize, self.options.indent_with_spaces)
    }

    fn selection_or_cursor(&self) -> (TextCoordinate, TextCoordinate) {
        if self.selection_mode == SelectionMode::None {
            (self.cursor, self.cursor)
        } else {
            (self.selection_start, self.selection_end)
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    /// Change the selection mode.
    ///
    /// Entering `Shift` or `Mark` from `None` or `All` anchors an empty
    /// selection at the cursor; `All` selects the whole document.
    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        match mode {
            SelectionMode::None => {
                self.selection_start = self.cursor;
                self.selection_end = self.cursor;
            }
            SelectionMode::All => {
                let last = self.lines.len() - 1;
                self.selection_start = TextCoordinate::new(0, 0);
                self.selection_end = TextCoordinate::new(last, self.lines[last].len());
            }
            SelectionMode::Shift | SelectionMode::Mark => {
                if matches!(self.selection_mode, SelectionMode::None | SelectionMode::All) {
                    self.selection_start = self.cursor;
                    self.selection_end = self.cursor;
                }
            }
        }
        self.selection_mode = mode;
    }

    /// Select `[start, end)` and move the cursor to `end`.
    pub fn set_selection(&mut self, start: TextCoordinate, end: TextCoordinate) {
        self.selection_start = self.clamp_coordinate(start);
        self.selection_end = self.clamp_coordinate(end);
        self.cursor = self.selection_end;
        if matches!(self.selection_mode, SelectionMode::None | SelectionMode::All) {
            self.selection_mode = SelectionMode::Mark;
        }
    }

    /// Anchor where the selection started; may lie after the end.
    #[must_use]
    pub fn selection_start(&self) -> TextCoordinate {
        self.selection_start
    }

    #[must_use]
    pub fn selection_end(&self) -> TextCoordinate {
        self.selection_end
    }

    /// Extend the selection to the cursor, publishing the selected text to
    /// the clipboard sink when `update_primary` is set.
    pub fn set_selection_end(&mut self, update_primary: bool) -> Result<()> {
        self.selection_end = self.cursor;
        if update_primary {
            self.publish_selection()?;
        }
        Ok(())
    }

    fn publish_selection(&self) -> Result<()> {
        let Some(clipboard) = &self.clipboard else {
            return Ok(());
        };
        let _lock = ClipboardLock::new(&**clipboard);
        clipboard.set_primary(self.convert_selection()?);
        Ok(())
    }

    #[must_use]
    pub fn selection_empty(&self) -> bool {
        self.selection_start == self.selection_end
    }

    /// Selected byte range of `line` for painting: `(start, end)` with `end`
    /// of `usize::MAX` when the selection continues past the line end.
    #[must_use]
    pub fn line_selection(&self, line: usize) -> Option<(usize, usize)> {
        if self.selection_mode == SelectionMode::None || self.selection_empty() {
            return None;
        }
        let (start, end) = normalize(self.selection_start, self.selection_end);
        if line < start.line || line > end.line {
            return None;
        }
        let from = if line == start.line { start.pos } else { 0 };
        let to = if line == end.line { end.pos } else { usize::MAX };
        Some((from, to))
    }

    /// Text of the selection, `None` when it is empty.
    pub fn convert_selection(&self) -> Result<Option<String>> {
        if self.selection_mode == SelectionMode::None {
            return Ok(None);
        }
        self.convert_block(self.selection_start, self.selection_end)
    }

    /// Delete the selected text and drop the selection.
    pub fn delete_selection(&mut self) -> Result<bool> {
        let changed = self.delete_block(self.selection_start, self.selection_end)?;
        self.set_selection_mode(SelectionMode::None);
        Ok(changed)
    }

    /// Replace the selected text with `text` and drop the selection.
    pub fn replace_selection(&mut self, text: &str) -> Result<bool> {
        let changed = self.replace_block(self.selection_start, self.selection_end, text)?;
        self.set_selection_mode(SelectionMode::None);
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    fn set_selection_from_find(&mut self, line: usize, result: FindResult) {
        self.selection_start = TextCoordinate::new(line, result.start);
        self.selection_end = TextCoordinate::new(line, result.end);
        self.cursor = self.selection_end;
        self.selection_mode = SelectionMode::Shift;
    }

    fn try_match(&mut self, finder: &mut dyn Finder, line: usize, window: FindResult, reverse: bool) -> bool {
        let mut result = window;
        if finder.match_text(self.lines[line].as_str(), &mut result, reverse) {
            self.set_selection_from_find(line, result);
            true
        } else {
            false
        }
    }

    /// Find the next match from the cursor and select it.
    ///
    /// Searches backward when exactly one of `reverse` and
    /// [`FindFlags::BACKWARD`] is set, and continues from the other end of
    /// the document with [`FindFlags::WRAP`].
    pub fn find(&mut self, finder: &mut dyn Finder, reverse: bool) -> bool {
        let flags = finder.flags();
        let start_line = self.cursor.line;
        let count = self.lines.len();

        if flags.contains(FindFlags::BACKWARD) != reverse {
            let (sel_start, _) = normalize(self.selection_start, self.selection_end);
            let from = if self.selection_mode != SelectionMode::None && sel_start.line == start_line {
                sel_start.pos
            } else {
                self.cursor.pos
            };
            if self.try_match(finder, start_line, FindResult::new(from, 0), true) {
                return true;
            }
            let wrapped = if flags.contains(FindFlags::WRAP) {
                start_line + 1..count
            } else {
                0..0
            };
            (0..start_line)
                .rev()
                .chain(wrapped.rev())
                .any(|line| self.try_match(finder, line, FindResult::new(usize::MAX, 0), true))
        } else {
            if self.try_match(finder, start_line, FindResult::new(self.cursor.pos, usize::MAX), false) {
                return true;
            }
            let wrapped = if flags.contains(FindFlags::WRAP) {
                0..start_line + 1
            } else {
                0..0
            };
            (start_line + 1..count)
                .chain(wrapped)
                .any(|line| self.try_match(finder, line, FindResult::new(0, usize::MAX), false))
        }
    }

    /// Find the first match inside `[start, end)` and select it.
    pub fn find_limited(&mut self, finder: &mut dyn Finder, start: TextCoordinate, end: TextCoordinate) -> bool {
        let (start, end) = normalize(self.clamp_coordinate(start), self.clamp_coordinate(end));
        (start.line..=end.line).any(|line| {
            let from = if line == start.line { start.pos } else { 0 };
            let to = if line == end.line { end.pos } else { usize::MAX };
            self.try_match(finder, line, FindResult::new(from, to), false)
        })
    }

    /// Replace the current selection with the finder's replacement text.
    /// Does nothing without a selection.
    pub fn replace(&mut self, finder: &dyn Finder) -> Result<bool> {
        if self.selection_mode == SelectionMode::None {
            return Ok(false);
        }
        let replacement = finder.replacement(self.lines[self.cursor.line].as_str());
        self.replace_selection(&replacement)
    }

    /// Replace every match inside `[start, end)` as one undo step. Returns
    /// the number of replacements.
    pub fn replace_all(&mut self, finder: &mut dyn Finder, start: TextCoordinate, end: TextCoordinate) -> Result<usize> {
        self.start_undo_block();
        let replaced = self.replace_all_in(finder, start, end);
        let closed = self.end_undo_block();
        let replaced = replaced?;
        closed?;
        emit_log_with(LogLevel::Debug, || format!("replace_all: {replaced} replacements"));
        Ok(replaced)
    }

    fn replace_all_in(&mut self, finder: &mut dyn Finder, start: TextCoordinate, end: TextCoordinate) -> Result<usize> {
        let (mut from, end) = normalize(self.clamp_coordinate(start), self.clamp_coordinate(end));
        // The end is tracked from the back of the document so it survives
        // replacements of a different length.
        let lines_after = self.lines.len() - 1 - end.line;
        let bytes_after = self.lines[end.line].len() - end.pos;
        let mut replaced = 0;

        loop {
            let limit_line = self.lines.len() - 1 - lines_after;
            let limit = TextCoordinate::new(limit_line, self.lines[limit_line].len() - bytes_after);
            if from >= limit || !self.find_limited(finder, from, limit) {
                break;
            }
            if self.replace(finder)? {
                replaced += 1;
            }
            from = self.cursor;
        }
        Ok(replaced)
    }

    // ------------------------------------------------------------------
    // Painting
    // ------------------------------------------------------------------

    /// Paint logical line `line` unwrapped. Selection and cursor are taken
    /// from the document; the rest of `info` from the caller.
    pub fn paint_line(&self, surface: &mut dyn PaintSurface, line: usize, info: &PaintInfo) {
        let info = PaintInfo {
            start: 0,
            max: usize::MAX,
            flags: info.flags - (PaintFlags::BREAK | PaintFlags::PARTIAL_CHAR),
            selection: self.line_selection(line),
            cursor: (self.cursor.line == line).then_some(self.cursor.pos),
            ..info.clone()
        };
        self.lines[line].paint_line(surface, &info);
    }
}
