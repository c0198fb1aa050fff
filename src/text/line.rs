//! Single-line text storage.
//!
//! [`LineBuffer`] owns the UTF-8 text of one logical line and answers the
//! per-position questions the rest of the engine asks: display width,
//! character class, cursor stops, word boundaries and wrap points. Nothing is
//! cached per character; every property is derived from the codepoint at the
//! requested byte offset.
//!
//! Byte offsets handed to the editing methods must be cursor stops, i.e.
//! offsets obtained from [`LineBuffer::adjust_position`] (or `0`/`len()`).

use crate::error::Result;
use crate::text::undo::{UndoEntry, UndoKind};
use crate::unicode::{self, CharClass};

use bitflags::bitflags;

bitflags! {
    /// Properties of a computed wrap point.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BreakFlags: u8 {
        /// The line continues after this point.
        const BREAK = 1 << 0;
        /// No word boundary fitted; a character was cut at the right edge.
        const PARTIAL_CHAR = 1 << 1;
    }
}

/// Result of [`LineBuffer::find_next_break_pos`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakPos {
    /// First byte of the next sub-line.
    pub pos: usize,
    pub flags: BreakFlags,
}

/// Cells consumed by a tab at column `total`. A tabsize of zero renders tabs
/// as the two-cell control sequence `^I`.
#[inline]
pub(crate) const fn tab_width(total: usize, tabsize: usize) -> usize {
    if tabsize > 0 {
        tabsize - total % tabsize
    } else {
        2
    }
}

/// Text of one line, without its terminating newline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
    starts_with_combining: bool,
}

impl LineBuffer {
    /// Create an empty line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            text: String::new(),
            starts_with_combining: false,
        }
    }

    /// Create a line holding a copy of `text`, reporting allocation failure.
    pub fn try_from_str(text: &str) -> Result<Self> {
        let mut owned = String::new();
        owned.try_reserve_exact(text.len())?;
        owned.push_str(text);
        Ok(Self::from(owned))
    }

    /// Line content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether offset 0 holds a zero-width character.
    ///
    /// Such a line still paints a visible cell before its first character.
    #[must_use]
    pub const fn starts_with_combining(&self) -> bool {
        self.starts_with_combining
    }

    fn update_starts_with_combining(&mut self) {
        self.starts_with_combining = self
            .text
            .chars()
            .next()
            .is_some_and(unicode::is_zero_width);
    }

    /// Character starting at byte offset `pos`, if `pos` is a character
    /// boundary inside the line.
    #[must_use]
    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.text.get(pos..)?.chars().next()
    }

    /// Display width of the character at `pos`.
    ///
    /// Offsets that do not start a character (continuation bytes, the end of
    /// the line) have width 0.
    #[must_use]
    pub fn width_at(&self, pos: usize) -> usize {
        self.char_at(pos).map_or(0, unicode::char_width)
    }

    #[must_use]
    pub fn is_print(&self, pos: usize) -> bool {
        self.char_at(pos).is_some_and(unicode::is_print)
    }

    #[must_use]
    pub fn is_graph(&self, pos: usize) -> bool {
        self.char_at(pos).is_some_and(unicode::is_graph)
    }

    #[must_use]
    pub fn is_alnum(&self, pos: usize) -> bool {
        self.char_at(pos).is_some_and(char::is_alphanumeric)
    }

    #[must_use]
    pub fn is_space(&self, pos: usize) -> bool {
        self.char_at(pos).is_some_and(char::is_whitespace)
    }

    /// Word-motion class of the character at `pos`.
    #[must_use]
    pub fn char_class(&self, pos: usize) -> CharClass {
        self.char_at(pos).map_or(CharClass::Other, unicode::char_class)
    }

    /// Whether the cursor-stop cluster at `pos` is likely to be drawn badly.
    #[must_use]
    pub fn is_bad_draw(&self, pos: usize) -> bool {
        if self.char_at(pos).is_none() {
            return false;
        }
        let end = self.adjust_position(pos, 1);
        unicode::is_bad_draw(&self.text[pos..end])
    }

    fn next_boundary(&self, pos: usize) -> usize {
        match self.char_at(pos) {
            Some(c) => pos + c.len_utf8(),
            None => {
                let mut next = pos + 1;
                while next < self.text.len() && !self.text.is_char_boundary(next) {
                    next += 1;
                }
                next
            }
        }
    }

    /// Move `adjust` cursor stops forward (positive) or backward (negative).
    ///
    /// Zero-width characters are never cursor stops, so a step forward lands
    /// on the next character with a non-zero width (or the end of the line)
    /// and a step backward skips back over combining marks to their base.
    /// The result is clamped to `0..=len()`.
    #[must_use]
    pub fn adjust_position(&self, mut pos: usize, mut adjust: isize) -> usize {
        let len = self.text.len();
        if adjust > 0 {
            while adjust > 0 && pos < len {
                pos = self.next_boundary(pos);
                if self.width_at(pos) > 0 {
                    adjust -= 1;
                }
            }
            pos.min(len)
        } else {
            pos = pos.min(len);
            while adjust < 0 && pos > 0 {
                pos -= 1;
                while pos > 0 && self.width_at(pos) == 0 {
                    pos -= 1;
                }
                if self.width_at(pos) > 0 {
                    adjust += 1;
                }
            }
            pos
        }
    }

    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        self.text.try_reserve(additional)?;
        Ok(())
    }

    /// Drop everything from `pos` on.
    pub(crate) fn truncate(&mut self, pos: usize) {
        self.text.truncate(pos);
        if pos == 0 {
            self.starts_with_combining = false;
        }
    }

    /// Remove the first `len` bytes.
    pub(crate) fn remove_prefix(&mut self, len: usize) {
        self.text.replace_range(..len, "");
        self.update_starts_with_combining();
    }

    /// Replace everything from `pos` on with `tail`.
    ///
    /// Does not allocate if the caller reserved enough room beforehand.
    pub(crate) fn splice_tail(&mut self, pos: usize, tail: &str) {
        self.text.truncate(pos);
        self.text.push_str(tail);
        if pos == 0 {
            self.update_starts_with_combining();
        }
    }

    /// Insert `c` at `pos`, appending it to an `Add` undo payload.
    pub fn insert_char(&mut self, pos: usize, c: char, undo: Option<&mut UndoEntry>) -> Result<bool> {
        debug_assert!(self.text.is_char_boundary(pos));
        self.reserve(c.len_utf8())?;
        if let Some(undo) = undo {
            debug_assert_eq!(undo.kind(), UndoKind::Add);
            if let Some(text) = undo.text_mut() {
                text.try_reserve(c.len_utf8())?;
                text.push(c);
            }
        }
        self.text.insert(pos, c);
        if pos == 0 {
            self.update_starts_with_combining();
        }
        Ok(true)
    }

    /// Replace the cursor stop at `pos` with `c`.
    ///
    /// A zero-width `c` is combined with the preceding character instead of
    /// replacing anything, which is impossible at the start of the line.
    pub fn overwrite_char(
        &mut self,
        pos: usize,
        c: char,
        mut undo: Option<&mut UndoEntry>,
    ) -> Result<bool> {
        debug_assert!(self.text.is_char_boundary(pos));
        if let Some(undo) = undo.as_deref() {
            debug_assert_eq!(undo.kind(), UndoKind::Overwrite);
        }

        if unicode::is_zero_width(c) {
            if pos == 0 {
                return Ok(false);
            }
            self.reserve(c.len_utf8())?;
            if let Some(replacement) = undo.as_deref_mut().and_then(UndoEntry::replacement_mut) {
                replacement.try_reserve(c.len_utf8())?;
                replacement.push(c);
            }
            return self.insert_char(pos, c, None);
        }

        let end = self.adjust_position(pos, 1);
        let old_len = end - pos;
        if c.len_utf8() > old_len {
            self.reserve(c.len_utf8() - old_len)?;
        }
        if let Some(undo) = undo {
            if let Some(text) = undo.text_mut() {
                text.try_reserve(old_len)?;
            }
            if let Some(replacement) = undo.replacement_mut() {
                replacement.try_reserve(c.len_utf8())?;
                replacement.push(c);
            }
            if let Some(text) = undo.text_mut() {
                text.push_str(&self.text[pos..end]);
            }
        }

        let mut buf = [0u8; 4];
        self.text.replace_range(pos..end, c.encode_utf8(&mut buf));
        if pos == 0 {
            self.update_starts_with_combining();
        }
        Ok(true)
    }

    /// Delete the cursor stop at `pos`, including the combining marks it owns.
    ///
    /// A `Delete` payload grows at its end, a `Backspace` payload at its
    /// start, so either reads in document order. Returns `false` at the end
    /// of the line.
    pub fn delete_char(&mut self, pos: usize, undo: Option<&mut UndoEntry>) -> Result<bool> {
        if pos >= self.text.len() {
            return Ok(false);
        }
        let end = self.adjust_position(pos, 1);
        if let Some(undo) = undo {
            let kind = undo.kind();
            debug_assert!(matches!(kind, UndoKind::Delete | UndoKind::Backspace));
            if let Some(text) = undo.text_mut() {
                text.try_reserve(end - pos)?;
                if kind == UndoKind::Backspace {
                    text.insert_str(0, &self.text[pos..end]);
                } else {
                    text.push_str(&self.text[pos..end]);
                }
            }
        }
        self.text.replace_range(pos..end, "");
        if pos == 0 {
            self.update_starts_with_combining();
        }
        Ok(true)
    }

    /// Append `c` at the end of the line.
    pub fn append_char(&mut self, c: char, undo: Option<&mut UndoEntry>) -> Result<bool> {
        self.insert_char(self.text.len(), c, undo)
    }

    /// Delete the cursor stop before `pos`. Returns `false` at offset 0.
    pub fn backspace_char(&mut self, pos: usize, undo: Option<&mut UndoEntry>) -> Result<bool> {
        if pos == 0 {
            return Ok(false);
        }
        self.delete_char(self.adjust_position(pos, -1), undo)
    }

    /// Insert `text` at `pos`. `text` must not contain a newline.
    pub fn insert_str(&mut self, pos: usize, text: &str) -> Result<()> {
        debug_assert!(self.text.is_char_boundary(pos));
        self.reserve(text.len())?;
        self.text.insert_str(pos, text);
        if pos == 0 {
            self.update_starts_with_combining();
        }
        Ok(())
    }

    /// Append `other`, consuming it.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if self.text.is_empty() {
            // Keep whichever allocation is already there when one side is empty.
            if self.text.capacity() < other.text.len() {
                *self = other;
                return Ok(());
            }
            self.starts_with_combining = other.starts_with_combining;
        }
        self.reserve(other.text.len())?;
        self.text.push_str(&other.text);
        Ok(())
    }

    /// Split the line at `pos`: `self` keeps the prefix and the suffix is
    /// returned as a new line.
    pub fn break_line(&mut self, pos: usize) -> Result<Self> {
        if pos >= self.text.len() {
            return Ok(Self::new());
        }
        debug_assert!(self.text.is_char_boundary(pos));
        let suffix = Self::try_from_str(&self.text[pos..])?;
        self.text.truncate(pos);
        if pos == 0 {
            self.starts_with_combining = false;
        }
        Ok(suffix)
    }

    /// Remove `[start, end)` and return it as a new line.
    pub fn cut_line(&mut self, start: usize, end: usize) -> Result<Self> {
        debug_assert!(self.text.is_char_boundary(start) && self.text.is_char_boundary(end));
        let removed = self.clone_range(start, Some(end))?;
        self.text.replace_range(start..end, "");
        self.update_starts_with_combining();
        Ok(removed)
    }

    /// Copy `[start, end)` into a new line. `None` for `end` means the end of
    /// the line.
    pub fn clone_range(&self, start: usize, end: Option<usize>) -> Result<Self> {
        let end = end.unwrap_or(self.text.len());
        debug_assert!(start <= end && end <= self.text.len());
        if start >= end {
            return Ok(Self::new());
        }
        Self::try_from_str(&self.text[start..end])
    }

    /// Copy the text from `*start_from` up to the next newline (or the end)
    /// into a new line, and advance `*start_from` past that newline.
    ///
    /// `*start_from` becomes `None` once the end has been consumed. Used to
    /// split multi-line blocks held in a single buffer.
    pub fn break_on_nl(&self, start_from: &mut Option<usize>) -> Result<Self> {
        let Some(start) = *start_from else {
            return Ok(Self::new());
        };
        let start = start.min(self.text.len());
        match self.text[start..].find('\n') {
            Some(offset) => {
                let end = start + offset;
                *start_from = Some(end + 1);
                Self::try_from_str(&self.text[start..end])
            }
            None => {
                *start_from = None;
                Self::try_from_str(&self.text[start..])
            }
        }
    }

    /// Release spare capacity.
    pub fn minimize(&mut self) {
        self.text.shrink_to_fit();
    }

    /// Screen cells used by `[start, pos)` with tabs expanded at `tabsize`.
    ///
    /// Tabs are measured from `start`, so sub-lines of a wrapped line expand
    /// their tabs from their own first column.
    #[must_use]
    pub fn calculate_screen_width(&self, start: usize, pos: usize, tabsize: usize) -> usize {
        let mut total = usize::from(self.starts_with_combining && start == 0 && pos > 0);
        let Some(rest) = self.text.get(start..) else {
            return total;
        };
        for (offset, c) in rest.char_indices() {
            if start + offset >= pos {
                break;
            }
            total += if c == '\t' {
                tab_width(total, tabsize)
            } else {
                unicode::char_width(c)
            };
        }
        total
    }

    /// Byte offset of the character covering screen column `col`, counting
    /// from `start` and looking no further than `max`.
    ///
    /// Returns `min(max, len())` when `col` lies beyond the text.
    #[must_use]
    pub fn calculate_line_pos(&self, start: usize, max: usize, col: usize, tabsize: usize) -> usize {
        if col == 0 {
            return start;
        }
        let mut total = usize::from(self.starts_with_combining && start == 0);
        if let Some(rest) = self.text.get(start..) {
            for (offset, c) in rest.char_indices() {
                let pos = start + offset;
                if pos >= max {
                    break;
                }
                total += if c == '\t' {
                    tab_width(total, tabsize)
                } else {
                    unicode::char_width(c)
                };
                if total > col {
                    return pos;
                }
            }
        }
        max.min(self.text.len())
    }

    /// Find where the sub-line starting at `start` must end to fit in
    /// `max_width` cells.
    ///
    /// Breaks are placed after white space that follows a visible character,
    /// or after punctuation, so words stay intact where possible. When no
    /// such point fits, the break is forced before the character that
    /// overflows and flagged [`BreakFlags::PARTIAL_CHAR`]. Every break lies
    /// on a cursor stop strictly after `start`. Returns `None` when the rest
    /// of the line fits.
    #[must_use]
    pub fn find_next_break_pos(&self, start: usize, max_width: usize, tabsize: usize) -> Option<BreakPos> {
        let len = self.text.len();
        let mut total = usize::from(self.starts_with_combining && start == 0);
        let mut candidate: Option<usize> = None;
        let mut flags = BreakFlags::empty();
        let mut graph_seen = false;
        let mut last_was_graph = false;
        let mut i = start;

        while i < len && total < max_width {
            let Some(c) = self.char_at(i) else {
                i = self.adjust_position(i, 1);
                continue;
            };
            total += if c == '\t' {
                tab_width(total, tabsize)
            } else {
                unicode::char_width(c)
            };

            // A tab may run past the edge; the next sub-line starts after it.
            if total > max_width && (c != '\t' || tabsize == 0) {
                if candidate.is_none() {
                    flags = BreakFlags::PARTIAL_CHAR;
                }
                break;
            }

            let graphic = unicode::is_graph(c) || c < ' ';
            if !graph_seen {
                if graphic {
                    graph_seen = true;
                    last_was_graph = true;
                } else if i > start {
                    candidate = Some(i);
                }
            } else if c.is_whitespace() && last_was_graph {
                candidate = Some(self.adjust_position(i, 1));
                last_was_graph = false;
            } else if graphic {
                if last_was_graph && !c.is_alphanumeric() && c != '_' {
                    candidate = Some(self.adjust_position(i, 1));
                }
                last_was_graph = true;
            }
            i = self.adjust_position(i, 1);
        }

        if i >= len {
            return None;
        }
        let pos = match candidate {
            Some(pos) => pos,
            None if i > start => i,
            None => {
                // Not even one character fits: give it a row of its own.
                flags |= BreakFlags::PARTIAL_CHAR;
                let next = self.adjust_position(start, 1);
                if next >= len {
                    return None;
                }
                next
            }
        };
        Some(BreakPos {
            pos,
            flags: flags | BreakFlags::BREAK,
        })
    }

    /// Start of the next word after `start`, or `None` if there is none on
    /// this line. `None` for `start` scans from the beginning of the line,
    /// treating the line start as white space.
    #[must_use]
    pub fn get_next_word(&self, start: Option<usize>) -> Option<usize> {
        let len = self.text.len();
        let (mut i, mut class) = match start {
            None => (0, CharClass::Whitespace),
            Some(pos) => (self.adjust_position(pos, 1), self.char_class(pos)),
        };
        while i < len {
            let next_class = self.char_class(i);
            if next_class != class && next_class != CharClass::Whitespace {
                break;
            }
            class = next_class;
            i = self.adjust_position(i, 1);
        }
        (i < len).then_some(i)
    }

    /// Start of the word before `start`, or `None` if there is none on this
    /// line. `None` for `start` scans from the end of the line.
    #[must_use]
    pub fn get_previous_word(&self, start: Option<usize>) -> Option<usize> {
        let start = match start {
            Some(0) => return None,
            Some(pos) => pos,
            None => self.text.len(),
        };

        let mut class = CharClass::Whitespace;
        let mut i = self.adjust_position(start, -1);
        while i > 0 {
            class = self.char_class(i);
            if class != CharClass::Whitespace {
                break;
            }
            i = self.adjust_position(i, -1);
        }
        if i == 0 {
            class = self.char_class(0);
            if class == CharClass::Whitespace {
                return None;
            }
            return Some(0);
        }

        let mut word_start = i;
        i = self.adjust_position(i, -1);
        while i > 0 && self.char_class(i) == class {
            word_start = i;
            i = self.adjust_position(i, -1);
        }
        if i == 0 && self.char_class(0) == class {
            word_start = 0;
        }
        Some(word_start)
    }
}

impl From<String> for LineBuffer {
    fn from(text: String) -> Self {
        let mut line = Self {
            text,
            starts_with_combining: false,
        };
        line.update_starts_with_combining();
        line
    }
}

impl From<&str> for LineBuffer {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl std::fmt::Display for LineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
