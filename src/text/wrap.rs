//! Line-wrap index for a fixed display width.
//!
//! [`WrapIndex`] keeps, per logical line of a [`Document`], the byte offsets
//! where display rows start. It does not borrow the document: it registers a
//! rewrap subscription and catches up on the queued [`RewrapEvent`]s in
//! [`WrapIndex::sync`]. Every query that needs line text takes the document
//! as an argument.

use crate::error::Result;
use crate::text::document::{Document, RewrapEvent, RewrapSubscription};
use crate::text::line::{BreakFlags, LineBuffer};
use crate::text::paint::{PaintFlags, PaintInfo, PaintSurface};
use crate::text::{DisplayRow, TextCoordinate};

/// Most bytes a single-character edit changes.
const MAX_CHAR_LEN: usize = 4;

/// Per-line state while replaying queued events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dirty {
    Clean,
    Local(usize),
    Full(usize),
}

impl Dirty {
    fn mark(self, pos: usize, local: bool) -> Self {
        match self {
            Self::Clean if local => Self::Local(pos),
            Self::Clean => Self::Full(pos),
            // Two edits on one line: the shifted-break shortcut no longer
            // applies.
            Self::Local(old) | Self::Full(old) => Self::Full(old.min(pos)),
        }
    }
}

/// Wrap points of every line of a document.
#[derive(Clone, Debug)]
pub struct WrapIndex {
    /// Per line: sub-line start offsets, starting with 0, strictly increasing.
    wrap_data: Vec<Vec<usize>>,
    /// Per line: byte length when its breaks were computed.
    lens: Vec<usize>,
    /// Total number of sub-lines.
    size: usize,
    tabsize: usize,
    wrap_width: usize,
    subscription: Option<RewrapSubscription>,
}

impl WrapIndex {
    /// Create an empty index. A `wrap_width` of 0 is treated as 1.
    #[must_use]
    pub fn new(wrap_width: usize, tabsize: usize) -> Self {
        Self {
            wrap_data: Vec::new(),
            lens: Vec::new(),
            size: 0,
            tabsize,
            wrap_width: wrap_width.max(1),
            subscription: None,
        }
    }

    /// Follow `doc`: subscribe to its rewrap events and wrap all its lines.
    ///
    /// Detach from a previously followed document first.
    pub fn attach(&mut self, doc: &mut Document) -> Result<()> {
        self.subscription = Some(doc.subscribe_rewrap());
        self.resync(doc)
    }

    /// Stop following `doc`. The wrap data is kept.
    pub fn detach(&mut self, doc: &mut Document) {
        if let Some(subscription) = self.subscription.take() {
            doc.unsubscribe_rewrap(subscription);
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Apply the rewrap events `doc` queued since the last call.
    pub fn sync(&mut self, doc: &mut Document) -> Result<()> {
        let Some(subscription) = self.subscription else {
            return Ok(());
        };
        let events = doc.take_rewrap_events(subscription);
        if events.is_empty() {
            return Ok(());
        }
        self.replay(doc, &events)
    }

    /// Replay `events` against the line table, then recompute each touched
    /// line once against the current content.
    fn replay(&mut self, doc: &Document, events: &[RewrapEvent]) -> Result<()> {
        let mut dirty = Vec::new();
        dirty.try_reserve(self.wrap_data.len())?;
        dirty.resize(self.wrap_data.len(), Dirty::Clean);

        for event in events {
            match *event {
                RewrapEvent::All => return self.resync(doc),
                RewrapEvent::Line { line, pos } | RewrapEvent::LineLocal { line, pos } => {
                    let local = matches!(event, RewrapEvent::LineLocal { .. });
                    if let Some(state) = dirty.get_mut(line) {
                        *state = state.mark(pos, local);
                    }
                }
                RewrapEvent::InsertLines { first, last } => {
                    if first > self.wrap_data.len() || last < first {
                        return self.resync(doc);
                    }
                    dirty.try_reserve(last - first)?;
                    self.insert_placeholders(first, last)?;
                    dirty.splice(first..first, std::iter::repeat_n(Dirty::Full(0), last - first));
                }
                RewrapEvent::DeleteLines { first, last } => {
                    if last > self.wrap_data.len() || last < first {
                        return self.resync(doc);
                    }
                    self.delete_lines(first, last);
                    dirty.drain(first..last);
                }
            }
        }

        if self.wrap_data.len() != doc.line_count() {
            return self.resync(doc);
        }
        for (line, state) in dirty.into_iter().enumerate() {
            match state {
                Dirty::Clean => {}
                Dirty::Local(pos) => self.rewrap_line(doc, line, pos, true)?,
                Dirty::Full(pos) => self.rewrap_line(doc, line, pos, false)?,
            }
        }
        Ok(())
    }

    /// Rebuild the table from scratch for the current content of `doc`.
    fn resync(&mut self, doc: &Document) -> Result<()> {
        let count = doc.line_count();
        if self.wrap_data.len() > count {
            self.delete_lines(count, self.wrap_data.len());
        }
        if self.wrap_data.len() < count {
            self.insert_placeholders(self.wrap_data.len(), count)?;
        }
        self.rewrap_all(doc)
    }

    fn insert_placeholders(&mut self, first: usize, last: usize) -> Result<()> {
        let count = last - first;
        self.wrap_data.try_reserve(count)?;
        self.lens.try_reserve(count)?;
        let mut fresh = Vec::new();
        fresh.try_reserve(count)?;
        for _ in 0..count {
            let mut breaks = Vec::new();
            breaks.try_reserve(1)?;
            breaks.push(0);
            fresh.push(breaks);
        }
        self.wrap_data.splice(first..first, fresh);
        self.lens.splice(first..first, std::iter::repeat_n(0, count));
        self.size += count;
        Ok(())
    }

    /// Insert entries for the new lines `first..last` of `doc` and wrap them.
    pub fn insert_lines(&mut self, doc: &Document, first: usize, last: usize) -> Result<()> {
        self.insert_placeholders(first, last)?;
        for line in first..last {
            self.rewrap_line(doc, line, 0, false)?;
        }
        Ok(())
    }

    /// Remove the entries of lines `first..last`.
    pub fn delete_lines(&mut self, first: usize, last: usize) {
        self.size -= self.wrap_data[first..last].iter().map(Vec::len).sum::<usize>();
        self.wrap_data.drain(first..last);
        self.lens.drain(first..last);
    }

    /// Index of the first sub-line whose break computation can see offset
    /// `pos`.
    ///
    /// A scan reads up to one cursor stop past the last character that
    /// starts inside the row. Counting every tab at its narrowest gives a
    /// lower bound on the cells between a sub-line start and `pos`; once that
    /// bound exceeds the row by more than the widest character, earlier
    /// sub-lines cannot reach `pos` either.
    fn restart_index(&self, text: &LineBuffer, breaks: &[usize], pos: usize) -> usize {
        let narrow_tabs = usize::from(self.tabsize > 0);
        let mut index = breaks.iter().rposition(|&b| b <= pos).unwrap_or(0);
        while index > 0
            && text.calculate_screen_width(breaks[index - 1], pos, narrow_tabs) <= self.wrap_width + 2
        {
            index -= 1;
        }
        index
    }

    /// Recompute the breaks of `line` after a change at byte offset `pos`.
    ///
    /// With `local`, the change is a single character edit; the computation
    /// stops as soon as a new break coincides with an old one shifted by the
    /// change in line length, and keeps the remaining old breaks.
    pub fn rewrap_line(&mut self, doc: &Document, line: usize, pos: usize, local: bool) -> Result<()> {
        let (Some(text), Some(breaks)) = (doc.line(line), self.wrap_data.get(line)) else {
            return Ok(());
        };
        let pos = pos.min(text.len());
        let restart = self.restart_index(text, breaks, pos);
        let delta = text.len() as isize - self.lens[line] as isize;

        let mut fresh = Vec::new();
        let mut resume = None;
        let mut start = breaks[restart];
        while let Some(brk) = text.find_next_break_pos(start, self.wrap_width, self.tabsize) {
            fresh.try_reserve(1)?;
            fresh.push(brk.pos);
            if local && brk.pos >= pos + MAX_CHAR_LEN {
                let old = brk.pos.checked_add_signed(-delta);
                if let Some(found) = old.and_then(|old| breaks[restart + 1..].binary_search(&old).ok()) {
                    resume = Some(restart + 1 + found);
                    break;
                }
            }
            start = brk.pos;
        }

        let breaks = &mut self.wrap_data[line];
        let old_count = breaks.len();
        let fresh_count = fresh.len();
        breaks.try_reserve(fresh_count)?;
        match resume {
            Some(last_replaced) => {
                breaks.splice(restart + 1..=last_replaced, fresh);
                for brk in &mut breaks[restart + 1 + fresh_count..] {
                    *brk = brk.wrapping_add_signed(delta);
                }
            }
            None => {
                breaks.truncate(restart + 1);
                breaks.extend(fresh);
            }
        }
        self.size = self.size - old_count + breaks.len();
        self.lens[line] = text.len();
        Ok(())
    }

    /// Recompute every line.
    pub fn rewrap_all(&mut self, doc: &Document) -> Result<()> {
        for line in 0..self.wrap_data.len() {
            self.rewrap_line(doc, line, 0, false)?;
        }
        Ok(())
    }

    /// Change the display width and rewrap everything.
    pub fn set_wrap_width(&mut self, doc: &mut Document, wrap_width: usize) -> Result<()> {
        let wrap_width = wrap_width.max(1);
        if wrap_width == self.wrap_width {
            return Ok(());
        }
        self.wrap_width = wrap_width;
        self.rebuild(doc)
    }

    /// Change the tab size and rewrap everything.
    pub fn set_tabsize(&mut self, doc: &mut Document, tabsize: usize) -> Result<()> {
        if tabsize == self.tabsize {
            return Ok(());
        }
        self.tabsize = tabsize;
        self.rebuild(doc)
    }

    fn rebuild(&mut self, doc: &mut Document) -> Result<()> {
        if let Some(subscription) = self.subscription {
            // Pending events are subsumed by the full rebuild.
            doc.take_rewrap_events(subscription);
        }
        self.resync(doc)
    }

    #[must_use]
    pub fn wrap_width(&self) -> usize {
        self.wrap_width
    }

    #[must_use]
    pub fn tabsize(&self) -> usize {
        self.tabsize
    }

    /// Total number of display rows.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of logical lines covered.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.wrap_data.len()
    }

    /// Sub-line start offsets of `line`.
    #[must_use]
    pub fn breaks(&self, line: usize) -> &[usize] {
        self.wrap_data.get(line).map_or(&[], Vec::as_slice)
    }

    /// Number of display rows of `line`.
    #[must_use]
    pub fn get_line_count(&self, line: usize) -> usize {
        self.wrap_data.get(line).map_or(1, Vec::len)
    }

    /// Last display row of the document.
    #[must_use]
    pub fn get_end(&self) -> DisplayRow {
        let line = self.wrap_data.len().saturating_sub(1);
        DisplayRow::new(line, self.get_line_count(line) - 1)
    }

    /// Sub-line of `coord.line` containing byte offset `coord.pos`.
    #[must_use]
    pub fn find_line(&self, coord: TextCoordinate) -> usize {
        self.breaks(coord.line)
            .iter()
            .rposition(|&b| b <= coord.pos)
            .unwrap_or(0)
    }

    /// Move `row` down `count` display rows. Returns `true` if the end of
    /// the document was hit, leaving `row` on the last row.
    pub fn add_lines(&self, row: &mut DisplayRow, mut count: usize) -> bool {
        while count > 0 {
            let rows = self.get_line_count(row.line);
            if row.subline + count < rows {
                row.subline += count;
                return false;
            }
            if row.line + 1 >= self.wrap_data.len() {
                row.subline = rows - 1;
                return true;
            }
            count -= rows - row.subline;
            row.line += 1;
            row.subline = 0;
        }
        false
    }

    /// Move `row` up `count` display rows. Returns `true` if the start of
    /// the document was hit, leaving `row` on the first row.
    pub fn sub_lines(&self, row: &mut DisplayRow, mut count: usize) -> bool {
        while count > 0 {
            if row.subline >= count {
                row.subline -= count;
                return false;
            }
            count -= row.subline + 1;
            if row.line == 0 {
                row.subline = 0;
                return true;
            }
            row.line -= 1;
            row.subline = self.get_line_count(row.line) - 1;
        }
        false
    }

    /// Screen column of the cursor of `doc` within its display row.
    #[must_use]
    pub fn calculate_screen_pos(&self, doc: &Document) -> usize {
        let cursor = doc.cursor();
        let Some(text) = doc.line(cursor.line) else {
            return 0;
        };
        let start = self.breaks(cursor.line)
            .get(self.find_line(cursor))
            .copied()
            .unwrap_or(0);
        text.calculate_screen_width(start, cursor.pos, self.tabsize)
    }

    /// Byte offset on `line` shown at screen column `col` of sub-line
    /// `subline`. Columns past the end of a wrapped row map to its last
    /// cursor stop.
    #[must_use]
    pub fn calculate_line_pos(&self, doc: &Document, line: usize, col: usize, subline: usize) -> usize {
        let Some(text) = doc.line(line) else {
            return 0;
        };
        let breaks = self.breaks(line);
        let start = breaks.get(subline).copied().unwrap_or(0);
        let next = breaks.get(subline + 1).copied();
        let pos = text.calculate_line_pos(start, next.unwrap_or(usize::MAX), col, self.tabsize);
        match next {
            Some(next) if pos >= next => text.adjust_position(next, -1),
            _ => pos,
        }
    }

    /// Paint display row `row` of `doc`. Selection and cursor come from the
    /// document; size, scroll offset and fill flags from `info`.
    pub fn paint_line(&self, doc: &Document, surface: &mut dyn PaintSurface, row: DisplayRow, info: &PaintInfo) {
        let Some(text) = doc.line(row.line) else {
            return;
        };
        let breaks = self.breaks(row.line);
        let start = breaks.get(row.subline).copied().unwrap_or(0);
        let next = breaks.get(row.subline + 1).copied();

        let mut flags = info.flags - (PaintFlags::BREAK | PaintFlags::PARTIAL_CHAR);
        if next.is_some() {
            flags |= PaintFlags::BREAK;
            let partial = text
                .find_next_break_pos(start, self.wrap_width, self.tabsize)
                .is_some_and(|brk| brk.flags.contains(BreakFlags::PARTIAL_CHAR));
            if partial {
                flags |= PaintFlags::PARTIAL_CHAR;
            }
        }

        let cursor = doc.cursor();
        let info = PaintInfo {
            start,
            max: next.unwrap_or(usize::MAX),
            tabsize: self.tabsize,
            flags,
            selection: doc.line_selection(row.line),
            cursor: (cursor.line == row.line).then_some(cursor.pos),
            ..info.clone()
        };
        text.paint_line(surface, &info);
    }
}
