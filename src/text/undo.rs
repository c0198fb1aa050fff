//! Undo history: reversible edit records and the position-addressable log.
//!
//! An [`UndoEntry`] stores only what its kind needs to be reverted and
//! re-applied: the captured text, an optional replacement text and the
//! coordinates of block-shaped edits. It knows nothing about how lines are
//! stored; the [`Document`](super::Document) interprets it.

use crate::error::Result;
use crate::text::TextCoordinate;

/// Separator between per-line segments of an indent/unindent payload.
///
/// Indent payloads only ever contain spaces and tabs, so this byte cannot be
/// confused with payload content.
pub const INDENT_SEPARATOR: char = '\u{1f}';

/// Kind of an undo record.
///
/// The `*Redo` kinds are never recorded. They name the action taken when an
/// entry whose forward edit is not simply the inverse of another kind is
/// re-applied; see [`UndoKind::redo_kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UndoKind {
    Add,
    Delete,
    Backspace,
    Overwrite,
    AddNewline,
    DeleteNewline,
    BackspaceNewline,
    AddBlock,
    DeleteBlock,
    ReplaceBlock,
    Indent,
    Unindent,
    AddNewlineIndent,
    BlockStart,
    BlockEnd,
    AddRedo,
    BackspaceRedo,
    OverwriteRedo,
    ReplaceBlockRedo,
    AddNewlineIndentRedo,
}

impl UndoKind {
    /// Action that re-applies an entry of this kind.
    ///
    /// Redoing a delete is undoing an add at the same place, redoing an indent
    /// is undoing an unindent, and so on; only kinds without such a mirror
    /// map to a dedicated `*Redo` action.
    #[must_use]
    pub const fn redo_kind(self) -> Self {
        match self {
            Self::Add => Self::AddRedo,
            Self::Delete => Self::Add,
            Self::Backspace => Self::BackspaceRedo,
            Self::Overwrite => Self::OverwriteRedo,
            Self::AddNewline => Self::DeleteNewline,
            Self::DeleteNewline | Self::BackspaceNewline => Self::AddNewline,
            Self::AddBlock => Self::DeleteBlock,
            Self::DeleteBlock => Self::AddBlock,
            Self::ReplaceBlock => Self::ReplaceBlockRedo,
            Self::Indent => Self::Unindent,
            Self::Unindent => Self::Indent,
            Self::AddNewlineIndent => Self::AddNewlineIndentRedo,
            Self::BlockStart => Self::BlockEnd,
            Self::BlockEnd => Self::BlockStart,
            redo => redo,
        }
    }

    /// Whether consecutive edits of this kind may be merged into one entry.
    #[must_use]
    pub const fn coalesces(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Delete | Self::Backspace | Self::Overwrite
        )
    }
}

/// Cursor and selection coordinates of a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caret {
    pub cursor: TextCoordinate,
    pub selection_start: TextCoordinate,
    pub selection_end: TextCoordinate,
}

/// One reversible edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoEntry {
    /// Newline insertion/removal and group brackets: position only.
    Marker {
        kind: UndoKind,
        start: TextCoordinate,
    },
    /// Character-level add/delete/backspace and newline-with-indent.
    Text {
        kind: UndoKind,
        start: TextCoordinate,
        text: String,
    },
    /// Overwritten characters and the characters that replaced them.
    Overwrite {
        start: TextCoordinate,
        text: String,
        replacement: String,
    },
    /// Block insert/delete and indent/unindent over a line range.
    Block {
        kind: UndoKind,
        start: TextCoordinate,
        end: TextCoordinate,
        text: String,
        /// Cursor and selection before the edit, for edits that clamp them.
        caret: Option<Caret>,
    },
    /// Block replacement. `end` is the end of the deleted range, `new_end`
    /// the cursor after the replacement was inserted.
    Replace {
        start: TextCoordinate,
        end: TextCoordinate,
        new_end: TextCoordinate,
        text: String,
        replacement: String,
    },
}

impl UndoEntry {
    /// Create an empty entry of the shape `kind` needs.
    #[must_use]
    pub fn new(kind: UndoKind, start: TextCoordinate) -> Self {
        match kind {
            UndoKind::Add | UndoKind::Delete | UndoKind::Backspace | UndoKind::AddNewlineIndent => {
                Self::Text {
                    kind,
                    start,
                    text: String::new(),
                }
            }
            UndoKind::Overwrite => Self::Overwrite {
                start,
                text: String::new(),
                replacement: String::new(),
            },
            UndoKind::AddBlock | UndoKind::DeleteBlock | UndoKind::Indent | UndoKind::Unindent => {
                Self::Block {
                    kind,
                    start,
                    end: start,
                    text: String::new(),
                    caret: None,
                }
            }
            UndoKind::ReplaceBlock => Self::Replace {
                start,
                end: start,
                new_end: start,
                text: String::new(),
                replacement: String::new(),
            },
            _ => Self::Marker { kind, start },
        }
    }

    /// Create a block-shaped entry with both coordinates.
    #[must_use]
    pub fn block(kind: UndoKind, start: TextCoordinate, end: TextCoordinate, text: String) -> Self {
        debug_assert!(matches!(
            kind,
            UndoKind::AddBlock | UndoKind::DeleteBlock | UndoKind::Indent | UndoKind::Unindent
        ));
        Self::Block {
            kind,
            start,
            end,
            text,
            caret: None,
        }
    }

    /// Attach the cursor and selection to restore when a block entry is
    /// undone. Other entry shapes ignore it.
    #[must_use]
    pub fn with_caret(mut self, saved: Caret) -> Self {
        if let Self::Block { caret, .. } = &mut self {
            *caret = Some(saved);
        }
        self
    }

    #[must_use]
    pub const fn caret(&self) -> Option<Caret> {
        match self {
            Self::Block { caret, .. } => *caret,
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> UndoKind {
        match self {
            Self::Marker { kind, .. } | Self::Text { kind, .. } | Self::Block { kind, .. } => *kind,
            Self::Overwrite { .. } => UndoKind::Overwrite,
            Self::Replace { .. } => UndoKind::ReplaceBlock,
        }
    }

    #[must_use]
    pub const fn redo_kind(&self) -> UndoKind {
        self.kind().redo_kind()
    }

    #[must_use]
    pub const fn start(&self) -> TextCoordinate {
        match self {
            Self::Marker { start, .. }
            | Self::Text { start, .. }
            | Self::Overwrite { start, .. }
            | Self::Block { start, .. }
            | Self::Replace { start, .. } => *start,
        }
    }

    /// End coordinate of block-shaped entries.
    #[must_use]
    pub const fn end(&self) -> Option<TextCoordinate> {
        match self {
            Self::Block { end, .. } | Self::Replace { end, .. } => Some(*end),
            _ => None,
        }
    }

    /// Cursor after the replacement text of a block replacement.
    #[must_use]
    pub const fn new_end(&self) -> Option<TextCoordinate> {
        match self {
            Self::Replace { new_end, .. } => Some(*new_end),
            _ => None,
        }
    }

    /// Captured text; empty for markers.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Marker { .. } => "",
            Self::Text { text, .. }
            | Self::Overwrite { text, .. }
            | Self::Block { text, .. }
            | Self::Replace { text, .. } => text,
        }
    }

    /// Replacement text of overwrite and replace entries.
    #[must_use]
    pub fn replacement(&self) -> Option<&str> {
        match self {
            Self::Overwrite { replacement, .. } | Self::Replace { replacement, .. } => {
                Some(replacement)
            }
            _ => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Marker { .. } => None,
            Self::Text { text, .. }
            | Self::Overwrite { text, .. }
            | Self::Block { text, .. }
            | Self::Replace { text, .. } => Some(text),
        }
    }

    pub fn replacement_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Overwrite { replacement, .. } | Self::Replace { replacement, .. } => {
                Some(replacement)
            }
            _ => None,
        }
    }

    /// Release over-allocated payload capacity.
    ///
    /// Called once the entry stops being the target of coalescing edits.
    pub fn minimize(&mut self) {
        if let Some(text) = self.text_mut() {
            text.shrink_to_fit();
        }
        if let Some(replacement) = self.replacement_mut() {
            replacement.shrink_to_fit();
        }
    }
}

/// Linear undo history with a done/redo boundary and a saved-state mark.
///
/// `entries[..current]` have been applied; `entries[current..]` are the redo
/// branch. Recording a new entry while the redo branch is non-empty discards
/// that branch.
#[derive(Clone, Debug)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
    current: usize,
    mark: usize,
    mark_valid: bool,
    mark_beyond_current: bool,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            current: 0,
            mark: 0,
            mark_valid: true,
            mark_beyond_current: false,
        }
    }
}

impl UndoLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, discarding the redo branch first.
    pub fn add(&mut self, entry: UndoEntry) -> Result<()> {
        if self.current < self.entries.len() {
            if self.mark_beyond_current {
                // The saved state lived in the discarded branch.
                self.mark_valid = false;
                self.mark_beyond_current = false;
            }
            self.entries.truncate(self.current);
        }
        self.entries.try_reserve(1)?;
        self.entries.push(entry);
        self.current = self.entries.len();
        Ok(())
    }

    /// Make room for `additional` entries so the next adds cannot fail.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.entries.try_reserve(additional)?;
        Ok(())
    }

    /// Exchange the entry at `index` for `entry` and return the old one.
    ///
    /// Lets the document apply an entry while mutating itself, then put the
    /// entry back, without cloning its payload.
    pub(crate) fn swap_entry(&mut self, index: usize, entry: UndoEntry) -> UndoEntry {
        std::mem::replace(&mut self.entries[index], entry)
    }

    /// Step back over the most recent applied entry and return it for undo.
    pub fn back(&mut self) -> Option<&UndoEntry> {
        if self.current == 0 {
            return None;
        }
        if self.mark_valid && self.current == self.mark {
            self.mark_beyond_current = true;
        }
        self.current -= 1;
        self.entries.get(self.current)
    }

    /// Step forward over the next redoable entry and return it for redo.
    pub fn forward(&mut self) -> Option<&UndoEntry> {
        if self.current >= self.entries.len() {
            return None;
        }
        self.current += 1;
        if self.mark_beyond_current && self.current == self.mark {
            self.mark_beyond_current = false;
        }
        self.entries.get(self.current - 1)
    }

    /// Remember the current position as the saved state.
    pub fn set_mark(&mut self) {
        self.mark = self.current;
        self.mark_valid = true;
        self.mark_beyond_current = false;
    }

    #[must_use]
    pub fn is_at_mark(&self) -> bool {
        self.mark_valid && self.mark == self.current
    }

    /// Most recently recorded entry, if it is also the most recently applied.
    pub fn tail_mut(&mut self) -> Option<&mut UndoEntry> {
        if self.current == self.entries.len() {
            self.entries.last_mut()
        } else {
            None
        }
    }

    #[must_use]
    pub fn tail(&self) -> Option<&UndoEntry> {
        if self.current == self.entries.len() {
            self.entries.last()
        } else {
            None
        }
    }

    /// Total number of entries, including the redo branch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the done/redo boundary.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn entries(&self) -> &[UndoEntry] {
        &self.entries
    }
}
