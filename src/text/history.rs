//! Undo and redo application.
//!
//! Each recorded [`UndoKind`] maps to the structural edits that revert it;
//! [`UndoKind::redo_kind`] names the edits that re-apply it. Entries are
//! taken out of the log while they are applied and put back afterwards.

use crate::error::Result;
use crate::event::{LogLevel, emit_log_with};
use crate::text::document::Document;
use crate::text::line::LineBuffer;
use crate::text::undo::{UndoEntry, UndoKind};
use crate::text::TextCoordinate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl Document {
    /// Revert the most recent edit, or the most recent undo group as a
    /// whole. Returns `false` when there is nothing to undo.
    pub fn apply_undo(&mut self) -> Result<bool> {
        self.close_undo_block()?;
        let Some(kind) = self.undo_log.back().map(UndoEntry::kind) else {
            return Ok(false);
        };

        if kind == UndoKind::BlockEnd {
            emit_log_with(LogLevel::Debug, || {
                format!("undo group ending at entry {}", self.undo_log.current())
            });
            loop {
                let Some(kind) = self.undo_log.back().map(UndoEntry::kind) else {
                    break;
                };
                if kind == UndoKind::BlockStart {
                    break;
                }
                self.apply_entry(self.undo_log.current(), Direction::Undo)?;
            }
        } else {
            self.apply_entry(self.undo_log.current(), Direction::Undo)?;
        }

        self.last_undo_kind = None;
        self.notify_modified();
        Ok(true)
    }

    /// Re-apply the most recently undone edit or group. Returns `false` when
    /// there is nothing to redo.
    pub fn apply_redo(&mut self) -> Result<bool> {
        self.close_undo_block()?;
        let Some(kind) = self.undo_log.forward().map(UndoEntry::kind) else {
            return Ok(false);
        };

        if kind == UndoKind::BlockStart {
            emit_log_with(LogLevel::Debug, || {
                format!("redo group starting at entry {}", self.undo_log.current() - 1)
            });
            loop {
                let Some(kind) = self.undo_log.forward().map(UndoEntry::kind) else {
                    break;
                };
                if kind == UndoKind::BlockEnd {
                    break;
                }
                self.apply_entry(self.undo_log.current() - 1, Direction::Redo)?;
            }
        } else {
            self.apply_entry(self.undo_log.current() - 1, Direction::Redo)?;
        }

        self.last_undo_kind = None;
        self.notify_modified();
        Ok(true)
    }

    /// Apply the entry at `index`, which the log cursor has just stepped
    /// over. On failure the log cursor steps back so the entry stays pending.
    fn apply_entry(&mut self, index: usize, direction: Direction) -> Result<()> {
        let placeholder = UndoEntry::new(UndoKind::BlockStart, TextCoordinate::default());
        let entry = self.undo_log.swap_entry(index, placeholder);
        let action = match direction {
            Direction::Undo => entry.kind(),
            Direction::Redo => entry.redo_kind(),
        };
        emit_log_with(LogLevel::Debug, || {
            format!(
                "{direction:?} {:?} via {action:?} at {}:{}",
                entry.kind(),
                entry.start().line,
                entry.start().pos
            )
        });

        let result = self.apply_action(action, &entry);
        self.undo_log.swap_entry(index, entry);
        if result.is_err() {
            match direction {
                Direction::Undo => self.undo_log.forward(),
                Direction::Redo => self.undo_log.back(),
            };
        }
        result
    }

    fn apply_action(&mut self, action: UndoKind, entry: &UndoEntry) -> Result<()> {
        let start = entry.start();
        let end = entry.end().unwrap_or(start);
        let low = start.min(end);

        match action {
            UndoKind::Add => {
                let end = TextCoordinate::new(start.line, start.pos + entry.text().len());
                self.delete_block_internal(start, end, None)?;
                self.cursor = start;
            }
            UndoKind::AddRedo | UndoKind::Delete => {
                self.insert_text(start, entry.text())?;
                if entry.kind() == UndoKind::Delete {
                    self.cursor = start;
                }
            }
            UndoKind::AddBlock => {
                self.delete_block_internal(start, end, None)?;
                self.cursor = low;
            }
            UndoKind::DeleteBlock => {
                self.insert_text(low, entry.text())?;
                self.cursor = end;
            }
            UndoKind::Backspace => {
                let at = TextCoordinate::new(start.line, start.pos - entry.text().len());
                self.insert_text(at, entry.text())?;
            }
            UndoKind::BackspaceRedo => {
                let at = TextCoordinate::new(start.line, start.pos - entry.text().len());
                self.delete_block_internal(at, start, None)?;
                self.cursor = at;
            }
            UndoKind::Overwrite => {
                let replaced = entry.replacement().unwrap_or_default();
                self.replace_text(start, start.pos + replaced.len(), entry.text())?;
                self.cursor = start;
            }
            UndoKind::OverwriteRedo => {
                let replacement = entry.replacement().unwrap_or_default();
                self.replace_text(start, start.pos + entry.text().len(), replacement)?;
            }
            UndoKind::ReplaceBlock => {
                let new_end = entry.new_end().unwrap_or(end);
                let restore = LineBuffer::try_from_str(entry.text())?;
                self.delete_block_internal(low, new_end, None)?;
                self.insert_block_internal(low, &restore)?;
                self.cursor = end;
            }
            UndoKind::ReplaceBlockRedo => {
                let replacement = LineBuffer::try_from_str(entry.replacement().unwrap_or_default())?;
                self.delete_block_internal(start, end, None)?;
                self.insert_block_internal(low, &replacement)?;
            }
            UndoKind::BackspaceNewline | UndoKind::DeleteNewline => {
                self.cursor = start;
                self.break_line_internal("")?;
                if entry.kind() == UndoKind::DeleteNewline {
                    self.cursor = start;
                }
            }
            UndoKind::AddNewline => {
                self.merge_internal(start.line)?;
            }
            UndoKind::AddNewlineIndent => {
                let indent_len = entry.text().len().saturating_sub(1);
                let end = TextCoordinate::new(start.line + 1, indent_len);
                self.delete_block_internal(start, end, None)?;
                self.cursor = start;
            }
            UndoKind::AddNewlineIndentRedo => {
                self.cursor = start;
                self.insert_text(start, entry.text())?;
            }
            UndoKind::Indent => {
                self.remove_indent_segments(start.line, entry.text());
            }
            UndoKind::Unindent => {
                self.insert_indent_segments(start.line, entry.text())?;
                if let Some(caret) = entry.caret() {
                    self.restore_caret(caret);
                }
            }
            UndoKind::BlockStart | UndoKind::BlockEnd => {}
        }
        Ok(())
    }

    fn insert_text(&mut self, at: TextCoordinate, text: &str) -> Result<()> {
        let block = LineBuffer::try_from_str(text)?;
        self.insert_block_internal(at, &block)
    }

    /// Replace `[at.pos, end_pos)` on `at.line` with single-line `text`.
    fn replace_text(&mut self, at: TextCoordinate, end_pos: usize, text: &str) -> Result<()> {
        let block = LineBuffer::try_from_str(text)?;
        self.delete_block_internal(at, TextCoordinate::new(at.line, end_pos), None)?;
        self.insert_block_internal(at, &block)
    }
}
