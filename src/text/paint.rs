//! Painting one (sub-)line of text onto an external cell surface.
//!
//! The surface is whatever the host draws into; it only has to accept runs
//! of text with a [`PaintAttr`] and clear to the end of the row. Tabs are
//! expanded, control characters are shown as `^X`, other non-printable
//! characters as dots, and wide characters cut by either window edge are
//! replaced by `<`/`>` markers.

use crate::text::LineBuffer;
use crate::text::line::tab_width;
use crate::unicode::CONTROL_MAP;

use bitflags::bitflags;

bitflags! {
    /// Layout flags for [`PaintInfo`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PaintFlags: u8 {
        /// This sub-line is continued on the next row; reserve the last cell
        /// for the wrap marker.
        const BREAK = 1 << 0;
        /// The sub-line ends in a character cut by the wrap point.
        const PARTIAL_CHAR = 1 << 1;
        /// Fill the rest of the row with spaces instead of clearing it.
        const SPACECLEAR = 1 << 2;
        /// Draw tabs as `^I`.
        const TAB_AS_CONTROL = 1 << 3;
        /// With `SPACECLEAR`, fill using the selected attribute.
        const EXTEND_SELECTION = 1 << 4;
    }
}

bitflags! {
    /// Attributes attached to painted runs.
    ///
    /// An empty set is normal text. How each flag looks is up to the surface.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PaintAttr: u8 {
        const SELECTED = 1 << 0;
        const CURSOR = 1 << 1;
        /// Cursor at the end of a selection.
        const SELECTION_CURSOR = 1 << 2;
        /// Cursor inside a selection.
        const SELECTION_CURSOR2 = 1 << 3;
        /// Substituted glyphs: control pictures, dots, edge markers.
        const NON_PRINT = 1 << 4;
        /// A cluster the terminal is likely to render incorrectly.
        const BAD_DRAW = 1 << 5;
    }
}

/// Glyph marking a wrapped row.
pub const WRAP_SYMBOL: char = '\u{21b5}';

const SPACES: &str = "                                ";
const DOTS: &str = "................";

/// Drawing target for [`LineBuffer::paint_line`].
pub trait PaintSurface {
    /// Draw `text` at the current position and advance past it.
    fn add_str(&mut self, text: &str, attr: PaintAttr);

    fn add_char(&mut self, c: char, attr: PaintAttr) {
        let mut buf = [0u8; 4];
        self.add_str(c.encode_utf8(&mut buf), attr);
    }

    /// Clear from the current position to the end of the row.
    fn clear_to_eol(&mut self);
}

/// What to paint and how.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaintInfo {
    /// Byte offset of the first character (non-zero for wrapped sub-lines).
    pub start: usize,
    /// First cell to draw; cells left of it are scrolled out of view.
    pub leftcol: usize,
    /// Byte offset where painting stops.
    pub max: usize,
    /// Number of cells available.
    pub size: usize,
    /// Tab stop distance; 0 forces [`PaintFlags::TAB_AS_CONTROL`].
    pub tabsize: usize,
    pub flags: PaintFlags,
    /// Selected byte range of this line, in either order.
    pub selection: Option<(usize, usize)>,
    /// Cursor byte offset, if the cursor is on this line.
    pub cursor: Option<usize>,
}

impl Default for PaintInfo {
    fn default() -> Self {
        Self {
            start: 0,
            leftcol: 0,
            max: usize::MAX,
            size: 80,
            tabsize: 8,
            flags: PaintFlags::empty(),
            selection: None,
            cursor: None,
        }
    }
}

impl PaintInfo {
    fn selection_bounds(&self) -> Option<(usize, usize)> {
        self.selection.map(|(a, b)| (a.min(b), a.max(b)))
    }

    fn is_selected(&self, pos: usize) -> bool {
        self.selection_bounds()
            .is_some_and(|(lo, hi)| pos >= lo && pos < hi)
    }
}

fn add_repeated(surface: &mut dyn PaintSurface, chunk: &str, mut count: usize, attr: PaintAttr) {
    while count > chunk.len() {
        surface.add_str(chunk, attr);
        count -= chunk.len();
    }
    if count > 0 {
        surface.add_str(&chunk[..count], attr);
    }
}

/// Characters scanned but not yet handed to the surface.
struct Run {
    from: usize,
    printable: bool,
    /// Cells the run covers.
    cells: usize,
}

impl LineBuffer {
    fn draw_attrs(&self, pos: usize, info: &PaintInfo) -> PaintAttr {
        let mut attr = if info.is_selected(pos) {
            if info.cursor == Some(pos) {
                PaintAttr::SELECTION_CURSOR2
            } else {
                PaintAttr::SELECTED
            }
        } else if info.cursor == Some(pos) {
            if info.selection.is_some_and(|(_, end)| end == pos) {
                PaintAttr::SELECTION_CURSOR
            } else {
                PaintAttr::CURSOR
            }
        } else {
            PaintAttr::empty()
        };
        if self.is_bad_draw(pos) {
            attr |= PaintAttr::BAD_DRAW;
        }
        attr
    }

    /// Hand the pending run up to `to` to the surface and account for its
    /// cells in `total`.
    fn flush_run(
        &self,
        surface: &mut dyn PaintSurface,
        run: &mut Run,
        to: usize,
        total: &mut usize,
        attr: PaintAttr,
    ) {
        if run.printable {
            if to > run.from {
                surface.add_str(&self.as_str()[run.from..to], attr);
            }
        } else {
            add_repeated(surface, DOTS, run.cells, PaintAttr::NON_PRINT | attr);
        }
        *total += run.cells;
        run.cells = 0;
    }

    fn next_char_boundary(&self, pos: usize) -> usize {
        self.char_at(pos).map_or(pos + 1, |c| pos + c.len_utf8())
    }

    /// Paint the part of the line described by `info`.
    #[allow(clippy::too_many_lines)]
    pub fn paint_line(&self, surface: &mut dyn PaintSurface, info: &PaintInfo) {
        let len = self.len();
        let mut flags = info.flags;
        if info.tabsize == 0 {
            flags |= PaintFlags::TAB_AS_CONTROL;
        }
        let tabs_expand = !flags.contains(PaintFlags::TAB_AS_CONTROL);

        let mut size = info.size + info.leftcol;
        if flags.contains(PaintFlags::BREAK) {
            if size == 0 {
                return;
            }
            size -= 1;
        }

        let mut total = 0usize;
        let mut attr = PaintAttr::empty();
        if self.starts_with_combining() && info.leftcol > 0 && info.start == 0 {
            total += 1;
        }

        // Skip the columns scrolled off to the left, drawing only the visible
        // halves of characters that straddle the edge.
        let mut i = info.start;
        while i < len && i < info.max && total < info.leftcol {
            attr = self.draw_attrs(i, info);
            let Some(c) = self.char_at(i) else {
                i += 1;
                continue;
            };
            let width = self.width_at(i);
            if c == '\t' && tabs_expand {
                total = (total + tab_width(total, info.tabsize)).min(size);
                if total > info.leftcol {
                    add_repeated(surface, SPACES, total - info.leftcol, attr);
                }
            } else if c < ' ' {
                total += 2;
                if total > info.leftcol {
                    surface.add_char(char::from(CONTROL_MAP[c as usize]), PaintAttr::NON_PRINT | attr);
                }
            } else if width > 1 {
                total += width;
                for _ in info.leftcol..total {
                    surface.add_char('<', PaintAttr::NON_PRINT | attr);
                }
            } else {
                total += width;
            }
            i += c.len_utf8();
        }

        if self.starts_with_combining() && info.leftcol == 0 && info.start == 0 {
            // Base for the leading combining mark.
            surface.add_char(' ', PaintAttr::NON_PRINT | attr);
            total += 1;
        } else {
            while i < len && i < info.max && self.width_at(i) == 0 {
                i = self.next_char_boundary(i);
            }
        }

        let mut run = Run {
            from: i,
            printable: self.is_print(i),
            cells: 0,
        };
        let mut endchars = 0;
        while i < len && i < info.max && total + run.cells < size {
            let Some(c) = self.char_at(i) else {
                i += 1;
                continue;
            };

            let new_attr = self.draw_attrs(i, info);
            if new_attr != attr {
                self.flush_run(surface, &mut run, i, &mut total, attr);
                run.from = i;
            }
            attr = new_attr;

            let printable = self.is_print(i);
            let width = self.width_at(i);
            if c == '\t' && tabs_expand {
                self.flush_run(surface, &mut run, i, &mut total, attr);
                let mut tabspaces = tab_width(total, info.tabsize).min(size - total);
                if info.cursor == Some(i) {
                    // The cursor only covers the first cell of the tab.
                    surface.add_char(' ', attr);
                    tabspaces -= 1;
                    total += 1;
                    attr = if info.is_selected(i) {
                        PaintAttr::SELECTED
                    } else {
                        PaintAttr::empty()
                    };
                }
                add_repeated(surface, SPACES, tabspaces, attr);
                total += tabspaces;
                run.from = i + 1;
            } else if c < ' ' {
                self.flush_run(surface, &mut run, i, &mut total, attr);
                surface.add_char('^', PaintAttr::NON_PRINT | attr);
                total += 2;
                if total <= size {
                    surface.add_char(char::from(CONTROL_MAP[c as usize]), PaintAttr::NON_PRINT | attr);
                }
                run.from = i + 1;
            } else if printable != run.printable {
                self.flush_run(surface, &mut run, i, &mut total, attr);
                run.cells = width;
                run.from = i;
            } else {
                // Double-width characters crossing the right edge.
                if total + run.cells + width > size {
                    endchars = size - total - run.cells;
                    break;
                }
                run.cells += width;
            }
            run.printable = printable;
            i += c.len_utf8();
        }

        // Trailing combining marks belong with the last character drawn.
        while i < len && i < info.max && self.width_at(i) == 0 {
            i = self.next_char_boundary(i);
        }
        self.flush_run(surface, &mut run, i, &mut total, attr);

        if flags.contains(PaintFlags::PARTIAL_CHAR) && i >= info.max {
            endchars = 1;
        }
        for _ in 0..endchars {
            surface.add_char('>', PaintAttr::NON_PRINT | attr);
        }
        total += endchars;

        // A cell after the text for the cursor, or to show that the
        // selection continues onto the next line.
        if total < size && !flags.contains(PaintFlags::BREAK) {
            let selection_continues = info.selection_bounds().is_some_and(|(_, hi)| i <= hi);
            if selection_continues || info.cursor == Some(i) {
                surface.add_char(' ', self.draw_attrs(i, info));
                total += 1;
            }
        }

        if flags.contains(PaintFlags::BREAK) {
            add_repeated(surface, SPACES, size.saturating_sub(total), PaintAttr::empty());
            surface.add_char(WRAP_SYMBOL, PaintAttr::NON_PRINT);
        } else if flags.contains(PaintFlags::SPACECLEAR) {
            let fill = if flags.contains(PaintFlags::EXTEND_SELECTION) {
                PaintAttr::SELECTED
            } else {
                PaintAttr::empty()
            };
            add_repeated(surface, SPACES, size.saturating_sub(total), fill);
        } else {
            surface.clear_to_eol();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records painted cells as (text, attr) pairs.
    #[derive(Default)]
    struct Recorder {
        runs: Vec<(String, PaintAttr)>,
        cleared: bool,
    }

    impl Recorder {
        fn text(&self) -> String {
            self.runs.iter().map(|(t, _)| t.as_str()).collect()
        }

        fn attr_of(&self, needle: &str) -> Option<PaintAttr> {
            self.runs
                .iter()
                .find(|(t, _)| t.contains(needle))
                .map(|(_, a)| *a)
        }
    }

    impl PaintSurface for Recorder {
        fn add_str(&mut self, text: &str, attr: PaintAttr) {
            self.runs.push((text.to_string(), attr));
        }

        fn clear_to_eol(&mut self) {
            self.cleared = true;
        }
    }

    fn paint(line: &str, info: &PaintInfo) -> Recorder {
        let mut rec = Recorder::default();
        LineBuffer::from(line).paint_line(&mut rec, info);
        rec
    }

    #[test]
    fn test_plain_text() {
        let rec = paint("hello", &PaintInfo::default());
        assert_eq!(rec.text(), "hello");
        assert!(rec.cleared);
    }

    #[test]
    fn test_tab_expansion() {
        let info = PaintInfo {
            tabsize: 4,
            ..PaintInfo::default()
        };
        assert_eq!(paint("a\tb", &info).text(), "a   b");

        let info = PaintInfo {
            tabsize: 0,
            ..PaintInfo::default()
        };
        assert_eq!(paint("a\tb", &info).text(), "a^Ib");
    }

    #[test]
    fn test_control_and_non_print() {
        let rec = paint("a\u{1}b\u{7f}", &PaintInfo::default());
        assert_eq!(rec.text(), "a^Ab.");
        assert!(rec.attr_of("^").unwrap().contains(PaintAttr::NON_PRINT));
        assert!(rec.attr_of(".").unwrap().contains(PaintAttr::NON_PRINT));
    }

    #[test]
    fn test_selection_and_cursor() {
        let info = PaintInfo {
            selection: Some((3, 1)),
            cursor: Some(1),
            ..PaintInfo::default()
        };
        let rec = paint("abcd", &info);
        assert_eq!(rec.text(), "abcd");
        assert_eq!(rec.attr_of("b"), Some(PaintAttr::SELECTION_CURSOR2));
        assert_eq!(rec.attr_of("c"), Some(PaintAttr::SELECTED));
        assert_eq!(rec.attr_of("d"), Some(PaintAttr::empty()));
    }

    #[test]
    fn test_cursor_at_end_gets_a_cell() {
        let info = PaintInfo {
            cursor: Some(2),
            ..PaintInfo::default()
        };
        let rec = paint("ab", &info);
        assert_eq!(rec.text(), "ab ");
        assert_eq!(rec.runs.last().map(|r| r.1), Some(PaintAttr::CURSOR));
    }

    #[test]
    fn test_selection_past_end_of_line() {
        let info = PaintInfo {
            selection: Some((1, usize::MAX)),
            ..PaintInfo::default()
        };
        let rec = paint("ab", &info);
        assert_eq!(rec.text(), "ab ");
        assert_eq!(rec.runs.last().map(|r| r.1), Some(PaintAttr::SELECTED));
    }

    #[test]
    fn test_wrapped_row_has_marker() {
        let info = PaintInfo {
            max: 3,
            size: 6,
            flags: PaintFlags::BREAK,
            ..PaintInfo::default()
        };
        let rec = paint("abcdef", &info);
        assert_eq!(rec.text(), format!("abc  {WRAP_SYMBOL}"));
        assert!(!rec.cleared);
    }

    #[test]
    fn test_wide_char_at_right_edge() {
        let info = PaintInfo {
            size: 3,
            ..PaintInfo::default()
        };
        assert_eq!(paint("ab漢", &info).text(), "ab>");
    }

    #[test]
    fn test_wide_char_at_left_edge() {
        let info = PaintInfo {
            leftcol: 1,
            size: 3,
            ..PaintInfo::default()
        };
        assert_eq!(paint("漢ab", &info).text(), "<ab");
    }

    #[test]
    fn test_leading_combining_gets_base() {
        let rec = paint("\u{0301}a", &PaintInfo::default());
        assert_eq!(rec.text(), " \u{0301}a");
    }

    #[test]
    fn test_spaceclear_fills_row() {
        let info = PaintInfo {
            size: 6,
            flags: PaintFlags::SPACECLEAR | PaintFlags::EXTEND_SELECTION,
            ..PaintInfo::default()
        };
        let rec = paint("ab", &info);
        assert_eq!(rec.text(), "ab    ");
        assert_eq!(rec.runs.last().map(|r| r.1), Some(PaintAttr::SELECTED));
        assert!(!rec.cleared);
    }

    #[test]
    fn test_bad_draw_attr() {
        let rec = paint("e\u{0301}", &PaintInfo::default());
        assert!(rec.attr_of("e").unwrap().contains(PaintAttr::BAD_DRAW));
    }
}
