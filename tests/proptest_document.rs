//! Property-based tests for documents, undo history and wrapping.
//!
//! Uses proptest to check laws that must hold for any edit sequence.

use proptest::prelude::*;
use textdoc::{
    Document, FindFlags, LineBuffer, LiteralFinder, RegexFinder, SelectionMode, TextCoordinate,
    WrapIndex,
};
use unicode_segmentation::UnicodeSegmentation;

// ============================================================================
// Strategies
// ============================================================================

/// Characters typed one at a time.
fn typed_char() -> impl Strategy<Value = char> + Clone {
    prop::sample::select(vec!['a', 'b', 'z', ' ', '-', '.', '_', '漢', 'é'])
}

/// Typed characters including a combining mark, which may end up at the
/// start of a line.
fn edit_char() -> impl Strategy<Value = char> + Clone {
    prop::sample::select(vec!['a', 'b', ' ', '-', '漢', '\u{0301}'])
}

/// Characters that stress wrapping: wide, combining, tabs and runs of
/// spaces.
fn wrap_char() -> impl Strategy<Value = char> + Clone {
    prop::sample::select(vec!['a', 'b', ' ', ' ', '-', '\t', '漢', '\u{0301}'])
}

/// Multi-line text without tabs.
fn block_text() -> impl Strategy<Value = String> {
    "[ab .\n-]{1,12}"
}

fn document_text() -> impl Strategy<Value = String> {
    "[a-c \n.漢]{0,40}"
}

/// Text with indentation to strip and lines that start with a combining
/// mark.
fn indented_text() -> impl Strategy<Value = String> {
    "[ab \t\n\u{0301}]{0,40}"
}

fn indent_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ \t]{1,3}")
}

#[derive(Clone, Debug)]
enum Op {
    Move(usize, usize),
    Insert(char),
    Overwrite(char),
    Delete,
    Backspace,
    Break(Option<String>),
    Merge(bool),
    InsertBlock(String),
    DeleteBlock(usize, usize, usize, usize),
    ReplaceBlock(usize, usize, usize, usize, String),
    Indent(usize, usize, bool),
    Unindent(usize, usize),
    GroupStart,
    GroupEnd,
    RegexReplace(bool),
}

fn edit_op(chars: impl Strategy<Value = char> + Clone + 'static) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..6usize, 0..24usize).prop_map(|(line, pos)| Op::Move(line, pos)),
        6 => chars.clone().prop_map(Op::Insert),
        1 => chars.prop_map(Op::Overwrite),
        2 => Just(Op::Delete),
        2 => Just(Op::Backspace),
        1 => indent_text().prop_map(Op::Break),
        1 => any::<bool>().prop_map(Op::Merge),
        1 => block_text().prop_map(Op::InsertBlock),
        1 => (0..6usize, 0..24usize, 0..6usize, 0..24usize)
            .prop_map(|(l1, p1, l2, p2)| Op::DeleteBlock(l1, p1, l2, p2)),
        1 => (0..6usize, 0..24usize, 0..6usize, 0..24usize, block_text())
            .prop_map(|(l1, p1, l2, p2, text)| Op::ReplaceBlock(l1, p1, l2, p2, text)),
        1 => (0..6usize, 0..6usize, any::<bool>())
            .prop_map(|(first, last, spaces)| Op::Indent(first, last, spaces)),
        1 => (0..6usize, 0..6usize).prop_map(|(first, last)| Op::Unindent(first, last)),
        1 => Just(Op::GroupStart),
        1 => Just(Op::GroupEnd),
        1 => any::<bool>().prop_map(Op::RegexReplace),
    ]
}

fn coord(doc: &Document, line: usize, pos: usize) -> TextCoordinate {
    TextCoordinate::new(line % doc.line_count(), pos)
}

fn apply(doc: &mut Document, op: &Op) {
    match op {
        Op::Move(line, pos) => doc.set_cursor(coord(doc, *line, *pos)),
        Op::Insert(c) => {
            doc.insert_char(*c).unwrap();
        }
        Op::Overwrite(c) => {
            doc.overwrite_char(*c).unwrap();
        }
        Op::Delete => {
            doc.delete_char().unwrap();
        }
        Op::Backspace => {
            doc.backspace_char().unwrap();
        }
        Op::Break(indent) => {
            doc.break_line(indent.as_deref()).unwrap();
        }
        Op::Merge(backspace) => {
            doc.merge(*backspace).unwrap();
        }
        Op::InsertBlock(text) => {
            doc.insert_block(text).unwrap();
        }
        Op::DeleteBlock(l1, p1, l2, p2) => {
            let (start, end) = (coord(doc, *l1, *p1), coord(doc, *l2, *p2));
            doc.delete_block(start, end).unwrap();
        }
        Op::ReplaceBlock(l1, p1, l2, p2, text) => {
            let (start, end) = (coord(doc, *l1, *p1), coord(doc, *l2, *p2));
            doc.replace_block(start, end, text).unwrap();
        }
        Op::Indent(first, last, spaces) => {
            let (start, end) = (coord(doc, *first, 0), coord(doc, *last, 1));
            doc.indent_block(start, end, 4, *spaces).unwrap();
        }
        Op::Unindent(first, last) => {
            let (start, end) = (coord(doc, *first, 0), coord(doc, *last, 1));
            doc.unindent_block(start, end, 4, false).unwrap();
        }
        Op::GroupStart => doc.start_undo_block(),
        Op::GroupEnd => doc.end_undo_block().unwrap(),
        Op::RegexReplace(reverse) => {
            let mut finder = RegexFinder::new("b+", FindFlags::WRAP)
                .unwrap()
                .with_replacement("<$0>");
            if doc.find(&mut finder, *reverse) {
                doc.replace(&finder).unwrap();
            }
        }
    }
}

fn all_breaks(wrap: &WrapIndex) -> Vec<Vec<usize>> {
    (0..wrap.line_count()).map(|line| wrap.breaks(line).to_vec()).collect()
}

/// A single user-level edit, issued from where an editor would issue it.
#[derive(Clone, Debug)]
enum Edit {
    Insert(char),
    Overwrite(char),
    Delete,
    Backspace,
    Break(Option<String>),
    JoinNext,
    JoinPrevious,
    InsertBlock(String),
    DeleteSelection,
    ReplaceSelection(String),
    IndentSelection(bool),
    UnindentSelection,
    Group(Vec<Edit>),
}

impl Edit {
    fn uses_selection(&self) -> bool {
        matches!(
            self,
            Self::DeleteSelection
                | Self::ReplaceSelection(_)
                | Self::IndentSelection(_)
                | Self::UnindentSelection
        )
    }
}

/// Edits made at the cursor without moving it first.
fn cursor_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        4 => edit_char().prop_map(Edit::Insert),
        1 => edit_char().prop_map(Edit::Overwrite),
        1 => Just(Edit::Delete),
        1 => Just(Edit::Backspace),
        1 => indent_text().prop_map(Edit::Break),
        1 => block_text().prop_map(Edit::InsertBlock),
    ]
}

fn single_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        6 => cursor_edit(),
        1 => Just(Edit::JoinNext),
        1 => Just(Edit::JoinPrevious),
        1 => Just(Edit::DeleteSelection),
        1 => "[ab .\n-]{0,12}".prop_map(Edit::ReplaceSelection),
        1 => any::<bool>().prop_map(Edit::IndentSelection),
        1 => Just(Edit::UnindentSelection),
        2 => prop::collection::vec(cursor_edit(), 1..6).prop_map(Edit::Group),
    ]
}

fn run_edit(doc: &mut Document, edit: &Edit) {
    match edit {
        Edit::Insert(c) => {
            doc.insert_char(*c).unwrap();
        }
        Edit::Overwrite(c) => {
            doc.overwrite_char(*c).unwrap();
        }
        Edit::Delete => {
            doc.delete_char().unwrap();
        }
        Edit::Backspace => {
            doc.backspace_char().unwrap();
        }
        Edit::Break(indent) => {
            doc.break_line(indent.as_deref()).unwrap();
        }
        Edit::JoinNext => {
            doc.merge(false).unwrap();
        }
        Edit::JoinPrevious => {
            doc.merge(true).unwrap();
        }
        Edit::InsertBlock(text) => {
            doc.insert_block(text).unwrap();
        }
        Edit::DeleteSelection => {
            doc.delete_selection().unwrap();
        }
        Edit::ReplaceSelection(text) => {
            doc.replace_selection(text).unwrap();
        }
        Edit::IndentSelection(spaces) => {
            let (start, end) = (doc.selection_start(), doc.selection_end());
            doc.indent_block(start, end, 4, *spaces).unwrap();
        }
        Edit::UnindentSelection => {
            let (start, end) = (doc.selection_start(), doc.selection_end());
            doc.unindent_block(start, end, 4, false).unwrap();
        }
        Edit::Group(edits) => {
            doc.start_undo_block();
            for edit in edits {
                run_edit(doc, edit);
            }
            doc.end_undo_block().unwrap();
        }
    }
}

/// Text, cursor and selection of a document.
type State = (String, TextCoordinate, TextCoordinate, TextCoordinate, SelectionMode);

fn state(doc: &Document) -> State {
    (
        doc.text(),
        doc.cursor(),
        doc.selection_start(),
        doc.selection_end(),
        doc.selection_mode(),
    )
}

// ============================================================================
// Content
// ============================================================================

proptest! {
    /// Loading text and reading it back is lossless.
    #[test]
    fn text_round_trips(text in document_text()) {
        let doc = Document::from_text(&text).unwrap();
        prop_assert_eq!(doc.text(), text.clone());
        prop_assert_eq!(doc.line_count(), text.split('\n').count());
        prop_assert!(doc.undo_log().is_empty());
    }

    /// Inserting a block and converting the same range gives the block back.
    #[test]
    fn insert_then_convert_block(text in document_text(), block in block_text(), line in 0..6usize, pos in 0..24usize) {
        let mut doc = Document::from_text(&text).unwrap();
        doc.set_cursor(coord(&doc, line, pos));
        let start = doc.cursor();
        doc.insert_block(&block).unwrap();
        let end = doc.cursor();
        prop_assert_eq!(doc.convert_block(start, end).unwrap(), Some(block));
    }
}

// ============================================================================
// Search
// ============================================================================

proptest! {
    /// A regular expression without metacharacters finds exactly what the
    /// literal finder finds, from any cursor and in either direction.
    #[test]
    fn regex_and_literal_search_agree(
        text in "[abAB \n]{0,30}",
        needle in "[ab]{1,3}",
        icase in any::<bool>(),
        whole_word in any::<bool>(),
        reverse in any::<bool>(),
        line in 0..6usize,
        pos in 0..24usize,
    ) {
        let mut flags = FindFlags::WRAP;
        flags.set(FindFlags::ICASE, icase);
        flags.set(FindFlags::WHOLE_WORD, whole_word);

        let mut by_literal = Document::from_text(&text).unwrap();
        by_literal.set_cursor(coord(&by_literal, line, pos));
        let mut by_regex = Document::from_text(&text).unwrap();
        by_regex.set_cursor(by_literal.cursor());

        let found = by_literal.find(&mut LiteralFinder::new(&needle, flags), reverse);
        let mut regex = RegexFinder::new(&needle, flags).unwrap();
        prop_assert_eq!(by_regex.find(&mut regex, reverse), found);
        if found {
            prop_assert_eq!(
                (by_regex.selection_start(), by_regex.selection_end()),
                (by_literal.selection_start(), by_literal.selection_end())
            );
        }
    }
}

// ============================================================================
// Undo history
// ============================================================================

proptest! {
    /// Undoing every step restores the original text; redoing every step
    /// restores the edited text.
    #[test]
    fn undo_is_inverse_of_edits(text in indented_text(), ops in prop::collection::vec(edit_op(edit_char()), 1..40)) {
        let mut doc = Document::from_text(&text).unwrap();
        for op in &ops {
            apply(&mut doc, op);
        }
        let edited = doc.text();

        let mut undone = 0;
        while doc.apply_undo().unwrap() {
            undone += 1;
            prop_assert!(undone <= ops.len());
        }
        prop_assert_eq!(doc.text(), text);
        prop_assert!(!doc.is_modified());

        while doc.apply_redo().unwrap() {}
        prop_assert_eq!(doc.text(), edited);
    }

    /// One edit followed by one undo restores text, cursor and selection.
    /// Deleting or replacing the selection drops it by design, so only text
    /// and cursor come back for those.
    #[test]
    fn undo_restores_cursor_and_selection(
        text in indented_text(),
        cursor in (0..6usize, 0..24usize),
        anchor in (0..6usize, 0..24usize),
        edit in single_edit(),
    ) {
        let mut doc = Document::from_text(&text).unwrap();
        doc.set_cursor(coord(&doc, cursor.0, cursor.1));
        match edit {
            Edit::JoinNext => doc.set_cursor(coord(&doc, cursor.0, usize::MAX)),
            Edit::JoinPrevious => doc.set_cursor(coord(&doc, cursor.0, 0)),
            _ if edit.uses_selection() => {
                doc.set_selection(coord(&doc, anchor.0, anchor.1), doc.cursor());
            }
            _ => {}
        }
        let before = state(&doc);

        run_edit(&mut doc, &edit);
        if doc.undo_log().is_empty() {
            return Ok(());
        }
        let after = doc.text();

        prop_assert!(doc.apply_undo().unwrap());
        let restored = state(&doc);
        if matches!(edit, Edit::DeleteSelection | Edit::ReplaceSelection(_)) {
            prop_assert_eq!((&restored.0, restored.1), (&before.0, before.1));
        } else {
            prop_assert_eq!(restored, before);
        }
        prop_assert!(!doc.apply_undo().unwrap());

        prop_assert!(doc.apply_redo().unwrap());
        prop_assert_eq!(doc.text(), after);
    }

    /// Contiguous typing forms a single undo entry.
    #[test]
    fn contiguous_typing_coalesces(chars in prop::collection::vec(typed_char(), 1..30)) {
        let mut doc = Document::new();
        for c in &chars {
            doc.insert_char(*c).unwrap();
        }
        prop_assert_eq!(doc.undo_log().len(), 1);
        prop_assert_eq!(doc.text(), chars.iter().collect::<String>());
        prop_assert!(doc.apply_undo().unwrap());
        prop_assert_eq!(doc.text(), "");
        prop_assert!(!doc.apply_undo().unwrap());
    }
}

// ============================================================================
// Wrapping
// ============================================================================

proptest! {
    /// An index kept up to date through events equals one built from scratch.
    #[test]
    fn incremental_wrap_matches_full(
        text in "[ab .\t\n-]{0,30}",
        width in 1..12usize,
        tabsize in 0..5usize,
        ops in prop::collection::vec((edit_op(wrap_char()), any::<bool>()), 1..40),
    ) {
        let mut doc = Document::from_text(&text).unwrap();
        let mut wrap = WrapIndex::new(width, tabsize);
        wrap.attach(&mut doc).unwrap();

        for (op, sync_now) in &ops {
            apply(&mut doc, op);
            if *sync_now {
                wrap.sync(&mut doc).unwrap();
            }
        }
        wrap.sync(&mut doc).unwrap();

        let mut fresh = WrapIndex::new(width, tabsize);
        fresh.attach(&mut doc).unwrap();
        prop_assert_eq!(all_breaks(&wrap), all_breaks(&fresh));
        prop_assert_eq!(wrap.size(), fresh.size());
        prop_assert_eq!(wrap.line_count(), doc.line_count());
    }

    /// Screen width never decreases as the offset moves right.
    #[test]
    fn screen_width_is_monotonic(text in "[a-z \t漢\u{0301}]{0,40}", tabsize in 0..9usize) {
        let line = LineBuffer::from(text.as_str());
        let mut previous = 0;
        let mut pos = 0;
        loop {
            let width = line.calculate_screen_width(0, pos, tabsize);
            prop_assert!(width >= previous);
            previous = width;
            if pos >= line.len() {
                break;
            }
            pos = line.adjust_position(pos, 1);
        }
    }

    /// Every break lies on a cursor stop strictly inside the line, and
    /// never inside a grapheme cluster.
    #[test]
    fn breaks_land_on_cursor_stops(text in "[ab \t.漢\u{0301}]{0,40}", width in 1..10usize) {
        let line = LineBuffer::from(text.as_str());
        let clusters: Vec<usize> = text.grapheme_indices(true).map(|(i, _)| i).collect();
        let mut start = 0;
        while let Some(brk) = line.find_next_break_pos(start, width, 8) {
            prop_assert!(brk.pos > start);
            prop_assert!(brk.pos < line.len());
            prop_assert!(line.width_at(brk.pos) > 0);
            prop_assert!(clusters.contains(&brk.pos), "break at {} splits a cluster", brk.pos);
            start = brk.pos;
        }
    }
}
