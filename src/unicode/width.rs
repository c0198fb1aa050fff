//! Display width and character classification.
//!
//! This is the pluggable codepoint service used by [`LineBuffer`]: the width
//! method is a process-wide setting, everything else is derived from the
//! codepoint on demand.
//!
//! [`LineBuffer`]: crate::text::LineBuffer

use std::sync::atomic::{AtomicU8, Ordering};
use unicode_width::UnicodeWidthChar;

/// Width calculation method for ambiguous-width characters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WidthMethod {
    /// POSIX-like wcwidth: ambiguous width = 1.
    #[default]
    WcWidth,
    /// Unicode East Asian Width: ambiguous width = 2.
    Unicode,
}

const WIDTH_METHOD_WCWIDTH: u8 = 0;
const WIDTH_METHOD_UNICODE: u8 = 1;

static WIDTH_METHOD: AtomicU8 = AtomicU8::new(WIDTH_METHOD_WCWIDTH);

/// Letters used to render C0 control characters as `^X`.
pub const CONTROL_MAP: &[u8; 32] = b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_";

/// Character class used by word motion and line wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharClass {
    Whitespace,
    Alnum,
    Graphic,
    Other,
}

/// Set the global width method.
///
/// Wrap tables computed under the previous method are not updated; callers
/// should rewrap after changing it.
pub fn set_width_method(method: WidthMethod) {
    let value = match method {
        WidthMethod::WcWidth => WIDTH_METHOD_WCWIDTH,
        WidthMethod::Unicode => WIDTH_METHOD_UNICODE,
    };
    WIDTH_METHOD.store(value, Ordering::Relaxed);
}

/// Get the global width method.
#[must_use]
pub fn width_method() -> WidthMethod {
    match WIDTH_METHOD.load(Ordering::Relaxed) {
        WIDTH_METHOD_UNICODE => WidthMethod::Unicode,
        _ => WidthMethod::WcWidth,
    }
}

/// Number of terminal cells a character occupies in a text line.
///
/// - C0 control characters other than tab take two cells (`^X`).
/// - Tab reports one cell; tab expansion is the caller's business.
/// - Combining and other zero-width characters take no cells.
/// - Other characters without a defined width (DEL, C1 controls) take one
///   cell and are drawn as a placeholder.
#[inline]
#[must_use]
pub fn char_width(c: char) -> usize {
    // Fast path: ASCII printable characters are always width 1
    if (' '..='~').contains(&c) {
        return 1;
    }
    if c == '\t' {
        return 1;
    }
    if c < ' ' {
        return 2;
    }
    if c.is_control() {
        return 1;
    }
    char_width_with_method(c, width_method())
}

/// Width of a character using a specific method, ignoring the control rules.
#[must_use]
pub fn char_width_with_method(c: char, method: WidthMethod) -> usize {
    let width = match method {
        WidthMethod::WcWidth => UnicodeWidthChar::width(c),
        WidthMethod::Unicode => UnicodeWidthChar::width_cjk(c),
    };
    width.unwrap_or(1)
}

/// Check if a character occupies no cells (combining marks and the like).
#[must_use]
pub fn is_zero_width(c: char) -> bool {
    char_width(c) == 0
}

/// Visible, non-space character. Combining marks count as graphic.
#[must_use]
pub fn is_graph(c: char) -> bool {
    !c.is_whitespace() && !c.is_control()
}

/// Printable: graphic or white space.
#[must_use]
pub fn is_print(c: char) -> bool {
    is_graph(c) || (c.is_whitespace() && !c.is_control()) || c == '\t'
}

/// Classify a character for word motion.
#[must_use]
pub fn char_class(c: char) -> CharClass {
    if c.is_whitespace() {
        CharClass::Whitespace
    } else if c.is_alphanumeric() {
        CharClass::Alnum
    } else if is_graph(c) {
        CharClass::Graphic
    } else {
        CharClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_width() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(char_width(' '), 1);
        assert_eq!(char_width('~'), 1);
    }

    #[test]
    fn test_control_width() {
        assert_eq!(char_width('\u{1}'), 2);
        assert_eq!(char_width('\u{1b}'), 2);
        assert_eq!(char_width('\t'), 1);
        assert_eq!(char_width('\u{7f}'), 1);
    }

    #[test]
    fn test_cjk_width() {
        assert_eq!(char_width('漢'), 2);
        assert_eq!(char_width('a'), 1);
    }

    #[test]
    fn test_zero_width() {
        assert!(is_zero_width('\u{0301}'));
        assert!(!is_zero_width('e'));
    }

    #[test]
    fn test_width_methods() {
        // Circled digit one is ambiguous width
        let ch = '①';
        assert_eq!(char_width_with_method(ch, WidthMethod::WcWidth), 1);
        assert_eq!(char_width_with_method(ch, WidthMethod::Unicode), 2);
    }

    #[test]
    fn test_char_classes() {
        assert_eq!(char_class(' '), CharClass::Whitespace);
        assert_eq!(char_class('\t'), CharClass::Whitespace);
        assert_eq!(char_class('x'), CharClass::Alnum);
        assert_eq!(char_class('7'), CharClass::Alnum);
        assert_eq!(char_class('é'), CharClass::Alnum);
        assert_eq!(char_class('.'), CharClass::Graphic);
        assert_eq!(char_class('\u{1}'), CharClass::Other);
    }

    #[test]
    fn test_print_and_graph() {
        assert!(is_graph('a'));
        assert!(is_graph('\u{0301}'));
        assert!(!is_graph(' '));
        assert!(is_print(' '));
        assert!(!is_print('\u{1}'));
        assert!(!is_print('\u{85}'));
    }

    #[test]
    fn test_control_map() {
        assert_eq!(CONTROL_MAP[1], b'A');
        assert_eq!(CONTROL_MAP[0], b'@');
        assert_eq!(CONTROL_MAP[27], b'[');
    }
}
