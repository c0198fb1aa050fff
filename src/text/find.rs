//! Search collaborators for [`Document::find`](super::Document::find).
//!
//! The document walks lines and hands each one to a [`Finder`]; everything
//! about what constitutes a match (literal text, regular expressions, case
//! folding, word boundaries) lives behind that trait.

use crate::error::Result;

use bitflags::bitflags;
use regex::{Regex, RegexBuilder};

bitflags! {
    /// Search options.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FindFlags: u8 {
        /// Search towards the start of the document.
        const BACKWARD = 1 << 0;
        /// Ignore case.
        const ICASE = 1 << 1;
        /// The pattern is a regular expression.
        const REGEX = 1 << 2;
        /// Continue from the other end when the document end is reached.
        const WRAP = 1 << 3;
        /// Only match whole words.
        const WHOLE_WORD = 1 << 4;
        /// A replacement text is configured.
        const REPLACEMENT_VALID = 1 << 5;
    }
}

/// Search window on input, match range on output.
///
/// On entry, a forward search looks for the first match starting at or after
/// `start` and ending at or before `end`. A reverse search looks for the last
/// match ending at or before `start` and starting at or after `end`. Bounds
/// past the end of the haystack mean "the end of the line". On a successful
/// match both fields hold the byte range of the match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindResult {
    pub start: usize,
    pub end: usize,
}

impl FindResult {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Window bounds as `(low, high)`, clamped to `len`.
    fn window(&self, len: usize, reverse: bool) -> (usize, usize) {
        let (low, high) = if reverse {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        };
        (low.min(len), high.min(len))
    }
}

/// Matches a pattern against single lines.
pub trait Finder {
    /// Search `haystack` inside the window described by `result` and store
    /// the match range there. Returns `false` if nothing matched.
    fn match_text(&mut self, haystack: &str, result: &mut FindResult, reverse: bool) -> bool;

    /// Text to substitute for the most recent match in `haystack`.
    fn replacement(&self, haystack: &str) -> String;

    fn flags(&self) -> FindFlags;
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether a word starts or ends at byte offset `pos`.
fn is_word_boundary(haystack: &str, pos: usize) -> bool {
    let before = haystack[..pos].chars().next_back().is_some_and(is_word_char);
    let after = haystack[pos..].chars().next().is_some_and(is_word_char);
    before != after
}

/// Plain-text finder.
///
/// With [`FindFlags::ICASE`], characters are compared after simple
/// lowercase mapping.
#[derive(Clone, Debug)]
pub struct LiteralFinder {
    needle: String,
    flags: FindFlags,
    replacement: Option<String>,
}

impl LiteralFinder {
    #[must_use]
    pub fn new(needle: &str, flags: FindFlags) -> Self {
        Self {
            needle: needle.to_string(),
            flags: flags - FindFlags::REGEX - FindFlags::REPLACEMENT_VALID,
            replacement: None,
        }
    }

    /// Configure the text used by [`Finder::replacement`].
    #[must_use]
    pub fn with_replacement(mut self, replacement: &str) -> Self {
        self.replacement = Some(replacement.to_string());
        self.flags |= FindFlags::REPLACEMENT_VALID;
        self
    }

    /// Length of the match of the needle at `pos`, if any.
    fn match_at(&self, haystack: &str, pos: usize) -> Option<usize> {
        if !self.flags.contains(FindFlags::ICASE) {
            return haystack[pos..]
                .starts_with(self.needle.as_str())
                .then_some(self.needle.len());
        }
        let mut rest = haystack[pos..].char_indices();
        for n in self.needle.chars() {
            let (_, h) = rest.next()?;
            if !h.to_lowercase().eq(n.to_lowercase()) {
                return None;
            }
        }
        Some(rest.next().map_or(haystack.len() - pos, |(offset, _)| offset))
    }

    fn accept(&self, haystack: &str, start: usize, end: usize) -> bool {
        !self.flags.contains(FindFlags::WHOLE_WORD)
            || (is_word_boundary(haystack, start) && is_word_boundary(haystack, end))
    }
}

impl Finder for LiteralFinder {
    fn match_text(&mut self, haystack: &str, result: &mut FindResult, reverse: bool) -> bool {
        if self.needle.is_empty() {
            return false;
        }
        let (low, high) = result.window(haystack.len(), reverse);
        let candidates = haystack
            .char_indices()
            .map(|(pos, _)| pos)
            .filter(|&pos| pos >= low && pos < high);

        let mut found = None;
        for pos in candidates {
            let Some(len) = self.match_at(haystack, pos) else {
                continue;
            };
            if pos + len > high || !self.accept(haystack, pos, pos + len) {
                continue;
            }
            found = Some((pos, pos + len));
            if !reverse {
                break;
            }
        }

        found.is_some_and(|(start, end)| {
            *result = FindResult::new(start, end);
            true
        })
    }

    fn replacement(&self, _haystack: &str) -> String {
        self.replacement.clone().unwrap_or_default()
    }

    fn flags(&self) -> FindFlags {
        self.flags
    }
}

/// Regular-expression finder backed by the `regex` crate.
///
/// The replacement may refer to capture groups as `$1` or `${name}`.
#[derive(Clone, Debug)]
pub struct RegexFinder {
    regex: Regex,
    flags: FindFlags,
    replacement: Option<String>,
    last_match: Option<usize>,
}

impl RegexFinder {
    /// Compile `pattern`. [`FindFlags::ICASE`] and [`FindFlags::WHOLE_WORD`]
    /// are folded into the compiled expression.
    pub fn new(pattern: &str, flags: FindFlags) -> Result<Self> {
        let source = if flags.contains(FindFlags::WHOLE_WORD) {
            format!(r"\b(?:{pattern})\b")
        } else {
            pattern.to_string()
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(flags.contains(FindFlags::ICASE))
            .build()?;
        Ok(Self {
            regex,
            flags: (flags | FindFlags::REGEX) - FindFlags::REPLACEMENT_VALID,
            replacement: None,
            last_match: None,
        })
    }

    /// Configure the replacement template.
    #[must_use]
    pub fn with_replacement(mut self, replacement: &str) -> Self {
        self.replacement = Some(replacement.to_string());
        self.flags |= FindFlags::REPLACEMENT_VALID;
        self
    }
}

impl Finder for RegexFinder {
    fn match_text(&mut self, haystack: &str, result: &mut FindResult, reverse: bool) -> bool {
        let (low, high) = result.window(haystack.len(), reverse);
        // Try every start position so a match overlapping `low` cannot hide
        // one that begins inside the window.
        let mut found = None;
        let mut pos = low;
        while pos < high {
            let Some(m) = self.regex.find_at(haystack, pos) else {
                break;
            };
            if m.start() >= high {
                break;
            }
            if !m.is_empty() && m.end() <= high {
                found = Some((m.start(), m.end()));
                if !reverse {
                    break;
                }
            }
            pos = haystack[m.start()..]
                .chars()
                .next()
                .map_or(high, |c| m.start() + c.len_utf8());
        }
        self.last_match = found.map(|(start, _)| start);
        found.is_some_and(|(start, end)| {
            *result = FindResult::new(start, end);
            true
        })
    }

    fn replacement(&self, haystack: &str) -> String {
        let template = self.replacement.as_deref().unwrap_or_default();
        let captures = self
            .last_match
            .filter(|&start| start <= haystack.len())
            .and_then(|start| self.regex.captures_at(haystack, start));
        match captures {
            Some(captures) => {
                let mut expanded = String::new();
                captures.expand(template, &mut expanded);
                expanded
            }
            None => template.to_string(),
        }
    }

    fn flags(&self) -> FindFlags {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward(finder: &mut dyn Finder, haystack: &str, from: usize) -> Option<(usize, usize)> {
        let mut result = FindResult::new(from, usize::MAX);
        finder
            .match_text(haystack, &mut result, false)
            .then_some((result.start, result.end))
    }

    fn backward(finder: &mut dyn Finder, haystack: &str, before: usize) -> Option<(usize, usize)> {
        let mut result = FindResult::new(before, 0);
        finder
            .match_text(haystack, &mut result, true)
            .then_some((result.start, result.end))
    }

    #[test]
    fn test_literal_forward_and_backward() {
        let mut finder = LiteralFinder::new("ab", FindFlags::empty());
        assert_eq!(forward(&mut finder, "xabyab", 0), Some((1, 3)));
        assert_eq!(forward(&mut finder, "xabyab", 2), Some((4, 6)));
        assert_eq!(forward(&mut finder, "xabyab", 5), None);
        assert_eq!(backward(&mut finder, "xabyab", 6), Some((4, 6)));
        assert_eq!(backward(&mut finder, "xabyab", 5), Some((1, 3)));
        assert_eq!(backward(&mut finder, "xabyab", 2), None);
    }

    #[test]
    fn test_literal_icase() {
        let mut finder = LiteralFinder::new("straße", FindFlags::ICASE);
        assert_eq!(forward(&mut finder, "Die STRAßE", 0), Some((4, 11)));
    }

    #[test]
    fn test_literal_whole_word() {
        let mut finder = LiteralFinder::new("cat", FindFlags::WHOLE_WORD);
        assert_eq!(forward(&mut finder, "concat cat_ cat.", 0), Some((12, 15)));
    }

    #[test]
    fn test_literal_replacement_flag() {
        let finder = LiteralFinder::new("a", FindFlags::REPLACEMENT_VALID);
        assert!(!finder.flags().contains(FindFlags::REPLACEMENT_VALID));
        let finder = finder.with_replacement("b");
        assert!(finder.flags().contains(FindFlags::REPLACEMENT_VALID));
        assert_eq!(finder.replacement("a"), "b");
    }

    #[test]
    fn test_regex_captures_in_replacement() {
        let mut finder = RegexFinder::new(r"(\w+)@(\w+)", FindFlags::empty())
            .unwrap()
            .with_replacement("$2 at $1");
        let line = "mail bob@example now";
        assert_eq!(forward(&mut finder, line, 0), Some((5, 16)));
        assert_eq!(finder.replacement(line), "example at bob");
        assert!(finder.flags().contains(FindFlags::REGEX));
    }

    #[test]
    fn test_regex_flags() {
        let mut finder = RegexFinder::new("word", FindFlags::ICASE | FindFlags::WHOLE_WORD).unwrap();
        assert_eq!(forward(&mut finder, "swordfish WORD", 0), Some((10, 14)));
        assert_eq!(backward(&mut finder, "Word word", 9), Some((5, 9)));
    }

    #[test]
    fn test_regex_overlapping_match_at_window_start() {
        let mut regex = RegexFinder::new("aa", FindFlags::empty()).unwrap();
        let mut literal = LiteralFinder::new("aa", FindFlags::empty());
        assert_eq!(forward(&mut regex, "aaa", 1), Some((1, 3)));
        assert_eq!(forward(&mut literal, "aaa", 1), Some((1, 3)));
        assert_eq!(backward(&mut regex, "aaa", 3), Some((1, 3)));
        assert_eq!(backward(&mut regex, "aaa", 2), Some((0, 2)));
    }

    #[test]
    fn test_regex_invalid_pattern() {
        assert!(RegexFinder::new("(", FindFlags::empty()).is_err());
    }
}
