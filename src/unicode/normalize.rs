//! Unicode normalization helpers.

use unicode_normalization::{IsNormalized, is_nfc_quick};

/// Check whether a cursor-stop cluster may be drawn badly by a terminal.
///
/// Terminals compose poorly; a cluster that is not already in NFC (a base
/// followed by a combining mark that has a precomposed form, say) is flagged
/// so the painter can highlight it.
#[must_use]
pub fn is_bad_draw(cluster: &str) -> bool {
    is_nfc_quick(cluster.chars()) != IsNormalized::Yes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_draw_for_decomposed_cluster() {
        assert!(is_bad_draw("e\u{0301}"));
    }

    #[test]
    fn plain_text_draws_fine() {
        assert!(!is_bad_draw("a"));
        assert!(!is_bad_draw("é"));
        assert!(!is_bad_draw("漢"));
    }
}
