use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;

/// Cut `text` to `len` extended grapheme clusters, appending `...` when cut.
///
/// A length of 0 yields the empty string without an ellipsis.
pub fn truncate_ellipsis(text: &str, len: usize) -> Cow<'_, str> {
    if len == 0 {
        return Cow::Borrowed("");
    }
    match text.grapheme_indices(true).nth(len) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + 3);
            out.push_str(text[..byte_idx].trim_end());
            out.push_str("...");
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_borrowed() {
        assert!(matches!(truncate_ellipsis("chest pain", 20), Cow::Borrowed(_)));
    }

    #[test]
    fn long_text_is_cut_on_graphemes() {
        assert_eq!(truncate_ellipsis("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_ellipsis("胸痛三天", 2), "胸痛...");
        assert_eq!(truncate_ellipsis("anything", 0), "");
    }
}
