use unicode_segmentation::UnicodeSegmentation;

/// Splits document text into bounded, overlapping spans.
///
/// Lengths are counted in extended grapheme clusters. A chunk ends on the last
/// whitespace of its second half when there is one, so words are rarely cut.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `overlap` is clamped below `size`; a zero `size` is treated as 1.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let graphemes = text.graphemes(true).collect::<Vec<_>>();
        let n = graphemes.len();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < n {
            let mut end = (start + self.size).min(n);
            if end < n {
                let floor = start + self.size / 2;
                if let Some(ws) = (floor..end)
                    .rev()
                    .find(|&i| graphemes[i].chars().all(char::is_whitespace))
                {
                    end = ws + 1;
                }
            }
            let chunk = graphemes[start..end].concat();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_owned());
            }
            if end == n {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }
        chunks
    }
}
