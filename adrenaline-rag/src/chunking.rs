//! Offset-preserving text splitting for the entity-extraction service.
//!
//! The extraction service only accepts bounded input. Long notes are split
//! into [`TextChunk`]s that each remember where they start in the original
//! text, so entity spans reported per chunk can be shifted back into the
//! original offset space.
//!
//! Offsets are counted in Unicode scalar values (characters), which is what
//! the extraction service reports.

/// A slice of a longer text together with its starting character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    /// The chunk text.
    pub text: &'a str,
    /// Character offset of `text` within the original text.
    pub char_offset: usize,
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Each chunk ends just after the last `.` or whitespace character inside the
/// window; when the window contains neither, the chunk is cut at exactly
/// `max_chars`. Concatenating the chunks in order yields `text`.
///
/// Returns an empty `Vec` for empty text and a single chunk when
/// `max_chars == 0` or the text already fits.
///
/// # Example
///
/// ```rust,ignore
/// let chunks = split_for_extraction("Chest pain. Aspirin given.", 12);
/// assert_eq!(chunks[1].char_offset, 12);
/// ```
pub fn split_for_extraction(text: &str, max_chars: usize) -> Vec<TextChunk<'_>> {
    if text.is_empty() {
        return Vec::new();
    }

    // byte_at[c] is the byte index of character c; the extra entry marks the end.
    let byte_at: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if max_chars == 0 || total <= max_chars {
        return vec![TextChunk { text, char_offset: 0 }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = start + max_chars;
        if end >= total {
            chunks.push(TextChunk { text: &text[byte_at[start]..], char_offset: start });
            break;
        }

        let cut = (start..end)
            .rev()
            .find(|&i| is_break(chars[i]))
            .map(|i| i + 1)
            .unwrap_or(end);

        chunks.push(TextChunk { text: &text[byte_at[start]..byte_at[cut]], char_offset: start });
        start = cut;
    }

    chunks
}

fn is_break(c: char) -> bool {
    c == '.' || c.is_whitespace()
}
