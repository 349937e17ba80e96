//! Character-window text chunker with overlap.
//!
//! Splits extracted document text into windows of at most `chunk_chars`
//! characters, breaking at whitespace where possible and carrying
//! `overlap_chars` of trailing context into the next window so answers that
//! straddle a boundary stay retrievable.

/// Split `text` into overlapping chunks. Empty or whitespace-only input
/// yields no chunks.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    debug_assert!(chunk_chars > 0);
    debug_assert!(overlap_chars < chunk_chars);

    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= chunk_chars {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + chunk_chars).min(chars.len());
        let end = if hard_end < chars.len() {
            // Prefer a whitespace break inside the window, but never collapse
            // the window to nothing.
            match chars[start..hard_end].iter().rposition(|c| c.is_whitespace()) {
                Some(pos) if pos > 0 => start + pos,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end == chars.len() {
            break;
        }
        // Step back for overlap, but always make forward progress.
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    chunks
}
