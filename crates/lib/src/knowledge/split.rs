/// Characters per chunk.
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 200;

/// Split text into overlapping windows of at most `chunk_size` characters.
///
/// A window that does not reach the end of the text is cut back to the last paragraph
/// break, line break or space in its second half, when there is one. Chunks are trimmed;
/// whitespace-only chunks are dropped.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size / 2);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            if let Some(cut) = break_point(&chars[start..end]) {
                if cut > chunk_size / 2 {
                    end = start + cut;
                }
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

/// Offset just past the preferred separator in `window`.
fn break_point(window: &[char]) -> Option<usize> {
    let paragraph = window
        .windows(2)
        .rposition(|w| w[0] == '\n' && w[1] == '\n')
        .map(|i| i + 2);
    paragraph
        .or_else(|| window.iter().rposition(|c| *c == '\n').map(|i| i + 1))
        .or_else(|| window.iter().rposition(|c| c.is_whitespace()).map(|i| i + 1))
}
