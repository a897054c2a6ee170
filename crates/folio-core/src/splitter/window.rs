use std::ops::Range;

/// Separators tried, in order, when looking for a natural break.
const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

/// Byte ranges of fixed-size character windows over `text`.
///
/// Each window holds at most `size` characters. A window that does not reach
/// the end of the text is shortened to the last paragraph, line or word break
/// found in its back half. Consecutive windows share up to `overlap`
/// characters, and together the ranges cover the whole text. The shared part
/// starts at a word boundary when the overlap holds one.
pub fn window_ranges(text: &str, size: usize, overlap: usize) -> Vec<Range<usize>> {
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let n = bounds.len() - 1;
    if n == 0 {
        return Vec::new();
    }
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let mut ranges = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;
    loop {
        let hard_end = (start + size).min(n);
        let lo = (start + size / 2).max(prev_end + 1);
        let end = if hard_end == n { n } else { natural_break(text, &bounds, lo, hard_end) };
        ranges.push(bounds[start]..bounds[end]);
        prev_end = end;
        if end == n {
            break;
        }
        let next = word_start(text, &bounds, end.saturating_sub(overlap), end);
        start = if next > start { next } else { end };
    }
    ranges
}

/// Char index in `lo..=hard_end` at which to end a window.
fn natural_break(text: &str, bounds: &[usize], lo: usize, hard_end: usize) -> usize {
    if lo >= hard_end {
        return hard_end;
    }
    let haystack = &text[bounds[lo]..bounds[hard_end]];
    for sep in SEPARATORS {
        if let Some(pos) = haystack.rfind(sep) {
            let byte_end = bounds[lo] + pos + sep.len();
            if let Ok(idx) = bounds.binary_search(&byte_end) {
                return idx;
            }
        }
    }
    hard_end
}

/// First char index in `from..=to` that begins a word.
fn word_start(text: &str, bounds: &[usize], from: usize, to: usize) -> usize {
    if from == 0 || text[..bounds[from]].ends_with([' ', '\n']) {
        return from;
    }
    text[bounds[from]..bounds[to]]
        .find([' ', '\n'])
        .and_then(|pos| bounds.binary_search(&(bounds[from] + pos + 1)).ok())
        .unwrap_or(from)
}
