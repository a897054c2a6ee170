//! Prompt assembly and answer parsing.

use std::fmt::Write as _;

use folio_core::{Chunk, Prompt};

pub const SUMMARY_MARKER: &str = "SUMMARY:";

/// Fallback summaries are cut to this many characters.
pub const SUMMARY_MAX_CHARS: usize = 300;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that writes detailed answers from the provided context.

When asked about projects, repositories or work items, be thorough and list every instance found in the context, even minor ones. If asked to list all projects, make an exhaustive effort to identify every project name, repository or significant piece of work mentioned.

Answer only from the context. If the information truly is not in the context, say you don't know.

Your response MUST follow this format:
1. A detailed answer with all relevant information.
2. A final section titled \"SUMMARY:\" with a concise 2-3 sentence overview of the answer.";

/// Context blocks tagged with their source, followed by the question.
pub fn build_prompt(question: &str, sources: &[Chunk]) -> Prompt {
    let mut user = String::from("Context:\n");
    for chunk in sources {
        let _ = write!(user, "\n[source: {}]\n{}\n", chunk.source_path, chunk.text.trim_end());
    }
    let _ = write!(user, "\nQuestion:\n{}\n\nAnswer (be comprehensive and detailed):", question.trim());
    Prompt { system: Some(SYSTEM_INSTRUCTION.to_string()), user }
}

/// Split a model response into `(answer, summary)` at the last `SUMMARY:`
/// marker. Without a usable marker the summary is the answer's opening
/// sentences.
pub fn parse_answer(raw: &str) -> (String, String) {
    if let Some(pos) = raw.rfind(SUMMARY_MARKER) {
        let answer = raw[..pos].trim_end().trim_end_matches(['*', '#']).trim_end().to_string();
        let summary = raw[pos + SUMMARY_MARKER.len()..].trim_start_matches('*').trim().to_string();
        if !summary.is_empty() {
            let answer = if answer.is_empty() { summary.clone() } else { answer };
            return (answer, summary);
        }
        let summary = summarize(&answer, SUMMARY_MAX_CHARS);
        return (answer, summary);
    }
    let answer = raw.trim().to_string();
    let summary = summarize(&answer, SUMMARY_MAX_CHARS);
    (answer, summary)
}

/// Leading whole sentences of `text` within `max_chars`, or a word-boundary
/// cut of the first sentence when even that is too long.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut end = 0usize;
    for (n, (i, c)) in flat.char_indices().enumerate() {
        if n >= max_chars {
            break;
        }
        if matches!(c, '.' | '!' | '?') && flat[i + 1..].starts_with(' ') {
            end = i + 1;
        }
    }
    if end > 0 {
        return flat[..end].to_string();
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > 0 => &cut[..space],
        _ => cut.as_str(),
    };
    format!("{cut}…")
}
