//! Prompt text and normalisation of model output.

use std::fmt::Write as _;

pub(crate) fn summary_prompt(level: u32, is_root: bool) -> String {
    let scope = if is_root {
        "the whole judgment"
    } else {
        "this part of the judgment"
    };
    format!(
        "Summarize {scope} from the numbered passages in the context (summary level {level}). \
         Keep the parties, the legal questions, the reasoning and the operative ruling. \
         Use only what the passages state. Reply with the summary text only."
    )
}

pub(crate) fn answer_prompt(query: &str) -> String {
    format!(
        "Answer the question using only the numbered evidence in the context. \
         Cite evidence by its number in square brackets, e.g. [2]. \
         If the evidence does not answer the question, say so.\n\nQuestion: {query}"
    )
}

/// `[1] first\n\n[2] second ...`
pub(crate) fn numbered_context<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for (i, text) in texts.into_iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "[{}] {}", i + 1, text.trim());
    }
    out
}

/// Drop a wrapping Markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // a language tag occupies the rest of the opening line
    match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim().contains(' ') => body.trim(),
        _ => inner.trim(),
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Summary text as stored in the index: fence stripped, whitespace
/// collapsed, bounded length. May be empty.
pub fn normalize_summary(raw: &str, max_chars: usize) -> String {
    let collapsed = strip_code_fence(raw).split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// Answer text: fence stripped and trimmed, line structure kept.
pub fn normalize_answer(raw: &str) -> String {
    strip_code_fence(raw).to_string()
}

/// First sentence of each passage, joined and bounded. Built only from the
/// passages themselves.
pub fn extractive_summary<'a>(texts: impl IntoIterator<Item = &'a str>, max_chars: usize) -> String {
    let sentences: Vec<String> = texts
        .into_iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .map(|t| match t.find(". ") {
            Some(end) => t[..=end].to_string(),
            None => t,
        })
        .collect();
    truncate_chars(&sentences.join(" "), max_chars)
}
