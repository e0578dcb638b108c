use once_cell::sync::Lazy;
use regex::Regex;

/// Reasoning blocks some vision models emit before the answer.
static REASONING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strip reasoning blocks, trim every line and drop the blank ones.
pub fn clean_response(raw: &str) -> String {
    REASONING_BLOCK
        .replace_all(raw, "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
