/// Longest thread title kept before the ellipsis is appended
pub const TITLE_MAX_CHARS: usize = 39;

/// Thread title for a first prompt: unchanged when short, else its first 39 chars plus `...`
pub fn truncate_title(prompt: &str) -> String {
    if prompt.chars().count() <= TITLE_MAX_CHARS {
        return prompt.to_string();
    }
    let mut title: String = prompt.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}
