use ragchat_types::Citation;

/// Prompt used for grounded turns; `{{citations}}`, `{{history}}` and `{{question}}` are substituted
pub const DEFAULT_GROUNDING_TEMPLATE: &str = "\
Answer the question using only the sources below. Refer to a source by its tag, for example [doc1]. \
If the sources do not contain the answer, say that you don't know.

## Sources
{{citations}}

## Conversation so far
{{history}}

## Question
{{question}}";

const NO_SOURCES: &str = "No relevant documents were found.";
const NO_HISTORY: &str = "(none)";

/// Numbered, serialized chunks in retrieval order
pub fn format_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return NO_SOURCES.to_string();
    }

    citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[doc{}] {}\nSource: {}\n{}",
                i + 1,
                c.name,
                c.url,
                c.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitute the grounding placeholders in one pass; inserted values are never re-scanned
pub fn render_grounding_prompt(
    template: &str,
    citations: &[Citation],
    history: &str,
    question: &str,
) -> String {
    let citations = format_citations(citations);
    let history = if history.trim().is_empty() {
        NO_HISTORY
    } else {
        history
    };

    let mut out = String::with_capacity(template.len() + citations.len() + history.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        match &after[..end] {
            "citations" => out.push_str(&citations),
            "history" => out.push_str(history),
            "question" => out.push_str(question),
            other => {
                out.push_str("{{");
                out.push_str(other);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
