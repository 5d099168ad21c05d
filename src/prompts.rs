//! Prompt templates for the three assistant tasks.
//!
//! Every prompt lives here so that changing what the model is asked for
//! means editing exactly one place, and so tests can inspect prompts
//! without a model. Builders are pure string templating.
//!
//! Each prompt names the exact JSON shape it wants back; the parser in
//! [`crate::pipeline::parse`] still tolerates models that ignore it.

/// Characters of the chunk given to the repository search.
pub const REPOSITORY_CONTEXT_CHARS: usize = 1000;

/// Ask for a bounded JSON array of technical terms.
pub fn build_term_extraction_prompt(text: &str, max_terms: usize) -> String {
    format!(
        r#"Extract technical terms, concepts, and jargon from this research paper text that a non-expert might not understand.
Return at most {max_terms} terms, most important first.
Return ONLY a JSON array of strings with the technical terms, nothing else.
Example format: ["term1", "term2", "term3"]

Text:
{text}"#
    )
}

/// Ask for a web-search-backed explanation of every term as a JSON object.
pub fn build_explanation_prompt(terms: &[String]) -> String {
    let list = terms
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Search the web for information about each of the following technical terms and provide a clear, concise explanation suitable for a non-expert audience.

Terms:
{list}

For each term focus on:
1. A simple definition
2. Why it's important in the context of research papers
3. A practical example if applicable

Keep each explanation under 100 words.
Return ONLY a JSON object mapping each term, spelled exactly as given, to its explanation.
Example format: {{"term1": "explanation", "term2": "explanation"}}"#
    )
}

/// Ask for a full explanation plus related repositories found through the
/// documentation-lookup tool.
pub fn build_comprehensive_prompt(text: &str) -> String {
    format!(
        r#"Explain this research paper text in a clear, accessible way.

1. Summarize the main points clearly, make the content accessible to non-experts, and highlight the significance and impact of the work. Use web search for technical terms, scientific concepts, or jargon that would benefit from a detailed explanation.
2. Use the DeepWiki tools to identify relevant GitHub repositories related to the topics, technologies, or methods discussed: implementations of the methods described, related research or similar approaches, tools and libraries mentioned, and datasets or benchmarks referenced.

Focus the repository search on this excerpt:
{excerpt}

Return ONLY a JSON object of this shape:
{{"explanation": "<the full explanation>", "repositories": [{{"name": "owner/repo", "description": "why it is relevant"}}]}}

Research paper text:
{text}"#,
        excerpt = head_chars(text, REPOSITORY_CONTEXT_CHARS),
    )
}

/// The comprehensive task without the documentation-lookup tool, used when
/// that tool timed out.
pub fn build_fallback_comprehensive_prompt(text: &str) -> String {
    format!(
        r#"Explain this research paper text in a clear, accessible way.

Summarize the main points clearly, explain technical terms and jargon, make the content accessible to non-experts, and highlight the significance and impact of the work. Do not list repositories.

Return ONLY a JSON object of this shape:
{{"explanation": "<the full explanation>", "repositories": []}}

Research paper text:
{text}"#
    )
}

/// The first `n` characters of `text`, cut on a character boundary.
fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
