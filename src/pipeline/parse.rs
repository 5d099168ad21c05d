//! Response parsing: turn assistant text into structured values.
//!
//! Models are asked for JSON but routinely wrap it in a code fence, put a
//! sentence in front of it, or ignore the instruction and answer in prose.
//! Every entry point here applies the same ladder:
//!
//! 1. strict JSON (after stripping one outer code fence)
//! 2. the first JSON value embedded in prose that has the expected shape
//! 3. a line-based heuristic for the shape (bullet lists, `term: text`
//!    pairs, `owner/repo` mentions)
//! 4. [`Parsed::Unparsed`] carrying the raw text unchanged
//!
//! Nothing here panics or returns an error; the pipeline logs unparsed
//! results as warnings and carries on with placeholders.

use crate::output::Repository;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Longest string accepted as a technical term.
const MAX_TERM_CHARS: usize = 100;

/// Outcome of parsing one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// The response (or a JSON value inside it) had the requested shape.
    Json(T),
    /// No usable JSON; the value was recovered from the text layout.
    Heuristic(T),
    /// Nothing could be recovered.
    Unparsed(Unparsed),
}

/// Raw text that could not be interpreted, preserved byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unparsed {
    pub raw: String,
    pub reason: String,
}

impl<T> Parsed<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Parsed::Json(v) | Parsed::Heuristic(v) => Some(v),
            Parsed::Unparsed(_) => None,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, Parsed::Unparsed(_))
    }

    /// Short label for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Parsed::Json(_) => "json",
            Parsed::Heuristic(_) => "heuristic",
            Parsed::Unparsed(_) => "unparsed",
        }
    }

    fn unparsed(raw: &str, reason: impl Into<String>) -> Self {
        Parsed::Unparsed(Unparsed {
            raw: raw.to_string(),
            reason: reason.into(),
        })
    }
}

/// The comprehensive-explanation call's structured answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comprehensive {
    pub explanation: String,
    pub repositories: Vec<Repository>,
}

// ── Terms ────────────────────────────────────────────────────────────────

/// Parse a list of technical terms, in the order given.
pub fn parse_terms(raw: &str) -> Parsed<Vec<String>> {
    if let Some(terms) = json_candidates(raw).find_map(|v| terms_from_value(&v)) {
        return Parsed::Json(terms);
    }
    if let Some(terms) = terms_from_lines(raw) {
        return Parsed::Heuristic(terms);
    }
    Parsed::unparsed(raw, "no JSON array or list of terms found")
}

fn terms_from_value(value: &Value) -> Option<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => ["terms", "technical_terms"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(Value::as_array)?,
        _ => return None,
    };
    let terms = items.iter().filter_map(|item| match item {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => ["term", "name"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_str),
        _ => None,
    });
    non_empty(dedup_terms(terms, json_term))
}

static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+(.+?)\s*$").unwrap());

static RE_BOLD_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*(.+?)\*\*").unwrap());

fn terms_from_lines(raw: &str) -> Option<Vec<String>> {
    let listed: Vec<String> = raw
        .lines()
        .filter_map(|line| RE_LIST_ITEM.captures(line))
        .map(|caps| term_head(&caps[1]))
        .collect();
    if let Some(terms) = non_empty(dedup_terms(listed.iter().map(String::as_str), clean_term)) {
        return Some(terms);
    }

    // A bare comma-separated line: "MDP, Q-learning, policy gradient".
    let text = strip_code_fence(raw).trim();
    if text.contains('\n') || text.matches(',').count() < 1 {
        return None;
    }
    let lower = text.to_lowercase();
    if NOT_A_LIST_CUES.iter().any(|cue| lower.contains(cue)) {
        return None;
    }
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.iter().any(|p| {
        p.split_whitespace().count() > 5
            || !p.chars().any(char::is_alphabetic)
            || p.ends_with(['!', '?'])
    }) {
        return None;
    }
    non_empty(dedup_terms(parts.into_iter(), clean_term))
}

/// Phrases that mark a one-line answer as a sentence rather than a list.
const NOT_A_LIST_CUES: &[&str] = &[
    "sorry",
    "apolog",
    "unable",
    "cannot",
    "can't",
    "could not",
    "couldn't",
    "no terms",
    "no technical terms",
    "not able",
    "as an ai",
];

/// The term part of a list item such as `**Term**: explanation`.
fn term_head(item: &str) -> String {
    if let Some(caps) = RE_BOLD_LEAD.captures(item) {
        return caps[1].to_string();
    }
    for sep in [": ", " — ", " – ", " - "] {
        if let Some((head, _)) = item.split_once(sep) {
            return head.to_string();
        }
    }
    item.to_string()
}

/// A term as the model spelled it in JSON: only surrounding whitespace goes.
fn json_term(term: &str) -> Option<String> {
    let t = term.trim();
    if t.is_empty() || t.chars().count() > MAX_TERM_CHARS {
        None
    } else {
        Some(t.to_string())
    }
}

/// A term lifted from prose, with list and markdown decoration removed.
fn clean_term(term: &str) -> Option<String> {
    let t = term
        .trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .trim_matches(['"', '\'', '`', '*', '_'])
        .trim();
    if t.is_empty() || t.chars().count() > MAX_TERM_CHARS {
        None
    } else {
        Some(t.to_string())
    }
}

fn dedup_terms<'a>(
    terms: impl Iterator<Item = &'a str>,
    accept: fn(&str) -> Option<String>,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    terms
        .filter_map(accept)
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

// ── Explanations ─────────────────────────────────────────────────────────

/// Parse a term → explanation mapping. Only the requested `terms` are kept,
/// spelled as requested; explanations for anything else are dropped.
pub fn parse_explanations(raw: &str, terms: &[String]) -> Parsed<BTreeMap<String, String>> {
    if terms.is_empty() {
        return Parsed::unparsed(raw, "no terms were requested");
    }
    if let Some(map) = json_candidates(raw).find_map(|v| explanations_from_value(&v, terms)) {
        return Parsed::Json(map);
    }
    if let Some(map) = explanations_from_lines(raw, terms) {
        return Parsed::Heuristic(map);
    }
    Parsed::unparsed(raw, "no explanation found for any requested term")
}

fn explanations_from_value(value: &Value, terms: &[String]) -> Option<BTreeMap<String, String>> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("explanations") {
                return explanations_from_value(inner, terms);
            }
            for (key, v) in map {
                if let Some(text) = explanation_text(v) {
                    pairs.push((key.clone(), text));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let Some(obj) = item.as_object() else { continue };
                let key = ["term", "name"]
                    .iter()
                    .find_map(|k| obj.get(*k))
                    .and_then(Value::as_str);
                let text = ["explanation", "definition", "description"]
                    .iter()
                    .find_map(|k| obj.get(*k))
                    .and_then(explanation_text);
                if let (Some(key), Some(text)) = (key, text) {
                    pairs.push((key.to_string(), text));
                }
            }
        }
        _ => return None,
    }

    let mut out = BTreeMap::new();
    for (key, text) in pairs {
        if let Some(term) = match_term(&key, terms) {
            out.entry(term.to_string()).or_insert(text);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn explanation_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => ["explanation", "definition", "description"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_str)?,
        _ => return None,
    };
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// The requested term `key` refers to, compared case-insensitively.
fn match_term<'a>(key: &str, terms: &'a [String]) -> Option<&'a str> {
    let key = clean_term(key)?.to_lowercase();
    terms
        .iter()
        .find(|t| t.to_lowercase() == key)
        .map(String::as_str)
}

static RE_LINE_DECORATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:#{1,6}\s+|[-*•+]\s+|\d{1,3}[.)]\s+)?").unwrap());

fn explanations_from_lines(raw: &str, terms: &[String]) -> Option<BTreeMap<String, String>> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<(&str, Vec<String>)> = None;

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((term, rest)) = line_starts_entry(line, terms) {
            flush_entry(current.take(), &mut out);
            let mut parts = Vec::new();
            if !rest.is_empty() {
                parts.push(rest);
            }
            current = Some((term, parts));
        } else if let Some((_, parts)) = current.as_mut() {
            parts.push(line.trim().to_string());
        }
    }
    flush_entry(current.take(), &mut out);

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn flush_entry(entry: Option<(&str, Vec<String>)>, out: &mut BTreeMap<String, String>) {
    if let Some((term, parts)) = entry {
        let text = parts.join(" ").trim().to_string();
        if !text.is_empty() {
            out.entry(term.to_string()).or_insert(text);
        }
    }
}

/// If `line` opens an entry for one of `terms` — `Term: text`,
/// `**Term** - text`, `### Term` — return the term and the text after the
/// separator.
fn line_starts_entry<'a>(line: &str, terms: &'a [String]) -> Option<(&'a str, String)> {
    let body = RE_LINE_DECORATION.replace(line, "");
    let body = body.trim();
    let lower = body.to_lowercase();
    // Longest term first so "policy gradient theorem" wins over "policy gradient".
    let mut ordered: Vec<&String> = terms.iter().collect();
    ordered.sort_by_key(|t| std::cmp::Reverse(t.len()));

    for term in ordered {
        let t = term.to_lowercase();
        for lead in ["**", "`", "\"", ""] {
            let Some(after_lead) = lower.strip_prefix(lead) else { continue };
            let Some(after_term) = after_lead.strip_prefix(t.as_str()) else { continue };
            let after_close = after_term.strip_prefix(lead).unwrap_or(after_term);
            let rest_trimmed = after_close.trim_start_matches(['*', '`', '"']).trim_start();
            if rest_trimmed.is_empty() {
                return Some((term.as_str(), String::new()));
            }
            let offset = lower.len() - rest_trimmed.len();
            // A hyphen only separates when spaced: "RL - text", not "RL-based".
            let spaced = after_close.starts_with(char::is_whitespace);
            for sep in [':', '—', '–', '-'] {
                if sep == '-' && !(spaced && rest_trimmed.starts_with("- ")) {
                    continue;
                }
                if rest_trimmed.starts_with(sep) {
                    // Byte offsets come from the lowercased line; fall back to
                    // it when case folding changed the length.
                    let start = offset + sep.len_utf8();
                    let tail = if body.len() == lower.len() {
                        body.get(start..).unwrap_or(&lower[start..])
                    } else {
                        &lower[start..]
                    };
                    let rest = tail.trim_start_matches(['*', ' ']).trim().to_string();
                    return Some((term.as_str(), rest));
                }
            }
        }
    }
    None
}

// ── Comprehensive explanation ────────────────────────────────────────────

/// Parse the comprehensive answer: explanation text plus repositories.
pub fn parse_comprehensive(raw: &str) -> Parsed<Comprehensive> {
    if let Some(c) = json_candidates(raw).find_map(|v| comprehensive_from_value(&v)) {
        return Parsed::Json(c);
    }
    let text = strip_code_fence(raw).trim();
    if text.is_empty() {
        return Parsed::unparsed(raw, "empty response");
    }
    Parsed::Heuristic(Comprehensive {
        explanation: text.to_string(),
        repositories: repositories_from_text(text),
    })
}

fn comprehensive_from_value(value: &Value) -> Option<Comprehensive> {
    let obj = value.as_object()?;
    let explanation = ["explanation", "comprehensive_explanation", "summary"]
        .iter()
        .find_map(|k| obj.get(*k))
        .map(|v| value_text(v).unwrap_or_default());
    let repos = ["repositories", "repos"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_array);
    if explanation.is_none() && repos.is_none() {
        return None;
    }
    let repositories = repos
        .map(|items| items.iter().filter_map(repository_from_value).collect())
        .unwrap_or_default();
    Some(Comprehensive {
        explanation: explanation.unwrap_or_default(),
        repositories: dedup_repositories(repositories),
    })
}

/// Readable text for a JSON value: strings as-is, arrays line by line,
/// objects as their values in paragraphs.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .values()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n\n"),
    };
    (!text.is_empty()).then_some(text)
}

fn repository_from_value(value: &Value) -> Option<Repository> {
    match value {
        Value::String(s) => repository_from_entry(s).or_else(|| {
            let name = s.trim();
            (!name.is_empty()).then(|| Repository {
                name: name.to_string(),
                description: String::new(),
            })
        }),
        Value::Object(obj) => {
            let name = ["name", "full_name", "repository", "repo"]
                .iter()
                .find_map(|k| obj.get(*k))
                .and_then(Value::as_str)
                .map(normalise_repo_name)?;
            if name.is_empty() {
                return None;
            }
            let description = ["description", "reason", "why", "relevance"]
                .iter()
                .find_map(|k| obj.get(*k))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            Some(Repository { name, description })
        }
        _ => None,
    }
}

static RE_GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)").unwrap()
});

static RE_LISTED_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+(?P<mark>[*`\[]*)(?P<name>[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)[*`\]]*(?:\([^)]*\))?\s*(?:[:—–-]\s*(?P<desc>.*))?$",
    )
    .unwrap()
});

static RE_REPO_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*[*`\[]*(?P<name>[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)[*`\]]*(?:\([^)]*\))?\s*(?:[:—–-]\s*(?P<desc>.*))?$",
    )
    .unwrap()
});

/// A repository string from a JSON list: `owner/repo - description`.
fn repository_from_entry(entry: &str) -> Option<Repository> {
    match RE_REPO_ENTRY.captures(entry) {
        Some(caps) => repository_from_captures(&caps),
        None => repository_from_line(entry, true),
    }
}

fn repository_from_captures(caps: &regex::Captures<'_>) -> Option<Repository> {
    let name = normalise_repo_name(&caps["name"]);
    let description = caps
        .name("desc")
        .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
        .unwrap_or_default();
    (!name.is_empty()).then_some(Repository { name, description })
}

/// A repository mentioned on one line of prose: a list item naming
/// `owner/repo`, or any GitHub URL.
///
/// Outside a repositories section a listed name only counts when it is
/// marked up (`**owner/repo**`, `` `owner/repo` ``, `[owner/repo]`), so
/// items such as `- TCP/IP: ...` stay prose.
fn repository_from_line(line: &str, in_repo_section: bool) -> Option<Repository> {
    if let Some(caps) = RE_LISTED_REPO.captures(line) {
        if in_repo_section || !caps["mark"].is_empty() {
            return repository_from_captures(&caps);
        }
    }
    if let Some(m) = RE_GITHUB_URL.captures(line) {
        let name = normalise_repo_name(&m[1]);
        let whole = m.get(0).map(|m| m.as_str()).unwrap_or_default();
        let description = line
            .replace(whole, "")
            .trim()
            .trim_start_matches(['-', '*', '•', '+', ':', '—', '–', '(', ')', '[', ']', ' '])
            .trim()
            .to_string();
        return (!name.is_empty()).then_some(Repository { name, description });
    }
    None
}

fn repositories_from_text(text: &str) -> Vec<Repository> {
    let mut in_section = false;
    let mut repos = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !RE_LIST_ITEM.is_match(line) {
            let lower = line.to_lowercase();
            in_section = lower.contains("repositor") || lower.contains("github");
        }
        repos.extend(repository_from_line(line, in_section));
    }
    dedup_repositories(repos)
}

fn normalise_repo_name(name: &str) -> String {
    name.trim()
        .trim_end_matches(['.', ',', ')'])
        .trim_end_matches(".git")
        .to_string()
}

pub(crate) fn dedup_repositories(repos: Vec<Repository>) -> Vec<Repository> {
    let mut seen = std::collections::HashSet::new();
    repos
        .into_iter()
        .filter(|r| !r.name.is_empty() && seen.insert(r.name.to_lowercase()))
        .collect()
}

// ── JSON discovery ───────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```$").unwrap());

/// Remove one code fence wrapping the whole response.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// Strict parse of the (unfenced) response, then every JSON array or
/// object that starts somewhere inside it, in order of appearance.
fn json_candidates(raw: &str) -> impl Iterator<Item = Value> + '_ {
    let body = strip_code_fence(raw);
    let strict = serde_json::from_str::<Value>(body).ok();
    let embedded = body
        .char_indices()
        .filter(|(_, c)| *c == '[' || *c == '{')
        .filter_map(move |(i, _)| {
            serde_json::Deserializer::from_str(&body[i..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        });
    strict.into_iter().chain(embedded)
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five() -> Vec<String> {
        ["reinforcement learning", "Markov decision process", "policy gradient", "Q-learning", "reward shaping"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn terms_table() {
        let expected = five();
        let json = serde_json::to_string(&expected).unwrap();
        let cases: Vec<(&str, String, &str)> = vec![
            ("strict json", json.clone(), "json"),
            ("fenced json", format!("```json\n{json}\n```"), "json"),
            ("json in prose", format!("Here are the terms you asked for:\n{json}\nLet me know if you need more."), "json"),
            ("json after citation brackets", format!("See [1] and [2]. Terms: {json}"), "json"),
            ("object wrapper", format!("{{\"terms\": {json}}}"), "json"),
            (
                "bulleted list",
                "- reinforcement learning\n- Markov decision process\n- policy gradient\n- Q-learning\n- reward shaping".to_string(),
                "heuristic",
            ),
            (
                "numbered list with explanations",
                "1. **reinforcement learning**: learning from reward\n2. Markov decision process - a formal model\n3. policy gradient\n4) Q-learning\n5. \"reward shaping\"".to_string(),
                "heuristic",
            ),
            (
                "comma separated",
                "reinforcement learning, Markov decision process, policy gradient, Q-learning, reward shaping".to_string(),
                "heuristic",
            ),
        ];
        for (name, raw, method) in cases {
            let parsed = parse_terms(&raw);
            assert_eq!(parsed.method(), method, "{name}");
            assert_eq!(parsed.value().unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn garbage_is_unparsed_with_raw_preserved() {
        for raw in [
            "%%%###@@@ ~~~",
            "",
            "   \n  ",
            "I cannot help with that request",
            "[1, 2, 3]",
            "Sorry, no terms found.",
            "Unfortunately, I could not read the text.",
            "Hmm, what paper?",
        ] {
            match parse_terms(raw) {
                Parsed::Unparsed(u) => assert_eq!(u.raw, raw),
                other => panic!("{raw:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn json_terms_are_deduplicated_and_trimmed() {
        let parsed = parse_terms(r#"["  Q-learning ", "q-learning", "", 42, "MDP"]"#);
        assert_eq!(parsed.value().unwrap(), vec!["Q-learning", "MDP"]);
    }

    #[test]
    fn json_terms_keep_their_spelling() {
        let raw = r#"["A*", "__init__", "C#", "Node.js", "et al.", "`MDP`"]"#;
        let parsed = parse_terms(raw);
        assert_eq!(parsed.method(), "json");
        assert_eq!(
            parsed.value().unwrap(),
            vec!["A*", "__init__", "C#", "Node.js", "et al.", "`MDP`"]
        );
    }

    #[test]
    fn listed_terms_lose_markup() {
        let parsed = parse_terms("- `MDP`.\n- **Q-learning**\n- q-learning");
        assert_eq!(parsed.method(), "heuristic");
        assert_eq!(parsed.value().unwrap(), vec!["MDP", "Q-learning"]);
    }

    #[test]
    fn overlong_terms_are_dropped() {
        let long = "word ".repeat(40);
        let raw = serde_json::to_string(&vec![long.as_str(), "MDP"]).unwrap();
        assert_eq!(parse_terms(&raw).value().unwrap(), vec!["MDP"]);
    }

    #[test]
    fn explanations_table() {
        let terms = vec!["Q-learning".to_string(), "Markov decision process".to_string()];
        let cases: Vec<(&str, &str, &str)> = vec![
            (
                "strict object",
                r#"{"Q-learning": "A value-based method.", "Markov decision process": "A formal model."}"#,
                "json",
            ),
            (
                "case-insensitive keys",
                r#"{"q-learning": "A value-based method.", "MARKOV DECISION PROCESS": "A formal model."}"#,
                "json",
            ),
            (
                "array of objects in prose",
                "Sure!\n```json\n[{\"term\": \"Q-learning\", \"explanation\": \"A value-based method.\"}, {\"term\": \"Markov decision process\", \"explanation\": \"A formal model.\"}]\n```",
                "json",
            ),
            (
                "wrapped object",
                r#"{"explanations": {"Q-learning": {"explanation": "A value-based method."}, "Markov decision process": "A formal model."}}"#,
                "json",
            ),
            (
                "key value lines",
                "**Q-learning**: A value-based method.\n- Markov decision process — A formal model.",
                "heuristic",
            ),
            (
                "headings with paragraphs",
                "### Q-learning\n\nA value-based method.\n\n### Markov decision process\nA formal model.",
                "heuristic",
            ),
        ];
        for (name, raw, method) in cases {
            let parsed = parse_explanations(raw, &terms);
            assert_eq!(parsed.method(), method, "{name}");
            let map = parsed.value().unwrap();
            assert_eq!(map.get("Q-learning").map(String::as_str), Some("A value-based method."), "{name}");
            assert_eq!(map.get("Markov decision process").map(String::as_str), Some("A formal model."), "{name}");
        }
    }

    #[test]
    fn orphan_explanations_are_dropped() {
        let terms = vec!["Q-learning".to_string()];
        let raw = r#"{"Q-learning": "A method.", "SARSA": "Another method."}"#;
        let map = parse_explanations(raw, &terms).value().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Q-learning"));
    }

    #[test]
    fn prose_without_terms_is_unparsed() {
        let terms = vec!["Q-learning".to_string()];
        let raw = "I was unable to search the web right now.";
        match parse_explanations(raw, &terms) {
            Parsed::Unparsed(u) => assert_eq!(u.raw, raw),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hyphenated_words_continue_the_current_entry() {
        let terms = vec!["RL".to_string(), "Q-learning".to_string()];
        let raw = "RL: learning from reward.\nRL-based agents act in an environment.\nQ-learning - a value-based method.";
        let map = parse_explanations(raw, &terms).value().unwrap();
        assert_eq!(
            map["RL"],
            "learning from reward. RL-based agents act in an environment."
        );
        assert_eq!(map["Q-learning"], "a value-based method.");
    }

    #[test]
    fn longest_term_wins_at_line_start() {
        let terms = vec!["policy gradient".to_string(), "policy gradient theorem".to_string()];
        let raw = "policy gradient theorem: links gradients to Q-values.\npolicy gradient: optimises the policy directly.";
        let map = parse_explanations(raw, &terms).value().unwrap();
        assert_eq!(map["policy gradient theorem"], "links gradients to Q-values.");
        assert_eq!(map["policy gradient"], "optimises the policy directly.");
    }

    #[test]
    fn comprehensive_json() {
        let raw = r#"{"explanation": "The paper studies RL.", "repositories": [{"name": "openai/baselines", "description": "Reference implementations."}, {"name": "", "description": "nameless"}, "DLR-RM/stable-baselines3 - PyTorch agents", {"name": "OpenAI/Baselines"}]}"#;
        let c = parse_comprehensive(raw).value().unwrap();
        assert_eq!(c.explanation, "The paper studies RL.");
        assert_eq!(
            c.repositories,
            vec![
                Repository {
                    name: "openai/baselines".into(),
                    description: "Reference implementations.".into()
                },
                Repository {
                    name: "DLR-RM/stable-baselines3".into(),
                    description: "PyTorch agents".into()
                },
            ]
        );
    }

    #[test]
    fn structured_explanation_is_kept_as_text() {
        let raw = r#"{"explanation": {"summary": "The paper studies RL.", "impact": "Agents learn faster."}, "repositories": [{"name": "openai/gym"}]}"#;
        let parsed = parse_comprehensive(raw);
        assert_eq!(parsed.method(), "json");
        let c = parsed.value().unwrap();
        assert!(c.explanation.contains("The paper studies RL."));
        assert!(c.explanation.contains("Agents learn faster."));
        assert_eq!(c.repositories.len(), 1);

        let listed = r#"{"explanation": ["First point.", "Second point."], "repositories": []}"#;
        let c = parse_comprehensive(listed).value().unwrap();
        assert_eq!(c.explanation, "First point.\nSecond point.");
    }

    #[test]
    fn slashed_words_in_prose_are_not_repositories() {
        let raw = "The agent talks over the network.\n- TCP/IP: the transport stack\n- input/output: data flow\n- **openai/gym**: environments";
        let c = parse_comprehensive(raw).value().unwrap();
        let names: Vec<&str> = c.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["openai/gym"]);

        let sectioned = "Summary of the paper.\n\nRelevant repositories:\n- openai/baselines: reference agents";
        let c = parse_comprehensive(sectioned).value().unwrap();
        assert_eq!(c.repositories[0].name, "openai/baselines");
    }

    #[test]
    fn comprehensive_prose_extracts_repositories() {
        let raw = "The paper introduces a new agent.\n\nRelated repositories:\n- **openai/gym**: environments for RL\n- See https://github.com/google-deepmind/acme.git for agents\n1. `ray-project/ray` — distributed RL";
        let parsed = parse_comprehensive(raw);
        assert_eq!(parsed.method(), "heuristic");
        let c = parsed.value().unwrap();
        assert_eq!(c.explanation, raw.trim());
        let names: Vec<&str> = c.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["openai/gym", "google-deepmind/acme", "ray-project/ray"]);
        assert_eq!(c.repositories[0].description, "environments for RL");
    }

    #[test]
    fn empty_comprehensive_is_unparsed() {
        assert!(parse_comprehensive("  \n ").is_unparsed());
    }

    #[test]
    fn strip_fence_only_removes_outer_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("text ```x``` text"), "text ```x``` text");
    }
}
