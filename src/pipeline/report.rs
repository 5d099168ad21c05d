//! Report assembly and console rendering.
//!
//! [`aggregate`] is the only constructor of [`AnalysisResult`] and the one
//! place its invariants are enforced, whatever the stages produced.
//! Neither function can fail.

use crate::error::StageWarning;
use crate::output::{
    AnalysisResult, Repository, RunStats, MISSING_COMPREHENSIVE, MISSING_EXPLANATION,
};
use crate::pipeline::parse::dedup_repositories;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

/// Characters of the first chunk kept as a preview.
pub const PREVIEW_CHARS: usize = 200;

const RULE: &str = "==================================================";

/// Everything the stages produced, before invariants are applied.
#[derive(Debug, Clone, Default)]
pub struct AggregateInput {
    pub source: String,
    /// Text of the first analysed chunk.
    pub first_chunk: String,
    pub chunks_processed: usize,
    pub terms: Vec<String>,
    pub explanations: BTreeMap<String, String>,
    pub repositories: Vec<Repository>,
    pub comprehensive_explanation: String,
    pub warnings: Vec<StageWarning>,
    pub stats: RunStats,
}

/// Build the final report.
///
/// * terms are trimmed, empty ones dropped, duplicates (case-insensitive)
///   removed keeping the first spelling
/// * every term gets an explanation: its own, or [`MISSING_EXPLANATION`];
///   explanations for anything that is not a term are dropped
/// * repositories with an empty name are dropped, duplicates removed
/// * an empty comprehensive explanation becomes [`MISSING_COMPREHENSIVE`]
pub fn aggregate(input: AggregateInput) -> AnalysisResult {
    let mut seen = HashSet::new();
    let technical_terms: Vec<String> = input
        .terms
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect();

    let explanations = technical_terms
        .iter()
        .map(|term| {
            let text = input
                .explanations
                .get(term)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(MISSING_EXPLANATION);
            (term.clone(), text.to_string())
        })
        .collect();

    let repositories = dedup_repositories(
        input
            .repositories
            .into_iter()
            .map(|r| Repository {
                name: r.name.trim().to_string(),
                description: r.description.trim().to_string(),
            })
            .collect(),
    );

    let comprehensive = input.comprehensive_explanation.trim();
    let comprehensive_explanation = if comprehensive.is_empty() {
        MISSING_COMPREHENSIVE.to_string()
    } else {
        comprehensive.to_string()
    };

    AnalysisResult {
        source: input.source,
        chunks_processed: input.chunks_processed,
        chunk_preview: preview(&input.first_chunk),
        technical_terms,
        explanations,
        repositories,
        comprehensive_explanation,
        warnings: input.warnings,
        stats: input.stats,
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render the report as console text.
///
/// The four section headers are always present; empty sections say
/// `none found`.
pub fn render(result: &AnalysisResult) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, result);
    out
}

fn write_report(out: &mut String, result: &AnalysisResult) -> std::fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "PAPER DECODER RESULTS")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Source: {}", result.source())?;
    writeln!(out, "Chunks processed: {}", result.chunks_processed())?;

    writeln!(out)?;
    writeln!(out, "TECHNICAL TERMS ({})", result.technical_terms().len())?;
    if result.technical_terms().is_empty() {
        writeln!(out, "   none found")?;
    }
    for (i, term) in result.technical_terms().iter().enumerate() {
        writeln!(out, "   {}. {}", i + 1, term)?;
    }

    writeln!(out)?;
    writeln!(out, "TERM EXPLANATIONS")?;
    if result.technical_terms().is_empty() {
        writeln!(out, "   none found")?;
    }
    for term in result.technical_terms() {
        let text = result.explanation(term).unwrap_or(MISSING_EXPLANATION);
        writeln!(out, "\n   **{term}**:")?;
        writeln!(out, "   {text}")?;
    }

    writeln!(out)?;
    writeln!(out, "RELEVANT REPOSITORIES ({})", result.repositories().len())?;
    if result.repositories().is_empty() {
        writeln!(out, "   none found")?;
    }
    for repo in result.repositories() {
        if repo.description.is_empty() {
            writeln!(out, "   - {}", repo.name)?;
        } else {
            writeln!(out, "   - {}: {}", repo.name, repo.description)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "COMPREHENSIVE EXPLANATION")?;
    writeln!(out, "{}", result.comprehensive_explanation())?;

    if !result.warnings().is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "WARNINGS ({}): this report is incomplete",
            result.warnings().len()
        )?;
        for w in result.warnings() {
            writeln!(out, "   - {w}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Stage, WarningKind};

    fn repo(name: &str, description: &str) -> Repository {
        Repository {
            name: name.into(),
            description: description.into(),
        }
    }

    fn input() -> AggregateInput {
        AggregateInput {
            source: "paper.pdf".into(),
            first_chunk: "We study reinforcement learning.".into(),
            chunks_processed: 1,
            terms: vec!["Q-learning".into(), "MDP".into()],
            explanations: BTreeMap::from([
                ("Q-learning".to_string(), "A value-based method.".to_string()),
                ("MDP".to_string(), "A formal model.".to_string()),
            ]),
            repositories: vec![repo("openai/gym", "Environments")],
            comprehensive_explanation: "The paper studies RL.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn explanation_keys_equal_terms() {
        let mut i = input();
        i.explanations.remove("MDP");
        i.explanations
            .insert("orphan".into(), "Not a requested term.".into());
        let r = aggregate(i);
        let keys: Vec<&String> = r.explanations().keys().collect();
        assert_eq!(keys, vec!["MDP", "Q-learning"]);
        assert_eq!(r.explanation("MDP"), Some(MISSING_EXPLANATION));
        assert_eq!(r.explanation("orphan"), None);
    }

    #[test]
    fn blank_and_duplicate_terms_are_dropped() {
        let mut i = input();
        i.terms = vec!["MDP".into(), "  ".into(), "mdp".into(), " Q-learning ".into()];
        let r = aggregate(i);
        assert_eq!(r.technical_terms(), ["MDP", "Q-learning"]);
        assert_eq!(r.explanation("Q-learning"), Some("A value-based method."));
    }

    #[test]
    fn repositories_are_unique_and_named() {
        let mut i = input();
        i.repositories = vec![
            repo("openai/gym", "Environments"),
            repo("  ", "nameless"),
            repo("OpenAI/Gym", "duplicate"),
            repo("ray-project/ray", ""),
        ];
        let r = aggregate(i);
        let names: Vec<&str> = r.repositories().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["openai/gym", "ray-project/ray"]);
    }

    #[test]
    fn empty_everything_still_aggregates() {
        let r = aggregate(AggregateInput::default());
        assert!(r.technical_terms().is_empty());
        assert!(r.explanations().is_empty());
        assert_eq!(r.comprehensive_explanation(), MISSING_COMPREHENSIVE);
        assert_eq!(r.chunk_preview(), "");
    }

    #[test]
    fn preview_is_truncated_with_ellipsis() {
        let mut i = input();
        i.first_chunk = "é".repeat(250);
        let r = aggregate(i);
        assert_eq!(r.chunk_preview(), format!("{}...", "é".repeat(200)));

        let mut i = input();
        i.first_chunk = "x".repeat(200);
        assert_eq!(aggregate(i).chunk_preview(), "x".repeat(200));
    }

    #[test]
    fn render_has_all_sections() {
        let text = render(&aggregate(input()));
        for header in [
            "TECHNICAL TERMS",
            "TERM EXPLANATIONS",
            "RELEVANT REPOSITORIES",
            "COMPREHENSIVE EXPLANATION",
        ] {
            assert!(text.contains(header), "missing {header}");
        }
        assert!(text.contains("   1. Q-learning"));
        assert!(text.contains("   2. MDP"));
        assert!(text.contains("   - openai/gym: Environments"));
        assert!(!text.contains("WARNINGS"));
    }

    #[test]
    fn render_empty_sections_say_none_found() {
        let text = render(&aggregate(AggregateInput::default()));
        assert_eq!(text.matches("none found").count(), 3);
        assert!(text.contains("COMPREHENSIVE EXPLANATION"));
    }

    #[test]
    fn render_lists_warnings() {
        let mut i = input();
        i.warnings.push(StageWarning::new(
            Stage::Comprehensive,
            0,
            WarningKind::ToolTimeout,
            "tool 'deepwiki' timed out",
        ));
        let r = aggregate(i);
        assert!(r.is_partial());
        let text = render(&r);
        assert!(text.contains("WARNINGS (1)"));
        assert!(text.contains("comprehensive explanation (chunk 0): tool 'deepwiki' timed out"));
    }
}
