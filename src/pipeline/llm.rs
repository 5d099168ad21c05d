//! Assistant stages: terms, term explanations, comprehensive explanation.
//!
//! All prompt wording lives in [`crate::prompts`] and all tolerance for
//! malformed answers lives in [`crate::pipeline::parse`]; this module only
//! sequences the calls and decides what a failure costs.
//!
//! ## Degradation
//!
//! | failure                          | effect                                   |
//! |----------------------------------|------------------------------------------|
//! | connection / auth                | fatal [`DecoderError::Connection`]       |
//! | tool timeout (comprehensive)     | one retry without the lookup tool, no repositories |
//! | tool timeout, incomplete, API    | stage warning, placeholders              |
//! | unparsable answer                | stage warning, placeholders              |
//!
//! Stages run strictly in sequence; each waits for the previous one.

use crate::assistant::{AssistantClient, AssistantResponse};
use crate::error::{AssistantError, DecoderError, Stage, StageWarning, WarningKind};
use crate::output::Repository;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::parse::{parse_comprehensive, parse_explanations, parse_terms, Parsed};
use crate::progress::ProgressCallback;
use crate::prompts::{
    build_comprehensive_prompt, build_explanation_prompt, build_fallback_comprehensive_prompt,
    build_term_extraction_prompt,
};
use crate::tools::ToolKind;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of an unparsable answer quoted in its warning.
const RAW_EXCERPT_CHARS: usize = 120;

/// What the assistant stages produced for the analysed chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub terms: Vec<String>,
    pub explanations: BTreeMap<String, String>,
    pub repositories: Vec<Repository>,
    pub comprehensive_explanation: String,
    pub warnings: Vec<StageWarning>,
    pub assistant_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Assistant calls a run over `chunks` chunks makes when nothing degrades.
pub fn planned_calls(chunks: usize) -> usize {
    2 * chunks + 1
}

/// Run the three stages over `chunks`.
pub async fn run_stages(
    client: &AssistantClient,
    chunks: &[Chunk<'_>],
    max_terms: usize,
    progress: &ProgressCallback,
) -> Result<StageOutput, DecoderError> {
    let start = Instant::now();
    let mut run = StageRun {
        client,
        progress,
        out: StageOutput::default(),
    };

    progress.on_run_start(planned_calls(chunks.len()));

    // 1. Terms from every chunk, merged in order of first appearance.
    let mut seen = HashSet::new();
    for chunk in chunks {
        for term in run.extract_terms(chunk, max_terms).await? {
            if seen.insert(term.to_lowercase()) {
                run.out.terms.push(term);
            }
        }
    }
    run.out.terms.truncate(max_terms);
    info!("Identified {} technical terms", run.out.terms.len());

    // 2. One call explains every term.
    if run.out.terms.is_empty() {
        debug!("No terms to explain; skipping term explanation");
    } else {
        let terms = run.out.terms.clone();
        run.out.explanations = run.explain_terms(&terms).await?;
    }

    // 3. Comprehensive explanation and repositories per chunk.
    let mut parts = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let (explanation, repositories) = run.comprehensive(chunk).await?;
        if !explanation.trim().is_empty() {
            parts.push(explanation);
        }
        run.out.repositories.extend(repositories);
    }
    run.out.comprehensive_explanation = parts.join("\n\n");

    let mut out = run.out;
    out.duration_ms = start.elapsed().as_millis() as u64;
    progress.on_run_complete(out.assistant_calls, out.warnings.len());
    Ok(out)
}

struct StageRun<'a> {
    client: &'a AssistantClient,
    progress: &'a ProgressCallback,
    out: StageOutput,
}

impl StageRun<'_> {
    async fn extract_terms(&mut self, chunk: &Chunk<'_>, max_terms: usize) -> Result<Vec<String>, DecoderError> {
        let stage = Stage::TermExtraction;
        self.progress.on_stage_start(stage, chunk.index);
        let prompt = build_term_extraction_prompt(chunk.text, max_terms);
        let terms = match self.call(stage, chunk.index, prompt, &[ToolKind::WebSearch]).await? {
            Some(resp) => match parse_terms(&resp.text) {
                Parsed::Json(terms) | Parsed::Heuristic(terms) => terms,
                Parsed::Unparsed(u) => {
                    self.parse_warning(stage, chunk.index, &u.reason, &u.raw);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.progress.on_stage_complete(stage, chunk.index);
        Ok(terms)
    }

    async fn explain_terms(&mut self, terms: &[String]) -> Result<BTreeMap<String, String>, DecoderError> {
        let stage = Stage::TermExplanation;
        self.progress.on_stage_start(stage, 0);
        let prompt = build_explanation_prompt(terms);
        let explanations = match self.call(stage, 0, prompt, &[ToolKind::WebSearch]).await? {
            Some(resp) => match parse_explanations(&resp.text, terms) {
                Parsed::Json(map) | Parsed::Heuristic(map) => {
                    if map.len() < terms.len() {
                        debug!("Explanations cover {}/{} terms", map.len(), terms.len());
                    }
                    map
                }
                Parsed::Unparsed(u) => {
                    self.parse_warning(stage, 0, &u.reason, &u.raw);
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };
        self.progress.on_stage_complete(stage, 0);
        Ok(explanations)
    }

    /// The comprehensive call for one chunk. A lookup-tool timeout costs the
    /// repositories, not the explanation: the call is repeated once with web
    /// search only. Without a lookup tool configured, the web-search-only
    /// prompt is used from the start.
    async fn comprehensive(&mut self, chunk: &Chunk<'_>) -> Result<(String, Vec<Repository>), DecoderError> {
        let stage = Stage::Comprehensive;
        self.progress.on_stage_start(stage, chunk.index);

        if !self.client.tools().has(ToolKind::RemoteLookup) {
            debug!("Chunk {}: no lookup tool configured; skipping repository search", chunk.index);
            let request = self.client.request(
                stage,
                chunk.index,
                build_fallback_comprehensive_prompt(chunk.text),
                &[ToolKind::WebSearch],
            );
            let result = match self.send(&request).await {
                Ok(resp) => self.read_comprehensive(chunk.index, &resp, false),
                Err(e) => {
                    self.degrade(stage, chunk.index, e)?;
                    (String::new(), Vec::new())
                }
            };
            self.progress.on_stage_complete(stage, chunk.index);
            return Ok(result);
        }

        let request = self.client.request(
            stage,
            chunk.index,
            build_comprehensive_prompt(chunk.text),
            &[ToolKind::RemoteLookup, ToolKind::WebSearch],
        );
        let result = match self.send(&request).await {
            Ok(resp) => self.read_comprehensive(chunk.index, &resp, true),
            Err(e @ AssistantError::ToolTimeout { .. }) => {
                self.record(StageWarning::from_assistant(stage, chunk.index, &e));
                info!("Chunk {}: retrying comprehensive explanation without repository lookup", chunk.index);
                let fallback = self.client.request(
                    stage,
                    chunk.index,
                    build_fallback_comprehensive_prompt(chunk.text),
                    &[ToolKind::WebSearch],
                );
                match self.send(&fallback).await {
                    Ok(resp) => self.read_comprehensive(chunk.index, &resp, false),
                    Err(e) => {
                        self.degrade(stage, chunk.index, e)?;
                        (String::new(), Vec::new())
                    }
                }
            }
            Err(e) => {
                self.degrade(stage, chunk.index, e)?;
                (String::new(), Vec::new())
            }
        };

        self.progress.on_stage_complete(stage, chunk.index);
        Ok(result)
    }

    fn read_comprehensive(
        &mut self,
        chunk_index: usize,
        resp: &AssistantResponse,
        keep_repositories: bool,
    ) -> (String, Vec<Repository>) {
        match parse_comprehensive(&resp.text) {
            Parsed::Json(c) | Parsed::Heuristic(c) => {
                let repositories = if keep_repositories {
                    c.repositories
                } else {
                    Vec::new()
                };
                (c.explanation, repositories)
            }
            Parsed::Unparsed(u) => {
                self.parse_warning(Stage::Comprehensive, chunk_index, &u.reason, &u.raw);
                (String::new(), Vec::new())
            }
        }
    }

    /// One call with recoverable failures turned into warnings (`None`).
    async fn call(
        &mut self,
        stage: Stage,
        chunk_index: usize,
        prompt: String,
        tools: &[ToolKind],
    ) -> Result<Option<AssistantResponse>, DecoderError> {
        let request = self.client.request(stage, chunk_index, prompt, tools);
        match self.send(&request).await {
            Ok(resp) => Ok(Some(resp)),
            Err(e) => {
                self.degrade(stage, chunk_index, e)?;
                Ok(None)
            }
        }
    }

    async fn send(&mut self, request: &crate::assistant::AssistantRequest) -> Result<AssistantResponse, AssistantError> {
        info!("Chunk {}: {}", request.chunk_index, request.stage);
        self.out.assistant_calls += 1;
        let resp = self.client.run(request).await?;
        self.out.input_tokens += resp.input_tokens;
        self.out.output_tokens += resp.output_tokens;
        Ok(resp)
    }

    /// Escalate fatal errors; record everything else as a warning.
    fn degrade(&mut self, stage: Stage, chunk_index: usize, err: AssistantError) -> Result<(), DecoderError> {
        if err.is_fatal() {
            return Err(DecoderError::Connection {
                stage,
                chunk: chunk_index,
                source: err,
            });
        }
        self.record(StageWarning::from_assistant(stage, chunk_index, &err));
        Ok(())
    }

    fn parse_warning(&mut self, stage: Stage, chunk_index: usize, reason: &str, raw: &str) {
        let excerpt: String = raw.chars().take(RAW_EXCERPT_CHARS).collect();
        self.record(StageWarning::new(
            stage,
            chunk_index,
            WarningKind::ParseError,
            format!("{reason}; response began: {excerpt:?}"),
        ));
    }

    fn record(&mut self, warning: StageWarning) {
        warn!("{}", warning);
        self.progress
            .on_stage_warning(warning.stage, warning.chunk_index, &warning.detail);
        self.out.warnings.push(warning);
    }
}
