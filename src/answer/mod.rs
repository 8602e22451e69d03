//! Retrieval and answer chain
//!
//! The question path: reformulate a history-dependent question into a
//! standalone query, embed it, retrieve the closest chunks, and generate a
//! structured answer whose claims cite the sources they came from. Every
//! step degrades gracefully: no retrieval means an honest "not enough
//! grounding" answer, a generation failure means an apology instead of a
//! stack trace.

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::llm::{
    Generator, PromptTemplate, SOURCE_CLOSE, SOURCE_OPEN_PREFIX, SOURCE_OPEN_SUFFIX,
};
use crate::store::{SearchHit, VectorStore};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Speaker of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A generated answer plus the sources that back it
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Distinct cited sources, in order of first citation
    pub citations: Vec<String>,
    /// Chunks retrieved for the question after score filtering
    pub retrieved: usize,
}

/// The retrieval and generation chain
pub struct AnswerChain {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    min_score: f32,
}

// Tokens whose presence marks a question as history-dependent
const ANAPHORA_TOKENS: &[&str] = &[
    "it", "its", "they", "them", "those", "that", "this", "these", "their",
];
const ANAPHORA_PHRASES: &[&str] = &["what about", "how about"];

impl AnswerChain {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            top_k: config.query.top_k,
            min_score: config.query.min_score,
        }
    }

    /// Rewrite a follow-up question into a standalone query. A question that
    /// already stands alone passes through untouched, so reformulating twice
    /// is the same as reformulating once.
    pub async fn reformulate(&self, history: &[ChatTurn], question: &str) -> Result<String> {
        if history.is_empty() || !needs_reformulation(question) {
            return Ok(question.to_string());
        }

        let rendered = render_history(history);
        let rewritten = self
            .generator
            .generate(
                PromptTemplate::ContextQuery,
                &[("history", &rendered), ("question", question)],
            )
            .await?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            warn!("Reformulation returned empty output; keeping original question");
            return Ok(question.to_string());
        }
        debug!("Reformulated {:?} into {:?}", question, rewritten);
        Ok(rewritten.to_string())
    }

    /// Answer a question against the index
    pub async fn answer(&self, history: &[ChatTurn], question: &str) -> Result<Answer> {
        let standalone = self.reformulate(history, question).await?;

        let vectors = self.embedder.embed(vec![standalone.clone()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("backend returned no embedding".to_string()))?;

        let hits: Vec<SearchHit> = self
            .store
            .search(vector, self.top_k)
            .await?
            .into_iter()
            .filter(|h| h.score >= self.min_score)
            .collect();

        if hits.is_empty() {
            debug!("No grounding retrieved for {:?}", standalone);
            return Ok(Answer {
                text: no_grounding_answer(&standalone),
                citations: Vec::new(),
                retrieved: 0,
            });
        }

        let context = assemble_context(&hits);
        let example_source = hits[0].payload.source.as_str();
        let known_sources: HashSet<&str> =
            hits.iter().map(|h| h.payload.source.as_str()).collect();

        let generated = match self
            .generator
            .generate(
                PromptTemplate::ResponseTemplate,
                &[
                    ("context", &context),
                    ("question", &standalone),
                    ("example_source", example_source),
                ],
            )
            .await
        {
            Ok(text) => text,
            Err(e @ (Error::Generation(_) | Error::GenerationTimeout(_) | Error::Http(_))) => {
                warn!("Generation failed: {}", e);
                return Ok(Answer {
                    text: generation_failure_answer(),
                    citations: Vec::new(),
                    retrieved: hits.len(),
                });
            }
            Err(e) => return Err(e),
        };

        let (text, citations) = post_process(&generated, &known_sources);
        Ok(Answer {
            text,
            citations,
            retrieved: hits.len(),
        })
    }
}

/// Wrap each retrieved chunk in its source delimiters
fn assemble_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| {
            format!(
                "{}{}{}\n{}\n{}",
                SOURCE_OPEN_PREFIX, h.payload.source, SOURCE_OPEN_SUFFIX, h.payload.text, SOURCE_CLOSE
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A question needs reformulation when it leans on earlier turns
fn needs_reformulation(question: &str) -> bool {
    let lower = question.to_lowercase();
    if ANAPHORA_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| ANAPHORA_TOKENS.contains(&word))
}

/// Clean up the generated answer and extract its citations.
///
/// - Delimiter markers that leaked into the output are stripped.
/// - Citations are validated against the retrieved sources; fabricated ones
///   are dropped from the citation list.
/// - The References section is rebuilt so each cited source appears exactly
///   once.
fn post_process(generated: &str, known_sources: &HashSet<&str>) -> (String, Vec<String>) {
    let mut text = strip_source_markers(generated);

    let citation_re = match Regex::new(r"\[([^\[\]]+)\]") {
        Ok(re) => re,
        Err(_) => return (text, Vec::new()),
    };

    let mut citations: Vec<String> = Vec::new();
    for capture in citation_re.captures_iter(&text) {
        let name = capture[1].trim();
        if known_sources.contains(name) && !citations.iter().any(|c| c == name) {
            citations.push(name.to_string());
        }
    }

    // Replace whatever the model wrote under "References" with a canonical
    // list, one line per distinct cited source.
    if let Some(pos) = find_references_heading(&text) {
        text.truncate(pos);
        text = text.trim_end().to_string();
    }
    if !citations.is_empty() {
        text.push_str("\n\nReferences:\n");
        for source in &citations {
            text.push_str(&format!("- {}\n", source));
        }
        text = text.trim_end().to_string();
    }

    (text, citations)
}

fn strip_source_markers(text: &str) -> String {
    let without_open = match Regex::new(r"<<<SOURCE:[^>]*>>>") {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    };
    without_open.replace(SOURCE_CLOSE, "").trim().to_string()
}

fn find_references_heading(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches(['#', '*', ' ']);
        if trimmed.eq_ignore_ascii_case("references")
            || trimmed.eq_ignore_ascii_case("references:")
        {
            return Some(offset);
        }
        offset += line.len() + 1;
    }
    None
}

fn no_grounding_answer(question: &str) -> String {
    format!(
        "I could not find anything in the knowledge base that addresses \"{}\". \
This answer would not be grounded in indexed sources, so rather than guess, \
I recommend ingesting material that covers this topic and asking again.",
        question
    )
}

fn generation_failure_answer() -> String {
    "I found relevant material for your question, but the answer could not be \
generated right now. Please try again in a moment."
        .to_string()
}
