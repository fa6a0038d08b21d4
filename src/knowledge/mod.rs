//! Lightweight lexical retrieval over curated source chunks.
//!
//! No embeddings: token overlap with a flow-affinity boost is enough to
//! pick citations for the advisor packet and session view.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;
use crate::session::model::Citation;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9\-]{3,}").expect("token regex"));

const LONG_TOKEN_LEN: usize = 7;
const LONG_TOKEN_BONUS: f64 = 0.5;
const FLOW_AFFINITY_BOOST: f64 = 1.3;
const SNIPPET_WIDTH: usize = 260;

/// One retrievable excerpt from a curated source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    pub chunk_id: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source_type: String,
    /// Flow ids this chunk is most relevant to.
    #[serde(default)]
    pub flows: Vec<String>,
    pub text: String,
}

#[derive(Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    chunks: Vec<SourceChunk>,
}

/// In-memory knowledge base, loaded once at startup.
pub struct KnowledgeBase {
    chunks: Vec<SourceChunk>,
}

impl KnowledgeBase {
    /// Load chunks from a JSON file. A missing file is soft: retrieval
    /// degrades to no citations.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No knowledge file; retrieval disabled");
            return Ok(Self { chunks: Vec::new() });
        }
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: KnowledgeFile =
            serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        info!(count = file.chunks.len(), "Loaded knowledge chunks");
        Ok(Self {
            chunks: file.chunks,
        })
    }

    pub fn from_chunks(chunks: Vec<SourceChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rank chunks against the query, deduplicate by source document, and
    /// return the top `top_k` as citations.
    pub fn retrieve(&self, query: &str, top_k: usize, flow_id: &str) -> Vec<Citation> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &SourceChunk)> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = score_chunk(chunk, &query_tokens, flow_id);
                (score > 0.0).then_some((score, chunk))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen_sources = BTreeSet::new();
        let mut citations = Vec::new();
        for (_, chunk) in scored {
            if !seen_sources.insert(chunk.source_id.as_str()) {
                continue;
            }
            citations.push(Citation {
                source_id: chunk.source_id.clone(),
                title: chunk.title.clone(),
                url: chunk.url.clone(),
                snippet: best_snippet(&chunk.text, &query_tokens),
            });
            if citations.len() == top_k {
                break;
            }
        }
        citations
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    TOKEN_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn score_chunk(chunk: &SourceChunk, query_tokens: &BTreeSet<String>, flow_id: &str) -> f64 {
    let chunk_tokens = tokenize(&chunk.text);
    let mut score = 0.0;
    for token in query_tokens.intersection(&chunk_tokens) {
        score += 1.0;
        if token.len() > LONG_TOKEN_LEN {
            score += LONG_TOKEN_BONUS;
        }
    }
    if score > 0.0 && chunk.flows.iter().any(|f| f == flow_id) {
        score += FLOW_AFFINITY_BOOST;
    }
    score
}

/// Window the chunk text around the longest matched query token.
fn best_snippet(text: &str, query_tokens: &BTreeSet<String>) -> String {
    let lower = text.to_lowercase();
    let mut by_length: Vec<&String> = query_tokens.iter().collect();
    by_length.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let hit = by_length
        .iter()
        .find_map(|t| lower.find(t.as_str()))
        .unwrap_or(0)
        .min(text.len());
    // Lowercasing can shift byte offsets for non-ASCII text; snap back to
    // a valid boundary in the original.
    let hit = (0..=hit)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);

    let start = text[..hit]
        .char_indices()
        .rev()
        .map(|(i, _)| i)
        .nth(SNIPPET_WIDTH / 3)
        .unwrap_or(0);
    let end = text[start..]
        .char_indices()
        .map(|(i, _)| start + i)
        .nth(SNIPPET_WIDTH)
        .unwrap_or(text.len());

    let mut snippet = text[start..end].trim().to_string();
    if start > 0 {
        snippet = format!("…{snippet}");
    }
    if end < text.len() {
        snippet.push('…');
    }
    snippet
}
