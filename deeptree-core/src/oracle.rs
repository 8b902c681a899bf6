//! Oracle capabilities: the text-generation and web-search collaborators.
//!
//! The core never talks to a network directly. Components receive an
//! `Arc<dyn TextGenerator>` and an `Arc<dyn WebSearch>` at construction and
//! treat every `Err` or empty reply as a recoverable failure.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Trait for text-generation services.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, OracleError>;

    /// Return the model name, for logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// A single web-search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page or document text (may be long).
    pub content: String,
    /// Short excerpt.
    pub snippet: String,
}

/// Trait for web-search services.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search for `query`, returning at most `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, OracleError>;
}

/// Generate text and collapse every failure mode into `None`.
///
/// Whitespace-only replies count as failures.
pub(crate) async fn generate_text(
    generator: &dyn TextGenerator,
    prompt: &str,
    temperature: f32,
    max_tokens: usize,
) -> Option<String> {
    match generator.generate(prompt, temperature, max_tokens).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!(model = generator.model_name(), "Oracle returned empty text");
            None
        }
        Err(e) => {
            tracing::warn!(model = generator.model_name(), error = %e, "Oracle call failed");
            None
        }
    }
}

/// Search and join the hits into a single context block. `None` on failure
/// or when nothing usable came back.
pub(crate) async fn search_context(
    search: &dyn WebSearch,
    query: &str,
    max_results: usize,
) -> Option<String> {
    match search.search(query, max_results).await {
        Ok(hits) => {
            let joined = hits
                .iter()
                .take(max_results)
                .map(|h| {
                    if h.snippet.trim().is_empty() {
                        h.content.trim()
                    } else {
                        h.snippet.trim()
                    }
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if joined.is_empty() { None } else { Some(joined) }
        }
        Err(e) => {
            tracing::warn!(query, error = %e, "Web search failed");
            None
        }
    }
}

type Rule = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A scripted text generator for tests and offline runs.
///
/// Rules are tried in insertion order; the first one that returns `Some`
/// answers the prompt. Unmatched prompts get the default reply, or an
/// `Unavailable` error when no default is set.
pub struct MockTextGenerator {
    rules: Vec<Rule>,
    default_reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::new()
    }

    /// Reply with `response` whenever the prompt contains `marker`.
    pub fn on(mut self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        let marker = marker.into();
        let response = response.into();
        self.rules.push(Box::new(move |prompt: &str| {
            prompt.contains(&marker).then(|| response.clone())
        }));
        self
    }

    /// Reply used when no rule matches.
    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = Some(reply.into());
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: usize,
    ) -> Result<String, OracleError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(reply) = self.rules.iter().find_map(|rule| rule(prompt)) {
            return Ok(reply);
        }
        self.default_reply
            .clone()
            .ok_or_else(|| OracleError::Unavailable {
                message: "no scripted reply".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// A scripted web search returning the same hits for every query.
pub struct MockWebSearch {
    hits: Option<Vec<SearchHit>>,
    queries: Mutex<Vec<String>>,
}

impl MockWebSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits: Some(hits),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A search whose every call fails.
    pub fn failing() -> Self {
        Self {
            hits: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A search that answers every query with one snippet.
    pub fn with_snippet(snippet: &str) -> Self {
        Self::with_hits(vec![SearchHit {
            content: snippet.to_string(),
            snippet: snippet.to_string(),
        }])
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, OracleError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(max_results).cloned().collect()),
            None => Err(OracleError::Unavailable {
                message: "search offline".to_string(),
            }),
        }
    }
}
