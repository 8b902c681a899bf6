//! Root query construction (layer 0).
//!
//! Turns one short answer into a question whose unique answer it is, then
//! minimizes the question's keywords with the masking test. A candidate that
//! leaks the answer or loses every keyword is regenerated, up to the
//! configured number of attempts.

use crate::config::GenerationConfig;
use crate::keywords::{KeywordNecessityValidator, MinimizationResult, heuristic_keywords};
use crate::oracle::{TextGenerator, generate_text};
use crate::parse;
use crate::prompts;
use crate::text;
use crate::types::{CallCounts, ExtensionType, GenerationMethod, PreciseQuery, ShortAnswer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of building a root query.
#[derive(Debug, Clone)]
pub enum RootOutcome {
    /// A validated layer-0 query.
    Built(PreciseQuery),
    /// Candidates were produced but none passed validation.
    Rejected { reason: String },
    /// The oracle produced nothing usable.
    Failed { reason: String },
}

/// Everything a root build produced, for the caller to record.
#[derive(Debug, Clone)]
pub struct RootBuild {
    pub outcome: RootOutcome,
    pub attempts: usize,
    pub minimization: Option<MinimizationResult>,
    pub calls: CallCounts,
}

/// A parsed but not yet validated candidate question.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub question: String,
    pub keywords: Vec<String>,
    pub method: GenerationMethod,
}

/// Parse a question-plus-keywords reply through the degradation chain.
pub(crate) fn parse_candidate(reply: &str) -> Option<Candidate> {
    if let Some((value, _)) = parse::json_value(reply)
        && let Some(question) = parse::str_field(&value, "question")
    {
        return Some(Candidate {
            question,
            keywords: parse::string_list(&value, "keywords"),
            method: GenerationMethod::Oracle,
        });
    }

    if let Some(question) = parse::labelled_value(reply, &["question", "q"]) {
        let keywords = parse::labelled_value(reply, &["keywords", "keyword"])
            .map(|k| {
                k.split(',')
                    .map(|s| s.trim().trim_matches('"').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        return Some(Candidate {
            question,
            keywords,
            method: GenerationMethod::OracleRecovered,
        });
    }

    let single = reply.trim();
    if !single.contains('\n') && single.ends_with('?') {
        return Some(Candidate {
            question: single.to_string(),
            keywords: Vec::new(),
            method: GenerationMethod::OracleRecovered,
        });
    }
    None
}

/// Oracle keywords first, topped up from the question text, minus any that
/// contain the answer.
pub(crate) fn candidate_keywords(question: &str, listed: &[String], answer: &str) -> Vec<String> {
    let mut keywords: Vec<String> = listed
        .iter()
        .filter(|k| text::contains_phrase(question, k))
        .cloned()
        .collect();
    if keywords.len() < 2 {
        for k in heuristic_keywords(question) {
            if !keywords
                .iter()
                .any(|e| text::normalize(e) == text::normalize(&k))
            {
                keywords.push(k);
            }
        }
    }
    keywords.retain(|k| !text::contains_phrase(k, answer) && !text::contains_phrase(answer, k));
    keywords
}

/// Builds validated, minimal root queries.
pub struct RootQueryBuilder {
    generator: Arc<dyn TextGenerator>,
    keywords: Arc<KeywordNecessityValidator>,
    config: GenerationConfig,
}

impl RootQueryBuilder {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        keywords: Arc<KeywordNecessityValidator>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            generator,
            keywords,
            config,
        }
    }

    pub async fn build(&self, answer: &ShortAnswer, context: Option<&str>) -> RootBuild {
        let mut calls = CallCounts::default();
        let mut feedback: Option<String> = None;
        let mut any_candidate = false;
        let mut last_minimization = None;
        let attempts = self.config.root_attempts;

        if answer.text.trim().is_empty() {
            return RootBuild {
                outcome: RootOutcome::Rejected {
                    reason: "empty answer".to_string(),
                },
                attempts: 0,
                minimization: None,
                calls,
            };
        }

        for attempt in 1..=attempts {
            let prompt = prompts::root_query_prompt(
                &answer.text,
                answer.answer_type,
                &answer.source_span,
                context,
                feedback.as_deref(),
            );
            let reply = generate_text(
                self.generator.as_ref(),
                &prompt,
                self.config.temperature,
                self.config.max_tokens,
            )
            .await;
            calls.oracle += 1;

            let Some(candidate) = reply.as_deref().and_then(parse_candidate) else {
                warn!(answer = answer.text.as_str(), attempt, "Root generation unusable");
                continue;
            };
            any_candidate = true;

            if let Err(reason) = validate_question(&candidate.question, &answer.text) {
                debug!(attempt, reason = reason.as_str(), "Root candidate rejected");
                feedback = Some(reason);
                continue;
            }

            let listed = candidate_keywords(&candidate.question, &candidate.keywords, &answer.text);
            let minimization = self
                .keywords
                .minimize(&candidate.question, &answer.text, &listed)
                .await;
            calls += minimization.calls;

            if minimization.keywords.is_empty() {
                feedback = Some("no identifying keyword survived".to_string());
                last_minimization = Some(minimization);
                continue;
            }

            let query = PreciseQuery::new(
                candidate.question,
                answer.text.clone(),
                minimization.keywords.clone(),
                candidate.method,
                0,
                None,
                ExtensionType::Root,
            );
            info!(
                answer = answer.text.as_str(),
                keywords = query.keywords.len(),
                attempt,
                "Root query built"
            );
            return RootBuild {
                outcome: RootOutcome::Built(query),
                attempts: attempt,
                minimization: Some(minimization),
                calls,
            };
        }

        let outcome = match (any_candidate, feedback) {
            (true, Some(reason)) => RootOutcome::Rejected { reason },
            (true, None) => RootOutcome::Rejected {
                reason: "candidate failed validation".to_string(),
            },
            (false, _) => RootOutcome::Failed {
                reason: "oracle produced no usable question".to_string(),
            },
        };
        RootBuild {
            outcome,
            attempts,
            minimization: last_minimization,
            calls,
        }
    }
}

/// Non-empty question that does not state its own answer.
pub(crate) fn validate_question(question: &str, answer: &str) -> Result<(), String> {
    if question.trim().is_empty() {
        return Err("empty question".to_string());
    }
    if answer.trim().is_empty() {
        return Err("empty answer".to_string());
    }
    if text::contains_phrase(question, answer) {
        return Err(format!("question reveals the answer \"{answer}\""));
    }
    Ok(())
}
