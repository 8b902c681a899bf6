//! Short-answer extraction.
//!
//! Asks the oracle for up to three objective facts buried in a document.
//! When the reply cannot be used, a heuristic pass over the document
//! (capitalized phrases, numbers with units, a technical-term list) still
//! yields candidates. An empty result is not an error; it ends processing
//! for that document.

use crate::config::GenerationConfig;
use crate::oracle::{TextGenerator, generate_text};
use crate::parse::{self, ParseStage};
use crate::prompts;
use crate::text;
use crate::types::{AnswerType, CallCounts, ShortAnswer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Most short answers kept per document.
pub const MAX_SHORT_ANSWERS: usize = 3;
/// Longest accepted short answer, in words.
pub const MAX_ANSWER_WORDS: usize = 8;

static CAPITALIZED_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*)*").expect("valid capitalized-phrase regex")
});

static NUMBER_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d[\d,]*(?:\.\d+)?(?:\s?(?:%|(?:percent|km|kilometers|miles|kg|tons|meters|million|billion|years|people)\b))?",
    )
    .expect("valid number regex")
});

/// Capitalized words that start sentences rather than name things.
const CAPITALIZED_STOP: &[&str] = &[
    "The", "A", "An", "In", "On", "At", "It", "Its", "This", "That", "These", "Those", "He",
    "She", "They", "We", "I", "However", "But", "And", "When", "While", "After", "Before",
    "Although", "Since", "During", "There", "Their", "His", "Her", "Our", "Many", "Some",
];

/// Words that mark an evaluation rather than a fact.
const SUBJECTIVE_WORDS: &[&str] = &[
    "best", "worst", "beautiful", "great", "good", "bad", "amazing", "terrible", "excellent",
    "wonderful", "awful", "interesting", "boring", "impressive", "favorite", "favourite",
];

/// Technical nouns worth proposing when nothing else is found.
const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "protocol", "enzyme", "protein", "vaccine", "battery", "semiconductor",
    "satellite", "reactor", "genome", "molecule", "isotope", "telescope", "processor",
    "compiler", "database", "catalyst", "antibody", "neuron", "galaxy", "alloy", "polymer",
];

/// Words that, right before a capitalized phrase, suggest a place.
const LOCATION_PREPOSITIONS: &[&str] = &["in", "at", "near", "from", "to"];

/// Where the extracted answers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "stage", rename_all = "snake_case")]
pub enum ExtractionMethod {
    Oracle(ParseStage),
    Heuristic,
}

/// Result of extracting short answers from one document.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub answers: Vec<ShortAnswer>,
    pub method: ExtractionMethod,
    pub calls: CallCounts,
}

impl ExtractionResult {
    /// No usable answer was found; the document yields no trees.
    pub fn is_exhausted(&self) -> bool {
        self.answers.is_empty()
    }
}

/// Pulls up to three short answers from a document.
pub struct ShortAnswerExtractor {
    generator: Arc<dyn TextGenerator>,
    config: GenerationConfig,
}

impl ShortAnswerExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }

    pub async fn extract(&self, document: &str) -> ExtractionResult {
        if document.trim().is_empty() {
            return ExtractionResult {
                answers: Vec::new(),
                method: ExtractionMethod::Heuristic,
                calls: CallCounts::default(),
            };
        }

        let prompt = prompts::extraction_prompt(document);
        let reply = generate_text(
            self.generator.as_ref(),
            &prompt,
            self.config.validation_temperature,
            self.config.max_tokens,
        )
        .await;
        let calls = CallCounts::oracle(1);

        if let Some(reply) = reply {
            if let Some((answers, stage)) = parse_oracle_answers(&reply, document)
                && !answers.is_empty()
            {
                info!(count = answers.len(), stage = %stage, "Extracted short answers");
                return ExtractionResult {
                    answers,
                    method: ExtractionMethod::Oracle(stage),
                    calls,
                };
            }
            warn!("Extraction reply unusable, falling back to heuristics");
        }

        let answers = heuristic_answers(document);
        debug!(count = answers.len(), "Heuristic short answers");
        ExtractionResult {
            answers,
            method: ExtractionMethod::Heuristic,
            calls,
        }
    }
}

/// Parse the oracle reply: JSON first, then bulleted lines.
fn parse_oracle_answers(reply: &str, document: &str) -> Option<(Vec<ShortAnswer>, ParseStage)> {
    if let Some((value, stage)) = parse::json_value(reply) {
        let items = match &value {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(_) => value
                .get("answers")
                .or_else(|| value.get("short_answers"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let candidates = items.iter().filter_map(|item| match item {
            serde_json::Value::String(s) => Some((s.clone(), None, None)),
            serde_json::Value::Object(_) => parse::str_field(item, "text").map(|text| {
                (
                    text,
                    parse::str_field(item, "type").and_then(|t| AnswerType::from_label(&t)),
                    parse::f64_field(item, "confidence"),
                )
            }),
            _ => None,
        });
        return Some((collect_answers(candidates, document), stage));
    }

    let bullets = reply.lines().filter_map(|line| {
        let line = line.trim();
        let body = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| {
                let (num, rest) = line.split_once(". ")?;
                num.chars().all(|c| c.is_ascii_digit()).then_some(rest)
            })?;
        let text = body.split(" (").next().unwrap_or(body).trim().trim_matches('"');
        Some((text.to_string(), None, None))
    });
    let answers = collect_answers(bullets, document);
    if answers.is_empty() {
        None
    } else {
        Some((answers, ParseStage::Labelled))
    }
}

/// Validate, locate and deduplicate candidates, keeping at most three.
fn collect_answers<I>(candidates: I, document: &str) -> Vec<ShortAnswer>
where
    I: IntoIterator<Item = (String, Option<AnswerType>, Option<f64>)>,
{
    let mut seen = HashSet::new();
    let mut answers = Vec::new();
    for (text, answer_type, confidence) in candidates {
        let text = text.trim().to_string();
        if !is_objective_fact(&text) {
            debug!(candidate = text.as_str(), "Dropping non-factual candidate");
            continue;
        }
        let Some(position) = find_case_insensitive(document, &text) else {
            debug!(candidate = text.as_str(), "Candidate not found in document");
            continue;
        };
        if !seen.insert(text::normalize(&text)) {
            continue;
        }
        answers.push(ShortAnswer {
            answer_type: answer_type.unwrap_or_else(|| AnswerType::infer(&text)),
            confidence: confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            source_span: sentence_around(document, position).to_string(),
            position,
            text,
        });
        if answers.len() == MAX_SHORT_ANSWERS {
            break;
        }
    }
    answers
}

fn is_objective_fact(text: &str) -> bool {
    let words = text::word_count(text);
    if words == 0 || words > MAX_ANSWER_WORDS {
        return false;
    }
    !text::tokenize(text)
        .iter()
        .any(|t| SUBJECTIVE_WORDS.contains(&t.as_str()))
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    match text::phrase_regex(needle) {
        Some(re) => re.find(haystack).map(|m| m.start()),
        None => haystack.find(needle),
    }
}

/// The sentence of `document` containing byte offset `position`.
fn sentence_around(document: &str, position: usize) -> &str {
    let is_end = |c: char| matches!(c, '.' | '!' | '?' | '\n');
    let start = document[..position]
        .rfind(is_end)
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = document[position..]
        .find(is_end)
        .map(|i| position + i + 1)
        .unwrap_or(document.len());
    document[start..end].trim()
}

/// Regex and word-list candidates, capitalized phrases first.
pub fn heuristic_answers(document: &str) -> Vec<ShortAnswer> {
    let mut candidates: Vec<(String, Option<AnswerType>, Option<f64>)> = Vec::new();

    for m in CAPITALIZED_PHRASE.find_iter(document) {
        let phrase = m.as_str().trim();
        if CAPITALIZED_STOP.contains(&phrase) {
            continue;
        }
        let before = document[..m.start()].trim_end();
        let preceding = before
            .rsplit(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("")
            .to_lowercase();
        let answer_type = if LOCATION_PREPOSITIONS.contains(&preceding.as_str()) {
            AnswerType::Location
        } else {
            AnswerType::Name
        };
        candidates.push((phrase.to_string(), Some(answer_type), Some(0.6)));
    }

    for m in NUMBER_WITH_UNIT.find_iter(document) {
        let number = m.as_str().trim();
        let answer_type = AnswerType::infer(number);
        let confidence = if answer_type == AnswerType::Date { 0.6 } else { 0.5 };
        candidates.push((number.to_string(), Some(answer_type), Some(confidence)));
    }

    for term in TECHNICAL_TERMS {
        if text::contains_phrase(document, term) {
            candidates.push((term.to_string(), Some(AnswerType::Noun), Some(0.4)));
        }
    }

    collect_answers(candidates, document)
}
