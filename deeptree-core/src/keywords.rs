//! Keyword necessity (masking) tests.
//!
//! For each candidate keyword the question is re-issued with that keyword
//! masked out, and the oracle is asked whether the remaining keywords still
//! pin down the same answer. A keyword is kept only when masking it breaks
//! uniqueness. Tests are independent and run in a bounded worker pool;
//! results are re-ordered by candidate index, so aggregation does not depend
//! on completion order.

use crate::config::{GenerationConfig, KeywordConfig};
use crate::oracle::{TextGenerator, generate_text};
use crate::parse;
use crate::prompts;
use crate::text;
use crate::types::{AnswerType, CallCounts, MinimalKeyword};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder substituted for a masked keyword.
pub const MASK: &str = "[MASK]";

/// Bytes of question text kept on each side of a keyword as its context.
const CONTEXT_RADIUS: usize = 40;

/// Outcome of masking one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NecessityVerdict {
    /// Masking it broke uniqueness; keep it.
    Necessary,
    /// The answer stays unique without it; drop it.
    Redundant,
    /// The oracle gave no usable answer.
    Inconclusive,
}

/// One masking test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NecessityTest {
    pub keyword: String,
    pub masked_question: String,
    pub verdict: NecessityVerdict,
}

/// Result of minimizing a candidate keyword list.
#[derive(Debug, Clone)]
pub struct MinimizationResult {
    pub keywords: Vec<MinimalKeyword>,
    pub tests: Vec<NecessityTest>,
    /// No test proved necessity, so the first candidate was kept.
    pub fallback_used: bool,
    pub calls: CallCounts,
}

/// Runs masking tests and keeps only necessary keywords.
pub struct KeywordNecessityValidator {
    generator: Arc<dyn TextGenerator>,
    generation: GenerationConfig,
    config: KeywordConfig,
}

impl KeywordNecessityValidator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        generation: GenerationConfig,
        config: KeywordConfig,
    ) -> Self {
        Self {
            generator,
            generation,
            config,
        }
    }

    /// Minimize `candidates` for `question` whose unique answer is `answer`.
    ///
    /// Candidates absent from the question are ignored. At least one keyword
    /// survives whenever any candidate is usable.
    pub async fn minimize(
        &self,
        question: &str,
        answer: &str,
        candidates: &[String],
    ) -> MinimizationResult {
        let candidates = usable_candidates(question, candidates, self.config.max_candidates);
        if candidates.is_empty() {
            return MinimizationResult {
                keywords: Vec::new(),
                tests: Vec::new(),
                fallback_used: false,
                calls: CallCounts::default(),
            };
        }

        // With one candidate, masking leaves nothing to identify the answer.
        if candidates.len() == 1 {
            let keyword = build_keyword(question, &candidates[0], 1.0);
            return MinimizationResult {
                tests: vec![NecessityTest {
                    keyword: candidates[0].clone(),
                    masked_question: mask_keyword(question, &candidates[0]),
                    verdict: NecessityVerdict::Necessary,
                }],
                keywords: vec![keyword],
                fallback_used: false,
                calls: CallCounts::default(),
            };
        }

        let width = self.config.concurrency.max(1);
        let mut results: Vec<(usize, NecessityTest)> = stream::iter(candidates.iter().enumerate())
            .map(|(idx, keyword)| {
                let remaining: Vec<String> = candidates
                    .iter()
                    .filter(|c| *c != keyword)
                    .cloned()
                    .collect();
                async move { (idx, self.test_one(question, answer, keyword, &remaining).await) }
            })
            .buffer_unordered(width)
            .collect()
            .await;
        results.sort_by_key(|(idx, _)| *idx);

        let calls = CallCounts::oracle(results.len());
        let tests: Vec<NecessityTest> = results.into_iter().map(|(_, t)| t).collect();
        let mut keywords: Vec<MinimalKeyword> = tests
            .iter()
            .filter(|t| t.verdict == NecessityVerdict::Necessary)
            .map(|t| build_keyword(question, &t.keyword, 1.0))
            .collect();

        let mut fallback_used = false;
        if keywords.is_empty() {
            warn!(
                question,
                "No keyword proved necessary; keeping the first candidate"
            );
            keywords.push(build_keyword(question, &candidates[0], 0.5));
            fallback_used = true;
        }

        debug!(
            candidates = candidates.len(),
            kept = keywords.len(),
            "Keyword minimization complete"
        );

        MinimizationResult {
            keywords,
            tests,
            fallback_used,
            calls,
        }
    }

    async fn test_one(
        &self,
        question: &str,
        answer: &str,
        keyword: &str,
        remaining: &[String],
    ) -> NecessityTest {
        let masked_question = mask_keyword(question, keyword);
        let prompt = prompts::necessity_prompt(&masked_question, remaining, answer);
        let reply = generate_text(
            self.generator.as_ref(),
            &prompt,
            self.generation.validation_temperature,
            256,
        )
        .await;

        let verdict = reply
            .as_deref()
            .and_then(parse_uniqueness)
            .map(|still_unique| {
                if still_unique {
                    NecessityVerdict::Redundant
                } else {
                    NecessityVerdict::Necessary
                }
            })
            .unwrap_or(NecessityVerdict::Inconclusive);

        debug!(keyword, verdict = ?verdict, "Masking test");
        NecessityTest {
            keyword: keyword.to_string(),
            masked_question,
            verdict,
        }
    }
}

/// Whether the reply says the answer is still unique after masking.
fn parse_uniqueness(reply: &str) -> Option<bool> {
    if let Some((value, stage)) = parse::json_value(reply) {
        if let Some(unique) = parse::bool_field(&value, "unique") {
            return Some(unique);
        }
        debug!(stage = %stage, "Necessity reply lacks 'unique' field");
    }
    parse::labelled_value(reply, &["unique"])
        .as_deref()
        .and_then(parse::yes_no)
        .or_else(|| parse::yes_no(reply))
}

/// Candidates present in the question, deduplicated, capped.
fn usable_candidates(question: &str, candidates: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && text::contains_phrase(question, c))
        .filter(|c| seen.insert(text::normalize(c)))
        .take(max)
        .collect()
}

/// Question words that open a question without identifying anything.
const QUESTION_OPENERS: &[&str] = &[
    "Which", "What", "Who", "Whom", "Whose", "When", "Where", "Why", "How", "In", "The",
];

/// Candidate keywords read straight off a question, for when the oracle
/// lists none: capitalized phrases, numbers, then long content words.
pub fn heuristic_keywords(question: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if !candidate.is_empty()
            && !out
                .iter()
                .any(|o| text::normalize(o) == text::normalize(candidate))
        {
            out.push(candidate.to_string());
        }
    };

    let mut current: Vec<&str> = Vec::new();
    for word in question.split_whitespace() {
        let clean = word.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = clean.chars().next().is_some_and(char::is_uppercase)
            && !QUESTION_OPENERS.contains(&clean);
        if capitalized {
            current.push(clean);
        } else if !current.is_empty() {
            push(&current.join(" "));
            current.clear();
        }
        if clean.chars().any(|c| c.is_ascii_digit()) && !capitalized {
            push(clean);
        }
    }
    if !current.is_empty() {
        push(&current.join(" "));
    }

    for word in text::content_words(question) {
        if word.chars().count() >= 6 {
            push(&word);
        }
    }
    out
}

/// Replace every whole-word, case-insensitive occurrence of `keyword` with
/// [`MASK`]. Longer words that merely contain it are left alone.
pub fn mask_keyword(question: &str, keyword: &str) -> String {
    match text::phrase_regex(keyword) {
        Some(re) => re.replace_all(question, MASK).into_owned(),
        None => question.to_string(),
    }
}

fn build_keyword(question: &str, keyword: &str, necessity: f64) -> MinimalKeyword {
    let position = text::phrase_regex(keyword)
        .and_then(|re| re.find(question))
        .map_or(0, |m| m.start());
    let keyword_type = AnswerType::infer(keyword);
    MinimalKeyword {
        text: keyword.to_string(),
        keyword_type,
        uniqueness_score: uniqueness_prior(keyword_type),
        necessity_score: necessity,
        context: context_window(question, position, keyword.len()),
        position,
    }
}

/// Specific surface forms narrow an answer more than common nouns do.
fn uniqueness_prior(keyword_type: AnswerType) -> f64 {
    match keyword_type {
        AnswerType::Name | AnswerType::Date | AnswerType::Number => 0.8,
        AnswerType::Location => 0.7,
        AnswerType::Noun => 0.5,
    }
}

fn context_window(text: &str, position: usize, len: usize) -> String {
    let mut start = position.saturating_sub(CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (position + len + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockTextGenerator;

    const QUESTION: &str =
        "Which electric carmaker founded in 2003 opened a gigafactory near Austin in 2022?";

    fn validator(generator: MockTextGenerator) -> KeywordNecessityValidator {
        KeywordNecessityValidator::new(
            Arc::new(generator),
            GenerationConfig::default(),
            KeywordConfig::default(),
        )
    }

    fn candidates() -> Vec<String> {
        vec!["electric carmaker".into(), "2003".into(), "gigafactory".into()]
    }

    #[test]
    fn test_mask_keyword_case_insensitive() {
        assert_eq!(
            mask_keyword("Gigafactory near the gigafactory", "gigafactory"),
            "[MASK] near the [MASK]"
        );
    }

    #[test]
    fn test_mask_keyword_spares_longer_words() {
        assert_eq!(
            mask_keyword("Which Austinite band played Austin in 1999?", "Austin"),
            "Which Austinite band played [MASK] in 1999?"
        );
        assert_eq!(mask_keyword("Rated 45% by critics", "45%"), "Rated [MASK] by critics");
    }

    #[tokio::test]
    async fn test_keeps_only_necessary_keywords() {
        // Masking "2003" keeps the answer unique; the others are necessary.
        let generator = MockTextGenerator::new()
            .on("founded in [MASK]", r#"{"unique": true}"#)
            .with_default(r#"{"unique": false}"#);
        let result = validator(generator)
            .minimize(QUESTION, "Tesla", &candidates())
            .await;

        let kept: Vec<&str> = result.keywords.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(kept, vec!["electric carmaker", "gigafactory"]);
        assert!(!result.fallback_used);
        assert_eq!(result.calls.oracle, 3);
        assert_eq!(result.tests[1].verdict, NecessityVerdict::Redundant);
        assert!(result.keywords.iter().all(|k| k.necessity_score == 1.0));
    }

    #[tokio::test]
    async fn test_inconclusive_everywhere_keeps_first() {
        let result = validator(MockTextGenerator::failing())
            .minimize(QUESTION, "Tesla", &candidates())
            .await;
        assert!(result.fallback_used);
        assert_eq!(result.keywords.len(), 1);
        assert_eq!(result.keywords[0].text, "electric carmaker");
        assert_eq!(result.keywords[0].necessity_score, 0.5);
        assert!(
            result
                .tests
                .iter()
                .all(|t| t.verdict == NecessityVerdict::Inconclusive)
        );
    }

    #[tokio::test]
    async fn test_free_text_replies_are_understood() {
        let generator = MockTextGenerator::new()
            .on("[MASK] opened", "Yes - the answer is still unique.")
            .with_default("No, several companies would fit.");
        let result = validator(generator)
            .minimize(QUESTION, "Tesla", &candidates())
            .await;
        // Only the "2003" mask reads "[MASK] opened", and that reply says yes.
        let kept: Vec<&str> = result.keywords.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(kept, vec!["electric carmaker", "gigafactory"]);
        assert_eq!(result.tests[1].verdict, NecessityVerdict::Redundant);
    }

    #[tokio::test]
    async fn test_single_candidate_needs_no_oracle() {
        let generator = MockTextGenerator::failing();
        let validator = validator(generator);
        let result = validator
            .minimize(QUESTION, "Tesla", &["gigafactory".to_string()])
            .await;
        assert_eq!(result.keywords.len(), 1);
        assert_eq!(result.calls.oracle, 0);
        assert_eq!(result.keywords[0].position, QUESTION.find("gigafactory").unwrap());
    }

    #[tokio::test]
    async fn test_absent_and_duplicate_candidates_ignored() {
        let generator = MockTextGenerator::new().with_default(r#"{"unique": false}"#);
        let result = validator(generator)
            .minimize(
                QUESTION,
                "Tesla",
                &["Gigafactory".into(), "gigafactory".into(), "Berlin".into(), " ".into()],
            )
            .await;
        assert_eq!(result.keywords.len(), 1);
        assert_eq!(result.calls.oracle, 0);
    }

    #[tokio::test]
    async fn test_pool_width_does_not_change_result() {
        let reply = |width: usize| async move {
            let generator = MockTextGenerator::new()
                .on("founded in [MASK]", r#"{"unique": true}"#)
                .with_default(r#"{"unique": false}"#);
            let validator = KeywordNecessityValidator::new(
                Arc::new(generator),
                GenerationConfig::default(),
                KeywordConfig {
                    concurrency: width,
                    max_candidates: 6,
                },
            );
            validator
                .minimize(QUESTION, "Tesla", &candidates())
                .await
                .keywords
        };
        assert_eq!(reply(1).await, reply(3).await);
    }

    #[test]
    fn test_heuristic_keywords() {
        let keywords =
            heuristic_keywords("Which Texas city hosts a gigafactory opened in 2022 by Elon Musk?");
        assert_eq!(
            keywords,
            vec!["Texas", "2022", "Elon Musk", "gigafactory", "opened"]
        );
    }

    #[test]
    fn test_context_window_is_char_safe() {
        let text = "Ünïcödé prefix before the keyword and après";
        let pos = text.find("keyword").unwrap();
        let ctx = context_window(text, pos, "keyword".len());
        assert!(ctx.contains("keyword"));
    }
}
