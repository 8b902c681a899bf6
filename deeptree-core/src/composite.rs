//! Composite query synthesis.
//!
//! Two encodings of the same puzzle, both resolving to the root answer:
//! a nested-cumulative string built purely from the primary path, and an
//! oracle-integrated natural question with a templated fallback.

use crate::config::{CompositeConfig, GenerationConfig};
use crate::oracle::{TextGenerator, generate_text};
use crate::parse;
use crate::prompts;
use crate::text;
use crate::tree::{CompositeQueries, IntegrationMethod, ReasoningTree};
use crate::types::CallCounts;
use std::sync::Arc;
use tracing::{debug, warn};

/// Phrasing that turns a sequential puzzle into a list of constraints.
const PARALLEL_PHRASES: &[&str] = &[
    "satisfies",
    "satisfy",
    "conditions",
    "all of the following",
    "each of the following",
    "meets the following",
];

/// Markers of an answer that explains itself instead of stating a fact.
const REASONING_MARKERS: &[&str] = &[
    "because", "since", "therefore", "thus", "step", "first", "reasoning", "which means",
];

/// Representative questions and answers of `tree`, deepest layer first.
fn ordered_steps(tree: &ReasoningTree) -> (Vec<String>, Vec<String>) {
    tree.primary_path()
        .into_iter()
        .rev()
        .map(|node| (node.query.text.clone(), node.query.answer.clone()))
        .unzip()
}

/// Wrap `items` (deepest first) so each encloses the next:
/// `[Q2, Q1, Q0]` becomes `(Q2, (Q1, (Q0)))`.
fn nest(items: &[String]) -> String {
    items
        .iter()
        .rev()
        .fold(None, |inner: Option<String>, item| {
            Some(match inner {
                None => format!("({item})"),
                Some(inner) => format!("({item}, {inner})"),
            })
        })
        .unwrap_or_default()
}

/// The nested-cumulative question and answer. Pure and deterministic.
pub fn nested_cumulative(tree: &ReasoningTree) -> (String, String) {
    let (questions, answers) = ordered_steps(tree);
    (nest(&questions), nest(&answers))
}

/// A mechanical chain of the steps in which each step refers back to the
/// previous answer instead of naming it.
pub fn template_question(questions: &[String], answers: &[String]) -> String {
    if questions.len() == 1 {
        return questions[0].clone();
    }
    let steps: Vec<String> = questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let question = match i.checked_sub(1).and_then(|prev| answers.get(prev)) {
                Some(previous) => refer_back(question, previous, i),
                None => question.clone(),
            };
            format!("Step {}: {question}", i + 1)
        })
        .collect();
    format!(
        "Solve in order; each step needs the previous answer. {} What is the answer to step {}?",
        steps.join(" "),
        questions.len()
    )
}

fn refer_back(question: &str, answer: &str, step: usize) -> String {
    match text::phrase_regex(answer) {
        Some(re) => re
            .replace_all(question, format!("the answer to step {step}").as_str())
            .into_owned(),
        None => question.to_string(),
    }
}

/// Result of one synthesis, for the caller to record.
#[derive(Debug, Clone)]
pub struct CompositeBuild {
    pub queries: CompositeQueries,
    /// Why the integrated form fell back to the template, if it did.
    pub fallback_reason: Option<String>,
    pub calls: CallCounts,
}

pub struct CompositeQuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
    generation: GenerationConfig,
    config: CompositeConfig,
}

impl CompositeQuerySynthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        generation: GenerationConfig,
        config: CompositeConfig,
    ) -> Self {
        Self {
            generator,
            generation,
            config,
        }
    }

    pub async fn synthesize(&self, tree: &ReasoningTree) -> CompositeBuild {
        let (nested_question, nested_answer) = nested_cumulative(tree);
        let (questions, answers) = ordered_steps(tree);
        let root_answer = tree.root().query.answer.clone();

        let prompt = prompts::composite_prompt(&questions, &answers, &root_answer);
        let reply = generate_text(
            self.generator.as_ref(),
            &prompt,
            self.generation.temperature,
            self.generation.max_tokens,
        )
        .await;
        let calls = CallCounts::oracle(1);

        let integrated = match reply.as_deref().map(parse_integrated) {
            None => Err("oracle unavailable".to_string()),
            Some(None) => Err("unparseable reply".to_string()),
            Some(Some((question, answer))) => self
                .check_question(&question, &root_answer)
                .map(|()| (question, answer)),
        };

        let (llm_integrated, llm_integrated_answer, integration_method, fallback_reason) =
            match integrated {
                Ok((question, answer)) => {
                    let answer = self.bare_answer(answer.as_deref(), &root_answer);
                    (question, answer, IntegrationMethod::Oracle, None)
                }
                Err(reason) => {
                    warn!(
                        tree_id = tree.id(),
                        reason = reason.as_str(),
                        "Composite falls back to template"
                    );
                    (
                        template_question(&questions, &answers),
                        root_answer.clone(),
                        IntegrationMethod::Template,
                        Some(reason),
                    )
                }
            };

        CompositeBuild {
            queries: CompositeQueries {
                nested_cumulative: nested_question,
                nested_cumulative_answer: nested_answer,
                llm_integrated,
                llm_integrated_answer,
                integration_method,
            },
            fallback_reason,
            calls,
        }
    }

    fn check_question(&self, question: &str, root_answer: &str) -> Result<(), String> {
        let len = question.trim().chars().count();
        if len < self.config.min_integrated_chars {
            return Err(format!(
                "integrated question too short ({len} < {})",
                self.config.min_integrated_chars
            ));
        }
        if text::contains_phrase(question, root_answer) {
            return Err("integrated question reveals the root answer".to_string());
        }
        if text::any_phrase(question, PARALLEL_PHRASES) {
            return Err("integrated question uses parallel-constraint phrasing".to_string());
        }
        Ok(())
    }

    /// The oracle's answer when it is a short bare fact naming the root
    /// answer; otherwise the root answer itself.
    fn bare_answer(&self, answer: Option<&str>, root_answer: &str) -> String {
        match answer.map(str::trim) {
            Some(a)
                if text::contains_phrase(a, root_answer)
                    && text::word_count(a) <= self.config.max_answer_words
                    && !text::any_phrase(a, REASONING_MARKERS) =>
            {
                a.to_string()
            }
            other => {
                debug!(answer = ?other, "Integrated answer replaced by the root answer");
                root_answer.to_string()
            }
        }
    }
}

/// Question and optional answer from an integration reply.
fn parse_integrated(reply: &str) -> Option<(String, Option<String>)> {
    if let Some((value, _)) = parse::json_value(reply)
        && let Some(question) = parse::str_field(&value, "question")
    {
        return Some((question, parse::str_field(&value, "answer")));
    }
    let question = parse::labelled_value(reply, &["question", "composite question"])?;
    Some((question, parse::labelled_value(reply, &["answer"])))
}
