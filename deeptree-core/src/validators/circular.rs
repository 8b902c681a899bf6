//! Circular-reasoning gate.
//!
//! Rejects a child question that merely inverts its parent: asking for the
//! attribute the parent used to find the entity, asking when the parent's
//! event happened, reversing a cause/effect pair, or restating most of the
//! parent's content words.

use super::GateVerdict;
use crate::config::ValidatorThresholds;
use crate::text;
use std::collections::HashSet;

const GATE: &str = "circular";

/// Surface forms of common event verbs, grouped by event.
pub const EVENT_FORMS: &[(&str, &[&str])] = &[
    ("found", &["founded", "founding", "founder", "founders", "cofounded"]),
    ("establish", &["established", "establishing", "establishment"]),
    ("birth", &["born", "birth", "birthplace"]),
    ("create", &["created", "creating", "creation", "creator"]),
    ("invent", &["invented", "inventing", "invention", "inventor"]),
    ("launch", &["launched", "launching", "launch"]),
    ("build", &["built", "building", "constructed", "construction"]),
    ("discover", &["discovered", "discovering", "discovery"]),
    ("release", &["released", "release", "releasing"]),
    ("death", &["died", "death", "dies"]),
    ("open", &["opened", "opening"]),
    ("publish", &["published", "publication", "publishing"]),
    ("elect", &["elected", "election"]),
];

/// Interrogatives that ask for a time.
const TEMPORAL_QUESTIONS: &[&str] = &[
    "when",
    "what year",
    "which year",
    "what date",
    "which date",
    "what decade",
    "which century",
    "how long ago",
];

const CAUSE_FORWARD: &[&str] = &[
    "caused", "causes", "led to", "leads to", "resulted in", "results in", "triggered",
    "produced",
];

const CAUSE_BACKWARD: &[&str] = &[
    "caused by",
    "result of",
    "because of",
    "due to",
    "effect of",
    "consequence of",
    "why",
];

/// Event groups mentioned in `question`.
pub fn event_groups(question: &str) -> HashSet<&'static str> {
    let tokens = text::tokenize(question);
    EVENT_FORMS
        .iter()
        .filter(|(_, forms)| tokens.iter().any(|t| forms.contains(&t.as_str())))
        .map(|(group, _)| *group)
        .collect()
}

/// Whether `question` asks for a time.
pub fn asks_for_time(question: &str) -> bool {
    text::any_phrase(question, TEMPORAL_QUESTIONS)
}

pub struct CircularReasoningValidator {
    thresholds: ValidatorThresholds,
}

impl CircularReasoningValidator {
    pub fn new(thresholds: ValidatorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn check(
        &self,
        parent_question: &str,
        parent_answer: &str,
        child_question: &str,
        child_answer: &str,
    ) -> GateVerdict {
        if text::contains_phrase(child_question, parent_answer)
            && text::contains_phrase(parent_question, child_answer)
        {
            return GateVerdict::reject(
                GATE,
                format!(
                    "entity/attribute swap: child asks about \"{parent_answer}\" for \"{child_answer}\""
                ),
            );
        }

        let shared_events: Vec<&str> = event_groups(parent_question)
            .intersection(&event_groups(child_question))
            .copied()
            .collect();
        if !shared_events.is_empty()
            && (asks_for_time(child_question) || asks_for_time(parent_question))
        {
            return GateVerdict::reject(
                GATE,
                format!("temporal/event swap on '{}'", shared_events.join(", ")),
            );
        }

        if let Some(detail) = cause_effect_reversal(parent_question, child_question) {
            return GateVerdict::reject(GATE, detail);
        }

        let parent_words = text::content_set(parent_question);
        let child_words = text::content_set(child_question);
        let shared = parent_words.intersection(&child_words).count();
        let ratio = text::overlap_coefficient(&parent_words, &child_words);
        if shared >= self.thresholds.circular_shared_words {
            return GateVerdict::reject(GATE, format!("{shared} shared content words"));
        }
        if ratio > self.thresholds.circular_overlap_ratio {
            return GateVerdict::reject(
                GATE,
                format!(
                    "content overlap {:.2} > {:.2}",
                    ratio, self.thresholds.circular_overlap_ratio
                ),
            );
        }

        GateVerdict::pass(GATE, format!("{shared} shared content words, overlap {ratio:.2}"))
    }
}

fn cause_effect_reversal(a: &str, b: &str) -> Option<String> {
    // "caused by" contains "caused", so a backward phrase must not also count as forward.
    let forward =
        |q: &str| text::any_phrase(q, CAUSE_FORWARD) && !text::any_phrase(q, CAUSE_BACKWARD);
    let backward = |q: &str| text::any_phrase(q, CAUSE_BACKWARD);
    let reversed = (forward(a) && backward(b)) || (backward(a) && forward(b));
    if !reversed {
        return None;
    }
    let shared: Vec<String> = text::content_set(a)
        .intersection(&text::content_set(b))
        .cloned()
        .collect();
    if shared.is_empty() {
        None
    } else {
        Some(format!("cause/effect reversal around '{}'", shared.join(", ")))
    }
}
