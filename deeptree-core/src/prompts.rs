//! Prompt builders for every oracle call.
//!
//! Each prompt opens with a `### TASK: <tag>` line. The tags make replies
//! routable in scripted tests and easy to grep in trajectory sinks.

use crate::types::{AnswerType, ExtensionType};

pub const TASK_EXTRACT: &str = "### TASK: short_answer_extraction";
pub const TASK_ROOT: &str = "### TASK: root_query_generation";
pub const TASK_NECESSITY: &str = "### TASK: keyword_necessity";
pub const TASK_EXTENSION: &str = "### TASK: extension_question";
pub const TASK_EXPOSURE: &str = "### TASK: root_answer_exposure";
pub const TASK_COMPOSITE: &str = "### TASK: composite_integration";

/// Longest document excerpt sent to the oracle, in characters.
const MAX_DOCUMENT_CHARS: usize = 6000;

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn extraction_prompt(document: &str) -> String {
    format!(
        "{TASK_EXTRACT}\n\
         Read the document and list up to 3 short answers: objective, verifiable facts \
         of 1-8 words each (proper nouns, numbers, dates, locations, technical terms). \
         Never return opinions or evaluations.\n\
         Reply with JSON only:\n\
         {{\"answers\": [{{\"text\": \"...\", \"type\": \"noun|number|name|date|location\", \"confidence\": 0.0-1.0}}]}}\n\n\
         Document:\n{}",
        truncate_chars(document, MAX_DOCUMENT_CHARS)
    )
}

pub fn root_query_prompt(
    answer: &str,
    answer_type: AnswerType,
    source_span: &str,
    context: Option<&str>,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "{TASK_ROOT}\n\
         Write one question whose unique correct answer is \"{answer}\" ({answer_type}).\n\
         Rules:\n\
         - Do not mention \"{answer}\" anywhere in the question.\n\
         - Use at least two specific keywords that together pin down the answer.\n\
         - List those keywords exactly as they appear in the question.\n\
         Reply with JSON only: {{\"question\": \"...\", \"keywords\": [\"...\", \"...\"]}}\n\n\
         Source sentence: {source_span}\n"
    );
    if let Some(ctx) = context {
        prompt.push_str(&format!("Search context:\n{ctx}\n"));
    }
    if let Some(fb) = feedback {
        prompt.push_str(&format!("A previous attempt was rejected: {fb}\n"));
    }
    prompt
}

pub fn necessity_prompt(masked_question: &str, remaining: &[String], answer: &str) -> String {
    format!(
        "{TASK_NECESSITY}\n\
         A keyword was removed from a question and replaced with [MASK].\n\
         Masked question: {masked_question}\n\
         Remaining keywords: {}\n\
         Expected answer: {answer}\n\
         Do the remaining keywords still determine \"{answer}\" as the ONLY correct answer?\n\
         Reply with JSON only: {{\"unique\": true|false, \"reason\": \"...\"}}",
        remaining.join(", ")
    )
}

pub fn extension_prompt(
    keyword: &str,
    parent_question: &str,
    parent_answer: &str,
    context: Option<&str>,
    extension_type: ExtensionType,
) -> String {
    let mut prompt = format!(
        "{TASK_EXTENSION}\n\
         Extension type: {extension_type}\n\
         Target answer: {keyword}\n\
         Write a brand-new question whose only correct answer is \"{keyword}\".\n\
         Rules:\n\
         - Draw on a different knowledge domain than the parent question below.\n\
         - Do not mention \"{keyword}\" or \"{parent_answer}\".\n\
         - Do not reuse the parent's wording, entities or time references.\n\
         - List the question's own identifying keywords.\n\
         Parent question: {parent_question}\n\
         Reply with JSON only: {{\"question\": \"...\", \"keywords\": [\"...\"]}}\n"
    );
    if let Some(ctx) = context {
        prompt.push_str(&format!("Search context about \"{keyword}\":\n{ctx}\n"));
    }
    prompt
}

pub fn exposure_prompt(
    question: &str,
    answer: &str,
    root_answer: &str,
    chain: &[String],
) -> String {
    format!(
        "{TASK_EXPOSURE}\n\
         Candidate question: {question}\n\
         Candidate answer: {answer}\n\
         Hidden final answer: {root_answer}\n\
         Existing reasoning chain (root first):\n{}\n\
         How many reasoning hops separate the candidate question from the hidden final \
         answer? Rate the risk that answering it reveals the hidden answer directly.\n\
         Reply with JSON only: {{\"hops\": <int>, \"risk\": \"safe|low|medium|high\", \"reason\": \"...\"}}",
        chain
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {q}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

pub fn composite_prompt(questions: &[String], answers: &[String], root_answer: &str) -> String {
    let steps = questions
        .iter()
        .zip(answers)
        .enumerate()
        .map(|(i, (q, a))| format!("Step {}: {q} (answer: {a})", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{TASK_COMPOSITE}\n\
         Combine the steps below into ONE natural question.\n\
         The answer of each step must be required to formulate the next step, so the \
         solver has to work through them in order. Do NOT write \"satisfies conditions \
         A, B, and C\" or any other list of parallel constraints. Do not reveal any \
         intermediate answer.\n\
         {steps}\n\
         Final answer: {root_answer}\n\
         Reply with JSON only: {{\"question\": \"...\", \"answer\": \"<bare fact, no explanation>\"}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_carries_its_tag() {
        assert!(extraction_prompt("doc").starts_with(TASK_EXTRACT));
        assert!(
            root_query_prompt("Tesla", AnswerType::Name, "s", None, None).starts_with(TASK_ROOT)
        );
        assert!(necessity_prompt("Q [MASK]", &[], "a").starts_with(TASK_NECESSITY));
        assert!(
            extension_prompt("k", "pq", "pa", None, ExtensionType::Series)
                .starts_with(TASK_EXTENSION)
        );
        assert!(exposure_prompt("q", "a", "r", &[]).starts_with(TASK_EXPOSURE));
        assert!(composite_prompt(&[], &[], "r").starts_with(TASK_COMPOSITE));
    }

    #[test]
    fn test_document_is_truncated_on_char_boundary() {
        let doc = "é".repeat(MAX_DOCUMENT_CHARS + 50);
        let prompt = extraction_prompt(&doc);
        assert_eq!(prompt.matches('é').count(), MAX_DOCUMENT_CHARS);
    }

    #[test]
    fn test_root_prompt_includes_feedback_and_context() {
        let prompt = root_query_prompt(
            "Austin",
            AnswerType::Location,
            "HQ is in Austin.",
            Some("capital of Texas"),
            Some("answer leaked"),
        );
        assert!(prompt.contains("Search context:\ncapital of Texas"));
        assert!(prompt.contains("rejected: answer leaked"));
    }

    #[test]
    fn test_composite_prompt_orders_steps() {
        let prompt = composite_prompt(
            &["Q2".into(), "Q1".into()],
            &["a2".into(), "a1".into()],
            "a0",
        );
        let s1 = prompt.find("Step 1: Q2").unwrap();
        let s2 = prompt.find("Step 2: Q1").unwrap();
        assert!(s1 < s2);
    }
}
