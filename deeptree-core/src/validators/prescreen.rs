//! Pre-screening of a keyword before it is extended.
//!
//! Cheap lexical checks that predict whether any child question built on the
//! keyword would circle back to its parent. Above the configured cutoff the
//! keyword is skipped without spending a search or an oracle call.

use super::circular::event_groups;
use crate::config::ValidatorThresholds;
use crate::text;
use crate::types::AnswerType;
use serde::{Deserialize, Serialize};

/// Risk estimate for extending one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreenResult {
    pub keyword: String,
    pub risk: f64,
    pub reasons: Vec<String>,
    pub proceed: bool,
}

pub struct CircularProblemHandler {
    cutoff: f64,
}

impl CircularProblemHandler {
    pub fn new(thresholds: &ValidatorThresholds) -> Self {
        Self {
            cutoff: thresholds.prescreen_cutoff,
        }
    }

    pub fn assess(
        &self,
        keyword: &str,
        parent_question: &str,
        parent_answer: &str,
    ) -> PrescreenResult {
        let mut risk: f64 = 0.0;
        let mut reasons = Vec::new();

        let kw = text::normalize(keyword);
        let answer = text::normalize(parent_answer);
        if kw.is_empty() {
            risk = 1.0;
            reasons.push("empty keyword".to_string());
        } else if kw == answer {
            risk = 1.0;
            reasons.push("keyword is the parent answer".to_string());
        } else if text::contains_phrase(keyword, parent_answer)
            || text::contains_phrase(parent_answer, keyword)
        {
            risk = risk.max(0.9);
            reasons.push("keyword overlaps the parent answer".to_string());
        }

        if matches!(AnswerType::infer(keyword), AnswerType::Date)
            && !event_groups(parent_question).is_empty()
        {
            risk = risk.max(0.6);
            reasons.push("date keyword on an event question".to_string());
        }

        let shared = text::content_set(keyword)
            .intersection(&text::content_set(parent_answer))
            .count();
        if shared > 0 {
            risk = risk.max(0.5);
            reasons.push(format!("{shared} word(s) shared with the parent answer"));
        }

        PrescreenResult {
            keyword: keyword.to_string(),
            risk,
            reasons,
            proceed: risk < self.cutoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CircularProblemHandler {
        CircularProblemHandler::new(&ValidatorThresholds::default())
    }

    #[test]
    fn test_keyword_equal_to_answer_is_skipped() {
        let result = handler().assess("tesla", "Which company makes the Model S?", "Tesla");
        assert_eq!(result.risk, 1.0);
        assert!(!result.proceed);
    }

    #[test]
    fn test_keyword_containing_answer_is_skipped() {
        let result = handler().assess(
            "Tesla Gigafactory",
            "Which company makes the Model S?",
            "Tesla",
        );
        assert!(!result.proceed);
    }

    #[test]
    fn test_date_on_event_question_is_flagged_but_allowed() {
        let result = handler().assess("2003", "Which company was founded in 2003?", "Tesla");
        assert!((result.risk - 0.6).abs() < 1e-9);
        assert!(result.proceed);
        assert_eq!(result.reasons.len(), 1);
    }

    #[test]
    fn test_unrelated_keyword_is_clean() {
        let result =
            handler().assess("Austin", "Which carmaker is headquartered in Austin?", "Tesla");
        assert_eq!(result.risk, 0.0);
        assert!(result.proceed);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_cutoff_is_configurable() {
        let strict = CircularProblemHandler::new(&ValidatorThresholds {
            prescreen_cutoff: 0.5,
            ..ValidatorThresholds::default()
        });
        let result = strict.assess("2003", "Which company was founded in 2003?", "Tesla");
        assert!(!result.proceed);
    }
}
