//! Root-answer exposure gate.
//!
//! A child question must not hand the solver the tree's final answer. A
//! direct mention is caught lexically without an oracle call; otherwise the
//! oracle rates the hop distance. Only `safe` and `low` pass, and an
//! unreadable or failed judgement counts as a rejection.

use super::GateVerdict;
use crate::config::GenerationConfig;
use crate::oracle::{TextGenerator, generate_text};
use crate::parse;
use crate::prompts;
use crate::text;
use crate::types::CallCounts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const GATE: &str = "exposure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureRisk {
    Safe,
    Low,
    Medium,
    High,
    Unknown,
}

impl ExposureRisk {
    pub fn from_label(label: &str) -> Option<Self> {
        let first = label
            .trim()
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())?
            .to_string();
        match first.as_str() {
            "safe" | "none" => Some(Self::Safe),
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "critical" => Some(Self::High),
            _ => None,
        }
    }

    /// Risk implied by hop distance alone.
    pub fn from_hops(hops: u64) -> Self {
        match hops {
            0 | 1 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn is_acceptable(self) -> bool {
        matches!(self, Self::Safe | Self::Low)
    }
}

impl fmt::Display for ExposureRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The gate's reading of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureAssessment {
    pub risk: ExposureRisk,
    pub hops: Option<u64>,
    pub reason: String,
    pub calls: CallCounts,
}

impl ExposureAssessment {
    pub fn verdict(&self) -> GateVerdict {
        let mut detail = format!("risk {}", self.risk);
        if let Some(hops) = self.hops {
            detail.push_str(&format!(", {hops} hop(s)"));
        }
        if !self.reason.is_empty() {
            detail.push_str(&format!(": {}", self.reason));
        }
        if self.risk.is_acceptable() {
            GateVerdict::pass(GATE, detail)
        } else {
            GateVerdict::reject(GATE, detail)
        }
    }
}

pub struct RootAnswerExposureValidator {
    generator: Arc<dyn TextGenerator>,
    config: GenerationConfig,
}

impl RootAnswerExposureValidator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }

    /// Assess `question` (answered by `answer`) against the tree's `root_answer`.
    /// `chain` lists the existing questions from the root down to the parent.
    pub async fn assess(
        &self,
        question: &str,
        answer: &str,
        root_answer: &str,
        chain: &[String],
    ) -> ExposureAssessment {
        if text::contains_phrase(question, root_answer) {
            return ExposureAssessment {
                risk: ExposureRisk::High,
                hops: Some(0),
                reason: format!("question mentions \"{root_answer}\""),
                calls: CallCounts::default(),
            };
        }
        if text::normalize(answer) == text::normalize(root_answer) {
            return ExposureAssessment {
                risk: ExposureRisk::High,
                hops: Some(0),
                reason: "answer is the root answer".to_string(),
                calls: CallCounts::default(),
            };
        }

        let prompt = prompts::exposure_prompt(question, answer, root_answer, chain);
        let reply = generate_text(
            self.generator.as_ref(),
            &prompt,
            self.config.validation_temperature,
            self.config.max_tokens,
        )
        .await;
        let calls = CallCounts::oracle(1);

        let Some(reply) = reply else {
            return ExposureAssessment {
                risk: ExposureRisk::Unknown,
                hops: None,
                reason: "oracle unavailable".to_string(),
                calls,
            };
        };

        let (risk, hops, reason) = parse_exposure(&reply);
        debug!(%risk, ?hops, "Exposure judged");
        ExposureAssessment {
            risk,
            hops,
            reason,
            calls,
        }
    }
}

/// Read risk, hops and reason from a reply. A stated risk wins over hops.
fn parse_exposure(reply: &str) -> (ExposureRisk, Option<u64>, String) {
    if let Some((value, _)) = parse::json_value(reply) {
        let hops = parse::f64_field(&value, "hops")
            .filter(|h| *h >= 0.0)
            .map(|h| h as u64);
        let reason = parse::str_field(&value, "reason").unwrap_or_default();
        let risk = parse::str_field(&value, "risk")
            .and_then(|r| ExposureRisk::from_label(&r))
            .or_else(|| hops.map(ExposureRisk::from_hops))
            .unwrap_or(ExposureRisk::Unknown);
        return (risk, hops, reason);
    }

    let hops = parse::labelled_value(reply, &["hops", "hop count"])
        .and_then(|h| h.split_whitespace().next().and_then(|n| n.parse::<u64>().ok()));
    let reason = parse::labelled_value(reply, &["reason"]).unwrap_or_default();
    let risk = parse::labelled_value(reply, &["risk", "risk level", "exposure"])
        .and_then(|r| ExposureRisk::from_label(&r))
        .or_else(|| hops.map(ExposureRisk::from_hops))
        .unwrap_or(ExposureRisk::Unknown);
    (risk, hops, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockTextGenerator;

    fn validator(
        generator: MockTextGenerator,
    ) -> (RootAnswerExposureValidator, Arc<MockTextGenerator>) {
        let generator = Arc::new(generator);
        (
            RootAnswerExposureValidator::new(generator.clone(), GenerationConfig::default()),
            generator,
        )
    }

    #[tokio::test]
    async fn test_direct_mention_needs_no_oracle() {
        let (v, generator) = validator(MockTextGenerator::failing());
        let assessment = v
            .assess("Which city hosts Tesla's gigafactory?", "Austin", "Tesla", &[])
            .await;
        assert_eq!(assessment.risk, ExposureRisk::High);
        assert!(!assessment.verdict().passed);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_low_risk_passes() {
        let (v, _) = validator(MockTextGenerator::new().on(
            prompts::TASK_EXPOSURE,
            r#"{"hops": 3, "risk": "low", "reason": "three hops away"}"#,
        ));
        let assessment = v
            .assess("Which Texas city hosts SXSW?", "Austin", "Tesla", &["Root?".into()])
            .await;
        assert_eq!(assessment.risk, ExposureRisk::Low);
        assert_eq!(assessment.hops, Some(3));
        assert!(assessment.verdict().passed);
        assert_eq!(assessment.calls.oracle, 1);
    }

    #[tokio::test]
    async fn test_medium_risk_rejected() {
        let (v, _) = validator(
            MockTextGenerator::new().on(prompts::TASK_EXPOSURE, "Risk: medium\nReason: close"),
        );
        let assessment = v.assess("Which city?", "Austin", "Tesla", &[]).await;
        assert_eq!(assessment.risk, ExposureRisk::Medium);
        assert!(!assessment.verdict().passed);
    }

    #[tokio::test]
    async fn test_hops_only_reply() {
        let (v, _) =
            validator(MockTextGenerator::new().on(prompts::TASK_EXPOSURE, r#"{"hops": 1}"#));
        let assessment = v.assess("Which city?", "Austin", "Tesla", &[]).await;
        assert_eq!(assessment.risk, ExposureRisk::High);
    }

    #[tokio::test]
    async fn test_unreadable_or_failed_is_conservative() {
        let (v, _) =
            validator(MockTextGenerator::new().on(prompts::TASK_EXPOSURE, "hmm, hard to say"));
        let unreadable = v.assess("Which city?", "Austin", "Tesla", &[]).await;
        assert_eq!(unreadable.risk, ExposureRisk::Unknown);
        assert!(!unreadable.verdict().passed);

        let (v, _) = validator(MockTextGenerator::failing());
        let failed = v.assess("Which city?", "Austin", "Tesla", &[]).await;
        assert!(!failed.verdict().passed);
        assert_eq!(failed.calls.oracle, 1);
    }
}
