//! Gatekeepers for extension candidates.
//!
//! A candidate child question joins a tree only if it passes all three
//! gates: [`correlation`], [`circular`] and [`exposure`]. [`prescreen`] runs
//! the cheap circularity heuristics before any search call is spent.

pub mod circular;
pub mod correlation;
pub mod exposure;
pub mod prescreen;

pub use circular::CircularReasoningValidator;
pub use correlation::CorrelationValidator;
pub use exposure::{ExposureRisk, RootAnswerExposureValidator};
pub use prescreen::{CircularProblemHandler, PrescreenResult};

use crate::trajectory::VerdictRecord;
use serde::{Deserialize, Serialize};

/// One gate's decision on a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub gate: String,
    pub passed: bool,
    pub detail: String,
}

impl GateVerdict {
    pub fn pass(gate: &str, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn reject(gate: &str, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

impl From<&GateVerdict> for VerdictRecord {
    fn from(v: &GateVerdict) -> Self {
        VerdictRecord {
            gate: v.gate.clone(),
            passed: v.passed,
            detail: v.detail.clone(),
        }
    }
}
