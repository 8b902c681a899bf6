//! Extension generation: one child question per (parent, keyword) slot.
//!
//! The keyword of the parent becomes the child's answer. The flow is
//! prescreen → search context → oracle question → the three gates →
//! keyword minimization of the child. Every failure path yields an outcome
//! value; a rejected slot is simply empty.

use crate::config::{DeepTreeConfig, GenerationConfig, SearchConfig};
use crate::keywords::{KeywordNecessityValidator, MinimizationResult};
use crate::oracle::{TextGenerator, WebSearch, generate_text, search_context};
use crate::prompts;
use crate::root_query::{candidate_keywords, parse_candidate, validate_question};
use crate::trajectory::{StepKind, StepOutcome, TrajectoryStep, VerdictRecord};
use crate::types::{CallCounts, ExtensionType, PreciseQuery};
use crate::validators::{
    CircularProblemHandler, CircularReasoningValidator, CorrelationValidator, GateVerdict,
    PrescreenResult, RootAnswerExposureValidator,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One slot to fill.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionRequest<'a> {
    pub parent: &'a PreciseQuery,
    /// Keyword of `parent` the child must resolve to.
    pub keyword: &'a str,
    pub extension_type: ExtensionType,
    /// Questions from the root down to `parent`, inclusive.
    pub lineage: &'a [String],
    /// Answer of the tree's root query.
    pub root_answer: &'a str,
}

#[derive(Debug, Clone)]
pub enum ExtensionOutcome {
    Accepted(PreciseQuery),
    /// A candidate was produced and failed `gate`.
    Rejected { gate: String, reason: String },
    /// The prescreen predicted circularity; nothing was spent.
    Skipped { reason: String },
    /// No usable candidate came back.
    Failed { reason: String },
}

impl ExtensionOutcome {
    pub fn accepted(&self) -> Option<&PreciseQuery> {
        match self {
            ExtensionOutcome::Accepted(query) => Some(query),
            _ => None,
        }
    }
}

/// Everything one slot attempt produced.
#[derive(Debug, Clone)]
pub struct ExtensionAttempt {
    pub keyword: String,
    pub extension_type: ExtensionType,
    pub layer: usize,
    pub outcome: ExtensionOutcome,
    pub prescreen: PrescreenResult,
    pub question: Option<String>,
    pub verdicts: Vec<GateVerdict>,
    pub minimization: Option<MinimizationResult>,
    pub calls: CallCounts,
}

impl ExtensionAttempt {
    /// Trajectory entry for this attempt, without document or tree ids.
    pub fn trajectory_step(&self, parent: &PreciseQuery) -> TrajectoryStep {
        let (kind, outcome) = match &self.outcome {
            ExtensionOutcome::Accepted(_) => (StepKind::Extension, StepOutcome::Accepted),
            ExtensionOutcome::Rejected { gate, reason } => (
                StepKind::Extension,
                StepOutcome::Rejected {
                    reason: format!("{gate}: {reason}"),
                },
            ),
            ExtensionOutcome::Skipped { reason } => (
                StepKind::Prescreen,
                StepOutcome::Skipped {
                    reason: reason.clone(),
                },
            ),
            ExtensionOutcome::Failed { reason } => (
                StepKind::Extension,
                StepOutcome::Failed {
                    reason: reason.clone(),
                },
            ),
        };
        let keywords = match &self.outcome {
            ExtensionOutcome::Accepted(query) => query.keyword_texts(),
            _ => vec![self.keyword.clone()],
        };
        let mut step = TrajectoryStep::new(kind, outcome)
            .layer(self.layer)
            .keywords(keywords)
            .parent(&parent.text, &parent.answer)
            .verdicts(self.verdicts.iter().map(VerdictRecord::from).collect())
            .calls(self.calls);
        if let Some(question) = &self.question {
            step = step.result(question, &self.keyword);
        }
        step
    }
}

/// Produces gated Series and Parallel children.
pub struct ExtensionGenerator {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn WebSearch>,
    keywords: Arc<KeywordNecessityValidator>,
    prescreen: CircularProblemHandler,
    correlation: CorrelationValidator,
    circular: CircularReasoningValidator,
    exposure: RootAnswerExposureValidator,
    generation: GenerationConfig,
    search_config: SearchConfig,
}

impl ExtensionGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn WebSearch>,
        keywords: Arc<KeywordNecessityValidator>,
        config: &DeepTreeConfig,
    ) -> Self {
        Self {
            exposure: RootAnswerExposureValidator::new(
                generator.clone(),
                config.generation.clone(),
            ),
            generator,
            search,
            keywords,
            prescreen: CircularProblemHandler::new(&config.thresholds),
            correlation: CorrelationValidator::new(config.thresholds.clone()),
            circular: CircularReasoningValidator::new(config.thresholds.clone()),
            generation: config.generation.clone(),
            search_config: config.search.clone(),
        }
    }

    pub async fn extend(&self, request: &ExtensionRequest<'_>) -> ExtensionAttempt {
        let parent = request.parent;
        let keyword = request.keyword;
        let layer = parent.layer + 1;

        let prescreen = self.prescreen.assess(keyword, &parent.text, &parent.answer);
        let mut attempt = ExtensionAttempt {
            keyword: keyword.to_string(),
            extension_type: request.extension_type,
            layer,
            outcome: ExtensionOutcome::Failed {
                reason: "not attempted".to_string(),
            },
            prescreen,
            question: None,
            verdicts: Vec::new(),
            minimization: None,
            calls: CallCounts::default(),
        };

        if !attempt.prescreen.proceed {
            debug!(keyword, risk = attempt.prescreen.risk, "Prescreen skipped keyword");
            attempt.outcome = ExtensionOutcome::Skipped {
                reason: format!(
                    "circular risk {:.2}: {}",
                    attempt.prescreen.risk,
                    attempt.prescreen.reasons.join("; ")
                ),
            };
            return attempt;
        }

        let context =
            search_context(self.search.as_ref(), keyword, self.search_config.max_results).await;
        attempt.calls.search += 1;

        let prompt = prompts::extension_prompt(
            keyword,
            &parent.text,
            &parent.answer,
            context.as_deref(),
            request.extension_type,
        );
        let reply = generate_text(
            self.generator.as_ref(),
            &prompt,
            self.generation.temperature,
            self.generation.max_tokens,
        )
        .await;
        attempt.calls.oracle += 1;

        let Some(candidate) = reply.as_deref().and_then(parse_candidate) else {
            warn!(keyword, layer, "Extension generation unusable");
            attempt.outcome = ExtensionOutcome::Failed {
                reason: "oracle produced no usable question".to_string(),
            };
            return attempt;
        };
        let question = candidate.question.clone();
        attempt.question = Some(question.clone());

        if let Err(reason) = validate_question(&question, keyword) {
            attempt.verdicts.push(GateVerdict::reject("validation", reason.clone()));
            attempt.outcome = ExtensionOutcome::Rejected {
                gate: "validation".to_string(),
                reason,
            };
            return attempt;
        }

        // Lexical gates are cheap, so both run and both are recorded.
        let others: Vec<&str> = request.lineage.iter().map(String::as_str).collect();
        attempt.verdicts.push(self.correlation.check(&question, &others));
        attempt
            .verdicts
            .push(self.circular.check(&parent.text, &parent.answer, &question, keyword));
        if attempt.verdicts.iter().all(|v| v.passed) {
            let exposure = self
                .exposure
                .assess(&question, keyword, request.root_answer, request.lineage)
                .await;
            attempt.calls += exposure.calls;
            attempt.verdicts.push(exposure.verdict());
        }

        if let Some(failed) = attempt.verdicts.iter().find(|v| !v.passed) {
            debug!(
                keyword,
                layer,
                gate = failed.gate.as_str(),
                detail = failed.detail.as_str(),
                "Extension candidate rejected"
            );
            attempt.outcome = ExtensionOutcome::Rejected {
                gate: failed.gate.clone(),
                reason: failed.detail.clone(),
            };
            return attempt;
        }

        let listed = candidate_keywords(&question, &candidate.keywords, keyword);
        let minimization = self.keywords.minimize(&question, keyword, &listed).await;
        attempt.calls += minimization.calls;

        let query = PreciseQuery::new(
            question,
            keyword,
            minimization.keywords.clone(),
            candidate.method,
            layer,
            Some(parent.id.clone()),
            request.extension_type,
        );
        info!(
            keyword,
            layer,
            branch = %request.extension_type,
            keywords = query.keywords.len(),
            "Extension accepted"
        );
        attempt.minimization = Some(minimization);
        attempt.outcome = ExtensionOutcome::Accepted(query);
        attempt
    }
}
