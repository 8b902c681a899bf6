//! Append-only audit log of every generation step.
//!
//! The recorder is the only state shared between concurrently built trees.
//! Appends take a single lock for both the in-memory log and the optional
//! JSONL sink, so entries from different workers never interleave. Entries
//! are never mutated after append; readers get clones.

use crate::types::CallCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Which pipeline stage produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Extraction,
    RootQuery,
    KeywordMinimization,
    TopologySelection,
    Prescreen,
    Extension,
    Composite,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::Extraction => "extraction",
            StepKind::RootQuery => "root_query",
            StepKind::KeywordMinimization => "keyword_minimization",
            StepKind::TopologySelection => "topology_selection",
            StepKind::Prescreen => "prescreen",
            StepKind::Extension => "extension",
            StepKind::Composite => "composite",
        };
        f.write_str(s)
    }
}

/// What happened at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Accepted,
    Rejected { reason: String },
    Skipped { reason: String },
    Failed { reason: String },
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted)
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Accepted => write!(f, "accepted"),
            StepOutcome::Rejected { reason } => write!(f, "rejected: {reason}"),
            StepOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            StepOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One validator's verdict, as recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub gate: String,
    pub passed: bool,
    pub detail: String,
}

/// A single recorded step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// Sequence number assigned at append, unique per recorder.
    pub seq: usize,
    pub kind: StepKind,
    pub document_id: Option<String>,
    pub tree_id: Option<String>,
    pub layer: Option<usize>,
    pub keywords: Vec<String>,
    pub parent_question: Option<String>,
    pub parent_answer: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub verdicts: Vec<VerdictRecord>,
    pub calls: CallCounts,
    pub outcome: StepOutcome,
    pub timestamp: DateTime<Utc>,
}

impl TrajectoryStep {
    /// Start a step; the builder methods fill in the rest.
    pub fn new(kind: StepKind, outcome: StepOutcome) -> Self {
        Self {
            seq: 0,
            kind,
            document_id: None,
            tree_id: None,
            layer: None,
            keywords: Vec::new(),
            parent_question: None,
            parent_answer: None,
            question: None,
            answer: None,
            verdicts: Vec::new(),
            calls: CallCounts::default(),
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn document(mut self, id: &str) -> Self {
        self.document_id = Some(id.to_string());
        self
    }

    pub fn tree(mut self, id: &str) -> Self {
        self.tree_id = Some(id.to_string());
        self
    }

    pub fn layer(mut self, layer: usize) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn parent(mut self, question: &str, answer: &str) -> Self {
        self.parent_question = Some(question.to_string());
        self.parent_answer = Some(answer.to_string());
        self
    }

    pub fn result(mut self, question: &str, answer: &str) -> Self {
        self.question = Some(question.to_string());
        self.answer = Some(answer.to_string());
        self
    }

    pub fn verdicts(mut self, verdicts: Vec<VerdictRecord>) -> Self {
        self.verdicts = verdicts;
        self
    }

    pub fn calls(mut self, calls: CallCounts) -> Self {
        self.calls = calls;
        self
    }
}

#[derive(Default)]
struct Inner {
    steps: Vec<TrajectoryStep>,
    sink: Option<PathBuf>,
}

/// Shared, append-only trajectory log. Cloning shares the same log.
#[derive(Clone, Default)]
pub struct TrajectoryRecorder {
    inner: Arc<Mutex<Inner>>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that also appends each step to a JSONL file.
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                steps: Vec::new(),
                sink: Some(path.into()),
            })),
        }
    }

    /// Append a step and return its sequence number.
    ///
    /// A failing sink is logged and does not lose the in-memory entry.
    pub fn record(&self, mut step: TrajectoryStep) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = inner.steps.len();
        step.seq = seq;
        if let Some(path) = &inner.sink
            && let Err(e) = crate::persistence::append_json_line(path, &step)
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to append trajectory step");
        }
        inner.steps.push(step);
        seq
    }

    /// A copy of every step recorded so far.
    pub fn snapshot(&self) -> Vec<TrajectoryStep> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .steps
            .clone()
    }

    /// Steps belonging to one tree, in append order.
    pub fn for_tree(&self, tree_id: &str) -> Vec<TrajectoryStep> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .steps
            .iter()
            .filter(|s| s.tree_id.as_deref() == Some(tree_id))
            .cloned()
            .collect()
    }

    /// Steps belonging to one document, in append order.
    pub fn for_document(&self, document_id: &str) -> Vec<TrajectoryStep> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .steps
            .iter()
            .filter(|s| s.document_id.as_deref() == Some(document_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
