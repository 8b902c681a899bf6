//! Tree topology: chain or fan, chosen from the root's minimal keywords.
//!
//! - One keyword: a chain, Root → Series (layer 1) → Series (layer 2). Each
//!   step extends from the new node's own minimal keywords.
//! - Two or more: a fan, Root → {Series from keyword 0, Parallel from each
//!   further keyword} at layer 1, each deepened by one Series step at layer 2.
//!
//! Fan branches share nothing but the trajectory log, so they are built
//! concurrently and attached to the tree afterwards, in slot order. A branch
//! that fails any gate stops there; the tree stays valid with fewer nodes.

use crate::config::{DeepTreeConfig, TopologyConfig};
use crate::extension::{ExtensionGenerator, ExtensionOutcome, ExtensionRequest};
use crate::stats::GenerationStats;
use crate::trajectory::{StepKind, StepOutcome, TrajectoryRecorder, TrajectoryStep, VerdictRecord};
use crate::tree::{CHAIN_MAX_LAYERS, FAN_MAX_LAYERS, ReasoningTree};
use crate::types::{ExtensionType, PreciseQuery};
use crate::validators::CorrelationValidator;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Chain,
    Fan,
}

impl Topology {
    pub fn for_root(root: &PreciseQuery) -> Self {
        if root.keywords.len() <= 1 {
            Topology::Chain
        } else {
            Topology::Fan
        }
    }

    pub fn max_layers(self) -> usize {
        match self {
            Topology::Chain => CHAIN_MAX_LAYERS,
            Topology::Fan => FAN_MAX_LAYERS,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Chain => write!(f, "chain"),
            Topology::Fan => write!(f, "fan"),
        }
    }
}

/// What growing one tree cost and produced.
#[derive(Debug, Clone)]
pub struct GrowthReport {
    pub topology: Topology,
    pub stats: GenerationStats,
}

/// Ids stamped on every trajectory step of one tree.
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    document_id: &'a str,
    tree_id: &'a str,
    root_answer: &'a str,
}

/// A fan branch built off-tree.
struct Branch {
    extension_type: ExtensionType,
    first: Option<PreciseQuery>,
    second: Option<PreciseQuery>,
    stats: GenerationStats,
}

pub struct TreeTopologySelector {
    extension: Arc<ExtensionGenerator>,
    correlation: CorrelationValidator,
    recorder: TrajectoryRecorder,
    config: TopologyConfig,
    check_siblings: bool,
}

impl TreeTopologySelector {
    pub fn new(
        extension: Arc<ExtensionGenerator>,
        recorder: TrajectoryRecorder,
        config: &DeepTreeConfig,
    ) -> Self {
        Self {
            extension,
            correlation: CorrelationValidator::new(config.thresholds.clone()),
            recorder,
            config: config.topology.clone(),
            check_siblings: config.thresholds.check_sibling_correlation,
        }
    }

    /// Grow `tree` from its root according to the root's topology.
    pub async fn grow(&self, tree: &mut ReasoningTree, document_id: &str) -> GrowthReport {
        let root = tree.root().query.clone();
        let topology = Topology::for_root(&root);
        let tree_id = tree.id().to_string();
        let scope = Scope {
            document_id,
            tree_id: &tree_id,
            root_answer: &root.answer,
        };

        let branches = match topology {
            Topology::Chain => 1,
            Topology::Fan => self.fan_width(root.keywords.len()),
        };
        self.recorder.record(
            TrajectoryStep::new(StepKind::TopologySelection, StepOutcome::Accepted)
                .document(document_id)
                .tree(&tree_id)
                .layer(0)
                .keywords(root.keyword_texts())
                .parent(&root.text, &root.answer)
                .verdicts(vec![VerdictRecord {
                    gate: "topology".to_string(),
                    passed: true,
                    detail: format!(
                        "{topology}: {branches} branch(es), max {} layers",
                        tree.max_layers()
                    ),
                }]),
        );
        info!(tree_id = %tree_id, %topology, branches, "Topology selected");

        let stats = match topology {
            Topology::Chain => self.grow_chain(tree, &root, scope).await,
            Topology::Fan => self.grow_fan(tree, &root, scope).await,
        };
        GrowthReport { topology, stats }
    }

    /// One branch per keyword unless a cap is configured.
    fn fan_width(&self, keywords: usize) -> usize {
        match self.config.max_parallel_branches {
            Some(cap) => cap.max(1).min(keywords),
            None => keywords,
        }
    }

    async fn grow_chain(
        &self,
        tree: &mut ReasoningTree,
        root: &PreciseQuery,
        scope: Scope<'_>,
    ) -> GenerationStats {
        let mut stats = GenerationStats::default();
        let mut parent = root.clone();
        let mut lineage = vec![root.text.clone()];

        while parent.layer < tree.max_layers() {
            let candidates = parent.keyword_texts();
            if candidates.is_empty() {
                break;
            }
            let (child, slot_stats) = self
                .fill_slot(scope, &parent, &candidates, ExtensionType::Series, &lineage)
                .await;
            stats.merge(&slot_stats);
            let Some(child) = child else {
                break;
            };
            match tree.attach(child.clone()) {
                Ok(_) => {
                    stats.nodes_accepted += 1;
                    lineage.push(child.text.clone());
                    parent = child;
                }
                Err(e) => {
                    warn!(tree_id = scope.tree_id, error = %e, "Chain node not attached");
                    break;
                }
            }
        }
        stats
    }

    async fn grow_fan(
        &self,
        tree: &mut ReasoningTree,
        root: &PreciseQuery,
        scope: Scope<'_>,
    ) -> GenerationStats {
        let keywords = root.keyword_texts();
        let width = self.fan_width(keywords.len());
        // Keywords beyond the branch cap are fallbacks for the Series slot.
        let spare = &keywords[width..];
        let slots: Vec<(ExtensionType, Vec<String>)> = keywords[..width]
            .iter()
            .enumerate()
            .map(|(i, keyword)| {
                if i == 0 {
                    let mut candidates = vec![keyword.clone()];
                    candidates.extend(spare.iter().cloned());
                    (ExtensionType::Series, candidates)
                } else {
                    (ExtensionType::Parallel, vec![keyword.clone()])
                }
            })
            .collect();

        let lineage = vec![root.text.clone()];
        let deepen = tree.max_layers() >= 2;
        let branches = join_all(slots.iter().map(|(extension_type, candidates)| {
            self.grow_branch(scope, root, candidates, *extension_type, &lineage, deepen)
        }))
        .await;

        let mut stats = GenerationStats::default();
        let mut siblings: Vec<String> = Vec::new();
        for branch in branches {
            stats.merge(&branch.stats);
            let Some(first) = branch.first else {
                continue;
            };

            if self.check_siblings && branch.extension_type == ExtensionType::Parallel {
                let others: Vec<&str> = siblings.iter().map(String::as_str).collect();
                let verdict = self.correlation.check(&first.text, &others);
                if !verdict.passed {
                    stats.reject("sibling_correlation");
                    self.recorder.record(
                        TrajectoryStep::new(
                            StepKind::Extension,
                            StepOutcome::Rejected {
                                reason: format!("sibling correlation: {}", verdict.detail),
                            },
                        )
                        .document(scope.document_id)
                        .tree(scope.tree_id)
                        .layer(first.layer)
                        .keywords(first.keyword_texts())
                        .parent(&root.text, &root.answer)
                        .result(&first.text, &first.answer)
                        .verdicts(vec![VerdictRecord::from(&verdict)]),
                    );
                    continue;
                }
            }

            if let Err(e) = tree.attach(first.clone()) {
                warn!(tree_id = scope.tree_id, error = %e, "Fan branch not attached");
                continue;
            }
            stats.nodes_accepted += 1;
            siblings.push(first.text.clone());

            if let Some(second) = branch.second {
                match tree.attach(second) {
                    Ok(_) => stats.nodes_accepted += 1,
                    Err(e) => {
                        warn!(tree_id = scope.tree_id, error = %e, "Deepening node not attached")
                    }
                }
            }
        }
        stats
    }

    /// One layer-1 slot plus its single Series deepening.
    async fn grow_branch(
        &self,
        scope: Scope<'_>,
        root: &PreciseQuery,
        candidates: &[String],
        extension_type: ExtensionType,
        lineage: &[String],
        deepen: bool,
    ) -> Branch {
        let (first, mut stats) = self
            .fill_slot(scope, root, candidates, extension_type, lineage)
            .await;

        let mut second = None;
        if deepen && let Some(node) = &first {
            let mut deeper_lineage = lineage.to_vec();
            deeper_lineage.push(node.text.clone());
            let (child, slot_stats) = self
                .fill_slot(
                    scope,
                    node,
                    &node.keyword_texts(),
                    ExtensionType::Series,
                    &deeper_lineage,
                )
                .await;
            stats.merge(&slot_stats);
            second = child;
        }

        Branch {
            extension_type,
            first,
            second,
            stats,
        }
    }

    /// Try up to `slot_attempts` keywords of `parent` until one yields an
    /// accepted child. Every attempt is recorded.
    async fn fill_slot(
        &self,
        scope: Scope<'_>,
        parent: &PreciseQuery,
        candidates: &[String],
        extension_type: ExtensionType,
        lineage: &[String],
    ) -> (Option<PreciseQuery>, GenerationStats) {
        let mut stats = GenerationStats::default();
        for keyword in candidates.iter().take(self.config.slot_attempts) {
            let attempt = self
                .extension
                .extend(&ExtensionRequest {
                    parent,
                    keyword,
                    extension_type,
                    lineage,
                    root_answer: scope.root_answer,
                })
                .await;

            stats.add_calls(attempt.calls);
            match &attempt.outcome {
                ExtensionOutcome::Accepted(_) => {}
                ExtensionOutcome::Rejected { gate, .. } => stats.reject(gate),
                ExtensionOutcome::Skipped { .. } => stats.prescreen_skips += 1,
                ExtensionOutcome::Failed { .. } => stats.generation_failures += 1,
            }
            self.recorder.record(
                attempt
                    .trajectory_step(parent)
                    .document(scope.document_id)
                    .tree(scope.tree_id),
            );

            if let ExtensionOutcome::Accepted(query) = attempt.outcome {
                return (Some(query), stats);
            }
        }
        (None, stats)
    }
}
