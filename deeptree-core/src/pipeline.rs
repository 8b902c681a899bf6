//! Document-level orchestration.
//!
//! extract → (per short answer, concurrently) root query → topology growth →
//! composite synthesis → seal → persist. Trees share nothing but the
//! trajectory recorder, so a failure in one never touches the others, and
//! the worst outcome for a document is zero trees.

use crate::composite::CompositeQuerySynthesizer;
use crate::config::DeepTreeConfig;
use crate::error::Result;
use crate::extension::ExtensionGenerator;
use crate::extraction::{ExtractionMethod, ShortAnswerExtractor};
use crate::keywords::{KeywordNecessityValidator, MinimizationResult, NecessityVerdict};
use crate::oracle::{TextGenerator, WebSearch, search_context};
use crate::root_query::{RootOutcome, RootQueryBuilder};
use crate::stats::GenerationStats;
use crate::topology::{Topology, TreeTopologySelector};
use crate::trajectory::{StepKind, StepOutcome, TrajectoryRecorder, TrajectoryStep, VerdictRecord};
use crate::tree::{IntegrationMethod, ReasoningTree};
use crate::types::ShortAnswer;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// At least one tree was sealed.
    Completed,
    /// Short answers were found but every root or tree failed.
    NoTrees,
    /// Extraction found nothing; processing stopped.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub document_id: String,
    pub status: DocumentStatus,
    pub extraction_method: ExtractionMethod,
    pub trees: Vec<ReasoningTree>,
    /// Files sealed trees were written to.
    pub saved: Vec<PathBuf>,
    pub stats: GenerationStats,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub stats: GenerationStats,
}

/// Builds reasoning trees from documents.
pub struct ReasoningTreeBuilder {
    config: DeepTreeConfig,
    search: Arc<dyn WebSearch>,
    extractor: ShortAnswerExtractor,
    roots: RootQueryBuilder,
    topology: TreeTopologySelector,
    composite: CompositeQuerySynthesizer,
    recorder: TrajectoryRecorder,
}

impl ReasoningTreeBuilder {
    /// Build with a recorder that appends to `config.trajectory.log_path`
    /// when one is configured.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn WebSearch>,
        config: DeepTreeConfig,
    ) -> Result<Self> {
        let recorder = match &config.trajectory.log_path {
            Some(path) => TrajectoryRecorder::with_sink(path),
            None => TrajectoryRecorder::new(),
        };
        Self::with_recorder(generator, search, config, recorder)
    }

    pub fn with_recorder(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn WebSearch>,
        config: DeepTreeConfig,
        recorder: TrajectoryRecorder,
    ) -> Result<Self> {
        config.ensure_valid()?;
        for warning in config.validate() {
            warn!(warning = warning.as_str(), "Configuration warning");
        }

        let keywords = Arc::new(KeywordNecessityValidator::new(
            generator.clone(),
            config.generation.clone(),
            config.keywords.clone(),
        ));
        let extension = Arc::new(ExtensionGenerator::new(
            generator.clone(),
            search.clone(),
            keywords.clone(),
            &config,
        ));

        Ok(Self {
            extractor: ShortAnswerExtractor::new(generator.clone(), config.generation.clone()),
            roots: RootQueryBuilder::new(generator.clone(), keywords, config.generation.clone()),
            topology: TreeTopologySelector::new(extension, recorder.clone(), &config),
            composite: CompositeQuerySynthesizer::new(
                generator,
                config.generation.clone(),
                config.composite.clone(),
            ),
            search,
            recorder,
            config,
        })
    }

    pub fn config(&self) -> &DeepTreeConfig {
        &self.config
    }

    pub fn recorder(&self) -> &TrajectoryRecorder {
        &self.recorder
    }

    /// Build every tree one document supports.
    pub async fn process_document(&self, document_id: &str, text: &str) -> DocumentReport {
        let mut stats = GenerationStats {
            documents: 1,
            ..Default::default()
        };

        let extraction = self.extractor.extract(text).await;
        stats.add_calls(extraction.calls);
        stats.short_answers = extraction.answers.len();
        let answer_texts: Vec<String> = extraction.answers.iter().map(|a| a.text.clone()).collect();
        let outcome = if extraction.is_exhausted() {
            StepOutcome::Failed {
                reason: "no short answers found".to_string(),
            }
        } else {
            StepOutcome::Accepted
        };
        self.recorder.record(
            TrajectoryStep::new(StepKind::Extraction, outcome)
                .document(document_id)
                .keywords(answer_texts)
                .verdicts(vec![VerdictRecord {
                    gate: "extraction".to_string(),
                    passed: !extraction.is_exhausted(),
                    detail: format!("{:?}", extraction.method),
                }])
                .calls(extraction.calls),
        );

        if extraction.is_exhausted() {
            warn!(document_id, "No short answers; document yields no trees");
            stats.documents_failed = 1;
            return DocumentReport {
                document_id: document_id.to_string(),
                status: DocumentStatus::Exhausted,
                extraction_method: extraction.method,
                trees: Vec::new(),
                saved: Vec::new(),
                stats,
            };
        }

        let results = join_all(
            extraction
                .answers
                .iter()
                .map(|answer| self.build_tree(document_id, answer)),
        )
        .await;

        let mut trees = Vec::new();
        let mut saved = Vec::new();
        for (tree, path, tree_stats) in results {
            stats.merge(&tree_stats);
            trees.extend(tree);
            saved.extend(path);
        }

        let status = if trees.is_empty() {
            DocumentStatus::NoTrees
        } else {
            DocumentStatus::Completed
        };
        info!(
            document_id,
            trees = trees.len(),
            nodes = stats.nodes_accepted,
            rejections = stats.total_rejections(),
            acceptance = stats.acceptance_rate(),
            "Document processed"
        );
        DocumentReport {
            document_id: document_id.to_string(),
            status,
            extraction_method: extraction.method,
            trees,
            saved,
            stats,
        }
    }

    /// Process documents one after another. A document that yields nothing
    /// never stops the batch.
    pub async fn process_batch(&self, documents: &[(String, String)]) -> BatchReport {
        let mut batch = BatchReport::default();
        for (id, text) in documents {
            let report = self.process_document(id, text).await;
            batch.stats.merge(&report.stats);
            batch.documents.push(report);
        }
        info!(
            documents = batch.documents.len(),
            trees = batch.stats.trees,
            failed = batch.stats.documents_failed,
            acceptance = batch.stats.acceptance_rate(),
            "Batch processed"
        );
        batch
    }

    async fn build_tree(
        &self,
        document_id: &str,
        answer: &ShortAnswer,
    ) -> (Option<ReasoningTree>, Option<PathBuf>, GenerationStats) {
        let mut stats = GenerationStats::default();
        let tree_id = Uuid::new_v4().to_string();

        let context = if self.config.search.root_context {
            stats.search_calls += 1;
            search_context(
                self.search.as_ref(),
                &answer.text,
                self.config.search.max_results,
            )
            .await
        } else {
            None
        };

        let build = self.roots.build(answer, context.as_deref()).await;
        stats.add_calls(build.calls);
        if let Some(minimization) = &build.minimization {
            self.recorder
                .record(minimization_step(minimization).document(document_id).tree(&tree_id));
        }

        let root_step = |outcome| {
            TrajectoryStep::new(StepKind::RootQuery, outcome)
                .document(document_id)
                .tree(&tree_id)
                .layer(0)
                .calls(build.calls)
        };
        let root = match build.outcome {
            RootOutcome::Built(query) => query,
            RootOutcome::Rejected { reason } => {
                warn!(
                    answer = answer.text.as_str(),
                    reason = reason.as_str(),
                    "Root query rejected"
                );
                stats.roots_rejected += 1;
                self.recorder.record(root_step(StepOutcome::Rejected { reason }));
                return (None, None, stats);
            }
            RootOutcome::Failed { reason } => {
                warn!(
                    answer = answer.text.as_str(),
                    reason = reason.as_str(),
                    "Root query failed"
                );
                stats.roots_rejected += 1;
                self.recorder.record(root_step(StepOutcome::Failed { reason }));
                return (None, None, stats);
            }
        };
        stats.roots_built += 1;
        self.recorder.record(
            root_step(StepOutcome::Accepted)
                .keywords(root.keyword_texts())
                .result(&root.text, &root.answer),
        );

        let topology = Topology::for_root(&root);
        let mut tree = match ReasoningTree::new(tree_id.clone(), root, topology.max_layers()) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(tree_id = %tree_id, error = %e, "Tree not created");
                return (None, None, stats);
            }
        };
        if let Err(e) = tree.set_source_answer(answer.clone()) {
            warn!(tree_id = %tree_id, error = %e, "Source answer not recorded");
        }

        let growth = self.topology.grow(&mut tree, document_id).await;
        stats.merge(&growth.stats);

        let composite = self.composite.synthesize(&tree).await;
        stats.add_calls(composite.calls);
        let detail = composite
            .fallback_reason
            .clone()
            .unwrap_or_else(|| "integrated by oracle".to_string());
        self.recorder.record(
            TrajectoryStep::new(StepKind::Composite, StepOutcome::Accepted)
                .document(document_id)
                .tree(&tree_id)
                .layer(tree.max_layer())
                .result(
                    &composite.queries.llm_integrated,
                    &composite.queries.llm_integrated_answer,
                )
                .verdicts(vec![VerdictRecord {
                    gate: "integration".to_string(),
                    passed: composite.queries.integration_method == IntegrationMethod::Oracle,
                    detail,
                }])
                .calls(composite.calls),
        );

        let trajectory = self.recorder.for_tree(&tree_id);
        if let Err(e) = tree.seal(composite.queries, trajectory) {
            warn!(tree_id = %tree_id, error = %e, "Tree not sealed");
            return (None, None, stats);
        }
        stats.trees += 1;
        info!(
            tree_id = %tree_id,
            answer = answer.text.as_str(),
            %topology,
            nodes = tree.len(),
            layers = tree.layer_count(),
            "Tree sealed"
        );

        let saved = match &self.config.output_dir {
            Some(dir) => match tree.save(dir) {
                Ok(path) => {
                    debug!(path = %path.display(), "Tree saved");
                    Some(path)
                }
                Err(e) => {
                    warn!(tree_id = %tree_id, error = %e, "Failed to save tree");
                    None
                }
            },
            None => None,
        };
        (Some(tree), saved, stats)
    }
}

fn minimization_step(minimization: &MinimizationResult) -> TrajectoryStep {
    let outcome = if minimization.keywords.is_empty() {
        StepOutcome::Rejected {
            reason: "no keyword survived".to_string(),
        }
    } else {
        StepOutcome::Accepted
    };
    let mut verdicts: Vec<VerdictRecord> = minimization
        .tests
        .iter()
        .map(|t| VerdictRecord {
            gate: "necessity".to_string(),
            passed: t.verdict == NecessityVerdict::Necessary,
            detail: format!("{}: {:?}", t.keyword, t.verdict),
        })
        .collect();
    if minimization.fallback_used {
        verdicts.push(VerdictRecord {
            gate: "necessity".to_string(),
            passed: true,
            detail: "no test proved necessity; first candidate kept".to_string(),
        });
    }
    let kept: Vec<String> = minimization.keywords.iter().map(|k| k.text.clone()).collect();
    TrajectoryStep::new(StepKind::KeywordMinimization, outcome)
        .layer(0)
        .keywords(kept)
        .verdicts(verdicts)
        .calls(minimization.calls)
}
