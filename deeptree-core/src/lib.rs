//! # DeepTree Core
//!
//! Recursive reasoning-tree builder. Extracts short factual answers from a
//! document, builds a minimal-keyword root question for each, grows a chain
//! or fan of gated child questions, and fuses the tree into composite
//! multi-hop puzzles that still resolve to the original fact.

pub mod composite;
pub mod config;
pub mod error;
pub mod extension;
pub mod extraction;
pub mod keywords;
pub mod logging;
pub mod oracle;
pub mod parse;
pub mod persistence;
pub mod pipeline;
pub mod prompts;
pub mod root_query;
pub mod stats;
pub mod text;
pub mod topology;
pub mod trajectory;
pub mod tree;
pub mod types;
pub mod validators;

// Re-export commonly used types at the crate root.
pub use composite::{CompositeQuerySynthesizer, nested_cumulative};
pub use config::{DeepTreeConfig, ValidatorThresholds, load_config};
pub use error::{ConfigError, DeepTreeError, OracleError, Result, TreeError};
pub use extension::{ExtensionGenerator, ExtensionOutcome, ExtensionRequest};
pub use extraction::{ExtractionMethod, ExtractionResult, ShortAnswerExtractor};
pub use keywords::{KeywordNecessityValidator, MinimizationResult, NecessityVerdict};
pub use oracle::{MockTextGenerator, MockWebSearch, SearchHit, TextGenerator, WebSearch};
pub use pipeline::{BatchReport, DocumentReport, DocumentStatus, ReasoningTreeBuilder};
pub use root_query::{RootBuild, RootOutcome, RootQueryBuilder};
pub use stats::GenerationStats;
pub use topology::{Topology, TreeTopologySelector};
pub use trajectory::{StepKind, StepOutcome, TrajectoryRecorder, TrajectoryStep};
pub use tree::{CompositeQueries, IntegrationMethod, ReasoningTree, TreeNode};
pub use types::{
    AnswerType, CallCounts, ExtensionType, GenerationMethod, MinimalKeyword, PreciseQuery,
    ShortAnswer,
};
pub use validators::GateVerdict;
