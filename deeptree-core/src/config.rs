//! Configuration for the reasoning-tree builder.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Files live at
//! `~/.config/deeptree/config.toml` and `<workspace>/.deeptree/config.toml`.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepTreeConfig {
    pub generation: GenerationConfig,
    pub keywords: KeywordConfig,
    pub topology: TopologyConfig,
    pub thresholds: ValidatorThresholds,
    pub search: SearchConfig,
    pub composite: CompositeConfig,
    pub trajectory: TrajectoryConfig,
    /// Directory sealed trees are written to. Nothing is persisted when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Oracle sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Temperature for creative calls (questions, composites).
    pub temperature: f32,
    /// Temperature for judgement calls (necessity, exposure).
    pub validation_temperature: f32,
    pub max_tokens: usize,
    /// How many times the root builder regenerates a rejected candidate.
    pub root_attempts: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            validation_temperature: 0.1,
            max_tokens: 1024,
            root_attempts: 2,
        }
    }
}

/// Keyword minimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Width of the necessity-test worker pool.
    pub concurrency: usize,
    /// Candidate keywords considered per query.
    pub max_candidates: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_candidates: 6,
        }
    }
}

/// Tree-shape settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Optional cap on layer-1 branches of a fan (Series plus Parallel).
    /// Unset means one branch per root keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_branches: Option<usize>,
    /// Keywords a single slot may try before its branch stops.
    pub slot_attempts: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            max_parallel_branches: None,
            slot_attempts: 2,
        }
    }
}

/// Validator thresholds. Empirical defaults, tune per corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorThresholds {
    /// Reject when content-word Jaccard overlap with an ancestor exceeds this.
    pub correlation_overlap: f64,
    /// Domain terms each question must hit in one bucket to count as shared.
    pub domain_term_min: usize,
    /// Reject when bag-of-words cosine similarity exceeds this.
    pub cosine_similarity: f64,
    /// Reject when shared content words relative to the shorter question exceed this.
    pub circular_overlap_ratio: f64,
    /// Reject when at least this many content words are shared.
    pub circular_shared_words: usize,
    /// Pre-screen risk at or above which the search call is skipped.
    pub prescreen_cutoff: f64,
    /// Also run the correlation gate between Parallel siblings.
    pub check_sibling_correlation: bool,
}

impl Default for ValidatorThresholds {
    fn default() -> Self {
        Self {
            correlation_overlap: 0.2,
            domain_term_min: 2,
            cosine_similarity: 0.3,
            circular_overlap_ratio: 0.4,
            circular_shared_words: 3,
            prescreen_cutoff: 0.8,
            check_sibling_correlation: false,
        }
    }
}

/// Web-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    /// Fetch search context for root-query generation.
    pub root_context: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            root_context: true,
        }
    }
}

/// Composite synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Integrated questions shorter than this fall back to the template.
    pub min_integrated_chars: usize,
    /// Longer integrated answers are replaced by the bare root answer.
    pub max_answer_words: usize,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            min_integrated_chars: 40,
            max_answer_words: 12,
        }
    }
}

/// Trajectory sink settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// JSONL file every step is appended to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

impl DeepTreeConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Problems are reported,
    /// not fatal; use [`DeepTreeConfig::ensure_valid`] for hard failures.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let t = &self.thresholds;
        for (name, value) in [
            ("correlation_overlap", t.correlation_overlap),
            ("cosine_similarity", t.cosine_similarity),
            ("circular_overlap_ratio", t.circular_overlap_ratio),
            ("prescreen_cutoff", t.prescreen_cutoff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(format!("thresholds.{name} ({value}) is outside [0, 1]"));
            }
        }
        if t.circular_shared_words == 0 {
            warnings.push(
                "thresholds.circular_shared_words is 0; every candidate will be rejected".into(),
            );
        }
        if self.keywords.concurrency == 0 {
            warnings.push("keywords.concurrency is 0; necessity tests cannot run".into());
        }
        if self.keywords.max_candidates == 0 {
            warnings.push("keywords.max_candidates is 0; no keyword can survive".into());
        }
        if self.generation.root_attempts == 0 {
            warnings.push("generation.root_attempts is 0; no root query will be built".into());
        }
        if self.topology.max_parallel_branches == Some(0) {
            warnings.push("topology.max_parallel_branches is 0; treated as 1".into());
        }
        if self.topology.slot_attempts == 0 {
            warnings.push("topology.slot_attempts is 0; trees will never grow".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            warnings.push(format!(
                "generation.temperature ({}) is outside [0, 2]",
                self.generation.temperature
            ));
        }
        warnings
    }

    /// Fail when the config cannot produce any tree.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        if self.keywords.concurrency == 0 || self.generation.root_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: self.validate().join("; "),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DEEPTREE_`, sections split on `__`)
/// 3. Workspace-local config (`.deeptree/config.toml`)
/// 4. User config (`~/.config/deeptree/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DeepTreeConfig>,
) -> Result<DeepTreeConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DeepTreeConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "deeptree", "deeptree") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".deeptree").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DEEPTREE_THRESHOLDS__COSINE_SIMILARITY, DEEPTREE_KEYWORDS__CONCURRENCY, ...
    figment = figment.merge(Env::prefixed("DEEPTREE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment
        .extract()
        .map_err(|e| ConfigError::Load(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = DeepTreeConfig::default();
        assert_eq!(config.thresholds.correlation_overlap, 0.2);
        assert_eq!(config.thresholds.cosine_similarity, 0.3);
        assert_eq!(config.keywords.concurrency, 3);
        assert!(!config.thresholds.check_sibling_correlation);
        assert!(config.validate().is_empty());
        assert!(config.ensure_valid().is_ok());
    }

    #[test]
    fn test_validate_reports_out_of_range() {
        let mut config = DeepTreeConfig::default();
        config.thresholds.cosine_similarity = 1.5;
        config.keywords.concurrency = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("cosine_similarity"));
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_load_config_workspace_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".deeptree");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[thresholds]\ncosine_similarity = 0.45\n\n[keywords]\nconcurrency = 5\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.thresholds.cosine_similarity, 0.45);
        assert_eq!(config.keywords.concurrency, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.thresholds.correlation_overlap, 0.2);
        assert_eq!(config.search.max_results, 3);
    }

    #[test]
    fn test_load_config_overrides_win() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut overrides = DeepTreeConfig::default();
        overrides.topology.max_parallel_branches = Some(1);
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.topology.max_parallel_branches, Some(1));
    }

    #[test]
    fn test_config_json_roundtrip_is_lossless() {
        let mut config = DeepTreeConfig::default();
        config.output_dir = Some(PathBuf::from("/tmp/trees"));
        let json = serde_json::to_string(&config).unwrap();
        let back: DeepTreeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
