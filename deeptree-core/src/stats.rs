//! Generation statistics.
//!
//! Counters are collected per tree and per document, then merged upward.
//! Rejections are counted, never surfaced as errors.

use crate::types::CallCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub documents: usize,
    /// Documents where extraction found nothing.
    pub documents_failed: usize,
    pub short_answers: usize,
    pub roots_built: usize,
    pub roots_rejected: usize,
    pub trees: usize,
    /// Non-root nodes attached to trees.
    pub nodes_accepted: usize,
    /// Rejected extension candidates, keyed by gate name.
    pub gate_rejections: BTreeMap<String, usize>,
    pub prescreen_skips: usize,
    /// Extension slots where the oracle produced nothing usable.
    pub generation_failures: usize,
    pub oracle_calls: usize,
    pub search_calls: usize,
}

impl GenerationStats {
    pub fn add_calls(&mut self, calls: CallCounts) {
        self.oracle_calls += calls.oracle;
        self.search_calls += calls.search;
    }

    pub fn reject(&mut self, gate: &str) {
        *self.gate_rejections.entry(gate.to_string()).or_insert(0) += 1;
    }

    pub fn total_rejections(&self) -> usize {
        self.gate_rejections.values().sum()
    }

    pub fn merge(&mut self, other: &GenerationStats) {
        self.documents += other.documents;
        self.documents_failed += other.documents_failed;
        self.short_answers += other.short_answers;
        self.roots_built += other.roots_built;
        self.roots_rejected += other.roots_rejected;
        self.trees += other.trees;
        self.nodes_accepted += other.nodes_accepted;
        for (gate, count) in &other.gate_rejections {
            *self.gate_rejections.entry(gate.clone()).or_insert(0) += count;
        }
        self.prescreen_skips += other.prescreen_skips;
        self.generation_failures += other.generation_failures;
        self.oracle_calls += other.oracle_calls;
        self.search_calls += other.search_calls;
    }

    /// Accepted nodes over all extension attempts that reached generation.
    pub fn acceptance_rate(&self) -> f64 {
        let attempts = self.nodes_accepted + self.total_rejections() + self.generation_failures;
        if attempts == 0 {
            0.0
        } else {
            self.nodes_accepted as f64 / attempts as f64
        }
    }
}
