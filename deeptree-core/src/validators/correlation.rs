//! Correlation gate: a child question must stand on its own against every
//! ancestor, not just its parent.
//!
//! Independent signals, any one of which rejects:
//! - content-word Jaccard overlap above the threshold
//! - at least `circular_shared_words` shared content words
//! - shared content words above `circular_overlap_ratio` of the shorter question
//! - both questions hitting several terms of the same knowledge domain
//! - bag-of-words cosine similarity above the threshold
//! - the same kind of logical connective (temporal or causal) in both

use super::GateVerdict;
use crate::config::ValidatorThresholds;
use crate::text;
use serde::{Deserialize, Serialize};

/// Fixed domain vocabularies.
pub const DOMAIN_BUCKETS: &[(&str, &[&str])] = &[
    (
        "technology",
        &[
            "software", "hardware", "computer", "internet", "algorithm", "digital", "network",
            "processor", "chip", "semiconductor", "programming", "data", "electric", "battery",
            "smartphone", "robot", "artificial", "intelligence", "app",
        ],
    ),
    (
        "business",
        &[
            "company", "corporation", "market", "revenue", "ceo", "founded", "founder", "stock",
            "investment", "profit", "brand", "headquartered", "headquarters", "startup",
            "acquisition", "industry", "sales", "shareholders",
        ],
    ),
    (
        "science",
        &[
            "physics", "chemistry", "biology", "element", "molecule", "atom", "experiment",
            "theory", "scientist", "laboratory", "species", "energy", "particle", "reaction",
            "isotope", "discovered", "research",
        ],
    ),
    (
        "geography",
        &[
            "city", "country", "river", "mountain", "capital", "state", "ocean", "continent",
            "region", "border", "population", "island", "lake", "located", "province", "coast",
        ],
    ),
    (
        "history",
        &[
            "war", "empire", "king", "queen", "dynasty", "century", "ancient", "revolution",
            "battle", "treaty", "historical", "medieval", "reign", "colonial", "independence",
        ],
    ),
    (
        "medicine",
        &[
            "disease", "treatment", "patient", "hospital", "drug", "vaccine", "doctor",
            "symptom", "medical", "clinical", "therapy", "virus", "surgery", "diagnosis",
        ],
    ),
];

/// Words that chain events in time.
pub const TEMPORAL_MARKERS: &[&str] = &[
    "before", "after", "during", "then", "later", "earlier", "subsequently", "following",
    "prior", "until", "since", "meanwhile",
];

/// Words that chain events causally.
pub const CAUSAL_MARKERS: &[&str] = &[
    "because", "therefore", "thus", "hence", "consequently", "so that", "as a result",
    "due to", "led to", "caused",
];

/// Measured signals between two questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationScore {
    pub overlap: f64,
    /// Content words present in both questions.
    pub shared_words: usize,
    /// Shared words relative to the shorter question.
    pub containment: f64,
    pub cosine: f64,
    pub shared_domain: Option<String>,
    pub shared_dependency: Option<String>,
}

pub struct CorrelationValidator {
    thresholds: ValidatorThresholds,
}

impl CorrelationValidator {
    pub fn new(thresholds: ValidatorThresholds) -> Self {
        Self { thresholds }
    }

    /// Measure a pair of questions.
    pub fn score(&self, a: &str, b: &str) -> CorrelationScore {
        let set_a = text::content_set(a);
        let set_b = text::content_set(b);
        CorrelationScore {
            overlap: text::jaccard(&set_a, &set_b),
            shared_words: set_a.intersection(&set_b).count(),
            containment: text::overlap_coefficient(&set_a, &set_b),
            cosine: text::cosine_similarity(a, b),
            shared_domain: self.shared_domain(a, b),
            shared_dependency: shared_dependency(a, b),
        }
    }

    /// Why `score` correlates, if it does.
    pub fn violation(&self, score: &CorrelationScore) -> Option<String> {
        if score.overlap > self.thresholds.correlation_overlap {
            return Some(format!(
                "keyword overlap {:.2} > {:.2}",
                score.overlap, self.thresholds.correlation_overlap
            ));
        }
        if score.shared_words >= self.thresholds.circular_shared_words {
            return Some(format!(
                "{} shared content words (limit {})",
                score.shared_words, self.thresholds.circular_shared_words
            ));
        }
        if score.containment > self.thresholds.circular_overlap_ratio {
            return Some(format!(
                "shared-word ratio {:.2} > {:.2}",
                score.containment, self.thresholds.circular_overlap_ratio
            ));
        }
        if let Some(domain) = &score.shared_domain {
            return Some(format!("shared knowledge domain: {domain}"));
        }
        if score.cosine > self.thresholds.cosine_similarity {
            return Some(format!(
                "cosine similarity {:.2} > {:.2}",
                score.cosine, self.thresholds.cosine_similarity
            ));
        }
        if let Some(kind) = &score.shared_dependency {
            return Some(format!("shared {kind} dependency markers"));
        }
        None
    }

    /// Check `candidate` against every question in `others` (ancestors, and
    /// optionally siblings). Passes only if no pair correlates.
    pub fn check(&self, candidate: &str, others: &[&str]) -> GateVerdict {
        for other in others {
            let score = self.score(candidate, other);
            if let Some(reason) = self.violation(&score) {
                return GateVerdict::reject("correlation", format!("{reason} vs \"{other}\""));
            }
        }
        GateVerdict::pass(
            "correlation",
            format!("independent of {} question(s)", others.len()),
        )
    }

    fn shared_domain(&self, a: &str, b: &str) -> Option<String> {
        let tokens_a = text::tokenize(a);
        let tokens_b = text::tokenize(b);
        let min = self.thresholds.domain_term_min.max(1);
        DOMAIN_BUCKETS
            .iter()
            .find(|(_, terms)| {
                domain_hits(&tokens_a, terms) >= min && domain_hits(&tokens_b, terms) >= min
            })
            .map(|(name, _)| name.to_string())
    }
}

fn domain_hits(tokens: &[String], terms: &[&str]) -> usize {
    terms
        .iter()
        .filter(|t| tokens.iter().any(|tok| tok == *t))
        .count()
}

fn shared_dependency(a: &str, b: &str) -> Option<String> {
    if text::any_phrase(a, TEMPORAL_MARKERS) && text::any_phrase(b, TEMPORAL_MARKERS) {
        return Some("temporal".to_string());
    }
    if text::any_phrase(a, CAUSAL_MARKERS) && text::any_phrase(b, CAUSAL_MARKERS) {
        return Some("causal".to_string());
    }
    None
}
