//! Core data types: short answers, keywords and precise queries.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use uuid::Uuid;

/// Category of an extracted short answer (and of a keyword).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Noun,
    Number,
    Name,
    Date,
    Location,
}

impl AnswerType {
    /// Lenient parse of an oracle-supplied type label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "noun" | "term" | "technical_term" | "technical term" | "concept" => Some(Self::Noun),
            "number" | "numeric" | "quantity" | "amount" => Some(Self::Number),
            "name" | "proper_noun" | "proper noun" | "person" | "organization" | "entity" => {
                Some(Self::Name)
            }
            "date" | "year" | "time" => Some(Self::Date),
            "location" | "place" | "city" | "country" => Some(Self::Location),
            _ => None,
        }
    }

    /// Best guess from the surface form alone.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<u32>()
            && trimmed.len() == 4
            && (1000..=2100).contains(&n)
        {
            return Self::Date;
        }
        if trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Self::Number;
        }
        if trimmed.chars().next().is_some_and(char::is_uppercase) {
            return Self::Name;
        }
        Self::Noun
    }
}

impl std::fmt::Display for AnswerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnswerType::Noun => "noun",
            AnswerType::Number => "number",
            AnswerType::Name => "name",
            AnswerType::Date => "date",
            AnswerType::Location => "location",
        };
        f.write_str(s)
    }
}

/// An objective, verifiable fact pulled from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortAnswer {
    pub text: String,
    pub answer_type: AnswerType,
    /// Extraction confidence (0.0-1.0).
    pub confidence: f64,
    /// The sentence of the document the answer was found in.
    pub source_span: String,
    /// Byte offset of the answer in the document.
    pub position: usize,
}

/// A keyword that survived the masking test for its query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalKeyword {
    pub text: String,
    pub keyword_type: AnswerType,
    /// How strongly this keyword narrows the answer on its own (0.0-1.0).
    pub uniqueness_score: f64,
    /// 1.0 when masking it broke uniqueness, lower when kept as a fallback.
    pub necessity_score: f64,
    /// The query text around the keyword.
    pub context: String,
    /// Byte offset of the keyword in its query.
    pub position: usize,
}

/// How a query came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Oracle reply parsed as JSON.
    Oracle,
    /// Oracle reply recovered from labelled lines or prose.
    OracleRecovered,
    /// Templated text built without the oracle.
    Template,
}

/// The role of a query in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionType {
    Root,
    Series,
    Parallel,
}

impl std::fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionType::Root => write!(f, "root"),
            ExtensionType::Series => write!(f, "series"),
            ExtensionType::Parallel => write!(f, "parallel"),
        }
    }
}

/// A question with a unique answer and its minimal keyword set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreciseQuery {
    pub id: String,
    pub text: String,
    pub answer: String,
    pub keywords: Vec<MinimalKeyword>,
    pub generation_method: GenerationMethod,
    pub validated: bool,
    pub layer: usize,
    pub parent_id: Option<String>,
    pub extension_type: ExtensionType,
}

impl PreciseQuery {
    /// Build a validated query with a fresh id.
    pub fn new(
        text: impl Into<String>,
        answer: impl Into<String>,
        keywords: Vec<MinimalKeyword>,
        generation_method: GenerationMethod,
        layer: usize,
        parent_id: Option<String>,
        extension_type: ExtensionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            answer: answer.into(),
            keywords,
            generation_method,
            validated: true,
            layer,
            parent_id,
            extension_type,
        }
    }

    /// Keyword texts, in query order.
    pub fn keyword_texts(&self) -> Vec<String> {
        self.keywords.iter().map(|k| k.text.clone()).collect()
    }
}

/// Oracle and search calls spent by one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub oracle: usize,
    pub search: usize,
}

impl CallCounts {
    pub fn oracle(n: usize) -> Self {
        Self {
            oracle: n,
            search: 0,
        }
    }
}

impl Add for CallCounts {
    type Output = CallCounts;

    fn add(self, rhs: Self) -> Self::Output {
        CallCounts {
            oracle: self.oracle + rhs.oracle,
            search: self.search + rhs.search,
        }
    }
}

impl AddAssign for CallCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.oracle += rhs.oracle;
        self.search += rhs.search;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_type_from_label() {
        assert_eq!(AnswerType::from_label("Proper Noun"), Some(AnswerType::Name));
        assert_eq!(AnswerType::from_label("year"), Some(AnswerType::Date));
        assert_eq!(AnswerType::from_label("opinion"), None);
    }

    #[test]
    fn test_answer_type_infer() {
        assert_eq!(AnswerType::infer("2003"), AnswerType::Date);
        assert_eq!(AnswerType::infer("42 km"), AnswerType::Number);
        assert_eq!(AnswerType::infer("Tesla"), AnswerType::Name);
        assert_eq!(AnswerType::infer("lithium"), AnswerType::Noun);
    }

    #[test]
    fn test_answer_type_serde() {
        let json = serde_json::to_string(&AnswerType::Location).unwrap();
        assert_eq!(json, "\"location\"");
    }

    #[test]
    fn test_call_counts_add() {
        let mut total = CallCounts::oracle(2);
        total += CallCounts {
            oracle: 1,
            search: 1,
        };
        assert_eq!(total, CallCounts { oracle: 3, search: 1 });
    }

    #[test]
    fn test_precise_query_new_is_validated() {
        let q = PreciseQuery::new(
            "Which city?",
            "Austin",
            vec![],
            GenerationMethod::Oracle,
            0,
            None,
            ExtensionType::Root,
        );
        assert!(q.validated);
        assert!(!q.id.is_empty());
        assert!(q.keyword_texts().is_empty());
    }
}
