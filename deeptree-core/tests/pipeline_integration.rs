//! End-to-end tests: document in, sealed reasoning trees out.

use std::sync::Arc;

use deeptree_core::prompts::{
    TASK_COMPOSITE, TASK_EXPOSURE, TASK_EXTRACT, TASK_NECESSITY, TASK_ROOT,
};
use deeptree_core::text;
use deeptree_core::{
    DeepTreeConfig, DocumentStatus, ExtensionType, ExtractionMethod, IntegrationMethod,
    MockTextGenerator, MockWebSearch, ReasoningTree, ReasoningTreeBuilder, StepKind,
};

const DOCUMENT: &str = "Tesla was founded in 2003 and is headquartered in Austin.";

const ROOT_QUESTION: &str = "Which carmaker opened a gigafactory near Austin?";
const AUSTIN_QUESTION: &str = "Which Texas state capital hosts the annual SXSW festival?";
const SXSW_QUESTION: &str =
    "Which annual gathering began in 1987 as a small music showcase and film conference?";

const INTEGRATED: &str = "Start from the gathering that began in 1987 as a music showcase, find the \
     city that hosts it, then name the carmaker with a gigafactory near that city.";

fn extract_reply(answers: &[(&str, &str)]) -> String {
    let items: Vec<String> = answers
        .iter()
        .map(|(text, kind)| format!(r#"{{"text": "{text}", "type": "{kind}", "confidence": 0.9}}"#))
        .collect();
    format!(r#"{{"answers": [{}]}}"#, items.join(", "))
}

/// Oracle script for the Tesla → Austin → SXSW chain.
fn chain_generator() -> MockTextGenerator {
    MockTextGenerator::new()
        .on(TASK_EXTRACT, extract_reply(&[("Tesla", "name")]))
        .on(
            TASK_ROOT,
            format!(r#"{{"question": "{ROOT_QUESTION}", "keywords": ["gigafactory", "Austin"]}}"#),
        )
        // Without "Austin" the carmaker is ambiguous; without "gigafactory" it is not.
        .on("near [MASK]?", r#"{"unique": false}"#)
        .on(TASK_NECESSITY, r#"{"unique": true}"#)
        .on(
            "Target answer: Austin",
            format!(r#"{{"question": "{AUSTIN_QUESTION}", "keywords": ["SXSW"]}}"#),
        )
        .on(
            "Target answer: SXSW",
            format!(r#"{{"question": "{SXSW_QUESTION}", "keywords": ["1987", "music showcase"]}}"#),
        )
        .on(TASK_EXPOSURE, r#"{"hops": 3, "risk": "low", "reason": "two cities away"}"#)
        .on(
            TASK_COMPOSITE,
            format!(r#"{{"question": "{INTEGRATED}", "answer": "Tesla"}}"#),
        )
}

fn builder(generator: MockTextGenerator, config: DeepTreeConfig) -> ReasoningTreeBuilder {
    ReasoningTreeBuilder::new(
        Arc::new(generator),
        Arc::new(MockWebSearch::with_snippet("Austin is the capital of Texas.")),
        config,
    )
    .unwrap()
}

#[tokio::test]
async fn test_document_to_sealed_chain_tree() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeepTreeConfig {
        output_dir: Some(dir.path().join("out")),
        ..Default::default()
    };
    let builder = builder(chain_generator(), config);

    let report = builder.process_document("doc-tesla", DOCUMENT).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert!(matches!(report.extraction_method, ExtractionMethod::Oracle(_)));
    assert_eq!(report.trees.len(), 1);
    let tree = &report.trees[0];
    assert!(tree.is_sealed());
    assert_eq!(tree.source_answer().unwrap().text, "Tesla");

    // Root keeps only the keyword that proved necessary.
    let root = &tree.root().query;
    assert_eq!(root.text, ROOT_QUESTION);
    assert!(!text::contains_phrase(&root.text, "Tesla"));
    assert_eq!(root.keyword_texts(), vec!["Austin"]);

    // One keyword: a chain of Series extensions down to layer 2.
    assert_eq!(tree.max_layers(), 2);
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.layer_count(), 3);
    assert!(tree.nodes().values().all(|n| n.branch_type != ExtensionType::Parallel));
    let answers: Vec<&str> = tree
        .primary_path()
        .iter()
        .map(|n| n.query.answer.as_str())
        .collect();
    assert_eq!(answers, vec!["Tesla", "Austin", "SXSW"]);

    let composite = tree.composite().unwrap();
    assert_eq!(
        composite.nested_cumulative,
        format!("({SXSW_QUESTION}, ({AUSTIN_QUESTION}, ({ROOT_QUESTION})))")
    );
    assert_eq!(composite.nested_cumulative_answer, "(SXSW, (Austin, (Tesla)))");
    assert_eq!(composite.integration_method, IntegrationMethod::Oracle);
    assert_eq!(composite.llm_integrated_answer, "Tesla");
    assert!(!text::contains_phrase(&composite.llm_integrated, "Tesla"));

    // The tree carries its own trajectory, in recording order.
    let kinds: Vec<StepKind> = tree.trajectory().iter().map(|s| s.kind).collect();
    assert_eq!(kinds.first(), Some(&StepKind::KeywordMinimization));
    assert_eq!(kinds.last(), Some(&StepKind::Composite));
    assert!(kinds.contains(&StepKind::RootQuery));
    assert!(kinds.contains(&StepKind::TopologySelection));
    assert!(tree.trajectory().windows(2).all(|w| w[0].seq < w[1].seq));

    assert_eq!(report.stats.trees, 1);
    assert_eq!(report.stats.roots_built, 1);
    assert_eq!(report.stats.nodes_accepted, 2);
    assert!(report.stats.oracle_calls > 0);

    // Persisted and loadable.
    assert_eq!(report.saved.len(), 1);
    let loaded = ReasoningTree::load(&report.saved[0]).unwrap();
    assert_eq!(loaded.id(), tree.id());
    assert_eq!(loaded.len(), tree.len());
    assert_eq!(loaded.composite(), tree.composite());
}

#[tokio::test]
async fn test_trajectory_sink_receives_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("trajectory.jsonl");
    let mut config = DeepTreeConfig::default();
    config.trajectory.log_path = Some(sink.clone());
    let builder = builder(chain_generator(), config);

    builder.process_document("doc-tesla", DOCUMENT).await;

    let contents = std::fs::read_to_string(&sink).unwrap();
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), builder.recorder().len());
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("kind").is_some());
        assert_eq!(value["document_id"], "doc-tesla");
    }
}

#[tokio::test]
async fn test_single_keyword_root_grows_two_layer_chain() {
    // No script for the SXSW extension, so the chain stops after one hop
    // and there is no integration script either.
    let generator = MockTextGenerator::new()
        .on(TASK_EXTRACT, extract_reply(&[("Tesla", "name")]))
        .on(
            TASK_ROOT,
            format!(r#"{{"question": "{ROOT_QUESTION}", "keywords": ["Austin"]}}"#),
        )
        .on(
            "Target answer: Austin",
            format!(r#"{{"question": "{AUSTIN_QUESTION}", "keywords": ["SXSW"]}}"#),
        )
        .on(TASK_EXPOSURE, r#"{"hops": 3, "risk": "low"}"#);
    let builder = builder(generator, DeepTreeConfig::default());

    let report = builder.process_document("doc-c", DOCUMENT).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    let tree = &report.trees[0];
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.layer_count(), 2);
    assert!(tree.nodes_at_layer(1).iter().all(|n| n.branch_type == ExtensionType::Series));

    let composite = tree.composite().unwrap();
    assert_eq!(
        composite.nested_cumulative,
        format!("({AUSTIN_QUESTION}, ({ROOT_QUESTION}))")
    );
    assert_eq!(composite.integration_method, IntegrationMethod::Template);
    assert_eq!(composite.llm_integrated_answer, "Tesla");
    assert!(!text::contains_phrase(&composite.llm_integrated, "Tesla"));
}

#[tokio::test]
async fn test_leaking_root_does_not_affect_sibling_tree() {
    let generator = MockTextGenerator::new()
        .on(
            TASK_EXTRACT,
            extract_reply(&[("Tesla", "name"), ("Austin", "location")]),
        )
        // Every root attempt for "Austin" names its own answer.
        .on(
            r#"unique correct answer is "Austin""#,
            r#"{"question": "Which city is Austin, the Texas capital?", "keywords": ["Texas", "capital"]}"#,
        )
        .on(
            TASK_ROOT,
            format!(r#"{{"question": "{ROOT_QUESTION}", "keywords": ["Austin"]}}"#),
        )
        .on(
            "Target answer: Austin",
            format!(r#"{{"question": "{AUSTIN_QUESTION}", "keywords": ["SXSW"]}}"#),
        )
        .on(TASK_EXPOSURE, r#"{"hops": 3, "risk": "low"}"#);
    let builder = builder(generator, DeepTreeConfig::default());

    let report = builder.process_document("doc-two", DOCUMENT).await;

    assert_eq!(report.status, DocumentStatus::Completed);
    assert_eq!(report.stats.short_answers, 2);
    assert_eq!(report.stats.roots_built, 1);
    assert_eq!(report.stats.roots_rejected, 1);
    assert_eq!(report.trees.len(), 1);
    assert_eq!(report.trees[0].root().query.answer, "Tesla");

    let rejected: Vec<_> = builder
        .recorder()
        .for_document("doc-two")
        .into_iter()
        .filter(|s| s.kind == StepKind::RootQuery && !s.outcome.is_accepted())
        .collect();
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn test_batch_continues_past_empty_document() {
    let builder = builder(chain_generator(), DeepTreeConfig::default());
    let documents = vec![
        ("empty".to_string(), "   ".to_string()),
        ("doc-tesla".to_string(), DOCUMENT.to_string()),
    ];

    let batch = builder.process_batch(&documents).await;

    assert_eq!(batch.documents.len(), 2);
    assert_eq!(batch.documents[0].status, DocumentStatus::Exhausted);
    assert_eq!(batch.documents[1].status, DocumentStatus::Completed);
    assert_eq!(batch.stats.documents, 2);
    assert_eq!(batch.stats.documents_failed, 1);
    assert_eq!(batch.stats.trees, 1);
}
