//! Property-based tests for tree structure and text similarity using proptest.

use proptest::prelude::*;

use deeptree_core::text;
use deeptree_core::validators::CorrelationValidator;
use deeptree_core::{
    ExtensionType, GenerationMethod, PreciseQuery, ReasoningTree, ValidatorThresholds,
    nested_cumulative,
};

fn query(text: &str, answer: &str, layer: usize, parent: Option<String>) -> PreciseQuery {
    let ext = match layer {
        0 => ExtensionType::Root,
        _ => ExtensionType::Series,
    };
    PreciseQuery::new(text, answer, vec![], GenerationMethod::Oracle, layer, parent, ext)
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{2,9}", 1..10).prop_map(|words| words.join(" "))
}

// --- Tree structure properties ---

proptest! {
    #[test]
    fn attached_nodes_sit_one_layer_below_parent(
        picks in prop::collection::vec(0usize..64, 0..24),
        max_layers in 1usize..4,
    ) {
        let mut tree = ReasoningTree::new("t", query("root?", "a0", 0, None), max_layers).unwrap();
        for (i, pick) in picks.iter().enumerate() {
            let ids: Vec<(String, usize)> =
                tree.nodes().values().map(|n| (n.id.clone(), n.layer)).collect();
            let (parent_id, parent_layer) = ids[pick % ids.len()].clone();
            let child = query(
                &format!("q{i}?"),
                &format!("a{i}"),
                parent_layer + 1,
                Some(parent_id),
            );
            let result = tree.attach(child);
            prop_assert_eq!(result.is_ok(), parent_layer < max_layers);
        }

        prop_assert!(tree.max_layer() <= max_layers);
        for node in tree.nodes().values() {
            match &node.parent_id {
                None => prop_assert_eq!(node.layer, 0),
                Some(parent_id) => {
                    let parent = tree.get(parent_id).unwrap();
                    prop_assert_eq!(node.layer, parent.layer + 1);
                    prop_assert!(parent.children_ids.contains(&node.id));
                }
            }
            prop_assert_eq!(tree.path_to_root(&node.id).len(), node.layer + 1);
        }
        prop_assert_eq!(tree.traverse().len(), tree.len());
    }

    #[test]
    fn wrong_layer_is_refused(offset in 2usize..5) {
        let root = query("root?", "a0", 0, None);
        let root_id = root.id.clone();
        let mut tree = ReasoningTree::new("t", root, 5).unwrap();
        let child = query("child?", "a1", offset, Some(root_id));
        prop_assert!(tree.attach(child).is_err());
        prop_assert_eq!(tree.len(), 1);
    }

    #[test]
    fn nested_cumulative_wraps_deepest_first(depth in 0usize..4) {
        let root = query("Q0", "A0", 0, None);
        let mut parent = root.id.clone();
        let mut tree = ReasoningTree::new("t", root, depth).unwrap();
        for layer in 1..=depth {
            let child = query(&format!("Q{layer}"), &format!("A{layer}"), layer, Some(parent));
            parent = tree.attach(child).unwrap();
        }

        let (question, answer) = nested_cumulative(&tree);
        let mut expected_q = String::from("(Q0)");
        let mut expected_a = String::from("(A0)");
        for layer in 1..=depth {
            expected_q = format!("(Q{layer}, {expected_q})");
            expected_a = format!("(A{layer}, {expected_a})");
        }
        prop_assert_eq!(&question, &expected_q);
        prop_assert_eq!(&answer, &expected_a);
        prop_assert_eq!(nested_cumulative(&tree), (question, answer));
    }
}

// --- Similarity properties ---

proptest! {
    #[test]
    fn jaccard_is_symmetric_and_bounded(a in sentence(), b in sentence()) {
        let set_a = text::content_set(&a);
        let set_b = text::content_set(&b);
        let ab = text::jaccard(&set_a, &set_b);
        prop_assert!((ab - text::jaccard(&set_b, &set_a)).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn cosine_is_symmetric_and_bounded(a in sentence(), b in sentence()) {
        let ab = text::cosine_similarity(&a, &b);
        prop_assert!((ab - text::cosine_similarity(&b, &a)).abs() < 1e-9);
        prop_assert!((-1e-9..=1.0 + 1e-9).contains(&ab));
    }

    #[test]
    fn correlation_verdict_is_symmetric(a in sentence(), b in sentence()) {
        let validator = CorrelationValidator::new(ValidatorThresholds::default());
        let ab = validator.violation(&validator.score(&a, &b)).is_some();
        let ba = validator.violation(&validator.score(&b, &a)).is_some();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn question_never_correlates_below_itself(a in sentence()) {
        let set = text::content_set(&a);
        let overlap = text::jaccard(&set, &set);
        if set.is_empty() {
            prop_assert_eq!(overlap, 0.0);
        } else {
            prop_assert!((overlap - 1.0).abs() < 1e-12);
        }
    }
}
