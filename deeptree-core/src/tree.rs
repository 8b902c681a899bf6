//! Reasoning-tree arena.
//!
//! Nodes live in one flat map keyed by id; parent and children are id
//! references only, so the structure can never form a reference cycle.
//! Every attach is checked against the layer and depth invariants, and a
//! sealed tree rejects all further mutation.

use crate::error::TreeError;
use crate::trajectory::TrajectoryStep;
use crate::types::{ExtensionType, PreciseQuery, ShortAnswer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

/// Maximum depth of a chain-shaped tree (single-keyword root).
pub const CHAIN_MAX_LAYERS: usize = 2;
/// Maximum depth of a fan-shaped tree (multi-keyword root).
pub const FAN_MAX_LAYERS: usize = 3;

/// A node of a reasoning tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub query: PreciseQuery,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub layer: usize,
    pub branch_type: ExtensionType,
}

/// How the integrated composite question was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    Oracle,
    Template,
}

/// The two encodings of the final composite puzzle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeQueries {
    pub nested_cumulative: String,
    pub nested_cumulative_answer: String,
    pub llm_integrated: String,
    pub llm_integrated_answer: String,
    pub integration_method: IntegrationMethod,
}

/// A tree of derived questions rooted at one validated root query.
#[derive(Debug, Clone, Serialize, Deserialize)]
///
/// All state is private: nodes enter only through [`ReasoningTree::attach`],
/// and nothing changes once the tree is sealed.
pub struct ReasoningTree {
    id: String,
    root_node_id: String,
    nodes: BTreeMap<String, TreeNode>,
    max_layers: usize,
    /// The short answer the root query resolves to.
    source_answer: Option<ShortAnswer>,
    composite: Option<CompositeQueries>,
    trajectory: Vec<TrajectoryStep>,
    created_at: DateTime<Utc>,
    sealed: bool,
}

impl ReasoningTree {
    /// Create a tree around a validated layer-0 query.
    pub fn new(
        id: impl Into<String>,
        root: PreciseQuery,
        max_layers: usize,
    ) -> Result<Self, TreeError> {
        if root.layer != 0 {
            return Err(TreeError::LayerMismatch {
                expected: 0,
                found: root.layer,
            });
        }
        let root_id = root.id.clone();
        let node = TreeNode {
            id: root_id.clone(),
            query: root,
            parent_id: None,
            children_ids: Vec::new(),
            layer: 0,
            branch_type: ExtensionType::Root,
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), node);

        Ok(Self {
            id: id.into(),
            root_node_id: root_id,
            nodes,
            max_layers,
            source_answer: None,
            composite: None,
            trajectory: Vec::new(),
            created_at: Utc::now(),
            sealed: false,
        })
    }

    /// Attach a query below its `parent_id`. Returns the new node id.
    pub fn attach(&mut self, query: PreciseQuery) -> Result<String, TreeError> {
        if self.sealed {
            return Err(TreeError::Sealed);
        }
        let Some(parent_id) = query.parent_id.clone() else {
            return Err(TreeError::RootAlreadySet);
        };
        if query.extension_type == ExtensionType::Root {
            return Err(TreeError::RootAlreadySet);
        }
        if self.nodes.contains_key(&query.id) {
            return Err(TreeError::DuplicateNode {
                id: query.id.clone(),
            });
        }
        let parent_layer = self
            .nodes
            .get(&parent_id)
            .map(|p| p.layer)
            .ok_or_else(|| TreeError::UnknownParent {
                id: parent_id.clone(),
            })?;

        let expected = parent_layer + 1;
        if query.layer != expected {
            return Err(TreeError::LayerMismatch {
                expected,
                found: query.layer,
            });
        }
        if query.layer > self.max_layers {
            return Err(TreeError::DepthExceeded {
                layer: query.layer,
                max: self.max_layers,
            });
        }

        let id = query.id.clone();
        let node = TreeNode {
            id: id.clone(),
            parent_id: Some(parent_id.clone()),
            children_ids: Vec::new(),
            layer: query.layer,
            branch_type: query.extension_type,
            query,
        };
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children_ids.push(id.clone());
        }
        Ok(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_node_id(&self) -> &str {
        &self.root_node_id
    }

    pub fn nodes(&self) -> &BTreeMap<String, TreeNode> {
        &self.nodes
    }

    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    pub fn source_answer(&self) -> Option<&ShortAnswer> {
        self.source_answer.as_ref()
    }

    /// Record the short answer this tree was built from.
    pub fn set_source_answer(&mut self, answer: ShortAnswer) -> Result<(), TreeError> {
        if self.sealed {
            return Err(TreeError::Sealed);
        }
        self.source_answer = Some(answer);
        Ok(())
    }

    /// Composite queries, present once sealed.
    pub fn composite(&self) -> Option<&CompositeQueries> {
        self.composite.as_ref()
    }

    pub fn trajectory(&self) -> &[TrajectoryStep] {
        &self.trajectory
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn root(&self) -> &TreeNode {
        // Construction and `load` both guarantee the root entry.
        &self.nodes[&self.root_node_id]
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Ancestors of `id`, nearest first. Empty for the root or unknown ids.
    pub fn ancestors(&self, id: &str) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.as_deref());
        while let Some(pid) = current {
            match self.nodes.get(pid) {
                Some(node) => {
                    out.push(node);
                    current = node.parent_id.as_deref();
                }
                None => break,
            }
        }
        out
    }

    /// The node itself followed by its ancestors.
    pub fn path_to_root(&self, id: &str) -> Vec<&TreeNode> {
        let mut path: Vec<&TreeNode> = self.nodes.get(id).into_iter().collect();
        path.extend(self.ancestors(id));
        path
    }

    /// Breadth-first traversal in attach order.
    pub fn traverse(&self) -> Vec<&TreeNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root_node_id.as_str()]);
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.nodes.get(id) {
                out.push(node);
                queue.extend(node.children_ids.iter().map(String::as_str));
            }
        }
        out
    }

    /// Nodes on `layer`, in traversal order.
    pub fn nodes_at_layer(&self, layer: usize) -> Vec<&TreeNode> {
        self.traverse()
            .into_iter()
            .filter(|n| n.layer == layer)
            .collect()
    }

    pub fn max_layer(&self) -> usize {
        self.nodes.values().map(|n| n.layer).max().unwrap_or(0)
    }

    /// Number of distinct layers present.
    pub fn layer_count(&self) -> usize {
        self.nodes
            .values()
            .map(|n| n.layer)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.children_ids.is_empty())
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root, then at each step the first Series child (or the first child
    /// when there is no Series child). One node per layer.
    pub fn primary_path(&self) -> Vec<&TreeNode> {
        let mut path = vec![self.root()];
        let mut current = self.root();
        loop {
            let children: Vec<&TreeNode> = current
                .children_ids
                .iter()
                .filter_map(|id| self.nodes.get(id))
                .collect();
            let next = children
                .iter()
                .find(|c| c.branch_type == ExtensionType::Series)
                .or_else(|| children.first())
                .copied();
            match next {
                Some(node) => {
                    path.push(node);
                    current = node;
                }
                None => break,
            }
        }
        path
    }

    /// Freeze the tree with its composite queries and trajectory.
    pub fn seal(
        &mut self,
        composite: CompositeQueries,
        trajectory: Vec<TrajectoryStep>,
    ) -> Result<(), TreeError> {
        if self.sealed {
            return Err(TreeError::Sealed);
        }
        self.composite = Some(composite);
        self.trajectory = trajectory;
        self.sealed = true;
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Persist to `<dir>/trees/<id>.json`.
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join("trees").join(format!("{}.json", self.id));
        crate::persistence::write_json_atomic(&path, self)?;
        Ok(path)
    }

    /// Load a tree previously written by [`ReasoningTree::save`].
    ///
    /// The arena invariants are re-checked, so a hand-edited file is refused
    /// with `InvalidData` instead of producing a tree that breaks them.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let tree: Self = crate::persistence::read_json(path)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("tree file not found: {}", path.display()),
            )
        })?;
        tree.check_structure().map_err(|message| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {message}", path.display()),
            )
        })?;
        Ok(tree)
    }

    fn check_structure(&self) -> Result<(), String> {
        let root = self
            .nodes
            .get(&self.root_node_id)
            .ok_or_else(|| format!("root node {} missing", self.root_node_id))?;
        if root.layer != 0 || root.parent_id.is_some() {
            return Err("root node is not a parentless layer-0 node".to_string());
        }
        for (id, node) in &self.nodes {
            if node.id != *id {
                return Err(format!("node keyed {id} carries id {}", node.id));
            }
            if node.layer > self.max_layers {
                return Err(format!(
                    "node {id} at layer {} exceeds maximum {}",
                    node.layer, self.max_layers
                ));
            }
            if id == &self.root_node_id {
                continue;
            }
            let parent = node
                .parent_id
                .as_deref()
                .and_then(|pid| self.nodes.get(pid))
                .ok_or_else(|| format!("node {id} has no known parent"))?;
            if node.layer != parent.layer + 1 || !parent.children_ids.contains(id) {
                return Err(format!("node {id} is not linked one layer below its parent"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationMethod;

    fn query(text: &str, layer: usize, parent: Option<&str>, ext: ExtensionType) -> PreciseQuery {
        PreciseQuery::new(
            text,
            format!("answer to {text}"),
            vec![],
            GenerationMethod::Oracle,
            layer,
            parent.map(String::from),
            ext,
        )
    }

    fn chain() -> (ReasoningTree, String, String) {
        let root = query("Q0", 0, None, ExtensionType::Root);
        let root_id = root.id.clone();
        let mut tree = ReasoningTree::new("t", root, CHAIN_MAX_LAYERS).unwrap();
        let l1 = tree
            .attach(query("Q1", 1, Some(&root_id), ExtensionType::Series))
            .unwrap();
        let l2 = tree
            .attach(query("Q2", 2, Some(&l1), ExtensionType::Series))
            .unwrap();
        (tree, l1, l2)
    }

    #[test]
    fn test_root_must_be_layer_zero() {
        let err = ReasoningTree::new("t", query("Q", 1, None, ExtensionType::Root), 2).unwrap_err();
        assert_eq!(err, TreeError::LayerMismatch { expected: 0, found: 1 });
    }

    #[test]
    fn test_attach_links_parent_and_child() {
        let (tree, l1, l2) = chain();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().children_ids, vec![l1.clone()]);
        assert_eq!(tree.get(&l2).unwrap().parent_id.as_deref(), Some(l1.as_str()));
        assert_eq!(tree.max_layer(), 2);
        assert_eq!(tree.layer_count(), 3);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_attach_rejects_wrong_layer() {
        let (mut tree, l1, _) = chain();
        let err = tree
            .attach(query("bad", 3, Some(&l1), ExtensionType::Series))
            .unwrap_err();
        assert_eq!(err, TreeError::LayerMismatch { expected: 2, found: 3 });
    }

    #[test]
    fn test_attach_rejects_depth_beyond_max() {
        let (mut tree, _, l2) = chain();
        let err = tree
            .attach(query("deep", 3, Some(&l2), ExtensionType::Series))
            .unwrap_err();
        assert_eq!(err, TreeError::DepthExceeded { layer: 3, max: 2 });
    }

    #[test]
    fn test_attach_rejects_unknown_parent_and_second_root() {
        let (mut tree, _, _) = chain();
        assert!(matches!(
            tree.attach(query("x", 1, Some("ghost"), ExtensionType::Series)),
            Err(TreeError::UnknownParent { .. })
        ));
        assert_eq!(
            tree.attach(query("r", 0, None, ExtensionType::Root)),
            Err(TreeError::RootAlreadySet)
        );
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let (tree, l1, l2) = chain();
        let ids: Vec<&str> = tree.ancestors(&l2).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![l1.as_str(), tree.root_node_id()]);
        assert!(tree.ancestors(tree.root_node_id()).is_empty());
        assert_eq!(tree.path_to_root(&l2).len(), 3);
    }

    #[test]
    fn test_primary_path_prefers_series() {
        let root = query("Q0", 0, None, ExtensionType::Root);
        let root_id = root.id.clone();
        let mut tree = ReasoningTree::new("fan", root, FAN_MAX_LAYERS).unwrap();
        tree.attach(query("P1", 1, Some(&root_id), ExtensionType::Parallel))
            .unwrap();
        let s1 = tree
            .attach(query("S1", 1, Some(&root_id), ExtensionType::Series))
            .unwrap();
        tree.attach(query("S2", 2, Some(&s1), ExtensionType::Series))
            .unwrap();

        let texts: Vec<&str> = tree
            .primary_path()
            .iter()
            .map(|n| n.query.text.as_str())
            .collect();
        assert_eq!(texts, vec!["Q0", "S1", "S2"]);
        assert_eq!(tree.nodes_at_layer(1).len(), 2);
    }

    #[test]
    fn test_sealed_tree_is_immutable() {
        let (mut tree, l1, _) = chain();
        let composite = CompositeQueries {
            nested_cumulative: "(Q2, (Q1, (Q0)))".into(),
            nested_cumulative_answer: "(a2, (a1, (a0)))".into(),
            llm_integrated: "integrated".into(),
            llm_integrated_answer: "a0".into(),
            integration_method: IntegrationMethod::Template,
        };
        tree.seal(composite.clone(), Vec::new()).unwrap();
        assert!(tree.is_sealed());
        assert_eq!(tree.composite(), Some(&composite));
        assert_eq!(
            tree.attach(query("late", 2, Some(&l1), ExtensionType::Parallel)),
            Err(TreeError::Sealed)
        );
        assert_eq!(tree.seal(composite, Vec::new()), Err(TreeError::Sealed));
        assert_eq!(
            tree.set_source_answer(ShortAnswer {
                text: "a0".into(),
                answer_type: crate::types::AnswerType::Noun,
                confidence: 1.0,
                source_span: String::new(),
                position: 0,
            }),
            Err(TreeError::Sealed)
        );
        assert!(tree.source_answer().is_none());
        assert_eq!(tree.max_layers(), CHAIN_MAX_LAYERS);
        assert_eq!(tree.max_layer(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tree, _, _) = chain();
        let path = tree.save(dir.path()).unwrap();
        let loaded = ReasoningTree::load(&path).unwrap();
        assert_eq!(loaded.id(), tree.id());
        assert_eq!(loaded.nodes(), tree.nodes());
        assert!(ReasoningTree::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_load_refuses_broken_structure() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tree, _, _) = chain();
        let path = tree.save(dir.path()).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        let mut no_root = value.clone();
        no_root["root_node_id"] = serde_json::json!("ghost");
        std::fs::write(&path, no_root.to_string()).unwrap();
        let err = ReasoningTree::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        value["max_layers"] = serde_json::json!(1);
        std::fs::write(&path, value.to_string()).unwrap();
        let err = ReasoningTree::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds maximum"));
    }
}
