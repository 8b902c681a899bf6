//! Error types for the reasoning-tree core.
//!
//! Only failures that a caller can act on are errors. Expected degradation
//! (unparseable oracle output, validator rejections, abandoned branches) is
//! carried by the outcome enums of each component instead.

/// Top-level error type for the deeptree core library.
#[derive(Debug, thiserror::Error)]
pub enum DeepTreeError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by a text-generation or web-search collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {message}")]
    Unavailable { message: String },

    #[error("Oracle returned an empty response")]
    EmptyResponse,

    #[error("Oracle call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Violations of the reasoning-tree arena invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("Tree is sealed; no further nodes may be attached")]
    Sealed,

    #[error("Tree already has a root node")]
    RootAlreadySet,

    #[error("Unknown parent node: {id}")]
    UnknownParent { id: String },

    #[error("Layer mismatch: expected {expected}, found {found}")]
    LayerMismatch { expected: usize, found: usize },

    #[error("Layer {layer} exceeds the tree's maximum of {max}")]
    DepthExceeded { layer: usize, max: usize },

    #[error("Node id already present: {id}")]
    DuplicateNode { id: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration load failed: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// A type alias for results using the top-level `DeepTreeError`.
pub type Result<T> = std::result::Result<T, DeepTreeError>;
