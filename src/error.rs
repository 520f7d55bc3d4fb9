use thiserror::Error;

/// Result alias for `cellgraph`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by graph construction, clustering and LSH primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// The count vector of an entity is constant, so it has no z-score.
    #[error("entity {entity} has zero variance")]
    ZeroVariance {
        /// Offending entity.
        entity: u32,
    },

    /// Two LSH signatures of different lengths were compared.
    #[error("signature length mismatch: {left} vs {right} bits")]
    SignatureLengthMismatch {
        /// Bits in the first signature.
        left: usize,
        /// Bits in the second signature.
        right: usize,
    },

    /// A structural merge needs at least two vertices.
    #[error("cannot merge {count} vertices, need at least 2")]
    TooFewVertices {
        /// Number of vertices passed in.
        count: usize,
    },

    /// Entity id outside the expression store.
    #[error("unknown entity {entity}")]
    UnknownEntity {
        /// Requested entity.
        entity: u32,
    },

    /// Cluster id not present in the cluster graph.
    #[error("unknown cluster {cluster}")]
    UnknownCluster {
        /// Requested cluster.
        cluster: u32,
    },

    /// Named resource lookup failed.
    #[error("{kind} {name} does not exist")]
    NotFound {
        /// Resource kind ("feature set", "entity set", "similar pairs").
        kind: &'static str,
        /// Requested name.
        name: String,
    },

    /// Named resource exists but holds nothing.
    #[error("{kind} {name} is empty")]
    EmptyNamedSet {
        /// Resource kind.
        kind: &'static str,
        /// Resource name.
        name: String,
    },

    /// Named resource already registered.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: &'static str,
        /// Resource name.
        name: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// The external layout engine failed. Clustering results are unaffected.
    #[error("layout failed: {0}")]
    Layout(#[from] LayoutError),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Failures reported by a [`LayoutEngine`](crate::layout::LayoutEngine).
///
/// Kept separate so callers can skip visualization and keep the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// The layout tool did not finish in time.
    #[error("layout timed out after {seconds} s")]
    Timeout {
        /// Timeout that was exceeded.
        seconds: u64,
    },
    /// The tool exited with a failure status.
    #[error("layout tool exited with status {status}")]
    ToolFailed {
        /// Exit status.
        status: i32,
    },
    /// The tool was killed by a signal.
    #[error("layout tool terminated by signal {signal}")]
    Terminated {
        /// Signal number.
        signal: i32,
    },
    /// Anything else the engine could not classify.
    #[error("abnormal layout failure: {0}")]
    Abnormal(String),
    /// The engine returned no position for a vertex it was given.
    #[error("no position returned for vertex {vertex}")]
    MissingPosition {
        /// Vertex id from the submitted topology.
        vertex: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_errors_convert_and_stay_distinct() {
        let timeout: Error = LayoutError::Timeout { seconds: 30 }.into();
        let tool: Error = LayoutError::ToolFailed { status: 2 }.into();
        assert_ne!(timeout, tool);
        assert!(timeout.to_string().contains("timed out"));
        assert!(tool.to_string().contains("status 2"));
    }

    #[test]
    fn lookup_error_names_the_resource() {
        let err = Error::NotFound {
            kind: "entity set",
            name: "AllCells".into(),
        };
        assert_eq!(err.to_string(), "entity set AllCells does not exist");
    }
}
