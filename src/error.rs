// src/error.rs

use crate::model::Element;
use thiserror::Error;

/// Errors produced while reading structures and building graphs.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A site references an element that has no row in the embedding table.
    #[error("no embedding vector for element {element} (site {site})")]
    MissingEmbedding { element: Element, site: usize },

    #[error("embedding for {element} has length {found}, expected {expected}")]
    EmbeddingLength {
        element: Element,
        expected: usize,
        found: usize,
    },

    #[error("cutoff radius must be a positive finite number, got {0}")]
    InvalidCutoff(f64),

    #[error("unknown nearest-neighbor strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown element symbol: {0}")]
    UnknownElement(String),

    #[error("lattice matrix is singular (non-invertible)")]
    SingularLattice,

    /// Atomic-number features need exactly one species at full occupancy.
    #[error("site {0} is disordered; atomic-number features need an ordered structure")]
    DisorderedSite(usize),

    #[error("isolated atoms found in the structure: site {0} has no neighbors within the cutoff")]
    IsolatedAtom(usize),

    #[error("invalid gaussian basis: {0}")]
    InvalidBasis(String),

    #[error("invalid state attributes: {0}")]
    InvalidState(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
