//! Crystal structures to graph inputs for materials machine learning.
//!
//! Nodes carry atomic features, edges carry distance features taken from the
//! periodic neighbor list within a cutoff radius. [`CrystalPro`] handles ordered
//! crystals (atomic numbers); [`CrystalGraphDisordered`] handles partially
//! occupied sites by blending element embeddings with [`AtomEmbeddingMap`].

pub mod config;
pub mod error;
pub mod graph;
pub mod io;
pub mod model;
pub mod utils;

pub use error::{GraphError, Result};
pub use graph::{
    AtomEmbeddingMap, Converter, CrystalGraphDisordered, CrystalPro, EmbeddingTable, GaussianDistance,
    GraphInput, MaterialGraph, NearNeighbors, NnStrategy,
};
pub use model::{Element, Lattice, Occupancy, Site, Structure};
