// src/graph/mod.rs

pub mod base;
pub mod converters;
pub mod crystal;
pub mod neighbors;

pub use base::{FixedRadiusGraph, GraphInput, MaterialGraph, DEFAULT_CUTOFF};
pub use converters::{AtomEmbeddingMap, Converter, EmbeddingTable, GaussianDistance, IdentityConverter};
pub use crystal::{CrystalGraphDisordered, CrystalPro};
pub use neighbors::{
    strategy_from_name, AllAtomPairs, MinimumDistanceNN, MinimumDistanceNNAll, NearNeighbors, NeighborInfo,
    NnStrategy,
};
