//src/model/mod.rs
pub mod elements;
pub mod lattice;
pub mod structure;

// Re-exports for cleaner imports
pub use elements::Element;
pub use lattice::Lattice;
pub use structure::{Occupancy, Site, Structure};
