// src/io/mod.rs
pub mod cif;
pub mod embeddings;
pub mod poscar;

pub use embeddings::load_embeddings;

use crate::error::Result;
use crate::model::Structure;
use std::path::Path;

/// `.cif` files go to the CIF reader; anything else is read as POSCAR/CONTCAR.
pub fn load_structure(path: impl AsRef<Path>) -> Result<Structure> {
    let path = path.as_ref();
    let is_cif = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cif"));

    let structure = if is_cif { cif::parse(path)? } else { poscar::parse(path)? };

    log::info!(
        "Loaded {}: {} ({} sites, {})",
        path.display(),
        structure.composition(),
        structure.len(),
        if structure.is_ordered() { "ordered" } else { "disordered" }
    );
    Ok(structure)
}
