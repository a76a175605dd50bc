// src/io/embeddings.rs

use crate::error::Result;
use crate::graph::EmbeddingTable;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads a JSON object of element symbol to vector, e.g. `{"Fe": [0.1, 0.2]}`.
pub fn load_embeddings(path: impl AsRef<Path>) -> Result<EmbeddingTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let table = parse_embeddings(&text)?;
    log::info!(
        "Loaded {} element embeddings (dim {}) from {}",
        table.len(),
        table.dim(),
        path.display()
    );
    Ok(table)
}

pub fn parse_embeddings(text: &str) -> Result<EmbeddingTable> {
    let raw: HashMap<String, Vec<f64>> = serde_json::from_str(text)?;
    EmbeddingTable::from_symbols(raw)
}
