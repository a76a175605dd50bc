// src/graph/converters.rs

use crate::error::{GraphError, Result};
use crate::model::{Element, Occupancy};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Turns a list of raw per-atom or per-bond values into a feature matrix,
/// one row per input item, rows in input order.
pub trait Converter<T>: Send + Sync {
    fn convert(&self, items: &[T]) -> Result<Array2<f64>>;
}

/// Passes raw values through as a single feature column.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityConverter;

impl Converter<u8> for IdentityConverter {
    fn convert(&self, items: &[u8]) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_fn((items.len(), 1), |(i, _)| f64::from(items[i])))
    }
}

impl Converter<f64> for IdentityConverter {
    fn convert(&self, items: &[f64]) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_fn((items.len(), 1), |(i, _)| items[i]))
    }
}

/// Expands distances on a Gaussian basis: exp(-(d - c)^2 / width^2).
#[derive(Clone, Debug)]
pub struct GaussianDistance {
    centers: Array1<f64>,
    width: f64,
}

impl GaussianDistance {
    pub fn new(centers: Vec<f64>, width: f64) -> Result<Self> {
        if centers.is_empty() {
            return Err(GraphError::InvalidBasis("at least one center is required".to_string()));
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(GraphError::InvalidBasis(format!("width must be positive, got {}", width)));
        }
        Ok(Self { centers: Array1::from(centers), width })
    }

    /// `n` centers evenly spaced over [min, max], endpoints included.
    pub fn linspace(min: f64, max: f64, n: usize, width: f64) -> Result<Self> {
        if n == 0 {
            return Err(GraphError::InvalidBasis("at least one center is required".to_string()));
        }
        Self::new(Array1::linspace(min, max, n).to_vec(), width)
    }

    pub fn centers(&self) -> &Array1<f64> {
        &self.centers
    }

    pub fn width(&self) -> f64 {
        self.width
    }
}

impl Default for GaussianDistance {
    fn default() -> Self {
        Self {
            centers: Array1::linspace(0.0, 5.0, 100),
            width: 0.5,
        }
    }
}

impl Converter<f64> for GaussianDistance {
    fn convert(&self, items: &[f64]) -> Result<Array2<f64>> {
        let width_sq = self.width * self.width;
        Ok(Array2::from_shape_fn((items.len(), self.centers.len()), |(i, k)| {
            let diff = items[i] - self.centers[k];
            (-diff * diff / width_sq).exp()
        }))
    }
}

/// Element -> fixed-length embedding vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingTable {
    vectors: HashMap<Element, Array1<f64>>,
    dim: usize,
}

impl EmbeddingTable {
    /// All vectors must share one length. An empty table has dimension 0.
    pub fn new(vectors: HashMap<Element, Vec<f64>>) -> Result<Self> {
        // Sort so a length mismatch is always reported against the same element
        let mut entries: Vec<(Element, Vec<f64>)> = vectors.into_iter().collect();
        entries.sort_by_key(|(el, _)| *el);

        let dim = entries.first().map_or(0, |(_, v)| v.len());
        let mut table = HashMap::with_capacity(entries.len());
        for (element, vector) in entries {
            if vector.len() != dim {
                return Err(GraphError::EmbeddingLength {
                    element,
                    expected: dim,
                    found: vector.len(),
                });
            }
            table.insert(element, Array1::from(vector));
        }
        Ok(Self { vectors: table, dim })
    }

    /// Same as [`EmbeddingTable::new`] with string keys, as found in JSON files.
    pub fn from_symbols(vectors: HashMap<String, Vec<f64>>) -> Result<Self> {
        let typed = vectors
            .into_iter()
            .map(|(symbol, v)| Ok((Element::from_symbol(&symbol)?, v)))
            .collect::<Result<HashMap<_, _>>>()?;
        Self::new(typed)
    }

    pub fn get(&self, element: Element) -> Option<&Array1<f64>> {
        self.vectors.get(&element)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Maps site occupancies to occupancy-weighted sums of element embeddings.
///
/// An ordered site gets exactly its element's vector; a mixed site such as
/// `{Fe: 0.5, Ni: 0.5}` gets `0.5 * e(Fe) + 0.5 * e(Ni)`.
#[derive(Clone, Debug, Default)]
pub struct AtomEmbeddingMap {
    table: EmbeddingTable,
}

impl AtomEmbeddingMap {
    pub fn new(table: EmbeddingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    /// Fails on the first element without an embedding; nothing is returned
    /// for the sites already processed.
    pub fn convert(&self, atoms: &[Occupancy]) -> Result<Array2<f64>> {
        let mut features = Array2::zeros((atoms.len(), self.table.dim()));

        for (site, (atom, mut row)) in atoms.iter().zip(features.rows_mut()).enumerate() {
            for (element, fraction) in atom.iter() {
                let embedding = self
                    .table
                    .get(element)
                    .ok_or(GraphError::MissingEmbedding { element, site })?;
                row.scaled_add(fraction, embedding);
            }
        }

        Ok(features)
    }
}

impl Converter<Occupancy> for AtomEmbeddingMap {
    fn convert(&self, items: &[Occupancy]) -> Result<Array2<f64>> {
        AtomEmbeddingMap::convert(self, items)
    }
}
