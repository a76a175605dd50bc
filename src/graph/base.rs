// src/graph/base.rs

use super::converters::Converter;
use super::neighbors::{NearNeighbors, NeighborInfo};
use crate::error::{GraphError, Result};
use crate::model::Structure;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_CUTOFF: f64 = 5.0;

/// State attributes used when the caller supplies none.
pub const DEFAULT_STATE: [f64; 2] = [0.0, 0.0];

/// Extracts the raw per-site atom descriptors from a structure.
pub type AtomFeatureFn<A> = fn(&Structure) -> Result<Vec<A>>;

/// Raw graph: atom descriptors, bond distances and the edge list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialGraph<A> {
    pub atom: Vec<A>,
    pub bond: Vec<f64>,
    pub state: Vec<Vec<f64>>,
    /// Center site of each edge (non-decreasing)
    pub index1: Vec<usize>,
    /// Neighbor site of each edge
    pub index2: Vec<usize>,
}

impl<A> MaterialGraph<A> {
    pub fn num_atoms(&self) -> usize {
        self.atom.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bond.len()
    }
}

/// Graph with atom, bond and state features converted to numeric arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphInput {
    pub atom: Array2<f64>,
    pub bond: Array2<f64>,
    pub state: Array2<f64>,
    pub index1: Vec<usize>,
    pub index2: Vec<usize>,
}

#[derive(Serialize)]
struct GraphInputRows {
    atom: Vec<Vec<f64>>,
    bond: Vec<Vec<f64>>,
    state: Vec<Vec<f64>>,
    index1: Vec<usize>,
    index2: Vec<usize>,
}

fn to_rows(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|row| row.to_vec()).collect()
}

// Emitted as nested row arrays, the shape model code reads directly
impl Serialize for GraphInput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        GraphInputRows {
            atom: to_rows(&self.atom),
            bond: to_rows(&self.bond),
            state: to_rows(&self.state),
            index1: self.index1.clone(),
            index2: self.index2.clone(),
        }
        .serialize(serializer)
    }
}

/// Fixed-radius graph construction shared by the crystal graph presets.
///
/// Holds the neighbor strategy and converters; the presets compose this
/// rather than re-implementing the neighbor walk.
pub struct FixedRadiusGraph<A> {
    nn_strategy: Arc<dyn NearNeighbors>,
    atom_converter: Arc<dyn Converter<A>>,
    bond_converter: Arc<dyn Converter<f64>>,
    cutoff: f64,
    atom_features: AtomFeatureFn<A>,
}

impl<A> Clone for FixedRadiusGraph<A> {
    fn clone(&self) -> Self {
        Self {
            nn_strategy: Arc::clone(&self.nn_strategy),
            atom_converter: Arc::clone(&self.atom_converter),
            bond_converter: Arc::clone(&self.bond_converter),
            cutoff: self.cutoff,
            atom_features: self.atom_features,
        }
    }
}

impl<A> fmt::Debug for FixedRadiusGraph<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FixedRadiusGraph")
            .field("nn_strategy", &self.nn_strategy.name())
            .field("cutoff", &self.cutoff)
            .finish()
    }
}

impl<A> FixedRadiusGraph<A> {
    pub fn new(
        nn_strategy: Arc<dyn NearNeighbors>,
        atom_converter: Arc<dyn Converter<A>>,
        bond_converter: Arc<dyn Converter<f64>>,
        cutoff: f64,
        atom_features: AtomFeatureFn<A>,
    ) -> Self {
        Self {
            nn_strategy,
            atom_converter,
            bond_converter,
            cutoff,
            atom_features,
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn nn_strategy(&self) -> &Arc<dyn NearNeighbors> {
        &self.nn_strategy
    }

    pub fn set_nn_strategy(&mut self, nn_strategy: Arc<dyn NearNeighbors>) {
        self.nn_strategy = nn_strategy;
    }

    pub fn set_atom_converter(&mut self, atom_converter: Arc<dyn Converter<A>>) {
        self.atom_converter = atom_converter;
    }

    pub fn set_bond_converter(&mut self, bond_converter: Arc<dyn Converter<f64>>) {
        self.bond_converter = bond_converter;
    }

    pub fn set_cutoff(&mut self, cutoff: f64) {
        self.cutoff = cutoff;
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(GraphError::InvalidCutoff(self.cutoff));
        }
        Ok(())
    }

    pub fn get_atom_features(&self, structure: &Structure) -> Result<Vec<A>> {
        (self.atom_features)(structure)
    }

    /// Raw graph for one structure.
    ///
    /// Every site must have at least one neighbor within the cutoff.
    pub fn convert(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<MaterialGraph<A>> {
        self.validate()?;

        let atom = self.get_atom_features(structure)?;
        let all_neighbors = self.nn_strategy.get_all_nn_info(structure, self.cutoff)?;

        let (index1, index2, bond) = edges_from_neighbors(&all_neighbors)?;

        log::debug!(
            "{}: {} sites, {} bonds (cutoff {:.2} Å)",
            self.nn_strategy.name(),
            atom.len(),
            bond.len(),
            self.cutoff
        );

        Ok(MaterialGraph {
            atom,
            bond,
            state: vec![state.unwrap_or_else(|| DEFAULT_STATE.to_vec())],
            index1,
            index2,
        })
    }

    /// Apply the atom and bond converters to a raw graph.
    pub fn graph_to_input(&self, graph: &MaterialGraph<A>) -> Result<GraphInput> {
        let atom = self.atom_converter.convert(&graph.atom)?;
        let bond = self.bond_converter.convert(&graph.bond)?;
        let state = state_array(&graph.state)?;

        Ok(GraphInput {
            atom,
            bond,
            state,
            index1: graph.index1.clone(),
            index2: graph.index2.clone(),
        })
    }

    pub fn get_input(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<GraphInput> {
        let graph = self.convert(structure, state)?;
        self.graph_to_input(&graph)
    }

    /// Converts many structures in parallel; results keep the input order.
    pub fn get_inputs(&self, structures: &[Structure]) -> Vec<Result<GraphInput>> {
        structures
            .par_iter()
            .map(|s| self.get_input(s, None))
            .collect()
    }
}

fn edges_from_neighbors(all_neighbors: &[Vec<NeighborInfo>]) -> Result<(Vec<usize>, Vec<usize>, Vec<f64>)> {
    let total: usize = all_neighbors.iter().map(Vec::len).sum();
    let mut index1 = Vec::with_capacity(total);
    let mut index2 = Vec::with_capacity(total);
    let mut bond = Vec::with_capacity(total);

    for (center, neighbors) in all_neighbors.iter().enumerate() {
        if neighbors.is_empty() {
            return Err(GraphError::IsolatedAtom(center));
        }
        for n in neighbors {
            index1.push(center);
            index2.push(n.site_index);
            bond.push(n.distance);
        }
    }

    Ok((index1, index2, bond))
}

fn state_array(state: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = state.first().map_or(0, Vec::len);
    if state.iter().any(|row| row.len() != width) {
        return Err(GraphError::InvalidState(format!(
            "rows must all have length {}",
            width
        )));
    }
    let flat: Vec<f64> = state.iter().flatten().copied().collect();
    Array2::from_shape_vec((state.len(), width), flat)
        .map_err(|e| GraphError::InvalidState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::converters::IdentityConverter;
    use crate::graph::neighbors::{AllAtomPairs, MinimumDistanceNNAll};
    use crate::model::{Element, Lattice, Occupancy};

    fn atomic_numbers(structure: &Structure) -> Result<Vec<u8>> {
        Ok(structure
            .sites
            .iter()
            .map(|s| s.species.specie().map_or(0, Element::atomic_number))
            .collect())
    }

    fn graph(cutoff: f64) -> FixedRadiusGraph<u8> {
        FixedRadiusGraph::new(
            Arc::new(MinimumDistanceNNAll),
            Arc::new(IdentityConverter),
            Arc::new(IdentityConverter),
            cutoff,
            atomic_numbers,
        )
    }

    fn rocksalt_fragment() -> Structure {
        Structure::from_fractional(
            Lattice::cubic(4.0),
            vec![Occupancy::ordered(Element::Na), Occupancy::ordered(Element::Cl)],
            &[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]],
        )
    }

    #[test]
    fn test_convert_edges_sorted_by_center() {
        let g = graph(2.5).convert(&rocksalt_fragment(), None).unwrap();

        assert_eq!(g.atom, vec![11, 17]);
        // Each site sees the other at +/- a/2 along x
        assert_eq!(g.index1, vec![0, 0, 1, 1]);
        assert_eq!(g.index2, vec![1, 1, 0, 0]);
        assert!(g.bond.iter().all(|d| (d - 2.0).abs() < 1e-10));
        assert_eq!(g.state, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_isolated_atom_is_an_error() {
        let result = graph(1.0).convert(&rocksalt_fragment(), None);
        assert!(matches!(result, Err(GraphError::IsolatedAtom(0))));
    }

    #[test]
    fn test_invalid_cutoff() {
        assert!(matches!(graph(0.0).validate(), Err(GraphError::InvalidCutoff(_))));
        assert!(matches!(graph(-1.0).convert(&rocksalt_fragment(), None), Err(GraphError::InvalidCutoff(_))));
        assert!(graph(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_graph_to_input_shapes() {
        let g = graph(2.5);
        let input = g.get_input(&rocksalt_fragment(), Some(vec![1.0, 2.0, 3.0])).unwrap();

        assert_eq!(input.atom.shape(), &[2, 1]);
        assert_eq!(input.atom[[1, 0]], 17.0);
        assert_eq!(input.bond.shape(), &[4, 1]);
        assert_eq!(input.state.shape(), &[1, 3]);
        assert_eq!(input.index1.len(), 4);
    }

    #[test]
    fn test_ragged_state_rejected() {
        let g = graph(2.5);
        let mut raw = g.convert(&rocksalt_fragment(), None).unwrap();
        raw.state.push(vec![1.0]);
        assert!(matches!(g.graph_to_input(&raw), Err(GraphError::InvalidState(_))));
    }

    #[test]
    fn test_strategy_is_swappable() {
        let mut g = graph(0.1);
        g.set_nn_strategy(Arc::new(AllAtomPairs));
        let raw = g.convert(&rocksalt_fragment(), None).unwrap();
        assert_eq!(raw.index1, vec![0, 1]);
        assert_eq!(raw.index2, vec![1, 0]);
    }

    #[test]
    fn test_get_inputs_keeps_order() {
        let small = rocksalt_fragment();
        let bad = Structure::from_fractional(
            Lattice::cubic(40.0),
            vec![Occupancy::ordered(Element::Na), Occupancy::ordered(Element::Cl)],
            &[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]],
        );
        let results = graph(2.5).get_inputs(&[small.clone(), bad, small]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(GraphError::IsolatedAtom(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_input_json_rows() {
        let input = graph(2.5).get_input(&rocksalt_fragment(), None).unwrap();
        let json: serde_json::Value = serde_json::to_value(&input).unwrap();
        assert_eq!(json["atom"], serde_json::json!([[11.0], [17.0]]));
        assert_eq!(json["index1"], serde_json::json!([0, 0, 1, 1]));
        assert_eq!(json["state"], serde_json::json!([[0.0, 0.0]]));
    }
}
