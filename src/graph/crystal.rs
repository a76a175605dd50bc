// src/graph/crystal.rs

use super::base::{FixedRadiusGraph, GraphInput, MaterialGraph, DEFAULT_CUTOFF};
use super::converters::{AtomEmbeddingMap, Converter, EmbeddingTable, IdentityConverter};
use super::neighbors::{strategy_from_name, NearNeighbors, NnStrategy};
use crate::error::{GraphError, Result};
use crate::model::{Occupancy, Structure};
use std::sync::Arc;

/// Crystal graph for ordered structures.
///
/// Atom feature: atomic number. Bond feature: interatomic distance.
/// Defaults: `MinimumDistanceNNAll`, identity converters, 5 Å cutoff.
#[derive(Clone, Debug)]
pub struct CrystalPro {
    graph: FixedRadiusGraph<u8>,
}

impl CrystalPro {
    /// `None` converters fall back to [`IdentityConverter`].
    pub fn new(
        nn_strategy: Arc<dyn NearNeighbors>,
        atom_converter: Option<Arc<dyn Converter<u8>>>,
        bond_converter: Option<Arc<dyn Converter<f64>>>,
        cutoff: f64,
    ) -> Self {
        let graph = FixedRadiusGraph::new(
            nn_strategy,
            atom_converter.unwrap_or_else(|| Arc::new(IdentityConverter)),
            bond_converter.unwrap_or_else(|| Arc::new(IdentityConverter)),
            cutoff,
            Self::get_atom_features,
        );
        Self { graph }
    }

    pub fn with_strategy(mut self, nn_strategy: Arc<dyn NearNeighbors>) -> Self {
        self.graph.set_nn_strategy(nn_strategy);
        self
    }

    pub fn with_strategy_name(self, name: &str) -> Result<Self> {
        Ok(self.with_strategy(strategy_from_name(name)?))
    }

    pub fn with_atom_converter(mut self, converter: impl Converter<u8> + 'static) -> Self {
        self.graph.set_atom_converter(Arc::new(converter));
        self
    }

    pub fn with_bond_converter(mut self, converter: impl Converter<f64> + 'static) -> Self {
        self.graph.set_bond_converter(Arc::new(converter));
        self
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.graph.set_cutoff(cutoff);
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.graph.cutoff()
    }

    pub fn graph(&self) -> &FixedRadiusGraph<u8> {
        &self.graph
    }

    /// Atomic number of each site; every site must be ordered.
    pub fn get_atom_features(structure: &Structure) -> Result<Vec<u8>> {
        structure
            .sites
            .iter()
            .enumerate()
            .map(|(i, site)| {
                site.species
                    .specie()
                    .map(|el| el.atomic_number())
                    .ok_or(GraphError::DisorderedSite(i))
            })
            .collect()
    }

    pub fn convert(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<MaterialGraph<u8>> {
        self.graph.convert(structure, state)
    }

    pub fn graph_to_input(&self, graph: &MaterialGraph<u8>) -> Result<GraphInput> {
        self.graph.graph_to_input(graph)
    }

    pub fn get_input(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<GraphInput> {
        self.graph.get_input(structure, state)
    }

    pub fn get_inputs(&self, structures: &[Structure]) -> Vec<Result<GraphInput>> {
        self.graph.get_inputs(structures)
    }
}

impl Default for CrystalPro {
    fn default() -> Self {
        Self::new(NnStrategy::default().build(), None, None, DEFAULT_CUTOFF)
    }
}

/// Crystal graph for structures with partially occupied sites.
///
/// Atom features are per-site occupancy maps, turned into vectors by an
/// [`AtomEmbeddingMap`] unless another converter is given. The default map
/// has an empty table, so real use needs [`CrystalGraphDisordered::with_embeddings`]
/// or an explicit converter.
#[derive(Clone, Debug)]
pub struct CrystalGraphDisordered {
    graph: FixedRadiusGraph<Occupancy>,
}

impl CrystalGraphDisordered {
    /// `None` atom converter builds a fresh [`AtomEmbeddingMap::default`];
    /// `None` bond converter falls back to [`IdentityConverter`].
    pub fn new(
        nn_strategy: Arc<dyn NearNeighbors>,
        atom_converter: Option<Arc<dyn Converter<Occupancy>>>,
        bond_converter: Option<Arc<dyn Converter<f64>>>,
        cutoff: f64,
    ) -> Self {
        let graph = FixedRadiusGraph::new(
            nn_strategy,
            atom_converter.unwrap_or_else(|| Arc::new(AtomEmbeddingMap::default())),
            bond_converter.unwrap_or_else(|| Arc::new(IdentityConverter)),
            cutoff,
            site_occupancies,
        );
        Self { graph }
    }

    pub fn with_embeddings(self, table: EmbeddingTable) -> Self {
        self.with_atom_converter(AtomEmbeddingMap::new(table))
    }

    pub fn with_strategy(mut self, nn_strategy: Arc<dyn NearNeighbors>) -> Self {
        self.graph.set_nn_strategy(nn_strategy);
        self
    }

    pub fn with_strategy_name(self, name: &str) -> Result<Self> {
        Ok(self.with_strategy(strategy_from_name(name)?))
    }

    pub fn with_atom_converter(mut self, converter: impl Converter<Occupancy> + 'static) -> Self {
        self.graph.set_atom_converter(Arc::new(converter));
        self
    }

    pub fn with_bond_converter(mut self, converter: impl Converter<f64> + 'static) -> Self {
        self.graph.set_bond_converter(Arc::new(converter));
        self
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.graph.set_cutoff(cutoff);
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.graph.cutoff()
    }

    pub fn graph(&self) -> &FixedRadiusGraph<Occupancy> {
        &self.graph
    }

    /// Site occupancies in site order, e.g. a Fe0.5Ni0.5 site becomes
    /// `{Fe: 0.5, Ni: 0.5}`.
    pub fn get_atom_features(structure: &Structure) -> Vec<Occupancy> {
        structure.sites.iter().map(|site| site.species.clone()).collect()
    }

    pub fn convert(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<MaterialGraph<Occupancy>> {
        self.graph.convert(structure, state)
    }

    pub fn graph_to_input(&self, graph: &MaterialGraph<Occupancy>) -> Result<GraphInput> {
        self.graph.graph_to_input(graph)
    }

    pub fn get_input(&self, structure: &Structure, state: Option<Vec<f64>>) -> Result<GraphInput> {
        self.graph.get_input(structure, state)
    }

    pub fn get_inputs(&self, structures: &[Structure]) -> Vec<Result<GraphInput>> {
        self.graph.get_inputs(structures)
    }
}

fn site_occupancies(structure: &Structure) -> Result<Vec<Occupancy>> {
    Ok(CrystalGraphDisordered::get_atom_features(structure))
}

impl Default for CrystalGraphDisordered {
    fn default() -> Self {
        Self::new(NnStrategy::default().build(), None, None, DEFAULT_CUTOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::converters::GaussianDistance;
    use crate::model::{Element, Lattice};
    use std::collections::HashMap;

    fn iron_nickel_cobalt() -> Structure {
        Structure::from_fractional(
            Lattice::cubic(2.9),
            vec![Occupancy::ordered(Element::Fe), "Ni0.5Co0.5".parse().unwrap()],
            &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
        )
    }

    fn embeddings() -> EmbeddingTable {
        let mut vectors = HashMap::new();
        vectors.insert(Element::Fe, vec![1.0, 0.0]);
        vectors.insert(Element::Ni, vec![0.0, 2.0]);
        vectors.insert(Element::Co, vec![2.0, 0.0]);
        EmbeddingTable::new(vectors).unwrap()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CrystalPro::default().cutoff(), 5.0);
        assert_eq!(CrystalGraphDisordered::default().cutoff(), 5.0);
        assert_eq!(CrystalPro::default().graph().nn_strategy().name(), "MinimumDistanceNNAll");
    }

    #[test]
    fn test_crystal_pro_simple_cubic() {
        let structure = Structure::from_fractional(
            Lattice::cubic(3.0),
            vec![Occupancy::ordered(Element::Po)],
            &[[0.0, 0.0, 0.0]],
        );
        let graph = CrystalPro::default().with_cutoff(3.1).convert(&structure, None).unwrap();

        assert_eq!(graph.atom, vec![84]);
        assert_eq!(graph.num_bonds(), 6);
        assert!(graph.index1.iter().chain(&graph.index2).all(|&i| i == 0));
        assert!(graph.bond.iter().all(|d| (d - 3.0).abs() < 1e-10));
    }

    #[test]
    fn test_crystal_pro_rejects_disorder() {
        let result = CrystalPro::default().convert(&iron_nickel_cobalt(), None);
        assert!(matches!(result, Err(GraphError::DisorderedSite(1))));
    }

    #[test]
    fn test_crystal_pro_gaussian_bonds() {
        let structure = Structure::from_fractional(
            Lattice::cubic(3.0),
            vec![Occupancy::ordered(Element::Po)],
            &[[0.0, 0.0, 0.0]],
        );
        let input = CrystalPro::default()
            .with_cutoff(3.1)
            .with_bond_converter(GaussianDistance::default())
            .get_input(&structure, None)
            .unwrap();
        assert_eq!(input.bond.shape(), &[6, 100]);
        assert_eq!(input.atom.shape(), &[1, 1]);
    }

    #[test]
    fn test_unknown_strategy_name() {
        assert!(matches!(
            CrystalPro::default().with_strategy_name("CrystalNN"),
            Err(GraphError::UnknownStrategy(_))
        ));
        let g = CrystalGraphDisordered::default().with_strategy_name("MinimumDistanceNN").unwrap();
        assert_eq!(g.graph().nn_strategy().name(), "MinimumDistanceNN");
    }

    #[test]
    fn test_non_positive_cutoff_reported_on_use() {
        let g = CrystalPro::default().with_cutoff(0.0);
        assert_eq!(g.cutoff(), 0.0);
        assert!(matches!(g.convert(&iron_nickel_cobalt(), None), Err(GraphError::InvalidCutoff(_))));
    }

    #[test]
    fn test_get_atom_features_preserves_site_order() {
        let features = CrystalGraphDisordered::get_atom_features(&iron_nickel_cobalt());
        assert_eq!(features.len(), 2);
        assert_eq!(features[0], Occupancy::ordered(Element::Fe));
        assert_eq!(features[1].get(Element::Ni), Some(0.5));
        assert_eq!(features[1].get(Element::Co), Some(0.5));
        assert_eq!(features[1].len(), 2);
    }

    #[test]
    fn test_disordered_graph_embeds_sites() {
        let g = CrystalGraphDisordered::default().with_embeddings(embeddings());
        let input = g.get_input(&iron_nickel_cobalt(), None).unwrap();

        assert_eq!(input.atom.shape(), &[2, 2]);
        assert_eq!(input.atom.row(0).to_vec(), vec![1.0, 0.0]);
        assert!((input.atom[[1, 0]] - 1.0).abs() < 1e-12);
        assert!((input.atom[[1, 1]] - 1.0).abs() < 1e-12);
        assert_eq!(input.index1.len(), input.bond.nrows());
    }

    #[test]
    fn test_default_disordered_converter_needs_embeddings() {
        let result = CrystalGraphDisordered::default().get_input(&iron_nickel_cobalt(), None);
        assert!(matches!(
            result,
            Err(GraphError::MissingEmbedding { element: Element::Fe, site: 0 })
        ));
    }

    #[test]
    fn test_each_default_gets_its_own_converter() {
        let a = CrystalGraphDisordered::default();
        let b = CrystalGraphDisordered::default().with_embeddings(embeddings());
        assert!(a.get_input(&iron_nickel_cobalt(), None).is_err());
        assert!(b.get_input(&iron_nickel_cobalt(), None).is_ok());
    }
}
