// src/graph/neighbors.rs

use crate::error::{GraphError, Result};
use crate::model::Structure;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

/// Distances below this are treated as the same point.
const NUMERICAL_TOL: f64 = 1e-8;

/// Largest number of periodic images searched along one axis.
const MAX_IMAGE_REACH: f64 = 1000.0;

/// One bonded neighbor of a center site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborInfo {
    pub site_index: usize,
    /// Lattice translation applied to the neighbor, relative to the stored positions.
    pub image: [i32; 3],
    /// Angstroms
    pub distance: f64,
}

/// Decides which site pairs count as bonded.
pub trait NearNeighbors: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Neighbors of every site, indexed by center site, each list sorted by distance.
    fn get_all_nn_info(&self, structure: &Structure, cutoff: f64) -> Result<Vec<Vec<NeighborInfo>>>;
}

/// Named strategies that can be selected from configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum NnStrategy {
    /// Every periodic image within the cutoff
    #[default]
    MinimumDistanceNNAll,
    /// Nearest shell only, within (1 + tol) of the closest distance
    MinimumDistanceNN,
    /// All site pairs at their minimum-image distance, cutoff ignored
    AllAtomPairs,
}

impl NnStrategy {
    pub fn build(self) -> Arc<dyn NearNeighbors> {
        match self {
            NnStrategy::MinimumDistanceNNAll => Arc::new(MinimumDistanceNNAll),
            NnStrategy::MinimumDistanceNN => Arc::new(MinimumDistanceNN::default()),
            NnStrategy::AllAtomPairs => Arc::new(AllAtomPairs),
        }
    }
}

pub fn strategy_from_name(name: &str) -> Result<Arc<dyn NearNeighbors>> {
    NnStrategy::from_str(name)
        .map(NnStrategy::build)
        .map_err(|_| GraphError::UnknownStrategy(name.to_string()))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MinimumDistanceNNAll;

impl NearNeighbors for MinimumDistanceNNAll {
    fn name(&self) -> &'static str {
        "MinimumDistanceNNAll"
    }

    fn get_all_nn_info(&self, structure: &Structure, cutoff: f64) -> Result<Vec<Vec<NeighborInfo>>> {
        neighbors_within_cutoff(structure, cutoff)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MinimumDistanceNN {
    pub tol: f64,
}

impl Default for MinimumDistanceNN {
    fn default() -> Self {
        Self { tol: 0.1 }
    }
}

impl NearNeighbors for MinimumDistanceNN {
    fn name(&self) -> &'static str {
        "MinimumDistanceNN"
    }

    fn get_all_nn_info(&self, structure: &Structure, cutoff: f64) -> Result<Vec<Vec<NeighborInfo>>> {
        let mut all = neighbors_within_cutoff(structure, cutoff)?;
        for neighbors in &mut all {
            if let Some(d_min) = neighbors.first().map(|n| n.distance) {
                let limit = d_min * (1.0 + self.tol);
                neighbors.retain(|n| n.distance <= limit);
            }
        }
        Ok(all)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllAtomPairs;

impl NearNeighbors for AllAtomPairs {
    fn name(&self) -> &'static str {
        "AllAtomPairs"
    }

    fn get_all_nn_info(&self, structure: &Structure, _cutoff: f64) -> Result<Vec<Vec<NeighborInfo>>> {
        let frac = structure.frac_coords()?;
        let basis = structure.lattice.matrix().transpose();
        let n = frac.len();

        let result = (0..n)
            .into_par_iter()
            .map(|i| {
                let fi = Vector3::from(frac[i]);
                let mut found = Vec::with_capacity(n.saturating_sub(1));
                for (j, fj) in frac.iter().enumerate() {
                    if j == i {
                        continue;
                    }
                    let fj = Vector3::from(*fj);
                    let mut best: Option<NeighborInfo> = None;

                    // ±2 cells covers strongly skewed cells
                    for dx in -2..=2 {
                        for dy in -2..=2 {
                            for dz in -2..=2 {
                                let shift = Vector3::new(dx as f64, dy as f64, dz as f64);
                                let dist = (basis * (fj + shift - fi)).norm();
                                if dist < NUMERICAL_TOL {
                                    continue;
                                }
                                if best.as_ref().map_or(true, |b| dist < b.distance) {
                                    best = Some(NeighborInfo {
                                        site_index: j,
                                        image: [dx, dy, dz],
                                        distance: dist,
                                    });
                                }
                            }
                        }
                    }
                    found.extend(best);
                }
                sort_neighbors(&mut found);
                found
            })
            .collect();

        Ok(result)
    }
}

/// Every periodic image of every site within `cutoff` of each center.
///
/// Zero-distance pairs (a site and its own home image) are excluded.
pub fn neighbors_within_cutoff(structure: &Structure, cutoff: f64) -> Result<Vec<Vec<NeighborInfo>>> {
    let frac = structure.frac_coords()?;
    let basis = structure.lattice.matrix().transpose();

    // Wrap into [0, 1) so a fixed image range suffices, remember the offsets
    let (wrapped, offsets): (Vec<Vector3<f64>>, Vec<[i32; 3]>) = frac
        .iter()
        .map(|f| {
            let floor = [f[0].floor(), f[1].floor(), f[2].floor()];
            (
                Vector3::new(f[0] - floor[0], f[1] - floor[1], f[2] - floor[2]),
                [floor[0] as i32, floor[1] as i32, floor[2] as i32],
            )
        })
        .unzip();

    let reach = image_reach(structure.lattice.perpendicular_widths(), cutoff)?;
    let limit = cutoff + NUMERICAL_TOL;

    let result: Vec<Vec<NeighborInfo>> = (0..wrapped.len())
        .into_par_iter()
        .map(|i| {
            let mut found = Vec::new();
            for (j, wj) in wrapped.iter().enumerate() {
                for a in -reach[0]..=reach[0] {
                    for b in -reach[1]..=reach[1] {
                        for c in -reach[2]..=reach[2] {
                            let shift = Vector3::new(a as f64, b as f64, c as f64);
                            let dist = (basis * (wj + shift - wrapped[i])).norm();
                            if !dist.is_finite() || dist < NUMERICAL_TOL || dist > limit {
                                continue;
                            }
                            found.push(NeighborInfo {
                                site_index: j,
                                image: [
                                    a - offsets[j][0] + offsets[i][0],
                                    b - offsets[j][1] + offsets[i][1],
                                    c - offsets[j][2] + offsets[i][2],
                                ],
                                distance: dist,
                            });
                        }
                    }
                }
            }
            sort_neighbors(&mut found);
            found
        })
        .collect();

    log::debug!(
        "Found {} neighbor pairs within {:.3} Å over {} sites",
        result.iter().map(Vec::len).sum::<usize>(),
        cutoff,
        result.len()
    );

    Ok(result)
}

/// Images needed per axis to cover a sphere of radius `cutoff`.
fn image_reach(widths: [f64; 3], cutoff: f64) -> Result<[i32; 3]> {
    let mut reach = [0; 3];
    for (r, w) in reach.iter_mut().zip(widths) {
        let n = (cutoff / w).ceil() + 1.0;
        if !(n.is_finite() && n <= MAX_IMAGE_REACH) {
            return Err(GraphError::InvalidCutoff(cutoff));
        }
        *r = n as i32;
    }
    Ok(reach)
}

fn sort_neighbors(neighbors: &mut [NeighborInfo]) {
    neighbors.sort_by(|x, y| {
        x.distance
            .total_cmp(&y.distance)
            .then(x.site_index.cmp(&y.site_index))
            .then(x.image.cmp(&y.image))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, Lattice, Occupancy, Structure};

    fn simple_cubic(a: f64) -> Structure {
        Structure::from_fractional(
            Lattice::cubic(a),
            vec![Occupancy::ordered(Element::Po)],
            &[[0.0, 0.0, 0.0]],
        )
    }

    fn bcc(a: f64) -> Structure {
        Structure::from_fractional(
            Lattice::cubic(a),
            vec![Occupancy::ordered(Element::Fe), Occupancy::ordered(Element::Fe)],
            &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
        )
    }

    #[test]
    fn test_simple_cubic_first_shell() {
        let nn = MinimumDistanceNNAll.get_all_nn_info(&simple_cubic(3.0), 3.1).unwrap();
        assert_eq!(nn.len(), 1);
        assert_eq!(nn[0].len(), 6);
        for n in &nn[0] {
            assert_eq!(n.site_index, 0);
            assert!((n.distance - 3.0).abs() < 1e-10);
            assert_eq!(n.image.iter().map(|x| x.abs()).sum::<i32>(), 1);
        }
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let nn = MinimumDistanceNNAll.get_all_nn_info(&simple_cubic(3.0), 3.0).unwrap();
        assert_eq!(nn[0].len(), 6);
    }

    #[test]
    fn test_second_shell_included() {
        // 6 at a, 12 at a*sqrt(2)
        let nn = MinimumDistanceNNAll.get_all_nn_info(&simple_cubic(2.0), 2.9).unwrap();
        assert_eq!(nn[0].len(), 18);
        assert!(nn[0].windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_cutoff_larger_than_cell() {
        // Shells at 1, sqrt2, sqrt3, 2: 6 + 12 + 8 + 6
        let nn = MinimumDistanceNNAll.get_all_nn_info(&simple_cubic(1.0), 2.0).unwrap();
        assert_eq!(nn[0].len(), 32);
    }

    #[test]
    fn test_bcc_minimum_distance_nn() {
        let a = 2.87;
        let structure = bcc(a);
        let all = MinimumDistanceNNAll.get_all_nn_info(&structure, 3.0).unwrap();
        // 8 body-diagonal neighbors at a*sqrt(3)/2 plus 6 at a
        assert_eq!(all[0].len(), 14);

        let nearest = MinimumDistanceNN::default().get_all_nn_info(&structure, 3.0).unwrap();
        assert_eq!(nearest[0].len(), 8);
        assert_eq!(nearest[1].len(), 8);
        let expected = a * 3f64.sqrt() / 2.0;
        for n in &nearest[0] {
            assert_eq!(n.site_index, 1);
            assert!((n.distance - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_images_refer_to_unwrapped_positions() {
        // Second site sits outside the home cell
        let structure = Structure::from_fractional(
            Lattice::cubic(3.0),
            vec![Occupancy::ordered(Element::Na), Occupancy::ordered(Element::Cl)],
            &[[0.1, 0.1, 0.1], [1.2, 0.1, 0.1]],
        );
        let nn = MinimumDistanceNNAll.get_all_nn_info(&structure, 0.5).unwrap();
        assert_eq!(nn[0].len(), 1);
        assert_eq!(nn[0][0].site_index, 1);
        assert_eq!(nn[0][0].image, [-1, 0, 0]);
        assert!((nn[0][0].distance - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_all_atom_pairs_ignores_cutoff() {
        let structure = bcc(4.0);
        let nn = AllAtomPairs.get_all_nn_info(&structure, 0.1).unwrap();
        assert_eq!(nn[0].len(), 1);
        assert_eq!(nn[0][0].site_index, 1);
        assert!((nn[0][0].distance - 4.0 * 3f64.sqrt() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_lookup() {
        assert_eq!(strategy_from_name("MinimumDistanceNNAll").unwrap().name(), "MinimumDistanceNNAll");
        assert_eq!(strategy_from_name("AllAtomPairs").unwrap().name(), "AllAtomPairs");
        assert!(matches!(
            strategy_from_name("VoronoiNN"),
            Err(GraphError::UnknownStrategy(s)) if s == "VoronoiNN"
        ));
        assert_eq!(NnStrategy::default(), NnStrategy::MinimumDistanceNNAll);
    }

    #[test]
    fn test_singular_lattice() {
        let mut structure = simple_cubic(3.0);
        structure.lattice = Lattice::new([[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(matches!(
            MinimumDistanceNNAll.get_all_nn_info(&structure, 3.0),
            Err(GraphError::SingularLattice)
        ));
    }

    #[test]
    fn test_huge_cutoff_is_rejected() {
        assert!(matches!(
            MinimumDistanceNNAll.get_all_nn_info(&simple_cubic(1.0), 1e10),
            Err(GraphError::InvalidCutoff(c)) if c == 1e10
        ));
        assert!(image_reach([1.0; 3], f64::MAX).is_err());
        assert_eq!(image_reach([2.0, 3.0, 10.0], 5.0).unwrap(), [4, 3, 2]);
    }

    #[test]
    fn test_nan_lattice_gives_no_bonds() {
        let mut structure = simple_cubic(3.0);
        structure.lattice.vectors[2][2] = f64::NAN;
        assert!(matches!(
            MinimumDistanceNNAll.get_all_nn_info(&structure, 3.0),
            Err(GraphError::SingularLattice)
        ));
    }
}
