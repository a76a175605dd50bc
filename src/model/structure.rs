// src/model/structure.rs

use super::elements::Element;
use super::lattice::Lattice;
use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const OCCUPANCY_TOL: f64 = 1e-8;

/// Species occupying one site: element -> occupancy fraction.
///
/// Keys are unique and iterate in atomic-number order. Fractions are stored as
/// given; nothing checks that they sum to 1.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Occupancy(BTreeMap<Element, f64>);

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully occupied ordered site.
    pub fn ordered(element: Element) -> Self {
        let mut occ = Self::new();
        occ.insert(element, 1.0);
        occ
    }

    /// Adds `fraction` to the element's current fraction.
    pub fn insert(&mut self, element: Element, fraction: f64) {
        *self.0.entry(element).or_insert(0.0) += fraction;
    }

    pub fn get(&self, element: Element) -> Option<f64> {
        self.0.get(&element).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Element, f64)> + '_ {
        self.0.iter().map(|(el, frac)| (*el, *frac))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Single species at full occupancy.
    pub fn is_ordered(&self) -> bool {
        self.0.len() == 1 && (self.total() - 1.0).abs() < OCCUPANCY_TOL
    }

    /// The sole species of an ordered site.
    pub fn specie(&self) -> Option<Element> {
        if self.is_ordered() {
            self.0.keys().next().copied()
        } else {
            None
        }
    }

    /// Merge another site's species into this one.
    pub fn merge(&mut self, other: &Occupancy) {
        for (el, frac) in other.iter() {
            self.insert(el, frac);
        }
    }
}

impl FromIterator<(Element, f64)> for Occupancy {
    fn from_iter<I: IntoIterator<Item = (Element, f64)>>(iter: I) -> Self {
        let mut occ = Occupancy::new();
        for (el, frac) in iter {
            occ.insert(el, frac);
        }
        occ
    }
}

/// Parses formula-like species strings: "Fe", "Ni0.5Co0.5", "Fe0.25 Ni0.75".
impl FromStr for Occupancy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.is_empty() {
            return Err(GraphError::Parse("empty species string".to_string()));
        }

        let mut occ = Occupancy::new();
        let mut i = 0;
        while i < chars.len() {
            if !chars[i].is_ascii_uppercase() {
                return Err(GraphError::Parse(format!("invalid species string: {}", s)));
            }
            let mut symbol = chars[i].to_string();
            i += 1;
            while i < chars.len() && chars[i].is_ascii_lowercase() {
                symbol.push(chars[i]);
                i += 1;
            }

            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let amount = if start == i {
                1.0
            } else {
                let text: String = chars[start..i].iter().collect();
                text.parse::<f64>()
                    .map_err(|_| GraphError::Parse(format!("invalid amount '{}' in {}", text, s)))?
            };

            occ.insert(Element::from_symbol(&symbol)?, amount);
        }
        Ok(occ)
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_ordered() {
            if let Some(el) = self.specie() {
                return write!(f, "{}", el);
            }
        }
        for (el, frac) in self.iter() {
            write!(f, "{}{}", el, frac)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub species: Occupancy,
    /// Cartesian position (Å)
    pub position: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Site {
    pub fn new(species: Occupancy, position: [f64; 3]) -> Self {
        Self { species, position, label: None }
    }

    pub fn is_ordered(&self) -> bool {
        self.species.is_ordered()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
    // Free-form description from the source file
    #[serde(default)]
    pub formula: String,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites, formula: String::new() }
    }

    /// Build from fractional coordinates, one species map per position.
    pub fn from_fractional(lattice: Lattice, species: Vec<Occupancy>, frac_coords: &[[f64; 3]]) -> Self {
        let sites = species
            .into_iter()
            .zip(frac_coords)
            .map(|(occ, frac)| Site::new(occ, lattice.frac_to_cart(*frac)))
            .collect();
        Self::new(lattice, sites)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn is_ordered(&self) -> bool {
        self.sites.iter().all(Site::is_ordered)
    }

    pub fn frac_coords(&self) -> Result<Vec<[f64; 3]>> {
        let inv = self.lattice.inverse_transpose()?;
        Ok(self
            .sites
            .iter()
            .map(|site| {
                let f = inv * nalgebra::Vector3::from(site.position);
                [f.x, f.y, f.z]
            })
            .collect())
    }

    /// Total amount of each element over all sites.
    pub fn composition(&self) -> Occupancy {
        let mut total = Occupancy::new();
        for site in &self.sites {
            total.merge(&site.species);
        }
        total
    }
}
