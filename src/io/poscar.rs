// src/io/poscar.rs

use crate::error::{GraphError, Result};
use crate::model::{Element, Lattice, Occupancy, Site, Structure};
use std::fs;
use std::path::Path;

pub fn parse(path: impl AsRef<Path>) -> Result<Structure> {
    let text = fs::read_to_string(path)?;
    parse_str(&text)
}

fn invalid(msg: &str) -> GraphError {
    GraphError::Parse(format!("POSCAR: {}", msg))
}

fn parse_floats(line: &str, n: usize, what: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(n)
        .map(|x| x.parse::<f64>().map_err(|_| invalid(&format!("invalid {} '{}'", what, x))))
        .collect::<Result<_>>()?;
    if values.len() < n {
        return Err(invalid(&format!("expected {} values for {}", n, what)));
    }
    Ok(values)
}

/// VASP 5 format: the element line is required since species cannot be
/// recovered from a VASP 4 file alone.
pub fn parse_str(text: &str) -> Result<Structure> {
    let mut lines = text.lines();
    let mut next_line = |what: &str| lines.next().ok_or_else(|| invalid(&format!("missing {}", what)));

    let comment = next_line("comment")?.trim().to_string();

    // Scale (negative = target volume)
    let scale = parse_floats(next_line("scale")?, 1, "scale")?[0];

    let mut vectors = [[0.0; 3]; 3];
    for row in vectors.iter_mut() {
        let v = parse_floats(next_line("lattice vector")?, 3, "lattice vector")?;
        row.copy_from_slice(&v);
    }

    let factor = if scale < 0.0 {
        let volume = Lattice::new(vectors).volume();
        if volume == 0.0 {
            return Err(GraphError::SingularLattice);
        }
        (-scale / volume).cbrt()
    } else {
        scale
    };
    for row in vectors.iter_mut() {
        for x in row.iter_mut() {
            *x *= factor;
        }
    }
    let lattice = Lattice::new(vectors);

    // Elements & Counts
    let element_line = next_line("element symbols")?;
    if !element_line.trim().chars().next().is_some_and(|c| c.is_alphabetic()) {
        return Err(invalid("element symbol line is required (VASP 5 format)"));
    }
    let elements: Vec<Element> = element_line
        .split_whitespace()
        .map(Element::from_label)
        .collect::<Result<_>>()?;

    let counts: Vec<usize> = next_line("counts")?
        .split_whitespace()
        .map(|x| x.parse().map_err(|_| invalid(&format!("invalid count '{}'", x))))
        .collect::<Result<_>>()?;
    if counts.len() != elements.len() {
        return Err(invalid("element and count lines differ in length"));
    }

    // Mode, possibly after "Selective dynamics"
    let mut mode_line = next_line("coordinate mode")?.trim().to_lowercase();
    if mode_line.starts_with('s') {
        mode_line = next_line("coordinate mode")?.trim().to_lowercase();
    }
    let is_cartesian = mode_line.starts_with('c') || mode_line.starts_with('k');

    let mut sites = Vec::with_capacity(counts.iter().sum());
    for (element, &count) in elements.iter().zip(&counts) {
        for _ in 0..count {
            let p = parse_floats(next_line("atom position")?, 3, "atom position")?;
            let position = if is_cartesian {
                [p[0] * factor, p[1] * factor, p[2] * factor]
            } else {
                lattice.frac_to_cart([p[0], p[1], p[2]])
            };
            sites.push(Site::new(Occupancy::ordered(*element), position));
        }
    }

    Ok(Structure { lattice, sites, formula: comment })
}
