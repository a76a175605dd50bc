// src/io/cif.rs

use crate::error::{GraphError, Result};
use crate::model::{Element, Lattice, Occupancy, Site, Structure};
use std::fs;
use std::path::Path;

/// Fractional tolerance for "same position" after wrapping into [0, 1).
const POSITION_TOL: f64 = 1e-3;

pub fn parse(path: impl AsRef<Path>) -> Result<Structure> {
    let text = fs::read_to_string(path)?;
    parse_str(&text)
}

#[derive(Debug, Default)]
struct CifLoop {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CifLoop {
    fn column(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }
}

struct BaseAtom {
    label: String,
    species: Occupancy,
    frac: [f64; 3],
}

/// Reads the first data block. Sites sharing a position (within 1e-3 in
/// fractional units) but listed as different asymmetric atoms are merged
/// into one partially occupied site.
pub fn parse_str(text: &str) -> Result<Structure> {
    let mut cell = [None; 6];
    let mut loops: Vec<CifLoop> = Vec::new();
    let mut current: Option<CifLoop> = None;
    let mut pending: Vec<String> = Vec::new();
    let mut in_text_field = false;
    let mut block_name = String::new();

    for line in text.lines() {
        // Multi-line text fields are delimited by ';' in column one
        if line.starts_with(';') {
            in_text_field = !in_text_field;
            continue;
        }
        if in_text_field {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(name) = trimmed.strip_prefix("data_") {
            if !block_name.is_empty() {
                // Only the first block is read
                break;
            }
            block_name = name.to_string();
            continue;
        }

        if trimmed.eq_ignore_ascii_case("loop_") {
            close_loop(&mut loops, &mut current, &pending)?;
            current = Some(CifLoop::default());
            continue;
        }

        if trimmed.starts_with('_') {
            if let Some(lp) = current.as_mut() {
                if lp.rows.is_empty() && pending.is_empty() {
                    lp.headers.push(trimmed.split_whitespace().next().unwrap_or(trimmed).to_string());
                    continue;
                }
                // A tag after data rows closes the loop
                close_loop(&mut loops, &mut current, &pending)?;
            }

            let tokens = tokenize(trimmed);
            if tokens.len() >= 2 {
                let key = tokens[0].to_ascii_lowercase();
                let slot = match key.as_str() {
                    "_cell_length_a" => Some(0),
                    "_cell_length_b" => Some(1),
                    "_cell_length_c" => Some(2),
                    "_cell_angle_alpha" => Some(3),
                    "_cell_angle_beta" => Some(4),
                    "_cell_angle_gamma" => Some(5),
                    _ => None,
                };
                if let Some(i) = slot {
                    cell[i] = Some(parse_cif_float(&tokens[1])?);
                }
            }
            continue;
        }

        if let Some(lp) = current.as_mut() {
            pending.extend(tokenize(trimmed));
            let width = lp.headers.len();
            while width > 0 && pending.len() >= width {
                lp.rows.push(pending.drain(..width).collect());
            }
        }
    }
    close_loop(&mut loops, &mut current, &pending)?;

    let [a, b, c, alpha, beta, gamma] = cell;
    let lattice = Lattice::from_parameters(
        a.ok_or_else(|| GraphError::Parse("CIF: missing _cell_length_a".to_string()))?,
        b.ok_or_else(|| GraphError::Parse("CIF: missing _cell_length_b".to_string()))?,
        c.ok_or_else(|| GraphError::Parse("CIF: missing _cell_length_c".to_string()))?,
        alpha.unwrap_or(90.0),
        beta.unwrap_or(90.0),
        gamma.unwrap_or(90.0),
    )?;

    let symmetry_ops = symmetry_operations(&loops)?;
    let base_atoms = base_atoms(&loops)?;
    if base_atoms.is_empty() {
        return Err(GraphError::Parse("CIF: no atom sites found".to_string()));
    }

    // Expand symmetry: de-duplicate images of one atom, merge distinct atoms
    let mut merged: Vec<(Occupancy, [f64; 3], String)> = Vec::new();
    for atom in &base_atoms {
        let mut images: Vec<[f64; 3]> = Vec::new();
        for op in &symmetry_ops {
            let p = op.apply(atom.frac);
            let wrapped = [p[0].rem_euclid(1.0), p[1].rem_euclid(1.0), p[2].rem_euclid(1.0)];
            if !images.iter().any(|q| same_position(q, &wrapped)) {
                images.push(wrapped);
            }
        }

        for image in images {
            match merged.iter_mut().find(|(_, q, _)| same_position(q, &image)) {
                Some((species, _, _)) => species.merge(&atom.species),
                None => merged.push((atom.species.clone(), image, atom.label.clone())),
            }
        }
    }

    log::debug!(
        "CIF block '{}': {} asymmetric atoms, {} symmetry operations, {} sites",
        block_name,
        base_atoms.len(),
        symmetry_ops.len(),
        merged.len()
    );

    let sites = merged
        .into_iter()
        .map(|(species, frac, label)| Site {
            species,
            position: lattice.frac_to_cart(frac),
            label: Some(label),
        })
        .collect();

    Ok(Structure { lattice, sites, formula: block_name })
}

fn symmetry_operations(loops: &[CifLoop]) -> Result<Vec<SymOp>> {
    let names = ["_symmetry_equiv_pos_as_xyz", "_space_group_symop_operation_xyz"];
    let ops: Vec<SymOp> = match loops.iter().find_map(|lp| lp.column(&names).map(|col| (lp, col))) {
        Some((lp, col)) => lp
            .rows
            .iter()
            .map(|row| SymOp::parse(&row[col]))
            .collect::<Result<_>>()?,
        None => Vec::new(),
    };

    if ops.is_empty() {
        Ok(vec![SymOp::identity()])
    } else {
        Ok(ops)
    }
}

/// Appends the open loop to `loops`; leftover tokens mean a truncated row.
fn close_loop(loops: &mut Vec<CifLoop>, current: &mut Option<CifLoop>, pending: &[String]) -> Result<()> {
    if let Some(lp) = current.take() {
        if !pending.is_empty() {
            return Err(GraphError::Parse(format!(
                "CIF: incomplete loop row ({} of {} values: {})",
                pending.len(),
                lp.headers.len(),
                pending.join(" ")
            )));
        }
        loops.push(lp);
    }
    Ok(())
}

fn base_atoms(loops: &[CifLoop]) -> Result<Vec<BaseAtom>> {
    let Some(lp) = loops.iter().find(|lp| lp.column(&["_atom_site_fract_x"]).is_some()) else {
        return Ok(Vec::new());
    };

    let missing = |tag: &str| GraphError::Parse(format!("CIF: atom site loop lacks {}", tag));
    let col_x = lp.column(&["_atom_site_fract_x"]).ok_or_else(|| missing("_atom_site_fract_x"))?;
    let col_y = lp.column(&["_atom_site_fract_y"]).ok_or_else(|| missing("_atom_site_fract_y"))?;
    let col_z = lp.column(&["_atom_site_fract_z"]).ok_or_else(|| missing("_atom_site_fract_z"))?;
    let col_type = lp.column(&["_atom_site_type_symbol"]);
    let col_label = lp.column(&["_atom_site_label"]);
    let col_occ = lp.column(&["_atom_site_occupancy"]);

    if col_type.is_none() && col_label.is_none() {
        return Err(missing("_atom_site_type_symbol or _atom_site_label"));
    }

    lp.rows
        .iter()
        .map(|row| {
            let label = col_label.map(|c| row[c].clone()).unwrap_or_default();
            let symbol = col_type.map(|c| row[c].as_str()).unwrap_or(label.as_str());
            let element = Element::from_label(symbol)?;
            let occupancy = match col_occ.map(|c| row[c].as_str()) {
                None | Some("?") | Some(".") => 1.0,
                Some(v) => parse_cif_float(v)?,
            };

            let mut species = Occupancy::new();
            species.insert(element, occupancy);
            Ok(BaseAtom {
                label: if label.is_empty() { element.to_string() } else { label },
                species,
                frac: [
                    parse_cif_float(&row[col_x])?,
                    parse_cif_float(&row[col_y])?,
                    parse_cif_float(&row[col_z])?,
                ],
            })
        })
        .collect()
}

fn same_position(p: &[f64; 3], q: &[f64; 3]) -> bool {
    (0..3).all(|k| {
        let d = (p[k] - q[k]).abs();
        d < POSITION_TOL || (1.0 - d) < POSITION_TOL
    })
}

/// Whitespace split that keeps quoted strings ('x, y, z') together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' || c == '"' {
            chars.next();
            let token: String = chars.by_ref().take_while(|&ch| ch != c).collect();
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    tokens
}

/// Affine operation in fractional coordinates, one row per output axis:
/// coefficients of x, y, z followed by the translation.
#[derive(Clone, Debug, PartialEq)]
struct SymOp {
    rows: [[f64; 4]; 3],
}

impl SymOp {
    fn identity() -> Self {
        Self {
            rows: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
        }
    }

    /// Parses "x,y,z", "-x+1/2, y, -z" or "x-y,x,z+0.25".
    fn parse(op: &str) -> Result<Self> {
        let components: Vec<&str> = op.split(',').collect();
        if components.len() != 3 {
            return Err(GraphError::Parse(format!("CIF: symmetry operation '{}' needs 3 components", op)));
        }

        let mut rows = [[0.0; 4]; 3];
        for (row, component) in rows.iter_mut().zip(components) {
            *row = parse_component(component)
                .ok_or_else(|| GraphError::Parse(format!("CIF: invalid symmetry operation '{}'", op)))?;
        }
        Ok(Self { rows })
    }

    fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        self.rows.map(|r| r[0] * p[0] + r[1] * p[1] + r[2] * p[2] + r[3])
    }
}

/// One component of an operation as [cx, cy, cz, t]; `None` if malformed.
fn parse_component(component: &str) -> Option<[f64; 4]> {
    let expr: String = component
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if expr.is_empty() {
        return None;
    }

    // Split before every sign that is not the leading one
    let mut starts: Vec<usize> = expr
        .char_indices()
        .filter(|&(i, c)| i > 0 && (c == '+' || c == '-'))
        .map(|(i, _)| i)
        .collect();
    starts.insert(0, 0);
    starts.push(expr.len());

    let mut row = [0.0; 4];
    for bounds in starts.windows(2) {
        let term = &expr[bounds[0]..bounds[1]];
        let (sign, body) = match term.as_bytes().first() {
            Some(b'-') => (-1.0, &term[1..]),
            Some(b'+') => (1.0, &term[1..]),
            _ => (1.0, term),
        };

        let (coefficient, slot) = match body.chars().last()? {
            'x' => (&body[..body.len() - 1], 0),
            'y' => (&body[..body.len() - 1], 1),
            'z' => (&body[..body.len() - 1], 2),
            _ => (body, 3),
        };
        let coefficient = coefficient.trim_end_matches('*');
        let value = if coefficient.is_empty() && slot < 3 {
            1.0
        } else {
            parse_fraction(coefficient)?
        };
        row[slot] += sign * value;
    }
    Some(row)
}

/// "1/2" or "0.5"
fn parse_fraction(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => s.parse().ok()?,
    };
    value.is_finite().then_some(value)
}

/// "5.431(2)" -> 5.431
fn parse_cif_float(s: &str) -> Result<f64> {
    let clean: String = s.chars().take_while(|c| *c != '(').collect();
    clean
        .parse()
        .map_err(|_| GraphError::Parse(format!("CIF: invalid number '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISORDERED: &str = "data_FeNiCo
_cell_length_a    2.90
_cell_length_b    2.90
_cell_length_c    2.90(1)
_cell_angle_alpha 90
_cell_angle_beta  90
_cell_angle_gamma 90
loop_
 _symmetry_equiv_pos_as_xyz
 'x, y, z'
loop_
 _atom_site_label
 _atom_site_type_symbol
 _atom_site_fract_x
 _atom_site_fract_y
 _atom_site_fract_z
 _atom_site_occupancy
 Fe1 Fe 0.0 0.0 0.0 1.0
 Ni1 Ni 0.5 0.5 0.5 0.5
 Co1 Co 0.5 0.5 0.5 0.5
";

    #[test]
    fn test_co_located_species_merge() {
        let s = parse_str(DISORDERED).unwrap();
        assert_eq!(s.formula, "FeNiCo");
        assert_eq!(s.len(), 2);
        assert_eq!(s.sites[0].species, Occupancy::ordered(Element::Fe));
        assert_eq!(s.sites[1].species.get(Element::Ni), Some(0.5));
        assert_eq!(s.sites[1].species.get(Element::Co), Some(0.5));
        assert_eq!(s.sites[1].label.as_deref(), Some("Ni1"));
        assert!((s.sites[1].position[2] - 1.45).abs() < 1e-9);
    }

    #[test]
    fn test_symmetry_expansion_bcc() {
        let text = "data_Fe
_cell_length_a 2.87
_cell_length_b 2.87
_cell_length_c 2.87
loop_
_space_group_symop_id
_space_group_symop_operation_xyz
1 x,y,z
2 x+1/2,y+1/2,z+1/2
3 -x,-y,-z
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe1 0 0 0
";
        let s = parse_str(text).unwrap();
        // -x of the origin is the origin again
        assert_eq!(s.len(), 2);
        assert!(s.is_ordered());
        assert!((s.sites[1].position[0] - 1.435).abs() < 1e-9);
    }

    #[test]
    fn test_rows_may_span_lines() {
        let text = "data_x
_cell_length_a 3
_cell_length_b 3
_cell_length_c 3
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Cu 0 0
0
";
        let s = parse_str(text).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.sites[0].species.specie(), Some(Element::Cu));
    }

    #[test]
    fn test_truncated_row_is_an_error() {
        let at_eof = "data_x
_cell_length_a 3
_cell_length_b 3
_cell_length_c 3
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe 0 0 0
Cu 0.5 0.5
";
        assert!(matches!(parse_str(at_eof), Err(GraphError::Parse(msg)) if msg.contains("incomplete")));

        let before_tag = at_eof.replace("Cu 0.5 0.5\n", "Cu 0.5 0.5\n_cell_angle_alpha 90\n");
        assert!(matches!(parse_str(&before_tag), Err(GraphError::Parse(_))));
    }

    #[test]
    fn test_impossible_cell_angles() {
        let text = "data_x
_cell_length_a 3
_cell_length_b 3
_cell_length_c 3
_cell_angle_alpha 150
_cell_angle_beta 150
_cell_angle_gamma 150
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe 0 0 0
";
        assert!(matches!(parse_str(text), Err(GraphError::SingularLattice)));
    }

    #[test]
    fn test_missing_cell_is_an_error() {
        let text = "data_x\nloop_\n_atom_site_label\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\nFe 0 0 0\n";
        assert!(matches!(parse_str(text), Err(GraphError::Parse(_))));
    }

    #[test]
    fn test_symmetry_operation_parsing() {
        let p = [0.1, 0.2, 0.3];
        let q = SymOp::parse("-x+1/2, x-y, Z").unwrap().apply(p);
        assert!((q[0] - 0.4).abs() < 1e-12);
        assert!((q[1] + 0.1).abs() < 1e-12);
        assert!((q[2] - 0.3).abs() < 1e-12);

        let q = SymOp::parse("1/2+x,2*y,-0.25+z").unwrap().apply(p);
        assert!((q[0] - 0.6).abs() < 1e-12);
        assert!((q[1] - 0.4).abs() < 1e-12);
        assert!((q[2] - 0.05).abs() < 1e-12);

        assert_eq!(SymOp::parse("x,y,z").unwrap(), SymOp::identity());
    }

    #[test]
    fn test_malformed_symmetry_operations() {
        for op in ["x+1/0,y,z", "q,y,z", "x,y", "x,,z", "x+,y,z", "x,y,z,x"] {
            assert!(
                matches!(SymOp::parse(op), Err(GraphError::Parse(_))),
                "{} should be rejected",
                op
            );
        }

        let text = "data_x
_cell_length_a 3
_cell_length_b 3
_cell_length_c 3
loop_
_symmetry_equiv_pos_as_xyz
'x,y,w'
loop_
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Cu 0 0 0
";
        assert!(matches!(parse_str(text), Err(GraphError::Parse(_))));
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(tokenize("1 'x, y, z'"), vec!["1", "x, y, z"]);
        assert_eq!(tokenize("  Fe1  Fe 0.0 "), vec!["Fe1", "Fe", "0.0"]);
    }
}
