// src/model/lattice.rs

use crate::error::{GraphError, Result};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Periodic cell. Rows are the lattice vectors a, b, c in Angstroms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
  pub vectors: [[f64; 3]; 3],
}

impl Lattice {
  pub fn new(vectors: [[f64; 3]; 3]) -> Self {
    Self { vectors }
  }

  pub fn cubic(a: f64) -> Self {
    Self::new([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
  }

  /// Build from cell lengths (Å) and angles (degrees), a along x, b in the xy plane.
  ///
  /// Angles that cannot close a cell (e.g. 150/150/150) give `SingularLattice`.
  pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<Self> {
    let (alpha_r, beta_r, gamma_r) = (alpha.to_radians(), beta.to_radians(), gamma.to_radians());
    let v = (1.0 - alpha_r.cos().powi(2) - beta_r.cos().powi(2) - gamma_r.cos().powi(2)
      + 2.0 * alpha_r.cos() * beta_r.cos() * gamma_r.cos())
    .sqrt();

    let lattice = Self::new([
      [a, 0.0, 0.0],
      [b * gamma_r.cos(), b * gamma_r.sin(), 0.0],
      [
        c * beta_r.cos(),
        c * (alpha_r.cos() - beta_r.cos() * gamma_r.cos()) / gamma_r.sin(),
        c * v / gamma_r.sin(),
      ],
    ]);
    lattice.check_volume()?;
    Ok(lattice)
  }

  /// Volume must be finite and positive.
  pub fn check_volume(&self) -> Result<()> {
    let volume = self.volume();
    if volume.is_finite() && volume > 0.0 {
      Ok(())
    } else {
      Err(GraphError::SingularLattice)
    }
  }

  /// Row matrix [[ax, ay, az], [bx, by, bz], [cx, cy, cz]]
  pub fn matrix(&self) -> Matrix3<f64> {
    let l = self.vectors;
    Matrix3::new(
      l[0][0], l[0][1], l[0][2], l[1][0], l[1][1], l[1][2], l[2][0], l[2][1], l[2][2],
    )
  }

  /// Cartesian = Lattice^T × Fractional
  pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
    let cart = self.matrix().transpose() * Vector3::from(frac);
    [cart.x, cart.y, cart.z]
  }

  /// Fractional = (Lattice^T)^-1 × Cartesian
  pub fn cart_to_frac(&self, cart: [f64; 3]) -> Result<[f64; 3]> {
    let inv = self.inverse_transpose()?;
    let frac = inv * Vector3::from(cart);
    Ok([frac.x, frac.y, frac.z])
  }

  /// (Lattice^T)^-1, reused when converting many positions.
  pub fn inverse_transpose(&self) -> Result<Matrix3<f64>> {
    self.check_volume()?;
    self
      .matrix()
      .transpose()
      .try_inverse()
      .ok_or(GraphError::SingularLattice)
  }

  pub fn volume(&self) -> f64 {
    self.matrix().determinant().abs()
  }

  /// Distance between opposite cell faces along each lattice direction.
  ///
  /// A sphere of radius r needs ceil(r / width) periodic images per axis.
  pub fn perpendicular_widths(&self) -> [f64; 3] {
    let m = self.matrix();
    let a: Vector3<f64> = m.row(0).transpose();
    let b: Vector3<f64> = m.row(1).transpose();
    let c: Vector3<f64> = m.row(2).transpose();
    let volume = self.volume();
    [
      volume / b.cross(&c).norm(),
      volume / c.cross(&a).norm(),
      volume / a.cross(&b).norm(),
    ]
  }
}
