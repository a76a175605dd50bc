// src/model/elements.rs

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Chemical element, discriminant = atomic number (Z).
#[rustfmt::skip]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[repr(u8)]
pub enum Element {
    // --- Period 1 ---
    H = 1, He,
    // --- Period 2 ---
    Li, Be, B, C, N, O, F, Ne,
    // --- Period 3 ---
    Na, Mg, Al, Si, P, S, Cl, Ar,
    // --- Period 4 ---
    K, Ca, Sc, Ti, V, Cr, Mn, Fe, Co, Ni, Cu, Zn, Ga, Ge, As, Se, Br, Kr,
    // --- Period 5 ---
    Rb, Sr, Y, Zr, Nb, Mo, Tc, Ru, Rh, Pd, Ag, Cd, In, Sn, Sb, Te, I, Xe,
    // --- Period 6 ---
    Cs, Ba, La, Ce, Pr, Nd, Pm, Sm, Eu, Gd, Tb, Dy, Ho, Er, Tm, Yb, Lu,
    Hf, Ta, W, Re, Os, Ir, Pt, Au, Hg, Tl, Pb, Bi, Po, At, Rn,
    // --- Period 7 ---
    Fr, Ra, Ac, Th, Pa, U, Np, Pu, Am, Cm, Bk, Cf, Es, Fm, Md, No, Lr,
    Rf, Db, Sg, Bh, Hs, Mt, Ds, Rg, Cn, Nh, Fl, Mc, Lv, Ts, Og,
}

impl Element {
    /// Atomic number Z (1..=118).
    pub fn atomic_number(self) -> u8 {
        self as u8
    }

    pub fn from_atomic_number(z: u8) -> Option<Element> {
        if z == 0 {
            return None;
        }
        Element::iter().nth(usize::from(z) - 1)
    }

    /// Exact symbol lookup ("Fe", not "FE" or "Fe1").
    pub fn from_symbol(symbol: &str) -> Result<Element> {
        Element::from_str(symbol).map_err(|_| GraphError::UnknownElement(symbol.to_string()))
    }

    /// Lenient lookup for file labels: "Fe1", "FE", "Fe2+", "o" all resolve.
    ///
    /// Only the leading alphabetic run is considered. A two-letter match is
    /// preferred over a one-letter one.
    pub fn from_label(label: &str) -> Result<Element> {
        let letters: Vec<char> = label
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();

        let normalized = |n: usize| -> String {
            letters
                .iter()
                .take(n)
                .enumerate()
                .map(|(i, c)| if i == 0 { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                .collect()
        };

        if letters.len() >= 2 {
            if let Ok(el) = Element::from_str(&normalized(2)) {
                return Ok(el);
            }
        }
        if !letters.is_empty() {
            if let Ok(el) = Element::from_str(&normalized(1)) {
                return Ok(el);
            }
        }
        Err(GraphError::UnknownElement(label.to_string()))
    }

    pub fn symbol(&self) -> &str {
        self.as_ref()
    }
}
