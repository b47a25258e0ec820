//! SVG depiction on a circular layout.
//!
//! Atoms are spaced evenly on a circle in index order; bonds are straight
//! lines whose width encodes bond order. This is a quick structural sketch,
//! not a 2D coordinate generator.

use crate::molecule::{BondOrder, Molecule};

/// Space kept between the layout circle and the canvas edge.
const MARGIN: f64 = 20.0;
/// Smallest layout radius on tiny canvases.
const MIN_RADIUS: f64 = 10.0;
const ATOM_RADIUS: f64 = 6.0;
const BOND_COLOR: &str = "#444";
const AROMATIC_BOND_COLOR: &str = "#AA7733";

/// Canvas positions of every atom, evenly spaced clockwise from 3 o'clock.
pub fn circular_layout(mol: &Molecule, width: u32, height: u32) -> Vec<(f64, f64)> {
    let n = mol.atom_count();
    let cx = f64::from(width / 2);
    let cy = f64::from(height / 2);
    let radius = (f64::from(width.min(height)) / 2.0 - MARGIN).max(MIN_RADIUS);
    (0..n)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Fill color for an atom, by atomic number.
pub fn element_color(atomic_number: i16) -> &'static str {
    match atomic_number {
        1 => "#BBBBBB",
        6 => "#222222",
        7 => "#3366CC",
        8 => "#CC3333",
        16 => "#CCCC33",
        9 | 17 | 35 | 53 => "#33AA66",
        _ => "#888888",
    }
}

/// Render a molecule as an SVG document.
///
/// # Example
///
/// ```
/// use molkit_chem::{parse_smiles, render_svg};
///
/// let mol = parse_smiles("c1ccccc1").unwrap();
/// let svg = render_svg(&mol, 300, 300);
/// assert_eq!(svg.matches("<circle").count(), 6);
/// ```
pub fn render_svg(mol: &Molecule, width: u32, height: u32) -> String {
    let coords = circular_layout(mol, width, height);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    ));

    for bond in mol.bonds() {
        let (x1, y1) = coords[bond.atom1];
        let (x2, y2) = coords[bond.atom2];
        let (stroke, stroke_width) = match bond.order {
            BondOrder::Single => (BOND_COLOR, 2),
            BondOrder::Double => (BOND_COLOR, 4),
            BondOrder::Triple => (BOND_COLOR, 6),
            BondOrder::Aromatic => (AROMATIC_BOND_COLOR, 2),
        };
        out.push_str(&format!(
            "<line x1=\"{x1:.1}\" y1=\"{y1:.1}\" x2=\"{x2:.1}\" y2=\"{y2:.1}\" stroke=\"{stroke}\" stroke-width=\"{stroke_width}\" stroke-linecap=\"round\"/>\n"
        ));
    }

    for (atom, &(x, y)) in mol.atoms().iter().zip(&coords) {
        out.push_str(&format!(
            "<circle cx=\"{x:.1}\" cy=\"{y:.1}\" r=\"{ATOM_RADIUS:.1}\" fill=\"{}\" stroke=\"#222\" stroke-width=\"1\"/>\n",
            element_color(atom.atomic_number())
        ));
    }

    out.push_str("</svg>\n");
    out
}

/// Write an SVG depiction to disk, replacing any existing file.
#[cfg(feature = "std")]
pub fn save_svg(
    mol: &Molecule,
    path: impl AsRef<std::path::Path>,
    width: u32,
    height: u32,
) -> molkit_core::Result<()> {
    let path = path.as_ref();
    std::fs::write(path, render_svg(mol, width, height))
        .map_err(|e| crate::molfile::path_error(e, path))
}
