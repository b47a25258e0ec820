//! Molecular graph representation.
//!
//! Derived per-atom properties (connectivity, implicit hydrogens,
//! aromaticity, total hydrogens, valence) are computed on first query and
//! memoized. Memo slots are filled through `&self`; every mutation goes
//! through `&mut self` and clears the slots of the atoms it touches.

use std::sync::OnceLock;

use molkit_core::{Annotated, ContentAddressable, MolkitError, Result, Summarizable};
use sha2::{Digest, Sha256};

use crate::element::{atomic_mass, element_by_number};
use crate::sgroup::{SGroup, SGroupSet};

/// Atomic number reported for pseudo atoms.
pub const ELEM_PSEUDO: i16 = -1;
/// Atomic number reported for R-group attachment sites.
pub const ELEM_RSITE: i16 = -2;
/// Atomic number reported for template atoms.
pub const ELEM_TEMPLATE: i16 = -3;

/// What an atom is: a real element or one of the labelled placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AtomLabel {
    Element(u8),
    /// Free-text placeholder such as "Ph" or "R".
    Pseudo(String),
    /// R-group site; bit `n` set means membership in R-group `n + 1`.
    RSite { rgroup_bits: u32 },
    /// Reference to a template (e.g. a monomer) by name.
    Template { name: String, occurrence: u32 },
}

impl AtomLabel {
    /// Atomic number, with negative sentinels for the placeholder kinds.
    pub fn atomic_number(&self) -> i16 {
        match self {
            AtomLabel::Element(n) => i16::from(*n),
            AtomLabel::Pseudo(_) => ELEM_PSEUDO,
            AtomLabel::RSite { .. } => ELEM_RSITE,
            AtomLabel::Template { .. } => ELEM_TEMPLATE,
        }
    }
}

/// Cartesian coordinates, as carried by Molfiles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3D { x, y, z }
    }
}

/// Unpaired-electron state, numbered as in Molfile `M  RAD` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Radical {
    #[default]
    None,
    Singlet,
    Doublet,
    Triplet,
}

impl Radical {
    pub fn mdl_code(self) -> u8 {
        match self {
            Radical::None => 0,
            Radical::Singlet => 1,
            Radical::Doublet => 2,
            Radical::Triplet => 3,
        }
    }

    pub fn from_mdl_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Radical::None),
            1 => Some(Radical::Singlet),
            2 => Some(Radical::Doublet),
            3 => Some(Radical::Triplet),
            _ => None,
        }
    }
}

/// An atom in a molecular graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    pub label: AtomLabel,
    pub charge: i8,
    /// Mass number; 0 means natural abundance.
    pub isotope: u16,
    pub radical: Radical,
    /// Valence fixed by the input rather than derived from bonds.
    pub explicit_valence: Option<u8>,
    /// Hydrogen count fixed by the input (e.g. `[CH2]` in SMILES).
    pub explicit_implicit_h: Option<u8>,
    pub position: Point3D,
}

impl Atom {
    pub fn new(label: AtomLabel) -> Self {
        Atom {
            label,
            charge: 0,
            isotope: 0,
            radical: Radical::None,
            explicit_valence: None,
            explicit_implicit_h: None,
            position: Point3D::default(),
        }
    }

    pub fn element(atomic_number: u8) -> Self {
        Atom::new(AtomLabel::Element(atomic_number))
    }

    pub fn atomic_number(&self) -> i16 {
        self.label.atomic_number()
    }

    /// The element number, or `None` for placeholder atoms.
    pub fn element_number(&self) -> Option<u8> {
        match self.label {
            AtomLabel::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self.label, AtomLabel::Pseudo(_))
    }

    pub fn is_rsite(&self) -> bool {
        matches!(self.label, AtomLabel::RSite { .. })
    }

    pub fn is_template(&self) -> bool {
        matches!(self.label, AtomLabel::Template { .. })
    }

    pub fn is_hydrogen(&self) -> bool {
        self.label == AtomLabel::Element(1)
    }

    /// Display symbol: element symbol, pseudo text, `R#`, or template name.
    pub fn symbol(&self) -> &str {
        match &self.label {
            AtomLabel::Element(n) => element_by_number(*n).map_or("?", |e| e.symbol),
            AtomLabel::Pseudo(text) => text,
            AtomLabel::RSite { .. } => "R#",
            AtomLabel::Template { name, .. } => name,
        }
    }
}

/// Bond order classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Numeric code shared by Molfiles and fingerprint hashing (1–4).
    pub fn code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 4,
        }
    }

    /// Inverse of [`code`](Self::code); unknown codes read as single.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => BondOrder::Double,
            3 => BondOrder::Triple,
            4 => BondOrder::Aromatic,
            _ => BondOrder::Single,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BondOrder::Single => "single",
            BondOrder::Double => "double",
            BondOrder::Triple => "triple",
            BondOrder::Aromatic => "aromatic",
        }
    }
}

/// Stereo marker on a bond: wedge/hash in Molfiles, `/` and `\` in SMILES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondStereo {
    #[default]
    None,
    Up,
    Down,
    Either,
}

impl BondStereo {
    pub fn mdl_code(self) -> u8 {
        match self {
            BondStereo::None => 0,
            BondStereo::Up => 1,
            BondStereo::Down => 6,
            BondStereo::Either => 4,
        }
    }

    pub fn from_mdl_code(code: u8) -> Self {
        match code {
            1 => BondStereo::Up,
            6 => BondStereo::Down,
            4 => BondStereo::Either,
            _ => BondStereo::None,
        }
    }
}

/// A bond between two atoms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: BondOrder,
    pub stereo: BondStereo,
}

impl Bond {
    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }
}

/// Sum of explicit bond orders, unless an aromatic bond makes it undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Known(u32),
    Aromatic,
}

#[derive(Debug, Clone, Default)]
struct AtomCache {
    connectivity: OnceLock<Connectivity>,
    implicit_h: OnceLock<u8>,
    total_h: OnceLock<u8>,
    valence: OnceLock<u8>,
}

impl AtomCache {
    fn clear(&mut self) {
        *self = AtomCache::default();
    }

    fn clear_hydrogens(&mut self) {
        self.implicit_h.take();
        self.total_h.take();
        self.valence.take();
    }
}

/// A molecular graph with atoms, bonds, adjacency and S-groups.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    pub name: String,
    /// Molfile chiral flag.
    pub chiral: bool,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// adjacency[atom_idx] = Vec<(neighbor_atom_idx, bond_idx)>
    adjacency: Vec<Vec<(usize, usize)>>,
    cache: Vec<AtomCache>,
    /// Per-atom aromatic flags, computed for all atoms at once and dropped
    /// by any bond change.
    aromaticity: OnceLock<Vec<bool>>,
    sgroups: SGroupSet,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Molecule { name: name.into(), ..Self::default() }
    }

    /// Remove all atoms, bonds and S-groups, keeping the name.
    pub fn clear(&mut self) {
        self.atoms.clear();
        self.bonds.clear();
        self.adjacency.clear();
        self.cache.clear();
        self.aromaticity.take();
        self.sgroups.clear();
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Number of graph nodes that are not hydrogen.
    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom(&self, idx: usize) -> Result<&Atom> {
        self.atoms.get(idx).ok_or_else(|| atom_not_found(idx))
    }

    pub fn bond(&self, idx: usize) -> Result<&Bond> {
        self.bonds
            .get(idx)
            .ok_or_else(|| MolkitError::NotFound(format!("bond {idx}")))
    }

    /// `(neighbor, bond)` pairs of an atom known to exist.
    pub(crate) fn edges(&self, idx: usize) -> &[(usize, usize)] {
        &self.adjacency[idx]
    }

    pub fn neighbors(&self, idx: usize) -> Result<Vec<usize>> {
        self.check_atom(idx)?;
        Ok(self.adjacency[idx].iter().map(|&(n, _)| n).collect())
    }

    /// Graph degree of an atom (number of explicit bonds).
    pub fn degree(&self, idx: usize) -> Result<usize> {
        self.check_atom(idx)?;
        Ok(self.adjacency[idx].len())
    }

    /// Index of the bond between two atoms, if any.
    pub fn find_bond(&self, a1: usize, a2: usize) -> Option<usize> {
        self.adjacency
            .get(a1)?
            .iter()
            .find(|&&(n, _)| n == a2)
            .map(|&(_, bi)| bi)
    }

    pub fn sgroups(&self) -> &SGroupSet {
        &self.sgroups
    }

    // ---- construction ----

    /// Append an element atom. Never fails.
    pub fn add_atom(&mut self, atomic_number: u8) -> usize {
        self.push_atom(Atom::element(atomic_number))
    }

    pub fn add_pseudo_atom(&mut self, text: impl Into<String>) -> usize {
        self.push_atom(Atom::new(AtomLabel::Pseudo(text.into())))
    }

    pub fn add_rsite(&mut self, rgroup_bits: u32) -> usize {
        self.push_atom(Atom::new(AtomLabel::RSite { rgroup_bits }))
    }

    pub fn add_template_atom(&mut self, name: impl Into<String>, occurrence: u32) -> usize {
        self.push_atom(Atom::new(AtomLabel::Template { name: name.into(), occurrence }))
    }

    /// Append a fully specified atom.
    pub fn push_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.cache.push(AtomCache::default());
        self.clear_aromaticity();
        self.atoms.len() - 1
    }

    /// Connect two distinct atoms. Invalidates both endpoints and the
    /// aromaticity of the whole molecule.
    pub fn add_bond(&mut self, atom1: usize, atom2: usize, order: BondOrder) -> Result<usize> {
        self.check_atom(atom1)?;
        self.check_atom(atom2)?;
        if atom1 == atom2 {
            return Err(MolkitError::InvalidInput(format!("cannot bond atom {atom1} to itself")));
        }
        if self.find_bond(atom1, atom2).is_some() {
            return Err(MolkitError::InvalidInput(format!(
                "atoms {atom1} and {atom2} are already bonded"
            )));
        }
        let bi = self.bonds.len();
        self.bonds.push(Bond { atom1, atom2, order, stereo: BondStereo::None });
        self.adjacency[atom1].push((atom2, bi));
        self.adjacency[atom2].push((atom1, bi));
        self.cache[atom1].clear();
        self.cache[atom2].clear();
        self.clear_aromaticity();
        Ok(bi)
    }

    /// Re-target the bond between `parent` and `from` so that it joins
    /// `parent` and `to`, keeping its order.
    pub fn flip_bond(&mut self, parent: usize, from: usize, to: usize) -> Result<()> {
        self.check_atom(parent)?;
        self.check_atom(from)?;
        self.check_atom(to)?;
        let bi = self.find_bond(parent, from).ok_or_else(|| {
            MolkitError::NotFound(format!("no bond between {parent} and {from}"))
        })?;
        if to == parent || self.find_bond(parent, to).is_some() {
            return Err(MolkitError::InvalidInput(format!(
                "cannot flip bond {bi} onto atom {to}"
            )));
        }

        let bond = &mut self.bonds[bi];
        if bond.atom1 == from {
            bond.atom1 = to;
        } else {
            bond.atom2 = to;
        }
        self.adjacency[from].retain(|&(_, b)| b != bi);
        for edge in &mut self.adjacency[parent] {
            if edge.1 == bi {
                edge.0 = to;
            }
        }
        self.adjacency[to].push((parent, bi));

        for idx in [parent, from, to] {
            self.cache[idx].clear();
        }
        self.clear_aromaticity();
        Ok(())
    }

    pub fn set_bond_order(&mut self, idx: usize, order: BondOrder) -> Result<()> {
        let bond = self
            .bonds
            .get_mut(idx)
            .ok_or_else(|| MolkitError::NotFound(format!("bond {idx}")))?;
        bond.order = order;
        let (a1, a2) = (bond.atom1, bond.atom2);
        self.cache[a1].clear();
        self.cache[a2].clear();
        self.clear_aromaticity();
        Ok(())
    }

    pub fn set_bond_stereo(&mut self, idx: usize, stereo: BondStereo) -> Result<()> {
        let bond = self
            .bonds
            .get_mut(idx)
            .ok_or_else(|| MolkitError::NotFound(format!("bond {idx}")))?;
        bond.stereo = stereo;
        Ok(())
    }

    // ---- atom mutation ----

    pub fn set_atom_charge(&mut self, idx: usize, charge: i8) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].charge = charge;
        self.cache[idx].clear_hydrogens();
        Ok(())
    }

    pub fn set_atom_isotope(&mut self, idx: usize, isotope: u16) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].isotope = isotope;
        Ok(())
    }

    pub fn set_atom_radical(&mut self, idx: usize, radical: Radical) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].radical = radical;
        self.cache[idx].clear_hydrogens();
        Ok(())
    }

    pub fn set_atom_position(&mut self, idx: usize, position: Point3D) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].position = position;
        Ok(())
    }

    /// Fix (or with `None`, release) the hydrogen count of an atom.
    pub fn set_explicit_implicit_h(&mut self, idx: usize, count: Option<u8>) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].explicit_implicit_h = count;
        self.cache[idx].clear_hydrogens();
        Ok(())
    }

    pub fn set_explicit_valence(&mut self, idx: usize, valence: Option<u8>) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].explicit_valence = valence;
        self.cache[idx].valence.take();
        Ok(())
    }

    /// Turn an atom into a pseudo atom carrying `text`.
    pub fn set_pseudo_atom(&mut self, idx: usize, text: impl Into<String>) -> Result<()> {
        self.relabel(idx, AtomLabel::Pseudo(text.into()))
    }

    pub fn set_rgroup_bits(&mut self, idx: usize, rgroup_bits: u32) -> Result<()> {
        self.relabel(idx, AtomLabel::RSite { rgroup_bits })
    }

    fn relabel(&mut self, idx: usize, label: AtomLabel) -> Result<()> {
        self.check_atom(idx)?;
        self.atoms[idx].label = label;
        self.cache[idx].clear();
        // neighbors' total-H depends on whether this atom is a hydrogen
        for k in 0..self.adjacency[idx].len() {
            let n = self.adjacency[idx][k].0;
            self.cache[n].total_h.take();
        }
        Ok(())
    }

    /// Text of a pseudo atom.
    pub fn pseudo_atom_text(&self, idx: usize) -> Result<&str> {
        match &self.atom(idx)?.label {
            AtomLabel::Pseudo(text) => Ok(text),
            _ => Err(MolkitError::Precondition(format!("atom {idx} is not a pseudo atom"))),
        }
    }

    /// Delete atoms, their incident bonds, and compact all indices.
    /// S-groups are re-indexed; members that were deleted are dropped.
    pub fn remove_atoms(&mut self, indices: &[usize]) -> Result<()> {
        let n = self.atoms.len();
        let mut keep = vec![true; n];
        for &idx in indices {
            self.check_atom(idx)?;
            keep[idx] = false;
        }

        let mut atom_map = vec![None; n];
        let mut next = 0;
        for (old, slot) in atom_map.iter_mut().enumerate() {
            if keep[old] {
                *slot = Some(next);
                next += 1;
            }
        }

        let mut bond_map = vec![None; self.bonds.len()];
        let mut bonds = Vec::with_capacity(self.bonds.len());
        for (old, bond) in self.bonds.iter().enumerate() {
            if let (Some(a1), Some(a2)) = (atom_map[bond.atom1], atom_map[bond.atom2]) {
                bond_map[old] = Some(bonds.len());
                bonds.push(Bond { atom1: a1, atom2: a2, ..bond.clone() });
            }
        }

        self.atoms = std::mem::take(&mut self.atoms)
            .into_iter()
            .zip(&keep)
            .filter_map(|(atom, &k)| k.then_some(atom))
            .collect();
        self.bonds = bonds;
        self.adjacency = vec![Vec::new(); self.atoms.len()];
        for (bi, bond) in self.bonds.iter().enumerate() {
            self.adjacency[bond.atom1].push((bond.atom2, bi));
            self.adjacency[bond.atom2].push((bond.atom1, bi));
        }
        self.cache = vec![AtomCache::default(); self.atoms.len()];
        self.clear_aromaticity();
        self.sgroups.remap_atoms(&atom_map);
        self.sgroups.remap_bonds(&bond_map);
        log::debug!(
            "removed {} atoms from '{}', {} remain",
            n - self.atoms.len(),
            self.name,
            self.atoms.len()
        );
        Ok(())
    }

    // ---- S-groups ----

    /// Attach an S-group after checking that its indices exist.
    pub fn add_sgroup(&mut self, group: SGroup) -> Result<usize> {
        for atom in group.referenced_atoms() {
            self.check_atom(atom)?;
        }
        for &bond in &group.bonds {
            self.bond(bond)?;
        }
        Ok(self.sgroups.push(group))
    }

    pub fn remove_sgroup(&mut self, idx: usize) -> Result<SGroup> {
        self.sgroups.remove(idx)
    }

    pub fn clear_sgroups(&mut self) {
        self.sgroups.clear();
    }

    // ---- derived properties ----

    /// Sum of explicit bond orders, or [`Connectivity::Aromatic`] as soon
    /// as any incident bond is aromatic.
    pub fn atom_connectivity(&self, idx: usize) -> Result<Connectivity> {
        let slot = &self.slot(idx)?.connectivity;
        Ok(*slot.get_or_init(|| {
            let mut sum = 0u32;
            for &(_, bi) in &self.adjacency[idx] {
                match self.bonds[bi].order {
                    BondOrder::Aromatic => return Connectivity::Aromatic,
                    order => sum += u32::from(order.code()),
                }
            }
            Connectivity::Known(sum)
        }))
    }

    /// Whether any bond at the atom is aromatic.
    pub fn atom_aromaticity(&self, idx: usize) -> Result<bool> {
        self.check_atom(idx)?;
        let flags = self.aromaticity.get_or_init(|| {
            let mut flags = vec![false; self.atoms.len()];
            for bond in self.bonds.iter().filter(|b| b.order == BondOrder::Aromatic) {
                flags[bond.atom1] = true;
                flags[bond.atom2] = true;
            }
            flags
        });
        Ok(flags.get(idx).copied().unwrap_or(false))
    }

    /// Hydrogens implied by the default valence of H, C, N and O.
    ///
    /// Charged atoms and other elements get none unless the count was fixed
    /// explicitly. Placeholder atoms are a precondition violation.
    pub fn implicit_h(&self, idx: usize) -> Result<u8> {
        let slot = &self.slot(idx)?.implicit_h;
        if let Some(&h) = slot.get() {
            return Ok(h);
        }
        let h = self.compute_implicit_h(idx)?;
        Ok(*slot.get_or_init(|| h))
    }

    fn compute_implicit_h(&self, idx: usize) -> Result<u8> {
        let atom = &self.atoms[idx];
        let number = match &atom.label {
            AtomLabel::Element(n) => *n,
            AtomLabel::Pseudo(_) => return Err(placeholder_error("pseudo", idx)),
            AtomLabel::RSite { .. } => return Err(placeholder_error("R-site", idx)),
            AtomLabel::Template { .. } => return Err(placeholder_error("template", idx)),
        };
        if let Some(h) = atom.explicit_implicit_h {
            return Ok(h);
        }
        if atom.charge != 0 {
            return Ok(0);
        }
        let Some(target) = default_valence(number) else {
            return Ok(0);
        };
        Ok(match self.atom_connectivity(idx)? {
            Connectivity::Known(conn) => target.saturating_sub(conn) as u8,
            // aromatic carbon in a ring position takes one H; aromatic
            // heteroatoms need theirs written explicitly
            Connectivity::Aromatic => {
                if number == 6 && self.adjacency[idx].len() == 2 {
                    1
                } else {
                    0
                }
            }
        })
    }

    /// Implicit hydrogens plus explicit hydrogen neighbors. Placeholder
    /// atoms count only the explicit ones.
    pub fn total_h(&self, idx: usize) -> Result<u8> {
        let slot = &self.slot(idx)?.total_h;
        if let Some(&h) = slot.get() {
            return Ok(h);
        }
        let implicit = match self.atoms[idx].label {
            AtomLabel::Element(_) => self.implicit_h(idx)?,
            _ => 0,
        };
        let explicit = self.adjacency[idx]
            .iter()
            .filter(|&&(n, _)| self.atoms[n].is_hydrogen())
            .count() as u8;
        Ok(*slot.get_or_init(|| implicit.saturating_add(explicit)))
    }

    /// Bond-order sum including implicit hydrogens. Aromatic atoms count
    /// each sigma bond once plus one for the pi system.
    pub fn valence(&self, idx: usize) -> Result<u8> {
        let slot = &self.slot(idx)?.valence;
        if let Some(&v) = slot.get() {
            return Ok(v);
        }
        let atom = &self.atoms[idx];
        let v = if let Some(v) = atom.explicit_valence {
            v
        } else {
            let implicit = match atom.label {
                AtomLabel::Element(_) => u32::from(self.implicit_h(idx)?),
                _ => 0,
            };
            let bonds = match self.atom_connectivity(idx)? {
                Connectivity::Known(conn) => conn,
                Connectivity::Aromatic => self.adjacency[idx].len() as u32 + 1,
            };
            (bonds + implicit).min(u32::from(u8::MAX)) as u8
        };
        Ok(*slot.get_or_init(|| v))
    }

    /// Memoized implicit-H count, or `None` when it has not been computed
    /// since the last invalidation.
    pub fn cached_implicit_h(&self, idx: usize) -> Option<u8> {
        self.cache.get(idx)?.implicit_h.get().copied()
    }

    /// Memoized aromaticity flag, if computed.
    pub fn cached_aromaticity(&self, idx: usize) -> Option<bool> {
        self.aromaticity.get()?.get(idx).copied()
    }

    /// Average molecular weight, counting implicit hydrogens. Placeholder
    /// atoms weigh nothing.
    pub fn molecular_weight(&self) -> Result<f64> {
        let h_mass = atomic_mass(1, 0);
        let mut total = 0.0;
        for (i, atom) in self.atoms.iter().enumerate() {
            if let Some(n) = atom.element_number() {
                total += atomic_mass(n, atom.isotope);
                total += f64::from(self.implicit_h(i)?) * h_mass;
            }
        }
        Ok(total)
    }

    /// Human-readable atom label, e.g. `13C`, `N+`, `O-2`.
    pub fn atom_description(&self, idx: usize) -> Result<String> {
        let atom = self.atom(idx)?;
        let mut out = String::new();
        if atom.isotope != 0 {
            out.push_str(&atom.isotope.to_string());
        }
        out.push_str(atom.symbol());
        match atom.charge {
            0 => {}
            1 => out.push('+'),
            -1 => out.push('-'),
            c if c > 1 => out.push_str(&format!("+{c}")),
            c => out.push_str(&format!("-{}", -i16::from(c))),
        }
        Ok(out)
    }

    pub fn bond_description(&self, idx: usize) -> Result<&'static str> {
        Ok(self.bond(idx)?.order.description())
    }

    // ---- internals ----

    fn check_atom(&self, idx: usize) -> Result<()> {
        if idx < self.atoms.len() {
            Ok(())
        } else {
            Err(atom_not_found(idx))
        }
    }

    fn slot(&self, idx: usize) -> Result<&AtomCache> {
        self.cache.get(idx).ok_or_else(|| atom_not_found(idx))
    }

    fn clear_aromaticity(&mut self) {
        self.aromaticity.take();
    }
}

fn atom_not_found(idx: usize) -> MolkitError {
    MolkitError::NotFound(format!("atom {idx}"))
}

fn placeholder_error(kind: &str, idx: usize) -> MolkitError {
    MolkitError::Precondition(format!("implicit hydrogens are undefined for {kind} atom {idx}"))
}

/// Valence used for implicit-hydrogen inference.
fn default_valence(atomic_number: u8) -> Option<u32> {
    match atomic_number {
        1 => Some(1),
        6 => Some(4),
        7 => Some(3),
        8 => Some(2),
        _ => None,
    }
}

impl Annotated for Molecule {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Summarizable for Molecule {
    fn summary(&self) -> String {
        format!(
            "{}: {} atoms, {} bonds",
            if self.name.is_empty() { "Molecule" } else { &self.name },
            self.atom_count(),
            self.bond_count()
        )
    }
}

impl ContentAddressable for Molecule {
    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for atom in &self.atoms {
            hasher.update(atom.atomic_number().to_le_bytes());
            hasher.update(atom.symbol().as_bytes());
            hasher.update(atom.charge.to_le_bytes());
            hasher.update(atom.isotope.to_le_bytes());
            hasher.update([atom.radical.mdl_code()]);
        }
        // Sort bonds by (min_atom, max_atom, order)
        let mut sorted_bonds: Vec<_> = self
            .bonds
            .iter()
            .map(|b| (b.atom1.min(b.atom2), b.atom1.max(b.atom2), b.order.code()))
            .collect();
        sorted_bonds.sort_unstable();
        for (a, b, order) in sorted_bonds {
            hasher.update((a as u64).to_le_bytes());
            hasher.update((b as u64).to_le_bytes());
            hasher.update([order]);
        }
        hex::encode(hasher.finalize())
    }
}
