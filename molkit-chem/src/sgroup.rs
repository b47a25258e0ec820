//! S-groups: structural annotations layered over atom and bond index sets.
//!
//! Every group carries the atoms and bonds it spans plus the payload of its
//! kind. The kinds are a closed set, so consumers match exhaustively.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use molkit_core::{MolkitError, Result};

/// The three-letter S-group type codes used by Molfile `M  STY` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SGroupType {
    Generic,
    Data,
    Superatom,
    Sru,
    Multiple,
    Monomer,
    Mer,
    Copolymer,
    Crosslink,
    Modified,
    Graft,
    Component,
    Mixture,
    Formulation,
    Any,
}

impl SGroupType {
    pub const ALL: [SGroupType; 15] = [
        SGroupType::Generic,
        SGroupType::Data,
        SGroupType::Superatom,
        SGroupType::Sru,
        SGroupType::Multiple,
        SGroupType::Monomer,
        SGroupType::Mer,
        SGroupType::Copolymer,
        SGroupType::Crosslink,
        SGroupType::Modified,
        SGroupType::Graft,
        SGroupType::Component,
        SGroupType::Mixture,
        SGroupType::Formulation,
        SGroupType::Any,
    ];

    pub fn code(self) -> &'static str {
        match self {
            SGroupType::Generic => "GEN",
            SGroupType::Data => "DAT",
            SGroupType::Superatom => "SUP",
            SGroupType::Sru => "SRU",
            SGroupType::Multiple => "MUL",
            SGroupType::Monomer => "MON",
            SGroupType::Mer => "MER",
            SGroupType::Copolymer => "COP",
            SGroupType::Crosslink => "CRO",
            SGroupType::Modified => "MOD",
            SGroupType::Graft => "GRA",
            SGroupType::Component => "COM",
            SGroupType::Mixture => "MIX",
            SGroupType::Formulation => "FOR",
            SGroupType::Any => "ANY",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }
}

impl fmt::Display for SGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SGroupType {
    type Err = MolkitError;

    fn from_str(s: &str) -> Result<Self> {
        SGroupType::from_code(s.trim())
            .ok_or_else(|| MolkitError::Parse(format!("unknown S-group type '{s}'")))
    }
}

/// Polymer subtype (`M  SST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SGroupSubtype {
    #[default]
    None,
    Alternating,
    Random,
    Block,
}

impl SGroupSubtype {
    pub fn code(self) -> Option<&'static str> {
        match self {
            SGroupSubtype::None => None,
            SGroupSubtype::Alternating => Some("ALT"),
            SGroupSubtype::Random => Some("RAN"),
            SGroupSubtype::Block => Some("BLO"),
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ALT" => Some(SGroupSubtype::Alternating),
            "RAN" => Some(SGroupSubtype::Random),
            "BLO" => Some(SGroupSubtype::Block),
            _ => None,
        }
    }
}

/// How repeating units of an SRU connect (`M  SCN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SruConnectivity {
    HeadToHead,
    HeadToTail,
    EitherUnknown,
}

impl SruConnectivity {
    pub fn code(self) -> &'static str {
        match self {
            SruConnectivity::HeadToHead => "HH",
            SruConnectivity::HeadToTail => "HT",
            SruConnectivity::EitherUnknown => "EU",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "HH" => Some(SruConnectivity::HeadToHead),
            "HT" => Some(SruConnectivity::HeadToTail),
            "EU" => Some(SruConnectivity::EitherUnknown),
            _ => None,
        }
    }
}

/// Whether a renderer should show the group expanded or as its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayOption {
    #[default]
    Undefined,
    Expanded,
    Contracted,
}

/// Payload of a data S-group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataField {
    pub name: String,
    /// `F`ormatted, `N`umeric or `T`ext; empty when unspecified.
    pub field_type: String,
    pub units: String,
    pub value: String,
}

/// A superatom bond crossing point (`M  SAP`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttachmentPoint {
    /// Atom inside the group.
    pub atom: usize,
    /// Atom outside the group that is replaced on contraction, if any.
    pub leaving_atom: Option<usize>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Superatom {
    pub label: String,
    pub attachment_points: Vec<AttachmentPoint>,
}

/// Structural repeating unit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sru {
    pub subscript: String,
    pub connectivity: Option<SruConnectivity>,
}

impl Default for Sru {
    fn default() -> Self {
        Sru { subscript: "n".into(), connectivity: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Multiple {
    pub multiplier: u32,
    pub parent_atoms: Vec<usize>,
}

/// Kind-specific content of an S-group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SGroupKind {
    Generic,
    Data(DataField),
    Superatom(Superatom),
    Sru(Sru),
    Multiple(Multiple),
    Monomer,
    Mer,
    Copolymer,
    Crosslink,
    Modified,
    Graft,
    Component,
    Mixture,
    Formulation,
    Any,
}

impl SGroupKind {
    pub fn sgroup_type(&self) -> SGroupType {
        match self {
            SGroupKind::Generic => SGroupType::Generic,
            SGroupKind::Data(_) => SGroupType::Data,
            SGroupKind::Superatom(_) => SGroupType::Superatom,
            SGroupKind::Sru(_) => SGroupType::Sru,
            SGroupKind::Multiple(_) => SGroupType::Multiple,
            SGroupKind::Monomer => SGroupType::Monomer,
            SGroupKind::Mer => SGroupType::Mer,
            SGroupKind::Copolymer => SGroupType::Copolymer,
            SGroupKind::Crosslink => SGroupType::Crosslink,
            SGroupKind::Modified => SGroupType::Modified,
            SGroupKind::Graft => SGroupType::Graft,
            SGroupKind::Component => SGroupType::Component,
            SGroupKind::Mixture => SGroupType::Mixture,
            SGroupKind::Formulation => SGroupType::Formulation,
            SGroupKind::Any => SGroupType::Any,
        }
    }

    /// Empty payload for a type code.
    pub fn empty(sgroup_type: SGroupType) -> Self {
        match sgroup_type {
            SGroupType::Generic => SGroupKind::Generic,
            SGroupType::Data => SGroupKind::Data(DataField::default()),
            SGroupType::Superatom => SGroupKind::Superatom(Superatom::default()),
            SGroupType::Sru => SGroupKind::Sru(Sru::default()),
            SGroupType::Multiple => SGroupKind::Multiple(Multiple { multiplier: 1, parent_atoms: Vec::new() }),
            SGroupType::Monomer => SGroupKind::Monomer,
            SGroupType::Mer => SGroupKind::Mer,
            SGroupType::Copolymer => SGroupKind::Copolymer,
            SGroupType::Crosslink => SGroupKind::Crosslink,
            SGroupType::Modified => SGroupKind::Modified,
            SGroupType::Graft => SGroupKind::Graft,
            SGroupType::Component => SGroupKind::Component,
            SGroupType::Mixture => SGroupKind::Mixture,
            SGroupType::Formulation => SGroupKind::Formulation,
            SGroupType::Any => SGroupKind::Any,
        }
    }
}

/// A single S-group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SGroup {
    pub kind: SGroupKind,
    pub subtype: SGroupSubtype,
    /// Identifier the group had in the file it was read from.
    pub original_id: Option<u32>,
    pub parent_id: Option<u32>,
    pub atoms: Vec<usize>,
    pub bonds: Vec<usize>,
    pub display: DisplayOption,
}

impl SGroup {
    pub fn new(kind: SGroupKind) -> Self {
        SGroup {
            kind,
            subtype: SGroupSubtype::None,
            original_id: None,
            parent_id: None,
            atoms: Vec::new(),
            bonds: Vec::new(),
            display: DisplayOption::Undefined,
        }
    }

    /// A superatom abbreviation such as "Ph" spanning `atoms`.
    pub fn superatom(label: impl Into<String>, atoms: &[usize]) -> Self {
        let mut sg = SGroup::new(SGroupKind::Superatom(Superatom {
            label: label.into(),
            attachment_points: Vec::new(),
        }));
        sg.atoms = atoms.to_vec();
        sg
    }

    pub fn data(name: impl Into<String>, value: impl Into<String>) -> Self {
        SGroup::new(SGroupKind::Data(DataField {
            name: name.into(),
            value: value.into(),
            ..DataField::default()
        }))
    }

    pub fn sru(subscript: impl Into<String>) -> Self {
        SGroup::new(SGroupKind::Sru(Sru {
            subscript: subscript.into(),
            connectivity: None,
        }))
    }

    pub fn multiple(multiplier: u32) -> Self {
        SGroup::new(SGroupKind::Multiple(Multiple {
            multiplier,
            parent_atoms: Vec::new(),
        }))
    }

    pub fn with_atoms(mut self, atoms: &[usize]) -> Self {
        self.atoms = atoms.to_vec();
        self
    }

    pub fn with_bonds(mut self, bonds: &[usize]) -> Self {
        self.bonds = bonds.to_vec();
        self
    }

    pub fn sgroup_type(&self) -> SGroupType {
        self.kind.sgroup_type()
    }

    pub fn has_atom(&self, atom: usize) -> bool {
        self.atoms.contains(&atom)
    }

    /// Every atom index the group refers to, including payload references.
    pub(crate) fn referenced_atoms(&self) -> impl Iterator<Item = usize> + '_ {
        let payload: Vec<usize> = match &self.kind {
            SGroupKind::Superatom(sa) => sa
                .attachment_points
                .iter()
                .flat_map(|ap| std::iter::once(ap.atom).chain(ap.leaving_atom))
                .collect(),
            SGroupKind::Multiple(m) => m.parent_atoms.clone(),
            _ => Vec::new(),
        };
        self.atoms.iter().copied().chain(payload)
    }

    /// Apply an old→new atom index map; `None` entries are deleted atoms.
    fn remap_atoms(&mut self, mapping: &[Option<usize>]) {
        let map = |idx: usize| mapping.get(idx).copied().flatten();
        self.atoms = self.atoms.iter().filter_map(|&a| map(a)).collect();
        match &mut self.kind {
            SGroupKind::Superatom(sa) => {
                sa.attachment_points.retain_mut(|ap| match map(ap.atom) {
                    Some(atom) => {
                        ap.atom = atom;
                        ap.leaving_atom = ap.leaving_atom.and_then(map);
                        true
                    }
                    None => false,
                });
            }
            SGroupKind::Multiple(m) => {
                m.parent_atoms = m.parent_atoms.iter().filter_map(|&a| map(a)).collect();
            }
            _ => {}
        }
    }

    fn remap_bonds(&mut self, mapping: &[Option<usize>]) {
        self.bonds = self
            .bonds
            .iter()
            .filter_map(|&b| mapping.get(b).copied().flatten())
            .collect();
    }
}

impl fmt::Display for SGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SGroupKind::Data(d) => write!(f, "Data S-Group '{}': {}", d.name, d.value),
            SGroupKind::Superatom(sa) => {
                write!(f, "Superatom '{}': {} atoms", sa.label, self.atoms.len())
            }
            _ => write!(
                f,
                "{} S-Group: {} atoms, {} bonds",
                self.sgroup_type(),
                self.atoms.len(),
                self.bonds.len()
            ),
        }
    }
}

/// The S-groups owned by a molecule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SGroupSet {
    groups: Vec<SGroup>,
}

impl SGroupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, group: SGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn get(&self, idx: usize) -> Result<&SGroup> {
        self.groups
            .get(idx)
            .ok_or_else(|| MolkitError::NotFound(format!("S-group {idx}")))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SGroup> {
        self.groups.iter()
    }

    pub(crate) fn remove(&mut self, idx: usize) -> Result<SGroup> {
        if idx >= self.groups.len() {
            return Err(MolkitError::NotFound(format!("S-group {idx}")));
        }
        Ok(self.groups.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }

    /// Indices of all groups of the given type.
    pub fn find_by_type(&self, sgroup_type: SGroupType) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.sgroup_type() == sgroup_type)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn superatoms(&self) -> impl Iterator<Item = (&SGroup, &Superatom)> {
        self.groups.iter().filter_map(|g| match &g.kind {
            SGroupKind::Superatom(sa) => Some((g, sa)),
            _ => None,
        })
    }

    pub fn data_groups(&self) -> impl Iterator<Item = (&SGroup, &DataField)> {
        self.groups.iter().filter_map(|g| match &g.kind {
            SGroupKind::Data(d) => Some((g, d)),
            _ => None,
        })
    }

    pub fn sru_groups(&self) -> impl Iterator<Item = (&SGroup, &Sru)> {
        self.groups.iter().filter_map(|g| match &g.kind {
            SGroupKind::Sru(s) => Some((g, s)),
            _ => None,
        })
    }

    /// Union of the atom sets of every group.
    pub fn atoms_in_sgroups(&self) -> BTreeSet<usize> {
        self.groups.iter().flat_map(|g| g.atoms.iter().copied()).collect()
    }

    /// Remap atom indices and drop groups that lost every atom they had.
    /// Groups that started with no atoms (molecule-level data) are kept.
    pub(crate) fn remap_atoms(&mut self, mapping: &[Option<usize>]) {
        self.groups.retain_mut(|g| {
            let had_atoms = !g.atoms.is_empty();
            g.remap_atoms(mapping);
            if had_atoms && g.atoms.is_empty() {
                log::debug!("dropping emptied {} S-group", g.sgroup_type());
                return false;
            }
            true
        });
    }

    pub(crate) fn remap_bonds(&mut self, mapping: &[Option<usize>]) {
        for g in &mut self.groups {
            g.remap_bonds(mapping);
        }
    }
}

impl<'a> IntoIterator for &'a SGroupSet {
    type Item = &'a SGroup;
    type IntoIter = std::slice::Iter<'a, SGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for t in SGroupType::ALL {
            assert_eq!(SGroupType::from_code(t.code()), Some(t));
            assert_eq!(t.to_string().parse::<SGroupType>().unwrap(), t);
        }
        assert!("XYZ".parse::<SGroupType>().is_err());
    }

    #[test]
    fn empty_kind_matches_type() {
        for t in SGroupType::ALL {
            assert_eq!(SGroupKind::empty(t).sgroup_type(), t);
        }
        match SGroupKind::empty(SGroupType::Sru) {
            SGroupKind::Sru(sru) => assert_eq!(sru.subscript, "n"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn subtype_and_connectivity_codes() {
        assert_eq!(SGroupSubtype::from_code("ALT"), Some(SGroupSubtype::Alternating));
        assert_eq!(SGroupSubtype::Block.code(), Some("BLO"));
        assert_eq!(SGroupSubtype::None.code(), None);
        assert_eq!(SruConnectivity::from_code("HT"), Some(SruConnectivity::HeadToTail));
        assert_eq!(SruConnectivity::EitherUnknown.code(), "EU");
    }

    #[test]
    fn find_and_typed_access() {
        let mut set = SGroupSet::new();
        set.push(SGroup::superatom("Ph", &[0, 1, 2]));
        set.push(SGroup::data("MW", "78.11"));
        set.push(SGroup::sru("n").with_atoms(&[3]));
        set.push(SGroup::superatom("Me", &[4]));

        assert_eq!(set.find_by_type(SGroupType::Superatom), vec![0, 3]);
        assert_eq!(set.superatoms().count(), 2);
        assert_eq!(set.data_groups().next().unwrap().1.value, "78.11");
        assert_eq!(set.sru_groups().count(), 1);
        let atoms: Vec<_> = set.atoms_in_sgroups().into_iter().collect();
        assert_eq!(atoms, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn remove_and_bounds() {
        let mut set = SGroupSet::new();
        set.push(SGroup::new(SGroupKind::Generic));
        assert!(set.get(1).is_err());
        assert!(set.remove(3).is_err());
        assert!(set.remove(0).is_ok());
        assert!(set.is_empty());
    }

    #[test]
    fn remap_drops_deleted_atoms() {
        let mut sg = SGroup::superatom("Et", &[0, 1, 2]);
        if let SGroupKind::Superatom(sa) = &mut sg.kind {
            sa.attachment_points.push(AttachmentPoint { atom: 1, leaving_atom: Some(2), id: "1".into() });
            sa.attachment_points.push(AttachmentPoint { atom: 0, leaving_atom: None, id: "2".into() });
        }
        sg.bonds = vec![0, 1];
        let mut set = SGroupSet::new();
        set.push(sg);

        // delete atom 0, shift 1→0, 2→1
        set.remap_atoms(&[None, Some(0), Some(1)]);
        set.remap_bonds(&[None, Some(0)]);

        let g = set.get(0).unwrap();
        assert_eq!(g.atoms, vec![0, 1]);
        assert_eq!(g.bonds, vec![0]);
        match &g.kind {
            SGroupKind::Superatom(sa) => {
                assert_eq!(sa.attachment_points.len(), 1);
                assert_eq!(sa.attachment_points[0].atom, 0);
                assert_eq!(sa.attachment_points[0].leaving_atom, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remap_drops_groups_left_without_atoms() {
        let mut set = SGroupSet::new();
        set.push(SGroup::superatom("Me", &[0]));
        set.push(SGroup::sru("n").with_atoms(&[0, 1]));
        set.push(SGroup::data("MW", "46.07"));

        set.remap_atoms(&[None, Some(0)]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().sgroup_type(), SGroupType::Sru);
        assert_eq!(set.get(0).unwrap().atoms, vec![0]);
        assert_eq!(set.data_groups().next().unwrap().1.value, "46.07");

        set.remap_atoms(&[None]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().sgroup_type(), SGroupType::Data);
    }

    #[test]
    fn display_formats() {
        assert_eq!(SGroup::data("pKa", "4.2").to_string(), "Data S-Group 'pKa': 4.2");
        assert_eq!(SGroup::superatom("Ph", &[0, 1]).to_string(), "Superatom 'Ph': 2 atoms");
        assert_eq!(
            SGroup::sru("n").with_atoms(&[1]).to_string(),
            "SRU S-Group: 1 atoms, 0 bonds"
        );
    }
}
