//! SMILES generation.
//!
//! Writes a spanning-tree SMILES by depth-first traversal from the lowest
//! unvisited atom index. The output is not canonical: it depends on atom
//! order and adjacency order, but re-parses to the same graph.
//!
//! # Example
//!
//! ```
//! use molkit_chem::{parse_smiles, write_smiles};
//!
//! let mol = parse_smiles("c1ccccc1").unwrap();
//! assert_eq!(write_smiles(&mol).unwrap(), "c1ccccc1");
//! ```

use molkit_core::{MolkitError, Result};

use crate::element::{aromatic_symbol, element_by_symbol};
use crate::molecule::{Atom, AtomLabel, BondOrder, BondStereo, Molecule};

/// Highest ring-closure number SMILES can spell (`%99`).
const MAX_RING_NUMBER: usize = 99;

/// Serialize a molecule to SMILES.
///
/// Atoms are bracketed unless they are aromatic organic-subset atoms with
/// no isotope, no charge and their default hydrogen count. Bracketed atoms
/// carry their hydrogen count, so the output re-parses to the same
/// hydrogens. Disconnected components are joined with `.`. Placeholder
/// atoms whose label is not a plain symbol are written as `*`.
///
/// Ring numbers are reused once their ring closes; more than 99 rings open
/// at the same point is an [`MolkitError::InvalidInput`].
pub fn write_smiles(mol: &Molecule) -> Result<String> {
    let n = mol.atom_count();
    if n == 0 {
        return Ok(String::new());
    }

    let lowercase: Vec<bool> = (0..n).map(|i| writes_lowercase(mol, i)).collect();
    let tree = spanning_tree(mol);

    let mut writer = DfsWriter {
        mol,
        lowercase: &lowercase,
        tree: &tree,
        rings: RingNumbers::new(mol.bond_count()),
        output: String::new(),
    };
    for (i, &root) in tree.roots.iter().enumerate() {
        if i > 0 {
            writer.output.push('.'); // fragment separator
        }
        writer.write_component(root)?;
    }
    Ok(writer.output)
}

/// DFS forest shared by the writer: which bonds are tree edges, and the ring
/// bonds to write at each atom.
struct SpanningTree {
    /// Lowest atom index of each connected component, in order.
    roots: Vec<usize>,
    tree_bonds: Vec<bool>,
    /// Per atom: (bond, is_opening). The opening end is the atom written
    /// first.
    ring_bonds: Vec<Vec<(usize, bool)>>,
}

/// One atom on the classification stack.
struct Frame {
    atom: usize,
    from_bond: Option<usize>,
    /// Next adjacency position to examine.
    next: usize,
}

/// One written atom on the writer's stack.
struct Branch {
    /// Tree edges (child, bond) still to write, from `next` on.
    children: Vec<(usize, usize)>,
    next: usize,
    /// Entered through `(`; write `)` when leaving.
    in_branch: bool,
}

/// Classify every bond as a tree edge or a ring closure, visiting atoms in
/// the same order the writer does.
fn spanning_tree(mol: &Molecule) -> SpanningTree {
    let n = mol.atom_count();
    let mut visited = vec![false; n];
    let mut used_bonds = vec![false; mol.bond_count()];
    let mut tree = SpanningTree {
        roots: Vec::new(),
        tree_bonds: vec![false; mol.bond_count()],
        ring_bonds: vec![Vec::new(); n],
    };

    let mut stack = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        tree.roots.push(start);
        visited[start] = true;
        stack.push(Frame { atom: start, from_bond: None, next: 0 });

        while let Some(frame) = stack.last_mut() {
            let atom = frame.atom;
            let edges = mol.edges(atom);
            let Some(&(next, bi)) = edges.get(frame.next) else {
                stack.pop();
                continue;
            };
            frame.next += 1;
            if Some(bi) == frame.from_bond || used_bonds[bi] {
                continue;
            }
            used_bonds[bi] = true;
            if visited[next] {
                tree.ring_bonds[next].push((bi, true));
                tree.ring_bonds[atom].push((bi, false));
            } else {
                tree.tree_bonds[bi] = true;
                visited[next] = true;
                stack.push(Frame { atom: next, from_bond: Some(bi), next: 0 });
            }
        }
    }
    tree
}

/// Ring-closure numbers in use, handed out lowest first.
struct RingNumbers {
    in_use: [bool; MAX_RING_NUMBER + 1],
    by_bond: Vec<Option<usize>>,
}

impl RingNumbers {
    fn new(n_bonds: usize) -> Self {
        RingNumbers { in_use: [false; MAX_RING_NUMBER + 1], by_bond: vec![None; n_bonds] }
    }

    fn open(&mut self, bond: usize) -> Result<usize> {
        let num = (1..=MAX_RING_NUMBER).find(|&k| !self.in_use[k]).ok_or_else(|| {
            MolkitError::InvalidInput(format!(
                "more than {MAX_RING_NUMBER} ring closures open at once"
            ))
        })?;
        self.in_use[num] = true;
        self.by_bond[bond] = Some(num);
        Ok(num)
    }

    fn close(&mut self, bond: usize) -> Option<usize> {
        let num = self.by_bond[bond].take()?;
        self.in_use[num] = false;
        Some(num)
    }
}

struct DfsWriter<'a> {
    mol: &'a Molecule,
    lowercase: &'a [bool],
    tree: &'a SpanningTree,
    rings: RingNumbers,
    output: String,
}

impl DfsWriter<'_> {
    fn write_component(&mut self, root: usize) -> Result<()> {
        self.write_atom_with_rings(root)?;
        let children = self.children(root, None);
        let mut stack = vec![Branch { children, next: 0, in_branch: false }];

        while let Some(top) = stack.last_mut() {
            let Some(&(child, bi)) = top.children.get(top.next) else {
                let in_branch = top.in_branch;
                stack.pop();
                if in_branch {
                    self.output.push(')');
                }
                continue;
            };
            top.next += 1;
            // the last child continues the chain, earlier ones are branches
            let in_branch = top.next < top.children.len();
            if in_branch {
                self.output.push('(');
            }
            self.write_bond(bi);
            self.write_atom_with_rings(child)?;
            let children = self.children(child, Some(bi));
            stack.push(Branch { children, next: 0, in_branch });
        }
        Ok(())
    }

    /// Tree edges leading away from `atom`, in adjacency order.
    fn children(&self, atom: usize, from_bond: Option<usize>) -> Vec<(usize, usize)> {
        self.mol
            .edges(atom)
            .iter()
            .copied()
            .filter(|&(_, bi)| self.tree.tree_bonds[bi] && Some(bi) != from_bond)
            .collect()
    }

    /// The atom followed by its ring digits: closures first, so their
    /// numbers can be reused by openings at the same atom.
    fn write_atom_with_rings(&mut self, atom: usize) -> Result<()> {
        self.write_atom(atom);
        let tree = self.tree;
        let ring_bonds = &tree.ring_bonds[atom];
        for &(bi, _) in ring_bonds.iter().filter(|(_, opening)| !opening) {
            if let Some(num) = self.rings.close(bi) {
                write_ring_number(num, &mut self.output);
            }
        }
        // The bond symbol of a ring bond goes with the opening digit
        for &(bi, _) in ring_bonds.iter().filter(|(_, opening)| *opening) {
            let num = self.rings.open(bi)?;
            self.write_bond(bi);
            write_ring_number(num, &mut self.output);
        }
        Ok(())
    }

    /// Single bonds are implicit except between two aromatic atoms, where
    /// they must be written to stop the reader assuming aromatic.
    fn write_bond(&mut self, bond_idx: usize) {
        let bond = &self.mol.bonds()[bond_idx];
        let both_lowercase = self.lowercase[bond.atom1] && self.lowercase[bond.atom2];
        match bond.order {
            BondOrder::Single => match bond.stereo {
                BondStereo::Up => self.output.push('/'),
                BondStereo::Down => self.output.push('\\'),
                _ if both_lowercase => self.output.push('-'),
                _ => {}
            },
            BondOrder::Double => self.output.push('='),
            BondOrder::Triple => self.output.push('#'),
            BondOrder::Aromatic => {
                if !both_lowercase {
                    self.output.push(':');
                }
            }
        }
    }

    fn write_atom(&mut self, atom_idx: usize) {
        let mol = self.mol;
        let atom = &mol.atoms()[atom_idx];
        let lowercase = self.lowercase[atom_idx];
        let hydrogens = mol.implicit_h(atom_idx).unwrap_or(0);

        let needs_bracket = atom.isotope != 0
            || atom.charge != 0
            || !lowercase
            || hydrogens != aromatic_default_h(mol, atom_idx);

        if !needs_bracket {
            self.output.push_str(lowercase_symbol(atom));
            return;
        }

        self.output.push('[');
        if atom.isotope != 0 {
            self.output.push_str(&atom.isotope.to_string());
        }
        match &atom.label {
            AtomLabel::Element(_) if lowercase => self.output.push_str(lowercase_symbol(atom)),
            AtomLabel::Element(_) => self.output.push_str(atom.symbol()),
            AtomLabel::Pseudo(text) if reads_back_as_pseudo(text) => self.output.push_str(text),
            _ => self.output.push('*'),
        }
        // Hydrogen count in bracket
        if hydrogens > 0 {
            self.output.push('H');
            if hydrogens > 1 {
                self.output.push_str(&hydrogens.to_string());
            }
        }
        // Charge
        if atom.charge > 0 {
            self.output.push('+');
            if atom.charge > 1 {
                self.output.push_str(&atom.charge.to_string());
            }
        } else if atom.charge < 0 {
            self.output.push('-');
            if atom.charge < -1 {
                self.output.push_str(&(-i16::from(atom.charge)).to_string());
            }
        }
        self.output.push(']');
    }
}

/// Pseudo-atom text the reader turns back into the same pseudo atom: one
/// uppercase letter plus an optional lowercase one, not an element.
fn reads_back_as_pseudo(text: &str) -> bool {
    let bytes = text.as_bytes();
    let shape_ok = match bytes {
        [first] => first.is_ascii_uppercase(),
        [first, second] => first.is_ascii_uppercase() && second.is_ascii_lowercase(),
        _ => false,
    };
    shape_ok && element_by_symbol(text).is_none()
}

/// Whether the atom is written with a lowercase aromatic symbol.
fn writes_lowercase(mol: &Molecule, idx: usize) -> bool {
    let atom = &mol.atoms()[idx];
    atom.element_number().and_then(aromatic_symbol).is_some()
        && mol.atom_aromaticity(idx).unwrap_or(false)
}

fn lowercase_symbol(atom: &Atom) -> &'static str {
    atom.element_number().and_then(aromatic_symbol).unwrap_or("*")
}

/// Hydrogens a reader infers for an unbracketed aromatic atom.
fn aromatic_default_h(mol: &Molecule, idx: usize) -> u8 {
    let is_carbon = mol.atoms()[idx].element_number() == Some(6);
    u8::from(is_carbon && mol.edges(idx).len() == 2)
}

/// Write a ring closure number, `%nn` from 10 on.
fn write_ring_number(num: usize, output: &mut String) {
    if num < 10 {
        output.push((b'0' + num as u8) as char);
    } else {
        output.push('%');
        output.push_str(&num.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    /// Element, charge, isotope and hydrogen count of every atom, sorted.
    fn atom_multiset(mol: &Molecule) -> Vec<(i16, i8, u16, u8)> {
        let mut atoms: Vec<_> = (0..mol.atom_count())
            .map(|i| {
                let a = &mol.atoms()[i];
                (a.atomic_number(), a.charge, a.isotope, mol.implicit_h(i).unwrap_or(0))
            })
            .collect();
        atoms.sort_unstable();
        atoms
    }

    fn bond_orders(mol: &Molecule) -> Vec<BondOrder> {
        let mut orders: Vec<_> = mol.bonds().iter().map(|b| b.order).collect();
        orders.sort_unstable();
        orders
    }

    fn assert_round_trip(smi: &str) {
        let mol = parse_smiles(smi).unwrap();
        let out = write_smiles(&mol).unwrap();
        let back = parse_smiles(&out).unwrap_or_else(|e| panic!("'{smi}' -> '{out}': {e}"));
        assert_eq!(mol.atom_count(), back.atom_count(), "'{smi}' -> '{out}'");
        assert_eq!(mol.bond_count(), back.bond_count(), "'{smi}' -> '{out}'");
        assert_eq!(bond_orders(&mol), bond_orders(&back), "'{smi}' -> '{out}'");
        assert_eq!(atom_multiset(&mol), atom_multiset(&back), "'{smi}' -> '{out}'");
        // writing the re-parsed molecule is stable
        assert_eq!(write_smiles(&back).unwrap(), out);
    }

    #[test]
    fn write_empty() {
        assert_eq!(write_smiles(&Molecule::new()).unwrap(), "");
    }

    #[test]
    fn write_brackets_aliphatic_atoms() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH3][CH2][OH]");
    }

    #[test]
    fn write_aromatic_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "c1ccccc1");
    }

    #[test]
    fn write_branches() {
        let mol = parse_smiles("C(Cl)(Cl)Cl").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH]([Cl])([Cl])[Cl]");

        let mol = parse_smiles("CC(C)C").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH3][CH]([CH3])[CH3]");
    }

    #[test]
    fn write_bond_symbols() {
        let mol = parse_smiles("C=O").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH2]=[O]");
        let mol = parse_smiles("C#N").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH]#[N]");
        // biphenyl link between two aromatic atoms
        let mol = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        let out = write_smiles(&mol).unwrap();
        assert_eq!(out, "c1ccccc1-c1ccccc1");
    }

    #[test]
    fn write_charges_and_isotopes() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[NH4+]");
        let mol = parse_smiles("[13CH4]").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[13CH4]");
        let mol = parse_smiles("[O-2]").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[O-2]");
    }

    #[test]
    fn write_disconnected_fragments() {
        let mol = parse_smiles("C.O").unwrap();
        assert_eq!(write_smiles(&mol).unwrap(), "[CH4].[OH2]");
    }

    #[test]
    fn write_aromatic_nh_keeps_hydrogen() {
        let mol = parse_smiles("c1cc[nH]c1").unwrap();
        let out = write_smiles(&mol).unwrap();
        assert!(out.contains("[nH]"), "got '{out}'");
    }

    /// A carbon shared by `rings` three-membered rings.
    fn hub_with_triangles(rings: usize) -> Molecule {
        let mut mol = Molecule::new();
        let hub = mol.add_atom(6);
        for _ in 0..rings {
            let a = mol.add_atom(6);
            let b = mol.add_atom(6);
            mol.add_bond(hub, a, BondOrder::Single).unwrap();
            mol.add_bond(a, b, BondOrder::Single).unwrap();
            mol.add_bond(b, hub, BondOrder::Single).unwrap();
        }
        mol
    }

    #[test]
    fn ring_numbers_past_nine() {
        let mol = hub_with_triangles(12);
        let out = write_smiles(&mol).unwrap();
        assert!(out.contains("%10") && out.contains("%12"), "got '{out}'");
        let back = parse_smiles(&out).unwrap();
        assert_eq!(back.atom_count(), 25);
        assert_eq!(back.bond_count(), 36);
        assert_eq!(back.degree(0).unwrap(), 24);
    }

    #[test]
    fn ring_numbers_are_reused_after_closing() {
        let smi = "C1CC1".repeat(120);
        let mol = parse_smiles(&smi).unwrap();
        let out = write_smiles(&mol).unwrap();
        assert!(!out.contains('%'), "got '{out}'");
        assert_eq!(out.matches('1').count(), 240, "got '{out}'");
        let back = parse_smiles(&out).unwrap();
        assert_eq!(back.atom_count(), 360);
        assert_eq!(back.bond_count(), 120 * 3 + 119);
    }

    #[test]
    fn ninety_nine_open_rings_fit() {
        let mol = hub_with_triangles(99);
        let out = write_smiles(&mol).unwrap();
        assert!(out.contains("%99") && !out.contains("%100"), "got '{out}'");
        let back = parse_smiles(&out).unwrap();
        assert_eq!(back.bond_count(), 99 * 3);
        assert_eq!(back.degree(0).unwrap(), 198);
    }

    #[test]
    fn too_many_open_rings_is_an_error() {
        let mol = hub_with_triangles(100);
        assert!(matches!(write_smiles(&mol), Err(MolkitError::InvalidInput(_))));
    }

    #[test]
    fn fused_and_spiro_rings_round_trip() {
        for smi in ["c1ccc2ccccc2c1", "C12(CC1)CC2", "C1CC2CCC1CC2", "c1ccc2c(c1)[nH]c1ccccc12"] {
            let mol = parse_smiles(smi).unwrap();
            let out = write_smiles(&mol).unwrap();
            let back = parse_smiles(&out).unwrap_or_else(|e| panic!("'{smi}' -> '{out}': {e}"));
            assert_eq!(mol.bond_count(), back.bond_count(), "'{smi}' -> '{out}'");
            assert_eq!(bond_orders(&mol), bond_orders(&back), "'{smi}' -> '{out}'");
            assert_eq!(atom_multiset(&mol), atom_multiset(&back), "'{smi}' -> '{out}'");
        }
    }

    #[test]
    fn long_chain_writes_without_recursion() {
        let n = 200_000;
        let mol = parse_smiles(&"C".repeat(n)).unwrap();
        let out = write_smiles(&mol).unwrap();
        assert!(out.starts_with("[CH3][CH2]"));
        assert!(out.ends_with("[CH2][CH3]"));
        assert_eq!(out.matches('[').count(), n);
        assert_eq!(parse_smiles(&out).unwrap().bond_count(), n - 1);
    }

    #[test]
    fn deep_branches_write_without_recursion() {
        let depth = 50_000;
        let smi = format!("{}C{}", "C(".repeat(depth), ")".repeat(depth));
        let mol = parse_smiles(&smi).unwrap();
        let out = write_smiles(&mol).unwrap();
        let back = parse_smiles(&out).unwrap();
        assert_eq!(back.atom_count(), depth + 1);
        assert_eq!(back.bond_count(), depth);
    }

    #[test]
    fn placeholder_atoms_are_written_as_star() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(6);
        let p = mol.add_pseudo_atom("CH2OH");
        let r = mol.add_rsite(1);
        let t = mol.add_template_atom("Gly", 1);
        mol.add_bond(c, p, BondOrder::Single).unwrap();
        mol.add_bond(p, r, BondOrder::Single).unwrap();
        mol.add_bond(r, t, BondOrder::Single).unwrap();
        let out = write_smiles(&mol).unwrap();
        assert_eq!(out, "[CH3][*][*][*]");
        let back = parse_smiles(&out).unwrap();
        assert_eq!(back.atom_count(), 4);
        assert_eq!(back.atoms()[0].element_number(), Some(6));
        for i in 1..4 {
            assert_eq!(back.pseudo_atom_text(i).unwrap(), "*");
        }
    }

    #[test]
    fn symbol_like_pseudo_atoms_keep_their_text() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(6);
        let q = mol.add_pseudo_atom("Q");
        let h = mol.add_pseudo_atom("He2");
        mol.add_bond(c, q, BondOrder::Single).unwrap();
        mol.add_bond(q, h, BondOrder::Single).unwrap();
        let out = write_smiles(&mol).unwrap();
        assert_eq!(out, "[CH3][Q][*]");
        assert_eq!(parse_smiles(&out).unwrap().pseudo_atom_text(1).unwrap(), "Q");
        assert!(reads_back_as_pseudo("Xy"));
        assert!(!reads_back_as_pseudo("Cl"));
        assert!(!reads_back_as_pseudo("R1"));
    }

    #[test]
    fn round_trip_keeps_meaning() {
        for smi in [
            "CCO",
            "OCC",
            "CC(=O)O",
            "c1ccccc1",
            "C1CCCCC1",
            "CC(C)(C)C",
            "C=CC=C",
            "Cc1ccccc1",
            "c1ccncc1",
            "c1cc[nH]c1",
            "[NH4+].[Cl-]",
            "C[Xy]C",
            "C#CC(=O)[O-]",
            "CC(=O)Oc1ccccc1C(=O)O",
        ] {
            assert_round_trip(smi);
        }
    }

    #[test]
    fn ring_bond_order_is_preserved() {
        assert_round_trip("C1=CCCCC1");
        let mol = parse_smiles("C1=CCCCC1").unwrap();
        let back = parse_smiles(&write_smiles(&mol).unwrap()).unwrap();
        assert_eq!(bond_orders(&back).iter().filter(|&&o| o == BondOrder::Double).count(), 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::smiles::parse_smiles;
    use proptest::prelude::*;

    /// Acyclic SMILES with branches built from a small alphabet.
    fn acyclic_smiles() -> impl Strategy<Value = String> {
        let atom = prop_oneof![Just("C"), Just("N"), Just("O"), Just("Cl"), Just("[13C]"), Just("[N+]")];
        let bond = prop_oneof![Just(""), Just(""), Just("=")];
        proptest::collection::vec((atom, bond, any::<bool>()), 1..=12).prop_map(|parts| {
            let mut s = String::new();
            let mut open = 0;
            for (i, (atom, bond, branch)) in parts.iter().enumerate() {
                if i > 0 {
                    if *branch {
                        s.push('(');
                        open += 1;
                    }
                    s.push_str(bond);
                }
                s.push_str(atom);
            }
            for _ in 0..open {
                s.push(')');
            }
            s
        })
    }

    proptest! {
        #[test]
        fn acyclic_round_trip(smi in acyclic_smiles()) {
            let mol = parse_smiles(&smi).unwrap();
            let out = write_smiles(&mol).unwrap();
            let back = parse_smiles(&out).unwrap();
            prop_assert_eq!(mol.atom_count(), back.atom_count());
            prop_assert_eq!(mol.bond_count(), back.bond_count());
            let mut a: Vec<_> = mol.bonds().iter().map(|b| b.order).collect();
            let mut b: Vec<_> = back.bonds().iter().map(|b| b.order).collect();
            a.sort_unstable();
            b.sort_unstable();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn single_ring_round_trip(len in 3usize..12, aromatic in any::<bool>()) {
            let atom = if aromatic { "c" } else { "C" };
            let smi = format!("{atom}1{}1", atom.repeat(len - 1));
            let mol = parse_smiles(&smi).unwrap();
            let back = parse_smiles(&write_smiles(&mol).unwrap()).unwrap();
            prop_assert_eq!(back.atom_count(), len);
            prop_assert_eq!(back.bond_count(), len);
        }
    }
}
