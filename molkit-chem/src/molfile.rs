//! MDL Molfile V2000 reader and writer.
//!
//! Fixed-column atom and bond blocks followed by `M  ` property lines
//! (charges, isotopes, radicals, R-groups, S-groups) up to `M  END`.
//! V3000 files are rejected.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::ops::Range;
use std::str::FromStr;

use molkit_core::{MolkitError, Result};

use crate::element::{element_by_number, element_by_symbol};
use crate::line_reader::LineReader;
use crate::molecule::{Atom, AtomLabel, BondOrder, BondStereo, Molecule, Point3D, Radical};
use crate::sgroup::{
    AttachmentPoint, DisplayOption, SGroup, SGroupKind, SGroupSubtype, SGroupType,
    SruConnectivity,
};

/// Largest atom or bond count the three-column counts line can hold.
const MAX_V2000_COUNT: usize = 999;

/// Parse a single Molfile from text.
pub fn parse_molfile(text: &str) -> Result<Molecule> {
    read_molfile(text.as_bytes())
}

/// Parse a single Molfile from a reader.
pub fn read_molfile<R: Read>(reader: R) -> Result<Molecule> {
    let mut lines = LineReader::new(BufReader::new(reader));
    read_molecule(&mut lines)?.ok_or_else(|| MolkitError::molfile(1, "empty molfile"))
}

/// Read one Molfile record. Returns `None` when the input holds nothing but
/// blank lines before end of file.
///
/// A `$$$$` line seen before `M  END` is left unread so SDF framing can
/// consume it; inside the header, atom or bond block it also fails the
/// record. A `>` data header before `M  END` ends the property block.
pub(crate) fn read_molecule<R: BufRead>(lines: &mut LineReader<R>) -> Result<Option<Molecule>> {
    let mut header = Vec::with_capacity(4);
    while header.len() < 4 {
        match lines.next_line()? {
            Some(line) if line.starts_with("$$$$") => {
                return Err(truncated_record(lines, line, "header block"));
            }
            Some(line) => header.push(line),
            None if header.iter().all(|l| l.trim().is_empty()) => return Ok(None),
            None => {
                return Err(MolkitError::molfile(
                    lines.line_number() + 1,
                    "unexpected end of file in header block",
                ))
            }
        }
    }

    let mut loader = MolfileLoader {
        mol: Molecule::named(header[0].trim()),
        sgroups: Vec::new(),
        sgroup_ids: BTreeMap::new(),
    };
    let (n_atoms, n_bonds) = loader.read_counts(&header[3], lines.line_number())?;

    for _ in 0..n_atoms {
        let line = require_line(lines, "atom line")?;
        let atom = parse_atom_line(&line, lines.line_number())?;
        loader.mol.push_atom(atom);
    }
    for _ in 0..n_bonds {
        let line = require_line(lines, "bond line")?;
        loader.read_bond(&line, lines.line_number())?;
    }

    loop {
        let Some(line) = lines.next_line()? else {
            log::debug!("molfile '{}' ended without M  END", loader.mol.name);
            break;
        };
        if line.starts_with("$$$$") {
            lines.push_back(line);
            break;
        }
        if line.starts_with('>') {
            log::warn!(
                "line {}: data item before M  END in '{}'",
                lines.line_number(),
                loader.mol.name
            );
            lines.push_back(line);
            break;
        }
        if line.starts_with("M  END") {
            break;
        }
        let line_no = lines.line_number();
        if let Some(tag) = line.strip_prefix("M  ").and_then(|rest| rest.get(..3)) {
            loader.read_property(tag, &line, line_no)?;
        } else if line.starts_with("A  ") {
            let idx = loader.atom_index(column(&line, 3..6), line_no)?;
            let text = require_line(lines, "atom alias text")?;
            loader.mol.set_pseudo_atom(idx, text.trim())?;
        }
    }

    let mol = loader.finish(lines.line_number())?;
    log::debug!(
        "read molfile '{}': {} atoms, {} bonds, {} S-groups",
        mol.name,
        mol.atom_count(),
        mol.bond_count(),
        mol.sgroups().len()
    );
    Ok(Some(mol))
}

fn require_line<R: BufRead>(lines: &mut LineReader<R>, what: &str) -> Result<String> {
    match lines.next_line()? {
        Some(line) if line.starts_with("$$$$") => Err(truncated_record(lines, line, what)),
        Some(line) => Ok(line),
        None => Err(MolkitError::molfile(
            lines.line_number() + 1,
            format!("unexpected end of file, expected {what}"),
        )),
    }
}

/// Leave the separator for the SDF reader and report the record as cut short.
fn truncated_record<R: BufRead>(lines: &mut LineReader<R>, separator: String, what: &str) -> MolkitError {
    let line_no = lines.line_number();
    lines.push_back(separator);
    MolkitError::molfile(line_no, format!("record ends before {what}"))
}

/// Trimmed text of a fixed-width column; short lines yield what is there.
fn column(line: &str, range: Range<usize>) -> &str {
    line.get(range.clone())
        .or_else(|| line.get(range.start..))
        .unwrap_or("")
        .trim()
}

fn required<T: FromStr>(line: &str, range: Range<usize>, line_no: usize, what: &str) -> Result<T> {
    let text = column(line, range);
    if text.is_empty() {
        return Err(MolkitError::molfile(line_no, format!("missing {what}")));
    }
    text.parse()
        .map_err(|_| MolkitError::molfile(line_no, format!("invalid {what} '{text}'")))
}

fn optional<T: FromStr>(
    line: &str,
    range: Range<usize>,
    line_no: usize,
    what: &str,
    default: T,
) -> Result<T> {
    let text = column(line, range);
    if text.is_empty() {
        return Ok(default);
    }
    text.parse()
        .map_err(|_| MolkitError::molfile(line_no, format!("invalid {what} '{text}'")))
}

fn parse_number<T: FromStr>(token: &str, line_no: usize, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| MolkitError::molfile(line_no, format!("invalid {what} '{token}'")))
}

fn parse_atom_line(line: &str, line_no: usize) -> Result<Atom> {
    // xxxxx.xxxxyyyyy.yyyyzzzzz.zzzz aaaddccc...
    let x: f64 = required(line, 0..10, line_no, "x coordinate")?;
    let y: f64 = required(line, 10..20, line_no, "y coordinate")?;
    let z: f64 = required(line, 20..30, line_no, "z coordinate")?;
    let symbol = column(line, 31..34);
    if symbol.is_empty() {
        return Err(MolkitError::molfile(line_no, "missing atom symbol"));
    }
    let mass_diff: i32 = optional(line, 34..36, line_no, "mass difference", 0)?;
    let charge_code: u8 = optional(line, 36..39, line_no, "charge code", 0)?;

    let mut atom = if symbol == "R#" {
        Atom::new(AtomLabel::RSite { rgroup_bits: 0 })
    } else if let Some(element) = element_by_symbol(symbol) {
        let mut atom = Atom::element(element.atomic_number);
        if mass_diff != 0 {
            let mass = i32::from(element.standard_mass_number()) + mass_diff;
            atom.isotope = mass.clamp(0, i32::from(u16::MAX)) as u16;
        }
        atom
    } else {
        log::warn!("line {line_no}: unknown atom symbol '{symbol}', reading as pseudo atom");
        Atom::new(AtomLabel::Pseudo(symbol.to_string()))
    };

    match charge_code {
        0 => {}
        1 => atom.charge = 3,
        2 => atom.charge = 2,
        3 => atom.charge = 1,
        4 => atom.radical = Radical::Doublet,
        5 => atom.charge = -1,
        6 => atom.charge = -2,
        7 => atom.charge = -3,
        other => {
            return Err(MolkitError::molfile(line_no, format!("invalid charge code {other}")))
        }
    }
    atom.position = Point3D::new(x, y, z);
    Ok(atom)
}

/// Loader state between the counts line and `M  END`.
struct MolfileLoader {
    mol: Molecule,
    sgroups: Vec<SGroup>,
    /// File S-group id → position in `sgroups`.
    sgroup_ids: BTreeMap<u32, usize>,
}

impl MolfileLoader {
    fn read_counts(&mut self, line: &str, line_no: usize) -> Result<(usize, usize)> {
        if line.trim_end().ends_with("V3000") {
            return Err(MolkitError::molfile(line_no, "V3000 molfiles are not supported"));
        }
        let n_atoms = required(line, 0..3, line_no, "atom count")?;
        let n_bonds = required(line, 3..6, line_no, "bond count")?;
        self.mol.chiral = column(line, 12..15) == "1";
        Ok((n_atoms, n_bonds))
    }

    fn read_bond(&mut self, line: &str, line_no: usize) -> Result<()> {
        // 111222tttsss...
        let a1 = self.atom_index(column(line, 0..3), line_no)?;
        let a2 = self.atom_index(column(line, 3..6), line_no)?;
        let kind: u8 = required(line, 6..9, line_no, "bond type")?;
        let stereo: u8 = optional(line, 9..12, line_no, "bond stereo", 0)?;
        if !(1..=4).contains(&kind) {
            log::debug!("line {line_no}: query bond type {kind} read as single");
        }
        let bond = self
            .mol
            .add_bond(a1, a2, BondOrder::from_code(kind))
            .map_err(|e| MolkitError::molfile(line_no, e.to_string()))?;
        if stereo != 0 {
            self.mol.set_bond_stereo(bond, BondStereo::from_mdl_code(stereo))?;
        }
        Ok(())
    }

    /// 1-based atom number from the file → 0-based index.
    fn atom_index(&self, token: &str, line_no: usize) -> Result<usize> {
        let n: usize = parse_number(token, line_no, "atom number")?;
        if n == 0 || n > self.mol.atom_count() {
            return Err(MolkitError::molfile(
                line_no,
                format!("atom number {n} out of range 1..={}", self.mol.atom_count()),
            ));
        }
        Ok(n - 1)
    }

    fn bond_index(&self, token: &str, line_no: usize) -> Result<usize> {
        let n: usize = parse_number(token, line_no, "bond number")?;
        if n == 0 || n > self.mol.bond_count() {
            return Err(MolkitError::molfile(
                line_no,
                format!("bond number {n} out of range 1..={}", self.mol.bond_count()),
            ));
        }
        Ok(n - 1)
    }

    fn sgroup(&mut self, token: &str, line_no: usize) -> Result<&mut SGroup> {
        let id: u32 = parse_number(token, line_no, "S-group id")?;
        match self.sgroup_ids.get(&id) {
            Some(&idx) => Ok(&mut self.sgroups[idx]),
            None => Err(MolkitError::molfile(
                line_no,
                format!("S-group {id} not declared by M  STY"),
            )),
        }
    }

    fn read_property(&mut self, tag: &str, line: &str, line_no: usize) -> Result<()> {
        match tag {
            "CHG" => {
                for (atom, value) in self.atom_pairs(line, line_no)? {
                    let charge = parse_number(value, line_no, "charge")?;
                    self.mol.set_atom_charge(atom, charge)?;
                }
            }
            "ISO" => {
                for (atom, value) in self.atom_pairs(line, line_no)? {
                    let isotope = parse_number(value, line_no, "isotope")?;
                    self.mol.set_atom_isotope(atom, isotope)?;
                }
            }
            "RAD" => {
                for (atom, value) in self.atom_pairs(line, line_no)? {
                    let code: u8 = parse_number(value, line_no, "radical code")?;
                    let radical = Radical::from_mdl_code(code).ok_or_else(|| {
                        MolkitError::molfile(line_no, format!("invalid radical code {code}"))
                    })?;
                    self.mol.set_atom_radical(atom, radical)?;
                }
            }
            "RGP" => {
                for (atom, value) in self.atom_pairs(line, line_no)? {
                    let rgroup: u32 = parse_number(value, line_no, "R-group number")?;
                    if !(1..=32).contains(&rgroup) {
                        return Err(MolkitError::molfile(
                            line_no,
                            format!("R-group number {rgroup} out of range 1..=32"),
                        ));
                    }
                    let bits = match self.mol.atom(atom)?.label {
                        AtomLabel::RSite { rgroup_bits } => rgroup_bits,
                        _ => 0,
                    };
                    self.mol.set_rgroup_bits(atom, bits | 1 << (rgroup - 1))?;
                }
            }
            "STY" => {
                for (id, code) in counted_pairs(line, line_no)? {
                    let id: u32 = parse_number(id, line_no, "S-group id")?;
                    let sgroup_type = SGroupType::from_code(code).ok_or_else(|| {
                        MolkitError::molfile(line_no, format!("unknown S-group type '{code}'"))
                    })?;
                    if self.sgroup_ids.contains_key(&id) {
                        return Err(MolkitError::molfile(
                            line_no,
                            format!("S-group {id} declared twice"),
                        ));
                    }
                    let mut group = SGroup::new(SGroupKind::empty(sgroup_type));
                    group.original_id = Some(id);
                    self.sgroup_ids.insert(id, self.sgroups.len());
                    self.sgroups.push(group);
                }
            }
            "SST" => {
                for (id, code) in counted_pairs(line, line_no)? {
                    let subtype = SGroupSubtype::from_code(code).ok_or_else(|| {
                        MolkitError::molfile(line_no, format!("unknown S-group subtype '{code}'"))
                    })?;
                    self.sgroup(id, line_no)?.subtype = subtype;
                }
            }
            "SPL" => {
                for (id, parent) in counted_pairs(line, line_no)? {
                    let parent = parse_number(parent, line_no, "parent S-group id")?;
                    self.sgroup(id, line_no)?.parent_id = Some(parent);
                }
            }
            "SCN" => {
                for (id, code) in counted_pairs(line, line_no)? {
                    let connectivity = SruConnectivity::from_code(code).ok_or_else(|| {
                        MolkitError::molfile(line_no, format!("unknown SRU connectivity '{code}'"))
                    })?;
                    if let SGroupKind::Sru(sru) = &mut self.sgroup(id, line_no)?.kind {
                        sru.connectivity = Some(connectivity);
                    }
                }
            }
            "SAL" | "SPA" => {
                let (id, members) = counted_list(line, line_no)?;
                let atoms = members
                    .iter()
                    .map(|token| self.atom_index(token, line_no))
                    .collect::<Result<Vec<_>>>()?;
                let group = self.sgroup(id, line_no)?;
                if tag == "SAL" {
                    group.atoms.extend(atoms);
                } else if let SGroupKind::Multiple(m) = &mut group.kind {
                    m.parent_atoms.extend(atoms);
                }
            }
            "SBL" => {
                let (id, members) = counted_list(line, line_no)?;
                let bonds = members
                    .iter()
                    .map(|token| self.bond_index(token, line_no))
                    .collect::<Result<Vec<_>>>()?;
                self.sgroup(id, line_no)?.bonds.extend(bonds);
            }
            "SDS" => {
                // M  SDS EXPn15 sss ...
                let tokens = tokens(line);
                if tokens.first() == Some(&"EXP") {
                    let (_, ids) = counted_list_from(&tokens, line_no)?;
                    for id in ids {
                        self.sgroup(id, line_no)?.display = DisplayOption::Expanded;
                    }
                }
            }
            "SMT" => {
                let text = line.get(11..).unwrap_or("").trim();
                let group = self.sgroup(column(line, 6..10), line_no)?;
                let sgroup_type = group.sgroup_type();
                match &mut group.kind {
                    SGroupKind::Superatom(sa) => sa.label = text.to_string(),
                    SGroupKind::Sru(sru) => sru.subscript = text.to_string(),
                    SGroupKind::Multiple(m) => {
                        m.multiplier = parse_number(text, line_no, "multiplier")?;
                    }
                    _ => log::debug!("line {line_no}: ignoring M  SMT on {sgroup_type}"),
                }
            }
            "SDT" => {
                // M  SDT sss fff...(30) cc uuu...(20)
                let group = self.sgroup(column(line, 6..10), line_no)?;
                let SGroupKind::Data(field) = &mut group.kind else {
                    return Err(MolkitError::molfile(line_no, "M  SDT on a non-data S-group"));
                };
                field.name = column(line, 11..41).to_string();
                field.field_type = column(line, 41..43).to_string();
                field.units = column(line, 43..63).to_string();
            }
            "SED" => {
                let text = line.get(11..).unwrap_or("").trim_end();
                let group = self.sgroup(column(line, 6..10), line_no)?;
                let SGroupKind::Data(field) = &mut group.kind else {
                    return Err(MolkitError::molfile(line_no, "M  SED on a non-data S-group"));
                };
                if !field.value.is_empty() {
                    field.value.push('\n');
                }
                field.value.push_str(text);
            }
            "SAP" => {
                // M  SAP sssnn6 aaa lll cc ...
                let count: usize = required(line, 10..13, line_no, "attachment point count")?;
                let mut points = Vec::with_capacity(count);
                for k in 0..count {
                    let base = 13 + k * 11;
                    let atom = self.atom_index(column(line, base..base + 4), line_no)?;
                    let leaving = match column(line, base + 4..base + 8) {
                        "" | "0" => None,
                        token => Some(self.atom_index(token, line_no)?),
                    };
                    let id = column(line, base + 8..base + 11).to_string();
                    points.push(AttachmentPoint { atom, leaving_atom: leaving, id });
                }
                let group = self.sgroup(column(line, 6..10), line_no)?;
                if let SGroupKind::Superatom(sa) = &mut group.kind {
                    sa.attachment_points.extend(points);
                }
            }
            other => log::debug!("line {line_no}: skipping property M  {other}"),
        }
        Ok(())
    }

    /// `nn8 aaa vvv ...` pairs keyed by atom number.
    fn atom_pairs<'l>(&self, line: &'l str, line_no: usize) -> Result<Vec<(usize, &'l str)>> {
        counted_pairs(line, line_no)?
            .into_iter()
            .map(|(atom, value)| Ok((self.atom_index(atom, line_no)?, value)))
            .collect()
    }

    fn finish(self, end_line: usize) -> Result<Molecule> {
        let mut mol = self.mol;
        for group in self.sgroups {
            mol.add_sgroup(group)
                .map_err(|e| MolkitError::molfile(end_line, e.to_string()))?;
        }
        Ok(mol)
    }
}

/// Whitespace-separated fields after the `M  XXX` tag.
fn tokens(line: &str) -> Vec<&str> {
    line.get(6..).unwrap_or("").split_whitespace().collect()
}

/// `nn8 k1 v1 k2 v2 ...`
fn counted_pairs(line: &str, line_no: usize) -> Result<Vec<(&str, &str)>> {
    let tokens = tokens(line);
    let Some((count, rest)) = tokens.split_first() else {
        return Err(MolkitError::molfile(line_no, "missing entry count"));
    };
    let count: usize = parse_number(count, line_no, "entry count")?;
    if rest.len() < count.saturating_mul(2) {
        return Err(MolkitError::molfile(
            line_no,
            format!("expected {count} entries, line holds {}", rest.len() / 2),
        ));
    }
    Ok(rest.chunks(2).take(count).map(|pair| (pair[0], pair[1])).collect())
}

/// `sss nn15 m1 m2 ...`
fn counted_list(line: &str, line_no: usize) -> Result<(&str, Vec<&str>)> {
    counted_list_from(&tokens(line), line_no)
}

fn counted_list_from<'l>(tokens: &[&'l str], line_no: usize) -> Result<(&'l str, Vec<&'l str>)> {
    let [head, count, rest @ ..] = tokens else {
        return Err(MolkitError::molfile(line_no, "truncated property line"));
    };
    let count: usize = parse_number(count, line_no, "entry count")?;
    if rest.len() < count {
        return Err(MolkitError::molfile(
            line_no,
            format!("expected {count} entries, line holds {}", rest.len()),
        ));
    }
    Ok((*head, rest[..count].to_vec()))
}

// ---- writer ----

/// Serialize a molecule as a V2000 Molfile ending in `M  END\n`.
///
/// Atom symbols that do not fit the three-character column, or that would
/// read back as an element, are written as `A` with an `A  ` alias line.
pub fn write_molfile(mol: &Molecule) -> Result<String> {
    let n_atoms = mol.atom_count();
    let n_bonds = mol.bond_count();
    if n_atoms > MAX_V2000_COUNT || n_bonds > MAX_V2000_COUNT {
        return Err(MolkitError::InvalidInput(format!(
            "V2000 holds at most {MAX_V2000_COUNT} atoms and bonds, got {n_atoms} atoms and {n_bonds} bonds"
        )));
    }

    let mut lines: Vec<String> = Vec::with_capacity(n_atoms + n_bonds + 8);
    lines.push(mol.name.clone());
    let dimension = if mol.atoms().iter().any(|a| a.position.z.abs() > 1e-4) {
        "3D"
    } else {
        "2D"
    };
    lines.push(format!("  {:<8}{:10}{}", "molkit", "", dimension));
    lines.push(String::new());
    lines.push(format!(
        "{:3}{:3}  0  0{:3}  0  0  0  0  0999 V2000",
        n_atoms,
        n_bonds,
        u8::from(mol.chiral)
    ));

    let mut aliases = Vec::new();
    for (i, atom) in mol.atoms().iter().enumerate() {
        let (symbol, alias) = atom_symbol(atom);
        if let Some(text) = alias {
            aliases.push((i + 1, text));
        }
        let p = atom.position;
        lines.push(format!(
            "{:10.4}{:10.4}{:10.4} {:<3}{:2}{:3}  0  0  0  0  0  0  0  0  0  0",
            p.x,
            p.y,
            p.z,
            symbol,
            mass_difference(atom),
            charge_code(atom)
        ));
    }

    for bond in mol.bonds() {
        lines.push(format!(
            "{:3}{:3}{:3}{:3}  0  0  0",
            bond.atom1 + 1,
            bond.atom2 + 1,
            bond.order.code(),
            bond.stereo.mdl_code()
        ));
    }

    let atoms = mol.atoms().iter().enumerate();
    let charges: Vec<_> = atoms
        .clone()
        .filter(|(_, a)| a.charge != 0)
        .map(|(i, a)| (i + 1, a.charge.to_string()))
        .collect();
    push_pairs(&mut lines, "CHG", &charges);
    let isotopes: Vec<_> = atoms
        .clone()
        .filter(|(_, a)| a.isotope != 0)
        .map(|(i, a)| (i + 1, a.isotope.to_string()))
        .collect();
    push_pairs(&mut lines, "ISO", &isotopes);
    let radicals: Vec<_> = atoms
        .clone()
        .filter(|(_, a)| a.radical != Radical::None)
        .map(|(i, a)| (i + 1, a.radical.mdl_code().to_string()))
        .collect();
    push_pairs(&mut lines, "RAD", &radicals);
    let rgroups: Vec<_> = atoms
        .flat_map(|(i, a)| {
            let bits = match a.label {
                AtomLabel::RSite { rgroup_bits } => rgroup_bits,
                _ => 0,
            };
            (0..32u32)
                .filter(move |b| bits & (1 << b) != 0)
                .map(move |b| (i + 1, (b + 1).to_string()))
        })
        .collect();
    push_pairs(&mut lines, "RGP", &rgroups);

    for (atom, text) in aliases {
        lines.push(format!("A  {atom:3}"));
        lines.push(text.to_string());
    }

    write_sgroups(mol, &mut lines);

    lines.push("M  END".to_string());
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

/// Write a V2000 Molfile to any writer.
pub fn write_molfile_to<W: Write>(mol: &Molecule, writer: &mut W) -> Result<()> {
    writer.write_all(write_molfile(mol)?.as_bytes())?;
    Ok(())
}

/// Atom-block symbol and, when the label does not fit it, alias text.
fn atom_symbol(atom: &Atom) -> (&str, Option<&str>) {
    match &atom.label {
        AtomLabel::Element(_) => (atom.symbol(), None),
        AtomLabel::RSite { .. } => ("R#", None),
        AtomLabel::Pseudo(text)
            if !text.is_empty()
                && text.len() <= 3
                && !text.contains(char::is_whitespace)
                && text != "R#"
                && element_by_symbol(text).is_none() =>
        {
            (text.as_str(), None)
        }
        AtomLabel::Pseudo(text) => ("A", Some(text.as_str())),
        AtomLabel::Template { name, .. } => ("A", Some(name.as_str())),
    }
}

/// Atom-block mass difference; isotopes out of the column's range are left
/// to `M  ISO`.
fn mass_difference(atom: &Atom) -> i32 {
    let Some(element) = atom.element_number().and_then(element_by_number) else {
        return 0;
    };
    if atom.isotope == 0 {
        return 0;
    }
    let diff = i32::from(atom.isotope) - i32::from(element.standard_mass_number());
    if (-3..=4).contains(&diff) {
        diff
    } else {
        0
    }
}

fn charge_code(atom: &Atom) -> u8 {
    match atom.charge {
        3 => 1,
        2 => 2,
        1 => 3,
        -1 => 5,
        -2 => 6,
        -3 => 7,
        0 if atom.radical == Radical::Doublet => 4,
        _ => 0,
    }
}

/// `M  XXXnn8 aaa vvv ...`, eight entries per line.
fn push_pairs(lines: &mut Vec<String>, tag: &str, entries: &[(usize, String)]) {
    for chunk in entries.chunks(8) {
        let mut line = format!("M  {tag}{:3}", chunk.len());
        for (key, value) in chunk {
            line.push_str(&format!(" {key:3} {value:>3}"));
        }
        lines.push(line);
    }
}

/// `<prefix>nn15 m1 m2 ...`, fifteen entries per line.
fn push_list(lines: &mut Vec<String>, prefix: &str, items: &[usize]) {
    for chunk in items.chunks(15) {
        let mut line = format!("{prefix}{:3}", chunk.len());
        for item in chunk {
            line.push_str(&format!(" {item:3}"));
        }
        lines.push(line);
    }
}

fn write_sgroups(mol: &Molecule, lines: &mut Vec<String>) {
    let groups = mol.sgroups();
    if groups.is_empty() {
        return;
    }
    // groups are renumbered 1..=n; parents are resolved through the ids
    // they were read with
    let renumbered: BTreeMap<u32, usize> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.original_id.map(|id| (id, i + 1)))
        .collect();

    let types: Vec<_> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| (i + 1, g.sgroup_type().code().to_string()))
        .collect();
    push_pairs(lines, "STY", &types);

    let subtypes: Vec<_> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.subtype.code().map(|c| (i + 1, c.to_string())))
        .collect();
    push_pairs(lines, "SST", &subtypes);

    let parents: Vec<_> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| {
            let parent = renumbered.get(&g.parent_id?)?;
            Some((i + 1, parent.to_string()))
        })
        .collect();
    push_pairs(lines, "SPL", &parents);

    let connectivity: Vec<_> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| match &g.kind {
            SGroupKind::Sru(sru) => sru.connectivity.map(|c| (i + 1, c.code().to_string())),
            _ => None,
        })
        .collect();
    push_pairs(lines, "SCN", &connectivity);

    for (i, group) in groups.iter().enumerate() {
        let id = i + 1;
        let atoms: Vec<usize> = group.atoms.iter().map(|a| a + 1).collect();
        push_list(lines, &format!("M  SAL {id:3}"), &atoms);
        let bonds: Vec<usize> = group.bonds.iter().map(|b| b + 1).collect();
        push_list(lines, &format!("M  SBL {id:3}"), &bonds);

        match &group.kind {
            SGroupKind::Superatom(sa) => {
                if !sa.label.is_empty() {
                    lines.push(format!("M  SMT {id:3} {}", sa.label));
                }
                for chunk in sa.attachment_points.chunks(6) {
                    let mut line = format!("M  SAP {id:3}{:3}", chunk.len());
                    for ap in chunk {
                        let leaving = ap.leaving_atom.map_or(0, |a| a + 1);
                        line.push_str(&format!(" {:3} {:3} {:<2}", ap.atom + 1, leaving, ap.id));
                    }
                    lines.push(line.trim_end().to_string());
                }
            }
            SGroupKind::Sru(sru) => lines.push(format!("M  SMT {id:3} {}", sru.subscript)),
            SGroupKind::Multiple(m) => {
                let parents: Vec<usize> = m.parent_atoms.iter().map(|a| a + 1).collect();
                push_list(lines, &format!("M  SPA {id:3}"), &parents);
                lines.push(format!("M  SMT {id:3} {}", m.multiplier));
            }
            SGroupKind::Data(field) => {
                let name: String = field.name.chars().take(30).collect();
                let field_type: String = field.field_type.chars().take(2).collect();
                let line = format!("M  SDT {id:3} {name:<30}{field_type:<2}{}", field.units);
                lines.push(line.trim_end().to_string());
                for value in field.value.lines() {
                    lines.push(format!("M  SED {id:3} {value}"));
                }
            }
            _ => {}
        }
    }

    let expanded: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.display == DisplayOption::Expanded)
        .map(|(i, _)| i + 1)
        .collect();
    push_list(lines, "M  SDS EXP", &expanded);
}

// ---- files ----

/// Attach the path to an I/O error.
#[cfg(feature = "std")]
pub(crate) fn path_error(e: std::io::Error, path: &std::path::Path) -> MolkitError {
    MolkitError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

/// Read a Molfile from disk.
#[cfg(feature = "std")]
pub fn load_molfile(path: impl AsRef<std::path::Path>) -> Result<Molecule> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| path_error(e, path))?;
    read_molfile(file)
}

/// Write a Molfile to disk, replacing any existing file.
#[cfg(feature = "std")]
pub fn save_molfile(mol: &Molecule, path: impl AsRef<std::path::Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| path_error(e, path))?;
    let mut writer = std::io::BufWriter::new(file);
    write_molfile_to(mol, &mut writer)?;
    writer.flush().map_err(|e| path_error(e, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgroup::{DataField, Superatom};
    use crate::smiles::parse_smiles;

    const ETHANOL: &str = "\
ethanol
  molkit            2D

  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.5400    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    2.3100    1.3300    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0  0  0  0
  2  3  1  0  0  0  0
M  END
";

    fn order_multiset(mol: &Molecule) -> Vec<BondOrder> {
        let mut orders: Vec<_> = mol.bonds().iter().map(|b| b.order).collect();
        orders.sort_unstable();
        orders
    }

    #[test]
    fn parse_counts_line() {
        let mol = parse_molfile(ETHANOL).unwrap();
        assert_eq!(mol.name, "ethanol");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 2);
        assert!(!mol.chiral);
        assert_eq!(mol.atoms()[2].atomic_number(), 8);
        assert!((mol.atoms()[1].position.x - 1.54).abs() < 1e-9);
        assert_eq!(mol.implicit_h(0).unwrap(), 3);
    }

    #[test]
    fn write_layout_is_fixed_width() {
        let mol = parse_molfile(ETHANOL).unwrap();
        let text = write_molfile(&mol).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ethanol");
        assert_eq!(lines[1], "  molkit            2D");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "  3  2  0  0  0  0  0  0  0  0999 V2000");
        assert_eq!(
            lines[4],
            "    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0"
        );
        assert_eq!(lines[7], "  1  2  1  0  0  0  0");
        assert_eq!(*lines.last().unwrap(), "M  END");
        assert_eq!(text, ETHANOL);
    }

    #[test]
    fn atom_block_charge_codes() {
        let text = ETHANOL.replace(
            "2.3100    1.3300    0.0000 O   0  0",
            "2.3100    1.3300    0.0000 O   0  5",
        );
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.atoms()[2].charge, -1);

        let text = ETHANOL.replace(
            "1.5400    0.0000    0.0000 C   0  0",
            "1.5400    0.0000    0.0000 C   0  4",
        );
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.atoms()[1].charge, 0);
        assert_eq!(mol.atoms()[1].radical, Radical::Doublet);
    }

    #[test]
    fn mass_difference_sets_isotope() {
        let text = ETHANOL.replace(
            "0.0000    0.0000    0.0000 C   0  0",
            "0.0000    0.0000    0.0000 C   1  0",
        );
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.atoms()[0].isotope, 13);
    }

    #[test]
    fn property_lines() {
        let text = ETHANOL.replace(
            "M  END",
            "M  CHG  1   3  -1\nM  ISO  1   1  14\nM  RAD  1   2   2\nM  END",
        );
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.atoms()[2].charge, -1);
        assert_eq!(mol.atoms()[0].isotope, 14);
        assert_eq!(mol.atoms()[1].radical, Radical::Doublet);
    }

    #[test]
    fn rsite_and_rgroup_membership() {
        let text = ETHANOL
            .replace("2.3100    1.3300    0.0000 O  ", "2.3100    1.3300    0.0000 R# ")
            .replace("M  END", "M  RGP  2   3   1   3   2\nM  END");
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.atoms()[2].label, AtomLabel::RSite { rgroup_bits: 0b11 });

        let out = write_molfile(&mol).unwrap();
        assert!(out.contains("R# "));
        assert!(out.contains("M  RGP  2   3   1   3   2"));
        let back = parse_molfile(&out).unwrap();
        assert_eq!(back.atoms()[2].label, mol.atoms()[2].label);
    }

    #[test]
    fn unknown_symbol_becomes_pseudo_atom() {
        let text = ETHANOL.replace("0.0000 O  ", "0.0000 Q  ");
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.pseudo_atom_text(2).unwrap(), "Q");
    }

    #[test]
    fn bond_stereo_and_type() {
        let text = ETHANOL.replace("  2  3  1  0", "  2  3  2  6");
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.bonds()[1].order, BondOrder::Double);
        assert_eq!(mol.bonds()[1].stereo, BondStereo::Down);
    }

    #[test]
    fn chiral_flag_round_trips() {
        let text = ETHANOL.replace("  3  2  0  0  0", "  3  2  0  0  1");
        let mol = parse_molfile(&text).unwrap();
        assert!(mol.chiral);
        let out = write_molfile(&mol).unwrap();
        assert!(out.contains("  3  2  0  0  1  0  0  0  0  0999 V2000"));
    }

    #[test]
    fn bond_index_out_of_range() {
        let text = ETHANOL.replace("  2  3  1  0", "  2  9  1  0");
        let err = parse_molfile(&text).unwrap_err();
        match err {
            MolkitError::Molfile { line, .. } => assert_eq!(line, 9),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn truncated_atom_block() {
        let text: String = ETHANOL.lines().take(6).map(|l| format!("{l}\n")).collect();
        let err = parse_molfile(&text).unwrap_err();
        assert!(matches!(err, MolkitError::Molfile { line: 7, .. }), "{err}");
    }

    #[test]
    fn non_numeric_coordinate() {
        let text = ETHANOL.replace("    1.5400", "    1.5x00");
        let err = parse_molfile(&text).unwrap_err();
        assert!(matches!(err, MolkitError::Molfile { line: 6, .. }), "{err}");
    }

    #[test]
    fn v3000_rejected() {
        let text = ETHANOL.replace("0999 V2000", "0999 V3000");
        let err = parse_molfile(&text).unwrap_err();
        assert!(err.to_string().contains("V3000"));
    }

    #[test]
    fn missing_m_end_is_tolerated() {
        let text = ETHANOL.replace("M  END\n", "");
        let mol = parse_molfile(&text).unwrap();
        assert_eq!(mol.bond_count(), 2);
    }

    #[test]
    fn empty_input_is_error() {
        assert!(parse_molfile("").is_err());
        assert!(parse_molfile("\n\n").is_err());
    }

    #[test]
    fn round_trip_from_smiles() {
        for smi in ["CC(=O)O", "c1ccccc1", "C#N", "[NH4+].[Cl-]", "[13CH4]", "C1CC1=C"] {
            let mol = parse_smiles(smi).unwrap();
            let back = parse_molfile(&write_molfile(&mol).unwrap()).unwrap();
            assert_eq!(back.atom_count(), mol.atom_count(), "{smi}");
            assert_eq!(back.bond_count(), mol.bond_count(), "{smi}");
            assert_eq!(order_multiset(&back), order_multiset(&mol), "{smi}");
            for (a, b) in mol.atoms().iter().zip(back.atoms()) {
                assert_eq!(a.label, b.label, "{smi}");
                assert_eq!(a.charge, b.charge, "{smi}");
                assert_eq!(a.isotope, b.isotope, "{smi}");
            }
        }
    }

    #[test]
    fn far_isotope_uses_m_iso() {
        let mut mol = Molecule::new();
        let u = mol.add_atom(92);
        mol.set_atom_isotope(u, 235).unwrap();
        let out = write_molfile(&mol).unwrap();
        assert!(out.contains("M  ISO  1   1 235"));
        assert_eq!(parse_molfile(&out).unwrap().atoms()[0].isotope, 235);
    }

    #[test]
    fn long_pseudo_text_uses_alias() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(6);
        let p = mol.add_pseudo_atom("Boc");
        let q = mol.add_pseudo_atom("Polymer");
        mol.add_bond(c, p, BondOrder::Single).unwrap();
        mol.add_bond(c, q, BondOrder::Single).unwrap();
        let out = write_molfile(&mol).unwrap();
        assert!(out.contains("A  "));
        let back = parse_molfile(&out).unwrap();
        assert_eq!(back.pseudo_atom_text(1).unwrap(), "Boc");
        assert_eq!(back.pseudo_atom_text(2).unwrap(), "Polymer");
    }

    #[test]
    fn too_many_atoms() {
        let mut mol = Molecule::new();
        for _ in 0..1000 {
            mol.add_atom(6);
        }
        assert!(matches!(write_molfile(&mol), Err(MolkitError::InvalidInput(_))));
    }

    #[test]
    fn sgroups_round_trip() {
        let mut mol = parse_smiles("CC(=O)OCC").unwrap();
        let mut sup = SGroup::superatom("OEt", &[3, 4, 5]);
        if let SGroupKind::Superatom(Superatom { attachment_points, .. }) = &mut sup.kind {
            attachment_points.push(AttachmentPoint {
                atom: 3,
                leaving_atom: Some(1),
                id: "1".into(),
            });
        }
        sup.bonds = vec![2];
        mol.add_sgroup(sup).unwrap();

        let mut data = SGroup::new(SGroupKind::Data(DataField {
            name: "pKa".into(),
            field_type: "N".into(),
            units: "log".into(),
            value: "4.76".into(),
        }))
        .with_atoms(&[2, 3]);
        data.display = DisplayOption::Expanded;
        mol.add_sgroup(data).unwrap();

        let mut sru = SGroup::sru("n").with_atoms(&[0, 1]);
        sru.subtype = SGroupSubtype::Alternating;
        if let SGroupKind::Sru(s) = &mut sru.kind {
            s.connectivity = Some(SruConnectivity::HeadToTail);
        }
        mol.add_sgroup(sru).unwrap();

        let out = write_molfile(&mol).unwrap();
        assert!(out.contains("M  STY  3   1 SUP   2 DAT   3 SRU"));
        let back = parse_molfile(&out).unwrap();
        assert_eq!(back.sgroups().len(), 3);

        let (group, sa) = back.sgroups().superatoms().next().unwrap();
        assert_eq!(sa.label, "OEt");
        assert_eq!(group.atoms, vec![3, 4, 5]);
        assert_eq!(group.bonds, vec![2]);
        assert_eq!(sa.attachment_points[0].leaving_atom, Some(1));
        assert_eq!(sa.attachment_points[0].id, "1");

        let (group, field) = back.sgroups().data_groups().next().unwrap();
        assert_eq!(field.name, "pKa");
        assert_eq!(field.field_type, "N");
        assert_eq!(field.units, "log");
        assert_eq!(field.value, "4.76");
        assert_eq!(group.display, DisplayOption::Expanded);

        let (group, s) = back.sgroups().sru_groups().next().unwrap();
        assert_eq!(group.subtype, SGroupSubtype::Alternating);
        assert_eq!(s.connectivity, Some(SruConnectivity::HeadToTail));
        assert_eq!(s.subscript, "n");
    }

    #[test]
    fn sgroup_line_before_declaration() {
        let text = ETHANOL.replace("M  END", "M  SAL   1  2   1   2\nM  END");
        let err = parse_molfile(&text).unwrap_err();
        assert!(err.to_string().contains("not declared"), "{err}");
    }

    #[test]
    fn stops_before_record_separator() {
        let text = ETHANOL.replace("M  END\n", "$$$$\n");
        let mut lines = LineReader::new(text.as_bytes());
        let mol = read_molecule(&mut lines).unwrap().unwrap();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("$$$$"));
    }

    #[test]
    fn separator_inside_atom_block_is_left_unread() {
        let text = ETHANOL.replacen("  3  2  0", "  4  2  0", 1).replace("M  END\n", "");
        let cut = text.find("    1.5400").unwrap();
        let text = format!("{}$$$$\nnext\n", &text[..cut]);
        let mut lines = LineReader::new(text.as_bytes());
        match read_molecule(&mut lines) {
            Err(MolkitError::Molfile { line, message }) => {
                assert_eq!(line, 6);
                assert!(message.contains("atom line"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("$$$$"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn data_header_ends_property_block() {
        let text = ETHANOL.replace("M  END\n", "M  CHG  1   3  -1\n> <ID>\n7\n");
        let mut lines = LineReader::new(text.as_bytes());
        let mol = read_molecule(&mut lines).unwrap().unwrap();
        assert_eq!(mol.atoms()[2].charge, -1);
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("> <ID>"));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ethanol.mol");
        let mol = parse_molfile(ETHANOL).unwrap();
        save_molfile(&mol, &path).unwrap();
        let back = load_molfile(&path).unwrap();
        assert_eq!(back.name, "ethanol");
        assert_eq!(back.atom_count(), 3);
        assert!(load_molfile(dir.path().join("missing.mol")).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parser_never_panics(text in "\\PC{0,400}") {
            let _ = parse_molfile(&text);
        }

        #[test]
        fn parser_never_panics_on_molfile_like_lines(
            lines in proptest::collection::vec("[ 0-9A-Z#.$M-]{0,70}", 0..16)
        ) {
            let _ = parse_molfile(&lines.join("\n"));
        }

        #[test]
        fn chain_round_trip(orders in proptest::collection::vec(1u8..=3, 1..40)) {
            let mut mol = Molecule::new();
            let mut prev = mol.add_atom(6);
            for &code in &orders {
                let next = mol.add_atom(6);
                mol.add_bond(prev, next, BondOrder::from_code(code)).unwrap();
                prev = next;
            }
            let back = parse_molfile(&write_molfile(&mol).unwrap()).unwrap();
            prop_assert_eq!(back.atom_count(), mol.atom_count());
            let codes: Vec<u8> = back.bonds().iter().map(|b| b.order.code()).collect();
            prop_assert_eq!(codes, orders);
        }
    }
}
