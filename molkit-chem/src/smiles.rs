//! SMILES string parser.
//!
//! A single left-to-right pass builds the [`Molecule`] directly. Errors
//! carry the character offset of the offending token.

use std::collections::BTreeMap;

use molkit_core::{CancelToken, MolkitError, Result};

use crate::element::element_by_symbol;
use crate::molecule::{Atom, AtomLabel, BondOrder, BondStereo, Molecule};

/// Parse a SMILES string into a `Molecule`.
pub fn parse_smiles(smiles: &str) -> Result<Molecule> {
    parse_smiles_named(smiles, "")
}

/// Parse a SMILES string into a `Molecule` with a given name.
pub fn parse_smiles_named(smiles: &str, name: &str) -> Result<Molecule> {
    let mut parser = SmilesParser::new(smiles, name, None);
    parser.parse()?;
    parser.finish()
}

/// Parse a SMILES string, aborting with [`MolkitError::Cancelled`] once
/// `cancel` fires.
pub fn parse_smiles_cancellable(smiles: &str, cancel: &CancelToken) -> Result<Molecule> {
    let mut parser = SmilesParser::new(smiles, "", Some(cancel));
    parser.parse()?;
    parser.finish()
}

/// A ring-bond digit seen once and waiting for its partner.
struct OpenRing {
    atom: usize,
    order: Option<BondOrder>,
    stereo: BondStereo,
    offset: usize,
}

struct SmilesParser<'a> {
    text: &'a str,
    input: &'a [u8],
    pos: usize,
    mol: Molecule,
    /// Per atom: written with a lowercase (aromatic) symbol.
    aromatic: Vec<bool>,
    ring_bonds: BTreeMap<u16, OpenRing>,
    /// Stack of atom indices for branch handling
    stack: Vec<usize>,
    /// Index of the previous atom (for bonding)
    prev_atom: Option<usize>,
    /// Pending bond order for the next bond
    pending_bond: Option<BondOrder>,
    pending_stereo: BondStereo,
    cancel: Option<&'a CancelToken>,
}

impl<'a> SmilesParser<'a> {
    fn new(input: &'a str, name: &str, cancel: Option<&'a CancelToken>) -> Self {
        SmilesParser {
            text: input,
            input: input.as_bytes(),
            pos: 0,
            mol: Molecule::named(name),
            aromatic: Vec::new(),
            ring_bonds: BTreeMap::new(),
            stack: Vec::new(),
            prev_atom: None,
            pending_bond: None,
            pending_stereo: BondStereo::None,
            cancel,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Error located at byte position `at`, reported as a character offset.
    fn error(&self, at: usize, message: impl Into<String>) -> MolkitError {
        let offset = self.text.get(..at).map_or(at, |s| s.chars().count());
        MolkitError::smiles(offset, message)
    }

    fn parse(&mut self) -> Result<()> {
        while let Some(ch) = self.peek() {
            if let Some(token) = self.cancel {
                token.check()?;
            }
            let start = self.pos;
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'(' => {
                    self.advance();
                    let prev = self
                        .prev_atom
                        .ok_or_else(|| self.error(start, "branch without preceding atom"))?;
                    self.stack.push(prev);
                }
                b')' => {
                    self.advance();
                    let top = self
                        .stack
                        .pop()
                        .ok_or_else(|| self.error(start, "unbalanced ')'"))?;
                    self.prev_atom = Some(top);
                    self.pending_bond = None;
                    self.pending_stereo = BondStereo::None;
                }
                b'-' => self.set_pending(start, BondOrder::Single, BondStereo::None)?,
                b'=' => self.set_pending(start, BondOrder::Double, BondStereo::None)?,
                b'#' => self.set_pending(start, BondOrder::Triple, BondStereo::None)?,
                b':' => self.set_pending(start, BondOrder::Aromatic, BondStereo::None)?,
                b'/' => self.set_pending(start, BondOrder::Single, BondStereo::Up)?,
                b'\\' => self.set_pending(start, BondOrder::Single, BondStereo::Down)?,
                b'.' => {
                    // Disconnected fragments
                    self.advance();
                    self.prev_atom = None;
                    self.pending_bond = None;
                    self.pending_stereo = BondStereo::None;
                }
                b'%' => {
                    self.advance();
                    let ring_num = self.parse_two_digit_ring(start)?;
                    self.handle_ring_bond(ring_num, start)?;
                }
                b'0'..=b'9' => {
                    self.advance();
                    self.handle_ring_bond(u16::from(ch - b'0'), start)?;
                }
                b'[' => self.parse_bracket_atom()?,
                b'*' => {
                    self.advance();
                    let atom = Atom::new(AtomLabel::Pseudo("*".into()));
                    self.push_atom(atom, false, start)?;
                }
                ch if ch.is_ascii_alphabetic() => self.parse_bare_atom()?,
                _ => {
                    let shown = self.text.get(start..).and_then(|s| s.chars().next()).unwrap_or('?');
                    return Err(self.error(start, format!("unexpected character '{shown}'")));
                }
            }
        }
        Ok(())
    }

    fn set_pending(&mut self, start: usize, order: BondOrder, stereo: BondStereo) -> Result<()> {
        self.advance();
        if self.prev_atom.is_none() {
            return Err(self.error(start, "bond without preceding atom"));
        }
        self.pending_bond = Some(order);
        self.pending_stereo = stereo;
        Ok(())
    }

    fn parse_bare_atom(&mut self) -> Result<()> {
        let start = self.pos;
        let Some(ch) = self.advance() else {
            return Err(self.error(start, "unexpected end of SMILES"));
        };

        if ch.is_ascii_lowercase() {
            let number = aromatic_atomic_number(ch)
                .ok_or_else(|| self.error(start, format!("unknown aromatic atom '{}'", ch as char)))?;
            return self.push_atom(Atom::element(number), true, start);
        }

        // A following lowercase letter belongs to this symbol unless it
        // starts an aromatic atom of its own ("Cc", "Sc", "Cn").
        let mut symbol = String::from(ch as char);
        if let Some(next) = self.peek() {
            if next.is_ascii_lowercase() && aromatic_atomic_number(next).is_none() {
                symbol.push(next as char);
                if element_by_symbol(&symbol).is_some() {
                    self.advance();
                } else {
                    symbol.pop();
                }
            }
        }

        let elem = element_by_symbol(&symbol)
            .ok_or_else(|| self.error(start, format!("unknown element '{symbol}'")))?;
        self.push_atom(Atom::element(elem.atomic_number), false, start)
    }

    fn parse_bracket_atom(&mut self) -> Result<()> {
        let start = self.pos;
        if !self.input[start..].contains(&b']') {
            return Err(self.error(start, "unclosed bracket atom"));
        }
        self.advance(); // consume '['

        // Optional isotope
        let isotope = match self.parse_optional_number() {
            Some(n) => u16::try_from(n).map_err(|_| self.error(start, "isotope out of range"))?,
            None => 0,
        };

        let sym_start = self.pos;
        let ch = self
            .advance()
            .ok_or_else(|| self.error(sym_start, "unexpected end of SMILES in bracket atom"))?;

        let (label, is_aromatic) = if ch == b'*' {
            (AtomLabel::Pseudo("*".into()), false)
        } else if ch.is_ascii_lowercase() {
            let number = match (ch, self.peek()) {
                (b's', Some(b'e')) => {
                    self.advance();
                    34
                }
                (b'a', Some(b's')) => {
                    self.advance();
                    33
                }
                _ => aromatic_atomic_number(ch).ok_or_else(|| {
                    self.error(sym_start, format!("unknown aromatic atom '{}'", ch as char))
                })?,
            };
            (AtomLabel::Element(number), true)
        } else if ch.is_ascii_uppercase() {
            let mut symbol = String::from(ch as char);
            if let Some(next) = self.peek().filter(u8::is_ascii_lowercase) {
                self.advance();
                symbol.push(next as char);
            }
            match element_by_symbol(&symbol) {
                Some(elem) => (AtomLabel::Element(elem.atomic_number), false),
                None => {
                    log::warn!("unknown element '{symbol}' at offset {sym_start}, using pseudo atom");
                    (AtomLabel::Pseudo(symbol), false)
                }
            }
        } else {
            return Err(self.error(sym_start, "expected element symbol in bracket atom"));
        };

        // Chirality is not perceived; skip '@', '@@'
        while self.peek() == Some(b'@') {
            self.advance();
        }

        // Optional hydrogen count
        let mut explicit_h = 0u8;
        if self.peek() == Some(b'H') {
            self.advance();
            explicit_h = match self.peek() {
                Some(d) if d.is_ascii_digit() => {
                    self.advance();
                    d - b'0'
                }
                _ => 1,
            };
        }

        let charge = self.parse_charge()?;

        // Atom class, e.g. [CH3:1]; not retained
        if self.peek() == Some(b':') {
            self.advance();
            self.parse_optional_number();
        }

        // Closing bracket
        if self.peek() != Some(b']') {
            return Err(self.error(self.pos, "expected ']' in bracket atom"));
        }
        self.advance();

        let is_element = matches!(label, AtomLabel::Element(_));
        let mut atom = Atom::new(label);
        atom.isotope = isotope;
        atom.charge = charge;
        if is_element {
            // bracket atoms specify H explicitly
            atom.explicit_implicit_h = Some(explicit_h);
        }
        self.push_atom(atom, is_aromatic, start)
    }

    fn parse_charge(&mut self) -> Result<i8> {
        let start = self.pos;
        let sign: i8 = match self.peek() {
            Some(b'+') => 1,
            Some(b'-') => -1,
            _ => return Ok(0),
        };
        let symbol = self.advance();
        if let Some(n) = self.parse_optional_number() {
            let magnitude = i8::try_from(n).map_err(|_| self.error(start, "charge out of range"))?;
            return Ok(sign * magnitude);
        }
        // Count consecutive signs: "++" = +2
        let mut magnitude = 1i8;
        while self.peek() == symbol {
            self.advance();
            magnitude = magnitude
                .checked_add(1)
                .ok_or_else(|| self.error(start, "charge out of range"))?;
        }
        Ok(sign * magnitude)
    }

    fn parse_optional_number(&mut self) -> Option<u32> {
        let mut n: u32 = 0;
        let mut found = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
                n = n.saturating_mul(10).saturating_add(u32::from(ch - b'0'));
                found = true;
            } else {
                break;
            }
        }
        if found { Some(n) } else { None }
    }

    fn parse_two_digit_ring(&mut self, start: usize) -> Result<u16> {
        match (self.advance(), self.advance()) {
            (Some(d1), Some(d2)) if d1.is_ascii_digit() && d2.is_ascii_digit() => {
                Ok(u16::from(d1 - b'0') * 10 + u16::from(d2 - b'0'))
            }
            _ => Err(self.error(start, "expected two digits after '%'")),
        }
    }

    fn handle_ring_bond(&mut self, ring_num: u16, start: usize) -> Result<()> {
        let current = self
            .prev_atom
            .ok_or_else(|| self.error(start, "ring bond without preceding atom"))?;

        if let Some(open) = self.ring_bonds.remove(&ring_num) {
            // Close the ring
            let order = self.pending_bond.take().or(open.order).unwrap_or_else(|| {
                self.default_order(open.atom, current)
            });
            let stereo = match std::mem::take(&mut self.pending_stereo) {
                BondStereo::None => open.stereo,
                s => s,
            };
            self.add_bond(open.atom, current, order, stereo, start)?;
        } else {
            // Open a ring bond
            let open = OpenRing {
                atom: current,
                order: self.pending_bond.take(),
                stereo: std::mem::take(&mut self.pending_stereo),
                offset: start,
            };
            self.ring_bonds.insert(ring_num, open);
        }
        Ok(())
    }

    fn push_atom(&mut self, atom: Atom, is_aromatic: bool, start: usize) -> Result<()> {
        let atom_idx = self.mol.push_atom(atom);
        self.aromatic.push(is_aromatic);
        if let Some(prev) = self.prev_atom {
            let order = self
                .pending_bond
                .take()
                .unwrap_or_else(|| self.default_order(prev, atom_idx));
            let stereo = std::mem::take(&mut self.pending_stereo);
            self.add_bond(prev, atom_idx, order, stereo, start)?;
        }
        self.prev_atom = Some(atom_idx);
        Ok(())
    }

    fn default_order(&self, a: usize, b: usize) -> BondOrder {
        if self.aromatic[a] && self.aromatic[b] {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn add_bond(
        &mut self,
        a: usize,
        b: usize,
        order: BondOrder,
        stereo: BondStereo,
        start: usize,
    ) -> Result<()> {
        let bi = self
            .mol
            .add_bond(a, b, order)
            .map_err(|e| self.error(start, e.to_string()))?;
        if stereo != BondStereo::None {
            self.mol.set_bond_stereo(bi, stereo)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<Molecule> {
        if let Some(open) = self.ring_bonds.values().min_by_key(|r| r.offset) {
            return Err(self.error(open.offset, "unclosed ring bonds"));
        }
        if !self.stack.is_empty() {
            log::warn!("{} unclosed branch(es) at end of SMILES '{}'", self.stack.len(), self.text);
        }
        if self.pending_bond.is_some() {
            log::warn!("dangling bond symbol at end of SMILES '{}'", self.text);
        }
        log::debug!(
            "parsed SMILES: {} atoms, {} bonds",
            self.mol.atom_count(),
            self.mol.bond_count()
        );
        Ok(self.mol)
    }
}

/// Lowercase organic-subset symbols.
fn aromatic_atomic_number(ch: u8) -> Option<u8> {
    match ch {
        b'b' => Some(5),
        b'c' => Some(6),
        b'n' => Some(7),
        b'o' => Some(8),
        b'p' => Some(15),
        b's' => Some(16),
        _ => None,
    }
}
