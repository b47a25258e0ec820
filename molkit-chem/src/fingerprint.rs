//! Molecular fingerprints and similarity.
//!
//! Two generators share one bit-vector type: linear paths of bonded atoms
//! (Daylight-like) and Morgan/ECFP circular environments. Every feature is
//! hashed with 32-bit FNV-1a and sets two bits.

use molkit_core::{CancelToken, ContentAddressable, MolkitError, Result};

use crate::molecule::{AtomLabel, Molecule};

/// Bits set per hashed feature.
const BITS_PER_FEATURE: u32 = 2;
/// Golden-ratio stride between the bits of one feature.
const BIT_STRIDE: u32 = 0x9e37_79b9;

/// Fingerprint generation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FingerprintType {
    /// Linear paths of bonded atoms.
    #[default]
    Path,
    /// Circular environments of radius 1.
    Ecfp2,
    /// Radius 2.
    Ecfp4,
    /// Radius 3.
    Ecfp6,
}

impl FingerprintType {
    /// Morgan radius, or `None` for path fingerprints.
    pub fn radius(self) -> Option<usize> {
        match self {
            FingerprintType::Path => None,
            FingerprintType::Ecfp2 => Some(1),
            FingerprintType::Ecfp4 => Some(2),
            FingerprintType::Ecfp6 => Some(3),
        }
    }

    /// ECFP type for a Morgan radius of 1, 2 or 3.
    pub fn ecfp(radius: usize) -> Option<Self> {
        match radius {
            1 => Some(FingerprintType::Ecfp2),
            2 => Some(FingerprintType::Ecfp4),
            3 => Some(FingerprintType::Ecfp6),
            _ => None,
        }
    }
}

/// Fingerprint generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FingerprintParams {
    pub fp_type: FingerprintType,
    /// Length in bits.
    pub size: usize,
    /// Shortest path, counted in atoms. Path fingerprints only.
    pub min_path: usize,
    /// Longest path, counted in atoms. Path fingerprints only.
    pub max_path: usize,
}

impl Default for FingerprintParams {
    fn default() -> Self {
        FingerprintParams {
            fp_type: FingerprintType::Path,
            size: 2048,
            min_path: 1,
            max_path: 7,
        }
    }
}

impl FingerprintParams {
    pub fn ecfp(fp_type: FingerprintType, size: usize) -> Self {
        FingerprintParams { fp_type, size, ..Self::default() }
    }

    fn validate(&self) -> Result<()> {
        if self.size == 0 || u32::try_from(self.size).is_err() {
            return Err(MolkitError::InvalidInput(format!(
                "fingerprint size must be in 1..={}, got {}",
                u32::MAX,
                self.size
            )));
        }
        Ok(())
    }
}

/// A fixed-size bit vector fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fingerprint {
    bits: Vec<u64>,
    nbits: usize,
    fp_type: FingerprintType,
}

impl Fingerprint {
    /// An all-zero fingerprint of `nbits` bits (stored in whole 64-bit words).
    pub fn new(nbits: usize, fp_type: FingerprintType) -> Self {
        Fingerprint {
            bits: vec![0u64; (nbits + 63) / 64],
            nbits,
            fp_type,
        }
    }

    /// Set a bit; positions past the end are ignored.
    pub fn set_bit(&mut self, pos: usize) {
        if pos < self.nbits {
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
    }

    /// Get a bit; positions past the end read as unset.
    pub fn get_bit(&self, pos: usize) -> bool {
        pos < self.nbits && (self.bits[pos / 64] >> (pos % 64)) & 1 == 1
    }

    /// Count the number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// Number of bits in the fingerprint.
    pub fn nbits(&self) -> usize {
        self.nbits
    }

    pub fn fp_type(&self) -> FingerprintType {
        self.fp_type
    }

    /// Backing words, least significant bit first.
    pub fn words(&self) -> &[u64] {
        &self.bits
    }

    /// Positions of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nbits).filter(|&pos| self.get_bit(pos))
    }

    fn set_bits_from_hash(&mut self, hash: u32) {
        let size = self.nbits as u32;
        for i in 0..BITS_PER_FEATURE {
            let seed = hash.wrapping_add(i.wrapping_mul(BIT_STRIDE));
            self.set_bit((seed % size) as usize);
        }
    }

    /// Hex form: each word as 8 little-endian bytes, two digits per byte.
    pub fn to_hex(&self) -> String {
        self.bits.iter().map(|w| hex::encode(w.to_le_bytes())).collect()
    }

    /// Inverse of [`to_hex`](Self::to_hex).
    pub fn from_hex(text: &str, nbits: usize, fp_type: FingerprintType) -> Result<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| MolkitError::Parse(format!("invalid fingerprint hex: {e}")))?;
        let mut fp = Fingerprint::new(nbits, fp_type);
        if bytes.len() != fp.bits.len() * 8 {
            return Err(MolkitError::InvalidInput(format!(
                "{} hex bytes cannot hold a {nbits}-bit fingerprint",
                bytes.len()
            )));
        }
        for (word, chunk) in fp.bits.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut le = [0u8; 8];
            le.copy_from_slice(chunk);
            *word = u64::from_le_bytes(le);
        }
        Ok(fp)
    }
}

impl ContentAddressable for Fingerprint {
    fn content_hash(&self) -> String {
        let bytes: Vec<[u8; 8]> = self.bits.iter().map(|w| w.to_le_bytes()).collect();
        molkit_core::hash::sha256_chunks(bytes.iter().map(|b| b.as_slice()))
    }
}

/// Builds a fingerprint for one molecule.
///
/// ```
/// use molkit_chem::{parse_smiles, FingerprintBuilder, FingerprintParams, FingerprintType};
///
/// let mol = parse_smiles("c1ccccc1O").unwrap();
/// let params = FingerprintParams::ecfp(FingerprintType::Ecfp4, 1024);
/// let fp = FingerprintBuilder::new(&mol, params).build().unwrap();
/// assert_eq!(fp.nbits(), 1024);
/// assert!(fp.count_ones() > 0);
/// ```
pub struct FingerprintBuilder<'a> {
    mol: &'a Molecule,
    params: FingerprintParams,
    cancel: Option<&'a CancelToken>,
}

impl<'a> FingerprintBuilder<'a> {
    pub fn new(mol: &'a Molecule, params: FingerprintParams) -> Self {
        FingerprintBuilder { mol, params, cancel: None }
    }

    /// Abort with [`MolkitError::Cancelled`] once `token` fires.
    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(&self) -> Result<Fingerprint> {
        self.params.validate()?;
        self.check_cancel()?;
        let mut fp = Fingerprint::new(self.params.size, self.params.fp_type);
        match self.params.fp_type.radius() {
            None => self.build_paths(&mut fp)?,
            Some(radius) => self.build_ecfp(&mut fp, radius)?,
        }
        log::debug!(
            "{:?} fingerprint of '{}': {} of {} bits set",
            self.params.fp_type,
            self.mol.name,
            fp.count_ones(),
            fp.nbits()
        );
        Ok(fp)
    }

    fn check_cancel(&self) -> Result<()> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    // ---- path fingerprint ----

    fn build_paths(&self, fp: &mut Fingerprint) -> Result<()> {
        let n = self.mol.atom_count();
        let mut visited = vec![false; n];
        // (atom, bond that reached it)
        let mut path: Vec<(usize, Option<usize>)> = Vec::with_capacity(self.params.max_path);
        for length in self.params.min_path.max(1)..=self.params.max_path {
            for start in 0..n {
                path.push((start, None));
                self.extend_path(fp, &mut path, &mut visited, length)?;
                path.pop();
            }
        }
        Ok(())
    }

    /// Depth-first extension of `path` to every simple path of `length` atoms.
    fn extend_path(
        &self,
        fp: &mut Fingerprint,
        path: &mut Vec<(usize, Option<usize>)>,
        visited: &mut [bool],
        length: usize,
    ) -> Result<()> {
        if path.len() == length {
            fp.set_bits_from_hash(self.hash_path(path));
            return Ok(());
        }
        self.check_cancel()?;
        let Some(&(current, _)) = path.last() else {
            return Ok(());
        };
        visited[current] = true;
        for &(next, bond) in self.mol.edges(current) {
            if visited[next] {
                continue;
            }
            path.push((next, Some(bond)));
            let extended = self.extend_path(fp, path, visited, length);
            path.pop();
            if extended.is_err() {
                visited[current] = false;
                return extended;
            }
        }
        visited[current] = false;
        Ok(())
    }

    fn hash_path(&self, path: &[(usize, Option<usize>)]) -> u32 {
        let atoms = self.mol.atoms();
        let bonds = self.mol.bonds();
        let mut h = fnv1a_init();
        for &(atom, bond) in path {
            h = fnv1a_update(h, &[atoms[atom].atomic_number() as u8]);
            if let Some(bond) = bond {
                h = fnv1a_update(h, &[bonds[bond].order.code()]);
            }
        }
        h
    }

    // ---- ECFP ----

    fn build_ecfp(&self, fp: &mut Fingerprint, radius: usize) -> Result<()> {
        let n = self.mol.atom_count();
        let mut identifiers = (0..n)
            .map(|i| self.initial_identifier(i))
            .collect::<Result<Vec<u32>>>()?;

        for round in 0..=radius {
            for &id in &identifiers {
                fp.set_bits_from_hash(id);
            }
            if round < radius {
                self.check_cancel()?;
                identifiers = (0..n).map(|i| self.next_identifier(i, &identifiers)).collect();
            }
        }
        Ok(())
    }

    /// Atomic number, heavy degree, total connectivity and charge.
    fn initial_identifier(&self, idx: usize) -> Result<u32> {
        let atoms = self.mol.atoms();
        let atom = &atoms[idx];
        let edges = self.mol.edges(idx);
        let explicit_h = edges.iter().filter(|&&(n, _)| atoms[n].is_hydrogen()).count();
        let heavy = edges.len() - explicit_h;
        let implicit_h = match atom.label {
            AtomLabel::Element(_) => usize::from(self.mol.implicit_h(idx)?),
            _ => 0,
        };
        let connectivity = edges.len() + implicit_h + explicit_h;

        let mut h = fnv1a_init();
        h = fnv1a_update(h, &atom.atomic_number().to_le_bytes());
        h = fnv1a_update(h, &[heavy as u8]);
        h = fnv1a_update(h, &[connectivity as u8]);
        h = fnv1a_update(h, &[(i16::from(atom.charge) + 128) as u8]);
        Ok(h)
    }

    fn next_identifier(&self, idx: usize, current: &[u32]) -> u32 {
        let mut neighbor_ids: Vec<u32> = self
            .mol
            .edges(idx)
            .iter()
            .map(|&(n, _)| current[n])
            .collect();
        neighbor_ids.sort_unstable();

        let mut h = fnv1a_update(fnv1a_init(), &current[idx].to_le_bytes());
        for nid in neighbor_ids {
            h = fnv1a_update(h, &nid.to_le_bytes());
        }
        h
    }
}

/// Build a fingerprint with the given parameters.
pub fn fingerprint(mol: &Molecule, params: &FingerprintParams) -> Result<Fingerprint> {
    FingerprintBuilder::new(mol, *params).build()
}

/// Compute a Morgan (ECFP) fingerprint.
///
/// `radius` selects ECFP2/4/6 (1, 2 or 3). `nbits` is the fingerprint
/// length (commonly 2048).
pub fn morgan_fingerprint(mol: &Molecule, radius: usize, nbits: usize) -> Result<Fingerprint> {
    let fp_type = FingerprintType::ecfp(radius).ok_or_else(|| {
        MolkitError::InvalidInput(format!("Morgan radius must be 1, 2 or 3, got {radius}"))
    })?;
    fingerprint(mol, &FingerprintParams::ecfp(fp_type, nbits))
}

/// Fingerprint many molecules; parallel with the `parallel` feature.
pub fn fingerprint_bulk(mols: &[Molecule], params: &FingerprintParams) -> Vec<Result<Fingerprint>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        mols.par_iter().map(|mol| fingerprint(mol, params)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    mols.iter().map(|mol| fingerprint(mol, params)).collect()
}

// ---- similarity ----

/// Popcounts of A∩B, A and B.
fn overlap(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<(u32, u32, u32)> {
    if fp1.nbits != fp2.nbits {
        return Err(MolkitError::LengthMismatch { left: fp1.nbits, right: fp2.nbits });
    }
    let both = fp1
        .bits
        .iter()
        .zip(&fp2.bits)
        .map(|(w1, w2)| (w1 & w2).count_ones())
        .sum();
    Ok((both, fp1.count_ones(), fp2.count_ones()))
}

/// Tanimoto coefficient |A∩B| / |A∪B|. Two empty fingerprints score 0.0.
pub fn tanimoto_similarity(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<f64> {
    let (both, a, b) = overlap(fp1, fp2)?;
    let union = a + b - both;
    if union == 0 {
        return Ok(0.0);
    }
    Ok(f64::from(both) / f64::from(union))
}

/// Dice coefficient 2|A∩B| / (|A| + |B|). Two empty fingerprints score 0.0.
pub fn dice_similarity(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<f64> {
    let (both, a, b) = overlap(fp1, fp2)?;
    if a + b == 0 {
        return Ok(0.0);
    }
    Ok(2.0 * f64::from(both) / f64::from(a + b))
}

/// Cosine similarity |A∩B| / √(|A|·|B|); 0.0 when either side is empty.
pub fn cosine_similarity(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<f64> {
    let (both, a, b) = overlap(fp1, fp2)?;
    if a == 0 || b == 0 {
        return Ok(0.0);
    }
    Ok(f64::from(both) / (f64::from(a) * f64::from(b)).sqrt())
}

/// Number of differing bits.
pub fn hamming_distance(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<u32> {
    if fp1.nbits != fp2.nbits {
        return Err(MolkitError::LengthMismatch { left: fp1.nbits, right: fp2.nbits });
    }
    Ok(fp1
        .bits
        .iter()
        .zip(&fp2.bits)
        .map(|(w1, w2)| (w1 ^ w2).count_ones())
        .sum())
}

/// √Hamming.
pub fn euclidean_distance(fp1: &Fingerprint, fp2: &Fingerprint) -> Result<f64> {
    Ok(f64::from(hamming_distance(fp1, fp2)?).sqrt())
}

/// Tanimoto similarity of a query against multiple targets.
pub fn tanimoto_bulk(query: &Fingerprint, targets: &[Fingerprint]) -> Result<Vec<f64>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        targets.par_iter().map(|t| tanimoto_similarity(query, t)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    targets.iter().map(|t| tanimoto_similarity(query, t)).collect()
}

// FNV-1a (32-bit)
const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a_init() -> u32 {
    FNV_OFFSET
}

fn fnv1a_update(hash: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(hash, |h, &b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::smiles::parse_smiles;
    use proptest::prelude::*;

    fn arb_fingerprint(nbits: usize) -> impl Strategy<Value = Fingerprint> {
        proptest::collection::vec(0..nbits, 0..64).prop_map(move |positions| {
            let mut fp = Fingerprint::new(nbits, FingerprintType::Path);
            for pos in positions {
                fp.set_bit(pos);
            }
            fp
        })
    }

    proptest! {
        #[test]
        fn similarity_bounds(a in arb_fingerprint(256), b in arb_fingerprint(256)) {
            for sim in [
                tanimoto_similarity(&a, &b).unwrap(),
                dice_similarity(&a, &b).unwrap(),
                cosine_similarity(&a, &b).unwrap(),
            ] {
                prop_assert!((0.0..=1.0 + 1e-12).contains(&sim));
            }
            prop_assert_eq!(
                tanimoto_similarity(&a, &b).unwrap(),
                tanimoto_similarity(&b, &a).unwrap()
            );
            let hamming = hamming_distance(&a, &b).unwrap();
            prop_assert!(hamming as usize <= 256);
            let euclid = euclidean_distance(&a, &b).unwrap();
            prop_assert!((euclid * euclid - f64::from(hamming)).abs() < 1e-9);
        }

        #[test]
        fn fingerprint_determinism(chain in "[CNO]{1,12}", radius in 1usize..=3) {
            let mol = parse_smiles(&chain).unwrap();
            let a = morgan_fingerprint(&mol, radius, 512).unwrap();
            let b = morgan_fingerprint(&mol.clone(), radius, 512).unwrap();
            prop_assert_eq!(&a, &b);
            let reversed: String = chain.chars().rev().collect();
            let c = morgan_fingerprint(&parse_smiles(&reversed).unwrap(), radius, 512).unwrap();
            prop_assert_eq!(&a, &c);
        }
    }
}
