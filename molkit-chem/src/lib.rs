//! Small-molecule graphs, file codecs, and fingerprints.
//!
//! Provides a molecular graph with lazily derived connectivity, SMILES
//! reading and writing, MDL Molfile V2000 and SDF codecs (including
//! S-groups), path and ECFP fingerprints with similarity metrics, and a
//! quick SVG depiction.
//!
//! # Example
//!
//! ```
//! use molkit_chem::{morgan_fingerprint, parse_smiles, tanimoto_similarity, write_smiles};
//!
//! // Parse ethanol from SMILES
//! let ethanol = parse_smiles("CCO").unwrap();
//! assert_eq!(ethanol.atom_count(), 3);
//! assert_eq!(write_smiles(&ethanol).unwrap(), "[CH3][CH2][OH]");
//!
//! // Generate fingerprints and compare
//! let fp1 = morgan_fingerprint(&ethanol, 2, 2048).unwrap();
//! let fp2 = morgan_fingerprint(&ethanol, 2, 2048).unwrap();
//! assert!((tanimoto_similarity(&fp1, &fp2).unwrap() - 1.0).abs() < 1e-10);
//! ```

pub mod element;
pub mod fingerprint;
pub mod molecule;
pub mod molfile;
pub mod render;
pub mod sdf;
pub mod sgroup;
pub mod smiles;
pub mod smiles_writer;

mod line_reader;

pub use element::{element_by_number, element_by_symbol, Element};
pub use fingerprint::{
    cosine_similarity, dice_similarity, euclidean_distance, fingerprint, fingerprint_bulk,
    hamming_distance, morgan_fingerprint, tanimoto_bulk, tanimoto_similarity, Fingerprint,
    FingerprintBuilder, FingerprintParams, FingerprintType,
};
pub use molecule::{Atom, AtomLabel, Bond, BondOrder, BondStereo, Molecule, Point3D, Radical};
pub use molfile::{parse_molfile, read_molfile, write_molfile, write_molfile_to};
pub use render::{circular_layout, render_svg};
pub use sdf::{count_sdf_records, parse_sdf, SdfReader, SdfRecord, SdfWriter};
pub use sgroup::{SGroup, SGroupKind, SGroupSet, SGroupType};
pub use smiles::{parse_smiles, parse_smiles_cancellable, parse_smiles_named};
pub use smiles_writer::write_smiles;

#[cfg(feature = "std")]
pub use molfile::{load_molfile, save_molfile};
#[cfg(feature = "std")]
pub use render::save_svg;
#[cfg(feature = "std")]
pub use sdf::{parse_sdf_file, read_sdf_file, write_sdf_file};
