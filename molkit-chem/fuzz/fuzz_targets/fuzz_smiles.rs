#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(mol) = molkit_chem::parse_smiles(data) {
        let _ = molkit_chem::write_smiles(&mol);
    }
});
