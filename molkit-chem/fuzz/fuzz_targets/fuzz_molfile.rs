#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(mol) = molkit_chem::parse_molfile(data) {
        let _ = molkit_chem::write_molfile(&mol);
    }
    for record in molkit_chem::SdfReader::new(data.as_bytes()).take(16) {
        let _ = record;
    }
});
