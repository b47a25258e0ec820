//! Periodic table data and element lookup.

use molkit_core::{MolkitError, Result};

/// A chemical element from the periodic table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub atomic_number: u8,
    pub symbol: &'static str,
    pub name: &'static str,
    /// Standard atomic weight; mass number of the most stable isotope for
    /// elements without one.
    pub atomic_weight: f64,
}

impl Element {
    /// Integer mass number closest to the standard weight, used as the
    /// reference point for Molfile mass differences.
    pub fn standard_mass_number(&self) -> u16 {
        self.atomic_weight.round() as u16
    }
}

/// Highest atomic number in the table.
pub const MAX_ATOMIC_NUMBER: u8 = 118;

/// Elements 1–118 (H through Og).
static ELEMENTS: [Element; 118] = [
    Element { atomic_number: 1, symbol: "H", name: "Hydrogen", atomic_weight: 1.008 },
    Element { atomic_number: 2, symbol: "He", name: "Helium", atomic_weight: 4.003 },
    Element { atomic_number: 3, symbol: "Li", name: "Lithium", atomic_weight: 6.941 },
    Element { atomic_number: 4, symbol: "Be", name: "Beryllium", atomic_weight: 9.012 },
    Element { atomic_number: 5, symbol: "B", name: "Boron", atomic_weight: 10.81 },
    Element { atomic_number: 6, symbol: "C", name: "Carbon", atomic_weight: 12.011 },
    Element { atomic_number: 7, symbol: "N", name: "Nitrogen", atomic_weight: 14.007 },
    Element { atomic_number: 8, symbol: "O", name: "Oxygen", atomic_weight: 15.999 },
    Element { atomic_number: 9, symbol: "F", name: "Fluorine", atomic_weight: 18.998 },
    Element { atomic_number: 10, symbol: "Ne", name: "Neon", atomic_weight: 20.180 },
    Element { atomic_number: 11, symbol: "Na", name: "Sodium", atomic_weight: 22.990 },
    Element { atomic_number: 12, symbol: "Mg", name: "Magnesium", atomic_weight: 24.305 },
    Element { atomic_number: 13, symbol: "Al", name: "Aluminum", atomic_weight: 26.982 },
    Element { atomic_number: 14, symbol: "Si", name: "Silicon", atomic_weight: 28.086 },
    Element { atomic_number: 15, symbol: "P", name: "Phosphorus", atomic_weight: 30.974 },
    Element { atomic_number: 16, symbol: "S", name: "Sulfur", atomic_weight: 32.06 },
    Element { atomic_number: 17, symbol: "Cl", name: "Chlorine", atomic_weight: 35.45 },
    Element { atomic_number: 18, symbol: "Ar", name: "Argon", atomic_weight: 39.948 },
    Element { atomic_number: 19, symbol: "K", name: "Potassium", atomic_weight: 39.098 },
    Element { atomic_number: 20, symbol: "Ca", name: "Calcium", atomic_weight: 40.078 },
    Element { atomic_number: 21, symbol: "Sc", name: "Scandium", atomic_weight: 44.956 },
    Element { atomic_number: 22, symbol: "Ti", name: "Titanium", atomic_weight: 47.867 },
    Element { atomic_number: 23, symbol: "V", name: "Vanadium", atomic_weight: 50.942 },
    Element { atomic_number: 24, symbol: "Cr", name: "Chromium", atomic_weight: 51.996 },
    Element { atomic_number: 25, symbol: "Mn", name: "Manganese", atomic_weight: 54.938 },
    Element { atomic_number: 26, symbol: "Fe", name: "Iron", atomic_weight: 55.845 },
    Element { atomic_number: 27, symbol: "Co", name: "Cobalt", atomic_weight: 58.933 },
    Element { atomic_number: 28, symbol: "Ni", name: "Nickel", atomic_weight: 58.693 },
    Element { atomic_number: 29, symbol: "Cu", name: "Copper", atomic_weight: 63.546 },
    Element { atomic_number: 30, symbol: "Zn", name: "Zinc", atomic_weight: 65.38 },
    Element { atomic_number: 31, symbol: "Ga", name: "Gallium", atomic_weight: 69.723 },
    Element { atomic_number: 32, symbol: "Ge", name: "Germanium", atomic_weight: 72.63 },
    Element { atomic_number: 33, symbol: "As", name: "Arsenic", atomic_weight: 74.922 },
    Element { atomic_number: 34, symbol: "Se", name: "Selenium", atomic_weight: 78.96 },
    Element { atomic_number: 35, symbol: "Br", name: "Bromine", atomic_weight: 79.904 },
    Element { atomic_number: 36, symbol: "Kr", name: "Krypton", atomic_weight: 83.798 },
    Element { atomic_number: 37, symbol: "Rb", name: "Rubidium", atomic_weight: 85.468 },
    Element { atomic_number: 38, symbol: "Sr", name: "Strontium", atomic_weight: 87.62 },
    Element { atomic_number: 39, symbol: "Y", name: "Yttrium", atomic_weight: 88.906 },
    Element { atomic_number: 40, symbol: "Zr", name: "Zirconium", atomic_weight: 91.224 },
    Element { atomic_number: 41, symbol: "Nb", name: "Niobium", atomic_weight: 92.906 },
    Element { atomic_number: 42, symbol: "Mo", name: "Molybdenum", atomic_weight: 95.95 },
    Element { atomic_number: 43, symbol: "Tc", name: "Technetium", atomic_weight: 98.0 },
    Element { atomic_number: 44, symbol: "Ru", name: "Ruthenium", atomic_weight: 101.07 },
    Element { atomic_number: 45, symbol: "Rh", name: "Rhodium", atomic_weight: 102.906 },
    Element { atomic_number: 46, symbol: "Pd", name: "Palladium", atomic_weight: 106.42 },
    Element { atomic_number: 47, symbol: "Ag", name: "Silver", atomic_weight: 107.868 },
    Element { atomic_number: 48, symbol: "Cd", name: "Cadmium", atomic_weight: 112.414 },
    Element { atomic_number: 49, symbol: "In", name: "Indium", atomic_weight: 114.818 },
    Element { atomic_number: 50, symbol: "Sn", name: "Tin", atomic_weight: 118.710 },
    Element { atomic_number: 51, symbol: "Sb", name: "Antimony", atomic_weight: 121.760 },
    Element { atomic_number: 52, symbol: "Te", name: "Tellurium", atomic_weight: 127.60 },
    Element { atomic_number: 53, symbol: "I", name: "Iodine", atomic_weight: 126.904 },
    Element { atomic_number: 54, symbol: "Xe", name: "Xenon", atomic_weight: 131.293 },
    Element { atomic_number: 55, symbol: "Cs", name: "Cesium", atomic_weight: 132.905 },
    Element { atomic_number: 56, symbol: "Ba", name: "Barium", atomic_weight: 137.327 },
    Element { atomic_number: 57, symbol: "La", name: "Lanthanum", atomic_weight: 138.905 },
    Element { atomic_number: 58, symbol: "Ce", name: "Cerium", atomic_weight: 140.116 },
    Element { atomic_number: 59, symbol: "Pr", name: "Praseodymium", atomic_weight: 140.908 },
    Element { atomic_number: 60, symbol: "Nd", name: "Neodymium", atomic_weight: 144.242 },
    Element { atomic_number: 61, symbol: "Pm", name: "Promethium", atomic_weight: 145.0 },
    Element { atomic_number: 62, symbol: "Sm", name: "Samarium", atomic_weight: 150.36 },
    Element { atomic_number: 63, symbol: "Eu", name: "Europium", atomic_weight: 151.964 },
    Element { atomic_number: 64, symbol: "Gd", name: "Gadolinium", atomic_weight: 157.25 },
    Element { atomic_number: 65, symbol: "Tb", name: "Terbium", atomic_weight: 158.925 },
    Element { atomic_number: 66, symbol: "Dy", name: "Dysprosium", atomic_weight: 162.500 },
    Element { atomic_number: 67, symbol: "Ho", name: "Holmium", atomic_weight: 164.930 },
    Element { atomic_number: 68, symbol: "Er", name: "Erbium", atomic_weight: 167.259 },
    Element { atomic_number: 69, symbol: "Tm", name: "Thulium", atomic_weight: 168.934 },
    Element { atomic_number: 70, symbol: "Yb", name: "Ytterbium", atomic_weight: 173.045 },
    Element { atomic_number: 71, symbol: "Lu", name: "Lutetium", atomic_weight: 174.967 },
    Element { atomic_number: 72, symbol: "Hf", name: "Hafnium", atomic_weight: 178.49 },
    Element { atomic_number: 73, symbol: "Ta", name: "Tantalum", atomic_weight: 180.948 },
    Element { atomic_number: 74, symbol: "W", name: "Tungsten", atomic_weight: 183.84 },
    Element { atomic_number: 75, symbol: "Re", name: "Rhenium", atomic_weight: 186.207 },
    Element { atomic_number: 76, symbol: "Os", name: "Osmium", atomic_weight: 190.23 },
    Element { atomic_number: 77, symbol: "Ir", name: "Iridium", atomic_weight: 192.217 },
    Element { atomic_number: 78, symbol: "Pt", name: "Platinum", atomic_weight: 195.084 },
    Element { atomic_number: 79, symbol: "Au", name: "Gold", atomic_weight: 196.967 },
    Element { atomic_number: 80, symbol: "Hg", name: "Mercury", atomic_weight: 200.592 },
    Element { atomic_number: 81, symbol: "Tl", name: "Thallium", atomic_weight: 204.38 },
    Element { atomic_number: 82, symbol: "Pb", name: "Lead", atomic_weight: 207.2 },
    Element { atomic_number: 83, symbol: "Bi", name: "Bismuth", atomic_weight: 208.980 },
    Element { atomic_number: 84, symbol: "Po", name: "Polonium", atomic_weight: 209.0 },
    Element { atomic_number: 85, symbol: "At", name: "Astatine", atomic_weight: 210.0 },
    Element { atomic_number: 86, symbol: "Rn", name: "Radon", atomic_weight: 222.0 },
    Element { atomic_number: 87, symbol: "Fr", name: "Francium", atomic_weight: 223.0 },
    Element { atomic_number: 88, symbol: "Ra", name: "Radium", atomic_weight: 226.0 },
    Element { atomic_number: 89, symbol: "Ac", name: "Actinium", atomic_weight: 227.0 },
    Element { atomic_number: 90, symbol: "Th", name: "Thorium", atomic_weight: 232.038 },
    Element { atomic_number: 91, symbol: "Pa", name: "Protactinium", atomic_weight: 231.036 },
    Element { atomic_number: 92, symbol: "U", name: "Uranium", atomic_weight: 238.029 },
    Element { atomic_number: 93, symbol: "Np", name: "Neptunium", atomic_weight: 237.0 },
    Element { atomic_number: 94, symbol: "Pu", name: "Plutonium", atomic_weight: 244.0 },
    Element { atomic_number: 95, symbol: "Am", name: "Americium", atomic_weight: 243.0 },
    Element { atomic_number: 96, symbol: "Cm", name: "Curium", atomic_weight: 247.0 },
    Element { atomic_number: 97, symbol: "Bk", name: "Berkelium", atomic_weight: 247.0 },
    Element { atomic_number: 98, symbol: "Cf", name: "Californium", atomic_weight: 251.0 },
    Element { atomic_number: 99, symbol: "Es", name: "Einsteinium", atomic_weight: 252.0 },
    Element { atomic_number: 100, symbol: "Fm", name: "Fermium", atomic_weight: 257.0 },
    Element { atomic_number: 101, symbol: "Md", name: "Mendelevium", atomic_weight: 258.0 },
    Element { atomic_number: 102, symbol: "No", name: "Nobelium", atomic_weight: 259.0 },
    Element { atomic_number: 103, symbol: "Lr", name: "Lawrencium", atomic_weight: 266.0 },
    Element { atomic_number: 104, symbol: "Rf", name: "Rutherfordium", atomic_weight: 267.0 },
    Element { atomic_number: 105, symbol: "Db", name: "Dubnium", atomic_weight: 268.0 },
    Element { atomic_number: 106, symbol: "Sg", name: "Seaborgium", atomic_weight: 269.0 },
    Element { atomic_number: 107, symbol: "Bh", name: "Bohrium", atomic_weight: 270.0 },
    Element { atomic_number: 108, symbol: "Hs", name: "Hassium", atomic_weight: 277.0 },
    Element { atomic_number: 109, symbol: "Mt", name: "Meitnerium", atomic_weight: 278.0 },
    Element { atomic_number: 110, symbol: "Ds", name: "Darmstadtium", atomic_weight: 281.0 },
    Element { atomic_number: 111, symbol: "Rg", name: "Roentgenium", atomic_weight: 282.0 },
    Element { atomic_number: 112, symbol: "Cn", name: "Copernicium", atomic_weight: 285.0 },
    Element { atomic_number: 113, symbol: "Nh", name: "Nihonium", atomic_weight: 286.0 },
    Element { atomic_number: 114, symbol: "Fl", name: "Flerovium", atomic_weight: 289.0 },
    Element { atomic_number: 115, symbol: "Mc", name: "Moscovium", atomic_weight: 290.0 },
    Element { atomic_number: 116, symbol: "Lv", name: "Livermorium", atomic_weight: 293.0 },
    Element { atomic_number: 117, symbol: "Ts", name: "Tennessine", atomic_weight: 294.0 },
    Element { atomic_number: 118, symbol: "Og", name: "Oganesson", atomic_weight: 294.0 },
];

/// Look up an element by its symbol (e.g. "C", "Fe"). Case-sensitive.
pub fn element_by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

/// Look up an element by its atomic number (1-based).
pub fn element_by_number(n: u8) -> Option<&'static Element> {
    if (1..=MAX_ATOMIC_NUMBER).contains(&n) {
        Some(&ELEMENTS[(n - 1) as usize])
    } else {
        None
    }
}

/// Resolve an element symbol to its atomic number.
pub fn element_from_symbol(symbol: &str) -> Result<u8> {
    element_by_symbol(symbol)
        .map(|e| e.atomic_number)
        .ok_or_else(|| MolkitError::NotFound(format!("unknown element symbol '{symbol}'")))
}

/// Symbol for an atomic number.
pub fn element_symbol(atomic_number: u8) -> Result<&'static str> {
    element_by_number(atomic_number)
        .map(|e| e.symbol)
        .ok_or_else(|| MolkitError::NotFound(format!("no element with atomic number {atomic_number}")))
}

/// Mass of an atom: the isotope mass number when one is set, otherwise the
/// standard atomic weight. Unknown elements weigh nothing.
pub fn atomic_mass(atomic_number: u8, isotope: u16) -> f64 {
    if isotope > 0 {
        return f64::from(isotope);
    }
    element_by_number(atomic_number).map_or(0.0, |e| e.atomic_weight)
}

/// Elements with a lowercase aromatic spelling in SMILES.
pub(crate) fn aromatic_symbol(atomic_number: u8) -> Option<&'static str> {
    match atomic_number {
        6 => Some("c"),
        7 => Some("n"),
        8 => Some("o"),
        15 => Some("p"),
        16 => Some("s"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_carbon_by_symbol() {
        let c = element_by_symbol("C").unwrap();
        assert_eq!(c.atomic_number, 6);
        assert_eq!(c.name, "Carbon");
        assert!((c.atomic_weight - 12.011).abs() < 0.001);
    }

    #[test]
    fn lookup_nitrogen_by_number() {
        let n = element_by_number(7).unwrap();
        assert_eq!(n.symbol, "N");
        assert_eq!(n.name, "Nitrogen");
    }

    #[test]
    fn table_is_indexed_by_atomic_number() {
        for (i, e) in ELEMENTS.iter().enumerate() {
            assert_eq!(e.atomic_number as usize, i + 1, "{}", e.symbol);
        }
    }

    #[test]
    fn symbol_round_trip() {
        for n in 1..=MAX_ATOMIC_NUMBER {
            let sym = element_symbol(n).unwrap();
            assert_eq!(element_from_symbol(sym).unwrap(), n);
        }
    }

    #[test]
    fn unknown_lookups_fail() {
        assert!(element_by_number(0).is_none());
        assert!(element_by_number(119).is_none());
        assert!(element_by_symbol("Xx").is_none());
        assert!(element_by_symbol("c").is_none());
        assert!(matches!(element_from_symbol("Q"), Err(MolkitError::NotFound(_))));
        assert!(element_symbol(0).is_err());
    }

    #[test]
    fn mass_prefers_isotope() {
        assert_eq!(atomic_mass(6, 13), 13.0);
        assert!((atomic_mass(6, 0) - 12.011).abs() < 1e-9);
        assert_eq!(atomic_mass(0, 0), 0.0);
    }

    #[test]
    fn standard_mass_numbers() {
        assert_eq!(element_by_number(6).unwrap().standard_mass_number(), 12);
        assert_eq!(element_by_number(8).unwrap().standard_mass_number(), 16);
        assert_eq!(element_by_number(17).unwrap().standard_mass_number(), 35);
        assert_eq!(element_by_number(35).unwrap().standard_mass_number(), 80);
    }
}
