use crate::core::domain::Element;
use crate::core::error::MoleculeError;

/// (symbol, atomic number, standard atomic weight in amu)
const PERIODIC_TABLE: &[(&str, u8, f64)] = &[
    ("H", 1, 1.008),
    ("He", 2, 4.002602),
    ("Li", 3, 6.94),
    ("Be", 4, 9.0121831),
    ("B", 5, 10.81),
    ("C", 6, 12.011),
    ("N", 7, 14.007),
    ("O", 8, 15.999),
    ("F", 9, 18.998403163),
    ("Ne", 10, 20.1797),
    ("Na", 11, 22.98976928),
    ("Mg", 12, 24.305),
    ("Al", 13, 26.9815385),
    ("Si", 14, 28.085),
    ("P", 15, 30.973761998),
    ("S", 16, 32.06),
    ("Cl", 17, 35.45),
    ("Ar", 18, 39.948),
    ("K", 19, 39.0983),
    ("Ca", 20, 40.078),
    ("Fe", 26, 55.845),
    ("Cu", 29, 63.546),
    ("Zn", 30, 65.38),
    ("Se", 34, 78.971),
    ("Br", 35, 79.904),
    ("Kr", 36, 83.798),
    ("Sn", 50, 118.71),
    ("I", 53, 126.90447),
    ("Xe", 54, 131.293),
];

/// Looks up an element by symbol. Matching ignores case, so "CL" and "cl" both resolve to chlorine.
pub fn lookup_element(symbol: &str) -> Result<Element, MoleculeError> {
    let key = symbol.trim();
    PERIODIC_TABLE
        .iter()
        .find(|(sym, _, _)| sym.eq_ignore_ascii_case(key))
        .map(|&(sym, z, mass)| Element {
            symbol: sym.to_string(),
            atomic_number: z,
            mass,
        })
        .ok_or_else(|| MoleculeError::UnknownElement(key.to_string()))
}

/// Looks up an element by atomic number.
pub fn element_by_number(atomic_number: u8) -> Option<Element> {
    PERIODIC_TABLE
        .iter()
        .find(|(_, z, _)| *z == atomic_number)
        .map(|&(sym, z, mass)| Element {
            symbol: sym.to_string(),
            atomic_number: z,
            mass,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let cl = lookup_element("CL").unwrap();
        assert_eq!(cl.symbol, "Cl");
        assert_eq!(cl.atomic_number, 17);
        assert!(lookup_element("Xx").is_err());
    }

    #[test]
    fn lookup_by_number_matches_symbol() {
        let o = element_by_number(8).unwrap();
        assert_eq!(o, lookup_element("o").unwrap());
        assert!(element_by_number(0).is_none());
    }
}
