use gamss::analysis::rmsd::{is_duplicate, rmsd};
use gamss::core::domain::{Conformer, RmsdMode, SearchParams};
use gamss::core::error::MoleculeError;
use gamss::core::molecule::{Molecule, Torsion};
use gamss::core::spatial::geom_sensible;
use gamss::engine::operators::mutate;
use nalgebra::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::common::{butane, water};

mod common;

fn as_conformer(m: &Molecule, energy: f64) -> Conformer {
    Conformer::new(energy, m.atoms().to_vec(), m.coordinates().to_vec()).unwrap()
}

#[test]
fn test_zmatrix_round_trip() {
    let mut m = butane();
    let before = m.coordinates().to_vec();

    m.set_coordinates(&before).unwrap();
    for (a, b) in before.iter().zip(m.coordinates()) {
        assert!((a - b).norm() < 1e-9, "rebuild drifted: {} vs {}", a, b);
    }
}

#[test]
fn test_set_coordinates_rejects_bad_input() {
    let mut m = water();
    let short = vec![Point3::origin(); 2];
    assert_eq!(
        m.set_coordinates(&short),
        Err(MoleculeError::AtomCountMismatch { expected: 3, found: 2 })
    );

    let nan = vec![Point3::origin(), Point3::new(f64::NAN, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
    assert_eq!(m.set_coordinates(&nan), Err(MoleculeError::NonFiniteCoordinate(1)));
}

#[test]
fn test_unknown_element() {
    let err = Molecule::from_xyz_str("1\nbad\nQq 0 0 0\n").unwrap_err();
    assert_eq!(err, MoleculeError::UnknownElement("Qq".into()));
}

#[test]
fn test_torsion_enumeration() {
    assert_eq!(water().rotatable_torsions(), vec![Torsion::Bend { atom: 2 }]);

    let two = Molecule::from_xyz_str("2\nH2\nH 0 0 0\nH 0.74 0 0\n").unwrap();
    assert!(two.rotatable_torsions().is_empty());

    let torsions = butane().rotatable_torsions();
    assert!(torsions.iter().all(|t| matches!(t, Torsion::Dihedral { .. })));
}

#[test]
fn test_validator_rejects_close_contact() {
    // two atoms 0.01 Å apart
    let xyz = vec![Point3::origin(), Point3::new(0.01, 0.0, 0.0)];
    assert!(!geom_sensible(&xyz, 0.5, 2.2));
    assert!(geom_sensible(butane().coordinates(), 0.5, 2.2));
}

#[test]
fn test_duplicate_reflexive_and_symmetric() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let base = butane();
    let params = SearchParams::default();

    for _ in 0..10 {
        let a = as_conformer(&mutate(&base, 2, params.angle_range, &mut rng), 0.0);
        let b = as_conformer(&mutate(&base, 2, params.angle_range, &mut rng), 0.0);

        for mode in [RmsdMode::Centered, RmsdMode::Kabsch] {
            assert!(is_duplicate(&a, &a, params.rmsd_tol_uniq, mode));
            assert_eq!(
                is_duplicate(&a, &b, params.rmsd_tol_uniq, mode),
                is_duplicate(&b, &a, params.rmsd_tol_uniq, mode)
            );
            let ab = rmsd(&a.coordinates, &b.coordinates, mode);
            let ba = rmsd(&b.coordinates, &a.coordinates, mode);
            assert!((ab - ba).abs() < 1e-9);
        }
    }
}

#[test]
fn test_kabsch_never_exceeds_centered() {
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let base = butane();
    for _ in 0..10 {
        let a = mutate(&base, 3, (0.0, 360.0), &mut rng);
        let b = mutate(&base, 3, (0.0, 360.0), &mut rng);
        let centered = rmsd(a.coordinates(), b.coordinates(), RmsdMode::Centered);
        let kabsch = rmsd(a.coordinates(), b.coordinates(), RmsdMode::Kabsch);
        assert!(kabsch <= centered + 1e-9);
    }
}

#[test]
fn test_params_display_lists_fields() {
    let text = SearchParams::default().to_string();
    assert!(text.contains("Population size"));
    assert!(text.contains("Random seed"));
}
