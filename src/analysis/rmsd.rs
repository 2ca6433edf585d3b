use nalgebra::{Matrix3, Point3, Vector3};

use crate::core::domain::{Conformer, RmsdMode};
use crate::core::spatial;

/// Root-mean-square deviation between two coordinate sets of equal length.
///
/// Translation is always removed. With [`RmsdMode::Kabsch`] the first set is
/// additionally rotated onto the second. Returns `f64::INFINITY` when the
/// sets differ in length, so differently sized structures never compare as
/// duplicates.
pub fn rmsd(a: &[Point3<f64>], b: &[Point3<f64>], mode: RmsdMode) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    if a.is_empty() {
        return 0.0;
    }

    let ca = spatial::centered(a);
    let cb = spatial::centered(b);

    match mode {
        RmsdMode::Centered => msd(ca.iter().copied(), &cb).sqrt(),
        RmsdMode::Kabsch => {
            let rot = kabsch_rotation(&ca, &cb);
            msd(ca.iter().map(|v| rot * v), &cb).sqrt()
        }
    }
}

/// Two conformers are duplicates when their RMSD is strictly below `tol`.
pub fn is_duplicate(a: &Conformer, b: &Conformer, tol: f64, mode: RmsdMode) -> bool {
    if a.num_atoms() != b.num_atoms() {
        return false;
    }
    rmsd(&a.coordinates, &b.coordinates, mode) < tol
}

fn msd(a: impl Iterator<Item = Vector3<f64>>, b: &[Vector3<f64>]) -> f64 {
    let sum: f64 = a.zip(b).map(|(p, q)| (p - q).norm_squared()).sum();
    sum / b.len() as f64
}

/// Optimal rotation taking centered `from` onto centered `to`.
/// Falls back to the identity if the decomposition does not converge.
fn kabsch_rotation(from: &[Vector3<f64>], to: &[Vector3<f64>]) -> Matrix3<f64> {
    let h = from
        .iter()
        .zip(to)
        .fold(Matrix3::zeros(), |acc, (f, t)| acc + t * f.transpose());

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Matrix3::identity(),
    };

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        correction[(2, 2)] = -1.0; // no reflections
    }
    u * correction * v_t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Element;
    use nalgebra::Rotation3;

    fn tetra() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(0.0, 1.2, 0.0),
            Point3::new(0.3, 0.4, 1.1),
        ]
    }

    fn conformer(coords: Vec<Point3<f64>>) -> Conformer {
        let atoms = vec![Element::default(); coords.len()];
        Conformer::new(0.0, atoms, coords).unwrap()
    }

    #[test]
    fn identical_sets_have_zero_rmsd() {
        assert_eq!(rmsd(&tetra(), &tetra(), RmsdMode::Centered), 0.0);
        assert!(rmsd(&tetra(), &tetra(), RmsdMode::Kabsch) < 1e-12);
    }

    #[test]
    fn translation_is_ignored() {
        let shifted: Vec<_> = tetra().iter().map(|p| p + Vector3::new(4.0, -2.0, 7.0)).collect();
        assert!(rmsd(&tetra(), &shifted, RmsdMode::Centered) < 1e-12);
    }

    #[test]
    fn kabsch_removes_rotation() {
        let rot = Rotation3::from_euler_angles(0.3, -1.1, 2.0);
        let rotated: Vec<_> = tetra().iter().map(|p| rot * p).collect();

        assert!(rmsd(&tetra(), &rotated, RmsdMode::Centered) > 0.1);
        assert!(rmsd(&tetra(), &rotated, RmsdMode::Kabsch) < 1e-9);
    }

    #[test]
    fn mirror_images_stay_distinct() {
        let mirrored: Vec<_> = tetra().iter().map(|p| Point3::new(p.x, p.y, -p.z)).collect();
        assert!(rmsd(&tetra(), &mirrored, RmsdMode::Kabsch) > 1e-3);
    }

    #[test]
    fn size_mismatch_is_never_duplicate() {
        let a = conformer(tetra());
        let b = conformer(tetra()[..3].to_vec());
        assert!(!is_duplicate(&a, &b, 10.0, RmsdMode::Centered));
        assert_eq!(rmsd(&a.coordinates, &b.coordinates, RmsdMode::Kabsch), f64::INFINITY);
    }

    #[test]
    fn duplicate_threshold_is_strict() {
        let a = conformer(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let b = conformer(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.2, 0.0, 0.0)]);
        // centered displacement is 0.1 on each atom
        let d = rmsd(&a.coordinates, &b.coordinates, RmsdMode::Centered);
        assert!((d - 0.1).abs() < 1e-12);
        assert!(!is_duplicate(&a, &b, d, RmsdMode::Centered));
        assert!(is_duplicate(&a, &b, d + 1e-9, RmsdMode::Centered));
        assert!(is_duplicate(&a, &a, 1e-12, RmsdMode::Centered));
    }
}
