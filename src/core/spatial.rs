use nalgebra::{DMatrix, Point3, Vector3};

/// Calculates the squared distance between two points.
#[inline]
pub fn distance_sq(p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    nalgebra::distance_squared(p1, p2)
}

/// Full symmetric matrix of interatomic distances.
pub fn pdist_matrix(coords: &[Point3<f64>]) -> DMatrix<f64> {
    let n = coords.len();
    let mut dist = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance_sq(&coords[i], &coords[j]).sqrt();
            dist[(i, j)] = d;
            dist[(j, i)] = d;
        }
    }
    dist
}

/// Checks a trial geometry for physical sanity.
/// Returns `true` if the geometry is acceptable.
///
/// * every pair of atoms must be at least `dist_min` apart (coincident
///   atoms fail too);
/// * every atom must have some neighbour closer than `dist_max`, a crude
///   stand-in for "no bond has been stretched apart".
pub fn geom_sensible(coords: &[Point3<f64>], dist_min: f64, dist_max: f64) -> bool {
    let n = coords.len();
    if coords.iter().any(|p| p.coords.iter().any(|c| !c.is_finite())) {
        return false;
    }

    let dist = pdist_matrix(coords);

    for i in 0..n {
        for j in (i + 1)..n {
            if dist[(i, j)] < dist_min {
                return false; // Collision detected
            }
        }
    }

    if n > 1 {
        for i in 0..n {
            let nearest = (0..n)
                .filter(|&j| j != i)
                .map(|j| dist[(i, j)])
                .fold(f64::INFINITY, f64::min);
            if nearest >= dist_max {
                return false; // Dangling atom
            }
        }
    }
    true
}

/// Geometric center (unit masses).
pub fn centroid(coords: &[Point3<f64>]) -> Vector3<f64> {
    if coords.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = coords.iter().map(|p| p.coords).sum();
    sum / coords.len() as f64
}

/// Copies `coords` with the geometric center moved to the origin.
pub fn centered(coords: &[Point3<f64>]) -> Vec<Vector3<f64>> {
    let c = centroid(coords);
    coords.iter().map(|p| p.coords - c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.96, 0.0, 0.0),
            Point3::new(-0.24, 0.93, 0.0),
        ]
    }

    #[test]
    fn distance_matrix_is_symmetric() {
        let d = pdist_matrix(&water());
        assert_eq!(d.nrows(), 3);
        assert!((d[(0, 1)] - 0.96).abs() < 1e-12);
        assert_eq!(d[(1, 2)], d[(2, 1)]);
        assert_eq!(d[(1, 1)], 0.0);
    }

    #[test]
    fn accepts_sensible_geometry() {
        assert!(geom_sensible(&water(), 0.5, 3.0));
    }

    #[test]
    fn rejects_close_contact() {
        let mut xyz = water();
        xyz[2] = Point3::new(0.95, 0.01, 0.0);
        assert!(!geom_sensible(&xyz, 0.5, 3.0));
    }

    #[test]
    fn rejects_coincident_atoms() {
        let mut xyz = water();
        xyz[2] = xyz[1];
        assert!(!geom_sensible(&xyz, 0.5, 3.0));
    }

    #[test]
    fn rejects_dangling_atom() {
        let mut xyz = water();
        xyz[2] = Point3::new(0.0, 8.0, 0.0);
        assert!(!geom_sensible(&xyz, 0.5, 3.0));
    }

    #[test]
    fn single_atom_is_sensible() {
        assert!(geom_sensible(&[Point3::origin()], 0.5, 3.0));
    }
}
