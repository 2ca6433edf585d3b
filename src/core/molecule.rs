//! Molecular data model used by the conformer search.
//!
//! A [`Molecule`] keeps its geometry twice: as Cartesian coordinates and as a
//! Z-matrix (bond length, bond angle and dihedral per atom, each measured
//! against earlier atoms). The Z-matrix *connectivity* is derived once, from
//! the input geometry, by attaching every atom to its nearest predecessor in
//! file order. All later geometries of the same molecule (mutated,
//! crossed-over or relaxed by an evaluator) are re-expressed on that fixed
//! connectivity, so a torsion identifier means the same thing for every
//! conformer.
//!
//! Coordinates are always stored in the Z-matrix standard frame: atom 0 at
//! the origin, atom 1 on the +x axis, atom 2 in the xy plane with y > 0.

use std::fmt::Write as _;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::chemistry::lookup_element;
use crate::core::domain::Element;
use crate::core::error::MoleculeError;
use crate::core::spatial;

const EPS: f64 = 1.0e-10;

/// A rotatable degree of freedom of the Z-matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Torsion {
    /// Rotation about the `bond` axis; every row in `moiety` shares the
    /// dihedral definition `moiety[_]-bond.0-bond.1-reference`.
    Dihedral {
        bond: (usize, usize),
        reference: usize,
        moiety: Vec<usize>,
    },
    /// Bond angle of `atom`; the only degree of freedom of a triatomic.
    Bend { atom: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ZMatrix {
    bond_connect: Vec<usize>,
    angle_connect: Vec<usize>,
    dihedral_connect: Vec<usize>,
    distances: Vec<f64>, // Å
    angles: Vec<f64>,    // degrees
    dihedrals: Vec<f64>, // degrees, (-180, 180]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    title: String,
    atoms: Vec<Element>,
    xyz: Vec<Point3<f64>>,
    zmat: ZMatrix,
}

impl Molecule {
    /// Builds a molecule and derives its Z-matrix connectivity from `xyz`.
    pub fn new(
        title: &str,
        atoms: Vec<Element>,
        xyz: Vec<Point3<f64>>,
    ) -> Result<Self, MoleculeError> {
        if atoms.is_empty() {
            return Err(MoleculeError::Empty);
        }
        check_coordinates(atoms.len(), &xyz)?;

        let zmat = ZMatrix::connect(&xyz);
        let mut mol = Self {
            title: title.to_string(),
            atoms,
            xyz,
            zmat,
        };
        mol.zmat.measure(&mol.xyz);
        mol.build_xyz();
        Ok(mol)
    }

    /// Parses a molecule in XYZ format (atom count, title, `symbol x y z` rows).
    pub fn from_xyz_str(text: &str) -> Result<Self, MoleculeError> {
        let mut lines = text.lines().enumerate();

        let (_, count_line) = lines.next().ok_or(MoleculeError::Empty)?;
        let natoms: usize = count_line.trim().parse().map_err(|_| MoleculeError::Parse {
            line: 1,
            message: format!("expected atom count, found '{}'", count_line.trim()),
        })?;
        let title = lines.next().map(|(_, l)| l.trim().to_string()).unwrap_or_default();

        let mut atoms = Vec::with_capacity(natoms);
        let mut xyz = Vec::with_capacity(natoms);

        for (idx, line) in lines {
            if atoms.len() == natoms {
                break;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() < 4 {
                return Err(MoleculeError::Parse {
                    line: idx + 1,
                    message: format!("expected 'symbol x y z', found '{}'", line.trim()),
                });
            }
            let mut c = [0.0; 3];
            for (k, tok) in parts[1..4].iter().enumerate() {
                c[k] = tok.parse().map_err(|_| MoleculeError::Parse {
                    line: idx + 1,
                    message: format!("bad coordinate '{}'", tok),
                })?;
            }
            atoms.push(lookup_element(parts[0])?);
            xyz.push(Point3::new(c[0], c[1], c[2]));
        }

        if atoms.len() != natoms {
            return Err(MoleculeError::AtomCountMismatch {
                expected: natoms,
                found: atoms.len(),
            });
        }
        Self::new(&title, atoms, xyz)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn atoms(&self) -> &[Element] {
        &self.atoms
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn coordinates(&self) -> &[Point3<f64>] {
        &self.xyz
    }

    /// Replaces the geometry, keeping the Z-matrix connectivity.
    /// The stored coordinates are re-expressed in the standard frame.
    pub fn set_coordinates(&mut self, xyz: &[Point3<f64>]) -> Result<(), MoleculeError> {
        check_coordinates(self.atoms.len(), xyz)?;
        self.zmat.measure(xyz);
        self.build_xyz();
        Ok(())
    }

    pub fn distance(&self, atom: usize) -> f64 {
        self.zmat.distances.get(atom).copied().unwrap_or(0.0)
    }

    pub fn angle(&self, atom: usize) -> f64 {
        self.zmat.angles.get(atom).copied().unwrap_or(0.0)
    }

    pub fn dihedral(&self, atom: usize) -> f64 {
        self.zmat.dihedrals.get(atom).copied().unwrap_or(0.0)
    }

    /// Copies the dihedrals of rows `from..` out of `other`, rebuilding once.
    /// Both molecules must share the same atoms and connectivity.
    pub fn splice_dihedrals(&mut self, other: &Molecule, from: usize) {
        let n = self.atoms.len().min(other.atoms.len());
        let start = from.max(3);
        if start >= n {
            return;
        }
        self.zmat.dihedrals[start..n].copy_from_slice(&other.zmat.dihedrals[start..n]);
        self.build_xyz();
    }

    /// Enumerates the rotatable degrees of freedom, in first-appearance order.
    pub fn rotatable_torsions(&self) -> Vec<Torsion> {
        let n = self.atoms.len();
        if n == 3 {
            return vec![Torsion::Bend { atom: 2 }];
        }

        let mut torsions: Vec<Torsion> = Vec::new();
        for i in 3..n {
            let key = (
                self.zmat.bond_connect[i],
                self.zmat.angle_connect[i],
                self.zmat.dihedral_connect[i],
            );
            let existing = torsions.iter_mut().find(|t| match t {
                Torsion::Dihedral { bond, reference, .. } => (bond.0, bond.1, *reference) == key,
                Torsion::Bend { .. } => false,
            });
            match existing {
                Some(Torsion::Dihedral { moiety, .. }) => moiety.push(i),
                _ => torsions.push(Torsion::Dihedral {
                    bond: (key.0, key.1),
                    reference: key.2,
                    moiety: vec![i],
                }),
            }
        }
        torsions
    }

    /// Rotates a torsion by `delta` degrees and rebuilds the coordinates.
    pub fn rotate_torsion(&mut self, torsion: &Torsion, delta: f64) {
        match torsion {
            Torsion::Dihedral { moiety, .. } => {
                for &i in moiety {
                    if i >= 3 && i < self.atoms.len() {
                        self.zmat.dihedrals[i] = wrap_degrees(self.zmat.dihedrals[i] + delta);
                    }
                }
            }
            Torsion::Bend { atom } => {
                if *atom >= 2 && *atom < self.atoms.len() {
                    self.zmat.angles[*atom] = fold_bend(self.zmat.angles[*atom] + delta);
                }
            }
        }
        self.build_xyz();
    }

    /// Formats the current geometry as an XYZ block.
    pub fn to_xyz_string(&self) -> String {
        format_xyz(&self.title, &self.atoms, &self.xyz)
    }

    // Places atoms one after another from their internal coordinates.
    fn build_xyz(&mut self) {
        let n = self.atoms.len();
        let z = &self.zmat;
        let mut xyz = vec![Point3::origin(); n];

        for i in 1..n {
            let j = z.bond_connect[i];
            if i == 1 {
                xyz[1] = Point3::new(xyz[j].x + z.distances[1], xyz[j].y, xyz[j].z);
                continue;
            }
            let k = z.angle_connect[i];
            let (a, phi) = if i == 2 {
                // virtual reference pins atom 2 to the xy plane
                (xyz[k] + Vector3::y(), 0.0)
            } else {
                (xyz[z.dihedral_connect[i]], z.dihedrals[i])
            };
            xyz[i] = place_atom(&a, &xyz[k], &xyz[j], z.distances[i], z.angles[i], phi);
        }
        self.xyz = xyz;
    }
}

impl ZMatrix {
    /// Derives connectivity from a reference geometry.
    fn connect(xyz: &[Point3<f64>]) -> Self {
        let n = xyz.len();
        let mut bond_connect = vec![0; n];
        let mut angle_connect = vec![0; n];
        let mut dihedral_connect = vec![0; n];

        for i in 1..n {
            bond_connect[i] = nearest_excluding(xyz, i, i, &[], None);
        }
        for i in 2..n {
            let j = bond_connect[i];
            angle_connect[i] = if j > 0 {
                bond_connect[j]
            } else {
                nearest_excluding(xyz, j, i, &[j], None)
            };
        }
        for i in 3..n {
            let j = bond_connect[i];
            let k = angle_connect[i];
            let preferred = bond_connect[k];
            dihedral_connect[i] = if k > 0 && ![i, j, k].contains(&preferred) && !collinear(xyz, j, k, preferred) {
                preferred
            } else {
                nearest_excluding(xyz, k, i, &[j, k], Some(j))
            };
        }

        Self {
            bond_connect,
            angle_connect,
            dihedral_connect,
            distances: vec![0.0; n],
            angles: vec![0.0; n],
            dihedrals: vec![0.0; n],
        }
    }

    /// Measures internal coordinates of `xyz` on the stored connectivity.
    fn measure(&mut self, xyz: &[Point3<f64>]) {
        let n = xyz.len();
        for i in 1..n {
            let j = self.bond_connect[i];
            self.distances[i] = spatial::distance_sq(&xyz[i], &xyz[j]).sqrt();
            if i >= 2 {
                let k = self.angle_connect[i];
                self.angles[i] = bond_angle(&xyz[i], &xyz[j], &xyz[k]);
            }
            if i >= 3 {
                let k = self.angle_connect[i];
                let l = self.dihedral_connect[i];
                self.dihedrals[i] = dihedral_angle(&xyz[i], &xyz[j], &xyz[k], &xyz[l]);
            }
        }
    }
}

/// Formats atoms and coordinates as an XYZ block.
pub fn format_xyz(title: &str, atoms: &[Element], xyz: &[Point3<f64>]) -> String {
    let mut s = String::with_capacity(64 * (atoms.len() + 2));
    let _ = writeln!(s, "{}", atoms.len());
    let _ = writeln!(s, "{}", title);
    for (atom, p) in atoms.iter().zip(xyz) {
        let _ = writeln!(s, "{:<3} {:>14.8} {:>14.8} {:>14.8}", atom.symbol, p.x, p.y, p.z);
    }
    s
}

/// Bond angle i-j-k in degrees (vertex at j).
pub fn bond_angle(pi: &Point3<f64>, pj: &Point3<f64>, pk: &Point3<f64>) -> f64 {
    let v1 = pi - pj;
    let v2 = pk - pj;
    let n = v1.norm() * v2.norm();
    if n < EPS {
        return 0.0;
    }
    (v1.dot(&v2) / n).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Dihedral angle i-j-k-l in degrees, in (-180, 180].
pub fn dihedral_angle(pi: &Point3<f64>, pj: &Point3<f64>, pk: &Point3<f64>, pl: &Point3<f64>) -> f64 {
    // praxeolitic formula on the reversed chain l-k-j-i (same value)
    let b0 = pl - pk;
    let b1 = match (pj - pk).try_normalize(EPS) {
        Some(v) => v,
        None => return 0.0,
    };
    let b2 = pi - pj;
    let v = b0 - b1 * b0.dot(&b1);
    let w = b2 - b1 * b2.dot(&b1);
    if v.norm() < EPS || w.norm() < EPS {
        return 0.0;
    }
    let x = v.dot(&w);
    let y = b1.cross(&v).dot(&w);
    wrap_degrees(y.atan2(x).to_degrees())
}

// NeRF placement: atom bonded to `c` at distance `r`, angle b-c-new = theta,
// torsion a-b-c-new = phi.
fn place_atom(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, r: f64, theta: f64, phi: f64) -> Point3<f64> {
    let bc = (c - b).try_normalize(EPS).unwrap_or_else(Vector3::x);
    let ab = b - a;
    let n = ab
        .cross(&bc)
        .try_normalize(EPS)
        .unwrap_or_else(|| any_perpendicular(&bc));
    let m = n.cross(&bc);

    let (st, ct) = theta.to_radians().sin_cos();
    let (sp, cp) = phi.to_radians().sin_cos();

    c + bc * (-r * ct) + m * (r * st * cp) + n * (r * st * sp)
}

fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let trial = if v.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    v.cross(&trial).normalize()
}

fn collinear(xyz: &[Point3<f64>], a: usize, b: usize, c: usize) -> bool {
    let ang = bond_angle(&xyz[a], &xyz[b], &xyz[c]);
    ang < 1.0e-3 || ang > 180.0 - 1.0e-3
}

// Nearest atom to `center` among `0..upto`, skipping `center` and `exclude`.
// With `axis = Some(j)`, candidates collinear with j-center are avoided when
// another candidate exists.
fn nearest_excluding(
    xyz: &[Point3<f64>],
    center: usize,
    upto: usize,
    exclude: &[usize],
    axis: Option<usize>,
) -> usize {
    let mut candidates: Vec<usize> = (0..upto)
        .filter(|&m| m != center && !exclude.contains(&m))
        .collect();
    candidates.sort_by(|&p, &q| {
        let dp = spatial::distance_sq(&xyz[center], &xyz[p]);
        let dq = spatial::distance_sq(&xyz[center], &xyz[q]);
        dp.total_cmp(&dq).then(p.cmp(&q))
    });
    if let Some(j) = axis {
        if let Some(&m) = candidates.iter().find(|&&m| !collinear(xyz, j, center, m)) {
            return m;
        }
    }
    candidates.first().copied().unwrap_or(0)
}

fn check_coordinates(natoms: usize, xyz: &[Point3<f64>]) -> Result<(), MoleculeError> {
    if xyz.len() != natoms {
        return Err(MoleculeError::AtomCountMismatch {
            expected: natoms,
            found: xyz.len(),
        });
    }
    if let Some(i) = xyz.iter().position(|p| p.coords.iter().any(|c| !c.is_finite())) {
        return Err(MoleculeError::NonFiniteCoordinate(i));
    }
    Ok(())
}

/// Maps an angle onto (-180, 180].
pub fn wrap_degrees(deg: f64) -> f64 {
    let w = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if w <= -180.0 {
        w + 360.0
    } else {
        w
    }
}

// Folds an arbitrary angle onto [0, 180].
fn fold_bend(deg: f64) -> f64 {
    let a = deg.rem_euclid(360.0);
    if a > 180.0 {
        360.0 - a
    } else {
        a
    }
}
