use rand::seq::index;
use rand::Rng;

use crate::core::molecule::Molecule;

/// A composable torsional mutation builder.
#[derive(Clone, Debug)]
pub struct Mutator {
    max_torsions: usize,
    angle_range: (f64, f64), // degrees, [lo, hi)
}

impl Default for Mutator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator {
    pub fn new() -> Self {
        Self {
            max_torsions: 1,
            angle_range: (0.0, 360.0),
        }
    }

    /// Upper bound on the number of torsions rotated per call.
    pub fn max_torsions(mut self, k: usize) -> Self {
        self.max_torsions = k.max(1);
        self
    }

    pub fn angle_range(mut self, lo: f64, hi: f64) -> Self {
        self.angle_range = (lo, hi);
        self
    }

    /// Draws k in `[1, max_torsions]` and mutates a copy of `molecule`.
    pub fn apply<R: Rng + ?Sized>(&self, molecule: &Molecule, rng: &mut R) -> Molecule {
        let k = rng.gen_range(1..=self.max_torsions);
        mutate(molecule, k, self.angle_range, rng)
    }
}

/// Rotates `k` distinct, randomly chosen torsions of a copy of `molecule`.
///
/// Each selected torsion gets its own increment drawn uniformly from
/// `angle_range`. `k` is clamped to the number of rotatable torsions; a
/// molecule without any is returned unchanged.
pub fn mutate<R: Rng + ?Sized>(molecule: &Molecule, k: usize, angle_range: (f64, f64), rng: &mut R) -> Molecule {
    let mut child = molecule.clone();
    let torsions = child.rotatable_torsions();
    let k = k.min(torsions.len());
    if k == 0 {
        return child;
    }

    let (lo, hi) = angle_range;
    for idx in index::sample(rng, torsions.len(), k).into_vec() {
        let delta = rng.gen_range(lo..hi);
        child.rotate_torsion(&torsions[idx], delta);
    }
    child
}

/// One-point crossover in dihedral space.
///
/// The child keeps `p1`'s bond lengths and angles and takes `p2`'s dihedrals
/// for every Z-matrix row from a random cut atom `pt` in `[3, n - 1]` on.
/// Both parents must come from the same template molecule. Returns `None`
/// (without drawing) when fewer than four atoms leave no dihedral to cut.
pub fn crossover<R: Rng + ?Sized>(p1: &Molecule, p2: &Molecule, rng: &mut R) -> Option<Molecule> {
    let n = p1.num_atoms();
    if n != p2.num_atoms() || n < 4 {
        return None;
    }
    let pt = rng.gen_range(3..n);

    let mut child = p1.clone();
    child.splice_dihedrals(p2, pt);
    Some(child)
}
