use nalgebra::Point3;
use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::rmsd;
use crate::core::domain::{Conformer, RmsdMode, SearchParams};
use crate::core::error::SearchError;

/// What happened to a candidate offered to the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Insertion {
    /// Stored at `rank` (0 = global minimum). `evicted` is set when the
    /// previous highest-energy member had to make room.
    Accepted { rank: usize, evicted: bool },
    /// The population was full and the candidate ranked last, so it went
    /// straight to the blacklist.
    Displaced,
    /// Energy non-finite or outside the acceptance window; blacklisted.
    OutsideWindow,
    /// Rediscovery of the member at this rank.
    DuplicateOfMember(usize),
    /// Rediscovery of the blacklist entry at this index.
    DuplicateOfBlacklisted(usize),
}

/// Fixed-capacity, energy-ordered set of unique conformers plus the
/// blacklist of structures that must not be accepted again.
#[derive(Debug, Clone)]
pub struct Population {
    members: Vec<Conformer>,
    blacklist: Vec<Conformer>,
    capacity: usize,
    rmsd_tol: f64,
    rmsd_mode: RmsdMode,
    energy_min: f64,
    energy_max: f64,
}

impl Population {
    pub fn new(params: &SearchParams) -> Self {
        Self {
            members: Vec::with_capacity(params.pop_size + 1),
            blacklist: Vec::new(),
            capacity: params.pop_size,
            rmsd_tol: params.rmsd_tol_uniq,
            rmsd_mode: params.rmsd_mode,
            energy_min: params.energy_min,
            energy_max: params.energy_max,
        }
    }

    pub fn members(&self) -> &[Conformer] {
        &self.members
    }

    pub fn blacklist(&self) -> &[Conformer] {
        &self.blacklist
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_window(&self, energy: f64) -> bool {
        energy.is_finite() && energy >= self.energy_min && energy <= self.energy_max
    }

    /// Offers a freshly evaluated conformer to the population.
    pub fn try_insert(&mut self, candidate: Conformer) -> Insertion {
        if !self.in_window(candidate.energy) {
            self.blacklist.push(candidate);
            return Insertion::OutsideWindow;
        }

        let (tol, mode) = (self.rmsd_tol, self.rmsd_mode);

        if let Some(rank) = self
            .members
            .iter()
            .position(|m| rmsd::is_duplicate(m, &candidate, tol, mode))
        {
            self.members[rank].visit_count += 1;
            return Insertion::DuplicateOfMember(rank);
        }

        if let Some(idx) = self
            .blacklist
            .par_iter()
            .position_first(|b| rmsd::is_duplicate(b, &candidate, tol, mode))
        {
            self.blacklist[idx].visit_count += 1;
            return Insertion::DuplicateOfBlacklisted(idx);
        }

        // ties keep insertion order: the newcomer goes after equal energies
        let rank = self
            .members
            .partition_point(|m| m.cmp_energy(&candidate).is_le());
        self.members.insert(rank, candidate);

        if self.members.len() > self.capacity {
            if let Some(worst) = self.members.pop() {
                self.blacklist.push(worst);
            }
            if rank >= self.capacity {
                return Insertion::Displaced;
            }
            return Insertion::Accepted { rank, evicted: true };
        }
        Insertion::Accepted { rank, evicted: false }
    }

    /// Checks a trial geometry against the blacklist before it is evaluated.
    /// A hit counts as a re-encounter of that entry.
    pub fn is_blacklisted(&mut self, coords: &[Point3<f64>]) -> Option<usize> {
        let (tol, mode) = (self.rmsd_tol, self.rmsd_mode);
        let hit = self
            .blacklist
            .par_iter()
            .position_first(|b| rmsd::rmsd(&b.coordinates, coords, mode) < tol);
        if let Some(idx) = hit {
            self.blacklist[idx].visit_count += 1;
        }
        hit
    }

    pub fn global_minimum(&self) -> Result<&Conformer, SearchError> {
        self.members.first().ok_or(SearchError::EmptyPopulation)
    }

    pub fn worst(&self) -> Option<&Conformer> {
        self.members.last()
    }

    /// Normalized fitness per member, in rank order.
    ///
    /// `(e_max - e) / (e_max - e_min)`; every member scores 1 when the energy
    /// spread is below `energy_var`.
    pub fn fitness(&self, energy_var: f64) -> Vec<f64> {
        let (emin, emax) = match (self.members.first(), self.members.last()) {
            (Some(a), Some(b)) => (a.energy, b.energy),
            _ => return Vec::new(),
        };
        let ediff = emax - emin;
        if ediff < energy_var {
            return vec![1.0; self.members.len()];
        }
        self.members.iter().map(|m| (emax - m.energy) / ediff).collect()
    }

    pub fn mean_energy(&self) -> Option<f64> {
        if self.members.is_empty() {
            return None;
        }
        Some(self.members.iter().map(|m| m.energy).sum::<f64>() / self.members.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Element;

    fn params(pop_size: usize) -> SearchParams {
        SearchParams {
            pop_size,
            rmsd_tol_uniq: 0.1,
            energy_min: -100.0,
            energy_max: 100.0,
            ..Default::default()
        }
    }

    // two atoms, distinguished by their separation
    fn dimer(energy: f64, r: f64) -> Conformer {
        let atoms = vec![Element::default(); 2];
        let coords = vec![Point3::origin(), Point3::new(r, 0.0, 0.0)];
        Conformer::new(energy, atoms, coords).unwrap()
    }

    #[test]
    fn keeps_ascending_order() {
        let mut pop = Population::new(&params(5));
        for (i, e) in [3.0, -1.0, 2.0, 0.5].iter().enumerate() {
            pop.try_insert(dimer(*e, 1.0 + i as f64));
        }
        let energies: Vec<f64> = pop.members().iter().map(|m| m.energy).collect();
        assert_eq!(energies, vec![-1.0, 0.5, 2.0, 3.0]);
        assert_eq!(pop.global_minimum().unwrap().energy, -1.0);
    }

    #[test]
    fn outside_window_goes_to_blacklist() {
        let mut pop = Population::new(&params(5));
        assert_eq!(pop.try_insert(dimer(150.0, 1.0)), Insertion::OutsideWindow);
        assert_eq!(pop.try_insert(dimer(f64::NAN, 2.0)), Insertion::OutsideWindow);
        assert!(pop.is_empty());
        assert_eq!(pop.blacklist().len(), 2);
        assert_eq!(pop.blacklist()[0].visit_count, 0);
    }

    #[test]
    fn equal_energies_keep_arrival_order() {
        let mut pop = Population::new(&params(3));
        pop.try_insert(dimer(1.0, 1.0));
        assert_eq!(pop.try_insert(dimer(1.0, 2.0)), Insertion::Accepted { rank: 1, evicted: false });
        assert_eq!(pop.try_insert(dimer(0.0, 3.0)), Insertion::Accepted { rank: 0, evicted: false });
        assert_eq!(pop.members()[2].coordinates[1].x, 2.0);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let mut pop = Population::new(&params(5));
        assert!(matches!(pop.try_insert(dimer(100.0, 1.0)), Insertion::Accepted { .. }));
        assert!(matches!(pop.try_insert(dimer(-100.0, 2.0)), Insertion::Accepted { .. }));
    }

    #[test]
    fn duplicate_bumps_member() {
        let mut pop = Population::new(&params(5));
        pop.try_insert(dimer(1.0, 1.0));
        pop.try_insert(dimer(0.0, 2.0));
        assert_eq!(pop.try_insert(dimer(5.0, 1.0)), Insertion::DuplicateOfMember(1));
        assert_eq!(pop.len(), 2);
        assert_eq!(pop.members()[1].visit_count, 1);
        assert!(pop.blacklist().is_empty());
    }

    #[test]
    fn eviction_and_blacklist_duplicates() {
        let mut pop = Population::new(&params(2));
        pop.try_insert(dimer(1.0, 1.0));
        pop.try_insert(dimer(2.0, 2.0));

        assert_eq!(
            pop.try_insert(dimer(1.5, 3.0)),
            Insertion::Accepted { rank: 1, evicted: true }
        );
        assert_eq!(pop.blacklist().len(), 1);
        assert_eq!(pop.blacklist()[0].energy, 2.0);

        // evicted structure can't come back
        assert_eq!(pop.try_insert(dimer(-5.0, 2.0)), Insertion::DuplicateOfBlacklisted(0));
        assert_eq!(pop.blacklist()[0].visit_count, 1);
        assert_eq!(pop.len(), 2);
    }

    #[test]
    fn worst_candidate_is_displaced_when_full() {
        let mut pop = Population::new(&params(2));
        pop.try_insert(dimer(1.0, 1.0));
        pop.try_insert(dimer(2.0, 2.0));
        assert_eq!(pop.try_insert(dimer(9.0, 3.0)), Insertion::Displaced);
        assert_eq!(pop.worst().unwrap().energy, 2.0);
        assert_eq!(pop.blacklist()[0].energy, 9.0);
    }

    #[test]
    fn prescreen_matches_blacklist() {
        let mut pop = Population::new(&params(2));
        pop.try_insert(dimer(500.0, 1.0));
        let near = [Point3::origin(), Point3::new(1.05, 0.0, 0.0)];
        let far = [Point3::origin(), Point3::new(3.0, 0.0, 0.0)];
        assert_eq!(pop.is_blacklisted(&near), Some(0));
        assert_eq!(pop.is_blacklisted(&far), None);
        assert_eq!(pop.blacklist()[0].visit_count, 1);
    }

    #[test]
    fn fitness_scaling() {
        let mut pop = Population::new(&params(3));
        pop.try_insert(dimer(0.0, 1.0));
        pop.try_insert(dimer(1.0, 2.0));
        pop.try_insert(dimer(2.0, 3.0));
        assert_eq!(pop.fitness(1e-3), vec![1.0, 0.5, 0.0]);
        assert_eq!(pop.fitness(10.0), vec![1.0; 3]);
    }

    #[test]
    fn empty_population_has_no_minimum() {
        let pop = Population::new(&params(3));
        assert!(matches!(pop.global_minimum(), Err(SearchError::EmptyPopulation)));
        assert!(pop.fitness(1e-3).is_empty());
    }
}
