use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use bit_set::BitSet;
use crate::core::{digit_at, fits_length, ClueId, ClueIdx, DigitSet, Error, Index, MAX_DIGITS};
use crate::topology::Topology;

/// The candidates still possible for one entry. The sorted universe is
/// shared by every state derived from the same starting point; only the live
/// mask is copied, and only when a state actually removes something.
#[derive(Clone)]
pub struct CandidateSet {
    length: usize,
    universe: Arc<[u64]>,
    live: Arc<BitSet>,
}

impl CandidateSet {
    /// `universe` must be sorted ascending without duplicates.
    pub fn new(length: usize, universe: Arc<[u64]>) -> Self {
        let live = (0..universe.len()).collect::<BitSet>();
        CandidateSet { length, universe, live: Arc::new(live) }
    }

    pub fn from_values(length: usize, values: &[u64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort();
        sorted.dedup();
        Self::new(length, sorted.into())
    }

    pub fn length(&self) -> usize { self.length }

    pub fn len(&self) -> usize { self.live.len() }

    pub fn is_empty(&self) -> bool { self.live.is_empty() }

    /// Live candidates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.live.iter().map(|i| self.universe[i])
    }

    pub fn values(&self) -> Vec<u64> { self.iter().collect() }

    pub fn contains(&self, value: u64) -> bool {
        match self.universe.binary_search(&value) {
            Ok(i) => self.live.contains(i),
            Err(_) => false,
        }
    }

    pub fn single(&self) -> Option<u64> {
        let mut it = self.iter();
        match (it.next(), it.next()) {
            (Some(v), None) => Some(v),
            _ => None,
        }
    }

    /// Digits the live candidates can show at `pos`.
    pub fn digits_at(&self, pos: usize) -> DigitSet {
        let mut digits = DigitSet::empty();
        for v in self.iter() {
            digits.insert(digit_at(v, self.length, pos));
            if digits == DigitSet::full() {
                break;
            }
        }
        digits
    }

    /// Keep only candidates satisfying `keep`. Returns whether anything was
    /// removed.
    pub fn retain<F: Fn(u64) -> bool>(&mut self, keep: F) -> bool {
        let doomed = self.live.iter()
            .filter(|i| !keep(self.universe[*i]))
            .collect::<Vec<_>>();
        if doomed.is_empty() {
            return false;
        }
        let live = Arc::make_mut(&mut self.live);
        for i in doomed {
            live.remove(i);
        }
        true
    }

    pub fn retain_digits(&mut self, pos: usize, allowed: DigitSet) -> bool {
        let length = self.length;
        self.retain(|v| allowed.contains(digit_at(v, length, pos)))
    }

    pub fn restrict_to(&mut self, value: u64) -> bool {
        self.retain(|v| v == value)
    }

    pub fn remove(&mut self, value: u64) -> bool {
        self.retain(|v| v != value)
    }

    /// Does every live candidate render as exactly `length` digits?
    pub fn lengths_ok(&self, leading_zeros: bool) -> bool {
        self.iter().all(|v| fits_length(v, self.length, leading_zeros))
    }

    /// Whether `self` and `other` still share their mask allocation (i.e.
    /// neither has been narrowed since one was cloned from the other).
    pub fn shares_mask(&self, other: &CandidateSet) -> bool {
        Arc::ptr_eq(&self.live, &other.live)
    }
}

impl PartialEq for CandidateSet {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl Eq for CandidateSet {}

impl Debug for CandidateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const SHOWN: usize = 8;
        write!(f, "{{")?;
        for (i, v) in self.iter().take(SHOWN).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:0width$}", v, width = self.length)?;
        }
        let n = self.len();
        if n > SHOWN {
            write!(f, ", ... ({} total)", n)?;
        }
        write!(f, "}}")
    }
}

/// Candidate sets for every entry of a topology, indexed by ClueIdx. This is
/// the unit that propagation narrows, search branches on, and interactive
/// undo restores. Cloning is cheap.
#[derive(Clone)]
pub struct GridState {
    topology: Arc<Topology>,
    sets: Vec<CandidateSet>,
}

impl GridState {
    pub fn new(topology: Arc<Topology>, sets: Vec<CandidateSet>) -> Result<Self, Error> {
        if sets.len() != topology.len() {
            return Err(Error::invalid_state(format!(
                "Expected {} candidate sets; got {}", topology.len(), sets.len(),
            )));
        }
        for (e, s) in topology.entries().iter().zip(sets.iter()) {
            if e.len() != s.length() {
                return Err(Error::invalid_state(format!(
                    "Entry {} has {} cells but its candidates have {} digits", e.id, e.len(), s.length(),
                )));
            }
            if s.length == 0 || s.length > MAX_DIGITS {
                return Err(Error::invalid_state(format!(
                    "Entry {} has {} digits; at most {} are supported", e.id, s.length, MAX_DIGITS,
                )));
            }
            if let Some(v) = s.universe.iter().find(|v| !fits_length(**v, s.length, true)) {
                return Err(Error::invalid_state(format!(
                    "Candidate {} for entry {} does not fit in {} digits", v, e.id, s.length,
                )));
            }
        }
        Ok(GridState { topology, sets })
    }

    pub fn topology(&self) -> &Arc<Topology> { &self.topology }

    pub fn len(&self) -> usize { self.sets.len() }

    pub fn set(&self, clue: ClueIdx) -> &CandidateSet { &self.sets[clue] }

    pub fn set_mut(&mut self, clue: ClueIdx) -> &mut CandidateSet { &mut self.sets[clue] }

    pub fn sets(&self) -> &[CandidateSet] { &self.sets }

    pub fn by_id(&self, id: ClueId) -> Result<&CandidateSet, Error> {
        Ok(&self.sets[self.topology.require(id)?])
    }

    /// Remaining candidates per clue, for rendering.
    pub fn candidate_sets(&self) -> BTreeMap<ClueId, Vec<u64>> {
        self.topology.entries().iter()
            .zip(self.sets.iter())
            .map(|(e, s)| (e.id, s.values()))
            .collect()
    }

    /// Cells whose digit is determined: every entry through the cell agrees
    /// on exactly one digit there.
    pub fn forced_cells(&self) -> BTreeMap<Index, u8> {
        let mut forced = BTreeMap::new();
        for cell in self.topology.cells() {
            let mut digits = DigitSet::full();
            for (clue, pos) in self.topology.entries_at(cell) {
                digits = digits.intersection(self.sets[*clue].digits_at(*pos));
            }
            if let Some(d) = digits.single() {
                forced.insert(cell, d);
            }
        }
        forced
    }

    pub fn is_solved(&self) -> bool {
        self.sets.iter().all(|s| s.len() == 1)
    }

    pub fn solved_count(&self) -> usize {
        self.sets.iter().filter(|s| s.len() == 1).count()
    }

    pub fn total_candidates(&self) -> usize {
        self.sets.iter().map(|s| s.len()).sum()
    }

    pub fn first_empty(&self) -> Option<ClueIdx> {
        self.sets.iter().position(|s| s.is_empty())
    }

    /// The value of every clue, if the grid is solved.
    pub fn solution(&self) -> Option<BTreeMap<ClueId, u64>> {
        self.topology.entries().iter()
            .zip(self.sets.iter())
            .map(|(e, s)| s.single().map(|v| (e.id, v)))
            .collect()
    }

    pub fn render(&self) -> String {
        self.topology.render(&self.forced_cells())
    }
}

impl PartialEq for GridState {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.topology, &other.topology) || self.topology == other.topology)
            && self.sets == other.sets
    }
}

impl Eq for GridState {}

impl Debug for GridState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())?;
        for (e, s) in self.topology.entries().iter().zip(self.sets.iter()) {
            write!(f, "{}: {:?}\n", e.id, s)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::test_util::two_by_two;

    #[test]
    fn test_candidate_set_basics() {
        let mut s = CandidateSet::from_values(2, &[43, 12, 34, 21]);
        assert_eq!(s.values(), vec![12, 21, 34, 43]);
        assert!(s.contains(34));
        assert!(!s.contains(35));
        assert_eq!(format!("{:?}", s.digits_at(1)), "{1,2,3,4}");
        assert!(s.retain_digits(1, DigitSet::singleton(4)));
        assert_eq!(s.values(), vec![34]);
        assert!(!s.retain_digits(1, DigitSet::singleton(4)));
        assert_eq!(s.single(), Some(34));
        assert!(s.remove(34));
        assert!(s.is_empty());
        assert_eq!(s.single(), None);
    }

    #[test]
    fn test_clones_share_until_narrowed() {
        let a = CandidateSet::from_values(2, &[10, 20, 30]);
        let mut b = a.clone();
        assert!(a.shares_mask(&b));
        assert!(!b.retain(|v| v < 99));
        assert!(a.shares_mask(&b));
        let mut c = a.clone();
        assert!(c.restrict_to(20));
        assert!(!a.shares_mask(&c));
        assert_eq!(a.values(), vec![10, 20, 30]);
        assert_eq!(c.values(), vec![20]);
        b.remove(10);
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_debug_format() {
        let s = CandidateSet::from_values(3, &[7, 123]);
        assert_eq!(format!("{:?}", s), "{007, 123}");
        let many = CandidateSet::from_values(2, &(10..30).collect::<Vec<_>>());
        assert_eq!(format!("{:?}", many), "{10, 11, 12, 13, 14, 15, 16, 17, ... (20 total)}");
    }

    #[test]
    fn test_grid_state_views() -> Result<(), Error> {
        let t = Arc::new(two_by_two());
        // 1A, 1D, 2D, 3A
        let sets = vec![
            CandidateSet::from_values(2, &[12]),
            CandidateSet::from_values(2, &[13, 14]),
            CandidateSet::from_values(2, &[24, 25]),
            CandidateSet::from_values(2, &[34, 45]),
        ];
        let s = GridState::new(t.clone(), sets)?;
        let forced = s.forced_cells();
        assert_eq!(forced.get(&[0, 0]), Some(&1));
        assert_eq!(forced.get(&[0, 1]), Some(&2));
        assert_eq!(forced.get(&[1, 0]), None);
        assert_eq!(s.render(), "12\n..\n");
        assert!(!s.is_solved());
        assert_eq!(s.solved_count(), 1);
        assert_eq!(s.total_candidates(), 7);
        assert!(s.solution().is_none());
        assert_eq!(s.candidate_sets().get(&ClueId::down(2)), Some(&vec![24, 25]));
        assert_eq!(s.by_id(ClueId::across(3))?.values(), vec![34, 45]);
        let short = GridState::new(t, vec![CandidateSet::from_values(2, &[12])]);
        assert!(short.is_err());
        Ok(())
    }

    #[test]
    fn test_grid_state_rejects_values_wider_than_entry() {
        let t = Arc::new(two_by_two());
        let sets = |first: &[u64]| vec![
            CandidateSet::from_values(2, first),
            CandidateSet::from_values(2, &[13]),
            CandidateSet::from_values(2, &[24]),
            CandidateSet::from_values(2, &[34]),
        ];
        let err = GridState::new(t.clone(), sets(&[12, 123])).err().unwrap();
        assert_eq!(err.kind(), crate::core::ErrorKind::InvalidState);
        assert!(err.to_string().contains("123"));
        // Dead values still count; they come back on undo.
        let mut wide = CandidateSet::from_values(2, &[12, 100]);
        wide.remove(100);
        let mut with_dead = sets(&[]);
        with_dead[0] = wide;
        assert!(GridState::new(t.clone(), with_dead).is_err());
        // Below 10 is a zero-padded two-digit value.
        assert!(GridState::new(t, sets(&[7, 12])).is_ok());
    }

    #[test]
    fn test_grid_state_rejects_entries_past_max_digits() {
        let t = Arc::new(Topology::from_pattern(&".".repeat(MAX_DIGITS + 1)).unwrap());
        let sets = vec![CandidateSet::from_values(MAX_DIGITS + 1, &[])];
        let err = GridState::new(t, sets).err().unwrap();
        assert!(err.to_string().contains("at most 18"));
    }
}
