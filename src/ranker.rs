use crate::candidates::GridState;
use crate::core::{Attribution, ClueIdx};

/// One guess point in the search: an entry and the values still to try for
/// it, in the order they will be tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPoint {
    pub branch_step: usize,
    pub branch_attribution: Attribution,
    pub clue: ClueIdx,
    values: Vec<u64>,
    index: usize,
}

impl BranchPoint {
    /// Returns None if there is nothing to branch over.
    pub fn new(step: usize, attribution: Attribution, clue: ClueIdx, values: Vec<u64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(BranchPoint { branch_step: step, branch_attribution: attribution, clue, values, index: 0 })
    }

    pub fn chosen(&self) -> (ClueIdx, u64) {
        (self.clue, self.values[self.index])
    }

    pub fn width(&self) -> usize { self.values.len() }

    pub fn remaining(&self) -> usize {
        self.values.len() - 1 - self.index
    }

    pub fn advance(&mut self) -> Option<(ClueIdx, u64)> {
        if self.index + 1 < self.values.len() {
            self.index += 1;
            Some(self.chosen())
        } else {
            None
        }
    }

    // Opposite of advance. Returns false once there is nothing before the
    // current choice.
    pub fn retreat(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }
}

/// A ranker picks the entry to guess next. It must only suggest unsolved
/// entries, and returns None exactly when every entry is solved.
pub trait Ranker {
    fn top(&self, step: usize, state: &GridState) -> Option<BranchPoint>;
}

pub const FEWEST_CANDIDATES_ATTRIBUTION: &str = "FEWEST_CANDIDATES";
pub const FIRST_UNSOLVED_ATTRIBUTION: &str = "FIRST_UNSOLVED";

/// Branch on the entry with the smallest candidate set larger than one.
/// Ties go to the lowest number, then across before down. Values are tried
/// in ascending order.
#[derive(Debug, Clone)]
pub struct StdRanker {
    attribution: Attribution,
}

impl Default for StdRanker {
    fn default() -> Self {
        StdRanker { attribution: Attribution::new(FEWEST_CANDIDATES_ATTRIBUTION) }
    }
}

impl Ranker for StdRanker {
    fn top(&self, step: usize, state: &GridState) -> Option<BranchPoint> {
        // Entries are stored in ClueId order, so the first minimum wins ties.
        let (clue, _) = state.sets().iter()
            .enumerate()
            .map(|(i, s)| (i, s.len()))
            .filter(|(_, n)| *n > 1)
            .min_by_key(|(i, n)| (*n, *i))?;
        BranchPoint::new(step, self.attribution, clue, state.set(clue).values())
    }
}

/// Branch on the first unsolved entry regardless of size. Much worse than
/// StdRanker; kept for benchmarking the choice heuristic.
#[derive(Debug, Clone)]
pub struct FirstUnsolvedRanker {
    attribution: Attribution,
}

impl Default for FirstUnsolvedRanker {
    fn default() -> Self {
        FirstUnsolvedRanker { attribution: Attribution::new(FIRST_UNSOLVED_ATTRIBUTION) }
    }
}

impl Ranker for FirstUnsolvedRanker {
    fn top(&self, step: usize, state: &GridState) -> Option<BranchPoint> {
        let clue = state.sets().iter().position(|s| s.len() > 1)?;
        BranchPoint::new(step, self.attribution, clue, state.set(clue).values())
    }
}
