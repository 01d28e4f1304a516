use std::collections::BTreeMap;
use crate::candidates::GridState;
use crate::core::{ClueId, Error, Index};
use crate::puzzle::{ApplyResult, Puzzle};
use crate::solver::{SearchBudget, SolveOutcome};

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Apply(ClueId, u64),
    Exclude(ClueId, u64),
    AutoSolve,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub action: Action,
    pub state: GridState,
}

/// Interactive solving on top of the Puzzle API: each successful step pushes
/// a snapshot, so undo is popping one. A step that hits a contradiction
/// leaves the history untouched. The anagram-stage result is cached and
/// dropped whenever the primary grid changes.
#[derive(Debug)]
pub struct Session {
    puzzle: Puzzle,
    history: Vec<HistoryEntry>,
    anagram: Option<SolveOutcome>,
    budget: SearchBudget,
}

impl Session {
    pub fn new(puzzle: Puzzle) -> Result<Self, Error> {
        let start = puzzle.start()?;
        Ok(Session {
            puzzle,
            history: vec![HistoryEntry { action: Action::Start, state: start }],
            anagram: None,
            budget: SearchBudget::unlimited(),
        })
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn puzzle(&self) -> &Puzzle { &self.puzzle }

    pub fn history(&self) -> &[HistoryEntry] { &self.history }

    pub fn state(&self) -> &GridState {
        // history is never empty; the Start entry is never popped.
        &self.history[self.history.len() - 1].state
    }

    pub fn candidate_sets(&self) -> BTreeMap<ClueId, Vec<u64>> {
        self.state().candidate_sets()
    }

    pub fn forced_cells(&self) -> BTreeMap<Index, u8> {
        self.state().forced_cells()
    }

    fn push(&mut self, action: Action, state: GridState) {
        self.history.push(HistoryEntry { action, state });
        self.anagram = None;
    }

    fn record(&mut self, action: Action, result: ApplyResult) -> ApplyResult {
        if let ApplyResult::Ok(state) = &result {
            self.push(action, state.clone());
        }
        result
    }

    pub fn apply_clue(&mut self, id: ClueId, value: u64) -> Result<ApplyResult, Error> {
        let result = self.puzzle.apply_clue(self.state(), id, value)?;
        Ok(self.record(Action::Apply(id, value), result))
    }

    pub fn exclude_candidate(&mut self, id: ClueId, value: u64) -> Result<ApplyResult, Error> {
        let result = self.puzzle.exclude_candidate(self.state(), id, value)?;
        Ok(self.record(Action::Exclude(id, value), result))
    }

    /// Returns false if there is nothing left to undo.
    pub fn undo(&mut self) -> bool {
        if self.history.len() <= 1 {
            return false;
        }
        self.history.pop();
        self.anagram = None;
        true
    }

    pub fn reset(&mut self) {
        self.history.truncate(1);
        self.anagram = None;
    }

    /// Search from the current state. Only a solution changes the session.
    pub fn auto_solve(&mut self) -> Result<SolveOutcome, Error> {
        let outcome = self.puzzle.auto_solve(self.state(), self.budget)?;
        if let SolveOutcome::Solved(state) = &outcome {
            if state != self.state() {
                self.push(Action::AutoSolve, state.clone());
            }
        }
        Ok(outcome)
    }

    /// The anagram stage over the current (solved) state, computed once per
    /// primary state.
    pub fn anagram_solve(&mut self) -> Result<&SolveOutcome, Error> {
        if self.anagram.is_none() {
            let outcome = self.puzzle.anagram_solve(self.state(), self.budget)?;
            self.anagram = Some(outcome);
        }
        self.anagram.as_ref().ok_or_else(|| Error::invalid_state("Anagram result missing"))
    }

    pub fn anagram(&self) -> Option<&SolveOutcome> { self.anagram.as_ref() }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraint::NOT_A_CANDIDATE;
    use crate::core::ErrorKind;
    use crate::puzzle::PuzzleDescriptor;

    fn swap_session() -> Session {
        let d = PuzzleDescriptor::from_json(r#"{
            "grid": ["..", ".."],
            "rule": "PRIME_SIGNATURE",
            "clues": {
                "1A": {"kind": "explicit", "values": [12, 21]},
                "3A": {"kind": "explicit", "values": [12, 21]},
                "1D": {"kind": "explicit", "values": [12, 21]},
                "2D": {"kind": "explicit", "values": [12, 21]}
            }
        }"#).unwrap();
        Session::new(d.to_puzzle().unwrap()).unwrap()
    }

    #[test]
    fn test_apply_and_undo() -> Result<(), Error> {
        let mut s = swap_session();
        assert!(!s.undo());
        assert_eq!(s.forced_cells().len(), 0);
        let result = s.apply_clue(ClueId::across(1), 21)?;
        assert!(matches!(result, ApplyResult::Ok(_)));
        assert!(s.state().is_solved());
        assert_eq!(s.state().render(), "21\n12\n");
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[1].action, Action::Apply(ClueId::across(1), 21));
        assert!(s.undo());
        assert_eq!(s.candidate_sets().get(&ClueId::down(2)), Some(&vec![12, 21]));
        Ok(())
    }

    #[test]
    fn test_contradiction_leaves_state() -> Result<(), Error> {
        let mut s = swap_session();
        let before = s.state().clone();
        match s.apply_clue(ClueId::across(1), 33)? {
            ApplyResult::Contradiction(c) => assert_eq!(c.attribution.name(), NOT_A_CANDIDATE),
            other => panic!("Expected contradiction; got {:?}", other),
        }
        assert_eq!(s.state(), &before);
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.apply_clue(ClueId::down(7), 12).unwrap_err().kind(), ErrorKind::InvalidTopology);
        Ok(())
    }

    #[test]
    fn test_exclude_and_reset() -> Result<(), Error> {
        let mut s = swap_session();
        s.exclude_candidate(ClueId::down(1), 12)?;
        assert_eq!(s.state().render(), "21\n12\n");
        s.reset();
        assert_eq!(s.history().len(), 1);
        assert!(!s.state().is_solved());
        Ok(())
    }

    #[test]
    fn test_auto_solve_and_anagram_cache() -> Result<(), Error> {
        let mut s = swap_session();
        assert_eq!(s.anagram_solve().unwrap_err().kind(), ErrorKind::InvalidState);
        assert!(s.auto_solve()?.is_solved());
        assert_eq!(s.history().last().map(|h| h.action), Some(Action::AutoSolve));
        assert_eq!(s.state().render(), "12\n21\n");
        assert!(s.anagram_solve()?.is_solved());
        assert!(s.anagram().is_some());
        // Solving again from a solved state adds nothing.
        s.auto_solve()?;
        assert_eq!(s.history().len(), 2);
        assert!(s.anagram().is_some());
        s.undo();
        assert!(s.anagram().is_none());
        Ok(())
    }
}
