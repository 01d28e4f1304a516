use std::fmt::Debug;
use std::time::{Duration, Instant};
use serde_derive::{Deserialize, Serialize};
use crate::candidates::GridState;
use crate::constraint::{Contradiction, Propagator};
use crate::core::{Attribution, ClueId, ClueIdx, Error, ErrorKind};
use crate::ranker::{BranchPoint, Ranker};

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub struct AdvancingState {
    // The number of possibilities at the BranchPoint where this advance was taken.
    pub possibilities: usize,
    // The step at which this advance was taken.
    pub step: usize,
}

/// The state of the DFS solver. At any point in time, the solver is either
/// initializing (about to propagate the starting grid), advancing (ready to
/// guess), backtracking (undoing guesses), solved, or exhausted.
#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum DfsSolverState {
    Initializing,
    Advancing(AdvancingState),
    Backtracking,
    InitializationFailed,
    Solved,
    Exhausted,
}

/// Running counters for one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub steps: usize,
    pub branch_points: usize,
    pub backtracks: usize,
    pub contradictions: usize,
    pub max_depth: usize,
    pub pruned: usize,
}

// A view on the state and associated data for the solver.
pub trait DfsSolverView {
    fn step_count(&self) -> usize;
    fn solver_state(&self) -> DfsSolverState;
    fn is_initializing(&self) -> bool;
    fn is_done(&self) -> bool;
    fn is_valid(&self) -> bool;
    fn most_recent_action(&self) -> Option<(ClueId, u64)>;
    fn backtracked_steps(&self) -> Option<usize>;
    fn contradiction(&self) -> Option<Contradiction>;
    fn depth(&self) -> usize;
    fn stats(&self) -> SearchStats;
    fn state(&self) -> &GridState;
}

// Mostly for debugging purposes, a StepObserver allows the caller of various
// solver methods to dump or otherwise inspect the state of the solver after
// each step.
pub trait StepObserver {
    fn after_step(&mut self, solver: &dyn DfsSolverView);
}

pub const MANUAL_ATTRIBUTION: &str = "MANUAL_STEP";

/// Caller-imposed limits on a search. Running out yields
/// SolveOutcome::Unknown, never Unsatisfiable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_steps: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl SearchBudget {
    pub fn unlimited() -> Self { Self::default() }

    pub fn steps(max_steps: usize) -> Self {
        SearchBudget { max_steps: Some(max_steps), time_limit: None }
    }

    pub fn exhausted(&self, steps: usize, started: Instant) -> bool {
        if let Some(max) = self.max_steps {
            if steps >= max {
                return true;
            }
        }
        match self.time_limit {
            Some(limit) => started.elapsed() >= limit,
            None => false,
        }
    }
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Solved(GridState),
    /// The search space is exhausted. Carries the most recent contradiction
    /// encountered, if any.
    Unsatisfiable(Option<Contradiction>),
    /// The budget ran out first.
    Unknown,
}

impl SolveOutcome {
    pub fn solved(&self) -> Option<&GridState> {
        match self {
            SolveOutcome::Solved(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_solved(&self) -> bool { self.solved().is_some() }

    /// Solved state, or an Error: Unsatisfiable for an exhausted search
    /// space, BudgetExhausted for Unknown.
    pub fn into_result(self) -> Result<GridState, Error> {
        match self {
            SolveOutcome::Solved(s) => Ok(s),
            SolveOutcome::Unsatisfiable(Some(c)) => Err(Error::new(
                ErrorKind::Unsatisfiable, format!("No solution exists ({})", c),
            )),
            SolveOutcome::Unsatisfiable(None) => Err(Error::new_const(
                ErrorKind::Unsatisfiable, "No solution exists",
            )),
            SolveOutcome::Unknown => Err(Error::new_const(
                ErrorKind::BudgetExhausted, "Search budget exhausted before a solution was found",
            )),
        }
    }
}

struct Frame {
    decision: BranchPoint,
    // The state the decision was applied to.
    parent: GridState,
}

/// DFS solver. If you want a lower-level API that allows for more control over
/// the solving process, you can directly use this. Most users should prefer
/// FindFirstSolution or FindAllSolutions. However, if you are implementing a
/// UI or debugging, this API may be useful.
///
/// Every guess is applied to a clone of its parent state, so backtracking is
/// just dropping the child; the clone shares all untouched candidate masks.
pub struct DfsSolver<'a, R: Ranker> {
    step: usize,
    root: GridState,
    current: GridState,
    ranker: &'a R,
    propagator: Propagator,
    contradiction: Option<Contradiction>,
    last_contradiction: Option<Contradiction>,
    next_decision: Option<BranchPoint>,
    stack: Vec<Frame>,
    backtracked_steps: Option<usize>,
    manual_attr: Attribution,
    stats: SearchStats,
    state: DfsSolverState,
}

impl <'a, R: Ranker> Debug for DfsSolver<'a, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at step {}:\n{:?}", self.state, self.step, self.current)
    }
}

impl <'a, R: Ranker> DfsSolverView for DfsSolver<'a, R> {
    fn step_count(&self) -> usize {
        self.step
    }

    fn solver_state(&self) -> DfsSolverState {
        self.state
    }

    fn is_initializing(&self) -> bool {
        self.state == DfsSolverState::Initializing
    }

    fn is_done(&self) -> bool {
        match self.state {
            DfsSolverState::InitializationFailed | DfsSolverState::Solved | DfsSolverState::Exhausted => true,
            _ => false,
        }
    }

    fn is_valid(&self) -> bool {
        self.contradiction.is_none()
    }

    fn most_recent_action(&self) -> Option<(ClueId, u64)> {
        self.stack.last().map(|f| {
            let (clue, v) = f.decision.chosen();
            (self.root.topology().id(clue), v)
        })
    }

    fn backtracked_steps(&self) -> Option<usize> { self.backtracked_steps }

    fn contradiction(&self) -> Option<Contradiction> { self.contradiction }

    fn depth(&self) -> usize { self.stack.len() }

    fn stats(&self) -> SearchStats {
        SearchStats { steps: self.step, ..self.stats }
    }

    fn state(&self) -> &GridState {
        &self.current
    }
}

const NOT_INITIALIZED: Error = Error::new_const(ErrorKind::InvalidState, "Must initialize before stepping forward");
const PUZZLE_ALREADY_DONE: Error = Error::new_const(ErrorKind::InvalidState, "Puzzle already done");

impl <'a, R: Ranker> DfsSolver<'a, R> {
    pub fn new(root: GridState, ranker: &'a R) -> Self {
        DfsSolver {
            step: 0,
            current: root.clone(),
            root,
            ranker,
            propagator: Propagator::default(),
            contradiction: None,
            last_contradiction: None,
            next_decision: None,
            stack: Vec::new(),
            backtracked_steps: None,
            manual_attr: Attribution::new(MANUAL_ATTRIBUTION),
            stats: SearchStats::default(),
            state: DfsSolverState::Initializing,
        }
    }

    pub fn with_propagator(mut self, propagator: Propagator) -> Self {
        self.propagator = propagator;
        self
    }

    fn record(&mut self, result: Result<usize, Contradiction>) {
        match result {
            Ok(pruned) => {
                self.stats.pruned += pruned;
                self.contradiction = None;
            },
            Err(c) => {
                self.stats.contradictions += 1;
                self.contradiction = Some(c);
                self.last_contradiction = Some(c);
            },
        }
    }

    fn rank(&mut self) {
        self.next_decision = if self.is_valid() {
            self.ranker.top(self.step + 1, &self.current)
        } else {
            None
        };
    }

    fn apply(&mut self, decision: BranchPoint, parent: GridState) {
        let (clue, value) = decision.chosen();
        let width = decision.width();
        self.current = parent.clone();
        let result = self.propagator.commit_in_place(&mut self.current, clue, value)
            .map(|s| s.pruned);
        self.record(result);
        self.stack.push(Frame { decision, parent });
        self.stats.max_depth = self.stats.max_depth.max(self.stack.len());
        self.rank();
        self.state = if self.is_valid() {
            DfsSolverState::Advancing(AdvancingState { possibilities: width, step: self.step })
        } else {
            DfsSolverState::Backtracking
        };
    }

    /// The depth of the guess stack and each guess's remaining alternatives.
    pub fn stack(&self) -> Vec<(ClueIdx, u64, usize)> {
        self.stack.iter().map(|f| {
            let (clue, v) = f.decision.chosen();
            (clue, v, f.decision.remaining())
        }).collect()
    }

    pub fn root(&self) -> &GridState { &self.root }

    /// The most recent contradiction seen anywhere in this search.
    pub fn last_contradiction(&self) -> Option<Contradiction> { self.last_contradiction }

    /// Overriding any logic the solver has, manually commit a value.
    pub fn manual_step(&mut self, clue: ClueIdx, value: u64) -> Result<(), Error> {
        if self.is_initializing() {
            return Err(NOT_INITIALIZED);
        } else if self.is_done() {
            return Err(PUZZLE_ALREADY_DONE);
        }
        self.step += 1;
        let decision = BranchPoint::new(self.step, self.manual_attr, clue, vec![value])
            .ok_or_else(|| Error::invalid_state("Empty manual decision"))?;
        let parent = self.current.clone();
        self.apply(decision, parent);
        Ok(())
    }

    /// Force the solver into the backtracking state. (Useful for exhaustively
    /// listing all solutions.)
    pub fn force_backtrack(&mut self) -> bool {
        if self.state == DfsSolverState::Exhausted {
            return false;
        }
        self.step += 1;
        self.state = DfsSolverState::Backtracking;
        true
    }

    /// Undoes the most recent guess and re-applies the previous alternative
    /// from the same branch point, if any. Returns false if there is nothing
    /// to undo.
    pub fn retreat(&mut self) -> Result<bool, Error> {
        if self.is_initializing() {
            return Err(NOT_INITIALIZED);
        }
        self.step += 1;
        let Some(Frame { mut decision, parent }) = self.stack.pop() else {
            return Ok(false);
        };
        if decision.retreat() {
            self.apply(decision, parent);
        } else {
            self.current = parent;
            self.contradiction = None;
            self.rank();
            let width = self.stack.last().map(|f| f.decision.remaining() + 1).unwrap_or(0);
            self.state = DfsSolverState::Advancing(AdvancingState { possibilities: width, step: self.step });
        }
        Ok(true)
    }

    pub fn step(&mut self) -> Result<(), Error> {
        self.step += 1;
        match self.state {
            DfsSolverState::Initializing => {
                let mut start = self.root.clone();
                let n = start.len();
                let result = self.propagator.propagate_in_place(&mut start, 0..n)
                    .map(|s| s.pruned);
                self.current = start;
                self.record(result);
                if self.is_valid() {
                    self.rank();
                    self.state = DfsSolverState::Advancing(AdvancingState { possibilities: 0, step: self.step });
                } else {
                    self.state = DfsSolverState::InitializationFailed;
                }
                Ok(())
            },
            DfsSolverState::InitializationFailed => Err(PUZZLE_ALREADY_DONE),
            DfsSolverState::Solved => Err(PUZZLE_ALREADY_DONE),
            DfsSolverState::Exhausted => Err(PUZZLE_ALREADY_DONE),
            DfsSolverState::Advancing(_) => {
                match self.next_decision.take() {
                    Some(decision) => {
                        self.stats.branch_points += 1;
                        let parent = self.current.clone();
                        self.apply(decision, parent);
                    },
                    None => self.state = DfsSolverState::Solved,
                }
                self.backtracked_steps = None;
                Ok(())
            },
            DfsSolverState::Backtracking => {
                let Some(Frame { mut decision, parent }) = self.stack.pop() else {
                    self.state = DfsSolverState::Exhausted;
                    self.backtracked_steps = Some(self.step);
                    return Ok(());
                };
                self.stats.backtracks += 1;
                self.backtracked_steps = Some(self.step - decision.branch_step);
                match decision.advance() {
                    Some(_) => self.apply(decision, parent),
                    None => {
                        // The parent was consistent when we branched from it.
                        self.current = parent;
                        self.contradiction = None;
                        self.state = DfsSolverState::Backtracking;
                    },
                }
                Ok(())
            },
        }
    }

    pub fn reset(&mut self) {
        self.current = self.root.clone();
        self.contradiction = None;
        self.last_contradiction = None;
        self.next_decision = None;
        self.stack.clear();
        self.state = DfsSolverState::Initializing;
        self.step = 0;
        self.stats = SearchStats::default();
        self.backtracked_steps = None;
    }
}

macro_rules! delegate_view {
    ($t:ident) => {
        impl <'a, R: Ranker> DfsSolverView for $t<'a, R> {
            fn step_count(&self) -> usize { self.solver.step_count() }
            fn solver_state(&self) -> DfsSolverState { self.solver.solver_state() }
            fn is_initializing(&self) -> bool { self.solver.is_initializing() }
            fn is_done(&self) -> bool { self.done() }
            fn is_valid(&self) -> bool { self.solver.is_valid() }
            fn most_recent_action(&self) -> Option<(ClueId, u64)> {
                self.solver.most_recent_action()
            }
            fn backtracked_steps(&self) -> Option<usize> { self.solver.backtracked_steps() }
            fn contradiction(&self) -> Option<Contradiction> { self.solver.contradiction() }
            fn depth(&self) -> usize { self.solver.depth() }
            fn stats(&self) -> SearchStats { self.solver.stats() }
            fn state(&self) -> &GridState { self.solver.state() }
        }
    };
}

/// Find first solution to the puzzle using the given ranker.
pub struct FindFirstSolution<'a, R: Ranker> {
    solver: DfsSolver<'a, R>,
    observer: Option<&'a mut dyn StepObserver>,
}

delegate_view!(FindFirstSolution);

impl <'a, R: Ranker> FindFirstSolution<'a, R> {
    pub fn new(
        root: GridState,
        ranker: &'a R,
        observer: Option<&'a mut dyn StepObserver>,
    ) -> Self {
        FindFirstSolution { solver: DfsSolver::new(root, ranker), observer }
    }

    fn done(&self) -> bool { self.solver.is_done() }

    pub fn solver(&mut self) -> &mut DfsSolver<'a, R> { &mut self.solver }

    pub fn step(&mut self) -> Result<&dyn DfsSolverView, Error> {
        self.solver.step()?;
        Ok(&self.solver)
    }

    pub fn solve(&mut self) -> Result<SolveOutcome, Error> {
        self.solve_within(SearchBudget::unlimited())
    }

    pub fn solve_within(&mut self, budget: SearchBudget) -> Result<SolveOutcome, Error> {
        let started = Instant::now();
        while !self.solver.is_done() {
            if budget.exhausted(self.solver.step_count(), started) {
                return Ok(SolveOutcome::Unknown);
            }
            self.solver.step()?;
            if let Some(observer) = &mut self.observer {
                observer.after_step(&self.solver);
            }
        }
        if self.solver.solver_state() == DfsSolverState::Solved {
            Ok(SolveOutcome::Solved(self.solver.state().clone()))
        } else {
            Ok(SolveOutcome::Unsatisfiable(self.solver.last_contradiction()))
        }
    }
}

/// Find all solutions to the puzzle using the given ranker.
pub struct FindAllSolutions<'a, R: Ranker> {
    solver: DfsSolver<'a, R>,
    observer: Option<&'a mut dyn StepObserver>,
}

delegate_view!(FindAllSolutions);

impl <'a, R: Ranker> FindAllSolutions<'a, R> {
    pub fn new(
        root: GridState,
        ranker: &'a R,
        observer: Option<&'a mut dyn StepObserver>,
    ) -> Self {
        FindAllSolutions { solver: DfsSolver::new(root, ranker), observer }
    }

    fn done(&self) -> bool {
        matches!(self.solver.solver_state(), DfsSolverState::Exhausted | DfsSolverState::InitializationFailed)
    }

    pub fn step(&mut self) -> Result<&dyn DfsSolverView, Error> {
        if self.solver.solver_state() == DfsSolverState::Solved {
            self.solver.force_backtrack();
        }
        self.solver.step()?;
        Ok(&self.solver)
    }

    /// Every solution, in the order the search reaches them.
    pub fn solve_all(&mut self) -> Result<Vec<GridState>, Error> {
        let (solutions, _) = self.solve_all_within(SearchBudget::unlimited())?;
        Ok(solutions)
    }

    /// Like solve_all, but also reports whether the search space was fully
    /// explored before the budget ran out.
    pub fn solve_all_within(&mut self, budget: SearchBudget) -> Result<(Vec<GridState>, bool), Error> {
        let started = Instant::now();
        let mut solutions = vec![];
        while !self.done() {
            if budget.exhausted(self.solver.step_count(), started) {
                return Ok((solutions, false));
            }
            self.step()?;
            if self.solver.solver_state() == DfsSolverState::Solved {
                solutions.push(self.solver.state().clone());
            }
            if let Some(observer) = &mut self.observer {
                observer.after_step(&self.solver);
            }
        }
        Ok((solutions, true))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    pub fn assert_solved(outcome: &SolveOutcome) -> &GridState {
        match outcome {
            SolveOutcome::Solved(s) => s,
            other => panic!("Expected a solution; got: {:?}", other),
        }
    }

    pub fn assert_unsatisfiable(outcome: &SolveOutcome) {
        if let SolveOutcome::Unsatisfiable(_) = outcome {
            return;
        }
        panic!("Expected Unsatisfiable; got: {:?}", outcome);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use super::*;
    use super::test_util::*;
    use crate::candidates::CandidateSet;
    use crate::constraint::CROSSING_WIPEOUT;
    use crate::ranker::StdRanker;
    use crate::topology::test_util::two_by_two;

    // Sets in ClueIdx order: 1A, 1D, 2D, 3A.
    fn grid(sets: [&[u64]; 4]) -> GridState {
        let t = Arc::new(two_by_two());
        let sets = sets.iter().map(|v| CandidateSet::from_values(2, v)).collect();
        GridState::new(t, sets).unwrap()
    }

    fn swap_grid() -> GridState {
        grid([&[12, 21], &[12, 21], &[12, 21], &[12, 21]])
    }

    // Arc-consistent, but every assignment breaks the cycle of crossings.
    fn parity_grid() -> GridState {
        grid([&[12, 21], &[11, 22], &[11, 22], &[11, 22]])
    }

    #[test]
    fn test_find_first() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut finder = FindFirstSolution::new(swap_grid(), &ranker, None);
        let outcome = finder.solve()?;
        let solved = assert_solved(&outcome);
        assert_eq!(solved.render(), "12\n21\n");
        assert!(solved.is_solved());
        assert_eq!(finder.stats().branch_points, 1);
        assert_eq!(finder.stats().contradictions, 0);
        Ok(())
    }

    #[test]
    fn test_find_all() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut finder = FindAllSolutions::new(swap_grid(), &ranker, None);
        let solutions = finder.solve_all()?;
        let rendered = solutions.iter().map(|s| s.render()).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["12\n21\n", "21\n12\n"]);
        assert!(finder.is_done());
        Ok(())
    }

    #[test]
    fn test_solved_by_propagation_alone() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let root = grid([&[13], &[12], &[30], &[10, 20, 30]]);
        let mut finder = FindFirstSolution::new(root, &ranker, None);
        let outcome = finder.solve()?;
        let solved = assert_solved(&outcome);
        assert_eq!(solved.set(3).values(), vec![20]);
        assert_eq!(finder.stats().branch_points, 0);
        assert_eq!(finder.stats().max_depth, 0);
        Ok(())
    }

    #[test]
    fn test_initial_contradiction() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let root = grid([&[12], &[13], &[24], &[35]]);
        let mut finder = FindFirstSolution::new(root, &ranker, None);
        let outcome = finder.solve()?;
        match outcome {
            SolveOutcome::Unsatisfiable(Some(c)) => assert_eq!(c.attribution.name(), CROSSING_WIPEOUT),
            other => panic!("Expected Unsatisfiable; got {:?}", other),
        }
        assert_eq!(finder.solver_state(), DfsSolverState::InitializationFailed);
        assert!(finder.solve().is_ok());
        assert!(finder.step().is_err());
        Ok(())
    }

    #[test]
    fn test_exhaustion() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut finder = FindFirstSolution::new(parity_grid(), &ranker, None);
        let outcome = finder.solve()?;
        assert_unsatisfiable(&outcome);
        assert_eq!(finder.solver_state(), DfsSolverState::Exhausted);
        let stats = finder.stats();
        assert_eq!(stats.branch_points, 1);
        assert_eq!(stats.contradictions, 2);
        assert_eq!(stats.backtracks, 2);
        assert!(outcome.into_result().is_err());
        let mut all = FindAllSolutions::new(parity_grid(), &ranker, None);
        assert!(all.solve_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_budget_gives_unknown() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut finder = FindFirstSolution::new(parity_grid(), &ranker, None);
        let outcome = finder.solve_within(SearchBudget::steps(1))?;
        assert_eq!(outcome, SolveOutcome::Unknown);
        assert!(!finder.is_done());
        // Picking up again without a budget finishes the job.
        assert_unsatisfiable(&finder.solve()?);
        Ok(())
    }

    #[test]
    fn test_into_result_keeps_unknown_apart() {
        let err = SolveOutcome::Unknown.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BudgetExhausted);
        let err = SolveOutcome::Unsatisfiable(None).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsatisfiable);
        let ranker = StdRanker::default();
        let mut finder = FindFirstSolution::new(parity_grid(), &ranker, None);
        let err = finder.solve_within(SearchBudget::steps(1)).unwrap().into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BudgetExhausted);
    }

    struct ContraCounter(pub usize);
    impl StepObserver for ContraCounter {
        fn after_step(&mut self, solver: &dyn DfsSolverView) {
            if !solver.is_valid() {
                self.0 += 1;
            }
        }
    }

    #[test]
    fn test_observer() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut counter = ContraCounter(0);
        {
            let mut finder = FindFirstSolution::new(parity_grid(), &ranker, Some(&mut counter));
            finder.solve()?;
        }
        assert_eq!(counter.0, 2);
        Ok(())
    }

    #[test]
    fn test_manual_step_and_retreat() -> Result<(), Error> {
        let ranker = StdRanker::default();
        let mut solver = DfsSolver::new(swap_grid(), &ranker);
        assert!(solver.manual_step(0, 21).is_err());
        solver.step()?;
        solver.manual_step(0, 21)?;
        assert_eq!(solver.most_recent_action(), Some((crate::core::ClueId::across(1), 21)));
        assert!(solver.state().is_solved());
        assert!(solver.retreat()?);
        assert_eq!(solver.depth(), 0);
        assert_eq!(solver.state().set(0).len(), 2);
        while !solver.is_done() {
            solver.step()?;
        }
        assert_eq!(solver.state().render(), "12\n21\n");
        Ok(())
    }
}
