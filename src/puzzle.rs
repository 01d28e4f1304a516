use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use serde_derive::{Deserialize, Serialize};
use crate::anagram::{anagram_solve, AnagramOptions};
use crate::candidates::{CandidateSet, GridState};
use crate::constraint::{is_arc_consistent, Contradiction, Propagator};
use crate::core::{fits_length, ClueId, Error, ErrorKind, Index};
use crate::predicate::{rule_by_name, ArithmeticRule, CandidateGenerator, Predicate};
use crate::ranker::StdRanker;
use crate::solver::{FindFirstSolution, SearchBudget, SolveOutcome, StepObserver};
use crate::topology::{Topology, TopologyBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleOptions {
    /// Whether primary-grid entries may start with 0.
    pub leading_zeros: bool,
    pub anagram: AnagramOptions,
}

/// Outcome of one interactive step. Either the new state, or the
/// contradiction it led to (in which case the old state still stands).
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    Ok(GridState),
    Contradiction(Contradiction),
}

impl ApplyResult {
    fn from_result(result: Result<GridState, Contradiction>) -> Self {
        match result {
            Ok(s) => ApplyResult::Ok(s),
            Err(c) => ApplyResult::Contradiction(c),
        }
    }

    pub fn ok(self) -> Option<GridState> {
        match self {
            ApplyResult::Ok(s) => Some(s),
            ApplyResult::Contradiction(_) => None,
        }
    }
}

/// A fully specified puzzle: topology, one predicate per entry, and the
/// arithmetic rule giving meaning to `Predicate::Params`. Every operation
/// takes a GridState snapshot and returns a new one; nothing here mutates a
/// state the caller still holds.
#[derive(Debug, Clone)]
pub struct Puzzle {
    name: Option<String>,
    topology: Arc<Topology>,
    predicates: Vec<Predicate>,
    generator: CandidateGenerator,
    options: PuzzleOptions,
    propagator: Propagator,
}

impl Puzzle {
    pub fn new(
        topology: Topology,
        clues: BTreeMap<ClueId, Predicate>,
        rule: ArithmeticRule,
        options: PuzzleOptions,
    ) -> Result<Self, Error> {
        if let Some(id) = clues.keys().find(|id| topology.index_of(**id).is_none()) {
            return Err(Error::invalid_topology(format!("Clue {} is not in the grid", id)));
        }
        let mut predicates = vec![];
        for e in topology.entries() {
            match clues.get(&e.id) {
                Some(p) => predicates.push(p.clone()),
                None => return Err(Error::invalid_predicate(format!("No clue given for {}", e.id))),
            }
        }
        Ok(Puzzle {
            name: None,
            topology: Arc::new(topology),
            predicates,
            generator: CandidateGenerator::new(rule, options.leading_zeros),
            options,
            propagator: Propagator::default(),
        })
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    pub fn topology(&self) -> &Arc<Topology> { &self.topology }

    pub fn options(&self) -> &PuzzleOptions { &self.options }

    pub fn rule(&self) -> ArithmeticRule { self.generator.rule() }

    pub fn predicate(&self, id: ClueId) -> Result<&Predicate, Error> {
        Ok(&self.predicates[self.topology.require(id)?])
    }

    pub fn clues(&self) -> BTreeMap<ClueId, Predicate> {
        self.topology.entries().iter()
            .zip(self.predicates.iter())
            .map(|(e, p)| (e.id, p.clone()))
            .collect()
    }

    /// Which entries (by ClueIdx) are unclued.
    pub fn unclued(&self) -> Vec<bool> {
        self.predicates.iter().map(|p| p.is_unclued()).collect()
    }

    /// Generated candidates for every entry, before any propagation.
    pub fn initial_state(&self) -> Result<GridState, Error> {
        let mut sets = vec![];
        for (e, p) in self.topology.entries().iter().zip(self.predicates.iter()) {
            let universe = self.generator.generate(e.len(), p).map_err(|err| {
                Error::new(err.kind(), format!("{}: {}", e.id, err.message()))
            })?;
            sets.push(CandidateSet::new(e.len(), universe));
        }
        GridState::new(self.topology.clone(), sets)
    }

    /// The initial state propagated to its fixpoint. A contradiction here
    /// means the puzzle as given has no solution.
    pub fn start(&self) -> Result<GridState, Error> {
        let initial = self.initial_state()?;
        self.propagator.propagate(&initial).map_err(|c| Error::new(
            ErrorKind::Unsatisfiable, format!("Puzzle contradicts itself: {}", c),
        ))
    }

    /// Commit `value` for `id` and propagate.
    pub fn apply_clue(&self, state: &GridState, id: ClueId, value: u64) -> Result<ApplyResult, Error> {
        let clue = self.topology.require(id)?;
        Ok(ApplyResult::from_result(self.propagator.commit(state, clue, value)))
    }

    /// Rule out `value` for `id` and propagate.
    pub fn exclude_candidate(&self, state: &GridState, id: ClueId, value: u64) -> Result<ApplyResult, Error> {
        let clue = self.topology.require(id)?;
        Ok(ApplyResult::from_result(self.propagator.exclude(state, clue, value)))
    }

    pub fn auto_solve(&self, state: &GridState, budget: SearchBudget) -> Result<SolveOutcome, Error> {
        self.auto_solve_observed(state, budget, None)
    }

    pub fn auto_solve_observed(
        &self,
        state: &GridState,
        budget: SearchBudget,
        observer: Option<&mut dyn StepObserver>,
    ) -> Result<SolveOutcome, Error> {
        let ranker = StdRanker::default();
        let observer = observer.map(|o| o as &mut dyn StepObserver);
        let mut finder = FindFirstSolution::new(state.clone(), &ranker, observer);
        finder.solve_within(budget)
    }

    /// The anagram stage over a solved primary grid.
    pub fn anagram_solve(&self, solved: &GridState, budget: SearchBudget) -> Result<SolveOutcome, Error> {
        anagram_solve(solved, &self.unclued(), &self.options.anagram, &StdRanker::default(), budget, None)
    }

    /// Is `state` a solution: every entry a single value that satisfies its
    /// own predicate, and every crossing cell agreed on?
    pub fn check_solution(&self, state: &GridState) -> bool {
        if !state.is_solved() || !is_arc_consistent(state) {
            return false;
        }
        let rule = self.generator.rule();
        self.topology.entries().iter().enumerate().all(|(clue, e)| {
            let Some(v) = state.set(clue).single() else { return false };
            if !fits_length(v, e.len(), self.options.leading_zeros) {
                return false;
            }
            match &self.predicates[clue] {
                Predicate::Unclued => true,
                Predicate::Params { b, c } => (rule.holds)(v, *b, *c),
                Predicate::Explicit { values } => values.contains(&v),
            }
        })
    }
}

/// A concrete puzzle built in code.
pub trait PuzzleSetter {
    fn name() -> Option<String> { None }
    fn setup() -> Result<Puzzle, Error>;
    // Useful for testing: setup the same grid with different clues.
    fn setup_with(clues: BTreeMap<ClueId, Predicate>) -> Result<Puzzle, Error>;
}

/// JSON form of a puzzle. The grid is either a `.`/`#` pattern (one string
/// per row, numbered automatically) or an explicit cell list per clue.
/// Clue keys are written like `"12D"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub grid: Vec<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<Index>>,
    pub rule: String,
    pub clues: BTreeMap<String, Predicate>,
    #[serde(default)]
    pub options: PuzzleOptions,
}

impl PuzzleDescriptor {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn topology(&self) -> Result<Topology, Error> {
        match (self.grid.is_empty(), self.entries.is_empty()) {
            (false, true) => Topology::from_pattern(&self.grid.join("\n")),
            (true, false) => {
                let mut builder = TopologyBuilder::new();
                for (key, cells) in &self.entries {
                    builder.entry(key.parse()?, cells.clone());
                }
                builder.build()
            },
            (true, true) => Err(Error::invalid_topology("Descriptor has neither grid nor entries")),
            (false, false) => Err(Error::invalid_topology("Descriptor has both grid and entries")),
        }
    }

    pub fn to_puzzle(&self) -> Result<Puzzle, Error> {
        let topology = self.topology()?;
        let mut clues = BTreeMap::new();
        for (key, p) in &self.clues {
            clues.insert(key.parse::<ClueId>()?, p.clone());
        }
        let puzzle = Puzzle::new(topology, clues, rule_by_name(&self.rule)?, self.options)?;
        Ok(match &self.name {
            Some(name) => puzzle.with_name(name.clone()),
            None => puzzle,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraint::{CROSSING_WIPEOUT, EMPTY_CANDIDATES, NOT_A_CANDIDATE};
    use crate::predicate::DIGIT_SUM_PRODUCT;
    use crate::solver::test_util::assert_solved;
    use crate::topology::test_util::three_by_three;

    const SUM_PRODUCT_JSON: &str = r#"{
        "name": "sum-product",
        "grid": ["...", "...", "..."],
        "rule": "DIGIT_SUM_PRODUCT",
        "clues": {
            "1A": {"kind": "params", "b": 6, "c": 6},
            "4A": {"kind": "params", "b": 15, "c": 120},
            "5A": {"kind": "params", "b": 24, "c": 504},
            "1D": {"kind": "params", "b": 12, "c": 28},
            "2D": {"kind": "params", "b": 15, "c": 80},
            "3D": {"kind": "params", "b": 18, "c": 162}
        }
    }"#;

    fn sum_product() -> Puzzle {
        PuzzleDescriptor::from_json(SUM_PRODUCT_JSON).unwrap().to_puzzle().unwrap()
    }

    #[test]
    fn test_descriptor() -> Result<(), Error> {
        let d = PuzzleDescriptor::from_json(SUM_PRODUCT_JSON)?;
        assert_eq!(d.options, PuzzleOptions::default());
        assert_eq!(d.options.anagram.min_multiple, 2);
        let p = d.to_puzzle()?;
        assert_eq!(p.name(), Some("sum-product"));
        assert_eq!(p.topology().len(), 6);
        assert_eq!(p.predicate(ClueId::down(2))?, &Predicate::Params { b: 15, c: 80 });
        let again = PuzzleDescriptor::from_json(&d.to_json()?)?;
        assert_eq!(again, d);
        Ok(())
    }

    #[test]
    fn test_descriptor_errors() {
        let bad_rule = SUM_PRODUCT_JSON.replace("DIGIT_SUM_PRODUCT", "NOPE");
        let err = PuzzleDescriptor::from_json(&bad_rule).unwrap().to_puzzle().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPredicate);
        let missing = SUM_PRODUCT_JSON.replace(r#""5A""#, r#""7A""#);
        let err = PuzzleDescriptor::from_json(&missing).unwrap().to_puzzle().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopology);
        let err = PuzzleDescriptor::from_json("{").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(PuzzleDescriptor::load("/nonexistent/puzzle.json").is_err());
    }

    #[test]
    fn test_explicit_entries() -> Result<(), Error> {
        let d = PuzzleDescriptor::from_json(r#"{
            "entries": {"1A": [[0, 0], [0, 1]], "2D": [[0, 1], [1, 1]]},
            "rule": "PRIME_SIGNATURE",
            "clues": {
                "1A": {"kind": "explicit", "values": [12, 21, 34, 43]},
                "2D": {"kind": "explicit", "values": [45]}
            }
        }"#)?;
        let p = d.to_puzzle()?;
        let s = p.start()?;
        assert_eq!(s.by_id(ClueId::across(1))?.values(), vec![34]);
        Ok(())
    }

    #[test]
    fn test_missing_clue() {
        let mut clues = BTreeMap::new();
        clues.insert(ClueId::across(1), Predicate::Unclued);
        let err = Puzzle::new(three_by_three(), clues, DIGIT_SUM_PRODUCT, PuzzleOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPredicate);
    }

    #[test]
    fn test_auto_solve() -> Result<(), Error> {
        let p = sum_product();
        let initial = p.initial_state()?;
        assert_eq!(initial.total_candidates(), 36);
        let outcome = p.auto_solve(&initial, SearchBudget::unlimited())?;
        let solved = assert_solved(&outcome);
        assert_eq!(solved.render(), "123\n456\n789\n");
        assert!(p.check_solution(solved));
        assert!(!p.check_solution(&initial));
        // Propagation alone is enough for this one.
        assert!(p.start()?.is_solved());
        Ok(())
    }

    #[test]
    fn test_apply_and_exclude() -> Result<(), Error> {
        let p = sum_product();
        let s = p.initial_state()?;
        match p.apply_clue(&s, ClueId::across(1), 999)? {
            ApplyResult::Contradiction(c) => assert_eq!(c.attribution.name(), NOT_A_CANDIDATE),
            other => panic!("Expected contradiction; got {:?}", other),
        }
        let next = p.apply_clue(&s, ClueId::across(1), 123)?.ok().unwrap();
        assert_eq!(next.by_id(ClueId::across(1))?.single(), Some(123));
        assert_eq!(s.by_id(ClueId::across(1))?.len(), 6);
        let fewer = p.exclude_candidate(&s, ClueId::across(1), 321)?.ok().unwrap();
        assert!(!fewer.by_id(ClueId::across(1))?.contains(321));
        let err = p.apply_clue(&s, ClueId::across(9), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopology);
        Ok(())
    }

    fn square_with(clues: &str) -> Puzzle {
        PuzzleDescriptor::from_json(&format!(r#"{{
            "grid": ["..", ".."],
            "rule": "PRIME_SIGNATURE",
            "clues": {{{}}}
        }}"#, clues)).unwrap().to_puzzle().unwrap()
    }

    #[test]
    fn test_apply_to_unpropagated_state() -> Result<(), Error> {
        // 1D and 3A disagree at [1, 0] no matter what 1A is.
        let p = square_with(r#"
            "1A": {"kind": "explicit", "values": [12, 13]},
            "1D": {"kind": "explicit", "values": [12]},
            "2D": {"kind": "explicit", "values": [24]},
            "3A": {"kind": "explicit", "values": [45]}
        "#);
        assert_eq!(p.start().unwrap_err().kind(), ErrorKind::Unsatisfiable);
        let s = p.initial_state()?;
        match p.apply_clue(&s, ClueId::across(1), 12)? {
            ApplyResult::Contradiction(c) => assert_eq!(c.attribution.name(), CROSSING_WIPEOUT),
            other => panic!("Expected contradiction; got {:?}", other),
        }
        match p.exclude_candidate(&s, ClueId::across(1), 13)? {
            ApplyResult::Contradiction(c) => assert_eq!(c.attribution.name(), CROSSING_WIPEOUT),
            other => panic!("Expected contradiction; got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_empty_candidates_make_puzzle_unsatisfiable() -> Result<(), Error> {
        // No three digits sum to 18 with product 80.
        let json = SUM_PRODUCT_JSON.replace(r#""b": 18, "c": 162"#, r#""b": 18, "c": 80"#);
        let p = PuzzleDescriptor::from_json(&json)?.to_puzzle()?;
        assert!(p.initial_state()?.by_id(ClueId::down(3))?.is_empty());
        let err = p.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsatisfiable);
        assert!(err.message().contains(EMPTY_CANDIDATES));
        let err = crate::session::Session::new(p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsatisfiable);
        Ok(())
    }

    #[test]
    fn test_anagram_of_fully_clued_grid_is_identity() -> Result<(), Error> {
        let p = sum_product();
        let solved = p.start()?;
        let outcome = p.anagram_solve(&solved, SearchBudget::unlimited())?;
        assert_eq!(assert_solved(&outcome), &solved);
        let err = p.anagram_solve(&p.initial_state()?, SearchBudget::unlimited()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        Ok(())
    }
}
