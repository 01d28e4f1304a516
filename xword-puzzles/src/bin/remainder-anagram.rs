use std::collections::BTreeMap;
use listener_xword::core::{pow10, ClueId, Error};
use listener_xword::predicate::{ArithmeticRule, Predicate};
use listener_xword::puzzle::{Puzzle, PuzzleOptions, PuzzleSetter};
use listener_xword::topology::Topology;
use listener_xword::tui::solve_main;

fn remainder_holds(n: u64, b: u64, c: u64) -> bool {
    b > 0 && n % b == c
}

fn remainder_accepts(length: usize, b: u64, c: u64) -> bool {
    b >= 2 && c < b && c < pow10(length)
}

/// b = divisor, c = remainder.
pub const REMAINDER: ArithmeticRule = ArithmeticRule {
    name: "REMAINDER",
    holds: remainder_holds,
    accepts: remainder_accepts,
};

// The top and bottom rows are unclued. Once the grid is filled, each of them
// is replaced by a multiple of itself that reuses its digits, and every other
// entry is rearranged to fit.
pub struct RemainderAnagram;
impl PuzzleSetter for RemainderAnagram {
    fn name() -> Option<String> { Some("remainder-anagram".into()) }

    fn setup() -> Result<Puzzle, Error> {
        Self::setup_with(BTreeMap::from([
            (ClueId::across(1), Predicate::Unclued),
            (ClueId::across(5), Predicate::Params { b: 428, c: 97 }),
            (ClueId::across(6), Predicate::Params { b: 266, c: 234 }),
            (ClueId::across(7), Predicate::Unclued),
            (ClueId::down(1), Predicate::Params { b: 327, c: 19 }),
            (ClueId::down(2), Predicate::Params { b: 650, c: 273 }),
            (ClueId::down(3), Predicate::Params { b: 293, c: 137 }),
            (ClueId::down(4), Predicate::Params { b: 470, c: 416 }),
        ]))
    }

    fn setup_with(clues: BTreeMap<ClueId, Predicate>) -> Result<Puzzle, Error> {
        let topology = Topology::from_pattern("....\n....\n....\n....")?;
        let puzzle = Puzzle::new(topology, clues, REMAINDER, PuzzleOptions::default())?;
        Ok(puzzle.with_name("remainder-anagram"))
    }
}

pub fn main() -> color_eyre::Result<()> {
    solve_main::<RemainderAnagram>("stats/remainder-anagram.png")
}
