use std::collections::BTreeMap;
use listener_xword::core::{ClueId, Error};
use listener_xword::predicate::{Predicate, DIGIT_SUM_PRODUCT};
use listener_xword::puzzle::{Puzzle, PuzzleOptions, PuzzleSetter};
use listener_xword::topology::Topology;
use listener_xword::tui::solve_main;

// Every entry is clued by its digit sum (b) and digit product (c).
pub struct SumProduct;
impl PuzzleSetter for SumProduct {
    fn name() -> Option<String> { Some("sum-product".into()) }

    fn setup() -> Result<Puzzle, Error> {
        Self::setup_with(BTreeMap::from([
            (ClueId::across(1), Predicate::Params { b: 6, c: 6 }),
            (ClueId::across(4), Predicate::Params { b: 15, c: 120 }),
            (ClueId::across(5), Predicate::Params { b: 24, c: 504 }),
            (ClueId::down(1), Predicate::Params { b: 12, c: 28 }),
            (ClueId::down(2), Predicate::Params { b: 15, c: 80 }),
            (ClueId::down(3), Predicate::Params { b: 18, c: 162 }),
        ]))
    }

    fn setup_with(clues: BTreeMap<ClueId, Predicate>) -> Result<Puzzle, Error> {
        let topology = Topology::from_pattern("...\n...\n...")?;
        let puzzle = Puzzle::new(topology, clues, DIGIT_SUM_PRODUCT, PuzzleOptions::default())?;
        Ok(puzzle.with_name("sum-product"))
    }
}

pub fn main() -> color_eyre::Result<()> {
    solve_main::<SumProduct>("stats/sum-product.png")
}

#[cfg(test)]
mod test {
    use listener_xword::debug::NullObserver;
    use listener_xword::ranker::StdRanker;
    use listener_xword::solver::FindAllSolutions;
    use listener_xword::tui::test_util::solve_with_clues;
    use super::*;

    #[test]
    fn test_sum_product_solution() {
        let clues = SumProduct::setup().unwrap().clues();
        let result = solve_with_clues::<SumProduct, _>(clues, NullObserver);
        assert_eq!(result.render(), "123\n456\n789\n");
    }

    #[test]
    fn test_sum_product_unique() {
        let puzzle = SumProduct::setup().unwrap();
        let ranker = StdRanker::default();
        let mut finder = FindAllSolutions::new(puzzle.start().unwrap(), &ranker, None);
        let solutions = finder.solve_all().unwrap();
        assert_eq!(solutions.len(), 1);
        assert!(puzzle.check_solution(&solutions[0]));
    }

    #[test]
    fn test_sum_product_without_middle_row() {
        // Dropping 4A's clue leaves the downs to pin it down on their own.
        let mut clues = SumProduct::setup().unwrap().clues();
        clues.insert(ClueId::across(4), Predicate::Unclued);
        let result = solve_with_clues::<SumProduct, _>(clues, NullObserver);
        assert_eq!(result.render(), "123\n456\n789\n");
    }
}
