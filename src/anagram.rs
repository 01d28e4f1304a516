use serde_derive::{Deserialize, Serialize};
use crate::candidates::{CandidateSet, GridState};
use crate::core::{fits_length, from_digits, pow10, to_digits, Error};
use crate::ranker::Ranker;
use crate::solver::{FindFirstSolution, SearchBudget, SolveOutcome, StepObserver};

/// Rules for the second stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnagramOptions {
    /// Smallest ratio an unclued entry's anagram may have to its original
    /// value. Must be at least 2, so the anagram always differs.
    pub min_multiple: u64,
    /// May a clued entry's anagram be the original value itself?
    pub allow_identity: bool,
    pub leading_zeros: bool,
}

impl Default for AnagramOptions {
    fn default() -> Self {
        AnagramOptions { min_multiple: 2, allow_identity: true, leading_zeros: false }
    }
}

fn next_permutation(digits: &mut [u8]) -> bool {
    let n = digits.len();
    if n < 2 {
        return false;
    }
    let mut i = n - 1;
    while i > 0 && digits[i - 1] >= digits[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = n - 1;
    while digits[j] <= digits[i - 1] {
        j -= 1;
    }
    digits.swap(i - 1, j);
    digits[i..].reverse();
    true
}

/// Distinct rearrangements of `value`'s `length` digits, ascending. Repeated
/// digits collapse; rearrangements starting with 0 are dropped unless
/// `leading_zeros`.
pub fn permutations(value: u64, length: usize, leading_zeros: bool) -> Vec<u64> {
    let mut digits = to_digits(value, length);
    digits.sort();
    let mut out = vec![];
    loop {
        if leading_zeros || length == 1 || digits[0] != 0 {
            out.push(from_digits(&digits));
        }
        if !next_permutation(&mut digits) {
            break;
        }
    }
    out
}

fn sorted_digits(value: u64, length: usize) -> Vec<u8> {
    let mut digits = to_digits(value, length);
    digits.sort();
    digits
}

/// How many distinct rearrangements `digits` has (leading zeros included).
fn permutation_count(digits: &[u8]) -> u128 {
    let mut counts = [0u32; 10];
    let mut total: u128 = 1;
    for (i, d) in digits.iter().enumerate() {
        counts[*d as usize] += 1;
        // Multinomial built up one digit at a time; always exact.
        total = total * (i as u128 + 1) / counts[*d as usize] as u128;
    }
    total
}

/// Multiples `k * value` (k >= `min_multiple`) that are rearrangements of
/// `value`'s `length` digits, ascending. Walks k directly when there are
/// fewer multiples than rearrangements to check, which is always the case
/// for a value with no leading zero (k <= 9).
pub fn anagram_multiples(value: u64, length: usize, min_multiple: u64, leading_zeros: bool) -> Vec<u64> {
    if value == 0 {
        return vec![];
    }
    let target = sorted_digits(value, length);
    let is_anagram = |m: u64| fits_length(m, length, leading_zeros) && sorted_digits(m, length) == target;
    let limit = pow10(length);
    let max_k = (limit - 1) / value;
    if max_k < min_multiple {
        return vec![];
    }
    if ((max_k - min_multiple + 1) as u128) <= permutation_count(&target) {
        (min_multiple..=max_k).map(|k| k * value).filter(|m| is_anagram(*m)).collect()
    } else {
        permutations(value, length, leading_zeros).into_iter()
            .filter(|p| p % value == 0 && p / value >= min_multiple)
            .collect()
    }
}

/// The anagram candidates of one solved entry.
pub fn anagram_candidates(value: u64, length: usize, unclued: bool, options: &AnagramOptions) -> Vec<u64> {
    if unclued {
        return anagram_multiples(value, length, options.min_multiple, options.leading_zeros);
    }
    let perms = permutations(value, length, options.leading_zeros);
    if options.allow_identity {
        perms
    } else {
        perms.into_iter().filter(|p| *p != value).collect()
    }
}

/// Builds the second-stage grid from a fully solved primary grid. `unclued`
/// flags entries (by ClueIdx) that must become multiples of themselves.
pub fn anagram_state(solved: &GridState, unclued: &[bool], options: &AnagramOptions) -> Result<GridState, Error> {
    if options.min_multiple < 2 {
        return Err(Error::invalid_predicate(format!(
            "Anagram multiple must be at least 2; got {}", options.min_multiple,
        )));
    }
    if unclued.len() != solved.len() {
        return Err(Error::invalid_state(format!(
            "Expected {} unclued flags; got {}", solved.len(), unclued.len(),
        )));
    }
    let mut sets = vec![];
    for (clue, flag) in unclued.iter().enumerate() {
        let set = solved.set(clue);
        let value = set.single().ok_or_else(|| Error::invalid_state(format!(
            "Anagram stage needs a solved grid; {} has {} candidates",
            solved.topology().id(clue), set.len(),
        )))?;
        let perms = anagram_candidates(value, set.length(), *flag, options);
        sets.push(CandidateSet::new(set.length(), perms.into()));
    }
    GridState::new(solved.topology().clone(), sets)
}

/// Runs the second stage: build the permutation grid, then propagate and
/// search it exactly like the primary grid.
pub fn anagram_solve<R: Ranker>(
    solved: &GridState,
    unclued: &[bool],
    options: &AnagramOptions,
    ranker: &R,
    budget: SearchBudget,
    observer: Option<&mut dyn StepObserver>,
) -> Result<SolveOutcome, Error> {
    let root = anagram_state(solved, unclued, options)?;
    let observer = observer.map(|o| o as &mut dyn StepObserver);
    let mut finder = FindFirstSolution::new(root, ranker, observer);
    finder.solve_within(budget)
}

/// Does `anagram` keep every entry's digits and make each unclued entry a
/// large enough multiple of its original?
pub fn is_valid_anagram(original: &GridState, anagram: &GridState, unclued: &[bool], options: &AnagramOptions) -> bool {
    (0..original.len()).all(|clue| {
        let (Some(before), Some(after)) = (original.set(clue).single(), anagram.set(clue).single()) else {
            return false;
        };
        let length = original.set(clue).length();
        let mut a = to_digits(before, length);
        let mut b = to_digits(after, length);
        a.sort();
        b.sort();
        if a != b {
            return false;
        }
        if unclued[clue] {
            before != 0 && after % before == 0 && after / before >= options.min_multiple
        } else {
            options.allow_identity || before != after
        }
    })
}
