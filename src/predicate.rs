use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use num::integer::{Integer, Roots};
use serde_derive::{Deserialize, Serialize};
use crate::core::{digit_count, fits_length, pow10, to_digits, Error, MAX_DIGITS};
use crate::memo::{MemoCalc, MemoLock};

/// What a clue says about its entry. Generation dispatches on the variant;
/// the arithmetic meaning of `Params` comes from the puzzle's ArithmeticRule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Any integer of the right length (subject to crossings, and later to
    /// the anagram stage's multiple requirement).
    Unclued,
    /// The puzzle-supplied "b:c" pair.
    Params { b: u64, c: u64 },
    /// Candidates listed outright. Used for givens and hand-made grids.
    Explicit { values: Vec<u64> },
}

impl Predicate {
    pub fn is_unclued(&self) -> bool {
        matches!(self, Predicate::Unclued)
    }
}

/// A decidable membership test parametrised by a clue's (b, c) pair.
/// `holds` decides a single integer; `accepts` rejects parameter pairs that
/// could never be met by an integer of the given length, which is reported
/// as InvalidPredicate rather than as an empty candidate set.
///
/// `name` keys the generation cache, so distinct rules need distinct names.
#[derive(Clone, Copy)]
pub struct ArithmeticRule {
    pub name: &'static str,
    pub holds: fn(n: u64, b: u64, c: u64) -> bool,
    pub accepts: fn(length: usize, b: u64, c: u64) -> bool,
}

impl Debug for ArithmeticRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArithmeticRule({})", self.name)
    }
}

impl PartialEq for ArithmeticRule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// (total prime factors counted with multiplicity, distinct prime factors).
/// 0 and 1 have no factorisation and report (0, 0).
pub fn prime_signature(n: u64) -> (u64, u64) {
    if n < 2 {
        return (0, 0);
    }
    let mut rest = n;
    let mut total = 0;
    let mut distinct = 0;
    let mut p = 2u64;
    let mut limit = rest.sqrt();
    while p <= limit {
        let (q, r) = rest.div_rem(&p);
        if r == 0 {
            distinct += 1;
            rest = q;
            total += 1;
            while rest % p == 0 {
                rest /= p;
                total += 1;
            }
            limit = rest.sqrt();
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if rest > 1 {
        total += 1;
        distinct += 1;
    }
    (total, distinct)
}

fn prime_signature_holds(n: u64, b: u64, c: u64) -> bool {
    prime_signature(n) == (b, c)
}

fn prime_signature_accepts(length: usize, b: u64, c: u64) -> bool {
    // The smallest number with b prime factors is 2^b.
    c >= 1 && c <= b && b < 64 && (1u64 << b) < pow10(length)
}

/// b = number of prime factors counted with multiplicity, c = number of
/// distinct prime factors. (12 = 2*2*3 has b=3, c=2.)
pub const PRIME_SIGNATURE: ArithmeticRule = ArithmeticRule {
    name: "PRIME_SIGNATURE",
    holds: prime_signature_holds,
    accepts: prime_signature_accepts,
};

fn digit_sum_product_holds(n: u64, b: u64, c: u64) -> bool {
    let digits = to_digits(n, digit_count(n));
    let sum: u64 = digits.iter().map(|d| *d as u64).sum();
    let product: u64 = digits.iter().map(|d| *d as u64).product();
    sum == b && product == c
}

fn digit_sum_product_accepts(length: usize, b: u64, _: u64) -> bool {
    b <= 9 * length as u64
}

/// b = digit sum, c = digit product.
pub const DIGIT_SUM_PRODUCT: ArithmeticRule = ArithmeticRule {
    name: "DIGIT_SUM_PRODUCT",
    holds: digit_sum_product_holds,
    accepts: digit_sum_product_accepts,
};

pub const BUILTIN_RULES: [ArithmeticRule; 2] = [PRIME_SIGNATURE, DIGIT_SUM_PRODUCT];

pub fn rule_by_name(name: &str) -> Result<ArithmeticRule, Error> {
    BUILTIN_RULES.iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .copied()
        .ok_or_else(|| Error::invalid_predicate(format!("Unknown arithmetic rule: {:?}", name)))
}

/// Longest entry whose Unclued or Params candidates are enumerated by brute
/// force. Longer entries must be given Explicit candidates.
pub const MAX_ENUMERATED_DIGITS: usize = 7;

/// The integers that render as exactly `length` digits.
pub fn length_range(length: usize, leading_zeros: bool) -> std::ops::Range<u64> {
    let lo = if leading_zeros || length == 1 { 0 } else { pow10(length - 1) };
    lo..pow10(length)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GenKey {
    rule: Option<&'static str>,
    length: usize,
    b: u64,
    c: u64,
    leading_zeros: bool,
}

lazy_static::lazy_static! {
    static ref GENERATED: Mutex<HashMap<GenKey, Arc<[u64]>>> = Mutex::new(HashMap::new());
}

struct Enumerate {
    rule: ArithmeticRule,
    leading_zeros: bool,
}

impl MemoCalc<(usize, Option<(u64, u64)>), GenKey, Arc<[u64]>> for Enumerate {
    fn key(&self, args: &(usize, Option<(u64, u64)>)) -> GenKey {
        let (length, params) = *args;
        let (b, c) = params.unwrap_or((0, 0));
        GenKey {
            rule: params.map(|_| self.rule.name),
            length,
            b,
            c,
            leading_zeros: self.leading_zeros,
        }
    }

    fn calc(&self, key: &GenKey) -> Arc<[u64]> {
        let range = length_range(key.length, key.leading_zeros);
        if key.rule.is_none() {
            return range.collect::<Vec<_>>().into();
        }
        range.filter(|n| (self.rule.holds)(*n, key.b, key.c))
            .collect::<Vec<_>>()
            .into()
    }
}

/// Produces a clue's initial candidate universe: sorted ascending, without
/// duplicates, every member exactly `length` digits long. An empty universe
/// is a valid answer (the caller treats it as unsatisfiable); only parameters
/// that can never work at this length are errors.
#[derive(Debug, Clone, Copy)]
pub struct CandidateGenerator {
    rule: ArithmeticRule,
    leading_zeros: bool,
}

impl CandidateGenerator {
    pub fn new(rule: ArithmeticRule, leading_zeros: bool) -> Self {
        Self { rule, leading_zeros }
    }

    pub fn rule(&self) -> ArithmeticRule { self.rule }

    pub fn leading_zeros(&self) -> bool { self.leading_zeros }

    pub fn generate(&self, length: usize, predicate: &Predicate) -> Result<Arc<[u64]>, Error> {
        if length == 0 || length > MAX_DIGITS {
            return Err(Error::invalid_predicate(format!(
                "Entries must have 1..={} digits; got {}", MAX_DIGITS, length,
            )));
        }
        let params = match predicate {
            Predicate::Explicit { values } => return self.explicit(length, values),
            Predicate::Unclued => None,
            Predicate::Params { b, c } => {
                if !(self.rule.accepts)(length, *b, *c) {
                    return Err(Error::invalid_predicate(format!(
                        "{} cannot be satisfied by a {}-digit number with b={}, c={}",
                        self.rule.name, length, b, c,
                    )));
                }
                Some((*b, *c))
            },
        };
        if length > MAX_ENUMERATED_DIGITS {
            return Err(Error::invalid_predicate(format!(
                "Cannot enumerate {}-digit entries; list candidates explicitly", length,
            )));
        }
        let mut memo = MemoLock::new(&GENERATED, Enumerate {
            rule: self.rule,
            leading_zeros: self.leading_zeros,
        });
        Ok(memo.get(&(length, params)).clone())
    }

    fn explicit(&self, length: usize, values: &[u64]) -> Result<Arc<[u64]>, Error> {
        if let Some(v) = values.iter().find(|v| !fits_length(**v, length, self.leading_zeros)) {
            return Err(Error::invalid_predicate(format!(
                "Explicit candidate {} is not a {}-digit number", v, length,
            )));
        }
        let mut sorted = values.to_vec();
        sorted.sort();
        sorted.dedup();
        Ok(sorted.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::ErrorKind;

    #[test]
    fn test_prime_signature() {
        assert_eq!(prime_signature(1), (0, 0));
        assert_eq!(prime_signature(2), (1, 1));
        assert_eq!(prime_signature(12), (3, 2));
        assert_eq!(prime_signature(49), (2, 1));
        assert_eq!(prime_signature(97), (1, 1));
        assert_eq!(prime_signature(2 * 3 * 5 * 7 * 11), (5, 5));
        assert_eq!(prime_signature(1024), (10, 1));
    }

    #[test]
    fn test_explicit_is_sorted_and_checked() -> Result<(), Error> {
        let g = CandidateGenerator::new(PRIME_SIGNATURE, false);
        let vals = g.generate(2, &Predicate::Explicit { values: vec![43, 12, 34, 21, 12] })?;
        assert_eq!(&vals[..], &[12, 21, 34, 43]);
        let bad = g.generate(2, &Predicate::Explicit { values: vec![12, 123] });
        assert_eq!(bad.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        let padded = g.generate(2, &Predicate::Explicit { values: vec![7] });
        assert_eq!(padded.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        let lz = CandidateGenerator::new(PRIME_SIGNATURE, true);
        assert_eq!(&lz.generate(2, &Predicate::Explicit { values: vec![7] })?[..], &[7]);
        Ok(())
    }

    #[test]
    fn test_unclued() -> Result<(), Error> {
        let g = CandidateGenerator::new(DIGIT_SUM_PRODUCT, false);
        let vals = g.generate(2, &Predicate::Unclued)?;
        assert_eq!(vals.len(), 90);
        assert_eq!(vals[0], 10);
        assert_eq!(vals[89], 99);
        let lz = CandidateGenerator::new(DIGIT_SUM_PRODUCT, true);
        let vals = lz.generate(2, &Predicate::Unclued)?;
        assert_eq!(vals.len(), 100);
        assert_eq!(vals[0], 0);
        assert_eq!(g.generate(1, &Predicate::Unclued)?.len(), 10);
        Ok(())
    }

    #[test]
    fn test_params() -> Result<(), Error> {
        let dsp = CandidateGenerator::new(DIGIT_SUM_PRODUCT, false);
        let vals = dsp.generate(3, &Predicate::Params { b: 6, c: 6 })?;
        assert_eq!(&vals[..], &[123, 132, 213, 231, 312, 321]);
        let ps = CandidateGenerator::new(PRIME_SIGNATURE, false);
        let squares = ps.generate(2, &Predicate::Params { b: 2, c: 1 })?;
        assert_eq!(&squares[..], &[25, 49]);
        let primes = ps.generate(2, &Predicate::Params { b: 1, c: 1 })?;
        assert_eq!(primes.len(), 21);
        assert_eq!(primes[0], 11);
        assert_eq!(primes[20], 97);
        // Second call comes from the cache and is the very same allocation.
        let again = ps.generate(2, &Predicate::Params { b: 1, c: 1 })?;
        assert!(Arc::ptr_eq(&primes, &again));
        Ok(())
    }

    #[test]
    fn test_empty_is_not_an_error() -> Result<(), Error> {
        let g = CandidateGenerator::new(DIGIT_SUM_PRODUCT, false);
        let vals = g.generate(2, &Predicate::Params { b: 18, c: 80 })?;
        assert!(vals.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_predicates() {
        let ps = CandidateGenerator::new(PRIME_SIGNATURE, false);
        for (length, b, c) in [(2, 2, 3), (2, 7, 1), (3, 0, 0)] {
            let r = ps.generate(length, &Predicate::Params { b, c });
            assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        }
        let dsp = CandidateGenerator::new(DIGIT_SUM_PRODUCT, false);
        let r = dsp.generate(2, &Predicate::Params { b: 19, c: 0 });
        assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        let r = dsp.generate(0, &Predicate::Unclued);
        assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        let r = dsp.generate(MAX_ENUMERATED_DIGITS + 1, &Predicate::Unclued);
        assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidPredicate);
        let long = dsp.generate(10, &Predicate::Explicit { values: vec![1234567890] });
        assert!(long.is_ok());
    }

    #[test]
    fn test_predicate_json() -> Result<(), Error> {
        let p: Predicate = serde_json::from_str(r#"{"kind": "params", "b": 3, "c": 2}"#)?;
        assert_eq!(p, Predicate::Params { b: 3, c: 2 });
        let u: Predicate = serde_json::from_str(r#"{"kind": "unclued"}"#)?;
        assert!(u.is_unclued());
        assert_eq!(rule_by_name("digit_sum_product")?, DIGIT_SUM_PRODUCT);
        assert!(rule_by_name("FIBONACCI").is_err());
        Ok(())
    }
}
