use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::Mutex;
use serde_derive::{Deserialize, Serialize};

/// Broad classification of an Error. Contradictions and exhaustion of the
/// search space are not errors; they are ordinary solver outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorKind {
    InvalidPredicate,
    InvalidTopology,
    InvalidState,
    Unsatisfiable,
    /// A search budget ran out before the search finished. Says nothing
    /// about whether a solution exists.
    BudgetExhausted,
    Io,
}

/// Error type. This is used to indicate something wrong with either the
/// puzzle definition (topology, predicates) or with how the engine is being
/// driven (e.g., stepping a solver that is already done).
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    msg: Cow<'static, str>,
}

impl Error {
    pub const fn new_const(kind: ErrorKind, s: &'static str) -> Self {
        Error { kind, msg: Cow::Borrowed(s) }
    }

    pub fn new<S: Into<String>>(kind: ErrorKind, s: S) -> Self {
        Error { kind, msg: Cow::Owned(s.into()) }
    }

    pub fn invalid_predicate<S: Into<String>>(s: S) -> Self {
        Self::new(ErrorKind::InvalidPredicate, s)
    }

    pub fn invalid_topology<S: Into<String>>(s: S) -> Self {
        Self::new(ErrorKind::InvalidTopology, s)
    }

    pub fn invalid_state<S: Into<String>>(s: S) -> Self {
        Self::new(ErrorKind::InvalidState, s)
    }

    pub fn kind(&self) -> ErrorKind { self.kind }

    pub fn message(&self) -> &str { &self.msg }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new(ErrorKind::Io, format!("JSON error: {}", e))
    }
}

/// Cells are addressed by [row, col]. The grid itself is always rectangular;
/// cells that belong to no entry are simply never mentioned.
pub type Index = [usize; 2];

/// Position of a clue within its Topology. Everything inside the engine is
/// keyed by this; ClueId is the human-facing identity.
pub type ClueIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
         Serialize, Deserialize, strum_macros::EnumIter)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    pub fn letter(&self) -> char {
        match self {
            Direction::Across => 'A',
            Direction::Down => 'D',
        }
    }

    /// The cell `offset` steps along an entry starting at `start`.
    pub fn step(&self, start: Index, offset: usize) -> Index {
        match self {
            Direction::Across => [start[0], start[1] + offset],
            Direction::Down => [start[0] + offset, start[1]],
        }
    }
}

/// Identity of a clue: its printed number plus direction. Ordering is by
/// number, then across before down, which is also the tie-break order the
/// ranker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClueId {
    pub number: u16,
    pub direction: Direction,
}

impl ClueId {
    pub const fn across(number: u16) -> Self {
        ClueId { number, direction: Direction::Across }
    }

    pub const fn down(number: u16) -> Self {
        ClueId { number, direction: Direction::Down }
    }
}

impl Display for ClueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.direction.letter())
    }
}

impl FromStr for ClueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let direction = match s.chars().last() {
            Some('A') | Some('a') => Direction::Across,
            Some('D') | Some('d') => Direction::Down,
            _ => return Err(Error::invalid_topology(format!("Clue id must end in A or D: {:?}", s))),
        };
        let number = s[..s.len() - 1].parse::<u16>()
            .map_err(|_| Error::invalid_topology(format!("Invalid clue number: {:?}", s)))?;
        Ok(ClueId { number, direction })
    }
}

struct ConstStringRegistry {
    mapping: HashMap<&'static str, usize>,
    next_id: usize,
}

impl ConstStringRegistry {
    pub fn new() -> Self { Self { mapping: HashMap::new(), next_id: 0 } }
    pub fn register(&mut self, name: &'static str) -> usize {
        if let Some(id) = self.mapping.get(name) {
            *id
        } else {
            let id = self.next_id;
            self.mapping.insert(name, id);
            self.next_id += 1;
            id
        }
    }
    pub fn name(&self, id: usize) -> Option<&'static str> {
        for (name, attr_id) in self.mapping.iter() {
            if *attr_id == id {
                return Some(name);
            }
        }
        None
    }
}

lazy_static::lazy_static! {
    static ref ATTRIBUTION_REGISTRY: Mutex<ConstStringRegistry> = {
        Mutex::new(ConstStringRegistry::new())
    };
}

/// Interned name explaining why something happened (a contradiction, a
/// branch). Comparing Attributions is comparing ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attribution {
    name: &'static str,
    id: usize,
}

impl Attribution {
    pub fn new(name: &'static str) -> Self {
        let id = match ATTRIBUTION_REGISTRY.lock() {
            Ok(mut registry) => registry.register(name),
            Err(poisoned) => poisoned.into_inner().register(name),
        };
        Attribution { name, id }
    }

    pub fn name(&self) -> &'static str { self.name }

    pub fn id(&self) -> usize { self.id }
}

// NOTE: Only use this for human-interface purposes (debugging, stats dumps),
// not while solving.
pub fn readable_attribution(id: usize) -> Option<Attribution> {
    let registry = ATTRIBUTION_REGISTRY.lock().ok()?;
    registry.name(id).map(|name| Attribution { name, id })
}

/// Largest number of digits a candidate may have (u64 holds 19).
pub const MAX_DIGITS: usize = 18;

const POW10: [u64; MAX_DIGITS + 1] = {
    let mut table = [1u64; MAX_DIGITS + 1];
    let mut i = 1;
    while i <= MAX_DIGITS {
        table[i] = table[i - 1] * 10;
        i += 1;
    }
    table
};

pub fn pow10(exp: usize) -> u64 {
    POW10[exp]
}

/// Digit at position `pos` (0 = leftmost) of `value` written zero-padded to
/// `length` digits.
#[inline]
pub fn digit_at(value: u64, length: usize, pos: usize) -> u8 {
    ((value / POW10[length - 1 - pos]) % 10) as u8
}

/// Zero-padded digits of `value`, most significant first.
pub fn to_digits(value: u64, length: usize) -> Vec<u8> {
    (0..length).map(|pos| digit_at(value, length, pos)).collect()
}

pub fn from_digits(digits: &[u8]) -> u64 {
    digits.iter().fold(0, |acc, d| acc * 10 + *d as u64)
}

/// Number of decimal digits in `value` (0 has one digit).
pub fn digit_count(value: u64) -> usize {
    let mut n = 1;
    let mut v = value / 10;
    while v > 0 {
        n += 1;
        v /= 10;
    }
    n
}

/// Does `value` render as exactly `length` digits? Leading zeros are padding
/// and only acceptable if the caller permits them.
pub fn fits_length(value: u64, length: usize, leading_zeros: bool) -> bool {
    if length == 0 || length > MAX_DIGITS {
        return false;
    }
    if value >= POW10[length] {
        return false;
    }
    leading_zeros || digit_count(value) == length
}

/// A set of decimal digits, packed into the low ten bits of a u16.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitSet(u16);

impl DigitSet {
    pub const fn empty() -> Self { DigitSet(0) }

    pub const fn full() -> Self { DigitSet(0x3ff) }

    pub fn singleton(d: u8) -> Self { DigitSet(1 << d) }

    pub fn insert(&mut self, d: u8) { self.0 |= 1 << d; }

    pub fn contains(&self, d: u8) -> bool { self.0 & (1 << d) != 0 }

    pub fn len(&self) -> usize { self.0.count_ones() as usize }

    pub fn is_empty(&self) -> bool { self.0 == 0 }

    pub fn intersection(&self, other: DigitSet) -> DigitSet { DigitSet(self.0 & other.0) }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..10u8).filter(|d| self.contains(*d))
    }

    /// The only digit in the set, if there is exactly one.
    pub fn single(&self) -> Option<u8> {
        if self.len() == 1 {
            Some(self.0.trailing_zeros() as u8)
        } else {
            None
        }
    }
}

impl Debug for DigitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, d) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clue_id_order_and_parse() -> Result<(), Error> {
        let mut ids = vec![ClueId::down(3), ClueId::across(3), ClueId::down(1), ClueId::across(12)];
        ids.sort();
        assert_eq!(ids, vec![ClueId::down(1), ClueId::across(3), ClueId::down(3), ClueId::across(12)]);
        assert_eq!("12D".parse::<ClueId>()?, ClueId::down(12));
        assert_eq!("7a".parse::<ClueId>()?, ClueId::across(7));
        assert_eq!(ClueId::across(7).to_string(), "7A");
        assert!("7X".parse::<ClueId>().is_err());
        assert!("A".parse::<ClueId>().is_err());
        Ok(())
    }

    #[test]
    fn test_digits() {
        assert_eq!(digit_at(2178, 4, 0), 2);
        assert_eq!(digit_at(2178, 4, 3), 8);
        assert_eq!(digit_at(42, 4, 0), 0);
        assert_eq!(to_digits(305, 4), vec![0, 3, 0, 5]);
        assert_eq!(from_digits(&[0, 3, 0, 5]), 305);
        assert_eq!(digit_count(0), 1);
        assert_eq!(digit_count(9801), 4);
        assert!(fits_length(9801, 4, false));
        assert!(!fits_length(801, 4, false));
        assert!(fits_length(801, 4, true));
        assert!(!fits_length(10000, 4, true));
    }

    #[test]
    fn test_digit_set() {
        let mut s = DigitSet::empty();
        assert!(s.is_empty());
        s.insert(3);
        assert_eq!(s.single(), Some(3));
        s.insert(0);
        s.insert(9);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![0, 3, 9]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.single(), None);
        assert_eq!(s.intersection(DigitSet::singleton(9)).single(), Some(9));
        assert_eq!(format!("{:?}", s), "{0,3,9}");
        assert_eq!(DigitSet::full().len(), 10);
    }

    #[test]
    fn test_attribution_interning() {
        let a = Attribution::new("SOME_REASON");
        let b = Attribution::new("SOME_REASON");
        let c = Attribution::new("OTHER_REASON");
        assert_eq!(a, b);
        assert_ne!(a.id(), c.id());
        assert_eq!(readable_attribution(c.id()).map(|a| a.name()), Some("OTHER_REASON"));
    }
}
