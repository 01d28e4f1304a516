use std::collections::VecDeque;
use std::fmt::Display;
use crate::candidates::GridState;
use crate::core::{Attribution, ClueId, ClueIdx};

/// Some entry's candidates were all eliminated by a crossing partner.
pub const CROSSING_WIPEOUT: &str = "CROSSING_WIPEOUT";
/// An entry had no candidates before propagation even started (e.g., its
/// predicate matched nothing), or its last one was excluded.
pub const EMPTY_CANDIDATES: &str = "EMPTY_CANDIDATES";
/// A value was committed that the entry no longer admits.
pub const NOT_A_CANDIDATE: &str = "NOT_A_CANDIDATE";

/// Propagation found an entry with no remaining candidates. Not an Error:
/// search recovers from these by backtracking, and interactive callers by
/// discarding the attempted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contradiction {
    pub clue: ClueId,
    pub attribution: Attribution,
}

impl Contradiction {
    pub fn new(clue: ClueId, name: &'static str) -> Self {
        Contradiction { clue, attribution: Attribution::new(name) }
    }
}

impl Display for Contradiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.attribution.name(), self.clue)
    }
}

/// Work-queue discipline. The fixpoint is the same either way; only the
/// amount of work done to reach it differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrder {
    #[default]
    Fifo,
    Lifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagationStats {
    /// Times a changed entry was taken off the queue.
    pub visits: usize,
    /// Candidates eliminated across all entries.
    pub pruned: usize,
}

/// Arc-consistency over the crossing relation: a candidate survives only if
/// every crossing partner still has some candidate showing the same digit in
/// the shared cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct Propagator {
    order: QueueOrder,
}

impl Propagator {
    pub fn new(order: QueueOrder) -> Self { Propagator { order } }

    /// Narrows `state` to the fixpoint reachable from the `changed` entries.
    /// On Contradiction, `state` is left partially narrowed and should be
    /// thrown away.
    pub fn propagate_in_place<I: IntoIterator<Item = ClueIdx>>(
        &self,
        state: &mut GridState,
        changed: I,
    ) -> Result<PropagationStats, Contradiction> {
        let topology = state.topology().clone();
        if let Some(clue) = state.first_empty() {
            return Err(Contradiction::new(topology.id(clue), EMPTY_CANDIDATES));
        }
        let mut stats = PropagationStats::default();
        let mut queue = VecDeque::new();
        let mut queued = vec![false; topology.len()];
        for clue in changed {
            if !queued[clue] {
                queued[clue] = true;
                queue.push_back(clue);
            }
        }
        loop {
            let next = match self.order {
                QueueOrder::Fifo => queue.pop_front(),
                QueueOrder::Lifo => queue.pop_back(),
            };
            let Some(a) = next else { break };
            queued[a] = false;
            stats.visits += 1;
            for x in &topology.entry(a).crossings {
                let allowed = state.set(a).digits_at(x.pos);
                let partner = state.set_mut(x.other);
                let before = partner.len();
                if !partner.retain_digits(x.other_pos, allowed) {
                    continue;
                }
                let after = partner.len();
                stats.pruned += before - after;
                if after == 0 {
                    return Err(Contradiction::new(topology.id(x.other), CROSSING_WIPEOUT));
                }
                if !queued[x.other] {
                    queued[x.other] = true;
                    queue.push_back(x.other);
                }
            }
        }
        Ok(stats)
    }

    /// Pure form: the fixpoint of `state` with every entry considered
    /// changed. `state` itself is never modified.
    pub fn propagate(&self, state: &GridState) -> Result<GridState, Contradiction> {
        let mut next = state.clone();
        self.propagate_in_place(&mut next, 0..state.len())?;
        Ok(next)
    }

    /// Commit `value` for `clue`, then propagate to the fixpoint. Every entry
    /// is considered changed, so `state` need not be a fixpoint itself.
    pub fn commit(&self, state: &GridState, clue: ClueIdx, value: u64) -> Result<GridState, Contradiction> {
        let mut next = state.clone();
        Self::restrict(&mut next, clue, value)?;
        self.propagate_in_place(&mut next, 0..state.len())?;
        Ok(next)
    }

    /// Commit `value` for `clue` and propagate from that entry only. `state`
    /// must already be a fixpoint (as every state inside a search is);
    /// otherwise arcs away from `clue` go unchecked.
    pub fn commit_in_place(&self, state: &mut GridState, clue: ClueIdx, value: u64) -> Result<PropagationStats, Contradiction> {
        Self::restrict(state, clue, value)?;
        self.propagate_in_place(state, [clue])
    }

    fn restrict(state: &mut GridState, clue: ClueIdx, value: u64) -> Result<(), Contradiction> {
        if !state.set(clue).contains(value) {
            return Err(Contradiction::new(state.topology().id(clue), NOT_A_CANDIDATE));
        }
        state.set_mut(clue).restrict_to(value);
        Ok(())
    }

    /// Remove `value` from `clue`'s candidates, then propagate to the
    /// fixpoint from every entry.
    pub fn exclude(&self, state: &GridState, clue: ClueIdx, value: u64) -> Result<GridState, Contradiction> {
        let mut next = state.clone();
        if next.set_mut(clue).remove(value) && next.set(clue).is_empty() {
            return Err(Contradiction::new(state.topology().id(clue), EMPTY_CANDIDATES));
        }
        self.propagate_in_place(&mut next, 0..state.len())?;
        Ok(next)
    }
}

/// Shorthand for `Propagator::default().propagate(state)`.
pub fn propagate(state: &GridState) -> Result<GridState, Contradiction> {
    Propagator::default().propagate(state)
}

/// Does every crossing pair of candidates have a partner agreeing on the
/// shared digit? True of every propagation fixpoint.
pub fn is_arc_consistent(state: &GridState) -> bool {
    let topology = state.topology();
    topology.entries().iter().enumerate().all(|(a, e)| {
        e.crossings.iter().all(|x| {
            let theirs = state.set(x.other).digits_at(x.other_pos);
            state.set(a).digits_at(x.pos).iter().all(|d| theirs.contains(d))
        })
    })
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    pub fn assert_contradiction<T: std::fmt::Debug>(
        result: Result<T, Contradiction>,
        expected_attribution: &'static str,
    ) {
        match result {
            Err(c) => {
                let actual_attribution = c.attribution.name();
                assert_eq!(
                    actual_attribution, expected_attribution,
                    "Expected Contradiction to be attributed to {}; got {}",
                    expected_attribution, actual_attribution,
                );
            },
            Ok(v) => panic!("Expected a contradiction; got: {:?}", v),
        }
    }

    pub fn assert_no_contradiction<T>(result: &Result<T, Contradiction>) {
        if let Err(c) = result {
            panic!("Expected no contradiction; got: {}", c);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use rand::{Rng, SeedableRng};
    use rand::seq::SliceRandom;
    use rand_chacha::ChaCha20Rng;
    use super::*;
    use super::test_util::*;
    use crate::candidates::CandidateSet;
    use crate::core::Error;
    use crate::topology::{test_util::three_by_three, Topology, TopologyBuilder};

    // 1A across the top row, 2D down its last column.
    fn corner() -> Arc<Topology> {
        Arc::new(TopologyBuilder::new()
            .across(1, [0, 0], 2)
            .down(2, [0, 1], 2)
            .build()
            .unwrap())
    }

    fn state(t: &Arc<Topology>, sets: &[&[u64]]) -> GridState {
        let sets = t.entries().iter().zip(sets.iter())
            .map(|(e, vals)| CandidateSet::from_values(e.len(), vals))
            .collect();
        GridState::new(t.clone(), sets).unwrap()
    }

    #[test]
    fn test_crossing_forces_last_digit() -> Result<(), Error> {
        let t = corner();
        let s = state(&t, &[&[12, 21, 34, 43], &[45]]);
        let p = Propagator::default();
        let mut next = s.clone();
        let stats = p.propagate_in_place(&mut next, [1]).unwrap();
        assert_eq!(next.set(0).values(), vec![34]);
        assert_eq!(next.set(1).values(), vec![45]);
        assert_eq!(stats.pruned, 3);
        // Visits 2D, then 1A once because it changed; nothing more.
        assert_eq!(stats.visits, 2);
        // The input snapshot is untouched.
        assert_eq!(s.set(0).len(), 4);
        assert_eq!(propagate(&s).unwrap(), next);
        Ok(())
    }

    #[test]
    fn test_no_alignment_is_contradiction() {
        let t = corner();
        let s = state(&t, &[&[12, 13, 14], &[51, 61, 71]]);
        assert_contradiction(propagate(&s), CROSSING_WIPEOUT);
        assert_eq!(s.set(0).len(), 3);
        assert_eq!(s.set(1).len(), 3);
    }

    #[test]
    fn test_empty_input_is_contradiction() {
        let t = corner();
        let s = state(&t, &[&[], &[51]]);
        assert_contradiction(propagate(&s), EMPTY_CANDIDATES);
    }

    #[test]
    fn test_commit_and_exclude() {
        let t = corner();
        let s = state(&t, &[&[12, 21, 34, 43], &[24, 45, 17]]);
        let p = Propagator::default();
        let after = p.commit(&s, 0, 21).unwrap();
        assert_eq!(after.set(1).values(), vec![17]);
        assert_contradiction(p.commit(&s, 0, 99), NOT_A_CANDIDATE);
        let after = p.exclude(&s, 1, 45).unwrap();
        assert_eq!(after.set(0).values(), vec![12, 21]);
        let only = state(&t, &[&[12], &[24]]);
        assert_contradiction(p.exclude(&only, 1, 24), EMPTY_CANDIDATES);
    }

    #[test]
    fn test_commit_checks_arcs_away_from_the_clue() {
        // Entries in order 1A, 1D, 2D, 3A. Committing 1A = 12 suits 1D and
        // 2D, but 1D{12} and 3A{45} already disagree at [1, 0].
        let t = Arc::new(TopologyBuilder::new()
            .across(1, [0, 0], 2)
            .down(1, [0, 0], 2)
            .down(2, [0, 1], 2)
            .across(3, [1, 0], 2)
            .build()
            .unwrap());
        let s = state(&t, &[&[12, 13], &[12], &[24], &[45]]);
        assert!(!is_arc_consistent(&s));
        let p = Propagator::default();
        assert_contradiction(p.commit(&s, 0, 12), CROSSING_WIPEOUT);
        assert_contradiction(p.exclude(&s, 0, 13), CROSSING_WIPEOUT);
        // A consistent commit still lands on an arc-consistent fixpoint.
        let ok = state(&t, &[&[12, 13], &[14], &[25], &[45]]);
        let after = p.commit(&ok, 0, 12).unwrap();
        assert!(is_arc_consistent(&after));
        assert_eq!(after.set(3).values(), vec![45]);
    }

    fn random_state(t: &Arc<Topology>, rng: &mut ChaCha20Rng) -> GridState {
        let sets = t.entries().iter().map(|e| {
            let n = rng.random_range(5..60);
            let vals = (0..n).map(|_| rng.random_range(100..1000)).collect::<Vec<u64>>();
            CandidateSet::from_values(e.len(), &vals)
        }).collect();
        GridState::new(t.clone(), sets).unwrap()
    }

    #[test]
    fn test_fixpoint_properties() {
        let t = Arc::new(three_by_three());
        let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
        let mut consistent = 0;
        for _ in 0..200 {
            let s = random_state(&t, &mut rng);
            let fifo = Propagator::new(QueueOrder::Fifo).propagate(&s);
            let lifo = Propagator::new(QueueOrder::Lifo);
            let mut order = (0..t.len()).collect::<Vec<_>>();
            order.shuffle(&mut rng);
            let mut shuffled = s.clone();
            let lifo_result = lifo.propagate_in_place(&mut shuffled, order);
            match fifo {
                Ok(fixpoint) => {
                    consistent += 1;
                    assert_no_contradiction(&lifo_result);
                    assert_eq!(shuffled, fixpoint);
                    // Monotone: nothing grows.
                    for (before, after) in s.sets().iter().zip(fixpoint.sets()) {
                        assert!(after.iter().all(|v| before.contains(v)));
                    }
                    assert!(is_arc_consistent(&fixpoint));
                    assert_eq!(propagate(&fixpoint).unwrap(), fixpoint);
                    for (e, set) in t.entries().iter().zip(fixpoint.sets()) {
                        assert!(set.iter().all(|v| (100..1000).contains(&v)), "{} escaped its length", e.id);
                    }
                },
                Err(_) => assert!(lifo_result.is_err()),
            }
        }
        assert!(consistent > 0);
    }
}
