use std::collections::{HashMap, hash_map::Entry};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};

/// A calculation worth caching across calls: `key` maps the caller's
/// arguments (plus whatever configuration the calculator carries) to a cache
/// key, and `calc` does the real work on a miss.
pub trait MemoCalc<A, K: Eq + Clone + Hash + 'static, V: 'static> {
    fn key(&self, args: &A) -> K;
    fn calc(&self, key: &K) -> V;
}

/// Holds the lock on a process-wide memo table for as long as it lives.
/// Release it before asking for another lock on the same table.
pub struct MemoLock<A, K: Eq + Clone + Hash + 'static, V: 'static, C: MemoCalc<A, K, V>> {
    guard: MutexGuard<'static, HashMap<K, V>>,
    calc: C,
    _marker: PhantomData<A>,
}

impl <A, K: Eq + Clone + Hash + 'static, V: 'static, C: MemoCalc<A, K, V>> MemoLock<A, K, V, C> {
    pub fn new(table: &'static Mutex<HashMap<K, V>>, calc: C) -> Self {
        // A panic while a calculation held the lock leaves the table itself
        // intact (entries are only inserted once fully computed).
        let guard = table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        MemoLock { guard, calc, _marker: PhantomData }
    }

    pub fn get(&mut self, args: &A) -> &V {
        let calc = &self.calc;
        let k = calc.key(args);
        match self.guard.entry(k.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let y = calc.calc(&k);
                v.insert(y)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }
}
