use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::time::Instant;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::de::DeserializeOwned;
use crate::core::Error;

/// Named wall-clock timings. Every run is fed the same seeded rng, so two
/// runs of a bench binary see the same random cases.
pub struct Bench {
    results: BTreeMap<String, f64>,
    rng: ChaCha20Rng,
}

const SEED: u64 = 0xeea42aa1638be961;

impl Bench {
    pub fn new() -> Self {
        Self {
            results: BTreeMap::new(),
            rng: ChaCha20Rng::seed_from_u64(SEED),
        }
    }

    pub fn benchmark<F: FnMut(&mut ChaCha20Rng)>(&mut self, n: usize, name: &str, mut f: F) {
        let start = Instant::now();
        for _ in 0..n {
            f(&mut self.rng);
        }
        self.record(name, start);
    }

    pub fn benchmark_cases<T, F: FnMut(&T, &mut ChaCha20Rng)>(&mut self, n: usize, cases: &[T], name: &str, mut f: F) {
        let start = Instant::now();
        for _ in 0..n {
            for case in cases {
                f(case, &mut self.rng);
            }
        }
        self.record(name, start);
    }

    fn record(&mut self, name: &str, start: Instant) {
        let duration = start.elapsed();
        println!("{}: {:?}", name, duration);
        self.results.insert(name.into(), duration.as_secs_f64());
    }

    pub fn results(&self) -> &BTreeMap<String, f64> { &self.results }

    pub fn into_results(self) -> BTreeMap<String, f64> {
        self.results
    }

    pub fn save_json(&self, filename: &str) -> Result<(), Error> {
        let mut f = File::create(filename)?;
        let json_data = serde_json::to_string_pretty(&self.results)?;
        f.write_all(json_data.as_bytes())?;
        Ok(())
    }
}

/// `right - left` for every name in either map; a missing side counts as 0.
pub fn diff_results(
    left: &BTreeMap<String, f64>, right: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let all_keys: BTreeSet<_> = left.keys().chain(right.keys()).cloned().collect();
    all_keys
        .into_iter()
        .map(|k| {
            let l = left.get(&k).unwrap_or(&0.0);
            let r = right.get(&k).unwrap_or(&0.0);
            (k, r - l)
        })
        .collect()
}

/// Reads a JSON results file written by a bench or stats dump. An empty file
/// reads as `T::default()`; a missing one is an Io error.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &str) -> Result<T, Error> {
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_diff_results() {
        let left = BTreeMap::from([("a".to_string(), 1.5), ("b".to_string(), 2.0)]);
        let right = BTreeMap::from([("b".to_string(), 1.0), ("c".to_string(), 4.0)]);
        let diff = diff_results(&left, &right);
        assert_eq!(diff, BTreeMap::from([
            ("a".to_string(), -1.5),
            ("b".to_string(), -1.0),
            ("c".to_string(), 4.0),
        ]));
    }

    #[test]
    fn test_seeded_cases_repeat() {
        let draw = || {
            let mut seen = vec![];
            let mut bench = Bench::new();
            bench.benchmark_cases(2, &[10u64, 100], "draw", |hi, rng| {
                seen.push(rng.random_range(0..*hi));
            });
            assert!(bench.results().contains_key("draw"));
            seen
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn test_read_json_or_default() -> Result<(), Error> {
        let dir = std::env::temp_dir();
        let empty = dir.join("listener_xword_bench_empty.json");
        let full = dir.join("listener_xword_bench_full.json");
        std::fs::write(&empty, "  \n")?;
        std::fs::write(&full, r#"{"propagate": 0.5}"#)?;
        let read: BTreeMap<String, f64> = read_json_or_default(empty.to_str().unwrap())?;
        assert!(read.is_empty());
        let read: BTreeMap<String, f64> = read_json_or_default(full.to_str().unwrap())?;
        assert_eq!(read, BTreeMap::from([("propagate".to_string(), 0.5)]));
        let err = read_json_or_default::<BTreeMap<String, f64>>("/nonexistent/bench.json").unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Io);
        std::fs::write(&empty, "{")?;
        assert!(read_json_or_default::<BTreeMap<String, f64>>(empty.to_str().unwrap()).is_err());
        Ok(())
    }
}
