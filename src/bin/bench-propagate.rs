use std::sync::Arc;
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use listener_xword::{
    bench::Bench,
    candidates::{CandidateSet, GridState},
    constraint::{Propagator, QueueOrder},
    predicate::{length_range, CandidateGenerator, Predicate, DIGIT_SUM_PRODUCT, PRIME_SIGNATURE},
    ranker::{FirstUnsolvedRanker, Ranker, StdRanker},
    solver::{FindFirstSolution, SearchBudget},
    topology::Topology,
};

// Trivially do something with a result just so nothing gets optimized away.
fn touch_state(s: &GridState) {
    assert!(s.total_candidates() >= s.solved_count());
}

/// An n x n block-free grid whose entries get `width` random candidates each.
struct RandomGrid {
    topology: Arc<Topology>,
    side: usize,
    width: usize,
}

impl RandomGrid {
    fn new(side: usize, width: usize) -> Self {
        let pattern = vec![".".repeat(side); side].join("\n");
        let topology = Topology::from_pattern(&pattern).expect("Block-free grids are always valid");
        Self { topology: Arc::new(topology), side, width }
    }

    fn sample(&self, rng: &mut ChaCha20Rng) -> GridState {
        let range = length_range(self.side, false);
        let sets = (0..self.topology.len()).map(|_| {
            let values = (0..self.width)
                .map(|_| rng.random_range(range.clone()))
                .collect::<Vec<_>>();
            CandidateSet::from_values(self.side, &values)
        }).collect();
        GridState::new(self.topology.clone(), sets).expect("Sampled sets match the topology")
    }

    fn run_propagate(&self, order: QueueOrder, rng: &mut ChaCha20Rng) {
        let state = self.sample(rng);
        if let Ok(s) = Propagator::new(order).propagate(&state) {
            touch_state(&s);
        }
    }

    fn run_search<R: Ranker>(&self, ranker: &R, rng: &mut ChaCha20Rng) {
        let state = self.sample(rng);
        let mut finder = FindFirstSolution::new(state, ranker, None);
        let outcome = finder.solve_within(SearchBudget::steps(10000)).expect("Search failed");
        if let Some(s) = outcome.solved() {
            touch_state(s);
        }
    }
}

trait GenerateBench {
    fn run_generate(&self, rng: &mut ChaCha20Rng);
}

struct Generate {
    generator: CandidateGenerator,
    length: usize,
    max_b: u64,
    max_c: u64,
}

impl GenerateBench for Generate {
    fn run_generate(&self, rng: &mut ChaCha20Rng) {
        let b = rng.random_range(1..=self.max_b);
        let c = rng.random_range(1..=self.max_c.min(b));
        let p = Predicate::Params { b, c };
        if let Ok(values) = self.generator.generate(self.length, &p) {
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let mut bench = Bench::new();
    let grids = vec![
        RandomGrid::new(3, 20),
        RandomGrid::new(4, 50),
        RandomGrid::new(5, 200),
    ];
    bench.benchmark_cases(200, &grids, "propagate_fifo", |g, rng| {
        g.run_propagate(QueueOrder::Fifo, rng);
    });
    bench.benchmark_cases(200, &grids, "propagate_lifo", |g, rng| {
        g.run_propagate(QueueOrder::Lifo, rng);
    });
    let std_ranker = StdRanker::default();
    let first_unsolved = FirstUnsolvedRanker::default();
    bench.benchmark_cases(50, &grids[..2], "search_fewest_candidates", |g, rng| {
        g.run_search(&std_ranker, rng);
    });
    bench.benchmark_cases(50, &grids[..2], "search_first_unsolved", |g, rng| {
        g.run_search(&first_unsolved, rng);
    });
    let generators: Vec<Box<dyn GenerateBench>> = vec_box::vec_box![
        Generate { generator: CandidateGenerator::new(PRIME_SIGNATURE, false), length: 4, max_b: 13, max_c: 4 },
        Generate { generator: CandidateGenerator::new(PRIME_SIGNATURE, false), length: 5, max_b: 16, max_c: 5 },
        Generate { generator: CandidateGenerator::new(DIGIT_SUM_PRODUCT, false), length: 4, max_b: 36, max_c: 36 },
    ];
    bench.benchmark_cases(100, &generators, "generate_memoized", |g, rng| {
        g.run_generate(rng);
    });
    std::fs::create_dir_all("stats")?;
    bench.save_json("stats/bench-propagate.json")?;
    Ok(())
}
