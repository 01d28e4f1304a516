use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::time::{Duration, Instant};
use plotters::chart::ChartBuilder;
use plotters::coord::Shift;
use plotters::prelude::{BitMapBackend, Circle, DrawResult, DrawingArea, DrawingBackend, IntoDrawingArea, IntoLogRange, IntoSegmentedCoord, MultiLineText, Rectangle, SegmentValue};
use plotters::style::{Color, IntoFont, BLUE, RED, WHITE};
use rand::distr::{Bernoulli, Distribution};
use rand::rngs::ThreadRng;
use serde_derive::{Deserialize, Serialize};
use crate::core::Error;
use crate::solver::{DfsSolverState, DfsSolverView, StepObserver};

pub struct NullObserver;

impl StepObserver for NullObserver {
    fn after_step(&mut self, _solver: &dyn DfsSolverView) {}
}

fn bar_chart<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, histogram: &Histogram, bar_margin: u32) -> DrawResult<(), DB> {
    let mut chart_builder = ChartBuilder::on(area);
    chart_builder.margin(5).set_left_and_bottom_label_area_size(20);
    let mut chart_context = chart_builder.build_cartesian_2d(
        (0..histogram.max + 1).into_segmented(),
        0..histogram.max_count + 1)?;
    chart_context.configure_mesh().draw()?;
    chart_context.draw_series(histogram.value_counts.iter().map(|(k, v)| {
        let x0 = SegmentValue::Exact(*k as i32);
        let x1 = SegmentValue::Exact((*k + 1) as i32);
        let mut bar = Rectangle::new([(x0, 0), (x1, *v as i32)], BLUE.filled());
        bar.set_margin(0, 0, bar_margin, bar_margin);
        bar
    }))?;
    Ok(())
}

fn ccdf<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, histogram: &Histogram) -> DrawResult<(), DB> {
    let mut vals: Vec<_> = histogram.value_counts.iter().collect();
    vals.sort_by_key(|&(val, _)| *val);
    let mut points = Vec::new();
    let mut cumulative = 0;
    for &(val, count) in vals.iter().rev() {
        cumulative += count;
        points.push((*val, (cumulative as f64) / (histogram.count.max(1) as f64)));
    }
    points.reverse();
    let mut chart_builder = ChartBuilder::on(area);
    chart_builder.margin(5).set_left_and_bottom_label_area_size(20);
    let mut chart_context = chart_builder.build_cartesian_2d(
        (1..histogram.max.max(2)).log_scale(),
        0.0..1.0)?;
    chart_context.configure_mesh().draw()?;
    chart_context.draw_series(
        points.into_iter().map(|(x, y)| Circle::new((x as i32, y), 3, RED.filled())),
    )?;
    Ok(())
}

enum TimerState {
    Init,
    Running(Instant),
    Ended(Duration),
}

impl TimerState {
    fn start(&mut self) {
        if let TimerState::Init = self {
            *self = TimerState::Running(Instant::now());
        }
    }

    fn end(&mut self) {
        if let TimerState::Running(s) = self {
            *self = TimerState::Ended(s.elapsed());
        }
    }

    fn to_duration(&self) -> Duration {
        match self {
            TimerState::Init => Duration::ZERO,
            TimerState::Running(s) => s.elapsed(),
            TimerState::Ended(d) => *d,
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct Histogram {
    pub value_counts: HashMap<usize, usize>,
    pub total: i32,
    pub count: i32,
    pub max: i32,
    pub max_count: i32,
    pub mean: f32,
    pub median: f32,
}

impl Histogram {
    pub fn from_value_counts(value_to_count: &HashMap<usize, usize>) -> Histogram {
        let mut val_counts = value_to_count.iter().map(|(v, c)| (*v as i32, *c as i32)).collect::<Vec<_>>();
        val_counts.sort();
        let total = val_counts.iter().fold(0, |n, (v, c)| n + v * c);
        let count = val_counts.iter().fold(0, |n, (_, c)| n + c);
        let max = val_counts.iter().fold(0, |n, (v, _)| std::cmp::max(*v, n));
        let max_count = val_counts.iter().fold(0, |n, (_, c)| std::cmp::max(*c, n));
        let mean = if count == 0 { 0.0 } else { (total as f32) / (count as f32) };
        let median_lo_index = (count - 1) / 2;
        let median_hi_index = count / 2;
        let mut median_lo = None;
        let mut median_hi = None;
        let mut n = 0;
        for (v, c) in val_counts {
            let next_n = n + c;
            if median_lo.is_none() && median_lo_index < next_n {
                median_lo = Some(v);
            }
            if median_hi.is_none() && median_hi_index < next_n {
                median_hi = Some(v);
            }
            n = next_n;
            if median_lo.is_some() && median_hi.is_some() {
                break;
            }
        }
        let median = (median_lo.unwrap_or(0) as f32 + median_hi.unwrap_or(0) as f32) / 2.0;
        Histogram { value_counts: value_to_count.clone(), total, count, max, max_count, mean, median }
    }
}

enum SampleState {
    Never,
    AtEnd,
    EveryN(usize, usize),
    Probability(Bernoulli, ThreadRng),
    Time(Duration, Instant),
}

/// When an observer should act (print, dump a figure).
pub struct Sample {
    state: SampleState,
}

impl Sample {
    pub fn never() -> Self {
        Self { state: SampleState::Never }
    }

    pub fn at_end() -> Self {
        Self { state: SampleState::AtEnd }
    }

    pub fn every_n(n: usize) -> Self {
        Self { state: SampleState::EveryN(n, 0) }
    }

    pub fn probability(p: f64) -> Result<Self, Error> {
        let d = Bernoulli::new(p)
            .map_err(|e| Error::invalid_state(format!("Bad sampling probability {}: {}", p, e)))?;
        Ok(Self { state: SampleState::Probability(d, rand::rng()) })
    }

    pub fn time(every: Duration) -> Self {
        Self { state: SampleState::Time(every, Instant::now()) }
    }

    pub fn sample(&mut self, solver: &dyn DfsSolverView) -> bool {
        match &mut self.state {
            SampleState::Never => false,
            SampleState::AtEnd => solver.is_done(),
            SampleState::EveryN(n, count) => {
                *count += 1;
                if count >= n || solver.is_done() {
                    *count = 0;
                    true
                } else {
                    false
                }
            },
            SampleState::Probability(d, rng) => d.sample(rng) || solver.is_done(),
            SampleState::Time(duration, last) => {
                if last.elapsed() >= *duration || solver.is_done() {
                    *last = Instant::now();
                    true
                } else {
                    false
                }
            },
        }
    }
}

/// Serialisable digest of one run, for comparing runs with `diff-stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSummary {
    pub steps: i64,
    pub branch_points: i64,
    pub backtracks: i64,
    pub contradictions: i64,
    pub max_depth: i64,
    pub pruned: i64,
    pub mean_width: f64,
    pub elapsed_secs: f64,
}

impl StatsSummary {
    /// Field-by-field `self - baseline`.
    pub fn delta_from(&self, baseline: &StatsSummary) -> StatsSummary {
        StatsSummary {
            steps: self.steps - baseline.steps,
            branch_points: self.branch_points - baseline.branch_points,
            backtracks: self.backtracks - baseline.backtracks,
            contradictions: self.contradictions - baseline.contradictions,
            max_depth: self.max_depth - baseline.max_depth,
            pruned: self.pruned - baseline.pruned,
            mean_width: self.mean_width - baseline.mean_width,
            elapsed_secs: self.elapsed_secs - baseline.elapsed_secs,
        }
    }

    pub fn save_json(&self, filename: &str) -> Result<(), Error> {
        let mut f = File::create(filename)?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        Ok(())
    }
}

/// Prints sampled solver states and keeps histograms of the search's shape.
pub struct DbgObserver {
    timer: TimerState,
    print_sample: Sample,
    stat: Option<(String, Sample)>,
    advance_hist: HashMap<usize, usize>,
    width_hist: HashMap<usize, usize>,
    backtrack_hist: HashMap<usize, usize>,
    backtrack_delay_hist: HashMap<usize, usize>,
    solved_hist: HashMap<usize, usize>,
    depth_hist: HashMap<usize, usize>,
    prev_state: Option<DfsSolverState>,
    streak: usize,
    steps: usize,
    summary: StatsSummary,
}

impl DbgObserver {
    pub fn new() -> Self {
        DbgObserver {
            timer: TimerState::Init,
            print_sample: Sample::every_n(1),
            stat: None,
            advance_hist: HashMap::new(),
            width_hist: HashMap::new(),
            backtrack_hist: HashMap::new(),
            backtrack_delay_hist: HashMap::new(),
            solved_hist: HashMap::new(),
            depth_hist: HashMap::new(),
            prev_state: None,
            streak: 0,
            steps: 0,
            summary: StatsSummary::default(),
        }
    }

    pub fn sample_print(&mut self, sample: Sample) -> &mut Self {
        self.print_sample = sample;
        self
    }

    pub fn sample_stats<Str: Into<String>>(&mut self, filename: Str, sample: Sample) -> &mut Self {
        self.stat = Some((filename.into(), sample));
        self
    }

    pub fn steps(&self) -> usize { self.steps }

    pub fn width_histogram(&self) -> Histogram {
        Histogram::from_value_counts(&self.width_hist)
    }

    fn update_stats(&mut self, solver: &dyn DfsSolverView) {
        match solver.solver_state() {
            DfsSolverState::Advancing(state) => {
                if let Some(DfsSolverState::Advancing(_)) = self.prev_state {
                    self.streak += 1;
                } else {
                    self.streak = 1;
                }
                *self.advance_hist.entry(self.streak).or_default() += 1;
                if state.possibilities > 0 {
                    *self.width_hist.entry(state.possibilities).or_default() += 1;
                }
            },
            DfsSolverState::Backtracking => {
                if let Some(DfsSolverState::Backtracking) = self.prev_state {
                    self.streak += 1;
                } else {
                    self.streak = 1;
                }
                *self.backtrack_hist.entry(self.streak).or_default() += 1;
            },
            _ => {},
        }
        self.prev_state = Some(solver.solver_state());
        if let Some(backtracked_steps) = solver.backtracked_steps() {
            *self.backtrack_delay_hist.entry(backtracked_steps).or_default() += 1;
        }
        *self.solved_hist.entry(solver.state().solved_count()).or_default() += 1;
        *self.depth_hist.entry(solver.depth()).or_default() += 1;
        self.steps += 1;
        let stats = solver.stats();
        self.summary = StatsSummary {
            steps: stats.steps as i64,
            branch_points: stats.branch_points as i64,
            backtracks: stats.backtracks as i64,
            contradictions: stats.contradictions as i64,
            max_depth: stats.max_depth as i64,
            pruned: stats.pruned as i64,
            mean_width: self.width_histogram().mean as f64,
            elapsed_secs: self.timer.to_duration().as_secs_f64(),
        };
    }

    pub fn summary(&self) -> &StatsSummary { &self.summary }

    fn stats_figure<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> DrawResult<(), DB> {
        area.fill(&WHITE)?;
        let (top, bottom) = area.split_vertically(50);
        let mut top_caption = MultiLineText::<_, String>::new((15, 15), ("sans-serif", 24).into_font());
        top_caption.push_line(format!(
            "Steps: {}; Seconds elapsed: {}", self.steps,
            self.timer.to_duration().as_secs_f64(),
        ));
        top.draw(&top_caption)?;
        let areas = bottom.split_evenly((3, 2));
        for (i, caption, value_counts, bar_margin) in [
            (0, "Num. candidates at each guess", &self.width_hist, 5),
            (1, "Num. steps with N solved entries", &self.solved_hist, 0),
            (2, "Advance streaks", &self.advance_hist, 1),
            (3, "Guess depth", &self.depth_hist, 1),
            (4, "Backtrack streaks", &self.backtrack_hist, 1),
            (5, "Misstep/backtrack delay", &self.backtrack_delay_hist, 1),
        ] {
            let hist = Histogram::from_value_counts(value_counts);
            let (upper, lower) = areas[i].split_vertically(areas[i].relative_to_height(0.18));
            let mut extended_caption = MultiLineText::<_, String>::new((5, 5), ("sans-serif", 14).into_font());
            extended_caption.push_line(caption);
            extended_caption.push_line(format!(
                "E = {:.3}, lg2(E) = {:.3}, med = {:.1}, max = {}",
                hist.mean, hist.mean.log2(), hist.median, hist.max,
            ));
            upper.draw(&extended_caption)?;
            let (left, right) = lower.split_horizontally(lower.relative_to_width(0.5));
            bar_chart(&left, &hist, bar_margin)?;
            ccdf(&right, &hist)?;
        }
        Ok(())
    }

    /// Prints a digest and draws the histogram figure to `hist_filename`
    /// (PNG); the JSON summary goes next to it.
    pub fn dump_stats(&self, hist_filename: &str) -> Result<(), Box<dyn std::error::Error>> {
        print!("Steps: {}\n", self.steps);
        print!("Time elapsed: {}\n", self.timer.to_duration().as_secs_f64());
        print!("Average Decision Width: {}\n", self.summary.mean_width);
        let area = BitMapBackend::new(hist_filename, (800, 1000)).into_drawing_area();
        self.stats_figure(&area).map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;
        self.summary.save_json(&format!("{}.json", hist_filename.trim_end_matches(".png")))?;
        Ok(())
    }

    pub fn print(&self, solver: &dyn DfsSolverView) {
        let elapsed = self.timer.to_duration().as_secs_f64();
        let label = if solver.is_initializing() {
            "INITIALIZING"
        } else if solver.solver_state() == DfsSolverState::Solved {
            "SOLVED"
        } else if solver.is_done() {
            print!("UNSOLVABLE after {} steps; {} elapsed\n", solver.step_count(), elapsed);
            return;
        } else {
            "STEP"
        };
        let contradiction = match solver.contradiction() {
            Some(c) => format!("Contradiction({})", c),
            None => "Ok".to_string(),
        };
        print!(
            "{}: {:?} at depth {}; {} elapsed\n{:?}{}\n",
            label, solver.most_recent_action(), solver.depth(), elapsed,
            solver.state(), contradiction,
        );
    }
}

impl StepObserver for DbgObserver {
    fn after_step(&mut self, solver: &dyn DfsSolverView) {
        self.timer.start();
        if solver.is_done() {
            self.timer.end();
        }
        self.update_stats(solver);
        if self.print_sample.sample(solver) {
            self.print(solver);
        }
        if let Some((f, s)) = &mut self.stat {
            let filename = f.clone();
            if s.sample(solver) {
                self.dump_stats(&filename)
                    .unwrap_or_else(|e| eprintln!("Failed to dump stats: {}\n", e));
            }
        }
    }
}
