use std::{env, io, time::Duration};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Direction, Layout, Rect},
    style::Stylize,
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Paragraph},
    DefaultTerminal,
    Frame,
};
use strum::EnumCount;
use crate::{
    core::{ClueIdx, Error, Index},
    debug::{DbgObserver, Sample},
    puzzle::{ApplyResult, PuzzleSetter},
    session::Session,
    solver::{SearchBudget, SolveOutcome, StepObserver},
    tui_util::{draw_grid, draw_text_area, grid_wasd, scroll_lines, text_area_ws},
};

/// Solves the puzzle in command-line mode. No interactivity, but a StepObserver
/// can be passed in to periodically print out or save debug information. The
/// solution (and its anagram, if one exists) is printed at the end.
pub fn solve_cli<P: PuzzleSetter, D: StepObserver>(mut observer: D, budget: SearchBudget) -> color_eyre::Result<()> {
    let puzzle = P::setup()?;
    let start = puzzle.start()?;
    let outcome = puzzle.auto_solve_observed(&start, budget, Some(&mut observer as &mut dyn StepObserver))?;
    let solved = outcome.into_result()?;
    println!("Solution:\n{}", solved.render());
    match puzzle.anagram_solve(&solved, budget)? {
        SolveOutcome::Solved(anagram) => println!("Anagram:\n{}", anagram.render()),
        SolveOutcome::Unsatisfiable(c) => match c {
            Some(c) => println!("Anagram stage has no solution ({})", c),
            None => println!("Anagram stage has no solution"),
        },
        SolveOutcome::Unknown => println!("Anagram stage ran out of budget"),
    }
    Ok(())
}

/// Solves the puzzle in the interactive terminal UI.
pub fn solve_interactive<P: PuzzleSetter>(budget: SearchBudget) -> color_eyre::Result<()> {
    let session = Session::new(P::setup()?)?.with_budget(budget);
    let mut terminal = ratatui::init();
    let mut ts = TuiState::new(session);
    let app_result = tui_run(&mut ts, &mut terminal);
    ratatui::restore();
    Ok(app_result?)
}

/// Provides a convenient wrapper around solve_cli and solve_interactive that
/// does the appropriate thing based on flags:
///  - By default runs silently and dumps stats every 30s
///  - Can be configured to .sample_print()
///    --sample_secs=10 <-- Sample::time(Duration::from_secs(10))
///    --sample_every=10000 <-- Sample::every_n(10000)
///  - Can run in interactive mode instead:
///    --interactive
///  - Either way, --max_steps=N bounds each search.
pub fn solve_main<P: PuzzleSetter>(stats_file: &str) -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = parse_main_args(env::args().skip(1))?;
    if let MainFlags::Interactive = &args.flag {
        return solve_interactive::<P>(args.budget);
    }
    let mut dbg = DbgObserver::new();
    dbg.sample_stats(stats_file, Sample::time(Duration::from_secs(30)));
    match args.flag {
        MainFlags::Default => {
            dbg.sample_print(Sample::never());
        },
        MainFlags::SampleEvery(n) => {
            dbg.sample_print(Sample::every_n(n));
        },
        MainFlags::SampleSecs(s) => {
            dbg.sample_print(Sample::time(Duration::from_secs(s)));
        },
        MainFlags::Interactive => {},
    };
    solve_cli::<P, _>(dbg, args.budget)
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::collections::BTreeMap;
    use crate::candidates::GridState;
    use crate::core::ClueId;
    use crate::predicate::Predicate;

    /// Solves the puzzle (silently, unless a StepObserver is used), replacing
    /// the real clues with the provided ones. Panics if there is no solution.
    pub fn solve_with_clues<P: PuzzleSetter, D: StepObserver>(
        clues: BTreeMap<ClueId, Predicate>,
        mut observer: D,
    ) -> GridState {
        let puzzle = P::setup_with(clues).expect("Puzzle setup failed:");
        let start = puzzle.start().expect("Puzzle contradicts itself:");
        let outcome = puzzle.auto_solve_observed(&start, SearchBudget::unlimited(), Some(&mut observer as &mut dyn StepObserver))
            .expect("Puzzle solver returned an error:");
        outcome.into_result().expect("No solution found!")
    }

    /// You can use the interactive UI in your tests to debug problems.
    pub fn interactive_debug(session: Session) {
        let mut terminal = ratatui::init();
        let mut ts = TuiState::new(session);
        let app_result = tui_run(&mut ts, &mut terminal);
        ratatui::restore();
        app_result.unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MainFlags {
    Default,
    SampleSecs(u64),
    SampleEvery(usize),
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MainArgs {
    flag: MainFlags,
    budget: SearchBudget,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, Error> {
    let value = value.ok_or_else(|| Error::invalid_state(format!("{} requires a value", flag)))?;
    value.parse::<T>().map_err(|_| Error::invalid_state(format!(
        "Invalid value for {}: {}. Must be an unsigned integer.", flag, value,
    )))
}

fn parse_main_args<I: IntoIterator<Item = String>>(raw: I) -> Result<MainArgs, Error> {
    let mut args = vec![];
    for arg in raw {
        if let Some((x, y)) = arg.split_once("=") {
            args.push(x.to_string());
            args.push(y.to_string());
        } else {
            args.push(arg);
        }
    }
    let mut flag: Option<MainFlags> = None;
    let mut budget = SearchBudget::unlimited();
    let only_one = "You may only specify one of --sample_secs, --sample_every, and --interactive";
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let next = match arg.as_str() {
            "--sample_secs" => MainFlags::SampleSecs(parse_value(&arg, iter.next())?),
            "--sample_every" => MainFlags::SampleEvery(parse_value(&arg, iter.next())?),
            "--interactive" => MainFlags::Interactive,
            "--max_steps" => {
                budget.max_steps = Some(parse_value(&arg, iter.next())?);
                continue;
            },
            _ => return Err(Error::invalid_state(format!("Unknown flag: {}", arg))),
        };
        if flag.is_some() {
            return Err(Error::invalid_state(only_one));
        }
        flag = Some(next);
    }
    Ok(MainArgs { flag: flag.unwrap_or(MainFlags::Default), budget })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Err(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pane {
    Grid,
    TextArea,
}

#[derive(Debug, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, strum_macros::EnumCount)]
#[repr(u8)]
pub enum Mode {
    Readme = 1,
    Candidates,
    History,
    Anagram,
}

/// One line of feedback about the last key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Problem(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuiStateEvent {
    Ignore,
    PaneSwitch,
    ModeUpdate,
    SessionUpdate,
    Delegate(KeyEvent),
    Exit,
}

pub struct TuiState {
    pub session: Session,
    pub grid_pos: Index,
    pub grid_dims: [usize; 2],
    // Which of the entries through grid_pos is selected.
    pub entry_choice: usize,
    // Which of the selected entry's candidates is highlighted.
    pub candidate_pos: usize,
    pub scroll_pos: usize,
    pub scroll_lines: Vec<Line<'static>>,
    pub mode: Mode,
    pub active: Pane,
    pub notice: Option<Notice>,
    pub exit: Option<Status>,
}

impl TuiState {
    pub fn new(session: Session) -> Self {
        let t = session.puzzle().topology().clone();
        let start = t.cells().first().copied().unwrap_or([0, 0]);
        let mut state = Self {
            session,
            grid_pos: start,
            grid_dims: [t.rows(), t.cols()],
            entry_choice: 0,
            candidate_pos: 0,
            scroll_pos: 0,
            scroll_lines: Vec::new(),
            mode: Mode::Readme,
            active: Pane::Grid,
            notice: None,
            exit: None,
        };
        state.update();
        state
    }

    pub fn selected_clue(&self) -> Option<ClueIdx> {
        let at = self.session.puzzle().topology().entries_at(self.grid_pos);
        if at.is_empty() {
            None
        } else {
            Some(at[self.entry_choice % at.len()].0)
        }
    }

    pub fn selected_value(&self) -> Option<u64> {
        let clue = self.selected_clue()?;
        self.session.state().set(clue).iter().nth(self.candidate_pos)
    }

    fn selection(&mut self) -> Option<(ClueIdx, u64)> {
        match (self.selected_clue(), self.selected_value()) {
            (Some(clue), Some(v)) => Some((clue, v)),
            _ => {
                self.notice = Some(Notice::Problem("No entry selected".into()));
                None
            },
        }
    }

    fn report(&mut self, verb: &str, result: Result<ApplyResult, Error>) {
        self.notice = Some(match result {
            Ok(ApplyResult::Ok(_)) => Notice::Info(verb.to_string()),
            Ok(ApplyResult::Contradiction(c)) => Notice::Problem(format!("{} failed: {}", verb, c)),
            Err(e) => Notice::Problem(e.to_string()),
        });
    }

    pub fn apply_selected(&mut self) {
        let Some((clue, v)) = self.selection() else { return };
        let id = self.session.puzzle().topology().id(clue);
        let result = self.session.apply_clue(id, v);
        self.report(&format!("{} = {}", id, v), result);
    }

    pub fn exclude_selected(&mut self) {
        let Some((clue, v)) = self.selection() else { return };
        let id = self.session.puzzle().topology().id(clue);
        let result = self.session.exclude_candidate(id, v);
        self.report(&format!("{} != {}", id, v), result);
    }

    pub fn auto_solve(&mut self) {
        self.notice = Some(match self.session.auto_solve() {
            Ok(SolveOutcome::Solved(_)) => Notice::Info("Solved".into()),
            Ok(SolveOutcome::Unsatisfiable(Some(c))) => Notice::Problem(format!("No solution ({})", c)),
            Ok(SolveOutcome::Unsatisfiable(None)) => Notice::Problem("No solution".into()),
            Ok(SolveOutcome::Unknown) => Notice::Problem("Search budget exhausted".into()),
            Err(e) => Notice::Problem(e.to_string()),
        });
    }

    pub fn anagram_solve(&mut self) {
        self.notice = Some(match self.session.anagram_solve() {
            Ok(SolveOutcome::Solved(_)) => Notice::Info("Anagram stage solved".into()),
            Ok(SolveOutcome::Unsatisfiable(_)) => Notice::Problem("Anagram stage has no solution".into()),
            Ok(SolveOutcome::Unknown) => Notice::Problem("Search budget exhausted".into()),
            Err(e) => Notice::Problem(e.to_string()),
        });
        self.mode = Mode::Anagram;
        self.scroll_pos = 0;
    }

    pub fn undo(&mut self) {
        self.notice = Some(if self.session.undo() {
            Notice::Info("Undone".into())
        } else {
            Notice::Problem("Nothing to undo".into())
        });
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.notice = Some(Notice::Info("Reset".into()));
    }

    /// Re-derives everything that depends on the session and cursor.
    pub fn update(&mut self) {
        let n = self.selected_clue().map(|c| self.session.state().set(c).len()).unwrap_or(0);
        if self.candidate_pos >= n {
            self.candidate_pos = n.saturating_sub(1);
        }
        self.scroll_lines = scroll_lines(self);
        if self.scroll_pos >= self.scroll_lines.len() {
            self.scroll_pos = self.scroll_lines.len().saturating_sub(1);
        }
    }

    pub fn exit(&mut self, status: Status) {
        self.exit = Some(status);
    }
}

fn tui_run(state: &mut TuiState, terminal: &mut DefaultTerminal) -> io::Result<()> {
    while state.exit.is_none() {
        terminal.draw(|frame| {
            let (g, ta) = tui_draw(state, frame);
            draw_grid(state, frame, g);
            draw_text_area(state, frame, ta);
        })?;
        if let Event::Key(key_event) = event::read()? {
            handle_key(state, key_event);
        }
    }
    match state.exit.clone() {
        Some(Status::Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
        _ => Ok(()),
    }
}

fn tui_draw(state: &TuiState, frame: &mut Frame) -> (Rect, Rect) {
    let size = frame.area();
    let vertical_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            ratatui::layout::Constraint::Length(4),  // Header
            ratatui::layout::Constraint::Min(0),     // Body (fills remaining space)
            ratatui::layout::Constraint::Length(1),  // Footer
        ])
        .split(size);
    let header_area = vertical_chunks[0];
    let body_area = vertical_chunks[1];
    let footer_area = vertical_chunks[2];
    let horizontal_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            ratatui::layout::Constraint::Min(25),  // Grid on left
            ratatui::layout::Constraint::Min(25),  // Text area on right
        ])
        .split(body_area);
    let title_text = format!(" {} ", state.session.puzzle().name().unwrap_or("Crossword Solver"));
    let block = Block::bordered()
        .title(Line::from(title_text.bold()).centered())
        .border_set(border::PLAIN);
    let grid = state.session.state();
    let progress: Span<'_> = if grid.is_solved() {
        "Solved".blue()
    } else {
        format!("{}/{} entries", grid.solved_count(), grid.len()).green()
    };
    let first_line = vec![
        "State: ".into(), progress,
        " Candidates: ".into(), grid.total_candidates().to_string().yellow(),
        " History: ".into(), state.session.history().len().to_string().yellow(),
        " Mode: ".into(), format!("{:?}", state.mode).yellow(),
    ];
    let second_line = match &state.notice {
        Some(Notice::Info(s)) => Line::from(s.clone().green()),
        Some(Notice::Problem(s)) => Line::from(s.clone().red()),
        None => Line::from(""),
    };
    frame.render_widget(
        Paragraph::new(Text::from(vec![Line::from(first_line), second_line]))
            .centered()
            .block(block),
        header_area,
    );
    let instructions = Line::from(vec![
        " Move ".into(),
        "W/A/S/D".blue().bold(),
        " Panes ".into(),
        "Space".blue().bold(),
        " Modes ".into(),
        "Tab/Shift+Tab".blue().bold(),
        " Quit ".into(),
        "Ctrl+C ".blue().bold(),
    ]);
    frame.render_widget(
        Paragraph::new(instructions).centered(),
        footer_area,
    );
    (horizontal_chunks[0], horizontal_chunks[1])
}

fn cycle_mode(mode: &Mode, forward: bool) -> Mode {
    let mut m: u8 = mode.clone().into();
    m = if forward {
        if m == Mode::COUNT as u8 { 1 } else { m + 1 }
    } else if m == 1 {
        Mode::COUNT as u8
    } else {
        m - 1
    };
    m.try_into().unwrap_or(Mode::Readme)
}

/// Interprets one key press. Kept apart from the event loop so it can be
/// driven without a terminal.
pub fn handle_key(state: &mut TuiState, key_event: KeyEvent) -> TuiStateEvent {
    if key_event.kind != KeyEventKind::Press {
        return TuiStateEvent::Ignore;
    }
    let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
    let event = match key_event.code {
        KeyCode::Char('c') if ctrl => {
            state.exit(Status::Ok);
            TuiStateEvent::Exit
        },
        KeyCode::BackTab => {
            state.mode = cycle_mode(&state.mode, false);
            state.scroll_pos = 0;
            TuiStateEvent::ModeUpdate
        },
        KeyCode::Tab => {
            state.mode = cycle_mode(&state.mode, true);
            state.scroll_pos = 0;
            TuiStateEvent::ModeUpdate
        },
        KeyCode::Char('z') if ctrl => {
            state.undo();
            TuiStateEvent::SessionUpdate
        },
        KeyCode::Char('r') if ctrl => {
            state.reset();
            TuiStateEvent::SessionUpdate
        },
        KeyCode::Char(' ') => {
            state.active = match state.active {
                Pane::TextArea => Pane::Grid,
                Pane::Grid => Pane::TextArea,
            };
            TuiStateEvent::PaneSwitch
        },
        KeyCode::Char('e') => {
            state.entry_choice += 1;
            state.candidate_pos = 0;
            TuiStateEvent::ModeUpdate
        },
        KeyCode::Char('[') => {
            state.candidate_pos = state.candidate_pos.saturating_sub(1);
            TuiStateEvent::ModeUpdate
        },
        KeyCode::Char(']') => {
            state.candidate_pos += 1;
            TuiStateEvent::ModeUpdate
        },
        KeyCode::Enter => {
            state.apply_selected();
            TuiStateEvent::SessionUpdate
        },
        KeyCode::Char('x') => {
            state.exclude_selected();
            TuiStateEvent::SessionUpdate
        },
        KeyCode::Char('g') => {
            state.auto_solve();
            TuiStateEvent::SessionUpdate
        },
        KeyCode::Char('m') => {
            state.anagram_solve();
            TuiStateEvent::SessionUpdate
        },
        _ => {
            let handled = match state.active {
                Pane::Grid => grid_wasd(state, key_event),
                Pane::TextArea => text_area_ws(state, key_event),
            };
            if handled {
                if state.active == Pane::Grid {
                    state.entry_choice = 0;
                    state.candidate_pos = 0;
                }
                TuiStateEvent::Delegate(key_event)
            } else {
                TuiStateEvent::Ignore
            }
        },
    };
    state.update();
    event
}
