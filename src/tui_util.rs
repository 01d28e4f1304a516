/// Drawing and cursor helpers for the terminal UI. Everything here reads a
/// TuiState; none of it changes the Session.
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect, style::{Color, Style, Stylize}, symbols::border, text::{Line, Span, Text}, widgets::{Block, Padding, Paragraph}, Frame
};
use crate::{
    core::{digit_at, ClueIdx, Index},
    session::Action,
    solver::SolveOutcome,
    tui::{Mode, Pane, TuiState},
};

// Past this many, the candidate list is elided.
const MAX_LISTED_CANDIDATES: usize = 200;

pub fn grid_wasd(state: &mut TuiState, key_event: KeyEvent) -> bool {
    let [r, c] = state.grid_pos;
    match key_event.code {
        KeyCode::Char('w') => if r > 0 {
            state.grid_pos = [r-1, c];
        },
        KeyCode::Char('s') => if r+1 < state.grid_dims[0] {
            state.grid_pos = [r+1, c];
        },
        KeyCode::Char('a') => if c > 0 {
            state.grid_pos = [r, c-1];
        },
        KeyCode::Char('d') => if c+1 < state.grid_dims[1] {
            state.grid_pos = [r, c+1];
        },
        _ => return false,
    }
    true
}

pub fn text_area_ws(state: &mut TuiState, key_event: KeyEvent) -> bool {
    match key_event.code {
        KeyCode::Char('w') => if state.scroll_pos > 0 {
            state.scroll_pos -= 1;
        },
        KeyCode::Char('s') => if state.scroll_pos+1 < state.scroll_lines.len() {
            state.scroll_pos += 1;
        },
        _ => return false,
    }
    true
}

pub fn readme_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(vec!["E".blue(), " -- Switch between the entries at the cursor".into()]),
        Line::from(vec!["[ / ]".blue(), " -- Previous/next candidate".into()]),
        Line::from(vec!["Enter".blue(), " -- Commit the highlighted candidate".into()]),
        Line::from(vec!["X".blue(), " -- Exclude the highlighted candidate".into()]),
        Line::from(vec!["G".blue(), " -- Auto-solve from here".into()]),
        Line::from(vec!["M".blue(), " -- Run the anagram stage".into()]),
        Line::from(vec!["Ctrl+Z".blue(), " -- Undo".into()]),
        Line::from(vec!["Ctrl+R".blue(), " -- Reset puzzle".into()]),
    ]
}

fn pad(v: u64, length: usize) -> String {
    format!("{:0width$}", v, width = length)
}

pub fn candidate_lines(state: &TuiState) -> Vec<Line<'static>> {
    let Some(clue) = state.selected_clue() else {
        return vec!["No entry at this cell".italic().into()];
    };
    let puzzle = state.session.puzzle();
    let entry = puzzle.topology().entry(clue);
    let set = state.session.state().set(clue);
    let predicate = puzzle.predicate(entry.id)
        .map(|p| format!("{:?}", p))
        .unwrap_or_default();
    let mut lines = vec![
        Line::from(vec![
            format!("{} ", entry.id).blue().bold(),
            format!("({} digits) ", entry.len()).into(),
            predicate.cyan(),
        ]),
        Line::from(format!("{} candidates", set.len()).italic()),
        "".into(),
    ];
    for (i, v) in set.iter().enumerate().take(MAX_LISTED_CANDIDATES) {
        let s = pad(v, set.length());
        lines.push(Line::from(if i == state.candidate_pos {
            format!("> {}", s).green().bold()
        } else {
            format!("  {}", s).into()
        }));
    }
    if set.len() > MAX_LISTED_CANDIDATES {
        lines.push(format!("... {} more", set.len() - MAX_LISTED_CANDIDATES).gray().into());
    }
    lines
}

pub fn history_lines(state: &TuiState) -> Vec<Line<'static>> {
    state.session.history().iter().enumerate().map(|(i, h)| {
        let action: Span<'static> = match h.action {
            Action::Start => "start".into(),
            Action::Apply(id, v) => format!("{} = {}", id, v).green(),
            Action::Exclude(id, v) => format!("{} != {}", id, v).red(),
            Action::AutoSolve => "auto-solve".blue(),
        };
        Line::from(vec![
            format!("#{} ", i).italic(),
            action,
            format!("  ({}/{} solved)", h.state.solved_count(), h.state.len()).gray(),
        ])
    }).collect()
}

pub fn anagram_lines(state: &TuiState) -> Vec<Line<'static>> {
    let outcome = match state.session.anagram() {
        None => return vec!["Press M once the grid is solved".italic().into()],
        Some(SolveOutcome::Unknown) => return vec!["Search budget exhausted".red().into()],
        Some(SolveOutcome::Unsatisfiable(_)) => return vec!["No anagram solution".red().into()],
        Some(SolveOutcome::Solved(s)) => s,
    };
    let unclued = state.session.puzzle().unclued();
    let original = state.session.state();
    let mut lines = vec![];
    for (clue, e) in original.topology().entries().iter().enumerate() {
        let (Some(before), Some(after)) = (original.set(clue).single(), outcome.set(clue).single()) else {
            continue;
        };
        let mut spans = vec![
            format!("{} ", e.id).blue(),
            format!("{} -> ", pad(before, e.len())).into(),
            pad(after, e.len()).green(),
        ];
        if unclued[clue] && before != 0 {
            spans.push(format!("  (x{})", after / before).cyan());
        }
        lines.push(Line::from(spans));
    }
    lines
}

pub fn scroll_lines(state: &TuiState) -> Vec<Line<'static>> {
    match state.mode {
        Mode::Readme => readme_lines(),
        Mode::Candidates => candidate_lines(state),
        Mode::History => history_lines(state),
        Mode::Anagram => anagram_lines(state),
    }
}

fn selected_cells(state: &TuiState) -> Vec<Index> {
    match state.selected_clue() {
        Some(clue) => state.session.puzzle().topology().entry(clue).cells.clone(),
        None => vec![],
    }
}

// The digit the highlighted candidate would put in `cell`, if the cell is
// part of the selected entry.
fn preview_digit(state: &TuiState, clue: Option<ClueIdx>, cell: Index) -> Option<u8> {
    let clue = clue?;
    let entry = state.session.puzzle().topology().entry(clue);
    let pos = entry.position_of(cell)?;
    let v = state.selected_value()?;
    Some(digit_at(v, entry.len(), pos))
}

pub fn grid_text(state: &TuiState) -> Text<'static> {
    let topology = state.session.puzzle().topology();
    let forced = state.session.forced_cells();
    let selected = selected_cells(state);
    let clue = state.selected_clue();
    let mut lines = vec![Line::from(format!("┌{}┐", "─".repeat(topology.cols()*3)))];
    for r in 0..topology.rows() {
        let mut spans: Vec<Span<'static>> = vec!["│".into()];
        for c in 0..topology.cols() {
            let cell = [r, c];
            let cursor = cell == state.grid_pos;
            if !topology.is_cell(cell) {
                spans.push(if cursor { "[█]".bold() } else { "███".into() });
                continue;
            }
            let (text, preview) = match forced.get(&cell) {
                Some(d) => (d.to_string(), false),
                None => match preview_digit(state, clue, cell) {
                    Some(d) => (d.to_string(), true),
                    None => (" ".to_string(), false),
                },
            };
            let mut s: Span<'static> = if cursor {
                format!("[{}]", text).bold()
            } else {
                format!(" {} ", text).into()
            };
            if preview {
                s = s.fg(Color::DarkGray);
            } else if selected.contains(&cell) {
                s = s.fg(Color::Yellow);
            }
            spans.push(s);
        }
        spans.push("│".into());
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(format!("└{}┘", "─".repeat(topology.cols()*3))));
    Text::from(lines)
}

pub fn draw_grid(state: &TuiState, frame: &mut Frame, area: Rect) {
    let is_active = state.active == Pane::Grid;
    let title_text = match state.selected_clue() {
        Some(clue) => format!("Puzzle State ({})", state.session.puzzle().topology().id(clue)),
        None => "Puzzle State".to_string(),
    };
    let title = Line::from(if is_active {
        title_text.bold()
    } else {
        title_text.gray()
    });
    let block = Block::bordered()
        .title(title.centered())
        .border_set(if is_active { border::DOUBLE } else { border::PLAIN });
    frame.render_widget(
        Paragraph::new(grid_text(state)).centered().block(block),
        area,
    );
}

pub fn draw_text_area(state: &TuiState, frame: &mut Frame, area: Rect) {
    let is_active = state.active == Pane::TextArea;
    let title_text = match state.mode {
        Mode::Readme => "Hotkeys",
        Mode::Candidates => "Candidates for Entry",
        Mode::History => "History",
        Mode::Anagram => "Anagram Stage",
    };
    let title = Line::from(if is_active {
        title_text.bold()
    } else {
        title_text.gray()
    });
    let block = Block::bordered()
        .title(title.centered())
        .padding(Padding::left(2))
        .border_set(if is_active { border::DOUBLE } else { border::PLAIN })
        .border_style(if is_active { Style::new() } else { Style::new().gray() });
    let start = state.scroll_pos.min(state.scroll_lines.len());
    let text = Text::from(state.scroll_lines[start..].to_vec());
    frame.render_widget(
        Paragraph::new(text).left_aligned().block(block),
        area,
    );
}
