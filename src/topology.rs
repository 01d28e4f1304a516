use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use crate::core::{ClueId, ClueIdx, Error, Index};

/// One shared cell between two entries of opposite direction. `pos` is the
/// position within the entry that owns this Crossing, `other_pos` the
/// position within `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub pos: usize,
    pub other: ClueIdx,
    pub other_pos: usize,
}

/// A run of cells solved as a single integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: ClueId,
    pub cells: Vec<Index>,
    pub crossings: Vec<Crossing>,
}

impl Entry {
    pub fn len(&self) -> usize { self.cells.len() }

    pub fn position_of(&self, cell: Index) -> Option<usize> {
        self.cells.iter().position(|c| *c == cell)
    }
}

/// Static description of the grid: which cells make up which entries and
/// how entries cross. Built once, then shared read-only (usually behind an
/// Arc) by every grid state derived from it. Entries are stored sorted by
/// ClueId, so a ClueIdx comparison is a ClueId comparison.
#[derive(Clone, PartialEq, Eq)]
pub struct Topology {
    rows: usize,
    cols: usize,
    entries: Vec<Entry>,
    by_id: BTreeMap<ClueId, ClueIdx>,
    cell_entries: HashMap<Index, Vec<(ClueIdx, usize)>>,
}

impl Topology {
    pub fn rows(&self) -> usize { self.rows }

    pub fn cols(&self) -> usize { self.cols }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn entries(&self) -> &[Entry] { &self.entries }

    pub fn entry(&self, clue: ClueIdx) -> &Entry { &self.entries[clue] }

    pub fn id(&self, clue: ClueIdx) -> ClueId { self.entries[clue].id }

    pub fn index_of(&self, id: ClueId) -> Option<ClueIdx> {
        self.by_id.get(&id).copied()
    }

    pub fn require(&self, id: ClueId) -> Result<ClueIdx, Error> {
        self.index_of(id)
            .ok_or_else(|| Error::invalid_topology(format!("No such clue: {}", id)))
    }

    /// Entries passing through `cell`, with the cell's position in each.
    pub fn entries_at(&self, cell: Index) -> &[(ClueIdx, usize)] {
        self.cell_entries.get(&cell).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_cell(&self, cell: Index) -> bool {
        self.cell_entries.contains_key(&cell)
    }

    /// Every cell that belongs to at least one entry, in row-major order.
    pub fn cells(&self) -> Vec<Index> {
        let mut cells: Vec<Index> = self.cell_entries.keys().copied().collect();
        cells.sort();
        cells
    }

    /// Auto-numbers a grid pattern using the usual crossword convention:
    /// `.` is a white cell and `#` a block; a white cell receives the next
    /// number if it begins an across or down run of at least two cells.
    pub fn from_pattern(pattern: &str) -> Result<Self, Error> {
        let lines: Vec<&str> = pattern.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(Error::invalid_topology("Empty grid pattern"));
        }
        let cols = lines[0].chars().count();
        let mut white = vec![];
        for line in &lines {
            if line.chars().count() != cols {
                return Err(Error::invalid_topology("Grid pattern is not rectangular"));
            }
            let mut row = vec![];
            for ch in line.chars() {
                match ch {
                    '.' => row.push(true),
                    '#' => row.push(false),
                    _ => return Err(Error::invalid_topology(format!("Unexpected pattern character: {:?}", ch))),
                }
            }
            white.push(row);
        }
        let rows = white.len();
        let is_white = |r: usize, c: usize| r < rows && c < cols && white[r][c];
        let mut builder = TopologyBuilder::new();
        let mut number: u16 = 0;
        for r in 0..rows {
            for c in 0..cols {
                if !is_white(r, c) {
                    continue;
                }
                let starts_across = (c == 0 || !is_white(r, c - 1)) && is_white(r, c + 1);
                let starts_down = (r == 0 || !is_white(r - 1, c)) && is_white(r + 1, c);
                if !starts_across && !starts_down {
                    continue;
                }
                number += 1;
                if starts_across {
                    let len = (c..cols).take_while(|cc| is_white(r, *cc)).count();
                    builder.across(number, [r, c], len);
                }
                if starts_down {
                    let len = (r..rows).take_while(|rr| is_white(*rr, c)).count();
                    builder.down(number, [r, c], len);
                }
            }
        }
        builder.dims(rows, cols);
        builder.build()
    }

    /// Renders the grid with known digits filled in. Cells outside every
    /// entry print as `#`, unknown cells as `.`.
    pub fn render(&self, digits: &BTreeMap<Index, u8>) -> String {
        let mut s = String::new();
        for r in 0..self.rows {
            for c in 0..self.cols {
                if let Some(d) = digits.get(&[r, c]) {
                    s.push(char::from(b'0' + *d));
                } else if self.is_cell([r, c]) {
                    s.push('.');
                } else {
                    s.push('#');
                }
            }
            s.push('\n');
        }
        s
    }
}

impl Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(&BTreeMap::new()))?;
        for e in &self.entries {
            write!(f, "{} {:?} len={} crossings={}\n", e.id, e.cells[0], e.len(), e.crossings.len())?;
        }
        Ok(())
    }
}

/// Collects entries and derives the crossing relation. Entries may be given
/// as straight runs (`across`/`down`) or as arbitrary ordered cell lists.
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    dims: Option<[usize; 2]>,
    entries: Vec<(ClueId, Vec<Index>)>,
}

impl TopologyBuilder {
    pub fn new() -> Self { Self::default() }

    /// Fix the grid dimensions; otherwise they are the bounding box of the
    /// entries.
    pub fn dims(&mut self, rows: usize, cols: usize) -> &mut Self {
        self.dims = Some([rows, cols]);
        self
    }

    pub fn across(&mut self, number: u16, left: Index, length: usize) -> &mut Self {
        self.run(ClueId::across(number), left, length)
    }

    pub fn down(&mut self, number: u16, top: Index, length: usize) -> &mut Self {
        self.run(ClueId::down(number), top, length)
    }

    fn run(&mut self, id: ClueId, start: Index, length: usize) -> &mut Self {
        let cells = (0..length).map(|i| id.direction.step(start, i)).collect();
        self.entries.push((id, cells));
        self
    }

    pub fn entry(&mut self, id: ClueId, cells: Vec<Index>) -> &mut Self {
        self.entries.push((id, cells));
        self
    }

    pub fn build(&self) -> Result<Topology, Error> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|(id, _)| *id);
        for pair in sorted.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::invalid_topology(format!("Duplicate clue: {}", pair[0].0)));
            }
        }
        let mut entries: Vec<Entry> = vec![];
        let mut by_id = BTreeMap::new();
        let mut cell_entries: HashMap<Index, Vec<(ClueIdx, usize)>> = HashMap::new();
        let mut extent = [0, 0];
        for (idx, (id, cells)) in sorted.into_iter().enumerate() {
            if cells.is_empty() {
                return Err(Error::invalid_topology(format!("Entry {} has no cells", id)));
            }
            for (pos, cell) in cells.iter().enumerate() {
                if cells[..pos].contains(cell) {
                    return Err(Error::invalid_topology(format!("Entry {} repeats cell {:?}", id, cell)));
                }
                extent = [extent[0].max(cell[0] + 1), extent[1].max(cell[1] + 1)];
                let here = cell_entries.entry(*cell).or_default();
                for (other, _) in here.iter() {
                    let other_id = entries[*other].id;
                    if other_id.direction == id.direction {
                        return Err(Error::invalid_topology(format!(
                            "Entries {} and {} overlap at {:?}", other_id, id, cell,
                        )));
                    }
                }
                here.push((idx, pos));
            }
            by_id.insert(id, idx);
            entries.push(Entry { id, cells, crossings: vec![] });
        }
        let mut shared: BTreeMap<(ClueIdx, ClueIdx), usize> = BTreeMap::new();
        for occupants in cell_entries.values() {
            for &(a, a_pos) in occupants {
                for &(b, b_pos) in occupants {
                    if a == b {
                        continue;
                    }
                    *shared.entry((a, b)).or_default() += 1;
                    entries[a].crossings.push(Crossing { pos: a_pos, other: b, other_pos: b_pos });
                }
            }
        }
        if let Some(((a, b), _)) = shared.iter().find(|(_, n)| **n > 1) {
            return Err(Error::invalid_topology(format!(
                "Entries {} and {} cross more than once", entries[*a].id, entries[*b].id,
            )));
        }
        for e in entries.iter_mut() {
            e.crossings.sort_by_key(|c| (c.pos, c.other));
        }
        let [rows, cols] = match self.dims {
            Some(d) if d[0] >= extent[0] && d[1] >= extent[1] => d,
            Some(d) => return Err(Error::invalid_topology(format!(
                "Entries extend past the {}x{} grid", d[0], d[1],
            ))),
            None => extent,
        };
        Ok(Topology { rows, cols, entries, by_id, cell_entries })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    /// 2x2 block-free grid: 1A, 3A across; 1D, 2D down.
    pub fn two_by_two() -> Topology {
        Topology::from_pattern("..\n..\n").unwrap()
    }

    /// 3x3 block-free grid: 1A, 4A, 5A across; 1D, 2D, 3D down.
    pub fn three_by_three() -> Topology {
        Topology::from_pattern("...\n...\n...\n").unwrap()
    }
}
