//! Recorded output consumed by export and plotting tools.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

use crate::{CellId, CellState, Frame, Generation};

/// State of one cell at the end of a frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellSnapshot {
    pub frame: Frame,
    pub colony: usize,
    pub cell: CellId,
    pub parent: Option<CellId>,
    pub name: String,
    pub generation: Generation,
    pub state: CellState,
    pub signal: f64,
    pub fitness_memory: f64,
    pub scheduled_division_hours: f64,
    pub scheduled_death_hours: f64,
    pub age_hours: f64,
    pub treatment: String,
}

/// Per-colony aggregate at the end of a frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColonySummary {
    pub frame: Frame,
    pub colony: usize,
    pub label: String,
    pub alive: usize,
    pub divided: usize,
    pub dead: usize,
    /// Mean signal over live cells; `None` once the colony is extinct.
    pub signal_mean: Option<f64>,
    /// Population standard deviation of the live cells' signal.
    pub signal_std: Option<f64>,
    pub treatment: String,
}

/// Everything recorded for one frame, colonies in configuration order.
///
/// Cells are listed when alive after the tick or when they divided or died
/// during it; terminal cells never change afterwards and are not repeated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameRecord {
    pub frame: Frame,
    pub seconds: u64,
    pub cells: Vec<CellSnapshot>,
    pub colonies: Vec<ColonySummary>,
}

/// Why the runner stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    FrameLimit(u64),
    TimeLimit(u64),
    SingleColonySize(usize),
    AllColoniesSize(usize),
    Extinct,
    IterationCap(u64),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameLimit(limit) => write!(f, "frame limit {limit} reached"),
            Self::TimeLimit(limit) => write!(f, "simulated time limit of {limit}s reached"),
            Self::SingleColonySize(limit) => write!(f, "a colony reached {limit} live cells"),
            Self::AllColoniesSize(limit) => write!(f, "every colony reached {limit} live cells"),
            Self::Extinct => write!(f, "no live cells remain"),
            Self::IterationCap(cap) => write!(f, "no stop condition met within {cap} frames"),
        }
    }
}

/// Run-level facts written as the first line of every export.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunHeader {
    pub seed: u64,
    pub delta: u64,
    /// Number of recorded frames, frame 0 included.
    pub frames: usize,
    pub stop_reason: StopReason,
}

#[derive(Serialize)]
struct HeaderLine<'a> {
    run: &'a RunHeader,
}

/// Complete output of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct History {
    /// Root seed every colony stream was derived from.
    pub seed: u64,
    /// Seconds per frame.
    pub delta: u64,
    pub frames: Vec<FrameRecord>,
    pub stop_reason: StopReason,
}

impl History {
    #[must_use]
    pub fn final_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    /// All cell snapshots, frame by frame.
    pub fn cell_rows(&self) -> impl Iterator<Item = &CellSnapshot> + '_ {
        self.frames.iter().flat_map(|frame| frame.cells.iter())
    }

    /// All colony summaries, frame by frame.
    pub fn colony_rows(&self) -> impl Iterator<Item = &ColonySummary> + '_ {
        self.frames.iter().flat_map(|frame| frame.colonies.iter())
    }

    /// Snapshots of one cell across the frames it appears in.
    pub fn trajectory(&self, colony: usize, cell: CellId) -> impl Iterator<Item = &CellSnapshot> + '_ {
        self.cell_rows()
            .filter(move |row| row.colony == colony && row.cell == cell)
    }

    #[must_use]
    pub fn header(&self) -> RunHeader {
        RunHeader {
            seed: self.seed,
            delta: self.delta,
            frames: self.frames.len(),
            stop_reason: self.stop_reason,
        }
    }

    /// Writes a `{"run": ...}` header line, then one JSON object per cell
    /// snapshot, one per line.
    pub fn to_json_lines<W: Write>(&self, writer: W) -> io::Result<()> {
        self.write_lines(writer, self.cell_rows())
    }

    /// Same layout as [`History::to_json_lines`] with colony summaries as rows.
    pub fn to_summary_json_lines<W: Write>(&self, writer: W) -> io::Result<()> {
        self.write_lines(writer, self.colony_rows())
    }

    fn write_lines<W: Write, T: Serialize>(
        &self,
        mut writer: W,
        rows: impl Iterator<Item = T>,
    ) -> io::Result<()> {
        let header = self.header();
        serde_json::to_writer(&mut writer, &HeaderLine { run: &header })?;
        writer.write_all(b"\n")?;
        for row in rows {
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}
