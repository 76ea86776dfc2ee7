//! Core simulation engine for clonal variability in cell populations.
//!
//! Colonies grow from seed cells over discrete frames. Every cell carries a
//! scheduled division age and a scheduled death age drawn from the curves of
//! the treatment active in its colony, blended with the schedule it inherited
//! through its fitness memory. The runner advances all colonies in lockstep and
//! records a per-frame history of every cell that was alive or changed state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod cell;
mod colony;
mod config;
mod distribution;
mod history;
mod runner;
mod signal;
mod treatment;

pub use cell::{Cell, CellState, Fate, blend};
pub use colony::{Colony, ColonyConfig, replicate_label};
pub use config::{RunSettings, SimulationConfig, StopConditions};
pub use distribution::DistributionSpec;
pub use history::{CellSnapshot, ColonySummary, FrameRecord, History, RunHeader, StopReason};
pub use runner::{MAX_FRAMES, SimulationRunner, colony_rng};
pub use signal::{SIGNAL_MAX, SIGNAL_MIN, Signal, SignalConfig, SignalDisturbance};
pub use treatment::{Treatment, TreatmentSchedule};

/// Seconds in one simulated hour; curve parameters are expressed in hours.
pub const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Discrete scheduler step counter.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Frame(pub u64);

impl Frame {
    /// Frame zero, recorded right after seeding.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the following frame.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Simulated seconds elapsed at this frame for the given tick length.
    #[must_use]
    pub const fn seconds(self, delta: u64) -> u64 {
        self.0.saturating_mul(delta)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a cell, unique within its colony and allocated in creation order.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct CellId(pub u64);

impl CellId {
    /// Position of the cell in its colony's creation-ordered storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of divisions separating a cell from its root.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Generation(pub u32);

impl Generation {
    /// Generation of a seed cell.
    #[must_use]
    pub const fn root() -> Self {
        Self(0)
    }

    /// Generation of this cell's children.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Errors raised while validating configuration, before any frame runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A configuration value is outside its accepted domain.
    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    /// A colony schedule lacks the frame-0 treatment every colony starts from.
    #[error("colony {colony} has no baseline treatment at frame 0")]
    MissingBaselineTreatment { colony: String },
    /// Two treatments share an activation frame.
    #[error("treatment activation frame {frame} is defined more than once")]
    DuplicateTreatmentFrame { frame: u64 },
    /// None of the bounded stop conditions is configured.
    #[error("at least one of stop_at_frame, stop_at_seconds or a colony size limit must be set")]
    NoStopCondition,
    /// The tick length is zero.
    #[error("delta must be a positive number of seconds")]
    InvalidDelta,
    /// No colony was configured.
    #[error("simulation requires at least one colony")]
    EmptyRun,
}

/// A distribution could not produce a usable draw.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{family} sampling failed: {reason}")]
pub struct SamplingError {
    pub family: &'static str,
    pub reason: String,
}

/// Fatal errors halting a simulation run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    /// A divided or dead cell was asked to transition again.
    #[error("cell {id} is terminal and cannot transition again")]
    TerminalCell { id: CellId },
    /// Daughters were requested from a cell that has not divided.
    #[error("cell {id} has not divided and cannot produce daughters")]
    NotDivided { id: CellId },
    /// A cell references a parent that does not precede it in its colony.
    #[error("cell {child} references missing or later parent {parent}")]
    DanglingParent { child: CellId, parent: CellId },
}
