//! Run-level configuration validated once before the first frame.

use serde::{Deserialize, Serialize};

use crate::{ColonyConfig, ConfigError};

/// Conditions ending a run; the first one satisfied wins.
///
/// Limits left out of a settings file are unset. Only a missing `stop` block
/// falls back to the 120-frame preset of [`RunSettings::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StopConditions {
    /// Stop once this frame has been recorded.
    pub stop_at_frame: Option<u64>,
    /// Stop once this much simulated time has elapsed.
    pub stop_at_seconds: Option<u64>,
    /// Stop once any colony holds this many live cells.
    pub stop_at_single_colony_size: Option<usize>,
    /// Stop once every colony holds this many live cells.
    pub stop_at_all_colonies_size: Option<usize>,
    /// Stop when no colony has a live cell left.
    pub stop_when_extinct: bool,
}

impl Default for StopConditions {
    fn default() -> Self {
        Self {
            stop_at_frame: None,
            stop_at_seconds: None,
            stop_at_single_colony_size: None,
            stop_at_all_colonies_size: None,
            stop_when_extinct: true,
        }
    }
}

impl StopConditions {
    /// Whether at least one limit bounds the run.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.stop_at_frame.is_some()
            || self.stop_at_seconds.is_some()
            || self.stop_at_single_colony_size.is_some()
            || self.stop_at_all_colonies_size.is_some()
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Seconds simulated per frame.
    pub delta: u64,
    /// Root seed for every colony stream; drawn from entropy when absent.
    pub seed: Option<u64>,
    pub stop: StopConditions,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            delta: 3_600,
            seed: None,
            stop: StopConditions {
                stop_at_frame: Some(120),
                ..StopConditions::default()
            },
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta == 0 {
            return Err(ConfigError::InvalidDelta);
        }
        if !self.stop.is_bounded() {
            return Err(ConfigError::NoStopCondition);
        }
        Ok(())
    }
}

/// Complete input of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub run: RunSettings,
    pub colonies: Vec<ColonyConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            run: RunSettings::default(),
            colonies: vec![ColonyConfig::default()],
        }
    }
}

impl SimulationConfig {
    /// Validates run settings and every colony, reporting the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        if self.colonies.is_empty() {
            return Err(ConfigError::EmptyRun);
        }
        for (position, colony) in self.colonies.iter().enumerate() {
            colony.validate(position + 1)?;
        }
        Ok(())
    }
}
