//! Colony: the append-only forest of cells sharing one treatment schedule.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::treatment::check_unit_interval;
use crate::{
    Cell, CellId, CellSnapshot, CellState, ColonySummary, ConfigError, Fate, Frame, Signal,
    SignalConfig, SimulationError, Treatment, TreatmentSchedule,
};

/// Settings for one colony (or a set of identical replicate colonies).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ColonyConfig {
    /// Explicit label; replicates get `<index><letters>` when absent.
    pub label: Option<String>,
    /// Number of seed cells.
    pub initial_size: usize,
    /// Number of replicate colonies built from these settings.
    pub copies: usize,
    /// Packing radius, stored for layout collaborators.
    pub radius: f64,
    /// Fitness memory of seed cells.
    pub fitness_memory: f64,
    pub signal: SignalConfig,
    /// Activation frame to treatment; frame 0 is mandatory.
    pub treatments: BTreeMap<u64, Treatment>,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            label: None,
            initial_size: 1,
            copies: 1,
            radius: 1.0,
            fitness_memory: 1.0,
            signal: SignalConfig::default(),
            treatments: BTreeMap::from([(0, Treatment::control())]),
        }
    }
}

impl ColonyConfig {
    /// Validates the settings of the colony at 1-based position `index`.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.initial_size == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "initial_size",
                reason: "a colony needs at least one seed cell".to_string(),
            });
        }
        if self.copies == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "copies",
                reason: "copies must be at least 1".to_string(),
            });
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ConfigError::InvalidParameter {
                field: "radius",
                reason: format!("radius must be positive and finite, got {}", self.radius),
            });
        }
        check_unit_interval("fitness_memory", self.fitness_memory)?;
        self.signal.validate()?;
        let label = self
            .label
            .clone()
            .unwrap_or_else(|| index.to_string());
        TreatmentSchedule::new(&label, self.treatments.clone()).map(|_| ())
    }

    /// Label of replicate `copy` of the colony at 1-based position `index`.
    #[must_use]
    pub fn label_for(&self, index: usize, copy: usize) -> String {
        match (&self.label, self.copies) {
            (Some(label), 1) => label.clone(),
            (Some(label), _) => format!("{label}{}", replicate_label(copy)),
            (None, _) => format!("{index}{}", replicate_label(copy)),
        }
    }
}

/// Spreadsheet-style replicate suffix: `a`..`z`, `aa`, `ab`, ...
#[must_use]
pub fn replicate_label(mut copy: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'a' + (copy % 26) as u8);
        if copy < 26 {
            break;
        }
        copy = copy / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Independent population owning every cell it ever produced.
#[derive(Debug)]
pub struct Colony {
    index: usize,
    label: String,
    radius: f64,
    signal_config: SignalConfig,
    schedule: TreatmentSchedule,
    cells: Vec<Cell>,
    children: BTreeMap<CellId, [CellId; 2]>,
    active_frame: Frame,
    rng: ChaCha8Rng,
}

impl Colony {
    /// Builds colony number `index` and seeds its root cells under the
    /// frame-0 treatment, drawing everything from `rng`.
    pub fn new(
        index: usize,
        label: String,
        config: &ColonyConfig,
        mut rng: ChaCha8Rng,
    ) -> Result<Self, SimulationError> {
        let schedule = TreatmentSchedule::new(&label, config.treatments.clone())?;
        let baseline = schedule.active_treatment(Frame::zero());
        let memory = baseline.fitness_memory.unwrap_or(config.fitness_memory);
        let disturbance = baseline
            .signal_disturbance
            .or(config.signal.disturbance);
        let mut cells = Vec::with_capacity(config.initial_size);
        for seed in 0..config.initial_size {
            let signal = Signal::seeded(&config.signal, disturbance, &mut rng)?;
            let cell = Cell::root(
                CellId(seed as u64),
                format!("{label}-{}", seed + 1),
                Frame::zero(),
                memory,
                signal,
                baseline,
                &mut rng,
            )?;
            cells.push(cell);
        }
        debug!(colony = %label, seeds = cells.len(), treatment = %baseline.name, "seeded colony");
        Ok(Self {
            index,
            label,
            radius: config.radius,
            signal_config: config.signal.clone(),
            schedule,
            cells,
            children: BTreeMap::new(),
            active_frame: Frame::zero(),
            rng,
        })
    }

    /// Runs one tick labelled `frame`.
    ///
    /// A treatment whose activation frame was crossed is applied first. Only
    /// cells alive when the tick starts are advanced; daughters born during
    /// the tick are first advanced on the next one.
    pub fn advance(&mut self, frame: Frame, delta_hours: f64) -> Result<(), SimulationError> {
        let activation = self.schedule.activation_frame(frame);
        if activation != self.active_frame {
            self.apply_treatment(activation)?;
        }
        let existing = self.cells.len();
        for index in 0..existing {
            if !self.cells[index].is_alive() {
                continue;
            }
            match self.cells[index].tick(frame, delta_hours, &mut self.rng)? {
                Fate::Continued => {}
                Fate::Died => {
                    trace!(colony = %self.label, cell = %self.cells[index].name(), %frame, "cell died");
                }
                Fate::Divided => self.divide(index, frame)?,
            }
        }
        Ok(())
    }

    fn apply_treatment(&mut self, activation: Frame) -> Result<(), SimulationError> {
        self.active_frame = activation;
        let treatment = self.schedule.active_treatment(activation);
        debug!(
            colony = %self.label,
            frame = %activation,
            treatment = %treatment.name,
            live = self.alive_count(),
            "treatment activated"
        );
        for cell in self.cells.iter_mut().filter(|cell| cell.is_alive()) {
            if let Some(memory) = treatment.fitness_memory {
                cell.set_fitness_memory(memory);
            }
            if let Some(disturbance) = treatment.signal_disturbance {
                cell.signal_mut().disturb(disturbance);
            }
            cell.reschedule(treatment, &mut self.rng)?;
        }
        Ok(())
    }

    fn divide(&mut self, index: usize, frame: Frame) -> Result<(), SimulationError> {
        let first = CellId(self.cells.len() as u64);
        let ids = [first, CellId(first.0 + 1)];
        let treatment = self.schedule.active_treatment(frame);
        let daughters = self.cells[index].spawn_children(
            ids,
            frame,
            treatment,
            &self.signal_config,
            &mut self.rng,
        )?;
        let parent = self.cells[index].id();
        trace!(colony = %self.label, cell = %self.cells[index].name(), %frame, "cell divided");
        self.children.insert(parent, ids);
        self.cells.extend(daughters);
        Ok(())
    }

    /// Snapshots of every cell that is alive or changed state at `frame`.
    #[must_use]
    pub fn snapshot(&self, frame: Frame) -> Vec<CellSnapshot> {
        let treatment = &self.schedule.active_treatment(frame).name;
        self.cells
            .iter()
            .filter(|cell| cell.is_alive() || cell.terminal_frame() == Some(frame))
            .map(|cell| CellSnapshot {
                frame,
                colony: self.index,
                cell: cell.id(),
                parent: cell.parent(),
                name: cell.name().to_string(),
                generation: cell.generation(),
                state: cell.state(),
                signal: cell.signal().value(),
                fitness_memory: cell.fitness_memory(),
                scheduled_division_hours: cell.scheduled_division_hours(),
                scheduled_death_hours: cell.scheduled_death_hours(),
                age_hours: cell.age_hours(),
                treatment: treatment.clone(),
            })
            .collect()
    }

    /// Population counts and live-cell signal statistics at `frame`.
    #[must_use]
    pub fn summary(&self, frame: Frame) -> ColonySummary {
        let (mut alive, mut divided, mut dead) = (0, 0, 0);
        for cell in &self.cells {
            match cell.state() {
                CellState::Alive => alive += 1,
                CellState::Divided => divided += 1,
                CellState::Dead => dead += 1,
            }
        }
        let signals: Vec<f64> = self
            .cells
            .iter()
            .filter(|cell| cell.is_alive())
            .map(|cell| cell.signal().value())
            .collect();
        let (signal_mean, signal_std) = if signals.is_empty() {
            (None, None)
        } else {
            let count = signals.len() as f64;
            let mean = signals.iter().sum::<f64>() / count;
            let variance = signals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            (Some(mean), Some(variance.sqrt()))
        };
        ColonySummary {
            frame,
            colony: self.index,
            label: self.label.clone(),
            alive,
            divided,
            dead,
            signal_mean,
            signal_std,
            treatment: self.schedule.active_treatment(frame).name.clone(),
        }
    }

    /// Checks that every parent reference resolves to an earlier, divided cell
    /// of this colony born no later than its child.
    pub fn verify_lineage(&self) -> Result<(), SimulationError> {
        for cell in &self.cells {
            let Some(parent_id) = cell.parent() else {
                continue;
            };
            let valid = parent_id < cell.id()
                && self.cell(parent_id).is_some_and(|parent| {
                    parent.state() == CellState::Divided
                        && parent.birth_frame() <= cell.birth_frame()
                });
            if !valid {
                return Err(SimulationError::DanglingParent {
                    child: cell.id(),
                    parent: parent_id,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub const fn schedule(&self) -> &TreatmentSchedule {
        &self.schedule
    }

    /// Every cell ever created, in creation order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index())
    }

    /// Daughters of `id`, if it divided.
    #[must_use]
    pub fn children_of(&self, id: CellId) -> Option<[CellId; 2]> {
        self.children.get(&id).copied()
    }

    /// Ancestors of `id`, nearest first, ending at its root.
    #[must_use]
    pub fn lineage(&self, id: CellId) -> Vec<CellId> {
        let mut ancestors = Vec::new();
        let mut current = self.cell(id).and_then(Cell::parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.cell(parent).and_then(Cell::parent);
        }
        ancestors
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    #[must_use]
    pub fn is_extinct(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_alive())
    }
}
