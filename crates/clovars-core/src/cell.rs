//! Single lineage node: schedules its fate and transitions at most once.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    CellId, Frame, Generation, SamplingError, Signal, SignalConfig, SimulationError, Treatment,
};

/// Lifecycle state of a cell. `Divided` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CellState {
    #[default]
    Alive,
    Divided,
    Dead,
}

impl CellState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Alive)
    }
}

/// Outcome of one tick for a live cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Continued,
    Died,
    Divided,
}

/// Fitness-memory inheritance law: `memory * inherited + (1 - memory) * fresh`.
#[must_use]
pub fn blend(memory: f64, inherited: f64, fresh: f64) -> f64 {
    memory * inherited + (1.0 - memory) * fresh
}

#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    id: CellId,
    parent: Option<CellId>,
    name: String,
    generation: Generation,
    birth_frame: Frame,
    age_hours: f64,
    signal: Signal,
    fitness_memory: f64,
    scheduled_division_hours: f64,
    scheduled_death_hours: f64,
    state: CellState,
    terminal_frame: Option<Frame>,
}

impl Cell {
    /// Seed cell scheduled under `treatment`; roots have no schedule to inherit.
    pub fn root<R: Rng + ?Sized>(
        id: CellId,
        name: String,
        birth_frame: Frame,
        fitness_memory: f64,
        signal: Signal,
        treatment: &Treatment,
        rng: &mut R,
    ) -> Result<Self, SamplingError> {
        let mut cell = Self::unscheduled(
            id,
            None,
            name,
            Generation::root(),
            birth_frame,
            fitness_memory,
            signal,
        );
        cell.schedule(treatment, None, rng)?;
        Ok(cell)
    }

    fn unscheduled(
        id: CellId,
        parent: Option<CellId>,
        name: String,
        generation: Generation,
        birth_frame: Frame,
        fitness_memory: f64,
        signal: Signal,
    ) -> Self {
        Self {
            id,
            parent,
            name,
            generation,
            birth_frame,
            age_hours: 0.0,
            signal,
            fitness_memory,
            scheduled_division_hours: 0.0,
            scheduled_death_hours: 0.0,
            state: CellState::Alive,
            terminal_frame: None,
        }
    }

    /// Draws division then death ages from `treatment` and blends each with the
    /// inherited `(division, death)` schedule through this cell's fitness memory.
    pub(crate) fn schedule<R: Rng + ?Sized>(
        &mut self,
        treatment: &Treatment,
        inherited: Option<(f64, f64)>,
        rng: &mut R,
    ) -> Result<(), SamplingError> {
        let division = treatment.division_curve.sample_duration(rng)?;
        let death = treatment.death_curve.sample_duration(rng)?;
        let (division, death) = match inherited {
            Some((inherited_division, inherited_death)) => (
                blend(self.fitness_memory, inherited_division, division),
                blend(self.fitness_memory, inherited_death, death),
            ),
            None => (division, death),
        };
        self.scheduled_division_hours = division;
        self.scheduled_death_hours = death;
        Ok(())
    }

    /// Starts a new treatment episode: fresh draws count from the current age
    /// and are blended against the schedule the cell already had.
    pub fn reschedule<R: Rng + ?Sized>(
        &mut self,
        treatment: &Treatment,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        self.ensure_alive()?;
        let age = self.age_hours;
        let division = age + treatment.division_curve.sample_duration(rng)?;
        let death = age + treatment.death_curve.sample_duration(rng)?;
        self.scheduled_division_hours =
            blend(self.fitness_memory, self.scheduled_division_hours, division);
        self.scheduled_death_hours = blend(self.fitness_memory, self.scheduled_death_hours, death);
        Ok(())
    }

    /// Ages the cell by one tick and resolves its fate.
    ///
    /// Death requires the death age to be strictly earlier than the division
    /// age, so a cell whose two ages coincide divides.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        frame: Frame,
        delta_hours: f64,
        rng: &mut R,
    ) -> Result<Fate, SimulationError> {
        self.ensure_alive()?;
        self.age_hours += delta_hours;
        if self.age_hours >= self.scheduled_death_hours
            && self.scheduled_death_hours < self.scheduled_division_hours
        {
            self.terminate(CellState::Dead, frame);
            return Ok(Fate::Died);
        }
        if self.age_hours >= self.scheduled_division_hours {
            self.terminate(CellState::Divided, frame);
            return Ok(Fate::Divided);
        }
        self.signal.step(rng)?;
        Ok(Fate::Continued)
    }

    /// Builds both daughters of a divided cell.
    ///
    /// Daughters copy the parent's fitness memory unless the treatment's
    /// disturbance probability resets it to a uniform draw, then blend the
    /// parent's schedule with fresh draws from `treatment`.
    pub fn spawn_children<R: Rng + ?Sized>(
        &self,
        ids: [CellId; 2],
        frame: Frame,
        treatment: &Treatment,
        signal_config: &SignalConfig,
        rng: &mut R,
    ) -> Result<[Cell; 2], SimulationError> {
        if self.state != CellState::Divided {
            return Err(SimulationError::NotDivided { id: self.id });
        }
        let mut memories = [self.fitness_memory; 2];
        if let Some(probability) = treatment.fitness_memory_disturbance {
            for memory in &mut memories {
                if rng.random_bool(probability) {
                    *memory = rng.random::<f64>();
                }
            }
        }
        let (first_signal, second_signal) = self.signal.bifurcate(signal_config, rng)?;
        let inherited = Some((self.scheduled_division_hours, self.scheduled_death_hours));
        let mut first = Self::unscheduled(
            ids[0],
            Some(self.id),
            format!("{}.1", self.name),
            self.generation.next(),
            frame,
            memories[0],
            first_signal,
        );
        let mut second = Self::unscheduled(
            ids[1],
            Some(self.id),
            format!("{}.2", self.name),
            self.generation.next(),
            frame,
            memories[1],
            second_signal,
        );
        first.schedule(treatment, inherited, rng)?;
        second.schedule(treatment, inherited, rng)?;
        Ok([first, second])
    }

    fn ensure_alive(&self) -> Result<(), SimulationError> {
        if self.state.is_terminal() {
            Err(SimulationError::TerminalCell { id: self.id })
        } else {
            Ok(())
        }
    }

    fn terminate(&mut self, state: CellState, frame: Frame) {
        self.state = state;
        self.terminal_frame = Some(frame);
    }

    #[must_use]
    pub const fn id(&self) -> CellId {
        self.id
    }

    #[must_use]
    pub const fn parent(&self) -> Option<CellId> {
        self.parent
    }

    /// Branch name such as `1a-3.1.2`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn birth_frame(&self) -> Frame {
        self.birth_frame
    }

    #[must_use]
    pub const fn age_hours(&self) -> f64 {
        self.age_hours
    }

    #[must_use]
    pub const fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn signal_mut(&mut self) -> &mut Signal {
        &mut self.signal
    }

    #[must_use]
    pub const fn fitness_memory(&self) -> f64 {
        self.fitness_memory
    }

    pub fn set_fitness_memory(&mut self, memory: f64) {
        self.fitness_memory = memory.clamp(0.0, 1.0);
    }

    #[must_use]
    pub const fn scheduled_division_hours(&self) -> f64 {
        self.scheduled_division_hours
    }

    #[must_use]
    pub const fn scheduled_death_hours(&self) -> f64 {
        self.scheduled_death_hours
    }

    #[must_use]
    pub const fn state(&self) -> CellState {
        self.state
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        matches!(self.state, CellState::Alive)
    }

    /// Frame at which the cell divided or died.
    #[must_use]
    pub const fn terminal_frame(&self) -> Option<Frame> {
        self.terminal_frame
    }
}
