//! Frame scheduler driving every colony in lockstep.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    Colony, Frame, FrameRecord, History, RunSettings, SECONDS_PER_HOUR, SimulationConfig,
    SimulationError, StopReason,
};

/// Hard cap on the number of frames a run may advance.
pub const MAX_FRAMES: u64 = 10_000;

/// Random stream owned by the colony at global position `stream`.
///
/// Every colony draws from its own ChaCha stream of the root seed, so results
/// do not depend on how colonies are spread across worker threads.
#[must_use]
pub fn colony_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Owns the colonies of one run and the frames recorded so far.
#[derive(Debug)]
pub struct SimulationRunner {
    settings: RunSettings,
    seed: u64,
    colonies: Vec<Colony>,
    frame: Frame,
    frames: Vec<FrameRecord>,
}

impl SimulationRunner {
    /// Validates `config`, seeds every colony and records frame 0.
    pub fn new(config: &SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let seed = config.run.seed.unwrap_or_else(rand::random);
        let mut colonies = Vec::new();
        for (position, colony_config) in config.colonies.iter().enumerate() {
            for copy in 0..colony_config.copies {
                let index = colonies.len();
                let label = colony_config.label_for(position + 1, copy);
                let rng = colony_rng(seed, index as u64);
                colonies.push(Colony::new(index, label, colony_config, rng)?);
            }
        }
        info!(seed, colonies = colonies.len(), delta = config.run.delta, "simulation seeded");
        let mut runner = Self {
            settings: config.run.clone(),
            seed,
            colonies,
            frame: Frame::zero(),
            frames: Vec::new(),
        };
        runner.record();
        Ok(runner)
    }

    /// Advances every colony by one frame and records it.
    pub fn step(&mut self) -> Result<&FrameRecord, SimulationError> {
        let frame = self.frame.next();
        let delta_hours = self.settings.delta as f64 / SECONDS_PER_HOUR;
        self.colonies
            .par_iter_mut()
            .try_for_each(|colony| colony.advance(frame, delta_hours))?;
        self.frame = frame;
        Ok(self.record())
    }

    fn record(&mut self) -> &FrameRecord {
        let frame = self.frame;
        let mut cells = Vec::new();
        let mut colonies = Vec::with_capacity(self.colonies.len());
        for colony in &self.colonies {
            cells.extend(colony.snapshot(frame));
            colonies.push(colony.summary(frame));
        }
        debug!(%frame, cells = cells.len(), "frame recorded");
        self.frames.push(FrameRecord {
            frame,
            seconds: frame.seconds(self.settings.delta),
            cells,
            colonies,
        });
        &self.frames[self.frames.len() - 1]
    }

    /// First stop condition satisfied by the current state, if any.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        let stop = &self.settings.stop;
        if let Some(limit) = stop.stop_at_frame
            && self.frame.0 >= limit
        {
            return Some(StopReason::FrameLimit(limit));
        }
        if let Some(limit) = stop.stop_at_seconds
            && self.frame.seconds(self.settings.delta) >= limit
        {
            return Some(StopReason::TimeLimit(limit));
        }
        if let Some(limit) = stop.stop_at_single_colony_size
            && self.colonies.iter().any(|c| c.alive_count() >= limit)
        {
            return Some(StopReason::SingleColonySize(limit));
        }
        if let Some(limit) = stop.stop_at_all_colonies_size
            && self.colonies.iter().all(|c| c.alive_count() >= limit)
        {
            return Some(StopReason::AllColoniesSize(limit));
        }
        if stop.stop_when_extinct && self.colonies.iter().all(Colony::is_extinct) {
            return Some(StopReason::Extinct);
        }
        (self.frame.0 >= MAX_FRAMES).then_some(StopReason::IterationCap(MAX_FRAMES))
    }

    /// Steps until a stop condition holds and returns the recorded history.
    pub fn run(mut self) -> Result<History, SimulationError> {
        let stop_reason = loop {
            if let Some(reason) = self.stop_reason() {
                break reason;
            }
            self.step()?;
        };
        for colony in &self.colonies {
            colony.verify_lineage()?;
        }
        info!(
            seed = self.seed,
            frame = %self.frame,
            live = self.colonies.iter().map(Colony::alive_count).sum::<usize>(),
            reason = %stop_reason,
            "simulation stopped"
        );
        Ok(History {
            seed: self.seed,
            delta: self.settings.delta,
            frames: self.frames,
            stop_reason,
        })
    }

    #[must_use]
    pub fn colonies(&self) -> &[Colony] {
        &self.colonies
    }

    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.frame
    }

    /// Root seed, drawn from entropy when the settings left it unset.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColonyConfig, ConfigError, DistributionSpec, StopConditions, Treatment};
    use rand::Rng;
    use std::collections::BTreeMap;

    fn config(stop: StopConditions) -> SimulationConfig {
        SimulationConfig {
            run: RunSettings {
                delta: 3_600,
                seed: Some(11),
                stop,
            },
            colonies: vec![ColonyConfig {
                copies: 2,
                ..ColonyConfig::default()
            }],
        }
    }

    fn frames(limit: u64) -> StopConditions {
        StopConditions {
            stop_at_frame: Some(limit),
            ..StopConditions::default()
        }
    }

    #[test]
    fn streams_differ_per_colony_and_repeat_per_seed() {
        let a: u64 = colony_rng(5, 0).random();
        let b: u64 = colony_rng(5, 1).random();
        let again: u64 = colony_rng(5, 0).random();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn seeds_replicates_and_records_frame_zero() {
        let runner = SimulationRunner::new(&config(frames(3))).expect("runner");
        let labels: Vec<_> = runner.colonies().iter().map(Colony::label).collect();
        assert_eq!(labels, vec!["1a", "1b"]);
        assert_eq!(runner.frames().len(), 1);
        assert_eq!(runner.frames()[0].frame, Frame::zero());
        assert_eq!(runner.frames()[0].cells.len(), 2);
        assert_eq!(runner.seed(), 11);
    }

    #[test]
    fn frame_limit_records_every_frame() {
        let history = SimulationRunner::new(&config(frames(5)))
            .expect("runner")
            .run()
            .expect("run");
        assert_eq!(history.frames.len(), 6);
        assert_eq!(history.stop_reason, StopReason::FrameLimit(5));
        assert_eq!(history.frames[5].seconds, 18_000);
    }

    #[test]
    fn time_limit_uses_delta() {
        let mut config = config(StopConditions {
            stop_at_frame: None,
            stop_at_seconds: Some(7_200),
            ..StopConditions::default()
        });
        config.run.delta = 1_800;
        let history = SimulationRunner::new(&config)
            .expect("runner")
            .run()
            .expect("run");
        assert_eq!(history.final_frame().map(|f| f.frame), Some(Frame(4)));
        assert_eq!(history.stop_reason, StopReason::TimeLimit(7_200));
    }

    #[test]
    fn extinct_colonies_stop_the_run() {
        let mut config = config(frames(500));
        config.colonies[0].treatments = BTreeMap::from([(
            0,
            Treatment {
                name: "Lethal".to_string(),
                division_curve: DistributionSpec::Gaussian { mean: 100.0, std: 1.0 },
                death_curve: DistributionSpec::Gaussian { mean: 3.0, std: 0.5 },
                ..Treatment::control()
            },
        )]);
        let history = SimulationRunner::new(&config)
            .expect("runner")
            .run()
            .expect("run");
        assert_eq!(history.stop_reason, StopReason::Extinct);
        let last = history.final_frame().expect("frame");
        assert!(last.frame.0 < 10);
        assert!(last.colonies.iter().all(|c| c.alive == 0 && c.signal_mean.is_none()));
    }

    fn fast_growth(stop: StopConditions) -> SimulationConfig {
        let mut config = config(stop);
        config.colonies[0].treatments = BTreeMap::from([(
            0,
            Treatment {
                name: "Fast".to_string(),
                division_curve: DistributionSpec::Gaussian { mean: 5.0, std: 0.5 },
                death_curve: DistributionSpec::Gaussian { mean: 60.0, std: 0.5 },
                ..Treatment::control()
            },
        )]);
        config
    }

    #[test]
    fn colony_size_limits() {
        let single = SimulationRunner::new(&fast_growth(StopConditions {
            stop_at_frame: Some(1_000),
            stop_at_single_colony_size: Some(4),
            ..StopConditions::default()
        }))
        .expect("runner")
        .run()
        .expect("run");
        assert_eq!(single.stop_reason, StopReason::SingleColonySize(4));
        let last = single.final_frame().expect("frame");
        assert!(last.colonies.iter().any(|c| c.alive >= 4));
        assert!(last.frame.0 < 20);

        let all = SimulationRunner::new(&fast_growth(StopConditions {
            stop_at_frame: Some(1_000),
            stop_at_all_colonies_size: Some(4),
            ..StopConditions::default()
        }))
        .expect("runner")
        .run()
        .expect("run");
        assert_eq!(all.stop_reason, StopReason::AllColoniesSize(4));
        let last = all.final_frame().expect("frame");
        assert!(last.colonies.iter().all(|c| c.alive >= 4));
    }

    #[test]
    fn size_only_limits_are_not_cut_short_by_a_frame_preset() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{
                "run": {"delta": 3600, "seed": 1, "stop": {"stop_at_single_colony_size": 1000000}},
                "colonies": [{
                    "treatments": {
                        "0": {
                            "name": "Quiescent",
                            "division_curve": {"name": "Gaussian", "mean": 1000000.0, "std": 1.0},
                            "death_curve": {"name": "Gaussian", "mean": 1000000.0, "std": 1.0}
                        }
                    }
                }]
            }"#,
        )
        .expect("parse");
        let history = SimulationRunner::new(&config)
            .expect("runner")
            .run()
            .expect("run");
        assert_eq!(history.stop_reason, StopReason::IterationCap(MAX_FRAMES));
        assert_eq!(history.final_frame().map(|f| f.frame), Some(Frame(MAX_FRAMES)));
    }

    #[test]
    fn invalid_settings_fail_before_seeding() {
        let err = SimulationRunner::new(&config(StopConditions {
            stop_at_frame: None,
            ..StopConditions::default()
        }))
        .expect_err("unbounded");
        assert_eq!(err, SimulationError::Config(ConfigError::NoStopCondition));
    }

    #[test]
    fn missing_seed_is_drawn_and_recorded() {
        let mut config = config(frames(1));
        config.run.seed = None;
        let runner = SimulationRunner::new(&config).expect("runner");
        let seed = runner.seed();
        let history = runner.run().expect("run");
        assert_eq!(history.seed, seed);
    }
}
