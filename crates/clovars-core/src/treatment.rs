//! Treatments and the frame-indexed schedule resolving which one is active.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, DistributionSpec, Frame, SignalDisturbance};

/// Bundle of curves and disturbances applied uniformly to a colony's live cells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Treatment {
    #[serde(default = "default_treatment_name")]
    pub name: String,
    /// Age (hours) at which cells divide.
    pub division_curve: DistributionSpec,
    /// Age (hours) at which cells die.
    pub death_curve: DistributionSpec,
    /// Fitness memory forced onto every live cell when the treatment activates.
    #[serde(default)]
    pub fitness_memory: Option<f64>,
    /// Probability that a daughter's fitness memory is reset instead of copied.
    #[serde(default)]
    pub fitness_memory_disturbance: Option<f64>,
    /// Signal random-walk step installed on live cells at activation.
    #[serde(default)]
    pub signal_disturbance: Option<SignalDisturbance>,
}

fn default_treatment_name() -> String {
    "Treatment".to_string()
}

impl Treatment {
    /// Untreated growth used when a colony declares no schedule.
    #[must_use]
    pub fn control() -> Self {
        Self {
            name: "Control".to_string(),
            division_curve: DistributionSpec::Gaussian {
                mean: 24.0,
                std: 5.0,
            },
            death_curve: DistributionSpec::Gaussian {
                mean: 32.0,
                std: 5.0,
            },
            fitness_memory: None,
            fitness_memory_disturbance: None,
            signal_disturbance: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.division_curve.validate("division_curve")?;
        self.death_curve.validate("death_curve")?;
        if let Some(memory) = self.fitness_memory {
            check_unit_interval("fitness_memory", memory)?;
        }
        if let Some(probability) = self.fitness_memory_disturbance {
            check_unit_interval("fitness_memory_disturbance", probability)?;
        }
        if let Some(signal) = &self.signal_disturbance {
            signal.validate("signal_disturbance")?;
        }
        Ok(())
    }
}

pub(crate) fn check_unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            field,
            reason: format!("{value} is not within [0, 1]"),
        })
    }
}

/// Treatments sorted by activation frame, always starting at frame 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentSchedule {
    entries: Vec<(Frame, Treatment)>,
}

impl TreatmentSchedule {
    /// Builds a schedule for the named colony.
    ///
    /// Fails when two treatments share a frame or when no treatment starts at
    /// frame 0, so lookups on a constructed schedule always resolve.
    pub fn new(
        colony: &str,
        entries: impl IntoIterator<Item = (u64, Treatment)>,
    ) -> Result<Self, ConfigError> {
        let mut entries: Vec<(Frame, Treatment)> = entries
            .into_iter()
            .map(|(frame, treatment)| (Frame(frame), treatment))
            .collect();
        entries.sort_by_key(|(frame, _)| *frame);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ConfigError::DuplicateTreatmentFrame { frame: pair[0].0.0 });
        }
        if entries.first().is_none_or(|(frame, _)| *frame != Frame::zero()) {
            return Err(ConfigError::MissingBaselineTreatment {
                colony: colony.to_string(),
            });
        }
        for (_, treatment) in &entries {
            treatment.validate()?;
        }
        Ok(Self { entries })
    }

    /// Treatment whose activation frame is the greatest one not after `frame`.
    #[must_use]
    pub fn active_treatment(&self, frame: Frame) -> &Treatment {
        &self.entries[self.position(frame)].1
    }

    /// Activation frame of the treatment in effect at `frame`.
    #[must_use]
    pub fn activation_frame(&self, frame: Frame) -> Frame {
        self.entries[self.position(frame)].0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Frame, &Treatment)> + '_ {
        self.entries.iter().map(|(frame, treatment)| (*frame, treatment))
    }

    fn position(&self, frame: Frame) -> usize {
        // entries[0] starts at frame 0, so at least one entry precedes any frame.
        self.entries.partition_point(|(start, _)| *start <= frame) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temozolomide() -> Treatment {
        Treatment {
            name: "Temozolomide".to_string(),
            division_curve: DistributionSpec::EmGaussian {
                mean: 13.09,
                std: 7.17,
                k: 3.54,
            },
            ..Treatment::control()
        }
    }

    #[test]
    fn lookup_picks_latest_activation_not_after_frame() {
        let schedule = TreatmentSchedule::new(
            "1a",
            [(72, temozolomide()), (0, Treatment::control())],
        )
        .expect("schedule");
        assert_eq!(schedule.active_treatment(Frame(0)).name, "Control");
        assert_eq!(schedule.active_treatment(Frame(50)).name, "Control");
        assert_eq!(schedule.active_treatment(Frame(71)).name, "Control");
        assert_eq!(schedule.active_treatment(Frame(72)).name, "Temozolomide");
        assert_eq!(schedule.active_treatment(Frame(200)).name, "Temozolomide");
        assert_eq!(schedule.activation_frame(Frame(50)), Frame(0));
        assert_eq!(schedule.activation_frame(Frame(200)), Frame(72));
    }

    #[test]
    fn missing_baseline_is_rejected() {
        let err = TreatmentSchedule::new("2b", [(10, Treatment::control())])
            .expect_err("no frame 0");
        assert_eq!(
            err,
            ConfigError::MissingBaselineTreatment {
                colony: "2b".to_string()
            }
        );
        let empty = TreatmentSchedule::new("2b", Vec::<(u64, Treatment)>::new());
        assert!(matches!(
            empty,
            Err(ConfigError::MissingBaselineTreatment { .. })
        ));
    }

    #[test]
    fn duplicate_frames_are_rejected() {
        let err = TreatmentSchedule::new(
            "1a",
            [
                (0, Treatment::control()),
                (5, temozolomide()),
                (5, Treatment::control()),
            ],
        )
        .expect_err("duplicate");
        assert_eq!(err, ConfigError::DuplicateTreatmentFrame { frame: 5 });
    }

    #[test]
    fn probabilities_outside_unit_interval_are_rejected() {
        let treatment = Treatment {
            fitness_memory_disturbance: Some(1.5),
            ..Treatment::control()
        };
        assert!(matches!(
            TreatmentSchedule::new("1a", [(0, treatment)]),
            Err(ConfigError::InvalidParameter {
                field: "fitness_memory_disturbance",
                ..
            })
        ));
    }

    #[test]
    fn deserializes_with_optional_fields_defaulted() {
        let treatment: Treatment = serde_json::from_str(
            r#"{
                "name": "Control",
                "division_curve": {"name": "Gamma", "mean": 28.47, "std": 0.9, "a": 28.47},
                "death_curve": {"name": "Gaussian", "mean": 100.0, "std": 1.0}
            }"#,
        )
        .expect("parse");
        assert_eq!(treatment.fitness_memory, None);
        assert_eq!(treatment.signal_disturbance, None);
        assert!(treatment.validate().is_ok());
    }
}
