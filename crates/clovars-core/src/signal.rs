//! Bounded heritable marker carried by every cell.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::{ConfigError, DistributionSpec, SamplingError};

/// Lower bound of a cell signal.
pub const SIGNAL_MIN: f64 = -1.0;
/// Upper bound of a cell signal.
pub const SIGNAL_MAX: f64 = 1.0;

/// Step rule perturbing a signal once per tick.
///
/// Curves are written exactly like division and death curves; the wave is
/// selected with `"name": "Wave"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", deny_unknown_fields)]
pub enum SignalDisturbance {
    /// Sinusoid evaluated on the signal's tick clock, mixed with uniform noise
    /// drawn from `[-3 * amplitude, 3 * amplitude]`.
    Wave {
        /// Ticks per full cycle.
        period: f64,
        amplitude: f64,
        #[serde(default)]
        vertical_shift: f64,
        /// Weight of the noise term, in `[0, 1]`.
        #[serde(default)]
        noise: f64,
    },
    #[serde(untagged)]
    Curve(DistributionSpec),
}

impl SignalDisturbance {
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::Wave { .. } => "Wave",
            Self::Curve(curve) => curve.family(),
        }
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        let (period, amplitude, vertical_shift, noise) = match *self {
            Self::Curve(curve) => return curve.validate(field),
            Self::Wave {
                period,
                amplitude,
                vertical_shift,
                noise,
            } => (period, amplitude, vertical_shift, noise),
        };
        let invalid = |reason: String| ConfigError::InvalidParameter { field, reason };
        if !(period.is_finite() && period > 0.0) {
            return Err(invalid(format!(
                "Wave period must be positive and finite, got {period}"
            )));
        }
        if !(amplitude.is_finite() && amplitude != 0.0) {
            return Err(invalid(format!(
                "Wave amplitude must be finite and non-zero, got {amplitude}"
            )));
        }
        if !vertical_shift.is_finite() || vertical_shift.abs() > amplitude.abs() {
            return Err(invalid(format!(
                "Wave vertical_shift must lie within the amplitude, got {vertical_shift}"
            )));
        }
        if !(0.0..=1.0).contains(&noise) {
            return Err(invalid(format!("Wave noise {noise} is not within [0, 1]")));
        }
        Ok(())
    }

    /// Signed step for the tick that brings the signal clock to `clock`.
    pub fn delta<R: Rng + ?Sized>(&self, clock: u64, rng: &mut R) -> Result<f64, SamplingError> {
        match *self {
            Self::Curve(curve) => curve.sample_delta(rng),
            Self::Wave {
                period,
                amplitude,
                vertical_shift,
                noise,
            } => {
                let angular = TAU / period;
                // Phase chosen so the wave passes through zero at clock 0.
                let phase = (-vertical_shift / amplitude).asin() / angular;
                let sine = amplitude * (angular * (clock as f64 + phase)).sin() + vertical_shift;
                let jitter = if noise > 0.0 {
                    let span = 3.0 * amplitude.abs();
                    rng.random_range(-span..=span)
                } else {
                    0.0
                };
                let value = sine * (1.0 - noise) + jitter * noise;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(SamplingError {
                        family: "Wave",
                        reason: format!("wave produced non-finite value {value}"),
                    })
                }
            }
        }
    }
}

impl From<DistributionSpec> for SignalDisturbance {
    fn from(curve: DistributionSpec) -> Self {
        Self::Curve(curve)
    }
}

/// Colony-level signal settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignalConfig {
    /// Distribution of seed values and of unlinked redraws at division.
    pub initial: DistributionSpec,
    /// Random-walk step used until a treatment replaces it.
    pub disturbance: Option<SignalDisturbance>,
    /// Second daughter copies the first daughter's starting value.
    pub linked_sister_inheritance: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            initial: DistributionSpec::Gaussian {
                mean: 0.0,
                std: 0.1,
            },
            disturbance: Some(SignalDisturbance::Curve(DistributionSpec::Gaussian {
                mean: 0.0,
                std: 1e-3,
            })),
            linked_sister_inheritance: false,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.initial.validate("signal.initial")?;
        if let Some(disturbance) = &self.disturbance {
            disturbance.validate("signal.disturbance")?;
        }
        Ok(())
    }
}

/// Per-cell signal value, the step rule currently perturbing it, and the tick
/// clock a wave is evaluated on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    value: f64,
    disturbance: Option<SignalDisturbance>,
    clock: u64,
}

impl Signal {
    /// Creates a signal, clamping `value` into `[SIGNAL_MIN, SIGNAL_MAX]`.
    #[must_use]
    pub fn new(value: f64, disturbance: Option<SignalDisturbance>) -> Self {
        Self {
            value: clamp_signal(value),
            disturbance,
            clock: 0,
        }
    }

    /// Draws a seed cell's signal from the colony settings.
    pub fn seeded<R: Rng + ?Sized>(
        config: &SignalConfig,
        disturbance: Option<SignalDisturbance>,
        rng: &mut R,
    ) -> Result<Self, SamplingError> {
        let value = config.initial.sample_delta(rng)?;
        Ok(Self::new(value, disturbance))
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub const fn disturbance(&self) -> Option<&SignalDisturbance> {
        self.disturbance.as_ref()
    }

    /// Ticks taken under the current disturbance.
    #[must_use]
    pub const fn clock(&self) -> u64 {
        self.clock
    }

    /// Replaces the active step rule and restarts its clock.
    pub fn disturb(&mut self, disturbance: SignalDisturbance) {
        self.disturbance = Some(disturbance);
        self.clock = 0;
    }

    /// Advances the signal by one step; a signal without disturbance stays put.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), SamplingError> {
        if let Some(disturbance) = &self.disturbance {
            let clock = self.clock + 1;
            let delta = disturbance.delta(clock, rng)?;
            self.clock = clock;
            self.value = clamp_signal(self.value + delta);
        }
        Ok(())
    }

    /// Starting value of a daughter: the parent's value when linked, a fresh
    /// draw from `base` otherwise.
    pub fn inherit<R: Rng + ?Sized>(
        parent_value: f64,
        linked: bool,
        base: &DistributionSpec,
        rng: &mut R,
    ) -> Result<f64, SamplingError> {
        if linked {
            Ok(clamp_signal(parent_value))
        } else {
            Ok(clamp_signal(base.sample_delta(rng)?))
        }
    }

    /// Produces both daughter signals at division.
    ///
    /// With linked inheritance the second daughter starts from the first
    /// daughter's exact value; otherwise each daughter is redrawn independently.
    /// Both keep the parent's step rule and clock, so a wave continues in phase.
    pub fn bifurcate<R: Rng + ?Sized>(
        &self,
        config: &SignalConfig,
        rng: &mut R,
    ) -> Result<(Self, Self), SamplingError> {
        let linked = config.linked_sister_inheritance;
        let first = Self::inherit(self.value, linked, &config.initial, rng)?;
        let second = if linked {
            first
        } else {
            Self::inherit(self.value, false, &config.initial, rng)?
        };
        let daughter = |value: f64| Self {
            value: clamp_signal(value),
            ..*self
        };
        Ok((daughter(first), daughter(second)))
    }
}

fn clamp_signal(value: f64) -> f64 {
    value.clamp(SIGNAL_MIN, SIGNAL_MAX)
}
