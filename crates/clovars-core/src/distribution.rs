//! Named statistical families used for division, death and signal curves.

use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma as GammaDist, Normal, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, SamplingError};

/// Closed set of curve families, each parameterized by its mean and standard
/// deviation plus at most one shape parameter.
///
/// Shape parameters only skew the curve: every family is located and scaled
/// so that draws have exactly the configured `mean` and `std`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", deny_unknown_fields)]
pub enum DistributionSpec {
    Gaussian { mean: f64, std: f64 },
    /// Gamma with shape `a`, scale `std / sqrt(a)` and a location shift.
    Gamma { mean: f64, std: f64, a: f64 },
    /// Exponentially-modified Gaussian whose exponential rate derives from `k`.
    #[serde(rename = "EMGaussian")]
    EmGaussian { mean: f64, std: f64, k: f64 },
    /// Shifted lognormal with shape `s`.
    Lognormal { mean: f64, std: f64, s: f64 },
}

impl DistributionSpec {
    /// Family name as written in configuration.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::Gaussian { .. } => "Gaussian",
            Self::Gamma { .. } => "Gamma",
            Self::EmGaussian { .. } => "EMGaussian",
            Self::Lognormal { .. } => "Lognormal",
        }
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        match *self {
            Self::Gaussian { mean, .. }
            | Self::Gamma { mean, .. }
            | Self::EmGaussian { mean, .. }
            | Self::Lognormal { mean, .. } => mean,
        }
    }

    #[must_use]
    pub const fn std(&self) -> f64 {
        match *self {
            Self::Gaussian { std, .. }
            | Self::Gamma { std, .. }
            | Self::EmGaussian { std, .. }
            | Self::Lognormal { std, .. } => std,
        }
    }

    /// Checks parameter domains; `field` names the curve in error messages.
    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidParameter { field, reason };
        let (mean, std) = (self.mean(), self.std());
        if !mean.is_finite() {
            return Err(invalid(format!("{} mean must be finite", self.family())));
        }
        if !std.is_finite() || std < 0.0 {
            return Err(invalid(format!(
                "{} std must be finite and non-negative, got {std}",
                self.family()
            )));
        }
        let shape = match *self {
            Self::Gaussian { .. } => None,
            Self::Gamma { a, .. } => Some(("a", a)),
            Self::EmGaussian { k, .. } => Some(("k", k)),
            Self::Lognormal { s, .. } => Some(("s", s)),
        };
        if let Some((name, value)) = shape
            && !(value.is_finite() && value > 0.0)
        {
            return Err(invalid(format!(
                "{} shape {name} must be positive and finite, got {value}",
                self.family()
            )));
        }
        Ok(())
    }

    /// Draws a duration in hours; negative raw draws are clamped to zero.
    pub fn sample_duration<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SamplingError> {
        Ok(self.draw(rng)?.max(0.0))
    }

    /// Draws an unconstrained signed value.
    pub fn sample_delta<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SamplingError> {
        self.draw(rng)
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SamplingError> {
        let std = self.std();
        if !(std > 0.0) {
            return Err(self.failure(format!("standard deviation must be positive, got {std}")));
        }
        let value = match *self {
            Self::Gaussian { mean, std } => Normal::new(mean, std)
                .map_err(|err| self.failure(err.to_string()))?
                .sample(rng),
            Self::Gamma { mean, std, a } => {
                let scale = std / a.sqrt();
                let location = mean - a * scale;
                let gamma = GammaDist::new(a, scale).map_err(|err| self.failure(err.to_string()))?;
                location + gamma.sample(rng)
            }
            Self::EmGaussian { mean, std, k } => {
                let sigma = std / (1.0 + k * k).sqrt();
                let rate = 1.0 / (k * sigma);
                let normal =
                    Normal::new(mean - k * sigma, sigma).map_err(|err| self.failure(err.to_string()))?;
                let tail = Exp::new(rate).map_err(|err| self.failure(err.to_string()))?;
                normal.sample(rng) + tail.sample(rng)
            }
            Self::Lognormal { mean, std, s } => {
                let spread = (s * s).exp();
                let scale = std / (spread * (spread - 1.0)).sqrt();
                let location = mean - scale * spread.sqrt();
                let z: f64 = StandardNormal.sample(rng);
                location + scale * (s * z).exp()
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.failure(format!("draw produced non-finite value {value}")))
        }
    }

    fn failure(&self, reason: String) -> SamplingError {
        SamplingError {
            family: self.family(),
            reason,
        }
    }
}
