//! Score normalization.
//!
//! Each contributing algorithm reports similarity on its own scale. Before any
//! combination, a raw score is mapped through the calibration of the slot it
//! came from so that every algorithm lands on a comparable scale.

use crate::error::FusionError;

/// Per-algorithm mapping from a raw score to the common scale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Calibration {
    /// Scores are already comparable.
    #[default]
    Identity,
    /// Linear rescale of `[min, max]` onto `[0, 1]`, clamped at both ends.
    MinMax { min: f64, max: f64 },
    /// Standard score against the algorithm's impostor distribution.
    ZScore { mean: f64, std: f64 },
    /// Logistic map `1 / (1 + e^(-slope * (s - offset)))`.
    Logistic { slope: f64, offset: f64 },
}

impl Calibration {
    /// Maps a raw score onto the common scale.
    ///
    /// Monotonic non-decreasing in `raw` for every variant, so the ranking of
    /// a single algorithm's scores is never altered by calibration.
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Calibration::Identity => raw,
            Calibration::MinMax { min, max } => ((raw - min) / (max - min)).clamp(0.0, 1.0),
            Calibration::ZScore { mean, std } => (raw - mean) / std,
            Calibration::Logistic { slope, offset } => {
                1.0 / (1.0 + (-slope * (raw - offset)).exp())
            }
        }
    }

    /// True when every calibrated value lies in `[0, 1]`.
    pub(crate) fn maps_to_unit_interval(&self) -> bool {
        matches!(self, Calibration::MinMax { .. } | Calibration::Logistic { .. })
    }

    pub(crate) fn validate(&self) -> Result<(), FusionError> {
        let finite = |values: &[f64]| values.iter().all(|v| v.is_finite());
        match *self {
            Calibration::Identity => Ok(()),
            Calibration::MinMax { min, max } => {
                if !finite(&[min, max]) || max <= min {
                    return Err(FusionError::Config(format!(
                        "minmax calibration needs finite min < max, got {min},{max}"
                    )));
                }
                Ok(())
            }
            Calibration::ZScore { mean, std } => {
                if !finite(&[mean, std]) || std <= 0.0 {
                    return Err(FusionError::Config(format!(
                        "zscore calibration needs a finite mean and positive std, got {mean},{std}"
                    )));
                }
                Ok(())
            }
            Calibration::Logistic { slope, offset } => {
                if !finite(&[slope, offset]) || slope <= 0.0 {
                    return Err(FusionError::Config(format!(
                        "logistic calibration needs a positive slope, got {slope},{offset}"
                    )));
                }
                Ok(())
            }
        }
    }
}
