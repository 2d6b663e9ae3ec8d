use crate::calibration::Calibration;
use crate::error::FusionError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback score-fusion scheme file name, used when no mode-specific file exists.
pub const GENERIC_SCHEME_FILE: &str = "fusion.scheme";

/// Scheme file name required by the template fuser.
pub const TEMPLATE_SCHEME_FILE: &str = "template.scheme";

/// Calibration and weighting state loaded once at initialization.
///
/// The scheme parameterizes every combination operation. Algorithms are listed
/// in slot order: slot `i` describes the `i`-th score of a score set, the `i`-th
/// candidate list and the `i`-th input template.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionScheme {
    pub name: String,
    pub rule: CombineRule,
    /// Output dimensionality of fused templates. Required for template fusion.
    pub fused_dim: Option<usize>,
    /// Minimum number of usable template slots before fusion is attempted.
    pub min_valid: usize,
    /// Seed for the per-algorithm projection matrices.
    pub seed: u64,
    pub algorithms: Vec<AlgorithmProfile>,
}

/// Per-algorithm calibration context.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmProfile {
    pub name: String,
    pub weight: f64,
    pub calibration: Calibration,
    /// Native template length of this algorithm. Required for template fusion.
    pub dim: Option<usize>,
}

/// How calibrated per-algorithm values are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineRule {
    /// Weighted arithmetic mean.
    #[default]
    Mean,
    /// Highest calibrated value; weights are ignored.
    Max,
    /// Weighted geometric mean over values floored at a small epsilon.
    Geometric,
}

impl Default for FusionScheme {
    /// Equal weights and identity calibration for any number of algorithms.
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            rule: CombineRule::Mean,
            fused_dim: None,
            min_valid: 1,
            seed: 0,
            algorithms: vec![],
        }
    }
}

impl FusionScheme {
    /// Returns the first of `file_names` present in `directory`.
    ///
    /// Fails with `InputLocation` when the directory itself is missing.
    pub fn locate(directory: &Path, file_names: &[&str]) -> Result<Option<PathBuf>, FusionError> {
        if !directory.is_dir() {
            return Err(FusionError::InputLocation(format!(
                "configuration directory not found: {}",
                directory.display()
            )));
        }

        Ok(file_names
            .iter()
            .map(|name| directory.join(name))
            .find(|path| path.is_file()))
    }

    /// Reads and parses a scheme file.
    pub fn from_file(path: &Path) -> Result<Self, FusionError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FusionError::Config(format!("cannot read scheme {}: {e}", path.display()))
        })?;
        let scheme: FusionScheme = contents.parse()?;

        debug!(
            "Loaded fusion scheme `{}` from {} ({} algorithms)",
            scheme.name,
            path.display(),
            scheme.algorithms.len()
        );

        Ok(scheme)
    }

    /// Number of slots the scheme constrains inputs to, if any.
    pub fn slot_count(&self) -> Option<usize> {
        if self.algorithms.is_empty() {
            None
        } else {
            Some(self.algorithms.len())
        }
    }

    pub fn weight(&self, slot: usize) -> f64 {
        self.algorithms.get(slot).map_or(1.0, |a| a.weight)
    }

    pub fn calibration(&self, slot: usize) -> Calibration {
        self.algorithms
            .get(slot)
            .map_or(Calibration::Identity, |a| a.calibration)
    }

    /// Checks that the combination rule stays monotonic over every slot.
    ///
    /// The geometric rule takes logarithms, so each slot must calibrate onto
    /// `[0, 1]`. Identity and z-score values can be negative, and all of them
    /// would collapse onto the same floor.
    pub fn validate_for_scores(&self) -> Result<(), FusionError> {
        if self.rule != CombineRule::Geometric {
            return Ok(());
        }
        if self.algorithms.is_empty() {
            return Err(FusionError::Config(format!(
                "scheme `{}`: the geometric rule needs minmax or logistic calibrations",
                self.name
            )));
        }
        match self.algorithms.iter().find(|a| !a.calibration.maps_to_unit_interval()) {
            Some(algorithm) => Err(FusionError::Config(format!(
                "scheme `{}`: the geometric rule cannot use `{}` calibration of `{}`",
                self.name, algorithm.calibration, algorithm.name
            ))),
            None => Ok(()),
        }
    }

    /// Checks the extra requirements of template fusion: a fused dimensionality
    /// and a native dimensionality for each of at least two algorithms.
    pub fn validate_for_templates(&self) -> Result<(), FusionError> {
        if self.algorithms.len() < 2 {
            return Err(FusionError::Config(format!(
                "template fusion needs at least 2 algorithms, scheme `{}` has {}",
                self.name,
                self.algorithms.len()
            )));
        }
        if self.fused_dim.is_none() {
            return Err(FusionError::Config(format!(
                "scheme `{}` does not declare `fused_dim`",
                self.name
            )));
        }
        if let Some(algorithm) = self.algorithms.iter().find(|a| a.dim.is_none()) {
            return Err(FusionError::Config(format!(
                "algorithm `{}` does not declare `dim`",
                algorithm.name
            )));
        }
        Ok(())
    }
}
