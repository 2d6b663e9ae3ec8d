use crate::calibration::Calibration;
use crate::error::{ReturnCode, ReturnStatus};
use crate::scheme::{CombineRule, FusionScheme};
use crate::types::Candidate;
use std::fmt;

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ReturnCode::Success => "Success",
            ReturnCode::ConfigError => "Error reading configuration files",
            ReturnCode::ParseError => "Cannot parse the input data",
            ReturnCode::TemplateCreationError => "Elective refusal to produce a template",
            ReturnCode::VerifTemplateError => {
                "Either/both input templates were result of failed feature extraction"
            }
            ReturnCode::NumDataError => "Number of input data not supported",
            ReturnCode::TemplateFormatError => "Template is an incorrect format or defective",
            ReturnCode::InputLocationError => {
                "Cannot locate the input data - the input files or names seem incorrect"
            }
            ReturnCode::MemoryError => "Memory allocation failed (e.g. out of memory)",
            ReturnCode::NotImplemented => "Function is not implemented",
            ReturnCode::NonCongruentVectors => {
                "Vectors of different lengths passed to function expecting same lengths"
            }
            ReturnCode::VendorError => "Vendor-defined error",
        };
        f.write_str(text)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.info.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.info)
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:.6}", self.identity, self.score)
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Calibration::Identity => f.write_str("identity"),
            Calibration::MinMax { min, max } => write!(f, "minmax:{min},{max}"),
            Calibration::ZScore { mean, std } => write!(f, "zscore:{mean},{std}"),
            Calibration::Logistic { slope, offset } => write!(f, "logistic:{slope},{offset}"),
        }
    }
}

impl fmt::Display for CombineRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CombineRule::Mean => "mean",
            CombineRule::Max => "max",
            CombineRule::Geometric => "geometric",
        })
    }
}

/// Renders the scheme in the same text format it is loaded from.
impl fmt::Display for FusionScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[scheme]")?;
        writeln!(f, "name = {}", self.name)?;
        writeln!(f, "rule = {}", self.rule)?;
        if let Some(fused_dim) = self.fused_dim {
            writeln!(f, "fused_dim = {fused_dim}")?;
        }
        writeln!(f, "min_valid = {}", self.min_valid)?;
        writeln!(f, "seed = {}", self.seed)?;

        for algorithm in &self.algorithms {
            writeln!(f)?;
            writeln!(f, "[algorithm]")?;
            writeln!(f, "name = {}", algorithm.name)?;
            writeln!(f, "weight = {}", algorithm.weight)?;
            writeln!(f, "calibration = {}", algorithm.calibration)?;
            if let Some(dim) = algorithm.dim {
                writeln!(f, "dim = {dim}")?;
            }
        }
        Ok(())
    }
}
