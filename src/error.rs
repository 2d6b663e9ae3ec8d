use thiserror::Error;

/// Error handling for scheme loading, fusion, verification and search.
///
/// Every variant maps onto exactly one non-success [`ReturnCode`], so a driving
/// harness can always recover the status taxonomy from a failed call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// The fusion scheme in the configuration directory is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input data could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Elective refusal to produce a fused template.
    ///
    /// This is a policy outcome, not a defect: too little usable information
    /// remained after discarding failed inputs.
    #[error("Template creation refused: {0}")]
    TemplateCreation(String),

    /// An input was itself the product of a failed feature extraction.
    #[error("Input from failed extraction: {0}")]
    VerifTemplate(String),

    /// The number of inputs is not supported by the loaded scheme.
    #[error("Unsupported number of inputs: {0}")]
    NumData(String),

    /// A template has the wrong shape or carries non-finite values.
    #[error("Template format error: {0}")]
    TemplateFormat(String),

    /// A named input could not be located, or a prerequisite step was skipped.
    #[error("Input location error: {0}")]
    InputLocation(String),

    /// Allocation failed.
    #[error("Memory error: {0}")]
    Memory(String),

    /// The requested capability was not initialized on this instance.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Input collections that must share a length do not.
    #[error("Non-congruent vectors: {0}")]
    NonCongruentVectors(String),

    /// Implementation-specific failure.
    #[error("Vendor error: {0}")]
    Vendor(String),
}

impl FusionError {
    /// The status code reported to a driving harness for this error.
    pub fn code(&self) -> ReturnCode {
        match self {
            FusionError::Config(_) => ReturnCode::ConfigError,
            FusionError::Parse(_) => ReturnCode::ParseError,
            FusionError::TemplateCreation(_) => ReturnCode::TemplateCreationError,
            FusionError::VerifTemplate(_) => ReturnCode::VerifTemplateError,
            FusionError::NumData(_) => ReturnCode::NumDataError,
            FusionError::TemplateFormat(_) => ReturnCode::TemplateFormatError,
            FusionError::InputLocation(_) => ReturnCode::InputLocationError,
            FusionError::Memory(_) => ReturnCode::MemoryError,
            FusionError::NotImplemented(_) => ReturnCode::NotImplemented,
            FusionError::NonCongruentVectors(_) => ReturnCode::NonCongruentVectors,
            FusionError::Vendor(_) => ReturnCode::VendorError,
        }
    }

    /// The free-text diagnostic attached to this error.
    pub fn info(&self) -> &str {
        match self {
            FusionError::Config(s)
            | FusionError::Parse(s)
            | FusionError::TemplateCreation(s)
            | FusionError::VerifTemplate(s)
            | FusionError::NumData(s)
            | FusionError::TemplateFormat(s)
            | FusionError::InputLocation(s)
            | FusionError::Memory(s)
            | FusionError::NotImplemented(s)
            | FusionError::NonCongruentVectors(s)
            | FusionError::Vendor(s) => s,
        }
    }

    /// True when the engine declined to fuse rather than failing.
    pub fn is_refusal(&self) -> bool {
        matches!(self, FusionError::TemplateCreation(_))
    }
}

/// Completion codes, numbered in taxonomy order with `Success = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    Success = 0,
    ConfigError,
    ParseError,
    TemplateCreationError,
    VerifTemplateError,
    NumDataError,
    TemplateFormatError,
    InputLocationError,
    MemoryError,
    NotImplemented,
    NonCongruentVectors,
    VendorError,
}

impl ReturnCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }
}

/// Harness-facing completion signal: a code plus an optional diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatus {
    pub code: ReturnCode,
    pub info: String,
}

impl ReturnStatus {
    pub fn new(code: ReturnCode, info: impl Into<String>) -> Self {
        Self { code, info: info.into() }
    }

    pub fn success() -> Self {
        Self { code: ReturnCode::Success, info: String::new() }
    }
}

impl From<&FusionError> for ReturnStatus {
    fn from(err: &FusionError) -> Self {
        ReturnStatus::new(err.code(), err.info())
    }
}

impl<T> From<&Result<T, FusionError>> for ReturnStatus {
    fn from(result: &Result<T, FusionError>) -> Self {
        match result {
            Ok(_) => ReturnStatus::success(),
            Err(err) => ReturnStatus::from(err),
        }
    }
}
