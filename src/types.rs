/// Ordered real-valued feature vector. An empty template marks a failed extraction.
pub type Template = Vec<f64>;

/// One verification score per contributing algorithm, in slot order.
pub type ScoreSet = Vec<f64>;

/// Ranked identities for one probe, conventionally by descending score.
pub type CandidateList = Vec<Candidate>;

/// One identity hypothesis. Higher scores are more confident.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Candidate {
    pub identity: u32,
    pub score: f64,
}

impl Candidate {
    pub fn new(identity: u32, score: f64) -> Self {
        Self { identity, score }
    }
}

/// Which score-fusion scheme to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreFuserMode {
    Verification,
    Identification,
}

impl ScoreFuserMode {
    /// Scheme file name looked up inside the configuration directory.
    pub fn scheme_file(&self) -> &'static str {
        match self {
            ScoreFuserMode::Verification => "verification.scheme",
            ScoreFuserMode::Identification => "identification.scheme",
        }
    }
}

/// Which template-fusion capability to initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateAction {
    Fuse,
    Verify,
    Identify,
}

/// A template is treated as a failed extraction when it carries no information.
pub(crate) fn is_failed_template(template: &[f64]) -> bool {
    template.is_empty() || template.iter().all(|v| *v == 0.0)
}
