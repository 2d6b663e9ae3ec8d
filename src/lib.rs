#![forbid(unsafe_code)]

//! # biofuse
//!
//! Multi-algorithm biometric fusion and identification.
//!
//! This crate provides:
//! - Verification score fusion with per-algorithm calibration and weighting
//! - Candidate-list fusion for identification (L input candidates, L..=2L output)
//! - Template fusion into a fixed, algorithm-agnostic representation
//! - One-to-one verification of fused templates
//! - Gallery construction and top-M search
//!
//! Engines are obtained from [`score_fuser`] and [`template_fuser`] and are
//! driven through the [`ScoreFuser`] and [`TemplateFuser`] capability traits.
//! Both load a fusion scheme once from a read-only configuration directory.

// Scheme loading
pub mod calibration;
pub mod scheme;
mod scheme_parse;

// Fusion and search
pub mod gallery;
pub mod projection;
pub mod score_fusion;
pub mod template_fusion;

// Public surface
pub mod engine;
pub mod error;
pub mod types;

mod display;

pub use calibration::Calibration;
pub use engine::{
    score_fuser, template_fuser, EngineConfig, GalleryBackend, ScoreFuser, ScoreFusionEngine,
    TemplateFuser, TemplateFusionEngine,
};
pub use error::{FusionError, ReturnCode, ReturnStatus};
pub use scheme::{AlgorithmProfile, CombineRule, FusionScheme};
pub use types::{Candidate, CandidateList, ScoreFuserMode, ScoreSet, Template, TemplateAction};
