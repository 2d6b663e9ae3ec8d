//! Template fusion and one-to-one verification.
//!
//! A fused template lives in one fixed-dimensional space regardless of which
//! algorithms contributed to it: every usable input is L2-normalized,
//! projected through its slot's matrix, weighted, summed and normalized again.
//! Verification is the cosine similarity of two fused templates, which is the
//! same similarity the gallery ranks by.

use crate::error::FusionError;
use crate::projection::Projection;
use crate::scheme::FusionScheme;
use crate::types::{is_failed_template, Template};
use tracing::{debug, trace};

/// Template fuser and verifier bound to one loaded scheme.
#[derive(Debug, Clone)]
pub struct TemplateFusion {
    scheme: FusionScheme,
    fused_dim: usize,
    projections: Vec<Projection>,
}

impl TemplateFusion {
    pub fn new(scheme: FusionScheme) -> Result<Self, FusionError> {
        scheme.validate_for_templates()?;
        let fused_dim = scheme
            .fused_dim
            .ok_or_else(|| FusionError::Config("missing `fused_dim`".to_string()))?;

        let projections = scheme
            .algorithms
            .iter()
            .map(|algorithm| {
                let dim = algorithm.dim.ok_or_else(|| {
                    FusionError::Config(format!("algorithm `{}` has no `dim`", algorithm.name))
                })?;
                Ok::<_, FusionError>(Projection::derive(
                    scheme.seed,
                    &algorithm.name,
                    dim,
                    fused_dim,
                ))
            })
            .collect::<Result<Vec<_>, FusionError>>()?;

        debug!(
            "template fusion `{}`: {} slots into {} dimensions",
            scheme.name,
            projections.len(),
            fused_dim
        );

        Ok(Self { scheme, fused_dim, projections })
    }

    pub fn fused_dim(&self) -> usize {
        self.fused_dim
    }

    pub fn scheme(&self) -> &FusionScheme {
        &self.scheme
    }

    /// Fuses one template per slot into a template of `fused_dim` values.
    ///
    /// Empty or all-zero inputs count as failed extractions and are skipped.
    /// When fewer than `min_valid` slots remain the fuser refuses with
    /// `TemplateCreation`.
    pub fn fuse(&self, input_templates: &[Template]) -> Result<Template, FusionError> {
        if input_templates.len() < 2 || input_templates.len() != self.projections.len() {
            return Err(FusionError::NumData(format!(
                "scheme `{}` fuses {} templates, got {}",
                self.scheme.name,
                self.projections.len(),
                input_templates.len()
            )));
        }

        let mut fused = vec![0.0; self.fused_dim];
        let mut usable = 0;

        for (slot, (template, projection)) in
            input_templates.iter().zip(&self.projections).enumerate()
        {
            if is_failed_template(template) {
                trace!("slot {} carries a failed extraction, skipping", slot);
                continue;
            }
            if template.len() != projection.input_dim() {
                return Err(FusionError::TemplateFormat(format!(
                    "slot {slot} expects {} values, got {}",
                    projection.input_dim(),
                    template.len()
                )));
            }
            if template.iter().any(|v| !v.is_finite()) {
                return Err(FusionError::TemplateFormat(format!(
                    "slot {slot} contains non-finite values"
                )));
            }

            let unit = unit_vector(template).ok_or_else(|| {
                FusionError::TemplateFormat(format!("slot {slot} has no finite L2 norm"))
            })?;
            projection.accumulate(&unit, self.scheme.weight(slot), &mut fused);
            usable += 1;
        }

        if usable < self.scheme.min_valid {
            debug!(
                "refusing fusion: {} usable slots, scheme requires {}",
                usable, self.scheme.min_valid
            );
            return Err(FusionError::TemplateCreation(format!(
                "{usable} usable templates, at least {} required",
                self.scheme.min_valid
            )));
        }

        unit_vector(&fused).ok_or_else(|| {
            FusionError::TemplateCreation("fused template carries no information".to_string())
        })
    }

    /// Cosine similarity of two fused templates, in `[-1, 1]`.
    pub fn verify(&self, enroll: &[f64], authentication: &[f64]) -> Result<f64, FusionError> {
        let enroll = self.normalized_fused(enroll, "enrollment")?;
        let authentication = self.normalized_fused(authentication, "authentication")?;
        Ok(dot(&enroll, &authentication))
    }

    /// Validates a fused template and returns its unit-length copy.
    pub(crate) fn normalized_fused(
        &self,
        template: &[f64],
        role: &str,
    ) -> Result<Vec<f64>, FusionError> {
        if template.is_empty() {
            return Err(FusionError::VerifTemplate(format!("{role} template is empty")));
        }
        if template.len() != self.fused_dim {
            return Err(FusionError::TemplateFormat(format!(
                "{role} template has {} values, fused templates have {}",
                template.len(),
                self.fused_dim
            )));
        }
        if template.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::TemplateFormat(format!(
                "{role} template contains non-finite values"
            )));
        }

        unit_vector(template)
            .ok_or_else(|| FusionError::VerifTemplate(format!("{role} template is all zeros")))
    }
}

/// Scales `values` to unit L2 length, or `None` for a zero or non-finite vector.
///
/// Components are divided by the largest magnitude before squaring so that
/// finite inputs near the ends of the `f64` range neither overflow nor
/// underflow.
fn unit_vector(values: &[f64]) -> Option<Vec<f64>> {
    let scale = values.iter().fold(0.0_f64, |max, v| max.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let norm = values.iter().map(|v| (v / scale).powi(2)).sum::<f64>().sqrt();
    Some(values.iter().map(|v| v / scale / norm).collect())
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
