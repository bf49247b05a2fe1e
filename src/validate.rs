//! Validator
//!
//! Completeness and identification checks over a [`MeasurementModel`].
//! Findings are advisory: they never block compilation or saving.
//!
//! Every check runs; nothing short-circuits. Diagnostics come out in a stable
//! order: facets in declaration order (scaling first, then indicator counts),
//! then the unidimensional latent, then the higher-order construct.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::document::{LatentId, MeasurementMode, MeasurementModel, ScalingRule};
use crate::scaling::MIN_REFERENCE_INDICATORS;

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const MM_SCALING_MISSING: &str = "MM001";
pub const MM_REFERENCE_MISSING: &str = "MM002";
pub const MM_SECOND_ORDER_SCALING_MISSING: &str = "MM003";
pub const MM_SECOND_ORDER_REFERENCE_MISSING: &str = "MM004";
pub const MM_TOO_FEW_ITEMS: &str = "MM005";
pub const MM_MARGINAL_ITEMS: &str = "MM006";
pub const MM_TOO_FEW_GLOBALS: &str = "MM007";
pub const MM_SECOND_ORDER_TOO_FEW_GLOBALS: &str = "MM008";
pub const MM_SECOND_ORDER_WITHOUT_FACETS: &str = "MM009";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        MM_SCALING_MISSING => "Every latent variable has an identification rule.",
        MM_REFERENCE_MISSING => "A fixed loading always names its reference indicator.",
        MM_SECOND_ORDER_SCALING_MISSING => {
            "A configured higher-order construct has an identification rule."
        }
        MM_SECOND_ORDER_REFERENCE_MISSING => {
            "A fixed higher-order loading names its reference facet or global item."
        }
        MM_TOO_FEW_ITEMS => "Reflective latents are measured by at least two items.",
        MM_MARGINAL_ITEMS => "Reflective latents with two items are only just identified.",
        MM_TOO_FEW_GLOBALS => {
            "Formative facets carry two global reflective items for identification."
        }
        MM_SECOND_ORDER_TOO_FEW_GLOBALS => {
            "A formative higher-order construct carries two global reflective items."
        }
        MM_SECOND_ORDER_WITHOUT_FACETS => {
            "A higher-order construct is defined over first-order facets."
        }
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    /// Storage key of the latent the finding is about.
    pub latent: Option<String>,
    pub message: String,
    pub guarantee: String,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, latent: Option<&LatentId>, message: String) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity,
            latent: latent.map(|l| l.key().to_string()),
            message,
            guarantee: get_guarantee(code).to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().map(|d| d.message.as_str()).collect()
    }

    pub fn warning_messages(&self) -> Vec<&str> {
        self.warnings.iter().map(|d| d.message.as_str()).collect()
    }

    fn error(&mut self, code: &str, latent: Option<&LatentId>, message: String) {
        self.errors
            .push(Diagnostic::new(code, Severity::Error, latent, message));
    }

    fn warning(&mut self, code: &str, latent: Option<&LatentId>, message: String) {
        self.warnings
            .push(Diagnostic::new(code, Severity::Warning, latent, message));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs every check and returns the complete report.
pub fn validate(model: &MeasurementModel) -> ValidationReport {
    let mut report = ValidationReport::default();

    if model.is_unidimensional() {
        check_unidimensional(model, &mut report);
    } else {
        for facet in &model.inputs.facets {
            let Some(mode) = model.facet_mode(&facet.id) else {
                continue;
            };
            let latent = LatentId::facet(facet.id.clone());
            let label = facet.label();

            match model.scaling_rule(&latent) {
                None => report.error(
                    MM_SCALING_MISSING,
                    Some(&latent),
                    format!("Facet \"{}\" has no scaling rule selected.", label),
                ),
                Some(rule) if lacks_reference(rule) => report.error(
                    MM_REFERENCE_MISSING,
                    Some(&latent),
                    format!(
                        "Facet \"{}\" set to fix a loading but no reference item chosen.",
                        label
                    ),
                ),
                Some(_) => {}
            }

            match mode {
                MeasurementMode::Reflective => {
                    let n = model.active_items(&latent).len();
                    if n < MIN_REFERENCE_INDICATORS {
                        report.error(
                            MM_TOO_FEW_ITEMS,
                            Some(&latent),
                            format!(
                                "Reflective facet \"{}\" must have at least 2 items (has {}).",
                                label, n
                            ),
                        );
                    } else if n == MIN_REFERENCE_INDICATORS {
                        report.warning(
                            MM_MARGINAL_ITEMS,
                            Some(&latent),
                            format!("Reflective facet \"{}\" has only 2 items.", label),
                        );
                    }
                }
                MeasurementMode::Formative => {
                    let n = model.present_globals(&latent).len();
                    if n < MIN_REFERENCE_INDICATORS {
                        report.error(
                            MM_TOO_FEW_GLOBALS,
                            Some(&latent),
                            format!(
                                "Formative facet \"{}\" requires two global reflective items (has {}).",
                                label, n
                            ),
                        );
                    }
                }
            }
        }
    }

    check_second_order(model, &mut report);

    debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "model validated"
    );
    report
}

fn lacks_reference(rule: &ScalingRule) -> bool {
    rule.is_fix_loading() && rule.reference().is_none()
}

fn check_unidimensional(model: &MeasurementModel, report: &mut ValidationReport) {
    let latent = LatentId::Unidim;

    match model.scaling_rule(&latent) {
        None => report.error(
            MM_SCALING_MISSING,
            Some(&latent),
            "Unidimensional construct has no scaling rule selected.".to_string(),
        ),
        Some(rule) if lacks_reference(rule) => report.error(
            MM_REFERENCE_MISSING,
            Some(&latent),
            "Unidimensional construct set to fix a loading but no reference item chosen."
                .to_string(),
        ),
        Some(_) => {}
    }

    let n = model.active_items(&latent).len();
    if n < MIN_REFERENCE_INDICATORS {
        report.error(
            MM_TOO_FEW_ITEMS,
            Some(&latent),
            format!("Unidimensional construct must have at least 2 items (has {}).", n),
        );
    } else if n == MIN_REFERENCE_INDICATORS {
        report.warning(
            MM_MARGINAL_ITEMS,
            Some(&latent),
            "Unidimensional construct has only 2 items.".to_string(),
        );
    }
}

fn check_second_order(model: &MeasurementModel, report: &mut ValidationReport) {
    let Some(kind) = model.document.second_order.kind else {
        return;
    };
    let latent = LatentId::SecondOrder;

    match model.document.second_order.scaling.as_ref() {
        None => report.error(
            MM_SECOND_ORDER_SCALING_MISSING,
            Some(&latent),
            "Higher-order latent has no scaling configuration.".to_string(),
        ),
        Some(rule) if lacks_reference(rule) => {
            let message = match kind {
                MeasurementMode::Reflective => {
                    "Higher-order reflective latent requires a reference facet for fixed loading scaling."
                }
                MeasurementMode::Formative => {
                    "Higher-order formative latent requires a reference global item when fixing a loading."
                }
            };
            report.error(
                MM_SECOND_ORDER_REFERENCE_MISSING,
                Some(&latent),
                message.to_string(),
            );
        }
        Some(_) => {}
    }

    if kind == MeasurementMode::Formative {
        let n = model.present_globals(&latent).len();
        if n < MIN_REFERENCE_INDICATORS {
            report.error(
                MM_SECOND_ORDER_TOO_FEW_GLOBALS,
                Some(&latent),
                format!(
                    "Higher-order formative latent requires two global reflective items (has {}).",
                    n
                ),
            );
        }
    }

    // Always the last second-order diagnostic.
    if model.is_unidimensional() {
        report.error(
            MM_SECOND_ORDER_WITHOUT_FACETS,
            Some(&latent),
            "Higher-order latent specified but there are no first-order facets.".to_string(),
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn validate_model_native(model_json: String) -> napi::Result<serde_json::Value> {
    let model: MeasurementModel = serde_json::from_str(&model_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid model: {}", e)))?;
    serde_json::to_value(validate(&model))
        .map_err(|e| napi::Error::from_reason(format!("Serialization failed: {}", e)))
}
