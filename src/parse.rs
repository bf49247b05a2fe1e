//! Parse Module
//!
//! Reads persisted Step-4 documents and prior-step inputs, and upgrades
//! documents written by older versions of the workflow:
//!
//! - a top-level `facets` key is dropped (facets belong to the inputs)
//! - higher-order references stored as `refFacetId`, and numeric item
//!   references, are accepted (see [`crate::document::ScalingRule`])
//! - formative latents without global reflective slots get their two slots
//! - an empty `indicators` list is rebuilt from the facet modes
//! - every scaled latent gets a valid scaling rule

use serde_json::Value;
use tracing::{debug, info};

use crate::document::{LatentId, MeasurementMode, MeasurementModel, Step4Document, StepInputs};
use crate::error::StoreError;
use crate::indicators::build_indicators;
use crate::scaling::ensure_all;

/// Storage key of the Step-4 document.
pub const STEP4_STORAGE_KEY: &str = "data_step_4";

const LEGACY_KEYS: &[&str] = &["facets"];

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_document(json: &str) -> Result<Step4Document, StoreError> {
    let value: Value = serde_json::from_str(json)?;
    parse_document_value(value)
}

/// Deserializes a stored document, dropping keys older versions wrote.
/// `null` reads as an empty document.
pub fn parse_document_value(mut value: Value) -> Result<Step4Document, StoreError> {
    match &mut value {
        Value::Null => return Ok(Step4Document::default()),
        Value::Object(map) => {
            for key in LEGACY_KEYS {
                if map.remove(*key).is_some() {
                    debug!(key = *key, "dropped legacy key from stored document");
                }
            }
        }
        _ => {}
    }
    Ok(serde_json::from_value(value)?)
}

pub fn parse_inputs(json: &str) -> Result<StepInputs, StoreError> {
    Ok(serde_json::from_str(json)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// UPGRADES
// ═══════════════════════════════════════════════════════════════════════════════

/// Brings a freshly loaded model into a consistent state. Returns whether the
/// document changed and should be written back.
pub fn upgrade(model: &mut MeasurementModel) -> bool {
    let before = model.document.clone();

    let formative: Vec<LatentId> = model
        .inputs
        .facets
        .iter()
        .filter(|f| model.facet_mode(&f.id) == Some(MeasurementMode::Formative))
        .map(|f| LatentId::facet(f.id.clone()))
        .collect();
    for latent in &formative {
        model.ensure_global_slots(latent);
    }
    if model.document.second_order.kind == Some(MeasurementMode::Formative) {
        model.ensure_global_slots(&LatentId::SecondOrder);
    }

    if model.document.indicators.is_empty() && !model.document.facet_modes.is_empty() {
        model.document.indicators = build_indicators(model);
    }

    ensure_all(model);

    model.document != before
}

/// Combines inputs with the stored document (if any) and upgrades the result.
pub fn load_model(inputs: StepInputs, stored: Option<Step4Document>) -> (MeasurementModel, bool) {
    let mut model = MeasurementModel::new(inputs, stored.unwrap_or_default());
    let upgraded = upgrade(&mut model);
    if upgraded {
        info!(
            facets = model.inputs.facets.len(),
            "stored measurement document upgraded"
        );
    }
    (model, upgraded)
}
