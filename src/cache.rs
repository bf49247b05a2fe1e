use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::document::{
    GlobalItem, LavaanSpec, MeasurementMode, MeasurementModel, ScalingRule, SecondOrder,
    StepInputs,
};
use crate::finalize::{compile_with_options, CompileOptions};

const MAX_ENTRIES: usize = 64;

/// Everything compiled output depends on. Derived or stamped fields of the
/// document (`indicators`, `lavaanSpec`, `updatedAt`) are left out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheKey<'a> {
    inputs: &'a StepInputs,
    facet_modes: &'a BTreeMap<String, MeasurementMode>,
    facet_scaling: &'a BTreeMap<String, ScalingRule>,
    facet_disabled_items: &'a BTreeMap<String, BTreeSet<i64>>,
    global_reflective: &'a BTreeMap<String, Vec<GlobalItem>>,
    second_order: &'a SecondOrder,
    overall_short_code: &'a Option<String>,
    options: &'a CompileOptions,
}

/// Memoizes compiled syntax by a hash of the model state.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: HashMap<String, String>,
    hits: u64,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn model_hash(model: &MeasurementModel, options: &CompileOptions) -> Option<String> {
        let doc = &model.document;
        let key = CacheKey {
            inputs: &model.inputs,
            facet_modes: &doc.facet_modes,
            facet_scaling: &doc.facet_scaling,
            facet_disabled_items: &doc.facet_disabled_items,
            global_reflective: &doc.global_reflective,
            second_order: &doc.second_order,
            overall_short_code: &doc.overall_short_code,
            options,
        };
        serde_json::to_string(&key)
            .ok()
            .map(|source| Self::compute_hash(&source))
    }

    pub fn get(&self, model: &MeasurementModel, options: &CompileOptions) -> Option<&str> {
        let hash = Self::model_hash(model, options)?;
        self.entries.get(&hash).map(String::as_str)
    }

    /// Compiles through the cache. The timestamp is always fresh.
    pub fn compile(&mut self, model: &MeasurementModel, options: &CompileOptions) -> LavaanSpec {
        let Some(hash) = Self::model_hash(model, options) else {
            return compile_with_options(model, options);
        };
        if let Some(syntax) = self.entries.get(&hash) {
            self.hits += 1;
            debug!(hash = &hash[..12], "compile cache hit");
            return LavaanSpec {
                syntax: syntax.clone(),
                generated_at: Utc::now(),
            };
        }

        let spec = compile_with_options(model, options);
        if self.entries.len() >= MAX_ENTRIES {
            self.entries.clear();
        }
        self.entries.insert(hash, spec.syntax.clone());
        spec
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
