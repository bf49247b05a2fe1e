//! Editing session for one Step-4 page.
//!
//! Owns the model exclusively. Every edit is applied synchronously, the
//! affected latents get their scaling re-checked, the model is recompiled,
//! and the debounced save is rescheduled. Persistence failures are reported
//! to the caller and leave the in-memory model untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::autosave::{AutoSave, ModelStore, DEFAULT_AUTOSAVE_DELAY_MS};
use crate::cache::CompileCache;
use crate::document::{
    LatentId, LavaanSpec, MeasurementMode, MeasurementModel, ScalingMethod, ScalingRule,
    StepInputs,
};
use crate::error::SessionError;
use crate::finalize::CompileOptions;
use crate::indicators::{build_indicators, eligible_indicators};
use crate::parse::load_model;
use crate::renamer::normalize_short_code;
use crate::scaling::{default_rule, ensure_scaling, MIN_REFERENCE_INDICATORS};
use crate::validate::{validate, ValidationReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub compile: CompileOptions,
    pub autosave_delay_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            compile: CompileOptions::default(),
            autosave_delay_ms: DEFAULT_AUTOSAVE_DELAY_MS,
        }
    }
}

pub struct Step4Session<S: ModelStore> {
    model: MeasurementModel,
    store: S,
    options: SessionOptions,
    autosave: AutoSave,
    cache: CompileCache,
    compiled: LavaanSpec,
}

impl<S: ModelStore> Step4Session<S> {
    /// Loads the stored document, upgrades it and compiles it. An upgraded
    /// document is scheduled for saving.
    pub fn load(
        inputs: StepInputs,
        store: S,
        options: SessionOptions,
        now: Instant,
    ) -> Result<Self, SessionError> {
        let stored = store.load()?;
        let had_document = stored.is_some();
        let (model, upgraded) = load_model(inputs, stored);

        let mut cache = CompileCache::new();
        let compiled = cache.compile(&model, &options.compile);
        let mut autosave = AutoSave::new(Duration::from_millis(options.autosave_delay_ms));
        if upgraded {
            autosave.schedule(now);
        }
        info!(
            facets = model.inputs.facets.len(),
            items = model.inputs.items.len(),
            had_document,
            upgraded,
            "measurement session loaded"
        );

        Ok(Self {
            model,
            store,
            options,
            autosave,
            cache,
            compiled,
        })
    }

    pub fn model(&self) -> &MeasurementModel {
        &self.model
    }

    pub fn compiled(&self) -> &LavaanSpec {
        &self.compiled
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn autosave(&self) -> &AutoSave {
        &self.autosave
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn validate(&self) -> ValidationReport {
        validate(&self.model)
    }

    pub fn recompile(&mut self) -> &LavaanSpec {
        self.compiled = self.cache.compile(&self.model, &self.options.compile);
        &self.compiled
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EDITS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn set_facet_mode(
        &mut self,
        facet_id: &str,
        mode: MeasurementMode,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.model.facet(facet_id).is_none() {
            return Err(SessionError::UnknownFacet(facet_id.to_string()));
        }
        let latent = LatentId::facet(facet_id);
        self.model
            .document
            .facet_modes
            .insert(facet_id.to_string(), mode);
        if mode == MeasurementMode::Formative {
            self.model.ensure_global_slots(&latent);
        }
        ensure_scaling(&mut self.model, &latent);
        self.refresh_second_order();
        self.after_edit(now);
        Ok(())
    }

    /// Switches a latent between fixing a loading and fixing its variance.
    /// A loading keeps its valid reference or gets the default one.
    pub fn set_scaling_method(
        &mut self,
        latent: &LatentId,
        method: ScalingMethod,
        now: Instant,
    ) -> Result<ScalingRule, SessionError> {
        self.require_active(latent)?;
        let rule = match method {
            ScalingMethod::FixVariance => ScalingRule::FixVariance,
            ScalingMethod::FixLoading => {
                let eligible = eligible_indicators(&self.model, latent);
                if eligible.len() < MIN_REFERENCE_INDICATORS {
                    return Err(SessionError::TooFewIndicators {
                        latent: latent.to_string(),
                        available: eligible.len(),
                    });
                }
                match self.model.scaling_rule(latent) {
                    Some(current)
                        if current
                            .reference()
                            .map_or(false, |r| eligible.iter().any(|c| c.id == r)) =>
                    {
                        current.clone()
                    }
                    _ => default_rule(&self.model, latent),
                }
            }
        };
        self.model.set_scaling_rule(latent, rule.clone());
        self.after_edit(now);
        Ok(rule)
    }

    pub fn set_reference(
        &mut self,
        latent: &LatentId,
        reference: &str,
        now: Instant,
    ) -> Result<(), SessionError> {
        self.require_active(latent)?;
        let eligible = eligible_indicators(&self.model, latent);
        if !eligible.iter().any(|c| c.id == reference) {
            return Err(SessionError::IneligibleReference {
                latent: latent.to_string(),
                reference: reference.to_string(),
            });
        }
        self.model
            .set_scaling_rule(latent, ScalingRule::fix_loading(reference));
        self.after_edit(now);
        Ok(())
    }

    /// Excludes an item from (or restores it to) its latent. Items are never
    /// deleted.
    pub fn set_item_excluded(
        &mut self,
        item_id: i64,
        excluded: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        let item = self
            .model
            .item(item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;
        let latent = if self.model.is_unidimensional() {
            LatentId::Unidim
        } else {
            match item.subdimension_id.as_deref() {
                Some(facet_id) if self.model.facet(facet_id).is_some() => {
                    LatentId::facet(facet_id)
                }
                _ => return Err(SessionError::UnknownItem(item_id)),
            }
        };

        let disabled = &mut self.model.document.facet_disabled_items;
        if excluded {
            disabled
                .entry(latent.key().to_string())
                .or_default()
                .insert(item_id);
        } else if let Some(set) = disabled.get_mut(latent.key()) {
            set.remove(&item_id);
            if set.is_empty() {
                disabled.remove(latent.key());
            }
        }
        debug!(item = item_id, latent = %latent, excluded, "item exclusion changed");

        if self.model.latent_mode(&latent).is_some() {
            ensure_scaling(&mut self.model, &latent);
        }
        self.refresh_second_order();
        self.after_edit(now);
        Ok(())
    }

    /// Edits the text of one global reflective slot of a formative latent.
    pub fn set_global_text(
        &mut self,
        latent: &LatentId,
        index: usize,
        text: &str,
        now: Instant,
    ) -> Result<(), SessionError> {
        self.require_active(latent)?;
        if self.model.latent_mode(latent) != Some(MeasurementMode::Formative) {
            return Err(SessionError::NoSuchGlobalSlot {
                latent: latent.to_string(),
                index,
            });
        }
        self.model.ensure_global_slots(latent);
        let slot = self
            .model
            .globals_mut(latent)
            .and_then(|slots| slots.get_mut(index))
            .ok_or_else(|| SessionError::NoSuchGlobalSlot {
                latent: latent.to_string(),
                index,
            })?;
        slot.text = text.to_string();

        ensure_scaling(&mut self.model, latent);
        self.after_edit(now);
        Ok(())
    }

    /// `None` removes the higher-order construct together with its scaling
    /// and global reflective items.
    pub fn set_second_order_type(
        &mut self,
        kind: Option<MeasurementMode>,
        now: Instant,
    ) -> Result<(), SessionError> {
        let second_order = &mut self.model.document.second_order;
        second_order.kind = kind;
        match kind {
            None => {
                second_order.scaling = None;
                second_order.global_reflective = None;
            }
            Some(mode) => {
                if mode == MeasurementMode::Formative {
                    self.model.ensure_global_slots(&LatentId::SecondOrder);
                }
                ensure_scaling(&mut self.model, &LatentId::SecondOrder);
            }
        }
        self.after_edit(now);
        Ok(())
    }

    /// Overrides the overall short code. Blank input restores the derived
    /// code.
    pub fn set_overall_short_code(&mut self, code: Option<&str>, now: Instant) {
        self.model.document.overall_short_code = code
            .map(normalize_short_code)
            .filter(|c| !c.is_empty());
        self.after_edit(now);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Saves if the debounced save is due. Returns whether a write happened.
    pub fn poll_autosave(&mut self, now: Instant) -> Result<bool, SessionError> {
        if !self.autosave.take_due(now) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Saves immediately, superseding any pending save.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        self.autosave.cancel();
        self.save()
    }

    fn save(&mut self) -> Result<(), SessionError> {
        let mut payload = self.model.document.clone();
        payload.indicators = build_indicators(&self.model);
        payload.lavaan_spec = Some(self.compiled.clone());
        payload.updated_at = Some(Utc::now());

        match self.store.store(&payload) {
            Ok(()) => {
                info!(
                    indicators = payload.indicators.len(),
                    "measurement document saved"
                );
                self.model.document = payload;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "saving measurement document failed");
                Err(e.into())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    fn require_active(&self, latent: &LatentId) -> Result<(), SessionError> {
        let unidim = self.model.is_unidimensional();
        let active = match latent {
            LatentId::Unidim => unidim,
            LatentId::Facet(id) => {
                if self.model.facet(id).is_none() {
                    return Err(SessionError::UnknownFacet(id.clone()));
                }
                !unidim && self.model.facet_mode(id).is_some()
            }
            LatentId::SecondOrder => !unidim && self.model.document.second_order.kind.is_some(),
        };
        if active {
            Ok(())
        } else {
            Err(SessionError::InactiveLatent(latent.to_string()))
        }
    }

    /// The higher-order construct's eligible set follows the emitted facets.
    fn refresh_second_order(&mut self) {
        if self.model.document.second_order.kind.is_some() {
            ensure_scaling(&mut self.model, &LatentId::SecondOrder);
        }
    }

    fn after_edit(&mut self, now: Instant) {
        self.model.document.indicators = build_indicators(&self.model);
        self.recompile();
        self.autosave.schedule(now);
    }
}
